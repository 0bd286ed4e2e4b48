use std::collections::HashMap;

use crate::ports::TextAnalyzer;

const STOP_WORDS: &[&str] = &[
    "the", "and", "a", "to", "of", "is", "in", "that", "it", "with", "as", "for", "on", "was",
    "be", "at", "this", "by", "are", "or", "an", "but", "not", "from",
];

const MIN_KEYWORD_CHARS: usize = 3;

/// Dependency-free `TextAnalyzer`: every alphabetic word is treated as a
/// content word, filtered by a stop list and a minimum length.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalAnalyzer;

impl LexicalAnalyzer {
    pub fn is_stop_word(word: &str) -> bool {
        STOP_WORDS.contains(&word.to_lowercase().as_str())
    }
}

impl TextAnalyzer for LexicalAnalyzer {
    fn keywords(&self, text: &str, limit: usize) -> Vec<String> {
        // word -> (count, first position)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let words = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .map(|token| token.trim_matches('\''))
            .filter(|token| token.chars().any(char::is_alphabetic));

        for (position, token) in words.enumerate() {
            if token.chars().count() < MIN_KEYWORD_CHARS || Self::is_stop_word(token) {
                continue;
            }
            counts
                .entry(token.to_lowercase())
                .or_insert((0, position))
                .0 += 1;
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(word, (count, first))| (word, count, first))
            .collect();
        ranked.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1).then(lhs.2.cmp(&rhs.2)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(word, _, _)| word)
            .collect()
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\n' {
                push_sentence(&mut sentences, &mut current);
                continue;
            }
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
                if at_boundary {
                    push_sentence(&mut sentences, &mut current);
                }
            }
        }
        push_sentence(&mut sentences, &mut current);
        sentences
    }
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}
