use chrono::Utc;
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::models::{Activity, Context};
use crate::ports::TextAnalyzer;

const NO_ACTIVITY_SUMMARY: &str = "No significant activity detected";

/// Per-application activity counts in first-seen order.
pub fn application_counts(activities: &[Activity]) -> Vec<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for activity in activities {
        match counts
            .iter_mut()
            .find(|(app, _)| *app == activity.application)
        {
            Some((_, count)) => *count += 1,
            None => counts.push((activity.application.as_str(), 1)),
        }
    }
    counts
}

/// The application with the most activities; ties go to the one seen first.
pub fn main_application(activities: &[Activity]) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (app, count) in application_counts(activities) {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((app, count));
        }
    }
    best.map(|(app, _)| app.to_string())
}

/// Non-empty activity contents joined with single spaces.
pub fn corpus(activities: &[Activity]) -> String {
    activities
        .iter()
        .filter_map(Activity::text)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn basic_summary(activities: &[Activity]) -> String {
    let parts: Vec<String> = application_counts(activities)
        .into_iter()
        .map(|(app, count)| format!("{count} activities in {app}"))
        .collect();
    if parts.is_empty() {
        return NO_ACTIVITY_SUMMARY.to_string();
    }
    format!("User performed {}", parts.join(", "))
}

pub fn summarize(
    text: &str,
    activities: &[Activity],
    analyzer: &dyn TextAnalyzer,
    min_chars: usize,
) -> String {
    if text.trim().is_empty() {
        return basic_summary(activities);
    }

    let sentences = analyzer.sentences(text);
    let summary = match sentences.as_slice() {
        [] => String::new(),
        [first, last] => format!("{first} {last}"),
        [only] => only.clone(),
        [first, .., last] => format!("{first} {last}"),
    };

    if summary.chars().count() < min_chars {
        return basic_summary(activities);
    }
    summary
}

/// Build a context from a window snapshot given oldest first.
pub fn synthesize(
    window: Vec<Activity>,
    analyzer: &dyn TextAnalyzer,
    config: &AggregatorConfig,
) -> Context {
    let main_application = main_application(&window);
    let text = corpus(&window);
    let keywords = if text.is_empty() {
        Vec::new()
    } else {
        analyzer.keywords(&text, config.max_keywords)
    };
    let summary = summarize(&text, &window, analyzer, config.min_summary_chars);

    let mut activities = window;
    activities.reverse();
    activities.truncate(config.window_capacity);

    Context {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        summary,
        activities,
        keywords,
        main_application,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LexicalAnalyzer;
    use crate::models::ActivityKind;

    fn activity(app: &str, content: Option<&str>) -> Activity {
        Activity::new(
            ActivityKind::Keystroke,
            Utc::now(),
            app,
            None,
            content.map(String::from),
        )
    }

    #[test]
    fn main_application_breaks_ties_by_first_seen() {
        let window = vec![
            activity("Terminal", None),
            activity("Editor", None),
            activity("Editor", None),
            activity("Terminal", None),
        ];
        assert_eq!(main_application(&window).as_deref(), Some("Terminal"));
        assert_eq!(main_application(&[]), None);
    }

    #[test]
    fn corpus_skips_empty_content() {
        let window = vec![
            activity("Editor", Some("first")),
            activity("Editor", None),
            activity("Editor", Some("  ")),
            activity("Editor", Some("second")),
        ];
        assert_eq!(corpus(&window), "first second");
    }

    #[test]
    fn long_text_uses_first_and_last_sentence() {
        let window = vec![activity("Editor", None)];
        let text = "Refactored the parser module. Fixed a bug. Wrote tests for tokenizer edge cases.";
        let summary = summarize(text, &window, &LexicalAnalyzer, 20);
        assert_eq!(
            summary,
            "Refactored the parser module. Wrote tests for tokenizer edge cases."
        );
    }

    #[test]
    fn short_summary_falls_back_to_counts() {
        let window = vec![
            activity("Editor", Some("ok")),
            activity("Editor", None),
            activity("Terminal", None),
        ];
        let summary = summarize("ok", &window, &LexicalAnalyzer, 20);
        assert_eq!(
            summary,
            "User performed 2 activities in Editor, 1 activities in Terminal"
        );
        assert_eq!(basic_summary(&[]), NO_ACTIVITY_SUMMARY);
    }

    #[test]
    fn synthesize_orders_newest_first() {
        let window = vec![
            activity("Editor", Some("Implementing the context aggregator today.")),
            activity("Editor", Some("Context windows evict the oldest activity.")),
            activity("Terminal", None),
        ];
        let oldest = window[0].id;
        let newest = window[2].id;

        let context = synthesize(window, &LexicalAnalyzer, &AggregatorConfig::default());
        assert_eq!(context.activities.first().map(|a| a.id), Some(newest));
        assert_eq!(context.activities.last().map(|a| a.id), Some(oldest));
        assert_eq!(context.main_application.as_deref(), Some("Editor"));
        assert_eq!(context.keywords.first().map(String::as_str), Some("context"));
        assert!(context.keywords.len() <= 10);
        assert_eq!(
            context.summary,
            "Implementing the context aggregator today. Context windows evict the oldest activity."
        );
    }
}
