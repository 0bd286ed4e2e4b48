use std::collections::VecDeque;

use crate::models::Activity;

/// FIFO buffer of activities awaiting the next context recomputation.
#[derive(Debug)]
pub struct ActivityWindow {
    items: VecDeque<Activity>,
    capacity: usize,
    since_recompute: usize,
}

impl ActivityWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            since_recompute: 0,
        }
    }

    /// Append `activity`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, activity: Activity) -> Option<Activity> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(activity);
        self.since_recompute += 1;
        evicted
    }

    /// Activities added since the last [`ActivityWindow::take`].
    pub fn since_recompute(&self) -> usize {
        self.since_recompute
    }

    /// Snapshot the window (oldest first) and start a fresh one.
    pub fn take(&mut self) -> Vec<Activity> {
        self.since_recompute = 0;
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityKind;
    use chrono::Utc;

    fn numbered(index: usize) -> Activity {
        Activity::new(
            ActivityKind::Keystroke,
            Utc::now(),
            "Editor",
            None,
            Some(index.to_string()),
        )
    }

    #[test]
    fn overflow_evicts_oldest_not_newest() {
        let mut window = ActivityWindow::new(50);
        let mut evicted = Vec::new();
        for index in 0..52 {
            if let Some(old) = window.push(numbered(index)) {
                evicted.push(old.content.unwrap_or_default());
            }
        }

        assert_eq!(evicted, vec!["0", "1"]);
        assert_eq!(window.len(), 50);

        let snapshot = window.take();
        assert_eq!(snapshot.first().and_then(|a| a.content.as_deref()), Some("2"));
        assert_eq!(snapshot.last().and_then(|a| a.content.as_deref()), Some("51"));
    }

    #[test]
    fn single_overflow_evicts_exactly_one() {
        let mut window = ActivityWindow::new(50);
        for index in 0..50 {
            assert!(window.push(numbered(index)).is_none());
        }
        let newcomer = numbered(50);
        let newcomer_id = newcomer.id;
        let evicted = window.push(newcomer).map(|a| a.content);
        assert_eq!(evicted, Some(Some("0".to_string())));
        assert!(window.take().iter().any(|a| a.id == newcomer_id));
    }

    #[test]
    fn take_resets_counter_and_clears() {
        let mut window = ActivityWindow::new(5);
        window.push(numbered(0));
        window.push(numbered(1));
        assert_eq!(window.since_recompute(), 2);

        assert_eq!(window.take().len(), 2);
        assert!(window.is_empty());
        assert_eq!(window.since_recompute(), 0);
    }
}
