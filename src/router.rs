use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::models::Activity;

/// The single serialization point for activities from every capture source.
///
/// Each published activity is inserted into a bounded newest-first ring and
/// forwarded to the one downstream subscriber under the same lock, so the
/// subscriber sees exactly the ring's insertion order.
#[derive(Clone)]
pub struct ActivityRouter {
    inner: Arc<Mutex<RouterInner>>,
}

struct RouterInner {
    recent: VecDeque<Activity>,
    capacity: usize,
    downstream: Option<mpsc::UnboundedSender<Activity>>,
}

impl ActivityRouter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                recent: VecDeque::with_capacity(capacity),
                capacity,
                downstream: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach the downstream consumer, replacing any previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Activity> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().downstream = Some(tx);
        rx
    }

    pub fn publish(&self, activity: Activity) {
        let mut inner = self.lock();

        if let Some(tx) = &inner.downstream {
            if tx.send(activity.clone()).is_err() {
                log::warn!("Activity subscriber went away; detaching");
                inner.downstream = None;
            }
        }

        inner.recent.push_front(activity);
        let capacity = inner.capacity;
        inner.recent.truncate(capacity);
    }

    /// Most recent activities, newest first.
    pub fn recent(&self) -> Vec<Activity> {
        self.lock().recent.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Activity> {
        self.lock().recent.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().recent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityKind;
    use chrono::Utc;

    fn activity(content: &str) -> Activity {
        Activity::new(
            ActivityKind::Keystroke,
            Utc::now(),
            "Editor",
            None,
            Some(content.to_string()),
        )
    }

    #[test]
    fn ring_is_bounded_and_newest_first() {
        let router = ActivityRouter::new(3);
        for index in 0..5 {
            router.publish(activity(&index.to_string()));
        }

        let contents: Vec<_> = router
            .recent()
            .into_iter()
            .filter_map(|a| a.content)
            .collect();
        assert_eq!(contents, vec!["4", "3", "2"]);
        assert_eq!(router.latest().and_then(|a| a.content).as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn forwards_in_publish_order() {
        let router = ActivityRouter::new(2);
        let mut rx = router.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|index| activity(&index.to_string()))
            .collect();
        for item in &handles {
            router.publish(item.clone());
        }

        for item in &handles {
            assert_eq!(rx.recv().await.map(|a| a.id), Some(item.id));
        }
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn publishing_without_subscriber_still_records() {
        let router = ActivityRouter::new(10);
        router.publish(activity("alone"));
        assert_eq!(router.len(), 1);

        let rx = router.subscribe();
        drop(rx);
        router.publish(activity("dropped subscriber"));
        assert_eq!(router.len(), 2);
    }
}
