use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::CaptureContext;
use crate::models::{Activity, ActivityKind};
use crate::ports::{ForegroundApp, ForegroundAppSource};

const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

/// Emits an app-switch activity whenever the foreground app differs from the
/// last one this tracker published.
pub struct AppTracker {
    foreground: Arc<dyn ForegroundAppSource>,
    ctx: CaptureContext,
    last_published: Option<ForegroundApp>,
}

impl AppTracker {
    pub fn new(foreground: Arc<dyn ForegroundAppSource>, ctx: CaptureContext) -> Self {
        Self {
            foreground,
            ctx,
            last_published: None,
        }
    }

    pub async fn poll_once(&mut self) -> Option<Activity> {
        let app = self.foreground.current()?;
        if self.ctx.privacy.is_excluded(app.id()) {
            log_debug!("{} is excluded; not tracking", app.name);
            return None;
        }
        if self
            .last_published
            .as_ref()
            .is_some_and(|last| last.same_app(&app))
        {
            return None;
        }

        let activity = Activity::new(
            ActivityKind::AppSwitch,
            Utc::now(),
            app.name.clone(),
            app.bundle_id.clone(),
            None,
        );
        self.last_published = Some(app);
        self.ctx.publish(activity.clone()).await;
        Some(activity)
    }
}

pub fn spawn(tracker: AppTracker, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(app_tracking_loop(tracker, interval, cancel))
}

async fn app_tracking_loop(mut tracker: AppTracker, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(activity) = tracker.poll_once().await {
                    log_info!("foreground app is now {}", activity.application);
                }
            }
            _ = cancel.cancelled() => {
                log_info!("app tracking shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::ports::ConfigStore;
    use crate::privacy::PrivacyFilter;
    use crate::router::ActivityRouter;
    use anyhow::Result;
    use std::sync::Mutex;

    struct NoConfig;

    impl ConfigStore for NoConfig {
        fn string_list(&self, _key: &str) -> Vec<String> {
            Vec::new()
        }

        fn set_string_list(&self, _key: &str, _values: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedApps(Mutex<Option<ForegroundApp>>);

    impl ScriptedApps {
        fn switch_to(&self, app: Option<ForegroundApp>) {
            *self.0.lock().unwrap() = app;
        }
    }

    impl ForegroundAppSource for ScriptedApps {
        fn current(&self) -> Option<ForegroundApp> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn publishes_only_on_change() {
        let apps = Arc::new(ScriptedApps(Mutex::new(None)));
        let router = ActivityRouter::new(10);
        let ctx = CaptureContext {
            router: router.clone(),
            privacy: Arc::new(PrivacyFilter::new(Arc::new(NoConfig))),
            metrics: MetricsCollector::new(),
        };
        let mut tracker = AppTracker::new(apps.clone(), ctx);
        let editor = ForegroundApp::new("Editor", Some("com.example.editor"));
        let terminal = ForegroundApp::new("Terminal", Some("com.apple.Terminal"));

        assert!(tracker.poll_once().await.is_none());

        apps.switch_to(Some(editor.clone()));
        assert!(tracker.poll_once().await.is_some());
        assert!(tracker.poll_once().await.is_none());

        // An excluded app in between does not count as a switch away.
        apps.switch_to(Some(ForegroundApp::new("Messages", Some("com.apple.Messages"))));
        assert!(tracker.poll_once().await.is_none());
        apps.switch_to(Some(editor));
        assert!(tracker.poll_once().await.is_none());

        apps.switch_to(Some(terminal));
        let switched = tracker.poll_once().await.unwrap();
        assert_eq!(switched.kind, ActivityKind::AppSwitch);
        assert_eq!(switched.application, "Terminal");

        let apps_seen: Vec<_> = router.recent().into_iter().map(|a| a.application).collect();
        assert_eq!(apps_seen, vec!["Terminal", "Editor"]);
    }
}
