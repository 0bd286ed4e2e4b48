//! Capture adapters. Each source runs as its own task and funnels activities
//! through the shared [`ActivityRouter`].

pub mod app_tracker;
pub mod controller;
pub mod keystrokes;
pub mod phash;
pub mod screen;

pub use controller::{SensingController, SourceKind, SourceState};
pub use keystrokes::{Flush, KeystrokeCoalescer};

use std::sync::Arc;

use crate::metrics::MetricsCollector;
use crate::models::Activity;
use crate::ports::{
    ForegroundAppSource, KeyEventSource, PermissionProbe, ScreenCapture, ScreenTextExtractor,
};
use crate::privacy::PrivacyFilter;
use crate::router::ActivityRouter;

/// The OS-level collaborators a monitor is built from.
#[derive(Clone)]
pub struct Capabilities {
    pub keys: Arc<dyn KeyEventSource>,
    pub foreground: Arc<dyn ForegroundAppSource>,
    pub screen: Arc<dyn ScreenCapture>,
    pub ocr: Arc<dyn ScreenTextExtractor>,
    pub permissions: Arc<dyn PermissionProbe>,
}

/// What every capture task needs to publish.
#[derive(Clone)]
pub struct CaptureContext {
    pub router: ActivityRouter,
    pub privacy: Arc<PrivacyFilter>,
    pub metrics: MetricsCollector,
}

impl CaptureContext {
    pub async fn publish(&self, activity: Activity) {
        let kind = activity.kind;
        self.router.publish(activity);
        self.metrics.record_published(kind).await;
    }
}
