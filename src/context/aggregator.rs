use anyhow::{Context as _, Result};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::synthesis::synthesize;
use super::window::ActivityWindow;
use crate::config::AggregatorConfig;
use crate::metrics::{MetricsCollector, SynthesisMetrics};
use crate::models::{Activity, Context};
use crate::ports::TextAnalyzer;
use crate::store::ContextStore;

/// Read-only view of the aggregator's contexts, published on every swap.
#[derive(Debug, Clone)]
pub struct ContextView {
    pub current: Context,
    /// Newest first.
    pub history: Vec<Context>,
}

/// A candidate replaces the current context when the dominant application
/// changed or fewer than `threshold` of its keywords were already known.
pub fn is_significant(candidate: &Context, current: &Context, threshold: f64) -> bool {
    if candidate.main_application != current.main_application {
        return true;
    }

    let known: HashSet<&str> = current.keywords.iter().map(String::as_str).collect();
    let fresh: HashSet<&str> = candidate.keywords.iter().map(String::as_str).collect();
    let overlap = fresh.intersection(&known).count();
    let ratio = overlap as f64 / fresh.len().max(1) as f64;
    ratio < threshold
}

/// Current context plus bounded newest-first history.
#[derive(Debug)]
pub struct ContextState {
    current: Context,
    history: VecDeque<Context>,
    capacity: usize,
}

impl ContextState {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: Context::placeholder(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Seed from persisted contexts given newest first: the newest becomes
    /// current, the rest history.
    pub fn restore(saved: Vec<Context>, capacity: usize) -> Self {
        let mut saved = saved.into_iter();
        let Some(current) = saved.next() else {
            return Self::new(capacity);
        };
        Self {
            current,
            history: saved.take(capacity).collect(),
            capacity,
        }
    }

    pub fn current(&self) -> &Context {
        &self.current
    }

    pub fn history(&self) -> impl Iterator<Item = &Context> {
        self.history.iter()
    }

    /// Swap in `candidate` if it is significant, archiving the old current.
    pub fn consider(&mut self, candidate: Context, threshold: f64) -> bool {
        if !is_significant(&candidate, &self.current, threshold) {
            return false;
        }
        let previous = std::mem::replace(&mut self.current, candidate);
        self.history.push_front(previous);
        self.history.truncate(self.capacity);
        true
    }

    pub fn view(&self) -> ContextView {
        ContextView {
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }
}

struct Synthesized {
    context: Context,
    activity_count: usize,
    duration_ms: u64,
}

fn run_synthesis(
    snapshot: Vec<Activity>,
    analyzer: Arc<dyn TextAnalyzer>,
    config: AggregatorConfig,
) -> Synthesized {
    let started = StdInstant::now();
    let activity_count = snapshot.len();
    let context = synthesize(snapshot, analyzer.as_ref(), &config);
    Synthesized {
        context,
        activity_count,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Accumulates routed activities into windows and turns them into contexts.
pub struct ContextAggregator {
    config: AggregatorConfig,
    analyzer: Arc<dyn TextAnalyzer>,
    store: Option<Arc<ContextStore>>,
    metrics: MetricsCollector,
}

impl ContextAggregator {
    pub fn new(
        config: AggregatorConfig,
        analyzer: Arc<dyn TextAnalyzer>,
        store: Option<Arc<ContextStore>>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            config,
            analyzer,
            store,
            metrics,
        }
    }

    /// Run the aggregation task, which owns all window and context state.
    pub fn spawn(
        self,
        initial: ContextState,
        activities: mpsc::UnboundedReceiver<Activity>,
    ) -> AggregatorHandle {
        let (view_tx, view_rx) = watch::channel(initial.view());
        let cancel = CancellationToken::new();

        let runner = AggregationRunner {
            window: ActivityWindow::new(self.config.window_capacity),
            state: initial,
            in_flight: false,
            deferred: false,
            view_tx,
            aggregator: self,
        };
        let handle = tokio::spawn(aggregation_loop(runner, activities, cancel.clone()));

        AggregatorHandle {
            view: view_rx,
            cancel,
            handle,
        }
    }
}

pub struct AggregatorHandle {
    view: watch::Receiver<ContextView>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AggregatorHandle {
    pub fn subscribe(&self) -> watch::Receiver<ContextView> {
        self.view.clone()
    }

    pub fn current(&self) -> Context {
        self.view.borrow().current.clone()
    }

    pub fn history(&self) -> Vec<Context> {
        self.view.borrow().history.clone()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.handle
            .await
            .context("aggregation task failed to join")
    }
}

struct AggregationRunner {
    aggregator: ContextAggregator,
    window: ActivityWindow,
    state: ContextState,
    in_flight: bool,
    deferred: bool,
    view_tx: watch::Sender<ContextView>,
}

async fn aggregation_loop(
    mut runner: AggregationRunner,
    mut activities: mpsc::UnboundedReceiver<Activity>,
    cancel: CancellationToken,
) {
    let period = runner.aggregator.config.recompute_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Option<Synthesized>>();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                runner.finish(&mut activities, &mut done_rx).await;
                log::info!("context aggregation shutting down");
                break;
            }
            maybe_activity = activities.recv() => {
                let Some(activity) = maybe_activity else {
                    runner.finish(&mut activities, &mut done_rx).await;
                    log::info!("activity stream closed; context aggregation stopping");
                    break;
                };
                runner.on_activity(activity, &done_tx);
            }
            _ = ticker.tick() => {
                runner.trigger(&done_tx);
            }
            Some(done) = done_rx.recv() => {
                runner.on_synthesized(done, &done_tx).await;
            }
        }
    }
}

impl AggregationRunner {
    fn on_activity(&mut self, activity: Activity, done_tx: &mpsc::UnboundedSender<Option<Synthesized>>) {
        if let Some(evicted) = self.window.push(activity) {
            log::debug!("activity window full; evicted {}", evicted.id);
        }
        if self.window.since_recompute() >= self.aggregator.config.trigger_threshold {
            self.trigger(done_tx);
        }
    }

    /// Snapshot the window and synthesize it off the async runtime. Only one
    /// synthesis runs at a time; a trigger that arrives meanwhile is deferred.
    fn trigger(&mut self, done_tx: &mpsc::UnboundedSender<Option<Synthesized>>) {
        if self.window.is_empty() {
            return;
        }
        if self.in_flight {
            self.deferred = true;
            return;
        }

        let snapshot = self.window.take();
        self.in_flight = true;

        let analyzer = Arc::clone(&self.aggregator.analyzer);
        let config = self.aggregator.config.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || run_synthesis(snapshot, analyzer, config))
                    .await;

            let outcome = match result {
                Ok(synthesized) => Some(synthesized),
                Err(err) => {
                    log::error!("context synthesis worker failed: {err}");
                    None
                }
            };
            let _ = done_tx.send(outcome);
        });
    }

    async fn on_synthesized(
        &mut self,
        done: Option<Synthesized>,
        done_tx: &mpsc::UnboundedSender<Option<Synthesized>>,
    ) {
        self.in_flight = false;
        if let Some(synthesized) = done {
            self.apply(synthesized).await;
        }

        if std::mem::take(&mut self.deferred) {
            self.trigger(done_tx);
        }
    }

    /// Drain queued activities, wait for any in-flight synthesis and turn
    /// what is left in the window into a final context.
    async fn finish(
        &mut self,
        activities: &mut mpsc::UnboundedReceiver<Activity>,
        done_rx: &mut mpsc::UnboundedReceiver<Option<Synthesized>>,
    ) {
        while let Ok(activity) = activities.try_recv() {
            if let Some(evicted) = self.window.push(activity) {
                log::debug!("activity window full; evicted {}", evicted.id);
            }
        }

        if std::mem::take(&mut self.in_flight) {
            if let Some(Some(synthesized)) = done_rx.recv().await {
                self.apply(synthesized).await;
            }
        }
        self.deferred = false;

        if self.window.is_empty() {
            return;
        }
        let snapshot = self.window.take();
        let analyzer = Arc::clone(&self.aggregator.analyzer);
        let config = self.aggregator.config.clone();
        match tokio::task::spawn_blocking(move || run_synthesis(snapshot, analyzer, config)).await {
            Ok(synthesized) => self.apply(synthesized).await,
            Err(err) => log::error!("final context synthesis failed: {err}"),
        }
    }

    async fn apply(&mut self, synthesized: Synthesized) {
        let keyword_count = synthesized.context.keywords.len();
        let candidate = synthesized.context.clone();
        let significant = self
            .state
            .consider(synthesized.context, self.aggregator.config.significance_threshold);

        if significant {
            log::info!(
                "context updated: main app {:?}, {} keywords",
                candidate.main_application,
                keyword_count
            );
            self.view_tx.send_replace(self.state.view());
            self.persist(candidate);
        } else {
            log::debug!("context {} not significant; discarded", candidate.id);
        }

        self.aggregator
            .metrics
            .record_synthesis(SynthesisMetrics {
                timestamp: Utc::now(),
                activity_count: synthesized.activity_count,
                keyword_count,
                duration_ms: synthesized.duration_ms,
                significant,
            })
            .await;
    }

    /// Fire-and-forget: a failed write never rolls back the in-memory swap.
    fn persist(&self, context: Context) {
        let Some(store) = self.aggregator.store.clone() else {
            return;
        };
        let metrics = self.aggregator.metrics.clone();
        tokio::spawn(async move {
            let id = context.id;
            match tokio::task::spawn_blocking(move || store.save(&context)).await {
                Ok(Ok(path)) => log::debug!("persisted context {id} to {}", path.display()),
                Ok(Err(err)) => {
                    log::error!("failed to persist context {id}: {err}");
                    metrics.record_save_failure().await;
                }
                Err(err) => {
                    log::error!("context save worker failed for {id}: {err}");
                    metrics.record_save_failure().await;
                }
            }
        });
    }
}
