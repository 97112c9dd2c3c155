use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::select;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::cpu::{output_cpu_stats, CpuStats};
use super::memory::{output_gc_stats, output_mem_stats};
use super::types::Fields;
use crate::config::{CollectorConfig, ConfigError};
use crate::runtime::{ProcessSource, RuntimeSource};

/// Callback invoked with every collected snapshot.
///
/// It runs while the collector holds its snapshot lock: a consumer that
/// blocks stalls sampling, and calling back into the same collector from
/// inside it deadlocks. Clone the snapshot to keep it past the call.
pub type Consumer = Box<dyn Fn(&Fields) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to build collector runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Periodically samples runtime statistics and hands them to a consumer.
pub struct Collector {
    config: CollectorConfig,
    done: Option<CancellationToken>,
    consumer: Consumer,
    source: Box<dyn RuntimeSource>,
    fields: Mutex<Fields>,
}

impl Collector {
    /// Collector over the current process with default configuration.
    pub fn new<F>(consumer: F) -> Self
    where
        F: Fn(&Fields) + Send + Sync + 'static,
    {
        Self::with_source(ProcessSource::new(), consumer)
    }

    /// Collector whose snapshots are only observable through [`Self::one_off`].
    pub fn without_consumer() -> Self {
        Self::new(|_: &Fields| {})
    }

    pub fn with_source<S, F>(source: S, consumer: F) -> Self
    where
        S: RuntimeSource + 'static,
        F: Fn(&Fields) + Send + Sync + 'static,
    {
        Self::from_parts(Box::new(source), Some(Box::new(consumer) as Consumer))
    }

    /// A missing consumer is replaced by a no-op.
    pub fn from_parts(source: Box<dyn RuntimeSource>, consumer: Option<Consumer>) -> Self {
        Collector {
            config: CollectorConfig::default(),
            done: None,
            consumer: consumer.unwrap_or_else(noop_consumer),
            source,
            fields: Mutex::new(Fields::default()),
        }
    }

    pub fn with_config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the signal that ends [`Self::run`].
    pub fn with_stop(mut self, done: CancellationToken) -> Self {
        self.done = Some(done);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CollectorConfig {
        &mut self.config
    }

    pub fn set_interval(&mut self, interval: Duration) -> Result<(), ConfigError> {
        self.config.set_interval(interval)
    }

    pub fn stop_token(&self) -> Option<&CancellationToken> {
        self.done.as_ref()
    }

    /// Collect once right away, then once per interval until the stop token
    /// is cancelled. Without a stop token this never returns.
    pub async fn run(&self) {
        let period = self.config.effective_interval();
        debug!(
            "runtime collector started: interval={:?} cpu={} memory={} gc={}",
            period,
            self.config.enable_cpu,
            self.config.enable_memory,
            self.config.gc_enabled()
        );

        self.output_stats();

        let mut tick = interval_at(first_tick(period), period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                _ = stopped(self.done.as_ref()) => {
                    debug!("runtime collector stopped");
                    return;
                }
                _ = tick.tick() => {
                    self.output_stats();
                }
            }
        }
    }

    /// Collect a single snapshot, hand it to the consumer, and return it.
    /// The internal snapshot is zeroed around the read, so categories that
    /// are disabled read as zero instead of carrying stale values.
    pub fn one_off(&self) -> Fields {
        let mut fields = self.fields.lock();
        *fields = Fields::default();
        self.collect(&mut fields);
        std::mem::take(&mut *fields)
    }

    fn output_stats(&self) {
        let mut fields = self.fields.lock();
        self.collect(&mut fields);
    }

    fn collect(&self, fields: &mut Fields) {
        if self.config.enable_cpu {
            let stats = CpuStats::read(&*self.source);
            output_cpu_stats(&stats, fields);
        }
        if self.config.enable_memory {
            let m = self.source.read_mem_stats();
            output_mem_stats(&m, fields);
            if self.config.enable_gc {
                output_gc_stats(&m, fields);
            }
        }
        trace!(
            "collected runtime stats: tasks={} heap_alloc={} num_gc={}",
            fields.num_tasks,
            fields.heap_alloc,
            fields.num_gc
        );

        (self.consumer)(fields);
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::without_consumer()
    }
}

// Intervals too long to add to the clock never tick again.
fn first_tick(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

fn noop_consumer() -> Consumer {
    Box::new(|_: &Fields| {})
}

async fn stopped(done: Option<&CancellationToken>) {
    match done {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Owns a collector running in the background. Dropping the handle stops
/// the run loop.
pub struct CollectorHandle {
    collector: Arc<Collector>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl CollectorHandle {
    /// Start `collector.run()` on the current tokio runtime, or on a
    /// dedicated one when called outside of a runtime. A stop token already
    /// installed on the collector still stops the loop.
    pub fn spawn(mut collector: Collector) -> Result<Self, CollectorError> {
        let cancel = match collector.done.as_ref() {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        collector.done = Some(cancel.clone());

        let collector = Arc::new(collector);
        let fut = {
            let collector = Arc::clone(&collector);
            async move { collector.run().await }
        };

        let (task, runtime) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => (handle.spawn(fut), None),
            Err(_) => {
                debug!("no tokio runtime in scope, starting a dedicated collector runtime");
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("runtime-collector")
                    .enable_all()
                    .build()
                    .map_err(CollectorError::Runtime)?;
                (runtime.spawn(fut), Some(runtime))
            }
        };

        Ok(CollectorHandle {
            collector,
            cancel,
            task: Some(task),
            runtime,
        })
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Shared reference for pulling snapshots from other threads or tasks.
    pub fn shared(&self) -> Arc<Collector> {
        Arc::clone(&self.collector)
    }

    pub fn one_off(&self) -> Fields {
        self.collector.one_off()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the run loop and wait for it to return. A panic inside the
    /// consumer surfaces here as the task's `JoinError`.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.map_err(|err| {
                warn!("runtime collector task failed: {}", err);
                err
            }),
            None => Ok(()),
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
