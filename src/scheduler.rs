// bucket_ingestor/src/scheduler.rs
// Fixed-interval runner that never lets two cycles overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{IngestorError, Result};

/// Cooperative stop flag handed to every cycle.
#[derive(Debug, Clone,)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool,>,
}

impl ShutdownSignal {
    /// A signal that is never triggered, for one-off runs.
    pub fn never() -> Self {
        let (_tx, rx,) = watch::channel(false,);
        Self { rx, }
    }

    pub fn is_triggered(&self,) -> bool {
        *self.rx.borrow()
    }
}

impl From<watch::Receiver<bool,>,> for ShutdownSignal {
    fn from(rx: watch::Receiver<bool,>,) -> Self {
        Self { rx, }
    }
}

/// Work the scheduler runs on every tick.
#[async_trait]
pub trait CycleJob: Send + Sync + 'static {
    async fn run(&self, shutdown: ShutdownSignal,);
}

#[derive(Debug, Default,)]
pub struct SchedulerStats {
    ticks:          AtomicU64,
    cycles_started: AtomicU64,
    ticks_skipped:  AtomicU64,
}

impl SchedulerStats {
    pub fn ticks(&self,) -> u64 {
        self.ticks.load(Ordering::SeqCst,)
    }

    pub fn cycles_started(&self,) -> u64 {
        self.cycles_started.load(Ordering::SeqCst,)
    }

    pub fn ticks_skipped(&self,) -> u64 {
        self.ticks_skipped.load(Ordering::SeqCst,)
    }
}

/// Running scheduler. Obtained from [`Scheduler::start`]; call [`Scheduler::stop`]
/// to wait for the in-flight cycle. Dropping it only requests shutdown.
pub struct Scheduler {
    shutdown:  watch::Sender<bool,>,
    ticker:    Option<JoinHandle<(),>,>,
    in_flight: Arc<Mutex<Option<JoinHandle<(),>,>,>,>,
    stats:     Arc<SchedulerStats,>,
}

impl Scheduler {
    /// Starts ticking immediately and then every `interval`.
    pub fn start<J: CycleJob,>(interval: Duration, job: Arc<J,>,) -> Result<Self,> {
        if interval.is_zero() {
            return Err(IngestorError::ConfigurationError(
                "Scheduler interval must be greater than zero".to_string(),
            ),);
        }

        let (shutdown, shutdown_rx,) = watch::channel(false,);
        let in_flight = Arc::new(Mutex::new(None,),);
        let stats = Arc::new(SchedulerStats::default(),);

        let ticker = tokio::spawn(tick_loop(
            interval,
            job,
            shutdown_rx,
            Arc::clone(&in_flight,),
            Arc::clone(&stats,),
        ),);

        info!("Scheduler started with interval {:?}", interval);
        Ok(Scheduler {
            shutdown,
            ticker: Some(ticker,),
            in_flight,
            stats,
        },)
    }

    pub fn stats(&self,) -> Arc<SchedulerStats,> {
        Arc::clone(&self.stats,)
    }

    /// Stops the timer and waits for the running cycle, if any, to finish.
    pub async fn stop(mut self,) {
        let _ = self.shutdown.send(true,);

        if let Some(ticker,) = self.ticker.take() {
            if let Err(e,) = ticker.await {
                error!("Scheduler tick loop panicked: {}", e);
            }
        }

        let running = self.in_flight.lock().await.take();
        if let Some(handle,) = running {
            info!("Waiting for in-flight cycle to finish");
            if let Err(e,) = handle.await {
                error!("Cycle task panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self,) {
        let _ = self.shutdown.send(true,);
    }
}

async fn tick_loop<J: CycleJob,>(
    period: Duration,
    job: Arc<J,>,
    mut shutdown_rx: watch::Receiver<bool,>,
    in_flight: Arc<Mutex<Option<JoinHandle<(),>,>,>,>,
    stats: Arc<SchedulerStats,>,
) {
    let mut interval = tokio::time::interval(period,);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip,);

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                stats.ticks.fetch_add(1, Ordering::SeqCst,);

                let mut slot = in_flight.lock().await;
                if slot.as_ref().is_some_and(|h| !h.is_finished(),) {
                    stats.ticks_skipped.fetch_add(1, Ordering::SeqCst,);
                    debug!("Previous cycle still running, skipping tick");
                    continue;
                }
                if let Some(finished,) = slot.take() {
                    if let Err(e,) = finished.await {
                        error!("Cycle task panicked: {}", e);
                    }
                }

                stats.cycles_started.fetch_add(1, Ordering::SeqCst,);
                let job = Arc::clone(&job,);
                let signal = ShutdownSignal::from(shutdown_rx.clone(),);
                *slot = Some(tokio::spawn(async move { job.run(signal,).await },),);
            }
        }
    }
    debug!("Scheduler tick loop exited");
}
