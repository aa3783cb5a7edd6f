use crate::config::Config;
use crate::controller::bus::{BusConsumer, Drained};
use crate::controller::scheduler::{ReportScheduler, SchedulerSettings};
use crate::controller::state::{ButtonMap, CanonicalInputState, StateAggregator};
use crate::mapping::{MappingStrategy, OutputReport};
use crate::transport::ConnectionEvent;
use chrono::Local;
use statum::{machine, state, transition};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Event batch for the processing state
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Drained,
    pub link_events: Vec<ConnectionEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.link_events.is_empty()
    }
}

// Processor settings
#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    pub processing_interval_ms: u64,
    pub stats_interval_s: u64,
    pub scheduler: SchedulerSettings,
}

impl ProcessorSettings {
    pub fn from_config(config: &Config) -> Self {
        let timing = &config.timing;
        Self {
            processing_interval_ms: timing.tick_ms,
            stats_interval_s: timing.stats_interval_s,
            scheduler: SchedulerSettings {
                keepalive: Duration::from_millis(timing.keepalive_ms),
                min_gap: Duration::from_millis(timing.min_report_gap_ms),
                media_release: Duration::from_millis(timing.media_release_ms),
            },
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            processing_interval_ms: 10,
            stats_interval_s: 30,
            scheduler: SchedulerSettings::default(),
        }
    }
}

// Processor errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Failed to initialize processor: {0}")]
    InitializationError(String),

    #[error("Event bus closed, all producers are gone")]
    EventBusClosed,

    #[error("Report channel closed, transport is gone")]
    ReportChannelClosed,
}

/// Counters for one stats window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub cycles: u64,
    pub events: u64,
    pub reports: u64,
    pub media_reports: u64,
    pub retries: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum ProcessingState {
    Waiting,
    Processing(EventBatch),
    Updating,
}

#[machine]
#[derive(Debug)]
pub struct EventProcessor<ProcessingState> {
    bus: BusConsumer,
    link_receiver: mpsc::Receiver<ConnectionEvent>,
    report_sender: mpsc::Sender<OutputReport>,
    aggregator: StateAggregator,
    strategy: Box<dyn MappingStrategy>,
    scheduler: ReportScheduler,
    settings: ProcessorSettings,
    stats: ProcessorStats,
    link_closed: bool,
}

impl<S: ProcessingStateTrait> EventProcessor<S> {
    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn state(&self) -> &CanonicalInputState {
        self.aggregator.state()
    }

    pub fn scheduler(&self) -> &ReportScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ProcessorStats::default();
    }
}

impl EventProcessor<Waiting> {
    pub fn create(
        bus: BusConsumer,
        link_receiver: mpsc::Receiver<ConnectionEvent>,
        report_sender: mpsc::Sender<OutputReport>,
        button_map: ButtonMap,
        strategy: Box<dyn MappingStrategy>,
        settings: Option<ProcessorSettings>,
    ) -> Result<Self, ProcessorError> {
        let settings = settings.unwrap_or_default();
        info!("Creating Event Processor with settings: {:?}", settings);

        if settings.processing_interval_ms == 0 {
            return Err(ProcessorError::InitializationError(
                "processing interval must be non-zero".to_string(),
            ));
        }
        if button_map.codes().is_empty() {
            return Err(ProcessorError::InitializationError(
                "button map is empty".to_string(),
            ));
        }

        debug!(
            "Profile {} with {} buttons",
            strategy.profile(),
            button_map.codes().len()
        );
        let scheduler = ReportScheduler::new(settings.scheduler.clone());
        Ok(Self::builder()
            .bus(bus)
            .link_receiver(link_receiver)
            .report_sender(report_sender)
            .aggregator(StateAggregator::new(button_map))
            .strategy(strategy)
            .scheduler(scheduler)
            .settings(settings)
            .stats(ProcessorStats::default())
            .link_closed(false)
            .build())
    }
}

#[transition]
impl EventProcessor<Waiting> {

    /// Takes everything pending on the bus and the link channel, without waiting
    pub fn collect(mut self) -> Result<EventProcessor<Processing>, ProcessorError> {
        let mut link_events = Vec::new();
        while !self.link_closed {
            match self.link_receiver.try_recv() {
                Ok(event) => link_events.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!("Connection event channel closed, link state is frozen");
                    self.link_closed = true;
                }
            }
        }

        let events = self.bus.try_drain();
        if events.closed && events.is_empty() {
            error!("Event bus disconnected!");
            return Err(ProcessorError::EventBusClosed);
        }
        if !events.is_empty() {
            debug!(
                "Collected {} button and {} axis events",
                events.buttons.len(),
                events.axes.len()
            );
        }

        Ok(self.transition_with(EventBatch {
            events,
            link_events,
        }))
    }
}

#[transition]
impl EventProcessor<Processing> {
    /// Applies link notifications, then button events, then axis events
    pub fn process_events(mut self) -> Result<EventProcessor<Updating>, ProcessorError> {
        let batch = match Some(&self.state_data) {
            Some(batch) => batch.clone(),
            None => {
                warn!("No event batch found in state data");
                EventBatch::default()
            }
        };

        for event in &batch.link_events {
            info!(
                "Link {} at {}",
                event,
                Local::now().format("%H:%M:%S.%3f")
            );
            self.scheduler.on_connection(event);
        }

        let applied = self
            .aggregator
            .apply_batch(&batch.events, self.strategy.as_ref());
        self.stats.events += applied as u64;

        if !self.scheduler.is_connected() && self.aggregator.has_pending_media() {
            let dropped = self.aggregator.discard_media();
            info!("Dropped {} media commands, no host connected", dropped);
        }

        Ok(self.transition())
    }
}

#[transition]
impl EventProcessor<Updating> {
    /// Sends whatever reports are due and returns to `Waiting`
    pub fn update_state(mut self) -> Result<EventProcessor<Waiting>, ProcessorError> {
        let now = Instant::now();
        self.stats.cycles += 1;

        if self.scheduler.is_connected() {
            self.send_media(now)?;
        }

        if self
            .scheduler
            .should_emit(now, self.aggregator.is_dirty())
        {
            let report = self.strategy.map(self.aggregator.state());
            match self.report_sender.try_send(report) {
                Ok(()) => {
                    debug!("Sent {}", report);
                    self.scheduler.record_emit(now);
                    self.aggregator.clear_dirty();
                    self.stats.reports += 1;
                }
                Err(TrySendError::Full(_)) => {
                    debug!("Report channel full, retrying next tick");
                    self.stats.retries += 1;
                }
                Err(TrySendError::Closed(_)) => return Err(ProcessorError::ReportChannelClosed),
            }
        }

        Ok(self.transition())
    }
}

impl EventProcessor<Updating> {
    fn send_media(&mut self, now: Instant) -> Result<(), ProcessorError> {
        if self.scheduler.media_release_due(now) {
            if let Some(release) = self.strategy.media_report(None) {
                match self.report_sender.try_send(release) {
                    Ok(()) => {
                        debug!("Sent media release {}", release);
                        self.scheduler.clear_media_release();
                        self.stats.media_reports += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        debug!("Report channel full, media release retried next tick");
                    }
                    Err(TrySendError::Closed(_)) => {
                        return Err(ProcessorError::ReportChannelClosed)
                    }
                }
            } else {
                self.scheduler.clear_media_release();
            }
        }

        // a newer command replaces anything still queued
        let mut latest = None;
        while let Some(command) = self.aggregator.take_media() {
            latest = Some(command);
        }
        let Some(command) = latest else {
            return Ok(());
        };
        let Some(press) = self.strategy.media_report(Some(command)) else {
            return Ok(());
        };

        match self.report_sender.try_send(press) {
            Ok(()) => {
                debug!("Sent media press {:?} {}", command, press);
                self.scheduler.arm_media_release(now);
                self.stats.media_reports += 1;
            }
            Err(TrySendError::Full(_)) => {
                debug!("Report channel full, media command {:?} retried next tick", command);
                self.aggregator.requeue_media(command);
                self.stats.retries += 1;
            }
            Err(TrySendError::Closed(_)) => return Err(ProcessorError::ReportChannelClosed),
        }
        Ok(())
    }
}

// Public interface for spawning and running the processor
pub struct ProcessorHandle {
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    pub fn spawn(
        processor: EventProcessor<Waiting>,
        cancel: CancellationToken,
    ) -> Result<Self, ProcessorError> {
        info!("Spawning Event Processor task");
        let task = tokio::spawn(async move {
            info!("Event Processor task started");
            match run_processor_loop(processor, cancel).await {
                Ok(()) => info!("Event Processor task finished"),
                Err(e) => error!("Processor task terminated with error: {}", e),
            }
        });
        Ok(Self { task })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Processor task panicked: {}", e);
        }
    }
}

// Run the processor loop
async fn run_processor_loop(
    mut processor: EventProcessor<Waiting>,
    cancel: CancellationToken,
) -> Result<(), ProcessorError> {
    let settings = processor.settings().clone();
    info!(
        "Starting processor loop with {}ms interval",
        settings.processing_interval_ms
    );

    let mut interval_timer =
        tokio::time::interval(Duration::from_millis(settings.processing_interval_ms));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(settings.stats_interval_s as i64);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Event Processor cancelled");
                return Ok(());
            }
            _ = interval_timer.tick() => {}
        }

        let processing = processor.collect()?;
        let updating = processing.process_events()?;
        processor = updating.update_state()?;

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let stats = processor.stats();
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            info!(
                "Processor stats: {} cycles, {} events, {} reports ({} media, {} retried) in {} seconds",
                stats.cycles,
                stats.events,
                stats.reports,
                stats.media_reports,
                stats.retries,
                elapsed_seconds
            );
            info!(
                "Average: {:.2} reports/sec, {:.2} events/sec",
                stats.reports as f64 / elapsed_seconds as f64,
                stats.events as f64 / elapsed_seconds as f64
            );
            processor.reset_stats();
            last_stats_time = now;
        }
    }
}
