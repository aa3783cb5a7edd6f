//! Input producer tasks
//!
//! One task per button line plus one per analog axis. Every task samples
//! its input on a fixed cadence, runs it through its detector and pushes
//! the resulting events onto the [`bus`](crate::controller::bus). Producers
//! never drop events: a full queue stalls the task until the processor
//! catches up.

use crate::config::{ButtonLine, Config};
use crate::controller::bus::{BusError, BusProducer};
use crate::controller::conditioner::{Curve, SignalConditioner};
use crate::controller::detector::{
    ButtonDebouncer, FsrDetector, FsrStep, PotDetector, PotMode, SettlePolicy,
};
use crate::controller::events::{AxisEvent, ButtonEvent};
use crate::controller::sample_source::SampleSource;
use crate::controller::state::MAX_BUTTONS;
use chrono::Local;
use statum::{machine, state, transition};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub buttons: Vec<ButtonLine>,
    pub active_low: bool,
    pub debounce_samples: u8,
    pub button_poll: Duration,

    pub fsr_channel: u8,
    pub fsr_floor: u16,
    pub fsr_poll: Duration,
    pub fsr_settle: Duration,
    pub settle_policy: SettlePolicy,

    pub pot_channel: u8,
    pub pot_poll: Duration,
    pub pot_mode: PotMode,

    pub stats_interval: Duration,
}

impl CollectorSettings {
    pub fn from_config(config: &Config) -> Self {
        let timing = &config.timing;
        Self {
            buttons: config.buttons.clone(),
            active_low: config.detector.active_low,
            debounce_samples: config.detector.debounce_samples,
            button_poll: Duration::from_millis(timing.button_poll_ms),
            fsr_channel: config.analog.fsr_channel,
            fsr_floor: config.analog.fsr_floor,
            fsr_poll: Duration::from_millis(timing.fsr_poll_ms),
            fsr_settle: Duration::from_millis(timing.fsr_settle_ms),
            settle_policy: config.detector.fsr_settle_policy,
            pot_channel: config.analog.pot_channel,
            pot_poll: Duration::from_millis(timing.pot_poll_ms),
            pot_mode: config.detector.pot_mode(config.profile),
            stats_interval: Duration::from_secs(timing.stats_interval_s),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(#[from] BusError),
}

/// Event counters shared by all producer tasks
#[derive(Debug, Default)]
pub struct CollectorStats {
    button_events: AtomicU64,
    axis_events: AtomicU64,
    fsr_settles: AtomicU64,
}

impl CollectorStats {
    pub fn button_events(&self) -> u64 {
        self.button_events.load(Ordering::Relaxed)
    }

    pub fn axis_events(&self) -> u64 {
        self.axis_events.load(Ordering::Relaxed)
    }

    pub fn fsr_settles(&self) -> u64 {
        self.fsr_settles.load(Ordering::Relaxed)
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<CollectionState> {
    source: Arc<dyn SampleSource>,
    producer: BusProducer,
    settings: CollectorSettings,
    stats: Arc<CollectorStats>,
}

impl<S: CollectionStateTrait> EventCollector<S> {
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn stats(&self) -> Arc<CollectorStats> {
        self.stats.clone()
    }
}

impl EventCollector<Initializing> {
    pub fn create(
        source: Arc<dyn SampleSource>,
        producer: BusProducer,
        settings: Option<CollectorSettings>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);
        Ok(Self::builder()
            .source(source)
            .producer(producer)
            .settings(settings)
            .stats(Arc::new(CollectorStats::default()))
            .build())
    }
}

#[transition]
impl EventCollector<Initializing> {

    /// Checks the wiring and transitions to `Collecting`
    pub fn initialize(self) -> Result<EventCollector<Collecting>, CollectorError> {
        let buttons = &self.settings.buttons;
        if buttons.is_empty() || buttons.len() > MAX_BUTTONS {
            return Err(CollectorError::InitializationError(format!(
                "expected 1 to {} buttons, got {}",
                MAX_BUTTONS,
                buttons.len()
            )));
        }
        if self.settings.fsr_channel == self.settings.pot_channel {
            return Err(CollectorError::InitializationError(format!(
                "force sensor and potentiometer share ADC channel {}",
                self.settings.fsr_channel
            )));
        }

        info!("Event Collector wiring:");
        for button in buttons {
            let level = self.source.read_level(button.line);
            debug!(
                "  line {:>2} -> code 0x{:02X} (level {})",
                button.line,
                button.code,
                if level { "high" } else { "low" }
            );
        }
        info!(
            "  {} buttons ({}), fsr on ADC{}, pot on ADC{} ({:?})",
            buttons.len(),
            if self.settings.active_low {
                "active low"
            } else {
                "active high"
            },
            self.settings.fsr_channel,
            self.settings.pot_channel,
            self.settings.pot_mode
        );

        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    /// Spawns every producer task; they stop when `cancel` fires
    pub fn spawn_tasks(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(self.settings.buttons.len() + 3);

        for &button in &self.settings.buttons {
            let task = ButtonTask {
                button,
                active_low: self.settings.active_low,
                debouncer: ButtonDebouncer::new(self.settings.debounce_samples),
                poll: self.settings.button_poll,
            };
            tasks.push(spawn_producer(
                format!("button line {}", button.line),
                task.run(
                    self.source.clone(),
                    self.producer.clone(),
                    self.stats.clone(),
                    cancel.clone(),
                ),
            ));
        }

        let fsr = FsrTask {
            channel: self.settings.fsr_channel,
            conditioner: SignalConditioner::new(Curve::Force {
                floor: self.settings.fsr_floor,
            }),
            detector: FsrDetector::new(self.settings.settle_policy),
            poll: self.settings.fsr_poll,
            settle: self.settings.fsr_settle,
        };
        tasks.push(spawn_producer(
            "force sensor".to_string(),
            fsr.run(
                self.source.clone(),
                self.producer.clone(),
                self.stats.clone(),
                cancel.clone(),
            ),
        ));

        let pot = PotTask {
            channel: self.settings.pot_channel,
            conditioner: SignalConditioner::new(Curve::Potentiometer),
            detector: PotDetector::new(self.settings.pot_mode),
            poll: self.settings.pot_poll,
        };
        tasks.push(spawn_producer(
            "potentiometer".to_string(),
            pot.run(
                self.source.clone(),
                self.producer.clone(),
                self.stats.clone(),
                cancel.clone(),
            ),
        ));

        tasks.push(tokio::spawn(log_stats(
            self.stats.clone(),
            self.settings.stats_interval,
            cancel,
        )));

        info!("Spawned {} collector tasks", tasks.len());
        tasks
    }
}

fn spawn_producer<F>(name: String, task: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = Result<(), CollectorError>> + Send + 'static,
{
    tokio::spawn(async move {
        debug!("Producer task for {} started", name);
        match task.await {
            Ok(()) => debug!("Producer task for {} stopped", name),
            Err(e) => error!("Producer task for {} terminated with error: {}", name, e),
        }
    })
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

struct ButtonTask {
    button: ButtonLine,
    active_low: bool,
    debouncer: ButtonDebouncer,
    poll: Duration,
}

impl ButtonTask {
    async fn run(
        mut self,
        source: Arc<dyn SampleSource>,
        producer: BusProducer,
        stats: Arc<CollectorStats>,
        cancel: CancellationToken,
    ) -> Result<(), CollectorError> {
        let mut ticker = ticker(self.poll);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let level = source.read_level(self.button.line);
            let pressed = level != self.active_low;
            let Some(edge) = self.debouncer.update(pressed) else {
                continue;
            };

            let event = ButtonEvent {
                code: self.button.code,
                edge,
            };
            debug!(
                "Button 0x{:02X} {:?} at {}",
                event.code,
                edge,
                Local::now().format("%H:%M:%S.%3f")
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = producer.send_button(event) => sent?,
            }
            stats.button_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

struct FsrTask {
    channel: u8,
    conditioner: SignalConditioner,
    detector: FsrDetector,
    poll: Duration,
    settle: Duration,
}

impl FsrTask {
    async fn run(
        mut self,
        source: Arc<dyn SampleSource>,
        producer: BusProducer,
        stats: Arc<CollectorStats>,
        cancel: CancellationToken,
    ) -> Result<(), CollectorError> {
        let mut ticker = ticker(self.poll);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let value = self.conditioner.push_unsigned(source.read_adc(self.channel));
            let event = match self.detector.sample(value) {
                FsrStep::Idle => None,
                FsrStep::Emit(event) => Some(event),
                FsrStep::BeginSettle => {
                    debug!("Force rising ({}), settling for {:?}", value, self.settle);
                    stats.fsr_settles.fetch_add(1, Ordering::Relaxed);
                    let Some(settled) = self.wait_settle(source.as_ref(), &cancel).await else {
                        return Ok(());
                    };
                    self.detector.settle(settled)
                }
            };

            if let Some(event) = event {
                send_axis(&producer, event, &stats, &cancel).await?;
            }
        }
    }

    /// Keeps sampling through the settle window; returns the last
    /// conditioned value, or `None` when cancelled
    async fn wait_settle(
        &mut self,
        source: &dyn SampleSource,
        cancel: &CancellationToken,
    ) -> Option<u8> {
        let deadline = Instant::now() + self.settle;
        let mut settled = None;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let step = self.poll.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = sleep(step) => {}
            }
            settled = Some(self.conditioner.push_unsigned(source.read_adc(self.channel)));
        }
        Some(settled.unwrap_or_else(|| {
            self.conditioner
                .push_unsigned(source.read_adc(self.channel))
        }))
    }
}

struct PotTask {
    channel: u8,
    conditioner: SignalConditioner,
    detector: PotDetector,
    poll: Duration,
}

impl PotTask {
    async fn run(
        mut self,
        source: Arc<dyn SampleSource>,
        producer: BusProducer,
        stats: Arc<CollectorStats>,
        cancel: CancellationToken,
    ) -> Result<(), CollectorError> {
        let mut ticker = ticker(self.poll);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let value = self.conditioner.push_unsigned(source.read_adc(self.channel));
            if let Some(event) = self.detector.sample(value) {
                send_axis(&producer, event, &stats, &cancel).await?;
            }
        }
    }
}

async fn send_axis(
    producer: &BusProducer,
    event: AxisEvent,
    stats: &CollectorStats,
    cancel: &CancellationToken,
) -> Result<(), CollectorError> {
    debug!("Axis event: {}", event);
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        sent = producer.send_axis(event) => sent?,
    }
    stats.axis_events.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

async fn log_stats(stats: Arc<CollectorStats>, every: Duration, cancel: CancellationToken) {
    let mut ticker = ticker(every);
    // the first tick completes immediately
    ticker.tick().await;
    let mut last = (0, 0);
    let mut last_time = Local::now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let now = Local::now();
        let current = (stats.button_events(), stats.axis_events());
        info!(
            "Collector stats at {}: {} button events, {} axis events in {} seconds ({} fsr settles total)",
            now.format("%H:%M:%S.%3f"),
            current.0 - last.0,
            current.1 - last.1,
            (now - last_time).num_seconds(),
            stats.fsr_settles()
        );
        last = current;
        last_time = now;
    }
}

/// Handle of the running producer tasks
pub struct CollectorHandle {
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<CollectorStats>,
}

impl CollectorHandle {
    pub fn spawn(
        source: Arc<dyn SampleSource>,
        producer: BusProducer,
        settings: Option<CollectorSettings>,
        cancel: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);
        let collector = EventCollector::create(source, producer, settings)?;
        let collecting = collector.initialize()?;
        let stats = collecting.stats();
        let tasks = collecting.spawn_tasks(cancel);
        info!("Event Collector successfully started");
        Ok(Self { tasks, stats })
    }

    pub fn stats(&self) -> Arc<CollectorStats> {
        self.stats.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|task| task.is_finished())
    }

    /// Waits for every producer task to stop
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Collector task panicked: {}", e);
            }
        }
    }
}
