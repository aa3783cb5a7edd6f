//! Controller Handle - lifecycle of the input pipeline
//!
//! Builds the event bus from the configuration, spawns the producer tasks
//! and the consumer that drains the bus. Two deployments are supported:
//!
//! ```text
//! HID:    Collector ─[bus]→ Processor ─[OutputReport]→ transport task
//! Serial: Collector ─[bus]→ SerialBridge ─[4-byte frames]→ AsyncWrite
//! ```
//!
//! All tasks share one [`CancellationToken`]; [`ControllerHandle::shutdown`]
//! cancels it and waits for every task to stop.

use crate::config::{Config, ConfigError};
use crate::controller::bus;
use crate::controller::sample_source::SampleSource;
use crate::controller::state::ButtonMap;
use crate::mapping::{MappingError, OutputReport};
use crate::transport::serial::SerialBridge;
use crate::transport::{ConnectionEvent, TransportError};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use super::event_collector::{
    CollectorError, CollectorHandle, CollectorSettings, CollectorStats,
};
pub use super::event_processor::{
    EventProcessor, ProcessorError, ProcessorHandle, ProcessorSettings,
};

/// Errors that can occur while starting the pipeline
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    #[error("Processor error: {0}")]
    ProcessorError(#[from] ProcessorError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Mapping error: {0}")]
    MappingError(#[from] MappingError),

    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
}

enum Consumer {
    Processor(ProcessorHandle),
    Serial(JoinHandle<()>),
}

/// Handle for the running pipeline
pub struct ControllerHandle {
    cancel: CancellationToken,
    collector: CollectorHandle,
    consumer: Consumer,
}

impl ControllerHandle {
    /// Spawns collector and processor for the HID deployment
    ///
    /// `link_events` carries connection notifications from the transport;
    /// finished reports are pushed into `reports`. Nothing is emitted until
    /// the first [`ConnectionEvent::Connected`].
    pub fn spawn(
        config: &Config,
        source: Arc<dyn SampleSource>,
        link_events: mpsc::Receiver<ConnectionEvent>,
        reports: mpsc::Sender<OutputReport>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing controller, profile {}", config.profile);
        config.validate()?;
        let strategy = config.profile.create_strategy(config.keymap.clone())?;

        let (producer, consumer) = bus::channel(config.bus.queue_depth);
        debug!("Created event bus with depth {}", config.bus.queue_depth);

        let processor = EventProcessor::create(
            consumer,
            link_events,
            reports,
            ButtonMap::new(config.button_codes()),
            strategy,
            Some(ProcessorSettings::from_config(config)),
        )?;

        let cancel = CancellationToken::new();
        let collector = CollectorHandle::spawn(
            source,
            producer,
            Some(CollectorSettings::from_config(config)),
            cancel.child_token(),
        )?;
        let processor = ProcessorHandle::spawn(processor, cancel.child_token())?;

        info!("Controller system initialized successfully");
        Ok(Self {
            cancel,
            collector,
            consumer: Consumer::Processor(processor),
        })
    }

    /// Spawns the collector and a serial bridge writing frames to `writer`
    pub fn spawn_serial<W>(
        config: &Config,
        source: Arc<dyn SampleSource>,
        writer: W,
    ) -> Result<Self, ControllerError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("Initializing controller for serial output");
        config.validate()?;

        let (producer, consumer) = bus::channel(config.bus.queue_depth);
        let cancel = CancellationToken::new();
        let collector = CollectorHandle::spawn(
            source,
            producer,
            Some(CollectorSettings::from_config(config)),
            cancel.child_token(),
        )?;

        let bridge = SerialBridge::new(consumer, writer);
        let bridge_cancel = cancel.child_token();
        let task = tokio::spawn(async move {
            if let Err(e) = bridge.run(bridge_cancel).await {
                error!("Serial bridge terminated with error: {}", e);
            }
        });

        info!("Controller system initialized for serial output");
        Ok(Self {
            cancel,
            collector,
            consumer: Consumer::Serial(task),
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn collector_stats(&self) -> Arc<CollectorStats> {
        self.collector.stats()
    }

    /// True while the consumer side (processor or bridge) is alive
    pub fn is_running(&self) -> bool {
        match &self.consumer {
            Consumer::Processor(handle) => !handle.is_finished(),
            Consumer::Serial(task) => !task.is_finished(),
        }
    }

    /// Cancels every task and waits for them to finish
    pub async fn shutdown(self) {
        info!("Shutting down controller");
        self.cancel.cancel();
        self.collector.join().await;
        match self.consumer {
            Consumer::Processor(handle) => handle.join().await,
            Consumer::Serial(task) => {
                if let Err(e) = task.await {
                    error!("Serial bridge task panicked: {}", e);
                }
            }
        }
        info!("Controller stopped");
    }
}
