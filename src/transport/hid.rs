//! HID transport task
//!
//! Owns the receiving end of the report channel and hands every report to
//! a [`ReportSink`].

use crate::mapping::OutputReport;
use crate::transport::{ReportSink, TransportError};
use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Sink that only logs the reports it is given
#[derive(Debug, Default)]
pub struct LogSink {
    sent: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl ReportSink for LogSink {
    fn transmit(&mut self, report: &OutputReport) -> Result<(), TransportError> {
        self.sent += 1;
        info!(
            "HID report #{} at {}: {}",
            self.sent,
            Local::now().format("%H:%M:%S.%3f"),
            report
        );
        Ok(())
    }
}

/// Sink forwarding reports into a channel, for embedding and tests
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<OutputReport>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputReport>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ReportSink for ChannelSink {
    fn transmit(&mut self, report: &OutputReport) -> Result<(), TransportError> {
        self.sender
            .send(*report)
            .map_err(|e| TransportError::ChannelClosed(e.to_string()))
    }
}

/// Handle of the spawned transport task
pub struct HidTransport {
    task: JoinHandle<()>,
}

impl HidTransport {
    /// Spawns the transport task; it runs until the report channel closes
    /// or `cancel` fires
    pub fn spawn<S: ReportSink>(
        mut sink: S,
        mut reports: mpsc::Receiver<OutputReport>,
        cancel: CancellationToken,
    ) -> Self {
        info!("Spawning HID transport task");
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("HID transport cancelled");
                        break;
                    }
                    next = reports.recv() => {
                        let Some(report) = next else {
                            info!("Report channel closed, HID transport stopping");
                            break;
                        };
                        debug!("Transmitting {}", report);
                        if let Err(e) = sink.transmit(&report) {
                            error!("Failed to transmit report: {}", e);
                        }
                    }
                }
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("HID transport task panicked: {}", e);
        }
    }
}
