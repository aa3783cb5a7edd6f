//! Host-facing transports
//!
//! The radio link itself (pairing, descriptors, framing on air) lives
//! outside this crate. What the core needs from it is modelled here:
//!
//! - [`ReportSink`]: transmits one whole report at a time
//! - [`ConnectionEvent`]: link notifications driving the report scheduler
//!
//! [`serial`] provides the alternative wired deployment in which events are
//! framed and written straight to a serial port.

pub mod hid;
pub mod serial;

use crate::mapping::OutputReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection notification delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    ConnectFailed(String),
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connected => write!(f, "connected"),
            ConnectionEvent::Disconnected => write!(f, "disconnected"),
            ConnectionEvent::ConnectFailed(reason) => write!(f, "connect failed ({})", reason),
        }
    }
}

/// Which transport a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Reports over the HID link
    #[default]
    Hid,
    /// 4-byte event frames over a serial port
    Serial,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transmit failed: {0}")]
    Transmit(String),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Transmits whole reports to the host
pub trait ReportSink: Send + 'static {
    fn transmit(&mut self, report: &OutputReport) -> Result<(), TransportError>;
}
