//! Serial fallback transport
//!
//! In serial deployments the bus is consumed by [`SerialBridge`] instead of
//! the report processor: every event becomes one 4-byte frame.
//!
//! ```text
//! [source or axis id][value high][value low][0xFF]
//! ```
//!
//! Button frames carry the button code (bit 7 set on release) and the fixed
//! value 0x0064. Axis frames carry the axis id (pot 0, fsr 6) and the signed
//! 16-bit value; a force release carries 0.

use crate::controller::bus::{BusConsumer, BusItem};
use crate::controller::events::{AxisEvent, ButtonEvent, Edge};
use crate::transport::TransportError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const FRAME_LEN: usize = 4;
pub const FRAME_TERMINATOR: u8 = 0xFF;
pub const RELEASE_FLAG: u8 = 0x80;
pub const BUTTON_FRAME_VALUE: i16 = 0x0064;

/// Decoded serial frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFrame {
    pub source: u8,
    pub value: i16,
}

impl SerialFrame {
    pub fn from_button(event: &ButtonEvent) -> Self {
        let source = match event.edge {
            Edge::Pressed => event.code,
            Edge::Released => event.code | RELEASE_FLAG,
        };
        Self {
            source,
            value: BUTTON_FRAME_VALUE,
        }
    }

    pub fn from_axis(event: &AxisEvent) -> Self {
        Self {
            source: event.axis().wire_id(),
            value: event.wire_value(),
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let [high, low] = self.value.to_be_bytes();
        [self.source, high, low, FRAME_TERMINATOR]
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, TransportError> {
        let frame: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| {
            TransportError::InvalidFrame(format!(
                "expected {} bytes, got {}",
                FRAME_LEN,
                bytes.len()
            ))
        })?;
        if frame[3] != FRAME_TERMINATOR {
            return Err(TransportError::InvalidFrame(format!(
                "bad terminator 0x{:02X}",
                frame[3]
            )));
        }
        Ok(Self {
            source: frame[0],
            value: i16::from_be_bytes([frame[1], frame[2]]),
        })
    }

    /// True for a button release frame
    pub fn is_release(&self) -> bool {
        self.source & RELEASE_FLAG != 0
    }
}

impl From<&BusItem> for SerialFrame {
    fn from(item: &BusItem) -> Self {
        match item {
            BusItem::Button(event) => SerialFrame::from_button(event),
            BusItem::Axis(event) => SerialFrame::from_axis(event),
        }
    }
}

/// Forwards bus events to a byte stream, one frame per event
pub struct SerialBridge<W> {
    bus: BusConsumer,
    writer: W,
    frames_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> SerialBridge<W> {
    pub fn new(bus: BusConsumer, writer: W) -> Self {
        Self {
            bus,
            writer,
            frames_written: 0,
        }
    }

    /// Runs until every producer is gone or `cancel` fires; returns the writer
    pub async fn run(mut self, cancel: CancellationToken) -> Result<W, TransportError> {
        info!("Serial bridge started");
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = self.bus.recv() => item,
            };
            let Some(item) = item else {
                info!("Event bus closed, serial bridge stopping");
                break;
            };

            let frame = SerialFrame::from(&item);
            self.writer.write_all(&frame.encode()).await?;
            self.writer.flush().await?;
            self.frames_written += 1;
            debug!("Serial frame {:?} for {:?}", frame.encode(), item);
        }
        info!("Serial bridge wrote {} frames", self.frames_written);
        Ok(self.writer)
    }
}
