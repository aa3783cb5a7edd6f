//! Event bus between input producers and the event processor
//!
//! Two independent bounded queues, one for button events and one for axis
//! events. Producers block when a queue is full; the single consumer only
//! ever polls.
//!
//! ```text
//! button tasks ──► [buttons: mpsc(depth)] ──┐
//!                                           ├──► EventProcessor (try_recv)
//! axis tasks   ──► [axes:    mpsc(depth)] ──┘
//! ```

use crate::controller::events::{AxisEvent, ButtonEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Smallest queue depth the bus accepts
pub const MIN_QUEUE_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Event bus closed: {0}")]
    Closed(&'static str),
}

/// Cloneable producer side of the bus
#[derive(Debug, Clone)]
pub struct BusProducer {
    buttons: mpsc::Sender<ButtonEvent>,
    axes: mpsc::Sender<AxisEvent>,
}

/// Consumer side of the bus, owned by exactly one task
#[derive(Debug)]
pub struct BusConsumer {
    buttons: mpsc::Receiver<ButtonEvent>,
    axes: mpsc::Receiver<AxisEvent>,
}

/// Events taken from the bus in one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drained {
    pub buttons: Vec<ButtonEvent>,
    pub axes: Vec<AxisEvent>,
    /// Set once every producer of a queue has gone away
    pub closed: bool,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && self.axes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buttons.len() + self.axes.len()
    }
}

/// Creates both queues with the same depth (at least [`MIN_QUEUE_DEPTH`])
pub fn channel(depth: usize) -> (BusProducer, BusConsumer) {
    let depth = depth.max(MIN_QUEUE_DEPTH);
    let (button_tx, button_rx) = mpsc::channel(depth);
    let (axis_tx, axis_rx) = mpsc::channel(depth);
    debug!("Created event bus with queue depth {}", depth);
    (
        BusProducer {
            buttons: button_tx,
            axes: axis_tx,
        },
        BusConsumer {
            buttons: button_rx,
            axes: axis_rx,
        },
    )
}

impl BusProducer {
    /// Queues a button event, waiting while the queue is full
    pub async fn send_button(&self, event: ButtonEvent) -> Result<(), BusError> {
        self.buttons
            .send(event)
            .await
            .map_err(|_| BusError::Closed("buttons"))
    }

    /// Queues an axis event, waiting while the queue is full
    pub async fn send_axis(&self, event: AxisEvent) -> Result<(), BusError> {
        self.axes
            .send(event)
            .await
            .map_err(|_| BusError::Closed("axes"))
    }

    /// Free slots left in the button queue
    pub fn button_capacity(&self) -> usize {
        self.buttons.capacity()
    }

    pub fn axis_capacity(&self) -> usize {
        self.axes.capacity()
    }
}

impl BusConsumer {
    /// Takes everything currently queued without waiting
    ///
    /// Returns immediately when both queues are empty. Within each queue the
    /// order is FIFO; the two queues are returned separately so the caller
    /// decides the cross-queue order.
    pub fn try_drain(&mut self) -> Drained {
        let mut drained = Drained::default();

        loop {
            match self.buttons.try_recv() {
                Ok(event) => drained.buttons.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    drained.closed = true;
                    break;
                }
            }
        }

        loop {
            match self.axes.try_recv() {
                Ok(event) => drained.axes.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    drained.closed = true;
                    break;
                }
            }
        }

        drained
    }

    /// Waits for the next event of either queue, buttons first when both are ready
    ///
    /// Used by consumers that forward events one by one (the serial bridge).
    pub async fn recv(&mut self) -> Option<BusItem> {
        tokio::select! {
            biased;
            Some(event) = self.buttons.recv() => Some(BusItem::Button(event)),
            Some(event) = self.axes.recv() => Some(BusItem::Axis(event)),
            else => None,
        }
    }
}

/// Single event taken from either queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusItem {
    Button(ButtonEvent),
    Axis(AxisEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::FsrLevel;
    use std::time::Duration;

    #[tokio::test]
    async fn drain_returns_immediately_when_empty() {
        let (_producer, mut consumer) = channel(10);
        let drained = consumer.try_drain();
        assert!(drained.is_empty());
        assert!(!drained.closed);
    }

    #[tokio::test]
    async fn drain_preserves_fifo_per_queue() {
        let (producer, mut consumer) = channel(10);
        producer.send_button(ButtonEvent::pressed(1)).await.unwrap();
        producer
            .send_axis(AxisEvent::Pot { value: 4 })
            .await
            .unwrap();
        producer.send_button(ButtonEvent::released(1)).await.unwrap();

        let drained = consumer.try_drain();
        assert_eq!(
            drained.buttons,
            vec![ButtonEvent::pressed(1), ButtonEvent::released(1)]
        );
        assert_eq!(drained.axes, vec![AxisEvent::Pot { value: 4 }]);
        assert_eq!(drained.len(), 3);
    }

    #[tokio::test]
    async fn depth_is_never_below_minimum() {
        let (producer, _consumer) = channel(2);
        assert_eq!(producer.button_capacity(), MIN_QUEUE_DEPTH);
        assert_eq!(producer.axis_capacity(), MIN_QUEUE_DEPTH);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_stalls_the_producer_instead_of_dropping() {
        let (producer, mut consumer) = channel(MIN_QUEUE_DEPTH);
        for code in 0..MIN_QUEUE_DEPTH as u8 {
            producer.send_button(ButtonEvent::pressed(code)).await.unwrap();
        }

        let blocked = producer.clone();
        let pending = tokio::spawn(async move {
            blocked.send_button(ButtonEvent::pressed(0x42)).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        let first = consumer.try_drain();
        assert_eq!(first.buttons.len(), MIN_QUEUE_DEPTH);

        pending.await.unwrap().unwrap();
        let second = consumer.try_drain();
        assert_eq!(second.buttons, vec![ButtonEvent::pressed(0x42)]);
    }

    #[tokio::test]
    async fn recv_prefers_buttons() {
        let (producer, mut consumer) = channel(10);
        producer
            .send_axis(AxisEvent::ForceReleased {
                level: FsrLevel::Light,
            })
            .await
            .unwrap();
        producer.send_button(ButtonEvent::pressed(3)).await.unwrap();

        assert_eq!(
            consumer.recv().await,
            Some(BusItem::Button(ButtonEvent::pressed(3)))
        );
        assert_eq!(
            consumer.recv().await,
            Some(BusItem::Axis(AxisEvent::ForceReleased {
                level: FsrLevel::Light
            }))
        );

        drop(producer);
        assert_eq!(consumer.recv().await, None);
    }

    #[tokio::test]
    async fn closed_bus_is_reported() {
        let (producer, mut consumer) = channel(10);
        drop(producer);
        assert!(consumer.try_drain().closed);
    }
}
