//! Controller subsystem: from raw samples to host reports
//!
//! 1. [`sample_source`] - raw GPIO levels and ADC samples
//! 2. [`event_collector`] - per-input producer tasks (conditioning, detection)
//! 3. [`bus`] - bounded button and axis queues
//! 4. [`event_processor`] - canonical state, mapping, report scheduling
//! 5. [`controller_handle`] - unified API and lifecycle management
//!
//! # Architecture
//!
//! ```text
//! SampleSource ──► Collector tasks ──► [buttons] ──┐
//!   (levels,       (debounce, fsr      [axes]    ──┴─► Processor ──► OutputReport
//!    adc)           settle, pot)                       (10ms tick)
//! ```
//!
//! Reports are only produced while the host link is up; the canonical state
//! keeps accumulating while it is down.

pub mod bus;
pub mod conditioner;
pub mod controller_handle;
pub mod detector;
pub mod event_collector;
pub mod event_processor;
pub mod events;
pub mod sample_source;
pub mod scheduler;
pub mod state;

pub use controller_handle::{ControllerError, ControllerHandle};
