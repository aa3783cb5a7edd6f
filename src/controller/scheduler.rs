//! Report emission scheduling
//!
//! # State Machine
//!
//! ```text
//!              Connected
//! NotConnected ─────────► Connected ──┐ dirty && gap >= min_gap
//!      ▲                      │       │ or idle > keep-alive
//!      └──────────────────────┘ ◄─────┘
//!   Disconnected / ConnectFailed
//! ```
//!
//! Entering `Connected` forces one emission of the full state on the next
//! tick, regardless of the dirty flag and the minimum gap. A media command
//! still pressed when the link dropped is released as part of that resync.

use crate::transport::ConnectionEvent;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    NotConnected,
    Connected,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Emit at least this often while connected
    pub keepalive: Duration,
    /// Minimum spacing between two state-driven emissions
    pub min_gap: Duration,
    /// Time a media command stays pressed
    pub media_release: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_millis(100),
            min_gap: Duration::from_millis(10),
            media_release: Duration::from_millis(50),
        }
    }
}

#[derive(Debug)]
pub struct ReportScheduler {
    link: LinkState,
    last_emit: Option<Instant>,
    resync: bool,
    media_release_at: Option<Instant>,
    media_resync: bool,
    settings: SchedulerSettings,
}

impl ReportScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            link: LinkState::NotConnected,
            last_emit: None,
            resync: false,
            media_release_at: None,
            media_resync: false,
            settings,
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Applies a connection notification from the transport
    pub fn on_connection(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                info!("Host connected, full state resync scheduled");
                self.link = LinkState::Connected;
                self.resync = true;
                self.media_resync = self.media_release_at.is_some();
            }
            ConnectionEvent::Disconnected => {
                info!("Host disconnected, emission suspended");
                self.enter_not_connected();
            }
            ConnectionEvent::ConnectFailed(reason) => {
                warn!("Connection failed: {}", reason);
                self.enter_not_connected();
            }
        }
    }

    fn enter_not_connected(&mut self) {
        self.link = LinkState::NotConnected;
        self.resync = false;
    }

    /// Whether the primary report is due at `now`
    pub fn should_emit(&self, now: Instant, dirty: bool) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.resync {
            return true;
        }
        match self.last_emit {
            None => true,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                (dirty && elapsed >= self.settings.min_gap) || elapsed > self.settings.keepalive
            }
        }
    }

    pub fn record_emit(&mut self, now: Instant) {
        self.last_emit = Some(now);
        self.resync = false;
    }

    pub fn last_emit(&self) -> Option<Instant> {
        self.last_emit
    }

    /// Starts (or restarts) the auto-release window of a media command
    pub fn arm_media_release(&mut self, now: Instant) {
        self.media_release_at = Some(now + self.settings.media_release);
        self.media_resync = false;
    }

    /// A pressed media command survives a disconnect and is released right
    /// after the next `Connected`
    pub fn media_release_due(&self, now: Instant) -> bool {
        self.media_release_at
            .is_some_and(|deadline| self.media_resync || now >= deadline)
    }

    pub fn media_pending(&self) -> bool {
        self.media_release_at.is_some()
    }

    pub fn clear_media_release(&mut self) {
        self.media_release_at = None;
        self.media_resync = false;
    }
}
