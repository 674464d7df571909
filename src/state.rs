//! Observable connection state.
//!
//! A [`ConnectionContext`] is created by the caller, shared through an `Arc`
//! between the session tasks and the application, and publishes every
//! change through `tokio::sync::watch` so observers can await transitions
//! instead of polling.

use std::fmt;

use tokio::sync::watch;

/// Transport-level connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// Transport open but the device has not answered recently.
    Connecting,
    Connected,
}

/// Progress of the current status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessState {
    #[default]
    NoResponse,
    PingSent,
    AwaitingResponse,
    ResponseReceived,
}

/// Shared, observable state for one device connection.
pub struct ConnectionContext {
    status: watch::Sender<ConnectionStatus>,
    liveness: watch::Sender<LivenessState>,
    device_wifi: watch::Sender<Option<bool>>,
}

impl ConnectionContext {
    /// Create a context in the disconnected state.
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (liveness, _) = watch::channel(LivenessState::default());
        let (device_wifi, _) = watch::channel(None);
        Self {
            status,
            liveness,
            device_wifi,
        }
    }

    /// Current connection status.
    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Publish a new connection status. Returns the previous one.
    pub fn set_status(&self, status: ConnectionStatus) -> ConnectionStatus {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!("Connection status {:?} -> {:?}", previous, status);
        }
        previous
    }

    /// Subscribe to connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Current liveness state.
    #[inline]
    pub fn liveness(&self) -> LivenessState {
        *self.liveness.borrow()
    }

    /// Publish a new liveness state.
    pub fn set_liveness(&self, state: LivenessState) {
        self.liveness.send_replace(state);
    }

    /// Move liveness from `from` to `to`, leaving any other state alone.
    ///
    /// Returns whether the transition happened.
    pub fn advance_liveness(&self, from: LivenessState, to: LivenessState) -> bool {
        self.liveness.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Subscribe to liveness changes.
    pub fn subscribe_liveness(&self) -> watch::Receiver<LivenessState> {
        self.liveness.subscribe()
    }

    /// Wi-Fi state last reported by the device, if any.
    #[inline]
    pub fn device_wifi(&self) -> Option<bool> {
        *self.device_wifi.borrow()
    }

    /// Record the device's reported Wi-Fi state.
    pub fn set_device_wifi(&self, connected: bool) {
        self.device_wifi.send_replace(Some(connected));
    }

    /// Subscribe to Wi-Fi state reports.
    pub fn subscribe_device_wifi(&self) -> watch::Receiver<Option<bool>> {
        self.device_wifi.subscribe()
    }

    /// Return to the initial state after a teardown.
    pub fn mark_disconnected(&self) {
        self.set_status(ConnectionStatus::Disconnected);
        self.set_liveness(LivenessState::NoResponse);
        self.device_wifi.send_replace(None);
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("status", &self.status())
            .field("liveness", &self.liveness())
            .field("device_wifi", &self.device_wifi())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let ctx = ConnectionContext::new();
        assert_eq!(ctx.status(), ConnectionStatus::Disconnected);
        assert_eq!(ctx.liveness(), LivenessState::NoResponse);
        assert_eq!(ctx.device_wifi(), None);
    }

    #[test]
    fn test_set_status_returns_previous() {
        let ctx = ConnectionContext::new();
        assert_eq!(
            ctx.set_status(ConnectionStatus::Connected),
            ConnectionStatus::Disconnected
        );
        assert_eq!(ctx.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_mark_disconnected_resets_everything() {
        let ctx = ConnectionContext::new();
        ctx.set_status(ConnectionStatus::Connected);
        ctx.set_liveness(LivenessState::ResponseReceived);
        ctx.set_device_wifi(true);

        ctx.mark_disconnected();

        assert_eq!(ctx.status(), ConnectionStatus::Disconnected);
        assert_eq!(ctx.liveness(), LivenessState::NoResponse);
        assert_eq!(ctx.device_wifi(), None);
    }

    #[test]
    fn test_advance_liveness_only_from_expected_state() {
        let ctx = ConnectionContext::new();
        ctx.set_liveness(LivenessState::PingSent);
        assert!(ctx.advance_liveness(LivenessState::PingSent, LivenessState::AwaitingResponse));
        assert_eq!(ctx.liveness(), LivenessState::AwaitingResponse);

        // A reply landed first; it must stay.
        ctx.set_liveness(LivenessState::ResponseReceived);
        assert!(!ctx.advance_liveness(LivenessState::PingSent, LivenessState::AwaitingResponse));
        assert_eq!(ctx.liveness(), LivenessState::ResponseReceived);
    }

    #[tokio::test]
    async fn test_liveness_subscription_sees_change() {
        let ctx = ConnectionContext::new();
        let mut rx = ctx.subscribe_liveness();

        ctx.set_liveness(LivenessState::ResponseReceived);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), LivenessState::ResponseReceived);
    }

    #[tokio::test]
    async fn test_status_subscription_without_receivers() {
        // Publishing with nobody listening must not fail.
        let ctx = ConnectionContext::new();
        ctx.set_status(ConnectionStatus::Connecting);
        let rx = ctx.subscribe_status();
        assert_eq!(*rx.borrow(), ConnectionStatus::Connecting);
    }
}
