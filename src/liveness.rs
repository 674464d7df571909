//! Periodic status checks against the device.
//!
//! The task queues a status request, then waits for the dispatcher to flip
//! the liveness state to `ResponseReceived`. A device that stays silent for
//! `max_retries` consecutive checks after the first failure is declared
//! lost, and the task returns so the session can tear the connection down.
//!
//! ```text
//! ┌──────────┐ queue request ┌──────────┐ queued ┌──────────────────┐
//! │NoResponse├──────────────►│ PingSent ├───────►│ AwaitingResponse │
//! └──────────┘               └──────────┘        └────────┬─────────┘
//!      ▲ timeout                                          │ status response
//!      └──────────────────────────────────────────────────┤
//!                                                ┌────────▼─────────┐
//!                                                │ ResponseReceived │
//!                                                └──────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{LinkError, Result};
use crate::protocol::MessageBuilder;
use crate::state::{ConnectionContext, ConnectionStatus, LivenessState};
use crate::writer::WriterHandle;

/// Default delay between successful checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default time to wait for a status response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after a failed check.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Liveness check tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Delay between successful checks.
    pub interval: Duration,
    /// How long to wait for each response.
    pub response_timeout: Duration,
    /// Failed checks tolerated before disconnecting.
    pub max_retries: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECK_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Send one status request and wait for the answer.
///
/// Returns `Ok(false)` on timeout. Fails only if the writer is gone.
pub async fn check_once(
    context: &ConnectionContext,
    writer: &WriterHandle,
    builder: &MessageBuilder,
    timeout: Duration,
) -> Result<bool> {
    let mut liveness = context.subscribe_liveness();

    context.set_liveness(LivenessState::PingSent);
    writer.send(builder.status_request()).await?;
    // A reply dispatched while the request was being queued must survive.
    context.advance_liveness(LivenessState::PingSent, LivenessState::AwaitingResponse);

    let answered = tokio::time::timeout(timeout, wait_for_response(&mut liveness)).await;
    match answered {
        Ok(true) => Ok(true),
        Ok(false) => Err(LinkError::ConnectionClosed),
        Err(_) => {
            context.set_liveness(LivenessState::NoResponse);
            Ok(false)
        }
    }
}

/// Resolve once liveness reads `ResponseReceived`. `false` if the context
/// was dropped.
async fn wait_for_response(liveness: &mut watch::Receiver<LivenessState>) -> bool {
    loop {
        if *liveness.borrow_and_update() == LivenessState::ResponseReceived {
            return true;
        }
        if liveness.changed().await.is_err() {
            return false;
        }
    }
}

/// Run status checks until the device is lost or `shutdown` fires.
///
/// # Errors
///
/// `LinkError::LivenessLost` when the retry budget is exhausted, or the
/// writer's error if the outbound queue closes.
pub async fn run_liveness(
    context: Arc<ConnectionContext>,
    writer: WriterHandle,
    builder: MessageBuilder,
    config: LivenessConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut retries = 0u32;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let check = check_once(&context, &writer, &builder, config.response_timeout);
        let alive = tokio::select! {
            result = check => result?,
            _ = shutdown.changed() => return Ok(()),
        };

        // The reader may have torn the connection down while we waited.
        if *shutdown.borrow() {
            return Ok(());
        }

        if alive {
            if retries > 0 {
                tracing::info!("Device answered after {} retries", retries);
            }
            retries = 0;
            context.set_status(ConnectionStatus::Connected);

            tokio::select! {
                _ = tokio::time::sleep(config.interval) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        } else if retries < config.max_retries {
            retries += 1;
            tracing::warn!(
                "No status response within {:?}, retry {}/{}",
                config.response_timeout,
                retries,
                config.max_retries
            );
            context.set_status(ConnectionStatus::Connecting);
        } else {
            let attempts = retries + 1;
            tracing::error!("Device unresponsive after {} status checks", attempts);
            return Err(LinkError::LivenessLost { attempts });
        }
    }
}
