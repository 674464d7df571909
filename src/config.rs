//! Session configuration.
//!
//! Every tunable has a constant default. The structs derive serde so an
//! embedding application can keep them in its own settings file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::DEFAULT_OBSERVER_CAPACITY;
use crate::liveness::LivenessConfig;
use crate::protocol::{ByteOrder, DEFAULT_MAX_FRAME_SIZE};
use crate::writer::WriterConfig;

/// Default size of the reader's scratch buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default delay between status polls while provisioning Wi-Fi.
pub const DEFAULT_PROVISION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for the device to join the network.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to run one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Byte order for lengths and sensor values, both directions.
    pub byte_order: ByteOrder,
    /// Largest accepted frame, SOP to EOP.
    pub max_frame_size: usize,
    /// Bytes requested from the transport per read.
    pub read_buffer_size: usize,
    /// Messages buffered per observer before the oldest are dropped.
    pub observer_capacity: usize,
    pub writer: WriterConfig,
    /// `None` disables status checks.
    pub liveness: Option<LivenessConfig>,
    pub provision_poll_interval: Duration,
    pub provision_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            writer: WriterConfig::default(),
            liveness: Some(LivenessConfig::default()),
            provision_poll_interval: DEFAULT_PROVISION_POLL_INTERVAL,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }
}
