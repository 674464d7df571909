//! # plantmon-link
//!
//! Client side of the plant-monitor device link.
//!
//! Messages travel over an unreliable byte stream (Bluetooth RFCOMM, BLE
//! notifications or TCP) as byte-stuffed frames delimited by SOP `0x7E` and
//! EOP `0x7F`, protected by a two's-complement checksum.
//!
//! ## Architecture
//!
//! - **Protocol** (pure): stuffing, framing, checksum, message layout and
//!   the streaming [`FrameBuffer`](protocol::FrameBuffer)
//! - **Dispatch**: routes decoded messages to liveness state or observers
//! - **Session**: one reader, one writer and one liveness task per
//!   connection, with shared state in a [`ConnectionContext`]
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use plantmon_link::transport::{connect_tcp, DEFAULT_CONNECT_TIMEOUT};
//! use plantmon_link::{ConnectionContext, Session};
//!
//! #[tokio::main]
//! async fn main() -> plantmon_link::Result<()> {
//!     let stream = connect_tcp("192.168.4.1:8080", DEFAULT_CONNECT_TIMEOUT).await?;
//!     let context = Arc::new(ConnectionContext::new());
//!     let mut session = Session::builder().start(stream, context);
//!
//!     if session.provision_wifi("greenhouse", "secret").await? {
//!         println!("device online");
//!     }
//!
//!     session.wait_for_shutdown().await
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod writer;

pub use config::LinkConfig;
pub use dispatch::{Dispatch, Dispatcher, ReadingObserver};
pub use error::{LinkError, Result};
pub use session::{Session, SessionBuilder};
pub use state::{ConnectionContext, ConnectionStatus, LivenessState};
