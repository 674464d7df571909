//! Transport module - byte streams the session can run over.
//!
//! Any `AsyncRead + AsyncWrite` stream works: a TCP socket, a Bluetooth
//! RFCOMM socket supplied by the platform layer, or `tokio::io::duplex` in
//! tests.

mod tcp;

use tokio::io::{AsyncRead, AsyncWrite};

pub use tcp::{connect_tcp, DEFAULT_CONNECT_TIMEOUT};

/// A connected, bidirectional byte stream.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
