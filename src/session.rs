//! Session builder and per-connection runtime.
//!
//! The [`SessionBuilder`] provides a fluent API for tuning the link. The
//! [`Session`] owns one connection:
//! 1. Split the transport into read and write halves
//! 2. Spawn the writer task on the write half
//! 3. Spawn the reader task: reassemble frames and dispatch them
//! 4. Spawn the liveness task (unless disabled)
//!
//! Any of explicit [`Session::shutdown`], dropping the session, transport
//! EOF, a transport error or the liveness task giving up stops all three
//! tasks. The reader then discards its partial frame and marks the
//! context disconnected.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use plantmon_link::state::ConnectionContext;
//! use plantmon_link::transport::connect_tcp;
//! use plantmon_link::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = connect_tcp("192.168.4.1:8080", Duration::from_secs(5)).await?;
//!     let context = Arc::new(ConnectionContext::new());
//!
//!     let mut session = Session::builder().start(stream, context);
//!     let mut readings = session.observer();
//!
//!     while let Some(reading) = readings.next_reading().await {
//!         println!("{:?} {:?}: {}", reading.sensor, reading.kind, reading.value.as_f64());
//!     }
//!
//!     session.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::LinkConfig;
use crate::dispatch::{Dispatcher, ReadingObserver};
use crate::error::{LinkError, Result};
use crate::liveness::{run_liveness, LivenessConfig};
use crate::protocol::{ByteOrder, FrameBuffer, Message, MessageBuilder};
use crate::state::{ConnectionContext, ConnectionStatus, LivenessState};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for configuring and starting a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: LinkConfig,
}

impl SessionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Byte order for both directions.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.byte_order = order;
        self
    }

    /// Largest accepted frame.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Bytes requested from the transport per read.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Messages buffered per observer.
    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.config.observer_capacity = capacity;
        self
    }

    /// Set maximum pending frames before backpressure.
    pub fn max_pending_frames(mut self, max: usize) -> Self {
        self.config.writer.max_pending_frames = max;
        self
    }

    /// Set the outbound channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set backpressure timeout.
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Tune status checks.
    pub fn liveness(mut self, config: LivenessConfig) -> Self {
        self.config.liveness = Some(config);
        self
    }

    /// Run without periodic status checks.
    pub fn without_liveness(mut self) -> Self {
        self.config.liveness = None;
        self
    }

    /// Timing of [`Session::provision_wifi`].
    pub fn provisioning(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.config.provision_poll_interval = poll_interval;
        self.config.provision_timeout = timeout;
        self
    }

    /// Start a session over a connected transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<T: Transport>(self, transport: T, context: Arc<ConnectionContext>) -> Session {
        Session::start(transport, context, self.config)
    }
}

/// A running device session.
///
/// Dropping the session stops its tasks.
pub struct Session {
    context: Arc<ConnectionContext>,
    writer: WriterHandle,
    builder: MessageBuilder,
    /// Cleared by the reader task on exit, so observers see the channel
    /// close when the connection ends.
    observers: Arc<Mutex<Option<broadcast::Sender<Message>>>>,
    shutdown: Arc<watch::Sender<bool>>,
    provision_poll_interval: Duration,
    provision_timeout: Duration,
    reader_task: Option<JoinHandle<Result<()>>>,
    writer_task: Option<JoinHandle<Result<()>>>,
    liveness_task: Option<JoinHandle<Result<()>>>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    fn start<T: Transport>(
        transport: T,
        context: Arc<ConnectionContext>,
        config: LinkConfig,
    ) -> Self {
        let (reader, write_half) = tokio::io::split(transport);

        let (stop, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(stop);

        let builder = MessageBuilder::new(config.byte_order);
        let (tx, _) = broadcast::channel(config.observer_capacity.max(1));
        let dispatcher = Dispatcher::with_sender(context.clone(), config.byte_order, tx.clone());
        let observers = Arc::new(Mutex::new(Some(tx)));

        context.set_liveness(LivenessState::NoResponse);
        context.set_status(ConnectionStatus::Connected);
        tracing::info!("Session started");

        let (writer, writer_task) =
            spawn_writer_task(write_half, config.writer.clone(), shutdown_rx.clone());

        let reader_task = {
            let context = context.clone();
            let shutdown = shutdown.clone();
            let observers = observers.clone();
            let frame_buffer = FrameBuffer::with_max_frame_size(config.max_frame_size);
            let reading = read_loop(
                reader,
                dispatcher,
                frame_buffer,
                config.read_buffer_size,
                shutdown_rx.clone(),
            );
            tokio::spawn(async move {
                let result = reading.await;
                match &result {
                    Ok(()) => tracing::info!("Connection closed"),
                    Err(e) => tracing::error!("Read loop error: {}", e),
                }
                shutdown.send_replace(true);
                observers
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
                context.mark_disconnected();
                result
            })
        };

        let liveness_task = config.liveness.map(|liveness| {
            let check = run_liveness(
                context.clone(),
                writer.clone(),
                builder,
                liveness,
                shutdown_rx.clone(),
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let result = check.await;
                if let Err(e) = &result {
                    tracing::error!("Liveness task ended: {}", e);
                    shutdown.send_replace(true);
                }
                result
            })
        });

        Session {
            context,
            writer,
            builder,
            observers,
            shutdown,
            provision_poll_interval: config.provision_poll_interval,
            provision_timeout: config.provision_timeout,
            reader_task: Some(reader_task),
            writer_task: Some(writer_task),
            liveness_task,
        }
    }

    /// Subscribe to forwarded messages.
    ///
    /// The receiver sees only messages forwarded after this call and closes
    /// once the connection has ended.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        match self.sender().as_ref() {
            Some(tx) => tx.subscribe(),
            // Already torn down: hand out a receiver that is closed.
            None => broadcast::channel(1).1,
        }
    }

    /// Number of live subscribers.
    pub fn observer_count(&self) -> usize {
        self.sender().as_ref().map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self) -> std::sync::MutexGuard<'_, Option<broadcast::Sender<Message>>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe with sensor decoding in this session's byte order.
    pub fn observer(&self) -> ReadingObserver {
        ReadingObserver::new(self.subscribe(), self.builder.byte_order())
    }

    /// Shared connection state.
    #[inline]
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    /// Builder matching this session's byte order.
    #[inline]
    pub fn message_builder(&self) -> MessageBuilder {
        self.builder
    }

    /// Queue an already framed message.
    pub async fn send_frame(&self, frame: Bytes) -> Result<()> {
        self.writer.send(frame).await
    }

    /// Queue a Wi-Fi connect request.
    pub async fn send_wifi_credentials(&self, ssid: &str, password: &str) -> Result<()> {
        tracing::debug!("Sending Wi-Fi credentials for {:?}", ssid);
        self.writer.send(self.builder.wifi_connect(ssid, password)).await
    }

    /// Queue a status request.
    pub async fn request_status(&self) -> Result<()> {
        self.writer.send(self.builder.status_request()).await
    }

    /// Send credentials, then poll status until the device reports Wi-Fi.
    ///
    /// Only reports that arrive after the credentials were queued count.
    /// Returns `Ok(false)` if the device never reports a connection within
    /// the provisioning timeout.
    pub async fn provision_wifi(&self, ssid: &str, password: &str) -> Result<bool> {
        let mut reports = self.context.subscribe_device_wifi();
        self.send_wifi_credentials(ssid, password).await?;

        let deadline = Instant::now() + self.provision_timeout;
        loop {
            self.request_status().await?;

            let poll_until = (Instant::now() + self.provision_poll_interval).min(deadline);
            match tokio::time::timeout_at(poll_until, wait_for_wifi(&mut reports)).await {
                Ok(true) => {
                    tracing::info!("Device joined {:?}", ssid);
                    return Ok(true);
                }
                Ok(false) => return Err(LinkError::ConnectionClosed),
                Err(_) if Instant::now() >= deadline => {
                    tracing::warn!(
                        "Device did not join {:?} within {:?}",
                        ssid,
                        self.provision_timeout
                    );
                    return Ok(false);
                }
                Err(_) => {}
            }

            if *self.shutdown.borrow() {
                return Err(LinkError::ConnectionClosed);
            }
        }
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Whether the session has been torn down.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Ask every task to stop. Returns immediately.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::debug!("Shutdown requested");
        }
    }

    /// Wait until the session has been torn down.
    ///
    /// # Errors
    ///
    /// The transport error that ended the reader, or `LivenessLost` if the
    /// device stopped answering. A clean close or explicit shutdown is `Ok`.
    pub async fn wait_for_shutdown(&mut self) -> Result<()> {
        let read = join(self.reader_task.take()).await;
        let liveness = join(self.liveness_task.take()).await;
        if let Err(e) = join(self.writer_task.take()).await {
            tracing::debug!("Writer ended with error: {}", e);
        }
        read.and(liveness)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Await a task, treating a missing or panicked task as closed.
async fn join(task: Option<JoinHandle<Result<()>>>) -> Result<()> {
    match task {
        Some(task) => task.await.unwrap_or(Err(LinkError::ConnectionClosed)),
        None => Ok(()),
    }
}

/// Resolve with `true` on the next report that the device is on Wi-Fi.
async fn wait_for_wifi(reports: &mut watch::Receiver<Option<bool>>) -> bool {
    loop {
        if reports.changed().await.is_err() {
            return false;
        }
        if *reports.borrow_and_update() == Some(true) {
            return true;
        }
    }
}

/// Main read loop - reassembles frames and dispatches them in order.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    dispatcher: Dispatcher,
    mut frame_buffer: FrameBuffer,
    read_buffer_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut buf = vec![0u8; read_buffer_size.max(1)];

    loop {
        if *shutdown.borrow() {
            discard_partial(&mut frame_buffer);
            return Ok(());
        }

        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    discard_partial(&mut frame_buffer);
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    discard_partial(&mut frame_buffer);
                    return Err(LinkError::Io(e));
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    discard_partial(&mut frame_buffer);
                    return Ok(());
                }
                continue;
            }
        };

        for frame in frame_buffer.push(&buf[..n]) {
            match dispatcher.dispatch_frame(frame.as_bytes()) {
                Ok(outcome) => tracing::trace!("Dispatched frame: {:?}", outcome),
                Err(e) => tracing::warn!("Dropping frame of {} bytes: {}", frame.len(), e),
            }
        }
    }
}

fn discard_partial(frame_buffer: &mut FrameBuffer) {
    if !frame_buffer.is_empty() {
        tracing::debug!("Discarding {} bytes of partial frame", frame_buffer.len());
    }
    frame_buffer.reset();
}
