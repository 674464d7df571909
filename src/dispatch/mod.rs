//! Dispatch module - routing decoded messages.
//!
//! Provides:
//! - [`Dispatcher`] - unwraps frames and routes messages by id
//! - [`ReadingObserver`] - application-side receiver that decodes sensor values
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use plantmon_link::dispatch::{Dispatch, Dispatcher};
//! use plantmon_link::protocol::{ByteOrder, MessageBuilder};
//! use plantmon_link::state::{ConnectionContext, LivenessState};
//!
//! let ctx = Arc::new(ConnectionContext::new());
//! let dispatcher = Dispatcher::new(ctx.clone(), ByteOrder::BigEndian, 16);
//!
//! let wire = MessageBuilder::default().frame(5, &[1]);
//! assert_eq!(dispatcher.dispatch_frame(&wire).unwrap(), Dispatch::Liveness);
//! assert_eq!(ctx.liveness(), LivenessState::ResponseReceived);
//! ```

mod dispatcher;
mod observer;

pub use dispatcher::{Dispatch, Dispatcher, DEFAULT_OBSERVER_CAPACITY};
pub use observer::ReadingObserver;
