//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! sender.rs (resolve → guard → serialize)
//!     → codec.rs (u32 big-endian length prefix + JSON payload)
//!     → TCP
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (in-flight tracking for stop)
//!     → codec.rs (bounded frame read)
//!     → engine apply
//! ```
//!
//! # Design Decisions
//! - One document per connection; the connection closes after it
//! - Declared lengths are checked against a cap before anything is read
//! - Malformed input only ever affects its own connection

pub mod codec;
pub mod connection;
pub mod listener;
pub mod sender;

pub use listener::{ConfigListener, ListenerError, ListenerHandle, VerifyFn};
pub use sender::{ConfigSender, Delivery, PreparedConfig, SendError, SendOptions};
