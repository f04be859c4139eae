//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Setup (setup.rs):
//!     Resolve config → Strip extensions → Apply → Optional listener
//!
//! Shutdown (shutdown.rs):
//!     stop() / handle dropped → Stop accepting → Wait for connections → Exit
//! ```
//!
//! # Design Decisions
//! - Extensions are acted on only after the engine accepted the document
//! - Shutdown has timeout: the accept task is aborted after the deadline

pub mod setup;
pub mod shutdown;

pub use setup::{setup_logging, setup_logging_with, LoggingSetup, SetupError, SetupHooks};
pub use shutdown::Shutdown;
