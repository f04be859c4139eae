//! Bridge from `tracing` events into a [`LoggingEngine`].
//!
//! Every event becomes a [`Record`]: the target (with `::` turned into `.`)
//! is the logger name, the `message` field is the message, and any other
//! fields are appended as `key=value`.

use std::fmt::{self, Write};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Layer;

use crate::config::schema::Level;
use crate::engine::{LoggingEngine, Record};

/// `tracing_subscriber` layer that forwards events to the engine.
pub struct EngineLayer {
    engine: Arc<dyn LoggingEngine>,
}

impl EngineLayer {
    pub fn new(engine: Arc<dyn LoggingEngine>) -> Self {
        Self { engine }
    }
}

impl<S: Subscriber> Layer<S> for EngineLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = Record::new(
            logger_name(metadata.target()),
            level_of(metadata.level()),
            visitor.finish(),
        );
        self.engine.emit(record);
    }
}

/// Install the engine as the global `tracing` subscriber.
pub fn init_tracing(engine: Arc<dyn LoggingEngine>) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EngineLayer::new(engine))
        .try_init()
}

/// `my_crate::net::listener` → `my_crate.net.listener`.
pub fn logger_name(target: &str) -> String {
    target.replace("::", ".")
}

pub fn level_of(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::TRACE,
        tracing::Level::DEBUG => Level::DEBUG,
        tracing::Level::INFO => Level::INFO,
        tracing::Level::WARN => Level::WARNING,
        tracing::Level::ERROR => Level::ERROR,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
