//! Client side of the configuration-update protocol.
//!
//! Fire-and-forget: the sender writes one frame on a fresh connection and
//! closes it. It cannot observe whether the document was applied, and it
//! never retries.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::loader::{resolve, ConfigError, ConfigSource};
use crate::config::schema::{ConfigDocument, DEFAULT_LISTEN_PORT};
use crate::config::validation::{is_destructive, validate_document, ReconfigurationGuard};
use crate::net::codec::{write_frame, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("could not deliver configuration to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("destructive configuration (incremental=false, disable_existing_loggers=true) was not confirmed")]
    DestructiveConfigRejected,
}

impl SendError {
    /// Short name of the error kind, for CLI messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SendError::Connection { .. } => "ConnectionError",
            SendError::Serialization(_) => "SerializationError",
            SendError::Config(ConfigError::Type(_)) => "ConfigTypeError",
            SendError::Config(_) => "ConfigFormatError",
            SendError::DestructiveConfigRejected => "DestructiveConfigRejected",
        }
    }
}

/// Per-send settings.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Explicit target port; wins over the document's `listen` key.
    pub port: Option<u16>,
    /// `incremental` value used when the document does not set one.
    pub incremental: bool,
    /// Ask the guard before sending destructive documents.
    pub require_confirmation: bool,
    /// The caller confirmed a destructive document.
    pub confirmed: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            port: None,
            incremental: true,
            require_confirmation: true,
            confirmed: false,
        }
    }
}

/// A resolved document together with its destination port.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedConfig {
    pub document: ConfigDocument,
    pub port: u16,
}

impl PreparedConfig {
    pub fn is_destructive(&self) -> bool {
        is_destructive(&self.document)
    }
}

/// What was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub peer: SocketAddr,
    pub bytes: usize,
}

/// Sends documents to a listener on `host`.
#[derive(Debug, Clone)]
pub struct ConfigSender {
    host: String,
    connect_timeout: Duration,
}

impl ConfigSender {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve, pick the port and fill in `incremental`.
    ///
    /// Port precedence: explicit > document `listen` > protocol default.
    pub fn prepare(
        &self,
        source: impl Into<ConfigSource>,
        options: &SendOptions,
    ) -> Result<PreparedConfig, SendError> {
        let mut document = resolve(source)?;
        let document_port = document.listen.take();
        let port = options.port.or(document_port).unwrap_or(DEFAULT_LISTEN_PORT);

        // Don't overwrite the full config unless asked to.
        document.incremental.get_or_insert(options.incremental);

        validate_document(&document).map_err(ConfigError::Validation)?;
        Ok(PreparedConfig { document, port })
    }

    /// Resolve and send in one step.
    pub async fn send(
        &self,
        source: impl Into<ConfigSource>,
        options: &SendOptions,
    ) -> Result<Delivery, SendError> {
        let prepared = self.prepare(source, options)?;
        if options.require_confirmation {
            ReconfigurationGuard::new(options.confirmed)
                .check(&prepared.document)
                .map_err(|_| SendError::DestructiveConfigRejected)?;
        }
        self.send_prepared(&prepared).await
    }

    /// Send a prepared document as-is. The guard is the caller's business here.
    pub async fn send_prepared(&self, prepared: &PreparedConfig) -> Result<Delivery, SendError> {
        let payload = serde_json::to_vec(&prepared.document)?;
        let target = format!("{}:{}", self.host, prepared.port);

        let connection_error = |source: std::io::Error| SendError::Connection {
            target: target.clone(),
            source,
        };

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| {
                connection_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })?
            .map_err(connection_error)?;
        let peer = stream.peer_addr().map_err(connection_error)?;

        write_frame(&mut stream, &payload).await.map_err(|e| match e {
            ProtocolError::Io(source) => connection_error(source),
            other => connection_error(std::io::Error::new(std::io::ErrorKind::InvalidData, other)),
        })?;
        stream.shutdown().await.map_err(connection_error)?;

        tracing::debug!(
            peer_addr = %peer,
            bytes = payload.len(),
            incremental = prepared.document.is_incremental(),
            "Sent logging configuration"
        );
        Ok(Delivery {
            peer,
            bytes: payload.len(),
        })
    }
}

impl Default for ConfigSender {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_precedence() {
        let sender = ConfigSender::default();
        let with_listen = json!({"listen": 7001});

        let explicit = SendOptions {
            port: Some(7002),
            ..SendOptions::default()
        };
        let prepared = sender.prepare(with_listen.clone(), &explicit).unwrap();
        assert_eq!(prepared.port, 7002);
        assert!(prepared.document.listen.is_none());

        let prepared = sender.prepare(with_listen, &SendOptions::default()).unwrap();
        assert_eq!(prepared.port, 7001);

        let prepared = sender.prepare(json!({}), &SendOptions::default()).unwrap();
        assert_eq!(prepared.port, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn incremental_defaults_to_option_but_document_wins() {
        let sender = ConfigSender::default();
        let prepared = sender.prepare(json!({}), &SendOptions::default()).unwrap();
        assert_eq!(prepared.document.incremental, Some(true));

        let overwrite = SendOptions {
            incremental: false,
            ..SendOptions::default()
        };
        let prepared = sender.prepare(json!({}), &overwrite).unwrap();
        assert_eq!(prepared.document.incremental, Some(false));

        let prepared = sender.prepare(json!({"incremental": false}), &SendOptions::default()).unwrap();
        assert_eq!(prepared.document.incremental, Some(false));
    }

    #[test]
    fn invalid_full_replace_is_caught_before_sending() {
        let sender = ConfigSender::default();
        let err = sender
            .prepare(
                json!({"incremental": false, "loggers": {"app": {"handlers": ["missing"]}}}),
                &SendOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SendError::Config(ConfigError::Validation(_))));
        assert_eq!(err.kind(), "ConfigFormatError");
    }

    #[tokio::test]
    async fn destructive_document_needs_confirmation() {
        let sender = ConfigSender::default();
        let err = sender
            .send(
                json!({"incremental": false, "disable_existing_loggers": true}),
                &SendOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::DestructiveConfigRejected));
    }

    #[tokio::test]
    async fn unreachable_listener_is_a_connection_error() {
        let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let options = SendOptions {
            port: Some(port),
            ..SendOptions::default()
        };
        let err = ConfigSender::default().send(json!({}), &options).await.unwrap_err();
        assert!(matches!(err, SendError::Connection { .. }));
        assert_eq!(err.kind(), "ConnectionError");
    }
}
