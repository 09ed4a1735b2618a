//! Error types for the receiver engine.
//!
//! Two layers with different fates: [`ConfigError`] is always fatal at
//! startup, while [`ServerError`] splits between startup failures (fatal)
//! and per-connection I/O (handled in the loop and never surfaced here).

use std::io;

use thiserror::Error;

/// Errors that abort server startup or the poll loop itself.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured port resolved to no usable listen address.
    #[error("no usable listen address for port {0}")]
    NoListenAddr(u16),

    /// Binding the listen socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: String,
        /// Underlying socket error.
        source: io::Error,
    },

    /// Creating or driving the OS readiness poller failed.
    #[error("event poller failure: {0}")]
    Poller(#[source] io::Error),

    /// Any other I/O failure during setup.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors that make a configuration file unusable.
///
/// Every variant names the offending line so the operator can fix the file
/// without guessing. An unknown key is deliberately *not* an error, it only
/// warns; config files outlive binaries in both directions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read at all.
    #[error("cannot read config {path}: {reason}")]
    Unreadable {
        /// Path the daemon tried to read.
        path: String,
        /// Stringified I/O failure.
        reason: String,
    },

    /// A non-comment line has no `key=value` shape.
    #[error("{origin}:{line}: expected key=value, got {text:?}")]
    Malformed {
        /// File or label the text came from.
        origin: String,
        /// 1-based line number.
        line: usize,
        /// The offending line text.
        text: String,
    },

    /// A known key carries a value it cannot accept.
    #[error("{origin}:{line}: bad value for {key}: {reason}")]
    BadValue {
        /// File or label the text came from.
        origin: String,
        /// 1-based line number.
        line: usize,
        /// The key whose value was rejected.
        key: String,
        /// Why the value is unusable.
        reason: String,
    },
}
