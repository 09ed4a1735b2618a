//! Daemon configuration.
//!
//! A flat `key=value` file, one setting per line, `#` comments, with every
//! key optional. Policy on bad input is asymmetric on purpose: a key this
//! build does not know is a warning (the file may be shared with a newer or
//! older daemon), but a line that is not `key=value`, or a known key with a
//! value that cannot work, is fatal at startup. Running with a half-read
//! config is worse than not starting.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Default TCP port the receiver listens on.
pub const DEFAULT_PORT: u16 = 5667;

/// Default capacity of the client table.
pub const DEFAULT_MAX_CLIENTS: usize = 16384;

/// Default per-connection lifetime in seconds.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 300;

/// Default syslog identity string.
pub const DEFAULT_SYSLOG_IDENT: &str = "vigil";

/// Syslog facility the daemon logs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum Facility {
    #[default]
    Daemon,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl FromStr for Facility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daemon" => Ok(Self::Daemon),
            "local0" => Ok(Self::Local0),
            "local1" => Ok(Self::Local1),
            "local2" => Ok(Self::Local2),
            "local3" => Ok(Self::Local3),
            "local4" => Ok(Self::Local4),
            "local5" => Ok(Self::Local5),
            "local6" => Ok(Self::Local6),
            "local7" => Ok(Self::Local7),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Daemon => "daemon",
            Self::Local0 => "local0",
            Self::Local1 => "local1",
            Self::Local2 => "local2",
            Self::Local3 => "local3",
            Self::Local4 => "local4",
            Self::Local5 => "local5",
            Self::Local6 => "local6",
            Self::Local7 => "local7",
        };
        f.write_str(name)
    }
}

/// Runtime settings for the receiver daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP port to listen on. Numeric only; `0` asks the kernel for an
    /// ephemeral port.
    pub port: u16,
    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,
    /// How long a connection may live before it is evicted.
    pub max_lifetime: Duration,
    /// Identity string for syslog.
    pub syslog_ident: String,
    /// Facility for syslog.
    pub syslog_facility: Facility,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_lifetime: Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS),
            syslog_ident: DEFAULT_SYSLOG_IDENT.to_owned(),
            syslog_facility: Facility::Daemon,
        }
    }
}

impl Config {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Unreadable`] if the file cannot be read, otherwise
    /// whatever [`Config::parse`] reports.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parses config text. `origin` labels the source in diagnostics.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Malformed`] for a line without `key=value` shape,
    /// [`ConfigError::BadValue`] for a known key with an unusable value.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::Malformed {
                    origin: origin.to_owned(),
                    line,
                    text: trimmed.to_owned(),
                });
            };
            let key = key.trim();
            let value = value.trim();

            let bad = |reason: &str| ConfigError::BadValue {
                origin: origin.to_owned(),
                line,
                key: key.to_owned(),
                reason: reason.to_owned(),
            };

            match key {
                "port" => {
                    config.port = value.parse().map_err(|_| bad("not a port number"))?;
                },
                "max_clients" => {
                    let n: usize = value.parse().map_err(|_| bad("not a number"))?;
                    if n == 0 {
                        return Err(bad("must be at least 1"));
                    }
                    config.max_clients = n;
                },
                "max_lifetime" => {
                    let secs: u64 = value.parse().map_err(|_| bad("not a number"))?;
                    if secs == 0 {
                        return Err(bad("must be at least 1 second"));
                    }
                    config.max_lifetime = Duration::from_secs(secs);
                },
                "syslog_ident" => {
                    if value.is_empty() {
                        return Err(bad("empty"));
                    }
                    config.syslog_ident = value.to_owned();
                },
                "syslog_facility" => {
                    config.syslog_facility = value
                        .parse()
                        .map_err(|()| bad("expected daemon or local0 through local7"))?;
                },
                other => {
                    warn!(%origin, line, key = other, "ignoring unknown config key");
                },
            }
        }

        Ok(config)
    }
}
