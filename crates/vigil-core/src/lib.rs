//! Receiver engine for the vigil passive check result daemon.
//!
//! A single-threaded, readiness-driven TCP server: one `mio` poll loop owns
//! the listener and every client connection, reads fixed-size PDUs off
//! non-blocking sockets, and hands decoded results to a pluggable sink.
//! There are no per-connection threads and no async runtime; capacity is a
//! fixed client table sized at startup.
//!
//! # Layering
//!
//! The pieces that hold state are written against traits (`io::Read`,
//! [`submit::ResultSink`]) so they test without sockets:
//!
//! - [`config`]: key-value config file, defaults, validation
//! - [`clients`]: fixed-capacity table of live connections with deadlines
//! - [`receive`]: per-connection byte reassembly and decode policy
//! - [`submit`]: decoded results and the sink they are delivered to
//! - [`server`]: the poll loop tying it all to real sockets
//! - [`error`]: engine error types
//!
//! Only [`server`] touches the network or the clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod clients;
pub mod config;
pub mod error;
pub mod receive;
pub mod server;
pub mod submit;

pub use config::Config;
pub use error::{ConfigError, ServerError};
pub use server::{ClientGauge, Server, ShutdownHandle};
pub use submit::{CheckResult, ResultSink};
