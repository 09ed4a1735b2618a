//! The vigil daemon.
//!
//! Thin shell around [`vigil_core::Server`]: load config, set up logging,
//! run the poll loop on the main thread until killed. Every decoded check
//! result is logged; wiring results into a monitoring core happens by
//! embedding `vigil-core` with a different sink, not by editing this
//! binary.

use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil_core::{CheckResult, Config, ResultSink, Server};

/// Sink that logs every result it receives.
struct LogSink;

impl ResultSink for LogSink {
    fn submit(&mut self, result: CheckResult) {
        info!(
            host = %result.host,
            service = result.service.as_deref().unwrap_or("-"),
            return_code = result.return_code,
            output = %result.output,
            "check result"
        );
    }
}

fn usage() {
    eprintln!("usage: vigild [config-file]");
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(flag) if flag == "-h" || flag == "--help" => {
            usage();
            return ExitCode::SUCCESS;
        },
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "unusable configuration");
                return ExitCode::FAILURE;
            },
        },
        None => Config::default(),
    };
    if args.next().is_some() {
        usage();
        return ExitCode::FAILURE;
    }

    info!(
        ident = %config.syslog_ident,
        facility = %config.syslog_facility,
        port = %config.port,
        "starting"
    );

    let mut server = match Server::bind(&config, LogSink) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "startup failed");
            return ExitCode::FAILURE;
        },
    };

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "poll loop failed");
            ExitCode::FAILURE
        },
    }
}
