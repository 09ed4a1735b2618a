//! Command-line sender for passive check results.
//!
//! Reads tab-delimited records from stdin (see [`vigil_proto::text`]),
//! stamps each with the current time, and pushes the packed PDUs to a
//! receiver over TCP. Built to sit at the end of a pipe in a check script,
//! so failures exit with status 3, the monitoring convention for UNKNOWN,
//! and diagnostics go to stderr only.
//!
//! No logging framework here on purpose; a pipe tool talks through its
//! exit code and stderr.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use vigil_proto::text;

const USAGE: &str = "usage: vigil-send -H <host> [-p <port>] [-t <timeout-secs>] [-q]

Reads records from stdin, one per ETB (0x17) separator:
  host<TAB>service<TAB>return_code<TAB>output
An empty service field submits a host check.
The port is numeric, default 5667.";

struct Options {
    host: String,
    port: u16,
    timeout: Duration,
    quiet: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut host = None;
    let mut port = 5667u16;
    let mut timeout = Duration::from_secs(10);
    let mut quiet = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-H" => host = Some(args.next().ok_or("-H needs a value")?),
            "-p" => {
                port = args
                    .next()
                    .ok_or("-p needs a value")?
                    .parse()
                    .map_err(|_| "-p needs a numeric port")?;
            },
            "-t" => {
                let secs: u64 = args
                    .next()
                    .ok_or("-t needs a value")?
                    .parse()
                    .map_err(|_| "-t needs a number of seconds")?;
                timeout = Duration::from_secs(secs);
            },
            "-q" => quiet = true,
            other => return Err(format!("unknown argument {other:?}")),
        }
    }

    let host = host.ok_or("-H <host> is required")?;
    Ok(Options { host, port, timeout, quiet })
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or_default()
}

fn connect(opts: &Options) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> =
        format!("{}:{}", opts.host, opts.port).to_socket_addrs()?.collect();

    let mut last = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, opts.timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last = err,
        }
    }
    Err(last)
}

fn send(opts: &Options) -> Result<(usize, usize), String> {
    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input).map_err(|e| format!("reading stdin: {e}"))?;

    let outcome = text::parse_records(&input);
    if outcome.records.is_empty() {
        return Err(format!(
            "no valid records on stdin ({} malformed record(s) skipped)",
            outcome.skipped
        ));
    }

    let mut stream =
        connect(opts).map_err(|e| format!("connecting to {}:{}: {e}", opts.host, opts.port))?;
    stream.set_write_timeout(Some(opts.timeout)).map_err(|e| e.to_string())?;
    stream.set_read_timeout(Some(opts.timeout)).map_err(|e| e.to_string())?;

    let sent = outcome.records.len();
    for record in outcome.records {
        let wire = record.into_pdu(unix_now()).pack();
        stream.write_all(&wire).map_err(|e| format!("sending record: {e}"))?;
    }

    // Half-close, then drain until the receiver hangs up. Without this the
    // process can exit before the kernel has pushed the last record out.
    stream.shutdown(std::net::Shutdown::Write).map_err(|e| e.to_string())?;
    let mut sink = [0u8; 256];
    loop {
        match stream.read(&mut sink) {
            Ok(0) => break,
            Ok(_) => {},
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {},
            Err(_) => break,
        }
    }

    Ok((sent, outcome.skipped))
}

fn main() -> ExitCode {
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("vigil-send: {msg}");
            eprintln!("{USAGE}");
            return ExitCode::from(3);
        },
    };

    match send(&opts) {
        Ok((sent, skipped)) => {
            if !opts.quiet {
                println!("{sent} data packet(s) sent to {} successfully", opts.host);
                if skipped > 0 {
                    eprintln!("vigil-send: {skipped} malformed record(s) skipped");
                }
            }
            ExitCode::SUCCESS
        },
        Err(msg) => {
            eprintln!("vigil-send: {msg}");
            ExitCode::from(3)
        },
    }
}
