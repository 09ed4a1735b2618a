//! End-to-end tests over real sockets.
//!
//! Each test binds an ephemeral port, runs the poll loop on its own thread,
//! and plays a plain blocking `std::net::TcpStream` client against it. The
//! recorder sink is the observation point; `wait_for` polls it instead of
//! sleeping for a fixed interval, so the tests stay fast on a quiet machine
//! and honest on a loaded one.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use vigil_core::config::Config;
use vigil_core::server::{ClientGauge, Server, ShutdownHandle};
use vigil_core::submit::RecordingSink;
use vigil_proto::Pdu;

struct Harness {
    recorder: RecordingSink,
    handle: ShutdownHandle,
    gauge: ClientGauge,
    thread: thread::JoinHandle<Result<(), vigil_core::ServerError>>,
    addr: std::net::SocketAddr,
}

impl Harness {
    fn start(max_clients: usize) -> Self {
        let config = Config {
            port: 0,
            max_clients,
            max_lifetime: Duration::from_secs(300),
            ..Config::default()
        };
        let recorder = RecordingSink::new();
        let mut server = Server::bind(&config, recorder.clone()).expect("bind");
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let gauge = server.client_gauge();
        let thread = thread::spawn(move || server.run());
        Self { recorder, handle, gauge, thread, addr }
    }

    fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).expect("connect")
    }

    fn stop(self) {
        self.handle.shutdown();
        self.thread.join().expect("server thread panicked").expect("server run failed");
    }
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not met within 5s");
}

fn now() -> u32 {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock").as_secs();
    u32::try_from(secs).expect("fits until 2106")
}

fn wire(host: &str, service: Option<&str>, rc: u16, output: &str) -> [u8; Pdu::SIZE] {
    Pdu::new(host, service, rc, output, now()).pack()
}

#[test]
fn delivers_a_single_result_and_frees_the_slot() {
    let harness = Harness::start(16);

    let mut client = harness.connect();
    client.write_all(&wire("web01", Some("http"), 2, "CRITICAL - timeout")).expect("write");

    wait_for(|| harness.recorder.len() == 1);
    let results = harness.recorder.results();
    assert_eq!(results[0].host, "web01");
    assert_eq!(results[0].service.as_deref(), Some("http"));
    assert_eq!(results[0].return_code, 2);
    assert_eq!(results[0].output, "CRITICAL - timeout");
    assert_eq!(harness.gauge.get(), 1);

    // Disconnecting must free the slot, not just stop the traffic.
    drop(client);
    wait_for(|| harness.gauge.get() == 0);

    harness.stop();
}

#[test]
fn preserves_order_within_a_connection() {
    let harness = Harness::start(16);

    let mut batch = Vec::new();
    for i in 0..5u16 {
        batch.extend_from_slice(&wire(&format!("host-{i}"), None, i % 4, "ok"));
    }
    let mut client = harness.connect();
    client.write_all(&batch).expect("write");
    drop(client);

    wait_for(|| harness.recorder.len() == 5);
    let hosts: Vec<String> = harness.recorder.results().into_iter().map(|r| r.host).collect();
    assert_eq!(hosts, ["host-0", "host-1", "host-2", "host-3", "host-4"]);

    harness.stop();
}

#[test]
fn reassembles_a_record_sent_in_pieces() {
    let harness = Harness::start(16);

    let record = wire("slow-agent", Some("disk"), 1, "WARNING - 85% full");
    let mut client = harness.connect();
    client.write_all(&record[..4]).expect("write head");
    client.flush().expect("flush");
    thread::sleep(Duration::from_millis(100));
    assert!(harness.recorder.is_empty());

    client.write_all(&record[4..]).expect("write tail");
    drop(client);

    wait_for(|| harness.recorder.len() == 1);
    assert_eq!(harness.recorder.results()[0].host, "slow-agent");

    harness.stop();
}

#[test]
fn corrupt_record_is_dropped_but_the_connection_lives() {
    let harness = Harness::start(16);

    let mut corrupt = wire("liar", None, 0, "x");
    corrupt[200] ^= 0x01;

    let mut client = harness.connect();
    client.write_all(&corrupt).expect("write corrupt");
    client.write_all(&wire("honest", None, 0, "y")).expect("write valid");
    drop(client);

    wait_for(|| harness.recorder.len() == 1);
    assert_eq!(harness.recorder.results()[0].host, "honest");

    harness.stop();
}

#[test]
fn refuses_connections_past_capacity() {
    let harness = Harness::start(1);

    // First client takes the only slot and holds it open.
    let mut first = harness.connect();
    first.write_all(&wire("holder", None, 0, "ok")).expect("write");
    wait_for(|| harness.recorder.len() == 1);

    // Second client gets dropped at the door; its read sees EOF or reset.
    let mut second = harness.connect();
    second.set_read_timeout(Some(Duration::from_secs(5))).expect("timeout");
    let mut buf = [0u8; 1];
    match second.read(&mut buf) {
        Ok(0) | Err(_) => {},
        Ok(n) => panic!("refused connection received {n} bytes"),
    }

    // The holder still works.
    first.write_all(&wire("holder", None, 1, "still here")).expect("write again");
    wait_for(|| harness.recorder.len() == 2);

    harness.stop();
}

#[test]
fn shutdown_handle_stops_the_loop() {
    let harness = Harness::start(16);
    let _idle = harness.connect();
    harness.stop();
}
