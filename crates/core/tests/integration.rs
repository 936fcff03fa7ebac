//! Integration tests: SDP demux → source session → UDP runtime over loopback.
//!
//! Each test owns its own `UdpRuntime` and coordinator and uses a fixed
//! loopback port, so tests can run in parallel.

use std::cell::RefCell;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vqe::demux::{ChainOutcome, EosOutcome};
use vqe::error::ErrorCategory;
use vqe::{
    ClientRuntime, ContainerHost, Counter, Result, SdpDemux, SourceSession, SourceSettings,
    UdpRuntime, VqeError, WorkerCoordinator,
};

/// Host that starts a real source session as the demux child.
struct SessionHost {
    coordinator: Arc<WorkerCoordinator>,
    events: RefCell<Vec<&'static str>>,
    warnings: RefCell<Vec<String>>,
}

impl SessionHost {
    fn new(coordinator: Arc<WorkerCoordinator>) -> Self {
        Self {
            coordinator,
            events: RefCell::new(Vec::new()),
            warnings: RefCell::new(Vec::new()),
        }
    }
}

impl ContainerHost for SessionHost {
    type Child = SourceSession;

    fn create_child(&self, sdp: &str) -> Result<SourceSession> {
        self.events.borrow_mut().push("create");
        SourceSession::start(&self.coordinator, &SourceSettings::new(sdp, "vqesrc0"))
    }

    fn adopt_child(&self, _child: &SourceSession) -> Result<()> {
        self.events.borrow_mut().push("adopt");
        Ok(())
    }

    fn expose_output(&self, _child: &SourceSession) -> Result<()> {
        self.events.borrow_mut().push("expose");
        Ok(())
    }

    fn sync_child_state(&self, _child: &SourceSession) -> Result<()> {
        Ok(())
    }

    fn play_child(&self, _child: &SourceSession) -> Result<()> {
        self.events.borrow_mut().push("play");
        Ok(())
    }

    fn discard_child(&self, child: SourceSession) {
        self.events.borrow_mut().push("discard");
        drop(child);
    }

    fn report_error(&self, error: &VqeError) {
        panic!("unexpected stream error: {error}");
    }

    fn report_warning(&self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }
}

fn rtp_packet(sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x80, 33];
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]);
    packet.extend_from_slice(payload);
    packet
}

/// Keep sending until the session reads something or the deadline passes;
/// the first datagrams may race the socket bind.
fn send_until_read(session: &SourceSession, port: u16, payload: &[u8]) -> Vec<u8> {
    let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut sequence = 0u16;
    loop {
        sender
            .send_to(&rtp_packet(sequence, payload), ("127.0.0.1", port))
            .expect("send datagram");
        sequence = sequence.wrapping_add(1);
        match session.read_packet() {
            Ok(packet) => return packet,
            Err(e) if e.category() == ErrorCategory::RuntimeIo && Instant::now() < deadline => {
                continue;
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
}

#[test]
fn sdp_chunks_instantiate_one_bound_source() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime.clone());
    let host = SessionHost::new(coordinator.clone());
    let mut demux = SdpDemux::new();

    for chunk in [
        "v=0\r\n",
        "o=- 0 0 IN IP4 127.0.0.1\r\n",
        "s=-\r\n",
        "t=0 0\r\n",
        "m=video 30000 RTP/AVP 33\r\n",
    ] {
        assert_eq!(demux.chain(chunk.as_bytes()), ChainOutcome::Accepted);
    }
    assert_eq!(demux.end_of_input(&host).expect("instantiate"), EosOutcome::Instantiated);
    assert_eq!(*host.events.borrow(), vec!["create", "adopt", "expose", "play"]);

    let session = demux.child().expect("child source");
    assert_eq!(session.identity().as_str(), "rtp://127.0.0.1:30000");
    assert_eq!(coordinator.status().refs, 1);
    assert!(coordinator.status().running);

    let packet = send_until_read(session, 30000, &[0x47, 0x40, 0x00, 0x10]);
    assert_eq!(packet, vec![0x47, 0x40, 0x00, 0x10]);
    assert!(session.counter(Counter::PrimaryRtpInputs).expect("stats") >= 1);

    demux.reset(&host);
    assert!(demux.child().is_none());
    let status = coordinator.status();
    assert_eq!(status.refs, 0);
    assert!(!status.running);
    assert!(!runtime.is_running());
}

#[test]
fn eos_without_sdp_creates_no_source() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime);
    let host = SessionHost::new(coordinator.clone());
    let mut demux = SdpDemux::new();

    assert_eq!(demux.end_of_input(&host).expect("eos"), EosOutcome::NoDocument);
    assert!(demux.child().is_none());
    assert!(host.events.borrow().is_empty());
    assert_eq!(host.warnings.borrow().len(), 1);
    assert_eq!(coordinator.status().refs, 0);
}

#[test]
fn timeout_then_next_pull_succeeds() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime.clone());
    let mut settings = SourceSettings::new("rtp://127.0.0.1:30002", "timeout-src");
    settings.receive_timeout = Duration::from_millis(100);
    let session = SourceSession::start(&coordinator, &settings).expect("start");

    let err = session.read_packet().expect_err("no traffic yet");
    assert!(matches!(err, VqeError::Timeout(_)));
    assert_eq!(err.category(), ErrorCategory::RuntimeIo);

    let packet = send_until_read(&session, 30002, &[0x47; 188]);
    assert_eq!(packet.len(), 188);

    drop(session);
    assert_eq!(coordinator.status().refs, 0);
}

#[test]
fn two_sessions_share_one_worker() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime.clone());

    let a = SourceSession::start(&coordinator, &SourceSettings::new("udp://127.0.0.1:30004", "a"))
        .expect("start a");
    let b = SourceSession::start(&coordinator, &SourceSettings::new("udp://127.0.0.1:30006", "b"))
        .expect("start b");
    let status = coordinator.status();
    assert_eq!((status.refs, status.spawned), (2, 1));

    drop(a);
    assert!(coordinator.status().running);

    drop(b);
    let status = coordinator.status();
    assert_eq!(status.refs, 0);
    assert!(!status.running);
}

#[test]
fn unlock_interrupts_blocked_read() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime.clone());
    let mut settings = SourceSettings::new("rtp://127.0.0.1:30008", "unlock-src");
    settings.receive_timeout = Duration::from_secs(30);
    let session = Arc::new(SourceSession::start(&coordinator, &settings).expect("start"));

    let reader = {
        let session = session.clone();
        thread::spawn(move || {
            let started = Instant::now();
            (session.read_packet(), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));
    session.unlock();

    let (result, elapsed) = reader.join().expect("reader thread");
    assert!(matches!(result, Err(VqeError::Cancelled)));
    assert!(elapsed < Duration::from_secs(5));
    assert!(runtime.is_running(), "unlocking one tuner must not stop the shared loop");

    session.unlock_stop().expect("resume");
}

#[test]
fn runtime_stats_sum_all_streams() {
    let runtime = Arc::new(UdpRuntime::new());
    let coordinator = WorkerCoordinator::new(runtime.clone());
    let session = SourceSession::start(
        &coordinator,
        &SourceSettings::new("rtp://127.0.0.1:30010", "stats-src"),
    )
    .expect("start");

    send_until_read(&session, 30010, &[0x47]);
    let total = runtime.stats().expect("stats");
    let stream = session.stats().expect("stream stats");
    assert!(total.post_repair_outputs >= stream.post_repair_outputs);
    assert!(stream.post_repair_outputs >= 1);
}
