//! Plain UDP/RTP receiver implementing [`ClientRuntime`].
//!
//! This runtime receives the primary stream only: it performs no
//! retransmission, rapid channel change, FEC or RTCP. It exists so sources
//! work without the full retransmission client, and it follows the same
//! contract:
//!
//! - [`run`](ClientRuntime::run) is the packet pump. It sweeps every bound
//!   socket (non-blocking), queues datagrams per tuner, and idles for
//!   `poll_interval_ms` when nothing arrived.
//! - [`receive`](ClientRuntime::receive) pops from the tuner's queue and
//!   supports per-tuner cancellation, so unlocking one source never stops
//!   the shared loop.
//! - Counters are kept per stream identity and survive unbinding.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use socket2::{Domain, Socket, Type};

use super::rtp::RtpPacket;
use super::{BindParams, ClientRuntime, RuntimeConfig, TunerId};
use crate::channel::{ChannelConfig, Protocol, StreamIdentity};
use crate::error::{Result, VqeError};
use crate::stats::Stats;

const MPEG_TS_SYNC: u8 = 0x47;

/// Upper bound on datagrams drained from one socket per sweep, so a busy
/// channel cannot starve the others.
const MAX_BURST: usize = 256;

pub struct UdpRuntime {
    inner: Mutex<Inner>,
    pump: Mutex<PumpState>,
    wake: Condvar,
    streams: Mutex<HashMap<String, Arc<StreamCounters>>>,
}

struct Inner {
    init_refs: usize,
    config_path: Option<PathBuf>,
    config: RuntimeConfig,
    tuners: HashMap<TunerId, TunerSlot>,
    next_id: u64,
}

struct TunerSlot {
    name: String,
    queue: Arc<PacketQueue>,
    ingest: Option<Arc<Ingest>>,
}

#[derive(Default)]
struct PumpState {
    running: bool,
    stop_requested: bool,
}

impl UdpRuntime {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                init_refs: 0,
                config_path: None,
                config: RuntimeConfig::default(),
                tuners: HashMap::new(),
                next_id: 1,
            }),
            pump: Mutex::new(PumpState::default()),
            wake: Condvar::new(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the receive loop is currently inside [`run`](ClientRuntime::run).
    pub fn is_running(&self) -> bool {
        self.pump.lock().running
    }

    /// Configuration loaded by the first [`initialize`](ClientRuntime::initialize).
    pub fn config(&self) -> RuntimeConfig {
        self.inner.lock().config.clone()
    }

    fn stream_counters(&self, key: &str) -> Arc<StreamCounters> {
        self.streams
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn with_slot<T>(&self, tuner: TunerId, f: impl FnOnce(&mut TunerSlot) -> T) -> Result<T> {
        let mut inner = self.inner.lock();
        let slot = inner
            .tuners
            .get_mut(&tuner)
            .ok_or_else(|| VqeError::UnknownTuner(tuner.to_string()))?;
        Ok(f(slot))
    }
}

impl Default for UdpRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRuntime for UdpRuntime {
    fn initialize(&self, config_path: Option<&Path>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.init_refs == 0 {
            inner.config = match config_path {
                Some(path) => RuntimeConfig::from_file(path)?,
                None => RuntimeConfig::default(),
            };
            inner.config_path = config_path.map(Path::to_path_buf);
            tracing::info!(config = ?inner.config_path, "runtime initialized");
        } else if inner.config_path.as_deref() != config_path {
            tracing::warn!(
                loaded = ?inner.config_path,
                requested = ?config_path,
                "runtime already initialized; keeping loaded configuration"
            );
        }
        inner.init_refs += 1;
        Ok(())
    }

    fn deinitialize(&self) {
        let mut inner = self.inner.lock();
        match inner.init_refs {
            0 => tracing::warn!("deinitialize without initialize"),
            1 => {
                inner.init_refs = 0;
                if !inner.tuners.is_empty() {
                    tracing::warn!(remaining = inner.tuners.len(), "destroying leftover tuners");
                    for slot in inner.tuners.values() {
                        slot.queue.set_cancelled(true);
                    }
                    inner.tuners.clear();
                }
                inner.config = RuntimeConfig::default();
                inner.config_path = None;
                tracing::info!("runtime deinitialized");
            }
            _ => inner.init_refs -= 1,
        }
    }

    fn create_tuner(&self, name: &str) -> Result<TunerId> {
        let mut inner = self.inner.lock();
        if inner.init_refs == 0 {
            return Err(VqeError::NotInitialized);
        }
        if inner.tuners.values().any(|slot| slot.name == name) {
            return Err(VqeError::TunerExists(name.to_string()));
        }
        if inner.tuners.len() >= inner.config.max_tuners {
            return Err(VqeError::TunerLimit(inner.config.max_tuners));
        }

        let id = TunerId::new(inner.next_id);
        inner.next_id += 1;
        let queue = Arc::new(PacketQueue::new(inner.config.queue_depth));
        inner.tuners.insert(
            id,
            TunerSlot {
                name: name.to_string(),
                queue,
                ingest: None,
            },
        );
        tracing::debug!(%id, name, total_tuners = inner.tuners.len(), "tuner created");
        Ok(id)
    }

    fn destroy_tuner(&self, tuner: TunerId) {
        let removed = self.inner.lock().tuners.remove(&tuner);
        match removed {
            Some(slot) => {
                slot.queue.set_cancelled(true);
                tracing::debug!(%tuner, name = %slot.name, "tuner destroyed");
            }
            None => tracing::warn!(%tuner, "destroy of unknown tuner"),
        }
    }

    fn bind_params(&self) -> BindParams {
        self.inner.lock().config.bind_params()
    }

    fn bind(&self, tuner: TunerId, channel: &ChannelConfig, params: &BindParams) -> Result<()> {
        let (queue, previous) = self.with_slot(tuner, |slot| (slot.queue.clone(), slot.ingest.take()))?;
        if previous.is_some() {
            tracing::info!(%tuner, "changing channel");
        }
        drop(previous);

        let config = self.config();
        let socket = open_socket(channel, &config)
            .map_err(|e| VqeError::Bind(format!("{}: {e}", channel.canonical_uri())))?;

        let key = channel.canonical_uri();
        let ingest = Arc::new(Ingest {
            socket,
            channel: channel.clone(),
            counters: self.stream_counters(&key),
            queue,
            last_sequence: Mutex::new(None),
        });
        self.with_slot(tuner, |slot| slot.ingest = Some(ingest))?;

        tracing::info!(
            %tuner,
            stream = %key,
            source = ?channel.source,
            rcc = params.rcc,
            error_repair = params.error_repair,
            "tuner bound"
        );
        Ok(())
    }

    fn unbind(&self, tuner: TunerId) -> Result<()> {
        let previous = self.with_slot(tuner, |slot| slot.ingest.take())?;
        if let Some(ingest) = previous {
            tracing::debug!(%tuner, stream = %ingest.channel.canonical_uri(), "tuner unbound");
        }
        Ok(())
    }

    fn run(&self) -> Result<()> {
        {
            let mut pump = self.pump.lock();
            if pump.stop_requested {
                pump.stop_requested = false;
                tracing::debug!("stop requested before receive loop started");
                return Ok(());
            }
            pump.running = true;
        }
        tracing::debug!("receive loop running");

        let mut scratch = Vec::new();
        loop {
            let (ingests, paksize, idle) = {
                let inner = self.inner.lock();
                let ingests: Vec<Arc<Ingest>> =
                    inner.tuners.values().filter_map(|slot| slot.ingest.clone()).collect();
                (
                    ingests,
                    inner.config.max_paksize.max(1),
                    Duration::from_millis(inner.config.poll_interval_ms.max(1)),
                )
            };
            scratch.resize(paksize, 0);

            let received: usize = ingests.iter().map(|ingest| ingest.drain(&mut scratch)).sum();

            let mut pump = self.pump.lock();
            if received == 0 && !pump.stop_requested {
                self.wake.wait_for(&mut pump, idle);
            }
            if pump.stop_requested {
                pump.stop_requested = false;
                pump.running = false;
                break;
            }
        }

        tracing::debug!("receive loop exited");
        Ok(())
    }

    fn stop(&self) {
        let mut pump = self.pump.lock();
        pump.stop_requested = true;
        self.wake.notify_all();
    }

    fn clear_stop(&self) {
        let mut pump = self.pump.lock();
        if pump.stop_requested {
            tracing::debug!("discarding stale stop request");
            pump.stop_requested = false;
        }
    }

    fn receive(&self, tuner: TunerId, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let queue = self.with_slot(tuner, |slot| slot.queue.clone())?;
        let packet = queue.pop(timeout)?;
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok(len)
    }

    fn cancel_receive(&self, tuner: TunerId) -> bool {
        self.with_slot(tuner, |slot| slot.queue.set_cancelled(true))
            .is_ok()
    }

    fn resume_receive(&self, tuner: TunerId) {
        let _ = self.with_slot(tuner, |slot| slot.queue.set_cancelled(false));
    }

    fn stats(&self) -> Result<Stats> {
        let mut total = Stats::default();
        for counters in self.streams.lock().values() {
            total.accumulate(&counters.snapshot());
        }
        Ok(total)
    }

    fn stream_stats(&self, identity: &StreamIdentity) -> Result<Stats> {
        self.streams
            .lock()
            .get(identity.as_str())
            .map(|counters| counters.snapshot())
            .ok_or_else(|| VqeError::UnknownStream(identity.to_string()))
    }
}

fn open_socket(channel: &ChannelConfig, config: &RuntimeConfig) -> io::Result<UdpSocket> {
    let socket = match channel.destination {
        IpAddr::V4(group) if group.is_multicast() => {
            let socket = shared_socket(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), channel.port))?;
            let interface = config.multicast_interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket.join_multicast_v4(&group, &interface)?;
            socket
        }
        IpAddr::V6(group) if group.is_multicast() => {
            let socket = shared_socket(SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), channel.port))?;
            socket.join_multicast_v6(&group, 0)?;
            socket
        }
        unicast => UdpSocket::bind(SocketAddr::new(unicast, channel.port))?,
    };
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Multicast receive socket that other tuners on the same group and port
/// can bind as well; each gets its own copy of every datagram.
fn shared_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(socket2::Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// One bound channel: its socket and where its packets go.
struct Ingest {
    socket: UdpSocket,
    channel: ChannelConfig,
    counters: Arc<StreamCounters>,
    queue: Arc<PacketQueue>,
    last_sequence: Mutex<Option<u16>>,
}

impl Ingest {
    fn drain(&self, scratch: &mut [u8]) -> usize {
        let mut count = 0;
        while count < MAX_BURST {
            match self.socket.recv_from(scratch) {
                Ok((len, from)) => {
                    self.accept(&scratch[..len], from);
                    count += 1;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(stream = %self.channel.canonical_uri(), error = %e, "socket receive error");
                    break;
                }
            }
        }
        count
    }

    fn accept(&self, data: &[u8], from: SocketAddr) {
        let counters = &self.counters;
        let allowed = self.channel.source.is_none_or(|source| source == from.ip());

        match self.channel.protocol {
            Protocol::Rtp => {
                StreamCounters::bump(&counters.primary_rtp_inputs, 1);
                let Some(rtp) = RtpPacket::parse(data).filter(|_| allowed) else {
                    StreamCounters::bump(&counters.primary_rtp_drops, 1);
                    return;
                };
                if !self.track_sequence(rtp.sequence) {
                    StreamCounters::bump(&counters.primary_rtp_drops_late, 1);
                    return;
                }
                self.deliver(&data[rtp.payload]);
            }
            Protocol::Udp => {
                StreamCounters::bump(&counters.primary_udp_inputs, 1);
                if !allowed || data.first() != Some(&MPEG_TS_SYNC) {
                    StreamCounters::bump(&counters.primary_udp_drops, 1);
                    return;
                }
                self.deliver(data);
            }
        }
    }

    /// Returns `false` for packets older than (or equal to) the last one.
    fn track_sequence(&self, sequence: u16) -> bool {
        let mut last = self.last_sequence.lock();
        if let Some(previous) = *last {
            let gap = sequence.wrapping_sub(previous.wrapping_add(1));
            if gap >= 0x8000 {
                return false;
            }
            if gap > 0 {
                StreamCounters::bump(&self.counters.pre_repair_losses, gap as u64);
                StreamCounters::bump(&self.counters.post_repair_losses, gap as u64);
            }
        }
        *last = Some(sequence);
        true
    }

    fn deliver(&self, payload: &[u8]) {
        if self.queue.push(payload.to_vec()) {
            StreamCounters::bump(&self.counters.tuner_queue_drops, 1);
        }
        StreamCounters::bump(&self.counters.post_repair_outputs, 1);
    }
}

/// Counters this runtime maintains; the rest of [`Stats`] stays zero.
#[derive(Default)]
struct StreamCounters {
    primary_udp_inputs: AtomicU64,
    primary_udp_drops: AtomicU64,
    primary_rtp_inputs: AtomicU64,
    primary_rtp_drops: AtomicU64,
    primary_rtp_drops_late: AtomicU64,
    pre_repair_losses: AtomicU64,
    post_repair_losses: AtomicU64,
    post_repair_outputs: AtomicU64,
    tuner_queue_drops: AtomicU64,
}

impl StreamCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Stats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Stats {
            primary_udp_inputs: get(&self.primary_udp_inputs),
            primary_udp_drops: get(&self.primary_udp_drops),
            primary_rtp_inputs: get(&self.primary_rtp_inputs),
            primary_rtp_drops: get(&self.primary_rtp_drops),
            primary_rtp_drops_late: get(&self.primary_rtp_drops_late),
            pre_repair_losses: get(&self.pre_repair_losses),
            post_repair_losses: get(&self.post_repair_losses),
            post_repair_outputs: get(&self.post_repair_outputs),
            tuner_queue_drops: get(&self.tuner_queue_drops),
            ..Stats::default()
        }
    }
}

/// Bounded per-tuner packet queue. Overflow drops the oldest packet.
struct PacketQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    depth: usize,
}

#[derive(Default)]
struct QueueState {
    packets: VecDeque<Vec<u8>>,
    cancelled: bool,
}

impl PacketQueue {
    fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            depth: depth.max(1),
        }
    }

    /// Returns `true` if an older packet had to be dropped.
    fn push(&self, packet: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        let overflow = state.packets.len() >= self.depth;
        if overflow {
            state.packets.pop_front();
        }
        state.packets.push_back(packet);
        self.ready.notify_one();
        overflow
    }

    fn pop(&self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(VqeError::Cancelled);
            }
            if let Some(packet) = state.packets.pop_front() {
                return Ok(packet);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                if state.cancelled {
                    return Err(VqeError::Cancelled);
                }
                return state.packets.pop_front().ok_or(VqeError::Timeout(timeout));
            }
        }
    }

    fn set_cancelled(&self, cancelled: bool) {
        self.state.lock().cancelled = cancelled;
        self.ready.notify_all();
    }
}
