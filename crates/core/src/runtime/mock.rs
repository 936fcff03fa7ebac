//! Scriptable in-memory runtime for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{BindParams, ClientRuntime, TunerId};
use crate::channel::{ChannelConfig, StreamIdentity};
use crate::error::{Result, VqeError};
use crate::stats::Stats;

#[derive(Default)]
struct MockState {
    init_refs: usize,
    next_id: u64,
    tuners: HashMap<TunerId, String>,
    bound: HashMap<TunerId, ChannelConfig>,
    cancelled: HashSet<TunerId>,
    script: VecDeque<Result<Vec<u8>>>,
    calls: Vec<String>,

    running: bool,
    stop_requested: bool,
    interrupted: bool,
    runs_started: usize,
    stop_calls: usize,

    stats: Stats,
    stats_calls: usize,
    fail_stats: bool,
    fail_bind: bool,
    fail_run: bool,
    supports_cancel: bool,
}

pub(crate) struct MockRuntime {
    state: Mutex<MockState>,
    changed: Condvar,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1,
                supports_cancel: true,
                ..MockState::default()
            }),
            changed: Condvar::new(),
        }
    }

    pub fn push_packet(&self, packet: &[u8]) {
        self.state.lock().script.push_back(Ok(packet.to_vec()));
        self.changed.notify_all();
    }

    pub fn push_error(&self, error: VqeError) {
        self.state.lock().script.push_back(Err(error));
        self.changed.notify_all();
    }

    pub fn set_stats(&self, stats: Stats) {
        self.state.lock().stats = stats;
    }

    pub fn fail_stats(&self, fail: bool) {
        self.state.lock().fail_stats = fail;
    }

    pub fn fail_bind(&self, fail: bool) {
        self.state.lock().fail_bind = fail;
    }

    pub fn fail_run(&self, fail: bool) {
        self.state.lock().fail_run = fail;
    }

    pub fn supports_cancel(&self, supported: bool) {
        self.state.lock().supports_cancel = supported;
    }

    pub fn stats_calls(&self) -> usize {
        self.state.lock().stats_calls
    }

    pub fn runs_started(&self) -> usize {
        self.state.lock().runs_started
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn init_refs(&self) -> usize {
        self.state.lock().init_refs
    }

    pub fn tuner_count(&self) -> usize {
        self.state.lock().tuners.len()
    }

    pub fn bound_channel(&self, name: &str) -> Option<ChannelConfig> {
        let state = self.state.lock();
        let (id, _) = state.tuners.iter().find(|(_, n)| n.as_str() == name)?;
        state.bound.get(id).cloned()
    }

    /// Every runtime operation invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Block until the loop is running or `timeout` passes.
    pub fn wait_running(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.running {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.running;
            }
        }
        true
    }
}

impl ClientRuntime for MockRuntime {
    fn initialize(&self, config_path: Option<&Path>) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("initialize {config_path:?}"));
        state.init_refs += 1;
        Ok(())
    }

    fn deinitialize(&self) {
        let mut state = self.state.lock();
        state.calls.push("deinitialize".into());
        state.init_refs = state.init_refs.saturating_sub(1);
    }

    fn create_tuner(&self, name: &str) -> Result<TunerId> {
        let mut state = self.state.lock();
        state.calls.push(format!("create_tuner {name}"));
        if state.init_refs == 0 {
            return Err(VqeError::NotInitialized);
        }
        if state.tuners.values().any(|n| n == name) {
            return Err(VqeError::TunerExists(name.to_string()));
        }
        let id = TunerId::new(state.next_id);
        state.next_id += 1;
        state.tuners.insert(id, name.to_string());
        Ok(id)
    }

    fn destroy_tuner(&self, tuner: TunerId) {
        let mut state = self.state.lock();
        state.calls.push(format!("destroy_tuner {tuner}"));
        state.tuners.remove(&tuner);
        state.bound.remove(&tuner);
        state.cancelled.remove(&tuner);
    }

    fn bind(&self, tuner: TunerId, channel: &ChannelConfig, _params: &BindParams) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("bind {tuner} {}", channel.canonical_uri()));
        if state.fail_bind {
            return Err(VqeError::Bind("refused by mock".into()));
        }
        if !state.tuners.contains_key(&tuner) {
            return Err(VqeError::UnknownTuner(tuner.to_string()));
        }
        state.bound.insert(tuner, channel.clone());
        Ok(())
    }

    fn unbind(&self, tuner: TunerId) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("unbind {tuner}"));
        state.bound.remove(&tuner);
        Ok(())
    }

    fn run(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.runs_started += 1;
        if state.fail_run {
            return Err(VqeError::Receive("mock loop failure".into()));
        }
        if state.stop_requested {
            state.stop_requested = false;
            return Ok(());
        }
        state.running = true;
        state.interrupted = false;
        self.changed.notify_all();
        while !state.stop_requested {
            self.changed.wait(&mut state);
        }
        state.stop_requested = false;
        state.running = false;
        self.changed.notify_all();
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        state.stop_requested = true;
        state.interrupted = true;
        self.changed.notify_all();
    }

    fn clear_stop(&self) {
        let mut state = self.state.lock();
        state.calls.push("clear_stop".into());
        state.stop_requested = false;
    }

    fn receive(&self, tuner: TunerId, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.cancelled.contains(&tuner) || state.interrupted {
                return Err(VqeError::Cancelled);
            }
            if let Some(next) = state.script.pop_front() {
                let packet = next?;
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return Err(VqeError::Timeout(timeout));
            }
        }
    }

    fn cancel_receive(&self, tuner: TunerId) -> bool {
        let mut state = self.state.lock();
        if !state.supports_cancel {
            return false;
        }
        state.cancelled.insert(tuner);
        self.changed.notify_all();
        true
    }

    fn resume_receive(&self, tuner: TunerId) {
        let mut state = self.state.lock();
        state.cancelled.remove(&tuner);
        state.interrupted = false;
    }

    fn stats(&self) -> Result<Stats> {
        let mut state = self.state.lock();
        state.stats_calls += 1;
        if state.fail_stats {
            return Err(VqeError::Receive("stats unavailable".into()));
        }
        Ok(state.stats)
    }

    fn stream_stats(&self, identity: &StreamIdentity) -> Result<Stats> {
        let mut state = self.state.lock();
        state.stats_calls += 1;
        if state.fail_stats {
            return Err(VqeError::UnknownStream(identity.to_string()));
        }
        Ok(state.stats)
    }
}
