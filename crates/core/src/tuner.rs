//! Owned handle to one runtime tuner.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::error::Result;
use crate::runtime::{BindParams, ClientRuntime, TunerId};

/// A named receive slot in the client runtime.
///
/// Dropping the handle unbinds (if bound) and destroys the tuner, so a
/// tuner is released exactly once no matter how a source shuts down.
pub struct Tuner {
    id: TunerId,
    name: String,
    runtime: Arc<dyn ClientRuntime>,
    bound: bool,
}

impl Tuner {
    pub fn create(runtime: Arc<dyn ClientRuntime>, name: &str) -> Result<Self> {
        let id = runtime.create_tuner(name)?;
        tracing::debug!(%id, name, "created tuner");
        Ok(Self {
            id,
            name: name.to_string(),
            runtime,
            bound: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> TunerId {
        self.id
    }

    pub fn runtime(&self) -> &Arc<dyn ClientRuntime> {
        &self.runtime
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Bind to `channel`. Binding again switches channel.
    pub fn bind(&mut self, channel: &ChannelConfig, params: &BindParams) -> Result<()> {
        self.runtime.bind(self.id, channel, params)?;
        self.bound = true;
        Ok(())
    }

    pub fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.runtime.receive(self.id, buf, timeout)
    }

    /// Interrupt a blocked [`receive`](Self::receive). Returns `false` when
    /// the runtime has no per-tuner cancellation.
    pub fn cancel(&self) -> bool {
        self.runtime.cancel_receive(self.id)
    }

    pub fn resume(&self) {
        self.runtime.resume_receive(self.id);
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        if self.bound {
            if let Err(e) = self.runtime.unbind(self.id) {
                tracing::warn!(tuner = %self.name, error = %e, "failed to unbind tuner");
            }
        }
        self.runtime.destroy_tuner(self.id);
        tracing::debug!(tuner = %self.name, "destroyed tuner");
    }
}

impl std::fmt::Debug for Tuner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tuner")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bound", &self.bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Protocol;
    use crate::runtime::mock::MockRuntime;

    fn mock() -> (Arc<MockRuntime>, Arc<dyn ClientRuntime>) {
        let mock = Arc::new(MockRuntime::new());
        mock.initialize(None).unwrap();
        let runtime: Arc<dyn ClientRuntime> = mock.clone();
        (mock, runtime)
    }

    #[test]
    fn drop_unbinds_then_destroys() {
        let (mock, runtime) = mock();
        let mut tuner = Tuner::create(runtime, "t0").unwrap();
        let channel = ChannelConfig::new(Protocol::Rtp, "239.1.1.1".parse().unwrap(), 5000);
        tuner.bind(&channel, &BindParams::default()).unwrap();
        drop(tuner);

        let calls = mock.calls();
        let tail: Vec<_> = calls.iter().rev().take(2).rev().cloned().collect();
        assert_eq!(tail, vec!["unbind tuner#1", "destroy_tuner tuner#1"]);
        assert_eq!(mock.tuner_count(), 0);
    }

    #[test]
    fn unbound_tuner_is_only_destroyed() {
        let (mock, runtime) = mock();
        drop(Tuner::create(runtime, "t0").unwrap());
        assert!(!mock.calls().iter().any(|c| c.starts_with("unbind")));
        assert_eq!(mock.tuner_count(), 0);
    }

    #[test]
    fn failed_bind_leaves_tuner_unbound() {
        let (mock, runtime) = mock();
        mock.fail_bind(true);
        let mut tuner = Tuner::create(runtime, "t0").unwrap();
        let channel = ChannelConfig::new(Protocol::Udp, "127.0.0.1".parse().unwrap(), 5000);
        assert!(tuner.bind(&channel, &BindParams::default()).is_err());
        assert!(!tuner.is_bound());
    }
}
