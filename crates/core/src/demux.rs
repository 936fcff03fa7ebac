//! Two-phase SDP demultiplexer.
//!
//! Phase one buffers the session description through an [`SdpAssembler`].
//! Phase two, on end of input, instantiates exactly one child source in the
//! host container and wires its output out:
//!
//! | Step | Host call | On failure |
//! |------|-----------|------------|
//! | 1 | [`create_child`](ContainerHost::create_child) | error returned, nothing created |
//! | 2 | [`adopt_child`](ContainerHost::adopt_child) | child discarded, error returned |
//! | 3 | [`expose_output`](ContainerHost::expose_output) | child discarded, error returned |
//! | 4 | [`sync_child_state`](ContainerHost::sync_child_state) | reported, continue |
//! | 5 | [`play_child`](ContainerHost::play_child) | reported |
//!
//! The demux holds the child by value; the host's output wiring only
//! refers to it.

use crate::assembler::{Completion, Push, SdpAssembler};
use crate::error::{Result, VqeError};

/// Container operations the demux needs from its host pipeline.
pub trait ContainerHost {
    type Child;

    /// Build a child source configured with `sdp`.
    fn create_child(&self, sdp: &str) -> Result<Self::Child>;

    /// Make the child part of the container.
    fn adopt_child(&self, child: &Self::Child) -> Result<()>;

    /// Expose a new output linked to the child's output.
    fn expose_output(&self, child: &Self::Child) -> Result<()>;

    /// Bring the child to the container's current state.
    fn sync_child_state(&self, child: &Self::Child) -> Result<()>;

    /// Force the child into playback.
    fn play_child(&self, child: &Self::Child) -> Result<()>;

    /// Remove the child and any output exposed for it.
    fn discard_child(&self, child: Self::Child);

    /// Report a stream-level error without aborting.
    fn report_error(&self, error: &VqeError);

    /// Report a non-fatal condition worth surfacing to the application.
    fn report_warning(&self, message: &str);
}

/// Result of pushing one input chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Accepted,
    /// Input after the document completed; tell upstream to stop.
    EndOfStream,
}

/// Result of the end-of-input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosOutcome {
    /// End of input with no SDP at all; nothing instantiated.
    NoDocument,
    /// End of input had already been handled.
    AlreadyComplete,
    Instantiated,
}

pub struct SdpDemux<C> {
    assembler: SdpAssembler,
    child: Option<C>,
}

impl<C> SdpDemux<C> {
    pub fn new() -> Self {
        Self {
            assembler: SdpAssembler::new(),
            child: None,
        }
    }

    pub fn chain(&mut self, chunk: &[u8]) -> ChainOutcome {
        match self.assembler.push(chunk) {
            Push::Accepted => ChainOutcome::Accepted,
            Push::Rejected => {
                tracing::debug!(len = chunk.len(), "dropping data after end of SDP");
                ChainOutcome::EndOfStream
            }
        }
    }

    /// Handle end of input: finish the document and, if there is one,
    /// instantiate the child.
    pub fn end_of_input<H>(&mut self, host: &H) -> Result<EosOutcome>
    where
        H: ContainerHost<Child = C>,
    {
        match self.assembler.finish()? {
            Completion::Empty => {
                host.report_warning("received end of input without SDP data");
                Ok(EosOutcome::NoDocument)
            }
            Completion::AlreadyComplete => Ok(EosOutcome::AlreadyComplete),
            Completion::Document(sdp) => {
                self.instantiate(host, &sdp)?;
                Ok(EosOutcome::Instantiated)
            }
        }
    }

    /// Create, adopt and expose the child for `sdp`, then start it.
    ///
    /// # Panics
    ///
    /// If a child already exists. At most one child is created between
    /// resets.
    pub fn instantiate<H>(&mut self, host: &H, sdp: &str) -> Result<()>
    where
        H: ContainerHost<Child = C>,
    {
        assert!(
            self.child.is_none(),
            "SDP demux already instantiated a child source"
        );

        let child = host.create_child(sdp)?;
        if let Err(e) = host.adopt_child(&child) {
            host.discard_child(child);
            return Err(e);
        }
        if let Err(e) = host.expose_output(&child) {
            host.discard_child(child);
            return Err(e);
        }

        if let Err(e) = host.sync_child_state(&child) {
            tracing::error!(error = %e, "failed to sync child state");
            host.report_error(&e);
        }
        if let Err(e) = host.play_child(&child) {
            tracing::error!(error = %e, "failed to start child");
            host.report_error(&e);
        }

        tracing::info!("child source instantiated");
        self.child = Some(child);
        Ok(())
    }

    /// Return to the initial state, discarding any child.
    pub fn reset<H>(&mut self, host: &H)
    where
        H: ContainerHost<Child = C>,
    {
        if let Some(child) = self.child.take() {
            tracing::debug!("discarding child source");
            host.discard_child(child);
        }
        self.assembler.reset();
    }

    pub fn child(&self) -> Option<&C> {
        self.child.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.assembler.is_complete()
    }
}

impl<C> Default for SdpDemux<C> {
    fn default() -> Self {
        Self::new()
    }
}
