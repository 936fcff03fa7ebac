//! Accumulates a session description pushed in arbitrary chunks.
//!
//! ```text
//!              push(chunk)                 finish()
//!   ┌──────────────────────┐   ┌──────────────────────────────┐
//!   ▼                      │   │                              ▼
//! AwaitingMoreData ────────┘───┘                          Complete
//!        ▲                                                    │
//!        └─────────────────────── reset() ────────────────────┘
//! ```
//!
//! `Complete` is only left through [`reset`](SdpAssembler::reset); chunks
//! pushed while complete are rejected and leave the finished document
//! untouched.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblerState {
    #[default]
    AwaitingMoreData,
    Complete,
}

/// Result of pushing one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// Buffered; nothing to output yet.
    Accepted,
    /// The document is already complete.
    Rejected,
}

/// Result of the end-of-input signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// End of input arrived before any bytes.
    Empty,
    /// The full, valid UTF-8 document.
    Document(String),
    /// End of input was already processed.
    AlreadyComplete,
}

#[derive(Debug, Default)]
pub struct SdpAssembler {
    state: AssemblerState,
    buffer: Vec<u8>,
}

impl SdpAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == AssemblerState::Complete
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Push {
        match self.state {
            AssemblerState::AwaitingMoreData => {
                self.buffer.extend_from_slice(chunk);
                tracing::trace!(chunk = chunk.len(), total = self.buffer.len(), "buffered SDP chunk");
                Push::Accepted
            }
            AssemblerState::Complete => Push::Rejected,
        }
    }

    /// Mark end of input and hand out the document.
    ///
    /// The transition to `Complete` happens even when the document turns
    /// out empty or is not valid UTF-8; in the latter case the error is
    /// returned and the assembler accepts nothing more until reset.
    pub fn finish(&mut self) -> Result<Completion> {
        if self.state == AssemblerState::Complete {
            return Ok(Completion::AlreadyComplete);
        }
        self.state = AssemblerState::Complete;

        let bytes = std::mem::take(&mut self.buffer);
        if bytes.is_empty() {
            tracing::warn!("end of input without any SDP data");
            return Ok(Completion::Empty);
        }

        let document = String::from_utf8(bytes)?;
        tracing::debug!(len = document.len(), "SDP document complete");
        Ok(Completion::Document(document))
    }

    pub fn reset(&mut self) {
        self.state = AssemblerState::AwaitingMoreData;
        self.buffer = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VqeError;

    #[test]
    fn chunks_concatenate_in_order() {
        let mut asm = SdpAssembler::new();
        for chunk in ["v=0\r\n", "s=-\r\n", "", "m=video 1 RTP/AVP 33\r\n"] {
            assert_eq!(asm.push(chunk.as_bytes()), Push::Accepted);
        }
        assert_eq!(
            asm.finish().unwrap(),
            Completion::Document("v=0\r\ns=-\r\nm=video 1 RTP/AVP 33\r\n".into())
        );
        assert!(asm.is_complete());
    }

    #[test]
    fn chunk_split_inside_utf8_sequence() {
        let text = "s=Café\r\n".as_bytes();
        let mut asm = SdpAssembler::new();
        asm.push(&text[..6]);
        asm.push(&text[6..]);
        assert_eq!(asm.finish().unwrap(), Completion::Document("s=Café\r\n".into()));
    }

    #[test]
    fn complete_rejects_further_input() {
        let mut asm = SdpAssembler::new();
        asm.push(b"v=0\r\n");
        let doc = asm.finish().unwrap();
        assert_eq!(asm.push(b"extra"), Push::Rejected);
        assert_eq!(asm.len(), 0);
        assert_eq!(asm.finish().unwrap(), Completion::AlreadyComplete);
        assert_eq!(doc, Completion::Document("v=0\r\n".into()));
    }

    #[test]
    fn empty_input_completes_without_document() {
        let mut asm = SdpAssembler::new();
        assert_eq!(asm.finish().unwrap(), Completion::Empty);
        assert!(asm.is_complete());
        assert_eq!(asm.push(b"v=0"), Push::Rejected);
    }

    #[test]
    fn invalid_utf8_is_fatal_and_terminal() {
        let mut asm = SdpAssembler::new();
        asm.push(&[b'v', b'=', 0xff, 0xfe]);
        assert!(matches!(asm.finish(), Err(VqeError::InvalidEncoding(_))));
        assert!(asm.is_complete());
        assert_eq!(asm.push(b"v=0"), Push::Rejected);
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut asm = SdpAssembler::new();
        asm.push(b"partial");
        asm.reset();
        assert_eq!(asm.state(), AssemblerState::AwaitingMoreData);
        assert!(asm.is_empty());
        asm.push(b"v=0\r\n");
        assert_eq!(asm.finish().unwrap(), Completion::Document("v=0\r\n".into()));
    }
}
