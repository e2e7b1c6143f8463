//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "In-memory UART used for simulation and tests."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::{Result, Transport, TransportError};

#[derive(Debug, Default)]
struct UartState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    read_chunk: Option<usize>,
    closed: bool,
    peer: Option<Weak<Mutex<UartState>>>,
}

/// In-memory UART backed by mutex protected byte queues.
///
/// Clones share the same queues, so a test can keep one handle while the
/// channel driver owns another. Two mocks linked with
/// [`MockUart::connect_physical_peer`] behave like a crossed serial cable:
/// bytes written on one side arrive on the other side's receive queue.
#[derive(Debug, Clone)]
pub struct MockUart {
    name: Arc<str>,
    state: Arc<Mutex<UartState>>,
}

impl MockUart {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(UartState::default())),
        }
    }

    /// Limit every read to at most `chunk` bytes to exercise partial delivery.
    pub fn with_read_chunk(self, chunk: usize) -> Self {
        self.state.lock().read_chunk = Some(chunk.max(1));
        self
    }

    /// Push bytes onto the receive side as if they arrived on the wire.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Push a text line; the terminating newline is added.
    pub fn inject_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.rx.extend(line.trim_end_matches(['\r', '\n']).bytes());
        state.rx.push_back(b'\n');
    }

    /// Take everything written since the previous drain.
    pub fn drain_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().tx)
    }

    /// Take everything written since the previous drain, split into lines.
    /// A trailing partial line is returned as well.
    pub fn drain_tx_lines(&self) -> Vec<String> {
        let bytes = self.drain_tx();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }

    pub fn pending_rx(&self) -> usize {
        self.state.lock().rx.len()
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Wire this UART to `other` in both directions.
    pub fn connect_physical_peer(&self, other: &MockUart) {
        self.state.lock().peer = Some(Arc::downgrade(&other.state));
        other.state.lock().peer = Some(Arc::downgrade(&self.state));
    }

    pub fn disconnect_physical_peer(&self) {
        let peer = self.state.lock().peer.take();
        if let Some(peer) = peer.and_then(|weak| weak.upgrade()) {
            peer.lock().peer = None;
        }
    }

    fn closed_error(&self) -> TransportError {
        TransportError::Closed {
            name: self.name.to_string(),
        }
    }
}

impl Transport for MockUart {
    fn try_read(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let take = state.read_chunk.unwrap_or(usize::MAX).min(state.rx.len());
        Ok(state.rx.drain(..take).collect())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let peer = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(self.closed_error());
            }
            match state.peer.as_ref().and_then(Weak::upgrade) {
                Some(peer) => peer,
                None => {
                    state.tx.extend_from_slice(bytes);
                    return Ok(());
                }
            }
        };
        trace!(uart = %self.name, len = bytes.len(), "forwarding to physical peer");
        peer.lock().rx.extend(bytes.iter().copied());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
