//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "UART transport abstraction."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Byte-level transport seam between the channel drivers and a UART.
//!
//! The controller only ever asks for "whatever bytes are available right
//! now" and never blocks on a read, so the trait is deliberately small.

pub mod mock;

use thiserror::Error;

pub use mock::MockUart;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport {name} is closed")]
    Closed { name: String },
    #[error("transport i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Non-blocking byte transport used by all channel drivers.
pub trait Transport: Send + Sync {
    /// Return the bytes received since the previous call; empty when idle.
    fn try_read(&self) -> Result<Vec<u8>>;
    /// Queue bytes for transmission.
    fn write(&self, bytes: &[u8]) -> Result<()>;
    /// Human-readable transport name for logging.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn try_read(&self) -> Result<Vec<u8>> {
        (**self).try_read()
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
