use futures::{AsyncRead, AsyncWrite};

use crate::{error::SerialError, state::PortInfo};

#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeSerial;
#[cfg(target_arch = "wasm32")]
pub use web::{WebSerial, now};

/// The two directions of an open port.
pub struct Duplex {
    pub reader: Box<dyn AsyncRead + Unpin>,
    pub writer: Box<dyn AsyncWrite + Unpin>,
}

/// What the host has to offer to talk to a serial device.
///
/// Implementations only hand out handles and byte streams; the connection
/// lifecycle is driven by [`SerialManager`](crate::serial_manager::SerialManager).
#[allow(async_fn_in_trait)]
pub trait SerialBackend {
    type Port;

    /// Whether this environment can reach serial ports at all.
    fn is_supported(&self) -> bool;

    /// Let the user (or the OS) pick a port. Doesn't open it.
    async fn request_port(&self) -> Result<(Self::Port, PortInfo), SerialError>;

    async fn open(&self, port: &Self::Port, baud_rate: u32) -> Result<Duplex, SerialError>;

    /// Called once both halves of the [`Duplex`] have been dropped.
    async fn close(&self, port: &Self::Port) -> Result<(), SerialError>;
}
