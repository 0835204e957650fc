//! In-memory serial backend, for exercising [`SerialManager`](crate::serial_manager::SerialManager)
//! without hardware.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    rc::Rc,
};

use futures::{TryStreamExt, stream};
use tokio::{
    io::{AsyncReadExt, DuplexStream},
    sync::mpsc,
};
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::{
    backend::{Duplex, SerialBackend},
    error::SerialError,
    state::PortInfo,
};

const OUTBOUND_CAPACITY: usize = 4096;

#[derive(Default)]
struct Probe {
    devices: RefCell<VecDeque<MemoryDevice>>,
    baud_rate: Cell<Option<u32>>,
    closed: Cell<usize>,
}

/// A backend whose single port is backed by channels.
///
/// Every successful `open` produces a [`MemoryDevice`], the far end of the
/// connection, which can be picked up through a [`MemoryHandle`].
pub struct MemoryBackend {
    supported: bool,
    selection_error: Option<String>,
    open_error: Option<String>,
    probe: Rc<Probe>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            supported: true,
            selection_error: None,
            open_error: None,
            probe: Rc::default(),
        }
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Make every port selection fail as if the user dismissed the picker.
    pub fn cancel_selection(mut self, reason: &str) -> Self {
        self.selection_error = Some(reason.to_string());
        self
    }

    pub fn fail_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            probe: self.probe.clone(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBackend for MemoryBackend {
    type Port = PortInfo;

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_port(&self) -> Result<(PortInfo, PortInfo), SerialError> {
        if let Some(reason) = &self.selection_error {
            return Err(SerialError::Selection(reason.clone()));
        }
        let info = PortInfo::named("memory");
        Ok((info.clone(), info))
    }

    async fn open(&self, _port: &PortInfo, baud_rate: u32) -> Result<Duplex, SerialError> {
        if let Some(reason) = &self.open_error {
            return Err(SerialError::Open(reason.clone()));
        }
        self.probe.baud_rate.set(Some(baud_rate));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<io::Result<Vec<u8>>>();
        let reader = Box::pin(stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }))
        .into_async_read();
        let (near, far) = tokio::io::duplex(OUTBOUND_CAPACITY);

        self.probe.devices.borrow_mut().push_back(MemoryDevice {
            inbound: Some(inbound_tx),
            outbound: Some(far),
        });
        Ok(Duplex {
            reader: Box::new(reader),
            writer: Box::new(near.compat_write()),
        })
    }

    async fn close(&self, _port: &PortInfo) -> Result<(), SerialError> {
        self.probe.closed.set(self.probe.closed.get() + 1);
        Ok(())
    }
}

/// Test-side view of a [`MemoryBackend`] that has been moved into a manager.
#[derive(Clone)]
pub struct MemoryHandle {
    probe: Rc<Probe>,
}

impl MemoryHandle {
    /// The device end of the oldest connection not yet picked up.
    pub fn next_device(&self) -> MemoryDevice {
        self.probe
            .devices
            .borrow_mut()
            .pop_front()
            .expect("no port has been opened")
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.probe.baud_rate.get()
    }

    pub fn close_count(&self) -> usize {
        self.probe.closed.get()
    }
}

/// The device end of an open memory port.
pub struct MemoryDevice {
    inbound: Option<mpsc::UnboundedSender<io::Result<Vec<u8>>>>,
    outbound: Option<DuplexStream>,
}

impl MemoryDevice {
    /// Deliver `bytes` as one chunk. Returns false once the reader is gone.
    pub fn send(&self, bytes: &[u8]) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(bytes.to_vec())).is_ok())
    }

    /// Make the pending read fail, like an unplugged device would.
    pub fn fail(&mut self, kind: io::ErrorKind) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(io::Error::new(kind, "device unplugged")));
        }
    }

    /// End the inbound stream.
    pub fn hang_up(mut self) {
        self.inbound = None;
    }

    /// Drop our end of the outbound stream; later writes fail.
    pub fn unplug_writer(&mut self) {
        self.outbound = None;
    }

    /// Read exactly `n` bytes written by the manager.
    pub async fn read_written(&mut self, n: usize) -> Vec<u8> {
        let outbound = self.outbound.as_mut().expect("writer unplugged");
        let mut buf = vec![0; n];
        outbound
            .read_exact(&mut buf)
            .await
            .expect("couldn't read written bytes");
        buf
    }
}
