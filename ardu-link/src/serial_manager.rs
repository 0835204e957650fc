use std::{cell::RefCell, rc::Rc};

use ardu_mavlink::{DecoderStats, FrameDecoder, Message};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::{
    backend::SerialBackend,
    error::SerialError,
    state::{ConnectionState, PortInfo},
};

const READ_CHUNK_LEN: usize = 1024;

/// State shared between the manager and its read loop.
/// Nothing in here is borrowed across an await point.
struct Shared {
    state: RefCell<ConnectionState>,
    decoder: RefCell<FrameDecoder>,
    message_tx: RefCell<Vec<mpsc::UnboundedSender<Message>>>,
    state_tx: RefCell<Vec<mpsc::UnboundedSender<ConnectionState>>>,
}

impl Shared {
    /// Mutate and notify in one go, so subscribers never see a stale state.
    fn set_state(&self, state: ConnectionState) {
        debug!("connection state: {state:?}");
        *self.state.borrow_mut() = state.clone();
        self.state_tx
            .borrow_mut()
            .retain(|tx| tx.send(state.clone()).is_ok());
    }

    fn publish(&self, msg: Message) {
        self.message_tx
            .borrow_mut()
            .retain(|tx| tx.send(msg.clone()).is_ok());
    }
}

/// An open port: the writer stays here, the reader lives in the read loop.
struct Link {
    writer: Box<dyn AsyncWrite + Unpin>,
    stop_tx: mpsc::Sender<()>,
    done_rx: oneshot::Receiver<()>,
}

/// Owns one serial connection at a time and turns its bytes into [`Message`]s.
///
/// Messages and state changes are pushed to whoever subscribed through
/// [`subscribe_messages`](Self::subscribe_messages) and
/// [`subscribe_state`](Self::subscribe_state).
///
/// The read loop is spawned with `spawn_local`, so on native targets the
/// manager has to be used from within a `tokio::task::LocalSet`.
pub struct SerialManager<B: SerialBackend> {
    backend: B,
    port: Option<(B::Port, PortInfo)>,
    link: Option<Link>,
    shared: Rc<Shared>,
}

impl<B: SerialBackend> SerialManager<B> {
    pub fn new(backend: B) -> Self {
        Self::with_decoder(backend, default_decoder())
    }

    pub fn with_decoder(backend: B, decoder: FrameDecoder) -> Self {
        Self {
            backend,
            port: None,
            link: None,
            shared: Rc::new(Shared {
                state: RefCell::new(ConnectionState::Disconnected),
                decoder: RefCell::new(decoder),
                message_tx: RefCell::new(Vec::new()),
                state_tx: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Whether a port is open. Stays true after a read error until [`disconnect`](Self::disconnect).
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.message_tx.borrow_mut().push(tx);
        rx
    }

    pub fn subscribe_state(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.state_tx.borrow_mut().push(tx);
        rx
    }

    fn fail(&self, err: SerialError) -> SerialError {
        warn!("{err}");
        self.shared.set_state(ConnectionState::Error(err.to_string()));
        err
    }

    /// Ask the backend for a port and remember it. The port isn't opened yet.
    pub async fn request_port(&mut self) -> Result<PortInfo, SerialError> {
        if self.link.is_some() {
            warn!("refusing to select another port while connected");
            return Err(SerialError::AlreadyConnected);
        }
        if !self.backend.is_supported() {
            return Err(self.fail(SerialError::Unsupported));
        }
        match self.backend.request_port().await {
            Ok((port, info)) => {
                self.port = Some((port, info.clone()));
                self.shared
                    .set_state(ConnectionState::PortSelected(info.clone()));
                Ok(info)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Open the selected port and start reading from it.
    pub async fn connect(&mut self, baud_rate: u32) -> Result<(), SerialError> {
        if self.link.is_some() {
            warn!("already connected; disconnect first");
            return Err(SerialError::AlreadyConnected);
        }
        let Some((port, info)) = &self.port else {
            return Err(self.fail(SerialError::NoPortSelected));
        };
        let info = info.clone();
        let duplex = match self.backend.open(port, baud_rate).await {
            Ok(duplex) => duplex,
            Err(e) => return Err(self.fail(e)),
        };

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        self.link = Some(Link {
            writer: duplex.writer,
            stop_tx,
            done_rx,
        });
        self.shared.set_state(ConnectionState::Connected(info));
        spawn_local(read_loop(
            duplex.reader,
            stop_rx,
            self.shared.clone(),
            done_tx,
        ));
        Ok(())
    }

    /// Stop reading, close the port and forget it. Calling it again does nothing.
    pub async fn disconnect(&mut self) {
        if let Some(Link {
            writer,
            stop_tx,
            done_rx,
        }) = self.link.take()
        {
            // the read loop stops once the sender is gone, then drops the reader
            drop(stop_tx);
            let _ = done_rx.await;
            drop(writer);
        }
        if let Some((port, _)) = self.port.take()
            && let Err(e) = self.backend.close(&port).await
        {
            warn!("error while disconnecting: {e}");
        }
        if self.state() != ConnectionState::Disconnected {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }

    /// Write all of `bytes` to the port. Failures are reported, never retried.
    pub async fn write_data(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let Some(link) = self.link.as_mut() else {
            return Err(SerialError::NotConnected);
        };
        let result = match link.writer.write_all(bytes).await {
            Ok(()) => link.writer.flush().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            warn!("error writing to serial port: {e}");
            SerialError::Write(e)
        })
    }

    pub fn parser_stats(&self) -> DecoderStats {
        self.shared.decoder.borrow().stats()
    }

    pub fn clear_parser(&self) {
        self.shared.decoder.borrow_mut().clear();
    }
}

async fn read_loop(
    mut reader: Box<dyn AsyncRead + Unpin>,
    mut stop_rx: mpsc::Receiver<()>,
    shared: Rc<Shared>,
    done_tx: oneshot::Sender<()>,
) {
    let mut buffer = [0; READ_CHUNK_LEN];
    loop {
        tokio::select! {
            biased;

            _ = stop_rx.recv() => {
                debug!("read loop received stop");
                break;
            }

            res = reader.read(&mut buffer) => match res {
                Ok(0) => {
                    debug!("end of stream");
                    break;
                }
                Ok(n) => {
                    let messages = shared.decoder.borrow_mut().feed(&buffer[..n]);
                    for msg in messages {
                        shared.publish(msg);
                    }
                }
                Err(e) => {
                    let err = SerialError::Read(e);
                    warn!("{err}");
                    shared.set_state(ConnectionState::Error(err.to_string()));
                    break;
                }
            }
        }
    }
    drop(reader);
    let _ = done_tx.send(());
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_local(fut: impl Future<Output = ()> + 'static) {
    tokio::task::spawn_local(fut);
}

#[cfg(target_arch = "wasm32")]
fn spawn_local(fut: impl Future<Output = ()> + 'static) {
    wasm_bindgen_futures::spawn_local(fut);
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn default_decoder() -> FrameDecoder {
    FrameDecoder::new()
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn default_decoder() -> FrameDecoder {
    FrameDecoder::new().with_clock(crate::backend::now)
}
