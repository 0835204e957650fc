use log::debug;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use wasm_streams::{ReadableStream, WritableStream};
use web_sys::{SerialOptions, SerialPort};

use super::{Duplex, SerialBackend};
use crate::{error::SerialError, state::PortInfo};

/// Browser serial ports through the Web Serial API.
#[derive(Default)]
pub struct WebSerial;

impl WebSerial {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for WebSerial {
    type Port = SerialPort;

    fn is_supported(&self) -> bool {
        web_sys::window()
            .and_then(|window| {
                js_sys::Reflect::has(&window.navigator(), &JsValue::from_str("serial")).ok()
            })
            .unwrap_or(false)
    }

    async fn request_port(&self) -> Result<(SerialPort, PortInfo), SerialError> {
        let window = web_sys::window().ok_or(SerialError::Unsupported)?;
        let port = JsFuture::from(window.navigator().serial().request_port())
            .await
            .map_err(|e| SerialError::Selection(format!("{e:?}")))?;
        // getInfo() only exposes USB ids on some browsers, so we don't bother with it
        Ok((port.unchecked_into(), PortInfo::named("Serial Port")))
    }

    async fn open(&self, port: &SerialPort, baud_rate: u32) -> Result<Duplex, SerialError> {
        if let Err(e) = JsFuture::from(port.open(&SerialOptions::new(baud_rate))).await {
            return Err(SerialError::Open(format!("{e:?}")));
        }
        let reader = ReadableStream::from_raw(port.readable()).into_async_read();
        let writer = WritableStream::from_raw(port.writable()).into_async_write();
        Ok(Duplex {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    async fn close(&self, port: &SerialPort) -> Result<(), SerialError> {
        if let Err(e) = JsFuture::from(port.close()).await {
            return Err(SerialError::Close(format!("{e:?}")));
        }
        debug!("serial port closed");
        Ok(())
    }
}

/// [`Clock`](ardu_mavlink::Clock) for the browser, where `SystemTime` is unavailable.
pub fn now() -> u64 {
    js_sys::Date::now() as u64
}
