use log::debug;
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use super::{Duplex, SerialBackend};
use crate::{error::SerialError, state::PortInfo};

/// Serial ports of the local machine.
///
/// There is no picker dialog here: `request_port` takes the configured port
/// name, or the first port the OS enumerates.
pub struct NativeSerial {
    port_name: Option<String>,
}

impl NativeSerial {
    pub fn new(port_name: Option<String>) -> Self {
        Self { port_name }
    }

    pub fn list_ports() -> Result<Vec<PortInfo>, SerialError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| SerialError::Selection(e.to_string()))?;
        Ok(ports.into_iter().map(port_info).collect())
    }
}

fn port_info(port: SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name: port.port_name,
            manufacturer: usb.manufacturer,
            serial_number: usb.serial_number,
            vendor_id: Some(usb.vid),
            product_id: Some(usb.pid),
        },
        _ => PortInfo::named(port.port_name),
    }
}

impl SerialBackend for NativeSerial {
    type Port = String;

    fn is_supported(&self) -> bool {
        tokio_serial::available_ports().is_ok()
    }

    async fn request_port(&self) -> Result<(String, PortInfo), SerialError> {
        let info = match &self.port_name {
            // pseudo terminals don't show up when enumerating, so a configured name is taken as is
            Some(name) => Self::list_ports()
                .ok()
                .and_then(|ports| ports.into_iter().find(|p| p.name == *name))
                .unwrap_or_else(|| PortInfo::named(name.clone())),
            None => Self::list_ports()?
                .into_iter()
                .next()
                .ok_or_else(|| SerialError::Selection("no serial ports found".into()))?,
        };
        debug!("selected port: {info:?}");
        Ok((info.name.clone(), info))
    }

    async fn open(&self, port: &String, baud_rate: u32) -> Result<Duplex, SerialError> {
        debug!("opening {port} at {baud_rate} baud");
        let stream = tokio_serial::new(port, baud_rate)
            .open_native_async()
            .map_err(|e| SerialError::Open(e.to_string()))?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Duplex {
            reader: Box::new(reader.compat()),
            writer: Box::new(writer.compat_write()),
        })
    }

    async fn close(&self, port: &String) -> Result<(), SerialError> {
        // the file descriptor went away with the last half of the stream
        debug!("closed {port}");
        Ok(())
    }
}
