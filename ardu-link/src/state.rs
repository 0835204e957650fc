use std::fmt;

/// What we know about a selected port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl PortInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vendor_id, self.product_id) {
            write!(f, " [{vid:04x}:{pid:04x}]")?;
        }
        if let Some(manufacturer) = &self.manufacturer {
            write!(f, " {manufacturer}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    PortSelected(PortInfo),
    Connected(PortInfo),
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::PortSelected(port) => write!(f, "selected {port}"),
            Self::Connected(port) => write!(f, "connected to {port}"),
            Self::Error(err) => write!(f, "error: {err}"),
        }
    }
}
