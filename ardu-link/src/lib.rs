pub mod backend;
pub mod error;
pub mod history;
pub mod serial_manager;
pub mod settings;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{Duplex, SerialBackend};
pub use error::SerialError;
pub use history::MessageHistory;
pub use serial_manager::SerialManager;
pub use settings::Settings;
pub use state::{ConnectionState, PortInfo};
