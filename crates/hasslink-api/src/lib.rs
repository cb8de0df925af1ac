// hasslink-api: Async Rust client for the Home Assistant WebSocket API

pub mod correlator;
pub mod error;
pub mod models;
pub mod protocol;
pub mod websocket;

pub use correlator::Correlator;
pub use error::Error;
pub use models::{AreaEntry, DeviceEntry, EntityRegistryEntry, State};
pub use protocol::{Command, EventFrame, HassEvent, Inbound, ResultFrame, StateChangedData};
pub use websocket::{ConnectOptions, Connection, EventSink, websocket_url};
