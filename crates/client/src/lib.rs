//! Hub connection lifecycle manager.
//!
//! Maintains a persistent, bidirectional RPC connection to a remote hub:
//! builds it, reconnects it automatically after unexpected disconnects,
//! exposes its status as immutable snapshots, and funnels outbound call
//! failures into a single error sink.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod manager;
pub mod methods;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod status;
pub mod transport;
pub mod types;
pub mod ws;

pub use config::{ClientConfig, ConfigError};
pub use connection::{CallError, ConnectError, HubConnection, StreamItem};
pub use handlers::{HandlerId, HandlerRegistry};
pub use manager::{LifecycleManager, Phase};
pub use methods::HubProxy;
pub use status::{StatusSnapshot, StatusWatch};
pub use transport::{Link, Transport, TransportError};
pub use types::{ConnectionState, DisplayDuration, ErrorNotice, LifecycleInput, RetryPolicy};
pub use ws::WsTransport;
