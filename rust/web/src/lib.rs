//! Real-time four-in-a-row match server.
//!
//! Players connect over `/ws`, send a `join` frame and are paired first come,
//! first served. A player left waiting past the matchmaking timeout plays the
//! automated opponent instead. Results flow through a write-only [`Sink`] and
//! are aggregated by the read-side statistics endpoints.

pub mod config;
pub mod connection;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sink;
pub mod stats;
pub mod store;

pub use config::{ConfigError, ConfigOverrides, HubSettings, ServerConfig};
pub use connection::{Connection, ConnectionId, Outbox};
pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use hub::{Hub, HubError};
pub use logging::{init_logging, init_test_logging, LogEntry, LogFormat, TestLogSubscriber};
pub use protocol::{ClientFrame, ServerFrame, SessionId};
pub use server::{AppContext, ServerError, ServerHandle, WebServer};
pub use sink::{
    EventRecord, EventTopic, MemorySink, NoopSink, ResultRecord, ResultStore, SessionRecord, Sink,
    SinkError, SinkHandle, SinkRecord,
};
pub use store::SqliteStore;
