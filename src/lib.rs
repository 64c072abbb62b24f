//! Thorstream client: blocking producer and consumer for the legacy binary wire protocol.

pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod observability;
pub mod producer;
pub mod protocol;
pub mod transport;

pub use config::ClientConfig;
pub use consumer::{Consumer, Poller, StopHandle};
pub use error::{ClientError, Result};
pub use message::Message;
pub use producer::{Batch, Producer};
pub use protocol::{FetchResponse, MessageSet, Request, RequestType};
pub use transport::{Connector, SocketTransport, TcpConnector, TcpTransport, Transport};
