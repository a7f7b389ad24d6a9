//! Frame delivery to the remote stream endpoint
//!
//! - `StreamTransport` queues frames and writes them over one connection per session
//! - `NatsConnector` provides that connection
//! - `HttpFinalizer` carries the end-of-stream signal on a separate request channel

pub mod finalize;
pub mod messages;
pub mod nats;
pub mod transport;

pub use finalize::{FinalizeChannel, HttpFinalizer};
pub use messages::{FinalizeRequest, FrameMessage, StreamAck};
pub use nats::{NatsConnector, NatsFrameSink};
pub use transport::{FrameSender, FrameSink, StreamConnector, StreamTransport};
