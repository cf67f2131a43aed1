//! Whiteboard Core Library
//!
//! Transport-agnostic session registry and broadcast relay for the
//! whiteboard server: who is connected, which session they are in, the
//! last saved canvas per session, and the fan-out of events between
//! session members.

pub mod connection;
pub mod hub;
pub mod protocol;
pub mod session;

pub use connection::{Connection, ConnectionId, ConnectionRegistry, Identity, OutboundSender};
pub use hub::Hub;
pub use protocol::{ClientMessage, Payload, ProtocolError, ServerMessage};
pub use session::{JoinOutcome, SessionRegistry};
