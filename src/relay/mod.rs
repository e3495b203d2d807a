pub mod connection;
mod registry;
mod room;
mod signaling;

pub use connection::{ConnectionId, ConnectionSink, WsSink};
pub use registry::{Membership, RoomRegistry, SharedRoom};
pub use room::{JoinOutcome, LeaveOutcome, RelayOutcome, Role, Room, RoomSummary};
pub use signaling::{MessageKind, ServerEvent, SignalEnvelope};
