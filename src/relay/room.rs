use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::connection::{ConnectionId, ConnectionSink};
use super::signaling::{MessageKind, ServerEvent};

/// Participant slot within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    /// Anything that is not a recognized initiator name becomes `Student`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "teacher" | "initiator" => Role::Teacher,
            _ => Role::Student,
        }
    }

    pub fn peer(self) -> Self {
        match self {
            Role::Teacher => Role::Student,
            Role::Student => Role::Teacher,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Occupant {
    sink: Arc<dyn ConnectionSink>,
    name: Option<String>,
}

/// An offer held back until its target role shows up.
struct PendingOffer {
    from: Role,
    payload: String,
}

impl PendingOffer {
    fn target(&self) -> Role {
        self.from.peer()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub peer_present: bool,
    pub superseded: Option<ConnectionId>,
    pub delivered_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The sink no longer held the role; nothing changed.
    Stale,
    Left { now_empty: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Buffered,
    Dropped,
    Ignored,
}

/// Snapshot of a room's state for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub key: String,
    pub teacher: bool,
    pub student: bool,
    pub pending_offer: bool,
}

/// Role-to-connection table for one room plus the single-slot offer buffer.
///
/// All operations take `&mut self`; callers serialize access per room.
pub struct Room {
    key: String,
    teacher: Option<Occupant>,
    student: Option<Occupant>,
    pending: Option<PendingOffer>,
    retired: bool,
}

impl Room {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            teacher: None,
            student: None,
            pending: None,
            retired: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn slot(&self, role: Role) -> &Option<Occupant> {
        match role {
            Role::Teacher => &self.teacher,
            Role::Student => &self.student,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Occupant> {
        match role {
            Role::Teacher => &mut self.teacher,
            Role::Student => &mut self.student,
        }
    }

    pub fn is_occupied(&self, role: Role) -> bool {
        self.slot(role).is_some()
    }

    pub fn occupant_id(&self, role: Role) -> Option<ConnectionId> {
        self.slot(role).as_ref().map(|o| o.sink.id())
    }

    pub fn has_pending_offer(&self) -> bool {
        self.pending.is_some()
    }

    /// No occupants and nothing buffered.
    pub fn is_empty(&self) -> bool {
        self.teacher.is_none() && self.student.is_none() && self.pending.is_none()
    }

    /// A retired room has been pruned from the registry and refuses joins.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            key: self.key.clone(),
            teacher: self.teacher.is_some(),
            student: self.student.is_some(),
            pending_offer: self.pending.is_some(),
        }
    }

    pub fn join(
        &mut self,
        role: Role,
        sink: Arc<dyn ConnectionSink>,
        name: Option<String>,
    ) -> JoinOutcome {
        let key = self.key.clone();
        let joined_id = sink.id();

        // The previous holder keeps its transport; its own leave becomes a no-op.
        let superseded = self
            .slot_mut(role)
            .replace(Occupant { sink, name })
            .map(|previous| previous.sink.id());
        if let Some(previous) = superseded {
            tracing::warn!(
                room = %key,
                role = %role,
                previous = %previous,
                connection = %joined_id,
                "Role superseded by new connection"
            );
        }

        let mut delivered_pending = false;
        if self.pending.as_ref().is_some_and(|p| p.target() == role) {
            if let Some(pending) = self.pending.take() {
                self.deliver(role, &pending.payload);
                delivered_pending = true;
                tracing::debug!(room = %key, role = %role, from = %pending.from, "Delivered buffered offer");
            }
        }

        let peer = role.peer();
        let peer_present = self.is_occupied(peer);
        if peer_present {
            let joined_name = self.slot(role).as_ref().and_then(|o| o.name.clone());
            let peer_name = self.slot(peer).as_ref().and_then(|o| o.name.clone());

            self.notify(peer, &ServerEvent::presence(&key, role, joined_name.as_deref(), true));
            self.notify(role, &ServerEvent::presence(&key, peer, peer_name.as_deref(), true));
        }

        tracing::info!(
            room = %key,
            role = %role,
            connection = %joined_id,
            peer_present,
            "Participant joined room"
        );

        JoinOutcome {
            peer_present,
            superseded,
            delivered_pending,
        }
    }

    pub fn relay(&mut self, from: Role, kind: MessageKind, payload: &str) -> RelayOutcome {
        if !kind.is_negotiation() {
            return RelayOutcome::Ignored;
        }

        let peer = from.peer();
        if self.is_occupied(peer) {
            self.deliver(peer, payload);
            return RelayOutcome::Delivered;
        }

        if kind == MessageKind::Offer {
            if self.pending.is_some() {
                tracing::debug!(room = %self.key, from = %from, "Replacing buffered offer");
            }
            self.pending = Some(PendingOffer {
                from,
                payload: payload.to_string(),
            });
            tracing::debug!(room = %self.key, from = %from, "Peer absent, offer buffered");
            RelayOutcome::Buffered
        } else {
            tracing::debug!(room = %self.key, from = %from, kind = ?kind, "Peer absent, message dropped");
            RelayOutcome::Dropped
        }
    }

    pub fn leave(&mut self, role: Role, connection: ConnectionId) -> LeaveOutcome {
        if self.occupant_id(role) != Some(connection) {
            tracing::debug!(
                room = %self.key,
                role = %role,
                connection = %connection,
                "Ignoring leave from stale connection"
            );
            return LeaveOutcome::Stale;
        }

        let name = self.slot_mut(role).take().and_then(|o| o.name);

        let peer = role.peer();
        if self.is_occupied(peer) {
            let event = ServerEvent::presence(&self.key, role, name.as_deref(), false);
            self.notify(peer, &event);
        }

        if self.pending.as_ref().is_some_and(|p| p.from == role) {
            self.pending = None;
            tracing::debug!(room = %self.key, role = %role, "Discarded buffered offer of departed participant");
        }

        tracing::info!(room = %self.key, role = %role, connection = %connection, "Participant left room");

        LeaveOutcome::Left {
            now_empty: self.is_empty(),
        }
    }

    fn deliver(&self, role: Role, payload: &str) {
        let Some(occupant) = self.slot(role) else {
            return;
        };
        if let Err(e) = occupant.sink.send(payload) {
            tracing::debug!(room = %self.key, role = %role, error = %e, "Peer unreachable, message dropped");
        }
    }

    fn notify(&self, role: Role, event: &ServerEvent) {
        match event.to_json() {
            Ok(json) => self.deliver(role, &json),
            Err(e) => tracing::error!(room = %self.key, error = %e, "Failed to serialize server event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::testing::RecordingSink;

    const OFFER: &str = r#"{"type":"offer","sdp":"v=0 offer"}"#;
    const ANSWER: &str = r#"{"type":"answer","sdp":"X"}"#;

    #[test]
    fn test_role_normalization() {
        assert_eq!(Role::parse("teacher"), Role::Teacher);
        assert_eq!(Role::parse("initiator"), Role::Teacher);
        assert_eq!(Role::parse("student"), Role::Student);
        assert_eq!(Role::parse("Teacher"), Role::Student);
        assert_eq!(Role::parse("observer"), Role::Student);
        assert_eq!(Role::Teacher.peer(), Role::Student);
    }

    #[test]
    fn test_first_join_sends_nothing() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();

        let outcome = room.join(Role::Teacher, teacher.clone(), Some("Alice".into()));

        assert!(!outcome.peer_present);
        assert!(teacher.sent().is_empty());
        assert_eq!(room.key(), "r1");
        assert!(!room.is_empty());
    }

    #[test]
    fn test_second_join_notifies_both_sides() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();
        let student = RecordingSink::new();

        room.join(Role::Teacher, teacher.clone(), Some("Alice".into()));
        let outcome = room.join(Role::Student, student.clone(), Some("Bob".into()));

        assert!(outcome.peer_present);
        assert_eq!(teacher.sent_json()[0]["text"], "student Bob connected");
        assert_eq!(student.sent_json()[0]["text"], "teacher Alice connected");
    }

    #[test]
    fn test_offer_buffered_until_student_joins() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();
        room.join(Role::Teacher, teacher.clone(), None);

        assert_eq!(room.relay(Role::Teacher, MessageKind::Offer, OFFER), RelayOutcome::Buffered);
        assert!(room.has_pending_offer());

        let student = RecordingSink::new();
        let outcome = room.join(Role::Student, student.clone(), None);

        assert!(outcome.delivered_pending);
        assert_eq!(student.sent()[0], OFFER);
        assert!(!room.has_pending_offer());
    }

    #[test]
    fn test_second_offer_overwrites_buffer() {
        let mut room = Room::new("r1");
        room.join(Role::Teacher, RecordingSink::new(), None);

        room.relay(Role::Teacher, MessageKind::Offer, r#"{"type":"offer","sdp":"first"}"#);
        room.relay(Role::Teacher, MessageKind::Offer, r#"{"type":"offer","sdp":"second"}"#);

        let student = RecordingSink::new();
        room.join(Role::Student, student.clone(), None);

        let offers: Vec<_> = student
            .sent_json()
            .into_iter()
            .filter(|m| m["type"] == "offer")
            .collect();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0]["sdp"], "second");
    }

    #[test]
    fn test_answer_and_candidate_dropped_without_peer() {
        let mut room = Room::new("r1");
        room.join(Role::Student, RecordingSink::new(), None);

        assert_eq!(room.relay(Role::Student, MessageKind::Answer, ANSWER), RelayOutcome::Dropped);
        assert_eq!(
            room.relay(Role::Student, MessageKind::IceCandidate, r#"{"type":"ice-candidate"}"#),
            RelayOutcome::Dropped
        );
        assert!(!room.has_pending_offer());
    }

    #[test]
    fn test_relay_is_verbatim_and_directed() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();
        let student = RecordingSink::new();
        room.join(Role::Teacher, teacher.clone(), None);
        room.join(Role::Student, student.clone(), None);
        teacher.take();
        student.take();

        assert_eq!(room.relay(Role::Teacher, MessageKind::Answer, ANSWER), RelayOutcome::Delivered);

        assert_eq!(student.sent(), vec![ANSWER.to_string()]);
        assert!(teacher.sent().is_empty());
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        let mut room = Room::new("r1");
        let student = RecordingSink::new();
        room.join(Role::Teacher, RecordingSink::new(), None);
        room.join(Role::Student, student.clone(), None);
        student.take();

        assert_eq!(room.relay(Role::Teacher, MessageKind::Unknown, "{}"), RelayOutcome::Ignored);
        assert_eq!(room.relay(Role::Teacher, MessageKind::Join, "{}"), RelayOutcome::Ignored);
        assert!(student.sent().is_empty());
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let mut room = Room::new("r1");
        let student = RecordingSink::new();
        room.join(Role::Teacher, RecordingSink::new(), None);
        room.join(Role::Student, student.clone(), None);
        student.close();

        assert_eq!(room.relay(Role::Teacher, MessageKind::Offer, OFFER), RelayOutcome::Delivered);
        assert!(!room.has_pending_offer());
    }

    #[test]
    fn test_leave_notifies_peer_once() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();
        let student = RecordingSink::new();
        room.join(Role::Teacher, teacher.clone(), Some("Alice".into()));
        room.join(Role::Student, student.clone(), None);
        student.take();

        let outcome = room.leave(Role::Teacher, teacher.id());

        assert_eq!(outcome, LeaveOutcome::Left { now_empty: false });
        let received = student.sent_json();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "info");
        assert_eq!(received[0]["text"], "teacher Alice disconnected");
        assert_eq!(received[0]["from_role"], "teacher");
    }

    #[test]
    fn test_leave_clears_own_pending_offer() {
        let mut room = Room::new("r1");
        let teacher = RecordingSink::new();
        room.join(Role::Teacher, teacher.clone(), None);
        room.relay(Role::Teacher, MessageKind::Offer, OFFER);

        let outcome = room.leave(Role::Teacher, teacher.id());

        assert_eq!(outcome, LeaveOutcome::Left { now_empty: true });
        assert!(room.is_empty());
    }

    #[test]
    fn test_superseded_connection_leave_is_noop() {
        let mut room = Room::new("r1");
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        let student = RecordingSink::new();

        room.join(Role::Teacher, first.clone(), None);
        room.join(Role::Student, student.clone(), None);
        let outcome = room.join(Role::Teacher, second.clone(), None);
        assert_eq!(outcome.superseded, Some(first.id()));
        assert!(!first.is_closed());
        student.take();

        assert_eq!(room.leave(Role::Teacher, first.id()), LeaveOutcome::Stale);
        assert_eq!(room.leave(Role::Teacher, first.id()), LeaveOutcome::Stale);

        assert_eq!(room.occupant_id(Role::Teacher), Some(second.id()));
        assert!(student.sent().is_empty());
    }
}
