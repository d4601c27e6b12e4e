//! ReadQueue models.
//!
//! Domain records held by the stores and the JSON request/response types
//! exchanged with clients. Wire names are camelCase; the group field is
//! called `subGroup` on the wire.

use crate::errors::RqError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name of the protected default group. It always exists and is never deleted.
pub const DEFAULT_GROUP: &str = "General";

/// Maximum group name length.
pub const MAX_GROUP_NAME_LENGTH: usize = 64;

/// Maximum participant display name length.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Returns true if `name` refers to the protected default group.
///
/// Comparison is case-insensitive so that "general" cannot be deleted either.
pub fn is_default_group(name: &str) -> bool {
    name.eq_ignore_ascii_case(DEFAULT_GROUP)
}

/// Validate a group name, returning the trimmed form.
pub fn validate_group_name(name: &str) -> Result<&str, RqError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(RqError::InvalidArgument(
            "Sub-group name must not be empty".to_string(),
        ));
    }

    if trimmed.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(RqError::InvalidArgument(format!(
            "Sub-group name must be at most {} characters",
            MAX_GROUP_NAME_LENGTH
        )));
    }

    Ok(trimmed)
}

/// Validate a participant display name, returning the trimmed form.
pub fn validate_display_name(name: &str) -> Result<&str, RqError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(RqError::InvalidArgument("Name must not be empty".to_string()));
    }

    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(RqError::InvalidArgument(format!(
            "Name must be at most {} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }

    Ok(trimmed)
}

// ============================================================================
// Domain records
// ============================================================================

/// A named partition of the turn queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    /// Opaque group identifier.
    pub id: Uuid,

    /// Unique, case-sensitive group name.
    pub name: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A participant waiting in a group's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Session token minted at join time.
    pub session_id: Uuid,

    /// Display name.
    pub name: String,

    /// Group this participant is queued in.
    #[serde(rename = "subGroup")]
    pub group_name: String,

    /// Ordering key. Rewritten to "now" by skip/finish.
    pub joined_at: DateTime<Utc>,

    /// Liveness key. Refreshed by every status poll and action.
    pub last_active: DateTime<Utc>,
}

/// Actions a participant can take on its own queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    /// Begin using the station. Only refreshes liveness.
    Start,

    /// Give up the turn and move to the back of the group.
    Skip,

    /// Done with the turn; move to the back of the group.
    Finish,
}

impl QueueAction {
    /// Returns the wire representation of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Start => "start",
            QueueAction::Skip => "skip",
            QueueAction::Finish => "finish",
        }
    }

    /// Whether this action moves the participant to the tail of its group.
    pub fn demotes(&self) -> bool {
        matches!(self, QueueAction::Skip | QueueAction::Finish)
    }
}

impl FromStr for QueueAction {
    type Err = RqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(QueueAction::Start),
            "skip" => Ok(QueueAction::Skip),
            "finish" => Ok(QueueAction::Finish),
            _ => Err(RqError::InvalidArgument(
                "Invalid action. Use 'start', 'skip', or 'finish'".to_string(),
            )),
        }
    }
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known kinds of WebRTC handshake message.
///
/// The relay forwards any `type` string untouched; this classification only
/// bounds the metric label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Other,
}

impl SignalKind {
    /// Classify a wire `type` string. Unrecognized kinds map to `Other`.
    pub fn classify(kind: &str) -> Self {
        match kind {
            "offer" => SignalKind::Offer,
            "answer" => SignalKind::Answer,
            "ice-candidate" => SignalKind::IceCandidate,
            _ => SignalKind::Other,
        }
    }

    /// Metric label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::Other => "other",
        }
    }
}

/// A buffered signaling message, owned by the recipient's mailbox until drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Sender session id.
    pub from: String,

    /// Handshake message kind, as sent by the client.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload (SDP or ICE candidate).
    pub data: serde_json::Value,

    /// When the envelope was enqueued.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Request types
// ============================================================================

/// Request body for `POST /api/subgroups/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

fn default_group_name() -> String {
    DEFAULT_GROUP.to_string()
}

/// Request body for `POST /api/queue/join`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueRequest {
    /// Display name.
    pub name: String,

    /// Group to join (default: "General").
    #[serde(default = "default_group_name")]
    pub sub_group: String,
}

/// Request body for `POST /api/queue/action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueActionRequest {
    pub session_id: String,

    /// One of "start", "skip", "finish". Parsed by the handler so that an
    /// unknown action is reported as an invalid argument.
    pub action: String,
}

/// Request body for `POST /api/webrtc/signal`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub from_session_id: String,
    pub to_session_id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Query parameters for `GET /api/webrtc/peers`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersQuery {
    pub sub_group: Option<String>,
}

// ============================================================================
// Response types
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Service name.
    pub service: String,

    /// Backing store status ("healthy" or "unhealthy").
    pub store: String,
}

/// Response for `POST /api/subgroups/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

/// Response for `DELETE /api/subgroups/delete/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGroupResponse {
    pub success: bool,
    pub name: String,
    pub participants_cleared: u64,
    pub message: String,
}

/// Response for `GET /api/subgroups/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListResponse {
    pub subgroups: Vec<GroupRecord>,
}

/// Response for `POST /api/queue/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueResponse {
    pub session_id: Uuid,
    pub position: usize,
    pub message: String,
    pub sub_group: String,
}

/// Response for `GET /api/queue/status/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub position: usize,
    pub total_in_queue: usize,
    pub position1_name: Option<String>,
    pub position2_name: Option<String>,
    pub is_position1: bool,
    pub is_position2: bool,
    pub sub_group: String,
}

/// Generic `{ "message": ... }` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for `GET /api/queue/all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListResponse {
    pub queue: Vec<QueueEntry>,
    pub total: usize,
}

/// Response for `DELETE /api/queue/clear/{groupName}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearQueueResponse {
    pub message: String,
    pub count: u64,
}

/// Response for `POST /api/webrtc/signal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAckResponse {
    pub success: bool,
    pub message: String,
}

/// Response for `GET /api/webrtc/signals/{sessionId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalListResponse {
    pub signals: Vec<SignalEnvelope>,
}

/// A participant visible to the signaling relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub session_id: Uuid,
    pub name: String,
    pub sub_group: String,
}

impl From<QueueEntry> for PeerInfo {
    fn from(entry: QueueEntry) -> Self {
        Self {
            session_id: entry.session_id,
            name: entry.name,
            sub_group: entry.group_name,
        }
    }
}

/// Response for `GET /api/webrtc/peers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
    pub sub_group: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_group_is_case_insensitive() {
        assert!(is_default_group("General"));
        assert!(is_default_group("general"));
        assert!(is_default_group("GENERAL"));
        assert!(!is_default_group("Generals"));
    }

    #[test]
    fn test_validate_group_name() {
        assert_eq!(validate_group_name("  Lab A ").unwrap(), "Lab A");
        assert!(validate_group_name("   ").is_err());
        assert!(validate_group_name(&"g".repeat(MAX_GROUP_NAME_LENGTH)).is_ok());
        assert!(validate_group_name(&"g".repeat(MAX_GROUP_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert_eq!(validate_display_name("Alice").unwrap(), "Alice");
        assert!(matches!(
            validate_display_name(""),
            Err(RqError::InvalidArgument(_))
        ));
        assert!(validate_display_name(&"a".repeat(MAX_DISPLAY_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_queue_action_parsing() {
        assert_eq!("start".parse::<QueueAction>().unwrap(), QueueAction::Start);
        assert_eq!("skip".parse::<QueueAction>().unwrap(), QueueAction::Skip);
        assert_eq!("finish".parse::<QueueAction>().unwrap(), QueueAction::Finish);
        assert!(matches!(
            "pause".parse::<QueueAction>(),
            Err(RqError::InvalidArgument(_))
        ));
        // Actions are case-sensitive on the wire
        assert!("Start".parse::<QueueAction>().is_err());
    }

    #[test]
    fn test_queue_action_demotes() {
        assert!(!QueueAction::Start.demotes());
        assert!(QueueAction::Skip.demotes());
        assert!(QueueAction::Finish.demotes());
    }

    #[test]
    fn test_signal_kind_classification() {
        assert_eq!(SignalKind::classify("offer"), SignalKind::Offer);
        assert_eq!(SignalKind::classify("answer"), SignalKind::Answer);
        assert_eq!(SignalKind::classify("ice-candidate"), SignalKind::IceCandidate);
        assert_eq!(SignalKind::classify("renegotiate"), SignalKind::Other);
        assert_eq!(SignalKind::classify("renegotiate").as_str(), "other");
    }

    #[test]
    fn test_join_request_defaults_to_general() {
        let request: JoinQueueRequest = serde_json::from_str(r#"{"name": "Alice"}"#).unwrap();
        assert_eq!(request.sub_group, DEFAULT_GROUP);

        let request: JoinQueueRequest =
            serde_json::from_str(r#"{"name": "Bob", "subGroup": "Lab A"}"#).unwrap();
        assert_eq!(request.sub_group, "Lab A");
    }

    #[test]
    fn test_signal_envelope_wire_format() {
        let envelope = SignalEnvelope {
            from: "a".to_string(),
            kind: "ice-candidate".to_string(),
            data: serde_json::json!({"candidate": "c0"}),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["from"], "a");
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["data"]["candidate"], "c0");
    }

    #[test]
    fn test_status_response_wire_format() {
        let status = QueueStatusResponse {
            position: 1,
            total_in_queue: 2,
            position1_name: Some("Alice".to_string()),
            position2_name: Some("Bob".to_string()),
            is_position1: true,
            is_position2: false,
            sub_group: "General".to_string(),
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["totalInQueue"], 2);
        assert_eq!(json["position1Name"], "Alice");
        assert_eq!(json["isPosition1"], true);
        assert_eq!(json["subGroup"], "General");
    }
}
