//! Data models for the Stream Controller.
//!
//! Rooms, participants and ingress endpoints are owned by the media server.
//! The types here are decoded from its control API responses, which use
//! protobuf JSON conventions: 64-bit integers may arrive as strings, enums as
//! names or numbers, and default values are omitted.

pub mod api;

use crate::errors::ScError;
use common::secret::SecretString;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A room as reported by the media server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Room {
    pub sid: String,
    pub name: String,
    /// Opaque application metadata, usually a JSON object.
    pub metadata: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub num_participants: u32,
    #[serde(deserialize_with = "lenient_i64")]
    pub creation_time: i64,
    #[serde(deserialize_with = "lenient_u32")]
    pub empty_timeout: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub max_participants: u32,
}

/// A participant as reported by the media server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Participant {
    pub sid: String,
    pub identity: String,
    pub name: String,
    #[serde(deserialize_with = "participant_state")]
    pub state: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub joined_at: i64,
    pub tracks: Vec<Value>,
}

impl Participant {
    /// A participant with at least one published track.
    pub fn is_publisher(&self) -> bool {
        !self.tracks.is_empty()
    }
}

/// An ingress endpoint as reported by the media server.
///
/// Not `PartialEq`: the stream key is a secret.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ingress {
    pub ingress_id: String,
    pub name: String,
    /// Only meaningful in the CreateIngress response.
    pub stream_key: Option<SecretString>,
    pub url: String,
    #[serde(deserialize_with = "ingress_input")]
    pub input_type: String,
    pub bypass_transcoding: bool,
    pub room_name: String,
    pub participant_identity: String,
    pub participant_name: String,
    pub state: Option<IngressState>,
}

impl Ingress {
    pub fn status(&self) -> &str {
        self.state
            .as_ref()
            .map_or("ENDPOINT_INACTIVE", |s| s.status.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngressState {
    #[serde(deserialize_with = "ingress_status")]
    pub status: String,
    pub error: String,
}

/// Ingest protocol for an ingress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngressMode {
    #[default]
    Rtmp,
    Whip,
}

impl IngressMode {
    /// Parse a requested ingress type. Absent or blank means RTMP.
    pub fn parse(raw: Option<&str>) -> Result<Self, ScError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(IngressMode::Rtmp),
            Some(value) if value.eq_ignore_ascii_case("rtmp") => Ok(IngressMode::Rtmp),
            Some(value) if value.eq_ignore_ascii_case("whip") => Ok(IngressMode::Whip),
            Some(other) => Err(ScError::BadRequest(format!(
                "ingress_type must be 'rtmp' or 'whip', got '{other}'"
            ))),
        }
    }

    /// Control API `input_type` value.
    pub fn input_type(self) -> &'static str {
        match self {
            IngressMode::Rtmp => "RTMP_INPUT",
            IngressMode::Whip => "WHIP_INPUT",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IngressMode::Rtmp => "rtmp",
            IngressMode::Whip => "whip",
        }
    }
}

/// Room metadata attached by the publish flow.
///
/// `creator_identity` names the host; everything else is application-defined
/// and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_identity: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamMetadata {
    /// The creator identity, which must be present and non-blank.
    pub fn creator(&self) -> Result<&str, ScError> {
        self.creator_identity
            .as_deref()
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .ok_or_else(|| {
                ScError::BadRequest("metadata.creator_identity is required".to_string())
            })
    }

    /// Serialize for storage on the room.
    pub fn to_json(&self) -> Result<String, ScError> {
        serde_json::to_string(self)
            .map_err(|e| ScError::Internal(format!("Failed to encode room metadata: {e}")))
    }
}

/// Parse room metadata into a map.
///
/// Empty, malformed or non-object metadata yields an empty map.
pub fn parse_room_metadata(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => {
            tracing::debug!(target: "sc.models", error = %e, "Ignoring unparseable room metadata");
            Map::new()
        }
    }
}

// ============================================================================
// Lenient protobuf-JSON decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Str(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Option::<RawNumber>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawNumber::Int(n)) => Ok(n),
        #[allow(clippy::cast_possible_truncation)]
        Some(RawNumber::Float(f)) => Ok(f as i64),
        Some(RawNumber::Str(s)) if s.trim().is_empty() => Ok(0),
        Some(RawNumber::Str(s)) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = lenient_i64(deserializer)?;
    u32::try_from(value).map_err(de::Error::custom)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnum {
    Index(i64),
    Name(String),
}

fn enum_name<'de, D: Deserializer<'de>>(
    deserializer: D,
    names: &[&str],
) -> Result<String, D::Error> {
    match Option::<RawEnum>::deserialize(deserializer)? {
        None => Ok(names.first().copied().unwrap_or_default().to_string()),
        Some(RawEnum::Name(name)) => Ok(name),
        Some(RawEnum::Index(index)) => Ok(usize::try_from(index)
            .ok()
            .and_then(|i| names.get(i))
            .copied()
            .unwrap_or("UNKNOWN")
            .to_string()),
    }
}

const PARTICIPANT_STATES: [&str; 4] = ["JOINING", "JOINED", "ACTIVE", "DISCONNECTED"];
const INGRESS_STATUSES: [&str; 5] = [
    "ENDPOINT_INACTIVE",
    "ENDPOINT_BUFFERING",
    "ENDPOINT_PUBLISHING",
    "ENDPOINT_ERROR",
    "ENDPOINT_COMPLETE",
];
const INGRESS_INPUTS: [&str; 3] = ["RTMP_INPUT", "WHIP_INPUT", "URL_INPUT"];

fn participant_state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    enum_name(deserializer, &PARTICIPANT_STATES)
}

fn ingress_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    enum_name(deserializer, &INGRESS_STATUSES)
}

fn ingress_input<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    enum_name(deserializer, &INGRESS_INPUTS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_room_accepts_int64_as_string() {
        let room: Room = serde_json::from_value(json!({
            "sid": "RM_abc",
            "name": "studio",
            "metadata": "{\"creator_identity\":\"alice\"}",
            "num_participants": 2,
            "creation_time": "1712345678",
            "empty_timeout": 300,
            "max_participants": 0
        }))
        .unwrap();

        assert_eq!(room.name, "studio");
        assert_eq!(room.creation_time, 1_712_345_678);
        assert_eq!(room.num_participants, 2);
        assert_eq!(room.empty_timeout, 300);
    }

    #[test]
    fn test_room_defaults_for_omitted_fields() {
        let room: Room = serde_json::from_value(json!({ "name": "bare" })).unwrap();
        assert_eq!(room.metadata, "");
        assert_eq!(room.num_participants, 0);
        assert_eq!(room.creation_time, 0);
    }

    #[test]
    fn test_participant_state_by_name_or_number() {
        let named: Participant =
            serde_json::from_value(json!({ "identity": "bob", "state": "ACTIVE" })).unwrap();
        assert_eq!(named.state, "ACTIVE");

        let numbered: Participant =
            serde_json::from_value(json!({ "identity": "bob", "state": 1 })).unwrap();
        assert_eq!(numbered.state, "JOINED");

        let omitted: Participant = serde_json::from_value(json!({ "identity": "bob" })).unwrap();
        assert_eq!(omitted.state, "JOINING");
        assert!(!omitted.is_publisher());
    }

    #[test]
    fn test_participant_with_tracks_is_publisher() {
        let participant: Participant = serde_json::from_value(json!({
            "identity": "alice",
            "joined_at": "1712345600",
            "tracks": [{ "sid": "TR_1", "type": "VIDEO" }]
        }))
        .unwrap();

        assert!(participant.is_publisher());
        assert_eq!(participant.joined_at, 1_712_345_600);
    }

    #[test]
    fn test_ingress_decodes_and_redacts_stream_key() {
        let ingress: Ingress = serde_json::from_value(json!({
            "ingress_id": "IN_1",
            "name": "studio-ingress",
            "stream_key": "sk_secret_123",
            "url": "rtmp://media.local/live",
            "input_type": 0,
            "room_name": "studio",
            "state": { "status": 2 }
        }))
        .unwrap();

        assert_eq!(ingress.input_type, "RTMP_INPUT");
        assert_eq!(ingress.status(), "ENDPOINT_PUBLISHING");
        assert_eq!(
            ingress.stream_key.as_ref().unwrap().expose_secret(),
            "sk_secret_123"
        );
        assert!(!format!("{ingress:?}").contains("sk_secret_123"));
    }

    #[test]
    fn test_ingress_without_state_is_inactive() {
        let ingress: Ingress = serde_json::from_value(json!({ "ingress_id": "IN_2" })).unwrap();
        assert_eq!(ingress.status(), "ENDPOINT_INACTIVE");
        assert!(ingress.stream_key.is_none());
    }

    #[test]
    fn test_ingress_mode_parse() {
        assert_eq!(IngressMode::parse(None).unwrap(), IngressMode::Rtmp);
        assert_eq!(IngressMode::parse(Some("")).unwrap(), IngressMode::Rtmp);
        assert_eq!(IngressMode::parse(Some("RTMP")).unwrap(), IngressMode::Rtmp);
        assert_eq!(IngressMode::parse(Some("whip")).unwrap(), IngressMode::Whip);
        assert!(matches!(
            IngressMode::parse(Some("srt")),
            Err(ScError::BadRequest(_))
        ));
    }

    #[test]
    fn test_stream_metadata_requires_creator() {
        let metadata: StreamMetadata =
            serde_json::from_value(json!({ "title": "Friday show" })).unwrap();
        assert!(matches!(metadata.creator(), Err(ScError::BadRequest(_))));

        let metadata: StreamMetadata =
            serde_json::from_value(json!({ "creator_identity": "  " })).unwrap();
        assert!(metadata.creator().is_err());

        let metadata: StreamMetadata =
            serde_json::from_value(json!({ "creator_identity": "alice", "title": "x" }))
                .unwrap();
        assert_eq!(metadata.creator().unwrap(), "alice");
        assert_eq!(metadata.extra.get("title"), Some(&json!("x")));
    }

    #[test]
    fn test_stream_metadata_round_trips_extra_fields() {
        let metadata: StreamMetadata = serde_json::from_value(json!({
            "creator_identity": "alice",
            "tags": ["music", "live"]
        }))
        .unwrap();

        let parsed = parse_room_metadata(&metadata.to_json().unwrap());
        assert_eq!(parsed.get("creator_identity"), Some(&json!("alice")));
        assert_eq!(parsed.get("tags"), Some(&json!(["music", "live"])));
    }

    #[test]
    fn test_parse_room_metadata_is_defensive() {
        assert!(parse_room_metadata("").is_empty());
        assert!(parse_room_metadata("   ").is_empty());
        assert!(parse_room_metadata("{not json").is_empty());
        assert!(parse_room_metadata("[1, 2, 3]").is_empty());
        assert!(parse_room_metadata("\"just a string\"").is_empty());
        assert_eq!(parse_room_metadata("{\"a\":1}").len(), 1);
    }
}
