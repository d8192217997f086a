//! Media server fixtures.
//!
//! JSON bodies shaped like the media server's Twirp responses, and helpers
//! that mount them on a `wiremock::MockServer`. 64-bit integers are encoded
//! as strings, the way protobuf JSON emits them.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROOM_SERVICE: &str = "RoomService";
pub const INGRESS_SERVICE: &str = "Ingress";

/// Creation time stamped on fixture rooms and participants.
pub const FIXTURE_TIMESTAMP: i64 = 1_700_000_000;

/// Path of a Twirp method, e.g. `/twirp/livekit.RoomService/ListRooms`.
pub fn twirp_path(service: &str, method_name: &str) -> String {
    format!("/twirp/livekit.{service}/{method_name}")
}

pub fn room_json(name: &str, metadata: &str, num_participants: u32) -> Value {
    json!({
        "sid": format!("RM_{name}"),
        "name": name,
        "metadata": metadata,
        "num_participants": num_participants,
        "creation_time": FIXTURE_TIMESTAMP.to_string(),
        "empty_timeout": 300,
        "max_participants": 0
    })
}

/// A participant; `publishing` adds one audio track.
pub fn participant_json(identity: &str, publishing: bool) -> Value {
    let tracks = if publishing {
        json!([{ "sid": format!("TR_{identity}"), "type": "AUDIO" }])
    } else {
        json!([])
    };
    json!({
        "sid": format!("PA_{identity}"),
        "identity": identity,
        "name": identity,
        "state": "ACTIVE",
        "joined_at": FIXTURE_TIMESTAMP.to_string(),
        "tracks": tracks
    })
}

/// An ingress. `stream_key` is only present in CreateIngress responses.
pub fn ingress_json(
    ingress_id: &str,
    room: &str,
    input_type: &str,
    stream_key: Option<&str>,
) -> Value {
    let mut ingress = json!({
        "ingress_id": ingress_id,
        "name": format!("{room}-ingress"),
        "url": "rtmp://media.test:1935/x",
        "input_type": input_type,
        "room_name": room,
        "participant_identity": "alice (via OBS)",
        "participant_name": "alice (via OBS)",
        "state": { "status": "ENDPOINT_INACTIVE" }
    });
    if let (Some(key), Some(object)) = (stream_key, ingress.as_object_mut()) {
        object.insert("stream_key".to_string(), json!(key));
    }
    ingress
}

pub fn twirp_error(code: &str, msg: &str) -> Value {
    json!({ "code": code, "msg": msg })
}

/// Respond to every call of `service/method_name` with `status` and `body`.
pub async fn mount_twirp(
    server: &MockServer,
    service: &str,
    method_name: &str,
    status: u16,
    body: Value,
) {
    Mock::given(method("POST"))
        .and(path(twirp_path(service, method_name)))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_list_rooms(server: &MockServer, rooms: Vec<Value>) {
    mount_twirp(server, ROOM_SERVICE, "ListRooms", 200, json!({ "rooms": rooms })).await;
}

pub async fn mount_create_room(server: &MockServer, room: Value) {
    mount_twirp(server, ROOM_SERVICE, "CreateRoom", 200, room).await;
}

pub async fn mount_delete_room(server: &MockServer) {
    mount_twirp(server, ROOM_SERVICE, "DeleteRoom", 200, json!({})).await;
}

pub async fn mount_list_participants(server: &MockServer, participants: Vec<Value>) {
    mount_twirp(
        server,
        ROOM_SERVICE,
        "ListParticipants",
        200,
        json!({ "participants": participants }),
    )
    .await;
}

pub async fn mount_create_ingress(server: &MockServer, ingress: Value) {
    mount_twirp(server, INGRESS_SERVICE, "CreateIngress", 200, ingress).await;
}

pub async fn mount_list_ingress(server: &MockServer, items: Vec<Value>) {
    mount_twirp(server, INGRESS_SERVICE, "ListIngress", 200, json!({ "items": items })).await;
}
