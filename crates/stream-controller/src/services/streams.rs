//! Query Façade: read-only room and participant views.

use crate::errors::ScError;
use crate::models::api::{GetStreamResponse, ParticipantView, RoomView};
use crate::services::rooms::RoomManager;
use tracing::{instrument, warn};

#[derive(Clone)]
pub struct StreamQuery {
    rooms: RoomManager,
}

impl StreamQuery {
    pub fn new(rooms: RoomManager) -> Self {
        Self { rooms }
    }

    /// Every room with its metadata parsed. Unparseable metadata becomes an
    /// empty map.
    pub async fn list_streams(&self) -> Result<Vec<RoomView>, ScError> {
        let rooms = self.rooms.list(&[]).await?;
        Ok(rooms.iter().map(RoomView::from).collect())
    }

    /// One room with its participants.
    ///
    /// # Errors
    ///
    /// - `ScError::NotFound` - the room does not exist, or vanished before
    ///   its participants could be listed
    /// - `ScError::Upstream` - the room exists but the participant query
    ///   failed
    #[instrument(skip_all, fields(room = %name))]
    pub async fn get_stream(&self, name: &str) -> Result<GetStreamResponse, ScError> {
        let room = self.rooms.get(name).await?;

        let participants = match self.rooms.participants(name).await {
            Ok(participants) => participants,
            Err(ScError::NotFound(_)) => {
                return Err(ScError::NotFound(format!("Room '{name}' not found")));
            }
            Err(e) => {
                warn!(target: "sc.services.streams", room = %name, error = %e, "Participant query failed");
                return Err(ScError::Upstream(format!(
                    "Failed to list participants of room '{name}': {e}"
                )));
            }
        };

        Ok(GetStreamResponse {
            room: RoomView::from(&room),
            participants: participants.iter().map(ParticipantView::from).collect(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::RoomConflictPolicy;
    use crate::services::control_client::mock::{MockControlPlane, MockOp};
    use std::sync::Arc;

    fn query(mock: MockControlPlane) -> StreamQuery {
        StreamQuery::new(RoomManager::new(Arc::new(mock), RoomConflictPolicy::Reject))
    }

    #[tokio::test]
    async fn test_list_streams_tolerates_bad_metadata() {
        let streams = query(
            MockControlPlane::new()
                .with_room("empty", "")
                .with_room("broken", "{oops")
                .with_room("good", "{\"creator_identity\":\"alice\"}"),
        );

        let rooms = streams.list_streams().await.unwrap();
        assert_eq!(rooms.len(), 3);
        for room in &rooms {
            match room.name.as_str() {
                "good" => assert_eq!(room.metadata.len(), 1),
                _ => assert!(room.metadata.is_empty()),
            }
        }
    }

    #[tokio::test]
    async fn test_list_streams_upstream_failure() {
        let streams = query(MockControlPlane::new().failing_on(MockOp::ListRooms));
        assert!(matches!(
            streams.list_streams().await,
            Err(ScError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_get_stream_includes_participants() {
        let streams = query(
            MockControlPlane::new()
                .with_participant("studio", "alice")
                .with_participant("studio", "bob"),
        );

        let detail = streams.get_stream("studio").await.unwrap();
        assert_eq!(detail.room.name, "studio");
        assert_eq!(detail.room.num_participants, 2);
        assert_eq!(detail.participants.len(), 2);
        assert!(detail.participants.iter().all(|p| !p.is_publisher));
    }

    #[tokio::test]
    async fn test_get_stream_missing_room_is_not_found() {
        let streams = query(MockControlPlane::new());
        assert!(matches!(
            streams.get_stream("ghost").await,
            Err(ScError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_participant_failure_distinct_from_not_found() {
        let streams = query(
            MockControlPlane::new()
                .with_room("studio", "")
                .failing_on(MockOp::ListParticipants),
        );

        assert!(matches!(
            streams.get_stream("studio").await,
            Err(ScError::Upstream(_))
        ));
    }
}
