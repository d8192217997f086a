//! Ingress Lifecycle Manager.
//!
//! Provisions ingest endpoints (RTMP or WHIP) bound to a room. The media
//! server generates the stream key and returns it once, from `create`. It is
//! held as a secret and never logged.
//!
//! The control API has no get-by-id, so `get` and `delete` list every ingress
//! and filter. Cost is O(total ingresses).

use crate::errors::ScError;
use crate::models::{Ingress, IngressMode};
use crate::services::control_client::{ControlPlane, IngressOptions, TrackSourceOptions};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct IngressManager {
    control: Arc<dyn ControlPlane>,
}

impl IngressManager {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// CreateIngress parameters for `mode`.
    ///
    /// RTMP takes camera and microphone sources with server-default encoding.
    /// WHIP bypasses transcoding and carries no source block.
    pub fn build_options(
        room: &str,
        publisher_identity: &str,
        publisher_name: &str,
        mode: IngressMode,
    ) -> IngressOptions {
        let (bypass_transcoding, video, audio) = match mode {
            IngressMode::Rtmp => (
                false,
                Some(TrackSourceOptions {
                    source: "CAMERA".to_string(),
                }),
                Some(TrackSourceOptions {
                    source: "MICROPHONE".to_string(),
                }),
            ),
            IngressMode::Whip => (true, None, None),
        };

        IngressOptions {
            input_type: mode.input_type().to_string(),
            name: format!("{room}-ingress"),
            room_name: room.to_string(),
            participant_identity: publisher_identity.to_string(),
            participant_name: publisher_name.to_string(),
            bypass_transcoding,
            video,
            audio,
        }
    }

    #[instrument(skip_all, fields(room = %room, mode = mode.as_str()))]
    pub async fn create(
        &self,
        room: &str,
        publisher_identity: &str,
        publisher_name: &str,
        mode: IngressMode,
    ) -> Result<Ingress, ScError> {
        let options = Self::build_options(room, publisher_identity, publisher_name, mode);
        let ingress = self.control.create_ingress(&options).await?;

        if ingress.stream_key.is_none() {
            return Err(ScError::Upstream(
                "CreateIngress: response carried no stream key".to_string(),
            ));
        }

        info!(
            target: "sc.services.ingress",
            room = %room,
            ingress_id = %ingress.ingress_id,
            "Ingress created"
        );
        Ok(ingress)
    }

    pub async fn list(&self) -> Result<Vec<Ingress>, ScError> {
        self.control.list_ingress().await
    }

    pub async fn get(&self, ingress_id: &str) -> Result<Ingress, ScError> {
        self.list()
            .await?
            .into_iter()
            .find(|ingress| ingress.ingress_id == ingress_id)
            .ok_or_else(|| ScError::NotFound(format!("Ingress '{ingress_id}' not found")))
    }

    /// Delete an ingress. A missing id is `NotFound` on every attempt.
    #[instrument(skip_all, fields(ingress_id = %ingress_id))]
    pub async fn delete(&self, ingress_id: &str) -> Result<(), ScError> {
        if ingress_id.trim().is_empty() {
            return Err(ScError::BadRequest(
                "ingress id must not be empty".to_string(),
            ));
        }

        self.get(ingress_id).await?;
        self.control.delete_ingress(ingress_id).await?;

        info!(target: "sc.services.ingress", ingress_id = %ingress_id, "Ingress deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::control_client::mock::{MockControlPlane, MockOp};

    fn manager(mock: MockControlPlane) -> (IngressManager, Arc<MockControlPlane>) {
        let mock = Arc::new(mock);
        (IngressManager::new(mock.clone()), mock)
    }

    #[test]
    fn test_rtmp_options_use_camera_and_microphone() {
        let options = IngressManager::build_options(
            "studio",
            "alice (via OBS)",
            "alice (via OBS)",
            IngressMode::Rtmp,
        );

        assert_eq!(options.input_type, "RTMP_INPUT");
        assert!(!options.bypass_transcoding);
        assert_eq!(options.video.unwrap().source, "CAMERA");
        assert_eq!(options.audio.unwrap().source, "MICROPHONE");
        assert_eq!(options.room_name, "studio");
    }

    #[test]
    fn test_whip_options_bypass_transcoding_without_sources() {
        let options =
            IngressManager::build_options("studio", "alice", "alice", IngressMode::Whip);

        assert_eq!(options.input_type, "WHIP_INPUT");
        assert!(options.bypass_transcoding);
        assert!(options.video.is_none());
        assert!(options.audio.is_none());
    }

    #[tokio::test]
    async fn test_create_returns_stream_key() {
        let (ingress, mock) = manager(MockControlPlane::new());

        let created = ingress
            .create("studio", "alice (via OBS)", "alice (via OBS)", IngressMode::Rtmp)
            .await
            .unwrap();

        assert!(created.stream_key.is_some());
        assert_eq!(created.room_name, "studio");
        assert_eq!(
            mock.last_ingress_request().unwrap().participant_identity,
            "alice (via OBS)"
        );
    }

    #[tokio::test]
    async fn test_get_filters_by_id() {
        let (ingress, _mock) = manager(MockControlPlane::new());
        let created = ingress
            .create("studio", "alice", "alice", IngressMode::Whip)
            .await
            .unwrap();

        let found = ingress.get(&created.ingress_id).await.unwrap();
        assert_eq!(found.ingress_id, created.ingress_id);
        assert!(matches!(ingress.get("IN_nope").await, Err(ScError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_ingress_is_not_found_every_time() {
        let (ingress, mock) = manager(MockControlPlane::new());

        assert!(matches!(ingress.delete("IN_nope").await, Err(ScError::NotFound(_))));
        assert!(matches!(ingress.delete("IN_nope").await, Err(ScError::NotFound(_))));
        assert_eq!(mock.call_count(MockOp::DeleteIngress), 0);
    }

    #[tokio::test]
    async fn test_delete_existing_ingress() {
        let (ingress, mock) = manager(MockControlPlane::new());
        let created = ingress
            .create("studio", "alice", "alice", IngressMode::Rtmp)
            .await
            .unwrap();

        ingress.delete(&created.ingress_id).await.unwrap();
        assert_eq!(mock.ingress_count(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_upstream() {
        let (ingress, _mock) = manager(MockControlPlane::new().failing_on(MockOp::CreateIngress));

        let result = ingress
            .create("studio", "alice", "alice", IngressMode::Rtmp)
            .await;
        assert!(matches!(result, Err(ScError::Upstream(_))));
    }
}
