//! Test server harness for E2E testing
//!
//! Provides `TestStreamServer` for spawning real stream controller instances
//! in tests, backed either by an in-memory control plane or by a wiremock
//! media server.

use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stream_controller::auth::token::TokenIssuer;
use stream_controller::config::Config;
use stream_controller::routes::{self, AppState};
use stream_controller::services::{ControlClient, ControlPlane};
use tokio::task::JoinHandle;

/// API key every test server signs with.
pub const TEST_API_KEY: &str = "APItestkey";

/// API secret every test server signs with.
pub const TEST_API_SECRET: &str = "sc-test-utils-secret-0123456789";

/// Client-facing websocket URL reported by test servers.
pub const TEST_WS_URL: &str = "ws://media.test:7880";

/// Test harness for spawning the Stream Controller in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let mock = Arc::new(MockControlPlane::new().with_participant("studio", "bob"));
/// let server = TestStreamServer::spawn(mock.clone()).await?;
///
/// let response = reqwest::Client::new()
///     .post(format!("{}/api/join_stream", server.url()))
///     .json(&json!({ "identity": "bob", "room_name": "studio" }))
///     .send()
///     .await?;
///
/// assert_eq!(response.status(), 409);
/// ```
pub struct TestStreamServer {
    addr: SocketAddr,
    config: Config,
    issuer: Arc<TokenIssuer>,
    _handle: JoinHandle<()>,
}

impl TestStreamServer {
    /// Spawn a server over `control` with default settings.
    pub async fn spawn(control: Arc<dyn ControlPlane>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(control, &[]).await
    }

    /// Spawn a server over `control`, overriding environment variables such
    /// as `ROOM_CONFLICT_POLICY` or `VIEWER_CAN_PUBLISH`.
    pub async fn spawn_with_vars(
        control: Arc<dyn ControlPlane>,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let config = test_config("http://media.test:7880", overrides)?;
        let issuer = test_issuer()?;
        Self::start(config, issuer, control).await
    }

    /// Spawn a server whose control client talks to the media server at
    /// `media_server_uri` (typically a `wiremock::MockServer`).
    pub async fn spawn_with_media_server(media_server_uri: &str) -> Result<Self, anyhow::Error> {
        let config = test_config(media_server_uri, &[])?;
        let issuer = test_issuer()?;
        let control = ControlClient::new(
            &config.livekit_url,
            issuer.clone(),
            Duration::from_secs(config.control_request_timeout_seconds),
        )
        .map_err(|e| anyhow::anyhow!("Failed to build control client: {}", e))?;
        Self::start(config, issuer, Arc::new(control)).await
    }

    async fn start(
        config: Config,
        issuer: Arc<TokenIssuer>,
        control: Arc<dyn ControlPlane>,
    ) -> Result<Self, anyhow::Error> {
        let state = Arc::new(AppState::new(&config, issuer.clone(), control));

        // The recorder is not installed globally, so tests may spawn many
        // servers in one process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            issuer,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Issuer sharing the server's key pair, for decoding returned tokens.
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

impl Drop for TestStreamServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

fn test_config(livekit_url: &str, overrides: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
    let mut vars = HashMap::from([
        ("LIVEKIT_URL".to_string(), livekit_url.to_string()),
        ("LIVEKIT_WS_URL".to_string(), TEST_WS_URL.to_string()),
        ("LIVEKIT_API_KEY".to_string(), TEST_API_KEY.to_string()),
        ("LIVEKIT_API_SECRET".to_string(), TEST_API_SECRET.to_string()),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("CONTROL_REQUEST_TIMEOUT_SECONDS".to_string(), "5".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
}

fn test_issuer() -> Result<Arc<TokenIssuer>, anyhow::Error> {
    let issuer = TokenIssuer::new(TEST_API_KEY, &SecretString::from(TEST_API_SECRET))
        .map_err(|e| anyhow::anyhow!("Failed to create token issuer: {}", e))?;
    Ok(Arc::new(issuer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_controller::services::control_client::mock::MockControlPlane;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "healthy");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_provides_addr() -> Result<(), anyhow::Error> {
        let server = TestStreamServer::spawn(Arc::new(MockControlPlane::new())).await?;

        let addr = server.addr();
        assert!(addr.ip().is_loopback());
        assert!(addr.port() > 0);
        assert_eq!(server.url(), format!("http://{}", addr));

        Ok(())
    }

    #[tokio::test]
    async fn test_overrides_reach_config() -> Result<(), anyhow::Error> {
        let server = TestStreamServer::spawn_with_vars(
            Arc::new(MockControlPlane::new()),
            &[("VIEWER_CAN_PUBLISH", "true")],
        )
        .await?;

        assert!(server.config().viewer_can_publish);
        assert_eq!(server.config().ws_url, TEST_WS_URL);
        Ok(())
    }
}
