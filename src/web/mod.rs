//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::state::Store;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
}

/// Read-only JSON API over the engine state.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        let router = Router::new()
            .route("/api/v1/services", get(handlers::handle_get_services))
            .route("/api/v1/services/history", get(handlers::handle_get_history))
            .route("/api/{*rest}", get(handlers::handle_api_not_found))
            .route("/healthz", get(handlers::handle_healthz));

        // Prebuilt frontend, if configured. Unknown paths get index.html so
        // client-side routes survive a reload.
        let router = match &self.state.config.static_dir {
            Some(dir) => router.fallback_service(
                ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
            ),
            None => router,
        };

        router
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured port and serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Web server listening on {}", addr);
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.routes())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Web server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::state::{CheckResult, HistoryLimits};
    use chrono::Utc;
    use std::path::PathBuf;
    use tokio::sync::oneshot;

    fn test_config(static_dir: Option<PathBuf>) -> ServerConfig {
        ServerConfig {
            static_dir,
            ..ServerConfig::default()
        }
    }

    fn test_store() -> Arc<Store> {
        let config = MonitorConfig::from_json(
            r#"[{"interval": 30, "categories": ["media"], "instances": [
                {"name": "radarr", "type": "radarr", "ping_url": "http://10.0.0.4:7878", "category": "media"}
            ]}]"#,
        )
        .unwrap();
        Arc::new(Store::new(&config, HistoryLimits::default(), Utc::now()))
    }

    async fn spawn_server(server: Server) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (addr, tx)
    }

    #[tokio::test]
    async fn test_api_routes() {
        let store = test_store();
        store.record(CheckResult::up("radarr", Utc::now(), 12)).await;
        let (addr, shutdown) = spawn_server(Server::new(test_config(None), store)).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("http://{addr}/api/v1/services"))
            .header("Origin", "http://dashboard.local")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["services"][0]["name"], "radarr");
        assert_eq!(body["services"][0]["status"], "down");
        assert_eq!(body["services"][0]["type"], "radarr");
        assert_eq!(body["interval"], 30);

        let body: serde_json::Value = client
            .get(format!("http://{addr}/api/v1/services/history"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["history"][0]["name"], "radarr");
        assert_eq!(body["history"][0]["status"], "up");
        assert_eq!(body["history"][0]["response_time"], 12);
        let event = &body["downtime_events"][0];
        assert_eq!(event[0], "radarr");
        assert_eq!(event[2], serde_json::Value::Null);
        assert_eq!(event[4], false);

        let resp = client.get(format!("http://{addr}/healthz")).send().await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client.get(format!("http://{addr}/missing")).send().await.unwrap();
        assert_eq!(resp.status(), 404);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>servicewatch</h1>").unwrap();

        let server = Server::new(test_config(Some(dir.path().to_path_buf())), test_store());
        let (addr, shutdown) = spawn_server(server).await;

        let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "<h1>servicewatch</h1>");

        // API routes take precedence over the static directory
        let resp = reqwest::get(format!("http://{addr}/api/v1/services")).await.unwrap();
        assert_eq!(resp.status(), 200);

        // Client-side routes fall back to the app shell
        let resp = reqwest::get(format!("http://{addr}/services/plex")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "<h1>servicewatch</h1>");

        // Unknown API paths stay 404 instead of returning the shell
        let resp = reqwest::get(format!("http://{addr}/api/v1/nope")).await.unwrap();
        assert_eq!(resp.status(), 404);

        let _ = shutdown.send(());
    }
}
