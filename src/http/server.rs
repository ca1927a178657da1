//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router (forwarding fallback)
//! - Wire up middleware (request ID, tracing, timeout, admission control)
//! - Run the janitor next to the server and stop it after draining

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::forward::{forward_handler, Upstream};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::security::{
    admission_middleware, AdmissionControl, Janitor, JanitorHandle, WindowStore,
};

/// Errors raised while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address '{0}'")]
    InvalidUpstream(String),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP gateway: admission control in front of one upstream.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    store: Arc<WindowStore>,
}

impl GatewayServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let upstream = Upstream::new(&config.upstream)?;
        let store = Arc::new(WindowStore::default());
        let control = Arc::new(AdmissionControl::new(store.clone()));

        let router = Self::build_router(&config, upstream, control);
        Ok(Self {
            router,
            config,
            store,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        upstream: Upstream,
        control: Arc<AdmissionControl>,
    ) -> Router {
        let router = Router::new()
            .fallback(forward_handler)
            .with_state(upstream);

        let router = if config.admission.enabled {
            router.layer(middleware::from_fn_with_state(control, admission_middleware))
        } else {
            tracing::warn!("Admission control disabled");
            router
        };

        router
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires, then stop the janitor.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            admission = self.config.admission.enabled,
            "HTTP server starting"
        );

        let janitor = self
            .config
            .admission
            .enabled
            .then(|| Janitor::new(self.store.clone()).spawn());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        let grace = Duration::from_secs(self.config.admission.janitor_grace_secs);
        wind_down(served, janitor, grace).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Counter store shared by the admission layer and the janitor.
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Stop the janitor, whatever the serve loop returned, then report that outcome.
async fn wind_down(
    served: std::io::Result<()>,
    janitor: Option<JanitorHandle>,
    grace: Duration,
) -> Result<(), ServerError> {
    if let Some(janitor) = janitor {
        if let Err(e) = janitor.shutdown(grace).await {
            tracing::error!(error = %e, "Janitor shutdown failed");
        }
    }
    served?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::security::classifier::Category;
    use crate::security::RequestKey;

    #[tokio::test]
    async fn test_janitor_stopped_when_serve_fails() {
        let store = Arc::new(WindowStore::new(Duration::from_millis(20)));
        let key = RequestKey::new("1.2.3.4", Category::Api);
        store.check_and_record(&key, 100);

        let janitor = Janitor::new(store.clone())
            .with_period(Duration::from_millis(60))
            .spawn();

        let served = Err(io::Error::new(io::ErrorKind::AddrInUse, "listener failed"));
        let result = wind_down(served, Some(janitor), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ServerError::Io(_))));

        // A live janitor would have evicted the idle key by now.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(store.contains(&key));
    }

    #[tokio::test]
    async fn test_clean_serve_exit_is_ok() {
        let store = Arc::new(WindowStore::default());
        let janitor = Janitor::new(store).spawn();
        assert!(wind_down(Ok(()), Some(janitor), Duration::from_secs(1))
            .await
            .is_ok());
        assert!(wind_down(Ok(()), None, Duration::from_secs(1)).await.is_ok());
    }
}
