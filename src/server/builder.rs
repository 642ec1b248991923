//! AppBuilder: mount endpoints and their documentation on an axum router

use super::docs::DocsPages;
use crate::backend::{AxumRequest, Backend, BackendKind, BackendRegistry};
use crate::config::BindConfig;
use crate::core::endpoint::{Endpoint, Signature};
use crate::core::error::{BindResult, ConfigError};
use crate::openapi::{OpenApiBuilder, OpenApiDocument};
use anyhow::Result;
use axum::Router;
use axum::routing::{MethodFilter, MethodRouter};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder for an axum application serving crossbind endpoints
///
/// # Example
///
/// ```ignore
/// let app = AppBuilder::new(BindConfig::from_yaml_file("crossbind.yaml")?)
///     .endpoint(list_users)
///     .endpoint(create_user)
///     .build()?;
/// ```
pub struct AppBuilder {
    config: BindConfig,
    registry: BackendRegistry,
    endpoints: Vec<Endpoint>,
    custom_routes: Vec<Router>,
}

impl AppBuilder {
    pub fn new(config: BindConfig) -> Self {
        Self {
            config,
            registry: BackendRegistry::new(),
            endpoints: Vec::new(),
            custom_routes: Vec::new(),
        }
    }

    /// Use a registry with custom backends
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Add plain axum routes next to the endpoints
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Signatures of every registered endpoint, in registration order
    pub fn signatures(&self) -> Vec<Signature> {
        self.endpoints.iter().map(Endpoint::signature).collect()
    }

    /// The OpenAPI document the docs routes serve
    pub fn openapi_document(&self) -> BindResult<OpenApiDocument> {
        let backend = self.registry.from_config(&self.config)?;
        Ok(document_for(&self.config, backend.as_ref(), &self.endpoints))
    }

    /// Build the final router
    pub fn build(self) -> Result<Router> {
        let backend = self.registry.from_config(&self.config)?;
        if backend.kind() != BackendKind::Axum {
            return Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: backend.kind().to_string(),
                message: "AppBuilder builds axum routers, use HyperApp for this backend"
                    .to_string(),
            }
            .into());
        }

        let docs = if self.config.docs.enabled {
            let document = document_for(&self.config, backend.as_ref(), &self.endpoints);
            Some(DocsPages::render(&self.config.docs, &self.config.openapi.title, &document)?)
        } else {
            None
        };
        check_routes(&self.endpoints, docs.as_ref())?;

        let mut routes: IndexMap<String, MethodRouter> = IndexMap::new();
        for endpoint in &self.endpoints {
            let path = endpoint.path().to_string();
            let filter = MethodFilter::try_from(endpoint.method().clone())
                .map_err(|e| anyhow::anyhow!("{} {}: {}", endpoint.method(), path, e))?;

            tracing::info!("Registering {} {}", endpoint.method(), path);
            let handler = route_handler(Arc::new(endpoint.clone()), backend.clone());
            let method_router = routes.shift_remove(&path).unwrap_or_else(MethodRouter::new);
            routes.insert(path, method_router.on(filter, handler));
        }

        let mut app = Router::new();
        for (path, method_router) in routes {
            app = mount("route", || app.route(&path, method_router))?;
        }
        if let Some(pages) = &docs {
            app = mount("docs", || app.merge(pages.router()))?;
        }
        for custom_router in self.custom_routes {
            app = mount("custom_routes", || app.merge(custom_router))?;
        }

        app = app.layer(TraceLayer::new_for_http());
        if self.config.cors {
            app = app.layer(CorsLayer::permissive());
        }
        Ok(app)
    }

    /// Serve the application with graceful shutdown
    ///
    /// Handles SIGTERM and SIGINT (Ctrl+C).
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn route_handler(
    endpoint: Arc<Endpoint>,
    backend: Arc<dyn Backend>,
) -> impl Fn(AxumRequest) -> futures::future::BoxFuture<'static, axum::response::Response>
+ Clone
+ Send
+ Sync
+ 'static {
    move |request: AxumRequest| -> futures::future::BoxFuture<'static, axum::response::Response> {
        let endpoint = endpoint.clone();
        let backend = backend.clone();
        Box::pin(async move {
            endpoint
                .respond(&request, backend.as_ref())
                .await
                .map(axum::body::Body::new)
        })
    }
}

/// Reject route tables neither router can serve unambiguously
pub(crate) fn check_routes(endpoints: &[Endpoint], docs: Option<&DocsPages>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        let path = endpoint.path();
        let route = format!("{} {}", endpoint.method(), path);
        if !seen.insert((path.to_string(), endpoint.method().clone())) {
            return Err(ConfigError::InvalidValue {
                field: "route".to_string(),
                value: route,
                message: "registered twice".to_string(),
            });
        }
        if docs.is_some_and(|docs| docs.paths().any(|p| p == path)) {
            return Err(ConfigError::InvalidValue {
                field: "route".to_string(),
                value: route,
                message: "path is served by the documentation routes".to_string(),
            });
        }
    }
    Ok(())
}

/// Run one router mutation; axum reports conflicting routes by panicking
fn mount(field: &str, add: impl FnOnce() -> Router) -> Result<Router, ConfigError> {
    panic::catch_unwind(AssertUnwindSafe(add)).map_err(|cause| ConfigError::InvalidValue {
        field: field.to_string(),
        value: panic_message(cause.as_ref()),
        message: "conflicts with an existing route".to_string(),
    })
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    cause
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| cause.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "conflicting route".to_string())
}

pub(crate) fn document_for(
    config: &BindConfig,
    backend: &dyn Backend,
    endpoints: &[Endpoint],
) -> OpenApiDocument {
    OpenApiBuilder::new(&config.openapi)
        .validation_status(backend.validation_status())
        .endpoints(endpoints)
        .build()
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
