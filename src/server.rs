//! Server-side protocol wiring.
//!
//! A [`Server`] binds a capability [`Registry`] and server identity to the
//! protocol methods, producing sessions that speak the server side of the
//! handshake:
//!
//! 1. **Initialisation**: version negotiation and capability advertisement
//! 2. **Operation**: `tools/*`, `resources/*`, `prompts/*`, `ping`
//! 3. **Shutdown**: handled by the session lifecycle
//!
//! Handshake gating (rejecting early requests, tracking the initialized
//! notification) lives in the session engine; this module only supplies
//! the method handlers.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::SessionConfig;
use crate::registry::{Registry, RegistryError};
use crate::rpc::message::RESOURCE_NOT_FOUND;
use crate::rpc::types::{
    negotiate_version, GetPromptParams, InitializeParams, InitializeResult, PromptsCapability,
    ReadResourceParams, ReadResourceResult, ResourcesCapability, ResourcesListResult,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, ToolsListResult,
    PromptsListResult, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::rpc::{ErrorCode, ErrorObject};
use crate::session::{HandlerResult, Role, Router, Session};
use crate::transport::Transport;

/// A server: identity plus capability catalog, ready to serve sessions.
pub struct Server {
    info: ServerInfo,
    registry: Arc<Registry>,
    config: SessionConfig,
}

impl Server {
    /// Creates a server for the given identity and registry.
    #[must_use]
    pub fn new(info: ServerInfo, registry: Arc<Registry>) -> Self {
        Self {
            info,
            registry,
            config: SessionConfig::default(),
        }
    }

    /// Overrides the session configuration used for served connections.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The capability registry backing this server.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Serves one connection over `transport`.
    ///
    /// The returned session handle can be used to await shutdown, emit
    /// server-initiated notifications, or close the connection.
    #[must_use]
    pub fn serve(&self, transport: impl Transport + 'static) -> Session {
        Session::spawn(
            transport,
            self.build_router(),
            Role::Server,
            self.config.clone(),
        )
    }

    /// Builds the protocol method table bound to this server's registry.
    fn build_router(&self) -> Router {
        let mut router = Router::new();

        let info = self.info.clone();
        let registry = Arc::clone(&self.registry);
        router.on_request("initialize", move |params| {
            let info = info.clone();
            let registry = Arc::clone(&registry);
            async move { handle_initialize(&info, &registry, params) }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("tools/list", move |_params| {
            let registry = Arc::clone(&registry);
            async move {
                to_result_value(ToolsListResult {
                    tools: registry.list_tools(),
                })
            }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("tools/call", move |params| {
            let registry = Arc::clone(&registry);
            async move {
                let params: ToolCallParams = parse_params(params)?;
                let result = registry
                    .call_tool(&params.name, params.arguments)
                    .await
                    .map_err(registry_error)?;
                to_result_value(result)
            }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("resources/list", move |_params| {
            let registry = Arc::clone(&registry);
            async move {
                to_result_value(ResourcesListResult {
                    resources: registry.list_resources(),
                })
            }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("resources/read", move |params| {
            let registry = Arc::clone(&registry);
            async move {
                let params: ReadResourceParams = parse_params(params)?;
                let contents = registry
                    .read_resource(&params.uri)
                    .await
                    .map_err(registry_error)?;
                to_result_value(ReadResourceResult { contents })
            }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("prompts/list", move |_params| {
            let registry = Arc::clone(&registry);
            async move {
                to_result_value(PromptsListResult {
                    prompts: registry.list_prompts(),
                })
            }
        });

        let registry = Arc::clone(&self.registry);
        router.on_request("prompts/get", move |params| {
            let registry = Arc::clone(&registry);
            async move {
                let params: GetPromptParams = parse_params(params)?;
                let rendered = registry
                    .get_prompt(&params.name, params.arguments)
                    .await
                    .map_err(registry_error)?;
                to_result_value(rendered)
            }
        });

        router.on_request("ping", |_params| async { Ok(json!({})) });

        router
    }
}

/// Handles the `initialize` request: version negotiation and capability
/// advertisement.
fn handle_initialize(
    info: &ServerInfo,
    registry: &Registry,
    params: Option<Value>,
) -> HandlerResult {
    let params: InitializeParams = parse_params(params)?;

    let Some(version) = negotiate_version(&params.protocol_version) else {
        return Err(ErrorObject::invalid_params(format!(
            "Unsupported protocol version: {}",
            params.protocol_version
        ))
        .with_data(json!({ "supported": SUPPORTED_PROTOCOL_VERSIONS })));
    };

    if let Some(client) = &params.client_info {
        tracing::info!(
            client = %client.name,
            version = client.version.as_deref().unwrap_or("unknown"),
            "client initialising"
        );
    }

    to_result_value(InitializeResult {
        protocol_version: version.to_string(),
        capabilities: advertised_capabilities(registry),
        server_info: info.clone(),
    })
}

/// Advertises exactly the capability kinds the registry actually holds.
fn advertised_capabilities(registry: &Registry) -> ServerCapabilities {
    ServerCapabilities {
        tools: registry.has_tools().then(ToolsCapability::default),
        resources: registry.has_resources().then(ResourcesCapability::default),
        prompts: registry.has_prompts().then(PromptsCapability::default),
    }
}

/// Deserialises required request params.
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorObject> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ErrorObject::invalid_params(format!("Invalid params: {e}")))?
        .ok_or_else(|| ErrorObject::invalid_params("Missing params"))
}

/// Serialises a typed result into the response payload.
fn to_result_value<T: serde::Serialize>(result: T) -> HandlerResult {
    serde_json::to_value(result).map_err(|e| {
        tracing::error!(error = %e, "failed to serialise result");
        ErrorObject::internal("failed to serialise result")
    })
}

/// Maps registry failures onto the wire error taxonomy.
fn registry_error(error: RegistryError) -> ErrorObject {
    match error {
        RegistryError::InvalidArguments(e) => ErrorObject::invalid_params(e.to_string()),
        RegistryError::UnknownResource(uri) => ErrorObject::with_message(
            ErrorCode::ServerError(RESOURCE_NOT_FOUND),
            format!("Resource not found: {uri}"),
        ),
        RegistryError::UnknownPrompt(name) => {
            ErrorObject::invalid_params(format!("Unknown prompt: {name}"))
        }
        RegistryError::Application(e) => ErrorObject::internal(e.message),
        RegistryError::Duplicate { .. } => ErrorObject::internal(error.to_string()),
    }
}
