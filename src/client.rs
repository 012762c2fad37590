//! Client facade over the session engine.
//!
//! Thin typed layer hiding raw envelope construction: each operation maps
//! to exactly one request with a fixed method name and typed
//! params/result. Everything except [`Client::initialize`] requires the
//! session to be `Ready`; earlier calls fail with a state error before any
//! message is written.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::rpc::types::{
    CallToolResult, ClientInfo, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, PromptDef, ReadResourceParams, ReadResourceResult, ResourceContents,
    ResourceDef, ToolCallParams, ToolDef, ToolsListResult, PromptsListResult,
    ResourcesListResult, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::session::{Role, Router, Session, SessionError};
use crate::transport::Transport;

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying session failed (state error, timeout, closure, or a
    /// peer error response).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server settled on a protocol version this client cannot speak.
    #[error("server answered with an unsupported protocol version: {0}")]
    Version(String),

    /// A payload did not match its expected shape.
    #[error("malformed {context} payload: {source}")]
    Malformed {
        /// Which exchange carried the payload.
        context: &'static str,
        /// The underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },
}

/// An MCP client: one session, typed operations.
pub struct Client {
    session: Session,
    info: ClientInfo,
    server: OnceLock<InitializeResult>,
}

impl Client {
    /// Creates a client over `transport`. The connection is not
    /// initialised yet; call [`Client::initialize`] first.
    #[must_use]
    pub fn new(transport: impl Transport + 'static, info: ClientInfo) -> Self {
        Self::with_config(transport, info, SessionConfig::default())
    }

    /// Creates a client with an explicit session configuration.
    #[must_use]
    pub fn with_config(
        transport: impl Transport + 'static,
        info: ClientInfo,
        config: SessionConfig,
    ) -> Self {
        let session = Session::spawn(transport, Router::new(), Role::Client, config);
        Self {
            session,
            info,
            server: OnceLock::new(),
        }
    }

    /// The underlying session handle.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Server identity and capabilities, available after initialisation.
    #[must_use]
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.get()
    }

    /// Performs the initialisation handshake.
    ///
    /// Sends `initialize`, checks the version the server settled on, and
    /// completes the handshake with the `notifications/initialized`
    /// notification. Afterwards the session is `Ready`.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Version`] when the server settles on a
    /// version this client cannot speak (the session is closed in that
    /// case), or with a session error when the exchange itself fails.
    pub async fn initialize(&self) -> Result<InitializeResult, ClientError> {
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Some(self.info.clone()),
        };

        let result: InitializeResult = self
            .request("initialize", Some(encode_params("initialize", &params)?))
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            // No common version; nothing sensible can follow.
            self.session.close().await;
            return Err(ClientError::Version(result.protocol_version));
        }

        self.session.set_negotiated_version(&result.protocol_version);
        self.session
            .send_notification("notifications/initialized", None)
            .await
            .map_err(ClientError::Session)?;

        tracing::info!(
            server = %result.server_info.name,
            version = %result.protocol_version,
            "session initialised"
        );

        let _ = self.server.set(result.clone());
        Ok(result)
    }

    /// Lists the server's tools.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready` or when the exchange fails.
    pub async fn list_tools(&self) -> Result<Vec<ToolDef>, ClientError> {
        let result: ToolsListResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    /// Calls a tool by name.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready`, when the exchange fails,
    /// or when the server rejects the call (bad arguments surface as an
    /// [`SessionError::Rpc`] with the invalid-params code).
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ClientError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(encode_params("tools/call", &params)?))
            .await
    }

    /// Lists the server's resources.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready` or when the exchange fails.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDef>, ClientError> {
        let result: ResourcesListResult = self.request("resources/list", None).await?;
        Ok(result.resources)
    }

    /// Reads a resource by URI.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready`, when the exchange fails,
    /// or when the URI is not registered on the server.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, ClientError> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let result: ReadResourceResult = self
            .request(
                "resources/read",
                Some(encode_params("resources/read", &params)?),
            )
            .await?;
        Ok(result.contents)
    }

    /// Lists the server's prompts.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready` or when the exchange fails.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDef>, ClientError> {
        let result: PromptsListResult = self.request("prompts/list", None).await?;
        Ok(result.prompts)
    }

    /// Renders a prompt by name.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready`, when the exchange fails,
    /// or when the server rejects the render.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<GetPromptResult, ClientError> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request("prompts/get", Some(encode_params("prompts/get", &params)?))
            .await
    }

    /// Checks connection liveness.
    ///
    /// # Errors
    ///
    /// Fails with a session error before `Ready` or when the exchange fails.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let _: Value = self.request("ping", None).await?;
        Ok(())
    }

    /// Closes the session. Idempotent.
    pub async fn close(&self) {
        self.session.close().await;
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let value = self.session.send_request(method, params).await?;
        serde_json::from_value(value).map_err(|source| ClientError::Malformed {
            context: method,
            source,
        })
    }
}

fn encode_params<T: serde::Serialize>(
    context: &'static str,
    params: &T,
) -> Result<Value, ClientError> {
    serde_json::to_value(params).map_err(|source| ClientError::Malformed { context, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::transport::LineTransport;

    fn test_client() -> (Client, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(ours);
        let client = Client::new(
            LineTransport::new(read, write),
            ClientInfo {
                name: "test-client".to_string(),
                version: Some("1.0.0".to_string()),
            },
        );
        (client, theirs)
    }

    #[tokio::test]
    async fn operations_before_initialize_fail_with_state_error() {
        let (client, _peer) = test_client();

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Session(SessionError::InvalidState {
                state: SessionState::Uninitialized,
                ..
            })
        ));

        // Nothing was sent; the session is still pristine.
        assert_eq!(client.session().state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn server_info_empty_before_initialize() {
        let (client, _peer) = test_client();
        assert!(client.server_info().is_none());
    }
}
