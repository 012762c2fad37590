//! Server-side capability catalog.
//!
//! A [`Registry`] owns the three capability kinds a server exposes:
//!
//! - **Tools**: invokable behaviors with a declared input schema
//! - **Resources**: readable content addressed by URI
//! - **Prompts**: render behaviors producing message templates
//!
//! Registration happens before (or rarely during) serving; listing and
//! invocation happen on every inbound request. The catalogs are therefore
//! read-mostly: plain `RwLock`s around insertion-ordered maps, with
//! handler references cloned out before any `await`.
//!
//! Re-registering a name that is already taken is rejected, never
//! silently replaced.

pub mod schema;

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::rpc::types::{
    CallToolResult, GetPromptResult, PromptDef, ResourceContents, ResourceDef, ToolDef,
};
use self::schema::SchemaError;

/// A failure inside a capability behavior.
///
/// Behavior failures are reported to the peer as structured error results
/// or application error codes; they never tear down the session.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApplicationError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl ApplicationError {
    /// Creates an application error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ApplicationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ApplicationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A capability with this name is already registered.
    #[error("a {kind} named {name:?} is already registered")]
    Duplicate {
        /// Capability kind ("tool", "resource", "prompt").
        kind: &'static str,
        /// The contested name.
        name: String,
    },

    /// No resource is registered under this URI.
    #[error("unknown resource uri: {0}")]
    UnknownResource(String),

    /// No prompt is registered under this name.
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    /// Arguments do not satisfy the declared schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] SchemaError),

    /// A resource or prompt behavior failed.
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// An invokable tool behavior.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with schema-validated arguments.
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ApplicationError>;
}

/// A readable resource behavior.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Reads the resource content addressed by `uri`.
    async fn read(&self, uri: &str) -> Result<Vec<ResourceContents>, ApplicationError>;
}

/// A prompt render behavior.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Renders the prompt with schema-validated arguments.
    async fn render(&self, arguments: Value) -> Result<GetPromptResult, ApplicationError>;
}

struct FnToolHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Result<CallToolResult, ApplicationError> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ApplicationError> {
        (self.0)(arguments)
    }
}

struct FnResourceHandler<F>(F);

#[async_trait]
impl<F> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(&str) -> Result<Vec<ResourceContents>, ApplicationError> + Send + Sync,
{
    async fn read(&self, uri: &str) -> Result<Vec<ResourceContents>, ApplicationError> {
        (self.0)(uri)
    }
}

struct FnPromptHandler<F>(F);

#[async_trait]
impl<F> PromptHandler for FnPromptHandler<F>
where
    F: Fn(Value) -> Result<GetPromptResult, ApplicationError> + Send + Sync,
{
    async fn render(&self, arguments: Value) -> Result<GetPromptResult, ApplicationError> {
        (self.0)(arguments)
    }
}

/// A tool descriptor bound to its behavior.
pub struct Tool {
    /// The descriptor carried in `tools/list`.
    pub def: ToolDef,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Creates a tool from a descriptor and a handler object.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            def: ToolDef {
                name: name.into(),
                description: Some(description.into()),
                input_schema,
            },
            handler: Arc::new(handler),
        }
    }

    /// Creates a tool from a plain function.
    #[must_use]
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        behavior: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<CallToolResult, ApplicationError> + Send + Sync + 'static,
    {
        Self::new(name, description, input_schema, FnToolHandler(behavior))
    }
}

/// A resource descriptor bound to its read behavior.
pub struct Resource {
    /// The descriptor carried in `resources/list`.
    pub def: ResourceDef,
    handler: Arc<dyn ResourceHandler>,
}

impl Resource {
    /// Creates a resource from a descriptor and a handler object.
    #[must_use]
    pub fn new(def: ResourceDef, handler: impl ResourceHandler + 'static) -> Self {
        Self {
            def,
            handler: Arc::new(handler),
        }
    }

    /// Creates a resource from a plain function.
    #[must_use]
    pub fn from_fn<F>(def: ResourceDef, behavior: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<ResourceContents>, ApplicationError> + Send + Sync + 'static,
    {
        Self::new(def, FnResourceHandler(behavior))
    }
}

/// A prompt descriptor bound to its render behavior.
pub struct Prompt {
    /// The descriptor carried in `prompts/list`.
    pub def: PromptDef,
    handler: Arc<dyn PromptHandler>,
}

impl Prompt {
    /// Creates a prompt from a descriptor and a handler object.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments_schema: Value,
        handler: impl PromptHandler + 'static,
    ) -> Self {
        Self {
            def: PromptDef {
                name: name.into(),
                description: Some(description.into()),
                arguments_schema,
            },
            handler: Arc::new(handler),
        }
    }

    /// Creates a prompt from a plain function.
    #[must_use]
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments_schema: Value,
        behavior: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<GetPromptResult, ApplicationError> + Send + Sync + 'static,
    {
        Self::new(name, description, arguments_schema, FnPromptHandler(behavior))
    }
}

/// The capability catalog of one server.
#[derive(Default)]
pub struct Registry {
    tools: RwLock<IndexMap<String, Tool>>,
    resources: RwLock<IndexMap<String, Resource>>,
    prompts: RwLock<IndexMap<String, Prompt>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_tool(&self, tool: Tool) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&tool.def.name) {
            return Err(RegistryError::Duplicate {
                kind: "tool",
                name: tool.def.name,
            });
        }
        tools.insert(tool.def.name.clone(), tool);
        Ok(())
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_resource(&self, resource: Resource) -> Result<(), RegistryError> {
        let mut resources = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if resources.contains_key(&resource.def.name) {
            return Err(RegistryError::Duplicate {
                kind: "resource",
                name: resource.def.name,
            });
        }
        resources.insert(resource.def.name.clone(), resource);
        Ok(())
    }

    /// Registers a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is taken.
    pub fn register_prompt(&self, prompt: Prompt) -> Result<(), RegistryError> {
        let mut prompts = self.prompts.write().unwrap_or_else(PoisonError::into_inner);
        if prompts.contains_key(&prompt.def.name) {
            return Err(RegistryError::Duplicate {
                kind: "prompt",
                name: prompt.def.name,
            });
        }
        prompts.insert(prompt.def.name.clone(), prompt);
        Ok(())
    }

    /// Lists tool descriptors in registration order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDef> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tool| tool.def.clone())
            .collect()
    }

    /// Lists resource descriptors in registration order.
    #[must_use]
    pub fn list_resources(&self) -> Vec<ResourceDef> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|resource| resource.def.clone())
            .collect()
    }

    /// Lists prompt descriptors in registration order.
    #[must_use]
    pub fn list_prompts(&self) -> Vec<PromptDef> {
        self.prompts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|prompt| prompt.def.clone())
            .collect()
    }

    /// Whether any tools are registered.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Whether any resources are registered.
    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Whether any prompts are registered.
    #[must_use]
    pub fn has_prompts(&self) -> bool {
        !self
            .prompts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Invokes a tool by name.
    ///
    /// An unregistered name is an application-level failure: the call
    /// returns an error *result* and the session stays healthy.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArguments`] when `arguments` do not
    /// satisfy the tool's declared input schema.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, RegistryError> {
        let looked_up = {
            let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
            tools
                .get(name)
                .map(|tool| (tool.def.input_schema.clone(), Arc::clone(&tool.handler)))
        };

        let Some((input_schema, handler)) = looked_up else {
            return Ok(CallToolResult::error(format!("Unknown tool: {name}")));
        };

        schema::validate(&arguments, &input_schema)?;

        match handler.call(arguments).await {
            Ok(result) => Ok(result),
            Err(failure) => Ok(CallToolResult::error(failure.message)),
        }
    }

    /// Reads a resource by URI.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownResource`] when no resource is
    /// registered under `uri`, and [`RegistryError::Application`] when the
    /// read behavior fails.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, RegistryError> {
        let handler = {
            let resources = self
                .resources
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            resources
                .values()
                .find(|resource| resource.def.uri == uri)
                .map(|resource| Arc::clone(&resource.handler))
        };

        let Some(handler) = handler else {
            return Err(RegistryError::UnknownResource(uri.to_string()));
        };

        Ok(handler.read(uri).await?)
    }

    /// Renders a prompt by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownPrompt`] for an unregistered name,
    /// [`RegistryError::InvalidArguments`] when `arguments` do not satisfy
    /// the prompt's schema, and [`RegistryError::Application`] when the
    /// render behavior fails.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<GetPromptResult, RegistryError> {
        let looked_up = {
            let prompts = self.prompts.read().unwrap_or_else(PoisonError::into_inner);
            prompts
                .get(name)
                .map(|prompt| (prompt.def.arguments_schema.clone(), Arc::clone(&prompt.handler)))
        };

        let Some((arguments_schema, handler)) = looked_up else {
            return Err(RegistryError::UnknownPrompt(name.to_string()));
        };

        schema::validate(&arguments, &arguments_schema)?;

        Ok(handler.render(arguments).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::PromptMessage;
    use serde_json::json;

    fn find_level_tool() -> Tool {
        Tool::from_fn(
            "FindLevel",
            "Determines the student's English level based on their quiz score.",
            json!({
                "type": "object",
                "properties": { "grade": { "type": "integer" } },
                "required": ["grade"]
            }),
            |arguments| {
                let grade = arguments
                    .get("grade")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ApplicationError::new("grade missing"))?;
                let level = match grade {
                    g if g < 50 => "Beginner",
                    g if g < 75 => "Intermediate",
                    _ => "Expert",
                };
                Ok(CallToolResult::text(level))
            },
        )
    }

    #[tokio::test]
    async fn call_registered_tool() {
        let registry = Registry::new();
        registry.register_tool(find_level_tool()).unwrap();

        let result = registry
            .call_tool("FindLevel", json!({"grade": 86}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, vec![crate::rpc::types::Content::text("Expert")]);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let registry = Registry::new();
        let result = registry.call_tool("Nope", json!({})).await.unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn schema_violation_is_invalid_arguments() {
        let registry = Registry::new();
        registry.register_tool(find_level_tool()).unwrap();

        let err = registry
            .call_tool("FindLevel", json!({"grade": "eighty-six"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn behavior_failure_becomes_error_result() {
        let registry = Registry::new();
        registry
            .register_tool(Tool::from_fn(
                "broken",
                "always fails",
                json!({"type": "object"}),
                |_| Err(ApplicationError::new("internal breakage")),
            ))
            .unwrap();

        let result = registry.call_tool("broken", json!({})).await.unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.register_tool(find_level_tool()).unwrap();
        let err = registry.register_tool(find_level_tool()).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { kind: "tool", .. }));
    }

    #[test]
    fn listings_preserve_registration_order() {
        let registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_tool(Tool::from_fn(
                    name,
                    "t",
                    json!({"type": "object"}),
                    |_| Ok(CallToolResult::text("ok")),
                ))
                .unwrap();
        }

        let names: Vec<_> = registry
            .list_tools()
            .into_iter()
            .map(|def| def.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn read_resource_by_uri() {
        let registry = Registry::new();
        registry
            .register_resource(Resource::from_fn(
                ResourceDef {
                    name: "GetQuiz".to_string(),
                    uri: "https://quiz.xyz".to_string(),
                    description: Some("quiz link".to_string()),
                    mime_type: Some("text/plain".to_string()),
                },
                |uri| {
                    Ok(vec![ResourceContents::text(
                        uri,
                        "Link to online quiz: https://quiz.xyz",
                    )])
                },
            ))
            .unwrap();

        let contents = registry.read_resource("https://quiz.xyz").await.unwrap();
        assert_eq!(contents.len(), 1);
        assert!(contents[0].text.as_deref().unwrap().contains("quiz.xyz"));

        let err = registry.read_resource("https://nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn get_prompt_renders_messages() {
        let registry = Registry::new();
        registry
            .register_prompt(Prompt::from_fn(
                "GetPrompt",
                "Teaching prompt",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "level": { "type": "string" }
                    },
                    "required": ["name", "level"]
                }),
                |arguments| {
                    let name = arguments.get("name").and_then(Value::as_str).unwrap_or("?");
                    let level = arguments.get("level").and_then(Value::as_str).unwrap_or("?");
                    Ok(GetPromptResult {
                        description: None,
                        messages: vec![PromptMessage::user(format!(
                            "Teach {name} English based on this level: {level}."
                        ))],
                    })
                },
            ))
            .unwrap();

        let rendered = registry
            .get_prompt("GetPrompt", json!({"name": "Ada", "level": "Expert"}))
            .await
            .unwrap();
        assert_eq!(rendered.messages.len(), 1);

        let err = registry
            .get_prompt("GetPrompt", json!({"name": "Ada"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArguments(_)));
    }
}
