//! End-to-end session tests.
//!
//! A real client and a real server, wired through in-memory duplex
//! transports: handshake, capability traffic, correlation under
//! concurrency, and teardown semantics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_ok;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mcp_session::registry::{ApplicationError, Prompt, Registry, Resource, Tool, ToolHandler};
use mcp_session::rpc::types::{
    CallToolResult, ClientInfo, Content, GetPromptResult, PromptMessage, ResourceContents,
    ResourceDef, ServerInfo, LATEST_PROTOCOL_VERSION,
};
use mcp_session::rpc::{decode, encode, ErrorCode, Message, Notification, Request, Response};
use mcp_session::transport::LineTransport;
use mcp_session::{Client, ClientError, Server, Session, SessionConfig, SessionError, SessionState};

/// A tool that answers with its `tag` argument after `delay_ms`.
struct SlowEcho;

#[async_trait::async_trait]
impl ToolHandler for SlowEcho {
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ApplicationError> {
        let delay = arguments.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        let tag = arguments
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(CallToolResult::text(tag))
    }
}

/// A tool that never answers within any test's lifetime.
struct Hang;

#[async_trait::async_trait]
impl ToolHandler for Hang {
    async fn call(&self, _arguments: Value) -> Result<CallToolResult, ApplicationError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(CallToolResult::text("too late"))
    }
}

fn demo_registry() -> Registry {
    let registry = Registry::new();

    registry
        .register_tool(Tool::from_fn(
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
                    .ok_or_else(|| ApplicationError::new("grade must be an integer"))?;
                let level = if grade < 50 {
                    "Beginner"
                } else if grade < 75 {
                    "Intermediate"
                } else {
                    "Expert"
                };
                Ok(CallToolResult::text(level))
            },
        ))
        .unwrap();

    registry
        .register_tool(Tool::new(
            "SlowEcho",
            "Echoes its tag after a delay.",
            json!({
                "type": "object",
                "properties": {
                    "tag": { "type": "string" },
                    "delay_ms": { "type": "integer" }
                },
                "required": ["tag"]
            }),
            SlowEcho,
        ))
        .unwrap();

    registry
        .register_tool(Tool::new(
            "Hang",
            "Never answers.",
            json!({"type": "object"}),
            Hang,
        ))
        .unwrap();

    registry
        .register_resource(Resource::from_fn(
            ResourceDef {
                name: "GetQuiz".to_string(),
                uri: "https://quiz.xyz".to_string(),
                description: Some("Quiz link".to_string()),
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

    registry
        .register_prompt(Prompt::from_fn(
            "GetPrompt",
            "English teaching prompt.",
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

    registry
}

fn client_info() -> ClientInfo {
    ClientInfo {
        name: "lifecycle-tests".to_string(),
        version: Some("1.0.0".to_string()),
    }
}

/// Wires a client and a server together over an in-memory duplex pair.
fn serve_pair(registry: Registry, config: SessionConfig) -> (Client, Session) {
    let (client_io, server_io) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, server_write) = tokio::io::split(server_io);

    let server = Server::new(ServerInfo::new("demo-server", "0.1.0"), Arc::new(registry))
        .with_config(config.clone());
    let server_session = server.serve(LineTransport::new(server_read, server_write));

    let client = Client::with_config(
        LineTransport::new(client_read, client_write),
        client_info(),
        config,
    );
    (client, server_session)
}

#[tokio::test]
async fn handshake_then_full_capability_surface() {
    let (client, server_session) = serve_pair(demo_registry(), SessionConfig::default());

    let init = client.initialize().await.unwrap();
    assert_eq!(init.protocol_version, LATEST_PROTOCOL_VERSION);
    assert_eq!(init.server_info.name, "demo-server");
    assert!(init.capabilities.tools.is_some());
    assert!(init.capabilities.resources.is_some());
    assert!(init.capabilities.prompts.is_some());
    assert_eq!(client.session().state(), SessionState::Ready);

    let tools: Vec<String> = client
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|def| def.name)
        .collect();
    assert_eq!(tools, vec!["FindLevel", "SlowEcho", "Hang"]);

    let result = client
        .call_tool("FindLevel", json!({"grade": 86}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.content, vec![Content::text("Expert")]);

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources[0].uri, "https://quiz.xyz");
    let contents = client.read_resource("https://quiz.xyz").await.unwrap();
    assert_eq!(
        contents[0].text.as_deref(),
        Some("Link to online quiz: https://quiz.xyz")
    );

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts[0].name, "GetPrompt");
    let rendered = client
        .get_prompt("GetPrompt", json!({"name": "Ada", "level": "Expert"}))
        .await
        .unwrap();
    let Content::Text { text } = &rendered.messages[0].content;
    assert_eq!(text, "Teach Ada English based on this level: Expert.");

    tokio_test::assert_ok!(client.ping().await);

    // Both sides settled on the same version.
    assert_eq!(
        server_session.negotiated_version().as_deref(),
        Some(LATEST_PROTOCOL_VERSION)
    );
}

#[tokio::test]
async fn concurrent_calls_resolve_to_their_own_callers() {
    let (client, _server_session) = serve_pair(demo_registry(), SessionConfig::default());
    client.initialize().await.unwrap();

    // The slow call finishes last even though it was issued first; each
    // caller must still receive its own tag.
    let (slow, fast) = tokio::join!(
        client.call_tool("SlowEcho", json!({"tag": "slow", "delay_ms": 120})),
        client.call_tool("SlowEcho", json!({"tag": "fast", "delay_ms": 0})),
    );

    assert_eq!(slow.unwrap().content, vec![Content::text("slow")]);
    assert_eq!(fast.unwrap().content, vec![Content::text("fast")]);
}

#[tokio::test]
async fn unknown_tool_is_an_error_result_and_session_survives() {
    let (client, server_session) = serve_pair(demo_registry(), SessionConfig::default());
    client.initialize().await.unwrap();

    let result = client.call_tool("NoSuchTool", json!({})).await.unwrap();
    assert!(result.is_error);

    // The session is unaffected; real calls keep working.
    assert_eq!(server_session.state(), SessionState::Ready);
    let result = client
        .call_tool("FindLevel", json!({"grade": 40}))
        .await
        .unwrap();
    assert_eq!(result.content, vec![Content::text("Beginner")]);
}

#[tokio::test]
async fn schema_violations_surface_as_invalid_params() {
    let (client, _server_session) = serve_pair(demo_registry(), SessionConfig::default());
    client.initialize().await.unwrap();

    let err = client
        .call_tool("FindLevel", json!({"grade": "eighty-six"}))
        .await
        .unwrap_err();
    let ClientError::Session(SessionError::Rpc(error)) = err else {
        panic!("expected an RPC error, got {err:?}");
    };
    assert_eq!(error.code, ErrorCode::InvalidParams.code());

    // Valid calls still succeed afterwards.
    client.call_tool("FindLevel", json!({"grade": 99})).await.unwrap();
}

#[tokio::test]
async fn unknown_resource_surfaces_application_code() {
    let (client, _server_session) = serve_pair(demo_registry(), SessionConfig::default());
    client.initialize().await.unwrap();

    let err = client.read_resource("mem://nope").await.unwrap_err();
    let ClientError::Session(SessionError::Rpc(error)) = err else {
        panic!("expected an RPC error, got {err:?}");
    };
    assert_eq!(error.code, -32002);
}

#[tokio::test]
async fn close_resolves_pending_calls_and_blocks_new_ones() {
    let config = SessionConfig {
        request_timeout: None,
        ..SessionConfig::default()
    };
    let (client, _server_session) = serve_pair(demo_registry(), config);
    client.initialize().await.unwrap();

    let client = Arc::new(client);
    let hanging = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call_tool("Hang", json!({})).await })
    };
    // Let the hanging call get onto the wire before closing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.close().await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), hanging)
        .await
        .expect("pending call resolves after close")
        .unwrap();
    assert!(matches!(
        outcome,
        Err(ClientError::Session(SessionError::Closed))
    ));

    let err = client.ping().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Session(SessionError::Closed)
    ));
    assert_eq!(client.session().state(), SessionState::Closed);
}

#[tokio::test]
async fn server_observes_client_disconnect() {
    let (client, server_session) = serve_pair(demo_registry(), SessionConfig::default());
    client.initialize().await.unwrap();

    client.close().await;

    tokio::time::timeout(Duration::from_secs(1), server_session.closed())
        .await
        .expect("server session drains to closed");
    assert_eq!(server_session.state(), SessionState::Closed);
}

// =============================================================================
// Raw-frame tests (driving the server without the client facade)
// =============================================================================

type RawReader = tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>;
type RawWriter = tokio::io::WriteHalf<tokio::io::DuplexStream>;

fn serve_raw(registry: Registry) -> (RawReader, RawWriter, Session) {
    let (client_io, server_io) = tokio::io::duplex(8192);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, server_write) = tokio::io::split(server_io);

    let server = Server::new(ServerInfo::new("demo-server", "0.1.0"), Arc::new(registry));
    let server_session = server.serve(LineTransport::new(server_read, server_write));

    (
        BufReader::new(client_read).lines(),
        client_write,
        server_session,
    )
}

async fn raw_send(writer: &mut RawWriter, message: &Message) {
    let mut frame = encode(message);
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await.unwrap();
}

async fn raw_recv(reader: &mut RawReader) -> Message {
    let line = reader.next_line().await.unwrap().expect("stream open");
    decode(&line).unwrap()
}

fn initialize_request(id: i64) -> Message {
    Message::Request(Request::new(
        id,
        "initialize",
        Some(json!({
            "protocolVersion": LATEST_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "raw-client" }
        })),
    ))
}

#[tokio::test]
async fn requests_before_handshake_get_invalid_request() {
    let invoked = Arc::new(AtomicBool::new(false));
    let registry = Registry::new();
    {
        let invoked = Arc::clone(&invoked);
        registry
            .register_tool(Tool::from_fn(
                "probe",
                "records invocation",
                json!({"type": "object"}),
                move |_| {
                    invoked.store(true, Ordering::SeqCst);
                    Ok(CallToolResult::text("called"))
                },
            ))
            .unwrap();
    }

    let (mut reader, mut writer, server_session) = serve_raw(registry);

    // A tools/call before any handshake traffic.
    raw_send(
        &mut writer,
        &Message::Request(Request::new(
            1,
            "tools/call",
            Some(json!({"name": "probe", "arguments": {}})),
        )),
    )
    .await;

    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    let error = response.outcome.unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidRequest.code());
    assert!(!invoked.load(Ordering::SeqCst));

    // The full handshake still works afterwards.
    raw_send(&mut writer, &initialize_request(2)).await;
    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    assert!(response.outcome.is_ok());

    raw_send(
        &mut writer,
        &Message::Notification(Notification::new("notifications/initialized", None)),
    )
    .await;

    raw_send(
        &mut writer,
        &Message::Request(Request::new(
            3,
            "tools/call",
            Some(json!({"name": "probe", "arguments": {}})),
        )),
    )
    .await;
    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    assert!(response.outcome.is_ok());
    assert!(invoked.load(Ordering::SeqCst));
    assert_eq!(server_session.state(), SessionState::Ready);
}

#[tokio::test]
async fn malformed_frames_are_tolerated() {
    let (mut reader, mut writer, server_session) = serve_raw(demo_registry());

    // Truncated JSON: no id is recoverable, so the server only logs.
    writer.write_all(b"{\"jsonrpc\": \"2.0\", \"met\n").await.unwrap();
    // Shape violation with a recoverable id: answered with an error.
    writer
        .write_all(b"{\"jsonrpc\": \"2.0\", \"id\": 41, \"result\": 1, \"error\": {\"code\": 1, \"message\": \"x\"}}\n")
        .await
        .unwrap();

    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    assert_eq!(response.id, mcp_session::rpc::RequestId::Number(41));
    assert_eq!(
        response.outcome.unwrap_err().code,
        ErrorCode::InvalidRequest.code()
    );

    // The reader kept going: the handshake proceeds normally.
    raw_send(&mut writer, &initialize_request(42)).await;
    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    assert!(response.outcome.is_ok());
    assert_ne!(server_session.state(), SessionState::Closed);
}

#[tokio::test]
async fn duplicate_responses_are_ignored() {
    // A server-role session never sends requests here, so any response we
    // push at it is unmatched; it must stay healthy regardless.
    let (mut reader, mut writer, server_session) = serve_raw(demo_registry());

    raw_send(
        &mut writer,
        &Message::Response(Response::success(
            mcp_session::rpc::RequestId::Number(12345),
            json!("stray"),
        )),
    )
    .await;

    raw_send(&mut writer, &initialize_request(1)).await;
    let Message::Response(response) = raw_recv(&mut reader).await else {
        panic!("expected response");
    };
    assert!(response.outcome.is_ok());
    assert_ne!(server_session.state(), SessionState::Closed);
}
