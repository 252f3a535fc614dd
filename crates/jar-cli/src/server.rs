use std::sync::Arc;
use std::time::Duration;

use jar_core::{
    MemoryKind, OracleStatus, PointerEvent, PopRequest, PopTrigger, Shape, now_unix_millis,
};
use jar_store::StoreError;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::oracle::GeminiOracle;
use crate::runtime::{JarRuntime, record_json};

#[derive(Clone)]
pub struct JarServer {
    state: Arc<Mutex<JarRuntime>>,
    oracle: GeminiOracle,
    tool_router: ToolRouter<Self>,
}

impl JarServer {
    pub fn new(runtime: JarRuntime, oracle: GeminiOracle) -> Self {
        Self {
            state: Arc::new(Mutex::new(runtime)),
            oracle,
            tool_router: Self::tool_router(),
        }
    }

    /// Wait out the shaking with the lock released, then pick.
    async fn complete_pop(&self, ready_at: u64) -> Result<serde_json::Value, McpError> {
        let wait = ready_at.saturating_sub(now_unix_millis());
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        let mut state = self.state.lock().await;
        let popped = state
            .finish_pop(ready_at)
            .map_err(|e| McpError::internal_error(format!("{e:#}"), None))?;
        Ok(match popped {
            Some(record) => serde_json::json!({ "status": "popped", "memory": record_json(&record) }),
            None => serde_json::json!({ "status": "not_popped" }),
        })
    }

    async fn pop_result(&self, request: PopRequest) -> Result<serde_json::Value, McpError> {
        match request {
            PopRequest::Started { ready_at } => self.complete_pop(ready_at).await,
            PopRequest::EmptyJar => Ok(serde_json::json!({
                "status": "empty",
                "message": "The jar is empty. Create a memory first.",
            })),
            PopRequest::AlreadyShaking => Ok(serde_json::json!({ "status": "already_shaking" })),
            PopRequest::NotIdle => Ok(serde_json::json!({ "status": "not_idle" })),
        }
    }
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateRequest {
    /// "text", "drawing" or "audio"
    kind: String,
    /// The text itself, or a data URI / file reference for drawings and audio
    content: String,
    /// "rect", "circle", "star" or "heart"; defaults to rect
    shape: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GestureRequest {
    /// Pointer events in order, each `{"phase":"start"|"move"|"end","x","y","t"}`
    /// with `t` in milliseconds.
    events: serde_json::Value,
}

#[tool_router]
impl JarServer {
    #[tool(
        description = "Put a new memory in the jar. Text memories need non-empty content; drawing and audio memories take a data URI (data:<mime>;base64,...) or a file reference."
    )]
    async fn jar_create(
        &self,
        Parameters(req): Parameters<CreateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let kind = MemoryKind::parse(&req.kind).ok_or_else(|| {
            McpError::invalid_params(
                format!("kind must be text, drawing or audio, got '{}'", req.kind),
                None,
            )
        })?;
        let shape = match req.shape.as_deref() {
            None => Shape::default(),
            Some(s) => Shape::parse(s).ok_or_else(|| {
                McpError::invalid_params(
                    format!("shape must be rect, circle, star or heart, got '{s}'"),
                    None,
                )
            })?,
        };

        let (staged, writer) = {
            let mut state = self.state.lock().await;
            let staged = state
                .begin_create(kind, &req.content, shape)
                .map_err(|e| McpError::invalid_request(format!("{e:#}"), None))?;
            (staged, state.store.writer())
        };

        // The SQLite write runs on the blocking pool with the jar unlocked,
        // so gestures keep flowing. Detached so a dropped request still
        // settles the session.
        let state = Arc::clone(&self.state);
        let saving = tokio::spawn(async move {
            let written = tokio::task::spawn_blocking(move || writer.write(&staged).map(|()| staged))
                .await
                .unwrap_or_else(|e| Err(StoreError::InvalidData(format!("write task failed: {e}"))));
            let mut state = state.lock().await;
            let record = state.complete_create(written)?;
            anyhow::Ok((record, state.store.len()))
        });
        let (record, memories) = saving
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .map_err(|e| McpError::internal_error(format!("{e:#}"), None))?;

        Ok(json_result(&serde_json::json!({
            "saved": record_json(&record),
            "memories": memories,
        })))
    }

    #[tool(
        description = "Shake the jar and pop one memory at random. Waits for the shake to finish, then returns the memory now being viewed."
    )]
    async fn jar_pop(&self) -> Result<CallToolResult, McpError> {
        let request = {
            let mut state = self.state.lock().await;
            let JarRuntime { session, store, .. } = &mut *state;
            session.request_pop(&*store, now_unix_millis())
        };
        let result = self.pop_result(request).await?;
        Ok(json_result(&result))
    }

    #[tool(
        description = "Feed raw pointer events to the jar. Fast horizontal dragging tilts it and builds shake energy; enough energy, or a tap without movement, pops a memory."
    )]
    async fn jar_gesture(
        &self,
        Parameters(req): Parameters<GestureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let events: Vec<PointerEvent> = serde_json::from_value(req.events)
            .map_err(|e| McpError::invalid_params(format!("invalid pointer events: {e}"), None))?;

        let (triggers, started, tilt, energy) = {
            let mut state = self.state.lock().await;
            let mut triggers = Vec::new();
            let mut started = None;
            for event in events {
                if let Some((trigger, request)) = state.feed(event) {
                    let name = match trigger {
                        PopTrigger::Shake => "shake",
                        PopTrigger::Tap => "tap",
                    };
                    triggers.push(name);
                    if started.is_none() && !matches!(request, PopRequest::AlreadyShaking) {
                        started = Some(request);
                    }
                }
            }
            (triggers, started, state.drag.tilt(), state.drag.energy())
        };

        let pop = match started {
            Some(request) => self.pop_result(request).await?,
            None => serde_json::Value::Null,
        };

        Ok(json_result(&serde_json::json!({
            "tilt": tilt,
            "energy": energy,
            "triggers": triggers,
            "pop": pop,
        })))
    }

    #[tool(
        description = "Ask the oracle for a vibe check on the memory being viewed. Falls back to a 'Disconnected' reading when the oracle cannot be reached."
    )]
    async fn jar_consult_oracle(&self) -> Result<CallToolResult, McpError> {
        let (ticket, request) = {
            let mut state = self.state.lock().await;
            state.session.consult_oracle().ok_or_else(|| {
                McpError::invalid_request(
                    "no memory is being viewed, or the oracle is already being consulted"
                        .to_string(),
                    None,
                )
            })?
        };

        let result = self.oracle.consult(&request).await;
        if let Err(e) = &result {
            tracing::warn!("oracle unavailable, using fallback reading: {e}");
        }

        let mut state = self.state.lock().await;
        let applied = state.session.resolve_oracle(&ticket, result);
        let reading = state
            .session
            .viewing()
            .and_then(|v| match v.oracle() {
                OracleStatus::Resolved(r) => Some(r.clone()),
                _ => None,
            });

        Ok(json_result(&serde_json::json!({
            "applied": applied,
            "reading": reading,
        })))
    }

    #[tool(description = "Put the viewed memory back and return the jar to idle.")]
    async fn jar_close(&self) -> Result<CallToolResult, McpError> {
        let mut state = self.state.lock().await;
        let closed = state.session.close();
        Ok(json_result(&serde_json::json!({
            "closed": closed,
            "state": state.session.state().name(),
        })))
    }

    #[tool(description = "Count the memories in the jar by type, with storage usage and session state.")]
    async fn jar_stats(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        Ok(json_result(&state.stats_json()))
    }

    #[tool(description = "Export every memory as a JSON array.")]
    async fn jar_export(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let json = state
            .store
            .export_json_string()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for JarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "VaporJar keeps small memories (text, drawings, audio) in a jar.\n\
                 Use jar_create to add one. Shake with jar_gesture or just call jar_pop to pull a random \
                 memory out; it stays in view until jar_close. While viewing, jar_consult_oracle asks the \
                 VaporOracle for a short reading of it."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
