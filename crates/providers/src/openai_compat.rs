//! OpenAI-compatible chat completions.
//!
//! Covers OpenAI, OpenRouter, Ollama, vLLM and any other endpoint exposing
//! `/chat/completions` with bearer auth, both as one JSON response and as a
//! server-sent event stream.

use async_trait::async_trait;
use deliberate_core::error::ProviderError;
use deliberate_core::message::{Message, MessageToolCall, Role};
use deliberate_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use deliberate_core::tool::ToolDescriptor;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to a default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", default_base_url("openrouter"), api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", default_base_url("openai"), api_key)
    }

    /// Ollama ignores the key, so a placeholder is sent.
    pub fn ollama(base_url: Option<&str>) -> Self {
        let url = base_url.map(str::to_string).unwrap_or_else(|| default_base_url("ollama"));
        Self::new("ollama", url, "ollama")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }
        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                Err(ProviderError::RateLimited { retry_after_secs })
            }
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                let message = response.text().await.unwrap_or_default();
                warn!(provider = %self.name, status, body = %message, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, tools = request.tools.len(), "Sending completion request");
        let response = self.post(&Self::body(&request, false), false).await?;

        let api: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;
        api.into_provider_response()
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");
        let response = self.post(&Self::body(&request, true), true).await?;

        let (tx, rx) = mpsc::channel(64);
        let provider = self.name.clone();
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(data) => data,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                for chunk in decoder.push(&data) {
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() {
                        trace!(provider = %provider, "Stream receiver dropped");
                        return;
                    }
                    if done {
                        return;
                    }
                }
            }

            // Connection closed without [DONE].
            let _ = tx.send(Ok(decoder.finish(None))).await;
        });

        Ok(rx)
    }
}

/// Well-known base URLs; unknown names fall back to a local OpenAI-style server.
pub fn default_base_url(provider: &str) -> String {
    match provider {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "http://localhost:8080/v1".into(),
    }
}

fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            }
            .into(),
            content: Some(m.content.clone()),
            tool_calls: (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|t| ApiTool {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Incremental decoder for the `data:` lines of a chat completion stream.
///
/// Tool-call fragments are merged by their `index` and released, in index
/// order, on the final chunk.
#[derive(Default)]
struct SseDecoder {
    buffer: String,
    calls: BTreeMap<u32, MessageToolCall>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut out = Vec::new();

        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            let line = line.trim_end();
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };

            if data == "[DONE]" {
                out.push(self.finish(None));
                return out;
            }

            let event: StreamResponse = match serde_json::from_str(data) {
                Ok(event) => event,
                Err(e) => {
                    trace!(data, error = %e, "Ignoring unparseable SSE line");
                    continue;
                }
            };

            if let Some(choice) = event.choices.into_iter().next() {
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    self.merge(delta);
                }
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    out.push(StreamChunk {
                        content: Some(content),
                        ..Default::default()
                    });
                }
            }

            // With include_usage the usage record is the last event before [DONE].
            if let Some(usage) = event.usage {
                out.push(self.finish(Some(usage.into())));
                return out;
            }
        }
        out
    }

    fn merge(&mut self, delta: StreamToolCallDelta) {
        let call = self.calls.entry(delta.index).or_insert_with(|| MessageToolCall {
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        });
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name = name;
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(&mut self, usage: Option<Usage>) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.calls).into_values().collect(),
            done: true,
            usage,
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

impl ApiResponse {
    fn into_provider_response(self) -> Result<ProviderResponse, ProviderError> {
        let choice = self.choices.into_iter().next().ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

        let mut message = Message::assistant(choice.message.content.unwrap_or_default());
        message.tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message,
            usage: self.usage.map(Usage::from),
            model: self.model,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &str, content_type: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    fn weather_request() -> ProviderRequest {
        let mut request = ProviderRequest::new("gpt-4o", vec![Message::system("be brief"), Message::user("weather?")]);
        request.tools = vec![ToolDescriptor {
            name: "search".into(),
            description: "Search the web".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        request
    }

    #[test]
    fn constructors_pick_well_known_urls() {
        assert_eq!(OpenAiCompatProvider::openrouter("k").name(), "openrouter");
        assert!(OpenAiCompatProvider::openrouter("k").base_url().contains("openrouter.ai"));
        assert!(OpenAiCompatProvider::openai("k").base_url().contains("api.openai.com"));
        assert!(OpenAiCompatProvider::ollama(None).base_url().contains("localhost:11434"));
        assert_eq!(
            OpenAiCompatProvider::ollama(Some("http://gpu-box:11434/v1/")).base_url(),
            "http://gpu-box:11434/v1"
        );
    }

    #[test]
    fn body_carries_tools_as_functions() {
        let body = OpenAiCompatProvider::body(&weather_request(), false);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn tool_messages_keep_call_ids() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "search".into(),
            arguments: r#"{"q":"paris"}"#.into(),
        }];
        let api = to_api_messages(&[assistant, Message::tool_result("call_1", "18°C")]);
        assert_eq!(api[0].tool_calls.as_ref().unwrap()[0].function.name, "search");
        assert_eq!(api[1].role, "tool");
        assert_eq!(api[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn decoder_emits_content_and_assembles_tool_calls() {
        let mut decoder = SseDecoder::default();
        let first = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"calc\",\"arguments\":\"{}\"}},{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"search\",\"arguments\":\"{\\\"q\\\"\"}}]}}]}\n",
        );
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].content.as_deref(), Some("Hel"));

        // A line split across two network reads.
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,").is_empty());
        assert!(decoder.push(b"\"function\":{\"arguments\":\":1}\"}}]}}]}\n").is_empty());

        let last = decoder.push(b": keep-alive\ndata: [DONE]\n");
        assert_eq!(last.len(), 1);
        assert!(last[0].done);
        let names: Vec<_> = last[0].tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["search", "calc"]);
        assert_eq!(last[0].tool_calls[0].arguments, r#"{"q":1}"#);
    }

    #[test]
    fn decoder_finishes_on_usage_and_skips_garbage() {
        let mut decoder = SseDecoder::default();
        let chunks = decoder.push(
            b"data: not json\ndata: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
        );
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert_eq!(chunks[0].usage.as_ref().unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn complete_parses_message_and_usage() {
        let (url, server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"model":"gpt-4o-2024","choices":[{"message":{"role":"assistant","content":null,"tool_calls":[{"id":"call_1","type":"function","function":{"name":"search","arguments":"{\"q\":\"paris\"}"}}]}}],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#,
        )
        .await;
        let provider = OpenAiCompatProvider::new("test", url, "sk-test");

        let response = provider.complete(weather_request()).await.unwrap();
        assert_eq!(response.model, "gpt-4o-2024");
        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.message.tool_calls[0].name, "search");
        assert_eq!(response.usage.unwrap().total_tokens, 10);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(raw.contains("\"stream\":false"));
    }

    #[tokio::test]
    async fn error_statuses_map_to_provider_errors() {
        let (url, _server) = serve_once("401 Unauthorized", "application/json", "{}").await;
        let err = OpenAiCompatProvider::new("test", url, "bad").complete(weather_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));

        let (url, _server) = serve_once("500 Internal Server Error", "text/plain", "boom").await;
        let err = OpenAiCompatProvider::new("test", url, "k").complete(weather_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 500, ref message } if *message == "boom"));
    }

    #[tokio::test]
    async fn stream_yields_chunks_then_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"It is \"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"sunny\"}}]}\n\n\
                    data: [DONE]\n\n";
        let (url, _server) = serve_once("200 OK", "text/event-stream", body).await;
        let provider = OpenAiCompatProvider::new("test", url, "k");

        let mut rx = provider.stream(weather_request()).await.unwrap();
        let mut text = String::new();
        let mut done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            text.push_str(chunk.content.as_deref().unwrap_or_default());
            done |= chunk.done;
        }
        assert_eq!(text, "It is sunny");
        assert!(done);
    }
}
