//! Slack Events API and slash-command endpoints.
//!
//! Every request except the one-off `url_verification` handshake must carry a
//! valid `X-Slack-Signature`: `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};

use docsearch_core::config::{require, SlackSettings};
use docsearch_core::error::{ensure_success, Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::types::{FusedResult, EXPLANATION_KEY, FILENAME_KEY};
use docsearch_hybrid::SearchOptions;

use crate::error::ApiError;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const FIND_COMMAND: &str = "/find";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    MissingHeaders,
    Stale,
    Mismatch,
}

/// Check a request signature against `secret`; `now` is the current unix time.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
    max_age_secs: u64,
) -> std::result::Result<(), SignatureError> {
    let ts: i64 = timestamp.trim().parse().map_err(|_| SignatureError::MissingHeaders)?;
    if now.abs_diff(ts) > max_age_secs {
        return Err(SignatureError::Stale);
    }
    let provided = signature
        .strip_prefix("v0=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or(SignatureError::Mismatch)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
}

/// `v0=` signature for `body`; the counterpart of [`verify_signature`].
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

fn verify_request(settings: &SlackSettings, headers: &HeaderMap, body: &[u8]) -> std::result::Result<(), Response> {
    let Ok(secret) = require(&settings.signing_secret, "slack.signing_secret") else {
        error!("Slack signing secret not configured");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "Slack signing secret not configured"}))).into_response());
    };
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default();
    let now = chrono::Utc::now().timestamp();
    match verify_signature(secret, header(TIMESTAMP_HEADER), body, header(SIGNATURE_HEADER), now, settings.max_request_age_secs) {
        Ok(()) => Ok(()),
        Err(SignatureError::Stale) => Err((StatusCode::FORBIDDEN, Json(json!({"detail": "Request too old"}))).into_response()),
        Err(_) => Err((StatusCode::FORBIDDEN, Json(json!({"detail": "Invalid signature"}))).into_response()),
    }
}

/// Query text of a mention with every `<@USER>` tag removed.
pub fn extract_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Block Kit message for a result list, with a plain-text fallback.
pub fn format_results(results: &[FusedResult], query: &str, thread_ts: Option<&str>, settings: &SlackSettings) -> Value {
    if results.is_empty() {
        return json!({
            "response_type": "in_channel",
            "thread_ts": thread_ts,
            "text": "No results found for your query.",
            "blocks": [{ "type": "section", "text": { "type": "mrkdwn", "text": "No results found for your query." } }],
        });
    }

    let shown = &results[..results.len().min(settings.max_results)];
    let mut text = format!("Search Results for: {query}\n");
    let mut blocks = vec![json!({ "type": "header", "text": { "type": "plain_text", "text": format!("🧠 Results for: {query}") } })];

    for (i, r) in shown.iter().enumerate() {
        let n = i + 1;
        let source = r.source(FILENAME_KEY).unwrap_or("Unknown");
        let passage = truncate_chars(&r.text, settings.result_chunk_size);
        let explanation = r.source(EXPLANATION_KEY).filter(|e| !e.is_empty()).unwrap_or("No explanation provided");
        text.push_str(&format!("\nResult {n} (Score: {:.2})\nSource: {source}\n{passage}\n", r.score));

        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Result {n} (Score: {:.2})*\n*Source:* {source}\n*Passage:* {passage}\n*Explanation:* {explanation}\n", r.score),
            }
        }));
        if let Some(link) = r.source("download_link").filter(|l| !l.is_empty()) {
            blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": format!("*Document Link:* {link}") } }));
            blocks.push(json!({
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": { "type": "plain_text", "text": "📥 Download Document", "emoji": true },
                    "url": link,
                    "action_id": format!("download_doc_{n}"),
                }]
            }));
        }
        blocks.push(json!({ "type": "divider" }));
    }

    json!({ "response_type": "in_channel", "thread_ts": thread_ts, "text": text, "blocks": blocks })
}

/// Minimal Web API client for `chat.postMessage`.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
}

impl SlackClient {
    pub fn new(settings: &SlackSettings, retry: RetryPolicy) -> Result<Self> {
        let token = require(&settings.bot_token, "slack.bot_token")?.to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { http, api_base: settings.api_base.trim_end_matches('/').to_string(), token, retry })
    }

    pub async fn post_message(&self, channel: &str, mut payload: Value) -> Result<()> {
        payload["channel"] = Value::String(channel.to_string());
        let url = format!("{}/chat.postMessage", self.api_base);
        let body: Value = self
            .retry
            .run("slack.post_message", || async {
                let resp = self.http.post(&url).bearer_auth(&self.token).json(&payload).send().await?;
                Ok(ensure_success(resp).await?.json::<Value>().await?)
            })
            .await?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(Error::Operation(format!("chat.postMessage failed: {reason}")));
        }
        Ok(())
    }
}

pub async fn handle_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event_data: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return ApiError(Error::InvalidInput(format!("event body: {e}"))).into_response(),
    };
    info!(
        event_type = event_data.get("type").and_then(serde_json::Value::as_str).unwrap_or_default(),
        team_id = event_data.get("team_id").and_then(serde_json::Value::as_str).unwrap_or_default(),
        "Received Slack event"
    );

    if event_data.get("type").and_then(Value::as_str) == Some("url_verification") {
        return Json(json!({ "challenge": event_data.get("challenge") })).into_response();
    }
    if let Err(rejection) = verify_request(&state.slack, &headers, &body) {
        return rejection;
    }

    let event = event_data.get("event").cloned().unwrap_or(Value::Null);
    if event.get("type").and_then(Value::as_str) == Some("app_mention") {
        // Slack wants an answer within seconds; the reply goes out on its own.
        tokio::spawn(async move {
            if let Err(e) = handle_mention(&state, &event).await {
                error!("Error handling mention: {e}");
            }
        });
    }
    Json(json!({ "ok": true })).into_response()
}

async fn handle_mention(state: &AppState, event: &Value) -> Result<()> {
    let field = |k: &str| event.get(k).and_then(Value::as_str);
    let channel = field("channel").ok_or_else(|| Error::InvalidInput("app_mention without channel".into()))?;
    let thread_ts = field("thread_ts").or_else(|| field("ts"));
    let Some(client) = &state.slack_client else {
        warn!("slack.bot_token not set; cannot answer mention in {channel}");
        return Ok(());
    };

    let query = extract_query(field("text").unwrap_or_default());
    info!(channel, text_length = query.len(), "Processing app mention");
    if query.is_empty() {
        let payload = json!({ "thread_ts": thread_ts, "text": "Please provide a search query! 🔍" });
        return client.post_message(channel, payload).await;
    }

    let response = state.search.search(&query, &SearchOptions::default()).await?;
    let payload = format_results(&response.results, &query, thread_ts, &state.slack);
    client.post_message(channel, payload).await?;
    info!(channel, num_results = response.len(), "Search results sent");
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub thread_ts: Option<String>,
}

fn ephemeral(text: &str) -> Response {
    Json(json!({ "response_type": "ephemeral", "text": text })).into_response()
}

pub async fn handle_commands(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = verify_request(&state.slack, &headers, &body) {
        return rejection;
    }
    let form: SlashCommand = match serde_urlencoded::from_bytes(&body) {
        Ok(f) => f,
        Err(e) => return ephemeral(&format!("Sorry, I encountered an error: {e}")),
    };
    info!(command = %form.command, channel = %form.channel_id, user = %form.user_id, "Received slash command");

    if form.command != FIND_COMMAND {
        return ephemeral("Unknown command");
    }
    let query = form.text.trim();
    if query.is_empty() {
        return ephemeral("Please provide a search query! Usage: `/find your query here`");
    }
    match state.search.search(query, &SearchOptions::default()).await {
        Ok(response) => Json(format_results(&response.results, query, form.thread_ts.as_deref(), &state.slack)).into_response(),
        Err(e) => {
            error!("Error handling slash command: {e}");
            ephemeral(&format!("Sorry, I encountered an error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_and_tamper() {
        let sig = sign("s3cret", "1700000000", b"token=x&text=hi");
        assert!(sig.starts_with("v0="));
        assert_eq!(verify_signature("s3cret", "1700000000", b"token=x&text=hi", &sig, 1_700_000_010, 300), Ok(()));
        assert_eq!(
            verify_signature("s3cret", "1700000000", b"token=x&text=bye", &sig, 1_700_000_010, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("other", "1700000000", b"token=x&text=hi", &sig, 1_700_000_010, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn old_requests_are_rejected() {
        let sig = sign("s", "1000", b"");
        assert_eq!(verify_signature("s", "1000", b"", &sig, 1000 + 301, 300), Err(SignatureError::Stale));
        assert_eq!(verify_signature("s", "nope", b"", &sig, 1000, 300), Err(SignatureError::MissingHeaders));
    }

    #[test]
    fn mentions_are_stripped() {
        assert_eq!(extract_query("<@U123> how do I  store grain?"), "how do I store grain?");
        assert_eq!(extract_query("hey <@U1> and <@U2>"), "hey and");
        assert_eq!(extract_query("<@U1>"), "");
    }

    #[test]
    fn passages_are_truncated() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }
}
