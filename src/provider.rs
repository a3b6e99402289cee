use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use utoipa::ToSchema;

/// Why a single model attempt produced no text.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API Error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("API returned no content")]
    NoContent,

    #[error("API returned empty content")]
    Empty,
}

impl ProviderError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(e)
        }
    }
}

/// Model used by the proxy when the request names none.
pub const DEFAULT_PROXY_MODEL: &str = "gemini-2.5-flash-lite";

/// Body accepted by the generation proxy.
#[derive(serde::Serialize, serde::Deserialize, ToSchema, Debug, Clone)]
pub struct ProxyReq {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body returned by the generation proxy: `{text}` on success, `{error}`
/// with a non-2xx status otherwise.
#[derive(serde::Serialize, serde::Deserialize, ToSchema, Debug, Clone)]
pub struct ProxyResp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiReq<'a> {
    contents: [GeminiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPartReq<'a>; 1],
}

#[derive(serde::Serialize)]
struct GeminiPartReq<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 800,
        }
    }
}

#[derive(serde::Deserialize, Debug)]
struct GeminiResp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(serde::Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

#[derive(serde::Deserialize, Debug)]
struct GeminiErrorDetail {
    message: String,
}

/// Where one prompt for one model gets sent.
#[derive(Clone)]
pub enum Provider {
    /// Our own `POST {prompt, model}` endpoint, which holds the upstream key.
    Proxy {
        url: String,
        auth_token: Option<String>,
    },
    /// The Gemini `generateContent` API, called directly.
    Gemini { base_url: String, api_key: String },
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proxy { url, .. } => {
                f.debug_struct("Proxy").field("url", url).finish()
            }
            Self::Gemini { base_url, .. } => f
                .debug_struct("Gemini")
                .field("base_url", base_url)
                .field("api_key", &"<XXXXX>")
                .finish(),
        }
    }
}

impl Provider {
    #[tracing::instrument(skip(self, client, prompt), fields(provider = ?self))]
    pub async fn complete(
        &self,
        client: &Client,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        match self {
            Self::Proxy { url, auth_token } => {
                complete_via_proxy(
                    client,
                    url,
                    auth_token.as_deref(),
                    model,
                    prompt,
                    timeout,
                )
                .await
            }
            Self::Gemini { base_url, api_key } => {
                complete_via_gemini(
                    client, base_url, api_key, model, prompt, timeout,
                )
                .await
            }
        }
    }
}

async fn complete_via_proxy(
    client: &Client,
    url: &str,
    auth_token: Option<&str>,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let body = ProxyReq {
        prompt: prompt.to_string(),
        model: Some(model.to_string()),
    };
    let mut req = client.post(url).timeout(timeout).json(&body);
    if let Some(token) = auth_token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let resp = req
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;
    let parsed: Option<ProxyResp> = serde_json::from_slice(&bytes).ok();
    if !status.is_success() {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| reason(status));
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        });
    }
    let parsed = parsed.ok_or_else(|| {
        ProviderError::Malformed(String::from_utf8_lossy(&bytes).into_owned())
    })?;
    match parsed.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::Empty),
    }
}

/// Accepts both `gemini-2.5-pro` and the bare `2.5-pro`.
fn gemini_model_name(model: &str) -> String {
    if model.contains("gemini-") {
        model.to_string()
    } else {
        format!("gemini-{model}")
    }
}

pub async fn complete_via_gemini(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let model = gemini_model_name(model);
    let url = format!(
        "{}/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    );
    tracing::debug!(%url, "Calling Gemini.");
    let body = GeminiReq {
        contents: [GeminiContent {
            parts: [GeminiPartReq { text: prompt }],
        }],
        generation_config: GenerationConfig::default(),
    };
    let resp = client
        .post(&url)
        .query(&[("key", api_key)])
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;
    if !status.is_success() {
        let message = serde_json::from_slice::<GeminiErrorBody>(&bytes)
            .ok()
            .and_then(|b| b.error)
            .map(|e| e.message)
            .unwrap_or_else(|| reason(status));
        tracing::error!(status = status.as_u16(), %message, "Gemini error.");
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        });
    }
    let parsed: GeminiResp = serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let first = parsed.candidates.into_iter().next().ok_or_else(|| {
        tracing::error!("No candidates in Gemini response.");
        ProviderError::NoContent
    })?;
    let text = first
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ProviderError::Empty);
    }
    Ok(text)
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown error").to_string()
}

#[cfg(test)]
mod tests {
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[test]
    fn gemini_request_wire_format() {
        let body = GeminiReq {
            contents: [GeminiContent {
                parts: [GeminiPartReq { text: "hi" }],
            }],
            generation_config: GenerationConfig::default(),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(v["generationConfig"]["topK"], 40);
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 800);
    }

    #[test]
    fn bare_model_names_get_prefixed() {
        assert_eq!(gemini_model_name("2.5-pro"), "gemini-2.5-pro");
        assert_eq!(gemini_model_name("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn gemini_text_and_errors() {
        let app = Router::new().route(
            "/v1/models/:call",
            post(|Path(call): Path<String>| async move {
                match call.as_str() {
                    "gemini-ok:generateContent" => (
                        StatusCode::OK,
                        Json(json!({"candidates": [
                            {"content": {"parts": [{"text": "Company Name: X"}]}}
                        ]})),
                    ),
                    "gemini-none:generateContent" => {
                        (StatusCode::OK, Json(json!({"candidates": []})))
                    }
                    _ => (
                        StatusCode::NOT_FOUND,
                        Json(json!({"error": {"message": "model not found"}})),
                    ),
                }
            }),
        );
        let base = format!("{}/v1", serve(app).await);
        let client = Client::new();
        let t = Duration::from_secs(5);

        let text = complete_via_gemini(&client, &base, "k", "ok", "p", t)
            .await
            .unwrap();
        assert_eq!(text, "Company Name: X");

        let err = complete_via_gemini(&client, &base, "k", "none", "p", t)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoContent));

        let err = complete_via_gemini(&client, &base, "k", "nope", "p", t)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API Error (404): model not found");
    }

    #[tokio::test]
    async fn proxy_forwards_model_and_reports_timeouts() {
        let app = Router::new().route(
            "/gen",
            post(|Json(req): Json<Value>| async move {
                if req["model"] == "slow" {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Json(json!({"text": format!("from {}", req["model"].as_str().unwrap())}))
            }),
        );
        let url = format!("{}/gen", serve(app).await);
        let provider = Provider::Proxy {
            url,
            auth_token: None,
        };
        let client = Client::new();

        let text = provider
            .complete(&client, "fast", "p", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "from fast");

        let err = provider
            .complete(&client, "slow", "p", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)), "{err:?}");
    }
}
