use std::{net::SocketAddr, time::Duration};

use anyhow::{anyhow, Context};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth,
    brief::{Brief, GeneratorFormData},
    catalog::{self, Category},
    clock::Countdown,
    conf::{self, ConfGemini},
    docs::ApiDoc,
    error::Error,
    export::ExportFormat,
    identity::Identity,
    jwt,
    provider::{self, ProviderError, ProxyReq, ProxyResp},
    service::BriefService,
    types::{TokenStatus, User},
};


pub const DEVICE_HEADER: &str = "x-device-id";

#[derive(serde::Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_token_exhausted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_reset: Option<Countdown>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            is_token_exhausted: None,
            time_until_reset: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError(StatusCode, Json<ErrorResponse>);

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown error");
        ApiError(status, Json(ErrorResponse::new(reason)))
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let (status, body) = match error {
            Error::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg))
            }
            Error::TokenExhausted {
                message,
                time_until_reset,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse {
                    error: message,
                    is_token_exhausted: Some(true),
                    time_until_reset: Some(time_until_reset),
                },
            ),
            Error::Provider(msg) => {
                (StatusCode::BAD_GATEWAY, ErrorResponse::new(msg))
            }
            e @ Error::NotFound(_) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(e.to_string()))
            }
            Error::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, ErrorResponse::new(msg))
            }
            Error::Internal(error) => {
                tracing::error!(?error, "Internal error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };
        ApiError(status, Json(body))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(status, body) = self;
        (status, body).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: BriefService,
    pub jwt: jwt::Keys,
    pub gemini: Option<ConfGemini>,
    pub proxy_timeout: Duration,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(service: BriefService, conf: &conf::Conf) -> Self {
        Self {
            service,
            jwt: jwt::Keys::new(&conf.jwt),
            gemini: conf.gemini.clone(),
            proxy_timeout: conf.generator.timeout(),
            client: reqwest::Client::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/functions/generate-brief", post(generate_proxy))
        .route("/tokens", get(tokens))
        .route("/me", get(me))
        .route("/briefs", post(create_brief))
        .route("/briefs/pregenerated", post(pregenerated_brief))
        .route("/briefs/history", get(history))
        .route("/briefs/:id", get(brief))
        .route("/briefs/:id/export/:format", get(export_brief))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_layer));
    Router::new()
        .route("/health", get(health_check))
        .route("/catalog", get(catalog_handler))
        .merge(protected)
        .route_layer(middleware::from_fn(|req: Request, next: Next| {
            REQ_ID.scope(ReqId::new(), next.run(req))
        }))
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .with_state(state)
}

fn cors(conf: &conf::Conf) -> anyhow::Result<CorsLayer> {
    let origins = [
        "http://localhost:3000".to_string(),
        "https://localhost:3000".to_string(),
        format!("http://{}:{}", conf.addr, conf.port),
        format!("https://{}:{}", conf.addr, conf.port),
    ]
    .iter()
    .map(|o| HeaderValue::from_str(o))
    .collect::<Result<Vec<_>, _>>()
    .context("Invalid CORS origin")?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            header::HeaderName::from_static(DEVICE_HEADER),
        ])
        .allow_credentials(true)
        .expose_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::CONTENT_DISPOSITION,
        ]))
}

#[tracing::instrument(name = "server", skip_all)]
pub async fn run() -> anyhow::Result<()> {
    let conf = conf::global();
    let dir = std::env::current_dir()?;
    tracing::info!(?dir, ?conf, "Starting.");
    let addr = SocketAddr::from((conf.addr, conf.port));

    let service = BriefService::from_conf(&conf).await?;
    let state = AppState::new(service, &conf);
    let app = router(state).layer(cors(&conf)?);

    match &conf.tls {
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::warn!(?addr, "Listening unencrypted.");
            axum::serve(listener, app).await?;
        }
        Some(conf::Tls {
            cert_file,
            key_file,
        }) => {
            // XXX One MUST do this manual init of rustls provider when using
            //     more than a single dep which itself depends on rustls.
            //     Here we using 2:
            //     - axum_server
            //     - reqwest
            rustls::crypto::aws_lc_rs::default_provider()
                .install_default()
                .map_err(|crypto_provider| {
                    anyhow!(
                        "Failed to install default crypto provider: \
                        {crypto_provider:?}"
                    )
                })?;

            let config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_file, key_file,
                )
                .await
                .context(format!(
                    "Failed to construct RustlsConfig. \
                    cert_file={cert_file:?}, key_file={key_file:?}"
                ))?;

            tracing::info!(
                ?addr,
                ?cert_file,
                ?key_file,
                "Listening with TLS."
            );
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health_check() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/catalog",
    responses(
        (status = 200, description = "Categories with their options", body = Vec<Category>)
    )
)]
pub async fn catalog_handler() -> Json<Vec<Category>> {
    Json(catalog::categories())
}

/// Forwards a prompt to Gemini with the server's key. Answers with the
/// `{text}` / `{error}` shape the generator's proxy provider expects.
#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    post,
    path = "/functions/generate-brief",
    request_body = ProxyReq,
    responses(
        (status = 200, description = "Generated text", body = ProxyResp),
        (status = 400, description = "Missing prompt", body = ProxyResp),
        (status = 401, description = "No identity"),
        (status = 408, description = "Upstream timed out", body = ProxyResp),
        (status = 500, description = "Upstream failure or missing key", body = ProxyResp),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn generate_proxy(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<ProxyResp>) {
    let fail = |status: StatusCode, error: String| {
        (
            status,
            Json(ProxyResp {
                text: None,
                error: Some(error),
            }),
        )
    };
    let req = serde_json::from_slice::<ProxyReq>(&body)
        .ok()
        .filter(|r| !r.prompt.trim().is_empty());
    let Some(ProxyReq { prompt, model }) = req else {
        return fail(StatusCode::BAD_REQUEST, "Prompt is required".to_string());
    };
    let Some(gemini) = state.gemini.as_ref().filter(|g| !g.api_key.is_empty())
    else {
        tracing::error!("Gemini API key not configured.");
        return fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error".to_string(),
        );
    };
    let model = model.unwrap_or_else(|| provider::DEFAULT_PROXY_MODEL.to_string());
    tracing::info!(%model, "Generating.");
    match provider::complete_via_gemini(
        &state.client,
        &gemini.base_url,
        &gemini.api_key,
        &model,
        &prompt,
        state.proxy_timeout,
    )
    .await
    {
        Ok(text) => (
            StatusCode::OK,
            Json(ProxyResp {
                text: Some(text),
                error: None,
            }),
        ),
        Err(ProviderError::Timeout(_)) => fail(
            StatusCode::REQUEST_TIMEOUT,
            "Request timeout - please try again".to_string(),
        ),
        Err(error) => {
            tracing::error!(%error, "Proxy generation failed.");
            fail(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    get,
    path = "/tokens",
    responses(
        (status = 200, description = "Today's balance", body = TokenStatus),
        (status = 401, description = "No identity"),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn tokens(State(state): State<AppState>) -> Json<TokenStatus> {
    Json(state.service.token_status(&IDENTITY.get()).await)
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile with today's tokens", body = User),
        (status = 401, description = "No identity"),
        (status = 403, description = "Not signed in", body = ErrorResponse),
    ),
    security(("jwt" = []))
)]
pub async fn me(State(state): State<AppState>) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service.profile(&IDENTITY.get()).await?))
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    post,
    path = "/briefs",
    request_body = GeneratorFormData,
    responses(
        (status = 200, description = "Generated brief", body = Brief),
        (status = 400, description = "Invalid form or unparseable answer", body = ErrorResponse),
        (status = 401, description = "No identity"),
        (status = 429, description = "Tokens exhausted", body = ErrorResponse),
        (status = 502, description = "Every model failed", body = ErrorResponse),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn create_brief(
    State(state): State<AppState>,
    Json(form): Json<GeneratorFormData>,
) -> Result<Json<Brief>, ApiError> {
    let brief = state.service.generate(&IDENTITY.get(), form).await?;
    Ok(Json(brief))
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    post,
    path = "/briefs/pregenerated",
    request_body = GeneratorFormData,
    responses(
        (status = 200, description = "A stored public brief", body = Brief),
        (status = 400, description = "Invalid form", body = ErrorResponse),
        (status = 401, description = "No identity"),
        (status = 404, description = "Nothing matches", body = ErrorResponse),
        (status = 429, description = "Tokens exhausted", body = ErrorResponse),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn pregenerated_brief(
    State(state): State<AppState>,
    Json(form): Json<GeneratorFormData>,
) -> Result<Json<Brief>, ApiError> {
    let brief = state.service.pregenerated(&IDENTITY.get(), form).await?;
    Ok(Json(brief))
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    get,
    path = "/briefs/history",
    params(
        ("limit" = Option<u32>, Query, description = "Page size"),
        ("offset" = Option<u32>, Query, description = "Briefs to skip"),
    ),
    responses(
        (status = 200, description = "Newest first", body = Vec<Brief>),
        (status = 401, description = "No identity"),
        (status = 403, description = "Devices have no history", body = ErrorResponse),
    ),
    security(("jwt" = []))
)]
pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<Brief>>, ApiError> {
    let briefs = state
        .service
        .history(&IDENTITY.get(), q.limit, q.offset.unwrap_or(0))
        .await?;
    Ok(Json(briefs))
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    get,
    path = "/briefs/{id}",
    params(("id" = String, Path, description = "Brief id")),
    responses(
        (status = 200, description = "The brief", body = Brief),
        (status = 401, description = "No identity"),
        (status = 404, description = "No such brief", body = ErrorResponse),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn brief(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Brief>, ApiError> {
    Ok(Json(state.service.get(&id).await?))
}

#[tracing::instrument(
    skip_all,
    fields(req_id = %REQ_ID.get().req_id, identity = %IDENTITY.get())
)]
#[utoipa::path(
    get,
    path = "/briefs/{id}/export/{format}",
    params(
        ("id" = String, Path, description = "Brief id"),
        ("format" = String, Path, description = "txt, md, png or pdf"),
    ),
    responses(
        (status = 200, description = "File download"),
        (status = 400, description = "Unknown format", body = ErrorResponse),
        (status = 401, description = "No identity"),
        (status = 404, description = "No such brief", body = ErrorResponse),
    ),
    security(("jwt" = []), ("device" = []))
)]
pub async fn export_brief(
    State(state): State<AppState>,
    Path((id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format
        .parse()
        .map_err(|e: anyhow::Error| Error::validation(e.to_string()))?;
    let brief = state.service.get(&id).await?;
    let file_name = format.file_name(&brief);
    let bytes = tokio::task::spawn_blocking(move || format.render(&brief))
        .await
        .map_err(|e| Error::Internal(e.into()))?
        .map_err(Error::Internal)?;
    tracing::info!(%file_name, size = bytes.len(), "Exported.");
    let disposition = format!("attachment; filename=\"{file_name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

#[derive(Debug, Clone)]
struct ReqId {
    pub req_id: String,
}

impl ReqId {
    fn new() -> Self {
        let req_id = cuid2::create_id();
        Self { req_id }
    }
}

tokio::task_local! {
    pub static IDENTITY: Identity;
    static REQ_ID: ReqId;
}

/// Bearer JWT makes a user; otherwise `X-Device-Id` makes a device. A
/// bearer token that fails to verify is rejected, never downgraded.
async fn auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = req.headers();
    let identity = match headers.get(header::AUTHORIZATION) {
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    tracing::warn!("Malformed Authorization header.");
                    StatusCode::UNAUTHORIZED
                })?;
            authorize(token, &state.jwt).ok_or(StatusCode::UNAUTHORIZED)?
        }
        None => {
            let device = headers
                .get(DEVICE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    tracing::warn!("Neither Authorization nor device id.");
                    StatusCode::UNAUTHORIZED
                })?;
            Identity::Device(device.to_string())
        }
    };
    tracing::debug!(%identity, "Identified.");
    Ok(IDENTITY.scope(identity, next.run(req)).await)
}

fn authorize(token: &str, keys: &jwt::Keys) -> Option<Identity> {
    auth::Claims::from_str(token, keys)
        .inspect_err(|error| {
            tracing::warn!(
                ?error,
                token_prefix = ?token.get(..10).unwrap_or(""),
                "JWT validation failed"
            );
        })
        .ok()
        .map(|claims| {
            tracing::debug!(sub = %claims.sub, role = ?claims.role, "JWT ok.");
            claims.identity()
        })
}
