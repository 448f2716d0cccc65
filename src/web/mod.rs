// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI and JSON API for Raseed

pub mod auth;
pub mod templates;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDate, Utc};
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::{time::Duration as CookieDuration, SameSite};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info, warn};

use crate::assistant::Assistant;
use crate::categorizer::{Categorizer, InferenceEngine};
use crate::config::AppConfig;
use crate::db::{Database, ReceiptStore};
use crate::gemini::GeminiClient;
use crate::i18n::Locale;
use crate::identity::{self, GoogleIdentity, IdentityProvider};
use crate::model::{Receipt, UserAccount};
use crate::ocr::{OcrEngine, VisionClient};
use crate::pipeline::{failure_message, ProcessOutcome, ReceiptPipeline};
use crate::RaseedError;

use auth::{keys, CurrentUser, RequestContext, RequireUser};
use templates::{locale_options, Templates};

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub pipeline: ReceiptPipeline,
    pub assistant: Assistant,
    pub identity: Arc<dyn IdentityProvider>,
    pub templates: Templates,
}

impl AppState {
    /// Wire the state from explicit collaborators
    pub fn new(
        config: AppConfig,
        db: Database,
        ocr: Arc<dyn OcrEngine>,
        engine: Arc<dyn InferenceEngine>,
        identity: Arc<dyn IdentityProvider>,
    ) -> crate::Result<Self> {
        let categorizer = Categorizer::new(engine.clone(), &config.llm);
        let pipeline = ReceiptPipeline::new(ocr, categorizer, Arc::new(db.clone()), &config);
        let assistant = Assistant::new(engine, &config.llm);

        Ok(Self {
            db,
            pipeline,
            assistant,
            identity,
            templates: Templates::new()?,
            config,
        })
    }

    /// State backed by Google Vision, Gemini and Google sign-in
    pub fn from_config(config: AppConfig, db: Database) -> crate::Result<Self> {
        let ocr = Arc::new(VisionClient::new(&config.ocr)?);
        let engine = Arc::new(GeminiClient::new(&config.llm)?);
        let identity = Arc::new(GoogleIdentity::new(&config.identity)?);
        Self::new(config, db, ocr, engine, identity)
    }
}

/// Error response: `{"success": false, "error": ...}` with a status per error kind
pub struct ApiError {
    error: RaseedError,
    message: Option<&'static str>,
}

impl ApiError {
    /// Attach the user-facing text for a failed upload
    fn localized(error: RaseedError, locale: Locale) -> Self {
        let message = Some(failure_message(&error, locale));
        Self { error, message }
    }
}

impl From<RaseedError> for ApiError {
    fn from(error: RaseedError) -> Self {
        Self { error, message: None }
    }
}

pub fn status_for(error: &RaseedError) -> StatusCode {
    match error {
        RaseedError::ParseFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RaseedError::AnalysisUnavailable(_) | RaseedError::StorageUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RaseedError::OcrUnavailable(_) => StatusCode::BAD_GATEWAY,
        RaseedError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
        RaseedError::NotFound(_) => StatusCode::NOT_FOUND,
        RaseedError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if status.is_server_error() {
            error!("Request failed: {}", self.error);
        } else {
            warn!("Request rejected: {}", self.error);
        }

        let mut body = json!({ "success": false, "error": self.error.to_string() });
        if let Some(message) = self.message {
            body["message"] = json!(message);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn session_err(e: tower_sessions::session::Error) -> RaseedError {
    RaseedError::StorageUnavailable(format!("session store: {}", e))
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let secure = state.config.identity.redirect_uri.starts_with("https://");
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(CookieDuration::hours(24)));
    let body_limit = state.config.web.max_upload_bytes * 2;

    Router::new()
        // Pages
        .route("/", get(index_page))
        .route("/login", get(login_page))
        .route("/dashboard", get(dashboard_page))
        .route("/upload", post(upload_receipt))
        // Session
        .route("/api/auth/google", get(auth_google))
        .route("/api/auth/google/callback", get(auth_callback))
        .route("/api/logout", post(api_logout))
        .route("/api/user-info", get(api_user_info))
        .route("/api/update-language", post(api_update_language))
        // API endpoints
        .route("/api/health", get(api_health))
        .route("/api/process-receipt", post(api_process_receipt))
        .route("/api/receipts", get(api_list_receipts))
        .route("/api/receipts/:id", get(api_get_receipt).delete(api_delete_receipt))
        .route("/api/receipts/:id/recategorize", post(api_recategorize))
        .route("/api/stats", get(api_stats))
        .route("/api/process-query", post(api_process_query))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(sessions)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(ctx: RequestContext) -> Redirect {
    if ctx.user.is_some() {
        Redirect::to("/dashboard")
    } else {
        Redirect::to("/login")
    }
}

#[derive(Deserialize)]
struct LoginQuery {
    error: Option<String>,
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<LoginQuery>,
) -> ApiResult<Response> {
    if ctx.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let html = state.templates.render(
        "login.html",
        context! {
            t => ctx.locale.texts(),
            locale => ctx.locale.code(),
            locales => locale_options(),
            user => (),
            error => query.error.is_some(),
        },
    )?;
    Ok(Html(html).into_response())
}

async fn dashboard_page(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: RequestContext,
    session: Session,
) -> ApiResult<Html<String>> {
    let receipts = state.db.recent(&user.id, 50)?;
    let stats = state.db.stats(&user.id)?;
    let notice: Option<String> = session.remove(keys::NOTICE).await.map_err(session_err)?;

    let html = state.templates.render(
        "dashboard.html",
        context! {
            t => ctx.locale.texts(),
            locale => ctx.locale.code(),
            locales => locale_options(),
            user => &user,
            receipts => receipts,
            stats => stats,
            notice => notice,
        },
    )?;
    Ok(Html(html))
}

async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: RequestContext,
    session: Session,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RaseedError::InvalidInput(e.to_string()))?
    {
        if field.name() == Some("receipt") {
            let bytes = field.bytes().await.map_err(|e| RaseedError::InvalidInput(e.to_string()))?;
            image = Some(bytes);
            break;
        }
    }

    let notice = match image {
        Some(bytes) => match state.pipeline.process(&user.id, &bytes, ctx.locale).await {
            Ok(outcome) => outcome.message(ctx.locale),
            Err(e) => {
                warn!("Upload from {} failed: {}", user.id, e);
                failure_message(&e, ctx.locale)
            }
        },
        None => failure_message(&RaseedError::InvalidInput("no file".to_string()), ctx.locale),
    };

    session.insert(keys::NOTICE, notice).await.map_err(session_err)?;
    Ok(Redirect::to("/dashboard"))
}

// === Session Handlers ===

async fn auth_google(State(state): State<Arc<AppState>>, session: Session) -> ApiResult<Redirect> {
    let oauth_state = identity::new_state();
    session
        .insert(keys::OAUTH_STATE, &oauth_state)
        .await
        .map_err(session_err)?;
    let url = state.identity.authorization_url(&oauth_state)?;
    Ok(Redirect::to(&url))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn auth_callback(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    match complete_login(&state, ctx.locale, &session, query).await {
        Ok(user) => {
            info!("User {} signed in", user.email);
            Redirect::to("/dashboard")
        }
        Err(e) => {
            warn!("Sign-in failed: {}", e);
            Redirect::to("/login?error=auth")
        }
    }
}

async fn complete_login(
    state: &AppState,
    locale: Locale,
    session: &Session,
    query: CallbackQuery,
) -> crate::Result<CurrentUser> {
    let expected: Option<String> = session.remove(keys::OAUTH_STATE).await.map_err(session_err)?;

    if let Some(reason) = query.error {
        return Err(RaseedError::AuthFailure(format!("provider refused: {}", reason)));
    }
    match (expected, query.state) {
        (Some(expected), Some(given)) if expected == given => {}
        _ => return Err(RaseedError::AuthFailure("state mismatch".to_string())),
    }
    let code = query
        .code
        .ok_or_else(|| RaseedError::AuthFailure("missing authorization code".to_string()))?;

    let identity = state.identity.exchange(&code).await?;
    let account = state.db.upsert_user(&UserAccount {
        id: identity.subject.clone(),
        email: identity.email.clone(),
        name: identity.name.clone(),
        picture: identity.picture.clone(),
        locale,
        last_login: Utc::now(),
    })?;

    let user = CurrentUser::from(identity);
    session.cycle_id().await.map_err(session_err)?;
    session.insert(keys::USER, &user).await.map_err(session_err)?;
    session.insert(keys::LOCALE, account.locale).await.map_err(session_err)?;
    Ok(user)
}

async fn api_logout(session: Session) -> ApiResult<Json<Value>> {
    session.flush().await.map_err(session_err)?;
    Ok(Json(json!({ "success": true })))
}

async fn api_user_info(RequireUser(user): RequireUser, ctx: RequestContext) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": user,
        "language": ctx.locale,
        "languages": locale_options(),
    }))
}

#[derive(Deserialize)]
struct LanguageRequest {
    language: String,
}

async fn api_update_language(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    session: Session,
    Json(req): Json<LanguageRequest>,
) -> ApiResult<Json<Value>> {
    let locale: Locale = req.language.parse()?;
    session.insert(keys::LOCALE, locale).await.map_err(session_err)?;
    if let Some(user) = ctx.user {
        state.db.set_locale(&user.id, locale)?;
    }
    Ok(Json(json!({ "success": true, "language": locale })))
}

// === API Handlers ===

async fn api_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match state.db.receipt_count() {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let configured = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.is_empty());

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": database,
            "ocr": configured(&state.config.ocr.api_key),
            "llm": configured(&state.config.llm.api_key),
            "identity": configured(&state.config.identity.client_id),
        }
    }))
}

#[derive(Deserialize)]
struct ProcessRequest {
    #[serde(rename = "imageData")]
    image_data: String,
}

#[derive(Serialize)]
struct ProcessResponse {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    outcome: ProcessOutcome,
}

/// Decode base64 image data, with or without a `data:` URL prefix
fn decode_image(data: &str) -> crate::Result<Vec<u8>> {
    let encoded = match data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| RaseedError::InvalidInput(format!("image is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(RaseedError::InvalidInput("no image data".to_string()));
    }
    Ok(bytes)
}

async fn api_process_receipt(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: RequestContext,
    Json(req): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    let localized = |e| ApiError::localized(e, ctx.locale);
    let image = decode_image(&req.image_data).map_err(localized)?;
    let outcome = state
        .pipeline
        .process(&user.id, &image, ctx.locale)
        .await
        .map_err(localized)?;

    Ok(Json(ProcessResponse {
        success: true,
        message: outcome.message(ctx.locale),
        outcome,
    }))
}

#[derive(Deserialize)]
struct ReceiptsQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<usize>,
}

async fn api_list_receipts(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Query(query): Query<ReceiptsQuery>,
) -> ApiResult<Json<Value>> {
    let receipts = match (query.from, query.to) {
        (Some(from), Some(to)) if from <= to => state.db.range(&user.id, from, to)?,
        (Some(_), Some(_)) => {
            return Err(RaseedError::InvalidInput("'from' is after 'to'".to_string()).into())
        }
        (None, None) => state.db.recent(&user.id, query.limit.unwrap_or(50))?,
        _ => {
            return Err(RaseedError::InvalidInput("give both 'from' and 'to'".to_string()).into())
        }
    };
    Ok(Json(json!({ "success": true, "receipts": receipts })))
}

fn owned_receipt(state: &AppState, owner_id: &str, id: &str) -> crate::Result<Receipt> {
    state
        .db
        .get(id)?
        .filter(|r| r.owner_id == owner_id)
        .ok_or_else(|| RaseedError::NotFound(format!("receipt {}", id)))
}

async fn api_get_receipt(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let receipt = owned_receipt(&state, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "receipt": receipt })))
}

async fn api_delete_receipt(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_receipt(&state, &user.id, &id)?;
    state.db.delete(&id)?;
    info!("Deleted receipt {}", id);
    Ok(Json(json!({ "success": true })))
}

async fn api_recategorize(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let receipt = state.pipeline.recategorize(&user.id, &id, ctx.locale).await?;
    Ok(Json(json!({ "success": true, "receipt": receipt })))
}

async fn api_stats(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> ApiResult<Json<Value>> {
    let stats = state.db.stats(&user.id)?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

async fn api_process_query(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: RequestContext,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<Value>> {
    let receipts = state.db.recent(&user.id, state.config.llm.assistant_context)?;
    let answer = state.assistant.ask(&req.query, &receipts, ctx.locale).await?;
    Ok(Json(json!({ "success": true, "response": answer })))
}

/// Start the web server with config and database
pub async fn start_server(config: AppConfig, db: Database) -> crate::Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::from_config(config, db)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router).await
        .map_err(|e| RaseedError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests;
