// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

use super::*;
use crate::identity::UserIdentity;
use crate::ocr::OcrDocument;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use tower::ServiceExt;

const RECEIPT_TEXT: &str = "Fresh Mart\n2024-03-09\nMilk 3.00\nBread 2.50\nTax 0.55\nTotal 6.05";

struct TextOcr;

#[async_trait]
impl OcrEngine for TextOcr {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn extract(&self, image: &[u8]) -> crate::Result<OcrDocument> {
        // the test "image" is the receipt text itself
        Ok(OcrDocument::from_text(&String::from_utf8_lossy(image)))
    }
}

struct Scripted;

#[async_trait]
impl InferenceEngine for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> crate::Result<String> {
        if prompt.contains("User question") {
            Ok("You spent 6.05 on groceries.".to_string())
        } else {
            Ok(r#"{"category": "groceries", "insight": "Breakfast staples."}"#.to_string())
        }
    }
}

struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorization_url(&self, state: &str) -> crate::Result<String> {
        Ok(format!("https://idp.test/auth?state={}", state))
    }

    async fn exchange(&self, code: &str) -> crate::Result<UserIdentity> {
        if code != "good-code" {
            return Err(RaseedError::AuthFailure("bad code".to_string()));
        }
        Ok(UserIdentity {
            subject: "user-1".to_string(),
            email: "user@example.com".to_string(),
            name: "Test User".to_string(),
            picture: None,
        })
    }
}

fn app() -> (Router, Database) {
    let db = Database::in_memory().unwrap();
    let state = AppState::new(
        AppConfig::default(),
        db.clone(),
        Arc::new(TextOcr),
        Arc::new(Scripted),
        Arc::new(FakeIdentity),
    )
    .unwrap();
    (create_router(Arc::new(state)), db)
}

fn cookie_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn location_of(response: &Response) -> String {
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_multipart(uri: &str, cookie: Option<&str>, field: &str, content: &str) -> Request<Body> {
    let boundary = "raseed-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"receipt.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n{content}\r\n--{b}--\r\n",
        b = boundary,
        field = field,
        content = content,
    );
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary));
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn dashboard_html(app: &Router, cookie: &str) -> String {
    let response = app.clone().oneshot(get("/dashboard", Some(cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run the OAuth round trip and return the signed-in session cookie
async fn sign_in(app: &Router) -> String {
    let start = app.clone().oneshot(get("/api/auth/google", None)).await.unwrap();
    assert!(start.status().is_redirection());
    let cookie = cookie_of(&start).unwrap();
    let location = url::Url::parse(&location_of(&start)).unwrap();
    let state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let callback = app
        .clone()
        .oneshot(get(
            &format!("/api/auth/google/callback?code=good-code&state={}", state),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(location_of(&callback), "/dashboard");
    cookie_of(&callback).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = app();
    let response = app.oneshot(get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["database"], "ok");
}

#[tokio::test]
async fn test_api_requires_session_and_pages_redirect() {
    let (app, _) = app();

    let api = app.clone().oneshot(get("/api/receipts", None)).await.unwrap();
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(api).await["success"], false);

    let page = app.oneshot(get("/dashboard", None)).await.unwrap();
    assert!(page.status().is_redirection());
    assert_eq!(location_of(&page), "/login");
}

#[tokio::test]
async fn test_login_page_renders() {
    let (app, _) = app();
    let response = app.oneshot(get("/login", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/api/auth/google"));
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let (app, _) = app();
    let start = app.clone().oneshot(get("/api/auth/google", None)).await.unwrap();
    let cookie = cookie_of(&start).unwrap();

    let callback = app
        .clone()
        .oneshot(get("/api/auth/google/callback?code=good-code&state=forged", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location_of(&callback), "/login?error=auth");

    let info = app.oneshot(get("/api/user-info", Some(&cookie))).await.unwrap();
    assert_eq!(info.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_list_and_stats() {
    let (app, db) = app();
    let cookie = sign_in(&app).await;

    let info = json_body(app.clone().oneshot(get("/api/user-info", Some(&cookie))).await.unwrap()).await;
    assert_eq!(info["user"]["email"], "user@example.com");

    let image = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(RECEIPT_TEXT));
    let processed = app
        .clone()
        .oneshot(post_json("/api/process-receipt", Some(&cookie), json!({ "imageData": image })))
        .await
        .unwrap();
    assert_eq!(processed.status(), StatusCode::OK);
    let body = json_body(processed).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["receipt"]["category"], "groceries");
    assert_eq!(body["analysis"]["status"], "categorized");
    let id = body["receipt"]["id"].as_str().unwrap().to_string();

    let listed = json_body(
        app.clone()
            .oneshot(get("/api/receipts?from=2024-03-01&to=2024-03-31", Some(&cookie)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(listed["receipts"].as_array().unwrap().len(), 1);

    let stats = json_body(app.clone().oneshot(get("/api/stats", Some(&cookie))).await.unwrap()).await;
    assert_eq!(stats["stats"]["total_receipts"], 1);
    assert_eq!(stats["stats"]["top_category"], "groceries");

    let answer = json_body(
        app.clone()
            .oneshot(post_json("/api/process-query", Some(&cookie), json!({ "query": "How much?" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(answer["response"], "You spent 6.05 on groceries.");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/receipts/{}", id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(delete).await.unwrap().status(), StatusCode::OK);
    assert_eq!(db.receipt_count().unwrap(), 0);

    let missing = app.oneshot(get(&format!("/api/receipts/{}", id), Some(&cookie))).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreadable_receipt_is_422_with_localized_message() {
    let (app, db) = app();
    let cookie = sign_in(&app).await;

    let language = app
        .clone()
        .oneshot(post_json("/api/update-language", Some(&cookie), json!({ "language": "te" })))
        .await
        .unwrap();
    assert_eq!(language.status(), StatusCode::OK);
    assert_eq!(db.preference("user-1").unwrap().locale, Locale::Telugu);

    let image = general_purpose::STANDARD.encode("Thank you for shopping");
    let response = app
        .oneshot(post_json("/api/process-receipt", Some(&cookie), json!({ "imageData": image })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], Locale::Telugu.texts().could_not_read);
}

#[tokio::test]
async fn test_upload_form_flashes_outcome_on_dashboard() {
    let (app, db) = app();
    let cookie = sign_in(&app).await;
    let texts = Locale::English.texts();

    let upload = app
        .clone()
        .oneshot(post_multipart("/upload", Some(&cookie), "receipt", RECEIPT_TEXT))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&upload), "/dashboard");
    assert_eq!(db.receipt_count().unwrap(), 1);

    let html = dashboard_html(&app, &cookie).await;
    assert!(html.contains(texts.receipt_processed));

    // the notice is shown once
    let html = dashboard_html(&app, &cookie).await;
    assert!(!html.contains(texts.receipt_processed));

    let unreadable = app
        .clone()
        .oneshot(post_multipart("/upload", Some(&cookie), "receipt", "Thank you for shopping"))
        .await
        .unwrap();
    assert_eq!(unreadable.status(), StatusCode::SEE_OTHER);
    assert!(dashboard_html(&app, &cookie).await.contains(texts.could_not_read));

    let missing = app
        .clone()
        .oneshot(post_multipart("/upload", Some(&cookie), "attachment", RECEIPT_TEXT))
        .await
        .unwrap();
    assert_eq!(location_of(&missing), "/dashboard");
    assert!(dashboard_html(&app, &cookie).await.contains(texts.could_not_read));
    assert_eq!(db.receipt_count().unwrap(), 1);
}

#[tokio::test]
async fn test_upload_form_requires_sign_in() {
    let (app, _) = app();
    let response = app
        .oneshot(post_multipart("/upload", None, "receipt", RECEIPT_TEXT))
        .await
        .unwrap();
    assert_eq!(location_of(&response), "/login");
}

#[tokio::test]
async fn test_unknown_language_is_bad_request() {
    let (app, _) = app();
    let response = app
        .oneshot(post_json("/api/update-language", None, json!({ "language": "fr" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_error_status_mapping() {
    assert_eq!(status_for(&RaseedError::ParseFailure(String::new())), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(status_for(&RaseedError::AnalysisUnavailable(String::new())), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_for(&RaseedError::StorageUnavailable(String::new())), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_for(&RaseedError::AuthFailure(String::new())), StatusCode::UNAUTHORIZED);
    assert_eq!(status_for(&RaseedError::Config(String::new())), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_decode_image_accepts_data_urls() {
    assert_eq!(decode_image("data:image/jpeg;base64,aGk=").unwrap(), b"hi");
    assert_eq!(decode_image("aGk=").unwrap(), b"hi");
    assert!(matches!(decode_image("***"), Err(RaseedError::InvalidInput(_))));
    assert!(matches!(decode_image(""), Err(RaseedError::InvalidInput(_))));
}
