use async_trait::async_trait;
use axum::body::{ to_bytes, Body };
use axum::http::{ header, Request, StatusCode };
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Arc;
use tower::ServiceExt;

use smartcare::agent::MedicalAgent;
use smartcare::auth::{ AuthService, PasswordHasher, SessionSigner, SqliteAccountStore };
use smartcare::config::prompt::PromptConfig;
use smartcare::db;
use smartcare::error::TRY_AGAIN;
use smartcare::history::SqliteHistoryStore;
use smartcare::llm::chat::{ ChatClient, CompletionResponse };
use smartcare::llm::embedding::{ EmbeddingClient, EmbeddingResponse };
use smartcare::rag::Retriever;
use smartcare::server::{ self, AppState };
use smartcare::vector::{ ChunkMetadata, ChunkRecord, MemoryIndex, Metric, VectorIndex };

const ANSWER: &str =
    "Asthma is a chronic disease that inflames and narrows the airways in your lungs. \
     Common symptoms are wheezing, coughing and shortness of breath.";

struct FixedEmbedder {
    available: bool,
}

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
        if !self.available {
            return Err("embedding service unavailable".into());
        }
        Ok(EmbeddingResponse { embedding: vec![1.0, 0.0] })
    }
}

struct CannedChat {
    reply: Result<&'static str, &'static str>,
}

#[async_trait]
impl ChatClient for CannedChat {
    async fn complete(&self, _prompt: &str) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        match self.reply {
            Ok(text) => Ok(CompletionResponse { response: text.to_string() }),
            Err(msg) => Err(msg.into()),
        }
    }

    fn model(&self) -> &str {
        "canned"
    }
}

struct TestApp {
    ttl_hours: u32,
    rate_limit: u32,
    reply: Result<&'static str, &'static str>,
    embedder_available: bool,
}

impl Default for TestApp {
    fn default() -> Self {
        Self { ttl_hours: 24, rate_limit: 100, reply: Ok(ANSWER), embedder_available: true }
    }
}

impl TestApp {
    async fn build(self) -> Router {
        let pool = db::connect_in_memory().await.unwrap();

        let index = Arc::new(MemoryIndex::new(Metric::Cosine));
        index
            .upsert("medlineplus", &[
                ChunkRecord {
                    id: "asthma-0".into(),
                    values: vec![1.0, 0.0],
                    metadata: ChunkMetadata {
                        source: "https://medlineplus.gov/asthma.html".into(),
                        title: "Asthma".into(),
                        source_name: "MedlinePlus".into(),
                        text: "Asthma is a chronic disease that affects your airways.".into(),
                    },
                },
            ]).await
            .unwrap();

        let retriever = Retriever::new(
            Arc::new(FixedEmbedder { available: self.embedder_available }),
            index,
            "medlineplus".into(),
            2,
            4,
            2
        );
        let prompts = PromptConfig::from_json(include_str!("../json/prompts.json")).unwrap();
        let agent = MedicalAgent::new(
            Arc::new(CannedChat { reply: self.reply }),
            retriever,
            Arc::new(prompts),
            Arc::new(SqliteHistoryStore::new(pool.clone()))
        );
        let auth = AuthService::new(
            Arc::new(SqliteAccountStore::new(pool)),
            PasswordHasher::new(1000),
            self.ttl_hours
        );
        let signer = SessionSigner::new("integration-test-secret").unwrap();
        let state = AppState::new(Arc::new(agent), auth, signer, self.rate_limit, false).unwrap();
        server::router(state)
    }
}

fn form_request(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

async fn register(app: &Router, username: &str, email: &str) -> Response {
    send(
        app,
        form_request(
            "/register",
            &[
                ("username", username),
                ("email", email),
                ("password", "correct horse"),
            ],
            None
        )
    ).await
}

/// Registers and logs in, returning the `Cookie` header value.
async fn signed_in(app: &Router, username: &str, email: &str) -> String {
    assert_eq!(register(app, username, email).await.status(), StatusCode::SEE_OTHER);
    let response = send(
        app,
        form_request("/login", &[("email", email), ("password", "correct horse")], None)
    ).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

async fn ask(app: &Router, cookie: &str, question: &str) -> Response {
    send(app, form_request("/get", &[("msg", question)], Some(cookie))).await
}

#[tokio::test]
async fn registration_redirects_and_duplicates_conflict() {
    let app = TestApp::default().build().await;

    let response = register(&app, "ana", "ana@example.com").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?notice=registered");

    let response = register(&app, "ana2", "ana@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("already exists"));

    let response = register(&app, "", "bob@example.com").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_page_shows_notice() {
    let app = TestApp::default().build().await;
    let response = send(&app, get_request("/login?notice=registered", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Registration successful! Please log in."));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::default().build().await;
    register(&app, "ana", "ana@example.com").await;
    let response = send(
        &app,
        form_request("/login", &[("email", "ana@example.com"), ("password", "nope")], None)
    ).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = TestApp::default().build().await;

    let response = send(&app, get_request("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = send(&app, form_request("/get", &[("msg", "hi")], None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].is_string());

    let cookie = signed_in(&app, "ana", "ana@example.com").await;
    let response = send(&app, get_request("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("ana"));
}

#[tokio::test]
async fn tampered_cookie_is_rejected() {
    let app = TestApp::default().build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let mut tampered = cookie.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let response = send(&app, get_request("/api/history", Some(&tampered))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = format!("smartcare_session={}", "a".repeat(64));
    let response = send(&app, get_request("/api/history", Some(&forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_reply_is_the_stored_turn() {
    let app = TestApp::default().build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let response = ask(&app, &cookie, "What is asthma?").await;
    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["response"], ANSWER);
    assert_eq!(reply["sources"][0]["name"], "MedlinePlus - Asthma");
    assert_eq!(reply["sources"][0]["url"], "https://medlineplus.gov/asthma.html");

    let history = body_json(send(&app, get_request("/api/history", Some(&cookie))).await).await;
    let turns = history.as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["id"], reply["id"]);
    assert_eq!(turns[0]["question"], "What is asthma?");
    assert_eq!(turns[0]["answer"], reply["response"]);
    assert_eq!(turns[0]["sources"], reply["sources"]);
    assert_eq!(turns[0]["timestamp"], reply["timestamp"]);

    let uri = format!("/get_sources/{}", reply["id"]);
    let sources = body_json(send(&app, get_request(&uri, Some(&cookie))).await).await;
    assert_eq!(sources["sources"], reply["sources"]);
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let app = TestApp::default().build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;
    let response = ask(&app, &cookie, "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_failure_asks_to_try_again_and_stores_nothing() {
    let app = (TestApp { reply: Err("model overloaded"), ..TestApp::default() }).build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let response = ask(&app, &cookie, "What is asthma?").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], TRY_AGAIN);

    let history = body_json(send(&app, get_request("/api/history", Some(&cookie))).await).await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn retrieval_failure_asks_to_try_again_and_stores_nothing() {
    let app = (TestApp { embedder_available: false, ..TestApp::default() }).build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let response = ask(&app, &cookie, "What is asthma?").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], TRY_AGAIN);

    let history = body_json(send(&app, get_request("/api/history", Some(&cookie))).await).await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn users_only_see_and_clear_their_own_history() {
    let app = TestApp::default().build().await;
    let ana = signed_in(&app, "ana", "ana@example.com").await;
    let bob = signed_in(&app, "bob", "bob@example.com").await;

    let ana_turn = body_json(ask(&app, &ana, "What is asthma?").await).await;
    ask(&app, &bob, "Is asthma contagious?").await;

    let uri = format!("/get_sources/{}", ana_turn["id"]);
    let sources = body_json(send(&app, get_request(&uri, Some(&bob))).await).await;
    assert_eq!(sources["sources"], serde_json::json!([]));

    let cleared = body_json(send(&app, form_request("/clear_history", &[], Some(&ana))).await).await;
    assert_eq!(cleared["success"], true);

    let ana_history = body_json(send(&app, get_request("/api/history", Some(&ana))).await).await;
    assert!(ana_history.as_array().unwrap().is_empty());
    let bob_history = body_json(send(&app, get_request("/api/history", Some(&bob))).await).await;
    assert_eq!(bob_history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn clear_chat_starts_a_new_conversation() {
    let app = TestApp::default().build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;
    ask(&app, &cookie, "What is asthma?").await;

    let page = body_text(send(&app, get_request("/", Some(&cookie))).await).await;
    assert!(page.contains("What is asthma?"));

    let response = body_json(send(&app, form_request("/clear_chat", &[], Some(&cookie))).await).await;
    assert_eq!(response["status"], "success");
    assert_eq!(response["message"], "Chat cleared");

    let page = body_text(send(&app, get_request("/", Some(&cookie))).await).await;
    assert!(!page.contains("What is asthma?"));
    let history = body_text(send(&app, get_request("/history", Some(&cookie))).await).await;
    assert!(history.contains("What is asthma?"));
}

#[tokio::test]
async fn logout_invalidates_the_cookie() {
    let app = TestApp::default().build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let response = send(&app, form_request("/logout", &[], Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?notice=logged_out");
    let cleared = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = send(&app, get_request("/api/history", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_session_is_rejected() {
    let app = (TestApp { ttl_hours: 0, ..TestApp::default() }).build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    let response = send(&app, get_request("/api/history", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(&app, get_request("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn chat_burst_is_rate_limited() {
    let app = (TestApp { rate_limit: 1, ..TestApp::default() }).build().await;
    let cookie = signed_in(&app, "ana", "ana@example.com").await;

    assert_eq!(ask(&app, &cookie, "What is asthma?").await.status(), StatusCode::OK);
    assert_eq!(ask(&app, &cookie, "What is asthma?").await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::default().build().await;
    let response = send(&app, get_request("/healthz", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}
