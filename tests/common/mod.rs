#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use course_billing::config::{Config, StripeConfig};
use course_billing::gateway::{
    self, CheckoutSession, CheckoutSessionRequest, GatewayError, GatewayEvent, PaymentGateway,
};
use course_billing::model::{Course, Purchase, User};
use course_billing::store;
use course_billing::types::UserRole;
use course_billing::{build_router, run_migrations, AppState};
use diesel_async::SimpleAsyncConnection;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt; // for `oneshot`

pub const JWT_SECRET: &str = "test_jwt_secret";
pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// In-process gateway: hands out `sess_1`, `sess_2`, ... and verifies
/// signatures with the real scheme.
pub struct FakeGateway {
    counter: AtomicUsize,
    fail: bool,
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            id: format!("sess_{n}"),
            url: format!("https://checkout.test/pay/sess_{n}"),
        })
    }

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        gateway::verify_signature(
            payload,
            signature,
            WEBHOOK_SECRET,
            300,
            chrono::Utc::now().timestamp(),
        )?;
        gateway::parse_event(payload)
    }
}

// Helper struct to ensure test database cleanup
pub struct TestDbGuard {
    db_path: String,
}

impl TestDbGuard {
    pub fn new() -> Self {
        let db_path = std::env::temp_dir()
            .join(format!("test_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        run_migrations(&db_path).unwrap();

        Self { db_path }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.db_path, suffix));
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    _db: TestDbGuard,
}

pub fn test_config(database_url: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        client_url: "http://localhost:5173".to_string(),
        sentry_dsn: None,
        stripe: StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            currency: "inr".to_string(),
            webhook_tolerance_secs: 300,
            timeout_ms: 1_000,
        },
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(FakeGateway::new()).await
    }

    pub async fn with_gateway(gateway: FakeGateway) -> Self {
        let db = TestDbGuard::new();
        let pool = store::create_pool(db.db_path()).await.unwrap();
        let gateway = Arc::new(gateway);

        let state = AppState {
            pool,
            gateway: gateway.clone(),
            config: Arc::new(test_config(db.db_path())),
        };

        Self {
            router: build_router(state.clone()),
            state,
            gateway,
            _db: db,
        }
    }

    pub async fn seed_user(&self, name: &str, role: UserRole) -> User {
        let user = User::new(name.to_string(), format!("{name}@example.com"), role);
        let mut conn = self.state.get_db_connection().await.unwrap();
        store::insert_user(&mut conn, &user).await.unwrap();
        user
    }

    pub async fn seed_course(&self, creator: &User, title: &str, price: Option<i64>) -> Course {
        let course = Course::new(creator.id.clone(), title.to_string(), price);
        let mut conn = self.state.get_db_connection().await.unwrap();
        store::insert_course(&mut conn, &course).await.unwrap();
        course
    }

    pub async fn purchase(&self, purchase_id: &str) -> Purchase {
        let mut conn = self.state.get_db_connection().await.unwrap();
        store::find_purchase(&mut conn, purchase_id)
            .await
            .unwrap()
            .expect("purchase should exist")
    }

    pub async fn enrolled_course_ids(&self, user_id: &str) -> Vec<String> {
        let mut conn = self.state.get_db_connection().await.unwrap();
        store::enrolled_course_ids(&mut conn, user_id).await.unwrap()
    }

    pub async fn enrolled_student_ids(&self, course_id: &str) -> Vec<String> {
        let mut conn = self.state.get_db_connection().await.unwrap();
        store::enrolled_student_ids(&mut conn, course_id).await.unwrap()
    }

    /// Runs raw SQL against the test database, e.g. to break or prune it.
    pub async fn execute_sql(&self, sql: &str) {
        let mut conn = self.state.get_db_connection().await.unwrap();
        conn.batch_execute(sql).await.unwrap();
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, String) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body_bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body_bytes.to_vec()).unwrap())
    }

    pub async fn send_json(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.send(req).await;
        let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Opens a checkout for `user` and returns the new purchase id.
    pub async fn checkout(&self, user: &User, course: &Course) -> String {
        let (status, body) = self
            .send_json(post_json(
                "/purchase/checkout",
                Some(user),
                serde_json::json!({ "courseId": course.id }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "checkout failed: {body}");
        body["data"]["purchaseId"].as_str().unwrap().to_string()
    }
}

pub fn token_for(user: &User) -> String {
    course_billing::auth::issue_token(&user.id, JWT_SECRET, chrono::Duration::days(7)).unwrap()
}

pub fn post_json(uri: &str, user: Option<&User>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get(uri: &str, user: &User) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("cookie", format!("token={}", token_for(user)))
        .body(Body::empty())
        .unwrap()
}

pub fn sign(payload: &[u8], secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn completed_event(session_id: &str, amount_total: Option<i64>) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4()),
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "amount_total": amount_total } }
    }))
    .unwrap()
}

pub fn webhook_request(payload: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/purchase/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload)).unwrap()
}

pub fn signed_webhook(payload: Vec<u8>) -> Request<Body> {
    let signature = sign(&payload, WEBHOOK_SECRET);
    webhook_request(payload, Some(signature))
}
