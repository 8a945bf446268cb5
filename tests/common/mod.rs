// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use newsroom::{
    config::Config,
    models::approval::Role,
    routes,
    state::AppState,
    store::MemoryStore,
    utils::{files::LocalFileStore, jwt::sign_jwt},
};
use reqwest::{Response, multipart};
use serde_json::{Value, json};

const TEST_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub upload_dir: PathBuf,
}

/// Spawns the app on a random port, backed by a fresh in-memory store
/// and a temporary upload directory.
pub async fn spawn_app() -> TestApp {
    let upload_dir = std::env::temp_dir().join(format!("newsroom-test-{}", uuid::Uuid::new_v4()));

    let config = Config {
        database_url: None,
        jwt_secret: TEST_SECRET.to_string(),
        rust_log: "error".to_string(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        upload_dir: upload_dir.clone(),
        log_dir: std::env::temp_dir(),
    };

    let state = AppState {
        store: Arc::new(MemoryStore::new()),
        files: Arc::new(LocalFileStore::new(&upload_dir).expect("Failed to create upload dir")),
        config,
    };

    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        upload_dir,
    }
}

pub fn token(id: i64, role: Role) -> String {
    sign_jwt(id, role, TEST_SECRET, 600).expect("Failed to sign token")
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Value,
    ) -> Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates the profile for `id` with the token's role.
    pub async fn create_profile(&self, id: i64, role: Role, name: &str) -> Value {
        let response = self
            .send_json(
                reqwest::Method::POST,
                "/api/user-details",
                &token(id, role),
                json!({ "name": name, "email": format!("{}@example.com", id) }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        data(response).await
    }

    pub async fn create_post(&self, token: &str, title: &str) -> Response {
        let form = multipart::Form::new()
            .text("title", title.to_string())
            .text("content", "<p>Body</p><script>alert(1)</script>")
            .text("category", "politics")
            .text("tags", r#"["election", "city"]"#)
            .part(
                "featuredImage",
                multipart::Part::bytes(b"fake png".to_vec()).file_name("cover.png"),
            );

        self.client
            .post(self.url("/api/posts"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a post and returns its id.
    pub async fn post_id(&self, token: &str, title: &str) -> i64 {
        let response = self.create_post(token, title).await;
        assert_eq!(response.status().as_u16(), 201);
        data(response).await["id"].as_i64().unwrap()
    }
}

/// The `data` member of a success envelope.
pub async fn data(response: Response) -> Value {
    let body: Value = response.json().await.expect("Response was not JSON");
    assert_eq!(body["success"], true, "unexpected body: {body}");
    body["data"].clone()
}
