#![allow(dead_code)]

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tempfile::TempDir;

use tasktrack_api::{app, config::AppConfig, AppState};

/// One in-process server with its own temp data directory.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub state: AppState,
    _data_dir: TempDir,
}

pub async fn spawn_app() -> Result<TestApp> {
    let data_dir = tempfile::tempdir().context("create temp data dir")?;

    let mut config = AppConfig::development();
    config.database.data_dir = data_dir.path().to_path_buf();
    config.security.jwt_secret = "integration-test-secret".to_string();

    let state = AppState::new(config);
    state.init().await.context("migrate shared database")?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind test listener")?;
    let addr = listener.local_addr()?;

    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });

    Ok(TestApp {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        state,
        _data_dir: data_dir,
    })
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_organization(&self, name: &str, subdomain: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/organizations"))
            .json(&json!({ "name": name, "subdomain": subdomain }))
            .send()
            .await
            .expect("create organization request")
    }

    pub async fn register_user(&self, email: &str, organization_id: i64) -> reqwest::Response {
        self.client
            .post(self.url("/api/users"))
            .json(&json!({
                "email_address": email,
                "password": "correct horse",
                "organization_id": organization_id,
            }))
            .send()
            .await
            .expect("register user request")
    }

    /// Signup + user + login in one go; returns (organization id, JWT).
    pub async fn org_with_user(&self, name: &str, subdomain: &str, email: &str) -> (i64, String) {
        let resp = self.create_organization(name, subdomain).await;
        assert_eq!(resp.status(), 201, "organization signup");
        let body: Value = resp.json().await.expect("organization body");
        let org_id = body["data"]["id"].as_i64().expect("organization id");

        let resp = self.register_user(email, org_id).await;
        assert_eq!(resp.status(), 201, "user registration");

        let token = self.login(email).await;
        (org_id, token)
    }

    pub async fn login(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email_address": email, "password": "correct horse" }))
            .send()
            .await
            .expect("login request");
        assert_eq!(resp.status(), 200, "login");
        let body: Value = resp.json().await.expect("login body");
        body["data"]["token"].as_str().expect("token").to_string()
    }

    /// Create a task, picking the tenant through the X-Organization header.
    pub async fn create_task(&self, token: &str, org: &str, name: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/tasks"))
            .bearer_auth(token)
            .header("X-Organization", org)
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("create task request")
    }

    pub async fn list_tasks(&self, token: &str, org: &str) -> Vec<Value> {
        let resp = self
            .client
            .get(self.url("/api/tasks"))
            .bearer_auth(token)
            .header("X-Organization", org)
            .send()
            .await
            .expect("list tasks request");
        assert_eq!(resp.status(), 200, "list tasks");
        let body: Value = resp.json().await.expect("task list body");
        body["data"].as_array().expect("task array").clone()
    }
}
