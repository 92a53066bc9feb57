#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use reqwest::StatusCode;
use serde_json::{json, Value};

use annotater_api::auth::{Argon2Hasher, TokenService};
use annotater_api::config::AppConfig;
use annotater_api::database::models::{Document, Role};
use annotater_api::detection::{DetectionError, DetectionModel, RawCandidate};
use annotater_api::storage::{ContentHandle, ContentStorage, MemoryStorage, StorageError};
use annotater_api::{router, AppState, Components};

pub const ADMIN_HANDLE: &str = "root";
pub const ADMIN_PASSWORD: &str = "root-password";

/// Detection model whose answer is set by the test.
#[derive(Default)]
pub struct StubDetector {
    outcome: Mutex<Option<Result<Vec<RawCandidate>, String>>>,
}

impl StubDetector {
    pub fn returns(&self, candidates: Vec<RawCandidate>) {
        *self.outcome.lock().unwrap() = Some(Ok(candidates));
    }

    pub fn fails(&self, reason: &str) {
        *self.outcome.lock().unwrap() = Some(Err(reason.to_string()));
    }
}

#[async_trait]
impl DetectionModel for StubDetector {
    async fn detect(&self, _: &Document, _: &[u8]) -> Result<Vec<RawCandidate>, DetectionError> {
        match self.outcome.lock().unwrap().clone() {
            Some(Ok(candidates)) => Ok(candidates),
            Some(Err(reason)) => Err(DetectionError::ModelUnavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// Storage that refuses every write.
#[derive(Default)]
pub struct FailingStorage;

#[async_trait]
impl ContentStorage for FailingStorage {
    async fn put(&self, _: &[u8]) -> Result<ContentHandle, StorageError> {
        Err(StorageError::Unavailable("injected write failure".to_string()))
    }

    async fn get(&self, handle: &ContentHandle) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::NotFound(handle.clone()))
    }

    async fn delete(&self, _: &ContentHandle) -> Result<(), StorageError> {
        Ok(())
    }
}

pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub config: AppConfig,
    pub tokens: TokenService,
    pub detector: Arc<StubDetector>,
    client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_report_store(Arc::new(MemoryStorage::new())).await
    }

    /// In-process server on an ephemeral port, in-memory repositories.
    pub async fn spawn_with_report_store(report_store: Arc<dyn ContentStorage>) -> Result<Self> {
        let config = AppConfig::default();
        let tokens = TokenService::new(&config.security.jwt_secret, chrono::Duration::hours(1))?;
        let detector = Arc::new(StubDetector::default());

        let components = Components::in_memory(
            Arc::new(MemoryStorage::new()),
            report_store,
            detector.clone(),
            Arc::new(Argon2Hasher::with_params(1024, 1, 1)?),
        );
        let state = AppState::assemble(components, tokens.clone(), &config);
        state.auth.ensure_admin(ADMIN_HANDLE, ADMIN_PASSWORD).await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let app = router(state.clone(), &config);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server crashed");
        });

        Ok(Self {
            base_url,
            state,
            config,
            tokens,
            detector,
            client: reqwest::Client::new(),
        })
    }

    /// The router itself, for `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn sign_up(&self, handle: &str, password: &str) -> Result<Value> {
        let res = self
            .client
            .post(self.url("/user/SignUp"))
            .json(&json!({ "handle": handle, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "sign up failed: {}", res.status());
        Ok(res.json::<Value>().await?["data"].clone())
    }

    pub async fn sign_in(&self, handle: &str, password: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/user/SignIn"))
            .json(&json!({ "handle": handle, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "sign in failed: {}", res.status());
        let body = res.json::<Value>().await?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("sign in response carried no token")
    }

    pub async fn admin_token(&self) -> Result<String> {
        self.sign_in(ADMIN_HANDLE, ADMIN_PASSWORD).await
    }

    /// Signs up `handle`, promotes it through the admin route, returns a fresh token.
    pub async fn user_with_role(&self, handle: &str, role: Role) -> Result<String> {
        let password = format!("{}-password", handle);
        let user = self.sign_up(handle, &password).await?;
        if role != Role::User {
            let res = self
                .client
                .post(self.url("/user/role"))
                .bearer_auth(self.admin_token().await?)
                .json(&json!({ "user_id": user["id"], "role": role }))
                .send()
                .await?;
            anyhow::ensure!(res.status() == StatusCode::NO_CONTENT, "role change failed: {}", res.status());
        }
        self.sign_in(handle, &password).await
    }

    pub async fn upload(&self, token: &str, name: &str, content: &[u8]) -> Result<Value> {
        let res = self
            .client
            .post(self.url(&format!("/document/upload?name={}", name)))
            .bearer_auth(token)
            .header("content-type", "application/pdf")
            .body(content.to_vec())
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "upload failed: {}", res.status());
        Ok(res.json::<Value>().await?["data"].clone())
    }

    pub async fn add_type(&self, token: &str, label: &str) -> Result<Value> {
        let res = self
            .client
            .post(self.url("/annotType/add"))
            .bearer_auth(token)
            .json(&json!({ "label": label, "description": format!("{} marker", label) }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "add type failed: {}", res.status());
        Ok(res.json::<Value>().await?["data"].clone())
    }
}

/// Two-page PDF-like payload.
pub fn two_page_pdf() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 2 >>\n2 0 obj << /Type /Page >>\n3 0 obj << /Type /Page >>\n%%EOF"
        .to_vec()
}
