//! Remote task API client.
//!
//! Every call attaches the current session token, maps transport failures
//! to [`SyncError::Network`] and non-success statuses to
//! [`SyncError::Server`], and parses bodies into typed values before
//! returning them.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, Response, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use taskdeck_shared::{
    CreateTasksRequest, ErrorBody, StatusPatch, TaskDraft, TaskId, TaskItem, TaskStatus,
};
use tracing::{debug, instrument, warn};

use crate::config::ApiConfig;
use crate::error::{Operation, SyncError};

pub const NOT_SIGNED_IN: &str = "Not signed in";

const MAX_PLAIN_MESSAGE: usize = 200;

#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<TaskItem>, SyncError>;

    /// Submits the whole batch in one request. Returns the items the server
    /// echoed back, which may be none.
    async fn create(&self, drafts: &[TaskDraft]) -> Result<Vec<TaskItem>, SyncError>;

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), SyncError>;

    async fn delete_one(&self, id: TaskId) -> Result<(), SyncError>;

    async fn delete_all(&self) -> Result<(), SyncError>;
}

/// Shared bearer token. The sign-in side refreshes it; the gateway reads it
/// before each request.
#[derive(Clone, Default)]
pub struct SessionToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        let session = Self::default();
        session.refresh(token);
        session
    }

    pub fn refresh(&self, token: impl Into<String>) {
        let token = token.into();
        *self.inner.write() = (!token.trim().is_empty()).then_some(token);
    }

    pub fn sign_out(&self) {
        *self.inner.write() = None;
    }

    pub fn bearer(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpTaskGateway {
    client: Client,
    endpoint: String,
    token: SessionToken,
}

impl HttpTaskGateway {
    pub fn new(api: &ApiConfig, token: SessionToken) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed building HTTP client for the task API")?;

        Ok(Self {
            client,
            endpoint: api.endpoint(),
            token,
        })
    }

    fn item_url(&self, id: TaskId) -> String {
        format!("{}/{id}", self.endpoint)
    }

    fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, SyncError> {
        let token = self
            .token
            .bearer()
            .ok_or_else(|| SyncError::validation(NOT_SIGNED_IN))?;

        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json"))
    }

    /// Sends the request and hands back the response when its status is a
    /// success. The body of a success is left unread.
    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Response, SyncError> {
        let response = request
            .send()
            .await
            .map_err(|e| network_error(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!(%operation, error = %e, "failure body could not be read");
                String::new()
            });
            let message = extract_message(&body);
            warn!(
                %operation,
                status = status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "task API returned failure status"
            );
            return Err(SyncError::Server {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        debug!(%operation, status = status.as_u16(), "task API call succeeded");
        Ok(response)
    }
}

/// Reads a success body. A status line was received, so a broken body is a
/// server fault, not a network one.
async fn read_body(operation: Operation, response: Response) -> Result<(u16, String), SyncError> {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => Ok((status, body)),
        Err(e) => {
            warn!(%operation, status, error = %e, "task API body could not be read");
            Err(SyncError::Server {
                operation,
                status,
                message: Some(format!("unexpected response body: {e}")),
            })
        }
    }
}

#[async_trait]
impl TaskGateway for HttpTaskGateway {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<TaskItem>, SyncError> {
        let request = self.request(Method::GET, &self.endpoint)?;
        let response = self.send(Operation::FetchAll, request).await?;
        let (status, body) = read_body(Operation::FetchAll, response).await?;
        let items: Option<Vec<TaskItem>> = decode(Operation::FetchAll, status, &body)?;
        Ok(items.unwrap_or_default())
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    async fn create(&self, drafts: &[TaskDraft]) -> Result<Vec<TaskItem>, SyncError> {
        let payload = CreateTasksRequest {
            tasks: drafts.to_vec(),
        };
        let request = self.request(Method::POST, &self.endpoint)?.json(&payload);
        let response = self.send(Operation::Create, request).await?;
        // the batch is already accepted; an unreadable echo only costs the ids
        match read_body(Operation::Create, response).await {
            Ok((_, body)) => Ok(created_items(&body)),
            Err(_) => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), SyncError> {
        let request = self
            .request(Method::PATCH, &self.item_url(id))?
            .json(&StatusPatch { status });
        self.send(Operation::UpdateStatus, request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_one(&self, id: TaskId) -> Result<(), SyncError> {
        let request = self.request(Method::DELETE, &self.item_url(id))?;
        self.send(Operation::DeleteOne, request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> Result<(), SyncError> {
        let request = self.request(Method::DELETE, &self.endpoint)?;
        self.send(Operation::DeleteAll, request).await?;
        Ok(())
    }
}

/// Pulls a human-readable message out of a failure body: JSON `message`,
/// then JSON `error`, then a bare JSON string, then a short plain-text body.
pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(trimmed) {
        return parsed.text().map(str::to_string);
    }

    if let Ok(text) = serde_json::from_str::<String>(trimmed) {
        let text = text.trim();
        return (!text.is_empty()).then(|| text.to_string());
    }

    let looks_structured = trimmed.starts_with(['<', '{', '[']);
    if looks_structured || trimmed.chars().count() > MAX_PLAIN_MESSAGE {
        return None;
    }
    Some(trimmed.to_string())
}

fn decode<T: DeserializeOwned>(
    operation: Operation,
    status: u16,
    body: &str,
) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(%operation, error = %e, "task API body did not match the expected schema");
        SyncError::Server {
            operation,
            status,
            message: Some(format!("unexpected response body: {e}")),
        }
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedTasks {
    List(Vec<TaskItem>),
    Wrapped { tasks: Vec<TaskItem> },
    Single(TaskItem),
}

fn created_items(body: &str) -> Vec<TaskItem> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<CreatedTasks>(body) {
        Ok(CreatedTasks::List(items)) | Ok(CreatedTasks::Wrapped { tasks: items }) => items,
        Ok(CreatedTasks::Single(item)) => vec![item],
        Err(e) => {
            debug!(error = %e, "create response carries no task items");
            Vec::new()
        }
    }
}

fn network_error(operation: Operation, err: &reqwest::Error) -> SyncError {
    let detail = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    };
    warn!(%operation, %detail, "task API unreachable");
    SyncError::Network { operation, detail }
}
