//! REST collaborator: the request/response half of the messaging backend.
//!
//! Every durable write goes through here. The socket only tells other
//! clients that something changed.

use std::future::Future;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use airops_shared::{
    Conversation, ConversationId, ConversationQuery, ConversationType, HandoverMetadata, Message,
    MessageType, UserId, UserSummary,
};

use crate::error::ApiError;
use crate::token::SessionTokenStore;

// ---------------------------------------------------------------------------
// Request and response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.pagination
            .as_ref()
            .map(|p| p.page < p.total_pages)
            .unwrap_or(false)
    }
}

/// Every backend response is wrapped as `{ "data": ..., "pagination"?: ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A message as composed locally, before the backend assigns it an id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub content: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HandoverMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachment_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub member_ids: Vec<UserId>,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The backend calls the sync core relies on.
pub trait MessagingApi: Send + Sync + 'static {
    fn list_conversations(
        &self,
        query: ConversationQuery,
    ) -> impl Future<Output = Result<Page<Conversation>, ApiError>> + Send;

    fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    /// Oldest first.
    fn list_messages(
        &self,
        id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<Page<Message>, ApiError>> + Send;

    fn send_message(
        &self,
        id: &ConversationId,
        draft: &NewMessage,
    ) -> impl Future<Output = Result<Message, ApiError>> + Send;

    fn mark_as_read(&self, id: &ConversationId) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn search_users(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<UserSummary>, ApiError>> + Send;

    fn create_direct(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    fn create_group(
        &self,
        draft: &NewGroup,
    ) -> impl Future<Output = Result<Conversation, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    tokens: SessionTokenStore,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, tokens: SessionTokenStore) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("airops-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.tokens.get().ok_or(ApiError::MissingToken)?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Envelope<T>, ApiError> {
        let response = check_status(request.send().await?).await?;
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    debug!(status = status.as_u16(), message = %message, "Backend returned an error");
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

impl MessagingApi for HttpApi {
    async fn list_conversations(&self, query: ConversationQuery) -> Result<Page<Conversation>, ApiError> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(kind) = query.kind {
            params.push(("type", kind.as_str().to_string()));
        }
        let request = self.request(Method::GET, "/conversations")?.query(&params);
        let envelope = self.call::<Vec<Conversation>>(request).await?;
        Ok(Page {
            items: envelope.data,
            pagination: envelope.pagination,
        })
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, ApiError> {
        let request = self.request(Method::GET, &format!("/conversations/{id}"))?;
        Ok(self.call::<Conversation>(request).await?.data)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<Page<Message>, ApiError> {
        let request = self
            .request(Method::GET, &format!("/conversations/{id}/messages"))?
            .query(&[("page", page), ("limit", limit)]);
        let envelope = self.call::<Vec<Message>>(request).await?;
        Ok(Page {
            items: envelope.data,
            pagination: envelope.pagination,
        })
    }

    async fn send_message(&self, id: &ConversationId, draft: &NewMessage) -> Result<Message, ApiError> {
        let request = self
            .request(Method::POST, &format!("/conversations/{id}/messages"))?
            .json(draft);
        Ok(self.call::<Message>(request).await?.data)
    }

    async fn mark_as_read(&self, id: &ConversationId) -> Result<(), ApiError> {
        let request = self.request(Method::POST, &format!("/conversations/{id}/read"))?;
        check_status(request.send().await?).await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError> {
        let request = self
            .request(Method::GET, "/users/search")?
            .query(&[("q", query)]);
        Ok(self.call::<Vec<UserSummary>>(request).await?.data)
    }

    async fn create_direct(&self, user: &UserId) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::POST, "/conversations/direct")?
            .json(&serde_json::json!({ "userId": user }));
        Ok(self.call::<Conversation>(request).await?.data)
    }

    async fn create_group(&self, draft: &NewGroup) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::POST, "/conversations/group")?
            .json(draft);
        Ok(self.call::<Conversation>(request).await?.data)
    }
}
