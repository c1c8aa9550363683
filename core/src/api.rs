/// REST client for the chat backend
///
/// Endpoints:
///   POST   /chat/conversations                  body: {"participantIds":[..],"isGroup":..,"groupName":..}
///   GET    /chat/conversations
///   GET    /chat/conversations/:id/messages     ?page=N&size=N  (newest-first)
///   POST   /chat/conversations/:id/read
///   DELETE /chat/conversations/:id
///   GET    /chat/conversations/:id/search       ?query=..
///   PUT    /chat/messages/:id                   body: plain text
///   DELETE /chat/messages/:id
///   POST   /chat/messages/:id/reactions         ?emoji=..
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, CreateConversationRequest, Message, MessagePage};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Backend operations used by the chat components
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn create_conversation(&self, request: &CreateConversationRequest) -> Result<Conversation>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    async fn get_messages(&self, conversation_id: i64, page: u32, size: u32) -> Result<MessagePage>;

    async fn mark_read(&self, conversation_id: i64) -> Result<()>;

    async fn edit_message(&self, message_id: i64, content: &str) -> Result<Message>;

    async fn delete_message(&self, message_id: i64) -> Result<()>;

    /// Toggle the caller's reaction server-side
    async fn toggle_reaction(&self, message_id: i64, emoji: &str) -> Result<()>;

    async fn search_messages(&self, conversation_id: i64, query: &str) -> Result<Vec<Message>>;

    /// Hide the conversation for the caller only
    async fn delete_conversation(&self, conversation_id: i64) -> Result<()>;
}

/// `ChatApi` over HTTP with a bearer credential
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        Err(ChatError::from_status(status.as_u16(), message))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn create_conversation(&self, request: &CreateConversationRequest) -> Result<Conversation> {
        self.json(self.client.post(self.url("/chat/conversations")).json(request))
            .await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.json(self.client.get(self.url("/chat/conversations"))).await
    }

    async fn get_messages(&self, conversation_id: i64, page: u32, size: u32) -> Result<MessagePage> {
        let url = self.url(&format!("/chat/conversations/{}/messages", conversation_id));
        self.json(self.client.get(url).query(&[("page", page), ("size", size)]))
            .await
    }

    async fn mark_read(&self, conversation_id: i64) -> Result<()> {
        let url = self.url(&format!("/chat/conversations/{}/read", conversation_id));
        self.execute(self.client.post(url)).await?;
        Ok(())
    }

    async fn edit_message(&self, message_id: i64, content: &str) -> Result<Message> {
        let url = self.url(&format!("/chat/messages/{}", message_id));
        self.json(
            self.client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(content.to_string()),
        )
        .await
    }

    async fn delete_message(&self, message_id: i64) -> Result<()> {
        let url = self.url(&format!("/chat/messages/{}", message_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn toggle_reaction(&self, message_id: i64, emoji: &str) -> Result<()> {
        let url = self.url(&format!("/chat/messages/{}/reactions", message_id));
        self.execute(self.client.post(url).query(&[("emoji", emoji)]))
            .await?;
        Ok(())
    }

    async fn search_messages(&self, conversation_id: i64, query: &str) -> Result<Vec<Message>> {
        let url = self.url(&format!("/chat/conversations/{}/search", conversation_id));
        self.json(self.client.get(url).query(&[("query", query)])).await
    }

    async fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        let url = self.url(&format!("/chat/conversations/{}", conversation_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}
