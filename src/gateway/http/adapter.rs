use async_trait::async_trait;
use futures::stream;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use url::Url;

use super::models::*;
use super::stream::forward_sse_stream;
use crate::gateway::traits::ChatGateway;
use crate::gateway::types::{
    ConversationDetail, CreateConversationRequest, GatewayError, PushStream, SendMessageRequest,
};
use crate::models::{Conversation, Message};

const PUSH_BUFFER: usize = 64;

/// REST backend: `{base}/chat/conversations[/{id}[/messages]]`, push events on `{base}/chat/events`.
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Request(format!("Base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<WireErrorBody>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    async fn check_status(response: Response, what: &str) -> Result<Response, GatewayError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Request(Self::parse_error_message(
                status, &body,
            )));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    fn network_error(e: reqwest::Error) -> GatewayError {
        GatewayError::Request(e.to_string())
    }
}

#[async_trait]
impl ChatGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, GatewayError> {
        let url = self.endpoint(&["chat", "conversations"])?;
        let body = CreateConversationRequest {
            title: title.map(str::to_string),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;
        let response = Self::check_status(response, "conversations endpoint").await?;
        let envelope: Envelope<WireConversation> = Self::decode(response).await?;
        tracing::debug!("Create conversation response: {:?}", envelope);

        envelope.into_inner().into_conversation().ok_or_else(|| {
            GatewayError::InvalidResponse("Created conversation has no id".to_string())
        })
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        let url = self.endpoint(&["chat", "conversations"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;
        let response = Self::check_status(response, "conversations endpoint").await?;
        let list: WireConversationList = Self::decode(response).await?;
        Ok(list.into_conversations())
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationDetail, GatewayError> {
        let url = self.endpoint(&["chat", "conversations", id])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;
        let response =
            Self::check_status(response, &format!("Conversation {} not found", id)).await?;
        let envelope: Envelope<WireConversationDetail> = Self::decode(response).await?;
        Ok(envelope.into_inner().into_detail(id))
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, GatewayError> {
        let url = self.endpoint(&["chat", "conversations", conversation_id, "messages"])?;
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;
        let response = Self::check_status(
            response,
            &format!("Conversation {} not found", conversation_id),
        )
        .await?;
        let envelope: Envelope<WireMessage> = Self::decode(response).await?;
        envelope.into_inner().into_message(Some(conversation_id))
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), GatewayError> {
        let url = self.endpoint(&["chat", "conversations", id])?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::check_status(response, &format!("Conversation {} not found", id)).await?;
        Ok(())
    }

    /// Opens the event stream in a background task; must be called inside a tokio runtime.
    fn subscribe(&self) -> PushStream {
        let url = match self.endpoint(&["chat", "events"]) {
            Ok(url) => url,
            Err(e) => return Box::pin(stream::once(async move { Err(e) })),
        };
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel(PUSH_BUFFER);

        tokio::spawn(async move {
            let response = client
                .get(url)
                .header("accept", "text/event-stream")
                .send()
                .await;
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(GatewayError::Channel(e.to_string()))).await;
                    return;
                }
            };
            match Self::check_status(response, "event stream").await {
                Ok(response) => forward_sse_stream(response, tx).await,
                Err(e) => {
                    let _ = tx.send(Err(GatewayError::Channel(e.to_string()))).await;
                }
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}
