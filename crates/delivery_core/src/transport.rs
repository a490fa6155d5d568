use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use shared::{
    domain::{ConversationId, CorrelationId},
    error::ApiError,
    protocol::{Page, ServerMessage, SubmitMessageRequest, UploadFile},
};
use tracing::debug;

use crate::{error::TransportError, lifecycle::OutgoingFile};

/// Where a submission goes and the id that links it back to its optimistic
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTarget {
    pub conversation_id: ConversationId,
    pub correlation_id: CorrelationId,
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn submit_message(
        &self,
        target: &SubmitTarget,
        content: &str,
        files: &[OutgoingFile],
    ) -> Result<ServerMessage, TransportError>;

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ServerMessage>, TransportError>;
}

pub struct MissingTransport;

#[async_trait]
impl MessageTransport for MissingTransport {
    async fn submit_message(
        &self,
        _target: &SubmitTarget,
        _content: &str,
        _files: &[OutgoingFile],
    ) -> Result<ServerMessage, TransportError> {
        Err(TransportError::Connection(
            "message transport is unavailable".to_string(),
        ))
    }

    async fn fetch_messages(
        &self,
        _conversation_id: &ConversationId,
        _page: u32,
        _page_size: u32,
    ) -> Result<Page<ServerMessage>, TransportError> {
        Err(TransportError::Connection(
            "message transport is unavailable".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct ListMessagesQuery {
    page: u32,
    page_size: u32,
}

/// JSON-over-HTTP adapter for the message service.
pub struct HttpTransport {
    http: Client,
    server_url: String,
}

impl HttpTransport {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, conversation_id: &ConversationId) -> String {
        format!(
            "{}/conversations/{}/messages",
            self.server_url, conversation_id
        )
    }
}

fn upload_file(file: &OutgoingFile) -> UploadFile {
    UploadFile {
        filename: file.filename.clone(),
        mime_type: file.mime_type.clone(),
        kind: file.kind,
        data_b64: STANDARD.encode(&file.bytes),
    }
}

fn connection_error(err: reqwest::Error) -> TransportError {
    TransportError::Connection(err.to_string())
}

/// 4xx bodies carry an [`ApiError`] when the service produced them; anything
/// else is reported as a transport failure.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.is_client_error() {
        let message = response
            .json::<ApiError>()
            .await
            .ok()
            .map(|body| body.message)
            .filter(|message| !message.trim().is_empty());
        return Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    Err(TransportError::Connection(format!(
        "server responded with {}",
        status_label(status)
    )))
}

fn status_label(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn submit_message(
        &self,
        target: &SubmitTarget,
        content: &str,
        files: &[OutgoingFile],
    ) -> Result<ServerMessage, TransportError> {
        let body = SubmitMessageRequest {
            temp_correlation_id: target.correlation_id.clone(),
            content: content.to_string(),
            files: files.iter().map(upload_file).collect(),
        };
        debug!(
            conversation_id = %target.conversation_id,
            correlation_id = %target.correlation_id,
            "http: submitting message"
        );
        let response = self
            .http
            .post(self.messages_url(&target.conversation_id))
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response)
            .await?
            .json::<ServerMessage>()
            .await
            .map_err(connection_error)
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ServerMessage>, TransportError> {
        let response = self
            .http
            .get(self.messages_url(conversation_id))
            .query(&ListMessagesQuery { page, page_size })
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response)
            .await?
            .json::<Page<ServerMessage>>()
            .await
            .map_err(connection_error)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
