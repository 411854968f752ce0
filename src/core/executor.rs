use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::models::{ModelConfig, ModelsResponse};
use crate::api::{
    parse_error_detail, ChatRequest, ChatResponse, HealthResponse, SummaryResponse,
    TranscriptionResponse,
};
use crate::core::error::RequestError;
use crate::core::session::Attachment;
use crate::utils::url::construct_api_url;

/// The backend operations the client knows how to issue.
#[derive(Debug, Clone)]
pub enum BackendRequest {
    ListModels,
    Chat(ChatRequest),
    UploadAndChat {
        file: Attachment,
        message: String,
        model_id: String,
    },
    Transcribe {
        audio: Attachment,
    },
    Summarize {
        content: String,
        model_id: String,
    },
    Health,
}

impl BackendRequest {
    pub fn operation_name(&self) -> &'static str {
        match self {
            BackendRequest::ListModels => "models",
            BackendRequest::Chat(_) => "chat",
            BackendRequest::UploadAndChat { .. } => "upload",
            BackendRequest::Transcribe { .. } => "transcribe",
            BackendRequest::Summarize { .. } => "summarize",
            BackendRequest::Health => "health",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendPayload {
    Models(Vec<ModelConfig>),
    Reply(String),
    Transcription(String),
    Summary(String),
    Health(HealthResponse),
}

#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Issues one backend call. Implementations must resolve with
    /// [`RequestError::Cancelled`] promptly once `token` fires.
    async fn execute(
        &self,
        request: BackendRequest,
        token: CancellationToken,
    ) -> Result<BackendPayload, RequestError>;
}

#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: BackendRequest) -> Result<reqwest::RequestBuilder, RequestError> {
        let builder = match request {
            BackendRequest::ListModels => self.client.get(self.url("api/models")),
            BackendRequest::Health => self.client.get(self.url("health")),
            BackendRequest::Chat(body) => self.client.post(self.url("api/chat")).json(&body),
            BackendRequest::UploadAndChat {
                file,
                message,
                model_id,
            } => {
                let form = Form::new()
                    .part("file", file_part(file)?)
                    .text("message", message)
                    .text("model_id", model_id);
                self.client
                    .post(self.url("api/upload_and_chat"))
                    .multipart(form)
            }
            BackendRequest::Transcribe { audio } => {
                let form = Form::new().part("audio_file", file_part(audio)?);
                self.client.post(self.url("api/transcribe")).multipart(form)
            }
            BackendRequest::Summarize { content, model_id } => self
                .client
                .post(self.url("api/summarize"))
                .form(&[("content", content), ("model_id", model_id)]),
        };
        Ok(builder)
    }

    fn url(&self, endpoint: &str) -> String {
        construct_api_url(&self.base_url, endpoint)
    }

    async fn send(&self, request: BackendRequest) -> Result<BackendPayload, RequestError> {
        let operation = request.operation_name();
        let shape = ResponseShape::of(&request);
        let http_request = self.build(request)?;

        let response = http_request
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(RequestError::from_reqwest)?;
        debug!(operation, status = status.as_u16(), bytes = body.len(), "backend responded");

        if !status.is_success() {
            return Err(RequestError::ServerError {
                status: status.as_u16(),
                detail: parse_error_detail(&body),
            });
        }

        shape.decode(&body)
    }
}

fn file_part(file: Attachment) -> Result<Part, RequestError> {
    Part::bytes(file.bytes)
        .file_name(file.file_name)
        .mime_str(&file.media_type)
        .map_err(|e| RequestError::Validation(format!("Invalid media type: {e}")))
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, RequestError> {
    serde_json::from_str(body).map_err(|e| RequestError::MalformedResponse(e.to_string()))
}

/// Body shape expected from a successful response to each request.
#[derive(Debug, Clone, Copy)]
enum ResponseShape {
    Models,
    Reply,
    Transcription,
    Summary,
    Health,
}

impl ResponseShape {
    fn of(request: &BackendRequest) -> Self {
        match request {
            BackendRequest::ListModels => ResponseShape::Models,
            BackendRequest::Chat(_) | BackendRequest::UploadAndChat { .. } => ResponseShape::Reply,
            BackendRequest::Transcribe { .. } => ResponseShape::Transcription,
            BackendRequest::Summarize { .. } => ResponseShape::Summary,
            BackendRequest::Health => ResponseShape::Health,
        }
    }

    fn decode(self, body: &str) -> Result<BackendPayload, RequestError> {
        match self {
            ResponseShape::Models => {
                parse::<ModelsResponse>(body).map(|r| BackendPayload::Models(r.models))
            }
            ResponseShape::Reply => {
                parse::<ChatResponse>(body).map(|r| BackendPayload::Reply(r.response.content))
            }
            ResponseShape::Transcription => parse::<TranscriptionResponse>(body)
                .map(|r| BackendPayload::Transcription(r.transcription)),
            ResponseShape::Summary => {
                parse::<SummaryResponse>(body).map(|r| BackendPayload::Summary(r.summary))
            }
            ResponseShape::Health => parse::<HealthResponse>(body).map(BackendPayload::Health),
        }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        request: BackendRequest,
        token: CancellationToken,
    ) -> Result<BackendPayload, RequestError> {
        if token.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        tokio::select! {
            _ = token.cancelled() => Err(RequestError::Cancelled),
            result = self.send(request) => result,
        }
    }
}
