use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, Url, header};
use snafu::{ResultExt, ensure};

use crate::service::{
    BoxFuture, BuildClientSnafu, ChatConfig, ChatRequest, ChatResponse, ChatService,
    ConfigStatusSnafu, DecodeConfigSnafu, ReadBodySnafu, TransportError, TransportResult,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoints and limits for [`HttpChatService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub chat_endpoint: String,
    pub config_endpoint: String,
    pub request_timeout: Duration,
}

impl ServiceConfig {
    /// Creates a config with trimmed endpoints and the default request timeout.
    pub fn new(chat_endpoint: impl Into<String>, config_endpoint: impl Into<String>) -> Self {
        Self {
            chat_endpoint: chat_endpoint.into().trim().to_string(),
            config_endpoint: config_endpoint.into().trim().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the timeout applied to the config fetch and to connecting.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// `ChatService` backed by a shared reqwest client.
pub struct HttpChatService {
    client: Client,
    chat_endpoint: Url,
    config_endpoint: Url,
    request_timeout: Duration,
}

impl HttpChatService {
    /// Validates both endpoints and builds the shared client.
    pub fn new(config: ServiceConfig) -> TransportResult<Self> {
        let chat_endpoint = parse_endpoint(&config.chat_endpoint, "parse-chat-endpoint")?;
        let config_endpoint = parse_endpoint(&config.config_endpoint, "parse-config-endpoint")?;

        // Only connecting is bounded; an event stream may stay open for the whole reply.
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self {
            client,
            chat_endpoint,
            config_endpoint,
            request_timeout: config.request_timeout,
        })
    }

    pub fn chat_endpoint(&self) -> &Url {
        &self.chat_endpoint
    }

    pub fn config_endpoint(&self) -> &Url {
        &self.config_endpoint
    }

    async fn post_chat(&self, request: &ChatRequest) -> TransportResult<ChatResponse> {
        tracing::debug!(
            endpoint = %self.chat_endpoint,
            history_len = request.history.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(self.chat_endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| classify_send_error(source, &self.chat_endpoint, "send-chat"))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        tracing::debug!(
            status,
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "chat service responded"
        );

        let body = response.bytes_stream().map(|chunk| {
            chunk.map(|bytes| bytes.to_vec()).context(ReadBodySnafu {
                stage: "read-chat-body",
            })
        });

        Ok(ChatResponse::new(status, content_type, Box::pin(body)))
    }

    async fn get_config(&self) -> TransportResult<ChatConfig> {
        let response = self
            .client
            .get(self.config_endpoint.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|source| {
                classify_send_error(source, &self.config_endpoint, "send-config")
            })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            ConfigStatusSnafu {
                stage: "config-http-status",
                status: status.as_u16(),
            }
        );

        response.json::<ChatConfig>().await.context(DecodeConfigSnafu {
            stage: "decode-config-json",
        })
    }
}

impl ChatService for HttpChatService {
    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, TransportResult<ChatResponse>> {
        Box::pin(self.post_chat(request))
    }

    fn fetch_config<'a>(&'a self) -> BoxFuture<'a, TransportResult<ChatConfig>> {
        Box::pin(self.get_config())
    }
}

fn parse_endpoint(raw: &str, stage: &'static str) -> TransportResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|source| TransportError::InvalidEndpoint {
        stage,
        endpoint: raw.to_string(),
        details: source.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::InvalidEndpoint {
            stage,
            endpoint: raw.to_string(),
            details: format!("unsupported scheme `{}`", url.scheme()),
        });
    }

    Ok(url)
}

fn classify_send_error(
    source: reqwest::Error,
    endpoint: &Url,
    stage: &'static str,
) -> TransportError {
    if source.is_connect() || source.is_timeout() {
        tracing::warn!(endpoint = %endpoint, error = %source, "chat service unreachable");
        return TransportError::Connection {
            stage,
            details: source.to_string(),
        };
    }

    TransportError::SendRequest {
        stage,
        endpoint: endpoint.to_string(),
        source,
    }
}
