use std::sync::Arc;

mod event_stream;
mod http;
mod service;

pub use event_stream::{
    DONE_SENTINEL, EVENT_STREAM_CONTENT_TYPE, FRAME_MARKER, FragmentReader, FragmentStream,
    SseLineDecoder, StreamError, StreamFragment, StreamResult, read_response,
};
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpChatService, ServiceConfig};
pub use service::{
    BoxFuture, ByteStream, ChatConfig, ChatRequest, ChatResponse, ChatService, ConnectionSnafu,
    HistoryEntry, Role, TransportError, TransportResult,
};

pub fn create_service(config: ServiceConfig) -> TransportResult<Arc<dyn ChatService>> {
    if config.chat_endpoint.is_empty() {
        return Err(TransportError::InvalidEndpoint {
            stage: "create-service",
            endpoint: config.chat_endpoint,
            details: "chat endpoint is empty".to_string(),
        });
    }

    Ok(Arc::new(HttpChatService::new(config)?))
}

pub async fn fetch_config_or_default(service: &dyn ChatService) -> ChatConfig {
    match service.fetch_config().await {
        Ok(config) => config,
        Err(error) => {
            tracing::warn!(error = %error, "could not load chat config; continuing without it");
            ChatConfig::default()
        }
    }
}
