use futures::StreamExt;
use sitechat_transport::{
    BoxFuture, ChatConfig, ChatRequest, ChatResponse, ChatService, ConnectionSnafu,
    EVENT_STREAM_CONTENT_TYPE, ServiceConfig, TransportError, TransportResult, create_service,
    fetch_config_or_default, read_response,
};

struct OfflineService;

impl ChatService for OfflineService {
    fn send<'a>(
        &'a self,
        _request: &'a ChatRequest,
    ) -> BoxFuture<'a, TransportResult<ChatResponse>> {
        Box::pin(async {
            ConnectionSnafu {
                stage: "offline-send",
                details: "no route to host",
            }
            .fail()
        })
    }

    fn fetch_config<'a>(&'a self) -> BoxFuture<'a, TransportResult<ChatConfig>> {
        Box::pin(async {
            ConnectionSnafu {
                stage: "offline-config",
                details: "no route to host",
            }
            .fail()
        })
    }
}

#[test]
fn create_service_rejects_empty_chat_endpoint() {
    let result = create_service(ServiceConfig::new("", "http://localhost/api/chat/config"));
    assert!(matches!(result, Err(TransportError::InvalidEndpoint { .. })));
}

#[tokio::test]
async fn config_failure_degrades_to_empty_config() {
    let config = fetch_config_or_default(&OfflineService).await;
    assert_eq!(config, ChatConfig::default());
}

#[tokio::test]
async fn hello_frames_assemble_in_order() {
    let frames = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        "data: [DONE]\n",
    ];
    let body = futures::stream::iter(
        frames.map(|frame| Ok::<_, TransportError>(frame.as_bytes().to_vec())),
    );
    let response = ChatResponse::new(
        200,
        Some(EVENT_STREAM_CONTENT_TYPE.to_string()),
        Box::pin(body),
    );

    let mut assembled = String::new();
    let mut fragments = read_response(response);
    while let Some(fragment) = fragments.next().await {
        assembled.push_str(&fragment.expect("fragment").text);
    }

    assert_eq!(assembled, "Hello");
}
