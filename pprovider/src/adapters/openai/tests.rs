//! Focused unit tests for OpenAI adapter internals.

#![cfg(test)]

use std::sync::Arc;

use serde_json::json;

use crate::{
    ContentPart, Message, ModelRequest, ProviderError, ProviderErrorKind, ProviderFuture, ProviderId,
    Role, ToolArguments, ToolCall,
};

use super::provider::OpenAiProvider;
use super::serde_api::{build_api_request, map_error_response, parse_finish_reason};
use super::transport::OpenAiTransport;
use super::types::{
    OpenAiAssistantMessage, OpenAiAuth, OpenAiContentPart, OpenAiFinishReason, OpenAiRequest,
    OpenAiResponse, OpenAiRole, OpenAiToolCall, OpenAiUsage,
};

#[derive(Debug)]
struct NoopTransport;

impl OpenAiTransport for NoopTransport {
    fn complete<'a>(
        &'a self,
        _request: OpenAiRequest,
        _auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async { Err(ProviderError::other("not used")) })
    }
}

fn provider() -> OpenAiProvider {
    OpenAiProvider::new(Arc::new(NoopTransport), "sk-test")
}

#[test]
fn system_prompt_is_prepended_and_images_become_data_urls() {
    let request = ModelRequest::builder("gpt-4o-mini")
        .system("be brief")
        .message(Message::with_parts(
            Role::Human,
            vec![
                ContentPart::text("what is this?"),
                ContentPart::image("image/jpeg", "AAAA"),
            ],
        ))
        .build()
        .expect("request should build");

    let built = provider().build_openai_request(request);

    assert_eq!(built.messages.len(), 2);
    assert_eq!(built.messages[0].role, OpenAiRole::System);
    assert_eq!(built.messages[1].role, OpenAiRole::User);
    assert_eq!(
        built.messages[1].content[1],
        OpenAiContentPart::ImageDataUrl("data:image/jpeg;base64,AAAA".to_string())
    );
}

#[test]
fn assistant_tool_calls_and_tool_turns_serialize_in_wire_shape() {
    let mut arguments = ToolArguments::new();
    arguments.insert("query".to_string(), json!("weather"));
    let request = ModelRequest::builder("gpt-4o-mini")
        .message(Message::new(Role::Human, "weather?"))
        .message(Message::assistant(
            "",
            vec![ToolCall::new("call_1", "search_web", arguments)],
        ))
        .message(Message::tool("call_1", &json!({"answer": "sunny"})))
        .build()
        .expect("request should build");

    let api = build_api_request(provider().build_openai_request(request))
        .expect("api request should build");
    let wire = serde_json::to_value(&api).expect("serializes");

    let assistant = &wire["messages"][1];
    assert!(assistant.get("content").is_none());
    assert_eq!(assistant["tool_calls"][0]["function"]["name"], "search_web");
    assert_eq!(
        assistant["tool_calls"][0]["function"]["arguments"],
        r#"{"query":"weather"}"#
    );
    assert_eq!(wire["messages"][2]["role"], "tool");
    assert_eq!(wire["messages"][2]["tool_call_id"], "call_1");
}

#[test]
fn error_statuses_map_onto_the_taxonomy() {
    let cases = [
        (401, r#"{"error":{"message":"bad key"}}"#, ProviderErrorKind::Authentication),
        (403, r#"{"error":{"message":"no access"}}"#, ProviderErrorKind::PermissionDenied),
        (
            429,
            r#"{"error":{"message":"quota","code":"insufficient_quota"}}"#,
            ProviderErrorKind::CreditExhausted,
        ),
        (429, r#"{"error":{"message":"slow down"}}"#, ProviderErrorKind::RateLimited),
        (
            400,
            r#"{"error":{"message":"nope","code":"content_policy_violation"}}"#,
            ProviderErrorKind::ContentPolicy,
        ),
        (
            400,
            r#"{"error":{"message":"An assistant message with 'tool_calls' must be followed by tool messages"}}"#,
            ProviderErrorKind::MalformedHistory,
        ),
        (400, r#"{"error":{"message":"bad field"}}"#, ProviderErrorKind::InvalidRequest),
        (504, "", ProviderErrorKind::Timeout),
        (502, "<html>", ProviderErrorKind::Unavailable),
        (501, "", ProviderErrorKind::Unavailable),
        (302, "", ProviderErrorKind::Transport),
    ];

    for (status, body, expected) in cases {
        assert_eq!(map_error_response(status, body).kind, expected, "status {status}");
    }
}

#[test]
fn unlisted_client_errors_are_not_retried() {
    let body = r#"{"error":{"message":"The model `gpt-9` does not exist","code":"model_not_found"}}"#;

    for status in [404, 405, 413, 418] {
        let error = map_error_response(status, body);
        assert_eq!(error.kind, ProviderErrorKind::InvalidRequest, "status {status}");
        assert!(!error.retryable, "status {status}");
    }
}

#[test]
fn parse_finish_reason_maps_expected_values() {
    assert_eq!(parse_finish_reason(Some("stop")), OpenAiFinishReason::Stop);
    assert_eq!(parse_finish_reason(Some("tool_calls")), OpenAiFinishReason::ToolCalls);
    assert_eq!(
        parse_finish_reason(Some("content_filter")),
        OpenAiFinishReason::ContentFilter
    );
    assert_eq!(parse_finish_reason(None), OpenAiFinishReason::Other);
}

#[test]
fn malformed_tool_arguments_in_a_response_are_reported() {
    let response = OpenAiResponse {
        model: "gpt-4o-mini".to_string(),
        message: OpenAiAssistantMessage {
            content: String::new(),
            tool_calls: vec![OpenAiToolCall {
                id: "call_1".to_string(),
                name: "generate_image".to_string(),
                arguments: "{\"prompt\": ".to_string(),
            }],
        },
        finish_reason: OpenAiFinishReason::ToolCalls,
        usage: OpenAiUsage::default(),
    };

    let error = response
        .into_model_response(ProviderId::OpenAi)
        .expect_err("truncated arguments should fail");
    assert_eq!(error.kind, ProviderErrorKind::MalformedToolArguments);
    assert!(error.retryable);
}

#[test]
fn auth_debug_output_is_redacted() {
    let rendered = format!("{:?}", OpenAiAuth::ApiKey("sk-secret".to_string()));
    assert!(!rendered.contains("sk-secret"));
}
