use secrecy::Secret;
use serde_json::{json, Value};
use toolrelay::config::ServerConfig;
use toolrelay::error::TransportError;
use toolrelay::mcp::{HttpTransport, ToolTransport};
use toolrelay::registry::ServerDescriptor;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(url: &str, api_key: Option<&str>) -> HttpTransport {
    let mut config = ServerConfig::new("data");
    config.api_url = Some(url.to_string());
    config.api_key = api_key.map(|key| Secret::new(key.to_string()));
    HttpTransport::new(&ServerDescriptor::from_config(&config)).unwrap()
}

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": "1", "result": result}))
}

#[tokio::test]
async fn test_list_functions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(rpc_result(json!({
            "tools": [
                {
                    "name": "execute",
                    "description": "Run SQL",
                    "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}},
                    "functionClass": "write",
                    "cacheable": false,
                    "queryParameter": "query"
                },
                {"name": "listProjects"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&format!("{}/rpc", server.uri()), None);
    let functions = transport.list_functions().await.unwrap();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].name, "execute");
    assert_eq!(functions[0].cacheable, Some(false));
    assert_eq!(functions[0].query_parameter.as_deref(), Some("query"));
    assert_eq!(functions[1].description, None);
}

#[tokio::test]
async fn test_call_sends_bearer_token_and_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(header("authorization", "Bearer sekrit"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "execute", "arguments": {"query": "SELECT 1"}}
        })))
        .respond_with(rpc_result(json!({"content": [{"type": "text", "text": "1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&format!("{}/rpc", server.uri()), Some("sekrit"));
    let value = transport.call("execute", json!({"query": "SELECT 1"})).await.unwrap();
    assert_eq!(value["content"][0]["text"], "1");
}

#[tokio::test]
async fn test_tool_error_flag_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!({
            "isError": true,
            "content": [{"type": "text", "text": "permission denied for table users"}]
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server.uri(), None);
    let error = transport.call("execute", json!({})).await.unwrap_err();
    assert_eq!(
        error,
        TransportError::Remote("permission denied for table users".to_string())
    );
}

#[tokio::test]
async fn test_json_rpc_error_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server.uri(), None);
    let error = transport.call("nope", json!({})).await.unwrap_err();
    assert!(matches!(error, TransportError::Remote(ref m) if m.contains("Method not found")));
    assert!(!error.is_retryable());

    // an error object still proves the endpoint is alive
    transport.connect().await.unwrap();
    transport.ping().await.unwrap();
}

#[tokio::test]
async fn test_http_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/locked"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let broken = transport_for(&format!("{}/broken", server.uri()), None);
    assert!(matches!(
        broken.call("execute", json!({})).await,
        Err(TransportError::Protocol(_))
    ));

    let locked = transport_for(&format!("{}/locked", server.uri()), None);
    let error = locked.ping().await.unwrap_err();
    assert!(matches!(error, TransportError::Remote(ref m) if m.contains("401")));
}

#[tokio::test]
async fn test_invalid_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let transport = transport_for(&server.uri(), None);
    assert!(matches!(
        transport.list_functions().await,
        Err(TransportError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_refused() {
    let transport = transport_for("http://127.0.0.1:1/rpc", None);
    let error = transport.connect().await.unwrap_err();
    assert!(matches!(error, TransportError::Refused(_)));
    assert!(error.is_retryable());
}
