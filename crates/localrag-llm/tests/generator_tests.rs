use localrag_core::traits::Generator;
use localrag_core::types::ChatMessage;
use localrag_core::Error;
use localrag_llm::{ChatCompletionsGenerator, LlmSettings, API_KEY_ENV};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answer exactly one HTTP request with `status` and `body`; yields the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 { break; }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0)))
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length { break; }
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        String::from_utf8_lossy(&buf).to_string()
    });
    (base_url, handle)
}

fn settings(base_url: &str) -> LlmSettings {
    LlmSettings { base_url: base_url.to_string(), model: "test-model".into(), timeout_secs: 5, ..LlmSettings::default() }
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage::system("Answer from the context."), ChatMessage::user("Context:\nParis.\n\nQuestion: Capital?")]
}

#[test]
fn missing_api_key_is_a_config_error() {
    std::env::remove_var(API_KEY_ENV);
    let err = ChatCompletionsGenerator::from_env(LlmSettings::default()).err().expect("should fail");
    assert!(matches!(err, Error::InvalidConfig(_)));

    let with_key = LlmSettings { api_key: Some("k".into()), ..LlmSettings::default() };
    assert!(ChatCompletionsGenerator::from_env(with_key).is_ok());
}

#[test]
fn request_body_carries_roles_and_model() {
    let gen = ChatCompletionsGenerator::new(LlmSettings { max_tokens: Some(256), ..settings("http://x") }, "k").expect("gen");
    let body = gen.request_body(&messages());
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn generate_returns_first_choice() {
    let (base_url, server) = serve_once("200 OK", r#"{"choices":[{"message":{"role":"assistant","content":"Paris."}}]}"#).await;
    let gen = ChatCompletionsGenerator::new(settings(&base_url), "secret").expect("gen");
    let answer = gen.generate(&messages()).await.expect("generate");
    assert_eq!(answer, "Paris.");

    let request = server.await.expect("server");
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
}

#[tokio::test]
async fn http_errors_surface_as_errors() {
    let (base_url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
    let gen = ChatCompletionsGenerator::new(settings(&base_url), "secret").expect("gen");
    let err = gen.generate(&messages()).await.unwrap_err();
    assert!(err.to_string().contains("500"));
    server.await.expect("server");
}
