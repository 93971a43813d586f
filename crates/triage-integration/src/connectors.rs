//! 生成式模型连接器
//!
//! 通过 REST 接口调用 Gemini `generateContent`，把所有失败映射为 `GenerativeError`

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use triage_core::{GenerativeError, TextGenerator};

/// 错误响应体在错误信息中保留的最大长度
const MAX_ERROR_BODY: usize = 256;

/// Gemini 连接器配置
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini 连接器
pub struct GeminiConnector {
    name: String,
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!("Initializing Gemini connector for {}", config.endpoint);
        Ok(Self {
            name: "gemini".to_string(),
            config,
            client,
        })
    }

    /// 模型的 generateContent 地址
    pub fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }

    fn map_transport_error(&self, error: reqwest::Error) -> GenerativeError {
        if error.is_timeout() {
            GenerativeError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            GenerativeError::Transport(error.to_string())
        }
    }
}

/// 取第一个候选答案的全部文本
fn extract_text(body: &str) -> std::result::Result<String, GenerativeError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerativeError::Parse(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GenerativeError::EmptyResponse)
    } else {
        Ok(text)
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl TextGenerator for GeminiConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
    ) -> std::result::Result<String, GenerativeError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!("POST {}", self.generate_url(model));
        let response = self
            .client
            .post(self.generate_url(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            warn!("Gemini returned {}", status);
            return Err(GenerativeError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn connector(endpoint: &str) -> GeminiConnector {
        let mut connector = GeminiConnector::new(GeminiConfig {
            endpoint: endpoint.to_string(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();
        // 本地测试服务器不能走系统代理
        connector.client = reqwest::Client::builder().no_proxy().build().unwrap();
        connector
    }

    /// 读完一个请求后返回固定响应，并把请求原文交给测试
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 4096];

            loop {
                let n = socket.read(&mut buffer).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buffer[..n]);

                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).to_string()
        });

        (address, handle)
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let result = GeminiConnector::new(GeminiConfig {
            endpoint: "http://localhost".to_string(),
            api_key: "  ".to_string(),
            request_timeout: Duration::from_secs(1),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_url() {
        let connector = connector("https://generativelanguage.googleapis.com/");
        assert_eq!(
            connector.generate_url("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Neuro"},{"text":"logy"}],"role":"model"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Neurology");

        assert_eq!(extract_text(r#"{"candidates":[]}"#), Err(GenerativeError::EmptyResponse));
        assert_eq!(
            extract_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#),
            Err(GenerativeError::EmptyResponse)
        );
        assert!(matches!(extract_text("not json"), Err(GenerativeError::Parse(_))));
    }

    #[tokio::test]
    async fn test_generate_posts_prompt_and_reads_answer() {
        let (address, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Neurology\n"}]}}]}"#,
        )
        .await;

        let text = connector(&address)
            .generate("classify this", "gemini-2.5-flash")
            .await
            .unwrap();
        assert_eq!(text, "Neurology\n");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains(r#"{"contents":[{"parts":[{"text":"classify this"}]}]}"#));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (address, server) = serve_once(
            "HTTP/1.1 429 Too Many Requests",
            r#"{"error":{"code":429,"message":"quota"}}"#,
        )
        .await;

        let err = connector(&address)
            .generate("classify this", "gemini-2.5-flash")
            .await
            .unwrap_err();
        match err {
            GenerativeError::HttpStatus { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = connector(&address)
            .generate("classify this", "gemini-2.5-flash")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerativeError::Transport(_)));
    }
}
