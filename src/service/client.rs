use crate::config::Config;
use crate::design::GenerationRequest;
use crate::reconcile::{reconcile, ReconciliationResult, Solution, FAILURE_NARRATION};
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const CHAT_MESSAGES_PATH: &str = "v1/chat-messages";
const DESIGN_QUERY: &str = "请执行声学方案设计流程。";
const DOCUMENTS_QUERY: &str = "请为以下方案生成 Word 与 Excel 文档。";

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;

#[derive(Serialize)]
struct ChatRequest<'a, T: Serialize> {
    inputs: &'a T,
    query: &'a str,
    response_mode: &'static str,
    user: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Serialize)]
struct DocumentInputs<'a> {
    solutions: &'a [Solution],
}

/// Raw answer for one design request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub request_id: Uuid,
    pub raw_answer: String,
}

/// Reconciled answer for one design request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignOutcome {
    pub request_id: Uuid,
    pub result: ReconciliationResult,
}

/// Client for the chat-flow generation service
pub struct ChatflowClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    user: String,
    timeout: Duration,
}

impl ChatflowClient {
    /// Build a client from config. Fails when no API key is available.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!("No API key configured. Run 'acoustic setup' or set ACOUSTIC_API_KEY.")
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &Config, api_key: String) -> anyhow::Result<Self> {
        let endpoint = chat_endpoint(&config.service_url)?;
        let timeout = config.request_timeout();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            user: config.service_user.clone(),
            timeout,
        })
    }

    /// Send the request's intent and return the raw answer, tagged with the
    /// request id it answers.
    pub async fn run_design(&self, request: &GenerationRequest) -> anyhow::Result<GenerationOutcome> {
        tracing::info!(request_id = %request.request_id, "requesting design generation");
        let raw_answer = self.send(&request.intent, DESIGN_QUERY).await?;
        tracing::info!(
            request_id = %request.request_id,
            chars = raw_answer.chars().count(),
            "design answer received"
        );
        Ok(GenerationOutcome {
            request_id: request.request_id,
            raw_answer,
        })
    }

    /// Run a design request through reconciliation.
    ///
    /// Transport failures and timeouts never reach the reconciler; they
    /// produce a failed result carrying the error for display.
    pub async fn generate_design(&self, request: &GenerationRequest) -> DesignOutcome {
        let result = match self.run_design(request).await {
            Ok(outcome) => reconcile(&outcome.raw_answer),
            Err(err) => {
                tracing::warn!(request_id = %request.request_id, error = %err, "design generation failed");
                ReconciliationResult::failed_with(format!("{}\n{}", FAILURE_NARRATION, err))
            }
        };
        DesignOutcome {
            request_id: request.request_id,
            result,
        }
    }

    /// Ask the service for Word/Excel artifacts for `solutions`.
    ///
    /// The answer is returned raw; link fragments in it are picked up by
    /// `attach_document_links`.
    pub async fn generate_documents(&self, solutions: &[Solution]) -> anyhow::Result<String> {
        if solutions.is_empty() {
            return Err(anyhow::anyhow!("No solutions selected for document generation"));
        }
        tracing::info!(count = solutions.len(), "requesting document generation");
        self.send(&DocumentInputs { solutions }, DOCUMENTS_QUERY).await
    }

    async fn send<T: Serialize>(&self, inputs: &T, query: &str) -> anyhow::Result<String> {
        let body = ChatRequest {
            inputs,
            query,
            response_mode: "blocking",
            user: &self.user,
        };

        let mut retry_count = 0;
        loop {
            let response = self
                .http
                .post(self.endpoint.clone())
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            let text = response.text().await.map_err(|e| self.transport_error(e))?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to parse service response: {}\n{}",
                        e,
                        truncate_str(&text, 200)
                    )
                })?;
                return parsed
                    .answer
                    .filter(|answer| !answer.trim().is_empty())
                    .ok_or_else(|| anyhow::anyhow!("Service returned an empty answer"));
            }

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let retry_after = parse_retry_after(&text).unwrap_or_else(|| {
                    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count - 1)) / 1000
                });
                tracing::warn!(
                    retry_after,
                    attempt = retry_count,
                    max = MAX_RETRIES,
                    "service rate limited, retrying"
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            let message = match status.as_u16() {
                401 => "Invalid API key. Run 'acoustic setup' to update it.".to_string(),
                429 => format!(
                    "Rate limited by the service after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "Service error ({}). The service may be temporarily unavailable: {}",
                    status,
                    truncate_str(&text, 200)
                ),
                _ => format!("API error {}: {}", status, truncate_str(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", message));
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> anyhow::Error {
        if err.is_timeout() {
            anyhow::anyhow!(
                "Service did not answer within {} minutes",
                self.timeout.as_secs() / 60
            )
        } else {
            anyhow::anyhow!("Failed to reach the service: {}", err)
        }
    }
}

fn chat_endpoint(base: &str) -> anyhow::Result<Url> {
    let mut base = Url::parse(base.trim())
        .map_err(|e| anyhow::anyhow!("Invalid service URL '{}': {}", base, e))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(CHAT_MESSAGES_PATH)?)
}

/// Extract a retry-after hint like "retry after 12 seconds" from an error body
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    text_lower[pos..]
        .split_whitespace()
        .skip(1)
        .take(5)
        .filter_map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .find(|secs| *secs > 0 && *secs < 300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::DesignSession;
    use crate::reconcile::RESULTS_START_MARKER;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request that came in
    fn serve_once(status: &'static str, body: String) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn client_for(url: &str) -> ChatflowClient {
        let config = Config {
            service_url: url.to_string(),
            ..Config::default()
        };
        ChatflowClient::new(&config, "app-test".to_string()).unwrap()
    }

    #[test]
    fn test_chat_endpoint_joins_path() {
        assert_eq!(
            chat_endpoint("http://10.0.0.1:20000").unwrap().as_str(),
            "http://10.0.0.1:20000/v1/chat-messages"
        );
        assert_eq!(
            chat_endpoint("https://svc.example/api/").unwrap().as_str(),
            "https://svc.example/api/v1/chat-messages"
        );
        assert!(chat_endpoint("not a url").is_err());
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("rate limited"), None);
        assert_eq!(parse_retry_after("retry in 9999 s"), None);
    }

    #[tokio::test]
    async fn test_design_answer_is_correlated_and_reconciled() {
        let answer = format!(
            "{}<font size=5>推荐方案 1</font>\n|音箱|同轴吸顶扬声器|SX60|4|",
            RESULTS_START_MARKER
        );
        let body = serde_json::json!({ "answer": answer, "message_id": "m-1" }).to_string();
        let (url, server) = serve_once("200 OK", body);

        let mut session = DesignSession::default();
        let request = session.begin_generation().unwrap();
        let outcome = client_for(&url).generate_design(&request).await;

        let seen = server.join().unwrap();
        assert!(seen.starts_with("POST /v1/chat-messages"));
        assert!(seen.contains("Bearer app-test"));
        assert!(seen.contains("\"response_mode\":\"blocking\""));
        assert!(seen.contains("acoustic_design"));

        assert_eq!(outcome.request_id, request.request_id);
        assert_eq!(outcome.result.solutions().len(), 1);
        session
            .complete_generation(outcome.request_id, outcome.result)
            .unwrap();
        assert_eq!(session.solutions()[0].items[0].model, "SX60");
    }

    #[tokio::test]
    async fn test_server_error_yields_failed_result() {
        let (url, server) = serve_once("500 Internal Server Error", "{\"error\":\"boom\"}".into());
        let mut session = DesignSession::default();
        let request = session.begin_generation().unwrap();
        let outcome = client_for(&url).generate_design(&request).await;
        server.join().unwrap();

        assert!(outcome.result.is_empty());
        assert!(outcome.result.narration().starts_with(FAILURE_NARRATION));
        assert!(outcome.result.narration().contains("Service error"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let (url, server) = serve_once("200 OK", "{\"answer\":\"  \"}".into());
        let err = client_for(&url)
            .generate_documents(&[Solution::new("方案1".into(), Vec::new())])
            .await
            .unwrap_err();
        server.join().unwrap();
        assert!(err.to_string().contains("empty answer"));
    }

    #[tokio::test]
    async fn test_documents_require_a_selection() {
        let client = client_for("http://127.0.0.1:9");
        assert!(client.generate_documents(&[]).await.is_err());
    }
}
