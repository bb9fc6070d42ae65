use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::constants::JUDGE_TOKEN_HEADER;
use crate::core::domain::{JudgeSource, Problem};
use crate::core::errors::EvaluationError;
use crate::core::traits::judge::{Judge, JudgeInput, JudgeOutcome};
use crate::remote::protocol::{Envelope, JudgeRequest, LanguageConfig, interpret};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Judge server request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Judge server returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Client for an external sandboxed judge server.
///
/// Every request is a single attempt; failures are reported to the scorer
/// with the raw error text and never retried.
#[derive(Clone, Debug)]
pub struct RemoteJudge {
    client: Client,
    endpoint: String,
    token: String,
    timeout: Duration,
}

impl RemoteJudge {
    pub fn new(base_url: &str, secret: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/judge", base_url.trim_end_matches('/')),
            token: token_for(secret),
            timeout,
        }
    }

    async fn send(&self, request: &JudgeRequest<'_>) -> Result<Envelope, RemoteError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(JUDGE_TOKEN_HEADER, &self.token)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}

/// Hex SHA-256 of the shared secret, as the judge server expects it.
pub fn token_for(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

#[async_trait::async_trait]
impl Judge for RemoteJudge {
    #[tracing::instrument(skip(self, problem, input), fields(problem = problem.id))]
    async fn judge(&self, problem: &Problem, input: &JudgeInput) -> Result<JudgeOutcome, EvaluationError> {
        let Some(test_case_id) = problem
            .data_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
        else {
            return Ok(JudgeOutcome::FixturesAbsent {
                source: JudgeSource::Remote,
                message: "Problem has no test data, full runtime credit given".to_string(),
            });
        };

        let Some(language_config) = LanguageConfig::for_language(&input.language) else {
            return Ok(JudgeOutcome::NotApplicable {
                message: format!("Judge server does not support language {}", input.language),
            });
        };

        let request = JudgeRequest::new(&input.code, language_config, problem, test_case_id);
        let outcome = match self.send(&request).await {
            Ok(envelope) => interpret(envelope),
            Err(err) => {
                tracing::warn!("Judge server call failed: {}", err);
                JudgeOutcome::ServiceFailure {
                    source: JudgeSource::Remote,
                    message: err.to_string(),
                }
            }
        };
        tracing::debug!("Remote outcome: {:?}", outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Language, ScoreMethod, Verdict};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn problem(data_path: Option<&str>) -> Problem {
        Problem {
            id: 3,
            name: "sum".to_string(),
            time_limit_ms: Some(2000),
            memory_limit_bytes: None,
            data_path: data_path.map(str::to_string),
            code_check_score: 20,
            runtime_score: 80,
            score_method: ScoreMethod::Sum,
        }
    }

    fn input(language: Language) -> JudgeInput {
        JudgeInput {
            code: "int main(){return 0;}".to_string(),
            language,
            artifact: None,
        }
    }

    /// Serves one HTTP exchange with `body` and hands back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (base, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[test]
    fn test_token_is_hex_sha256() {
        assert_eq!(
            token_for("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_posts_authenticated_request() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"err": null, "data": [{"result": 0, "test_case": "1"}, {"result": -1, "test_case": "2"}]}"#,
        )
        .await;
        let judge = RemoteJudge::new(&base, "abc", Duration::from_secs(5));

        let outcome = judge.judge(&problem(Some("sum")), &input(Language::C)).await.unwrap();
        let request = server.await.unwrap();

        let JudgeOutcome::Verdicts { source, tests } = outcome else {
            panic!("expected verdicts, got {:?}", outcome);
        };
        assert_eq!(source, JudgeSource::Remote);
        assert_eq!(
            tests.iter().map(|t| t.verdict).collect::<Vec<_>>(),
            vec![Verdict::Passed, Verdict::OutputMismatch]
        );
        assert!(request.starts_with("POST /judge "));
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.contains(&format!("x-judge-server-token: {}", token_for("abc"))));
        assert!(request.contains(r#""test_case_id":"sum""#));
        assert!(request.contains(r#""max_cpu_time":2000"#));
    }

    #[tokio::test]
    async fn test_remote_missing_fixtures() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"err": "JudgeClientError", "data": "Test case not found"}"#,
        )
        .await;
        let judge = RemoteJudge::new(&base, "abc", Duration::from_secs(5));

        let outcome = judge.judge(&problem(Some("gone")), &input(Language::C)).await.unwrap();
        server.await.unwrap();

        assert!(matches!(outcome, JudgeOutcome::FixturesAbsent { source: JudgeSource::Remote, .. }));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (base, server) = serve_once("500 Internal Server Error", r#"{"detail": "boom"}"#).await;
        let judge = RemoteJudge::new(&base, "abc", Duration::from_secs(5));

        let outcome = judge.judge(&problem(Some("sum")), &input(Language::C)).await.unwrap();
        server.await.unwrap();

        let JudgeOutcome::ServiceFailure { message, .. } = outcome else {
            panic!("expected service failure, got {:?}", outcome);
        };
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let judge = RemoteJudge::new(&base, "abc", Duration::from_secs(2));

        let outcome = judge.judge(&problem(Some("sum")), &input(Language::C)).await.unwrap();

        assert!(matches!(outcome, JudgeOutcome::ServiceFailure { source: JudgeSource::Remote, .. }));
    }

    #[tokio::test]
    async fn test_no_data_path_full_credit_without_request() {
        let judge = RemoteJudge::new("http://127.0.0.1:9", "abc", Duration::from_secs(1));

        let outcome = judge.judge(&problem(None), &input(Language::C)).await.unwrap();

        assert!(matches!(outcome, JudgeOutcome::FixturesAbsent { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_language_not_applicable() {
        let judge = RemoteJudge::new("http://127.0.0.1:9", "abc", Duration::from_secs(1));

        let outcome = judge
            .judge(&problem(Some("sum")), &input(Language::from("python")))
            .await
            .unwrap();

        assert!(matches!(outcome, JudgeOutcome::NotApplicable { .. }));
    }
}
