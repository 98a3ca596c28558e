use super::executor::{BackendError, CompilerBackend};
use crate::source::{CompilerInput, Language};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct CompileRequest<'a> {
    language: Language,
    version: &'a str,
    input: &'a CompilerInput,
}

/// Managed compilation service. Its responses are read in chunks and
/// rejected as soon as they grow past `max_response_size`.
pub struct RemoteCompiler {
    url: Url,
    client: reqwest::Client,
    max_response_size: usize,
}

impl RemoteCompiler {
    pub fn new(
        url: Url,
        max_response_size: usize,
        request_timeout: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()?;
        Ok(Self {
            url,
            client,
            max_response_size,
        })
    }

    fn size_exceeded(&self) -> BackendError {
        BackendError::ResponseSizeExceeded {
            limit: self.max_response_size,
        }
    }
}

#[async_trait]
impl CompilerBackend for RemoteCompiler {
    async fn compile(
        &self,
        language: Language,
        version: &str,
        input: &CompilerInput,
    ) -> Result<Value, BackendError> {
        let request = CompileRequest {
            language,
            version,
            input,
        };
        let mut response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .context("remote compiler request failed")?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(self.size_exceeded());
        }
        if let Some(length) = response.content_length() {
            if length > self.max_response_size as u64 {
                return Err(self.size_exceeded());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("failed to read remote compiler response")?
        {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(self.size_exceeded());
            }
            body.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            return Err(anyhow!(
                "remote compiler responded with {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )
            .into());
        }
        let output = serde_json::from_slice(&body).context("invalid remote compiler response")?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const VERSION: &str = "0.8.7+commit.e28d00a7";

    fn input() -> CompilerInput {
        CompilerInput {
            language: Language::Solidity,
            sources: BTreeMap::new(),
            settings: None,
        }
    }

    async fn compiler(server: &MockServer, max_response_size: usize) -> RemoteCompiler {
        let url = Url::parse(&format!("{}/compile", server.uri())).unwrap();
        RemoteCompiler::new(url, max_response_size, 10).unwrap()
    }

    #[tokio::test]
    async fn sends_request_and_parses_output() {
        let server = MockServer::start().await;
        let output = json!({"contracts": {}, "sources": {}});
        Mock::given(method("POST"))
            .and(path("/compile"))
            .and(body_json(json!({
                "language": "Solidity",
                "version": VERSION,
                "input": {"language": "Solidity", "sources": {}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&output))
            .expect(1)
            .mount(&server)
            .await;

        let result = compiler(&server, 1024)
            .await
            .compile(Language::Solidity, VERSION, &input())
            .await
            .expect("compilation failed");

        assert_eq!(output, result);
    }

    #[tokio::test]
    async fn payload_too_large_status_is_size_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;

        let result = compiler(&server, 1024)
            .await
            .compile(Language::Solidity, VERSION, &input())
            .await;

        assert!(
            matches!(result, Err(BackendError::ResponseSizeExceeded { limit: 1024 })),
            "unexpected result: {result:?}"
        );
    }

    #[tokio::test]
    async fn oversized_body_is_size_exceeded() {
        let server = MockServer::start().await;
        let output = json!({"contracts": {"A.sol": {"A": {"abi": "x".repeat(256)}}}});
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&output))
            .mount(&server)
            .await;

        let result = compiler(&server, 64)
            .await
            .compile(Language::Solidity, VERSION, &input())
            .await;

        assert!(
            matches!(result, Err(BackendError::ResponseSizeExceeded { limit: 64 })),
            "unexpected result: {result:?}"
        );
    }

    #[tokio::test]
    async fn server_errors_are_infrastructure_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let result = compiler(&server, 1024)
            .await
            .compile(Language::Solidity, VERSION, &input())
            .await;

        match result {
            Err(BackendError::Infrastructure(err)) => {
                assert!(err.to_string().contains("internal error"), "{err:#}")
            }
            _ => panic!("unexpected result: {result:?}"),
        }
    }
}
