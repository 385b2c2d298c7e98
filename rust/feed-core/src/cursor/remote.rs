// rust/feed-core/src/cursor/remote.rs

//! Client for the fleet-wide coordination service.
//!
//! The service owns one cursor per `(execution, dataset)` pair and answers
//! `GET {base}/rows/iterators/executions.{id}.{token}/by-index` with a JSON
//! array of row indices. This client keeps no cursor of its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::config::{CoordinatorConfig, ExecutionIdentity};
use crate::dataset::dataset_token;
use crate::error::{FeedError, Result};

use super::{AllocationRequest, AllocatorKind, CursorAllocator};

pub struct RemoteCursorClient {
    http: reqwest::Client,
    base_url: Url,
    key: Option<String>,
    execution: ExecutionIdentity,
}

impl std::fmt::Debug for RemoteCursorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCursorClient")
            .field("base_url", &self.base_url.as_str())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("execution", &self.execution)
            .finish()
    }
}

impl RemoteCursorClient {
    /// Build a client for one distributed execution.
    ///
    /// The HTTP client is pooled and shared by every call; connect and
    /// request timeouts come from `config`.
    ///
    /// # Errors
    ///
    /// Returns a config error if `base_url` is missing or not an absolute
    /// http(s) URL, or the HTTP client cannot be built.
    pub fn new(config: &CoordinatorConfig, execution: ExecutionIdentity) -> Result<Self> {
        let raw = config.base_url.as_deref().ok_or_else(|| {
            FeedError::config("coordinator.base_url is required for remote allocation")
        })?;
        let base_url = Url::parse(raw).map_err(|e| {
            FeedError::config_with_source(format!("invalid coordinator base URL '{raw}'"), e)
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(FeedError::config(format!(
                "coordinator base URL '{raw}' must be an http(s) URL"
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| FeedError::config_with_source("failed to build HTTP client", e))?;

        Ok(Self {
            http,
            base_url,
            key: config.key.clone(),
            execution,
        })
    }

    pub fn execution(&self) -> &ExecutionIdentity {
        &self.execution
    }

    /// Cursor key the service tracks for `dataset` in this execution.
    pub fn iterator_key(&self, dataset: &str) -> String {
        format!(
            "executions.{}.{}",
            self.execution.execution_id,
            dataset_token(dataset)
        )
    }

    /// Full request URL, including the auth key.
    fn request_url(&self, iterator: &str, request: &AllocationRequest<'_>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FeedError::config("coordinator base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["rows", "iterators", iterator, "by-index"]);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("wrap", if request.wrap { "true" } else { "false" })
                .append_pair("rows", &request.rows.to_string())
                .append_pair("length", &request.length.to_string());
            if let Some(key) = &self.key {
                query.append_pair("key", key);
            }
        }

        Ok(url)
    }

    fn parse_indices(
        iterator: &str,
        body: &[u8],
        request: &AllocationRequest<'_>,
    ) -> Result<Vec<usize>> {
        let indices: Vec<u64> = serde_json::from_slice(body).map_err(|e| {
            FeedError::coordination(format!(
                "malformed response for '{iterator}': {e}"
            ))
        })?;

        if indices.len() != request.rows {
            return Err(FeedError::coordination(format!(
                "expected {} indices for '{iterator}', got {}",
                request.rows,
                indices.len()
            )));
        }

        indices
            .into_iter()
            .map(|index| {
                usize::try_from(index)
                    .ok()
                    .filter(|i| *i < request.length)
                    .ok_or_else(|| {
                        FeedError::coordination(format!(
                            "index {index} for '{iterator}' is outside [0, {})",
                            request.length
                        ))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl CursorAllocator for RemoteCursorClient {
    async fn allocate(&self, request: &AllocationRequest<'_>) -> Result<Vec<usize>> {
        let iterator = self.iterator_key(request.dataset);
        let url = self.request_url(&iterator, request)?;

        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::warn!(iterator = %iterator, error = %e, "coordination request failed");
            FeedError::coordination_with_source(
                format!("request for '{iterator}' failed"),
                e,
            )
        })?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && !request.wrap {
            tracing::debug!(iterator = %iterator, rows = request.rows, "remote cursor exhausted");
            return Err(FeedError::end_of_dataset(
                request.dataset,
                request.rows,
                None,
                request.length,
            ));
        }
        if !status.is_success() {
            tracing::warn!(iterator = %iterator, status = status.as_u16(), "coordination service rejected request");
            return Err(FeedError::coordination_status(
                format!("coordination service returned {status} for '{iterator}'"),
                status.as_u16(),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(iterator = %iterator, error = %e, "failed to read coordination response");
            FeedError::coordination_with_source(
                format!("failed to read response for '{iterator}'"),
                e,
            )
        })?;

        let indices = Self::parse_indices(&iterator, &body, request).inspect_err(|e| {
            tracing::warn!(iterator = %iterator, error = %e, "invalid coordination response");
        })?;

        tracing::debug!(
            iterator = %iterator,
            rows = request.rows,
            wrap = request.wrap,
            "allocated remote rows"
        );

        Ok(indices)
    }

    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ITERATOR_PATH: &str = "/rows/iterators/executions.7.userscsv/by-index";

    fn client(base_url: &str, key: Option<&str>) -> RemoteCursorClient {
        let config = CoordinatorConfig {
            base_url: Some(base_url.to_string()),
            key: key.map(String::from),
            ..Default::default()
        };
        RemoteCursorClient::new(
            &config,
            ExecutionIdentity {
                execution_id: 7,
                chunk_id: 1,
            },
        )
        .unwrap()
    }

    fn request(rows: usize, length: usize, wrap: bool) -> AllocationRequest<'static> {
        AllocationRequest {
            dataset: "users.csv",
            length,
            rows,
            wrap,
        }
    }

    #[test]
    fn test_iterator_key() {
        let client = client("http://localhost:8080", None);
        assert_eq!(client.iterator_key("users.csv"), "executions.7.userscsv");
        assert_eq!(
            client.iterator_key("fixtures/v2/users.csv"),
            "executions.7.fixturesv2userscsv"
        );
    }

    #[test]
    fn test_request_url() {
        let client = client("https://agent.example.com/api/", Some("s3cret"));
        let url = client
            .request_url("executions.7.userscsv", &request(3, 10, false))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://agent.example.com/api/rows/iterators/executions.7.userscsv/by-index?wrap=false&rows=3&length=10&key=s3cret"
        );
    }

    #[test]
    fn test_new_requires_base_url() {
        let err = RemoteCursorClient::new(
            &CoordinatorConfig::default(),
            ExecutionIdentity {
                execution_id: 1,
                chunk_id: 1,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_new_rejects_non_http_url() {
        let config = CoordinatorConfig {
            base_url: Some("mailto:ops@example.com".to_string()),
            ..Default::default()
        };
        let execution = ExecutionIdentity {
            execution_id: 1,
            chunk_id: 1,
        };
        assert!(RemoteCursorClient::new(&config, execution).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = client("http://localhost:8080", Some("s3cret"));
        let debug = format!("{client:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_allocate_returns_service_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ITERATOR_PATH))
            .and(query_param("wrap", "true"))
            .and(query_param("rows", "3"))
            .and(query_param("length", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([2, 0, 1])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri(), None);
        let indices = client.allocate(&request(3, 3, true)).await.unwrap();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_allocate_sends_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ITERATOR_PATH))
            .and(query_param("key", "s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([4])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri(), Some("s3cret"));
        let indices = client.allocate(&request(1, 10, true)).await.unwrap();
        assert_eq!(indices, vec![4]);
    }

    #[tokio::test]
    async fn test_allocate_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ITERATOR_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(1, 10, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(err.is_retryable());
        match err {
            FeedError::Coordination { status, .. } => assert_eq!(status, Some(503)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_allocate_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Some("wrong"))
            .allocate(&request(1, 10, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_allocate_exhausted_without_wrap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ITERATOR_PATH))
            .and(query_param("wrap", "false"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(2, 3, false))
            .await
            .unwrap_err();
        assert!(err.is_end_of_dataset());
    }

    #[tokio::test]
    async fn test_allocate_416_with_wrap_is_coordination_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(2, 3, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
    }

    #[tokio::test]
    async fn test_allocate_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(1, 3, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_allocate_wrong_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([0, 1])))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(3, 3, true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 3 indices"));
    }

    #[tokio::test]
    async fn test_allocate_index_out_of_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 3])))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(2, 3, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(err.to_string().contains("outside [0, 3)"));
    }

    #[tokio::test]
    async fn test_allocate_negative_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([-1])))
            .mount(&server)
            .await;

        let err = client(&server.uri(), None)
            .allocate(&request(1, 3, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
    }

    #[tokio::test]
    async fn test_allocate_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([0]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = CoordinatorConfig {
            base_url: Some(server.uri()),
            request_timeout_ms: 50,
            ..Default::default()
        };
        let client = RemoteCursorClient::new(
            &config,
            ExecutionIdentity {
                execution_id: 7,
                chunk_id: 1,
            },
        )
        .unwrap();

        let err = client.allocate(&request(1, 3, true)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_allocate_connection_refused() {
        // Bind then drop to get a port with nothing listening
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = client(&format!("http://127.0.0.1:{port}"), None)
            .allocate(&request(1, 3, true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coordination);
        assert!(err.is_retryable());
    }
}
