use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Uri};
use hyper_tls::HttpsConnector;
use std::str::FromStr;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use super::{ScoringFramework, ScoringRequest, ScoringResponse};
use crate::error::CallError;

const OPERATION: &str = "Score";

/// Scoring framework reached over HTTP.
///
/// POSTs the scoring request as JSON and expects `{"scores": [...]}` back,
/// one entry per dataset row.
#[derive(Clone)]
pub struct HttpScoringFramework {
    http_client: Client<HttpsConnector<HttpConnector>>,
    endpoint: Uri,
}

impl HttpScoringFramework {
    pub fn new(endpoint: &str) -> Result<Self, CallError> {
        let endpoint = Uri::from_str(endpoint).map_err(|e| {
            CallError::rejected(OPERATION, format!("invalid scoring endpoint {}: {}", endpoint, e))
        })?;
        let https = HttpsConnector::new();
        let http_client = Client::builder().build::<_, Body>(https);

        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

#[async_trait]
impl ScoringFramework for HttpScoringFramework {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, CallError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| CallError::rejected(OPERATION, format!("unserializable request: {}", e)))?;

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(Body::from(body))
            .map_err(|e| CallError::rejected(OPERATION, e.to_string()))?;

        let limit = Duration::from_secs(request.run_config.timeout);
        debug!("Posting scoring request, timeout {:?}", limit);

        let response = timeout(limit, self.http_client.request(http_request))
            .await
            .map_err(|_| CallError::transient(OPERATION, format!("no response within {:?}", limit)))?
            .map_err(|e| CallError::transient(OPERATION, e.to_string()))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| CallError::transient(OPERATION, e.to_string()))?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            warn!("Scoring service returned {}: {}", status, message);
            let error = if status.is_server_error() {
                CallError::transient(OPERATION, message)
            } else {
                CallError::rejected(OPERATION, message)
            };
            return Err(error.with_code(status.as_u16().to_string()));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            CallError::rejected(OPERATION, format!("malformed scoring response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DatasetRow, EvaluationDataset, ModelConfig, RunConfig};
    use crate::evaluation::{bind_metrics, Metric};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server, StatusCode};
    use std::convert::Infallible;
    use std::net::SocketAddr;

    async fn serve(status: StatusCode, body: &'static str) -> SocketAddr {
        let make_svc = make_service_fn(move |_conn| async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| async move {
                let received = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
                let parsed: serde_json::Value = serde_json::from_slice(&received).unwrap();
                assert_eq!(parsed["metrics"][0]["metric"], "faithfulness");
                assert_eq!(parsed["dataset"][0]["question"], "what is Q?");
                Ok::<_, Infallible>(
                    Response::builder()
                        .status(status)
                        .body(Body::from(body))
                        .unwrap(),
                )
            }))
        });

        let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_svc);
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    }

    fn request() -> ScoringRequest {
        let models = ModelConfig {
            region: "us-east-1".to_string(),
            embedding_model_id: "embed".to_string(),
            text_model_id: "text".to_string(),
        };
        ScoringRequest {
            dataset: EvaluationDataset {
                rows: vec![DatasetRow {
                    question: "what is Q?".to_string(),
                    answer: "test message".to_string(),
                    ground_truth: "an assistant".to_string(),
                    contexts: vec!["data snippet".to_string()],
                }],
            },
            metrics: bind_metrics(&[Metric::Faithfulness], &models),
            run_config: RunConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_scores_are_parsed() {
        let addr = serve(StatusCode::OK, r#"{"scores":[{"faithfulness":0.5}]}"#).await;
        let framework = HttpScoringFramework::new(&format!("http://{}/score", addr)).unwrap();

        let response = framework.score(&request()).await.unwrap();

        assert_eq!(response.scores.len(), 1);
        assert_eq!(response.scores[0]["faithfulness"], Some(0.5));
    }

    #[tokio::test]
    async fn test_null_scores_are_missing_values() {
        let addr = serve(StatusCode::OK, r#"{"scores":[{"faithfulness":null}]}"#).await;
        let framework = HttpScoringFramework::new(&format!("http://{}/score", addr)).unwrap();

        let response = framework.score(&request()).await.unwrap();

        assert_eq!(response.scores[0]["faithfulness"], None);
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let addr = serve(StatusCode::SERVICE_UNAVAILABLE, "busy").await;
        let framework = HttpScoringFramework::new(&format!("http://{}/score", addr)).unwrap();

        let err = framework.score(&request()).await.unwrap_err();

        assert!(err.transient);
        assert_eq!(err.code.as_deref(), Some("503"));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(HttpScoringFramework::new("not a uri").is_err());
    }
}
