//! Multi-candidate schema prober.
//!
//! Probing is sequential: endpoints in caller order, and for each endpoint
//! the candidate paths in configured order. The first acceptable document
//! ends the search, so nothing after it is ever requested. Rounds repeat
//! until the overall timeout, since many services bind their port well
//! before their schema route is mounted.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

use super::error::ProbeError;
use crate::config::EngineConfig;

/// Candidate schema locations, tried in this order.
pub const DEFAULT_CANDIDATE_PATHS: &[&str] = &[
    "/openapi.json",
    "/swagger.json",
    "/docs/openapi.json",
    "/docs.json",
];

/// Upper bound on a schema document's size.
const MAX_SCHEMA_BYTES: usize = 16 * 1024 * 1024;

/// One place a service can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Host the engine connects to.
    pub host: String,
    /// Port reachable from the engine (host-mapped for containers).
    pub probe_port: u16,
    /// Port the service listens on internally; recorded in routes.
    pub service_port: u16,
}

impl ServiceEndpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, probe_port: u16, service_port: u16) -> Self {
        Self {
            host: host.into(),
            probe_port,
            service_port,
        }
    }

    /// Endpoint whose probe and service ports are the same.
    pub fn direct(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, port)
    }

    /// URL of `path` on this endpoint.
    pub fn url(&self, path: &str) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}{}", self.host, self.probe_port, path)
        } else {
            format!("http://{}:{}{}", self.host, self.probe_port, path)
        }
    }
}

/// A schema document accepted by the prober.
#[derive(Debug, Clone)]
pub struct DiscoveredSchema {
    endpoint: ServiceEndpoint,
    candidate_path: String,
    paths: Map<String, Value>,
    /// Everything in the document except `paths`.
    metadata: Map<String, Value>,
}

impl DiscoveredSchema {
    /// Accept `document` if it is an object with an object-valued `paths` key.
    pub fn from_document(
        endpoint: ServiceEndpoint,
        candidate_path: impl Into<String>,
        document: Value,
    ) -> Result<Self, ProbeError> {
        let Value::Object(mut metadata) = document else {
            return Err(ProbeError::MissingPaths);
        };
        match metadata.remove("paths") {
            Some(Value::Object(paths)) => Ok(Self {
                endpoint,
                candidate_path: candidate_path.into(),
                paths,
                metadata,
            }),
            _ => Err(ProbeError::MissingPaths),
        }
    }

    /// The `paths` mapping, in document order.
    pub fn paths(&self) -> &Map<String, Value> {
        &self.paths
    }

    /// Endpoint that served the document.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Candidate path that served the document.
    pub fn candidate_path(&self) -> &str {
        &self.candidate_path
    }

    /// `info.title` from the document, if present.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("info")?.get("title")?.as_str()
    }
}

/// HTTP prober for self-describing API schemas.
pub struct SchemaProber {
    client: Client<HttpConnector, Empty<Bytes>>,
    candidate_paths: Vec<String>,
    request_timeout: Duration,
    retry_interval: Duration,
}

impl SchemaProber {
    /// Create a prober.
    pub fn new(candidate_paths: Vec<String>, request_timeout: Duration, retry_interval: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            candidate_paths,
            request_timeout,
            retry_interval,
        }
    }

    /// Create a prober from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.candidate_paths.clone(),
            config.request_timeout,
            config.probe_retry_interval,
        )
    }

    /// Candidate paths in probe order.
    pub fn candidate_paths(&self) -> &[String] {
        &self.candidate_paths
    }

    /// Probe `endpoints` until a schema is found or `limit` elapses.
    ///
    /// Returns `None` when nothing was found in time. That is a normal
    /// outcome, not an error.
    pub async fn probe(&self, endpoints: &[ServiceEndpoint], limit: Duration) -> Option<DiscoveredSchema> {
        if endpoints.is_empty() || self.candidate_paths.is_empty() {
            return None;
        }

        let start = Instant::now();
        let deadline = start + limit;

        let search = async {
            let mut rounds = 0u32;
            loop {
                rounds += 1;
                if let Some(schema) = self.probe_round(endpoints).await {
                    return Some(schema);
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                debug!(
                    "No schema found in round {}, retrying in {:?}",
                    rounds,
                    self.retry_interval.min(remaining)
                );
                sleep(self.retry_interval.min(remaining)).await;
            }
        };

        let found = timeout(limit, search).await.ok().flatten();
        if found.is_none() {
            info!(
                "No API schema found on {} endpoint(s) after {:?}",
                endpoints.len(),
                start.elapsed()
            );
        }
        found
    }

    /// A single pass over every endpoint and candidate path.
    pub async fn probe_round(&self, endpoints: &[ServiceEndpoint]) -> Option<DiscoveredSchema> {
        for endpoint in endpoints {
            for path in &self.candidate_paths {
                match self.fetch(endpoint, path).await {
                    Ok(schema) => {
                        info!(
                            "Found API schema{} at {} ({} paths)",
                            schema.title().map(|t| format!(" '{t}'")).unwrap_or_default(),
                            endpoint.url(path),
                            schema.paths().len()
                        );
                        return Some(schema);
                    }
                    Err(e) => debug!("Probe of {} failed: {}", endpoint.url(path), e),
                }
            }
        }
        None
    }

    /// Fetch and parse one candidate.
    pub async fn fetch(&self, endpoint: &ServiceEndpoint, path: &str) -> Result<DiscoveredSchema, ProbeError> {
        let url = endpoint.url(path);
        let uri = url.parse::<Uri>().map_err(|e| ProbeError::InvalidUri {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let body = timeout(self.request_timeout, async {
            let response = self.client.get(uri).await.map_err(|e| ProbeError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(ProbeError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }
            let collected = Limited::new(response.into_body(), MAX_SCHEMA_BYTES)
                .collect()
                .await
                .map_err(|e| ProbeError::Body(e.to_string()))?;
            Ok::<Bytes, ProbeError>(collected.to_bytes())
        })
        .await
        .map_err(|_| ProbeError::Timeout {
            url: url.clone(),
            timeout: self.request_timeout,
        })??;

        let document: Value = serde_json::from_slice(&body)?;
        DiscoveredSchema::from_document(endpoint.clone(), path, document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use serde_json::json;
    use tokio::net::TcpListener;

    type Requests = Arc<Mutex<Vec<String>>>;

    /// Serve `routes` (path -> (status, body)) and record every requested path.
    async fn spawn_server(routes: Vec<(&'static str, u16, String)>) -> (u16, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests: Requests = Arc::default();
        let seen = requests.clone();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = seen.clone();
                let routes = routes.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let seen = seen.clone();
                        let routes = routes.clone();
                        async move {
                            let path = req.uri().path().to_string();
                            seen.lock().unwrap().push(path.clone());
                            let (status, body) = routes
                                .iter()
                                .find(|(p, _, _)| *p == path)
                                .map(|(_, s, b)| (*s, b.clone()))
                                .unwrap_or((404, "not found".to_string()));
                            let mut response = Response::new(Full::new(Bytes::from(body)));
                            *response.status_mut() = StatusCode::from_u16(status).unwrap();
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (port, requests)
    }

    fn prober() -> SchemaProber {
        SchemaProber::new(
            DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
            Duration::from_secs(2),
            Duration::from_millis(100),
        )
    }

    fn schema_body() -> String {
        json!({"openapi": "3.0.0", "info": {"title": "demo"}, "paths": {"/predict": {"post": {}}}})
            .to_string()
    }

    #[tokio::test]
    async fn test_stops_at_first_successful_candidate() {
        let (first, first_seen) = spawn_server(vec![("/swagger.json", 200, schema_body())]).await;
        let (second, second_seen) = spawn_server(vec![("/openapi.json", 200, schema_body())]).await;

        let endpoints = vec![
            ServiceEndpoint::new("127.0.0.1", first, 8000),
            ServiceEndpoint::new("127.0.0.1", second, 8001),
        ];
        let schema = prober()
            .probe(&endpoints, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(schema.candidate_path(), "/swagger.json");
        assert_eq!(schema.endpoint().service_port, 8000);
        assert_eq!(
            *first_seen.lock().unwrap(),
            vec!["/openapi.json".to_string(), "/swagger.json".to_string()]
        );
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skips_bad_documents_and_statuses() {
        let (port, seen) = spawn_server(vec![
            ("/openapi.json", 500, schema_body()),
            ("/swagger.json", 200, "not json".to_string()),
            ("/docs/openapi.json", 200, json!({"paths": []}).to_string()),
            ("/docs.json", 200, schema_body()),
        ])
        .await;

        let schema = prober()
            .probe(&[ServiceEndpoint::direct("127.0.0.1", port)], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(schema.candidate_path(), "/docs.json");
        assert_eq!(schema.title(), Some("demo"));
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert!(schema.paths().contains_key("/predict"));
    }

    #[tokio::test]
    async fn test_returns_none_after_timeout() {
        let (port, _seen) = spawn_server(vec![]).await;
        let start = std::time::Instant::now();

        let found = prober()
            .probe(&[ServiceEndpoint::direct("127.0.0.1", port)], Duration::from_millis(500))
            .await;

        assert!(found.is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_reports_status() {
        let (port, _seen) = spawn_server(vec![]).await;
        let err = prober()
            .fetch(&ServiceEndpoint::direct("127.0.0.1", port), "/openapi.json")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Status { status: 404, .. }));
    }

    #[test]
    fn test_from_document_requires_paths_object() {
        let endpoint = ServiceEndpoint::direct("127.0.0.1", 80);
        assert!(DiscoveredSchema::from_document(endpoint.clone(), "/x", json!({"paths": {}})).is_ok());
        assert!(matches!(
            DiscoveredSchema::from_document(endpoint.clone(), "/x", json!({"paths": "nope"})),
            Err(ProbeError::MissingPaths)
        ));
        assert!(DiscoveredSchema::from_document(endpoint, "/x", json!([1, 2])).is_err());
    }

    #[test]
    fn test_endpoint_url_brackets_ipv6() {
        assert_eq!(
            ServiceEndpoint::direct("::1", 8080).url("/openapi.json"),
            "http://[::1]:8080/openapi.json"
        );
        assert_eq!(
            ServiceEndpoint::direct("localhost", 80).url("/docs.json"),
            "http://localhost:80/docs.json"
        );
    }
}
