//! Blocking connectors for the cypher endpoint.
//!
//! Retry policy (fixed, configured at construction): a transport error gets
//! exactly one immediate retry after a short delay — timeouts wait a beat
//! longer than refused sockets — then the error propagates. Pages larger
//! than [`THROTTLE_ROWS`] trigger a cooperative sleep so a long paginated
//! run does not monopolize the shared store.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use url::Url;

use crate::protocol::ResultSet;
use crate::ClientError;

/// Result pages above this row count trigger the throttle sleep.
pub const THROTTLE_ROWS: usize = 100;

const SOCKET_RETRY_DELAY: Duration = Duration::from_millis(100);
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(1);
const THROTTLE_SLEEP: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment variables carrying the out-of-band server configuration.
pub const SERVER_ENV: &str = "TRAITBANK_SERVER";
pub const TOKEN_ENV: &str = "TRAITBANK_TOKEN";

/// The blocking query seam every component takes by reference.
pub trait GraphConnector {
    fn run(&self, query: &str) -> Result<ResultSet, ClientError>;
}

/// HTTP connector for the `service/cypher` endpoint.
pub struct HttpConnector {
    endpoint: Url,
    token: Option<String>,
    client: Client,
}

impl HttpConnector {
    pub fn new(server: &str, token: Option<String>) -> Result<HttpConnector, ClientError> {
        let base = Url::parse(server).map_err(|e| ClientError::BadUrl(e.to_string()))?;
        let endpoint = base
            .join("service/cypher")
            .map_err(|e| ClientError::BadUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(HttpConnector { endpoint, token, client })
    }

    /// Build a connector from `TRAITBANK_SERVER` / `TRAITBANK_TOKEN`.
    pub fn from_env() -> Result<HttpConnector, ClientError> {
        let server = std::env::var(SERVER_ENV)
            .map_err(|_| ClientError::BadUrl(format!("{SERVER_ENV} is not set")))?;
        let token = std::env::var(TOKEN_ENV).ok();
        if token.is_none() {
            tracing::warn!("no {TOKEN_ENV} provided; querying unauthenticated");
        }
        HttpConnector::new(&server, token)
    }

    fn request_once(&self, query: &str) -> Result<ResultSet, ClientError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("query", query);
        let mut req = self.client.get(url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("JWT {token}"));
        }
        let resp = req.send().map_err(classify_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        let parsed: ResultSet = resp.json().map_err(classify_transport)?;
        Ok(parsed)
    }
}

fn classify_transport(e: reqwest::Error) -> ClientError {
    if e.is_decode() {
        // Body arrived but was not a result set.
        return ClientError::Transport(format!("bad response body: {e}"));
    }
    ClientError::Transport(e.to_string())
}

impl GraphConnector for HttpConnector {
    fn run(&self, query: &str) -> Result<ResultSet, ClientError> {
        let start = Instant::now();
        let result = match self.request_once(query) {
            Ok(rs) => Ok(rs),
            Err(e @ ClientError::Transport(_)) => {
                let delay = if e.to_string().contains("timed out") {
                    TIMEOUT_RETRY_DELAY
                } else {
                    SOCKET_RETRY_DELAY
                };
                tracing::error!(error = %e, "query transport failure; retrying once");
                thread::sleep(delay);
                self.request_once(query)
            }
            Err(e) => Err(e),
        };
        match &result {
            Ok(rs) => {
                tracing::debug!(elapsed = ?start.elapsed(), rows = rs.len(), "query ok: {query}");
                if rs.len() > THROTTLE_ROWS {
                    thread::sleep(THROTTLE_SLEEP);
                }
            }
            Err(e) => tracing::error!(error = %e, "query failed: {query}"),
        }
        result
    }
}
