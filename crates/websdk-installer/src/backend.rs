//! Backend calls made on the integration's behalf: the fetch proxy and
//! agent key issuance.

use async_trait::async_trait;
use serde_json::{Value, json};
use websdk_core::{FetchRequest, FetchResponse};

const FETCH_QUERY: &str = "query fetch($url: String!, $method: String, $headers: [AgentFetchHeaderInput!]) {
	custom {
		agent {
			fetch(method: $method, url: $url, headers: $headers) {
				statusCode
				body
				headers {
					key
					value
				}
			}
		}
	}
}";

const PRIVATE_KEY_QUERY: &str = "query privatekey {
	custom {
		agent {
			privateKey
		}
	}
}";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// First entry of a GraphQL `errors` array.
    #[error("{0}")]
    Graphql(String),
    #[error("backend response is missing {0}")]
    MissingField(&'static str),
}

/// Network access that must not originate from the sandboxed frame.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Perform `request` from the backend. Headers are already scrubbed.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, BackendError>;

    /// Issue a new private key for a self-managed agent.
    async fn create_private_key(&self) -> Result<String, BackendError>;
}

/// [`AgentBackend`] over the platform's GraphQL API.
#[derive(Debug, Clone)]
pub struct GraphqlBackend {
    client: reqwest::Client,
    url: String,
}

impl GraphqlBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Run a query. Returns `data` on success (the whole body when there is
    /// no `data`) and the HTTP status.
    pub async fn query(&self, query: &str, variables: Value) -> Result<(Value, u16), BackendError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body: Value = response.json().await?;

        if let Some(message) = first_error(&body) {
            return Err(BackendError::Graphql(message));
        }
        let data = match body.get("data") {
            Some(data) if status == 200 && !data.is_null() => data.clone(),
            _ => body,
        };
        Ok((data, status))
    }
}

fn first_error(body: &Value) -> Option<String> {
    let first = body.get("errors")?.as_array()?.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown GraphQL error")
            .to_string(),
    )
}

/// Map `custom.agent.fetch` from a query result, falling back to the HTTP
/// status when the backend omitted its own.
fn fetch_response(data: &Value, http_status: u16) -> FetchResponse {
    let fetched = data.pointer("/custom/agent/fetch");
    let field = |name: &str| fetched.and_then(|f| f.get(name));
    FetchResponse {
        status_code: field("statusCode")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(http_status),
        headers: field("headers")
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default(),
        body: field("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

#[async_trait]
impl AgentBackend for GraphqlBackend {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, BackendError> {
        let variables = json!({
            "url": request.url,
            "method": request.method,
            "headers": request.header_list(),
        });
        let (data, status) = self.query(FETCH_QUERY, variables).await?;
        Ok(fetch_response(&data, status))
    }

    async fn create_private_key(&self) -> Result<String, BackendError> {
        let (data, _) = self.query(PRIVATE_KEY_QUERY, json!({})).await?;
        data.pointer("/custom/agent/privateKey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(BackendError::MissingField("custom.agent.privateKey"))
    }
}
