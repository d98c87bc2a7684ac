//! The block source: a single-node API serving blocks by round, node status, and a
//! wait-for-next-round long poll. Used for recent rounds and tip following.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
	block::BlockResponse,
	constants::HTTP_REQUEST_TIMEOUT,
	error::ClientError,
	retry::{with_retries, RetryPolicy},
	settings::HttpEndpoint,
	transaction::Round,
};

pub const AUTH_HEADER: &str = "X-Algo-API-Token";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeStatus {
	#[serde(rename = "last-round")]
	pub last_round: Round,
	#[serde(rename = "time-since-last-round", default)]
	pub time_since_last_round: u64,
	#[serde(rename = "catchup-time", default)]
	pub catchup_time: u64,
	#[serde(rename = "last-version", default)]
	pub last_version: Option<String>,
	#[serde(rename = "next-version", default)]
	pub next_version: Option<String>,
	#[serde(rename = "next-version-round", default)]
	pub next_version_round: Option<Round>,
	#[serde(rename = "next-version-supported", default)]
	pub next_version_supported: Option<bool>,
	#[serde(rename = "stopped-at-unsupported-round", default)]
	pub stopped_at_unsupported_round: Option<bool>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlgodApi: Send + Sync {
	async fn status(&self) -> Result<NodeStatus, ClientError>;

	async fn block(&self, round: Round) -> Result<BlockResponse, ClientError>;

	/// Long-polls until a round strictly greater than `round` is available. The node bounds
	/// the wait on its side; callers apply their own timeout on top.
	async fn status_after_block(&self, round: Round) -> Result<NodeStatus, ClientError>;
}

pub struct AlgodHttpClient {
	base_url: Url,
	auth_token: Option<String>,
	client: reqwest::Client,
	retry_policy: RetryPolicy,
}

impl AlgodHttpClient {
	pub fn new(endpoint: &HttpEndpoint) -> Result<Self, ClientError> {
		let base_url = Url::parse(&endpoint.http_endpoint)
			.map_err(|e| ClientError::Network(format!("invalid algod endpoint: {e}")))?;
		let client = reqwest::Client::builder()
			.timeout(HTTP_REQUEST_TIMEOUT)
			.build()
			.map_err(|e| ClientError::Network(e.to_string()))?;

		Ok(Self {
			base_url,
			auth_token: endpoint.auth_token.clone(),
			client,
			retry_policy: RetryPolicy::default(),
		})
	}

	async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
		let url = self
			.base_url
			.join(path)
			.map_err(|e| ClientError::Network(format!("invalid path {path}: {e}")))?;

		let mut request = self.client.get(url);
		if let Some(token) = &self.auth_token {
			request = request.header(AUTH_HEADER, token.as_str());
		}

		let response =
			request.send().await.map_err(|e| ClientError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(ClientError::Api { status: status.as_u16(), body });
		}

		response.json::<T>().await.map_err(|e| ClientError::Network(e.to_string()))
	}
}

#[async_trait]
impl AlgodApi for AlgodHttpClient {
	async fn status(&self) -> Result<NodeStatus, ClientError> {
		with_retries("algod status", self.retry_policy, || self.get("v2/status")).await
	}

	async fn block(&self, round: Round) -> Result<BlockResponse, ClientError> {
		if round == 0 {
			return Err(ClientError::InvalidRound(round));
		}
		let path = format!("v2/blocks/{round}?format=json");
		with_retries("algod block", self.retry_policy, || self.get(&path)).await.map_err(|e| {
			match e {
				// A block past the ledger's tip comes back as not-found.
				ClientError::Api { status: 404, .. } => ClientError::InvalidRound(round),
				other => other,
			}
		})
	}

	async fn status_after_block(&self, round: Round) -> Result<NodeStatus, ClientError> {
		// No request retries here; the caller owns the timeout and the re-poll loop.
		self.get(&format!("v2/status/wait-for-block-after/{round}")).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_client() -> AlgodHttpClient {
		AlgodHttpClient::new(&HttpEndpoint {
			http_endpoint: "http://localhost:4001".to_string(),
			auth_token: Some("a".repeat(64)),
		})
		.unwrap()
	}

	#[tokio::test]
	async fn rejects_round_zero_without_touching_the_network() {
		assert!(matches!(test_client().block(0).await, Err(ClientError::InvalidRound(0))));
	}

	#[test]
	fn parses_node_status() {
		let status: NodeStatus = serde_json::from_str(
			r#"{
				"last-round": 44000000,
				"time-since-last-round": 1200000,
				"catchup-time": 0,
				"last-version": "https://github.com/algorandfoundation/specs/tree/abc"
			}"#,
		)
		.unwrap();
		assert_eq!(status.last_round, 44_000_000);
		assert_eq!(status.catchup_time, 0);
		assert!(status.next_version.is_none());
	}
}
