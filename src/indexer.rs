//! The history source: a query-oriented index over past transactions, searched per round
//! range with coarse pre-filter hints and an opaque continuation cursor.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
	constants::HTTP_REQUEST_TIMEOUT,
	error::ClientError,
	retry::{with_retries, RetryPolicy},
	settings::HttpEndpoint,
	transaction::{Round, TransactionType},
};

pub const AUTH_HEADER: &str = "X-Indexer-API-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRole {
	Sender,
	Receiver,
	FreezeTarget,
}

impl AddressRole {
	pub fn wire_value(&self) -> &'static str {
		match self {
			AddressRole::Sender => "sender",
			AddressRole::Receiver => "receiver",
			AddressRole::FreezeTarget => "freeze-target",
		}
	}
}

/// Query parameters for a transaction search. Every field is an optional *pre-filter* hint;
/// absent fields are simply omitted from the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionSearchParams {
	pub min_round: Option<Round>,
	pub max_round: Option<Round>,
	pub address: Option<String>,
	pub address_role: Option<AddressRole>,
	pub tx_type: Option<TransactionType>,
	pub asset_id: Option<u64>,
	pub application_id: Option<u64>,
	/// Base-64 encoded prefix of the note field.
	pub note_prefix: Option<String>,
	pub currency_greater_than: Option<u64>,
	pub currency_less_than: Option<u64>,
	pub limit: Option<u64>,
	/// Continuation token from the previous page.
	pub next: Option<String>,
}

impl TransactionSearchParams {
	fn query_pairs(&self) -> Vec<(&'static str, String)> {
		let mut pairs = Vec::new();
		if let Some(v) = self.min_round {
			pairs.push(("min-round", v.to_string()));
		}
		if let Some(v) = self.max_round {
			pairs.push(("max-round", v.to_string()));
		}
		if let Some(v) = &self.address {
			pairs.push(("address", v.clone()));
		}
		if let Some(v) = self.address_role {
			pairs.push(("address-role", v.wire_value().to_string()));
		}
		if let Some(v) = self.tx_type {
			pairs.push(("tx-type", v.wire_value().to_string()));
		}
		if let Some(v) = self.asset_id {
			pairs.push(("asset-id", v.to_string()));
		}
		if let Some(v) = self.application_id {
			pairs.push(("application-id", v.to_string()));
		}
		if let Some(v) = &self.note_prefix {
			pairs.push(("note-prefix", v.clone()));
		}
		if let Some(v) = self.currency_greater_than {
			pairs.push(("currency-greater-than", v.to_string()));
		}
		if let Some(v) = self.currency_less_than {
			pairs.push(("currency-less-than", v.to_string()));
		}
		if let Some(v) = self.limit {
			pairs.push(("limit", v.to_string()));
		}
		if let Some(v) = &self.next {
			pairs.push(("next", v.clone()));
		}
		pairs
	}
}

/// One page of search results. Transactions are returned in the source's long-form wire
/// shape and normalized by the caller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionSearchPage {
	#[serde(rename = "current-round", default)]
	pub current_round: Round,
	#[serde(rename = "next-token", default)]
	pub next_token: Option<String>,
	#[serde(default)]
	pub transactions: Vec<serde_json::Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexerApi: Send + Sync {
	async fn search_transactions(
		&self,
		params: &TransactionSearchParams,
	) -> Result<TransactionSearchPage, ClientError>;
}

pub struct IndexerHttpClient {
	base_url: Url,
	auth_token: Option<String>,
	client: reqwest::Client,
	retry_policy: RetryPolicy,
}

impl IndexerHttpClient {
	pub fn new(endpoint: &HttpEndpoint) -> Result<Self, ClientError> {
		let base_url = Url::parse(&endpoint.http_endpoint)
			.map_err(|e| ClientError::Network(format!("invalid indexer endpoint: {e}")))?;
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
}

#[async_trait]
impl IndexerApi for IndexerHttpClient {
	async fn search_transactions(
		&self,
		params: &TransactionSearchParams,
	) -> Result<TransactionSearchPage, ClientError> {
		let url = self
			.base_url
			.join("v2/transactions")
			.map_err(|e| ClientError::Network(e.to_string()))?;

		with_retries("indexer search_transactions", self.retry_policy, || {
			let mut request = self.client.get(url.clone()).query(&params.query_pairs());
			if let Some(token) = &self.auth_token {
				request = request.header(AUTH_HEADER, token.as_str());
			}
			async move {
				let response =
					request.send().await.map_err(|e| ClientError::Network(e.to_string()))?;

				let status = response.status();
				if !status.is_success() {
					let body = response.text().await.unwrap_or_default();
					return Err(ClientError::Api { status: status.as_u16(), body });
				}

				response
					.json::<TransactionSearchPage>()
					.await
					.map_err(|e| ClientError::Network(e.to_string()))
			}
		})
		.await
	}
}
