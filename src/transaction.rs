use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::SubscriberError;

/// A monotonically increasing ordinal identifying a single finalized ledger step.
pub type Round = u64;

/// Asset id `0` denotes the native asset.
pub const NATIVE_ASSET_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionType {
	#[serde(rename = "pay")]
	Payment,
	#[serde(rename = "axfer")]
	AssetTransfer,
	#[serde(rename = "acfg")]
	AssetConfig,
	#[serde(rename = "appl")]
	ApplicationCall,
	#[serde(rename = "keyreg")]
	KeyRegistration,
	#[serde(rename = "afrz")]
	AssetFreeze,
}

impl TransactionType {
	pub fn wire_value(&self) -> &'static str {
		match self {
			TransactionType::Payment => "pay",
			TransactionType::AssetTransfer => "axfer",
			TransactionType::AssetConfig => "acfg",
			TransactionType::ApplicationCall => "appl",
			TransactionType::KeyRegistration => "keyreg",
			TransactionType::AssetFreeze => "afrz",
		}
	}
}

impl FromStr for TransactionType {
	type Err = SubscriberError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"pay" => TransactionType::Payment,
			"axfer" => TransactionType::AssetTransfer,
			"acfg" => TransactionType::AssetConfig,
			"appl" => TransactionType::ApplicationCall,
			"keyreg" => TransactionType::KeyRegistration,
			"afrz" => TransactionType::AssetFreeze,
			other => {
				return Err(SubscriberError::Configuration(format!(
					"unknown transaction type {other:?}"
				)))
			},
		})
	}
}

impl fmt::Display for TransactionType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.wire_value())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OnCompletion {
	#[serde(rename = "noop")]
	NoOp,
	#[serde(rename = "optin")]
	OptIn,
	#[serde(rename = "closeout")]
	CloseOut,
	#[serde(rename = "clearstate")]
	ClearState,
	#[serde(rename = "updateapplication")]
	UpdateApplication,
	#[serde(rename = "deleteapplication")]
	DeleteApplication,
}

impl OnCompletion {
	/// The block source encodes on-completion as an integer.
	pub fn from_wire_index(index: u64) -> Option<Self> {
		Some(match index {
			0 => OnCompletion::NoOp,
			1 => OnCompletion::OptIn,
			2 => OnCompletion::CloseOut,
			3 => OnCompletion::ClearState,
			4 => OnCompletion::UpdateApplication,
			5 => OnCompletion::DeleteApplication,
			_ => return None,
		})
	}
}

impl Default for OnCompletion {
	fn default() -> Self {
		OnCompletion::NoOp
	}
}

/// How the subscriber catches up when the watermark is behind the tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncBehaviour {
	#[serde(rename = "catchup-with-indexer")]
	CatchupWithIndexer,
	#[serde(rename = "sync-oldest")]
	SyncOldest,
	#[serde(rename = "sync-oldest-start-now")]
	SyncOldestStartNow,
	#[serde(rename = "skip-sync-newest")]
	SkipSyncNewest,
	#[serde(rename = "fail")]
	Fail,
}

impl FromStr for SyncBehaviour {
	type Err = SubscriberError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"catchup-with-indexer" => SyncBehaviour::CatchupWithIndexer,
			"sync-oldest" => SyncBehaviour::SyncOldest,
			"sync-oldest-start-now" => SyncBehaviour::SyncOldestStartNow,
			"skip-sync-newest" => SyncBehaviour::SkipSyncNewest,
			"fail" => SyncBehaviour::Fail,
			other => {
				return Err(SubscriberError::Configuration(format!(
					"unrecognised sync behaviour {other:?}"
				)))
			},
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BalanceChangeRole {
	Sender,
	Receiver,
	CloseTo,
	AssetCreator,
	AssetDestroyer,
}

/// A synthesized signed delta for one `(address, asset)` pair, covering the transaction and
/// its entire inner-transaction subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
	pub address: String,
	#[serde(rename = "asset-id")]
	pub asset_id: u64,
	pub amount: i128,
	pub roles: Vec<BalanceChangeRole>,
}

/// A decoded ABI value as surfaced in ARC-28 event arguments. Byte-like values are carried
/// base-64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbiValue {
	Uint(u64),
	Bytes(String),
	Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc28Event {
	#[serde(rename = "group-name")]
	pub group_name: String,
	#[serde(rename = "event-name")]
	pub event_name: String,
	pub signature: String,
	pub args: BTreeMap<String, AbiValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFields {
	pub receiver: String,
	pub amount: u64,
	#[serde(rename = "close-remainder-to", skip_serializing_if = "Option::is_none", default)]
	pub close_remainder_to: Option<String>,
	#[serde(rename = "close-amount", skip_serializing_if = "Option::is_none", default)]
	pub close_amount: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTransferFields {
	#[serde(rename = "asset-id")]
	pub asset_id: u64,
	pub amount: u64,
	pub receiver: String,
	#[serde(rename = "asset-sender", skip_serializing_if = "Option::is_none", default)]
	pub asset_sender: Option<String>,
	#[serde(rename = "close-to", skip_serializing_if = "Option::is_none", default)]
	pub close_to: Option<String>,
	#[serde(rename = "close-amount", skip_serializing_if = "Option::is_none", default)]
	pub close_amount: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetParams {
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub decimals: u32,
	#[serde(rename = "default-frozen", skip_serializing_if = "Option::is_none", default)]
	pub default_frozen: Option<bool>,
	#[serde(rename = "unit-name", skip_serializing_if = "Option::is_none", default)]
	pub unit_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub url: Option<String>,
	#[serde(rename = "metadata-hash", skip_serializing_if = "Option::is_none", default)]
	pub metadata_hash: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub manager: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub reserve: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub freeze: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub clawback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfigFields {
	#[serde(rename = "asset-id", skip_serializing_if = "Option::is_none", default)]
	pub asset_id: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub params: Option<AssetParams>,
	#[serde(rename = "created-asset-index", skip_serializing_if = "Option::is_none", default)]
	pub created_asset_index: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
	#[serde(rename = "num-uint", default)]
	pub num_uint: u64,
	#[serde(rename = "num-byte-slice", default)]
	pub num_byte_slice: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFields {
	#[serde(rename = "application-id", default)]
	pub application_id: u64,
	#[serde(rename = "on-completion", default)]
	pub on_completion: OnCompletion,
	#[serde(rename = "application-args", skip_serializing_if = "Vec::is_empty", default)]
	pub application_args: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub accounts: Vec<String>,
	#[serde(rename = "foreign-apps", skip_serializing_if = "Vec::is_empty", default)]
	pub foreign_apps: Vec<u64>,
	#[serde(rename = "foreign-assets", skip_serializing_if = "Vec::is_empty", default)]
	pub foreign_assets: Vec<u64>,
	#[serde(rename = "approval-program", skip_serializing_if = "Option::is_none", default)]
	pub approval_program: Option<String>,
	#[serde(rename = "clear-state-program", skip_serializing_if = "Option::is_none", default)]
	pub clear_state_program: Option<String>,
	#[serde(rename = "global-state-schema", skip_serializing_if = "Option::is_none", default)]
	pub global_state_schema: Option<StateSchema>,
	#[serde(rename = "local-state-schema", skip_serializing_if = "Option::is_none", default)]
	pub local_state_schema: Option<StateSchema>,
	#[serde(rename = "extra-program-pages", skip_serializing_if = "Option::is_none", default)]
	pub extra_program_pages: Option<u64>,
	#[serde(
		rename = "created-application-index",
		skip_serializing_if = "Option::is_none",
		default
	)]
	pub created_application_index: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub logs: Option<Vec<String>>,
	#[serde(rename = "global-state-delta", skip_serializing_if = "Option::is_none", default)]
	pub global_state_delta: Option<serde_json::Value>,
	#[serde(rename = "local-state-delta", skip_serializing_if = "Option::is_none", default)]
	pub local_state_delta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRegistrationFields {
	#[serde(rename = "vote-participation-key", skip_serializing_if = "Option::is_none", default)]
	pub vote_participation_key: Option<String>,
	#[serde(
		rename = "selection-participation-key",
		skip_serializing_if = "Option::is_none",
		default
	)]
	pub selection_participation_key: Option<String>,
	#[serde(rename = "vote-first-valid", skip_serializing_if = "Option::is_none", default)]
	pub vote_first_valid: Option<u64>,
	#[serde(rename = "vote-last-valid", skip_serializing_if = "Option::is_none", default)]
	pub vote_last_valid: Option<u64>,
	#[serde(rename = "vote-key-dilution", skip_serializing_if = "Option::is_none", default)]
	pub vote_key_dilution: Option<u64>,
	#[serde(rename = "non-participation", default)]
	pub non_participation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFreezeFields {
	#[serde(rename = "asset-id")]
	pub asset_id: u64,
	pub address: String,
	#[serde(rename = "new-freeze-status")]
	pub new_freeze_status: bool,
}

/// The type-qualified payload of a canonical transaction. Serialized as the single
/// `<type>-transaction` key the history source uses on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionPayload {
	#[serde(rename = "payment-transaction")]
	Payment(PaymentFields),
	#[serde(rename = "asset-transfer-transaction")]
	AssetTransfer(AssetTransferFields),
	#[serde(rename = "asset-config-transaction")]
	AssetConfig(AssetConfigFields),
	#[serde(rename = "application-transaction")]
	ApplicationCall(ApplicationFields),
	#[serde(rename = "keyreg-transaction")]
	KeyRegistration(KeyRegistrationFields),
	#[serde(rename = "asset-freeze-transaction")]
	AssetFreeze(AssetFreezeFields),
}

impl TransactionPayload {
	pub fn transaction_type(&self) -> TransactionType {
		match self {
			TransactionPayload::Payment(_) => TransactionType::Payment,
			TransactionPayload::AssetTransfer(_) => TransactionType::AssetTransfer,
			TransactionPayload::AssetConfig(_) => TransactionType::AssetConfig,
			TransactionPayload::ApplicationCall(_) => TransactionType::ApplicationCall,
			TransactionPayload::KeyRegistration(_) => TransactionType::KeyRegistration,
			TransactionPayload::AssetFreeze(_) => TransactionType::AssetFreeze,
		}
	}

	pub fn payment(&self) -> Option<&PaymentFields> {
		match self {
			TransactionPayload::Payment(fields) => Some(fields),
			_ => None,
		}
	}

	pub fn asset_transfer(&self) -> Option<&AssetTransferFields> {
		match self {
			TransactionPayload::AssetTransfer(fields) => Some(fields),
			_ => None,
		}
	}

	pub fn asset_config(&self) -> Option<&AssetConfigFields> {
		match self {
			TransactionPayload::AssetConfig(fields) => Some(fields),
			_ => None,
		}
	}

	pub fn application(&self) -> Option<&ApplicationFields> {
		match self {
			TransactionPayload::ApplicationCall(fields) => Some(fields),
			_ => None,
		}
	}

	pub fn application_mut(&mut self) -> Option<&mut ApplicationFields> {
		match self {
			TransactionPayload::ApplicationCall(fields) => Some(fields),
			_ => None,
		}
	}
}

/// The canonical per-transaction record the engine produces and filters on. Field names on
/// the wire are the long-form names used by the history source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	/// Inner transactions arrive from the history source without an id; the normalizer
	/// derives one before the record leaves the engine.
	#[serde(default)]
	pub id: String,
	#[serde(rename = "tx-type")]
	pub tx_type: TransactionType,
	pub sender: String,
	#[serde(rename = "confirmed-round", default)]
	pub confirmed_round: Round,
	#[serde(rename = "round-time", default)]
	pub round_time: i64,
	#[serde(default)]
	pub fee: u64,
	#[serde(rename = "first-valid", default)]
	pub first_valid: u64,
	#[serde(rename = "last-valid", default)]
	pub last_valid: u64,
	#[serde(rename = "genesis-id", skip_serializing_if = "Option::is_none", default)]
	pub genesis_id: Option<String>,
	#[serde(rename = "genesis-hash", skip_serializing_if = "Option::is_none", default)]
	pub genesis_hash: Option<String>,
	#[serde(rename = "intra-round-offset", default)]
	pub intra_round_offset: u64,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub group: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub lease: Option<String>,
	#[serde(rename = "rekey-to", skip_serializing_if = "Option::is_none", default)]
	pub rekey_to: Option<String>,
	/// Opaque bytes, base-64 encoded exactly as received from upstream.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub note: Option<String>,
	#[serde(flatten)]
	pub payload: TransactionPayload,
	#[serde(rename = "inner-txns", skip_serializing_if = "Vec::is_empty", default)]
	pub inner_txns: Vec<Transaction>,
	/// Synthesized; never received from upstream.
	#[serde(rename = "balance-changes", skip_serializing_if = "Vec::is_empty", default)]
	pub balance_changes: Vec<BalanceChange>,
	/// Synthesized from the application call's logs.
	#[serde(rename = "arc28-events", skip_serializing_if = "Vec::is_empty", default)]
	pub arc28_events: Vec<Arc28Event>,
}

impl Transaction {
	/// The amount the transaction moves, for the types that carry one.
	pub fn amount(&self) -> Option<u64> {
		match &self.payload {
			TransactionPayload::Payment(pay) => Some(pay.amount),
			TransactionPayload::AssetTransfer(axfer) => Some(axfer.amount),
			_ => None,
		}
	}

	/// The receiving address, for the types that carry one.
	pub fn receiver(&self) -> Option<&str> {
		match &self.payload {
			TransactionPayload::Payment(pay) => Some(&pay.receiver),
			TransactionPayload::AssetTransfer(axfer) => Some(&axfer.receiver),
			_ => None,
		}
	}

	/// The asset the transaction operates on, for the types that reference one.
	pub fn asset_id(&self) -> Option<u64> {
		match &self.payload {
			TransactionPayload::AssetTransfer(axfer) => Some(axfer.asset_id),
			TransactionPayload::AssetConfig(acfg) => acfg.asset_id,
			TransactionPayload::AssetFreeze(afrz) => Some(afrz.asset_id),
			_ => None,
		}
	}

	pub fn created_application_index(&self) -> Option<u64> {
		self.payload.application().and_then(|appl| appl.created_application_index)
	}

	pub fn created_asset_index(&self) -> Option<u64> {
		self.payload.asset_config().and_then(|acfg| acfg.created_asset_index)
	}

	/// Walks the transaction and its inner subtree depth-first, parents before children,
	/// siblings in source order.
	pub fn iter_tree(&self) -> impl Iterator<Item = &Transaction> {
		let mut stack = vec![self];
		std::iter::from_fn(move || {
			let next = stack.pop()?;
			stack.extend(next.inner_txns.iter().rev());
			Some(next)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pay_transaction() -> Transaction {
		Transaction {
			id: "TXID1".to_string(),
			tx_type: TransactionType::Payment,
			sender: "SENDER".to_string(),
			confirmed_round: 1001,
			round_time: 1_700_000_000,
			fee: 1000,
			first_valid: 1000,
			last_valid: 2000,
			genesis_id: Some("testnet-v1.0".to_string()),
			genesis_hash: None,
			intra_round_offset: 0,
			group: None,
			lease: None,
			rekey_to: None,
			note: None,
			payload: TransactionPayload::Payment(PaymentFields {
				receiver: "RECEIVER".to_string(),
				amount: 5000,
				..Default::default()
			}),
			inner_txns: vec![],
			balance_changes: vec![],
			arc28_events: vec![],
		}
	}

	#[test]
	fn payload_serializes_under_wire_key() {
		let value = serde_json::to_value(pay_transaction()).unwrap();
		assert_eq!(value["tx-type"], "pay");
		assert_eq!(value["payment-transaction"]["receiver"], "RECEIVER");
		assert_eq!(value["payment-transaction"]["amount"], 5000);
		assert!(value.get("asset-transfer-transaction").is_none());
	}

	#[test]
	fn round_trips_through_wire_shape() {
		let tx = pay_transaction();
		let json = serde_json::to_string(&tx).unwrap();
		assert_eq!(serde_json::from_str::<Transaction>(&json).unwrap(), tx);
	}

	#[test]
	fn tree_iteration_is_depth_first_in_source_order() {
		let mut parent = pay_transaction();
		let mut first_child = pay_transaction();
		first_child.id = "CHILD1".to_string();
		let mut grandchild = pay_transaction();
		grandchild.id = "GRANDCHILD".to_string();
		first_child.inner_txns.push(grandchild);
		let mut second_child = pay_transaction();
		second_child.id = "CHILD2".to_string();
		parent.inner_txns = vec![first_child, second_child];

		assert_eq!(
			parent.iter_tree().map(|tx| tx.id.as_str()).collect::<Vec<_>>(),
			vec!["TXID1", "CHILD1", "GRANDCHILD", "CHILD2"]
		);
	}

	#[test]
	fn sync_behaviour_parses_wire_values() {
		assert_eq!(
			"catchup-with-indexer".parse::<SyncBehaviour>().unwrap(),
			SyncBehaviour::CatchupWithIndexer
		);
		assert_eq!("sync-oldest".parse::<SyncBehaviour>().unwrap(), SyncBehaviour::SyncOldest);
		assert!("sync-newest".parse::<SyncBehaviour>().is_err());
	}
}
