//! Raw block-shaped data as returned by the block source, with its compact, type-qualified
//! field names. Converted to the canonical model by [`crate::normalize`].

use serde::{Deserialize, Serialize};

use crate::transaction::Round;

/// The envelope returned by the block endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResponse {
	pub block: RawBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
	#[serde(rename = "rnd", default)]
	pub round: Round,
	#[serde(rename = "ts", default)]
	pub timestamp: i64,
	#[serde(rename = "gen", skip_serializing_if = "Option::is_none", default)]
	pub genesis_id: Option<String>,
	#[serde(rename = "gh", skip_serializing_if = "Option::is_none", default)]
	pub genesis_hash: Option<String>,
	#[serde(rename = "txns", skip_serializing_if = "Vec::is_empty", default)]
	pub transactions: Vec<RawSignedTransaction>,
}

/// A signed transaction in a block, together with its apply data. Creation indices appear
/// at this level rather than inside the transaction body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignedTransaction {
	#[serde(rename = "txn")]
	pub txn: RawTransaction,
	#[serde(rename = "dt", skip_serializing_if = "Option::is_none", default)]
	pub apply_data: Option<RawApplyData>,
	#[serde(rename = "caid", skip_serializing_if = "Option::is_none", default)]
	pub created_asset_index: Option<u64>,
	#[serde(rename = "apid", skip_serializing_if = "Option::is_none", default)]
	pub created_application_index: Option<u64>,
	#[serde(rename = "hgi", skip_serializing_if = "Option::is_none", default)]
	pub has_genesis_id: Option<bool>,
	/// Present when the source precomputes the transaction id.
	#[serde(rename = "txid", skip_serializing_if = "Option::is_none", default)]
	pub txid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawApplyData {
	#[serde(rename = "itx", skip_serializing_if = "Vec::is_empty", default)]
	pub inner_txns: Vec<RawSignedTransaction>,
	#[serde(rename = "lg", skip_serializing_if = "Option::is_none", default)]
	pub logs: Option<Vec<String>>,
	#[serde(rename = "gd", skip_serializing_if = "Option::is_none", default)]
	pub global_state_delta: Option<serde_json::Value>,
	#[serde(rename = "ld", skip_serializing_if = "Option::is_none", default)]
	pub local_state_delta: Option<serde_json::Value>,
}

/// The block source's on-completion encoding: an integer index on some deployments, the
/// canonical string on others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOnCompletion {
	Index(u64),
	Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStateSchema {
	#[serde(rename = "nui", default)]
	pub num_uint: u64,
	#[serde(rename = "nbs", default)]
	pub num_byte_slice: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAssetParams {
	#[serde(rename = "t", default)]
	pub total: u64,
	#[serde(rename = "dc", default)]
	pub decimals: u32,
	#[serde(rename = "df", skip_serializing_if = "Option::is_none", default)]
	pub default_frozen: Option<bool>,
	#[serde(rename = "un", skip_serializing_if = "Option::is_none", default)]
	pub unit_name: Option<String>,
	#[serde(rename = "an", skip_serializing_if = "Option::is_none", default)]
	pub name: Option<String>,
	#[serde(rename = "au", skip_serializing_if = "Option::is_none", default)]
	pub url: Option<String>,
	#[serde(rename = "am", skip_serializing_if = "Option::is_none", default)]
	pub metadata_hash: Option<String>,
	#[serde(rename = "m", skip_serializing_if = "Option::is_none", default)]
	pub manager: Option<String>,
	#[serde(rename = "r", skip_serializing_if = "Option::is_none", default)]
	pub reserve: Option<String>,
	#[serde(rename = "f", skip_serializing_if = "Option::is_none", default)]
	pub freeze: Option<String>,
	#[serde(rename = "c", skip_serializing_if = "Option::is_none", default)]
	pub clawback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
	#[serde(rename = "type")]
	pub tx_type: String,
	#[serde(rename = "snd", skip_serializing_if = "Option::is_none", default)]
	pub sender: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub fee: Option<u64>,
	#[serde(rename = "fv", skip_serializing_if = "Option::is_none", default)]
	pub first_valid: Option<u64>,
	#[serde(rename = "lv", skip_serializing_if = "Option::is_none", default)]
	pub last_valid: Option<u64>,
	#[serde(rename = "gen", skip_serializing_if = "Option::is_none", default)]
	pub genesis_id: Option<String>,
	#[serde(rename = "gh", skip_serializing_if = "Option::is_none", default)]
	pub genesis_hash: Option<String>,
	#[serde(rename = "grp", skip_serializing_if = "Option::is_none", default)]
	pub group: Option<String>,
	#[serde(rename = "lx", skip_serializing_if = "Option::is_none", default)]
	pub lease: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub note: Option<String>,
	#[serde(rename = "rekey", skip_serializing_if = "Option::is_none", default)]
	pub rekey_to: Option<String>,

	// pay
	#[serde(rename = "rcv", skip_serializing_if = "Option::is_none", default)]
	pub receiver: Option<String>,
	#[serde(rename = "amt", skip_serializing_if = "Option::is_none", default)]
	pub amount: Option<u64>,
	#[serde(rename = "camt", skip_serializing_if = "Option::is_none", default)]
	pub close_amount: Option<u64>,
	#[serde(rename = "close", skip_serializing_if = "Option::is_none", default)]
	pub close_remainder_to: Option<String>,

	// axfer
	#[serde(rename = "xaid", skip_serializing_if = "Option::is_none", default)]
	pub asset_transfer_asset_id: Option<u64>,
	#[serde(rename = "aamt", skip_serializing_if = "Option::is_none", default)]
	pub asset_amount: Option<u64>,
	#[serde(rename = "arcv", skip_serializing_if = "Option::is_none", default)]
	pub asset_receiver: Option<String>,
	#[serde(rename = "asnd", skip_serializing_if = "Option::is_none", default)]
	pub asset_sender: Option<String>,
	#[serde(rename = "aclose", skip_serializing_if = "Option::is_none", default)]
	pub asset_close_to: Option<String>,
	#[serde(rename = "aca", skip_serializing_if = "Option::is_none", default)]
	pub asset_close_amount: Option<u64>,

	// acfg
	#[serde(rename = "caid", skip_serializing_if = "Option::is_none", default)]
	pub config_asset_id: Option<u64>,
	#[serde(rename = "apar", skip_serializing_if = "Option::is_none", default)]
	pub asset_params: Option<RawAssetParams>,

	// appl
	#[serde(rename = "apid", skip_serializing_if = "Option::is_none", default)]
	pub application_id: Option<u64>,
	#[serde(rename = "apan", skip_serializing_if = "Option::is_none", default)]
	pub on_completion: Option<RawOnCompletion>,
	#[serde(rename = "apaa", skip_serializing_if = "Option::is_none", default)]
	pub application_args: Option<Vec<String>>,
	#[serde(rename = "apat", skip_serializing_if = "Option::is_none", default)]
	pub accounts: Option<Vec<String>>,
	#[serde(rename = "apfa", skip_serializing_if = "Option::is_none", default)]
	pub foreign_apps: Option<Vec<u64>>,
	#[serde(rename = "apas", skip_serializing_if = "Option::is_none", default)]
	pub foreign_assets: Option<Vec<u64>>,
	#[serde(rename = "apap", skip_serializing_if = "Option::is_none", default)]
	pub approval_program: Option<String>,
	#[serde(rename = "apsu", skip_serializing_if = "Option::is_none", default)]
	pub clear_state_program: Option<String>,
	#[serde(rename = "apgs", skip_serializing_if = "Option::is_none", default)]
	pub global_state_schema: Option<RawStateSchema>,
	#[serde(rename = "apls", skip_serializing_if = "Option::is_none", default)]
	pub local_state_schema: Option<RawStateSchema>,
	#[serde(rename = "apep", skip_serializing_if = "Option::is_none", default)]
	pub extra_program_pages: Option<u64>,

	// keyreg
	#[serde(rename = "votekey", skip_serializing_if = "Option::is_none", default)]
	pub vote_participation_key: Option<String>,
	#[serde(rename = "selkey", skip_serializing_if = "Option::is_none", default)]
	pub selection_participation_key: Option<String>,
	#[serde(rename = "votefst", skip_serializing_if = "Option::is_none", default)]
	pub vote_first_valid: Option<u64>,
	#[serde(rename = "votelst", skip_serializing_if = "Option::is_none", default)]
	pub vote_last_valid: Option<u64>,
	#[serde(rename = "votekd", skip_serializing_if = "Option::is_none", default)]
	pub vote_key_dilution: Option<u64>,
	#[serde(rename = "nonpart", skip_serializing_if = "Option::is_none", default)]
	pub non_participation: Option<bool>,

	// afrz
	#[serde(rename = "faid", skip_serializing_if = "Option::is_none", default)]
	pub freeze_asset_id: Option<u64>,
	#[serde(rename = "fadd", skip_serializing_if = "Option::is_none", default)]
	pub freeze_address: Option<String>,
	#[serde(rename = "afrz", skip_serializing_if = "Option::is_none", default)]
	pub new_freeze_status: Option<bool>,
}
