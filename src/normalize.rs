//! Converts upstream block-shaped data into the canonical transaction model: long-form
//! field names, recursively flattened inner transactions with parent-derived offsets, and
//! a deterministic id where the source does not provide one.

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha512_256};

use crate::{
	arc28::SelectorMap,
	balance_changes::compute_balance_changes,
	block::{RawBlock, RawOnCompletion, RawSignedTransaction, RawStateSchema},
	transaction::{
		ApplicationFields, AssetConfigFields, AssetFreezeFields, AssetParams,
		AssetTransferFields, KeyRegistrationFields, OnCompletion, PaymentFields, Round,
		StateSchema, Transaction, TransactionPayload, TransactionType,
	},
};

/// Per-block facts stamped onto every transaction extracted from the block.
#[derive(Debug, Clone, Default)]
pub struct BlockMetadata {
	pub round: Round,
	pub timestamp: i64,
	pub genesis_id: Option<String>,
	pub genesis_hash: Option<String>,
}

impl BlockMetadata {
	pub fn of(block: &RawBlock) -> Self {
		Self {
			round: block.round,
			timestamp: block.timestamp,
			genesis_id: block.genesis_id.clone(),
			genesis_hash: block.genesis_hash.clone(),
		}
	}
}

const DERIVED_ID_LEN: usize = 26;

/// A deterministic id for transactions the source returns without one: a 26-character
/// uppercase hex prefix of the 256-bit digest of the stable JSON serialization of the
/// signed-transaction structure.
fn derive_id<T: serde::Serialize>(signed: &T) -> String {
	let serialized = serde_json::to_vec(signed).expect("in-memory serialization cannot fail");
	let mut id = hex::encode_upper(Sha512_256::digest(&serialized));
	id.truncate(DERIVED_ID_LEN);
	id
}

/// Extracts the block's top-level canonical transactions in source order, inner
/// transactions attached recursively.
pub fn normalize_block(block: &RawBlock) -> Result<Vec<Transaction>> {
	let metadata = BlockMetadata::of(block);
	block
		.transactions
		.iter()
		.enumerate()
		.map(|(position, signed)| {
			normalize_signed(signed, &metadata, position as u64)
				.with_context(|| format!("transaction {position} of round {}", metadata.round))
		})
		.collect()
}

fn normalize_signed(
	signed: &RawSignedTransaction,
	metadata: &BlockMetadata,
	offset: u64,
) -> Result<Transaction> {
	let txn = &signed.txn;
	let tx_type: TransactionType =
		txn.tx_type.parse().map_err(|_| anyhow!("unknown transaction type {:?}", txn.tx_type))?;

	let payload = normalize_payload(tx_type, signed)?;

	let inner_txns = signed
		.apply_data
		.iter()
		.flat_map(|apply_data| apply_data.inner_txns.iter())
		.enumerate()
		.map(|(i, inner)| normalize_signed(inner, metadata, offset + 1 + i as u64))
		.collect::<Result<Vec<_>>>()?;

	Ok(Transaction {
		id: signed.txid.clone().unwrap_or_else(|| derive_id(signed)),
		tx_type,
		sender: txn.sender.clone().unwrap_or_default(),
		confirmed_round: metadata.round,
		round_time: metadata.timestamp,
		fee: txn.fee.unwrap_or_default(),
		first_valid: txn.first_valid.unwrap_or_default(),
		last_valid: txn.last_valid.unwrap_or_default(),
		genesis_id: metadata.genesis_id.clone(),
		genesis_hash: metadata.genesis_hash.clone(),
		intra_round_offset: offset,
		group: txn.group.clone(),
		lease: txn.lease.clone(),
		rekey_to: txn.rekey_to.clone(),
		note: txn.note.clone(),
		payload,
		inner_txns,
		balance_changes: vec![],
		arc28_events: vec![],
	})
}

fn normalize_payload(
	tx_type: TransactionType,
	signed: &RawSignedTransaction,
) -> Result<TransactionPayload> {
	let txn = &signed.txn;
	Ok(match tx_type {
		TransactionType::Payment => TransactionPayload::Payment(PaymentFields {
			receiver: txn.receiver.clone().unwrap_or_default(),
			amount: txn.amount.unwrap_or_default(),
			close_remainder_to: txn.close_remainder_to.clone(),
			close_amount: txn.close_amount,
		}),
		TransactionType::AssetTransfer => TransactionPayload::AssetTransfer(AssetTransferFields {
			asset_id: txn.asset_transfer_asset_id.unwrap_or_default(),
			amount: txn.asset_amount.unwrap_or_default(),
			receiver: txn.asset_receiver.clone().unwrap_or_default(),
			asset_sender: txn.asset_sender.clone(),
			close_to: txn.asset_close_to.clone(),
			close_amount: txn.asset_close_amount,
		}),
		TransactionType::AssetConfig => TransactionPayload::AssetConfig(AssetConfigFields {
			asset_id: txn.config_asset_id,
			params: txn.asset_params.as_ref().map(|params| AssetParams {
				total: params.total,
				decimals: params.decimals,
				default_frozen: params.default_frozen,
				unit_name: params.unit_name.clone(),
				name: params.name.clone(),
				url: params.url.clone(),
				metadata_hash: params.metadata_hash.clone(),
				manager: params.manager.clone(),
				reserve: params.reserve.clone(),
				freeze: params.freeze.clone(),
				clawback: params.clawback.clone(),
			}),
			created_asset_index: signed.created_asset_index,
		}),
		TransactionType::ApplicationCall => {
			let apply_data = signed.apply_data.as_ref();
			TransactionPayload::ApplicationCall(ApplicationFields {
				application_id: txn.application_id.unwrap_or_default(),
				on_completion: normalize_on_completion(txn.on_completion.as_ref())?,
				application_args: txn.application_args.clone().unwrap_or_default(),
				accounts: txn.accounts.clone().unwrap_or_default(),
				foreign_apps: txn.foreign_apps.clone().unwrap_or_default(),
				foreign_assets: txn.foreign_assets.clone().unwrap_or_default(),
				approval_program: txn.approval_program.clone(),
				clear_state_program: txn.clear_state_program.clone(),
				global_state_schema: txn.global_state_schema.as_ref().map(normalize_schema),
				local_state_schema: txn.local_state_schema.as_ref().map(normalize_schema),
				extra_program_pages: txn.extra_program_pages,
				created_application_index: signed.created_application_index,
				logs: apply_data.and_then(|apply_data| apply_data.logs.clone()),
				global_state_delta: apply_data
					.and_then(|apply_data| apply_data.global_state_delta.clone()),
				local_state_delta: apply_data
					.and_then(|apply_data| apply_data.local_state_delta.clone()),
			})
		},
		TransactionType::KeyRegistration =>
			TransactionPayload::KeyRegistration(KeyRegistrationFields {
				vote_participation_key: txn.vote_participation_key.clone(),
				selection_participation_key: txn.selection_participation_key.clone(),
				vote_first_valid: txn.vote_first_valid,
				vote_last_valid: txn.vote_last_valid,
				vote_key_dilution: txn.vote_key_dilution,
				non_participation: txn.non_participation.unwrap_or_default(),
			}),
		TransactionType::AssetFreeze => TransactionPayload::AssetFreeze(AssetFreezeFields {
			asset_id: txn.freeze_asset_id.unwrap_or_default(),
			address: txn.freeze_address.clone().unwrap_or_default(),
			new_freeze_status: txn.new_freeze_status.unwrap_or_default(),
		}),
	})
}

fn normalize_on_completion(raw: Option<&RawOnCompletion>) -> Result<OnCompletion> {
	Ok(match raw {
		None => OnCompletion::default(),
		Some(RawOnCompletion::Index(index)) => OnCompletion::from_wire_index(*index)
			.ok_or_else(|| anyhow!("unknown on-completion index {index}"))?,
		Some(RawOnCompletion::Name(name)) => match name.as_str() {
			"noop" => OnCompletion::NoOp,
			"optin" => OnCompletion::OptIn,
			"closeout" => OnCompletion::CloseOut,
			"clearstate" => OnCompletion::ClearState,
			"updateapplication" => OnCompletion::UpdateApplication,
			"deleteapplication" => OnCompletion::DeleteApplication,
			other => bail!("unknown on-completion {other:?}"),
		},
	})
}

fn normalize_schema(schema: &RawStateSchema) -> StateSchema {
	StateSchema { num_uint: schema.num_uint, num_byte_slice: schema.num_byte_slice }
}

/// The history source returns the canonical long-form shape, but keeps creation indices,
/// logs, and state deltas at the top level rather than inside the type-qualified payload,
/// and leaves inner transactions without ids, offsets, or round facts. Reshape, then fill
/// the gaps so both sources produce identical records.
pub fn transaction_from_history_json(mut value: serde_json::Value) -> Result<Transaction> {
	reshape_history_value(&mut value)?;
	let mut transaction: Transaction =
		serde_json::from_value(value).context("deserializing history transaction")?;
	finalize_tree(&mut transaction);
	Ok(transaction)
}

fn reshape_history_value(value: &mut serde_json::Value) -> Result<()> {
	let object = value.as_object_mut().ok_or_else(|| anyhow!("transaction is not an object"))?;

	for (source_key, payload_key, target_key) in [
		("created-asset-index", "asset-config-transaction", "created-asset-index"),
		("created-application-index", "application-transaction", "created-application-index"),
		("logs", "application-transaction", "logs"),
		("global-state-delta", "application-transaction", "global-state-delta"),
		("local-state-delta", "application-transaction", "local-state-delta"),
	] {
		if let Some(moved) = object.remove(source_key) {
			if let Some(payload) = object.get_mut(payload_key).and_then(|p| p.as_object_mut()) {
				payload.entry(target_key).or_insert(moved);
			}
		}
	}

	if let Some(inner) = object.get_mut("inner-txns").and_then(|v| v.as_array_mut()) {
		for inner_value in inner {
			reshape_history_value(inner_value)?;
		}
	}
	Ok(())
}

fn finalize_tree(transaction: &mut Transaction) {
	let parent_offset = transaction.intra_round_offset;
	let parent_round = transaction.confirmed_round;
	let parent_time = transaction.round_time;
	let parent_genesis_id = transaction.genesis_id.clone();
	let parent_genesis_hash = transaction.genesis_hash.clone();

	for (i, inner) in transaction.inner_txns.iter_mut().enumerate() {
		inner.intra_round_offset = parent_offset + 1 + i as u64;
		if inner.confirmed_round == 0 {
			inner.confirmed_round = parent_round;
		}
		if inner.round_time == 0 {
			inner.round_time = parent_time;
		}
		if inner.genesis_id.is_none() {
			inner.genesis_id = parent_genesis_id.clone();
		}
		if inner.genesis_hash.is_none() {
			inner.genesis_hash = parent_genesis_hash.clone();
		}
		if inner.id.is_empty() {
			inner.id = derive_id(inner);
		}
		finalize_tree(inner);
	}
}

/// Synthesizes balance changes and decoded events for the transaction and its entire inner
/// subtree.
pub fn enrich_transaction(transaction: &mut Transaction, selectors: &SelectorMap) {
	decode_tree_events(transaction, selectors);
	compute_balance_changes(transaction);
}

fn decode_tree_events(transaction: &mut Transaction, selectors: &SelectorMap) {
	let events = transaction
		.payload
		.application()
		.and_then(|appl| appl.logs.as_ref())
		.map(|logs| selectors.decode_logs(&transaction.id, logs));
	if let Some(events) = events {
		transaction.arc28_events = events;
	}
	for inner in &mut transaction.inner_txns {
		decode_tree_events(inner, selectors);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::{RawApplyData, RawTransaction};

	fn raw_pay(sender: &str, receiver: &str, amount: u64, fee: u64) -> RawSignedTransaction {
		RawSignedTransaction {
			txn: RawTransaction {
				tx_type: "pay".to_string(),
				sender: Some(sender.to_string()),
				receiver: Some(receiver.to_string()),
				amount: Some(amount),
				fee: Some(fee),
				first_valid: Some(1000),
				last_valid: Some(2000),
				..Default::default()
			},
			..Default::default()
		}
	}

	fn test_block() -> RawBlock {
		RawBlock {
			round: 1001,
			timestamp: 1_700_000_000,
			genesis_id: Some("testnet-v1.0".to_string()),
			genesis_hash: Some("SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=".to_string()),
			transactions: vec![raw_pay("SENDER", "RECEIVER", 5000, 1000)],
		}
	}

	#[test]
	fn maps_compact_pay_fields_to_canonical_names() {
		let transactions = normalize_block(&test_block()).unwrap();
		assert_eq!(transactions.len(), 1);

		let tx = &transactions[0];
		assert_eq!(tx.tx_type, TransactionType::Payment);
		assert_eq!(tx.sender, "SENDER");
		assert_eq!(tx.confirmed_round, 1001);
		assert_eq!(tx.round_time, 1_700_000_000);
		assert_eq!(tx.genesis_id.as_deref(), Some("testnet-v1.0"));
		assert_eq!(tx.intra_round_offset, 0);

		let pay = tx.payload.payment().unwrap();
		assert_eq!(pay.receiver, "RECEIVER");
		assert_eq!(pay.amount, 5000);
	}

	#[test]
	fn derived_ids_are_stable_across_runs() {
		let first = normalize_block(&test_block()).unwrap();
		let second = normalize_block(&test_block()).unwrap();
		assert_eq!(first, second);

		let id = &first[0].id;
		assert_eq!(id.len(), 26);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
		// A different transaction derives a different id.
		let mut other_block = test_block();
		other_block.transactions[0].txn.amount = Some(5001);
		assert_ne!(&normalize_block(&other_block).unwrap()[0].id, id);
	}

	#[test]
	fn source_provided_ids_win_over_derivation() {
		let mut block = test_block();
		block.transactions[0].txid = Some("PROVIDED".to_string());
		assert_eq!(normalize_block(&block).unwrap()[0].id, "PROVIDED");
	}

	#[test]
	fn inner_transactions_get_parent_derived_offsets() {
		let mut block = test_block();
		let mut appl = RawSignedTransaction {
			txn: RawTransaction {
				tx_type: "appl".to_string(),
				sender: Some("APP_SENDER".to_string()),
				application_id: Some(123),
				fee: Some(1000),
				..Default::default()
			},
			..Default::default()
		};
		let mut inner_appl = RawSignedTransaction {
			txn: RawTransaction {
				tx_type: "appl".to_string(),
				sender: Some("APP_ACCOUNT".to_string()),
				application_id: Some(456),
				..Default::default()
			},
			..Default::default()
		};
		inner_appl.apply_data = Some(RawApplyData {
			inner_txns: vec![raw_pay("DEEP_SENDER", "DEEP_RECEIVER", 1, 0)],
			..Default::default()
		});
		appl.apply_data = Some(RawApplyData {
			inner_txns: vec![inner_appl, raw_pay("A", "B", 2, 0)],
			..Default::default()
		});
		block.transactions.push(appl);

		let transactions = normalize_block(&block).unwrap();
		let parent = &transactions[1];
		assert_eq!(parent.intra_round_offset, 1);
		assert_eq!(parent.inner_txns[0].intra_round_offset, 2);
		assert_eq!(parent.inner_txns[0].inner_txns[0].intra_round_offset, 3);
		assert_eq!(parent.inner_txns[1].intra_round_offset, 3);
	}

	#[test]
	fn promotes_apply_data_onto_the_application_payload() {
		let mut block = test_block();
		block.transactions = vec![RawSignedTransaction {
			txn: RawTransaction {
				tx_type: "appl".to_string(),
				sender: Some("CREATOR".to_string()),
				on_completion: Some(RawOnCompletion::Index(0)),
				..Default::default()
			},
			apply_data: Some(RawApplyData {
				logs: Some(vec!["bG9n".to_string()]),
				global_state_delta: Some(serde_json::json!([{"key": "aw=="}])),
				..Default::default()
			}),
			created_application_index: Some(9999),
			..Default::default()
		}];

		let tx = &normalize_block(&block).unwrap()[0];
		let appl = tx.payload.application().unwrap();
		assert_eq!(appl.created_application_index, Some(9999));
		assert_eq!(appl.logs, Some(vec!["bG9n".to_string()]));
		assert!(appl.global_state_delta.is_some());
		assert_eq!(appl.on_completion, OnCompletion::NoOp);
	}

	#[test]
	fn history_shape_reshapes_and_finalizes_inner_txns() {
		let value = serde_json::json!({
			"id": "ROOT",
			"tx-type": "appl",
			"sender": "APP_SENDER",
			"confirmed-round": 1001,
			"round-time": 1_700_000_000,
			"fee": 1000,
			"intra-round-offset": 4,
			"application-transaction": {"application-id": 123},
			"logs": ["bG9n"],
			"created-application-index": 777,
			"inner-txns": [{
				"tx-type": "pay",
				"sender": "INNER_SENDER",
				"payment-transaction": {"receiver": "INNER_RECEIVER", "amount": 500000}
			}]
		});

		let tx = transaction_from_history_json(value).unwrap();
		let appl = tx.payload.application().unwrap();
		assert_eq!(appl.created_application_index, Some(777));
		assert_eq!(appl.logs, Some(vec!["bG9n".to_string()]));

		let inner = &tx.inner_txns[0];
		assert_eq!(inner.intra_round_offset, 5);
		assert_eq!(inner.confirmed_round, 1001);
		assert_eq!(inner.round_time, 1_700_000_000);
		assert!(!inner.id.is_empty());
	}

	#[test]
	fn normalizing_twice_is_structurally_equal() {
		let block = test_block();
		assert_eq!(normalize_block(&block).unwrap(), normalize_block(&block).unwrap());
	}
}
