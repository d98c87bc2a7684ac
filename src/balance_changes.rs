//! Synthesizes per-(address, asset) signed balance deltas for a canonical transaction,
//! covering its entire inner-transaction subtree. The native asset is asset id 0 and its
//! deltas include fees.

use std::collections::{BTreeMap, BTreeSet};

use crate::transaction::{
	BalanceChange, BalanceChangeRole, Transaction, TransactionPayload, NATIVE_ASSET_ID,
};

#[derive(Default)]
struct Accumulator {
	// Keyed by (address, asset), which also fixes the stable output order.
	entries: BTreeMap<(String, u64), (i128, BTreeSet<BalanceChangeRole>)>,
}

impl Accumulator {
	fn apply(&mut self, address: &str, asset_id: u64, amount: i128, role: BalanceChangeRole) {
		let entry = self.entries.entry((address.to_string(), asset_id)).or_default();
		entry.0 += amount;
		entry.1.insert(role);
	}

	fn merge(&mut self, changes: &[BalanceChange]) {
		for change in changes {
			let entry =
				self.entries.entry((change.address.clone(), change.asset_id)).or_default();
			entry.0 += change.amount;
			entry.1.extend(change.roles.iter().copied());
		}
	}

	fn into_changes(self) -> Vec<BalanceChange> {
		self.entries
			.into_iter()
			.filter_map(|((address, asset_id), (amount, roles))| {
				// Zero-amount entries are only meaningful for asset destruction.
				if amount == 0 && !roles.contains(&BalanceChangeRole::AssetDestroyer) {
					return None;
				}
				Some(BalanceChange { address, asset_id, amount, roles: roles.into_iter().collect() })
			})
			.collect()
	}
}

/// Computes the transaction's own balance changes, recursing into inner transactions and
/// coalescing everything per (address, asset) pair. Each node in the tree gets its own
/// subtree-inclusive `balance_changes`.
pub fn compute_balance_changes(transaction: &mut Transaction) {
	for inner in &mut transaction.inner_txns {
		compute_balance_changes(inner);
	}

	let mut accumulator = Accumulator::default();

	if transaction.fee > 0 {
		accumulator.apply(
			&transaction.sender,
			NATIVE_ASSET_ID,
			-(transaction.fee as i128),
			BalanceChangeRole::Sender,
		);
	}

	match &transaction.payload {
		TransactionPayload::Payment(pay) => {
			accumulator.apply(
				&transaction.sender,
				NATIVE_ASSET_ID,
				-(pay.amount as i128),
				BalanceChangeRole::Sender,
			);
			accumulator.apply(
				&pay.receiver,
				NATIVE_ASSET_ID,
				pay.amount as i128,
				BalanceChangeRole::Receiver,
			);
			if let Some(close_to) = &pay.close_remainder_to {
				let close_amount = pay.close_amount.unwrap_or_default();
				if close_amount > 0 {
					accumulator.apply(
						&transaction.sender,
						NATIVE_ASSET_ID,
						-(close_amount as i128),
						BalanceChangeRole::Sender,
					);
					accumulator.apply(
						close_to,
						NATIVE_ASSET_ID,
						close_amount as i128,
						BalanceChangeRole::CloseTo,
					);
				}
			}
		},
		TransactionPayload::AssetTransfer(axfer) => {
			// Clawbacks move funds out of the asset sender, not the fee payer.
			let actual_sender = axfer.asset_sender.as_deref().unwrap_or(&transaction.sender);
			accumulator.apply(
				actual_sender,
				axfer.asset_id,
				-(axfer.amount as i128),
				BalanceChangeRole::Sender,
			);
			accumulator.apply(
				&axfer.receiver,
				axfer.asset_id,
				axfer.amount as i128,
				BalanceChangeRole::Receiver,
			);
			if let Some(close_to) = &axfer.close_to {
				let close_amount = axfer.close_amount.unwrap_or_default();
				if close_amount > 0 {
					accumulator.apply(
						actual_sender,
						axfer.asset_id,
						-(close_amount as i128),
						BalanceChangeRole::Sender,
					);
					accumulator.apply(
						close_to,
						axfer.asset_id,
						close_amount as i128,
						BalanceChangeRole::CloseTo,
					);
				}
			}
		},
		TransactionPayload::AssetConfig(acfg) => {
			if let Some(created_asset_index) = acfg.created_asset_index {
				let total = acfg.params.as_ref().map(|params| params.total).unwrap_or_default();
				accumulator.apply(
					&transaction.sender,
					created_asset_index,
					total as i128,
					BalanceChangeRole::AssetCreator,
				);
			} else if let (Some(asset_id), None) = (acfg.asset_id, acfg.params.as_ref()) {
				accumulator.apply(
					&transaction.sender,
					asset_id,
					0,
					BalanceChangeRole::AssetDestroyer,
				);
			}
		},
		// Other types contribute only the fee entry.
		TransactionPayload::ApplicationCall(_) |
		TransactionPayload::KeyRegistration(_) |
		TransactionPayload::AssetFreeze(_) => {},
	}

	for inner in &transaction.inner_txns {
		accumulator.merge(&inner.balance_changes);
	}

	transaction.balance_changes = accumulator.into_changes();
}
