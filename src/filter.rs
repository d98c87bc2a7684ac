//! User-declared compound predicates over canonical transactions, and the engine that
//! evaluates them. Every field of a filter is independently optional; a filter with no
//! fields matches every transaction.

use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

use base64::Engine;

use crate::{
	arc28::selector_for_signature,
	transaction::{AbiValue, BalanceChangeRole, OnCompletion, Transaction, TransactionType},
};

/// The final, user-supplied test. Invoked last, after every declarative predicate passed.
pub type CustomFilter = Arc<dyn Fn(&Transaction) -> bool + Send + Sync>;

/// Applied to every matched transaction before dispatch; its output type is opaque to the
/// engine.
pub type Mapper = Arc<dyn Fn(&Transaction) -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// Matches when the transaction has at least one balance-change record satisfying all
/// present constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceChangeFilter {
	pub address: Option<String>,
	pub asset_id: Option<u64>,
	pub min_amount: Option<i128>,
	pub max_amount: Option<i128>,
	pub roles: Option<Vec<BalanceChangeRole>>,
}

/// Matches when the transaction has at least one decoded event satisfying the name
/// constraints and every required argument value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
	pub group_name: Option<String>,
	pub event_name: Option<String>,
	pub args: BTreeMap<String, AbiValue>,
}

#[derive(Clone, Default)]
pub struct TransactionFilter {
	pub tx_type: Option<TransactionType>,
	pub sender: Option<String>,
	pub receiver: Option<String>,
	/// Byte prefix test on the raw (decoded) note.
	pub note_prefix: Option<Vec<u8>>,
	pub app_id: Option<u64>,
	pub asset_id: Option<u64>,
	pub min_amount: Option<u64>,
	pub max_amount: Option<u64>,
	pub app_create: Option<bool>,
	pub asset_create: Option<bool>,
	pub app_on_complete: Option<OnCompletion>,
	/// Matches when the first application argument equals the 4-byte selector derived from
	/// this method signature.
	pub method_signature: Option<String>,
	pub balance_changes: Option<Vec<BalanceChangeFilter>>,
	pub arc28_events: Option<Vec<EventFilter>>,
	pub custom_filter: Option<CustomFilter>,
}

impl fmt::Debug for TransactionFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransactionFilter")
			.field("tx_type", &self.tx_type)
			.field("sender", &self.sender)
			.field("receiver", &self.receiver)
			.field("note_prefix", &self.note_prefix)
			.field("app_id", &self.app_id)
			.field("asset_id", &self.asset_id)
			.field("min_amount", &self.min_amount)
			.field("max_amount", &self.max_amount)
			.field("app_create", &self.app_create)
			.field("asset_create", &self.asset_create)
			.field("app_on_complete", &self.app_on_complete)
			.field("method_signature", &self.method_signature)
			.field("balance_changes", &self.balance_changes)
			.field("arc28_events", &self.arc28_events)
			.field("custom_filter", &self.custom_filter.as_ref().map(|_| "<fn>"))
			.finish()
	}
}

/// A labelled filter; the name is the routing key on the event bus.
#[derive(Clone)]
pub struct NamedFilter {
	pub name: String,
	pub filter: TransactionFilter,
	pub mapper: Option<Mapper>,
}

impl NamedFilter {
	pub fn new(name: impl Into<String>, filter: TransactionFilter) -> Self {
		Self { name: name.into(), filter, mapper: None }
	}

	pub fn with_mapper(mut self, mapper: Mapper) -> Self {
		self.mapper = Some(mapper);
		self
	}
}

impl fmt::Debug for NamedFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NamedFilter")
			.field("name", &self.name)
			.field("filter", &self.filter)
			.field("mapper", &self.mapper.as_ref().map(|_| "<fn>"))
			.finish()
	}
}

fn decoded_note(transaction: &Transaction) -> Option<Vec<u8>> {
	transaction
		.note
		.as_ref()
		.and_then(|note| base64::engine::general_purpose::STANDARD.decode(note).ok())
}

fn matches_balance_change_entry(entry: &BalanceChangeFilter, transaction: &Transaction) -> bool {
	transaction.balance_changes.iter().any(|change| {
		entry.address.as_ref().map_or(true, |address| &change.address == address) &&
			entry.asset_id.map_or(true, |asset_id| change.asset_id == asset_id) &&
			entry.min_amount.map_or(true, |min| change.amount >= min) &&
			entry.max_amount.map_or(true, |max| change.amount <= max) &&
			entry.roles.as_ref().map_or(true, |roles| {
				change.roles.iter().any(|role| roles.contains(role))
			})
	})
}

fn matches_event_entry(entry: &EventFilter, transaction: &Transaction) -> bool {
	transaction.arc28_events.iter().any(|event| {
		entry.group_name.as_ref().map_or(true, |group| &event.group_name == group) &&
			entry.event_name.as_ref().map_or(true, |name| &event.event_name == name) &&
			entry
				.args
				.iter()
				.all(|(name, required)| event.args.get(name) == Some(required))
	})
}

fn matches_method_signature(signature: &str, transaction: &Transaction) -> bool {
	let Some(first_arg) = transaction
		.payload
		.application()
		.and_then(|appl| appl.application_args.first())
		.and_then(|arg| base64::engine::general_purpose::STANDARD.decode(arg).ok())
	else {
		return false;
	};
	// Only the leading 4 bytes are the selector; a method call may pack further
	// bytes after it in the first argument.
	first_arg.get(..4) == Some(selector_for_signature(signature).as_slice())
}

/// Evaluates the filter against a canonical, enriched transaction. All present predicates
/// must hold; evaluation short-circuits on the first failure and the user callback runs
/// last. A field the transaction does not carry fails the corresponding predicate.
pub fn matches(filter: &TransactionFilter, transaction: &Transaction) -> bool {
	if let Some(tx_type) = filter.tx_type {
		if transaction.tx_type != tx_type {
			return false;
		}
	}
	if let Some(sender) = &filter.sender {
		if &transaction.sender != sender {
			return false;
		}
	}
	if let Some(receiver) = &filter.receiver {
		if transaction.receiver() != Some(receiver.as_str()) {
			return false;
		}
	}
	if let Some(prefix) = &filter.note_prefix {
		match decoded_note(transaction) {
			Some(note) if note.starts_with(prefix) => {},
			_ => return false,
		}
	}
	if let Some(app_id) = filter.app_id {
		if transaction.payload.application().map(|appl| appl.application_id) != Some(app_id) {
			return false;
		}
	}
	if let Some(asset_id) = filter.asset_id {
		if transaction.asset_id() != Some(asset_id) {
			return false;
		}
	}
	if filter.min_amount.is_some() || filter.max_amount.is_some() {
		let Some(amount) = transaction.amount() else { return false };
		if filter.min_amount.is_some_and(|min| amount < min) {
			return false;
		}
		if filter.max_amount.is_some_and(|max| amount > max) {
			return false;
		}
	}
	if let Some(app_create) = filter.app_create {
		if transaction.created_application_index().is_some() != app_create {
			return false;
		}
	}
	if let Some(asset_create) = filter.asset_create {
		if transaction.created_asset_index().is_some() != asset_create {
			return false;
		}
	}
	if let Some(on_complete) = filter.app_on_complete {
		if transaction.payload.application().map(|appl| appl.on_completion) != Some(on_complete) {
			return false;
		}
	}
	if let Some(signature) = &filter.method_signature {
		if !matches_method_signature(signature, transaction) {
			return false;
		}
	}
	if let Some(entries) = &filter.balance_changes {
		if !entries.iter().any(|entry| matches_balance_change_entry(entry, transaction)) {
			return false;
		}
	}
	if let Some(entries) = &filter.arc28_events {
		if !entries.iter().any(|entry| matches_event_entry(entry, transaction)) {
			return false;
		}
	}
	if let Some(custom_filter) = &filter.custom_filter {
		if !custom_filter(transaction) {
			return false;
		}
	}
	true
}
