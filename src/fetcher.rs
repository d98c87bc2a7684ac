//! Executes a sync plan: bounded-parallel block retrieval on the block-source path,
//! cursor-driven pagination per filter on the history path. Candidates come back per
//! filter in config declaration order; the final predicate pass runs later.

use std::{ops::RangeInclusive, sync::Arc};

use anyhow::{Context, Result};
use base64::Engine;
use futures::{stream, StreamExt, TryStreamExt};

use crate::{
	algod::AlgodApi,
	arc28::SelectorMap,
	constants::{BLOCK_FETCH_CONCURRENCY, INDEXER_MAX_PAGE_SIZE},
	filter::{NamedFilter, TransactionFilter},
	indexer::{AddressRole, IndexerApi, TransactionSearchParams},
	normalize::{enrich_transaction, normalize_block, transaction_from_history_json},
	planner::{PlanSource, SyncPlan},
	transaction::{Round, Transaction},
};

/// Top-level candidate transactions per named filter, in config declaration order. On the
/// block-source path every filter sees every transaction of the range; on the history path
/// each filter sees its own pre-filtered search results.
pub type FilterCandidates = Vec<Vec<Arc<Transaction>>>;

pub async fn execute_plan(
	plan: &SyncPlan,
	algod: &Arc<dyn AlgodApi>,
	indexer: Option<&Arc<dyn IndexerApi>>,
	filters: &[NamedFilter],
	selectors: &SelectorMap,
) -> Result<FilterCandidates> {
	let Some(sync_range) = &plan.sync_range else {
		return Ok(vec![vec![]; filters.len()]);
	};

	match plan.source {
		PlanSource::None => Ok(vec![vec![]; filters.len()]),
		PlanSource::Algod => fetch_from_algod(sync_range.clone(), algod, filters, selectors).await,
		PlanSource::Indexer => {
			let indexer =
				indexer.context("plan selected the history source but none is configured")?;
			fetch_from_indexer(sync_range.clone(), indexer, filters, selectors).await
		},
	}
}

/// Retrieves every block in the range with bounded fan-out, in round order. Any block that
/// cannot be retrieved fails the whole batch; the watermark must never advance past an
/// unfetched round.
async fn fetch_from_algod(
	sync_range: RangeInclusive<Round>,
	algod: &Arc<dyn AlgodApi>,
	filters: &[NamedFilter],
	selectors: &SelectorMap,
) -> Result<FilterCandidates> {
	let blocks = stream::iter(sync_range)
		.map(|round| {
			let algod = algod.clone();
			async move {
				algod.block(round).await.with_context(|| format!("fetching block {round}"))
			}
		})
		.buffered(BLOCK_FETCH_CONCURRENCY)
		.try_collect::<Vec<_>>()
		.await?;

	let mut transactions = Vec::new();
	for response in &blocks {
		for mut transaction in normalize_block(&response.block)
			.with_context(|| format!("normalizing block {}", response.block.round))?
		{
			enrich_transaction(&mut transaction, selectors);
			transactions.push(Arc::new(transaction));
		}
	}

	Ok(filters.iter().map(|_| transactions.clone()).collect())
}

/// Drives one paginated search per filter, following the continuation cursor to
/// exhaustion.
async fn fetch_from_indexer(
	sync_range: RangeInclusive<Round>,
	indexer: &Arc<dyn IndexerApi>,
	filters: &[NamedFilter],
	selectors: &SelectorMap,
) -> Result<FilterCandidates> {
	let mut candidates = Vec::with_capacity(filters.len());
	for named_filter in filters {
		let mut params = history_prefilter(&named_filter.filter, &sync_range);
		let mut collected = Vec::new();

		loop {
			let page = indexer
				.search_transactions(&params)
				.await
				.with_context(|| format!("searching transactions for {:?}", named_filter.name))?;

			let page_len = page.transactions.len();
			for value in page.transactions {
				let mut transaction = transaction_from_history_json(value)
					.with_context(|| format!("normalizing result for {:?}", named_filter.name))?;
				enrich_transaction(&mut transaction, selectors);
				collected.push(Arc::new(transaction));
			}

			match page.next_token {
				Some(next_token) if page_len > 0 => params.next = Some(next_token),
				_ => break,
			}
		}

		tracing::trace!(
			"History search for {:?} returned {} candidates",
			named_filter.name,
			collected.len()
		);
		candidates.push(collected);
	}
	Ok(candidates)
}

/// The coarsest query hints the history source supports for this filter: a necessary
/// condition, never stricter than the filter itself. When both sender and receiver are
/// set, the sender is the query address and the receiver stays a post-filter constraint.
fn history_prefilter(
	filter: &TransactionFilter,
	sync_range: &RangeInclusive<Round>,
) -> TransactionSearchParams {
	let (address, address_role) = if let Some(sender) = &filter.sender {
		(Some(sender.clone()), Some(AddressRole::Sender))
	} else if let Some(receiver) = &filter.receiver {
		(Some(receiver.clone()), Some(AddressRole::Receiver))
	} else {
		(None, None)
	};

	TransactionSearchParams {
		min_round: Some(*sync_range.start()),
		max_round: Some(*sync_range.end()),
		address,
		address_role,
		tx_type: filter.tx_type,
		asset_id: filter.asset_id,
		application_id: filter.app_id,
		note_prefix: filter
			.note_prefix
			.as_ref()
			.map(|prefix| base64::engine::general_purpose::STANDARD.encode(prefix)),
		currency_greater_than: filter.min_amount,
		currency_less_than: filter.max_amount,
		limit: Some(INDEXER_MAX_PAGE_SIZE),
		next: None,
	}
}
