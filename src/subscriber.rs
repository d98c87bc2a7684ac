//! The driver: wires the planner, fetcher, normalizer, enrichment, predicate engine, and
//! dispatcher together, owns the watermark, and runs single-shot or continuously with
//! cooperative cancellation.

use std::{
	any::Any,
	collections::HashSet,
	fmt,
	ops::RangeInclusive,
	sync::Arc,
	time::Duration,
};

use anyhow::Result;

use crate::{
	algod::AlgodApi,
	arc28::{EventSchema, SelectorMap},
	common::{Mutex, Signal, Signaller},
	constants::{ERROR_RETRY_DELAY, WAIT_FOR_BLOCK_TIMEOUT},
	dispatcher::{
		batch_event, transaction_event, Dispatcher, EventHandler, SubscriberEvent,
		BEFORE_POLL_EVENT, ERROR_EVENT, POLL_EVENT,
	},
	error::SubscriberError,
	fetcher::{execute_plan, FilterCandidates},
	filter::{self, NamedFilter},
	indexer::IndexerApi,
	planner::plan_sync,
	transaction::{Round, SyncBehaviour, Transaction},
	watermark::WatermarkStore,
};

#[derive(Clone)]
pub struct SubscriberConfig {
	/// Evaluated against every canonical transaction; the name is the routing key.
	pub filters: Vec<NamedFilter>,
	/// The union of event schemas used by all filters in this subscription.
	pub event_schemas: Vec<EventSchema>,
	/// Cap on rounds covered by a single block-source poll.
	pub max_rounds_to_sync: u64,
	/// Cap on rounds covered by a single history-source poll.
	pub max_history_rounds_to_sync: u64,
	pub sync_behaviour: SyncBehaviour,
	/// Delay between polls when not waiting at the tip.
	pub frequency: Duration,
	pub wait_for_block_when_at_tip: bool,
}

impl Default for SubscriberConfig {
	fn default() -> Self {
		Self {
			filters: vec![],
			event_schemas: vec![],
			max_rounds_to_sync: 500,
			max_history_rounds_to_sync: 1000,
			sync_behaviour: SyncBehaviour::SyncOldest,
			frequency: Duration::from_secs(1),
			wait_for_block_when_at_tip: false,
		}
	}
}

impl SubscriberConfig {
	pub fn validate(&self) -> Result<(), SubscriberError> {
		if self.max_rounds_to_sync == 0 {
			return Err(SubscriberError::Configuration(
				"max_rounds_to_sync must be positive".to_string(),
			));
		}
		if self.max_history_rounds_to_sync == 0 {
			return Err(SubscriberError::Configuration(
				"max_history_rounds_to_sync must be positive".to_string(),
			));
		}
		if self.frequency.is_zero() {
			return Err(SubscriberError::Configuration("frequency must be positive".to_string()));
		}
		let mut names = HashSet::new();
		for named_filter in &self.filters {
			if !names.insert(named_filter.name.as_str()) {
				return Err(SubscriberError::Configuration(format!(
					"duplicate filter name {:?}",
					named_filter.name
				)));
			}
		}
		Ok(())
	}
}

/// A matched transaction as dispatched: the canonical record plus the mapper's output, if
/// the filter declared one. The mapped value is opaque to the engine.
#[derive(Clone)]
pub struct MatchedTransaction {
	pub transaction: Arc<Transaction>,
	pub mapped: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for MatchedTransaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MatchedTransaction")
			.field("transaction", &self.transaction.id)
			.field("mapped", &self.mapped.as_ref().map(|_| "<any>"))
			.finish()
	}
}

#[derive(Debug, Clone)]
pub struct FilterMatches {
	pub filter_name: String,
	pub transactions: Vec<MatchedTransaction>,
}

/// The outcome of one poll. `matches` groups are in config declaration order.
#[derive(Debug, Clone)]
pub struct SubscriptionResult {
	pub starting_watermark: Round,
	pub new_watermark: Round,
	/// Contiguous and inclusive; `None` when the poll covered nothing.
	pub synced_round_range: Option<RangeInclusive<Round>>,
	pub current_round: Round,
	pub matches: Vec<FilterMatches>,
}

struct SubscriberState {
	running: bool,
	watermark: Round,
}

/// An error that was already routed to the error channel; the caller-facing copy shares
/// the original.
#[derive(Debug, Clone)]
struct SharedPollError(Arc<anyhow::Error>);

impl fmt::Display for SharedPollError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#}", self.0)
	}
}

impl std::error::Error for SharedPollError {}

pub struct Subscriber {
	config: SubscriberConfig,
	algod: Arc<dyn AlgodApi>,
	indexer: Option<Arc<dyn IndexerApi>>,
	watermark_store: Option<Arc<dyn WatermarkStore>>,
	dispatcher: Arc<Dispatcher>,
	selectors: SelectorMap,
	state: Mutex<SubscriberState>,
	stop_signaller: std::sync::Mutex<Option<Signaller<String>>>,
	stop_signal: Signal<String>,
}

impl Subscriber {
	/// Validates the config, restores the watermark from the store (0 without one), and
	/// prepares the event selector table.
	pub fn new(
		config: SubscriberConfig,
		algod: Arc<dyn AlgodApi>,
		indexer: Option<Arc<dyn IndexerApi>>,
		watermark_store: Option<Arc<dyn WatermarkStore>>,
	) -> Result<Self> {
		config.validate()?;
		let watermark = match &watermark_store {
			Some(store) => store.load()?,
			None => 0,
		};
		let selectors = SelectorMap::new(&config.event_schemas);
		let (stop_signaller, stop_signal) = Signal::new();

		Ok(Self {
			config,
			algod,
			indexer,
			watermark_store,
			dispatcher: Dispatcher::new(),
			selectors,
			state: Mutex::new(SubscriberState { running: false, watermark }),
			stop_signaller: std::sync::Mutex::new(Some(stop_signaller)),
			stop_signal,
		})
	}

	/// Registers an event handler. Event names are `before_poll`, `poll`, `error`,
	/// `transaction:<filter>`, and `batch:<filter>`.
	pub fn on(&self, event_name: &str, handler: EventHandler) {
		self.dispatcher.on(event_name, handler);
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	/// The largest round fully processed and durably recorded.
	pub async fn watermark(&self) -> Round {
		self.state.lock().await.watermark
	}

	/// Signals cancellation: interrupts any sleep or wait-for-round and prevents further
	/// polls from starting. Idempotent.
	pub fn stop(&self, reason: &str) {
		if let Some(signaller) = self.stop_signaller.lock().unwrap().take() {
			signaller.signal(reason.to_string());
		}
	}

	/// One complete cycle: plan, fetch, filter, dispatch, then advance and persist the
	/// watermark. Either succeeds having advanced by exactly the planned amount, or fails
	/// leaving the watermark untouched.
	pub async fn poll_once(&self) -> Result<SubscriptionResult> {
		match self.poll_inner().await {
			Ok(result) => {
				self.dispatcher.emit(POLL_EVENT, SubscriberEvent::Poll(Arc::new(result.clone())));
				Ok(result)
			},
			Err(e) => {
				tracing::error!("Poll failed: {e:#}");
				let shared = Arc::new(e);
				self.dispatcher.emit(ERROR_EVENT, SubscriberEvent::Error(shared.clone()));
				Err(SharedPollError(shared).into())
			},
		}
	}

	async fn poll_inner(&self) -> Result<SubscriptionResult> {
		let starting_watermark = self.state.lock().await.watermark;

		let status = self.algod.status().await?;
		let tip = status.last_round;
		self.dispatcher.emit(
			BEFORE_POLL_EVENT,
			SubscriberEvent::BeforePoll { watermark: starting_watermark, tip },
		);

		let plan = plan_sync(starting_watermark, tip, &self.config, self.indexer.is_some())?;
		let candidates = execute_plan(
			&plan,
			&self.algod,
			self.indexer.as_ref(),
			&self.config.filters,
			&self.selectors,
		)
		.await?;

		let matches = self.collect_matches(candidates);
		self.dispatch_matches(&matches);

		if plan.new_watermark != starting_watermark {
			if let Some(store) = &self.watermark_store {
				store.save(plan.new_watermark)?;
			}
			self.state.lock().await.watermark = plan.new_watermark;
		}

		Ok(SubscriptionResult {
			starting_watermark,
			new_watermark: plan.new_watermark,
			synced_round_range: plan.sync_range,
			current_round: tip,
			matches,
		})
	}

	/// Runs the full predicate engine over every candidate and its inner subtree, applies
	/// the mapper, and groups matches per filter in config declaration order.
	fn collect_matches(&self, candidates: FilterCandidates) -> Vec<FilterMatches> {
		self.config
			.filters
			.iter()
			.zip(candidates)
			.map(|(named_filter, filter_candidates)| {
				let mut seen = HashSet::new();
				let mut transactions = Vec::new();
				for candidate in &filter_candidates {
					for node in candidate.iter_tree() {
						if filter::matches(&named_filter.filter, node) &&
							seen.insert(node.id.clone())
						{
							transactions.push(MatchedTransaction {
								mapped: named_filter.mapper.as_ref().map(|mapper| mapper(node)),
								transaction: Arc::new(node.clone()),
							});
						}
					}
				}
				FilterMatches { filter_name: named_filter.name.clone(), transactions }
			})
			.collect()
	}

	/// Batch first when non-empty, then the individual transaction emissions.
	fn dispatch_matches(&self, matches: &[FilterMatches]) {
		for group in matches {
			if group.transactions.is_empty() {
				continue;
			}
			self.dispatcher.emit(
				&batch_event(&group.filter_name),
				SubscriberEvent::Batch {
					filter_name: group.filter_name.clone(),
					transactions: Arc::new(group.transactions.clone()),
				},
			);
			for matched in &group.transactions {
				self.dispatcher.emit(
					&transaction_event(&group.filter_name),
					SubscriberEvent::Transaction {
						filter_name: group.filter_name.clone(),
						transaction: matched.clone(),
					},
				);
			}
		}
	}

	/// Polls until cancelled. Between polls the loop either long-polls the block source
	/// for the next round (when at the tip and configured to), or sleeps for `frequency`;
	/// failed polls are absorbed after a short backoff. Concurrent `start` is rejected.
	pub async fn start(self: &Arc<Self>) -> Result<()> {
		{
			let mut state = self.state.lock().await;
			if state.running {
				return Err(SubscriberError::AlreadyRunning.into());
			}
			state.running = true;
		}

		self.run_loop().await;

		self.state.lock().await.running = false;
		Ok(())
	}

	async fn run_loop(&self) {
		loop {
			{
				let mut signal = self.stop_signal.clone();
				if let Some(reason) = signal.get() {
					tracing::info!("Subscriber stopped: {reason}");
					return;
				}
			}

			let poll_result = self.poll_once().await;
			let stopped = self.stop_signal.clone().wait();

			match poll_result {
				Ok(result) => {
					let at_tip = result.synced_round_range.is_none() &&
						result.new_watermark >= result.current_round;
					if at_tip && self.config.wait_for_block_when_at_tip {
						tokio::select! {
							reason = stopped => {
								tracing::info!("Subscriber stopped: {reason}");
								return;
							},
							wait_result = tokio::time::timeout(
								WAIT_FOR_BLOCK_TIMEOUT,
								self.algod.status_after_block(result.new_watermark),
							) => {
								if let Ok(Err(e)) = wait_result {
									tracing::warn!("Wait for next round failed: {e}");
								}
							},
						}
					} else {
						tokio::select! {
							reason = stopped => {
								tracing::info!("Subscriber stopped: {reason}");
								return;
							},
							_ = tokio::time::sleep(self.config.frequency) => {},
						}
					}
				},
				// Already routed to the error channel; back off and carry on. The
				// operator can cancel from inside the error handler.
				Err(_) => {
					tokio::select! {
						reason = stopped => {
							tracing::info!("Subscriber stopped: {reason}");
							return;
						},
						_ = tokio::time::sleep(ERROR_RETRY_DELAY) => {},
					}
				},
			}
		}
	}
}
