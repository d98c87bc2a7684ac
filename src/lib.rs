//! Subscribes to the Algorand ledger and delivers round-ordered streams of matching
//! transactions to user code, with at-least-once semantics and a crash-recoverable
//! watermark. Recent rounds come from an algod node; large catch-ups can be served from an
//! indexer. Transactions from both sources are normalized into one canonical shape,
//! enriched with synthesized balance changes and decoded ARC-28 events, filtered, and
//! routed through a named event bus.

pub mod algod;
pub mod arc28;
pub mod balance_changes;
pub mod block;
pub mod common;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod indexer;
pub mod logging;
pub mod normalize;
pub mod planner;
pub mod retry;
pub mod settings;
pub mod subscriber;
pub mod transaction;
pub mod watermark;

pub use crate::{
	algod::{AlgodApi, AlgodHttpClient, NodeStatus},
	arc28::{AbiType, EventArg, EventSchema},
	dispatcher::{handler, Dispatcher, EventHandler, SubscriberEvent},
	error::{ClientError, SubscriberError},
	filter::{BalanceChangeFilter, EventFilter, NamedFilter, TransactionFilter},
	indexer::{IndexerApi, IndexerHttpClient},
	settings::Settings,
	subscriber::{
		FilterMatches, MatchedTransaction, Subscriber, SubscriberConfig, SubscriptionResult,
	},
	transaction::{
		AbiValue, Arc28Event, BalanceChange, BalanceChangeRole, OnCompletion, Round,
		SyncBehaviour, Transaction, TransactionPayload, TransactionType,
	},
	watermark::{FileWatermarkStore, InMemoryWatermarkStore, WatermarkStore},
};
