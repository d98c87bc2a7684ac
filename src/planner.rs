//! Decides what to fetch next: the source, the inclusive round range, and the watermark to
//! adopt once the poll succeeds. The planner is memoryless across polls; resumption relies
//! entirely on the watermark.

use std::{cmp::min, ops::RangeInclusive};

use crate::{
	error::SubscriberError,
	subscriber::SubscriberConfig,
	transaction::{Round, SyncBehaviour},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
	Algod,
	Indexer,
	None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
	pub source: PlanSource,
	/// Inclusive, contiguous; `None` when the plan covers nothing.
	pub sync_range: Option<RangeInclusive<Round>>,
	pub new_watermark: Round,
}

impl SyncPlan {
	fn noop(new_watermark: Round) -> Self {
		Self { source: PlanSource::None, sync_range: None, new_watermark }
	}
}

/// When the range is shortened by a limit, the remainder is reserved for the next poll.
pub fn plan_sync(
	watermark: Round,
	tip: Round,
	config: &SubscriberConfig,
	has_history_source: bool,
) -> Result<SyncPlan, SubscriberError> {
	if watermark >= tip {
		return Ok(SyncPlan::noop(watermark));
	}

	let from = watermark + 1;
	Ok(match config.sync_behaviour {
		SyncBehaviour::SkipSyncNewest => SyncPlan::noop(tip),
		// First ever run: adopt the tip as the starting position without processing.
		SyncBehaviour::SyncOldestStartNow if watermark == 0 => SyncPlan::noop(tip),
		SyncBehaviour::CatchupWithIndexer
			if has_history_source && tip - watermark > config.max_rounds_to_sync =>
		{
			let to = min(watermark + config.max_history_rounds_to_sync, tip);
			SyncPlan { source: PlanSource::Indexer, sync_range: Some(from..=to), new_watermark: to }
		},
		SyncBehaviour::Fail if tip > watermark + config.max_rounds_to_sync => {
			return Err(SubscriberError::BehindTip {
				watermark,
				tip,
				max_rounds_to_sync: config.max_rounds_to_sync,
			})
		},
		_ => {
			let to = min(watermark + config.max_rounds_to_sync, tip);
			SyncPlan { source: PlanSource::Algod, sync_range: Some(from..=to), new_watermark: to }
		},
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::subscriber::SubscriberConfig;

	fn config(behaviour: SyncBehaviour) -> SubscriberConfig {
		SubscriberConfig {
			max_rounds_to_sync: 10,
			max_history_rounds_to_sync: 100,
			sync_behaviour: behaviour,
			..Default::default()
		}
	}

	#[test]
	fn at_or_ahead_of_tip_is_a_noop() {
		let plan = plan_sync(1000, 1000, &config(SyncBehaviour::SyncOldest), false).unwrap();
		assert_eq!(plan, SyncPlan::noop(1000));

		let plan = plan_sync(1001, 1000, &config(SyncBehaviour::SyncOldest), false).unwrap();
		assert_eq!(plan, SyncPlan::noop(1001));
	}

	#[test]
	fn sync_oldest_caps_the_range_and_reserves_the_rest() {
		let plan = plan_sync(1000, 1100, &config(SyncBehaviour::SyncOldest), false).unwrap();
		assert_eq!(plan.source, PlanSource::Algod);
		assert_eq!(plan.sync_range, Some(1001..=1010));
		assert_eq!(plan.new_watermark, 1010);

		// The next poll resumes from the watermark alone.
		let next = plan_sync(plan.new_watermark, 1100, &config(SyncBehaviour::SyncOldest), false)
			.unwrap();
		assert_eq!(next.sync_range, Some(1011..=1020));
	}

	#[test]
	fn small_gaps_are_not_capped() {
		let plan = plan_sync(1000, 1005, &config(SyncBehaviour::SyncOldest), false).unwrap();
		assert_eq!(plan.sync_range, Some(1001..=1005));
		assert_eq!(plan.new_watermark, 1005);
	}

	#[test]
	fn catchup_uses_the_history_source_for_large_gaps() {
		let plan = plan_sync(900, 1000, &config(SyncBehaviour::CatchupWithIndexer), true).unwrap();
		assert_eq!(plan.source, PlanSource::Indexer);
		assert_eq!(plan.sync_range, Some(901..=1000));
		assert_eq!(plan.new_watermark, 1000);
	}

	#[test]
	fn catchup_caps_history_ranges() {
		let plan = plan_sync(0, 5000, &config(SyncBehaviour::CatchupWithIndexer), true).unwrap();
		assert_eq!(plan.source, PlanSource::Indexer);
		assert_eq!(plan.sync_range, Some(1..=100));
	}

	#[test]
	fn catchup_falls_back_to_algod_when_close_or_without_indexer() {
		// Within max_rounds_to_sync of the tip.
		let plan = plan_sync(995, 1000, &config(SyncBehaviour::CatchupWithIndexer), true).unwrap();
		assert_eq!(plan.source, PlanSource::Algod);
		assert_eq!(plan.sync_range, Some(996..=1000));

		// No history source provided.
		let plan = plan_sync(0, 5000, &config(SyncBehaviour::CatchupWithIndexer), false).unwrap();
		assert_eq!(plan.source, PlanSource::Algod);
		assert_eq!(plan.sync_range, Some(1..=10));
	}

	#[test]
	fn skip_sync_newest_jumps_to_tip_without_processing() {
		let plan = plan_sync(0, 1000, &config(SyncBehaviour::SkipSyncNewest), false).unwrap();
		assert_eq!(plan, SyncPlan::noop(1000));
	}

	#[test]
	fn sync_oldest_start_now_skips_only_the_first_run() {
		let first = plan_sync(0, 1000, &config(SyncBehaviour::SyncOldestStartNow), false).unwrap();
		assert_eq!(first, SyncPlan::noop(1000));

		let later =
			plan_sync(1000, 1050, &config(SyncBehaviour::SyncOldestStartNow), false).unwrap();
		assert_eq!(later.source, PlanSource::Algod);
		assert_eq!(later.sync_range, Some(1001..=1010));
	}

	#[test]
	fn fail_behaviour_raises_when_too_far_behind() {
		assert!(matches!(
			plan_sync(0, 1000, &config(SyncBehaviour::Fail), false),
			Err(SubscriberError::BehindTip { watermark: 0, tip: 1000, max_rounds_to_sync: 10 })
		));

		// Close enough proceeds like sync-oldest.
		let plan = plan_sync(995, 1000, &config(SyncBehaviour::Fail), false).unwrap();
		assert_eq!(plan.source, PlanSource::Algod);
		assert_eq!(plan.sync_range, Some(996..=1000));
	}
}
