//! Thread-safe routing of poll outputs to user-registered handlers. Emissions are
//! best-effort asynchronous: each handler drains its own queue on its own task, so one
//! handler sees its emissions in order while independent handlers run concurrently, and a
//! failing handler never blocks the others.

use std::{
	collections::HashMap,
	panic::AssertUnwindSafe,
	sync::{Arc, Mutex, Weak},
};

use anyhow::anyhow;
use futures::{future::BoxFuture, FutureExt};
use tokio::sync::mpsc;

use crate::{
	subscriber::{MatchedTransaction, SubscriptionResult},
	transaction::Round,
};

pub const BEFORE_POLL_EVENT: &str = "before_poll";
pub const POLL_EVENT: &str = "poll";
pub const ERROR_EVENT: &str = "error";

pub fn transaction_event(filter_name: &str) -> String {
	format!("transaction:{filter_name}")
}

pub fn batch_event(filter_name: &str) -> String {
	format!("batch:{filter_name}")
}

#[derive(Clone)]
pub enum SubscriberEvent {
	BeforePoll { watermark: Round, tip: Round },
	Poll(Arc<SubscriptionResult>),
	Error(Arc<anyhow::Error>),
	Batch { filter_name: String, transactions: Arc<Vec<MatchedTransaction>> },
	Transaction { filter_name: String, transaction: MatchedTransaction },
}

pub type EventHandler =
	Arc<dyn Fn(SubscriberEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Convenience for registering a closure returning any future as a handler.
pub fn handler<F, Fut>(f: F) -> EventHandler
where
	F: Fn(SubscriberEvent) -> Fut + Send + Sync + 'static,
	Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
	Arc::new(move |event| f(event).boxed())
}

struct HandlerEntry {
	queue: mpsc::UnboundedSender<SubscriberEvent>,
}

#[derive(Default)]
pub struct Dispatcher {
	// Registrations and emissions may race; the table itself is the only shared state.
	listeners: Mutex<HashMap<String, Vec<HandlerEntry>>>,
}

impl Dispatcher {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Registers `handler` for `event_name`. Handlers registered for the same event each
	/// receive every emission, in registration order; a single handler observes emissions
	/// in the order they were issued.
	pub fn on(self: &Arc<Self>, event_name: &str, handler: EventHandler) {
		let (queue, mut receiver) = mpsc::unbounded_channel::<SubscriberEvent>();

		let dispatcher: Weak<Dispatcher> = Arc::downgrade(self);
		let event_name_owned = event_name.to_string();
		tokio::spawn(async move {
			while let Some(event) = receiver.recv().await {
				match AssertUnwindSafe(handler(event)).catch_unwind().await {
					Ok(Ok(())) => {},
					Ok(Err(e)) => report_handler_failure(&dispatcher, &event_name_owned, e),
					Err(_) => report_handler_failure(
						&dispatcher,
						&event_name_owned,
						anyhow!("handler panicked"),
					),
				}
			}
		});

		self.listeners
			.lock()
			.unwrap()
			.entry(event_name.to_string())
			.or_default()
			.push(HandlerEntry { queue });
	}

	/// Enqueues `event` for every handler registered for `event_name` without waiting for
	/// any of them to run.
	pub fn emit(&self, event_name: &str, event: SubscriberEvent) {
		let listeners = self.listeners.lock().unwrap();
		if let Some(entries) = listeners.get(event_name) {
			for entry in entries {
				// A send failure means the worker task is gone, i.e. the runtime is
				// shutting down; nothing to do.
				let _result = entry.queue.send(event.clone());
			}
		}
	}
}

/// A failing handler is logged and reported on the error channel. Failures of handlers on
/// the error channel itself are only logged, so an error handler cannot observe a feedback
/// loop of its own making.
fn report_handler_failure(dispatcher: &Weak<Dispatcher>, event_name: &str, error: anyhow::Error) {
	tracing::error!("Handler for {event_name} failed: {error:#}");
	if event_name != ERROR_EVENT {
		if let Some(dispatcher) = dispatcher.upgrade() {
			dispatcher.emit(ERROR_EVENT, SubscriberEvent::Error(Arc::new(error)));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tokio::sync::mpsc::unbounded_channel;

	fn tip_of(event: &SubscriberEvent) -> Round {
		match event {
			SubscriberEvent::BeforePoll { tip, .. } => *tip,
			_ => panic!("expected a before_poll event"),
		}
	}

	async fn recv_timeout<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> T {
		tokio::time::timeout(Duration::from_secs(5), receiver.recv())
			.await
			.expect("timed out waiting for a handler emission")
			.expect("channel closed")
	}

	#[tokio::test]
	async fn each_handler_sees_emissions_in_issue_order() {
		let dispatcher = Dispatcher::new();
		let (sender, mut receiver) = unbounded_channel();

		dispatcher.on(
			"before_poll",
			handler(move |event| {
				let sender = sender.clone();
				async move {
					sender.send(tip_of(&event)).unwrap();
					Ok(())
				}
			}),
		);

		for tip in 1..=5 {
			dispatcher.emit("before_poll", SubscriberEvent::BeforePoll { watermark: 0, tip });
		}

		for expected in 1..=5 {
			assert_eq!(recv_timeout(&mut receiver).await, expected);
		}
	}

	#[tokio::test]
	async fn unrelated_event_names_do_not_cross() {
		let dispatcher = Dispatcher::new();
		let (sender, mut receiver) = unbounded_channel();

		dispatcher.on(
			"transaction:payments",
			handler(move |event| {
				let sender = sender.clone();
				async move {
					sender.send(tip_of(&event)).unwrap();
					Ok(())
				}
			}),
		);

		dispatcher.emit("transaction:other", SubscriberEvent::BeforePoll { watermark: 0, tip: 1 });
		dispatcher
			.emit("transaction:payments", SubscriberEvent::BeforePoll { watermark: 0, tip: 2 });

		assert_eq!(recv_timeout(&mut receiver).await, 2);
		assert!(receiver.try_recv().is_err());
	}

	#[tokio::test]
	async fn a_failing_handler_does_not_stop_its_peers() {
		let dispatcher = Dispatcher::new();
		let (sender, mut receiver) = unbounded_channel();
		let (error_sender, mut error_receiver) = unbounded_channel();

		dispatcher.on("poll", handler(|_| async { Err(anyhow!("handler exploded")) }));
		dispatcher.on(
			"poll",
			handler(move |event| {
				let sender = sender.clone();
				async move {
					sender.send(tip_of(&event)).unwrap();
					Ok(())
				}
			}),
		);
		dispatcher.on(
			ERROR_EVENT,
			handler(move |event| {
				let error_sender = error_sender.clone();
				async move {
					if let SubscriberEvent::Error(e) = event {
						error_sender.send(e.to_string()).unwrap();
					}
					Ok(())
				}
			}),
		);

		dispatcher.emit("poll", SubscriberEvent::BeforePoll { watermark: 0, tip: 9 });

		assert_eq!(recv_timeout(&mut receiver).await, 9);
		assert_eq!(recv_timeout(&mut error_receiver).await, "handler exploded");
	}

	#[tokio::test]
	async fn a_panicking_handler_is_reported_not_propagated() {
		let dispatcher = Dispatcher::new();
		let (error_sender, mut error_receiver) = unbounded_channel();

		dispatcher.on("poll", handler(|_| async { panic!("boom") }));
		dispatcher.on(
			ERROR_EVENT,
			handler(move |event| {
				let error_sender = error_sender.clone();
				async move {
					if let SubscriberEvent::Error(e) = event {
						error_sender.send(e.to_string()).unwrap();
					}
					Ok(())
				}
			}),
		);

		dispatcher.emit("poll", SubscriberEvent::BeforePoll { watermark: 0, tip: 1 });

		assert_eq!(recv_timeout(&mut error_receiver).await, "handler panicked");
	}

	#[tokio::test]
	async fn failing_error_handlers_do_not_feed_back() {
		let dispatcher = Dispatcher::new();
		let (error_sender, mut error_receiver) = unbounded_channel();

		dispatcher.on(ERROR_EVENT, handler(|_| async { Err(anyhow!("error handler failed")) }));
		dispatcher.on(
			ERROR_EVENT,
			handler(move |_| {
				let error_sender = error_sender.clone();
				async move {
					error_sender.send(()).unwrap();
					Ok(())
				}
			}),
		);

		dispatcher.emit(ERROR_EVENT, SubscriberEvent::Error(Arc::new(anyhow!("original"))));

		// Exactly one error emission is observed: the original. The failing error handler
		// is logged without re-emission.
		recv_timeout(&mut error_receiver).await;
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(error_receiver.try_recv().is_err());
	}
}
