use std::ops::{Deref, DerefMut};

struct MutexStateAndPoisonFlag<T> {
	poisoned: bool,
	state: T,
}

pub struct MutexGuard<'a, T> {
	guard: tokio::sync::MutexGuard<'a, MutexStateAndPoisonFlag<T>>,
}
impl<T> Deref for MutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.guard.deref().state
	}
}
impl<T> DerefMut for MutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.guard.deref_mut().state
	}
}
impl<T> Drop for MutexGuard<'_, T> {
	fn drop(&mut self) {
		let guarded = self.guard.deref_mut();
		if !guarded.poisoned && std::thread::panicking() {
			guarded.poisoned = true;
		}
	}
}

/// This mutex implementation will panic when it is locked iff a thread previously panicked while
/// holding it. This ensures potentially broken data cannot be seen by other threads.
pub struct Mutex<T> {
	mutex: tokio::sync::Mutex<MutexStateAndPoisonFlag<T>>,
}
impl<T> Mutex<T> {
	pub fn new(t: T) -> Self {
		Self { mutex: tokio::sync::Mutex::new(MutexStateAndPoisonFlag { poisoned: false, state: t }) }
	}
	pub async fn lock(&self) -> MutexGuard<'_, T> {
		let guard = self.mutex.lock().await;

		if guard.deref().poisoned {
			panic!("Another thread panicked while holding this lock");
		} else {
			MutexGuard { guard }
		}
	}
}

pub struct Signaller<T> {
	sender: async_broadcast::Sender<T>,
}
impl<T: Clone + Send + 'static> Signaller<T> {
	pub fn signal(self, t: T) {
		// Closed means every receiver was dropped, in which case there is nothing to wake.
		match self.sender.try_broadcast(t) {
			Ok(None) | Err(async_broadcast::TrySendError::Closed(_)) => (),
			_ => unreachable!("one-shot signal channel with capacity 1"),
		}
	}
}

/// A one-shot broadcast used as the subscriber's cancellation signal. Cloned receivers either
/// observe the signalled value or wait for it.
#[derive(Clone)]
pub enum Signal<T> {
	Pending(async_broadcast::Receiver<T>),
	Signalled(T),
}
impl<T: Clone + Send + 'static> Signal<T> {
	pub fn new() -> (Signaller<T>, Self) {
		let (sender, receiver) = async_broadcast::broadcast(1);

		(Signaller { sender }, Self::Pending(receiver))
	}

	pub fn get(&mut self) -> Option<&T> {
		match self {
			Signal::Pending(receiver) => match receiver.try_recv() {
				Ok(t) => {
					*self = Self::Signalled(t);
					match self {
						Signal::Pending(_) => unreachable!(),
						Signal::Signalled(t) => Some(t),
					}
				},
				Err(_err) => None,
			},
			Signal::Signalled(t) => Some(t),
		}
	}

	pub async fn wait(self) -> T {
		match self {
			Signal::Pending(mut receiver) => match receiver.recv().await {
				Ok(t) => t,
				Err(_err) => futures::future::pending().await,
			},
			Signal::Signalled(t) => t,
		}
	}
}
