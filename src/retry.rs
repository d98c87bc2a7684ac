use std::{cmp::min, future::Future, time::Duration};

use rand::Rng;

use crate::{
	constants::{HTTP_MAX_RETRIES, HTTP_RETRY_BASE_DELAY, HTTP_RETRY_FACTOR},
	error::ClientError,
};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub factor: u32,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_retries: HTTP_MAX_RETRIES, base_delay: HTTP_RETRY_BASE_DELAY, factor: HTTP_RETRY_FACTOR }
	}
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
	min(MAX_RETRY_DELAY, policy.base_delay.saturating_mul(policy.factor.saturating_pow(attempt)))
}

/// Runs `submit` until it succeeds, the error is not retryable, or the retry budget is
/// exhausted. Retries are delayed with exponential backoff and jitter; we avoid very small
/// delays by always sleeping at least half of the backoff.
pub async fn with_retries<T, Fut, F>(
	request_name: &str,
	policy: RetryPolicy,
	mut submit: F,
) -> Result<T, ClientError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ClientError>>,
{
	let mut attempt = 0u32;
	loop {
		match submit().await {
			Ok(t) => return Ok(t),
			Err(e) if e.is_retryable() && attempt < policy.max_retries => {
				let half = backoff_delay(&policy, attempt) / 2;
				let sleep_duration = half + rand::thread_rng().gen_range(Duration::default()..=half);
				tracing::warn!(
					"Request {request_name} failed on attempt {attempt}: {e}. Retrying in {}ms",
					sleep_duration.as_millis()
				);
				tokio::time::sleep(sleep_duration).await;
				attempt += 1;
			},
			Err(e) => return Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn test_policy() -> RetryPolicy {
		RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(1), factor: 2 }
	}

	#[tokio::test]
	async fn returns_first_success() {
		let calls = AtomicU32::new(0);
		let result = with_retries("test", test_policy(), || {
			calls.fetch_add(1, Ordering::Relaxed);
			async { Ok::<_, ClientError>(42u64) }
		})
		.await
		.unwrap();

		assert_eq!(result, 42);
		assert_eq!(calls.load(Ordering::Relaxed), 1);
	}

	#[tokio::test]
	async fn retries_transient_failures_until_success() {
		let calls = AtomicU32::new(0);
		let result = with_retries("test", test_policy(), || {
			let call = calls.fetch_add(1, Ordering::Relaxed);
			async move {
				if call < 2 {
					Err(ClientError::Network("connection reset".to_string()))
				} else {
					Ok(7u64)
				}
			}
		})
		.await
		.unwrap();

		assert_eq!(result, 7);
		assert_eq!(calls.load(Ordering::Relaxed), 3);
	}

	#[tokio::test]
	async fn gives_up_after_retry_budget() {
		let calls = AtomicU32::new(0);
		let result: Result<(), _> = with_retries("test", test_policy(), || {
			calls.fetch_add(1, Ordering::Relaxed);
			async { Err(ClientError::Network("connection reset".to_string())) }
		})
		.await;

		assert!(result.is_err());
		// Initial attempt plus the full retry budget.
		assert_eq!(calls.load(Ordering::Relaxed), 4);
	}

	#[tokio::test]
	async fn does_not_retry_validation_errors() {
		let calls = AtomicU32::new(0);
		let result: Result<(), _> = with_retries("test", test_policy(), || {
			calls.fetch_add(1, Ordering::Relaxed);
			async { Err(ClientError::InvalidRound(0)) }
		})
		.await;

		assert!(matches!(result, Err(ClientError::InvalidRound(0))));
		assert_eq!(calls.load(Ordering::Relaxed), 1);
	}
}
