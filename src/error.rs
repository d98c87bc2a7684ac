use crate::transaction::Round;

/// Failure modes of the injected block and history sources.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
	#[error("network error: {0}")]
	Network(String),
	#[error("api error (status {status}): {body}")]
	Api { status: u16, body: String },
	#[error("invalid round {0}")]
	InvalidRound(Round),
}

impl ClientError {
	/// Transport failures, upstream server errors, and throttling are worth retrying;
	/// validation failures (including the 404 a not-yet-available block produces) are not.
	pub fn is_retryable(&self) -> bool {
		match self {
			ClientError::Network(_) => true,
			ClientError::Api { status, .. } => *status >= 500 || *status == 429,
			ClientError::InvalidRound(_) => false,
		}
	}
}

#[derive(thiserror::Error, Debug)]
pub enum SubscriberError {
	#[error("configuration error: {0}")]
	Configuration(String),
	#[error(
		"behind tip: watermark {watermark} is more than {max_rounds_to_sync} rounds behind round {tip}"
	)]
	BehindTip { watermark: Round, tip: Round, max_rounds_to_sync: u64 },
	#[error("subscriber is already running")]
	AlreadyRunning,
}
