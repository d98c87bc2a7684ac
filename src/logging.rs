use tracing_subscriber::EnvFilter;

/// Install a JSON-formatted tracing subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_json_logger() {
	tracing_subscriber::fmt()
		.json()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}

#[cfg(test)]
pub mod test_utils {
	use tracing_subscriber::EnvFilter;

	/// Best-effort plain logger for tests. Repeated initialisation is ignored so every test
	/// can call this unconditionally.
	pub fn init_test_logger() {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(
				EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
			)
			.with_test_writer()
			.try_init();
	}
}
