use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{SETTINGS_ENV_PREFIX, SETTINGS_ENV_SEPARATOR};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
	pub http_endpoint: String,
	#[serde(default)]
	pub auth_token: Option<String>,
}

/// Connection settings for the two upstream sources. The indexer section is optional, matching
/// the optionality of the history source itself.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
	pub algod: HttpEndpoint,
	#[serde(default)]
	pub indexer: Option<HttpEndpoint>,
}

impl Settings {
	/// Merges the given TOML file (if any) with `ALGORAND_SUBSCRIBER__`-prefixed environment
	/// variables; the environment takes precedence.
	pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
		let mut builder = Config::builder();

		if let Some(path) = config_path {
			builder = builder.add_source(File::with_name(path));
		}

		let settings: Settings = builder
			.add_source(
				Environment::with_prefix(SETTINGS_ENV_PREFIX).separator(SETTINGS_ENV_SEPARATOR),
			)
			.build()?
			.try_deserialize()?;

		settings.validate()?;
		Ok(settings)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("algod", &self.algod)?;
		if let Some(indexer) = &self.indexer {
			validate_endpoint("indexer", indexer)?;
		}
		Ok(())
	}
}

fn validate_endpoint(name: &str, endpoint: &HttpEndpoint) -> Result<(), ConfigError> {
	url::Url::parse(&endpoint.http_endpoint).map_err(|e| {
		ConfigError::Message(format!("invalid {name} endpoint {}: {e}", endpoint.http_endpoint))
	})?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loads_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("Settings.toml");
		std::fs::write(
			&path,
			r#"
				[algod]
				http_endpoint = "http://localhost:4001"
				auth_token = "aaaa"

				[indexer]
				http_endpoint = "http://localhost:8980"
			"#,
		)
		.unwrap();

		let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
		assert_eq!(settings.algod.http_endpoint, "http://localhost:4001");
		assert_eq!(settings.algod.auth_token.as_deref(), Some("aaaa"));
		assert_eq!(
			settings.indexer,
			Some(HttpEndpoint {
				http_endpoint: "http://localhost:8980".to_string(),
				auth_token: None
			})
		);
	}

	#[test]
	fn rejects_unparseable_endpoint() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("Settings.toml");
		std::fs::write(&path, "[algod]\nhttp_endpoint = \"not a url\"\n").unwrap();

		assert!(Settings::load(Some(path.to_str().unwrap())).is_err());
	}
}
