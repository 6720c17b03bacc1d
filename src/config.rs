use clap::Parser;
use serde::{Deserialize, Serialize};

/// Process configuration, parsed once at startup from env vars / CLI flags.
///
/// A malformed or missing required value is fatal: `Config::parse()` prints
/// the error and exits the process before a listener is bound.
#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
	/// Downstream auth secret clients must present as `Authorization: Bearer <key>`
	#[arg(long, env = "GATEWAY_API_KEY")]
	pub gateway_api_key: String,

	/// Upstream auth secret attached to every backend request
	#[arg(long, env = "BACKEND_API_KEY")]
	pub backend_api_key: String,

	/// Comma-separated base URLs for the chat pool (>= 2 expected)
	#[arg(long, env = "CHAT_BACKENDS", value_delimiter = ',')]
	pub chat_backends: Vec<String>,

	/// Single base URL for the text2sql pool
	#[arg(long, env = "TEXT2SQL_BACKEND")]
	pub text2sql_backend: String,

	/// Single base URL for the embeddings pool
	#[arg(long, env = "EMBED_BACKEND")]
	pub embed_backend: String,

	/// Single base URL for the rerank pool
	#[arg(long, env = "RERANK_BACKEND")]
	pub rerank_backend: String,

	/// RPS ceiling per client identity
	#[arg(long, env = "MAX_RPS_PER_IP", default_value = "50")]
	pub max_rps_per_ip: u32,

	/// Sliding rate-limit window length, in seconds
	#[arg(long, env = "RPS_WINDOW_SECS", default_value = "1")]
	pub rps_window_secs: u64,

	/// Minimum burst allowance regardless of the RPS ceiling
	#[arg(long, env = "RPS_BURST", default_value = "100")]
	pub rps_burst: u32,

	/// Per-client concurrency cap
	#[arg(long, env = "MAX_INFLIGHT_PER_IP", default_value = "120")]
	pub max_inflight_per_ip: usize,

	/// Max time a request may wait in the admission queue, in seconds
	#[arg(long, env = "QUEUE_TIMEOUT_SECS", default_value = "2")]
	pub queue_timeout_secs: u64,

	/// Hard request lifetime, in seconds (first upstream byte to last downstream byte)
	#[arg(long, env = "MAX_REQUEST_SECS", default_value = "5400")]
	pub max_request_secs: u64,

	/// Max permitted gap between consecutive upstream chunks, in seconds
	#[arg(long, env = "STREAM_IDLE_TIMEOUT_SECS", default_value = "180")]
	pub stream_idle_timeout_secs: u64,

	/// Reaper idle horizon: evict a client's state after this many idle seconds
	#[arg(long, env = "IP_IDLE_SECS", default_value = "900")]
	pub ip_idle_secs: u64,

	/// Reaper sweep interval, in seconds
	#[arg(long, env = "REAPER_PERIOD_SECS", default_value = "60")]
	pub reaper_period_secs: u64,

	/// Backend health probe interval, in seconds
	#[arg(long, env = "HEALTH_INTERVAL_SECS", default_value = "10")]
	pub health_interval_secs: u64,

	/// Consecutive probe failures before a backend is marked inactive
	#[arg(long, env = "HEALTH_FAIL_THRESHOLD", default_value = "3")]
	pub health_fail_threshold: u32,

	/// Consecutive probe successes before an inactive backend is marked active again
	#[arg(long, env = "HEALTH_OK_THRESHOLD", default_value = "2")]
	pub health_ok_threshold: u32,

	/// Bind host
	#[arg(long, env = "HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Bind port
	#[arg(long, env = "PORT", default_value = "8080")]
	pub port: u16,

	/// Tracing filter, e.g. "info" or "inference_gateway=debug,tower_http=info"
	#[arg(long, env = "RUST_LOG")]
	pub rust_log: Option<String>,

	/// Emit JSON-formatted logs instead of pretty-printed ones
	#[arg(long, env = "LOG_JSON", default_value = "false")]
	pub log_json: bool,
}

impl Config {
	pub fn rps_window(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.rps_window_secs)
	}

	pub fn queue_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.queue_timeout_secs)
	}

	pub fn max_request_lifetime(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.max_request_secs)
	}

	pub fn stream_idle_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.stream_idle_timeout_secs)
	}

	pub fn reaper_period(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.reaper_period_secs)
	}

	pub fn ip_idle(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.ip_idle_secs)
	}

	pub fn health_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.health_interval_secs)
	}

	/// `allowed = max(RPS_BURST, floor(MAX_RPS_PER_IP * RPS_WINDOW_SECS))`
	pub fn rate_window_allowance(&self) -> usize {
		let by_rate = (u64::from(self.max_rps_per_ip) * self.rps_window_secs) as usize;
		by_rate.max(self.rps_burst as usize)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config() -> Config {
		Config {
			gateway_api_key: "gw".into(),
			backend_api_key: "be".into(),
			chat_backends: vec!["http://a".into(), "http://b".into()],
			text2sql_backend: "http://t".into(),
			embed_backend: "http://e".into(),
			rerank_backend: "http://r".into(),
			max_rps_per_ip: 50,
			rps_window_secs: 1,
			rps_burst: 100,
			max_inflight_per_ip: 120,
			queue_timeout_secs: 2,
			max_request_secs: 5400,
			stream_idle_timeout_secs: 180,
			ip_idle_secs: 900,
			reaper_period_secs: 60,
			health_interval_secs: 10,
			health_fail_threshold: 3,
			health_ok_threshold: 2,
			host: "0.0.0.0".into(),
			port: 8080,
			rust_log: None,
			log_json: false,
		}
	}

	#[test]
	fn allowance_falls_back_to_burst_when_rate_product_is_smaller() {
		let config = base_config();
		assert_eq!(config.rate_window_allowance(), 100);
	}

	#[test]
	fn allowance_uses_rate_product_when_it_exceeds_burst() {
		let mut config = base_config();
		config.max_rps_per_ip = 50;
		config.rps_window_secs = 10;
		config.rps_burst = 100;
		assert_eq!(config.rate_window_allowance(), 500);
	}
}
