//! Secrets resolution.
//!
//! This module is the single source of truth for runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (e.g. `"NIVODA_API_KEY"`).
//! - At startup, callers invoke [`resolve_secrets`] once.
//! - The returned [`ResolvedSecrets`] is passed into constructors; never
//! scatter `std::env::var` calls across the codebase.
//! - `Debug` impls on all secret-containing structs redact values.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Requirements
//! - The database URL is always required (the relational store
//! is load-bearing infrastructure for every run type).
//! - Each registered feed's adapter credentials are required only if that
//! feed is enabled in config; the demo feed needs no credentials at all.

use anyhow::{bail, Result};
use serde_json::Value;

/// All runtime-resolved secrets for one process instantiation.
///
/// Built once at startup via [`resolve_secrets`]. Pass to constructors. Do
/// not scatter `std::env::var` calls elsewhere. Values are redacted in
/// `Debug` output.
#[derive(Clone)]
pub struct ResolvedSecrets {
 pub database_url: String,
 pub queue_url: Option<String>,
 /// Feed name -> API key, for every feed that declared a credential env
 /// var in config and had it set.
 pub feed_api_keys: std::collections::BTreeMap<String, String>,
}

impl std::fmt::Debug for ResolvedSecrets {
 fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
 f.debug_struct("ResolvedSecrets")
 .field("database_url", &"<REDACTED>")
 .field("queue_url", &self.queue_url.as_ref().map(|_| "<REDACTED>"))
 .field("feed_api_keys",
 &self
 .feed_api_keys
 .keys()
 .map(|k| (k.clone(), "<REDACTED>"))
 .collect::<std::collections::BTreeMap<_, _>>())
 .finish()
 }
}

/// Env var NAMES extracted from the config JSON, keyed by feed.
struct SecretEnvNames {
 database_url_var: String,
 queue_url_var: Option<String>,
 feed_api_key_vars: Vec<(String, String)>,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
 let s = config.pointer(pointer)?.as_str()?;
 let trimmed = s.trim();
 if trimmed.is_empty() {
 None
 } else {
 Some(trimmed.to_string())
 }
}

/// Resolve a named environment variable. Returns `None` if unset or blank.
/// Never returns the value in an error path — callers report the NAME only.
fn resolve_env(var_name: &str) -> Option<String> {
 match std::env::var(var_name) {
 Ok(v) if !v.trim().is_empty() => Some(v),
 _ => None,
 }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
 let database_url_var = read_str_at(config_json, "/db/url_env")
 .unwrap_or_else(|| "INGEST_DATABASE_URL".to_string());
 let queue_url_var = read_str_at(config_json, "/queue/url_env");

 let mut feed_api_key_vars = Vec::new();
 if let Some(feeds) = config_json.pointer("/feeds").and_then(Value::as_object) {
 for (feed_name, feed_cfg) in feeds {
 if let Some(var) = feed_cfg
 .pointer("/api_key_env")
 .and_then(Value::as_str())
 .map(str::to_string())
 {
 feed_api_key_vars.push((feed_name.clone(), var));
 }
 }
 }

 SecretEnvNames {
 database_url_var,
 queue_url_var,
 feed_api_key_vars,
 }
}

/// Resolve all secrets from the environment.
///
/// # Errors
/// Returns `Err` naming the missing env var. The database URL is always
/// required; a feed's API key is required only if that feed appears under
/// `/feeds/<name>` in config with an `api_key_env` pointer.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
 let names = parse_env_names(config_json);

 let database_url = resolve_env(&names.database_url_var).ok_or_else(|| {
 anyhow::anyhow!("SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
 names.database_url_var)
 })?;

 let queue_url = names.queue_url_var.as_deref().and_then(resolve_env);

 let mut feed_api_keys = std::collections::BTreeMap::new();
 for (feed, var) in &names.feed_api_key_vars {
 match resolve_env(var) {
 Some(key) => {
 feed_api_keys.insert(feed.clone(), key);
 }
 None => bail!("SECRETS_MISSING feed={feed}: required env var '{var}' (api key) is not set or empty"),
 }
 }

 Ok(ResolvedSecrets {
 database_url,
 queue_url,
 feed_api_keys,
 })
}
