//! Secret resolution: database URL is always required; feed API keys are
//! required only for feeds declared in config.

use ingest_config::secrets::resolve_secrets;
use serde_json::json;
use std::sync::Mutex;

// std::env::var is process-global; serialize these tests.
static ENV_LOCK: Mutex<()> = Mutex::new();

#[test]
fn missing_database_url_is_an_error() {
 let _g = ENV_LOCK.lock().unwrap();
 std::env::remove_var("TEST_DB_URL_ABSENT");

 let cfg = json!({ "db": { "url_env": "TEST_DB_URL_ABSENT" } });
 let err = resolve_secrets(&cfg).unwrap_err();
 assert!(err.to_string().contains("TEST_DB_URL_ABSENT"));
}

#[test]
fn missing_feed_api_key_is_an_error_naming_the_var() {
 let _g = ENV_LOCK.lock().unwrap();
 std::env::set_var("TEST_DB_URL_OK", "postgres://localhost/ingest");
 std::env::remove_var("TEST_NIVODA_KEY_ABSENT");

 let cfg = json!({
 "db": { "url_env": "TEST_DB_URL_OK" },
 "feeds": { "nivoda": { "api_key_env": "TEST_NIVODA_KEY_ABSENT" } }
 });

 let err = resolve_secrets(&cfg).unwrap_err();
 assert!(err.to_string().contains("TEST_NIVODA_KEY_ABSENT"));
 assert!(err.to_string().contains("nivoda"));
}

#[test]
fn demo_feed_without_api_key_env_needs_no_secret() {
 let _g = ENV_LOCK.lock().unwrap();
 std::env::set_var("TEST_DB_URL_OK2", "postgres://localhost/ingest");

 let cfg = json!({
 "db": { "url_env": "TEST_DB_URL_OK2" },
 "feeds": { "demo": {} }
 });

 let resolved = resolve_secrets(&cfg).unwrap();
 assert!(resolved.feed_api_keys.is_empty());
}

#[test]
fn resolved_secrets_debug_redacts_values() {
 let _g = ENV_LOCK.lock().unwrap();
 std::env::set_var("TEST_DB_URL_OK3", "postgres://localhost/ingest");
 std::env::set_var("TEST_NIVODA_KEY_OK", "super-secret-value");

 let cfg = json!({
 "db": { "url_env": "TEST_DB_URL_OK3" },
 "feeds": { "nivoda": { "api_key_env": "TEST_NIVODA_KEY_OK" } }
 });

 let resolved = resolve_secrets(&cfg).unwrap();
 let debug = format!("{resolved:?}");
 assert!(!debug.contains("super-secret-value"));
 assert!(debug.contains("REDACTED"));
}
