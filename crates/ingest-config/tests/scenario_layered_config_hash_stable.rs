//! Reordering keys within a YAML layer must not change the canonical hash;
//! differing values must.

use ingest_config::load_layered_yaml;
use std::io::Write;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
 let mut f = tempfile::NamedTempFile::new().unwrap();
 f.write_all(contents.as_bytes()).unwrap();
 f
}

#[test]
fn reordered_keys_produce_identical_hash() {
 let a = write_temp("feeds:\n demo:\n max_page_size: 50\ndb:\n url_env: X\n");
 let b = write_temp("db:\n url_env: X\nfeeds:\n demo:\n max_page_size: 50\n");

 let la = load_layered_yaml(&[a.path().to_str().unwrap()]).unwrap();
 let lb = load_layered_yaml(&[b.path().to_str().unwrap()]).unwrap();

 assert_eq!(la.config_hash, lb.config_hash);
}

#[test]
fn differing_values_produce_different_hash() {
 let a = write_temp("feeds:\n demo:\n max_page_size: 50\n");
 let b = write_temp("feeds:\n demo:\n max_page_size: 60\n");

 let la = load_layered_yaml(&[a.path().to_str().unwrap()]).unwrap();
 let lb = load_layered_yaml(&[b.path().to_str().unwrap()]).unwrap();

 assert_ne!(la.config_hash, lb.config_hash);
}

#[test]
fn later_layer_overrides_earlier_layer() {
 let base = write_temp("feeds:\n demo:\n max_page_size: 50\n nivoda:\n max_page_size: 100\n");
 let override_file = write_temp("feeds:\n demo:\n max_page_size: 25\n");

 let loaded = load_layered_yaml(&[
 base.path().to_str().unwrap(),
 override_file.path().to_str().unwrap(),
 ])
 .unwrap();

 assert_eq!(loaded.config_json["feeds"]["demo"]["max_page_size"],
 serde_json::json!(25));
 assert_eq!(loaded.config_json["feeds"]["nivoda"]["max_page_size"],
 serde_json::json!(100));
}
