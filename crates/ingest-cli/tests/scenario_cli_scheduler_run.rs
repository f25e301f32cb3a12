//! `ingest scheduler run --feed demo` against a real Postgres.

use assert_cmd::Command;

macro_rules! skip_if_no_db {
 () => {
 match std::env::var(ingest_db::ENV_DB_URL) {
 Ok(v) => v,
 Err(_) => {
 eprintln!("SKIP: INGEST_DATABASE_URL not set");
 return Ok(());
 }
 }
 };
}

#[tokio::test]
async fn scheduler_run_prints_a_run_id() -> anyhow::Result<()> {
 let url = skip_if_no_db!();
 let pool = ingest_db::connect(&url).await?;
 ingest_db::migrate(&pool).await?;

 let dir = tempfile::tempdir()?;
 let output = Command::cargo_bin("ingest")?
 .arg("scheduler")
 .arg("run")
 .arg("--feed")
 .arg("demo")
 .env(ingest_db::ENV_DB_URL, &url)
 .env("INGEST_WATERMARK_DIR", dir.path())
 .output()?;

 assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
 let stdout = String::from_utf8(output.stdout)?;
 assert!(stdout.contains("run_id="));
 assert!(stdout.contains("outcome="));
 Ok(())
}
