use reqwest::Client;
use std::process::{Command, Stdio};
use std::{net::TcpListener, path::Path, time::Duration};
use tokio::time::sleep;

pub const ADMIN_TOKEN: &str = "test-token";

/// Get an available ephemeral port on localhost.
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Poll /healthz until the server responds OK or timeout.
pub async fn wait_ready(base: &str, timeout_ms: u64) -> anyhow::Result<()> {
    let client = Client::new();
    let mut waited = 0u64;
    loop {
        if waited >= timeout_ms {
            anyhow::bail!("server not ready after {}ms", timeout_ms);
        }
        if let Ok(resp) = client.get(format!("{}/healthz", base)).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(50)).await;
        waited += 50;
    }
}

/// Poll `check` every 50ms until it returns `Some` or the timeout passes.
pub async fn wait_for<T, F, Fut>(timeout_ms: u64, mut check: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<Option<T>>>,
{
    let mut waited = 0u64;
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if waited >= timeout_ms {
            anyhow::bail!("condition not met after {}ms", timeout_ms);
        }
        sleep(Duration::from_millis(50)).await;
        waited += 50;
    }
}

// Struct that ensures the child process is killed on drop
pub struct ChildGuard(std::process::Child);
impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

/// Starts the service binary on a free port with an in-memory database, the
/// in-process ledger and in-memory content.
pub async fn setup_server(batch_threshold: usize) -> anyhow::Result<(String, ChildGuard)> {
    let bin = env!("CARGO_BIN_EXE_vote-service");
    assert!(Path::new(bin).exists(), "binary not found at {}", bin);

    let port = find_free_port();
    let base_url = format!("http://127.0.0.1:{}", port);

    let child = Command::new(bin)
        .env("METRICS_AUTH_TOKEN", ADMIN_TOKEN)
        .env("DB_PATH", ":memory:")
        .env("CONTENT_STORE", "memory")
        .env("BATCH_THRESHOLD", batch_threshold.to_string())
        .env("CONFIRMATION_POLL_MS", "50")
        .env("RATE_LIMIT_PER_SECOND", "1000")
        .env("RATE_LIMIT_BURST", "1000")
        .env("PORT", port.to_string())
        .env("RUST_LOG", "info")
        .env_remove("LEDGER_URL")
        .env_remove("LEDGER_STATE_PATH")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // Ensure we always try to kill the child on exit
    let guard = ChildGuard(child);

    wait_ready(&base_url, 10_000).await?;

    Ok((base_url, guard))
}
