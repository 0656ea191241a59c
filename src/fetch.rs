//! HTTP boundary: a shared blocking client and the courtesy-rate-limited
//! page downloader. One fixed sleep after every request; the delay is
//! politeness toward the source site, not a correctness mechanism.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAUSE_SECS: u64 = 4;

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Downloads `url` into `path` unless the file is already on disk. Returns
/// whether a request was made. Re-running a partially-finished scrape only
/// fetches what is still missing.
pub fn maybe_download_file(url: &str, path: &Path, pause: Duration) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }

    let response = http_client()?
        .get(url)
        .send()
        .with_context(|| format!("fetch {url}"))?;
    let status = response.status();
    if !status.is_success() {
        thread::sleep(pause);
        return Err(anyhow!("fetch {url}: http status {status}"));
    }
    let body = response
        .bytes()
        .with_context(|| format!("read body of {url}"))?;
    fs::write(path, &body).with_context(|| format!("write {}", path.display()))?;
    thread::sleep(pause);
    Ok(true)
}
