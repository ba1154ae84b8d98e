use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::{Client, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::engine::models::RemoteManifest;
use crate::error::{LauncherError, LauncherResult};
use crate::util::{format_size, format_speed, progress_percent};

const USER_AGENT: &str = concat!("industricraft-launcher/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
// A stalled transfer errors out instead of hanging the cycle.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of the authoritative manifest for one update cycle.
pub trait ManifestSource {
    async fn fetch_manifest(&self) -> LauncherResult<RemoteManifest>;
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Fetch a small text document. `file://` URLs are read from disk.
    pub async fn fetch_text(&self, url: &Url) -> LauncherResult<String> {
        if url.scheme() == "file" {
            let path = local_path(url).map_err(LauncherError::Network)?;
            return tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| LauncherError::Network(format!("failed to read {}: {e}", path.display())));
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LauncherError::Network(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::Network(format!(
                "{url} returned status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| LauncherError::Network(format!("failed to read body of {url}: {e}")))
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// `file://` URLs are copied, which lets a local mirror stand in for the
    /// update server.
    pub async fn download_to_path(&self, url: &Url, dest: &Path, label: &str) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::apply(label, parent, e))?;
        }

        if url.scheme() == "file" {
            let source = local_path(url).map_err(|reason| LauncherError::download(url.as_str(), reason))?;
            let copied = tokio::fs::copy(&source, dest)
                .await
                .map_err(|e| LauncherError::download(url.as_str(), e))?;
            debug!("download: copied {} ({})", source.display(), format_size(copied));
            return Ok(copied);
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LauncherError::download(url.as_str(), e))?
            .error_for_status()
            .map_err(|e| LauncherError::download(url.as_str(), e))?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| LauncherError::apply(label, dest, e))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();
        let mut last_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LauncherError::download(url.as_str(), e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::apply(label, dest, e))?;
            downloaded += chunk.len() as u64;

            let elapsed = last_tick.elapsed().as_secs_f32();
            if elapsed > 0.5 {
                let speed = (downloaded - last_bytes) as f32 / elapsed;
                debug!(
                    "download {}: {} ({:.1}%) at {}",
                    label,
                    format_size(downloaded),
                    progress_percent(downloaded, total),
                    format_speed(speed)
                );
                last_tick = Instant::now();
                last_bytes = downloaded;
            }
        }

        file.flush()
            .await
            .map_err(|e| LauncherError::apply(label, dest, e))?;

        if let Some(total) = total
            && downloaded < total
        {
            return Err(LauncherError::download(
                url.as_str(),
                format!("received {downloaded} of {total} bytes"),
            ));
        }

        info!("download {}: completed {}", label, format_size(downloaded));
        Ok(downloaded)
    }
}

/// Fetches the manifest from a fixed URL; relative payload locations resolve against it.
#[derive(Clone)]
pub struct RemoteManifestClient {
    network: NetworkClient,
    url: Url,
}

impl RemoteManifestClient {
    pub fn new(network: NetworkClient, url: Url) -> Self {
        Self { network, url }
    }
}

impl ManifestSource for RemoteManifestClient {
    async fn fetch_manifest(&self) -> LauncherResult<RemoteManifest> {
        info!("manifest: fetching {}", self.url);
        let body = self.network.fetch_text(&self.url).await?;
        let manifest = RemoteManifest::parse(self.url.clone(), &body)?;
        debug!(
            "manifest: parsed, mod loader {}",
            manifest
                .mod_loader()
                .map(|entry| entry.version.as_str())
                .unwrap_or("absent")
        );
        Ok(manifest)
    }
}

fn local_path(url: &Url) -> Result<std::path::PathBuf, String> {
    url.to_file_path()
        .map_err(|_| format!("{url} is not a local file path"))
}
