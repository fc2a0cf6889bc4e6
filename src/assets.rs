use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::model::AssetKind;
use crate::parser::asset::Classified;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Downloads ad media to `<root>/<images|videos>/<id>.<ext>`, at most once per path.
pub struct AssetFetcher {
    client: reqwest::Client,
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssetFetcher {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let root = root.into();
        for kind in [AssetKind::Image, AssetKind::Video] {
            let dir = root.join(kind.dir_name());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canonical_path(&self, id: &str, kind: AssetKind, extension: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(format!("{id}.{extension}"))
    }

    /// Local path of the media for ad `id`, downloading it unless already on
    /// disk. Failures are logged and yield `None`.
    pub async fn fetch(&self, media: &Classified, id: &str) -> Option<PathBuf> {
        let path = self.canonical_path(id, media.kind, media.extension);
        let url = media.url.as_str();
        let lease = self.lease(&path);
        let _guard = lease.lock.lock().await;

        if path.exists() {
            debug!("Asset already on disk: {}", path.display());
            return Some(path);
        }
        match self.download(url, &path).await {
            Ok(bytes) => {
                debug!("Saved {} bytes to {}", bytes, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not download asset {}: {:#}", url, e);
                None
            }
        }
    }

    fn lease(&self, path: &Path) -> PathLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(locks.entry(path.to_path_buf()).or_default());
        PathLease {
            locks: &self.locks,
            path: path.to_path_buf(),
            lock,
        }
    }

    #[cfg(test)]
    fn tracked_paths(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stream into a `.part` sibling, then rename, so the canonical path only
    /// ever holds a complete file.
    async fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut part = path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        let result = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut stream = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&part, path).await?;
            Ok::<_, anyhow::Error>(written)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }
}

/// One caller's share of a per-path lock. The map entry is removed when the
/// last holder lets go, including when a fetch is cancelled mid-download.
struct PathLease<'a> {
    locks: &'a Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Clones are only handed out under this mutex: the map's and ours.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.path);
        }
    }
}
