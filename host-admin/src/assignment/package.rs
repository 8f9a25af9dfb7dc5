use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::PackageInstaller;

/// Default bound on the total size a package may expand to.
pub const MAX_EXTRACTED_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Downloads packages over HTTP and unpacks zip archives.
#[derive(Debug, Clone)]
pub struct HttpPackageInstaller {
    client: reqwest::Client,
    download_dir: PathBuf,
    max_extracted_bytes: u64,
}

impl HttpPackageInstaller {
    pub fn new(client: reqwest::Client, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
            max_extracted_bytes: MAX_EXTRACTED_BYTES,
        }
    }

    pub fn with_max_extracted_bytes(mut self, limit: u64) -> Self {
        self.max_extracted_bytes = limit;
        self
    }
}

#[async_trait]
impl PackageInstaller for HttpPackageInstaller {
    async fn download(&self, url: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| format!("create {}", self.download_dir.display()))?;
        let path = self
            .download_dir
            .join(format!("{}.zip", uuid::Uuid::new_v4().simple()));

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .context("package download request failed")?
            .error_for_status()
            .context("package download rejected")?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("create {}", path.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .context("package download interrupted")?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", path.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(bytes = written, path = %path.display(), "package written");
        Ok(path)
    }

    async fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();
        let limit = self.max_extracted_bytes;
        tokio::task::spawn_blocking(move || extract_zip_to_dir(&archive, &destination, limit))
            .await
            .context("extraction task panicked")?
    }
}

/// Unpack `zip_path` into `out_dir`. Every entry must inflate to exactly the
/// size its header declares, and the whole package to at most `limit` bytes.
fn extract_zip_to_dir(zip_path: &Path, out_dir: &Path, limit: u64) -> Result<()> {
    let buf = std::fs::read(zip_path).with_context(|| format!("read {}", zip_path.display()))?;
    let archive = rawzip::ZipArchive::from_slice(&buf)
        .map_err(|e| anyhow!("invalid zip archive: {:?}", e))?;

    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let mut remaining = limit;
    for entry in archive.entries() {
        let entry = entry.map_err(|e| anyhow!("zip entry error: {:?}", e))?;
        let filename = entry
            .file_path()
            .try_normalize()
            .map_err(|e| anyhow!("failed to normalize zip path: {:?}", e))?
            .as_ref()
            .to_string();

        let relative = Path::new(&filename);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(anyhow!("unsupported or malicious path in zip: {filename}"));
        }

        let out_path = out_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("create {}", out_path.display()))?;
            continue;
        }

        let declared = entry.uncompressed_size_hint();
        if declared > remaining {
            return Err(anyhow!(
                "package expands beyond {limit} bytes at {filename} ({declared} bytes declared)"
            ));
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        // Truncates, so existing application files are overwritten.
        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;

        let slice_entry = archive
            .get_entry(entry.wayfinder())
            .map_err(|e| anyhow!("failed to get entry data: {:?}", e))?;
        let data = slice_entry.data();

        // One byte past the declared size is enough to detect a lying header.
        let cap = declared.saturating_add(1);
        let written = match entry.compression_method() {
            rawzip::CompressionMethod::Store => {
                std::io::copy(&mut Read::take(data, cap), &mut out)
            }
            rawzip::CompressionMethod::Deflate => std::io::copy(
                &mut Read::take(flate2::read::DeflateDecoder::new(data), cap),
                &mut out,
            ),
            method => return Err(anyhow!("unsupported compression method: {:?}", method)),
        }
        .with_context(|| format!("extract {filename} to {}", out_path.display()))?;

        if written != declared {
            return Err(anyhow!(
                "size mismatch for {filename}: header declares {declared} bytes, entry holds {}",
                if written > declared { "more".to_string() } else { written.to_string() }
            ));
        }
        remaining -= written;
    }
    Ok(())
}
