//! Mail-SFTP adapter: connect, atomic put (`upload.tmp` -> rename),
//! list-ack, fetch tracking manifest (§4.9, §6). The remote mount is
//! addressed as a filesystem root so the atomic-rename contract the spec
//! requires is exercised the same way in tests and production; swapping
//! in a real SFTP transport only changes how that root is reached.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::AdapterResult;
use crate::error::AdapterError;

pub const SFTP_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait MailSftp: Send + Sync {
    async fn put_atomic(&self, remote_name: &str, contents: &[u8]) -> AdapterResult<()>;
    async fn list_ack_files(&self) -> AdapterResult<Vec<String>>;
    async fn fetch_tracking_manifests(&self) -> AdapterResult<Vec<String>>;
    async fn fetch(&self, remote_name: &str) -> AdapterResult<Vec<u8>>;
}

pub struct FilesystemSftp {
    root: PathBuf,
}

impl FilesystemSftp {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MailSftp for FilesystemSftp {
    async fn put_atomic(&self, remote_name: &str, contents: &[u8]) -> AdapterResult<()> {
        let tmp_path = self.root.join(format!("{remote_name}.tmp"));
        let final_path = self.root.join(remote_name);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AdapterError::Transient(format!("sftp connect failed: {e}")))?;
        fs::write(&tmp_path, contents).await.map_err(|e| AdapterError::Transient(format!("sftp put failed: {e}")))?;
        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| AdapterError::Transient(format!("sftp rename failed: {e}")))?;
        Ok(())
    }

    async fn list_ack_files(&self) -> AdapterResult<Vec<String>> {
        list_matching(&self.root, "ACK-").await
    }

    async fn fetch_tracking_manifests(&self) -> AdapterResult<Vec<String>> {
        list_matching(&self.root, "TRACK-").await
    }

    async fn fetch(&self, remote_name: &str) -> AdapterResult<Vec<u8>> {
        fs::read(self.root.join(remote_name)).await.map_err(|e| AdapterError::Transient(format!("sftp fetch failed: {e}")))
    }
}

async fn list_matching(root: &Path, prefix: &str) -> AdapterResult<Vec<String>> {
    let mut entries = fs::read_dir(root).await.map_err(|e| AdapterError::Transient(format!("sftp list failed: {e}")))?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| AdapterError::Transient(e.to_string()))? {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(prefix) {
                out.push(name.to_string());
            }
        }
    }
    Ok(out)
}
