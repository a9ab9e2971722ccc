//! TOML persistence of lock documents

use camino::{Utf8Path, Utf8PathBuf};
use lockstep_core::error::LockError;
use lockstep_core::LockResult;
use tracing::{debug, info};

use crate::document::LockDocument;

const HEADER: &str = "# This file is generated by lockstep. Do not edit it by hand.\n\n";

/// Reads and writes lock documents on disk
pub struct LockFile;

impl LockFile {
    /// Serialize a document to its on-disk TOML form
    pub fn to_toml_string(document: &LockDocument) -> LockResult<String> {
        let body = toml::to_string_pretty(document).map_err(|e| LockError::Serialization {
            message: format!("TOML serialization error: {}", e),
        })?;
        Ok(format!("{}{}", HEADER, body))
    }

    /// Parse a document and verify its content hash
    pub fn from_toml_str(content: &str, file: &str) -> LockResult<LockDocument> {
        let document: LockDocument = toml::from_str(content).map_err(|e| LockError::TomlParse {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        document.verify()?;
        Ok(document)
    }

    /// Write a document atomically: a sibling temp file renamed into place
    pub async fn write(path: &Utf8Path, document: &LockDocument) -> LockResult<()> {
        let content = Self::to_toml_string(document)?;
        let tmp = temp_path(path);

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| LockError::io(format!("Failed to write {}", tmp), e))?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LockError::io(format!("Failed to replace {}", path), e));
        }

        info!("wrote lock {} ({})", path, document.content_hash().short());
        Ok(())
    }

    /// Read and verify a document
    pub async fn read(path: &Utf8Path) -> LockResult<LockDocument> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LockError::io(format!("Failed to read {}", path), e))?;
        Self::from_toml_str(&content, path.as_str())
    }

    /// Read a document if the file exists
    pub async fn read_optional(path: &Utf8Path) -> LockResult<Option<LockDocument>> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::read(path).await.map(Some),
            Ok(false) => {
                debug!("no previous lock at {}", path);
                Ok(None)
            }
            Err(e) => Err(LockError::io(format!("Failed to stat {}", path), e)),
        }
    }
}

fn temp_path(path: &Utf8Path) -> Utf8PathBuf {
    let name = path.file_name().unwrap_or("lockstep.lock");
    path.with_file_name(format!(".{}.tmp", name))
}
