// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the embedding model files.

use std::path::{Path, PathBuf};

use parley_core::ParleyError;
use tracing::{info, warn};

const MODEL_URL: &str = "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

const MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Resolves and fetches model files under a root directory.
#[derive(Debug, Clone)]
pub struct ModelManager {
    root: PathBuf,
}

impl ModelManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `configured` when set, else `<data dir>/parley`.
    pub fn from_config(configured: Option<&str>) -> Self {
        let root = match configured {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parley"),
        };
        Self::new(root)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("models").join(MODEL_NAME)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Downloads missing files and returns the model path.
    pub async fn ensure_model(&self) -> Result<PathBuf, ParleyError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }

        let dir = self.model_dir();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ParleyError::embedding(format!("failed to create {}: {e}", dir.display()))
        })?;

        for (dest, url) in [
            (self.model_path(), MODEL_URL),
            (self.tokenizer_path(), TOKENIZER_URL),
        ] {
            if dest.exists() {
                continue;
            }
            info!(url, "downloading embedding model file");
            if let Err(e) = download(url, &dest).await {
                if let Err(cleanup) = tokio::fs::remove_file(&dest).await {
                    warn!(path = %dest.display(), error = %cleanup, "could not remove partial download");
                }
                return Err(e);
            }
        }

        info!(dir = %dir.display(), "embedding model ready");
        Ok(self.model_path())
    }
}

async fn download(url: &str, dest: &Path) -> Result<(), ParleyError> {
    let response = reqwest::get(url).await.map_err(|e| ParleyError::Embedding {
        message: format!("failed to download {url}"),
        source: Some(Box::new(e)),
    })?;
    if !response.status().is_success() {
        return Err(ParleyError::embedding(format!(
            "download of {url} failed with status {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await.map_err(|e| ParleyError::Embedding {
        message: format!("failed to read body of {url}"),
        source: Some(Box::new(e)),
    })?;
    tokio::fs::write(dest, &bytes).await.map_err(|e| {
        ParleyError::embedding(format!("failed to write {}: {e}", dest.display()))
    })?;
    info!(path = %dest.display(), bytes = bytes.len(), "downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_root() {
        let mgr = ModelManager::new("/srv/parley");
        assert_eq!(
            mgr.model_path(),
            PathBuf::from("/srv/parley/models/all-MiniLM-L6-v2/model.onnx")
        );
        assert_eq!(
            mgr.tokenizer_path(),
            PathBuf::from("/srv/parley/models/all-MiniLM-L6-v2/tokenizer.json")
        );
    }

    #[test]
    fn configured_dir_wins() {
        let mgr = ModelManager::from_config(Some("/opt/models"));
        assert!(mgr.model_dir().starts_with("/opt/models"));
    }

    #[tokio::test]
    async fn existing_files_skip_download() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(dir.path());
        std::fs::create_dir_all(mgr.model_dir()).unwrap();
        std::fs::write(mgr.model_path(), b"onnx").unwrap();
        std::fs::write(mgr.tokenizer_path(), b"{}").unwrap();

        assert!(mgr.is_model_available());
        assert_eq!(mgr.ensure_model().await.unwrap(), mgr.model_path());
    }
}
