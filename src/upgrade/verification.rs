use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::constants::COPY_CHUNK_SIZE;
use crate::core::UpdateError;

/// SHA-256 integrity check for downloaded update artifacts.
///
/// Digests are hex encoded. Published digests may carry a `sha256:` prefix
/// and may be upper case; both are accepted.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the hex encoded SHA-256 of a file.
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let mut file = fs::File::open(file_path)
            .await
            .map_err(|e| UpdateError::filesystem("open artifact", file_path, &e))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| UpdateError::filesystem("read artifact", file_path, &e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify a file against an expected digest.
    ///
    /// # Errors
    ///
    /// `ChecksumMismatch` when the digests differ.
    pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<(), UpdateError> {
        info!("Verifying checksum for: {}", file_path.display());

        let expected = Self::normalize(expected);
        let actual = Self::compute_sha256(file_path).await?;

        if actual != expected {
            return Err(UpdateError::ChecksumMismatch {
                path: file_path.display().to_string(),
                expected,
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }

    fn normalize(digest: &str) -> String {
        let digest = digest.trim();
        let digest = digest
            .strip_prefix("sha256:")
            .or_else(|| digest.strip_prefix("SHA256:"))
            .unwrap_or(digest);
        digest.to_lowercase()
    }
}
