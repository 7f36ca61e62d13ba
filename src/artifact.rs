use std::path::Path;

use async_trait::async_trait;
use plutus_escrow_sdk::EscrowError;

use crate::ledger::ArtifactLoader;

/// Reads compiled artifacts from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactLoader;

#[async_trait]
impl ArtifactLoader for FsArtifactLoader {
    async fn load(&self, path: &Path) -> Result<Vec<u8>, EscrowError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| EscrowError::Artifact(format!("reading {}: {e}", path.display())))
    }
}
