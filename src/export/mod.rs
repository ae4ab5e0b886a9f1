//! JSON archive output, one file per account plus a combined file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::models::AccountArchive;

#[derive(Clone)]
pub struct JsonExporter {
    output_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
        Ok(Self { output_dir })
    }

    /// Write one account's archive to its own file
    pub fn write_account(&self, archive: &AccountArchive) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("{}_{}_posts.json", archive.site, archive.account));
        let json = serde_json::to_string_pretty(archive)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write archive to {}", path.display()))?;

        info!(
            "Saved {} posts for @{} to {}",
            archive.posts_count,
            archive.account,
            path.display()
        );
        Ok(path)
    }

    /// Rewrite the combined file with everything harvested so far, so an
    /// interrupted run still leaves a usable file behind
    pub fn write_combined(&self, archives: &[AccountArchive]) -> Result<PathBuf> {
        let path = self.output_dir.join("all_accounts.json");
        let json = serde_json::to_string_pretty(archives)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write combined archive to {}", path.display()))?;
        Ok(path)
    }
}
