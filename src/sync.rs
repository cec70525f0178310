use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

/// Replicates an artifact directory to remote storage. Called on both
/// success and failure paths; best effort by contract.
pub trait RemoteSync {
    fn sync_directory(&self, local: &Path, remote_url: &str) -> Result<()>;
}

/// Mirror replicator that materializes remote URLs under a local root,
/// keyed by the URL path. Stands in for a bucket uploader; swapping in a
/// real object-storage client only requires another `RemoteSync` impl.
#[derive(Debug, Clone)]
pub struct MirrorSync {
    mirror_root: PathBuf,
}

impl MirrorSync {
    pub fn new(mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
        }
    }

    fn destination(&self, remote_url: &str) -> Result<PathBuf> {
        let stripped = remote_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(remote_url)
            .trim_matches('/');
        if stripped.is_empty() {
            bail!("Remote URL '{remote_url}' has no path component");
        }
        Ok(self.mirror_root.join(stripped))
    }
}

impl RemoteSync for MirrorSync {
    fn sync_directory(&self, local: &Path, remote_url: &str) -> Result<()> {
        if !local.exists() {
            // Nothing produced yet; syncing an absent directory is a no-op.
            return Ok(());
        }
        let destination = self.destination(remote_url)?;
        copy_dir_recursive(local, &destination)?;
        info!(
            local = %local.display(),
            remote = remote_url,
            "Directory synchronized"
        );
        Ok(())
    }
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create sync target: {}", destination.display()))?;
    for entry in std::fs::read_dir(source)
        .with_context(|| format!("Failed to read sync source: {}", source.display()))?
    {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} during sync", entry.path().display())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sync_mirrors_the_directory_tree_under_the_url_path() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("artifact/run1");
        std::fs::create_dir_all(local.join("nested")).unwrap();
        std::fs::write(local.join("nested/report.yaml"), "status: true\n").unwrap();

        let sync = MirrorSync::new(dir.path().join("mirror"));
        sync.sync_directory(&local, "s3://telemetry-bucket/artifact/run1")
            .unwrap();

        let mirrored = dir
            .path()
            .join("mirror/telemetry-bucket/artifact/run1/nested/report.yaml");
        assert_eq!(
            std::fs::read_to_string(mirrored).unwrap(),
            "status: true\n"
        );
    }

    #[test]
    fn syncing_an_absent_directory_is_a_noop() {
        let dir = tempdir().unwrap();
        let sync = MirrorSync::new(dir.path().join("mirror"));
        sync.sync_directory(&dir.path().join("nothing_here"), "s3://bucket/x")
            .unwrap();
        assert!(!dir.path().join("mirror").exists());
    }
}
