//! Per-session temporary directory, created under a shared base directory
//! and unlinked unconditionally when the owning session ends.
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Ensures the workdir base directory exists, mode 0700. Failure here is
/// fatal to the process (see error policy in the session design), so callers
/// run this once at acceptor startup rather than per-session.
pub async fn ensure_base_dir(base: &Path) -> Result<()> {
    fs::create_dir_all(base)
        .await
        .map_err(|cause| Error::WorkdirCreate { cause })?;
    set_mode(base, 0o700).map_err(|cause| Error::WorkdirCreate { cause })?;
    Ok(())
}

/// A session's exclusive scratch directory. Removed on drop, successful or not.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Creates a fresh, uniquely-named directory under `base`, mode 0700.
    pub async fn create(base: &Path) -> Result<Self> {
        for _ in 0..8 {
            let name: String = {
                use rand::Rng;
                let mut rng = rand::thread_rng();
                (0..12)
                    .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                    .collect()
            };
            let path = base.join(format!("dispatchd-{}", name));
            match fs::create_dir(&path).await {
                Ok(()) => {
                    set_mode(&path, 0o700).map_err(|cause| Error::WorkdirCreate { cause })?;
                    return Ok(WorkDir { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(cause) => return Err(Error::WorkdirCreate { cause }),
            }
        }
        Err(Error::WorkdirCreate {
            cause: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exhausted name space"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `bytes` to `prog<suffix>` inside this directory, truncating any
    /// prior content, mode 0600, fsynced before close.
    pub async fn write_source(&self, suffix: &str, bytes: &[u8]) -> Result<PathBuf> {
        let file_path = self.path.join(format!("prog{}", suffix));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode_or_default(0o600)
            .open(&file_path)
            .await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(file_path)
    }
}

#[cfg(unix)]
trait OpenOptionsExt {
    fn mode_or_default(&mut self, mode: u32) -> &mut Self;
}

#[cfg(unix)]
impl OpenOptionsExt for fs::OpenOptions {
    fn mode_or_default(&mut self, mode: u32) -> &mut Self {
        self.mode(mode)
    }
}

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode_or_default(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for fs::OpenOptions {
    fn mode_or_default(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
