use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Mutex,
        PoisonError,
    },
};

use once_cell::sync::Lazy;
use tempfile::TempDir;

static HOME_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A throwaway roller home directory.
pub struct RollerHome {
    dir: TempDir,
}

impl RollerHome {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Writes `contents` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, relative: impl AsRef<Path>, contents: &str) -> PathBuf {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

impl Default for RollerHome {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a closure with a fresh roller home.
///
/// A mutex serializes the callers because the binaries under test may read
/// process-wide environment variables.
pub fn with_roller_home<F>(closure: F)
where
    F: FnOnce(&RollerHome),
{
    // ignore poisoning
    let _guard = HOME_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let home = RollerHome::new();
    closure(&home);
}
