use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;
use uuid::Uuid;

/// Scratch directory owned by one request
///
/// Holds the narration WAV and caption file while a request runs. The
/// directory is removed when the workspace is released or dropped, so a
/// failed or cancelled request cleans up the same way a finished one does.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh directory under `root`, or the system temp dir
    pub fn create(root: Option<&Path>, request_id: Uuid) -> io::Result<Self> {
        let prefix = format!("narravid-{}-", request_id.simple());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now, logging instead of failing
    pub fn release(self) {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Released workspace {}", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}
