//! Temporary project trees for tests.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A throwaway project directory.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// An empty project.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// A project whose `.gitignore` covers the default required entries.
    pub fn ignored() -> Self {
        Self::empty().with_file(".gitignore", ".env\ndb.sqlite3\n__pycache__/\n*.pyc\n")
    }

    /// Write `content` to `relative`, creating parent directories.
    #[must_use]
    pub fn with_file(self, relative: &str, content: &str) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, content).expect("write fixture file");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
