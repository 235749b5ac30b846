use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

/// Where an uploaded file lives. Each category has its own directory
/// under the upload root; rows store only the bare filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadCategory {
    Icon,
    Screenshot,
    AppFile,
}

impl UploadCategory {
    pub const ALL: [UploadCategory; 3] = [
        UploadCategory::Icon,
        UploadCategory::Screenshot,
        UploadCategory::AppFile,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            UploadCategory::Icon => "icons",
            UploadCategory::Screenshot => "screenshots",
            UploadCategory::AppFile => "apps",
        }
    }
}

/// Manages on-disk storage for uploaded files.
///
/// Layout is `{root}/{category dir}/{generated name}`. The same root is
/// served read-only under `/uploads`.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub async fn new(root: PathBuf) -> anyhow::Result<Self> {
        for category in UploadCategory::ALL {
            fs::create_dir_all(root.join(category.dir_name())).await?;
        }
        info!("Upload storage root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a stored file. `None` if `name` is not a plain filename.
    pub fn file_path(&self, category: UploadCategory, name: &str) -> Option<PathBuf> {
        if !is_plain_filename(name) {
            return None;
        }
        Some(self.root.join(category.dir_name()).join(name))
    }

    /// Create a new, empty file. Fails if the name is already taken
    /// instead of overwriting it.
    pub async fn create_file(&self, category: UploadCategory, name: &str) -> std::io::Result<fs::File> {
        let path = self.file_path(category, name).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad filename: {name}"))
        })?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
    }

    /// Delete a stored file. A file that is already gone is reported as
    /// `NotFound` so callers can log it; they decide whether it matters.
    pub async fn delete_file(&self, category: UploadCategory, name: &str) -> std::io::Result<()> {
        let path = self.file_path(category, name).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad filename: {name}"))
        })?;
        fs::remove_file(&path).await?;
        info!("Deleted {}/{}", category.dir_name(), name);
        Ok(())
    }

    /// Best-effort removal of several files. Failures are logged and
    /// counted, never returned. Returns how many files were removed.
    pub async fn remove_all<'a, I>(&self, files: I) -> usize
    where
        I: IntoIterator<Item = (UploadCategory, &'a str)>,
    {
        let mut removed = 0;
        for (category, name) in files {
            match self.delete_file(category, name).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove {}/{}: {}", category.dir_name(), name, e),
            }
        }
        removed
    }

    #[cfg(test)]
    pub(crate) async fn exists(&self, category: UploadCategory, name: &str) -> bool {
        match self.file_path(category, name) {
            Some(path) => fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
