//! Multipart upload handling.
//!
//! Every file field is looked up in an [`UploadPolicy`] that says where the
//! file goes, how many are allowed, and whether it must be an image. Files
//! are streamed to disk under random names. A submission either produces a
//! complete [`Manifest`] or leaves nothing behind on disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use appshelf_types::api::upload_fields;
use appshelf_types::models::Manifest;

use crate::error::{AppError, Result};
use crate::storage::{Storage, UploadCategory};

const MAX_EXTENSION_LEN: usize = 16;

/// How one multipart file field is handled.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub category: UploadCategory,
    pub max_count: usize,
    pub images_only: bool,
}

/// Field name -> rule. Anything not in here is rejected.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    rules: HashMap<&'static str, FieldRule>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        let rules = HashMap::from([
            (
                upload_fields::ICON,
                FieldRule { category: UploadCategory::Icon, max_count: 1, images_only: true },
            ),
            (
                upload_fields::SCREENSHOTS,
                FieldRule { category: UploadCategory::Screenshot, max_count: 5, images_only: true },
            ),
            (
                upload_fields::APP_FILE,
                FieldRule { category: UploadCategory::AppFile, max_count: 1, images_only: false },
            ),
        ]);
        Self { rules }
    }
}

impl UploadPolicy {
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.rules.get(field)
    }
}

/// A fully received upload form.
#[derive(Debug)]
pub struct UploadForm {
    pub name: String,
    pub description: Option<String>,
    pub manifest: Manifest,
}

/// Files written so far for one submission, in write order.
///
/// Until [`Staged::commit`] is called the files belong to the guard: an
/// explicit [`Staged::rollback`] removes them, and so does dropping the
/// guard, which is what happens when the request future is cancelled
/// mid-upload (timeout or client disconnect).
struct Staged {
    storage: Arc<Storage>,
    files: Vec<(UploadCategory, String)>,
}

impl Staged {
    fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            files: Vec::new(),
        }
    }

    fn push(&mut self, category: UploadCategory, name: String) {
        self.files.push((category, name));
    }

    /// The files now belong to a manifest.
    fn commit(mut self) {
        self.files.clear();
    }

    async fn rollback(mut self) -> usize {
        let files = std::mem::take(&mut self.files);
        let refs: Vec<(UploadCategory, &str)> =
            files.iter().map(|(c, n)| (*c, n.as_str())).collect();
        self.storage.remove_all(refs).await
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        for (category, name) in self.files.drain(..) {
            let Some(path) = self.storage.file_path(category, &name) else {
                continue;
            };
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed abandoned upload {}/{}", category.dir_name(), name),
                Err(e) => warn!(
                    "Could not remove abandoned upload {}/{}: {}",
                    category.dir_name(),
                    name,
                    e
                ),
            }
        }
    }
}

pub struct UploadPipeline {
    storage: Arc<Storage>,
    policy: UploadPolicy,
}

impl UploadPipeline {
    pub fn new(storage: Arc<Storage>, policy: UploadPolicy) -> Self {
        Self { storage, policy }
    }

    /// Receive a whole submission. On any error, every file this call
    /// already wrote is removed before the error is returned. If the
    /// future is dropped before it finishes, the files are removed too.
    pub async fn accept(&self, multipart: &mut Multipart) -> Result<UploadForm> {
        let mut staged = Staged::new(self.storage.clone());
        let received = self.receive(multipart, &mut staged).await;
        match received {
            Ok(form) => {
                staged.commit();
                Ok(form)
            }
            Err(e) => {
                let removed = staged.rollback().await;
                if removed > 0 {
                    debug!("Upload rejected ({}), removed {} staged files", e, removed);
                }
                Err(e)
            }
        }
    }

    /// Remove the files of a manifest whose record could not be saved.
    pub async fn discard(&self, manifest: &Manifest) {
        self.storage.remove_all(manifest_files(manifest)).await;
    }

    async fn receive(&self, multipart: &mut Multipart, staged: &mut Staged) -> Result<UploadForm> {
        let mut name: Option<String> = None;
        let mut description: Option<String> = None;
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut manifest = Manifest::default();
        let mut app_file: Option<String> = None;

        while let Some(mut field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();

            match field_name.as_str() {
                upload_fields::NAME => {
                    name = Some(field.text().await?);
                    continue;
                }
                upload_fields::DESCRIPTION => {
                    description = Some(field.text().await?);
                    continue;
                }
                _ => {}
            }

            let rule = *self
                .policy
                .rule(&field_name)
                .ok_or_else(|| AppError::UnexpectedField(field_name.clone()))?;

            // An unselected <input type=file> arrives with an empty filename
            let original = field.file_name().unwrap_or_default().to_string();
            if original.is_empty() {
                continue;
            }

            let count = counts.entry(field_name.clone()).or_default();
            *count += 1;
            if *count > rule.max_count {
                return Err(AppError::TooManyFiles(field_name));
            }

            let content_type = field.content_type().unwrap_or_default().to_string();
            if rule.images_only && !content_type.starts_with("image/") {
                return Err(AppError::UnsupportedMediaType {
                    field: field_name,
                    content_type,
                });
            }

            let stored = generate_filename(&original);
            let mut file = self.storage.create_file(rule.category, &stored).await?;
            staged.push(rule.category, stored.clone());

            let mut size: u64 = 0;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
                size += chunk.len() as u64;
            }
            file.flush().await?;

            debug!(
                "Stored {} ({} bytes) as {}/{}",
                original,
                size,
                rule.category.dir_name(),
                stored
            );

            match rule.category {
                UploadCategory::Icon => manifest.icon = Some(stored),
                UploadCategory::Screenshot => manifest.screenshots.push(stored),
                UploadCategory::AppFile => app_file = Some(stored),
            }
        }

        manifest.app_file = app_file.ok_or(AppError::MissingRequiredFile)?;

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::Validation("Application name is required".to_string()))?;

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(UploadForm {
            name,
            description,
            manifest,
        })
    }
}

/// Every file a manifest references, with its category.
pub fn manifest_files(manifest: &Manifest) -> Vec<(UploadCategory, &str)> {
    let mut files = vec![(UploadCategory::AppFile, manifest.app_file.as_str())];
    if let Some(icon) = &manifest.icon {
        files.push((UploadCategory::Icon, icon.as_str()));
    }
    files.extend(
        manifest
            .screenshots
            .iter()
            .map(|s| (UploadCategory::Screenshot, s.as_str())),
    );
    files
}

/// Random on-disk name that keeps the original extension when it is sane.
pub fn generate_filename(original: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    match sanitized_extension(original) {
        Some(ext) => format!("{id}.{ext}"),
        None => {
            if original.contains('.') {
                warn!("Dropping unusable extension from {:?}", original);
            }
            id
        }
    }
}

fn sanitized_extension(original: &str) -> Option<String> {
    let ext = Path::new(original).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
