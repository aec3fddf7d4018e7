//! Progressive upload of task outputs
//!
//! When a task finishes, every file under `<run_dir>/out/` is copied to the
//! upload prefix and its identity is published to the [`UploadLedger`],
//! which lets pending call cache entries that reference it commit. Files
//! reached through several links are uploaded once.

use crate::context::TaskContext;
use crate::protocol::TaskHook;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swipe_cache::{DeferredCommitCache, UploadLedger};
use swipe_config::SwipeConfig;
use swipe_core::{join_uri, Bindings, Error, FileIdentity, Result, OUTPUT_LINKS_DIR};
use swipe_store::RemoteCopyGate;
use walkdir::WalkDir;

/// Layout of one output slot under `out/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputShape {
    /// A symlink to a directory
    Directory(PathBuf),
    /// A lone file
    File(PathBuf),
    /// `0/`, `1/`, ... each holding exactly one file, in index order
    IndexedArray(Vec<PathBuf>),
}

fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::file_system(dir, "list output slot", e))? {
        let entry = entry.map_err(|e| Error::file_system(dir, "list output slot", e))?;
        if !entry.file_name().to_string_lossy().starts_with('.') {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Classify an output slot directory.
///
/// Anything that is not one of the three known layouts is an error.
pub fn classify_output(slot: &Path) -> Result<OutputShape> {
    let entries = visible_entries(slot)?;

    if let [only] = entries.as_slice() {
        let is_link = fs::symlink_metadata(only)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        let meta = fs::metadata(only).map_err(|e| Error::file_system(only, "stat output", e))?;
        if is_link && meta.is_dir() {
            return Ok(OutputShape::Directory(only.clone()));
        }
        if meta.is_file() {
            return Ok(OutputShape::File(only.clone()));
        }
    }

    if entries.is_empty() {
        return Err(Error::invalid_output_layout(slot, "output slot is empty"));
    }

    let mut indexed = Vec::with_capacity(entries.len());
    for entry in &entries {
        let name = file_name(entry);
        let index: usize = name.parse().map_err(|_| {
            Error::invalid_output_layout(slot, format!("unexpected entry '{name}'"))
        })?;
        let files = visible_entries(entry)?;
        let [file] = files.as_slice() else {
            return Err(Error::invalid_output_layout(
                entry,
                format!("array element holds {} entries, expected one", files.len()),
            ));
        };
        indexed.push((index, file.clone()));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(OutputShape::IndexedArray(
        indexed.into_iter().map(|(_, file)| file).collect(),
    ))
}

fn relative_uri_path(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        Error::invalid_output_layout(path, format!("not below {}", base.display()))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

pub struct ProgressiveUpload {
    config: Arc<SwipeConfig>,
    ledger: Arc<UploadLedger>,
    gate: Arc<RemoteCopyGate>,
    cache: Arc<DeferredCommitCache>,
}

impl ProgressiveUpload {
    pub fn new(
        config: Arc<SwipeConfig>,
        ledger: Arc<UploadLedger>,
        gate: Arc<RemoteCopyGate>,
        cache: Arc<DeferredCommitCache>,
    ) -> Self {
        Self {
            config,
            ledger,
            gate,
            cache,
        }
    }

    /// Upload every output of a finished task
    pub async fn upload_task_outputs(&self, ctx: &TaskContext) -> Result<()> {
        let Some(prefix) = self.config.upload.put_prefix() else {
            tracing::debug!(run_id = %ctx.run_id, "no upload prefix configured; skipping upload");
            return Ok(());
        };
        if ctx.run_id.is_download_step() {
            return Ok(());
        }

        let links_dir = ctx.run_dir.join(OUTPUT_LINKS_DIR);
        if !links_dir.exists() {
            return Ok(());
        }
        for slot in visible_entries(&links_dir)? {
            if !slot.is_dir() {
                return Err(Error::invalid_output_layout(&slot, "output slot is not a directory"));
            }
            match classify_output(&slot)? {
                OutputShape::File(file) => {
                    let uri = join_uri(prefix, &file_name(&file));
                    self.upload_file(&file, uri, true).await?;
                }
                OutputShape::Directory(dir) => {
                    self.upload_directory(prefix, &slot, &dir).await?;
                }
                OutputShape::IndexedArray(files) => {
                    for file in files {
                        let uri = join_uri(prefix, &file_name(&file));
                        self.upload_file(&file, uri, false).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn upload_directory(&self, prefix: &str, slot: &Path, dir: &Path) -> Result<()> {
        let dir_id = FileIdentity::resolve(&dir.to_string_lossy())?;
        let dir_uri = format!("{}/", join_uri(prefix, &file_name(dir)).trim_end_matches('/'));
        self.ledger.publish(dir_id.clone(), dir_uri);

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                Error::file_system(path, "walk output directory", e.into())
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let uri = join_uri(prefix, &relative_uri_path(entry.path(), slot)?);
            self.upload_file(entry.path(), uri, false).await?;
        }

        let waiting = self.ledger.waiting_on(&dir_id);
        self.cache.commit_waiting(waiting).await;
        Ok(())
    }

    async fn upload_file(&self, local: &Path, uri: String, flag_temporary: bool) -> Result<()> {
        let id = FileIdentity::resolve(&local.to_string_lossy())?;

        let waiting = {
            let permit = self.gate.acquire().await;
            if let Some(existing) = self.ledger.lookup(&id) {
                tracing::debug!(file = %local.display(), uri = %existing, "already uploaded");
                return Ok(());
            }
            permit.copy(local, &uri, flag_temporary).await?;
            self.ledger.publish(id, uri.clone())
        };

        tracing::info!(file = %local.display(), uri = %uri, "task output uploaded");
        self.cache.commit_waiting(waiting).await;
        Ok(())
    }
}

#[async_trait]
impl TaskHook for ProgressiveUpload {
    async fn after(&self, ctx: &TaskContext, result: Result<Bindings>) -> Result<Bindings> {
        let outputs = result?;
        self.upload_task_outputs(ctx).await?;
        Ok(outputs)
    }
}
