use crate::call_cache::{CallCache, OutputTypes};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use swipe_core::{is_remote_uri, Bindings, Error, Result};
use swipe_utils::atomic_file::write_atomic;

/// File-per-key call cache: `<dir>/<key>.json` holds the output bindings
pub struct LocalCallCache {
    dir: PathBuf,
}

impl LocalCallCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CallCache for LocalCallCache {
    /// A malformed entry, a type mismatch or a local output file that no
    /// longer exists is a miss, not an error.
    async fn get(
        &self,
        key: &str,
        _inputs: &Bindings,
        output_types: &OutputTypes,
    ) -> Result<Option<Bindings>> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::file_system(&path, "read cache entry", e)),
        };

        let json: serde_json::Value = match serde_json::from_slice(&content) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "ignoring malformed call cache entry");
                return Ok(None);
            }
        };
        let outputs = match Bindings::from_json(&json, output_types) {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::warn!(key, error = %e, "call cache entry does not match output types");
                return Ok(None);
            }
        };

        for (_, file) in outputs.paths() {
            if !is_remote_uri(file) && tokio::fs::metadata(file).await.is_err() {
                tracing::info!(key, file, "cached output file no longer exists");
                return Ok(None);
            }
        }

        tracing::info!(key, "call cache hit");
        Ok(Some(outputs))
    }

    async fn put(&self, key: &str, outputs: &Bindings) -> Result<()> {
        let path = self.entry_path(key);
        let body = outputs.to_json(None).to_string();
        write_atomic(&path, body.as_bytes())?;
        tracing::info!(key, path = %path.display(), "call cache insert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use swipe_core::{Value, ValueType};
    use tempfile::TempDir;

    fn types() -> OutputTypes {
        let mut types = BTreeMap::new();
        types.insert("report".to_string(), ValueType::File);
        types.insert("count".to_string(), ValueType::Int);
        types
    }

    #[tokio::test]
    async fn test_put_then_get() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalCallCache::new(temp_dir.path());
        let mut outputs = Bindings::new();
        outputs.insert("report", Value::File("s3://b/report.txt".into()));
        outputs.insert("count", Value::Int(7));

        cache.put("qc/abc", &outputs).await?;
        assert!(temp_dir.path().join("qc").join("abc.json").exists());

        let hit = cache.get("qc/abc", &Bindings::new(), &types()).await?;
        assert_eq!(hit, Some(outputs));
        Ok(())
    }

    #[tokio::test]
    async fn test_misses() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalCallCache::new(temp_dir.path());
        let inputs = Bindings::new();

        assert!(cache.get("absent", &inputs, &types()).await?.is_none());

        std::fs::write(temp_dir.path().join("garbled.json"), "{not json").unwrap();
        assert!(cache.get("garbled", &inputs, &types()).await?.is_none());

        std::fs::write(
            temp_dir.path().join("wrong.json"),
            r#"{"report": 3, "count": 1}"#,
        )
        .unwrap();
        assert!(cache.get("wrong", &inputs, &types()).await?.is_none());

        let gone = temp_dir.path().join("gone.txt");
        std::fs::write(
            temp_dir.path().join("stale.json"),
            serde_json::json!({"report": gone.to_str().unwrap(), "count": 1}).to_string(),
        )
        .unwrap();
        assert!(cache.get("stale", &inputs, &types()).await?.is_none());
        Ok(())
    }
}
