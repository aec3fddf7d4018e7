use sha2::{Digest, Sha256};
use swipe_core::Bindings;

/// SHA-256 hex digest of the canonical JSON form of `bindings`
pub fn digest_bindings(bindings: &Bindings) -> String {
    let mut hasher = Sha256::new();
    // Object keys are sorted, so this is stable across runs
    hasher.update(bindings.to_json(None).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Structural cache key for a task invocation: `<task name>/<input digest>`
pub fn cache_key(task_name: &str, inputs: &Bindings) -> String {
    format!("{task_name}/{}", digest_bindings(inputs))
}

/// Replace the last `/`-separated segment of `key` with `digest`
pub fn durable_key(key: &str, digest: &str) -> String {
    match key.rsplit_once('/') {
        Some((head, _)) => format!("{head}/{digest}"),
        None => digest.to_string(),
    }
}
