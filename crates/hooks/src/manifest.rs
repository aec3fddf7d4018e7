use crate::context::WorkflowContext;
use crate::protocol::WorkflowHook;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use swipe_cache::UploadLedger;
use swipe_config::SwipeConfig;
use swipe_core::{
    join_uri, Bindings, FileIdentity, Result, OUTPUTS_MANIFEST_FILENAME, REMOTE_URI_SCHEME,
};
use swipe_store::RemoteCopyGate;
use swipe_utils::write_json_atomic;

/// Writes `outputs.s3.json` when a workflow finishes: the workflow outputs
/// with local paths replaced by the URIs they were uploaded to.
pub struct OutputManifest {
    config: Arc<SwipeConfig>,
    ledger: Arc<UploadLedger>,
    gate: Arc<RemoteCopyGate>,
}

impl OutputManifest {
    pub fn new(config: Arc<SwipeConfig>, ledger: Arc<UploadLedger>, gate: Arc<RemoteCopyGate>) -> Self {
        Self { config, ledger, gate }
    }

    /// Outputs with every uploaded path replaced by its URI.
    ///
    /// Paths that were never uploaded are kept, with a warning.
    pub fn rewrite(&self, outputs: &Bindings) -> Bindings {
        self.ledger.rewrite_to_remote(
            outputs,
            |path| FileIdentity::resolve(path).ok(),
            |_, path| {
                tracing::warn!(
                    path,
                    "output file or directory wasn't uploaded; keeping local path in {OUTPUTS_MANIFEST_FILENAME}"
                );
            },
        )
    }

    /// Where the manifest is copied to
    pub fn destination(&self, ctx: &WorkflowContext, prefix: &str) -> String {
        if let Some(uri) = self.config.upload.output_uri.as_deref() {
            return uri.to_string();
        }
        let run_prefix = join_uri(prefix, &ctx.run_id.tail().join("/"));
        join_uri(&run_prefix, OUTPUTS_MANIFEST_FILENAME)
    }

    /// Write, untag and copy the manifest; returns the local path.
    ///
    /// Returns `None` when no upload prefix is configured.
    pub async fn publish(&self, ctx: &WorkflowContext, outputs: &Bindings) -> Result<Option<PathBuf>> {
        let Some(prefix) = self.config.upload.put_prefix() else {
            return Ok(None);
        };

        let manifest = self.rewrite(outputs).to_json(Some(&ctx.workflow_name));
        let path = ctx.run_dir.join(OUTPUTS_MANIFEST_FILENAME);
        write_json_atomic(&path, &manifest)?;

        for uri in top_level_remote_files(&manifest) {
            self.gate.remove_temporary_flag(uri).await?;
        }

        let destination = self.destination(ctx, prefix);
        self.gate.copy(&path, &destination, false).await?;
        tracing::info!(manifest = %path.display(), uri = %destination, "workflow outputs published");
        Ok(Some(path))
    }
}

/// Remote file values directly under the manifest, including array elements
fn top_level_remote_files(manifest: &serde_json::Value) -> Vec<&str> {
    let Some(object) = manifest.as_object() else {
        return Vec::new();
    };
    object
        .values()
        .flat_map(|value| match value {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .filter_map(serde_json::Value::as_str)
        .filter(|value| value.starts_with(REMOTE_URI_SCHEME))
        .collect()
}

#[async_trait]
impl WorkflowHook for OutputManifest {
    async fn after(&self, ctx: &WorkflowContext, result: Result<Bindings>) -> Result<Bindings> {
        let outputs = result?;
        self.publish(ctx, &outputs).await?;
        Ok(outputs)
    }
}
