use std::collections::BTreeMap;
use std::sync::Arc;
use swipe_cache::{cache_key, CallCache, DeferredCommitCache, OutputTypes, UploadLedger};
use swipe_config::SwipeConfig;
use swipe_core::{Bindings, FileIdentity, Value, ValueType};
use swipe_store::{MemoryObjectStore, RemoteCopyGate, StoreTransferTool};
use tempfile::TempDir;

const PREFIX: &str = "s3://bucket/run";

fn setup(root: &std::path::Path) -> (Arc<MemoryObjectStore>, Arc<UploadLedger>, Arc<DeferredCommitCache>) {
    let config = SwipeConfig::builder()
        .upload_prefix(PREFIX)
        .call_cache(true, true, root.join("cache"))
        .build()
        .unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let gate = Arc::new(RemoteCopyGate::new(
        Arc::new(StoreTransferTool::new(store.clone())),
        store.clone(),
    ));
    let ledger = Arc::new(UploadLedger::new());
    let cache = Arc::new(DeferredCommitCache::new(Arc::new(config), ledger.clone(), gate));
    (store, ledger, cache)
}

fn output_types() -> OutputTypes {
    let mut types = BTreeMap::new();
    types.insert("result".to_string(), ValueType::File);
    types
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_puts_and_publications_commit_each_entry_once() {
    let temp_dir = TempDir::new().unwrap();
    let (store, ledger, cache) = setup(temp_dir.path());

    let mut handles = Vec::new();
    let mut keys = Vec::new();
    for i in 0..32 {
        let file = temp_dir.path().join(format!("result-{i}.txt"));
        std::fs::write(&file, format!("result {i}")).unwrap();
        let path = file.display().to_string();

        let mut inputs = Bindings::new();
        inputs.insert("shard", Value::Int(i));
        let key = cache_key("shard", &inputs);
        keys.push(key.clone());

        let mut outputs = Bindings::new();
        outputs.insert("result", Value::File(path.clone()));

        let put_cache = cache.clone();
        let put_key = key.clone();
        handles.push(tokio::spawn(async move {
            put_cache.get(&put_key, &inputs, &output_types()).await.unwrap();
            put_cache.put(&put_key, &outputs).await.unwrap();
        }));

        let publish_cache = cache.clone();
        let publish_ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let id = FileIdentity::resolve(&path).unwrap();
            let waiting = publish_ledger.publish(id, format!("{PREFIX}/result-{i}.txt"));
            publish_cache.commit_waiting(waiting).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for (i, key) in keys.iter().enumerate() {
        let uri = DeferredCommitCache::entry_uri(PREFIX, key);
        assert_eq!(store.put_count(&uri), 1, "entry for {key}");
        let body: serde_json::Value = serde_json::from_slice(&store.object(&uri).unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "result": format!("{PREFIX}/result-{i}.txt") }));
        assert!(!ledger.is_pending(key));
    }
    assert_eq!(ledger.uploaded_count(), 32);
}

#[tokio::test]
async fn test_entry_dropped_when_an_output_never_uploads() {
    let temp_dir = TempDir::new().unwrap();
    let (store, ledger, cache) = setup(temp_dir.path());

    let uploaded = temp_dir.path().join("a.txt");
    let stranded = temp_dir.path().join("b.txt");
    std::fs::write(&uploaded, "a").unwrap();
    std::fs::write(&stranded, "b").unwrap();

    let inputs = Bindings::new();
    let key = cache_key("pair", &inputs);
    let mut outputs = Bindings::new();
    outputs.insert("a", Value::File(uploaded.display().to_string()));
    outputs.insert("b", Value::File(stranded.display().to_string()));

    cache.get(&key, &inputs, &BTreeMap::new()).await.unwrap();
    cache.put(&key, &outputs).await.unwrap();
    let waiting = ledger.publish(
        FileIdentity::resolve(uploaded.to_str().unwrap()).unwrap(),
        format!("{PREFIX}/a.txt"),
    );
    cache.commit_waiting(waiting).await;

    assert!(ledger.is_pending(&key));
    assert!(store
        .uris()
        .iter()
        .all(|uri| !uri.starts_with(&format!("{PREFIX}/cache/"))));
}
