use gemscope_domain::repositories::model_store::ModelStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BLOB_EXTENSION: &str = "json";

fn record_store_metrics<T>(
    backend: &'static str,
    op: &'static str,
    start: Instant,
    result: &Result<T, String>,
) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "gemscope.infra.model_store.calls_total",
        "backend" => backend,
        "op" => op,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!(
        "gemscope.infra.model_store.duration_ms",
        "backend" => backend,
        "op" => op,
        "result" => result_label
    )
    .record(start.elapsed().as_millis() as f64);
}

/// Names are `/`-separated segments of ASCII alphanumerics, `_`, `-` and `.`;
/// no segment may be empty or start with a dot.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("model name is empty".to_string());
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(format!("invalid model name `{name}`"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(format!("invalid model name `{name}`"));
        }
    }
    Ok(())
}

/// One file per blob under `root`, e.g. `models/v3/rl_agent` is stored at
/// `<root>/models/v3/rl_agent.json`. Saves go through a temp file and a
/// rename, so a reader never sees a half-written blob.
#[derive(Debug, Clone)]
pub struct FilesystemModelStore {
    root: PathBuf,
}

impl FilesystemModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, String> {
        validate_name(name)?;
        let mut path = self.root.clone();
        for segment in name.split('/') {
            path.push(segment);
        }
        path.set_extension(BLOB_EXTENSION);
        Ok(path)
    }

    fn load_inner(&self, name: &str) -> Result<Option<Vec<u8>>, String> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|err| format!("failed to read model blob {}: {}", path.display(), err))
    }

    fn save_inner(&self, name: &str, blob: &[u8]) -> Result<(), String> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create dir {}: {}", parent.display(), err))?;
        }
        let tmp = path.with_extension(format!("{BLOB_EXTENSION}.tmp"));
        fs::write(&tmp, blob)
            .map_err(|err| format!("failed to write model blob {}: {}", tmp.display(), err))?;
        fs::rename(&tmp, &path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            format!("failed to move model blob into {}: {}", path.display(), err)
        })
    }
}

impl ModelStore for FilesystemModelStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, String> {
        let start = Instant::now();
        let result = self.load_inner(name);
        record_store_metrics("filesystem", "load", start, &result);
        result
    }

    fn save(&self, name: &str, blob: &[u8]) -> Result<(), String> {
        let start = Instant::now();
        let result = self.save_inner(name, blob);
        if let Err(err) = &result {
            tracing::warn!(name, error = %err, "model blob save failed");
        }
        record_store_metrics("filesystem", "save", start, &result);
        result
    }
}

/// Process-local store for tests and benchmarks.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(name).cloned()
    }

    /// Writes without name validation, for seeding fixtures.
    pub fn insert(&self, name: impl Into<String>, blob: impl Into<Vec<u8>>) {
        self.blobs.write().insert(name.into(), blob.into());
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, String> {
        let start = Instant::now();
        let result = validate_name(name).map(|()| self.get(name));
        record_store_metrics("memory", "load", start, &result);
        result
    }

    fn save(&self, name: &str, blob: &[u8]) -> Result<(), String> {
        let start = Instant::now();
        let result = validate_name(name).map(|()| self.insert(name, blob));
        record_store_metrics("memory", "save", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_name, InMemoryModelStore};
    use gemscope_domain::repositories::model_store::ModelStore;

    #[test]
    fn names_reject_traversal_and_odd_characters() {
        assert!(validate_name("active").is_ok());
        assert!(validate_name("models/v12/gem_classifier").is_ok());
        for bad in ["", "../etc", "models//x", "models/.hidden", "a b", "x\\y"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn memory_store_round_trips_and_reports_missing() {
        let store = InMemoryModelStore::new();
        assert_eq!(store.load("active").expect("load"), None);
        store.save("models/v1/rl_agent", b"{}").expect("save");
        assert_eq!(
            store.load("models/v1/rl_agent").expect("load"),
            Some(b"{}".to_vec())
        );
        assert_eq!(store.names(), vec!["models/v1/rl_agent".to_string()]);
        assert!(store.save("../x", b"1").is_err());
    }
}
