//! Immutable model snapshots, the swap handle, and their persisted form.

mod codec;

pub use codec::{
    decode_blob, decode_manifest, encode_blob, encode_manifest, staged_blob_name, ActiveManifest,
    BlobKind, ACTIVE_MANIFEST, MODEL_FORMAT, MODEL_FORMAT_VERSION,
};

use chrono::{DateTime, Utc};
use gemscope_domain::errors::ModelCorruption;
use gemscope_domain::repositories::model_store::ModelStore;
use gemscope_domain::services::classifier::{ClassifierConfig, GemClassifier};
use gemscope_domain::services::rl::{RlAgent, RlConfig};
use parking_lot::RwLock;
use std::sync::Arc;

/// One published generation of models. Never mutated after publication;
/// retraining produces a new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    /// 0 for the untrained bootstrap snapshot.
    pub version: u64,
    pub trained_at: Option<DateTime<Utc>>,
    pub classifier: GemClassifier,
    /// Replay memory is stripped before publication.
    pub agent: RlAgent,
}

impl ModelSnapshot {
    pub fn untrained(classifier: &ClassifierConfig, rl: &RlConfig) -> Self {
        Self {
            version: 0,
            trained_at: None,
            classifier: GemClassifier::untrained(classifier),
            agent: RlAgent::new(rl.clone()),
        }
    }
}

/// Shared pointer to the active snapshot. Readers clone the `Arc` and release
/// the lock immediately; promotion replaces it whole.
#[derive(Debug)]
pub struct ModelHandle {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl ModelHandle {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<ModelSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Returns the snapshot that was active before the swap.
    pub fn swap(&self, next: Arc<ModelSnapshot>) -> Arc<ModelSnapshot> {
        std::mem::replace(&mut *self.current.write(), next)
    }
}

/// Reads the active manifest and both blobs it names.
///
/// `Ok(None)` when nothing has been promoted yet. Store failures surface as
/// corruption of the blob being read.
pub fn load_active(store: &dyn ModelStore) -> Result<Option<ModelSnapshot>, ModelCorruption> {
    let Some(manifest_bytes) = store
        .load(ACTIVE_MANIFEST)
        .map_err(|err| ModelCorruption::new(ACTIVE_MANIFEST, err))?
    else {
        return Ok(None);
    };
    let manifest = decode_manifest(&manifest_bytes)?;

    let classifier_bytes = load_required(store, &manifest.classifier_blob)?;
    let classifier: GemClassifier =
        decode_blob(&manifest.classifier_blob, BlobKind::GemClassifier, &classifier_bytes)?;
    classifier
        .validate()
        .map_err(|err| ModelCorruption::new(&manifest.classifier_blob, err))?;

    let agent_bytes = load_required(store, &manifest.agent_blob)?;
    let agent: RlAgent = decode_blob(&manifest.agent_blob, BlobKind::RlAgent, &agent_bytes)?;
    agent
        .validate()
        .map_err(|err| ModelCorruption::new(&manifest.agent_blob, err))?;

    Ok(Some(ModelSnapshot {
        version: manifest.version,
        trained_at: manifest.trained_at,
        classifier,
        agent,
    }))
}

fn load_required(store: &dyn ModelStore, name: &str) -> Result<Vec<u8>, ModelCorruption> {
    store
        .load(name)
        .map_err(|err| ModelCorruption::new(name, err))?
        .ok_or_else(|| ModelCorruption::new(name, "blob named by the active manifest is missing"))
}

/// Writes both blobs under versioned staging names, then the manifest.
///
/// The manifest write is the commit point: a failure before it leaves the
/// previously active generation in place.
pub fn persist_snapshot(store: &dyn ModelStore, snapshot: &ModelSnapshot) -> Result<(), String> {
    let classifier_blob = staged_blob_name(snapshot.version, BlobKind::GemClassifier);
    let agent_blob = staged_blob_name(snapshot.version, BlobKind::RlAgent);

    let bytes = encode_blob(BlobKind::GemClassifier, &snapshot.classifier)?;
    store.save(&classifier_blob, &bytes)?;
    let bytes = encode_blob(BlobKind::RlAgent, &snapshot.agent)?;
    store.save(&agent_blob, &bytes)?;

    let manifest = ActiveManifest {
        format: MODEL_FORMAT.to_string(),
        format_version: MODEL_FORMAT_VERSION,
        version: snapshot.version,
        trained_at: snapshot.trained_at,
        classifier_blob,
        agent_blob,
    };
    store.save(ACTIVE_MANIFEST, &encode_manifest(&manifest)?)
}
