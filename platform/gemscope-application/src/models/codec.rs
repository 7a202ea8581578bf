use chrono::{DateTime, Utc};
use gemscope_domain::entities::feature_vector::Signal;
use gemscope_domain::errors::ModelCorruption;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MODEL_FORMAT: &str = "gemscope-model";
pub const MODEL_FORMAT_VERSION: u32 = 1;
pub const ACTIVE_MANIFEST: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    GemClassifier,
    RlAgent,
}

impl BlobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobKind::GemClassifier => "gem_classifier",
            BlobKind::RlAgent => "rl_agent",
        }
    }
}

pub fn staged_blob_name(version: u64, kind: BlobKind) -> String {
    format!("models/v{version}/{}", kind.as_str())
}

/// Self-describing wrapper around one serialized model. The signal schema is
/// recorded so a blob trained against a different signal layout is refused.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    format: String,
    format_version: u32,
    kind: BlobKind,
    signal_schema: Vec<String>,
    /// Hex SHA-256 of `payload`.
    checksum: String,
    payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActiveManifest {
    pub format: String,
    pub format_version: u32,
    pub version: u64,
    pub trained_at: Option<DateTime<Utc>>,
    pub classifier_blob: String,
    pub agent_blob: String,
}

fn signal_schema() -> Vec<String> {
    Signal::ALL.iter().map(|s| s.name().to_string()).collect()
}

fn sha256_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

pub fn encode_blob<T: Serialize>(kind: BlobKind, model: &T) -> Result<Vec<u8>, String> {
    let payload = serde_json::to_string(model)
        .map_err(|err| format!("failed to serialize {}: {err}", kind.as_str()))?;
    let envelope = Envelope {
        format: MODEL_FORMAT.to_string(),
        format_version: MODEL_FORMAT_VERSION,
        kind,
        signal_schema: signal_schema(),
        checksum: sha256_hex(payload.as_bytes()),
        payload,
    };
    serde_json::to_vec(&envelope)
        .map_err(|err| format!("failed to serialize {} envelope: {err}", kind.as_str()))
}

pub fn decode_blob<T: DeserializeOwned>(
    name: &str,
    expected: BlobKind,
    bytes: &[u8],
) -> Result<T, ModelCorruption> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|err| ModelCorruption::new(name, format!("unreadable envelope: {err}")))?;
    if envelope.format != MODEL_FORMAT {
        return Err(ModelCorruption::new(
            name,
            format!("unexpected format `{}`", envelope.format),
        ));
    }
    if envelope.format_version != MODEL_FORMAT_VERSION {
        return Err(ModelCorruption::new(
            name,
            format!("unsupported format_version {}", envelope.format_version),
        ));
    }
    if envelope.kind != expected {
        return Err(ModelCorruption::new(
            name,
            format!(
                "expected {} blob, found {}",
                expected.as_str(),
                envelope.kind.as_str()
            ),
        ));
    }
    if envelope.signal_schema != signal_schema() {
        return Err(ModelCorruption::new(name, "signal schema mismatch"));
    }
    if sha256_hex(envelope.payload.as_bytes()) != envelope.checksum {
        return Err(ModelCorruption::new(name, "checksum mismatch"));
    }
    serde_json::from_str(&envelope.payload)
        .map_err(|err| ModelCorruption::new(name, format!("invalid payload: {err}")))
}

pub fn encode_manifest(manifest: &ActiveManifest) -> Result<Vec<u8>, String> {
    serde_json::to_vec_pretty(manifest)
        .map_err(|err| format!("failed to serialize active manifest: {err}"))
}

pub fn decode_manifest(bytes: &[u8]) -> Result<ActiveManifest, ModelCorruption> {
    let manifest: ActiveManifest = serde_json::from_slice(bytes)
        .map_err(|err| ModelCorruption::new(ACTIVE_MANIFEST, format!("unreadable manifest: {err}")))?;
    if manifest.format != MODEL_FORMAT || manifest.format_version != MODEL_FORMAT_VERSION {
        return Err(ModelCorruption::new(
            ACTIVE_MANIFEST,
            format!(
                "unsupported manifest format {} v{}",
                manifest.format, manifest.format_version
            ),
        ));
    }
    Ok(manifest)
}
