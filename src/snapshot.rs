use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{build_aad, CryptoError, CryptoProvider};
use crate::event::UserId;
use crate::model::MessageRecord;

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SNAPSHOT_MAGIC: &[u8; 4] = b"CSNP";
const APP_NAMESPACE: &str = "chat-core";
const STORE_NAME: &str = "snapshot";
const MAX_SNAPSHOT_BYTES: usize = 5 * 1024 * 1024;

/// Hard cap on cached messages; the newest win, the tail is dropped.
pub const MAX_SNAPSHOT_MESSAGES: usize = 500;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted snapshot: {reason}")]
    Corrupted { reason: &'static str },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    #[error("schema version {found} is newer than supported {max}")]
    FutureSchema { found: u32, max: u32 },

    #[error("unknown schema version: {0}")]
    UnknownSchema(u32),

    #[error("snapshot too large: {size} bytes, max {max}")]
    TooLarge { size: usize, max: usize },

    #[error("too many cached messages: {count}, max {max}")]
    TooManyMessages { count: usize, max: usize },
}

impl From<ciborium::de::Error<std::io::Error>> for SnapshotError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        SnapshotError::Serialization(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for SnapshotError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        SnapshotError::Serialization(e.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct SnapshotEnvelope {
    magic: [u8; 4],
    schema_version: u32,
    checksum: [u8; 32],
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug)]
struct SnapshotPayload {
    messages: Vec<MessageRecord>,
}

/// The last full message list observed from the store, exactly as pushed
/// (newest first). Fully overwritten on every successful live update;
/// last-writer-wins by design.
#[derive(Debug)]
pub struct CachedSnapshot {
    schema_version: u32,
    messages: Vec<MessageRecord>,
}

impl CachedSnapshot {
    pub fn new(mut messages: Vec<MessageRecord>) -> Self {
        if messages.len() > MAX_SNAPSHOT_MESSAGES {
            tracing::debug!(
                dropped = messages.len() - MAX_SNAPSHOT_MESSAGES,
                "snapshot truncated to newest entries"
            );
            messages.truncate(MAX_SNAPSHOT_MESSAGES);
        }
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            messages,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<MessageRecord> {
        self.messages
    }

    /// Checksummed plaintext envelope.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let payload = SnapshotPayload {
            messages: self.messages.clone(),
        };

        let mut payload_bytes = Vec::new();
        ciborium::into_writer(&payload, &mut payload_bytes)?;

        let checksum = blake3::hash(&payload_bytes);

        let envelope = SnapshotEnvelope {
            magic: *SNAPSHOT_MAGIC,
            schema_version: self.schema_version,
            checksum: *checksum.as_bytes(),
            payload: payload_bytes,
        };

        let mut envelope_bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut envelope_bytes)?;

        if envelope_bytes.len() > MAX_SNAPSHOT_BYTES {
            return Err(SnapshotError::TooLarge {
                size: envelope_bytes.len(),
                max: MAX_SNAPSHOT_BYTES,
            });
        }

        Ok(envelope_bytes)
    }

    pub fn decode(envelope_bytes: &[u8]) -> Result<Self, SnapshotError> {
        if envelope_bytes.is_empty() {
            return Err(SnapshotError::Corrupted {
                reason: "empty envelope",
            });
        }

        if envelope_bytes.len() > MAX_SNAPSHOT_BYTES {
            return Err(SnapshotError::TooLarge {
                size: envelope_bytes.len(),
                max: MAX_SNAPSHOT_BYTES,
            });
        }

        let envelope: SnapshotEnvelope = ciborium::from_reader(envelope_bytes)?;

        if envelope.magic != *SNAPSHOT_MAGIC {
            return Err(SnapshotError::Corrupted {
                reason: "invalid magic bytes",
            });
        }

        if envelope.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(SnapshotError::FutureSchema {
                found: envelope.schema_version,
                max: CURRENT_SCHEMA_VERSION,
            });
        }

        let actual_checksum = blake3::hash(&envelope.payload);
        if actual_checksum.as_bytes() != &envelope.checksum {
            return Err(SnapshotError::IntegrityCheckFailed {
                expected: hex::encode(envelope.checksum),
                actual: hex::encode(actual_checksum.as_bytes()),
            });
        }

        let payload: SnapshotPayload = ciborium::from_reader(&envelope.payload[..])?;

        if payload.messages.len() > MAX_SNAPSHOT_MESSAGES {
            return Err(SnapshotError::TooManyMessages {
                count: payload.messages.len(),
                max: MAX_SNAPSHOT_MESSAGES,
            });
        }

        if envelope.schema_version < CURRENT_SCHEMA_VERSION {
            return Self::migrate(envelope.schema_version, payload);
        }

        Ok(Self {
            schema_version: envelope.schema_version,
            messages: payload.messages,
        })
    }

    /// Seal for at-rest storage. The AAD binds the envelope to this app,
    /// this store, the schema version, and the owning user, so a snapshot
    /// copied between installs or users will not open.
    pub fn seal<C: CryptoProvider>(
        &self,
        crypto: &C,
        user_id: &UserId,
    ) -> Result<Vec<u8>, SnapshotError> {
        let envelope_bytes = self.encode()?;
        let aad = build_aad(
            APP_NAMESPACE,
            STORE_NAME,
            self.schema_version,
            Some(user_id.as_str()),
        )?;
        Ok(crypto.encrypt(&envelope_bytes, &aad)?)
    }

    pub fn open<C: CryptoProvider>(
        sealed: &[u8],
        crypto: &C,
        user_id: &UserId,
    ) -> Result<Self, SnapshotError> {
        let aad = build_aad(
            APP_NAMESPACE,
            STORE_NAME,
            CURRENT_SCHEMA_VERSION,
            Some(user_id.as_str()),
        )?;
        let envelope_bytes = crypto.decrypt(sealed, &aad)?;
        Self::decode(&envelope_bytes)
    }

    fn migrate(from_version: u32, _payload: SnapshotPayload) -> Result<Self, SnapshotError> {
        // v1 is the first schema; anything older is unknown.
        Err(SnapshotError::UnknownSchema(from_version))
    }
}
