use aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;
use zeroize::Zeroize;

const ENVELOPE_MAGIC: [u8; 8] = *b"CHATSEC1";
const CURRENT_VERSION: u32 = 1;
const MIN_SUPPORTED_VERSION: u32 = 1;
const HEADER_SIZE: usize = 37; // magic 8 + version 4 + alg 1 + nonce 24
const TAG_SIZE: usize = 16;
const NONCE_SIZE: usize = 24;
pub const KEY_SIZE: usize = 32;
const MAX_AAD_LEN: usize = 8 * 1024;
const MAX_AAD_FIELD: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_plaintext: usize,
    pub max_ciphertext: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_plaintext: 5 * 1024 * 1024,
            max_ciphertext: 6 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptFailure {
    MalformedEnvelope,
    UnsupportedVersion { version: u32 },
    UnsupportedAlgorithm { alg: u8 },
    AuthenticationFailed,
    PayloadTooLarge,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("randomness unavailable")]
    RandomUnavailable,

    #[error("plaintext too large: {size} > {max}")]
    PlaintextTooLarge { size: usize, max: usize },

    #[error("ciphertext too large: {size} > {max}")]
    CiphertextTooLarge { size: usize, max: usize },

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: {0:?}")]
    DecryptionFailed(DecryptFailure),

    #[error("aad too large: {size} > {max}")]
    AadTooLarge { size: usize, max: usize },

    #[error("aad field too large: {field} has {size} > {max}")]
    AadFieldTooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    #[error("aad required but empty")]
    AadRequired,
}

pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

pub trait RandomProvider: Send + Sync {
    fn fill(&self, out: &mut [u8]) -> Result<(), CryptoError>;
}

pub struct OsRng;

impl RandomProvider for OsRng {
    fn fill(&self, out: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::getrandom(out).map_err(|_| CryptoError::RandomUnavailable)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AlgId {
    XChaCha20Poly1305 = 1,
}

impl TryFrom<u8> for AlgId {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlgId::XChaCha20Poly1305),
            other => Err(other),
        }
    }
}

/// Seals the cached snapshot under the single device key the shell keystore
/// hands over at startup. The envelope keeps a version and algorithm byte so
/// a future key scheme can still read old snapshots.
pub struct SnapshotCipher {
    key: Secret<[u8; KEY_SIZE]>,
    rng: Box<dyn RandomProvider>,
    limits: Limits,
}

impl SnapshotCipher {
    pub fn new(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        Self::with_rng(key_bytes, Box::new(OsRng), Limits::default())
    }

    pub fn with_rng(
        key_bytes: &[u8],
        rng: Box<dyn RandomProvider>,
        limits: Limits,
    ) -> Result<Self, CryptoError> {
        if key_bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: key_bytes.len(),
            });
        }

        let mut k = [0u8; KEY_SIZE];
        k.copy_from_slice(key_bytes);
        let key = Secret::new(k);
        k.zeroize();

        Ok(Self { key, rng, limits })
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()))
    }

    fn decrypt_inner(&self, envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        validate_aad(aad)?;

        if envelope.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::MalformedEnvelope,
            ));
        }

        if envelope.len() > self.limits.max_ciphertext {
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::PayloadTooLarge,
            ));
        }

        if envelope[0..8] != ENVELOPE_MAGIC {
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::MalformedEnvelope,
            ));
        }

        let version = u32::from_le_bytes(envelope[8..12].try_into().expect("4 bytes"));
        if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::UnsupportedVersion { version },
            ));
        }

        let alg_byte = envelope[12];
        AlgId::try_from(alg_byte).map_err(|_| {
            CryptoError::DecryptionFailed(DecryptFailure::UnsupportedAlgorithm { alg: alg_byte })
        })?;

        let nonce_bytes: [u8; NONCE_SIZE] = envelope[13..37].try_into().expect("24 bytes");
        let ciphertext_with_tag = &envelope[HEADER_SIZE..];

        let ct_len = ciphertext_with_tag.len() - TAG_SIZE;
        let mut buffer = ciphertext_with_tag[..ct_len].to_vec();
        let tag = &ciphertext_with_tag[ct_len..];

        let result = self.cipher().decrypt_in_place_detached(
            XNonce::from_slice(&nonce_bytes),
            aad,
            &mut buffer,
            tag.into(),
        );

        if result.is_err() {
            buffer.zeroize();
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::AuthenticationFailed,
            ));
        }

        if buffer.len() > self.limits.max_plaintext {
            buffer.zeroize();
            return Err(CryptoError::DecryptionFailed(
                DecryptFailure::PayloadTooLarge,
            ));
        }

        Ok(buffer)
    }
}

impl CryptoProvider for SnapshotCipher {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        validate_aad(aad)?;

        if plaintext.len() > self.limits.max_plaintext {
            return Err(CryptoError::PlaintextTooLarge {
                size: plaintext.len(),
                max: self.limits.max_plaintext,
            });
        }

        let total_len = HEADER_SIZE + plaintext.len() + TAG_SIZE;
        if total_len > self.limits.max_ciphertext {
            return Err(CryptoError::CiphertextTooLarge {
                size: total_len,
                max: self.limits.max_ciphertext,
            });
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes)?;

        let mut out = vec![0u8; total_len];
        out[0..8].copy_from_slice(&ENVELOPE_MAGIC);
        out[8..12].copy_from_slice(&CURRENT_VERSION.to_le_bytes());
        out[12] = AlgId::XChaCha20Poly1305 as u8;
        out[13..37].copy_from_slice(&nonce_bytes);

        let pt_end = HEADER_SIZE + plaintext.len();
        out[HEADER_SIZE..pt_end].copy_from_slice(plaintext);

        let tag = self
            .cipher()
            .encrypt_in_place_detached(
                XNonce::from_slice(&nonce_bytes),
                aad,
                &mut out[HEADER_SIZE..pt_end],
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        out[pt_end..].copy_from_slice(&tag);

        Ok(out)
    }

    fn decrypt(&self, envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_inner(envelope, aad)
    }
}

fn validate_aad(aad: &[u8]) -> Result<(), CryptoError> {
    if aad.is_empty() {
        return Err(CryptoError::AadRequired);
    }
    if aad.len() > MAX_AAD_LEN {
        return Err(CryptoError::AadTooLarge {
            size: aad.len(),
            max: MAX_AAD_LEN,
        });
    }
    Ok(())
}

/// Length-prefixed AAD so `("ab","c")` and `("a","bc")` cannot collide.
pub fn build_aad(
    app_ns: &str,
    store_name: &str,
    schema_version: u32,
    user_id: Option<&str>,
) -> Result<Vec<u8>, CryptoError> {
    validate_aad_field("app_ns", app_ns)?;
    validate_aad_field("store_name", store_name)?;

    if let Some(u) = user_id {
        validate_aad_field("user_id", u)?;
    }

    let capacity =
        2 + app_ns.len() + 2 + store_name.len() + 4 + 1 + user_id.map_or(0, |u| 2 + u.len());
    let mut aad = Vec::with_capacity(capacity);

    aad.extend_from_slice(&(app_ns.len() as u16).to_le_bytes());
    aad.extend_from_slice(app_ns.as_bytes());

    aad.extend_from_slice(&(store_name.len() as u16).to_le_bytes());
    aad.extend_from_slice(store_name.as_bytes());

    aad.extend_from_slice(&schema_version.to_le_bytes());

    match user_id {
        None => aad.push(0),
        Some(u) => {
            aad.push(1);
            aad.extend_from_slice(&(u.len() as u16).to_le_bytes());
            aad.extend_from_slice(u.as_bytes());
        }
    }

    Ok(aad)
}

fn validate_aad_field(name: &'static str, value: &str) -> Result<(), CryptoError> {
    if value.len() > MAX_AAD_FIELD {
        return Err(CryptoError::AadFieldTooLarge {
            field: name,
            size: value.len(),
            max: MAX_AAD_FIELD,
        });
    }
    Ok(())
}
