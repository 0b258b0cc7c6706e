use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::capabilities::{AuthResult, StoreResult};
use crate::model::AccentColor;

#[cfg(feature = "media")]
use crate::capabilities::{MediaResult, MediaSource, UploadResult};

#[cfg(feature = "location")]
use crate::capabilities::LocationResult;

// --- Secret wrapper: redacts Debug, zeroizes on Drop ---
//
// Key material crosses the FFI boundary once, at startup, when the shell
// hands over the keystore-held snapshot key.

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretBytes(#[serde(with = "serde_bytes")] Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(MessageId);
typed_id!(UserId);
typed_id!(SubscriptionId);

impl SubscriptionId {
    /// Fresh token for a new live subscription. Tokens are never reused, so
    /// a push carrying a stale token identifies itself.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Locally-assigned id for a message the store has not named yet.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// --- Validation errors ---

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid coordinate: latitude={0}, longitude={1}")]
    InvalidCoordinate(f64, f64),
    #[error("message text is empty")]
    EmptyText,
    #[error("message text too long ({chars} > {max} characters)")]
    TextTooLong { chars: usize, max: usize },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("message carries no text, image, or location")]
    NoContent,
}

// --- Coordinate: validated, NaN-safe ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(ValidationError::InvalidCoordinate(latitude, longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl Eq for Coordinate {}

// --- Message text: trimmed, bounded ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageText(String);

impl MessageText {
    /// Trims the input, then enforces non-empty and the character bound.
    /// The bound counts `char`s, not bytes, so multi-byte text is not
    /// penalized.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = s.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let chars = trimmed.chars().count();
        if chars > crate::MAX_MESSAGE_CHARS {
            return Err(ValidationError::TextTooLong {
                chars,
                max: crate::MAX_MESSAGE_CHARS,
            });
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

// --- Validated URL ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidatedUrl(String);

impl ValidatedUrl {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let parsed = url::Url::parse(&s).map_err(|_| ValidationError::InvalidUrl(s.clone()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self(s)),
            _ => Err(ValidationError::InvalidUrl(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// --- Event enum: large variants boxed to keep the enum small ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle
    AppStarted,
    AppBackgrounded,
    StorageKeyProvided {
        key: SecretBytes,
    },
    ProfileLoaded {
        bytes: Option<Vec<u8>>,
    },
    ProfileLoadFailed {
        reason: String,
    },
    ProfilePersisted,
    ProfilePersistFailed {
        reason: String,
    },

    // Sign-in screen
    NameChanged {
        name: String,
    },
    AccentSelected {
        color: AccentColor,
    },
    SignInRequested,
    AuthResponse(Box<AuthResult>),

    // Connectivity
    NetworkStatusChanged {
        online: bool,
    },

    // Chat screen & live subscription
    ChatOpened,
    ChatClosed,
    RetrySubscriptionRequested,
    SubscriptionEvent {
        subscription: SubscriptionId,
        result: Box<StoreResult>,
    },

    // Send
    SendRequested {
        text: String,
    },
    SendResponse {
        local_id: MessageId,
        result: Box<StoreResult>,
    },

    // Cached snapshot
    SnapshotLoaded {
        bytes: Option<Vec<u8>>,
    },
    SnapshotLoadFailed {
        reason: String,
    },
    SnapshotPersisted,
    SnapshotPersistFailed {
        reason: String,
    },

    // Attachments
    #[cfg(feature = "media")]
    AttachImageRequested {
        source: MediaSource,
    },
    #[cfg(feature = "media")]
    MediaResponse {
        source: MediaSource,
        result: Box<MediaResult>,
    },
    #[cfg(feature = "media")]
    UploadResponse {
        result: Box<UploadResult>,
    },
    #[cfg(feature = "location")]
    ShareLocationRequested,
    #[cfg(feature = "location")]
    LocationResponse(Box<LocationResult>),

    // Notices
    NoticeDismissed,
    ToastDismissed,
}

impl Event {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::AppStarted => "app_started",
            Event::AppBackgrounded => "app_backgrounded",
            Event::StorageKeyProvided { .. } => "storage_key_provided",
            Event::ProfileLoaded { .. } => "profile_loaded",
            Event::ProfileLoadFailed { .. } => "profile_load_failed",
            Event::ProfilePersisted => "profile_persisted",
            Event::ProfilePersistFailed { .. } => "profile_persist_failed",
            Event::NameChanged { .. } => "name_changed",
            Event::AccentSelected { .. } => "accent_selected",
            Event::SignInRequested => "sign_in_requested",
            Event::AuthResponse(_) => "auth_response",
            Event::NetworkStatusChanged { .. } => "network_status_changed",
            Event::ChatOpened => "chat_opened",
            Event::ChatClosed => "chat_closed",
            Event::RetrySubscriptionRequested => "retry_subscription_requested",
            Event::SubscriptionEvent { .. } => "subscription_event",
            Event::SendRequested { .. } => "send_requested",
            Event::SendResponse { .. } => "send_response",
            Event::SnapshotLoaded { .. } => "snapshot_loaded",
            Event::SnapshotLoadFailed { .. } => "snapshot_load_failed",
            Event::SnapshotPersisted => "snapshot_persisted",
            Event::SnapshotPersistFailed { .. } => "snapshot_persist_failed",
            #[cfg(feature = "media")]
            Event::AttachImageRequested { .. } => "attach_image_requested",
            #[cfg(feature = "media")]
            Event::MediaResponse { .. } => "media_response",
            #[cfg(feature = "media")]
            Event::UploadResponse { .. } => "upload_response",
            #[cfg(feature = "location")]
            Event::ShareLocationRequested => "share_location_requested",
            #[cfg(feature = "location")]
            Event::LocationResponse(_) => "location_response",
            Event::NoticeDismissed => "notice_dismissed",
            Event::ToastDismissed => "toast_dismissed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_rejects_nan() {
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, 181.0).is_err());
        assert!(Coordinate::new(-91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
    }

    #[test]
    fn coordinate_accepts_valid() {
        assert!(Coordinate::new(45.0, -73.0).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn coordinate_rejects_infinity() {
        assert!(Coordinate::new(f64::INFINITY, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = SecretBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", s), "[REDACTED]");
    }

    #[test]
    fn message_text_trims_and_rejects_empty() {
        assert!(MessageText::new("").is_err());
        assert!(MessageText::new("   \t  ").is_err());
        assert_eq!(MessageText::new("  hi  ").unwrap().as_str(), "hi");
    }

    #[test]
    fn message_text_enforces_char_bound() {
        let at_limit = "a".repeat(crate::MAX_MESSAGE_CHARS);
        assert!(MessageText::new(at_limit).is_ok());

        let over = "a".repeat(crate::MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            MessageText::new(over),
            Err(ValidationError::TextTooLong { .. })
        ));
    }

    #[test]
    fn message_text_counts_chars_not_bytes() {
        // 200 multi-byte characters is within the bound even though the
        // byte length is far above it.
        let text = "ü".repeat(crate::MAX_MESSAGE_CHARS);
        assert!(text.len() > crate::MAX_MESSAGE_CHARS);
        assert!(MessageText::new(text).is_ok());
    }

    #[test]
    fn validated_url_rejects_non_http_schemes() {
        assert!(ValidatedUrl::new("javascript:alert(1)").is_err());
        assert!(ValidatedUrl::new("ftp://files.example").is_err());
        assert!(ValidatedUrl::new("not a url").is_err());
        assert!(ValidatedUrl::new("https://example.com/img.jpg").is_ok());
        assert!(ValidatedUrl::new("http://example.com").is_ok());
    }

    #[test]
    fn typed_ids_are_not_interchangeable() {
        let message = MessageId::new("abc");
        let user = UserId::new("abc");
        // Different types — mixing them is a compile error. This test is
        // documentation; the compiler enforces it.
        assert_eq!(message.as_str(), user.as_str());
    }

    #[test]
    fn subscription_tokens_are_unique() {
        assert_ne!(SubscriptionId::generate(), SubscriptionId::generate());
    }

    #[test]
    fn event_size_is_reasonable() {
        // Ensure boxing keeps the enum small.
        let size = std::mem::size_of::<Event>();
        assert!(
            size <= 128,
            "Event enum is {} bytes — too large, box more variants",
            size
        );
    }
}
