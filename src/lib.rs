#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod crypto;
pub mod event;
pub mod image_processing;
pub mod model;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::Model;

/// Message text policy bound, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Fixed on-device storage keys. Single key per store: every write is a
/// full overwrite, last-writer-wins.
pub const SNAPSHOT_STORAGE_KEY: &str = "chat.snapshot.v1";
pub const PROFILE_STORAGE_KEY: &str = "chat.profile.v1";

pub const SIGNED_IN_TOAST: &str = "Signed in Successfully!";
pub const SUBSCRIPTION_BANNER: &str =
    "Error fetching messages. Please check your network connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Authentication,
    Validation,
    Send,
    Upload,
    Media,
    MediaPermissionDenied,
    Location,
    LocationPermissionDenied,
    ImageTooLarge,
    ImageDimensionsTooLarge,
    ImageFormatUnsupported,
    ImageProcessing,
    Storage,
    Serialization,
    Crypto,
    InvalidState,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Authentication => "AUTH_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Send => "SEND_FAILED",
            Self::Upload => "UPLOAD_FAILED",
            Self::Media => "MEDIA_ERROR",
            Self::MediaPermissionDenied => "MEDIA_PERMISSION_DENIED",
            Self::Location => "LOCATION_ERROR",
            Self::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageDimensionsTooLarge => "IMAGE_DIMENSIONS_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Crypto => "CRYPTO_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Send | Self::Upload | Self::Media | Self::Location
            | Self::Storage => ErrorSeverity::Transient,

            Self::Serialization | Self::Crypto | Self::Internal | Self::InvalidState => {
                ErrorSeverity::Fatal
            }

            Self::Authentication
            | Self::Validation
            | Self::MediaPermissionDenied
            | Self::LocationPermissionDenied
            | Self::ImageTooLarge
            | Self::ImageDimensionsTooLarge
            | Self::ImageFormatUnsupported
            | Self::ImageProcessing
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Send | Self::Upload | Self::Media | Self::Location
                | Self::Storage
        )
    }
}

/// Nothing in this system is fatal to the app: every error ends in a
/// user-visible notice and a safe fallback state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    /// The alert text the shells present. Validation messages pass through
    /// verbatim; everything else maps to a fixed, user-safe string.
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Authentication => "Unable to sign in. Please try again.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Send => "Unable to send message. Please try again later.".into(),
            ErrorKind::Upload => "Error uploading image. Please try again later.".into(),
            ErrorKind::Media => "Action was canceled or failed.".into(),
            ErrorKind::MediaPermissionDenied => "Permissions haven't been granted.".into(),
            ErrorKind::Location => "Error occurred while fetching location".into(),
            ErrorKind::LocationPermissionDenied => {
                "Permissions to read location was denied.".into()
            }
            ErrorKind::ImageTooLarge => format!(
                "The image is too large. Please use an image smaller than {} MB.",
                image_processing::MAX_IMAGE_BYTES / 1_000_000
            ),
            ErrorKind::ImageDimensionsTooLarge => {
                "The image dimensions are too large. Please use a smaller photo.".into()
            }
            ErrorKind::ImageFormatUnsupported => {
                "This image format is not supported. Please use JPEG, PNG, or WebP.".into()
            }
            ErrorKind::ImageProcessing => {
                "Unable to process the image. Please try a different photo.".into()
            }
            ErrorKind::Storage => {
                "Unable to save data locally. Please free up some storage space.".into()
            }
            ErrorKind::Serialization | ErrorKind::Crypto => {
                "A data error occurred. Please contact support if this persists.".into()
            }
            ErrorKind::InvalidState => "Something went wrong. Please restart the app.".into(),
            ErrorKind::Internal | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<event::ValidationError> for AppError {
    fn from(e: event::ValidationError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<image_processing::ImageError> for AppError {
    fn from(e: image_processing::ImageError) -> Self {
        use image_processing::ImageError;
        let kind = match &e {
            ImageError::TooLarge { .. } => ErrorKind::ImageTooLarge,
            ImageError::DimensionsTooLarge { .. } => ErrorKind::ImageDimensionsTooLarge,
            ImageError::UnsupportedFormat => ErrorKind::ImageFormatUnsupported,
            ImageError::DecodeFailed(_) | ImageError::EncodeFailed(_) => {
                ErrorKind::ImageProcessing
            }
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<snapshot::SnapshotError> for AppError {
    fn from(e: snapshot::SnapshotError) -> Self {
        use snapshot::SnapshotError;
        let kind = match &e {
            SnapshotError::Crypto(_) => ErrorKind::Crypto,
            SnapshotError::Serialization(_) => ErrorKind::Serialization,
            _ => ErrorKind::Storage,
        };
        AppError::new(kind, e.to_string())
    }
}

#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        let future_diff_secs = (timestamp_ms.saturating_sub(now_ms)) / 1000;
        return if future_diff_secs < 60 {
            "Just now".into()
        } else {
            "Upcoming".into()
        };
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;

    if diff_secs < 5 {
        return "Just now".into();
    }
    if diff_secs < 60 {
        return format!("{diff_secs}s ago");
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m ago");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d ago");
    }
    if diff_days < 30 {
        return format!("{}w ago", diff_days / 7);
    }
    if diff_days < 365 {
        return format!("{}mo ago", diff_days / 30);
    }

    format!("{}y ago", diff_days / 365)
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// --- View model ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageBubble {
    pub id: String,
    pub text: String,
    pub author_name: String,
    pub is_mine: bool,
    pub time_ago: String,
    pub created_at_ms: u64,
    pub image_url: Option<String>,
    pub location: Option<event::Coordinate>,
    pub pending: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StartViewModel {
    pub draft_name: String,
    pub accent_hex: String,
    pub accent_options: Vec<String>,
    pub signing_in: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatViewModel {
    /// Navigation title: the chosen display name.
    pub title: String,
    pub accent_hex: String,
    pub is_loading: bool,
    pub offline: bool,
    pub banner: Option<String>,
    pub bubbles: Vec<MessageBubble>,
    pub composer_max_chars: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ViewModel {
    pub state: model::AppState,
    pub start: StartViewModel,
    pub chat: Option<ChatViewModel>,
    pub notice: Option<String>,
    pub toast: Option<String>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{AuthUser, Capabilities, MessageQuery, StoreOutput};
    use crate::crypto::SnapshotCipher;
    use crate::event::{
        MessageId, MessageText, SubscriptionId, UserId, ValidatedUrl, ValidationError,
    };
    use crate::model::{
        dedupe_by_id, sort_newest_first, AccentColor, AppState, Message, MessageRecord, Model,
        PermissionState, Profile, Session, UnixTimeMs,
    };
    use crate::snapshot::CachedSnapshot;

    #[cfg(feature = "media")]
    use crate::capabilities::{MediaError, MediaOutput, MediaSource};

    #[cfg(feature = "location")]
    use crate::capabilities::{LocationError, LocationOutput};
    #[cfg(feature = "location")]
    use crate::event::Coordinate;

    #[derive(Default)]
    pub struct App;

    impl App {
        fn now() -> UnixTimeMs {
            UnixTimeMs(get_current_time_ms())
        }

        /// Exactly one live subscription at a time: any previous listener is
        /// released before the new one is requested, and late pushes from a
        /// superseded token are discarded by the event handler.
        fn establish_subscription(model: &mut Model, caps: &Capabilities) {
            Self::teardown_subscription(model, caps);

            let token = SubscriptionId::generate();
            model.live_subscription = Some(token.clone());
            model.subscription_degraded = false;
            model.is_loading = model.messages.is_empty();

            tracing::info!(subscription = %token, "establishing live subscription");

            caps.store.subscribe(
                token.clone(),
                MessageQuery::newest_first(),
                move |result| Event::SubscriptionEvent {
                    subscription: token.clone(),
                    result: Box::new(result),
                },
            );
        }

        fn teardown_subscription(model: &mut Model, caps: &Capabilities) {
            if let Some(token) = model.live_subscription.take() {
                tracing::info!(subscription = %token, "releasing live subscription");
                caps.store.unsubscribe(token);
            }
        }

        fn load_snapshot(caps: &Capabilities) {
            caps.kv
                .get(SNAPSHOT_STORAGE_KEY.to_string(), |result| match result {
                    Ok(bytes) => Event::SnapshotLoaded { bytes },
                    Err(e) => Event::SnapshotLoadFailed {
                        reason: e.to_string(),
                    },
                });
        }

        /// Seals and writes the last pushed list. Failure is logged, never
        /// surfaced: a stale cache only degrades the offline view.
        fn persist_snapshot(model: &Model, caps: &Capabilities) {
            let Some(session) = &model.session else {
                tracing::warn!("cannot persist snapshot without a session");
                return;
            };
            let Some(cipher) = &model.snapshot_cipher else {
                tracing::debug!("no snapshot key yet, skipping persist");
                return;
            };

            let records: Vec<MessageRecord> = model
                .messages
                .iter()
                .filter(|m| !m.pending)
                .map(MessageRecord::from)
                .collect();

            match CachedSnapshot::new(records).seal(cipher, &session.user_id) {
                Ok(sealed) => {
                    caps.kv
                        .set(SNAPSHOT_STORAGE_KEY.to_string(), sealed, |result| {
                            match result {
                                Ok(_) => Event::SnapshotPersisted,
                                Err(e) => Event::SnapshotPersistFailed {
                                    reason: e.to_string(),
                                },
                            }
                        });
                }
                Err(e) => tracing::warn!(error = %e, "snapshot seal failed"),
            }
        }

        /// Cache miss, decrypt failure, or parse failure all present as the
        /// empty list rather than an error.
        fn open_snapshot(model: &Model, bytes: Option<Vec<u8>>) -> Vec<Message> {
            let Some(bytes) = bytes else {
                tracing::debug!("no cached snapshot");
                return Vec::new();
            };
            let Some(session) = &model.session else {
                return Vec::new();
            };
            let Some(cipher) = &model.snapshot_cipher else {
                tracing::warn!("cached snapshot present but no key to open it");
                return Vec::new();
            };

            match CachedSnapshot::open(&bytes, cipher, &session.user_id) {
                Ok(snapshot) => {
                    let messages = Self::to_domain(snapshot.into_messages());
                    tracing::info!(count = messages.len(), "serving cached snapshot");
                    messages
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cached snapshot unreadable, presenting empty list");
                    Vec::new()
                }
            }
        }

        /// Wire records to domain messages: malformed records are dropped,
        /// the rest sorted newest-first and deduplicated by id (keep-first).
        fn to_domain(records: Vec<MessageRecord>) -> Vec<Message> {
            let mut messages: Vec<Message> = records
                .into_iter()
                .filter_map(|record| match Message::try_from(record) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed message record");
                        None
                    }
                })
                .collect();

            sort_newest_first(&mut messages);
            dedupe_by_id(messages)
        }

        /// Full replace, never a merge: the push is the entire result set.
        fn apply_push(model: &mut Model, records: Vec<MessageRecord>) {
            let pushed = records.len();
            let messages = Self::to_domain(records);

            tracing::info!(pushed, kept = messages.len(), "subscription push applied");

            model.messages = messages;
            model.is_loading = false;
            model.subscription_degraded = false;
        }

        fn submit_message(model: &mut Model, caps: &Capabilities, message: Message) {
            let local_id = message.id.clone();
            let record = MessageRecord::from(&message);
            model.pending_sends.insert(local_id.clone(), message);

            caps.store.insert(record, move |result| Event::SendResponse {
                local_id,
                result: Box::new(result),
            });
        }

        fn persist_profile(model: &Model, caps: &Capabilities) {
            let profile = Profile {
                name: model.draft_name.trim().to_string(),
                accent: model.draft_accent,
            };

            match serde_json::to_vec(&profile) {
                Ok(bytes) => {
                    caps.kv
                        .set(PROFILE_STORAGE_KEY.to_string(), bytes, |result| {
                            match result {
                                Ok(_) => Event::ProfilePersisted,
                                Err(e) => Event::ProfilePersistFailed {
                                    reason: e.to_string(),
                                },
                            }
                        });
                }
                Err(e) => tracing::warn!(error = %e, "profile serialization failed"),
            }
        }

        #[cfg(feature = "media")]
        fn request_image(model: &mut Model, caps: &Capabilities, source: MediaSource) {
            let make_event =
                move |result| Event::MediaResponse {
                    source,
                    result: Box::new(result),
                };

            if model.media_permission.is_granted() {
                caps.media.pick_default(source, make_event);
            } else {
                model.media_permission = PermissionState::Requesting;
                caps.media.request_permission(source, make_event);
            }
        }

        fn build_bubbles(model: &Model, session: &Session, now_ms: u64) -> Vec<MessageBubble> {
            model
                .messages
                .iter()
                .map(|m| MessageBubble {
                    id: m.id.as_str().to_string(),
                    text: m.text.clone(),
                    author_name: m.author_name.clone(),
                    is_mine: m.authored_by(&session.user_id),
                    time_ago: format_time_ago(m.created_at.0, now_ms),
                    created_at_ms: m.created_at.0,
                    image_url: m.image.as_ref().map(|u| u.as_str().to_string()),
                    location: m.location,
                    pending: m.pending,
                })
                .collect()
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            tracing::debug!(event = event.name(), "handling event");

            match event {
                Event::AppStarted => {
                    caps.kv
                        .get(PROFILE_STORAGE_KEY.to_string(), |result| match result {
                            Ok(bytes) => Event::ProfileLoaded { bytes },
                            Err(e) => Event::ProfileLoadFailed {
                                reason: e.to_string(),
                            },
                        });
                    caps.render.render();
                }

                Event::AppBackgrounded => {
                    if model.chat_visible() {
                        Self::persist_snapshot(model, caps);
                    }
                }

                Event::StorageKeyProvided { key } => {
                    match SnapshotCipher::new(key.expose()) {
                        Ok(cipher) => {
                            model.snapshot_cipher = Some(cipher);
                            tracing::info!("snapshot key installed");
                        }
                        Err(e) => {
                            // Snapshot persistence is disabled; the app
                            // still works online.
                            tracing::error!(error = %e, "snapshot key rejected");
                        }
                    }
                }

                Event::ProfileLoaded { bytes } => {
                    if let Some(bytes) = bytes {
                        match serde_json::from_slice::<Profile>(&bytes) {
                            Ok(profile) => {
                                model.draft_name = profile.name;
                                model.draft_accent = profile.accent;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "stored profile unreadable, ignoring");
                            }
                        }
                    }
                    caps.render.render();
                }

                Event::ProfileLoadFailed { reason } => {
                    tracing::warn!(reason, "profile load failed");
                }

                Event::ProfilePersisted => {
                    tracing::debug!("profile persisted");
                }

                Event::ProfilePersistFailed { reason } => {
                    tracing::warn!(reason, "profile persist failed");
                }

                Event::NameChanged { name } => {
                    model.draft_name = name;
                    caps.render.render();
                }

                Event::AccentSelected { color } => {
                    model.draft_accent = color;
                    caps.render.render();
                }

                Event::SignInRequested => {
                    if model.state == AppState::Authenticating {
                        return;
                    }

                    model.state = AppState::Authenticating;
                    model.active_error = None;

                    caps.auth
                        .sign_in_anonymously(|result| Event::AuthResponse(Box::new(result)));
                    caps.render.render();
                }

                Event::AuthResponse(result) => {
                    match *result {
                        Ok(AuthUser { user_id }) => {
                            tracing::info!("anonymous sign-in complete");

                            model.session = Some(Session {
                                user_id: UserId::new(user_id),
                                display_name: model.draft_name.trim().to_string(),
                                accent: model.draft_accent,
                            });
                            model.set_toast(SIGNED_IN_TOAST);

                            Self::persist_profile(model, caps);
                            self.update(Event::ChatOpened, model, caps);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "sign-in failed");
                            model.state = AppState::Start;
                            model.set_error(AppError::new(
                                ErrorKind::Authentication,
                                e.to_string(),
                            ));
                        }
                    }
                    caps.render.render();
                }

                Event::ChatOpened => {
                    if model.session.is_none() {
                        tracing::warn!("chat opened without a session, ignoring");
                        return;
                    }

                    model.state = AppState::Chat;

                    if model.network_online {
                        Self::establish_subscription(model, caps);
                    } else {
                        model.is_loading = false;
                        Self::load_snapshot(caps);
                    }
                    caps.render.render();
                }

                Event::ChatClosed => {
                    Self::teardown_subscription(model, caps);
                    model.state = AppState::Start;
                    model.is_loading = false;
                    caps.render.render();
                }

                Event::RetrySubscriptionRequested => {
                    if model.chat_visible() && model.network_online {
                        Self::establish_subscription(model, caps);
                    } else {
                        model.subscription_degraded = false;
                    }
                    caps.render.render();
                }

                Event::NetworkStatusChanged { online } => {
                    let was_online = model.network_online;
                    model.network_online = online;

                    tracing::info!(online, "network status changed");

                    if online && !was_online {
                        // Full resync; no delta reconciliation.
                        if model.chat_visible() {
                            Self::establish_subscription(model, caps);
                        }
                    } else if !online && was_online {
                        Self::teardown_subscription(model, caps);
                        if model.chat_visible() {
                            Self::load_snapshot(caps);
                        }
                    }
                    caps.render.render();
                }

                Event::SubscriptionEvent {
                    subscription,
                    result,
                } => {
                    if model.live_subscription.as_ref() != Some(&subscription) {
                        tracing::debug!(subscription = %subscription, "discarding stale push");
                        return;
                    }

                    match *result {
                        Ok(StoreOutput::Snapshot { messages, .. }) => {
                            Self::apply_push(model, messages);
                            Self::persist_snapshot(model, caps);
                        }
                        Ok(other) => {
                            tracing::warn!(?other, "unexpected output on subscription stream");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "subscription degraded");
                            model.subscription_degraded = true;
                            model.is_loading = false;
                        }
                    }
                    caps.render.render();
                }

                Event::SendRequested { text } => {
                    let Some(session) = model.session.clone() else {
                        model.set_error(AppError::new(
                            ErrorKind::InvalidState,
                            "send requested without a session",
                        ));
                        caps.render.render();
                        return;
                    };

                    match MessageText::new(text) {
                        Ok(text) => {
                            if !model.network_online {
                                model.set_error(AppError::new(
                                    ErrorKind::Network,
                                    "cannot send while offline",
                                ));
                            } else {
                                let message =
                                    Message::outgoing_text(&session, &text, Self::now());
                                Self::submit_message(model, caps, message);
                            }
                        }
                        Err(ValidationError::EmptyText) => {
                            model.set_error(AppError::new(
                                ErrorKind::Validation,
                                "Please enter a message",
                            ));
                        }
                        Err(ValidationError::TextTooLong { .. }) => {
                            model.set_error(AppError::new(
                                ErrorKind::Validation,
                                "Message is too long! Please keep it under 200 characters.",
                            ));
                        }
                        Err(e) => {
                            model.set_error(AppError::from(e));
                        }
                    }
                    caps.render.render();
                }

                Event::SendResponse { local_id, result } => {
                    let pending = model.pending_sends.remove(&local_id);

                    match (*result, pending) {
                        (Ok(StoreOutput::Inserted { id }), Some(mut message)) => {
                            tracing::info!("message accepted by store");

                            // The store-assigned identifier wins; the entry
                            // stays pending until the next push confirms it.
                            message.id = MessageId::new(id);
                            message.pending = true;

                            let mut messages = std::mem::take(&mut model.messages);
                            messages.insert(0, message);
                            sort_newest_first(&mut messages);
                            model.messages = dedupe_by_id(messages);
                        }
                        (Ok(StoreOutput::Inserted { .. }), None) => {
                            tracing::warn!("insert response with no pending send");
                        }
                        (Ok(other), _) => {
                            tracing::warn!(?other, "unexpected output for insert");
                        }
                        (Err(e), _) => {
                            tracing::warn!(error = %e, "store write failed");
                            model.set_error(AppError::new(ErrorKind::Send, e.to_string()));
                        }
                    }
                    caps.render.render();
                }

                Event::SnapshotLoaded { bytes } => {
                    // Only meaningful while offline on the chat screen; a
                    // late response after reconnect must not clobber live
                    // data.
                    if model.network_online || !model.chat_visible() {
                        return;
                    }

                    model.messages = Self::open_snapshot(model, bytes);
                    model.is_loading = false;
                    caps.render.render();
                }

                Event::SnapshotLoadFailed { reason } => {
                    tracing::warn!(reason, "snapshot load failed");
                    if !model.network_online && model.chat_visible() {
                        model.messages = Vec::new();
                        model.is_loading = false;
                        caps.render.render();
                    }
                }

                Event::SnapshotPersisted => {
                    tracing::debug!("snapshot persisted");
                }

                Event::SnapshotPersistFailed { reason } => {
                    tracing::warn!(reason, "snapshot persist failed");
                }

                #[cfg(feature = "media")]
                Event::AttachImageRequested { source } => {
                    if model.session.is_none() || !model.chat_visible() {
                        return;
                    }

                    if !model.network_online {
                        model.set_error(AppError::new(
                            ErrorKind::Network,
                            "cannot upload while offline",
                        ));
                    } else {
                        Self::request_image(model, caps, source);
                    }
                    caps.render.render();
                }

                #[cfg(feature = "media")]
                Event::MediaResponse { source, result } => {
                    match *result {
                        Ok(MediaOutput::PermissionStatus { granted }) => {
                            model.media_permission = if granted {
                                PermissionState::Granted
                            } else {
                                PermissionState::Denied
                            };

                            if granted {
                                caps.media.pick_default(source, move |result| {
                                    Event::MediaResponse {
                                        source,
                                        result: Box::new(result),
                                    }
                                });
                            } else {
                                model.set_error(AppError::new(
                                    ErrorKind::MediaPermissionDenied,
                                    "media permission denied",
                                ));
                            }
                        }
                        Ok(MediaOutput::Image { data, .. }) => {
                            match image_processing::prepare_for_upload(&data) {
                                Ok(prepared) => {
                                    let Some(session) = &model.session else {
                                        return;
                                    };
                                    let reference = format!(
                                        "{}-{}-{}.jpg",
                                        session.user_id,
                                        Self::now().0,
                                        uuid::Uuid::new_v4()
                                    );

                                    tracing::info!(
                                        bytes = prepared.data.len(),
                                        "uploading attachment image"
                                    );

                                    caps.blob.upload(
                                        reference,
                                        prepared.data,
                                        prepared.mime_type.to_string(),
                                        |result| Event::UploadResponse {
                                            result: Box::new(result),
                                        },
                                    );
                                }
                                Err(e) => {
                                    model.set_error(AppError::from(e));
                                }
                            }
                        }
                        Ok(MediaOutput::Cancelled) => {
                            tracing::debug!("image pick cancelled");
                            model.set_error(AppError::new(ErrorKind::Media, "pick cancelled"));
                        }
                        Err(MediaError::PermissionDenied) => {
                            model.media_permission = PermissionState::Denied;
                            model.set_error(AppError::new(
                                ErrorKind::MediaPermissionDenied,
                                "media permission denied",
                            ));
                        }
                        Err(e) => {
                            model.set_error(AppError::new(ErrorKind::Media, e.to_string()));
                        }
                    }
                    caps.render.render();
                }

                #[cfg(feature = "media")]
                Event::UploadResponse { result } => {
                    match *result {
                        Ok(uploaded) => match ValidatedUrl::new(uploaded.url) {
                            Ok(url) => {
                                let Some(session) = model.session.clone() else {
                                    return;
                                };
                                let message =
                                    Message::outgoing_image(&session, url, Self::now());
                                Self::submit_message(model, caps, message);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "blob store returned invalid url");
                                model.set_error(AppError::new(ErrorKind::Upload, e.to_string()));
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "attachment upload failed");
                            model.set_error(AppError::new(ErrorKind::Upload, e.to_string()));
                        }
                    }
                    caps.render.render();
                }

                #[cfg(feature = "location")]
                Event::ShareLocationRequested => {
                    if model.session.is_none() || !model.chat_visible() {
                        return;
                    }

                    if !model.network_online {
                        model.set_error(AppError::new(
                            ErrorKind::Network,
                            "cannot send while offline",
                        ));
                    } else if model.location_permission.is_granted() {
                        caps.location
                            .get_position(|result| Event::LocationResponse(Box::new(result)));
                    } else {
                        model.location_permission = PermissionState::Requesting;
                        caps.location
                            .request_permission(|result| Event::LocationResponse(Box::new(result)));
                    }
                    caps.render.render();
                }

                #[cfg(feature = "location")]
                Event::LocationResponse(result) => {
                    match *result {
                        Ok(LocationOutput::PermissionStatus { granted }) => {
                            model.location_permission = if granted {
                                PermissionState::Granted
                            } else {
                                PermissionState::Denied
                            };

                            if granted {
                                caps.location.get_position(|result| {
                                    Event::LocationResponse(Box::new(result))
                                });
                            } else {
                                model.set_error(AppError::new(
                                    ErrorKind::LocationPermissionDenied,
                                    "location permission denied",
                                ));
                            }
                        }
                        Ok(LocationOutput::Position {
                            latitude,
                            longitude,
                            ..
                        }) => match Coordinate::new(latitude, longitude) {
                            Ok(coordinate) => {
                                let Some(session) = model.session.clone() else {
                                    return;
                                };
                                let message = Message::outgoing_location(
                                    &session,
                                    coordinate,
                                    Self::now(),
                                );
                                Self::submit_message(model, caps, message);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "locator returned invalid coordinate");
                                model.set_error(AppError::new(
                                    ErrorKind::Location,
                                    e.to_string(),
                                ));
                            }
                        },
                        Err(LocationError::PermissionDenied) => {
                            model.location_permission = PermissionState::Denied;
                            model.set_error(AppError::new(
                                ErrorKind::LocationPermissionDenied,
                                "location permission denied",
                            ));
                        }
                        Err(e) => {
                            model.set_error(AppError::new(ErrorKind::Location, e.to_string()));
                        }
                    }
                    caps.render.render();
                }

                Event::NoticeDismissed => {
                    model.active_error = None;
                    caps.render.render();
                }

                Event::ToastDismissed => {
                    model.active_toast = None;
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let now_ms = get_current_time_ms();

            let start = StartViewModel {
                draft_name: model.draft_name.clone(),
                accent_hex: model.draft_accent.hex().to_string(),
                accent_options: AccentColor::ALL.iter().map(|c| c.hex().to_string()).collect(),
                signing_in: model.state == AppState::Authenticating,
            };

            let chat = match (&model.state, &model.session) {
                (AppState::Chat, Some(session)) => Some(ChatViewModel {
                    title: session.display_name.clone(),
                    accent_hex: session.accent.hex().to_string(),
                    is_loading: model.is_loading,
                    offline: !model.network_online,
                    banner: model
                        .subscription_degraded
                        .then(|| SUBSCRIPTION_BANNER.to_string()),
                    bubbles: Self::build_bubbles(model, session, now_ms),
                    composer_max_chars: MAX_MESSAGE_CHARS,
                }),
                _ => None,
            };

            ViewModel {
                state: model.state.clone(),
                start,
                chat,
                notice: model.active_error.as_ref().map(AppError::user_facing_message),
                toast: model.active_toast.clone(),
            }
        }
    }
}
