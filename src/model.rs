use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::crypto::SnapshotCipher;
use crate::event::{Coordinate, MessageId, MessageText, SubscriptionId, UserId, ValidatedUrl};
use crate::event::ValidationError;
use crate::AppError;

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AccentColor {
    #[default]
    Charcoal,
    Plum,
    SlateBlue,
    Sage,
}

impl AccentColor {
    pub const ALL: [AccentColor; 4] = [
        AccentColor::Charcoal,
        AccentColor::Plum,
        AccentColor::SlateBlue,
        AccentColor::Sage,
    ];

    pub const fn hex(self) -> &'static str {
        match self {
            AccentColor::Charcoal => "#090C08",
            AccentColor::Plum => "#474056",
            AccentColor::SlateBlue => "#8A95A5",
            AccentColor::Sage => "#B9C6AE",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum AppState {
    Start,
    Authenticating,
    Chat,
}

impl Default for AppState {
    fn default() -> Self {
        Self::Start
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Unknown,
    Requesting,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

/// Navigation payload from the sign-in screen to the chat screen.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
    pub accent: AccentColor,
}

/// Sign-in screen inputs persisted across restarts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Profile {
    pub name: String,
    pub accent: AccentColor,
}

// --- Wire records (store documents, field names fixed by the backend) ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecordAuthor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RecordLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// One document in the `messages` collection, exactly as the store holds it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    pub uid: String,
    pub name: String,
    pub user: RecordAuthor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<RecordLocation>,
}

// --- Domain message ---

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub author: UserId,
    pub author_name: String,
    pub created_at: UnixTimeMs,
    pub image: Option<ValidatedUrl>,
    pub location: Option<Coordinate>,
    /// Prepended optimistically; not yet observed in a subscription push.
    pub pending: bool,
}

// Redact debug output because message text is user-provided content.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("created_at", &self.created_at)
            .field("text_chars", &self.text.chars().count())
            .field("image_present", &self.image.is_some())
            .field("location_present", &self.location.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Message {
    pub fn outgoing_text(session: &Session, text: &MessageText, now: UnixTimeMs) -> Self {
        Self {
            id: MessageId::generate(),
            text: text.as_str().to_string(),
            author: session.user_id.clone(),
            author_name: session.display_name.clone(),
            created_at: now,
            image: None,
            location: None,
            pending: true,
        }
    }

    pub fn outgoing_image(session: &Session, image: ValidatedUrl, now: UnixTimeMs) -> Self {
        Self {
            id: MessageId::generate(),
            text: String::new(),
            author: session.user_id.clone(),
            author_name: session.display_name.clone(),
            created_at: now,
            image: Some(image),
            location: None,
            pending: true,
        }
    }

    pub fn outgoing_location(session: &Session, location: Coordinate, now: UnixTimeMs) -> Self {
        Self {
            id: MessageId::generate(),
            text: String::new(),
            author: session.user_id.clone(),
            author_name: session.display_name.clone(),
            created_at: now,
            image: None,
            location: Some(location),
            pending: true,
        }
    }

    pub fn authored_by(&self, user: &UserId) -> bool {
        &self.author == user
    }
}

impl TryFrom<MessageRecord> for Message {
    type Error = ValidationError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let image = record.image.map(ValidatedUrl::new).transpose()?;
        let location = record
            .location
            .map(|l| Coordinate::new(l.latitude, l.longitude))
            .transpose()?;

        if record.text.trim().is_empty() && image.is_none() && location.is_none() {
            return Err(ValidationError::NoContent);
        }

        Ok(Self {
            id: MessageId::new(record.id),
            text: record.text,
            author: UserId::new(record.uid),
            author_name: record.name,
            created_at: UnixTimeMs(record.created_at),
            image,
            location,
            pending: false,
        })
    }
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.0.clone(),
            text: message.text.clone(),
            created_at: message.created_at.0,
            uid: message.author.0.clone(),
            name: message.author_name.clone(),
            user: RecordAuthor {
                id: message.author.0.clone(),
                name: message.author_name.clone(),
            },
            image: message.image.as_ref().map(|u| u.as_str().to_string()),
            location: message.location.map(|c| RecordLocation {
                latitude: c.latitude(),
                longitude: c.longitude(),
            }),
        }
    }
}

/// Stable sort, newest first. Stability keeps store order for equal
/// timestamps.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Drops repeated ids, keeping the first occurrence. In a newest-first list
/// that is the newest copy.
pub fn dedupe_by_id(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = std::collections::HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect()
}

// --- Model ---

pub struct Model {
    pub state: AppState,

    // Sign-in screen
    pub draft_name: String,
    pub draft_accent: AccentColor,
    pub session: Option<Session>,

    // Offline-first
    pub network_online: bool,
    pub live_subscription: Option<SubscriptionId>,
    pub subscription_degraded: bool,
    pub is_loading: bool,
    pub messages: Vec<Message>,
    pub pending_sends: HashMap<MessageId, Message>,

    // Snapshot sealing key, handed over by the shell keystore.
    pub snapshot_cipher: Option<SnapshotCipher>,

    // Generic UI state
    pub active_error: Option<AppError>,
    pub active_toast: Option<String>,

    #[cfg(feature = "media")]
    pub media_permission: PermissionState,
    #[cfg(feature = "location")]
    pub location_permission: PermissionState,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            state: AppState::Start,
            draft_name: String::new(),
            draft_accent: AccentColor::default(),
            session: None,
            // Assume connectivity until the shell reports otherwise.
            network_online: true,
            live_subscription: None,
            subscription_degraded: false,
            is_loading: false,
            messages: Vec::new(),
            pending_sends: HashMap::new(),
            snapshot_cipher: None,
            active_error: None,
            active_toast: None,
            #[cfg(feature = "media")]
            media_permission: PermissionState::Unknown,
            #[cfg(feature = "location")]
            location_permission: PermissionState::Unknown,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn chat_visible(&self) -> bool {
        self.state == AppState::Chat
    }

    pub fn set_error(&mut self, error: AppError) {
        tracing::warn!(code = error.code(), "surfacing error to user");
        self.active_error = Some(error);
    }

    pub fn set_toast(&mut self, message: impl Into<String>) {
        self.active_toast = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, at: u64) -> Message {
        Message {
            id: MessageId::new(id),
            text: "hello".into(),
            author: UserId::new("u1"),
            author_name: "Ada".into(),
            created_at: UnixTimeMs(at),
            image: None,
            location: None,
            pending: false,
        }
    }

    #[test]
    fn accent_color_has_four_fixed_values() {
        assert_eq!(AccentColor::ALL.len(), 4);
        assert_eq!(AccentColor::default().hex(), "#090C08");
        assert_eq!(AccentColor::Plum.hex(), "#474056");
        assert_eq!(AccentColor::SlateBlue.hex(), "#8A95A5");
        assert_eq!(AccentColor::Sage.hex(), "#B9C6AE");
    }

    #[test]
    fn sort_is_newest_first_and_stable() {
        let mut list = vec![message("a", 1), message("b", 3), message("c", 2)];
        sort_newest_first(&mut list);
        let ids: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);

        // Equal timestamps keep their relative order.
        let mut tied = vec![message("x", 5), message("y", 5), message("z", 5)];
        sort_newest_first(&mut tied);
        let ids: Vec<&str> = tied.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["x", "y", "z"]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let list = vec![message("a", 3), message("b", 2), message("a", 1)];
        let deduped = dedupe_by_id(list);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id.as_str(), "a");
        assert_eq!(deduped[0].created_at, UnixTimeMs(3));
        assert_eq!(deduped[1].id.as_str(), "b");
    }

    #[test]
    fn record_without_content_is_rejected() {
        let record = MessageRecord {
            id: "m1".into(),
            text: "   ".into(),
            created_at: 10,
            uid: "u1".into(),
            name: "Ada".into(),
            user: RecordAuthor {
                id: "u1".into(),
                name: "Ada".into(),
            },
            image: None,
            location: None,
        };
        assert_eq!(Message::try_from(record), Err(ValidationError::NoContent));
    }

    #[test]
    fn record_with_image_only_is_accepted() {
        let record = MessageRecord {
            id: "m1".into(),
            text: String::new(),
            created_at: 10,
            uid: "u1".into(),
            name: "Ada".into(),
            user: RecordAuthor {
                id: "u1".into(),
                name: "Ada".into(),
            },
            image: Some("https://blobs.example/img.jpg".into()),
            location: None,
        };
        let message = Message::try_from(record).unwrap();
        assert!(message.image.is_some());
        assert!(!message.pending);
    }

    #[test]
    fn record_with_bad_url_is_rejected() {
        let record = MessageRecord {
            id: "m1".into(),
            text: String::new(),
            created_at: 10,
            uid: "u1".into(),
            name: "Ada".into(),
            user: RecordAuthor {
                id: "u1".into(),
                name: "Ada".into(),
            },
            image: Some("javascript:alert(1)".into()),
            location: None,
        };
        assert!(Message::try_from(record).is_err());
    }

    #[test]
    fn record_roundtrip_through_domain() {
        let session = Session {
            user_id: UserId::new("u1"),
            display_name: "Ada".into(),
            accent: AccentColor::Plum,
        };
        let text = MessageText::new("hello there").unwrap();
        let message = Message::outgoing_text(&session, &text, UnixTimeMs(42));

        let record = MessageRecord::from(&message);
        assert_eq!(record.uid, "u1");
        assert_eq!(record.user.id, "u1");
        assert_eq!(record.created_at, 42);

        let back = Message::try_from(record).unwrap();
        assert_eq!(back.text, "hello there");
        assert_eq!(back.author, message.author);
        // Pending is a local-only flag; a record read back is confirmed.
        assert!(!back.pending);
    }

    #[test]
    fn record_field_names_match_store_schema() {
        let record = MessageRecord {
            id: "m1".into(),
            text: "hi".into(),
            created_at: 7,
            uid: "u1".into(),
            name: "Ada".into(),
            user: RecordAuthor {
                id: "u1".into(),
                name: "Ada".into(),
            },
            image: None,
            location: Some(RecordLocation {
                latitude: 52.0,
                longitude: 13.4,
            }),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["_id"], "m1");
        assert_eq!(json["createdAt"], 7);
        assert_eq!(json["user"]["_id"], "u1");
        assert_eq!(json["location"]["latitude"], 52.0);
        assert!(json.get("image").is_none());
    }
}
