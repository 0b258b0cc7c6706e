mod auth;
mod blob;
mod store;

#[cfg(feature = "media")]
mod media;

#[cfg(feature = "location")]
mod location;

pub use self::auth::{Auth, AuthError, AuthOperation, AuthResult, AuthUser};
pub use self::blob::{BlobError, BlobOperation, BlobStore, UploadResult, UploadedBlob};
pub use self::store::{
    MessageQuery, MessageStore, OrderBy, StoreError, StoreOperation, StoreOutput, StoreResult,
    MESSAGES_COLLECTION,
};

#[cfg(feature = "media")]
pub use self::media::{
    MediaError, MediaOperation, MediaOutput, MediaPicker, MediaResult, MediaSource, PickConfig,
};

#[cfg(feature = "location")]
pub use self::location::{
    Location, LocationError, LocationOperation, LocationOutput, LocationResult,
};

// Crux's built-in Render and KeyValue capabilities are used directly: view
// invalidation and on-device key-value storage need nothing bespoke.
pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::event::Event;

pub type AppRender = Render<Event>;
pub type AppKv = KeyValue<Event>;
pub type AppAuth = Auth<Event>;
pub type AppStore = MessageStore<Event>;
pub type AppBlob = BlobStore<Event>;

#[cfg(feature = "media")]
pub type AppMedia = MediaPicker<Event>;

#[cfg(feature = "location")]
pub type AppLocation = Location<Event>;

// The `Effect` derive (crux_macros 0.3.x) names each enum variant after the
// capability type's last path segment. Transparent generic aliases keep the
// variant names aligned with the field names (Kv, Store, Blob, Media) that the
// rest of the crate and its tests refer to.
type Kv<E> = KeyValue<E>;
type Store<E> = MessageStore<E>;
type Blob<E> = BlobStore<E>;

#[cfg(feature = "media")]
type Media<E> = MediaPicker<E>;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[cfg(feature = "media")]
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[cfg(feature = "location")]
    #[error("location error: {0}")]
    Location(#[from] LocationError),
}

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub kv: Kv<Event>,
    pub auth: Auth<Event>,
    pub store: Store<Event>,
    pub blob: Blob<Event>,

    #[cfg(feature = "media")]
    pub media: Media<Event>,

    #[cfg(feature = "location")]
    pub location: Location<Event>,
}
