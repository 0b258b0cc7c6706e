use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PICK_MAX_DIMENSION: u32 = 4096;
pub const DEFAULT_PICK_QUALITY: u8 = 90;

/// OS-level, permission-gated image acquisition: the photo library picker
/// or a camera capture. One-shot request/response; cancellation is a
/// normal output, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaSource {
    Gallery,
    Camera,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickConfig {
    pub max_dimension: u32,
    pub quality: u8,
    pub strip_metadata: bool,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_PICK_MAX_DIMENSION,
            quality: DEFAULT_PICK_QUALITY,
            strip_metadata: true,
        }
    }
}

impl PickConfig {
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn keep_metadata(mut self) -> Self {
        self.strip_metadata = false;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaOperation {
    RequestPermission { source: MediaSource },
    Pick { source: MediaSource, config: PickConfig },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaOutput {
    PermissionStatus {
        granted: bool,
    },
    Image {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        mime_type: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("source unavailable: {message}")]
    Unavailable { message: String },

    #[error("media acquisition failed: {message}")]
    Failed { message: String },
}

pub type MediaResult = Result<MediaOutput, MediaError>;

impl Operation for MediaOperation {
    type Output = MediaResult;
}

#[derive(Clone)]
pub struct MediaPicker<Ev> {
    context: CapabilityContext<MediaOperation, Ev>,
}

impl<Ev> Capability<Ev> for MediaPicker<Ev> {
    type Operation = MediaOperation;
    type MappedSelf<MappedEv> = MediaPicker<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        MediaPicker::new(self.context.map_event(f))
    }
}

impl<Ev> MediaPicker<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<MediaOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn request_permission<F>(&self, source: MediaSource, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(MediaOperation::RequestPermission { source })
                .await;
            context.update_app(make_event(result));
        });
    }

    pub fn pick<F>(&self, source: MediaSource, config: PickConfig, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(MediaOperation::Pick { source, config })
                .await;
            context.update_app(make_event(result));
        });
    }

    pub fn pick_default<F>(&self, source: MediaSource, make_event: F)
    where
        F: FnOnce(MediaResult) -> Ev + Send + 'static,
    {
        self.pick(source, PickConfig::default(), make_event);
    }
}
