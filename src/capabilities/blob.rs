use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bridge to the managed blob store: bytes in, retrievable URL out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlobOperation {
    Upload {
        /// Storage reference, unique per upload.
        reference: String,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        content_type: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedBlob {
    pub url: String,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlobError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("upload rejected: {message}")]
    Rejected { message: String },
}

pub type UploadResult = Result<UploadedBlob, BlobError>;

impl Operation for BlobOperation {
    type Output = UploadResult;
}

#[derive(Clone)]
pub struct BlobStore<Ev> {
    context: CapabilityContext<BlobOperation, Ev>,
}

impl<Ev> Capability<Ev> for BlobStore<Ev> {
    type Operation = BlobOperation;
    type MappedSelf<MappedEv> = BlobStore<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        BlobStore::new(self.context.map_event(f))
    }
}

impl<Ev> BlobStore<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<BlobOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn upload<F>(&self, reference: String, data: Vec<u8>, content_type: String, make_event: F)
    where
        F: FnOnce(UploadResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(BlobOperation::Upload {
                    reference,
                    data,
                    content_type,
                })
                .await;
            context.update_app(make_event(result));
        });
    }
}
