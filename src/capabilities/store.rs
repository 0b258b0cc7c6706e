use crux_core::capability::{Capability, CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::SubscriptionId;
use crate::model::MessageRecord;

pub const MESSAGES_COLLECTION: &str = "messages";

/// Standing query shape. The store orders; the core re-sorts defensively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageQuery {
    pub collection: String,
    pub order_by: OrderBy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderBy {
    CreatedAtDescending,
}

impl MessageQuery {
    /// The one query this app runs: the whole room, newest first.
    pub fn newest_first() -> Self {
        Self {
            collection: MESSAGES_COLLECTION.to_string(),
            order_by: OrderBy::CreatedAtDescending,
        }
    }
}

/// Bridge to the managed document store. `Subscribe` is a standing request:
/// the shell keeps resolving it with the full current result set until the
/// matching `Unsubscribe` arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StoreOperation {
    Subscribe {
        subscription: SubscriptionId,
        query: MessageQuery,
    },
    Unsubscribe {
        subscription: SubscriptionId,
    },
    Insert {
        collection: String,
        record: MessageRecord,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StoreOutput {
    /// One push: the entire current result set, not a delta.
    Snapshot {
        subscription: SubscriptionId,
        messages: Vec<MessageRecord>,
    },
    Inserted {
        id: String,
    },
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoreError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("write rejected: {message}")]
    Rejected { message: String },

    #[error("store error: {message}")]
    Internal { message: String },
}

pub type StoreResult = Result<StoreOutput, StoreError>;

impl Operation for StoreOperation {
    type Output = StoreResult;
}

#[derive(Clone)]
pub struct MessageStore<Ev> {
    context: CapabilityContext<StoreOperation, Ev>,
}

impl<Ev> Capability<Ev> for MessageStore<Ev> {
    type Operation = StoreOperation;
    type MappedSelf<MappedEv> = MessageStore<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        MessageStore::new(self.context.map_event(f))
    }
}

impl<Ev> MessageStore<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<StoreOperation, Ev>) -> Self {
        Self { context }
    }

    /// Opens a live subscription. Every value on the stream is the full
    /// current result set; the stream ends when the shell tears the
    /// listener down after `unsubscribe`.
    pub fn subscribe<F>(&self, subscription: SubscriptionId, query: MessageQuery, make_event: F)
    where
        F: Fn(StoreResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let mut stream = context.stream_from_shell(StoreOperation::Subscribe {
                subscription,
                query,
            });

            while let Some(result) = stream.next().await {
                context.update_app(make_event(result));
            }
        });
    }

    /// Releases the shell-side listener. Fire-and-forget: the core also
    /// guards against late pushes by token, so a race here is harmless.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(StoreOperation::Unsubscribe { subscription })
                .await;
        });
    }

    pub fn insert<F>(&self, record: MessageRecord, make_event: F)
    where
        F: FnOnce(StoreResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(StoreOperation::Insert {
                    collection: MESSAGES_COLLECTION.to_string(),
                    record,
                })
                .await;
            context.update_app(make_event(result));
        });
    }
}
