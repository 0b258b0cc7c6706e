use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One-shot, permission-gated position fix from the OS locator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationOperation {
    RequestPermission,
    GetPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LocationOutput {
    PermissionStatus {
        granted: bool,
    },
    Position {
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f64>,
    },
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("position unavailable: {message}")]
    Unavailable { message: String },

    #[error("locator failed: {message}")]
    Failed { message: String },
}

pub type LocationResult = Result<LocationOutput, LocationError>;

impl Operation for LocationOperation {
    type Output = LocationResult;
}

#[derive(Clone)]
pub struct Location<Ev> {
    context: CapabilityContext<LocationOperation, Ev>,
}

impl<Ev> Capability<Ev> for Location<Ev> {
    type Operation = LocationOperation;
    type MappedSelf<MappedEv> = Location<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Location::new(self.context.map_event(f))
    }
}

impl<Ev> Location<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<LocationOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn request_permission<F>(&self, make_event: F)
    where
        F: FnOnce(LocationResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(LocationOperation::RequestPermission)
                .await;
            context.update_app(make_event(result));
        });
    }

    pub fn get_position<F>(&self, make_event: F)
    where
        F: FnOnce(LocationResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(LocationOperation::GetPosition)
                .await;
            context.update_app(make_event(result));
        });
    }
}
