use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bridge to the managed identity provider. The shell owns the SDK handle;
/// the core only ever asks for an anonymous session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthOperation {
    SignInAnonymously,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    /// Backend-assigned identifier, stable for the app install.
    pub user_id: String,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("sign-in failed: {message}")]
    Failed { message: String },
}

pub type AuthResult = Result<AuthUser, AuthError>;

impl Operation for AuthOperation {
    type Output = AuthResult;
}

#[derive(Clone)]
pub struct Auth<Ev> {
    context: CapabilityContext<AuthOperation, Ev>,
}

impl<Ev> Capability<Ev> for Auth<Ev> {
    type Operation = AuthOperation;
    type MappedSelf<MappedEv> = Auth<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Auth::new(self.context.map_event(f))
    }
}

impl<Ev> Auth<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<AuthOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn sign_in_anonymously<F>(&self, make_event: F)
    where
        F: FnOnce(AuthResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(AuthOperation::SignInAnonymously)
                .await;
            context.update_app(make_event(result));
        });
    }
}
