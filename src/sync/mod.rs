pub mod controller;
pub mod push;

use thiserror::Error;

use crate::gateway::GatewayError;

pub use controller::SyncController;
pub use push::{PushOutcome, PushReconciler};

/// Why an operation did not take effect. By the time a caller sees one of these
/// the store has already been rolled back or degraded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No active conversation")]
    NoActiveConversation,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
