//! Engine-level error taxonomy.
//!
//! Sessions return an error from start/resume only for authoring problems
//! (bad assets) and invariant violations (loop caps, corrupt state).
//! Everything recoverable is an `error` event in the log instead.

use thiserror::Error;
use uuid::Uuid;

use crate::assets::AssetError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("session has already been started")]
    AlreadyStarted,
    #[error("session has ended and can no longer be driven")]
    Ended,
    #[error("session is not waiting for input")]
    NotWaiting,
    #[error("resume rejected: {0}")]
    InvalidResume(String),
    #[error("loop detected at node {node_uuid}")]
    LoopDetected { node_uuid: Uuid },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("unable to read session: {0}")]
    InvalidSession(String),
}
