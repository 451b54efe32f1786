//! Read-only transforms over a built repertoire graph: pruning to a single
//! player line, splitting into size-bounded documents, and exporting lines
//! as flashcard rows.

pub mod export;
pub mod prune;
pub mod split;

pub use export::*;
pub use prune::*;
pub use split::*;

use engine::{Fingerprint, RulesError};
use thiserror::Error;

/// Transforms are pure; they fail only on structurally inconsistent input,
/// which indicates a bug upstream.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("tree references fingerprint {0} with no graph node")]
    MissingNode(Fingerprint),
    #[error(transparent)]
    Rules(#[from] RulesError),
}
