pub mod node;
pub mod pgn;
pub mod repertoire;
pub mod tags;
pub mod tree;

pub use node::*;
pub use repertoire::*;
pub use tree::*;

use engine::{Fingerprint, RulesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no position node recorded for fingerprint {0}")]
    MissingNode(Fingerprint),
    #[error("no serialization alias recorded for fingerprint {0}")]
    MissingAlias(Fingerprint),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Pgn(#[from] pgn::PgnError),
}
