pub mod rules;
pub mod score;
pub mod shape;

pub use rules::*;
pub use score::*;
pub use shape::*;

pub use shakmaty::Color;
