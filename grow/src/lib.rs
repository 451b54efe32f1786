pub mod advisors;
pub mod annotate;
pub mod expand;
pub mod options;
pub mod selection;

pub use advisors::*;
pub use annotate::*;
pub use expand::*;
pub use options::*;
pub use selection::*;
