pub mod cache;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod retry;

pub use cache::*;
pub use coordinator::*;
pub use error::*;
pub use limiter::*;
pub use retry::*;
