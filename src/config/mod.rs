pub mod types;
pub mod loader;
pub mod merger;
pub mod resolved;

pub use types::*;
pub use loader::*;
pub use merger::*;
pub use resolved::*;
