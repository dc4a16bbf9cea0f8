pub mod common;
pub mod resource;

pub use common::{common_routes, RESERVED_NAMES};
pub use resource::resource_routes;
