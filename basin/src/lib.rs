pub mod admin;
pub mod auth_routes;
pub mod context;
pub mod descriptor;
pub mod querystring;
pub mod resource;
pub mod router;
pub mod state;

pub use descriptor::{CollectionDescriptor, DescriptorStore, PropertyDescriptor, PropertyType};
pub use router::build_router;
pub use state::AppState;
