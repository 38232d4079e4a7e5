pub mod normalize;
pub mod providers;
pub mod registry;

pub use normalize::{normalize_identity_file, normalize_origin};
pub use providers::resolve_provider_path;
pub use registry::{validate, SchemaError};
