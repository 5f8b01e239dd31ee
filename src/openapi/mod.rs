//! OpenAPI 3.0 emitter: document model, collision-safe component naming,
//! field-to-schema mapping, per-route assembly and file output.

pub mod components;
mod generate;
pub mod schema;
pub mod types;

pub use components::ComponentNames;
pub use generate::generate;
pub use types::{OpenApiSchema, Schema};
