//! Gin router input: route seeding and the handler walker.
//!
//! The router adapter supplies a [`RouteTable`] of registered endpoints
//! (verb, path, runtime handler name). [`create_routes`] seeds the service
//! with one route per endpoint, and [`parse_routes`] drives the handler
//! walker over each of them, extracting parameters, bodies and response
//! types from the handler sources.

pub mod builder;
mod routes;
mod walker;

pub use builder::{ContextFuncBuilder, SlotValue};
pub use routes::{create_routes, parse_routes, RegisteredRoute, RouteTable};
