//! openapi-from-gin - OpenAPI 3.0 documentation from Go Gin projects.
//!
//! This library generates OpenAPI 3.0 documents by statically analysing the
//! source of a Go web service built on the Gin router. The target program is
//! never executed: handler source code and package type declarations are
//! interpreted directly.
//!
//! # Architecture
//!
//! The library is organised as a pipeline over several modules:
//!
//! 1. [`goparse`] - Parses Go source files into ASTs
//! 2. [`packages`] - Loads and caches Go packages with their declaration indexes
//! 3. [`resolver`] - Resolves Go type expressions into structured descriptions
//! 4. [`gin`] - Seeds routes from the router's route table and walks handlers
//! 5. [`locator`] - Maps runtime handler names to source positions
//! 6. [`openapi`] - Builds the OpenAPI document tree and writes it out as
//!    YAML or JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_from_gin::gin::{self, RouteTable};
//! use openapi_from_gin::openapi;
//! use openapi_from_gin::service::{Config, Service};
//! use std::path::Path;
//!
//! let table = RouteTable::from_json_file(Path::new("routes.json")).unwrap();
//!
//! let mut service = Service::new()
//!     .with_custom_work_dir("./my-gin-project")
//!     .with_config(Config::default())
//!     .with_handler_scan_paths(None, &["./..."]);
//!
//! gin::create_routes(&mut service, &table).unwrap();
//! gin::parse_routes(&mut service).unwrap();
//! openapi::generate(&service, "openapi.json").unwrap();
//! ```

pub mod error;
pub mod gin;
pub mod goparse;
pub mod handler_path;
pub mod locator;
pub mod openapi;
pub mod packages;
pub mod resolver;
pub mod service;
pub mod tags;
pub mod types;

pub use error::{Error, Result};
pub use service::{Config, Service};
