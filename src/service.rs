use crate::gin::builder::ContextFuncBuilder;
use crate::locator::{scan_handlers, HandlerLocation, HandlerLocator, MapHandlerLocator};
use crate::types::{Field, Route, TypeFormat};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A custom call-expression recogniser. Returning a replacement route
/// short-circuits the walker's built-in vocabulary for that call.
pub type CustomFunc = Rc<dyn Fn(&str, &mut ContextFuncBuilder) -> anyhow::Result<Option<Route>>>;

/// A path predicate; routes whose paths match any predicate are dropped.
pub type PathDenyFn = Rc<dyn Fn(&str) -> bool>;

/// The router framework's per-request context type, the walker's anchor.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub package_path: String,
    pub context_type: String,
    pub context_is_pointer: bool,
    /// Receiver identifiers whose `Translate` calls are skipped.
    pub ignored_translate_receivers: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            package_path: "github.com/gin-gonic/gin".to_string(),
            context_type: "Context".to_string(),
            context_is_pointer: true,
            ignored_translate_receivers: vec![
                "i18nService".to_string(),
                "I18nService".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct License {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Document-level configuration for the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default)]
    pub license: License,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: "API".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            base_path: "/".to_string(),
            secure: false,
            contact: Contact::default(),
            license: License::default(),
        }
    }
}

/// The route collector: owns the set of routes and the set of discovered
/// component types, plus everything the pipeline needs to populate them.
pub struct Service {
    pub routes: Vec<Route>,
    pub components: Vec<Field>,
    pub config: Option<Config>,
    pub work_dir: PathBuf,
    pub custom_funcs: Vec<CustomFunc>,
    pub path_deny_list: Vec<PathDenyFn>,
    pub handler_locator: Option<Box<dyn HandlerLocator>>,
    pub router: RouterConfig,
    type_mappings: HashMap<(String, String), TypeFormat>,
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

impl Service {
    pub fn new() -> Service {
        let mut type_mappings = HashMap::new();
        // time.Time marshals as an RFC 3339 string.
        type_mappings.insert(
            ("Time".to_string(), "time".to_string()),
            TypeFormat {
                schema_type: "string".to_string(),
                format: "date-time".to_string(),
            },
        );
        Service {
            routes: Vec::new(),
            components: Vec::new(),
            config: None,
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            custom_funcs: Vec::new(),
            path_deny_list: Vec::new(),
            handler_locator: None,
            router: RouterConfig::default(),
            type_mappings,
        }
    }

    /// Sets the package-load working directory.
    pub fn with_custom_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Injects a handler locator.
    pub fn with_handler_locator(mut self, locator: impl HandlerLocator + 'static) -> Self {
        self.handler_locator = Some(Box::new(locator));
        self
    }

    /// Shorthand for a map-backed locator.
    pub fn with_handler_locations(mut self, locations: HashMap<String, HandlerLocation>) -> Self {
        self.handler_locator = Some(Box::new(MapHandlerLocator(locations)));
        self
    }

    /// Runs the handler scanner over the given paths. The default pattern is
    /// `./...`; scan failures are warnings, not fatal.
    pub fn with_handler_scan_paths(mut self, work_dir: Option<&Path>, patterns: &[&str]) -> Self {
        let dir = work_dir.map(|p| p.to_path_buf()).unwrap_or_else(|| self.work_dir.clone());
        match scan_handlers(&dir, patterns) {
            Ok(locator) => self.handler_locator = Some(Box::new(locator)),
            Err(e) => {
                warn!("failed to scan handlers, falling back to route locations: {}", e);
            }
        }
        self
    }

    pub fn with_custom_func(mut self, func: CustomFunc) -> Self {
        self.custom_funcs.push(func);
        self
    }

    pub fn with_denied_path_fn(mut self, deny: PathDenyFn) -> Self {
        self.path_deny_list.push(deny);
        self
    }

    /// Denies every route whose path starts with the given prefix.
    pub fn with_denied_path_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.with_denied_path_fn(Rc::new(move |path: &str| path.starts_with(&prefix)))
    }

    /// Overrides the schema emitted for a named type, e.g.
    /// `time.Time -> (string, date-time)`.
    pub fn with_custom_type_mapping(
        mut self,
        name: impl Into<String>,
        package: impl Into<String>,
        mapping: TypeFormat,
    ) -> Self {
        self.type_mappings
            .insert((name.into(), package.into()), mapping);
        self
    }

    pub fn get_type_mapping(&self, name: &str, package: &str) -> Option<&TypeFormat> {
        self.type_mappings
            .get(&(name.to_string(), package.to_string()))
    }

    pub fn is_path_denied(&self, path: &str) -> bool {
        self.path_deny_list.iter().any(|deny| deny(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_type_mapping_for_time() {
        let service = Service::new();
        let mapping = service.get_type_mapping("Time", "time").unwrap();
        assert_eq!(mapping.schema_type, "string");
        assert_eq!(mapping.format, "date-time");
    }

    #[test]
    fn test_custom_type_mapping_overrides() {
        let service = Service::new().with_custom_type_mapping(
            "UUID",
            "github.com/google/uuid",
            TypeFormat {
                schema_type: "string".to_string(),
                format: "uuid".to_string(),
            },
        );
        let mapping = service
            .get_type_mapping("UUID", "github.com/google/uuid")
            .unwrap();
        assert_eq!(mapping.format, "uuid");
        assert!(service.get_type_mapping("UUID", "other").is_none());
    }

    #[test]
    fn test_path_deny_prefix() {
        let service = Service::new().with_denied_path_prefix("/internal");
        assert!(service.is_path_denied("/internal/metrics"));
        assert!(!service.is_path_denied("/contacts"));
    }

    #[test]
    fn test_handler_locations_shorthand() {
        use crate::locator::HandlerLocation;
        let mut locations = HashMap::new();
        locations.insert(
            "main.GetPosts".to_string(),
            HandlerLocation {
                file: "main.go".to_string(),
                line: 3,
            },
        );
        let service = Service::new().with_handler_locations(locations);
        let located = service
            .handler_locator
            .as_ref()
            .unwrap()
            .locate("main.GetPosts");
        assert_eq!(located, Some(("main.go".to_string(), 3)));
    }
}
