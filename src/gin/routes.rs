use super::walker::HandlerWalker;
use crate::locator::lookup_route_index;
use crate::packages::{LoadMode, ModuleInfo, PackageCache};
use crate::resolver::TypeResolver;
use crate::service::Service;
use crate::types::{add_component, Field, Param, Route};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One endpoint as registered with the router: uppercase verb, path with
/// `:param` / `*rest` placeholders, and the handler's runtime function name.
/// This is the shape of Gin's own route dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredRoute {
    pub method: String,
    pub path: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// The registered route table handed over by the router adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    pub routes: Vec<RegisteredRoute>,
}

impl RouteTable {
    pub fn from_json_file(path: &Path) -> Result<RouteTable> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read route table {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("malformed route table {}", path.display()))
    }
}

/// Seeds the service with one route per registered endpoint.
///
/// Denied paths are filtered out. Each handler's source location comes from
/// the route record, overridden by the pre-built route-index file and then
/// by the configured handler locator. A handler that cannot be located
/// aborts the run.
pub fn create_routes(service: &mut Service, table: &RouteTable) -> Result<()> {
    debug!("populating service with routes");
    for registered in &table.routes {
        if service.is_path_denied(&registered.path) {
            debug!(
                "path {} {} is denied, skipping",
                registered.method, registered.path
            );
            continue;
        }

        let mut file = registered.file.clone();
        let mut line = registered.line;
        if let Some(location) = lookup_route_index(&registered.handler) {
            file = Some(location.file);
            line = Some(location.line);
        }
        if let Some(locator) = &service.handler_locator {
            if let Some((located_file, located_line)) = locator.locate(&registered.handler) {
                file = Some(located_file);
                line = Some(located_line);
            }
        }

        let file = file.ok_or_else(|| {
            anyhow!(
                "failed to locate handler {} for {} {}",
                registered.handler,
                registered.method,
                registered.path
            )
        })?;

        debug!(
            "found route handler {} at {}:{}",
            registered.handler,
            file,
            line.unwrap_or(0)
        );

        service.routes.push(Route {
            path: registered.path.clone(),
            method: registered.method.to_uppercase(),
            handler: registered.handler.clone(),
            file,
            line_no: line.unwrap_or(0),
            path_params: path_params_of(&registered.path),
            ..Default::default()
        });
    }
    Ok(())
}

/// Path placeholders become path parameters: `:id` is required, the `*rest`
/// catch-all is not.
fn path_params_of(path: &str) -> Vec<Param> {
    path.split('/')
        .filter_map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                Some((name, true))
            } else {
                segment.strip_prefix('*').map(|name| (name, false))
            }
        })
        .map(|(name, required)| Param {
            name: name.to_string(),
            field: Field::of_kind("string"),
            is_required: required,
            ..Default::default()
        })
        .collect()
}

/// Hands every seeded route to the handler walker, once.
///
/// Handler files under `vendor/` that fail to parse are demoted to warnings;
/// any other failure aborts the run. Components discovered while walking are
/// merged into the service afterwards.
pub fn parse_routes(service: &mut Service) -> Result<()> {
    debug!("populating routes from handler sources");
    let module = ModuleInfo::discover(&service.work_dir)
        .with_context(|| format!("failed to resolve module in {}", service.work_dir.display()))?;

    let mut resolver = TypeResolver::new(module.clone());
    resolver.set_collect_components(true);

    let mut routes = std::mem::take(&mut service.routes);
    let mut outcome = Ok(());
    for route in routes.iter_mut() {
        debug!("parsing route {} {}", route.method, route.path);
        if let Err(e) = parse_route(service, &mut resolver, &module, route) {
            if is_vendor_path(&route.file) {
                warn!(
                    "skipping route parse for vendor handler {} {}: {}",
                    route.method, route.path, e
                );
                continue;
            }
            outcome = Err(e.context(format!(
                "failed to parse route {} {}",
                route.method, route.path
            )));
            break;
        }
    }
    service.routes = routes;

    let components = std::mem::take(&mut service.components);
    let components = resolver
        .take_components()
        .into_iter()
        .map(Field::from_resolved)
        .fold(components, add_component);
    service.components = components;

    outcome
}

fn parse_route(
    service: &Service,
    resolver: &mut TypeResolver,
    module: &ModuleInfo,
    route: &mut Route,
) -> Result<()> {
    let file_path = {
        let path = PathBuf::from(&route.file);
        if path.is_absolute() {
            path
        } else {
            service.work_dir.join(path)
        }
    };
    let dir = file_path
        .parent()
        .ok_or_else(|| anyhow!("handler file {} has no parent directory", route.file))?;

    let pkg = PackageCache::load_dir(dir, module, LoadMode::Full)?;

    let split = crate::handler_path::split_handler_path(&route.handler);
    let found = if split.is_method() {
        pkg.find_method(split.receiver_type_name(), split.func_name())
    } else {
        pkg.find_func(split.func_name())
    };
    let found = found.or_else(|| pkg.find_func_at_line(&file_path, route.line_no));
    let (file_idx, decl) = found.ok_or_else(|| {
        anyhow!(
            "could not find declaration of handler {} in {}",
            route.handler,
            dir.display()
        )
    })?;
    let decl = decl.clone();

    let mut walker = HandlerWalker::new(
        resolver,
        module.clone(),
        service.router.clone(),
        service.custom_funcs.clone(),
    );
    walker.walk(route, &pkg, file_idx, &decl, 0)
}

fn is_vendor_path(file: &str) -> bool {
    let normalized = file.replace('\\', "/");
    normalized.starts_with("vendor/") || normalized.contains("/vendor/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_params_of() {
        let params = path_params_of("/contacts/:id/files/*rest");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "id");
        assert!(params[0].is_required);
        assert_eq!(params[1].name, "rest");
        assert!(!params[1].is_required);
    }

    #[test]
    fn test_vendor_path_detection() {
        assert!(is_vendor_path("vendor/github.com/x/y/handler.go"));
        assert!(is_vendor_path("sub/vendor/z/handler.go"));
        assert!(!is_vendor_path("handlers/contact.go"));
    }

    #[test]
    fn test_route_table_deserialises_gin_dump() {
        let json = r#"[
            {"method": "GET", "path": "/contacts/:id", "handler": "main.GetContact"},
            {"method": "POST", "path": "/contacts", "handler": "main.CreateContact", "file": "main.go", "line": 10}
        ]"#;
        let table: RouteTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.routes.len(), 2);
        assert_eq!(table.routes[0].handler, "main.GetContact");
        assert_eq!(table.routes[1].file.as_deref(), Some("main.go"));
    }
}
