use crate::goparse::Decl;
use crate::packages::{LoadMode, ModuleInfo, PackageCache};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Locates a handler function's source position from its runtime name.
///
/// Input modules use this to find the file and line of the function bound to
/// a route when the route table does not carry them.
pub trait HandlerLocator {
    /// Returns the file path and line number for a handler by its runtime
    /// name (the `runtime.FuncForPC` convention), or `None` when unknown.
    fn locate(&self, handler_name: &str) -> Option<(String, usize)>;
}

/// A handler's source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerLocation {
    pub file: String,
    pub line: usize,
}

/// A map-backed [`HandlerLocator`]. Keys match the runtime's function-name
/// convention (`main.GetUser`, `main.(*Controller).GetUser`).
#[derive(Debug, Clone, Default)]
pub struct MapHandlerLocator(pub HashMap<String, HandlerLocation>);

impl From<HashMap<String, HandlerLocation>> for MapHandlerLocator {
    fn from(map: HashMap<String, HandlerLocation>) -> Self {
        MapHandlerLocator(map)
    }
}

impl HandlerLocator for MapHandlerLocator {
    fn locate(&self, handler_name: &str) -> Option<(String, usize)> {
        if let Some(location) = self.0.get(handler_name) {
            return Some((location.file.clone(), location.line));
        }
        // Bound methods carry a trailing -fm marker at runtime.
        let normalized = handler_name.trim_end_matches("-fm");
        if normalized != handler_name {
            if let Some(location) = self.0.get(normalized) {
                return Some((location.file.clone(), location.line));
            }
        }
        None
    }
}

/// Scans Go packages under `work_dir` and indexes every function declaration
/// by its runtime name.
///
/// Patterns follow the Go tooling convention: `./...` scans recursively,
/// `./handlers` a single directory. With no patterns, `./...` is used.
/// Main packages are keyed with the literal `main` regardless of import
/// path, matching the runtime's naming.
pub fn scan_handlers(work_dir: &Path, patterns: &[&str]) -> anyhow::Result<MapHandlerLocator> {
    let module = ModuleInfo::discover(work_dir)?;
    let patterns: Vec<&str> = if patterns.is_empty() {
        vec!["./..."]
    } else {
        patterns.to_vec()
    };

    let mut dirs: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        let (base, recursive) = match pattern.strip_suffix("/...") {
            Some(base) => (base, true),
            None => (pattern, false),
        };
        let base = base.trim_start_matches("./");
        let root = if base.is_empty() || base == "." {
            work_dir.to_path_buf()
        } else {
            work_dir.join(base)
        };
        if recursive {
            for entry in WalkDir::new(&root).into_iter().filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(name.starts_with('.') && e.path() != root)
                    && name != "vendor"
                    && name != "testdata"
            }) {
                match entry {
                    Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => warn!("failed to access path while scanning handlers: {}", e),
                }
            }
        } else {
            dirs.push(root);
        }
    }

    let mut index = HashMap::new();
    for dir in dirs {
        let has_go = fs::read_dir(&dir)
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    e.path().extension().and_then(|s| s.to_str()) == Some("go")
                        && e.path().is_file()
                })
            })
            .unwrap_or(false);
        if !has_go {
            continue;
        }

        let pkg = match PackageCache::load_dir(&dir, &module, LoadMode::Light) {
            Ok(pkg) => pkg,
            Err(e) => {
                warn!("skipping {} while scanning handlers: {}", dir.display(), e);
                continue;
            }
        };

        // The runtime names main-package functions with the literal "main".
        let pkg_path = if pkg.name == "main" {
            "main".to_string()
        } else {
            pkg.import_path.clone()
        };

        for file in &pkg.files {
            for decl in &file.decls {
                let func_decl = match decl {
                    Decl::Func(func_decl) => func_decl,
                    _ => continue,
                };
                let key = match &func_decl.receiver {
                    Some(recv) if recv.is_pointer => {
                        format!("{}.(*{}).{}", pkg_path, recv.type_name, func_decl.name)
                    }
                    Some(recv) => {
                        format!("{}.({}).{}", pkg_path, recv.type_name, func_decl.name)
                    }
                    None => format!("{}.{}", pkg_path, func_decl.name),
                };
                index.insert(
                    key,
                    HandlerLocation {
                        file: file.path.display().to_string(),
                        line: func_decl.line,
                    },
                );
            }
        }
    }

    debug!("handler scan indexed {} functions", index.len());
    Ok(MapHandlerLocator(index))
}

/// Environment variable overriding the route-index file location.
pub const ROUTE_INDEX_PATH_ENV: &str = "ASTRA_ROUTE_INDEX_PATH";
const DEFAULT_ROUTE_INDEX_PATH: &str = "resources/astra_route_index.json";

static ROUTE_INDEX: Lazy<Option<HashMap<String, HandlerLocation>>> = Lazy::new(|| {
    let path = env::var(ROUTE_INDEX_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_ROUTE_INDEX_PATH.to_string());
    read_route_index(Path::new(&path))
});

pub(crate) fn read_route_index(path: &Path) -> Option<HashMap<String, HandlerLocation>> {
    let data = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(index) => Some(index),
        Err(e) => {
            warn!("malformed route index {}: {}", path.display(), e);
            None
        }
    }
}

/// Looks a handler up in the pre-built route-index file, if one is present.
/// The `-fm` bound-method marker is stripped before the raw name is tried.
pub fn lookup_route_index(handler_name: &str) -> Option<HandlerLocation> {
    let index = ROUTE_INDEX.as_ref()?;
    let normalized = handler_name.trim().trim_end_matches("-fm");
    index
        .get(normalized)
        .or_else(|| index.get(handler_name))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_map_locator_exact_and_fm() {
        let mut map = HashMap::new();
        map.insert(
            "main.(*APIServer).GetContacts".to_string(),
            HandlerLocation {
                file: "server.go".to_string(),
                line: 12,
            },
        );
        let locator = MapHandlerLocator(map);

        let direct = locator.locate("main.(*APIServer).GetContacts");
        let bound = locator.locate("main.(*APIServer).GetContacts-fm");
        assert_eq!(direct, Some(("server.go".to_string(), 12)));
        assert_eq!(bound, direct);
        assert_eq!(locator.locate("main.Unknown"), None);
    }

    #[test]
    fn test_scan_handlers_indexes_functions_and_methods() {
        let temp = TempDir::new().unwrap();
        write_file(
            temp.path(),
            "go.mod",
            "module example.com/scan\n\ngo 1.21\n",
        );
        write_file(
            temp.path(),
            "main.go",
            "package main\n\nfunc main() {}\n\nfunc GetPosts() {}\n",
        );
        write_file(
            temp.path(),
            "server.go",
            "package main\n\ntype APIServer struct{}\n\nfunc (s *APIServer) GetContacts() {}\n",
        );
        write_file(
            temp.path(),
            "handlers/users.go",
            "package handlers\n\nfunc ListUsers() {}\n",
        );

        let locator = scan_handlers(temp.path(), &[]).unwrap();

        assert!(locator.locate("main.GetPosts").is_some());
        assert!(locator.locate("main.(*APIServer).GetContacts").is_some());
        assert!(locator
            .locate("main.(*APIServer).GetContacts-fm")
            .is_some());
        assert!(locator
            .locate("example.com/scan/handlers.ListUsers")
            .is_some());

        let (file, line) = locator.locate("main.(*APIServer).GetContacts").unwrap();
        assert!(file.ends_with("server.go"));
        assert_eq!(line, 5);
    }

    #[test]
    fn test_scan_handlers_skips_vendor() {
        let temp = TempDir::new().unwrap();
        write_file(
            temp.path(),
            "go.mod",
            "module example.com/scan2\n\ngo 1.21\n",
        );
        write_file(temp.path(), "main.go", "package main\n\nfunc main() {}\n");
        write_file(
            temp.path(),
            "vendor/dep/dep.go",
            "package dep\n\nfunc Hidden() {}\n",
        );

        let locator = scan_handlers(temp.path(), &[]).unwrap();
        assert!(locator.locate("example.com/scan2/vendor/dep.Hidden").is_none());
        assert!(locator.locate("dep.Hidden").is_none());
    }

    #[test]
    fn test_read_route_index() {
        let temp = TempDir::new().unwrap();
        write_file(
            temp.path(),
            "index.json",
            "{\"main.GetPosts\": {\"file\": \"main.go\", \"line\": 10}}",
        );
        let index = read_route_index(&temp.path().join("index.json")).unwrap();
        assert_eq!(index["main.GetPosts"].line, 10);
        assert!(read_route_index(&temp.path().join("missing.json")).is_none());
    }
}
