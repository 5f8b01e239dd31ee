use crate::error::{Error, PackageErrorKind, Result};
use crate::goparse::{self, Decl, FuncDecl, GoFile, TypeDecl, ValueDecl};
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// How much of a package to load.
///
/// `Full` keeps function bodies so the handler walker can traverse them;
/// `Light` drops bodies and keeps only the declaration surface (types,
/// constants, signatures). Callers that need AST traversal must request
/// `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadMode {
    Full,
    Light,
}

/// The module the analysed project belongs to, discovered from `go.mod`.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub module_path: String,
    pub root: PathBuf,
}

impl ModuleInfo {
    /// Walks up from `work_dir` to the nearest `go.mod` and reads the module
    /// path from it.
    pub fn discover(work_dir: &Path) -> Result<ModuleInfo> {
        let mut dir = work_dir.to_path_buf();
        loop {
            let candidate = dir.join("go.mod");
            if candidate.is_file() {
                let content = fs::read_to_string(&candidate)?;
                for line in content.lines() {
                    let line = line.trim();
                    if let Some(rest) = line.strip_prefix("module ") {
                        return Ok(ModuleInfo {
                            module_path: rest.trim().trim_matches('"').to_string(),
                            root: dir,
                        });
                    }
                }
                return Err(Error::PackageLoad {
                    kind: PackageErrorKind::List,
                    package: work_dir.display().to_string(),
                    message: "go.mod has no module directive".to_string(),
                });
            }
            if !dir.pop() {
                return Err(Error::PackageLoad {
                    kind: PackageErrorKind::List,
                    package: work_dir.display().to_string(),
                    message: "no go.mod found".to_string(),
                });
            }
        }
    }

    /// Whether an import path belongs to the analysed module.
    pub fn is_local(&self, import_path: &str) -> bool {
        import_path == self.module_path
            || import_path
                .strip_prefix(&self.module_path)
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
    }

    /// Maps a local import path to its source directory.
    pub fn dir_for(&self, import_path: &str) -> Option<PathBuf> {
        if import_path == self.module_path {
            return Some(self.root.clone());
        }
        let rest = import_path.strip_prefix(&self.module_path)?;
        let rest = rest.strip_prefix('/')?;
        Some(self.root.join(rest))
    }

    /// Maps a source directory back to its import path.
    pub fn import_path_for(&self, dir: &Path) -> Option<String> {
        let rel = dir.strip_prefix(&self.root).ok()?;
        if rel.as_os_str().is_empty() {
            return Some(self.module_path.clone());
        }
        let mut path = self.module_path.clone();
        for part in rel.components() {
            path.push('/');
            path.push_str(&part.as_os_str().to_string_lossy());
        }
        Some(path)
    }
}

/// A loaded Go package: its parsed files plus name-based indexes over
/// declarations.
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub import_path: String,
    pub dir: PathBuf,
    pub mode: LoadMode,
    pub files: Vec<GoFile>,
    types: HashMap<String, (usize, usize)>,
    funcs: HashMap<String, (usize, usize)>,
}

impl Package {
    fn new(
        name: String,
        import_path: String,
        dir: PathBuf,
        mode: LoadMode,
        files: Vec<GoFile>,
    ) -> Package {
        let mut types = HashMap::new();
        let mut funcs = HashMap::new();
        for (file_idx, file) in files.iter().enumerate() {
            for (decl_idx, decl) in file.decls.iter().enumerate() {
                match decl {
                    Decl::Type(type_decl) => {
                        types.insert(type_decl.name.clone(), (file_idx, decl_idx));
                    }
                    Decl::Func(func_decl) => {
                        funcs.insert(func_key(func_decl), (file_idx, decl_idx));
                    }
                    _ => {}
                }
            }
        }
        Package {
            name,
            import_path,
            dir,
            mode,
            files,
            types,
            funcs,
        }
    }

    pub fn find_type(&self, name: &str) -> Option<(usize, &TypeDecl)> {
        let (file_idx, decl_idx) = *self.types.get(name)?;
        match &self.files[file_idx].decls[decl_idx] {
            Decl::Type(decl) => Some((file_idx, decl)),
            _ => None,
        }
    }

    /// Finds a function by its index key: a bare name, or
    /// `(Recv).Name` / `(*Recv).Name` for methods.
    pub fn find_func(&self, key: &str) -> Option<(usize, &FuncDecl)> {
        let (file_idx, decl_idx) = *self.funcs.get(key)?;
        match &self.files[file_idx].decls[decl_idx] {
            Decl::Func(decl) => Some((file_idx, decl)),
            _ => None,
        }
    }

    /// Finds a method on a receiver type, trying pointer and value forms.
    pub fn find_method(&self, receiver: &str, name: &str) -> Option<(usize, &FuncDecl)> {
        let receiver = receiver.trim_start_matches('*');
        self.find_func(&format!("(*{}).{}", receiver, name))
            .or_else(|| self.find_func(&format!("({}).{}", receiver, name)))
    }

    /// Finds the function declaration spanning the given file and line.
    pub fn find_func_at_line(&self, file: &Path, line: usize) -> Option<(usize, &FuncDecl)> {
        for (file_idx, go_file) in self.files.iter().enumerate() {
            if !same_file(&go_file.path, file) {
                continue;
            }
            for decl in &go_file.decls {
                if let Decl::Func(func_decl) = decl {
                    if func_decl.line <= line && line <= func_decl.end_line {
                        return Some((file_idx, func_decl));
                    }
                }
            }
        }
        None
    }

    /// All package-level const declarations, in source order.
    pub fn const_decls(&self) -> impl Iterator<Item = &ValueDecl> {
        self.files.iter().flat_map(|file| {
            file.decls.iter().filter_map(|decl| match decl {
                Decl::Const(value_decl) => Some(value_decl),
                _ => None,
            })
        })
    }

    /// All package-level var declarations, in source order.
    pub fn var_decls(&self) -> impl Iterator<Item = &ValueDecl> {
        self.files.iter().flat_map(|file| {
            file.decls.iter().filter_map(|decl| match decl {
                Decl::Var(value_decl) => Some(value_decl),
                _ => None,
            })
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.file_name(), b.file_name()) {
        (Some(fa), Some(fb)) if fa == fb => {
            // Tolerate one side being relative to the work dir.
            a.ends_with(b) || b.ends_with(a)
        }
        _ => false,
    }
}

fn func_key(decl: &FuncDecl) -> String {
    match &decl.receiver {
        Some(recv) if recv.is_pointer => format!("(*{}).{}", recv.type_name, decl.name),
        Some(recv) => format!("({}).{}", recv.type_name, decl.name),
        None => decl.name.clone(),
    }
}

type CacheKey = (PathBuf, String, LoadMode);

static PACKAGE_CACHE: Lazy<Mutex<HashMap<CacheKey, Arc<Package>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-global, mutex-guarded package cache.
///
/// Loads are serialised by the mutex but not deduplicated: two concurrent
/// callers requesting the same key may both load, and the last writer wins
/// (the results are structurally equivalent). Keys include the module root
/// so parallel runs over different working directories do not collide.
pub struct PackageCache;

impl PackageCache {
    pub fn load(import_path: &str, module: &ModuleInfo, mode: LoadMode) -> Result<Arc<Package>> {
        let key = (module.root.clone(), import_path.to_string(), mode);
        {
            let cache = PACKAGE_CACHE.lock().expect("package cache poisoned");
            if let Some(pkg) = cache.get(&key) {
                return Ok(Arc::clone(pkg));
            }
        }

        let pkg = Self::load_no_cache(import_path, module, mode)?;

        let mut cache = PACKAGE_CACHE.lock().expect("package cache poisoned");
        cache.insert(key, Arc::clone(&pkg));
        Ok(pkg)
    }

    /// Loads a package without consulting or populating the cache.
    pub fn load_no_cache(
        import_path: &str,
        module: &ModuleInfo,
        mode: LoadMode,
    ) -> Result<Arc<Package>> {
        let dir = module.dir_for(import_path).ok_or_else(|| Error::PackageLoad {
            kind: PackageErrorKind::List,
            package: import_path.to_string(),
            message: format!("not within module {}", module.module_path),
        })?;
        Self::load_uncached_dir(&dir, import_path, mode)
    }

    /// Loads the package rooted at a source directory, resolving its import
    /// path through the module.
    pub fn load_dir(dir: &Path, module: &ModuleInfo, mode: LoadMode) -> Result<Arc<Package>> {
        let import_path = module
            .import_path_for(dir)
            .unwrap_or_else(|| dir.display().to_string());
        Self::load(&import_path, module, mode)
    }

    fn load_uncached_dir(dir: &Path, import_path: &str, mode: LoadMode) -> Result<Arc<Package>> {
        debug!("Loading package {} from {}", import_path, dir.display());
        let entries = fs::read_dir(dir).map_err(|e| Error::PackageLoad {
            kind: PackageErrorKind::List,
            package: import_path.to_string(),
            message: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|s| s.to_str()) == Some("go")
                    && !path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .map(|name| name.ends_with("_test.go"))
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(Error::PackageNotFound(import_path.to_string()));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let mut file = goparse::parse_file(path).map_err(|e| Error::PackageLoad {
                kind: PackageErrorKind::Parse,
                package: import_path.to_string(),
                message: e.to_string(),
            })?;
            if mode == LoadMode::Light {
                for decl in &mut file.decls {
                    if let Decl::Func(func_decl) = decl {
                        func_decl.body = None;
                    }
                }
            }
            files.push(file);
        }

        let name = files
            .iter()
            .map(|f| f.package_name.clone())
            .find(|n| !n.ends_with("_test"))
            .unwrap_or_else(|| files[0].package_name.clone());
        if files.iter().any(|f| f.package_name != name) {
            warn!(
                "package {} has files with mismatched package clauses",
                import_path
            );
        }

        Ok(Arc::new(Package::new(
            name,
            import_path.to_string(),
            dir.to_path_buf(),
            mode,
            files,
        )))
    }
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

    fn demo_module(dir: &Path) -> ModuleInfo {
        write_file(dir, "go.mod", "module example.com/demo\n\ngo 1.21\n");
        ModuleInfo::discover(dir).unwrap()
    }

    #[test]
    fn test_discover_module() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        assert_eq!(module.module_path, "example.com/demo");
        assert_eq!(module.root, temp.path());
    }

    #[test]
    fn test_import_path_mapping() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        assert_eq!(
            module.dir_for("example.com/demo/models"),
            Some(temp.path().join("models"))
        );
        assert_eq!(
            module.import_path_for(&temp.path().join("models")),
            Some("example.com/demo/models".to_string())
        );
        assert!(module.is_local("example.com/demo/models"));
        assert!(!module.is_local("example.com/demonstration"));
        assert!(!module.is_local("net/http"));
    }

    #[test]
    fn test_load_package_and_indexes() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        write_file(
            temp.path(),
            "models/user.go",
            "package models\n\ntype User struct {\n\tID int `json:\"id\"`\n}\n\nfunc NewUser() User { return User{} }\n\nfunc (u *User) Reset() {}\n",
        );

        let pkg = PackageCache::load("example.com/demo/models", &module, LoadMode::Full).unwrap();
        assert_eq!(pkg.name, "models");
        assert!(pkg.find_type("User").is_some());
        assert!(pkg.find_func("NewUser").is_some());
        assert!(pkg.find_method("User", "Reset").is_some());
        assert!(pkg.find_method("*User", "Reset").is_some());
    }

    #[test]
    fn test_load_memoises() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        write_file(temp.path(), "a/a.go", "package a\n\ntype A struct{}\n");

        let first = PackageCache::load("example.com/demo/a", &module, LoadMode::Full).unwrap();
        let second = PackageCache::load("example.com/demo/a", &module, LoadMode::Full).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_light_mode_drops_bodies() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        write_file(
            temp.path(),
            "b/b.go",
            "package b\n\nfunc Work() int {\n\treturn 42\n}\n",
        );

        let pkg = PackageCache::load("example.com/demo/b", &module, LoadMode::Light).unwrap();
        let (_, decl) = pkg.find_func("Work").unwrap();
        assert!(decl.body.is_none());

        let full = PackageCache::load("example.com/demo/b", &module, LoadMode::Full).unwrap();
        let (_, decl) = full.find_func("Work").unwrap();
        assert!(decl.body.is_some());
    }

    #[test]
    fn test_missing_package_not_found() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        fs::create_dir_all(temp.path().join("empty")).unwrap();
        let err =
            PackageCache::load("example.com/demo/empty", &module, LoadMode::Full).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }

    #[test]
    fn test_parse_error_reported_as_package_load() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        write_file(temp.path(), "bad/bad.go", "package bad\n\nfunc broken( {\n");
        let err = PackageCache::load("example.com/demo/bad", &module, LoadMode::Full).unwrap_err();
        match err {
            Error::PackageLoad { kind, .. } => assert_eq!(kind, PackageErrorKind::Parse),
            other => panic!("expected package load error, got {:?}", other),
        }
    }

    #[test]
    fn test_find_func_at_line() {
        let temp = TempDir::new().unwrap();
        let module = demo_module(temp.path());
        write_file(
            temp.path(),
            "c/c.go",
            "package c\n\nfunc First() {\n}\n\nfunc Second() {\n\t_ = 1\n}\n",
        );
        let pkg = PackageCache::load("example.com/demo/c", &module, LoadMode::Full).unwrap();
        let (_, decl) = pkg
            .find_func_at_line(&temp.path().join("c/c.go"), 7)
            .unwrap();
        assert_eq!(decl.name, "Second");
    }
}
