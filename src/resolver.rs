use crate::error::{Error, Result};
use crate::goparse::{Expr, Lit, TypeDecl, TypeExpr};
use crate::packages::{LoadMode, ModuleInfo, Package, PackageCache};
use crate::tags::{parse_struct_tag, BindingTagMap, ValidationTagMap};
use indexmap::IndexMap;
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Depth cap for a single resolution; past it everything degrades to
/// reference-shaped results.
pub const DEFAULT_TYPE_TRACE_LIMIT: usize = 50;

/// The resolver's canonical description of a Go type.
///
/// `kind` is one of the structural sentinels (`slice`, `array`, `map`,
/// `struct`, `any`, `nil`), a basic type name, or a named type's name — in
/// which case the record is a reference and `(package, kind)` identifies a
/// component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedType {
    pub kind: String,
    pub name: String,
    pub package: String,
    pub slice_type: String,
    pub array_type: String,
    pub array_length: i64,
    pub map_key_type: String,
    pub map_key_package: String,
    pub map_value_type: String,
    pub map_value_package: String,
    pub map_value_slice_type: String,
    pub map_value_array_type: String,
    pub map_value_array_length: i64,
    pub struct_fields: IndexMap<String, ResolvedType>,
    pub is_embedded: bool,
    pub enum_values: Vec<Value>,
    pub enum_names: Vec<String>,
    pub doc: String,
    pub binding_tags: BindingTagMap,
    pub validation_tags: ValidationTagMap,
}

const BASIC_TYPES: &[&str] = &[
    "bool", "string", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr", "byte", "rune", "float32", "float64", "complex64", "complex128",
];

fn is_basic(name: &str) -> bool {
    BASIC_TYPES.contains(&name)
}

/// Resolves Go type expressions into [`ResolvedType`] records.
///
/// One resolver spans a traversal session: its memoisation cache and the
/// component set it collects live as long as the resolver does. Recursion is
/// bounded by an invocation-scoped trace stack plus a depth cap; on re-entry
/// the resolver returns reference-shaped results instead of descending.
pub struct TypeResolver {
    module: ModuleInfo,
    trace: Vec<String>,
    trace_limit: usize,
    recursion_logged: HashSet<String>,
    cache: HashMap<String, ResolvedType>,
    collect_components: bool,
    components: Vec<ResolvedType>,
}

impl TypeResolver {
    pub fn new(module: ModuleInfo) -> Self {
        Self {
            module,
            trace: Vec::new(),
            trace_limit: DEFAULT_TYPE_TRACE_LIMIT,
            recursion_logged: HashSet::new(),
            cache: HashMap::new(),
            collect_components: false,
            components: Vec::new(),
        }
    }

    pub fn with_trace_limit(mut self, limit: usize) -> Self {
        self.trace_limit = limit;
        self
    }

    /// Enables or disables the component sink. While enabled, every named
    /// type resolved through the resolver is recorded as a component.
    pub fn set_collect_components(&mut self, collect: bool) {
        self.collect_components = collect;
    }

    pub fn take_components(&mut self) -> Vec<ResolvedType> {
        std::mem::take(&mut self.components)
    }

    /// Resolves a type expression in the context of the file it was written
    /// in (the file supplies the import table for qualified names).
    ///
    /// Panics during resolution are logged with the node, package and trace
    /// stack, then rethrown.
    pub fn resolve(
        &mut self,
        ty: &TypeExpr,
        pkg: &Arc<Package>,
        file_idx: usize,
    ) -> Result<ResolvedType> {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.resolve_node(ty, pkg, file_idx, None)));
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                error!(
                    "panic while resolving type: node={}, package={}, trace={:?}",
                    ty, pkg.import_path, self.trace
                );
                panic::resume_unwind(payload)
            }
        }
    }

    fn resolve_node(
        &mut self,
        ty: &TypeExpr,
        pkg: &Arc<Package>,
        file_idx: usize,
        name: Option<&str>,
    ) -> Result<ResolvedType> {
        let cache_key = self.cache_key(ty, pkg, file_idx, name);
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                return Ok(cached.clone());
            }
        }

        let label = self.trace_label(ty, pkg, file_idx);
        if !label.is_empty() && self.trace.iter().any(|existing| *existing == label) {
            self.log_recursion(&label);
            let result = self.recursion_result(ty, pkg, file_idx);
            if let Some(key) = &cache_key {
                self.cache.insert(key.clone(), result.clone());
            }
            return Ok(result);
        }
        if self.trace_limit > 0 && self.trace.len() >= self.trace_limit {
            error!(
                "type recursion depth exceeded limit {}: trace={:?}",
                self.trace_limit,
                &self.trace[self.trace.len().saturating_sub(8)..]
            );
            let result = self.recursion_result(ty, pkg, file_idx);
            if let Some(key) = &cache_key {
                self.cache.insert(key.clone(), result.clone());
            }
            return Ok(result);
        }

        self.trace.push(label);
        let result = self.dispatch(ty, pkg, file_idx, name);
        self.trace.pop();

        let result = result?;
        if !result.kind.is_empty() {
            if let Some(key) = cache_key {
                self.cache.insert(key, result.clone());
            }
            Ok(result)
        } else {
            Err(Error::InvalidNodeType)
        }
    }

    fn dispatch(
        &mut self,
        ty: &TypeExpr,
        pkg: &Arc<Package>,
        file_idx: usize,
        name: Option<&str>,
    ) -> Result<ResolvedType> {
        match ty {
            TypeExpr::Ident(ident) => {
                if is_basic(ident) {
                    let mut result = ResolvedType {
                        kind: ident.clone(),
                        package: pkg.import_path.clone(),
                        ..Default::default()
                    };
                    // A named basic is an enum candidate.
                    if let Some(named) = name {
                        if self.module.is_local(&pkg.import_path) {
                            self.scan_enum_consts(&mut result, named, ident, pkg);
                        }
                    }
                    Ok(result)
                } else if ident == "any" || ident == "error" {
                    Ok(ResolvedType {
                        kind: "any".to_string(),
                        package: pkg.import_path.clone(),
                        ..Default::default()
                    })
                } else if let Some((decl_file, decl)) = pkg.find_type(ident) {
                    let decl = decl.clone();
                    self.resolve_named_decl(pkg, decl_file, &decl)
                } else {
                    debug!(
                        "unresolved identifier {} in package {}",
                        ident, pkg.import_path
                    );
                    Ok(ResolvedType {
                        kind: "any".to_string(),
                        package: pkg.import_path.clone(),
                        ..Default::default()
                    })
                }
            }
            TypeExpr::Selector {
                package: qualifier,
                name: type_name,
            } => {
                let import_path = match pkg.files[file_idx].resolve_import(qualifier) {
                    Some(path) => path.to_string(),
                    None => {
                        warn!(
                            "unresolved package qualifier {} in {}",
                            qualifier, pkg.import_path
                        );
                        return Ok(ResolvedType {
                            kind: "any".to_string(),
                            package: pkg.import_path.clone(),
                            ..Default::default()
                        });
                    }
                };
                if self.module.is_local(&import_path) {
                    let loaded = PackageCache::load(&import_path, &self.module, LoadMode::Full)?;
                    match loaded.find_type(type_name) {
                        Some((decl_file, decl)) => {
                            let decl = decl.clone();
                            self.resolve_named_decl(&loaded, decl_file, &decl)
                        }
                        None => {
                            warn!("type {} not found in {}", type_name, import_path);
                            Ok(ResolvedType {
                                kind: "any".to_string(),
                                package: import_path,
                                ..Default::default()
                            })
                        }
                    }
                } else {
                    // Types outside the module are opaque: record a bare
                    // component so references bind and custom type mappings
                    // apply, and return the reference.
                    if self.collect_components {
                        self.add_component(ResolvedType {
                            kind: "struct".to_string(),
                            name: type_name.clone(),
                            package: import_path.clone(),
                            ..Default::default()
                        });
                    }
                    Ok(ResolvedType {
                        kind: type_name.clone(),
                        package: import_path,
                        ..Default::default()
                    })
                }
            }
            TypeExpr::Pointer(elem) => self.resolve_node(elem, pkg, file_idx, name),
            TypeExpr::Slice(elem) | TypeExpr::Variadic(elem) => {
                let elem_result = self.resolve_node(elem, pkg, file_idx, None)?;
                Ok(ResolvedType {
                    kind: "slice".to_string(),
                    slice_type: elem_result.kind,
                    package: elem_result.package,
                    ..Default::default()
                })
            }
            TypeExpr::Array { len, elem } => {
                let elem_result = self.resolve_node(elem, pkg, file_idx, None)?;
                Ok(ResolvedType {
                    kind: "array".to_string(),
                    array_type: elem_result.kind,
                    array_length: len.unwrap_or(0),
                    package: elem_result.package,
                    ..Default::default()
                })
            }
            TypeExpr::Map { key, value } => {
                let key_result = self.resolve_node(key, pkg, file_idx, None)?;
                let value_result = self.resolve_node(value, pkg, file_idx, None)?;
                Ok(ResolvedType {
                    kind: "map".to_string(),
                    map_key_type: key_result.kind,
                    map_key_package: key_result.package,
                    map_value_type: value_result.kind,
                    map_value_package: value_result.package.clone(),
                    map_value_slice_type: value_result.slice_type,
                    map_value_array_type: value_result.array_type,
                    map_value_array_length: value_result.array_length,
                    package: value_result.package,
                    ..Default::default()
                })
            }
            TypeExpr::Struct(struct_fields) => {
                let mut fields = IndexMap::new();
                for field in struct_fields {
                    let idents: Vec<String> = if field.names.is_empty() {
                        field.ident().map(|s| s.to_string()).into_iter().collect()
                    } else {
                        field.names.clone()
                    };
                    for ident in idents {
                        if !ident
                            .chars()
                            .next()
                            .map(|c| c.is_uppercase())
                            .unwrap_or(false)
                        {
                            continue;
                        }
                        let (binding_tags, validation_tags) =
                            parse_struct_tag(&ident, field.tag.as_deref());
                        let mut field_result =
                            self.resolve_node(&field.ty, pkg, file_idx, None)?;
                        if !field.doc.is_empty() {
                            debug!("found doc for field {}", ident);
                            field_result.doc = field.doc.clone();
                        }
                        field_result.is_embedded = field.embedded;
                        field_result.binding_tags = binding_tags;
                        field_result.validation_tags = validation_tags;
                        fields.insert(ident, field_result);
                    }
                }
                Ok(ResolvedType {
                    kind: "struct".to_string(),
                    struct_fields: fields,
                    package: pkg.import_path.clone(),
                    ..Default::default()
                })
            }
            TypeExpr::Interface => Ok(ResolvedType {
                kind: "any".to_string(),
                package: pkg.import_path.clone(),
                ..Default::default()
            }),
            TypeExpr::Func | TypeExpr::Chan(_) => Err(Error::InvalidNodeType),
        }
    }

    fn resolve_named_decl(
        &mut self,
        pkg: &Arc<Package>,
        decl_file: usize,
        decl: &TypeDecl,
    ) -> Result<ResolvedType> {
        if self.collect_components {
            let mut underlying = self.resolve_node(&decl.ty, pkg, decl_file, Some(&decl.name))?;
            underlying.name = decl.name.clone();
            underlying.package = pkg.import_path.clone();
            if !decl.doc.is_empty() {
                underlying.doc = decl.doc.clone();
            }
            self.add_component(underlying);
        }
        Ok(ResolvedType {
            kind: decl.name.clone(),
            package: pkg.import_path.clone(),
            ..Default::default()
        })
    }

    fn add_component(&mut self, component: ResolvedType) {
        if component.package.is_empty() || component.name.is_empty() {
            return;
        }
        if let Some(existing) = self
            .components
            .iter_mut()
            .find(|c| c.package == component.package && c.name == component.name)
        {
            // A component's field set is determined by one resolution only; a
            // bare placeholder may still be upgraded to a resolved record.
            if existing.struct_fields.is_empty() && !component.struct_fields.is_empty() {
                *existing = component;
            }
            return;
        }
        self.components.push(component);
    }

    fn scan_enum_consts(
        &mut self,
        result: &mut ResolvedType,
        type_name: &str,
        basic_kind: &str,
        pkg: &Arc<Package>,
    ) {
        for decl in pkg.const_decls() {
            for spec in &decl.specs {
                let matches_type = matches!(
                    &spec.ty,
                    Some(TypeExpr::Ident(ident)) if ident == type_name
                );
                if !matches_type {
                    continue;
                }
                for (index, value) in spec.values.iter().enumerate() {
                    let parsed = parse_enum_literal(value, basic_kind);
                    if let Some(parsed) = parsed {
                        result.enum_values.push(parsed);
                        result
                            .enum_names
                            .push(spec.names.get(index).cloned().unwrap_or_default());
                    }
                }
            }
        }
    }

    fn log_recursion(&mut self, label: &str) {
        let label = if label.is_empty() { "unknown" } else { label };
        if self.recursion_logged.insert(label.to_string()) {
            debug!("detected type recursion at {}", label);
        }
    }

    fn cache_key(
        &self,
        ty: &TypeExpr,
        pkg: &Arc<Package>,
        file_idx: usize,
        name: Option<&str>,
    ) -> Option<String> {
        if let Some(named) = name {
            return Some(format!("underlying:{}.{}", pkg.import_path, named));
        }
        match ty {
            TypeExpr::Ident(ident) if is_basic(ident) => Some(format!("type:{}", ident)),
            TypeExpr::Ident(ident) if pkg.find_type(ident).is_some() => {
                Some(format!("named:{}.{}", pkg.import_path, ident))
            }
            TypeExpr::Selector {
                package: qualifier,
                name: type_name,
            } => pkg.files[file_idx]
                .resolve_import(qualifier)
                .map(|path| format!("named:{}.{}", path, type_name)),
            _ => None,
        }
    }

    fn trace_label(&self, ty: &TypeExpr, pkg: &Arc<Package>, file_idx: usize) -> String {
        match ty {
            TypeExpr::Ident(ident) if !is_basic(ident) && pkg.find_type(ident).is_some() => {
                format!("{}.{}", pkg.import_path, ident)
            }
            TypeExpr::Selector {
                package: qualifier,
                name,
            } => match pkg.files[file_idx].resolve_import(qualifier) {
                Some(path) => format!("{}.{}", path, name),
                None => format!("{}.{}", qualifier, name),
            },
            other => other.to_string(),
        }
    }

    /// The degraded result returned on re-entry or depth overflow: a
    /// reference for named shapes, opaque `any` otherwise.
    fn recursion_result(&self, ty: &TypeExpr, pkg: &Arc<Package>, file_idx: usize) -> ResolvedType {
        match ty {
            TypeExpr::Ident(ident) if !is_basic(ident) => ResolvedType {
                kind: ident.clone(),
                package: pkg.import_path.clone(),
                ..Default::default()
            },
            TypeExpr::Selector {
                package: qualifier,
                name,
            } => ResolvedType {
                kind: name.clone(),
                package: pkg.files[file_idx]
                    .resolve_import(qualifier)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| qualifier.clone()),
                ..Default::default()
            },
            TypeExpr::Pointer(elem) => self.recursion_result(elem, pkg, file_idx),
            TypeExpr::Slice(elem) => {
                let elem_ref = self.recursion_result(elem, pkg, file_idx);
                ResolvedType {
                    kind: "slice".to_string(),
                    slice_type: elem_ref.kind,
                    package: elem_ref.package,
                    ..Default::default()
                }
            }
            TypeExpr::Array { len, elem } => {
                let elem_ref = self.recursion_result(elem, pkg, file_idx);
                ResolvedType {
                    kind: "array".to_string(),
                    array_type: elem_ref.kind,
                    array_length: len.unwrap_or(0),
                    package: elem_ref.package,
                    ..Default::default()
                }
            }
            TypeExpr::Map { key, value } => {
                let key_ref = self.recursion_result(key, pkg, file_idx);
                let value_ref = self.recursion_result(value, pkg, file_idx);
                ResolvedType {
                    kind: "map".to_string(),
                    map_key_type: key_ref.kind,
                    map_key_package: key_ref.package,
                    map_value_type: value_ref.kind,
                    package: value_ref.package,
                    ..Default::default()
                }
            }
            other => {
                let form = other.to_string();
                if form.is_empty() {
                    ResolvedType {
                        kind: "any".to_string(),
                        package: pkg.import_path.clone(),
                        ..Default::default()
                    }
                } else {
                    ResolvedType {
                        kind: form,
                        package: pkg.import_path.clone(),
                        ..Default::default()
                    }
                }
            }
        }
    }
}

fn parse_enum_literal(value: &Expr, basic_kind: &str) -> Option<Value> {
    let (negative, literal) = match value {
        Expr::Unary { op: "-", expr } => match expr.as_ref() {
            Expr::Lit(lit) => (true, Some(lit)),
            _ => (true, None),
        },
        Expr::Lit(lit) => (false, Some(lit)),
        Expr::Ident(ident) if basic_kind == "bool" => {
            return match ident.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            };
        }
        _ => (false, None),
    };
    let literal = literal?;

    match basic_kind {
        "string" => match literal {
            Lit::Str(s) => Some(Value::String(s.clone())),
            _ => None,
        },
        "int" | "int8" | "int16" | "int32" | "int64" | "rune" => match literal {
            Lit::Int(n) => Some(Value::from(if negative { -*n } else { *n })),
            _ => None,
        },
        "uint" | "uint8" | "uint16" | "uint32" | "uint64" | "uintptr" | "byte" => match literal {
            Lit::Int(n) if !negative && *n >= 0 => Some(Value::from(*n as u64)),
            _ => None,
        },
        "float32" | "float64" => {
            let value = match literal {
                Lit::Float(n) => {
                    if negative {
                        -*n
                    } else {
                        *n
                    }
                }
                Lit::Int(n) => (if negative { -*n } else { *n }) as f64,
                _ => return None,
            };
            serde_json::Number::from_f64(value).map(Value::Number)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn module_with(files: &[(&str, &str)]) -> (TempDir, ModuleInfo) {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "go.mod", "module example.com/demo\n\ngo 1.21\n");
        for (name, content) in files {
            write_file(temp.path(), name, content);
        }
        let module = ModuleInfo::discover(temp.path()).unwrap();
        (temp, module)
    }

    fn resolve_named(
        module: &ModuleInfo,
        import_path: &str,
        type_name: &str,
        collect: bool,
    ) -> (ResolvedType, Vec<ResolvedType>) {
        let pkg = PackageCache::load(import_path, module, LoadMode::Full).unwrap();
        let mut resolver = TypeResolver::new(module.clone());
        resolver.set_collect_components(collect);
        let result = resolver
            .resolve(&TypeExpr::Ident(type_name.to_string()), &pkg, 0)
            .unwrap();
        let components = resolver.take_components();
        (result, components)
    }

    #[test]
    fn test_resolve_basic_type() {
        let (_temp, module) = module_with(&[("m/m.go", "package m\n\ntype T struct{}\n")]);
        let pkg = PackageCache::load("example.com/demo/m", &module, LoadMode::Full).unwrap();
        let mut resolver = TypeResolver::new(module);
        let result = resolver
            .resolve(&TypeExpr::Ident("string".to_string()), &pkg, 0)
            .unwrap();
        assert_eq!(result.kind, "string");
    }

    #[test]
    fn test_resolve_struct_fields_in_order() {
        let (_temp, module) = module_with(&[(
            "m/contact.go",
            "package m\n\ntype Contact struct {\n\tID int `json:\"id\"`\n\tName string `json:\"name\"`\n\tsecret string\n}\n",
        )]);
        let (result, components) = resolve_named(&module, "example.com/demo/m", "Contact", true);

        assert_eq!(result.kind, "Contact");
        assert_eq!(result.package, "example.com/demo/m");

        let component = components
            .iter()
            .find(|c| c.name == "Contact")
            .expect("component recorded");
        assert_eq!(component.kind, "struct");
        let keys: Vec<&String> = component.struct_fields.keys().collect();
        assert_eq!(keys, vec!["ID", "Name"]);
        assert_eq!(component.struct_fields["ID"].kind, "int");
        assert_eq!(
            component.struct_fields["ID"].binding_tags[&crate::tags::BindingTagKind::Json].name,
            "id"
        );
    }

    #[test]
    fn test_recursive_type_resolves_without_overflow() {
        let (_temp, module) = module_with(&[(
            "m/node.go",
            "package m\n\ntype Node struct {\n\tNext *Node `json:\"next\"`\n\tValue int `json:\"value\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Node", true);

        let component = components.iter().find(|c| c.name == "Node").unwrap();
        let next = &component.struct_fields["Next"];
        assert_eq!(next.kind, "Node");
        assert_eq!(next.package, "example.com/demo/m");
        assert!(next.struct_fields.is_empty());
    }

    #[test]
    fn test_mutually_recursive_types() {
        let (_temp, module) = module_with(&[(
            "m/ab.go",
            "package m\n\ntype A struct {\n\tB *B `json:\"b\"`\n}\n\ntype B struct {\n\tA *A `json:\"a\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "A", true);
        assert!(components.iter().any(|c| c.name == "A"));
        assert!(components.iter().any(|c| c.name == "B"));
    }

    #[test]
    fn test_enum_constants_attached() {
        let (_temp, module) = module_with(&[(
            "m/status.go",
            "package m\n\ntype Code int\n\nconst (\n\tActive Code = 1\n\tInactive Code = 2\n)\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Code", true);
        let component = components.iter().find(|c| c.name == "Code").unwrap();
        assert_eq!(component.kind, "int");
        assert_eq!(component.enum_values, vec![Value::from(1), Value::from(2)]);
        assert_eq!(
            component.enum_names,
            vec!["Active".to_string(), "Inactive".to_string()]
        );
    }

    #[test]
    fn test_string_enum_constants() {
        let (_temp, module) = module_with(&[(
            "m/role.go",
            "package m\n\ntype Role string\n\nconst (\n\tAdmin Role = \"admin\"\n\tGuest Role = \"guest\"\n)\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Role", true);
        let component = components.iter().find(|c| c.name == "Role").unwrap();
        assert_eq!(
            component.enum_values,
            vec![Value::from("admin"), Value::from("guest")]
        );
    }

    #[test]
    fn test_slice_and_map_shapes() {
        let (_temp, module) = module_with(&[(
            "m/shapes.go",
            "package m\n\ntype Shapes struct {\n\tTags []string `json:\"tags\"`\n\tCounts map[string]int `json:\"counts\"`\n\tGrid [3]float64 `json:\"grid\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Shapes", true);
        let component = components.iter().find(|c| c.name == "Shapes").unwrap();

        let tags = &component.struct_fields["Tags"];
        assert_eq!(tags.kind, "slice");
        assert_eq!(tags.slice_type, "string");

        let counts = &component.struct_fields["Counts"];
        assert_eq!(counts.kind, "map");
        assert_eq!(counts.map_key_type, "string");
        assert_eq!(counts.map_value_type, "int");

        let grid = &component.struct_fields["Grid"];
        assert_eq!(grid.kind, "array");
        assert_eq!(grid.array_type, "float64");
        assert_eq!(grid.array_length, 3);
    }

    #[test]
    fn test_cross_package_reference() {
        let (_temp, module) = module_with(&[
            (
                "api/handler.go",
                "package api\n\nimport \"example.com/demo/models\"\n\ntype Envelope struct {\n\tUser models.User `json:\"user\"`\n}\n",
            ),
            (
                "models/user.go",
                "package models\n\ntype User struct {\n\tID int `json:\"id\"`\n}\n",
            ),
        ]);
        let (_, components) = resolve_named(&module, "example.com/demo/api", "Envelope", true);
        let envelope = components.iter().find(|c| c.name == "Envelope").unwrap();
        let user_field = &envelope.struct_fields["User"];
        assert_eq!(user_field.kind, "User");
        assert_eq!(user_field.package, "example.com/demo/models");
        assert!(components
            .iter()
            .any(|c| c.name == "User" && c.package == "example.com/demo/models"));
    }

    #[test]
    fn test_external_type_becomes_bare_component() {
        let (_temp, module) = module_with(&[(
            "m/event.go",
            "package m\n\nimport \"time\"\n\ntype Event struct {\n\tAt time.Time `json:\"at\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Event", true);
        let event = components.iter().find(|c| c.name == "Event").unwrap();
        assert_eq!(event.struct_fields["At"].kind, "Time");
        assert_eq!(event.struct_fields["At"].package, "time");
        assert!(components
            .iter()
            .any(|c| c.name == "Time" && c.package == "time"));
    }

    #[test]
    fn test_memoisation_returns_equal_results() {
        let (_temp, module) = module_with(&[(
            "m/user.go",
            "package m\n\ntype User struct {\n\tID int `json:\"id\"`\n}\n",
        )]);
        let pkg = PackageCache::load("example.com/demo/m", &module, LoadMode::Full).unwrap();
        let mut resolver = TypeResolver::new(module);
        resolver.set_collect_components(true);
        let first = resolver
            .resolve(&TypeExpr::Ident("User".to_string()), &pkg, 0)
            .unwrap();
        let second = resolver
            .resolve(&TypeExpr::Ident("User".to_string()), &pkg, 0)
            .unwrap();
        assert_eq!(first, second);
        // The component is recorded once.
        let components = resolver.take_components();
        assert_eq!(
            components
                .iter()
                .filter(|c| c.name == "User")
                .count(),
            1
        );
    }

    #[test]
    fn test_interface_is_any() {
        let (_temp, module) = module_with(&[(
            "m/any.go",
            "package m\n\ntype Holder struct {\n\tPayload interface{} `json:\"payload\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Holder", true);
        let holder = components.iter().find(|c| c.name == "Holder").unwrap();
        assert_eq!(holder.struct_fields["Payload"].kind, "any");
    }

    #[test]
    fn test_embedded_field_flagged() {
        let (_temp, module) = module_with(&[(
            "m/emb.go",
            "package m\n\ntype Base struct {\n\tID int `json:\"id\"`\n}\n\ntype Entry struct {\n\tBase\n\tName string `json:\"name\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Entry", true);
        let entry = components.iter().find(|c| c.name == "Entry").unwrap();
        assert!(entry.struct_fields["Base"].is_embedded);
        assert!(!entry.struct_fields["Name"].is_embedded);
    }

    #[test]
    fn test_doc_comment_attached_to_component() {
        let (_temp, module) = module_with(&[(
            "m/doc.go",
            "package m\n\n// Widget is a spare part.\ntype Widget struct {\n\t// Serial is unique.\n\tSerial string `json:\"serial\"`\n}\n",
        )]);
        let (_, components) = resolve_named(&module, "example.com/demo/m", "Widget", true);
        let widget = components.iter().find(|c| c.name == "Widget").unwrap();
        assert_eq!(widget.doc, "Widget is a spare part.");
        assert_eq!(widget.struct_fields["Serial"].doc, "Serial is unique.");
    }
}
