use crate::error::Error;
use crate::goparse::{Expr, FuncDecl, Lit, StructField, TypeExpr};
use crate::packages::{LoadMode, ModuleInfo, Package, PackageCache};
use crate::resolver::{ResolvedType, TypeResolver};
use crate::types::Route;
use anyhow::{anyhow, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// A local variable's declared type together with the package/file context
/// the type expression was written in.
#[derive(Clone)]
pub(crate) struct ScopedType {
    pub ty: TypeExpr,
    pub pkg: Arc<Package>,
    pub file_idx: usize,
}

/// Lexical scopes accumulated while walking a handler body.
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, ScopedType>>,
}

impl ScopeStack {
    pub(crate) fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn insert(&mut self, name: String, scoped: ScopedType) {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, scoped);
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&ScopedType> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

/// Everything slot resolution needs: the resolver, the module, and the
/// package/file/scope context of the call expression being consumed.
pub struct WalkEnv<'r> {
    pub(crate) resolver: &'r mut TypeResolver,
    pub(crate) module: ModuleInfo,
    pub(crate) pkg: Arc<Package>,
    pub(crate) file_idx: usize,
    pub(crate) scope: &'r ScopeStack,
}

/// The slot kinds a context-method extractor can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    StatusCode,
    Value,
    ExpressionResult,
    Ignored,
}

/// A resolved slot value handed to the build function.
#[derive(Debug, Clone)]
pub enum SlotValue {
    StatusCode(u16),
    Value(String),
    Resolved(ResolvedType),
    Ignored,
}

impl SlotValue {
    pub fn as_status_code(&self) -> Result<u16> {
        match self {
            SlotValue::StatusCode(code) => Ok(*code),
            _ => Err(anyhow!("failed to parse status code")),
        }
    }

    pub fn as_value(&self) -> Result<&str> {
        match self {
            SlotValue::Value(value) => Ok(value),
            _ => Err(anyhow!("failed to parse name")),
        }
    }

    pub fn as_resolved(&self) -> Result<&ResolvedType> {
        match self {
            SlotValue::Resolved(resolved) => Ok(resolved),
            _ => Err(anyhow!("failed to parse result")),
        }
    }
}

/// Declarative consumer for a context-method call's arguments.
///
/// Extractors declare the argument shape as a slot sequence
/// (`status_code().expression_result()`), then `build` resolves each slot
/// left-to-right against the call's arguments and applies the mutation. A
/// slot that fails to resolve aborts this call expression only.
pub struct ContextFuncBuilder<'a, 'r> {
    route: &'a mut Route,
    args: &'a [Expr],
    call_name: String,
    env: &'a mut WalkEnv<'r>,
    slots: Vec<SlotKind>,
}

impl<'a, 'r> ContextFuncBuilder<'a, 'r> {
    pub(crate) fn new(
        route: &'a mut Route,
        args: &'a [Expr],
        call_name: String,
        env: &'a mut WalkEnv<'r>,
    ) -> Self {
        Self {
            route,
            args,
            call_name,
            env,
            slots: Vec::new(),
        }
    }

    pub fn route(&self) -> &Route {
        self.route
    }

    pub fn call_name(&self) -> &str {
        &self.call_name
    }

    pub fn status_code(&mut self) -> &mut Self {
        self.slots.push(SlotKind::StatusCode);
        self
    }

    pub fn value(&mut self) -> &mut Self {
        self.slots.push(SlotKind::Value);
        self
    }

    pub fn expression_result(&mut self) -> &mut Self {
        self.slots.push(SlotKind::ExpressionResult);
        self
    }

    pub fn ignored(&mut self) -> &mut Self {
        self.slots.push(SlotKind::Ignored);
        self
    }

    /// Resolves the declared slots and applies `build` to the route.
    pub fn build(
        &mut self,
        build: impl FnOnce(&mut Route, &[SlotValue]) -> Result<()>,
    ) -> Result<()> {
        let slots = std::mem::take(&mut self.slots);
        if self.args.len() < slots.len() {
            return Err(Error::InvalidIndex.into());
        }
        let mut values = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let arg = &self.args[index];
            let value = match slot {
                SlotKind::StatusCode => SlotValue::StatusCode(resolve_status_code(
                    arg,
                    &self.env.pkg,
                    self.env.file_idx,
                )?),
                SlotKind::Value => match arg {
                    Expr::Lit(Lit::Str(value)) => SlotValue::Value(value.clone()),
                    _ => return Err(anyhow!("argument {} is not a string literal", index)),
                },
                SlotKind::ExpressionResult => {
                    let scoped = infer_expr_type(
                        arg,
                        &self.env.pkg,
                        self.env.file_idx,
                        self.env.scope,
                        &self.env.module,
                    )
                    .ok_or_else(|| {
                        anyhow!("failed to infer expression type for argument {}", index)
                    })?;
                    let resolved =
                        self.env
                            .resolver
                            .resolve(&scoped.ty, &scoped.pkg, scoped.file_idx)?;
                    SlotValue::Resolved(resolved)
                }
                SlotKind::Ignored => SlotValue::Ignored,
            };
            values.push(value);
        }
        build(self.route, &values)
    }
}

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "close", "copy", "delete", "len", "make", "new", "panic", "print", "println",
    "recover",
];

/// Resolves a call's function expression to the declaration it names,
/// crossing package boundaries through the file's imports and method
/// receivers through the lexical scope.
pub(crate) fn resolve_callee(
    func: &Expr,
    pkg: &Arc<Package>,
    file_idx: usize,
    scope: &ScopeStack,
    module: &ModuleInfo,
) -> Result<(Arc<Package>, usize, FuncDecl), Error> {
    match func {
        Expr::Ident(name) => {
            if BUILTIN_FUNCS.contains(&name.as_str()) {
                return Err(Error::BuiltInFunction);
            }
            match pkg.find_func(name) {
                Some((decl_file, decl)) => Ok((Arc::clone(pkg), decl_file, decl.clone())),
                None => Err(Error::InvalidNodeType),
            }
        }
        Expr::Selector { expr, sel } => {
            let base = match expr.as_ref() {
                Expr::Ident(base) => base,
                _ => return Err(Error::InvalidNodeType),
            };
            // A variable in scope wins over an import of the same name.
            if let Some(scoped) = scope.lookup(base) {
                let (type_pkg, type_name) =
                    named_type_target(&scoped.ty, &scoped.pkg, scoped.file_idx, module)?;
                return match type_pkg.find_method(&type_name, sel) {
                    Some((decl_file, decl)) => Ok((Arc::clone(&type_pkg), decl_file, decl.clone())),
                    None => Err(Error::InvalidNodeType),
                };
            }
            if let Some(import_path) = pkg.files[file_idx].resolve_import(base) {
                if !module.is_local(import_path) {
                    return Err(Error::InvalidNodeType);
                }
                let import_path = import_path.to_string();
                let loaded = PackageCache::load(&import_path, module, LoadMode::Full)?;
                return match loaded.find_func(sel) {
                    Some((decl_file, decl)) => Ok((Arc::clone(&loaded), decl_file, decl.clone())),
                    None => Err(Error::InvalidNodeType),
                };
            }
            Err(Error::InvalidNodeType)
        }
        _ => Err(Error::InvalidNodeType),
    }
}

/// Resolves a type expression to the package and name of the named type it
/// denotes, stripping pointers.
fn named_type_target(
    ty: &TypeExpr,
    pkg: &Arc<Package>,
    file_idx: usize,
    module: &ModuleInfo,
) -> Result<(Arc<Package>, String), Error> {
    match ty {
        TypeExpr::Pointer(inner) => named_type_target(inner, pkg, file_idx, module),
        TypeExpr::Ident(name) => Ok((Arc::clone(pkg), name.clone())),
        TypeExpr::Selector {
            package: qualifier,
            name,
        } => {
            let import_path = pkg.files[file_idx]
                .resolve_import(qualifier)
                .ok_or(Error::InvalidNodeType)?;
            if !module.is_local(import_path) {
                return Err(Error::InvalidNodeType);
            }
            let import_path = import_path.to_string();
            let loaded = PackageCache::load(&import_path, module, LoadMode::Full)?;
            Ok((loaded, name.clone()))
        }
        _ => Err(Error::InvalidNodeType),
    }
}

/// Infers the declared type of an expression from the lexical scope and the
/// package's declaration surface. Best-effort: `None` means the walker skips
/// the extraction.
pub(crate) fn infer_expr_type(
    expr: &Expr,
    pkg: &Arc<Package>,
    file_idx: usize,
    scope: &ScopeStack,
    module: &ModuleInfo,
) -> Option<ScopedType> {
    let scoped = |ty: TypeExpr| ScopedType {
        ty,
        pkg: Arc::clone(pkg),
        file_idx,
    };
    match expr {
        Expr::Ident(name) => {
            if let Some(found) = scope.lookup(name) {
                return Some(found.clone());
            }
            if name == "true" || name == "false" {
                return Some(scoped(TypeExpr::Ident("bool".to_string())));
            }
            if name == "nil" {
                return None;
            }
            // Package-level vars and consts with explicit types.
            for decl in pkg.var_decls().chain(pkg.const_decls()) {
                for spec in &decl.specs {
                    if spec.names.iter().any(|n| n == name) {
                        if let Some(ty) = &spec.ty {
                            return Some(scoped(ty.clone()));
                        }
                    }
                }
            }
            None
        }
        Expr::Lit(Lit::Str(_)) => Some(scoped(TypeExpr::Ident("string".to_string()))),
        Expr::Lit(Lit::Int(_)) => Some(scoped(TypeExpr::Ident("int".to_string()))),
        Expr::Lit(Lit::Float(_)) => Some(scoped(TypeExpr::Ident("float64".to_string()))),
        Expr::Lit(Lit::Char(_)) => Some(scoped(TypeExpr::Ident("rune".to_string()))),
        Expr::Unary { op: "&", expr } => infer_expr_type(expr, pkg, file_idx, scope, module),
        Expr::Star(inner) => {
            let inner = infer_expr_type(inner, pkg, file_idx, scope, module)?;
            match inner.ty {
                TypeExpr::Pointer(elem) => Some(ScopedType {
                    ty: *elem,
                    pkg: inner.pkg,
                    file_idx: inner.file_idx,
                }),
                ty => Some(ScopedType {
                    ty,
                    pkg: inner.pkg,
                    file_idx: inner.file_idx,
                }),
            }
        }
        Expr::Composite { ty, .. } => {
            if matches!(ty, TypeExpr::Ident(name) if name.is_empty()) {
                return None;
            }
            Some(scoped(ty.clone()))
        }
        Expr::TypeAssert { ty: Some(ty), .. } => Some(scoped(ty.clone())),
        Expr::Call { func, args, .. } => {
            infer_call_type(func, args, pkg, file_idx, scope, module)
        }
        Expr::Index { expr, .. } => {
            let base = infer_expr_type(expr, pkg, file_idx, scope, module)?;
            match base.ty {
                TypeExpr::Slice(elem) | TypeExpr::Array { elem, .. } => Some(ScopedType {
                    ty: *elem,
                    pkg: base.pkg,
                    file_idx: base.file_idx,
                }),
                TypeExpr::Map { value, .. } => Some(ScopedType {
                    ty: *value,
                    pkg: base.pkg,
                    file_idx: base.file_idx,
                }),
                _ => None,
            }
        }
        Expr::SliceExpr(inner) => infer_expr_type(inner, pkg, file_idx, scope, module),
        Expr::Selector { expr, sel } => {
            // Package-qualified constants and vars: status.Active.
            if let Expr::Ident(base) = expr.as_ref() {
                if scope.lookup(base).is_none() {
                    if let Some(import_path) = pkg.files[file_idx].resolve_import(base) {
                        if !module.is_local(import_path) {
                            return None;
                        }
                        let import_path = import_path.to_string();
                        let loaded =
                            PackageCache::load(&import_path, module, LoadMode::Full).ok()?;
                        for decl in loaded.const_decls().chain(loaded.var_decls()) {
                            for spec in &decl.specs {
                                if spec.names.iter().any(|name| name == sel) {
                                    if let Some(ty) = &spec.ty {
                                        return Some(ScopedType {
                                            ty: ty.clone(),
                                            pkg: Arc::clone(&loaded),
                                            file_idx: 0,
                                        });
                                    }
                                }
                            }
                        }
                        return None;
                    }
                }
            }
            // Struct field access, one level through the declared type.
            let base = infer_expr_type(expr, pkg, file_idx, scope, module)?;
            let (type_pkg, type_name) =
                named_type_target(&base.ty, &base.pkg, base.file_idx, module).ok()?;
            let (decl_file, decl) = type_pkg.find_type(&type_name)?;
            let fields = struct_fields_of(&decl.ty)?;
            for field in fields {
                let matches = field.names.iter().any(|n| n == sel)
                    || (field.embedded && field.ident() == Some(sel.as_str()));
                if matches {
                    return Some(ScopedType {
                        ty: field.ty.clone(),
                        pkg: Arc::clone(&type_pkg),
                        file_idx: decl_file,
                    });
                }
            }
            None
        }
        _ => None,
    }
}

fn struct_fields_of(ty: &TypeExpr) -> Option<&Vec<StructField>> {
    match ty {
        TypeExpr::Struct(fields) => Some(fields),
        TypeExpr::Pointer(inner) => struct_fields_of(inner),
        _ => None,
    }
}

fn infer_call_type(
    func: &Expr,
    args: &[Expr],
    pkg: &Arc<Package>,
    file_idx: usize,
    scope: &ScopeStack,
    module: &ModuleInfo,
) -> Option<ScopedType> {
    // Builtins and conversions first.
    if let Expr::Ident(name) = func {
        match name.as_str() {
            "make" => {
                if let Some(Expr::TypeRef(ty)) = args.first() {
                    return Some(ScopedType {
                        ty: ty.clone(),
                        pkg: Arc::clone(pkg),
                        file_idx,
                    });
                }
                return None;
            }
            "new" => {
                if let Some(Expr::Ident(type_name)) = args.first() {
                    return Some(ScopedType {
                        ty: TypeExpr::Ident(type_name.clone()),
                        pkg: Arc::clone(pkg),
                        file_idx,
                    });
                }
                return None;
            }
            "len" | "cap" => {
                return Some(ScopedType {
                    ty: TypeExpr::Ident("int".to_string()),
                    pkg: Arc::clone(pkg),
                    file_idx,
                });
            }
            "append" => {
                return args
                    .first()
                    .and_then(|arg| infer_expr_type(arg, pkg, file_idx, scope, module));
            }
            basic if is_conversion_target(basic) => {
                return Some(ScopedType {
                    ty: TypeExpr::Ident(basic.to_string()),
                    pkg: Arc::clone(pkg),
                    file_idx,
                });
            }
            _ => {}
        }
    }

    match resolve_callee(func, pkg, file_idx, scope, module) {
        Ok((callee_pkg, callee_file, decl)) => {
            let result = decl.results.first()?.clone();
            Some(ScopedType {
                ty: result,
                pkg: callee_pkg,
                file_idx: callee_file,
            })
        }
        Err(e) => {
            debug!("failed to resolve callee {}: {}", func.call_name(), e);
            None
        }
    }
}

fn is_conversion_target(name: &str) -> bool {
    matches!(
        name,
        "string"
            | "int"
            | "int8"
            | "int16"
            | "int32"
            | "int64"
            | "uint"
            | "uint8"
            | "uint16"
            | "uint32"
            | "uint64"
            | "float32"
            | "float64"
            | "bool"
            | "byte"
            | "rune"
    )
}

/// Resolves a status-code argument: an integer literal, a `net/http`
/// `StatusX` constant, or a local integer constant.
pub(crate) fn resolve_status_code(
    expr: &Expr,
    pkg: &Arc<Package>,
    file_idx: usize,
) -> Result<u16> {
    match expr {
        Expr::Lit(Lit::Int(code)) => {
            u16::try_from(*code).map_err(|_| anyhow!("status code out of range: {}", code))
        }
        Expr::Selector { expr, sel } => {
            let base = match expr.as_ref() {
                Expr::Ident(base) => base.as_str(),
                _ => return Err(anyhow!("failed to parse status code")),
            };
            let is_net_http = base == "http"
                || pkg.files[file_idx].resolve_import(base) == Some("net/http");
            if !is_net_http {
                return Err(anyhow!("failed to parse status code"));
            }
            http_status_by_name(sel).ok_or_else(|| anyhow!("unknown status constant {}", sel))
        }
        Expr::Ident(name) => {
            for decl in pkg.const_decls() {
                for spec in &decl.specs {
                    for (index, spec_name) in spec.names.iter().enumerate() {
                        if spec_name == name {
                            if let Some(Expr::Lit(Lit::Int(code))) = spec.values.get(index) {
                                return u16::try_from(*code)
                                    .map_err(|_| anyhow!("status code out of range: {}", code));
                            }
                        }
                    }
                }
            }
            Err(anyhow!("failed to parse status code"))
        }
        _ => Err(anyhow!("failed to parse status code")),
    }
}

/// The `net/http` status constants, by name.
fn http_status_by_name(name: &str) -> Option<u16> {
    Some(match name {
        "StatusContinue" => 100,
        "StatusSwitchingProtocols" => 101,
        "StatusProcessing" => 102,
        "StatusEarlyHints" => 103,
        "StatusOK" => 200,
        "StatusCreated" => 201,
        "StatusAccepted" => 202,
        "StatusNonAuthoritativeInfo" => 203,
        "StatusNoContent" => 204,
        "StatusResetContent" => 205,
        "StatusPartialContent" => 206,
        "StatusMultiStatus" => 207,
        "StatusAlreadyReported" => 208,
        "StatusIMUsed" => 226,
        "StatusMultipleChoices" => 300,
        "StatusMovedPermanently" => 301,
        "StatusFound" => 302,
        "StatusSeeOther" => 303,
        "StatusNotModified" => 304,
        "StatusUseProxy" => 305,
        "StatusTemporaryRedirect" => 307,
        "StatusPermanentRedirect" => 308,
        "StatusBadRequest" => 400,
        "StatusUnauthorized" => 401,
        "StatusPaymentRequired" => 402,
        "StatusForbidden" => 403,
        "StatusNotFound" => 404,
        "StatusMethodNotAllowed" => 405,
        "StatusNotAcceptable" => 406,
        "StatusProxyAuthRequired" => 407,
        "StatusRequestTimeout" => 408,
        "StatusConflict" => 409,
        "StatusGone" => 410,
        "StatusLengthRequired" => 411,
        "StatusPreconditionFailed" => 412,
        "StatusRequestEntityTooLarge" => 413,
        "StatusRequestURITooLong" => 414,
        "StatusUnsupportedMediaType" => 415,
        "StatusRequestedRangeNotSatisfiable" => 416,
        "StatusExpectationFailed" => 417,
        "StatusTeapot" => 418,
        "StatusMisdirectedRequest" => 421,
        "StatusUnprocessableEntity" => 422,
        "StatusLocked" => 423,
        "StatusFailedDependency" => 424,
        "StatusTooEarly" => 425,
        "StatusUpgradeRequired" => 426,
        "StatusPreconditionRequired" => 428,
        "StatusTooManyRequests" => 429,
        "StatusRequestHeaderFieldsTooLarge" => 431,
        "StatusUnavailableForLegalReasons" => 451,
        "StatusInternalServerError" => 500,
        "StatusNotImplemented" => 501,
        "StatusBadGateway" => 502,
        "StatusServiceUnavailable" => 503,
        "StatusGatewayTimeout" => 504,
        "StatusHTTPVersionNotSupported" => 505,
        "StatusVariantAlsoNegotiates" => 506,
        "StatusInsufficientStorage" => 507,
        "StatusLoopDetected" => 508,
        "StatusNotExtended" => 510,
        "StatusNetworkAuthenticationRequired" => 511,
        _ => return None,
    })
}
