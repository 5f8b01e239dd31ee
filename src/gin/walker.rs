use super::builder::{
    infer_expr_type, resolve_callee, ContextFuncBuilder, ScopeStack, ScopedType, WalkEnv,
};
use crate::goparse::{Block, Decl, Expr, FuncDecl, ParamGroup, Stmt, TypeExpr};
use crate::packages::{ModuleInfo, Package};
use crate::resolver::TypeResolver;
use crate::service::{CustomFunc, RouterConfig};
use crate::types::{
    add_return_type, binding_to_content_types, BodyParam, Field, Param, ReturnType, Route,
};
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Walks a handler function's call graph, extracting parameters and response
/// types as side effects on the route.
///
/// The walker crosses function and package boundaries whenever the context
/// value is passed along, and dispatches on context-method calls against the
/// configured router context type. All extraction is best-effort: a call
/// expression that fails to resolve is logged and skipped.
pub(crate) struct HandlerWalker<'r> {
    resolver: &'r mut TypeResolver,
    module: ModuleInfo,
    router: RouterConfig,
    custom_funcs: Vec<CustomFunc>,
    in_progress: Vec<String>,
}

struct FnCtx<'p> {
    pkg: &'p Arc<Package>,
    file_idx: usize,
    ctx_name: &'p str,
    depth: usize,
}

impl<'r> HandlerWalker<'r> {
    pub fn new(
        resolver: &'r mut TypeResolver,
        module: ModuleInfo,
        router: RouterConfig,
        custom_funcs: Vec<CustomFunc>,
    ) -> Self {
        Self {
            resolver,
            module,
            router,
            custom_funcs,
            in_progress: Vec::new(),
        }
    }

    /// Entry point: walks one handler declaration. At depth 0 the function's
    /// doc becomes the route's doc, and a synthetic 200/JSON response is
    /// appended when no return type was discovered.
    pub fn walk(
        &mut self,
        route: &mut Route,
        pkg: &Arc<Package>,
        file_idx: usize,
        decl: &FuncDecl,
        depth: usize,
    ) -> Result<()> {
        let body = decl
            .body
            .as_ref()
            .ok_or_else(|| anyhow!("function body is nil: {}", decl.name))?;

        if depth == 0 {
            if !decl.doc.is_empty() {
                route.doc = decl.doc.trim().to_string();
            }
            info!(
                "parsing handler function {} for {} {}",
                decl.name, route.method, route.path
            );
        }

        let ctx_name = self
            .find_context_argument(decl, pkg, file_idx)
            .ok_or_else(|| anyhow!("failed to find context variable name in {}", decl.name))?;

        let mut scope = ScopeStack::default();
        scope.push();
        if let Some(receiver) = &decl.receiver {
            if let Some(name) = &receiver.name {
                let ty = if receiver.is_pointer {
                    TypeExpr::Pointer(Box::new(TypeExpr::Ident(receiver.type_name.clone())))
                } else {
                    TypeExpr::Ident(receiver.type_name.clone())
                };
                scope.insert(
                    name.clone(),
                    ScopedType {
                        ty,
                        pkg: Arc::clone(pkg),
                        file_idx,
                    },
                );
            }
        }
        bind_params(&mut scope, &decl.params, pkg, file_idx);

        let ctx = FnCtx {
            pkg,
            file_idx,
            ctx_name: &ctx_name,
            depth,
        };
        for stmt in &body.stmts {
            self.visit_stmt(stmt, route, &mut scope, &ctx)?;
        }

        if depth == 0 && route.return_types.is_empty() {
            warn!(
                "no return types found for {} {}, falling back to empty JSON response",
                route.method, route.path
            );
            route.return_types = add_return_type(
                std::mem::take(&mut route.return_types),
                ReturnType {
                    status_code: 200,
                    content_type: "application/json".to_string(),
                    field: Field::of_kind("struct"),
                },
            );
        }

        Ok(())
    }

    /// Locates the first parameter whose declared type is the configured
    /// router context type and returns its local identifier.
    fn find_context_argument(
        &self,
        decl: &FuncDecl,
        pkg: &Arc<Package>,
        file_idx: usize,
    ) -> Option<String> {
        for group in &decl.params {
            if type_is_context(&group.ty, pkg, file_idx, &self.router) {
                return group.names.first().cloned();
            }
        }
        None
    }

    fn visit_block(
        &mut self,
        block: &Block,
        route: &mut Route,
        scope: &mut ScopeStack,
        ctx: &FnCtx<'_>,
    ) -> Result<()> {
        scope.push();
        for stmt in &block.stmts {
            self.visit_stmt(stmt, route, scope, ctx)?;
        }
        scope.pop();
        Ok(())
    }

    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
        route: &mut Route,
        scope: &mut ScopeStack,
        ctx: &FnCtx<'_>,
    ) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) | Stmt::IncDec(expr) | Stmt::Go(expr) | Stmt::Defer(expr) => {
                self.visit_expr(expr, route, scope, ctx)?;
            }
            Stmt::Assign { lhs, rhs, define } => {
                for expr in rhs {
                    self.visit_expr(expr, route, scope, ctx)?;
                }
                if *define {
                    bind_assignment(scope, lhs, rhs, ctx.pkg, ctx.file_idx, &self.module);
                } else {
                    for expr in lhs {
                        self.visit_expr(expr, route, scope, ctx)?;
                    }
                }
            }
            Stmt::Decl(decl) => match decl.as_ref() {
                Decl::Var(value_decl) | Decl::Const(value_decl) => {
                    for spec in &value_decl.specs {
                        for value in &spec.values {
                            self.visit_expr(value, route, scope, ctx)?;
                        }
                        if let Some(ty) = &spec.ty {
                            for name in &spec.names {
                                scope.insert(
                                    name.clone(),
                                    ScopedType {
                                        ty: ty.clone(),
                                        pkg: Arc::clone(ctx.pkg),
                                        file_idx: ctx.file_idx,
                                    },
                                );
                            }
                        } else {
                            let lhs: Vec<Expr> =
                                spec.names.iter().map(|n| Expr::Ident(n.clone())).collect();
                            bind_assignment(
                                scope,
                                &lhs,
                                &spec.values,
                                ctx.pkg,
                                ctx.file_idx,
                                &self.module,
                            );
                        }
                    }
                }
                _ => {}
            },
            Stmt::Return(values) => {
                for value in values {
                    self.visit_expr(value, route, scope, ctx)?;
                }
            }
            Stmt::If {
                init,
                cond,
                then,
                else_,
            } => {
                scope.push();
                if let Some(init) = init {
                    self.visit_stmt(init, route, scope, ctx)?;
                }
                self.visit_expr(cond, route, scope, ctx)?;
                self.visit_block(then, route, scope, ctx)?;
                if let Some(else_) = else_ {
                    self.visit_stmt(else_, route, scope, ctx)?;
                }
                scope.pop();
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                scope.push();
                if let Some(init) = init {
                    self.visit_stmt(init, route, scope, ctx)?;
                }
                if let Some(cond) = cond {
                    self.visit_expr(cond, route, scope, ctx)?;
                }
                if let Some(post) = post {
                    self.visit_stmt(post, route, scope, ctx)?;
                }
                self.visit_block(body, route, scope, ctx)?;
                scope.pop();
            }
            Stmt::Range {
                key,
                value,
                expr,
                body,
            } => {
                scope.push();
                self.visit_expr(expr, route, scope, ctx)?;
                bind_range(scope, key, value, expr, ctx.pkg, ctx.file_idx, &self.module);
                self.visit_block(body, route, scope, ctx)?;
                scope.pop();
            }
            Stmt::Switch { init, tag, cases } => {
                scope.push();
                if let Some(init) = init {
                    self.visit_stmt(init, route, scope, ctx)?;
                }
                if let Some(tag) = tag {
                    self.visit_expr(tag, route, scope, ctx)?;
                }
                for case in cases {
                    scope.push();
                    for stmt in &case.body {
                        self.visit_stmt(stmt, route, scope, ctx)?;
                    }
                    scope.pop();
                }
                scope.pop();
            }
            Stmt::TypeSwitch { expr, cases, .. } => {
                scope.push();
                self.visit_expr(expr, route, scope, ctx)?;
                for case in cases {
                    scope.push();
                    for stmt in &case.body {
                        self.visit_stmt(stmt, route, scope, ctx)?;
                    }
                    scope.pop();
                }
                scope.pop();
            }
            Stmt::Select(cases) => {
                for case in cases {
                    scope.push();
                    for stmt in &case.body {
                        self.visit_stmt(stmt, route, scope, ctx)?;
                    }
                    scope.pop();
                }
            }
            Stmt::Block(block) => self.visit_block(block, route, scope, ctx)?,
            Stmt::Send { channel, value } => {
                self.visit_expr(channel, route, scope, ctx)?;
                self.visit_expr(value, route, scope, ctx)?;
            }
            Stmt::Branch(_) | Stmt::Empty => {}
        }
        Ok(())
    }

    fn visit_expr(
        &mut self,
        expr: &Expr,
        route: &mut Route,
        scope: &mut ScopeStack,
        ctx: &FnCtx<'_>,
    ) -> Result<()> {
        match expr {
            Expr::Call { func, args, .. } => {
                self.process_call(func, args, route, scope, ctx)?;
                self.visit_expr(func, route, scope, ctx)?;
                for arg in args {
                    self.visit_expr(arg, route, scope, ctx)?;
                }
            }
            Expr::Selector { expr, .. }
            | Expr::Unary { expr, .. }
            | Expr::Star(expr)
            | Expr::SliceExpr(expr) => self.visit_expr(expr, route, scope, ctx)?,
            Expr::Binary { left, right, .. } => {
                self.visit_expr(left, route, scope, ctx)?;
                self.visit_expr(right, route, scope, ctx)?;
            }
            Expr::Index { expr, index } => {
                self.visit_expr(expr, route, scope, ctx)?;
                self.visit_expr(index, route, scope, ctx)?;
            }
            Expr::Composite { elems, .. } => {
                for elem in elems {
                    self.visit_expr(elem, route, scope, ctx)?;
                }
            }
            Expr::KeyValue { key, value } => {
                self.visit_expr(key, route, scope, ctx)?;
                self.visit_expr(value, route, scope, ctx)?;
            }
            Expr::FuncLit { params, body } => {
                scope.push();
                bind_params(scope, params, ctx.pkg, ctx.file_idx);
                for stmt in &body.stmts {
                    self.visit_stmt(stmt, route, scope, ctx)?;
                }
                scope.pop();
            }
            Expr::TypeAssert { expr, .. } => self.visit_expr(expr, route, scope, ctx)?,
            Expr::Ident(_) | Expr::Lit(_) | Expr::TypeRef(_) => {}
        }
        Ok(())
    }

    fn process_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        route: &mut Route,
        scope: &ScopeStack,
        ctx: &FnCtx<'_>,
    ) -> Result<()> {
        if self.should_skip_call(func, ctx) {
            return Ok(());
        }
        let call_name = func.call_name();

        // Custom recognisers run first; the first one that returns a route
        // short-circuits this call expression.
        if !self.custom_funcs.is_empty() {
            let customs = self.custom_funcs.clone();
            let mut env = WalkEnv {
                resolver: &mut *self.resolver,
                module: self.module.clone(),
                pkg: Arc::clone(ctx.pkg),
                file_idx: ctx.file_idx,
                scope,
            };
            for custom in &customs {
                let mut builder =
                    ContextFuncBuilder::new(route, args, call_name.clone(), &mut env);
                if let Some(new_route) = custom(ctx.ctx_name, &mut builder)? {
                    *route = new_route;
                    return Ok(());
                }
            }
        }

        // The context handed to another function means the extraction
        // continues inside that function.
        let passes_ctx = args
            .iter()
            .any(|arg| matches!(arg, Expr::Ident(name) if name == ctx.ctx_name));
        if passes_ctx {
            match resolve_callee(func, ctx.pkg, ctx.file_idx, scope, &self.module) {
                Ok((callee_pkg, callee_file, decl)) => {
                    let key = format!("{}.{}", callee_pkg.import_path, decl_key(&decl));
                    if self.in_progress.contains(&key) {
                        debug!("skipping re-entered function {}", key);
                        return Ok(());
                    }
                    self.in_progress.push(key);
                    let result = self.walk(route, &callee_pkg, callee_file, &decl, ctx.depth + 1);
                    self.in_progress.pop();
                    if let Err(e) = result {
                        debug!("error parsing function {}: {}", call_name, e);
                    }
                }
                Err(e) => debug!("failed to get function {}: {}", call_name, e),
            }
            return Ok(());
        }

        // Context method calls drive the extraction vocabulary.
        if let Expr::Selector { expr, sel } = func {
            if let Expr::Ident(base) = expr.as_ref() {
                let is_context = base == ctx.ctx_name
                    || scope
                        .lookup(base)
                        .map(|scoped| {
                            type_is_context(&scoped.ty, &scoped.pkg, scoped.file_idx, &self.router)
                        })
                        .unwrap_or(false);
                if is_context {
                    let mut env = WalkEnv {
                        resolver: &mut *self.resolver,
                        module: self.module.clone(),
                        pkg: Arc::clone(ctx.pkg),
                        file_idx: ctx.file_idx,
                        scope,
                    };
                    dispatch_context_method(sel, route, args, call_name, &mut env);
                }
            }
        }

        Ok(())
    }

    /// Calls matching the configured ignore patterns are never treated as
    /// extraction sites.
    fn should_skip_call(&self, func: &Expr, ctx: &FnCtx<'_>) -> bool {
        let (base, sel) = match func {
            Expr::Selector { expr, sel } => (expr.as_ref(), sel),
            _ => return false,
        };
        if sel == "Translate" {
            let receiver = match base {
                Expr::Ident(name) => Some(name.as_str()),
                Expr::Selector { sel, .. } => Some(sel.as_str()),
                _ => None,
            };
            if let Some(receiver) = receiver {
                if self
                    .router
                    .ignored_translate_receivers
                    .iter()
                    .any(|ignored| ignored == receiver)
                {
                    return true;
                }
            }
        }
        if let Expr::Ident(base) = base {
            if base == "httputil" {
                return true;
            }
            if let Some(path) = ctx.pkg.files[ctx.file_idx].resolve_import(base) {
                if path.ends_with("/httputil") {
                    return true;
                }
            }
        }
        false
    }
}

fn decl_key(decl: &FuncDecl) -> String {
    match &decl.receiver {
        Some(recv) if recv.is_pointer => format!("(*{}).{}", recv.type_name, decl.name),
        Some(recv) => format!("({}).{}", recv.type_name, decl.name),
        None => decl.name.clone(),
    }
}

fn bind_params(
    scope: &mut ScopeStack,
    params: &[ParamGroup],
    pkg: &Arc<Package>,
    file_idx: usize,
) {
    for group in params {
        for name in &group.names {
            scope.insert(
                name.clone(),
                ScopedType {
                    ty: group.ty.clone(),
                    pkg: Arc::clone(pkg),
                    file_idx,
                },
            );
        }
    }
}

fn bind_assignment(
    scope: &mut ScopeStack,
    lhs: &[Expr],
    rhs: &[Expr],
    pkg: &Arc<Package>,
    file_idx: usize,
    module: &ModuleInfo,
) {
    let pairs: Vec<(&Expr, &Expr)> = if lhs.len() == rhs.len() {
        lhs.iter().zip(rhs.iter()).collect()
    } else if rhs.len() == 1 {
        // Multi-value call: only the first result's type is tracked.
        lhs.iter().take(1).zip(rhs.iter()).collect()
    } else {
        Vec::new()
    };
    for (target, value) in pairs {
        let name = match target {
            Expr::Ident(name) if name != "_" => name.clone(),
            _ => continue,
        };
        if let Some(scoped) = infer_expr_type(value, pkg, file_idx, scope, module) {
            scope.insert(name, scoped);
        }
    }
}

fn bind_range(
    scope: &mut ScopeStack,
    key: &Option<String>,
    value: &Option<String>,
    expr: &Expr,
    pkg: &Arc<Package>,
    file_idx: usize,
    module: &ModuleInfo,
) {
    let base = match infer_expr_type(expr, pkg, file_idx, scope, module) {
        Some(base) => base,
        None => return,
    };
    let (key_ty, value_ty) = match base.ty {
        TypeExpr::Slice(elem) | TypeExpr::Array { elem, .. } => {
            (Some(TypeExpr::Ident("int".to_string())), Some(*elem))
        }
        TypeExpr::Map { key, value } => (Some(*key), Some(*value)),
        _ => (None, None),
    };
    if let (Some(name), Some(ty)) = (key.as_ref(), key_ty) {
        if name != "_" {
            scope.insert(
                name.clone(),
                ScopedType {
                    ty,
                    pkg: Arc::clone(&base.pkg),
                    file_idx: base.file_idx,
                },
            );
        }
    }
    if let (Some(name), Some(ty)) = (value.as_ref(), value_ty) {
        if name != "_" {
            scope.insert(
                name.clone(),
                ScopedType {
                    ty,
                    pkg: Arc::clone(&base.pkg),
                    file_idx: base.file_idx,
                },
            );
        }
    }
}

fn type_is_context(
    ty: &TypeExpr,
    pkg: &Arc<Package>,
    file_idx: usize,
    router: &RouterConfig,
) -> bool {
    let inner = match (router.context_is_pointer, ty) {
        (true, TypeExpr::Pointer(inner)) => inner.as_ref(),
        (false, other) => other,
        _ => return false,
    };
    match inner {
        TypeExpr::Selector {
            package: qualifier,
            name,
        } => {
            name == &router.context_type
                && pkg.files[file_idx].resolve_import(qualifier) == Some(&router.package_path)
        }
        _ => false,
    }
}

/// The context-method vocabulary: each method declares its argument slots
/// and applies the extracted values to the route. Slot errors abort the call
/// expression, not the walk.
fn dispatch_context_method(
    method: &str,
    route: &mut Route,
    args: &[Expr],
    call_name: String,
    env: &mut WalkEnv<'_>,
) {
    let mut builder = ContextFuncBuilder::new(route, args, call_name, env);
    let outcome = match method {
        "JSON" | "XML" | "YAML" | "ProtoBuf" | "AbortWithStatusJSON" => {
            let content_type = match method {
                "XML" => "application/xml",
                "YAML" => "application/yaml",
                "ProtoBuf" => "application/protobuf",
                _ => "application/json",
            };
            builder
                .status_code()
                .expression_result()
                .build(|route, params| {
                    let status_code = params[0].as_status_code()?;
                    let result = params[1].as_resolved()?;
                    route.return_types = add_return_type(
                        std::mem::take(&mut route.return_types),
                        ReturnType {
                            status_code,
                            content_type: content_type.to_string(),
                            field: Field::from_resolved(result.clone()),
                        },
                    );
                    Ok(())
                })
        }
        "Data" => builder
            .status_code()
            .ignored()
            .expression_result()
            .build(|route, params| {
                let status_code = params[0].as_status_code()?;
                let result = params[2].as_resolved()?;
                route.return_types = add_return_type(
                    std::mem::take(&mut route.return_types),
                    ReturnType {
                        status_code,
                        content_type: String::new(),
                        field: Field::from_resolved(result.clone()),
                    },
                );
                Ok(())
            }),
        "String" => builder.status_code().ignored().build(|route, params| {
            let status_code = params[0].as_status_code()?;
            route.return_types = add_return_type(
                std::mem::take(&mut route.return_types),
                ReturnType {
                    status_code,
                    content_type: "text/plain".to_string(),
                    field: Field::of_kind("string"),
                },
            );
            Ok(())
        }),
        "Status" | "AbortWithStatus" => builder.status_code().build(|route, params| {
            let status_code = params[0].as_status_code()?;
            route.return_types = add_return_type(
                std::mem::take(&mut route.return_types),
                ReturnType {
                    status_code,
                    content_type: String::new(),
                    field: Field::of_kind("nil"),
                },
            );
            Ok(())
        }),
        "AbortWithError" => builder.status_code().ignored().build(|route, params| {
            let status_code = params[0].as_status_code()?;
            route.return_types = add_return_type(
                std::mem::take(&mut route.return_types),
                ReturnType {
                    status_code,
                    content_type: String::new(),
                    field: Field::of_kind("nil"),
                },
            );
            Ok(())
        }),
        "GetQuery" | "Query" | "GetQueryArray" | "QueryArray" | "GetQueryMap" | "QueryMap" => {
            let is_array = method.ends_with("Array");
            let is_map = method.ends_with("Map");
            builder.value().build(|route, params| {
                let name = params[0].as_value()?;
                route.query_params.push(Param {
                    name: name.to_string(),
                    field: Field::of_kind("string"),
                    is_array,
                    is_map,
                    ..Default::default()
                });
                Ok(())
            })
        }
        "ShouldBindQuery" | "BindQuery" => builder.expression_result().build(|route, params| {
            let result = params[0].as_resolved()?;
            route.query_params.push(Param {
                is_bound: true,
                field: Field::from_resolved(result.clone()),
                ..Default::default()
            });
            Ok(())
        }),
        "ShouldBind" | "Bind" => builder.expression_result().build(|route, params| {
            let result = params[0].as_resolved()?;
            let field = Field::from_resolved(result.clone());
            route.query_params.push(Param {
                is_bound: true,
                field: field.clone(),
                ..Default::default()
            });
            for kind in [
                crate::tags::BindingTagKind::Form,
                crate::tags::BindingTagKind::Json,
                crate::tags::BindingTagKind::Xml,
                crate::tags::BindingTagKind::Yaml,
            ] {
                for content_type in binding_to_content_types(kind) {
                    route.body.push(BodyParam {
                        content_type: content_type.to_string(),
                        is_bound: true,
                        field: field.clone(),
                        ..Default::default()
                    });
                }
            }
            Ok(())
        }),
        "ShouldBindJSON" | "BindJSON" | "ShouldBindXML" | "BindXML" | "ShouldBindYAML"
        | "BindYAML" => {
            let content_type = if method.ends_with("XML") {
                "application/xml"
            } else if method.ends_with("YAML") {
                "application/yaml"
            } else {
                "application/json"
            };
            builder.expression_result().build(|route, params| {
                let result = params[0].as_resolved()?;
                route.body.push(BodyParam {
                    content_type: content_type.to_string(),
                    is_bound: true,
                    field: Field::from_resolved(result.clone()),
                    ..Default::default()
                });
                Ok(())
            })
        }
        "GetPostForm" | "PostForm" | "GetPostFormArray" | "PostFormArray" | "GetPostFormMap"
        | "PostFormMap" => {
            let is_array = method.ends_with("Array");
            let is_map = method.ends_with("Map");
            builder.value().build(|route, params| {
                let name = params[0].as_value()?;
                route.body.push(BodyParam {
                    content_type: "application/x-www-form-urlencoded".to_string(),
                    name: name.to_string(),
                    field: Field::of_kind("string"),
                    is_array,
                    is_map,
                    ..Default::default()
                });
                Ok(())
            })
        }
        "FormFile" => builder.value().build(|route, params| {
            let name = params[0].as_value()?;
            route.body.push(BodyParam {
                content_type: "multipart/form-data".to_string(),
                name: name.to_string(),
                field: Field::of_kind("file"),
                ..Default::default()
            });
            Ok(())
        }),
        "GetHeader" => builder.value().build(|route, params| {
            let name = params[0].as_value()?;
            route.request_headers.push(Param {
                name: name.to_string(),
                field: Field::of_kind("string"),
                ..Default::default()
            });
            Ok(())
        }),
        "ShouldBindHeader" | "BindHeader" => builder.expression_result().build(|route, params| {
            let result = params[0].as_resolved()?;
            route.request_headers.push(Param {
                is_bound: true,
                field: Field::from_resolved(result.clone()),
                ..Default::default()
            });
            Ok(())
        }),
        "Header" => builder.value().build(|route, params| {
            let name = params[0].as_value()?;
            route.response_headers.push(Param {
                name: name.to_string(),
                field: Field::of_kind("string"),
                ..Default::default()
            });
            Ok(())
        }),
        _ => Ok(()),
    };

    if let Err(e) = outcome {
        error!("failed to parse {} call: {}", method, e);
    }
}
