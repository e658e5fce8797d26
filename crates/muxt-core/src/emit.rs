//! Handler code emission.
//!
//! [`generate`] prints one self-contained Rust module per templates
//! variable: a receiver trait, a registration function building an
//! `axum::Router`, one handler per route, the `TemplateData` container, the
//! `TemplateRoutePaths` helper, and two small private helpers. Emission is
//! a deterministic pretty-print of the resolved routes — identical inputs
//! produce byte-identical output. Generated code depends only on `axum`,
//! `muxt-templates`, `form_urlencoded` (and `regex` when an input `pattern`
//! survives into validation), never on the generator.

use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use crate::error::MuxtError;
use crate::resolve::{
    ArgBinding, FormField, FormPlan, ResolvedRoute, ResultShape, Validation, ValueParse,
};
use crate::routename::{Method, Route, Segment};

/// Names for the generated items; every field has a flag-controlled
/// override.
#[derive(Debug, Clone)]
pub struct EmitConfig {
    pub routes_fn: String,
    pub receiver_interface: String,
    pub data_type: String,
    pub templates_var: String,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            routes_fn: "routes".into(),
            receiver_interface: "RoutesReceiver".into(),
            data_type: "TemplateData".into(),
            templates_var: crate::DEFAULT_TEMPLATES_VARIABLE.into(),
        }
    }
}

/// Write `contents` to `path` atomically: temp file in the same directory,
/// then rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), MuxtError> {
    let emit_err = |message: String| MuxtError::Emit {
        path: path.to_path_buf(),
        message,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    std::fs::write(&tmp, contents).map_err(|e| emit_err(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        emit_err(e.to_string())
    })?;
    info!(path = %path.display(), bytes = contents.len(), "generated file written");
    Ok(())
}

/// Generate the module source for `routes`.
pub fn generate(routes: &[ResolvedRoute], cfg: &EmitConfig) -> String {
    let mut routes: Vec<&ResolvedRoute> = routes.iter().collect();
    routes.sort_by(|a, b| a.template_name.cmp(&b.template_name));

    let mut w = CodeWriter::new();
    header(&mut w, &routes, cfg);
    receiver_trait(&mut w, &routes, cfg);
    routes_fn(&mut w, &routes, cfg);
    for (i, route) in routes.iter().enumerate() {
        handler_fn(&mut w, route, handler_name(&routes, i), cfg);
    }
    template_data(&mut w, cfg);
    route_paths(&mut w, &routes);
    helpers(&mut w);
    w.finish()
}

/// Handler function name for route `i`, deduplicated across routes that
/// call the same method.
fn handler_name(routes: &[&ResolvedRoute], i: usize) -> String {
    let base = format!("handle_{}", routes[i].helper_name);
    let earlier = routes[..i]
        .iter()
        .filter(|r| r.helper_name == routes[i].helper_name)
        .count();
    if earlier == 0 {
        base
    } else {
        format!("{base}_{}", earlier + 1)
    }
}

// ── sections ──────────────────────────────────────────────────────────────

fn header(w: &mut CodeWriter, routes: &[&ResolvedRoute], cfg: &EmitConfig) {
    w.line("// Code generated by muxt. DO NOT EDIT.");
    w.line("//");
    w.line(&format!(
        "// Routes from the {} templates variable:",
        cfg.templates_var
    ));
    for route in routes {
        w.line(&format!("//   {}", route.template_name));
    }
    w.blank();
    w.line("#![allow(clippy::all)]");
    w.line("#![allow(dead_code, unused_variables, unused_mut)]");
    w.blank();
    w.line("use super::*;");
    w.blank();
    w.line(&format!(
        "pub const MUXT_VERSION: &str = {:?};",
        crate::VERSION
    ));
    w.blank();
}

fn receiver_trait(w: &mut CodeWriter, routes: &[&ResolvedRoute], cfg: &EmitConfig) {
    w.line("/// The methods the routes call, as declared by template names.");
    w.open(&format!("pub trait {}", cfg.receiver_interface));
    let mut seen: Vec<&str> = Vec::new();
    for route in routes {
        let Some(method) = &route.method else { continue };
        if seen.contains(&method.ident.as_str()) {
            continue;
        }
        seen.push(&method.ident);
        let params: Vec<String> = method
            .bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| format!("{}: {}", binding_param_name(binding, i), binding_ty(binding)))
            .collect();
        let output = shape_output(&method.shape);
        w.line(&format!(
            "fn {}(&self, {}){};",
            method.ident,
            params.join(", "),
            output
        ));
    }
    w.close();
    w.blank();
}

fn binding_param_name(binding: &ArgBinding, i: usize) -> String {
    match binding {
        ArgBinding::Ctx => "ctx".into(),
        ArgBinding::Request => "request".into(),
        ArgBinding::Response => "response".into(),
        ArgBinding::Path { name, .. } => name.clone(),
        ArgBinding::Form { .. } => format!("form_{i}"),
    }
}

fn binding_ty(binding: &ArgBinding) -> String {
    match binding {
        ArgBinding::Ctx => "&axum::http::Extensions".into(),
        ArgBinding::Request => "&axum::http::request::Parts".into(),
        ArgBinding::Response => "&mut axum::http::response::Builder".into(),
        ArgBinding::Path { ty_text, .. } | ArgBinding::Form { ty_text, .. } => ty_text.clone(),
    }
}

fn shape_output(shape: &ResultShape) -> String {
    match shape {
        ResultShape::Value { ty } if ty == "()" => String::new(),
        ResultShape::Value { ty } => format!(" -> {ty}"),
        ResultShape::ValueError { ty, err } => match err {
            Some(err) => format!(" -> Result<{ty}, {err}>"),
            None => format!(" -> Result<{ty}>"),
        },
        ResultShape::ValueOk { ty } => format!(" -> ({ty}, bool)"),
        ResultShape::ErrorOnly { err } => match err {
            Some(err) => format!(" -> Result<(), {err}>"),
            None => format!(" -> Result<()>"),
        },
    }
}

fn routes_fn(w: &mut CodeWriter, routes: &[&ResolvedRoute], cfg: &EmitConfig) {
    w.line("/// Register every template route on a fresh router.");
    w.line(&format!(
        "pub fn {}<R>(receiver: R) -> axum::Router",
        cfg.routes_fn
    ));
    w.line("where");
    w.line(&format!(
        "    R: {} + Clone + Send + Sync + 'static,",
        cfg.receiver_interface
    ));
    w.line("{");
    w.indent();
    w.line("let mut router = axum::Router::new();");

    // Group routes by axum path so several methods share one MethodRouter.
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, route) in routes.iter().enumerate() {
        let path = axum_path(&route.route);
        match groups.iter_mut().find(|(p, _)| *p == path) {
            Some((_, members)) => members.push(i),
            None => groups.push((path, vec![i])),
        }
    }

    for (path, members) in &groups {
        w.line(&format!("// {}", members
            .iter()
            .map(|&i| routes[i].template_name.clone())
            .collect::<Vec<_>>()
            .join(" | ")));
        let mut method_router = String::new();
        for (n, &i) in members.iter().enumerate() {
            let route = routes[i];
            let constructor = route
                .route
                .method
                .map_or("any", Method::routing_fn);
            let handler = handler_name(routes, i);
            if n > 0 {
                method_router.push('.');
            } else {
                method_router.push_str("axum::routing::");
            }
            write!(
                method_router,
                "{constructor}({{ let receiver = receiver.clone(); \
                 move |request: axum::extract::Request| {{ \
                 let receiver = receiver.clone(); \
                 async move {{ {handler}(receiver, request).await }} }} }})"
            )
            .unwrap();
        }
        w.line(&format!("router = router.route({path:?}, {method_router});"));
        for sibling in subtree_siblings(&routes[members[0]].route, path) {
            w.line(&format!(
                "router = router.route({sibling:?}, {method_router});"
            ));
        }
    }

    w.line("router");
    w.close();
    w.blank();
}

/// The axum route pattern for a route's path.
fn axum_path(route: &Route) -> String {
    if route.segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in &route.segments {
        out.push('/');
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Placeholder(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Segment::Wildcard(name) => {
                out.push_str("{*");
                out.push_str(name);
                out.push('}');
            }
            // `{$}` means "exactly here", which is axum's default.
            Segment::End => {
                out.pop();
            }
        }
    }
    if route.trailing_slash {
        out.push('/');
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// A bare trailing slash matches the whole subtree; register a wildcard
/// sibling alongside the literal path.
fn subtree_siblings(route: &Route, path: &str) -> Vec<String> {
    if route.trailing_slash && !matches!(route.segments.last(), Some(Segment::End)) {
        vec![format!("{path}{{*muxt_subtree}}")]
    } else {
        Vec::new()
    }
}

fn handler_fn(w: &mut CodeWriter, route: &ResolvedRoute, name: String, cfg: &EmitConfig) {
    let needs_form = route.method.as_ref().is_some_and(|m| {
        m.bindings
            .iter()
            .any(|b| matches!(b, ArgBinding::Form { .. }))
    });
    let needs_path = !route.route.placeholders().is_empty();
    let result_ty = route.result_ty_text();

    w.line(&format!("// {}", route.template_name));
    w.open(&format!(
        "async fn {name}<R: {trait_} + Clone + Send + Sync + 'static>(\
         receiver: R, request: axum::extract::Request) \
         -> axum::http::Response<axum::body::Body>",
        trait_ = cfg.receiver_interface
    ));

    if needs_form {
        w.line("let (mut parts, body) = request.into_parts();");
    } else {
        w.line("let (mut parts, _body) = request.into_parts();");
    }

    if let Some(host) = &route.route.host {
        w.open(&format!(
            "if parts.headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok()) \
             != Some({host:?})"
        ));
        w.line("return muxt_error_response(axum::http::StatusCode::NOT_FOUND);");
        w.close();
    }

    if needs_path {
        w.line(
            "let path_params = match <axum::extract::Path<std::collections::HashMap<String, String>> \
             as axum::extract::FromRequestParts<()>>::from_request_parts(&mut parts, &()).await {",
        );
        w.indent();
        w.line("Ok(axum::extract::Path(params)) => params,");
        w.line("Err(_) => return muxt_error_response(axum::http::StatusCode::BAD_REQUEST),");
        w.dedent();
        w.line("};");
    }

    if let Some(method) = &route.method {
        for binding in &method.bindings {
            if let ArgBinding::Path { name, parse, .. } = binding {
                emit_path_parse(w, name, parse);
            }
        }
    }

    if needs_form {
        w.line("let mut form_pairs: Vec<(String, String)> = Vec::new();");
        w.open("if let Some(query) = parts.uri.query()");
        w.line("form_pairs.extend(form_urlencoded::parse(query.as_bytes()).into_owned());");
        w.close();
        w.open("match axum::body::to_bytes(body, 1 << 20).await");
        w.line("Ok(bytes) => form_pairs.extend(form_urlencoded::parse(&bytes).into_owned()),");
        w.line("Err(_) => return muxt_error_response(axum::http::StatusCode::BAD_REQUEST),");
        w.close();
        if let Some(method) = &route.method {
            for (i, binding) in method.bindings.iter().enumerate() {
                if let ArgBinding::Form { plan, .. } = binding {
                    emit_form_decode(w, plan, i);
                }
            }
        }
    }

    let uses_response_builder = route
        .method
        .as_ref()
        .is_some_and(|m| m.bindings.iter().any(|b| matches!(b, ArgBinding::Response)));
    w.line("let mut response_builder = axum::http::Response::builder();");
    if !uses_response_builder {
        w.line("let _ = &response_builder;");
    }

    w.line(&format!(
        "let mut status: u16 = {};",
        route.route.default_status()
    ));
    w.line("let mut err_list: Vec<String> = Vec::new();");

    match &route.method {
        None => {
            w.line(&format!("let result_value: Option<{result_ty}> = Some(());"));
        }
        Some(method) => emit_call(w, route, method, result_ty),
    }

    // Render and respond.
    w.line(&format!(
        "let data = {data}::new(receiver, result_value, err_list, &parts);",
        data = cfg.data_type
    ));
    w.line("let value = muxt_templates::Value::object(data.clone());");
    w.line("let mut body_out = String::new();");
    w.open(&format!(
        "if let Err(_render_error) = super::{var}.execute({name:?}, &value, &mut body_out)",
        var = cfg.templates_var,
        name = route.template_name
    ));
    w.line("return muxt_error_response(axum::http::StatusCode::INTERNAL_SERVER_ERROR);");
    w.close();

    w.line("let state = data.take_state();");
    w.open("if state.status_code != 0");
    w.line("status = state.status_code;");
    w.close();
    w.open("if let Some(url) = state.redirect_url");
    w.line("let redirect_status = if status >= 300 && status < 400 { status } else { 302 };");
    w.line("return response_builder");
    w.indent();
    w.line(".status(redirect_status)");
    w.line(".header(axum::http::header::LOCATION, url)");
    w.line(".body(axum::body::Body::empty())");
    w.line(".unwrap_or_default();");
    w.dedent();
    w.close();

    w.line("let mut response_builder = response_builder");
    w.indent();
    w.line(".status(status)");
    w.line(
        ".header(axum::http::header::CONTENT_TYPE, \"text/html; charset=utf-8\");",
    );
    w.dedent();
    w.open("for (name, value) in state.headers");
    w.line("response_builder = response_builder.header(name, value);");
    w.close();
    w.line("response_builder");
    w.indent();
    w.line(".body(axum::body::Body::from(body_out))");
    w.line(".unwrap_or_else(|_| muxt_error_response(axum::http::StatusCode::INTERNAL_SERVER_ERROR))");
    w.dedent();
    w.close();
    w.blank();
}

const PRIMITIVES: &[&str] = &[
    "bool", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
    "usize", "f32", "f64", "String",
];

fn emit_path_parse(w: &mut CodeWriter, name: &str, parse: &ValueParse) {
    w.line(&format!(
        "let raw_{name} = path_params.get({name:?}).map(String::as_str).unwrap_or(\"\");"
    ));
    match parse {
        ValueParse::Str => w.line(&format!("let {name}: String = raw_{name}.to_string();")),
        ValueParse::StrRef => w.line(&format!("let {name}: &str = raw_{name};")),
        ValueParse::Parse(ty) => {
            w.open(&format!(
                "let {name}: {ty} = match raw_{name}.parse::<{ty}>()"
            ));
            w.line("Ok(value) => value,");
            w.line("Err(_) => return muxt_error_response(axum::http::StatusCode::BAD_REQUEST),");
            w.close_semi();
        }
    }
}

fn emit_form_decode(w: &mut CodeWriter, plan: &FormPlan, index: usize) {
    match plan {
        FormPlan::Scalar(field) => {
            emit_form_field(w, field);
            w.line(&format!(
                "let form_{index} = {};",
                field_final_expr(field)
            ));
        }
        FormPlan::Struct { ty_ident, fields } => {
            for field in fields {
                emit_form_field(w, field);
            }
            w.open(&format!("let form_{index} = {ty_ident}"));
            for field in fields {
                w.line(&format!("{}: {},", field.ident, field_final_expr(field)));
            }
            w.close_semi();
        }
    }
}

/// Declare an accumulator for one field and fill it from the decoded pairs,
/// enforcing validations from the matching `<input>`.
fn emit_form_field(w: &mut CodeWriter, field: &FormField) {
    let slot = format!("field_{}", field.ident);
    let elem_ty = match &field.parse {
        ValueParse::Parse(ty) => ty.clone(),
        _ => "String".to_string(),
    };
    if field.is_vec {
        w.line(&format!("let mut {slot}: Vec<{elem_ty}> = Vec::new();"));
    } else {
        w.line(&format!("let mut {slot}: Option<{elem_ty}> = None;"));
    }
    w.open("for (key, value) in &form_pairs");
    w.open(&format!("if key == {:?}", field.key));
    for validation in &field.validations {
        match validation {
            Validation::MinLength(n) => {
                w.open(&format!("if value.chars().count() < {n}"));
                w.line("return muxt_error_response(axum::http::StatusCode::BAD_REQUEST);");
                w.close();
            }
            Validation::MaxLength(n) => {
                w.open(&format!("if value.chars().count() > {n}"));
                w.line("return muxt_error_response(axum::http::StatusCode::BAD_REQUEST);");
                w.close();
            }
            Validation::Pattern(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                w.open(&format!(
                    "if !regex::Regex::new({anchored:?}).map(|re| re.is_match(value)).unwrap_or(false)"
                ));
                w.line("return muxt_error_response(axum::http::StatusCode::BAD_REQUEST);");
                w.close();
            }
            // Numeric bounds apply after parsing.
            Validation::Min(_) | Validation::Max(_) => {}
        }
    }
    let parsed = match &field.parse {
        ValueParse::Parse(ty) => {
            w.open(&format!("let parsed: {ty} = match value.parse::<{ty}>()"));
            w.line("Ok(value) => value,");
            w.line("Err(_) => return muxt_error_response(axum::http::StatusCode::BAD_REQUEST),");
            w.close_semi();
            "parsed".to_string()
        }
        _ => "value.clone()".to_string(),
    };
    for validation in &field.validations {
        match validation {
            Validation::Min(n) => {
                w.open(&format!("if parsed < {n}"));
                w.line("return muxt_error_response(axum::http::StatusCode::BAD_REQUEST);");
                w.close();
            }
            Validation::Max(n) => {
                w.open(&format!("if parsed > {n}"));
                w.line("return muxt_error_response(axum::http::StatusCode::BAD_REQUEST);");
                w.close();
            }
            _ => {}
        }
    }
    if field.is_vec {
        w.line(&format!("{slot}.push({parsed});"));
    } else {
        w.line(&format!("{slot} = Some({parsed});"));
    }
    w.close();
    w.close();
}

fn field_final_expr(field: &FormField) -> String {
    let slot = format!("field_{}", field.ident);
    if field.is_vec {
        return slot;
    }
    let primitive = match &field.parse {
        ValueParse::Parse(ty) => PRIMITIVES.contains(&ty.as_str()),
        _ => true,
    };
    if primitive {
        format!("{slot}.unwrap_or_default()")
    } else {
        format!(
            "match {slot} {{ Some(value) => value, None => \
             return muxt_error_response(axum::http::StatusCode::BAD_REQUEST) }}"
        )
    }
}

fn emit_call(
    w: &mut CodeWriter,
    route: &ResolvedRoute,
    method: &crate::resolve::BoundMethod,
    result_ty: &str,
) {
    let args: Vec<String> = method
        .bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| match binding {
            ArgBinding::Ctx => "&parts.extensions".to_string(),
            ArgBinding::Request => "&parts".to_string(),
            ArgBinding::Response => "&mut response_builder".to_string(),
            // `&str` locals are already references; other `&T` parameters
            // borrow the parsed local.
            ArgBinding::Path { name, ty_text, parse, .. } => {
                if ty_text.starts_with('&') && *parse != ValueParse::StrRef {
                    format!("&{name}")
                } else {
                    name.clone()
                }
            }
            ArgBinding::Form { ty_text, .. } => {
                if ty_text.starts_with('&') {
                    format!("&form_{i}")
                } else {
                    format!("form_{i}")
                }
            }
        })
        .collect();
    let call = format!("receiver.{}({})", method.ident, args.join(", "));
    let declared_status = route.route.status.is_some();

    match &method.shape {
        ResultShape::Value { ty } if ty == "()" => {
            w.line(&format!("{call};"));
            w.line("let result_value: Option<()> = Some(());");
        }
        ResultShape::Value { .. } => {
            w.line(&format!("let value = {call};"));
            if !declared_status {
                emit_result_status_probe(w, &method.status, "value");
            }
            w.line(&format!("let result_value: Option<{result_ty}> = Some(value);"));
        }
        ResultShape::ValueError { .. } => {
            w.open(&format!(
                "let result_value: Option<{result_ty}> = match {call}"
            ));
            w.open("Ok(value) =>");
            if !declared_status {
                emit_result_status_probe(w, &method.status, "value");
            }
            w.line("Some(value)");
            w.close();
            w.open("Err(err) =>");
            emit_error_status(w, &method.status);
            w.line("err_list.push(err.to_string());");
            w.line("None");
            w.close();
            w.close_semi();
        }
        ResultShape::ValueOk { .. } => {
            w.line(&format!("let (value, ok) = {call};"));
            w.open(&format!("let result_value: Option<{result_ty}> = if ok"));
            if !declared_status {
                emit_result_status_probe(w, &method.status, "value");
            }
            w.line("Some(value)");
            w.close_open("else");
            w.line("status = 500;");
            w.line("None");
            w.close_semi();
        }
        ResultShape::ErrorOnly { .. } => {
            w.open(&format!(
                "let result_value: Option<{result_ty}> = match {call}"
            ));
            w.line("Ok(()) => Some(()),");
            w.open("Err(err) =>");
            emit_error_status(w, &method.status);
            w.line("err_list.push(err.to_string());");
            w.line("None");
            w.close();
            w.close_semi();
        }
    }
}

fn emit_result_status_probe(
    w: &mut CodeWriter,
    probe: &crate::resolve::StatusProbe,
    value: &str,
) {
    if probe.result_method {
        w.line(&format!("status = {value}.status_code() as u16;"));
    } else if probe.result_field {
        w.line(&format!("status = {value}.status_code as u16;"));
    }
}

fn emit_error_status(w: &mut CodeWriter, probe: &crate::resolve::StatusProbe) {
    if probe.error_method {
        w.line("status = err.status_code() as u16;");
    } else {
        w.line("status = 500;");
    }
}

fn template_data(w: &mut CodeWriter, cfg: &EmitConfig) {
    let data = &cfg.data_type;
    let code = format!(
        r#"/// What the route's template sees: the request, and one member per
/// template-visible name (`Result`, `Err`, `Request`, …).
pub struct {data}<R, T> {{
    inner: std::sync::Arc<{data}Inner<R, T>>,
}}

struct {data}Inner<R, T> {{
    receiver: R,
    result: Option<T>,
    err_list: Vec<String>,
    request: {data}Request,
    state: std::sync::Mutex<{data}State>,
}}

/// The request head exposed to templates.
pub struct {data}Request {{
    pub method: String,
    pub path: String,
    pub host: String,
}}

#[derive(Clone, Default)]
pub struct {data}State {{
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub redirect_url: Option<String>,
}}

impl<R, T> Clone for {data}<R, T> {{
    fn clone(&self) -> Self {{
        Self {{ inner: self.inner.clone() }}
    }}
}}

impl<R, T> std::fmt::Debug for {data}<R, T> {{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {{
        f.write_str("{data}")
    }}
}}

impl<R, T> {data}<R, T> {{
    fn new(
        receiver: R,
        result: Option<T>,
        err_list: Vec<String>,
        parts: &axum::http::request::Parts,
    ) -> Self {{
        let request = {data}Request {{
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            host: parts
                .headers
                .get(axum::http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
        }};
        Self {{
            inner: std::sync::Arc::new({data}Inner {{
                receiver,
                result,
                err_list,
                request,
                state: std::sync::Mutex::new({data}State::default()),
            }}),
        }}
    }}

    pub fn result(&self) -> Option<&T> {{
        self.inner.result.as_ref()
    }}

    pub fn err(&self) -> Option<&str> {{
        self.inner.err_list.first().map(String::as_str)
    }}

    pub fn request(&self) -> &{data}Request {{
        &self.inner.request
    }}

    pub fn status_code(&self, code: u16) -> &Self {{
        if let Ok(mut state) = self.inner.state.lock() {{
            state.status_code = code;
        }}
        self
    }}

    pub fn header(&self, name: &str, value: &str) -> &Self {{
        if let Ok(mut state) = self.inner.state.lock() {{
            state.headers.push((name.to_string(), value.to_string()));
        }}
        self
    }}

    pub fn redirect(&self, url: &str, code: u16) -> &Self {{
        if let Ok(mut state) = self.inner.state.lock() {{
            state.redirect_url = Some(url.to_string());
            state.status_code = code;
        }}
        self
    }}

    pub fn path(&self) -> TemplateRoutePaths {{
        TemplateRoutePaths
    }}

    pub fn muxt_version(&self) -> &'static str {{
        MUXT_VERSION
    }}

    fn take_state(&self) -> {data}State {{
        self.inner
            .state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }}
}}

impl<R, T> muxt_templates::Object for {data}<R, T>
where
    R: Send + Sync + 'static,
    T: serde::Serialize + Send + Sync + 'static,
{{
    fn get(&self, name: &str) -> Option<muxt_templates::Value> {{
        match name {{
            "Result" => Some(match self.inner.result.as_ref() {{
                Some(value) => muxt_templates::Value::from_serialize(value),
                None => muxt_templates::Value::Null,
            }}),
            "Err" => Some(match self.inner.err_list.first() {{
                Some(message) => muxt_templates::Value::object(
                    muxt_templates::ErrorValue(message.clone()),
                ),
                None => muxt_templates::Value::Null,
            }}),
            "Request" => Some(muxt_templates::Value::Map(
                [
                    ("Method".to_string(), muxt_templates::Value::from(self.inner.request.method.clone())),
                    ("Path".to_string(), muxt_templates::Value::from(self.inner.request.path.clone())),
                    ("Host".to_string(), muxt_templates::Value::from(self.inner.request.host.clone())),
                ]
                .into(),
            )),
            "Response" => Some(muxt_templates::Value::Null),
            "Path" => Some(muxt_templates::Value::object(TemplateRoutePaths)),
            "MuxtVersion" => Some(muxt_templates::Value::from(MUXT_VERSION)),
            _ => None,
        }}
    }}

    fn call(&self, name: &str, args: &[muxt_templates::Value]) -> Result<muxt_templates::Value, String> {{
        match (name, args) {{
            ("StatusCode", [muxt_templates::Value::Int(code)]) => {{
                self.status_code(*code as u16);
                Ok(muxt_templates::Value::object(self.clone()))
            }}
            ("Header", [muxt_templates::Value::String(header_name), muxt_templates::Value::String(header_value)]) => {{
                self.header(header_name, header_value);
                Ok(muxt_templates::Value::object(self.clone()))
            }}
            ("Redirect", [muxt_templates::Value::String(url), muxt_templates::Value::Int(code)]) => {{
                self.redirect(url, *code as u16);
                Ok(muxt_templates::Value::object(self.clone()))
            }}
            _ => Err(format!("{{name}} is not a method")),
        }}
    }}
}}
"#
    );
    w.raw(&code);
    w.blank();
}

fn route_paths(w: &mut CodeWriter, routes: &[&ResolvedRoute]) {
    w.line("/// Typed formatters for every placeholder-bearing route path.");
    w.line("#[derive(Debug, Clone, Copy)]");
    w.line("pub struct TemplateRoutePaths;");
    w.blank();

    let helper_routes: Vec<&ResolvedRoute> = routes
        .iter()
        .copied()
        .filter(|r| !r.route.placeholders().is_empty())
        .collect();

    w.open("impl TemplateRoutePaths");
    for route in &helper_routes {
        let params = helper_params(route);
        let signature: Vec<String> = params
            .iter()
            .map(|(name, ty)| format!("{name}: {ty}"))
            .collect();
        w.line(&format!("/// `{}`", route.route.path()));
        w.open(&format!(
            "pub fn {}(&self, {}) -> String",
            route.helper_name,
            signature.join(", ")
        ));
        w.line("let mut out = String::new();");
        for segment in &route.route.segments {
            match segment {
                Segment::Literal(s) => {
                    w.line(&format!("out.push_str({:?});", format!("/{s}")));
                }
                Segment::Placeholder(name) => {
                    w.line("out.push('/');");
                    w.line(&format!(
                        "out.push_str(&muxt_path_escape(&{name}.to_string()));"
                    ));
                }
                Segment::Wildcard(name) => {
                    w.line("out.push('/');");
                    w.line(&format!(
                        "out.push_str(&muxt_wildcard_escape(&{name}.to_string()));"
                    ));
                }
                Segment::End => {}
            }
        }
        if route.route.trailing_slash {
            w.line("out.push('/');");
        }
        w.line("out");
        w.close();
    }
    w.close();
    w.blank();

    // Name-based dispatch so templates can call `.Path.helper args…`.
    w.open("impl muxt_templates::Object for TemplateRoutePaths");
    w.open("fn get(&self, _name: &str) -> Option<muxt_templates::Value>");
    w.line("None");
    w.close();
    w.open(
        "fn call(&self, name: &str, args: &[muxt_templates::Value]) -> Result<muxt_templates::Value, String>",
    );
    w.open("match name");
    for route in &helper_routes {
        let params = helper_params(route);
        w.open(&format!("{:?} =>", route.helper_name));
        w.open(&format!("if args.len() != {}", params.len()));
        w.line(&format!(
            "return Err(format!(\"{} takes {} arguments, got {{}}\", args.len()));",
            route.helper_name,
            params.len()
        ));
        w.close();
        w.line("let mut out = String::new();");
        let mut arg_index = 0usize;
        for segment in &route.route.segments {
            match segment {
                Segment::Literal(s) => {
                    w.line(&format!("out.push_str({:?});", format!("/{s}")));
                }
                Segment::Placeholder(_) => {
                    w.line("out.push('/');");
                    w.line(&format!(
                        "out.push_str(&muxt_path_escape(&args[{arg_index}].to_string()));"
                    ));
                    arg_index += 1;
                }
                Segment::Wildcard(_) => {
                    w.line("out.push('/');");
                    w.line(&format!(
                        "out.push_str(&muxt_wildcard_escape(&args[{arg_index}].to_string()));"
                    ));
                    arg_index += 1;
                }
                Segment::End => {}
            }
        }
        if route.route.trailing_slash {
            w.line("out.push('/');");
        }
        w.line("Ok(muxt_templates::Value::from(out))");
        w.close();
    }
    w.line("_ => Err(format!(\"{name} is not a path helper\")),");
    w.close();
    w.close();
    w.close();
    w.blank();
}

/// `(parameter name, parameter type)` per placeholder, in path order.
fn helper_params(route: &ResolvedRoute) -> Vec<(String, String)> {
    route
        .route
        .placeholders()
        .iter()
        .map(|(name, _)| {
            let ty = route
                .method
                .as_ref()
                .and_then(|m| {
                    m.bindings.iter().find_map(|b| match b {
                        ArgBinding::Path {
                            name: bound,
                            ty_text,
                            ..
                        } if bound == name => Some(ty_text.clone()),
                        _ => None,
                    })
                })
                .unwrap_or_else(|| "String".to_string());
            // Helpers take references for owned strings.
            let ty = if ty == "String" { "&str".to_string() } else { ty };
            (name.to_string(), ty)
        })
        .collect()
}

fn helpers(w: &mut CodeWriter) {
    w.raw(
        r#"/// Percent-encode one path segment.
fn muxt_path_escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Percent-encode a wildcard value, keeping its slashes.
fn muxt_wildcard_escape(rest: &str) -> String {
    rest.split('/')
        .map(muxt_path_escape)
        .collect::<Vec<_>>()
        .join("/")
}

fn muxt_error_response(status: axum::http::StatusCode) -> axum::http::Response<axum::body::Body> {
    axum::http::Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(axum::body::Body::from(
            status.canonical_reason().unwrap_or("error").to_string(),
        ))
        .unwrap_or_default()
}
"#,
    );
}

// ── code writer ───────────────────────────────────────────────────────────

/// Indentation-aware line printer for generated source.
struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write raw pre-formatted code at column zero.
    fn raw(&mut self, code: &str) {
        self.out.push_str(code);
    }

    /// `header {` and indent.
    fn open(&mut self, header: &str) {
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{header} {{"));
        }
        self.depth += 1;
    }

    /// `}` and dedent.
    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// `};` and dedent.
    fn close_semi(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("};");
    }

    /// `} header {` — else branches.
    fn close_open(&mut self, header: &str) {
        self.depth = self.depth.saturating_sub(1);
        if header.is_empty() {
            self.line("} {");
        } else {
            self.line(&format!("}} {header} {{"));
        }
        self.depth += 1;
    }

    fn indent(&mut self) {
        self.depth += 1;
    }

    fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::evaluate;
    use crate::resolve::bind_routes;
    use crate::source::Package;

    fn write_package(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    const APP: &str = r#"
use muxt_templates as template;

pub struct App;

pub struct User { pub name: String }

pub struct AppError { pub message: String }

impl AppError {
    pub fn status_code(&self) -> u16 { 404 }
}

impl App {
    pub fn get_user(&self, ctx: &http::Extensions, id: i64) -> Result<User, AppError> {
        let _ = (ctx, id);
        Err(AppError { message: "nope".into() })
    }
}

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("GET /user/{id} get_user(ctx, id)")
            .parse("{{if .Err}}{{.Err.Error}}{{else}}{{.Result.name}}{{end}}")
            .new_root("GET /")
            .parse("<h1>home</h1>"),
    )
});
"#;

    fn generated() -> String {
        let dir = write_package(&[("lib.rs", APP)]);
        let package = Package::load(dir.path()).unwrap();
        let index = package.type_index();
        let env = evaluate(&package, &index, "TEMPLATES").unwrap();
        let binding = bind_routes(&env, &index, Some("App"));
        assert!(binding.errors.is_empty(), "{:?}", binding.errors);
        generate(&binding.routes, &EmitConfig::default())
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(generated(), generated());
    }

    #[test]
    fn header_and_banner() {
        let out = generated();
        assert!(out.starts_with("// Code generated by muxt. DO NOT EDIT."));
        assert!(out.contains("//   GET /user/{id} get_user(ctx, id)"));
        assert!(out.contains("use super::*;"));
    }

    #[test]
    fn receiver_trait_lists_called_methods() {
        let out = generated();
        assert!(out.contains("pub trait RoutesReceiver {"));
        assert!(out.contains(
            "fn get_user(&self, ctx: &axum::http::Extensions, id: i64) -> Result<User, AppError>;"
        ), "{out}");
    }

    #[test]
    fn routes_register_axum_patterns() {
        let out = generated();
        assert!(out.contains(r#"router.route("/user/{id}", axum::routing::get("#));
        assert!(out.contains(r#"router.route("/", axum::routing::get("#));
    }

    #[test]
    fn handler_parses_placeholder_and_maps_failure_to_400() {
        let out = generated();
        assert!(out.contains("raw_id.parse::<i64>()"));
        assert!(out.contains("axum::http::StatusCode::BAD_REQUEST"));
    }

    #[test]
    fn error_status_uses_probe() {
        let out = generated();
        assert!(out.contains("status = err.status_code() as u16;"));
    }

    #[test]
    fn executes_template_by_name() {
        let out = generated();
        assert!(out.contains(
            r#"super::TEMPLATES.execute("GET /user/{id} get_user(ctx, id)", &value, &mut body_out)"#
        ));
    }

    #[test]
    fn path_helper_formats_typed_arguments() {
        let out = generated();
        assert!(out.contains("pub fn get_user(&self, id: i64) -> String"));
        assert!(out.contains("muxt_path_escape(&id.to_string())"));
    }

    #[test]
    fn emitted_code_never_mentions_the_generator_crates() {
        let out = generated();
        assert!(!out.contains("muxt_core"));
        assert!(!out.contains("muxt_cli"));
    }

    #[test]
    fn custom_names_flow_through() {
        let dir = write_package(&[("lib.rs", APP)]);
        let package = Package::load(dir.path()).unwrap();
        let index = package.type_index();
        let env = evaluate(&package, &index, "TEMPLATES").unwrap();
        let binding = bind_routes(&env, &index, Some("App"));
        let cfg = EmitConfig {
            routes_fn: "register".into(),
            receiver_interface: "Server".into(),
            data_type: "ViewData".into(),
            templates_var: "TEMPLATES".into(),
        };
        let out = generate(&binding.routes, &cfg);
        assert!(out.contains("pub fn register<R>(receiver: R) -> axum::Router"));
        assert!(out.contains("pub trait Server {"));
        assert!(out.contains("pub struct ViewData<R, T>"));
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.rs");
        write_atomic(&path, "one").unwrap();
        write_atomic(&path, "two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        // No temp droppings left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
