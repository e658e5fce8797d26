//! Route resolution: unify each route's call argument list against the
//! receiver's method signatures.
//!
//! Arguments bind positionally. The identifier decides the source of the
//! value — a reserved name (`ctx`, `request`, `response`, `form`), a path
//! placeholder, or a form field — and the method parameter's type decides
//! how the request-time text is parsed. The result is a plan the emitter
//! turns into handler code without consulting the receiver again.

use std::collections::BTreeMap;

use quote::ToTokens;
use thiserror::Error;
use tracing::debug;

use crate::check::TypeRef;
use crate::environment::Environment;
use crate::error::MuxtError;
use crate::routename::{self, Route};
use crate::source::{TypeIndex, first_type_argument, peel_type, type_ident};

#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("route {route:?}: no receiver type configured but the route calls {method}")]
    NoReceiver { route: String, method: String },

    #[error("route {route:?}: receiver {receiver} has no method {method}")]
    NoSuchMethod {
        route: String,
        receiver: String,
        method: String,
    },

    #[error("route {route:?}: {method} takes {want} parameters but the call passes {got}")]
    ArityMismatch {
        route: String,
        method: String,
        want: usize,
        got: usize,
    },

    #[error(
        "route {route:?}: reserved argument {arg:?} requires parameter type {want}, found {found}"
    )]
    ReservedTypeMismatch {
        route: String,
        arg: String,
        want: String,
        found: String,
    },

    #[error("route {route:?}: path parameter {arg:?} has unparseable type {found}")]
    UnparseablePlaceholder {
        route: String,
        arg: String,
        found: String,
    },

    #[error("route {route:?}: form binding {arg:?} has unsupported type {found}")]
    UnsupportedForm {
        route: String,
        arg: String,
        found: String,
    },

    #[error("route {route:?}: return type {found} is not a supported handler shape")]
    UnsupportedReturnShape { route: String, found: String },

    #[error("conflicting routes {a:?} and {b:?} match the same requests")]
    DuplicateRoute { a: String, b: String },

    #[error(
        "routes {a:?} and {b:?} use different placeholder names for the same path; \
         the router needs one spelling per path"
    )]
    PlaceholderNameMismatch { a: String, b: String },
}

/// How a request-time string becomes a method argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueParse {
    /// Owned `String`, moved in.
    Str,
    /// `&str`, borrowed from the decoded value.
    StrRef,
    /// `text.parse::<T>()`; holds the type's source spelling.
    Parse(String),
}

/// Request-time constraints copied from the route template's `<input>` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    MinLength(u64),
    MaxLength(u64),
    Min(i64),
    Max(i64),
    Pattern(String),
}

/// One decoded form value.
#[derive(Debug, Clone)]
pub struct FormField {
    /// Struct field identifier (or the call-argument name for scalars).
    pub ident: String,
    /// Form key: serde rename when present, identifier otherwise.
    pub key: String,
    pub ty_text: String,
    /// `Vec<T>` fields collect every repeated value.
    pub is_vec: bool,
    pub parse: ValueParse,
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone)]
pub enum FormPlan {
    /// Decode every named field of a struct.
    Struct {
        ty_ident: String,
        fields: Vec<FormField>,
    },
    /// Decode one field keyed by the call-argument name.
    Scalar(FormField),
}

/// One bound method argument, in call order.
#[derive(Debug, Clone)]
pub enum ArgBinding {
    /// `ctx` — the request's extensions.
    Ctx,
    /// `request` — the request head.
    Request,
    /// `response` — the response builder.
    Response,
    /// A `{placeholder}` from the path.
    Path {
        name: String,
        wildcard: bool,
        ty_text: String,
        parse: ValueParse,
    },
    /// A form-decoded value.
    Form { ty_text: String, plan: FormPlan },
}

/// What the method returns and how the handler consumes it.
#[derive(Debug, Clone)]
pub enum ResultShape {
    /// `T`
    Value { ty: String },
    /// `Result<T, E>`
    ValueError { ty: String, err: Option<String> },
    /// `(T, bool)`
    ValueOk { ty: String },
    /// `Result<(), E>`
    ErrorOnly { err: Option<String> },
}

impl ResultShape {
    /// The template-data result type's source text (`"()"` when none).
    pub fn result_ty(&self) -> &str {
        match self {
            ResultShape::Value { ty }
            | ResultShape::ValueError { ty, .. }
            | ResultShape::ValueOk { ty } => ty,
            ResultShape::ErrorOnly { .. } => "()",
        }
    }
}

/// Where a non-default status code can come from at request time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusProbe {
    /// Result type has a zero-argument `status_code` method.
    pub result_method: bool,
    /// Result type has an integer `status_code` field.
    pub result_field: bool,
    /// Error type has a zero-argument `status_code` method.
    pub error_method: bool,
}

#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub ident: String,
    pub bindings: Vec<ArgBinding>,
    pub shape: ResultShape,
    pub status: StatusProbe,
}

/// One route, fully planned.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub template_name: String,
    pub route: Route,
    pub method: Option<BoundMethod>,
    /// The dot type the route's template is checked (and rendered) under.
    pub data_type: TypeRef,
    /// Name of the generated path-helper method.
    pub helper_name: String,
}

impl ResolvedRoute {
    pub fn result_ty_text(&self) -> &str {
        self.method
            .as_ref()
            .map_or("()", |method| method.shape.result_ty())
    }
}

/// The outcome of binding every route template: plans for the good ones,
/// collected diagnostics for the rest.
pub struct Binding {
    pub routes: Vec<ResolvedRoute>,
    pub errors: Vec<MuxtError>,
}

/// Bind every route-shaped template name in the environment.
///
/// Route-level failures are collected, not fatal: the remaining routes
/// still resolve so one bad name doesn't hide every other diagnostic.
pub fn bind_routes(env: &Environment, index: &TypeIndex, receiver: Option<&str>) -> Binding {
    let mut routes = Vec::new();
    let mut errors: Vec<MuxtError> = Vec::new();
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut path_spellings: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();

    for (name, tree) in env.set.trees() {
        if !Route::is_route_name(name) {
            continue;
        }
        let route = match routename::parse(name) {
            Ok(route) => route,
            Err(err) => {
                errors.push(err.into());
                continue;
            }
        };

        let key = route.canonical_key();
        if let Some(existing) = seen.get(&key) {
            errors.push(
                ResolveError::DuplicateRoute {
                    a: existing.clone(),
                    b: name.to_string(),
                }
                .into(),
            );
            continue;
        }
        seen.insert(key.clone(), name.to_string());

        // Different methods may share a path, but the router registers one
        // pattern per path, so placeholder spellings must agree.
        let path_key = key.splitn(2, ' ').nth(1).unwrap_or_default().to_string();
        let names: Vec<String> = route
            .placeholders()
            .iter()
            .map(|(n, _)| n.to_string())
            .collect();
        match path_spellings.get(&path_key) {
            Some((existing, existing_names)) if *existing_names != names => {
                errors.push(
                    ResolveError::PlaceholderNameMismatch {
                        a: existing.clone(),
                        b: name.to_string(),
                    }
                    .into(),
                );
                continue;
            }
            Some(_) => {}
            None => {
                path_spellings.insert(path_key, (name.to_string(), names));
            }
        }

        match bind_one(name, route, tree.to_string(), index, receiver) {
            Ok(resolved) => routes.push(resolved),
            Err(err) => errors.push(err.into()),
        }
    }
    debug!(routes = routes.len(), errors = errors.len(), "routes bound");
    Binding { routes, errors }
}

fn bind_one(
    name: &str,
    route: Route,
    template_text: String,
    index: &TypeIndex,
    receiver: Option<&str>,
) -> Result<ResolvedRoute, ResolveError> {
    let Some(call) = route.call.clone() else {
        // Static render: empty data under the declared status.
        let helper_name = derived_helper_name(&route);
        return Ok(ResolvedRoute {
            template_name: name.to_string(),
            route,
            method: None,
            data_type: TypeRef::TemplateData(Box::new(TypeRef::Unit)),
            helper_name,
        });
    };

    let receiver = receiver.ok_or_else(|| ResolveError::NoReceiver {
        route: name.to_string(),
        method: call.ident.clone(),
    })?;
    let method = index
        .method(receiver, &call.ident)
        .ok_or_else(|| ResolveError::NoSuchMethod {
            route: name.to_string(),
            receiver: receiver.to_string(),
            method: call.ident.clone(),
        })?;
    if method.params.len() != call.args.len() {
        return Err(ResolveError::ArityMismatch {
            route: name.to_string(),
            method: call.ident.clone(),
            want: method.params.len(),
            got: call.args.len(),
        });
    }

    let placeholders = route.placeholders();
    let mut bindings = Vec::with_capacity(call.args.len());
    for (arg, (_, param_ty)) in call.args.iter().zip(&method.params) {
        let binding = match arg.as_str() {
            "ctx" => reserved(name, arg, param_ty, "Extensions", ArgBinding::Ctx)?,
            "request" => reserved(name, arg, param_ty, "Parts", ArgBinding::Request)?,
            "response" => reserved(name, arg, param_ty, "Builder", ArgBinding::Response)?,
            "form" => ArgBinding::Form {
                ty_text: type_text(param_ty),
                plan: form_plan(name, arg, param_ty, index, &template_text)?,
            },
            other => match placeholders.iter().find(|(n, _)| *n == other) {
                Some((_, wildcard)) => ArgBinding::Path {
                    name: other.to_string(),
                    wildcard: *wildcard,
                    ty_text: type_text(param_ty),
                    parse: classify_parse(param_ty, index).ok_or_else(|| {
                        ResolveError::UnparseablePlaceholder {
                            route: name.to_string(),
                            arg: other.to_string(),
                            found: type_text(param_ty),
                        }
                    })?,
                },
                None => ArgBinding::Form {
                    ty_text: type_text(param_ty),
                    plan: form_plan(name, arg, param_ty, index, &template_text)?,
                },
            },
        };
        bindings.push(binding);
    }

    let shape = result_shape(name, method.output.as_ref())?;
    let status = status_probe(&shape, index);
    let result_ty: Option<syn::Type> = match shape.result_ty() {
        "()" => None,
        text => syn::parse_str(text).ok(),
    };
    let data_type = TypeRef::TemplateData(Box::new(
        result_ty
            .as_ref()
            .map_or(TypeRef::Unit, |ty| TypeRef::from_syn(ty, index)),
    ));

    Ok(ResolvedRoute {
        template_name: name.to_string(),
        route,
        method: Some(BoundMethod {
            ident: call.ident,
            bindings,
            shape,
            status,
        }),
        data_type,
        helper_name: call_helper_name(name),
    })
}

fn reserved(
    route: &str,
    arg: &str,
    param_ty: &syn::Type,
    want_ident: &str,
    binding: ArgBinding,
) -> Result<ArgBinding, ResolveError> {
    if type_ident(param_ty).as_deref() == Some(want_ident) {
        Ok(binding)
    } else {
        Err(ResolveError::ReservedTypeMismatch {
            route: route.to_string(),
            arg: arg.to_string(),
            want: want_ident.to_string(),
            found: type_text(param_ty),
        })
    }
}

/// Classify a type as placeholder-parseable.
fn classify_parse(ty: &syn::Type, index: &TypeIndex) -> Option<ValueParse> {
    let peeled = peel_type(ty);
    if let syn::Type::Reference(_) = ty {
        if type_ident(ty).as_deref() == Some("str") {
            return Some(ValueParse::StrRef);
        }
    }
    let ident = type_ident(peeled)?;
    match ident.as_str() {
        "String" => Some(ValueParse::Str),
        "str" => Some(ValueParse::StrRef),
        "bool" | "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
        | "u64" | "u128" | "usize" | "f32" | "f64" => Some(ValueParse::Parse(type_text(peeled))),
        other if index.has_trait(other, "FromStr") => Some(ValueParse::Parse(type_text(peeled))),
        _ => None,
    }
}

fn form_plan(
    route: &str,
    arg: &str,
    param_ty: &syn::Type,
    index: &TypeIndex,
    template_text: &str,
) -> Result<FormPlan, ResolveError> {
    let unsupported = || ResolveError::UnsupportedForm {
        route: route.to_string(),
        arg: arg.to_string(),
        found: type_text(param_ty),
    };
    let peeled = peel_type(param_ty);
    let ident = type_ident(peeled).ok_or_else(unsupported)?;

    if let Some(info) = index.struct_info(&ident) {
        let mut fields = Vec::with_capacity(info.fields.len());
        for field in &info.fields {
            let (is_vec, elem_ty) = vec_element(&field.ty);
            let parse = classify_parse(elem_ty, index).ok_or_else(unsupported)?;
            fields.push(FormField {
                ident: field.ident.clone(),
                key: field.name().to_string(),
                ty_text: type_text(&field.ty),
                is_vec,
                parse,
                validations: input_validations(template_text, field.name()),
            });
        }
        return Ok(FormPlan::Struct {
            ty_ident: ident,
            fields,
        });
    }

    // Scalar (or Vec of scalar) bound to the argument name itself.
    let (is_vec, elem_ty) = vec_element(param_ty);
    let parse = classify_parse(elem_ty, index).ok_or_else(unsupported)?;
    Ok(FormPlan::Scalar(FormField {
        ident: arg.to_string(),
        key: arg.to_string(),
        ty_text: type_text(param_ty),
        is_vec,
        parse,
        validations: input_validations(template_text, arg),
    }))
}

/// `Vec<T>` → `(true, T)`, anything else → `(false, itself)`.
fn vec_element(ty: &syn::Type) -> (bool, &syn::Type) {
    let peeled = peel_type(ty);
    if type_ident(peeled).as_deref() == Some("Vec") {
        if let Some(elem) = first_type_argument(peeled) {
            return (true, elem);
        }
    }
    (false, ty)
}

fn result_shape(route: &str, output: Option<&syn::Type>) -> Result<ResultShape, ResolveError> {
    let Some(output) = output else {
        return Ok(ResultShape::Value { ty: "()".into() });
    };
    let peeled = peel_type(output);
    match peeled {
        syn::Type::Tuple(tuple) if tuple.elems.len() == 2 => {
            let second = type_ident(&tuple.elems[1]);
            if second.as_deref() != Some("bool") {
                return Err(ResolveError::UnsupportedReturnShape {
                    route: route.to_string(),
                    found: type_text(output),
                });
            }
            Ok(ResultShape::ValueOk {
                ty: type_text(&tuple.elems[0]),
            })
        }
        syn::Type::Path(path) if path.path.segments.last().is_some_and(|s| s.ident == "Result") => {
            let args = result_arguments(peeled);
            let (ok, err) = match args.as_slice() {
                [ok] => (*ok, None),
                [ok, err] => (*ok, Some(*err)),
                _ => {
                    return Err(ResolveError::UnsupportedReturnShape {
                        route: route.to_string(),
                        found: type_text(output),
                    });
                }
            };
            let err_text = err.map(type_text);
            if is_unit(ok) {
                Ok(ResultShape::ErrorOnly { err: err_text })
            } else {
                Ok(ResultShape::ValueError {
                    ty: type_text(ok),
                    err: err_text,
                })
            }
        }
        _ => Ok(ResultShape::Value {
            ty: type_text(output),
        }),
    }
}

fn result_arguments(ty: &syn::Type) -> Vec<&syn::Type> {
    let syn::Type::Path(path) = ty else {
        return Vec::new();
    };
    let Some(last) = path.path.segments.last() else {
        return Vec::new();
    };
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return Vec::new();
    };
    args.args
        .iter()
        .filter_map(|arg| match arg {
            syn::GenericArgument::Type(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn is_unit(ty: &syn::Type) -> bool {
    matches!(peel_type(ty), syn::Type::Tuple(tuple) if tuple.elems.is_empty())
}

fn status_probe(shape: &ResultShape, index: &TypeIndex) -> StatusProbe {
    let mut probe = StatusProbe::default();
    let result_ident = syn::parse_str::<syn::Type>(shape.result_ty())
        .ok()
        .and_then(|ty| type_ident(&ty));
    if let Some(ident) = &result_ident {
        probe.result_method = index
            .method(ident, "status_code")
            .is_some_and(|m| m.takes_self && m.params.is_empty());
        probe.result_field = index
            .field(ident, "status_code")
            .is_some_and(|f| matches!(TypeRef::from_syn(&f.ty, index), TypeRef::Int));
    }
    let err_ident = match shape {
        ResultShape::ValueError { err, .. } | ResultShape::ErrorOnly { err } => err
            .as_ref()
            .and_then(|text| syn::parse_str::<syn::Type>(text).ok())
            .and_then(|ty| type_ident(&ty)),
        _ => None,
    };
    if let Some(ident) = err_ident {
        probe.error_method = index
            .method(&ident, "status_code")
            .is_some_and(|m| m.takes_self && m.params.is_empty());
    }
    probe
}

// ── naming ────────────────────────────────────────────────────────────────

/// Helper name for a route with a call: the call identifier itself.
fn call_helper_name(template_name: &str) -> String {
    routename::parse(template_name)
        .ok()
        .and_then(|r| r.call.map(|c| c.ident))
        .unwrap_or_else(|| derived_name_from(template_name))
}

/// Helper name for call-less routes: method + path words, snake_case.
fn derived_helper_name(route: &Route) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(method) = route.method {
        parts.push(method.to_string().to_lowercase());
    }
    for segment in &route.segments {
        match segment {
            crate::routename::Segment::Literal(s) => parts.push(sanitize(s)),
            crate::routename::Segment::Placeholder(n)
            | crate::routename::Segment::Wildcard(n) => parts.push(sanitize(n)),
            crate::routename::Segment::End => {}
        }
    }
    if parts.is_empty() {
        parts.push("root".into());
    }
    parts.retain(|p| !p.is_empty());
    parts.join("_")
}

fn derived_name_from(template_name: &str) -> String {
    sanitize(template_name)
}

fn sanitize(s: &str) -> String {
    let mut out: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out.trim_matches('_').to_string()
}

/// Compact source text for a type.
pub fn type_text(ty: &syn::Type) -> String {
    let mut text = ty.to_token_stream().to_string();
    for (from, to) in [
        (" :: ", "::"),
        (" < ", "<"),
        (" >", ">"),
        ("< ", "<"),
        (" ,", ","),
        (", ", ","),
        ("& ", "&"),
    ] {
        text = text.replace(from, to);
    }
    text.replace(",", ", ").replace("&mut", "&mut ").replace("&mut  ", "&mut ")
}

/// The path-helper surface: method name → placeholder parameter types.
/// Only placeholder-bearing routes get helpers.
pub fn path_method_types(routes: &[ResolvedRoute], index: &TypeIndex) -> BTreeMap<String, Vec<TypeRef>> {
    let mut out = BTreeMap::new();
    for resolved in routes {
        let placeholders = resolved.route.placeholders();
        if placeholders.is_empty() {
            continue;
        }
        let params = placeholders
            .iter()
            .map(|(name, _)| {
                resolved
                    .method
                    .as_ref()
                    .and_then(|m| {
                        m.bindings.iter().find_map(|b| match b {
                            ArgBinding::Path {
                                name: bound,
                                ty_text,
                                ..
                            } if bound == name => syn::parse_str::<syn::Type>(ty_text)
                                .ok()
                                .map(|ty| TypeRef::from_syn(&ty, index)),
                            _ => None,
                        })
                    })
                    .unwrap_or(TypeRef::Str)
            })
            .collect();
        out.insert(resolved.helper_name.clone(), params);
    }
    out
}

// ── input validation scan ─────────────────────────────────────────────────

/// Find `<input name=KEY …>` in the template text and read its validation
/// attributes. Attribute values may be bare, single-, or double-quoted.
fn input_validations(text: &str, key: &str) -> Vec<Validation> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<input") {
        let tag = &rest[start..];
        let end = tag.find('>').map_or(tag.len(), |i| i + 1);
        let attrs = parse_attrs(&tag[..end]);
        if attrs.get("name").map(String::as_str) == Some(key) {
            if let Some(v) = attr_u64(&attrs, "minlength") {
                out.push(Validation::MinLength(v));
            }
            if let Some(v) = attr_u64(&attrs, "maxlength") {
                out.push(Validation::MaxLength(v));
            }
            if let Some(v) = attr_i64(&attrs, "min") {
                out.push(Validation::Min(v));
            }
            if let Some(v) = attr_i64(&attrs, "max") {
                out.push(Validation::Max(v));
            }
            if let Some(v) = attrs.get("pattern") {
                out.push(Validation::Pattern(v.clone()));
            }
            return out;
        }
        rest = &rest[start + end..];
    }
    out
}

fn attr_u64(attrs: &BTreeMap<String, String>, name: &str) -> Option<u64> {
    attrs.get(name)?.parse().ok()
}

fn attr_i64(attrs: &BTreeMap<String, String>, name: &str) -> Option<i64> {
    attrs.get(name)?.parse().ok()
}

fn parse_attrs(tag: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let body = tag.trim_start_matches("<input");
    let mut chars = body.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '>' || c == '/' {
            break;
        }
        // Attribute name.
        let name_start = i;
        let mut name_end = body.len();
        while let Some(&(j, c)) = chars.peek() {
            if c == '=' || c.is_whitespace() || c == '>' || c == '/' {
                name_end = j;
                break;
            }
            chars.next();
        }
        let name = body[name_start..name_end].to_ascii_lowercase();
        // Optional value.
        let mut value = String::new();
        if let Some(&(_, '=')) = chars.peek() {
            chars.next();
            match chars.peek() {
                Some(&(_, quote @ ('"' | '\''))) => {
                    chars.next();
                    for (_, c) in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_whitespace() || c == '>' {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
        }
        if !name.is_empty() {
            out.insert(name, value);
        }
    }
    out
}
