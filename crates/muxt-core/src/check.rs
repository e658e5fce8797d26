//! Template action type checking.
//!
//! The checker walks a parse tree with a current *dot type* and validates
//! every action against the package's types: field chains, zero-argument
//! methods, registered functions, pipelines, and `{{template}}` descent with
//! the computed argument type. Errors carry the template file position of
//! the offending node.
//!
//! Checking is permissive where it cannot know better: values typed
//! [`TypeRef::Any`] accept any member or argument. It is strict where it
//! can: a named struct only has the fields and inherent methods the package
//! declares.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use thiserror::Error;

use muxt_templates::node::{Arg, BranchNode, CommandNode, ListNode, Node, PipeNode, Tree};

use crate::environment::FuncSignature;
use crate::error::SourcePos;
use crate::forest::Forest;
use crate::source::{TypeIndex, first_type_argument, peel_type};

/// A template action that fails against its data type.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{pos}: {message}")]
pub struct CheckError {
    pub pos: SourcePos,
    pub message: String,
}

/// The checker's view of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// Unknown; every operation is accepted.
    Any,
    /// `()` / `struct {}` — the empty data of call-less routes.
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// An error value: `.Error` yields its message.
    Error,
    /// A named type from the package.
    Named(String),
    List(Box<TypeRef>),
    Map(Box<TypeRef>),
    Optional(Box<TypeRef>),
    /// The generated per-request container, parameterized by result type.
    TemplateData(Box<TypeRef>),
    /// The request head exposed to templates.
    Request,
    /// The generated path-helper type.
    RoutePaths,
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => write!(f, "any"),
            TypeRef::Unit => write!(f, "()"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Int => write!(f, "int"),
            TypeRef::Float => write!(f, "float"),
            TypeRef::Str => write!(f, "string"),
            TypeRef::Error => write!(f, "error"),
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(t) => write!(f, "[]{t}"),
            TypeRef::Map(t) => write!(f, "map[string]{t}"),
            TypeRef::Optional(t) => write!(f, "?{t}"),
            TypeRef::TemplateData(t) => write!(f, "TemplateData[{t}]"),
            TypeRef::Request => write!(f, "request"),
            TypeRef::RoutePaths => write!(f, "TemplateRoutePaths"),
        }
    }
}

impl TypeRef {
    /// Translate a Rust type into the checker's view.
    pub fn from_syn(ty: &syn::Type, index: &TypeIndex) -> TypeRef {
        let ty = peel_type(ty);
        match ty {
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => TypeRef::Unit,
            syn::Type::Slice(slice) => {
                TypeRef::List(Box::new(TypeRef::from_syn(&slice.elem, index)))
            }
            syn::Type::Array(array) => {
                TypeRef::List(Box::new(TypeRef::from_syn(&array.elem, index)))
            }
            syn::Type::Path(path) => {
                let Some(last) = path.path.segments.last() else {
                    return TypeRef::Any;
                };
                let ident = last.ident.to_string();
                match ident.as_str() {
                    "String" | "str" | "Cow" => TypeRef::Str,
                    "bool" => TypeRef::Bool,
                    "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                    | "u64" | "u128" | "usize" => TypeRef::Int,
                    "f32" | "f64" => TypeRef::Float,
                    "Vec" | "VecDeque" | "BTreeSet" | "HashSet" => TypeRef::List(Box::new(
                        first_type_argument(ty)
                            .map_or(TypeRef::Any, |t| TypeRef::from_syn(t, index)),
                    )),
                    "Option" => TypeRef::Optional(Box::new(
                        first_type_argument(ty)
                            .map_or(TypeRef::Any, |t| TypeRef::from_syn(t, index)),
                    )),
                    "HashMap" | "BTreeMap" => TypeRef::Map(Box::new(
                        second_type_argument(ty)
                            .map_or(TypeRef::Any, |t| TypeRef::from_syn(t, index)),
                    )),
                    "Parts" => TypeRef::Request,
                    "Box" => first_type_argument(ty)
                        .map_or(TypeRef::Any, |t| TypeRef::from_syn(t, index)),
                    _ if index.has_type(&ident) => TypeRef::Named(ident),
                    _ => TypeRef::Any,
                }
            }
            _ => TypeRef::Any,
        }
    }

    /// Memoization key; two dots with equal keys check identically.
    fn key(&self) -> String {
        self.to_string()
    }

    /// Collapse `Option` the way pointer indirections collapse.
    fn deref(&self) -> &TypeRef {
        match self {
            TypeRef::Optional(inner) => inner.deref(),
            other => other,
        }
    }
}

fn second_type_argument(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(path) = peel_type(ty) else {
        return None;
    };
    let syn::PathArguments::AngleBracketed(args) = &path.path.segments.last()?.arguments else {
        return None;
    };
    args.args
        .iter()
        .filter_map(|arg| match arg {
            syn::GenericArgument::Type(t) => Some(t),
            _ => None,
        })
        .nth(1)
}

fn compatible(param: &TypeRef, arg: &TypeRef) -> bool {
    match (param.deref(), arg.deref()) {
        (TypeRef::Any, _) | (_, TypeRef::Any) => true,
        (TypeRef::Int, TypeRef::Float) | (TypeRef::Float, TypeRef::Int) => true,
        (a, b) => a == b,
    }
}

/// A harvested `{{template}}` relationship: caller, callee, call position,
/// and the inferred argument type. The analyses get these for free from the
/// checking traversal.
#[derive(Debug, Clone)]
pub struct TemplateRef {
    pub caller: String,
    pub callee: String,
    pub pos: SourcePos,
    pub arg: TypeRef,
}

pub struct Checker<'a> {
    index: &'a TypeIndex,
    forest: &'a Forest,
    funcs: &'a BTreeMap<String, FuncSignature>,
    /// Path-helper methods: name → placeholder parameter types.
    path_methods: BTreeMap<String, Vec<TypeRef>>,
    memo: HashSet<(String, String)>,
    refs: Vec<TemplateRef>,
    errors: Vec<CheckError>,
}

impl<'a> Checker<'a> {
    pub fn new(
        index: &'a TypeIndex,
        forest: &'a Forest,
        funcs: &'a BTreeMap<String, FuncSignature>,
    ) -> Self {
        Self {
            index,
            forest,
            funcs,
            path_methods: BTreeMap::new(),
            memo: HashSet::new(),
            refs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Install the path-helper surface so `.Path.method args…` type-checks.
    pub fn with_path_methods(mut self, methods: BTreeMap<String, Vec<TypeRef>>) -> Self {
        self.path_methods = methods;
        self
    }

    /// Check one tree under a dot type. Re-entry with the same `(tree,
    /// dot)` pair returns immediately; the first traversal reports the
    /// errors, which also makes `{{template}}` cycles terminate.
    pub fn check_tree(&mut self, tree: &'a Tree, dot: TypeRef) {
        if !self.memo.insert((tree.name.clone(), dot.key())) {
            return;
        }
        let mut vars = vec![(String::new(), dot.clone())];
        self.walk_list(tree, &tree.root, &dot, &mut vars);
    }

    pub fn errors(&self) -> &[CheckError] {
        &self.errors
    }

    pub fn into_results(self) -> (Vec<CheckError>, Vec<TemplateRef>) {
        (self.errors, self.refs)
    }

    // ── traversal ─────────────────────────────────────────────────────────

    fn pos(&self, tree: &Tree, offset: usize) -> SourcePos {
        let position = tree.position(offset);
        SourcePos::new(
            tree.parse_name.clone(),
            position.line,
            position.column,
            position.offset,
        )
    }

    fn report(&mut self, tree: &Tree, offset: usize, message: impl Into<String>) {
        self.errors.push(CheckError {
            pos: self.pos(tree, offset),
            message: message.into(),
        });
    }

    fn walk_list(
        &mut self,
        tree: &'a Tree,
        list: &ListNode,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) {
        for node in &list.nodes {
            self.walk(tree, node, dot, vars);
        }
    }

    fn walk(
        &mut self,
        tree: &'a Tree,
        node: &Node,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) {
        match node {
            Node::Text(_) => {}
            Node::Action(action) => {
                // An action's printed value is always acceptable; only the
                // pipeline itself must be well-typed.
                self.check_pipe(tree, &action.pipe, dot, vars);
            }
            Node::If(branch) => {
                let mark = vars.len();
                self.check_pipe(tree, &branch.pipe, dot, vars);
                self.walk_list(tree, &branch.list, dot, vars);
                if let Some(else_list) = &branch.else_list {
                    self.walk_list(tree, else_list, dot, vars);
                }
                vars.truncate(mark);
            }
            Node::With(branch) => {
                let mark = vars.len();
                let value = self.check_pipe(tree, &branch.pipe, dot, vars);
                self.walk_list(tree, &branch.list, &value, vars);
                if let Some(else_list) = &branch.else_list {
                    self.walk_list(tree, else_list, dot, vars);
                }
                vars.truncate(mark);
            }
            Node::Range(branch) => self.walk_range(tree, branch, dot, vars),
            Node::Template(invoke) => {
                let arg = match &invoke.pipe {
                    Some(pipe) => self.check_pipe(tree, pipe, dot, vars),
                    // No argument: the sub-template inherits the caller's dot.
                    None => dot.clone(),
                };
                self.refs.push(TemplateRef {
                    caller: tree.name.clone(),
                    callee: invoke.name.clone(),
                    pos: self.pos(tree, invoke.pos),
                    arg: arg.clone(),
                });
                let forest = self.forest;
                match forest.find_tree(&invoke.name) {
                    Some(sub) => self.check_tree(sub, arg),
                    None => self.report(
                        tree,
                        invoke.pos,
                        format!("template {:?} not defined", invoke.name),
                    ),
                }
            }
        }
    }

    fn walk_range(
        &mut self,
        tree: &'a Tree,
        branch: &BranchNode,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) {
        let mark = vars.len();
        let iterable = self.check_pipe_value(tree, &branch.pipe, dot, vars);
        let (key, element) = match iterable.deref() {
            TypeRef::List(elem) => (TypeRef::Int, (**elem).clone()),
            TypeRef::Map(value) => (TypeRef::Str, (**value).clone()),
            TypeRef::Any => (TypeRef::Any, TypeRef::Any),
            other => {
                self.report(
                    tree,
                    branch.pipe.pos,
                    format!("range can't iterate over {other}"),
                );
                (TypeRef::Any, TypeRef::Any)
            }
        };
        match branch.pipe.decls.len() {
            1 => vars.push((branch.pipe.decls[0].clone(), element.clone())),
            2 => {
                vars.push((branch.pipe.decls[0].clone(), key));
                vars.push((branch.pipe.decls[1].clone(), element.clone()));
            }
            _ => {}
        }
        self.walk_list(tree, &branch.list, &element, vars);
        if let Some(else_list) = &branch.else_list {
            self.walk_list(tree, else_list, dot, vars);
        }
        vars.truncate(mark);
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    fn check_pipe(
        &mut self,
        tree: &'a Tree,
        pipe: &PipeNode,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) -> TypeRef {
        let value = self.check_pipe_value(tree, pipe, dot, vars);
        if pipe.is_assign {
            for name in &pipe.decls {
                if let Some(slot) = vars.iter_mut().rev().find(|(n, _)| n == name) {
                    slot.1 = value.clone();
                }
            }
        } else {
            for name in &pipe.decls {
                vars.push((name.clone(), value.clone()));
            }
        }
        value
    }

    fn check_pipe_value(
        &mut self,
        tree: &'a Tree,
        pipe: &PipeNode,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) -> TypeRef {
        let mut value: Option<TypeRef> = None;
        for cmd in &pipe.cmds {
            value = Some(self.check_command(tree, cmd, dot, vars, value));
        }
        value.unwrap_or(TypeRef::Any)
    }

    fn check_command(
        &mut self,
        tree: &'a Tree,
        cmd: &CommandNode,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
        prev: Option<TypeRef>,
    ) -> TypeRef {
        let first = &cmd.args[0];

        if let Arg::Ident { name, pos } = first {
            let mut args = Vec::with_capacity(cmd.args.len());
            for arg in &cmd.args[1..] {
                args.push(self.check_arg(tree, arg, dot, vars));
            }
            if let Some(prev) = prev {
                args.push(prev);
            }
            return self.check_function(tree, *pos, name, &args);
        }

        // Member invocation with arguments: `.StatusCode 404`.
        if cmd.args.len() > 1 || prev.is_some() {
            let (base, method) = match first {
                Arg::Field { chain, pos } if !chain.is_empty() => {
                    let mut base = dot.clone();
                    for name in &chain[..chain.len() - 1] {
                        base = self.resolve_member(tree, *pos, &base, name);
                    }
                    (base, chain.last().unwrap().clone())
                }
                Arg::Variable { name, chain, pos } if !chain.is_empty() => {
                    let mut base = self.var_type(tree, *pos, name, vars);
                    for part in &chain[..chain.len() - 1] {
                        base = self.resolve_member(tree, *pos, &base, part);
                    }
                    (base, chain.last().unwrap().clone())
                }
                other => {
                    self.report(
                        tree,
                        other.pos(),
                        format!("can't give argument to non-function {other}"),
                    );
                    return TypeRef::Any;
                }
            };
            let mut args = Vec::with_capacity(cmd.args.len());
            for arg in &cmd.args[1..] {
                args.push(self.check_arg(tree, arg, dot, vars));
            }
            if let Some(prev) = prev {
                args.push(prev);
            }
            return self.member_with_args(tree, first.pos(), &base, &method, &args);
        }

        self.check_arg(tree, first, dot, vars)
    }

    fn check_arg(
        &mut self,
        tree: &'a Tree,
        arg: &Arg,
        dot: &TypeRef,
        vars: &mut Vec<(String, TypeRef)>,
    ) -> TypeRef {
        match arg {
            Arg::Dot(_) => dot.clone(),
            Arg::Nil(_) => TypeRef::Any,
            Arg::Bool { .. } => TypeRef::Bool,
            Arg::Number { text, .. } => {
                if text.parse::<i64>().is_ok() {
                    TypeRef::Int
                } else {
                    TypeRef::Float
                }
            }
            Arg::Str { .. } => TypeRef::Str,
            Arg::Field { chain, pos } => {
                let mut value = dot.clone();
                for name in chain {
                    value = self.resolve_member(tree, *pos, &value, name);
                }
                value
            }
            Arg::Variable { name, chain, pos } => {
                let mut value = self.var_type(tree, *pos, name, vars);
                for part in chain {
                    value = self.resolve_member(tree, *pos, &value, part);
                }
                value
            }
            Arg::Ident { name, pos } => self.check_function(tree, *pos, name, &[]),
            Arg::Pipe(pipe) => self.check_pipe(tree, pipe, dot, vars),
        }
    }

    fn var_type(
        &mut self,
        tree: &'a Tree,
        pos: usize,
        name: &str,
        vars: &[(String, TypeRef)],
    ) -> TypeRef {
        match vars.iter().rev().find(|(n, _)| n == name) {
            Some((_, ty)) => ty.clone(),
            None => {
                self.report(tree, pos, format!("undefined variable ${name}"));
                TypeRef::Any
            }
        }
    }

    // ── functions ─────────────────────────────────────────────────────────

    fn check_function(
        &mut self,
        tree: &'a Tree,
        pos: usize,
        name: &str,
        args: &[TypeRef],
    ) -> TypeRef {
        if let Some(result) = self.check_builtin(tree, pos, name, args) {
            return result;
        }
        let Some(sig) = self.funcs.get(name) else {
            self.report(tree, pos, format!("function {name:?} not defined"));
            return TypeRef::Any;
        };
        if sig.params.len() != args.len() {
            self.report(
                tree,
                pos,
                format!(
                    "wrong number of args for {name}: want {} got {}",
                    sig.params.len(),
                    args.len()
                ),
            );
            return TypeRef::Any;
        }
        for (i, (param, arg)) in sig.params.iter().zip(args).enumerate() {
            let param = TypeRef::from_syn(param, self.index);
            if !compatible(&param, arg) {
                self.report(
                    tree,
                    pos,
                    format!("argument {i} of {name} wants {param}, got {arg}"),
                );
            }
        }
        sig.output
            .as_ref()
            .map_or(TypeRef::Unit, |ty| TypeRef::from_syn(ty, self.index))
    }

    fn check_builtin(
        &mut self,
        tree: &'a Tree,
        pos: usize,
        name: &str,
        args: &[TypeRef],
    ) -> Option<TypeRef> {
        let arity = |checker: &mut Self, min: usize, max: Option<usize>| {
            let ok = args.len() >= min && max.is_none_or(|m| args.len() <= m);
            if !ok {
                checker.report(tree, pos, format!("wrong number of args for {name}"));
            }
        };
        let result = match name {
            "len" => {
                arity(self, 1, Some(1));
                TypeRef::Int
            }
            "not" => {
                arity(self, 1, Some(1));
                TypeRef::Bool
            }
            "and" | "or" => {
                arity(self, 1, None);
                TypeRef::Any
            }
            "eq" => {
                arity(self, 2, None);
                TypeRef::Bool
            }
            "ne" | "lt" | "le" | "gt" | "ge" => {
                arity(self, 2, Some(2));
                TypeRef::Bool
            }
            "print" | "println" => TypeRef::Str,
            "printf" => {
                arity(self, 1, None);
                if let Some(first) = args.first() {
                    if !compatible(&TypeRef::Str, first) {
                        self.report(tree, pos, "printf wants a format string");
                    }
                }
                TypeRef::Str
            }
            "index" => {
                arity(self, 1, None);
                match args.first().map(TypeRef::deref) {
                    Some(TypeRef::List(elem)) => (**elem).clone(),
                    Some(TypeRef::Map(value)) => (**value).clone(),
                    _ => TypeRef::Any,
                }
            }
            "urlquery" | "html" | "js" => {
                arity(self, 1, None);
                TypeRef::Str
            }
            _ => return None,
        };
        Some(result)
    }

    // ── members ───────────────────────────────────────────────────────────

    fn resolve_member(
        &mut self,
        tree: &'a Tree,
        pos: usize,
        base: &TypeRef,
        name: &str,
    ) -> TypeRef {
        match base.deref() {
            TypeRef::Any => TypeRef::Any,
            TypeRef::Named(type_name) => {
                if let Some(field) = self.index.field(type_name, name) {
                    return TypeRef::from_syn(&field.ty, self.index);
                }
                if let Some(method) = self.index.method(type_name, name) {
                    if method.takes_self && method.params.is_empty() {
                        return method
                            .output
                            .as_ref()
                            .map_or(TypeRef::Unit, |ty| TypeRef::from_syn(ty, self.index));
                    }
                }
                self.report(
                    tree,
                    pos,
                    format!("type {type_name} has no field or method {name}"),
                );
                TypeRef::Any
            }
            TypeRef::TemplateData(result) => match name {
                "Result" => (**result).clone(),
                "Err" => TypeRef::Error,
                "Request" => TypeRef::Request,
                "Response" => TypeRef::Any,
                "Path" => TypeRef::RoutePaths,
                "MuxtVersion" => TypeRef::Str,
                "StatusCode" | "Header" | "Redirect" => {
                    self.report(tree, pos, format!("{name} requires arguments"));
                    TypeRef::Any
                }
                _ => {
                    self.report(
                        tree,
                        pos,
                        format!("template data has no member {name}"),
                    );
                    TypeRef::Any
                }
            },
            TypeRef::Error => match name {
                "Error" => TypeRef::Str,
                _ => {
                    self.report(tree, pos, format!("error has no member {name}"));
                    TypeRef::Any
                }
            },
            TypeRef::Request => match name {
                "Method" | "Path" | "Host" => TypeRef::Str,
                _ => {
                    self.report(tree, pos, format!("request has no member {name}"));
                    TypeRef::Any
                }
            },
            TypeRef::RoutePaths => {
                let params = self.path_methods.get(name).cloned();
                match params {
                    Some(params) if params.is_empty() => TypeRef::Str,
                    Some(_) => {
                        self.report(tree, pos, format!("path helper {name} requires arguments"));
                        TypeRef::Any
                    }
                    None => {
                        self.report(tree, pos, format!("no path helper named {name}"));
                        TypeRef::Any
                    }
                }
            }
            other => {
                self.report(
                    tree,
                    pos,
                    format!("can't evaluate field {name} in type {other}"),
                );
                TypeRef::Any
            }
        }
    }

    fn member_with_args(
        &mut self,
        tree: &'a Tree,
        pos: usize,
        base: &TypeRef,
        name: &str,
        args: &[TypeRef],
    ) -> TypeRef {
        let expect = |checker: &mut Self, params: &[TypeRef], result: TypeRef| {
            if params.len() != args.len() {
                checker.report(
                    tree,
                    pos,
                    format!(
                        "wrong number of args for {name}: want {} got {}",
                        params.len(),
                        args.len()
                    ),
                );
                return result;
            }
            for (i, (param, arg)) in params.iter().zip(args).enumerate() {
                if !compatible(param, arg) {
                    checker.report(
                        tree,
                        pos,
                        format!("argument {i} of {name} wants {param}, got {arg}"),
                    );
                }
            }
            result
        };
        match base.deref() {
            TypeRef::Any => TypeRef::Any,
            TypeRef::TemplateData(result) => {
                let data = TypeRef::TemplateData(result.clone());
                match name {
                    "StatusCode" => expect(self, &[TypeRef::Int], data),
                    "Header" => expect(self, &[TypeRef::Str, TypeRef::Str], data),
                    "Redirect" => expect(self, &[TypeRef::Str, TypeRef::Int], data),
                    _ => {
                        self.report(
                            tree,
                            pos,
                            format!("template data has no method {name}"),
                        );
                        TypeRef::Any
                    }
                }
            }
            TypeRef::RoutePaths => match self.path_methods.get(name).cloned() {
                Some(params) => expect(self, &params, TypeRef::Str),
                None => {
                    self.report(tree, pos, format!("no path helper named {name}"));
                    TypeRef::Any
                }
            },
            other => {
                self.report(
                    tree,
                    pos,
                    format!("can't call method {name} on {other}"),
                );
                TypeRef::Any
            }
        }
    }
}
