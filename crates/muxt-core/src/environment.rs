//! Template environment reconstruction.
//!
//! Given the declared templates variable, rebuild — without running any user
//! code — the [`TemplateSet`] the program would hold at runtime: the same
//! named trees, function-map keys, and delimiters.
//!
//! The initializer is read as a chain of recognized calls
//! (`new`/`must`/`lazy`/`parse`/`parse_files`/`delims`/`option`/`funcs`),
//! each lowered to a [`ChainCall`] and then replayed against a real
//! `TemplateSet` using the same parser the runtime uses. Anything outside
//! that small recognized surface is an error, with a span-accurate position.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use muxt_templates::{ParseError, TemplateFn, TemplateSet, Value};

use crate::error::SourcePos;
use crate::source::{Package, SourceFile, TypeIndex};

#[derive(Debug, Error, Clone)]
pub enum EnvironmentError {
    #[error("templates variable {ident:?} not found in package")]
    VariableNotFound { ident: String },

    #[error("{pos}: template initializer is not a recognized template call: {path}")]
    ForeignCall { path: String, pos: SourcePos },

    #[error("{pos}: unsupported template method {method:?}")]
    UnsupportedMethod { method: String, pos: SourcePos },

    #[error("{pos}: {context} must be a string literal")]
    NonLiteralArgument { context: String, pos: SourcePos },

    #[error("{pos}: template chain never calls new(…)")]
    MissingRoot { pos: SourcePos },

    #[error("{pos}: {ident:?} is not an embed_files! table")]
    EmbedVariableNotFound { ident: String, pos: SourcePos },

    #[error("malformed embed pattern {pattern:?}: {message}")]
    EmbedPatternMalformed { pattern: String, message: String },

    #[error("pattern matches no files: {pattern:?}")]
    NoFilesMatched { pattern: String },

    #[error("{pos}: function {name:?} does not resolve to a package function")]
    UnresolvedFunction { name: String, pos: SourcePos },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// The signature of a registered template function, recovered from the
/// package's own `fn` item.
#[derive(Debug, Clone)]
pub struct FuncSignature {
    pub params: Vec<syn::Type>,
    pub output: Option<syn::Type>,
}

/// Everything the evaluator recovers about one templates variable.
#[derive(Debug)]
pub struct Environment {
    pub set: TemplateSet,
    pub funcs: BTreeMap<String, FuncSignature>,
    pub delims: (String, String),
    /// Files parsed via `parse_files`, absolute, sorted.
    pub source_files: Vec<PathBuf>,
    pub var_ident: String,
    pub file: PathBuf,
}

/// One recognized call in the initializer chain, in application order.
#[derive(Debug)]
enum ChainCall<'a> {
    NewRoot {
        name: String,
    },
    Parse {
        text: String,
    },
    ParseFiles {
        fs_ident: String,
        patterns: Vec<String>,
        pos: SourcePos,
    },
    Delims {
        left: String,
        right: String,
    },
    Option {
        opts: Vec<String>,
    },
    Funcs {
        pairs: Vec<(String, &'a syn::Expr)>,
    },
}

/// Reconstruct the environment of the templates variable `var_ident`.
pub fn evaluate(
    package: &Package,
    index: &TypeIndex,
    var_ident: &str,
) -> Result<Environment, EnvironmentError> {
    let var = package
        .find_value(var_ident)
        .ok_or_else(|| EnvironmentError::VariableNotFound {
            ident: var_ident.to_string(),
        })?;
    let alias = package
        .template_alias(var.file)
        .unwrap_or_else(|| "template".to_string());

    let eval = Evaluator {
        package,
        index,
        file: var.file,
        alias,
    };
    let mut calls = Vec::new();
    eval.collect_chain(var.expr, &mut calls)?;
    debug!(var = var_ident, calls = calls.len(), "initializer chain read");
    eval.replay(calls, var)
}

struct Evaluator<'a> {
    package: &'a Package,
    index: &'a TypeIndex,
    file: &'a SourceFile,
    alias: String,
}

impl<'a> Evaluator<'a> {
    fn pos(&self, span: proc_macro2::Span) -> SourcePos {
        self.file.pos(span)
    }

    // ── chain collection ──────────────────────────────────────────────────

    fn collect_chain<'e>(
        &self,
        expr: &'e syn::Expr,
        out: &mut Vec<ChainCall<'e>>,
    ) -> Result<(), EnvironmentError> {
        use syn::Expr;
        match expr {
            Expr::Paren(inner) => self.collect_chain(&inner.expr, out),
            Expr::Group(inner) => self.collect_chain(&inner.expr, out),
            Expr::Reference(inner) => self.collect_chain(&inner.expr, out),
            Expr::Block(block) => match last_block_expr(&block.block) {
                Some(inner) => self.collect_chain(inner, out),
                None => Err(self.foreign("empty block", expr)),
            },
            Expr::Closure(closure) => self.collect_chain(&closure.body, out),
            Expr::MethodCall(call) => {
                self.collect_chain(&call.receiver, out)?;
                self.collect_method(call, out)
            }
            Expr::Call(call) => self.collect_root_call(call, out),
            other => Err(self.foreign(&expr_brief(other), other)),
        }
    }

    /// A free-function call: the root of a chain, or a wrapper around one.
    fn collect_root_call<'e>(
        &self,
        call: &'e syn::ExprCall,
        out: &mut Vec<ChainCall<'e>>,
    ) -> Result<(), EnvironmentError> {
        let segments = callee_segments(&call.func)
            .ok_or_else(|| self.foreign(&expr_brief(&call.func), &call.func))?;
        let last = segments.last().map(String::as_str).unwrap_or("");
        let prefix = &segments[..segments.len().saturating_sub(1)];

        match last {
            "must" if self.known_prefix(prefix) => {
                let arg = self.one_arg(call, "must")?;
                self.collect_chain(arg, out)
            }
            "lazy" if self.known_prefix(prefix) => {
                let arg = self.one_arg(call, "lazy")?;
                self.collect_chain(arg, out)
            }
            "new" if prefix.last().is_some_and(|p| p == "LazyLock" || p == "Lazy") => {
                let arg = self.one_arg(call, "LazyLock::new")?;
                self.collect_chain(arg, out)
            }
            "new" if self.known_prefix(prefix) => {
                let name = self.literal_str(self.one_arg(call, "new")?, "template name")?;
                out.push(ChainCall::NewRoot { name });
                Ok(())
            }
            _ => Err(self.foreign(&segments.join("::"), &call.func)),
        }
    }

    /// True when a path prefix belongs to the template crate's surface:
    /// the import alias, the crate name, `TemplateSet`, or nothing at all
    /// (names imported directly).
    fn known_prefix(&self, prefix: &[String]) -> bool {
        match prefix {
            [] => true,
            rest => {
                let head = rest.last().unwrap();
                head == &self.alias || head == "muxt_templates" || head == "TemplateSet"
            }
        }
    }

    fn collect_method<'e>(
        &self,
        call: &'e syn::ExprMethodCall,
        out: &mut Vec<ChainCall<'e>>,
    ) -> Result<(), EnvironmentError> {
        let method = call.method.to_string();
        let args: Vec<&syn::Expr> = call.args.iter().collect();
        match method.as_str() {
            "parse" => {
                let text =
                    self.literal_str(self.arg(call, &args, 0, 1)?, "parse source")?;
                out.push(ChainCall::Parse { text });
                Ok(())
            }
            "parse_files" => {
                if args.len() != 2 {
                    return Err(self.unsupported(&method, call));
                }
                let fs_ident = self.fs_ident(args[0])?;
                let patterns = self.pattern_list(args[1])?;
                out.push(ChainCall::ParseFiles {
                    fs_ident,
                    patterns,
                    pos: self.pos(call.method.span()),
                });
                Ok(())
            }
            "delims" => {
                if args.len() != 2 {
                    return Err(self.unsupported(&method, call));
                }
                let left = self.literal_str(args[0], "left delimiter")?;
                let right = self.literal_str(args[1], "right delimiter")?;
                out.push(ChainCall::Delims { left, right });
                Ok(())
            }
            "option" => {
                let mut opts = Vec::with_capacity(args.len());
                for arg in &args {
                    opts.push(self.literal_str(arg, "option")?);
                }
                out.push(ChainCall::Option { opts });
                Ok(())
            }
            "funcs" => {
                if args.len() != 1 {
                    return Err(self.unsupported(&method, call));
                }
                let pairs = self.func_pairs(args[0])?;
                out.push(ChainCall::Funcs { pairs });
                Ok(())
            }
            "new_root" => {
                let name =
                    self.literal_str(self.arg(call, &args, 0, 1)?, "template name")?;
                out.push(ChainCall::NewRoot { name });
                Ok(())
            }
            _ => Err(self.unsupported(&method, call)),
        }
    }

    // ── argument shapes ───────────────────────────────────────────────────

    fn one_arg<'e>(
        &self,
        call: &'e syn::ExprCall,
        what: &str,
    ) -> Result<&'e syn::Expr, EnvironmentError> {
        match call.args.first() {
            Some(arg) if call.args.len() == 1 => Ok(arg),
            _ => Err(EnvironmentError::NonLiteralArgument {
                context: format!("{what} argument"),
                pos: self.pos(syn::spanned::Spanned::span(call)),
            }),
        }
    }

    fn arg<'e>(
        &self,
        call: &'e syn::ExprMethodCall,
        args: &[&'e syn::Expr],
        i: usize,
        want: usize,
    ) -> Result<&'e syn::Expr, EnvironmentError> {
        if args.len() != want {
            return Err(self.unsupported(&call.method.to_string(), call));
        }
        Ok(args[i])
    }

    fn literal_str(
        &self,
        expr: &syn::Expr,
        context: &str,
    ) -> Result<String, EnvironmentError> {
        match expr {
            syn::Expr::Lit(lit) => {
                if let syn::Lit::Str(s) = &lit.lit {
                    return Ok(s.value());
                }
                Err(self.non_literal(context, expr))
            }
            syn::Expr::Reference(r) => self.literal_str(&r.expr, context),
            syn::Expr::Group(g) => self.literal_str(&g.expr, context),
            syn::Expr::Paren(p) => self.literal_str(&p.expr, context),
            _ => Err(self.non_literal(context, expr)),
        }
    }

    /// `&ASSETS` (or plain `ASSETS`) — the embedded files table.
    fn fs_ident(&self, expr: &syn::Expr) -> Result<String, EnvironmentError> {
        match expr {
            syn::Expr::Reference(r) => self.fs_ident(&r.expr),
            syn::Expr::Group(g) => self.fs_ident(&g.expr),
            syn::Expr::Paren(p) => self.fs_ident(&p.expr),
            syn::Expr::Path(path) => path
                .path
                .get_ident()
                .map(|i| i.to_string())
                .ok_or_else(|| self.non_literal("embedded files argument", expr)),
            _ => Err(self.non_literal("embedded files argument", expr)),
        }
    }

    /// `&["a.html", "b/*.html"]` — glob pattern list.
    fn pattern_list(&self, expr: &syn::Expr) -> Result<Vec<String>, EnvironmentError> {
        match expr {
            syn::Expr::Reference(r) => self.pattern_list(&r.expr),
            syn::Expr::Group(g) => self.pattern_list(&g.expr),
            syn::Expr::Paren(p) => self.pattern_list(&p.expr),
            syn::Expr::Array(array) => array
                .elems
                .iter()
                .map(|elem| self.literal_str(elem, "glob pattern"))
                .collect(),
            _ => Err(self.non_literal("glob pattern list", expr)),
        }
    }

    /// `[("upper", upper), …]` — function registrations.
    fn func_pairs<'e>(
        &self,
        expr: &'e syn::Expr,
    ) -> Result<Vec<(String, &'e syn::Expr)>, EnvironmentError> {
        let array = match expr {
            syn::Expr::Reference(r) => return self.func_pairs(&r.expr),
            syn::Expr::Array(array) => array,
            _ => return Err(self.non_literal("funcs argument", expr)),
        };
        let mut pairs = Vec::with_capacity(array.elems.len());
        for elem in &array.elems {
            let syn::Expr::Tuple(tuple) = elem else {
                return Err(self.non_literal("funcs entry", elem));
            };
            if tuple.elems.len() != 2 {
                return Err(self.non_literal("funcs entry", elem));
            }
            let name = self.literal_str(&tuple.elems[0], "function name")?;
            pairs.push((name, &tuple.elems[1]));
        }
        Ok(pairs)
    }

    // ── replay ────────────────────────────────────────────────────────────

    fn replay(
        &self,
        calls: Vec<ChainCall<'_>>,
        var: crate::source::ValueDef<'_>,
    ) -> Result<Environment, EnvironmentError> {
        let chain_pos = self.pos(syn::spanned::Spanned::span(var.expr));
        let mut set: Option<TemplateSet> = None;
        let mut funcs: BTreeMap<String, FuncSignature> = BTreeMap::new();
        let mut source_files: Vec<PathBuf> = Vec::new();

        for call in calls {
            match call {
                ChainCall::NewRoot { name } => {
                    set = Some(match set.take() {
                        None => TemplateSet::new(&name),
                        Some(existing) => existing.new_root(&name),
                    });
                }
                other => {
                    let current = set.take().ok_or(EnvironmentError::MissingRoot {
                        pos: chain_pos.clone(),
                    })?;
                    set = Some(self.apply(current, other, &mut funcs, &mut source_files)?);
                }
            }
        }

        let set = set.ok_or(EnvironmentError::MissingRoot { pos: chain_pos })?;
        let (left, right) = set.delimiters();
        let delims = (left.to_string(), right.to_string());
        Ok(Environment {
            funcs,
            delims,
            source_files,
            var_ident: var.ident,
            file: var.file.path.clone(),
            set,
        })
    }

    fn apply(
        &self,
        set: TemplateSet,
        call: ChainCall<'_>,
        funcs: &mut BTreeMap<String, FuncSignature>,
        source_files: &mut Vec<PathBuf>,
    ) -> Result<TemplateSet, EnvironmentError> {
        match call {
            ChainCall::NewRoot { .. } => unreachable!("handled by replay"),
            ChainCall::Parse { text } => Ok(set.parse(&text)?),
            ChainCall::Delims { left, right } => Ok(set.delims(&left, &right)),
            ChainCall::Option { opts } => {
                Ok(opts.into_iter().fold(set, |set, opt| set.option(&opt)))
            }
            ChainCall::Funcs { pairs } => {
                let mut set = set;
                for (name, value) in pairs {
                    let signature = self.resolve_function(&name, value)?;
                    funcs.insert(name.clone(), signature);
                    // Stand-in so the parser accepts the name; never invoked
                    // by the analyzer.
                    let stand_in: TemplateFn =
                        std::sync::Arc::new(|_: &[Value]| Ok(Value::Null));
                    set = set.funcs([(name.as_str(), stand_in)]);
                }
                Ok(set)
            }
            ChainCall::ParseFiles {
                fs_ident,
                patterns,
                pos,
            } => {
                let embedded = self.embedded_files(&fs_ident, &pos)?;
                let matched = intersect_patterns(&patterns, &embedded)?;
                let mut set = set;
                for (rel, abs) in matched {
                    let text =
                        std::fs::read_to_string(&abs).map_err(|e| EnvironmentError::Io {
                            path: abs.clone(),
                            message: e.to_string(),
                        })?;
                    let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();
                    set = set.parse_source(&name, &text, &abs.display().to_string())?;
                    source_files.push(abs);
                }
                Ok(set)
            }
        }
    }

    /// The signature of a `funcs` value expression: a path to (or cast of)
    /// a package-level function.
    fn resolve_function(
        &self,
        name: &str,
        value: &syn::Expr,
    ) -> Result<FuncSignature, EnvironmentError> {
        let ident = match value {
            syn::Expr::Cast(cast) => return self.resolve_function(name, &cast.expr),
            syn::Expr::Reference(r) => return self.resolve_function(name, &r.expr),
            syn::Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
            _ => None,
        };
        let unresolved = || EnvironmentError::UnresolvedFunction {
            name: name.to_string(),
            pos: self.pos(syn::spanned::Spanned::span(value)),
        };
        let ident = ident.ok_or_else(unresolved)?;
        let info = self.index.fn_info(&ident).ok_or_else(unresolved)?;
        Ok(FuncSignature {
            params: info.params.iter().map(|(_, ty)| ty.clone()).collect(),
            output: info.output.clone(),
        })
    }

    /// Resolve an `embed_files!` sibling static to its file table.
    fn embedded_files(
        &self,
        ident: &str,
        pos: &SourcePos,
    ) -> Result<Vec<(String, PathBuf)>, EnvironmentError> {
        let not_found = || EnvironmentError::EmbedVariableNotFound {
            ident: ident.to_string(),
            pos: pos.clone(),
        };
        let var = self.package.find_value(ident).ok_or_else(not_found)?;
        let syn::Expr::Macro(mac) = var.expr else {
            return Err(not_found());
        };
        let is_embed = mac
            .mac
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "embed_files");
        if !is_embed {
            return Err(not_found());
        }
        let patterns = parse_embed_patterns(mac.mac.tokens.clone()).map_err(|message| {
            EnvironmentError::EmbedPatternMalformed {
                pattern: mac.mac.tokens.to_string(),
                message,
            }
        })?;

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for pattern in &patterns {
            let matched = resolve_embed_pattern(&self.package.dir, pattern)?;
            if matched.is_empty() {
                return Err(EnvironmentError::NoFilesMatched {
                    pattern: pattern.clone(),
                });
            }
            for (rel, abs) in matched {
                if !files.iter().any(|(existing, _)| *existing == rel) {
                    files.push((rel, abs));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    // ── error helpers ─────────────────────────────────────────────────────

    fn foreign(&self, path: &str, at: &syn::Expr) -> EnvironmentError {
        EnvironmentError::ForeignCall {
            path: path.to_string(),
            pos: self.pos(syn::spanned::Spanned::span(at)),
        }
    }

    fn unsupported(
        &self,
        method: &str,
        call: &syn::ExprMethodCall,
    ) -> EnvironmentError {
        EnvironmentError::UnsupportedMethod {
            method: method.to_string(),
            pos: self.pos(call.method.span()),
        }
    }

    fn non_literal(&self, context: &str, expr: &syn::Expr) -> EnvironmentError {
        EnvironmentError::NonLiteralArgument {
            context: context.to_string(),
            pos: self.pos(syn::spanned::Spanned::span(expr)),
        }
    }
}

fn last_block_expr(block: &syn::Block) -> Option<&syn::Expr> {
    match block.stmts.last()? {
        syn::Stmt::Expr(expr, None) => Some(expr),
        _ => None,
    }
}

fn callee_segments(func: &syn::Expr) -> Option<Vec<String>> {
    match func {
        syn::Expr::Path(path) => Some(
            path.path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect(),
        ),
        syn::Expr::Group(g) => callee_segments(&g.expr),
        syn::Expr::Paren(p) => callee_segments(&p.expr),
        _ => None,
    }
}

fn expr_brief(expr: &syn::Expr) -> String {
    match expr {
        syn::Expr::Macro(mac) => format!(
            "{}!",
            mac.mac
                .path
                .segments
                .last()
                .map(|s| s.ident.to_string())
                .unwrap_or_default()
        ),
        syn::Expr::Path(path) => path
            .path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect::<Vec<_>>()
            .join("::"),
        _ => "unsupported expression".to_string(),
    }
}

/// Tokenize `embed_files!` arguments: string/raw-string literals stand
/// alone, other token runs up to a comma join into one bare pattern. Kept in
/// lockstep with the proc-macro's own tokenizer.
pub(crate) fn parse_embed_patterns(
    tokens: proc_macro2::TokenStream,
) -> Result<Vec<String>, String> {
    use proc_macro2::TokenTree;
    let mut patterns = Vec::new();
    let mut bare = String::new();
    let mut flush = |bare: &mut String, patterns: &mut Vec<String>| {
        if !bare.is_empty() {
            patterns.push(std::mem::take(bare));
        }
    };
    for token in tokens {
        match token {
            TokenTree::Punct(p) if p.as_char() == ',' => flush(&mut bare, &mut patterns),
            TokenTree::Literal(lit) => {
                let text = lit.to_string();
                match unquote_literal(&text) {
                    Some(Ok(unquoted)) => {
                        flush(&mut bare, &mut patterns);
                        patterns.push(unquoted);
                    }
                    Some(Err(message)) => return Err(message),
                    None => bare.push_str(&text),
                }
            }
            TokenTree::Ident(ident) => bare.push_str(&ident.to_string()),
            TokenTree::Punct(p) => bare.push(p.as_char()),
            TokenTree::Group(_) => return Err("unexpected group in embed pattern".into()),
        }
    }
    flush(&mut bare, &mut patterns);
    if patterns.is_empty() {
        return Err("embed_files! needs at least one pattern".into());
    }
    Ok(patterns)
}

fn unquote_literal(text: &str) -> Option<Result<String, String>> {
    if let Some(raw) = text.strip_prefix('r') {
        let hashes = raw.bytes().take_while(|&b| b == b'#').count();
        let body = raw[hashes..]
            .strip_prefix('"')?
            .strip_suffix(&"#".repeat(hashes))?
            .strip_suffix('"')?;
        return Some(Ok(body.to_string()));
    }
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            other => {
                return Some(Err(format!(
                    "unsupported escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Some(Ok(out))
}

/// Expand one embed pattern against the package directory. A bare pattern
/// without glob metacharacters naming a directory selects the directory's
/// whole subtree.
fn resolve_embed_pattern(
    root: &Path,
    pattern: &str,
) -> Result<Vec<(String, PathBuf)>, EnvironmentError> {
    if pattern.starts_with('/') || pattern.contains("..") {
        return Err(EnvironmentError::EmbedPatternMalformed {
            pattern: pattern.to_string(),
            message: "pattern must stay inside the package".into(),
        });
    }
    let has_meta = pattern.contains(['*', '?', '[']);
    let effective = if !has_meta && root.join(pattern).is_dir() {
        format!("{}/**/*", pattern.trim_end_matches('/'))
    } else {
        pattern.to_string()
    };
    let full = root.join(&effective).to_string_lossy().into_owned();
    let walker = glob::glob(&full).map_err(|e| EnvironmentError::EmbedPatternMalformed {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut out = Vec::new();
    for entry in walker {
        let path = entry.map_err(|e| EnvironmentError::Io {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !path.is_file() {
            continue;
        }
        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if rel.split('/').any(|seg| seg.starts_with('.')) {
            continue;
        }
        out.push((rel, path));
    }
    Ok(out)
}

/// Intersect `parse_files` glob patterns with the embedded file table.
fn intersect_patterns(
    patterns: &[String],
    embedded: &[(String, PathBuf)],
) -> Result<Vec<(String, PathBuf)>, EnvironmentError> {
    let mut out: Vec<(String, PathBuf)> = Vec::new();
    for pattern in patterns {
        let compiled =
            glob::Pattern::new(pattern).map_err(|e| EnvironmentError::EmbedPatternMalformed {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        let mut any = false;
        for (rel, abs) in embedded {
            let base = rel.rsplit('/').next().unwrap_or(rel);
            if compiled.matches(rel) || compiled.matches(base) {
                any = true;
                if !out.iter().any(|(existing, _)| existing == rel) {
                    out.push((rel.clone(), abs.clone()));
                }
            }
        }
        if !any {
            return Err(EnvironmentError::NoFilesMatched {
                pattern: pattern.clone(),
            });
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

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

    fn eval(dir: &Path) -> Result<Environment, EnvironmentError> {
        let package = Package::load(dir).unwrap();
        let index = package.type_index();
        evaluate(&package, &index, "TEMPLATES")
    }

    #[test]
    fn inline_parse_reconstructs_trees() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
use muxt_templates as template;

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("GET /").parse("<h1>hi</h1>{{define \"row\"}}<li>{{.}}</li>{{end}}"))
});
"#,
        )]);
        let env = eval(dir.path()).unwrap();
        assert!(env.set.find_tree("GET /").is_some());
        assert!(env.set.find_tree("row").is_some());
        assert_eq!(env.delims, ("{{".to_string(), "}}".to_string()));
    }

    #[test]
    fn parse_files_intersects_embed_and_globs() {
        let dir = write_package(&[
            (
                "lib.rs",
                r#"
use muxt_templates as template;

static ASSETS: template::Files = template::embed_files!("templates/*.html");

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("index.html").parse_files(&ASSETS, &["*.html"]))
});
"#,
            ),
            ("templates/index.html", "<h1>{{.title}}</h1>"),
            ("templates/row.html", "<li>{{.}}</li>"),
            ("templates/notes.txt", "not embedded by glob"),
        ]);
        let env = eval(dir.path()).unwrap();
        assert!(env.set.find_tree("index.html").is_some());
        assert!(env.set.find_tree("row.html").is_some());
        assert!(env.set.find_tree("notes.txt").is_none());
        assert_eq!(env.source_files.len(), 2);
        // Parse names point at the real files for diagnostics.
        let tree = env.set.find_tree("index.html").unwrap();
        assert!(tree.parse_name.ends_with("templates/index.html"));
    }

    #[test]
    fn bare_directory_embed_selects_subtree() {
        let dir = write_package(&[
            (
                "lib.rs",
                r#"
use muxt_templates as template;

static ASSETS: template::Files = template::embed_files!(templates);

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("index.html").parse_files(&ASSETS, &["*.html"]))
});
"#,
            ),
            ("templates/index.html", "<h1>hi</h1>"),
            ("templates/partials/row.html", "<li></li>"),
        ]);
        let env = eval(dir.path()).unwrap();
        assert!(env.set.find_tree("index.html").is_some());
        assert!(env.set.find_tree("row.html").is_some());
    }

    #[test]
    fn delims_apply_to_later_parses() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
use muxt_templates as template;

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("t").delims("<%", "%>").parse("<% .x %>"))
});
"#,
        )]);
        let env = eval(dir.path()).unwrap();
        assert_eq!(env.delims, ("<%".to_string(), "%>".to_string()));
        assert!(env.set.find_tree("t").is_some());
    }

    #[test]
    fn funcs_record_signatures_and_allow_parsing() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
use muxt_templates as template;

pub fn upper(s: &str) -> String { s.to_uppercase() }

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("t")
            .funcs([("upper", upper as fn(&str) -> String)])
            .parse("{{upper .name}}"),
    )
});
"#,
        )]);
        let env = eval(dir.path()).unwrap();
        let sig = env.funcs.get("upper").expect("signature recorded");
        assert_eq!(sig.params.len(), 1);
        assert!(sig.output.is_some());
    }

    #[test]
    fn variable_not_found() {
        let dir = write_package(&[("lib.rs", "pub fn nothing() {}\n")]);
        let err = eval(dir.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::VariableNotFound { .. }));
    }

    #[test]
    fn non_literal_parse_argument_is_rejected() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
use muxt_templates as template;
fn source() -> String { String::new() }
static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("t").parse(source()))
});
"#,
        )]);
        let err = eval(dir.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::NonLiteralArgument { .. }), "{err}");
    }

    #[test]
    fn unknown_method_is_rejected() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
use muxt_templates as template;
static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("t").compile("x"))
});
"#,
        )]);
        let err = eval(dir.path()).unwrap_err();
        let EnvironmentError::UnsupportedMethod { method, .. } = err else {
            panic!("expected unsupported method, got {err}");
        };
        assert_eq!(method, "compile");
    }

    #[test]
    fn foreign_root_call_is_rejected() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
static TEMPLATES: i32 = tera::new("t");
"#,
        )]);
        let err = eval(dir.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::ForeignCall { .. }), "{err}");
    }

    #[test]
    fn unmatched_glob_fails() {
        let dir = write_package(&[
            (
                "lib.rs",
                r#"
use muxt_templates as template;
static ASSETS: template::Files = template::embed_files!("templates/*.html");
static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("t").parse_files(&ASSETS, &["*.tpl"]))
});
"#,
            ),
            ("templates/index.html", "x"),
        ]);
        let err = eval(dir.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::NoFilesMatched { .. }), "{err}");
    }

    #[test]
    fn template_parse_errors_point_at_the_file() {
        let dir = write_package(&[
            (
                "lib.rs",
                r#"
use muxt_templates as template;
static ASSETS: template::Files = template::embed_files!("templates/*.html");
static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("index.html").parse_files(&ASSETS, &["*.html"]))
});
"#,
            ),
            ("templates/index.html", "line\n{{if .x}}unclosed"),
        ]);
        let err = eval(dir.path()).unwrap_err();
        let EnvironmentError::Parse(parse) = err else {
            panic!("expected parse error, got {err}");
        };
        assert!(parse.name.ends_with("templates/index.html"));
        assert_eq!(parse.line, 2);
    }
}
