//! The analysis pipeline and its read-only reports.
//!
//! [`analyze`] runs loader → evaluator → resolver → checker once and keeps
//! every intermediate result; `check`, `routes`, `template-callers`,
//! `template-calls`, `template-source`, and `documentation` are all views
//! over the same [`Analysis`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::PathBuf;

use quote::ToTokens;
use syn::visit::Visit;
use tracing::debug;

use crate::check::{CheckError, Checker, TemplateRef, TypeRef};
use crate::environment::{Environment, evaluate};
use crate::error::{ErrorList, MuxtResult, SourcePos};
use crate::forest::Forest;
use crate::resolve::{ResolvedRoute, bind_routes, path_method_types};
use crate::source::{Package, SourceError, SourceFile};

/// Pipeline configuration shared by every command.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub templates_variable: String,
    pub receiver_type: Option<String>,
    /// A second package directory to load the receiver type from.
    pub receiver_package: Option<PathBuf>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            templates_variable: crate::DEFAULT_TEMPLATES_VARIABLE.into(),
            receiver_type: None,
            receiver_package: None,
        }
    }
}

/// A `TEMPLATES.execute("name", …)` call found in user source.
#[derive(Debug, Clone)]
pub struct ExecuteSite {
    pub template: String,
    pub pos: SourcePos,
}

/// Everything one pass over a package produces.
#[derive(Debug)]
pub struct Analysis {
    pub environment: Environment,
    pub routes: Vec<ResolvedRoute>,
    pub refs: Vec<TemplateRef>,
    pub execute_sites: Vec<ExecuteSite>,
    /// Collected route-level and template-level diagnostics.
    pub errors: ErrorList,
}

/// Run the full pipeline. Unrecoverable failures (package, environment)
/// short-circuit; route and template errors are collected in the result.
pub fn analyze(package: &Package, opts: &AnalysisOptions) -> MuxtResult<Analysis> {
    let mut index = package.type_index();
    if let Some(dir) = &opts.receiver_package {
        let receiver_package = Package::load(dir)?;
        index.merge(receiver_package.type_index());
    }
    if let Some(receiver) = &opts.receiver_type {
        if !index.has_type(receiver) {
            return Err(SourceError::ReceiverNotFound {
                ident: receiver.clone(),
            }
            .into());
        }
    }

    let environment = evaluate(package, &index, &opts.templates_variable)?;
    let binding = bind_routes(&environment, &index, opts.receiver_type.as_deref());
    let mut errors = ErrorList(binding.errors);

    let forest = Forest::new(&environment.set);
    let path_methods = path_method_types(&binding.routes, &index);
    let mut checker =
        Checker::new(&index, &forest, &environment.funcs).with_path_methods(path_methods);

    for route in &binding.routes {
        if let Some(tree) = forest.find_tree(&route.template_name) {
            checker.check_tree(tree, route.data_type.clone());
        }
    }

    let execute_sites = find_execute_sites(package, &opts.templates_variable);
    for site in &execute_sites {
        match forest.find_tree(&site.template) {
            // The data expression's type is not recoverable statically, so
            // execute sites check their target permissively.
            Some(tree) => checker.check_tree(tree, TypeRef::Any),
            None => errors.push(CheckError {
                pos: site.pos.clone(),
                message: format!("template {:?} not defined", site.template),
            }),
        }
    }

    let (check_errors, refs) = checker.into_results();
    errors.extend(check_errors);
    debug!(
        routes = binding.routes.len(),
        refs = refs.len(),
        sites = execute_sites.len(),
        errors = errors.len(),
        "analysis complete"
    );

    Ok(Analysis {
        environment,
        routes: binding.routes,
        refs,
        execute_sites,
        errors,
    })
}

impl Analysis {
    /// Template names defined in the forest but unreachable from any
    /// execute site (routes included) through `{{template}}` references.
    /// Templates whose bodies are empty after trimming are ignored.
    pub fn unused_templates(&self) -> Vec<String> {
        let mut reachable: BTreeSet<&str> = BTreeSet::new();
        let mut queue: Vec<&str> = Vec::new();
        for route in &self.routes {
            queue.push(&route.template_name);
        }
        for site in &self.execute_sites {
            queue.push(&site.template);
        }
        while let Some(name) = queue.pop() {
            if !reachable.insert(name) {
                continue;
            }
            for reference in &self.refs {
                if reference.caller == name {
                    queue.push(&reference.callee);
                }
            }
        }
        self.environment
            .set
            .trees()
            .iter()
            .filter(|(name, tree)| !reachable.contains(name.as_str()) && !tree.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The `routes` report: every route, its bound method, and the
    /// template source.
    pub fn routes_report(&self) -> String {
        let mut out = String::new();
        for route in &self.routes {
            let signature = match &route.method {
                Some(method) => {
                    let args: Vec<String> = method
                        .bindings
                        .iter()
                        .map(|b| format!("{:?}", BindingBrief(b)))
                        .collect();
                    format!("{}({})", method.ident, args.join(", "))
                }
                None => "(static render)".to_string(),
            };
            let _ = writeln!(
                out,
                "{}\n  status: {}\n  handler: {}\n  data: {}",
                route.template_name,
                route.route.default_status(),
                signature,
                route.data_type,
            );
            if let Some(tree) = self.environment.set.find_tree(&route.template_name) {
                for line in tree.to_string().lines() {
                    let _ = writeln!(out, "  | {line}");
                }
            }
        }
        out
    }

    /// The `template-callers` report: who renders each template.
    pub fn template_callers(&self, filter: Option<&str>) -> String {
        let mut out = String::new();
        for name in self.environment.set.trees().keys() {
            if filter.is_some_and(|f| f != name) {
                continue;
            }
            let mut lines: Vec<String> = Vec::new();
            for route in &self.routes {
                if route.template_name == *name {
                    lines.push(format!("  route {} with {}", route.route, route.data_type));
                }
            }
            for site in &self.execute_sites {
                if site.template == *name {
                    lines.push(format!("  executed at {}", site.pos));
                }
            }
            for reference in &self.refs {
                if reference.callee == *name {
                    lines.push(format!(
                        "  included from {:?} at {} with {}",
                        reference.caller, reference.pos, reference.arg
                    ));
                }
            }
            if filter.is_none() && lines.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{name}");
            if lines.is_empty() {
                let _ = writeln!(out, "  (no callers)");
            }
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        }
        out
    }

    /// The `template-calls` report: what each template invokes.
    pub fn template_calls(&self, filter: Option<&str>) -> String {
        let mut calls: BTreeMap<&str, Vec<&TemplateRef>> = BTreeMap::new();
        for reference in &self.refs {
            calls.entry(&reference.caller).or_default().push(reference);
        }
        let mut out = String::new();
        for name in self.environment.set.trees().keys() {
            if filter.is_some_and(|f| f != name) {
                continue;
            }
            let Some(refs) = calls.get(name.as_str()) else {
                if filter.is_some() {
                    let _ = writeln!(out, "{name}\n  (no template calls)");
                }
                continue;
            };
            let _ = writeln!(out, "{name}");
            for reference in refs {
                let _ = writeln!(
                    out,
                    "  calls {:?} at {} with {}",
                    reference.callee, reference.pos, reference.arg
                );
            }
        }
        out
    }

    /// The `template-source` report for one template.
    pub fn template_source(&self, name: &str) -> Option<String> {
        self.environment
            .set
            .find_tree(name)
            .map(|tree| tree.to_string())
    }

    /// The `documentation` report: routes, methods, and sources combined.
    pub fn documentation(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# Routes for {} ({} templates, {} routes)\n",
            self.environment.var_ident,
            self.environment.set.trees().len(),
            self.routes.len()
        );
        out.push_str(&self.routes_report());
        let unused = self.unused_templates();
        if !unused.is_empty() {
            let _ = writeln!(out, "\nUnused templates:");
            for name in unused {
                let _ = writeln!(out, "  {name}");
            }
        }
        out
    }
}

/// Compact argument rendering for the routes report.
struct BindingBrief<'a>(&'a crate::resolve::ArgBinding);

impl fmt::Debug for BindingBrief<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::resolve::ArgBinding;
        match self.0 {
            ArgBinding::Ctx => write!(f, "ctx"),
            ArgBinding::Request => write!(f, "request"),
            ArgBinding::Response => write!(f, "response"),
            ArgBinding::Path { name, ty_text, .. } => write!(f, "{name}: {ty_text}"),
            ArgBinding::Form { ty_text, .. } => write!(f, "form: {ty_text}"),
        }
    }
}

// ── execute-site discovery ────────────────────────────────────────────────

/// Find `VAR.execute("name", …)` / `VAR.execute_to_string("name", …)`
/// method calls anywhere in the package.
pub fn find_execute_sites(package: &Package, var: &str) -> Vec<ExecuteSite> {
    let mut out = Vec::new();
    for file in &package.files {
        let mut visitor = SiteVisitor {
            var,
            file,
            out: &mut out,
        };
        visitor.visit_file(&file.ast);
    }
    out
}

struct SiteVisitor<'a> {
    var: &'a str,
    file: &'a SourceFile,
    out: &'a mut Vec<ExecuteSite>,
}

impl<'a> Visit<'a> for SiteVisitor<'_> {
    fn visit_expr_method_call(&mut self, node: &'a syn::ExprMethodCall) {
        let method = node.method.to_string();
        if method == "execute" || method == "execute_to_string" {
            let receiver_text = node.receiver.to_token_stream().to_string();
            let mentions_var = receiver_text
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .any(|word| word == self.var);
            if mentions_var {
                if let Some(syn::Expr::Lit(lit)) = node.args.first() {
                    if let syn::Lit::Str(name) = &lit.lit {
                        self.out.push(ExecuteSite {
                            template: name.value(),
                            pos: self.file.pos(node.method.span()),
                        });
                    }
                }
            }
        }
        syn::visit::visit_expr_method_call(self, node);
    }
}
