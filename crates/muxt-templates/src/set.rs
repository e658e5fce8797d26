//! Named template sets.
//!
//! A [`TemplateSet`] owns a family of parse trees, the function map they may
//! call, and the active delimiters. The builder methods consume and return
//! the set so declarations read as one chain:
//!
//! ```
//! use muxt_templates as template;
//!
//! let set = template::must(
//!     template::new("greet").parse("hello {{.name}}"),
//! );
//! let mut out = String::new();
//! # let data = template::Value::from_serialize(&std::collections::BTreeMap::from([("name", "you")]));
//! set.execute("greet", &data, &mut out).unwrap();
//! assert_eq!(out, "hello you");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use crate::error::{ParseError, RenderError};
use crate::exec;
use crate::files::Files;
use crate::node::Tree;
use crate::parse;
use crate::value::Value;

/// A render-time template function: values in, value or message out.
pub type TemplateFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Start a new set whose main template is `name`.
pub fn new(name: &str) -> TemplateSet {
    TemplateSet::new(name)
}

/// Unwrap a parse result, panicking with the parse error's message.
///
/// Meant for static initializers, where a template error is a programming
/// error and startup should fail loudly.
pub fn must(result: Result<TemplateSet, ParseError>) -> TemplateSet {
    match result {
        Ok(set) => set,
        Err(err) => panic!("{err}"),
    }
}

/// A lazily-built set for `static` declarations.
pub type LazySet = LazyLock<TemplateSet>;

/// Wrap a constructor for a `static` declaration:
/// `static TEMPLATES: LazySet = lazy(|| …);`
pub const fn lazy(f: fn() -> TemplateSet) -> LazySet {
    LazyLock::new(f)
}

/// What a missing map key evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum MissingKey {
    /// Render `<no value>`.
    #[default]
    Default,
    /// Treat as the zero value.
    Zero,
    /// Fail rendering.
    Error,
}

/// A set of named templates sharing functions, options, and delimiters.
#[derive(Clone)]
pub struct TemplateSet {
    name: String,
    trees: BTreeMap<String, Tree>,
    left: String,
    right: String,
    funcs: BTreeMap<String, TemplateFn>,
    missing_key: MissingKey,
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSet")
            .field("name", &self.name)
            .field("templates", &self.trees.keys().collect::<Vec<_>>())
            .field("delims", &(&self.left, &self.right))
            .field("funcs", &self.funcs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TemplateSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            trees: BTreeMap::new(),
            left: crate::LEFT_DELIM.to_string(),
            right: crate::RIGHT_DELIM.to_string(),
            funcs: exec::builtin_funcs(),
            missing_key: MissingKey::Default,
        }
    }

    /// The set's (main template's) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The active delimiter pair.
    pub fn delimiters(&self) -> (&str, &str) {
        (&self.left, &self.right)
    }

    /// Switch the current root: subsequent `parse` calls define template
    /// `name` while keeping every template already in the set.
    pub fn new_root(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Change action delimiters for subsequent parses. Empty strings keep
    /// the defaults.
    pub fn delims(mut self, left: &str, right: &str) -> Self {
        if !left.is_empty() {
            self.left = left.to_string();
        }
        if !right.is_empty() {
            self.right = right.to_string();
        }
        self
    }

    /// Set a rendering option. Recognized: `missingkey=default`,
    /// `missingkey=invalid` (same), `missingkey=zero`, `missingkey=error`.
    /// Unrecognized options are ignored.
    pub fn option(mut self, opt: &str) -> Self {
        match opt {
            "missingkey=default" | "missingkey=invalid" => {
                self.missing_key = MissingKey::Default;
            }
            "missingkey=zero" => self.missing_key = MissingKey::Zero,
            "missingkey=error" => self.missing_key = MissingKey::Error,
            _ => {}
        }
        self
    }

    pub(crate) fn missing_key(&self) -> MissingKey {
        self.missing_key
    }

    /// Register template functions. Each pair is a name and anything
    /// convertible to a [`TemplateFn`] (see [`IntoTemplateFn`]).
    pub fn funcs<F: IntoTemplateFn, const N: usize>(mut self, pairs: [(&str, F); N]) -> Self {
        for (name, f) in pairs {
            self.funcs.insert(name.to_string(), f.into_template_fn());
        }
        self
    }

    /// Names of all registered functions, builtins included, sorted.
    pub fn func_names(&self) -> Vec<String> {
        self.funcs.keys().cloned().collect()
    }

    pub(crate) fn func(&self, name: &str) -> Option<&TemplateFn> {
        self.funcs.get(name)
    }

    fn func_name_set(&self) -> BTreeSet<String> {
        self.funcs.keys().cloned().collect()
    }

    /// Parse `text` as the body of the main template. `{{define}}` blocks
    /// inside it register additional templates.
    pub fn parse(self, text: &str) -> Result<Self, ParseError> {
        let name = self.name.clone();
        self.parse_source(&name, text, &name)
    }

    /// Parse `text` as template `name`, recording `parse_name` (usually a
    /// file path) for diagnostics.
    pub fn parse_source(
        mut self,
        name: &str,
        text: &str,
        parse_name: &str,
    ) -> Result<Self, ParseError> {
        let funcs = self.func_name_set();
        let trees = parse::parse(name, text, parse_name, &self.left, &self.right, &funcs)?;
        for (_, tree) in trees {
            parse::add_tree(&mut self.trees, tree);
        }
        Ok(self)
    }

    /// Parse every embedded file matching one of `patterns`. Each matched
    /// file is parsed as a template named after its basename; the entry path
    /// becomes the parse name.
    pub fn parse_files(mut self, files: &Files, patterns: &[&str]) -> Result<Self, ParseError> {
        let mut matched: Vec<&'static str> = Vec::new();
        for pattern in patterns {
            let compiled = glob::Pattern::new(pattern).map_err(|e| {
                ParseError::new(pattern.to_string(), 1, 1, format!("malformed pattern: {e}"))
            })?;
            let mut any = false;
            for path in files.paths() {
                if compiled.matches(path) || compiled.matches(basename(path)) {
                    any = true;
                    if !matched.contains(&path) {
                        matched.push(path);
                    }
                }
            }
            if !any {
                return Err(ParseError::new(
                    pattern.to_string(),
                    1,
                    1,
                    format!("pattern matches no files: {pattern:?}"),
                ));
            }
        }
        matched.sort_unstable();
        for path in matched {
            let text = files.get(path).unwrap_or_default();
            self = self.parse_source(basename(path), text, path)?;
        }
        Ok(self)
    }

    /// Look up a parse tree by template name.
    pub fn find_tree(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    /// All trees, keyed and ordered by name.
    pub fn trees(&self) -> &BTreeMap<String, Tree> {
        &self.trees
    }

    /// Render template `name` with `data`, appending to `out`.
    pub fn execute(&self, name: &str, data: &Value, out: &mut String) -> Result<(), RenderError> {
        exec::execute(self, name, data, out)
    }

    /// Render template `name` with `data` into a fresh string.
    pub fn execute_to_string(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        let mut out = String::new();
        self.execute(name, data, &mut out)?;
        Ok(out)
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Conversion into the uniform [`TemplateFn`] calling convention.
///
/// Implementations exist for the raw convention and for a handful of common
/// function-pointer shapes, so `.funcs([("upper", upper)])` works for a
/// plain `fn(&str) -> String`.
pub trait IntoTemplateFn {
    fn into_template_fn(self) -> TemplateFn;
}

impl IntoTemplateFn for TemplateFn {
    fn into_template_fn(self) -> TemplateFn {
        self
    }
}

impl IntoTemplateFn for fn(&[Value]) -> Result<Value, String> {
    fn into_template_fn(self) -> TemplateFn {
        Arc::new(self)
    }
}

impl IntoTemplateFn for fn(&str) -> String {
    fn into_template_fn(self) -> TemplateFn {
        Arc::new(move |args: &[Value]| match args {
            [Value::String(s)] => Ok(Value::String(self(s))),
            [other] => Err(format!("expected string argument, got {}", other.type_name())),
            _ => Err(format!("expected 1 argument, got {}", args.len())),
        })
    }
}

impl IntoTemplateFn for fn(String) -> String {
    fn into_template_fn(self) -> TemplateFn {
        Arc::new(move |args: &[Value]| match args {
            [Value::String(s)] => Ok(Value::String(self(s.clone()))),
            [other] => Err(format!("expected string argument, got {}", other.type_name())),
            _ => Err(format!("expected 1 argument, got {}", args.len())),
        })
    }
}

impl IntoTemplateFn for fn(i64) -> i64 {
    fn into_template_fn(self) -> TemplateFn {
        Arc::new(move |args: &[Value]| match args {
            [Value::Int(i)] => Ok(Value::Int(self(*i))),
            [other] => Err(format!("expected int argument, got {}", other.type_name())),
            _ => Err(format!("expected 1 argument, got {}", args.len())),
        })
    }
}

impl IntoTemplateFn for fn(Value) -> Value {
    fn into_template_fn(self) -> TemplateFn {
        Arc::new(move |args: &[Value]| match args {
            [v] => Ok(self(v.clone())),
            _ => Err(format!("expected 1 argument, got {}", args.len())),
        })
    }
}
