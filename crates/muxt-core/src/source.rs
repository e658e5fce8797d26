//! Package loading and AST utilities.
//!
//! [`Package::load`] walks a package directory, parses every Rust source
//! file with `syn`, and keeps the original text so spans resolve to
//! `file:line:column`. [`TypeIndex`] is the analyzer's view of the host type
//! system: structs with their fields, inherent impl methods, and free
//! functions, gathered across the package (nested inline modules included).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use proc_macro2::Span;
use thiserror::Error;
use tracing::debug;

use crate::error::SourcePos;

#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("no Rust package found at {dir}")]
    PackageNotFound { dir: PathBuf },

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("{file}:{line}:{column}: {message}")]
    Parse {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("receiver type {ident:?} not found in package")]
    ReceiverNotFound { ident: String },
}

/// One parsed source file.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub ast: syn::File,
}

impl SourceFile {
    /// Resolve a span to a position in this file.
    pub fn pos(&self, span: Span) -> SourcePos {
        let start = span.start();
        SourcePos::new(
            self.path.display().to_string(),
            start.line,
            start.column + 1,
            0,
        )
    }
}

/// A loaded package: every `.rs` file under one directory.
#[derive(Debug)]
pub struct Package {
    pub dir: PathBuf,
    pub files: Vec<SourceFile>,
}

/// A package-level `static` or `const` with its initializer.
pub struct ValueDef<'a> {
    pub file: &'a SourceFile,
    pub ident: String,
    pub expr: &'a syn::Expr,
}

impl Package {
    /// Load every Rust source file under `dir`, skipping `target/` and
    /// hidden directories. Fails with [`SourceError::PackageNotFound`] when
    /// nothing parsable is there.
    pub fn load(dir: &Path) -> Result<Self, SourceError> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(name == "target" || (name.starts_with('.') && name.len() > 1))
            })
        {
            let entry = entry.map_err(|e| SourceError::Io {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "rs")
            {
                paths.push(entry.path().to_path_buf());
            }
        }
        paths.sort();
        if paths.is_empty() {
            return Err(SourceError::PackageNotFound {
                dir: dir.to_path_buf(),
            });
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|e| SourceError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let ast = syn::parse_file(&text).map_err(|e| {
                let start = e.span().start();
                SourceError::Parse {
                    file: path.clone(),
                    line: start.line,
                    column: start.column + 1,
                    message: e.to_string(),
                }
            })?;
            files.push(SourceFile { path, text, ast });
        }
        debug!(dir = %dir.display(), files = files.len(), "package loaded");
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    /// Find a package-level `static` or `const` by identifier.
    pub fn find_value(&self, ident: &str) -> Option<ValueDef<'_>> {
        for file in &self.files {
            for item in items_recursive(&file.ast.items) {
                match item {
                    syn::Item::Static(item) if item.ident == ident => {
                        return Some(ValueDef {
                            file,
                            ident: item.ident.to_string(),
                            expr: &item.expr,
                        });
                    }
                    syn::Item::Const(item) if item.ident == ident => {
                        return Some(ValueDef {
                            file,
                            ident: item.ident.to_string(),
                            expr: &item.expr,
                        });
                    }
                    _ => {}
                }
            }
        }
        None
    }

    /// Identifiers of every package-level `static`/`const`, in file order.
    pub fn value_idents(&self) -> Vec<String> {
        let mut out = Vec::new();
        for file in &self.files {
            for item in items_recursive(&file.ast.items) {
                match item {
                    syn::Item::Static(item) => out.push(item.ident.to_string()),
                    syn::Item::Const(item) => out.push(item.ident.to_string()),
                    _ => {}
                }
            }
        }
        out
    }

    /// The local alias of the `muxt_templates` crate in `file`:
    /// `use muxt_templates as template` establishes `template`; a plain
    /// `use muxt_templates` establishes the crate name itself.
    pub fn template_alias(&self, file: &SourceFile) -> Option<String> {
        for item in &file.ast.items {
            let syn::Item::Use(use_item) = item else {
                continue;
            };
            if let Some(alias) = use_alias(&use_item.tree) {
                return Some(alias);
            }
        }
        None
    }

    /// Build the type index across all files.
    pub fn type_index(&self) -> TypeIndex {
        let mut index = TypeIndex::default();
        for file in &self.files {
            for item in items_recursive(&file.ast.items) {
                index.add_item(item);
            }
        }
        index
    }
}

/// Walk items including inline `mod` bodies.
fn items_recursive(items: &[syn::Item]) -> Vec<&syn::Item> {
    let mut out = Vec::new();
    let mut stack: Vec<&syn::Item> = items.iter().collect();
    stack.reverse();
    while let Some(item) = stack.pop() {
        if let syn::Item::Mod(module) = item {
            if let Some((_, nested)) = &module.content {
                for nested_item in nested.iter().rev() {
                    stack.push(nested_item);
                }
            }
            continue;
        }
        out.push(item);
    }
    out
}

fn use_alias(tree: &syn::UseTree) -> Option<String> {
    match tree {
        syn::UseTree::Name(name) if name.ident == "muxt_templates" => {
            Some("muxt_templates".to_string())
        }
        syn::UseTree::Rename(rename) if rename.ident == "muxt_templates" => {
            Some(rename.rename.to_string())
        }
        // `use muxt_templates::{…}` keeps the crate path usable too.
        syn::UseTree::Path(path) if path.ident == "muxt_templates" => {
            Some("muxt_templates".to_string())
        }
        _ => None,
    }
}

// ── type index ────────────────────────────────────────────────────────────

/// A struct field as the analyzer sees it.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub ident: String,
    pub ty: syn::Type,
    /// `#[serde(rename = "…")]` override; this is the name templates and
    /// form decoding see.
    pub rename: Option<String>,
}

impl FieldInfo {
    /// The externally-visible name.
    pub fn name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.ident)
    }
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub ident: String,
    pub fields: Vec<FieldInfo>,
}

/// A method from an inherent `impl` block.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub ident: String,
    pub takes_self: bool,
    /// Parameters after `self`: `(identifier, type)`.
    pub params: Vec<(String, syn::Type)>,
    pub output: Option<syn::Type>,
}

/// A free function (candidate template function).
#[derive(Debug, Clone)]
pub struct FnInfo {
    pub ident: String,
    pub params: Vec<(String, syn::Type)>,
    pub output: Option<syn::Type>,
}

/// The package's types: structs, inherent methods, free functions.
#[derive(Debug, Default)]
pub struct TypeIndex {
    structs: BTreeMap<String, StructInfo>,
    methods: BTreeMap<String, Vec<MethodInfo>>,
    fns: BTreeMap<String, FnInfo>,
    /// Every named type declared in the package, enums included.
    types: BTreeSet<String>,
    /// `(type, trait)` pairs from trait impl blocks, trait path reduced to
    /// its last segment.
    trait_impls: BTreeSet<(String, String)>,
}

impl TypeIndex {
    pub(crate) fn add_item(&mut self, item: &syn::Item) {
        match item {
            syn::Item::Struct(item) => {
                self.types.insert(item.ident.to_string());
                let fields = match &item.fields {
                    syn::Fields::Named(named) => named
                        .named
                        .iter()
                        .filter_map(|field| {
                            let ident = field.ident.as_ref()?.to_string();
                            Some(FieldInfo {
                                rename: serde_rename(&field.attrs),
                                ident,
                                ty: field.ty.clone(),
                            })
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                self.structs.insert(
                    item.ident.to_string(),
                    StructInfo {
                        ident: item.ident.to_string(),
                        fields,
                    },
                );
            }
            syn::Item::Enum(item) => {
                self.types.insert(item.ident.to_string());
            }
            syn::Item::Impl(item) => {
                let Some(self_ident) = type_ident(&item.self_ty) else {
                    return;
                };
                if let Some((_, trait_path, _)) = &item.trait_ {
                    if let Some(last) = trait_path.segments.last() {
                        self.trait_impls
                            .insert((self_ident, last.ident.to_string()));
                    }
                    return;
                }
                let methods = self.methods.entry(self_ident).or_default();
                for impl_item in &item.items {
                    let syn::ImplItem::Fn(f) = impl_item else {
                        continue;
                    };
                    methods.push(method_info(&f.sig));
                }
            }
            syn::Item::Fn(item) => {
                let info = method_info(&item.sig);
                self.fns.insert(
                    item.sig.ident.to_string(),
                    FnInfo {
                        ident: info.ident,
                        params: info.params,
                        output: info.output,
                    },
                );
            }
            _ => {}
        }
    }

    pub fn has_type(&self, ident: &str) -> bool {
        self.types.contains(ident)
    }

    pub fn struct_info(&self, ident: &str) -> Option<&StructInfo> {
        self.structs.get(ident)
    }

    pub fn field(&self, ty: &str, name: &str) -> Option<&FieldInfo> {
        self.structs
            .get(ty)?
            .fields
            .iter()
            .find(|f| f.name() == name || f.ident == name)
    }

    pub fn method(&self, ty: &str, name: &str) -> Option<&MethodInfo> {
        self.methods
            .get(ty)?
            .iter()
            .find(|m| m.ident == name)
    }

    pub fn methods_of(&self, ty: &str) -> &[MethodInfo] {
        self.methods.get(ty).map_or(&[], Vec::as_slice)
    }

    pub fn fn_info(&self, ident: &str) -> Option<&FnInfo> {
        self.fns.get(ident)
    }

    /// Does `ty` implement `trait_name` (by trait-path tail) in this
    /// package? Also true for an inherent method of the same name
    /// convention (`from_str`).
    pub fn has_trait(&self, ty: &str, trait_name: &str) -> bool {
        self.trait_impls
            .contains(&(ty.to_string(), trait_name.to_string()))
    }

    /// Merge another package's index in (receiver packages). Existing
    /// entries win.
    pub fn merge(&mut self, other: TypeIndex) {
        for (k, v) in other.structs {
            self.structs.entry(k).or_insert(v);
        }
        for (k, v) in other.methods {
            self.methods.entry(k).or_default().extend(v);
        }
        for (k, v) in other.fns {
            self.fns.entry(k).or_insert(v);
        }
        self.types.extend(other.types);
        self.trait_impls.extend(other.trait_impls);
    }
}

fn method_info(sig: &syn::Signature) -> MethodInfo {
    let takes_self = matches!(sig.inputs.first(), Some(syn::FnArg::Receiver(_)));
    let params = sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            syn::FnArg::Typed(pat) => {
                let ident = match pat.pat.as_ref() {
                    syn::Pat::Ident(p) => p.ident.to_string(),
                    other => quote_pat(other),
                };
                Some((ident, (*pat.ty).clone()))
            }
            syn::FnArg::Receiver(_) => None,
        })
        .collect();
    let output = match &sig.output {
        syn::ReturnType::Default => None,
        syn::ReturnType::Type(_, ty) => Some((**ty).clone()),
    };
    MethodInfo {
        ident: sig.ident.to_string(),
        takes_self,
        params,
        output,
    }
}

fn quote_pat(pat: &syn::Pat) -> String {
    // Non-identifier patterns keep a printable spelling for diagnostics.
    format!("{pat:?}").chars().take(24).collect()
}

/// The last path segment of a type, references and `Box` peeled.
pub fn type_ident(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Reference(r) => type_ident(&r.elem),
        syn::Type::Paren(p) => type_ident(&p.elem),
        syn::Type::Group(g) => type_ident(&g.elem),
        syn::Type::Path(path) => {
            let last = path.path.segments.last()?;
            if last.ident == "Box" {
                if let syn::PathArguments::AngleBracketed(args) = &last.arguments {
                    if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                        return type_ident(inner);
                    }
                }
            }
            Some(last.ident.to_string())
        }
        _ => None,
    }
}

/// First generic type argument of a path type (`Vec<T>` → `T`).
pub fn first_type_argument(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(path) = peel_type(ty) else {
        return None;
    };
    let last = path.path.segments.last()?;
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

/// Strip references, parens, and groups.
pub fn peel_type(ty: &syn::Type) -> &syn::Type {
    match ty {
        syn::Type::Reference(r) => peel_type(&r.elem),
        syn::Type::Paren(p) => peel_type(&p.elem),
        syn::Type::Group(g) => peel_type(&g.elem),
        _ => ty,
    }
}

fn serde_rename(attrs: &[syn::Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let mut rename = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
            }
            Ok(())
        });
        if rename.is_some() {
            return rename;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn load_rejects_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = Package::load(dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::PackageNotFound { .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_position() {
        let dir = write_package(&[("lib.rs", "fn broken( {")]);
        let err = Package::load(dir.path()).unwrap_err();
        let SourceError::Parse { line, .. } = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(line, 1);
    }

    #[test]
    fn find_value_locates_statics_and_consts() {
        let dir = write_package(&[(
            "lib.rs",
            "static FOO: i32 = 1;\nconst BAR: &str = \"x\";\n",
        )]);
        let package = Package::load(dir.path()).unwrap();
        assert!(package.find_value("FOO").is_some());
        assert!(package.find_value("BAR").is_some());
        assert!(package.find_value("MISSING").is_none());
    }

    #[test]
    fn template_alias_from_use_declarations() {
        let dir = write_package(&[
            ("a.rs", "use muxt_templates as template;\n"),
            ("b.rs", "use muxt_templates;\n"),
            ("c.rs", "use std::fmt;\n"),
        ]);
        let package = Package::load(dir.path()).unwrap();
        let alias = |name: &str| {
            let file = package
                .files
                .iter()
                .find(|f| f.path.file_name().unwrap() == name)
                .unwrap();
            package.template_alias(file)
        };
        assert_eq!(alias("a.rs").as_deref(), Some("template"));
        assert_eq!(alias("b.rs").as_deref(), Some("muxt_templates"));
        assert_eq!(alias("c.rs"), None);
    }

    #[test]
    fn type_index_collects_fields_methods_and_fns() {
        let dir = write_package(&[(
            "lib.rs",
            r#"
pub struct User {
    pub name: String,
    #[serde(rename = "emailAddress")]
    pub email: String,
}

impl User {
    pub fn display_name(&self) -> String { self.name.clone() }
    pub fn lookup(&self, id: i64) -> Option<User> { let _ = id; None }
}

pub fn upper(s: &str) -> String { s.to_uppercase() }

mod nested {
    pub struct Inner { pub x: i64 }
}
"#,
        )]);
        let package = Package::load(dir.path()).unwrap();
        let index = package.type_index();

        assert!(index.has_type("User"));
        assert!(index.has_type("Inner"), "nested modules are indexed");
        assert_eq!(index.struct_info("User").unwrap().fields.len(), 2);
        assert_eq!(
            index.field("User", "emailAddress").unwrap().ident,
            "email",
            "serde rename is the visible name"
        );
        let method = index.method("User", "display_name").unwrap();
        assert!(method.takes_self);
        assert!(method.params.is_empty());
        assert!(index.fn_info("upper").is_some());
        assert_eq!(index.method("User", "lookup").unwrap().params.len(), 1);
    }

    #[test]
    fn type_ident_peels_wrappers() {
        let ty: syn::Type = syn::parse_str("&mut Box<User>").unwrap();
        assert_eq!(type_ident(&ty).as_deref(), Some("User"));
        let ty: syn::Type = syn::parse_str("Vec<Item>").unwrap();
        assert_eq!(type_ident(&ty).as_deref(), Some("Vec"));
    }
}
