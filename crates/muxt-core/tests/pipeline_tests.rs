//! Pipeline tests over real fixture packages: load → evaluate → bind →
//! check → emit, end to end.

use std::path::Path;

use pretty_assertions::assert_eq;

use muxt_core::analyze::{Analysis, AnalysisOptions, analyze};
use muxt_core::emit::{EmitConfig, generate};
use muxt_core::source::Package;

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

fn run(dir: &Path, receiver: Option<&str>, var: &str) -> muxt_core::error::MuxtResult<Analysis> {
    let package = Package::load(dir)?;
    let opts = AnalysisOptions {
        templates_variable: var.to_string(),
        receiver_type: receiver.map(String::from),
        receiver_package: None,
    };
    analyze(&package, &opts)
}

fn emitted(analysis: &Analysis) -> String {
    let cfg = EmitConfig {
        templates_var: analysis.environment.var_ident.clone(),
        ..EmitConfig::default()
    };
    generate(&analysis.routes, &cfg)
}

// ── scenario: a bare static route ─────────────────────────────────────────

#[test]
fn static_root_route_renders_with_empty_data() {
    let dir = write_package(&[(
        "lib.rs",
        r#"
use muxt_templates as template;

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("GET /").parse("<h1>hi</h1>"))
});
"#,
    )]);
    let analysis = run(dir.path(), None, "TEMPLATES").unwrap();
    assert!(analysis.errors.is_empty(), "{}", analysis.errors);
    assert_eq!(analysis.routes.len(), 1);
    let route = &analysis.routes[0];
    assert!(route.method.is_none());
    assert_eq!(route.route.default_status(), 200);

    let code = emitted(&analysis);
    assert!(code.contains(r#"router.route("/", axum::routing::get("#));
    assert!(code.contains("let mut status: u16 = 200;"));
    assert!(code.contains("let result_value: Option<()> = Some(());"));
}

// ── scenario: typed placeholder with error handling ───────────────────────

const USER_APP: &str = r#"
use muxt_templates as template;

pub struct Server;

pub struct User {
    pub name: String,
}

pub struct AppError;

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("lookup failed")
    }
}

impl Server {
    pub fn get_user(&self, ctx: &http::Extensions, id: i64) -> Result<User, AppError> {
        let _ = (ctx, id);
        Err(AppError)
    }
}

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("GET /user/{id} get_user(ctx, id)")
            .parse("{{if .Err}}{{.Err.Error}}{{else}}{{.Result.name}}{{end}}"),
    )
});
"#;

#[test]
fn placeholder_route_parses_id_and_guards_with_400() {
    let dir = write_package(&[("lib.rs", USER_APP)]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    assert!(analysis.errors.is_empty(), "{}", analysis.errors);

    let code = emitted(&analysis);
    // /user/42 parses into an i64 before the method runs; /user/abc never
    // reaches the method.
    assert!(code.contains("raw_id.parse::<i64>()"));
    let parse_idx = code.find("raw_id.parse::<i64>()").unwrap();
    let call_idx = code.find("receiver.get_user(").unwrap();
    assert!(parse_idx < call_idx, "placeholder parse precedes the call");
    assert!(code.contains("Err(_) => return muxt_error_response(axum::http::StatusCode::BAD_REQUEST)"));
    // Unhandled errors produce 500 (AppError has no status_code).
    assert!(code.contains("status = 500;"));
    assert!(code.contains("err_list.push(err.to_string());"));
}

// ── scenario: form decoding with input constraints ────────────────────────

const FORM_APP: &str = r#"
use muxt_templates as template;

pub struct Server;

pub struct SignUp {
    pub username: String,
    pub age: i64,
}

pub struct User {
    pub name: String,
}

pub struct SignUpError;

impl std::fmt::Display for SignUpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid sign-up")
    }
}

impl Server {
    pub fn create_user(&self, ctx: &http::Extensions, form: SignUp) -> Result<User, SignUpError> {
        let _ = (ctx, form);
        Err(SignUpError)
    }
}

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("POST /user 201 create_user(ctx, form)")
            .parse("<form><input name=username><input name=age min=18></form>{{.Result.name}}"),
    )
});
"#;

#[test]
fn form_route_enforces_input_constraints_and_declared_status() {
    let dir = write_package(&[("lib.rs", FORM_APP)]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    assert!(analysis.errors.is_empty(), "{}", analysis.errors);
    assert_eq!(analysis.routes[0].route.default_status(), 201);

    let code = emitted(&analysis);
    // Age=17 trips the min bound from the template's input tag; Age=18
    // proceeds to the 201 render.
    assert!(code.contains("let mut status: u16 = 201;"));
    assert!(code.contains("if parsed < 18"));
    assert!(code.contains("value.parse::<i64>()"));
    assert!(code.contains("form_urlencoded::parse"));
    assert!(code.contains("SignUp {"));
}

// ── scenario: error-only handler under a declared status ──────────────────

const DELETE_APP: &str = r#"
use muxt_templates as template;

pub struct Server;

pub struct DeleteError;

impl std::fmt::Display for DeleteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("delete failed")
    }
}

impl Server {
    pub fn delete_user(&self, ctx: &http::Extensions, id: i64) -> Result<(), DeleteError> {
        let _ = (ctx, id);
        Ok(())
    }
}

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("DELETE /user/{id} 204 delete_user(ctx, id)").parse(""))
});
"#;

#[test]
fn error_only_route_uses_204_success_and_500_failure() {
    let dir = write_package(&[("lib.rs", DELETE_APP)]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    assert!(analysis.errors.is_empty(), "{}", analysis.errors);

    let code = emitted(&analysis);
    assert!(code.contains("let mut status: u16 = 204;"));
    assert!(code.contains("Ok(()) => Some(()),"));
    assert!(code.contains("status = 500;"));
}

#[test]
fn error_status_code_method_overrides_500() {
    let app = DELETE_APP.replace(
        "pub struct DeleteError;",
        "pub struct DeleteError;\nimpl DeleteError { pub fn status_code(&self) -> u16 { 409 } }",
    );
    let dir = write_package(&[("lib.rs", &app)]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    let code = emitted(&analysis);
    assert!(code.contains("status = err.status_code() as u16;"));
}

// ── scenario: sub-template typing across files ────────────────────────────

const ARTICLE_LIB: &str = r#"
use muxt_templates as template;

pub struct Server;

pub struct Article {
    pub title: String,
}

pub struct LoadError;

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("load failed")
    }
}

impl Server {
    pub fn get_article(&self, ctx: &http::Extensions, id: i64) -> Result<Article, LoadError> {
        let _ = (ctx, id);
        Err(LoadError)
    }
}

static ASSETS: template::Files = template::embed_files!("templates/*.html");

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("GET /article/{id} get_article(ctx, id)")
            .parse_files(&ASSETS, &["*.html"])
            .new_root("GET /article/{id} get_article(ctx, id)")
            .parse("{{template \"row.html\" .Result}}"),
    )
});
"#;

#[test]
fn sub_template_checks_under_the_computed_argument_type() {
    let dir = write_package(&[
        ("lib.rs", ARTICLE_LIB),
        ("templates/row.html", "<h2>{{.title}}</h2>"),
    ]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    assert!(analysis.errors.is_empty(), "{}", analysis.errors);
    assert_eq!(analysis.refs.len(), 1);
    assert_eq!(analysis.refs[0].callee, "row.html");
}

#[test]
fn sub_template_error_points_at_its_own_file() {
    let dir = write_package(&[
        ("lib.rs", ARTICLE_LIB),
        ("templates/row.html", "<h2>\n{{.nonexistent_field}}</h2>"),
    ]);
    let analysis = run(dir.path(), Some("Server"), "TEMPLATES").unwrap();
    assert_eq!(analysis.errors.len(), 1);
    let message = analysis.errors.to_string();
    assert!(
        message.contains("row.html:2:"),
        "diagnostic should carry the sub-template's own file position: {message}"
    );
    assert!(message.contains("no field or method nonexistent_field"));
}

// ── scenario: independent variables, independent surfaces ─────────────────

const TWO_VARS: &str = r#"
use muxt_templates as template;

pub struct Site;

pub struct Page {
    pub body: String,
}

pub struct PageError;

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("page error")
    }
}

impl Site {
    pub fn public_page(&self, ctx: &http::Extensions) -> Result<Page, PageError> {
        let _ = ctx;
        Err(PageError)
    }
    pub fn admin_page(&self, ctx: &http::Extensions) -> Result<Page, PageError> {
        let _ = ctx;
        Err(PageError)
    }
}

static PUBLIC_TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("GET / public_page(ctx)").parse("{{.Result.body}}"))
});

static ADMIN_TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(template::new("GET /admin admin_page(ctx)").parse("{{.Result.body}}"))
});
"#;

#[test]
fn two_variables_produce_disjoint_receiver_interfaces() {
    let dir = write_package(&[("lib.rs", TWO_VARS)]);

    let public = run(dir.path(), Some("Site"), "PUBLIC_TEMPLATES").unwrap();
    let admin = run(dir.path(), Some("Site"), "ADMIN_TEMPLATES").unwrap();
    assert!(public.errors.is_empty(), "{}", public.errors);
    assert!(admin.errors.is_empty(), "{}", admin.errors);

    let public_code = emitted(&public);
    let admin_code = emitted(&admin);
    assert!(public_code.contains("fn public_page"));
    assert!(!public_code.contains("fn admin_page"));
    assert!(admin_code.contains("fn admin_page"));
    assert!(!admin_code.contains("fn public_page"));
}

// ── reconstruction equals runtime parsing ─────────────────────────────────

#[test]
fn evaluator_trees_match_direct_runtime_parsing() {
    let dir = write_package(&[(
        "lib.rs",
        r#"
use muxt_templates as template;

static TEMPLATES: template::LazySet = template::lazy(|| {
    template::must(
        template::new("GET /")
            .parse("<main>{{define \"row\"}}<li>{{.}}</li>{{end}}{{template \"row\"}}</main>"),
    )
});
"#,
    )]);
    let analysis = run(dir.path(), None, "TEMPLATES").unwrap();

    // What a faithful runtime would hold.
    let runtime = muxt_templates::must(muxt_templates::new("GET /").parse(
        "<main>{{define \"row\"}}<li>{{.}}</li>{{end}}{{template \"row\"}}</main>",
    ));

    let evaluated: Vec<(String, String)> = analysis
        .environment
        .set
        .trees()
        .iter()
        .map(|(name, tree)| (name.clone(), tree.to_string()))
        .collect();
    let direct: Vec<(String, String)> = runtime
        .trees()
        .iter()
        .map(|(name, tree)| (name.clone(), tree.to_string()))
        .collect();
    assert_eq!(evaluated, direct);
    assert_eq!(
        analysis.environment.set.func_names(),
        runtime.func_names()
    );
    assert_eq!(analysis.environment.delims, ("{{".to_string(), "}}".to_string()));
}
