//! End-to-end tests for the muxt binary, driven against real fixture
//! packages written into temp directories.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn muxt() -> Command {
    Command::cargo_bin("muxt").unwrap()
}

/// Write a fixture package and return its directory.
fn fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
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

pub struct Server;

pub struct User {
    pub name: String,
}

pub struct AppError {
    pub message: String,
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Server {
    pub fn get_user(&self, ctx: &http::Extensions, id: i64) -> Result<User, AppError> {
        let _ = (ctx, id);
        Ok(User { name: "ada".into() })
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

// ── basic surface ─────────────────────────────────────────────────────────

#[test]
fn help_lists_commands() {
    muxt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("template-callers"))
        .stdout(predicate::str::contains("template-source"));
}

#[test]
fn version_command_prints_build_identifier() {
    muxt()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn completions_emit_a_script() {
    muxt()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("muxt"));
}

// ── generate ──────────────────────────────────────────────────────────────

#[test]
fn generate_writes_routes_file() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["generate", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success();
    let generated = dir.path().join("templates_routes.rs");
    let code = std::fs::read_to_string(&generated).unwrap();
    assert!(code.starts_with("// Code generated by muxt. DO NOT EDIT."));
    assert!(code.contains("pub trait RoutesReceiver"));
    assert!(code.contains("\"/user/{id}\""));
}

#[test]
fn generate_is_deterministic() {
    let dir = fixture(&[("lib.rs", APP)]);
    let run = || {
        muxt()
            .args(["generate", "--find-receiver-type", "Server"])
            .arg("-C")
            .arg(dir.path())
            .assert()
            .success();
        std::fs::read_to_string(dir.path().join("templates_routes.rs")).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn generate_honours_output_names() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args([
            "generate",
            "--find-receiver-type",
            "Server",
            "--output-file",
            "wiring.rs",
            "--output-routes-func",
            "register",
        ])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success();
    let code = std::fs::read_to_string(dir.path().join("wiring.rs")).unwrap();
    assert!(code.contains("pub fn register<R>"));
}

#[test]
fn generate_rejects_non_rs_output() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args([
            "generate",
            "--find-receiver-type",
            "Server",
            "--output-file",
            "routes.txt",
        ])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("must end in .rs"));
}

#[test]
fn generate_rejects_invalid_identifier() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args([
            "generate",
            "--find-receiver-type",
            "Server",
            "--output-routes-func",
            "9lives",
        ])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid identifier"));
}

#[test]
fn generate_fails_on_missing_method() {
    let app = APP.replace("get_user(ctx, id)", "missing_method(ctx, id)");
    let dir = fixture(&[("lib.rs", &app)]);
    muxt()
        .args(["generate", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no method missing_method"));
    assert!(!dir.path().join("templates_routes.rs").exists());
}

#[test]
fn two_variables_generate_two_files() {
    let app = format!(
        "{APP}\nstatic ADMIN: template::LazySet = template::lazy(|| {{\n    \
         template::must(template::new(\"GET /admin\").parse(\"<h1>admin</h1>\"))\n}});\n"
    );
    let dir = fixture(&[("lib.rs", &app)]);
    muxt()
        .args([
            "generate",
            "--find-receiver-type",
            "Server",
            "--find-templates-variable",
            "TEMPLATES",
            "--find-templates-variable",
            "ADMIN",
        ])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success();
    assert!(dir.path().join("templates_routes.rs").exists());
    let admin = std::fs::read_to_string(dir.path().join("admin_routes.rs")).unwrap();
    assert!(admin.contains("\"/admin\""));
    assert!(
        !admin.contains("get_user"),
        "each variable gets its own independent surface"
    );
}

// ── check ─────────────────────────────────────────────────────────────────

#[test]
fn check_passes_on_clean_package() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["check", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success();
}

#[test]
fn check_reports_template_type_error_with_position() {
    let app = APP.replace("{{.Result.name}}", "{{.Result.nonexistent}}");
    let dir = fixture(&[("lib.rs", &app)]);
    muxt()
        .args(["check", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no field or method nonexistent"))
        .stderr(predicate::str::contains(":1:"));
}

#[test]
fn check_flags_unused_templates() {
    let app = APP.replace(
        ".parse(\"<h1>home</h1>\")",
        ".parse(\"<h1>home</h1>{{define \\\"orphan\\\"}}content{{end}}\")",
    );
    let dir = fixture(&[("lib.rs", &app)]);
    muxt()
        .args(["check", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("orphan"))
        .stderr(predicate::str::contains("never rendered"));
}

#[test]
fn check_fails_without_package() {
    let dir = TempDir::new().unwrap();
    muxt()
        .arg("check")
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Rust package found"));
}

#[test]
fn check_fails_on_missing_templates_variable() {
    let dir = fixture(&[("lib.rs", "pub fn nothing() {}")]);
    muxt()
        .arg("check")
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("templates variable"));
}

// ── reports ───────────────────────────────────────────────────────────────

#[test]
fn routes_prints_the_table() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["routes", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("GET /user/{id} get_user(ctx, id)"))
        .stdout(predicate::str::contains("TemplateData[User]"));
}

#[test]
fn template_source_prints_one_template() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["template-source", "GET /", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("<h1>home</h1>"));
}

#[test]
fn template_source_unknown_name_fails() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["template-source", "ghost", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("template not found"));
}

#[test]
fn documentation_combines_routes_and_sources() {
    let dir = fixture(&[("lib.rs", APP)]);
    muxt()
        .args(["documentation", "--find-receiver-type", "Server"])
        .arg("-C")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("# Routes for TEMPLATES"))
        .stdout(predicate::str::contains("<h1>home</h1>"));
}
