//! Route-name parsing.
//!
//! A template name is a sentence in a tiny HTTP grammar:
//!
//! ```text
//! Name    := [Method WS] [Host] Path [WS Status] [WS Call]
//! Method  := GET | POST | PUT | PATCH | DELETE
//! Path    := "/" PathSeg ("/" PathSeg)*      may end "/{$}" or "/{name...}"
//! Status  := decimal code | status constant name (CREATED, NO_CONTENT, …)
//! Call    := Ident "(" [Ident ("," Ident)*] ")"
//! ```
//!
//! Parsing is total on that grammar and [`Route`]'s `Display` regenerates an
//! equivalent name, so a formatted route re-parses to the same value.
//! Errors carry the 1-based column of the offending byte.

use std::fmt;

use thiserror::Error;

/// A template name that could not be parsed as a route.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid route name {name:?} at column {column}: {message}")]
pub struct RouteNameError {
    pub name: String,
    pub column: usize,
    pub message: String,
}

/// The HTTP methods a route may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(word: &str) -> Option<Method> {
        match word {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    /// The axum `MethodRouter` constructor for this method.
    pub fn routing_fn(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A declared success status: numeric, or a status constant name resolved
/// at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSpec {
    Code(u16),
    Ident { name: String, code: u16 },
}

impl StatusSpec {
    pub fn code(&self) -> u16 {
        match self {
            StatusSpec::Code(code) => *code,
            StatusSpec::Ident { code, .. } => *code,
        }
    }
}

impl fmt::Display for StatusSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSpec::Code(code) => write!(f, "{code}"),
            StatusSpec::Ident { name, .. } => f.write_str(name),
        }
    }
}

/// Status constant names accepted in route names, resolved against the
/// `http` crate's vocabulary.
const STATUS_IDENTS: &[(&str, http::StatusCode)] = &[
    ("OK", http::StatusCode::OK),
    ("CREATED", http::StatusCode::CREATED),
    ("ACCEPTED", http::StatusCode::ACCEPTED),
    ("NO_CONTENT", http::StatusCode::NO_CONTENT),
    ("MOVED_PERMANENTLY", http::StatusCode::MOVED_PERMANENTLY),
    ("FOUND", http::StatusCode::FOUND),
    ("SEE_OTHER", http::StatusCode::SEE_OTHER),
    ("NOT_MODIFIED", http::StatusCode::NOT_MODIFIED),
    ("TEMPORARY_REDIRECT", http::StatusCode::TEMPORARY_REDIRECT),
    ("PERMANENT_REDIRECT", http::StatusCode::PERMANENT_REDIRECT),
    ("BAD_REQUEST", http::StatusCode::BAD_REQUEST),
    ("UNAUTHORIZED", http::StatusCode::UNAUTHORIZED),
    ("FORBIDDEN", http::StatusCode::FORBIDDEN),
    ("NOT_FOUND", http::StatusCode::NOT_FOUND),
    ("METHOD_NOT_ALLOWED", http::StatusCode::METHOD_NOT_ALLOWED),
    ("CONFLICT", http::StatusCode::CONFLICT),
    ("GONE", http::StatusCode::GONE),
    ("UNPROCESSABLE_ENTITY", http::StatusCode::UNPROCESSABLE_ENTITY),
    ("TOO_MANY_REQUESTS", http::StatusCode::TOO_MANY_REQUESTS),
    ("INTERNAL_SERVER_ERROR", http::StatusCode::INTERNAL_SERVER_ERROR),
    ("NOT_IMPLEMENTED", http::StatusCode::NOT_IMPLEMENTED),
    ("BAD_GATEWAY", http::StatusCode::BAD_GATEWAY),
    ("SERVICE_UNAVAILABLE", http::StatusCode::SERVICE_UNAVAILABLE),
    ("GATEWAY_TIMEOUT", http::StatusCode::GATEWAY_TIMEOUT),
];

/// One path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `{name}` — one segment, parsed into a typed method parameter.
    Placeholder(String),
    /// `{name...}` — the rest of the path, final segment only.
    Wildcard(String),
    /// `{$}` — end-of-path marker, final segment only.
    End,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Placeholder(name) => write!(f, "{{{name}}}"),
            Segment::Wildcard(name) => write!(f, "{{{name}...}}"),
            Segment::End => f.write_str("{$}"),
        }
    }
}

/// The method call declared at the end of a route name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub ident: String,
    pub args: Vec<String>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.ident, self.args.join(", "))
    }
}

/// The structured form of a template name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Option<Method>,
    pub host: Option<String>,
    pub segments: Vec<Segment>,
    /// The path ended in `/` (subtree match), e.g. `/static/`.
    pub trailing_slash: bool,
    pub status: Option<StatusSpec>,
    pub call: Option<Call>,
}

impl Route {
    /// Whether a template name even tries to be a route. Names without a
    /// slash are ordinary partials and are skipped silently.
    pub fn is_route_name(name: &str) -> bool {
        name.contains('/')
    }

    /// The path pattern as written, `{name}` placeholders preserved.
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&segment.to_string());
        }
        if self.trailing_slash {
            out.push('/');
        }
        out
    }

    /// Placeholder names in path order; `true` marks the wildcard.
    pub fn placeholders(&self) -> Vec<(&str, bool)> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some((name.as_str(), false)),
                Segment::Wildcard(name) => Some((name.as_str(), true)),
                _ => None,
            })
            .collect()
    }

    /// The declared status, or 200.
    pub fn default_status(&self) -> u16 {
        self.status.as_ref().map_or(200, StatusSpec::code)
    }

    /// Conflict key: method and host plus the path with placeholder names
    /// erased. Two routes with equal keys match the same requests.
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        if let Some(method) = self.method {
            out.push_str(&method.to_string());
        }
        out.push(' ');
        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if self.segments.is_empty() {
            out.push('/');
            return out;
        }
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(_) => out.push_str("{}"),
                Segment::Wildcard(_) => out.push_str("{*}"),
                Segment::End => out.push_str("{$}"),
            }
        }
        if self.trailing_slash {
            out.push('/');
        }
        out
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = self.method {
            write!(f, "{method} ")?;
        }
        if let Some(host) = &self.host {
            f.write_str(host)?;
        }
        f.write_str(&self.path())?;
        if let Some(status) = &self.status {
            write!(f, " {status}")?;
        }
        if let Some(call) = &self.call {
            write!(f, " {call}")?;
        }
        Ok(())
    }
}

/// Parse a template name into a [`Route`].
pub fn parse(name: &str) -> Result<Route, RouteNameError> {
    Scanner { name, pos: 0 }.route()
}

struct Scanner<'a> {
    name: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn route(mut self) -> Result<Route, RouteNameError> {
        self.skip_ws();
        let first_pos = self.pos;
        let first = self.word();
        if first.is_empty() {
            return self.fail(first_pos, "empty route name");
        }

        let (method, host_path, host_path_pos) = if first.contains('/') {
            (None, first, first_pos)
        } else {
            let Some(method) = Method::parse(first) else {
                return self.fail(first_pos, format!("unknown HTTP method {first:?}"));
            };
            self.skip_ws();
            let pos = self.pos;
            let word = self.word();
            if word.is_empty() {
                return self.fail(pos, "missing path");
            }
            (Some(method), word, pos)
        };

        let (host, path) = match host_path.find('/') {
            Some(0) => (None, host_path),
            Some(slash) => (
                Some(host_path[..slash].to_string()),
                &host_path[slash..],
            ),
            None => return self.fail(host_path_pos, "path must start with '/'"),
        };
        let path_pos = host_path_pos + host_path.len() - path.len();
        let (segments, trailing_slash) = self.path_segments(path, path_pos)?;

        self.skip_ws();
        let mut status = None;
        if !self.done() && !self.at_call() {
            let pos = self.pos;
            let word = self.word_until(&[' ', '\t', '(']);
            if word.chars().all(|c| c.is_ascii_digit()) {
                let code: u16 = word
                    .parse()
                    .ok()
                    .filter(|&c| (200..=599).contains(&c))
                    .ok_or_else(|| self.error(pos, format!("invalid status code {word:?}")))?;
                if http::StatusCode::from_u16(code).is_err() {
                    return self.fail(pos, format!("invalid status code {word:?}"));
                }
                status = Some(StatusSpec::Code(code));
            } else {
                let code = STATUS_IDENTS
                    .iter()
                    .find(|(n, _)| *n == word)
                    .map(|(_, c)| c.as_u16())
                    .ok_or_else(|| self.error(pos, format!("unknown status {word:?}")))?;
                status = Some(StatusSpec::Ident {
                    name: word.to_string(),
                    code,
                });
            }
            self.skip_ws();
        }

        let call = if self.done() { None } else { Some(self.call()?) };

        self.skip_ws();
        if !self.done() {
            return self.fail(self.pos, "unexpected trailing characters");
        }

        Ok(Route {
            method,
            host,
            segments,
            trailing_slash,
            status,
            call,
        })
    }

    fn path_segments(
        &self,
        path: &str,
        base: usize,
    ) -> Result<(Vec<Segment>, bool), RouteNameError> {
        debug_assert!(path.starts_with('/'));
        if path == "/" {
            return Ok((Vec::new(), true));
        }
        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        let body = &path[1..];
        let trailing_slash = body.ends_with('/');
        let body = body.strip_suffix('/').unwrap_or(body);

        let mut offset = 1;
        for raw in body.split('/') {
            let col = base + offset;
            if raw.is_empty() {
                return self.fail(col, "empty path segment");
            }
            if !segments.is_empty() {
                if let Some(Segment::Wildcard(_) | Segment::End) = segments.last() {
                    return self.fail(col, "nothing may follow a {name...} or {$} segment");
                }
            }
            let segment = if raw == "{$}" {
                if trailing_slash {
                    return self.fail(col, "nothing may follow a {name...} or {$} segment");
                }
                Segment::End
            } else if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if let Some(name) = inner.strip_suffix("...") {
                    self.placeholder_name(name, col, &mut names)?;
                    if trailing_slash {
                        return self.fail(col, "nothing may follow a {name...} or {$} segment");
                    }
                    Segment::Wildcard(name.to_string())
                } else {
                    self.placeholder_name(inner, col, &mut names)?;
                    Segment::Placeholder(inner.to_string())
                }
            } else if raw.contains(['{', '}']) {
                return self.fail(col, format!("malformed path segment {raw:?}"));
            } else {
                Segment::Literal(raw.to_string())
            };
            segments.push(segment);
            offset += raw.len() + 1;
        }
        Ok((segments, trailing_slash))
    }

    fn placeholder_name<'n>(
        &self,
        name: &'n str,
        col: usize,
        seen: &mut Vec<&'n str>,
    ) -> Result<(), RouteNameError> {
        if !is_ident(name) {
            return self.fail(col, format!("invalid path parameter name {name:?}"));
        }
        if seen.contains(&name) {
            return self.fail(col, format!("duplicate path parameter {name:?}"));
        }
        seen.push(name);
        Ok(())
    }

    fn call(&mut self) -> Result<Call, RouteNameError> {
        let ident_pos = self.pos;
        let ident = self.word_until(&[' ', '\t', '(']).to_string();
        if !is_ident(&ident) {
            return self.fail(ident_pos, format!("invalid call identifier {ident:?}"));
        }
        self.skip_ws();
        if !self.eat('(') {
            return self.fail(self.pos, "expected '(' after call identifier");
        }
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                break;
            }
            let arg_pos = self.pos;
            let arg = self.word_until(&[' ', '\t', ',', ')']).to_string();
            if !is_ident(&arg) {
                return self.fail(arg_pos, format!("invalid call argument {arg:?}"));
            }
            args.push(arg);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                break;
            }
            return self.fail(self.pos, "expected ',' or ')' in call arguments");
        }
        Ok(Call { ident, args })
    }

    // ── low-level scanning ────────────────────────────────────────────────

    fn rest(&self) -> &'a str {
        &self.name[self.pos..]
    }

    fn done(&self) -> bool {
        self.rest().is_empty()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.name.len() - trimmed.len();
    }

    fn word(&mut self) -> &'a str {
        self.word_until(&[' ', '\t'])
    }

    fn word_until(&mut self, stops: &[char]) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| stops.contains(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        &rest[..end]
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// An identifier followed by `(` begins the call expression.
    fn at_call(&self) -> bool {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map_or(rest.len(), |(i, _)| i);
        end > 0 && rest[end..].trim_start().starts_with('(')
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> RouteNameError {
        RouteNameError {
            name: self.name.to_string(),
            column: pos + 1,
            message: message.into(),
        }
    }

    fn fail<T>(&self, pos: usize, message: impl Into<String>) -> Result<T, RouteNameError> {
        Err(self.error(pos, message))
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ok(name: &str) -> Route {
        parse(name).unwrap_or_else(|e| panic!("{e}"))
    }

    fn err(name: &str) -> RouteNameError {
        parse(name).expect_err("expected parse failure")
    }

    #[test]
    fn bare_root() {
        let route = ok("GET /");
        assert_eq!(route.method, Some(Method::Get));
        assert_eq!(route.path(), "/");
        assert!(route.call.is_none());
        assert_eq!(route.default_status(), 200);
    }

    #[test]
    fn path_without_method() {
        let route = ok("/healthz");
        assert_eq!(route.method, None);
        assert_eq!(route.path(), "/healthz");
    }

    #[test]
    fn placeholders_and_call() {
        let route = ok("GET /user/{id} get_user(ctx, id)");
        assert_eq!(route.placeholders(), vec![("id", false)]);
        let call = route.call.as_ref().unwrap();
        assert_eq!(call.ident, "get_user");
        assert_eq!(call.args, vec!["ctx".to_string(), "id".to_string()]);
    }

    #[test]
    fn numeric_status() {
        let route = ok("POST /user 201 create_user(ctx, form)");
        assert_eq!(route.default_status(), 201);
    }

    #[test]
    fn status_constant_name() {
        let route = ok("POST /user CREATED create_user(ctx, form)");
        assert_eq!(route.default_status(), 201);
        assert_eq!(route.to_string(), "POST /user CREATED create_user(ctx, form)");
    }

    #[test]
    fn host_is_split_from_path() {
        let route = ok("GET example.com/admin");
        assert_eq!(route.host.as_deref(), Some("example.com"));
        assert_eq!(route.path(), "/admin");
    }

    #[test]
    fn wildcard_and_end_marker() {
        assert_eq!(
            ok("GET /files/{path...}").placeholders(),
            vec![("path", true)]
        );
        let root = ok("GET /{$}");
        assert_eq!(root.segments, vec![Segment::End]);
    }

    #[test]
    fn trailing_slash_subtree() {
        let route = ok("GET /static/");
        assert!(route.trailing_slash);
        assert_eq!(route.path(), "/static/");
    }

    #[test]
    fn display_round_trips() {
        for name in [
            "GET /",
            "/healthz",
            "GET /user/{id} get_user(ctx, id)",
            "POST /user 201 create_user(ctx, form)",
            "DELETE /user/{id} 204 delete_user(ctx, id)",
            "GET example.com/admin 200",
            "GET /files/{path...}",
            "GET /{$}",
            "GET /static/",
            "PATCH /a/{b}/c/{d} update(b, d)",
        ] {
            let route = ok(name);
            assert_eq!(route.to_string(), name, "formatting {name:?}");
            assert_eq!(ok(&route.to_string()), route, "re-parsing {name:?}");
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let e = err("FETCH /x");
        assert!(e.message.contains("unknown HTTP method"));
        assert_eq!(e.column, 1);
    }

    #[test]
    fn duplicate_placeholder_is_rejected() {
        let e = err("GET /a/{id}/b/{id}");
        assert!(e.message.contains("duplicate path parameter"));
    }

    #[test]
    fn wildcard_must_be_last() {
        let e = err("GET /a/{rest...}/b");
        assert!(e.message.contains("nothing may follow"));
    }

    #[test]
    fn end_marker_must_be_last() {
        let e = err("GET /{$}/more");
        assert!(e.message.contains("nothing may follow"));
    }

    #[test]
    fn invalid_status_rejected() {
        assert!(err("GET /x 99").message.contains("invalid status code"));
        assert!(err("GET /x 700").message.contains("invalid status code"));
        assert!(err("GET /x TEAPOT").message.contains("unknown status"));
    }

    #[test]
    fn malformed_call_rejected() {
        assert!(err("GET /x get_user(").message.contains("',' or ')'") ||
            err("GET /x get_user(").message.contains("invalid call argument"));
        assert!(err("GET /x get_user(a b)").message.contains("expected ',' or ')'"));
        assert!(err("GET /x get_user(a) extra").message.contains("trailing"));
    }

    #[test]
    fn malformed_placeholder_rejected() {
        assert!(err("GET /a/{id").message.contains("malformed path segment"));
        assert!(err("GET /a/x{id}").message.contains("malformed path segment"));
        assert!(err("GET /a/{9id}").message.contains("invalid path parameter name"));
    }

    #[test]
    fn empty_segment_rejected() {
        assert!(err("GET //a").message.contains("empty path segment"));
    }

    #[test]
    fn column_points_at_offending_token() {
        let e = err("GET /a/{id}/b/{id}");
        // The duplicate starts at column 15.
        assert_eq!(e.column, 15);
    }

    #[test]
    fn canonical_key_erases_placeholder_names() {
        let a = ok("GET /user/{id}");
        let b = ok("GET /user/{name}");
        assert_eq!(a.canonical_key(), b.canonical_key());
        let c = ok("POST /user/{id}");
        assert_ne!(a.canonical_key(), c.canonical_key());
    }
}
