//! Template rendering.
//!
//! The renderer walks a parse tree with a current dot value, an environment
//! of `$variables`, and the set's function map. Lookup failures surface as
//! [`RenderError`]s naming the template.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RenderError;
use crate::node::{Arg, BranchNode, CommandNode, ListNode, Node, PipeNode, TemplateNode, Tree};
use crate::set::{MissingKey, TemplateFn, TemplateSet};
use crate::value::Value;

/// Template invocations may recurse; past this depth rendering fails
/// instead of overflowing the stack.
const MAX_TEMPLATE_DEPTH: usize = 100;

pub(crate) fn execute(
    set: &TemplateSet,
    name: &str,
    data: &Value,
    out: &mut String,
) -> Result<(), RenderError> {
    let tree = set.find_tree(name).ok_or_else(|| RenderError::NoSuchTemplate {
        name: name.to_string(),
    })?;
    let mut exec = Exec {
        set,
        vars: vec![(String::new(), data.clone())],
        depth: 0,
    };
    exec.walk_list(tree, &tree.root, data, out)
}

struct Exec<'a> {
    set: &'a TemplateSet,
    /// Variable environment; index 0 is `$`, the root value.
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> Exec<'a> {
    fn walk_list(
        &mut self,
        tree: &Tree,
        list: &ListNode,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in &list.nodes {
            self.walk(tree, node, dot, out)?;
        }
        Ok(())
    }

    fn walk(
        &mut self,
        tree: &Tree,
        node: &Node,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match node {
            Node::Text(text) => {
                out.push_str(&text.text);
                Ok(())
            }
            Node::Action(action) => {
                let value = self.eval_pipe(tree, &action.pipe, dot)?;
                // A pipeline that only declares variables produces no output.
                if action.pipe.decls.is_empty() {
                    out.push_str(&value.to_string());
                }
                Ok(())
            }
            Node::If(branch) => self.walk_if(tree, branch, dot, out),
            Node::With(branch) => self.walk_with(tree, branch, dot, out),
            Node::Range(branch) => self.walk_range(tree, branch, dot, out),
            Node::Template(invoke) => self.walk_template(tree, invoke, dot, out),
        }
    }

    fn walk_if(
        &mut self,
        tree: &Tree,
        branch: &BranchNode,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mark = self.vars.len();
        let value = self.eval_pipe(tree, &branch.pipe, dot)?;
        let result = if value.is_truthy() {
            self.walk_list(tree, &branch.list, dot, out)
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(tree, else_list, dot, out)
        } else {
            Ok(())
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_with(
        &mut self,
        tree: &Tree,
        branch: &BranchNode,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mark = self.vars.len();
        let value = self.eval_pipe(tree, &branch.pipe, dot)?;
        let result = if value.is_truthy() {
            self.walk_list(tree, &branch.list, &value, out)
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(tree, else_list, dot, out)
        } else {
            Ok(())
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_range(
        &mut self,
        tree: &Tree,
        branch: &BranchNode,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mark = self.vars.len();
        let value = self.eval_pipe_value(tree, &branch.pipe, dot)?;

        // Declared range variables live for the whole loop; each iteration
        // assigns them.
        for name in &branch.pipe.decls {
            self.vars.push((name.clone(), Value::Null));
        }

        let mut iterations = 0usize;
        let result = (|| {
            match &value {
                Value::List(items) => {
                    for (index, element) in items.iter().enumerate() {
                        self.assign_range_vars(&branch.pipe, Value::Int(index as i64), element);
                        self.walk_list(tree, &branch.list, element, out)?;
                        iterations += 1;
                    }
                }
                Value::Map(map) => {
                    for (key, element) in map {
                        self.assign_range_vars(&branch.pipe, Value::from(key.clone()), element);
                        self.walk_list(tree, &branch.list, element, out)?;
                        iterations += 1;
                    }
                }
                Value::Null => {}
                other => {
                    return Err(RenderError::eval(
                        &tree.name,
                        format!("range can't iterate over {}", other.type_name()),
                    ));
                }
            }
            if iterations == 0 {
                if let Some(else_list) = &branch.else_list {
                    self.walk_list(tree, else_list, dot, out)?;
                }
            }
            Ok(())
        })();
        self.vars.truncate(mark);
        result
    }

    fn assign_range_vars(&mut self, pipe: &PipeNode, key: Value, element: &Value) {
        match pipe.decls.len() {
            1 => self.set_var(&pipe.decls[0], element.clone()),
            2 => {
                self.set_var(&pipe.decls[0], key);
                self.set_var(&pipe.decls[1], element.clone());
            }
            _ => {}
        }
    }

    fn walk_template(
        &mut self,
        tree: &Tree,
        invoke: &TemplateNode,
        dot: &Value,
        out: &mut String,
    ) -> Result<(), RenderError> {
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(RenderError::eval(
                &tree.name,
                format!("exceeded maximum template depth invoking {:?}", invoke.name),
            ));
        }
        let target = self
            .set
            .find_tree(&invoke.name)
            .ok_or_else(|| RenderError::NoSuchTemplate {
                name: invoke.name.clone(),
            })?;
        // With no argument the invoked template inherits the caller's dot,
        // matching what the static checker assumes.
        let arg = match &invoke.pipe {
            Some(pipe) => self.eval_pipe(tree, pipe, dot)?,
            None => dot.clone(),
        };
        let saved = std::mem::replace(&mut self.vars, vec![(String::new(), arg.clone())]);
        self.depth += 1;
        let result = self.walk_list(target, &target.root, &arg, out);
        self.depth -= 1;
        self.vars = saved;
        result
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    /// Evaluate a pipeline and apply its variable declarations.
    fn eval_pipe(
        &mut self,
        tree: &Tree,
        pipe: &PipeNode,
        dot: &Value,
    ) -> Result<Value, RenderError> {
        let value = self.eval_pipe_value(tree, pipe, dot)?;
        if pipe.is_assign {
            for name in &pipe.decls {
                self.set_var(name, value.clone());
            }
        } else {
            for name in &pipe.decls {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    /// Evaluate a pipeline's value without touching declarations (`range`
    /// assigns its own variables per iteration).
    fn eval_pipe_value(
        &mut self,
        tree: &Tree,
        pipe: &PipeNode,
        dot: &Value,
    ) -> Result<Value, RenderError> {
        let mut value: Option<Value> = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(tree, cmd, dot, value)?);
        }
        Ok(value.unwrap_or_default())
    }

    fn eval_command(
        &mut self,
        tree: &Tree,
        cmd: &CommandNode,
        dot: &Value,
        prev: Option<Value>,
    ) -> Result<Value, RenderError> {
        let first = &cmd.args[0];
        if let Arg::Ident { name, .. } = first {
            let mut args = Vec::with_capacity(cmd.args.len());
            for arg in &cmd.args[1..] {
                args.push(self.eval_arg(tree, arg, dot)?);
            }
            if let Some(prev) = prev {
                args.push(prev);
            }
            return self.call_function(tree, name, &args);
        }

        // A member chain followed by arguments is a method invocation on an
        // object: `.StatusCode 404`.
        if cmd.args.len() > 1 || prev.is_some() {
            let (base, method) = match first {
                Arg::Field { chain, .. } if !chain.is_empty() => {
                    let mut value = dot.clone();
                    for name in &chain[..chain.len() - 1] {
                        value = self.resolve_member(tree, &value, name)?;
                    }
                    (value, chain.last().unwrap().clone())
                }
                Arg::Variable { name, chain, .. } if !chain.is_empty() => {
                    let mut value = self.lookup_var(tree, name)?;
                    for part in &chain[..chain.len() - 1] {
                        value = self.resolve_member(tree, &value, part)?;
                    }
                    (value, chain.last().unwrap().clone())
                }
                _ => {
                    return Err(RenderError::eval(
                        &tree.name,
                        format!("can't give argument to non-function {first}"),
                    ));
                }
            };
            let Value::Object(obj) = &base else {
                return Err(RenderError::eval(
                    &tree.name,
                    format!("can't call method {method} on {}", base.type_name()),
                ));
            };
            let mut args = Vec::with_capacity(cmd.args.len());
            for arg in &cmd.args[1..] {
                args.push(self.eval_arg(tree, arg, dot)?);
            }
            if let Some(prev) = prev {
                args.push(prev);
            }
            return obj.call(&method, &args).map_err(|message| {
                RenderError::FunctionCall {
                    name: tree.name.clone(),
                    function: method,
                    message,
                }
            });
        }
        self.eval_arg(tree, first, dot)
    }

    fn eval_arg(&mut self, tree: &Tree, arg: &Arg, dot: &Value) -> Result<Value, RenderError> {
        match arg {
            Arg::Dot(_) => Ok(dot.clone()),
            Arg::Nil(_) => Ok(Value::Null),
            Arg::Bool { val, .. } => Ok(Value::Bool(*val)),
            Arg::Number { text, .. } => parse_number(text)
                .ok_or_else(|| RenderError::eval(&tree.name, format!("bad number {text:?}"))),
            Arg::Str { val, .. } => Ok(Value::from(val.clone())),
            Arg::Field { chain, .. } => {
                let mut value = dot.clone();
                for name in chain {
                    value = self.resolve_member(tree, &value, name)?;
                }
                Ok(value)
            }
            Arg::Variable { name, chain, .. } => {
                let mut value = self.lookup_var(tree, name)?;
                for part in chain {
                    value = self.resolve_member(tree, &value, part)?;
                }
                Ok(value)
            }
            Arg::Ident { name, .. } => self.call_function(tree, name, &[]),
            Arg::Pipe(pipe) => self.eval_pipe(tree, pipe, dot),
        }
    }

    fn call_function(
        &self,
        tree: &Tree,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RenderError> {
        let f = self
            .set
            .func(name)
            .ok_or_else(|| RenderError::NoSuchFunction {
                name: tree.name.clone(),
                function: name.to_string(),
            })?;
        f(args).map_err(|message| RenderError::FunctionCall {
            name: tree.name.clone(),
            function: name.to_string(),
            message,
        })
    }

    fn resolve_member(
        &self,
        tree: &Tree,
        value: &Value,
        name: &str,
    ) -> Result<Value, RenderError> {
        match value {
            Value::Map(map) => match map.get(name) {
                Some(v) => Ok(v.clone()),
                None => match self.set.missing_key() {
                    MissingKey::Default | MissingKey::Zero => Ok(Value::Null),
                    MissingKey::Error => Err(RenderError::eval(
                        &tree.name,
                        format!("map has no entry for key {name:?}"),
                    )),
                },
            },
            Value::Object(obj) => obj.get(name).ok_or_else(|| {
                RenderError::eval(&tree.name, format!("can't evaluate field {name} in object"))
            }),
            Value::Null => Err(RenderError::eval(
                &tree.name,
                format!("nil data; can't evaluate field {name}"),
            )),
            other => Err(RenderError::eval(
                &tree.name,
                format!("can't evaluate field {name} in type {}", other.type_name()),
            )),
        }
    }

    fn lookup_var(&self, tree: &Tree, name: &str) -> Result<Value, RenderError> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RenderError::eval(&tree.name, format!("undefined variable ${name}")))
    }

    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
            slot.1 = value;
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

// ── builtin functions ─────────────────────────────────────────────────────

/// The function map every new set starts with.
pub(crate) fn builtin_funcs() -> BTreeMap<String, TemplateFn> {
    let mut funcs: BTreeMap<String, TemplateFn> = BTreeMap::new();
    let mut add = |name: &str, f: fn(&[Value]) -> Result<Value, String>| {
        funcs.insert(name.to_string(), Arc::new(f));
    };
    add("and", |args| {
        let mut last = Value::Bool(false);
        for arg in args {
            if !arg.is_truthy() {
                return Ok(arg.clone());
            }
            last = arg.clone();
        }
        Ok(last)
    });
    add("or", |args| {
        let mut last = Value::Bool(false);
        for arg in args {
            if arg.is_truthy() {
                return Ok(arg.clone());
            }
            last = arg.clone();
        }
        Ok(last)
    });
    add("not", |args| match args {
        [v] => Ok(Value::Bool(!v.is_truthy())),
        _ => Err(format!("expected 1 argument, got {}", args.len())),
    });
    add("len", |args| match args {
        [v] => v
            .len()
            .map(|n| Value::Int(n as i64))
            .ok_or_else(|| format!("len of type {}", v.type_name())),
        _ => Err(format!("expected 1 argument, got {}", args.len())),
    });
    add("index", |args| {
        let Some((head, indices)) = args.split_first() else {
            return Err("expected at least 1 argument".into());
        };
        let mut value = head.clone();
        for idx in indices {
            value = match (&value, idx) {
                (Value::List(items), Value::Int(i)) => {
                    let i = *i;
                    if i < 0 || i as usize >= items.len() {
                        return Err(format!("index out of range: {i}"));
                    }
                    items[i as usize].clone()
                }
                (Value::Map(map), Value::String(key)) => {
                    map.get(key).cloned().unwrap_or(Value::Null)
                }
                (v, idx) => {
                    return Err(format!(
                        "can't index {} with {}",
                        v.type_name(),
                        idx.type_name()
                    ));
                }
            };
        }
        Ok(value)
    });
    add("print", |args| Ok(Value::String(sprint(args))));
    add("println", |args| {
        let mut s = args
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        s.push('\n');
        Ok(Value::String(s))
    });
    add("printf", |args| {
        let Some((Value::String(format), rest)) = args.split_first() else {
            return Err("printf needs a format string".into());
        };
        sprintf(format, rest).map(Value::String)
    });
    add("eq", |args| {
        let Some((head, rest)) = args.split_first() else {
            return Err("expected at least 2 arguments".into());
        };
        if rest.is_empty() {
            return Err("expected at least 2 arguments".into());
        }
        Ok(Value::Bool(rest.iter().any(|v| v == head)))
    });
    add("ne", |args| match args {
        [a, b] => Ok(Value::Bool(a != b)),
        _ => Err(format!("expected 2 arguments, got {}", args.len())),
    });
    add("lt", |args| compare(args, |o| o == std::cmp::Ordering::Less));
    add("le", |args| compare(args, |o| o != std::cmp::Ordering::Greater));
    add("gt", |args| compare(args, |o| o == std::cmp::Ordering::Greater));
    add("ge", |args| compare(args, |o| o != std::cmp::Ordering::Less));
    add("html", |args| Ok(Value::String(escape_html(&sprint(args)))));
    add("js", |args| Ok(Value::String(escape_js(&sprint(args)))));
    add("urlquery", |args| {
        Ok(Value::String(escape_url_query(&sprint(args))))
    });
    funcs
}

fn compare(
    args: &[Value],
    ok: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, String> {
    match args {
        [a, b] => a
            .compare(b)
            .map(|ord| Value::Bool(ok(ord)))
            .ok_or_else(|| {
                format!(
                    "incomparable types {} and {}",
                    a.type_name(),
                    b.type_name()
                )
            }),
        _ => Err(format!("expected 2 arguments, got {}", args.len())),
    }
}

/// Space-separate operands only when neither neighbor is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    let mut prev_string = true;
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_));
        if i > 0 && !prev_string && !is_string {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
        prev_string = is_string;
    }
    out
}

/// A small printf: `%v` `%s` `%d` `%f` `%q` `%%`.
fn sprintf(format: &str, args: &[Value]) -> Result<String, String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('v' | 's' | 'd' | 'f' | 'q')) => {
                let Some(arg) = args.next() else {
                    out.push_str("%!(MISSING)");
                    continue;
                };
                match verb {
                    'd' => match arg {
                        Value::Int(i) => out.push_str(&i.to_string()),
                        Value::Float(f) => out.push_str(&(*f as i64).to_string()),
                        other => return Err(format!("%d on {}", other.type_name())),
                    },
                    'f' => match arg {
                        Value::Int(i) => out.push_str(&format!("{:.6}", *i as f64)),
                        Value::Float(f) => out.push_str(&format!("{f:.6}")),
                        other => return Err(format!("%f on {}", other.type_name())),
                    },
                    'q' => out.push_str(&format!("{:?}", arg.to_string())),
                    _ => out.push_str(&arg.to_string()),
                }
            }
            Some(other) => return Err(format!("unsupported verb %{other}")),
            None => return Err("format ends with %".into()),
        }
    }
    if args.next().is_some() {
        out.push_str("%!(EXTRA)");
    }
    Ok(out)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_url_query(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::{must, new};
    use pretty_assertions::assert_eq;

    fn render(template: &str, data: Value) -> String {
        let set = must(new("t").parse(template));
        set.execute_to_string("t", &data).unwrap()
    }

    fn render_err(template: &str, data: Value) -> RenderError {
        let set = must(new("t").parse(template));
        set.execute_to_string("t", &data).unwrap_err()
    }

    fn map(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn text_and_fields() {
        let data = map(&[("name", Value::from("bob"))]);
        assert_eq!(render("hi {{.name}}!", data), "hi bob!");
    }

    #[test]
    fn nested_field_chain() {
        let user = map(&[("name", Value::from("ada"))]);
        let data = map(&[("user", user)]);
        assert_eq!(render("{{.user.name}}", data), "ada");
    }

    #[test]
    fn if_else_branches() {
        assert_eq!(
            render("{{if .ok}}y{{else}}n{{end}}", map(&[("ok", Value::Bool(true))])),
            "y"
        );
        assert_eq!(
            render("{{if .ok}}y{{else}}n{{end}}", map(&[("ok", Value::Bool(false))])),
            "n"
        );
    }

    #[test]
    fn with_rebinds_dot() {
        let data = map(&[("user", map(&[("name", Value::from("eve"))]))]);
        assert_eq!(render("{{with .user}}{{.name}}{{end}}", data), "eve");
    }

    #[test]
    fn range_over_list_with_vars() {
        let data = map(&[(
            "items",
            Value::List(vec![Value::from("a"), Value::from("b")]),
        )]);
        assert_eq!(
            render("{{range $i, $v := .items}}{{$i}}={{$v}};{{end}}", data),
            "0=a;1=b;"
        );
    }

    #[test]
    fn range_else_on_empty() {
        let data = map(&[("items", Value::List(vec![]))]);
        assert_eq!(render("{{range .items}}x{{else}}none{{end}}", data), "none");
    }

    #[test]
    fn range_over_map_sorted_by_key() {
        let inner = map(&[("b", Value::Int(2)), ("a", Value::Int(1))]);
        let data = map(&[("m", inner)]);
        assert_eq!(
            render("{{range $k, $v := .m}}{{$k}}{{$v}}{{end}}", data),
            "a1b2"
        );
    }

    #[test]
    fn template_invocation_passes_argument() {
        let set = must(new("t").parse(
            "{{define \"row\"}}[{{.}}]{{end}}{{template \"row\" .x}}",
        ));
        let data = map(&[("x", Value::Int(9))]);
        assert_eq!(set.execute_to_string("t", &data).unwrap(), "[9]");
    }

    #[test]
    fn template_without_argument_inherits_dot() {
        let set = must(new("t").parse(
            "{{define \"inner\"}}{{.x}}{{end}}{{template \"inner\"}}",
        ));
        let data = map(&[("x", Value::from("inherited"))]);
        assert_eq!(set.execute_to_string("t", &data).unwrap(), "inherited");
    }

    #[test]
    fn pipeline_threads_value() {
        let data = map(&[("n", Value::Int(42))]);
        assert_eq!(render("{{.n | printf \"%d!\"}}", data), "42!");
    }

    #[test]
    fn variables_declare_and_use() {
        assert_eq!(
            render("{{$x := 3}}{{$x}}", Value::Null),
            "3"
        );
    }

    #[test]
    fn dollar_reaches_root_inside_with() {
        let data = map(&[
            ("user", map(&[("name", Value::from("zed"))])),
            ("site", Value::from("muxt")),
        ]);
        assert_eq!(
            render("{{with .user}}{{.name}}@{{$.site}}{{end}}", data),
            "zed@muxt"
        );
    }

    #[test]
    fn builtin_comparisons() {
        assert_eq!(render("{{if lt 1 2}}y{{end}}", Value::Null), "y");
        assert_eq!(render("{{if eq \"a\" \"a\"}}y{{end}}", Value::Null), "y");
        assert_eq!(render("{{if not .}}empty{{end}}", Value::Null), "empty");
    }

    #[test]
    fn builtin_len_and_index() {
        let data = map(&[(
            "items",
            Value::List(vec![Value::from("a"), Value::from("b")]),
        )]);
        assert_eq!(
            render("{{len .items}}/{{index .items 1}}", data),
            "2/b"
        );
    }

    #[test]
    fn html_escaper() {
        let data = map(&[("s", Value::from("<b>&\"x\"</b>"))]);
        assert_eq!(
            render("{{html .s}}", data),
            "&lt;b&gt;&amp;&#34;x&#34;&lt;/b&gt;"
        );
    }

    #[test]
    fn urlquery_escaper() {
        let data = map(&[("s", Value::from("a b/c?d"))]);
        assert_eq!(render("{{urlquery .s}}", data), "a+b%2Fc%3Fd");
    }

    #[test]
    fn missing_template_error() {
        let err = render_err("{{template \"nope\"}}", Value::Null);
        assert!(matches!(err, RenderError::NoSuchTemplate { .. }));
    }

    #[test]
    fn field_on_non_struct_errors() {
        let err = render_err("{{.x.y}}", map(&[("x", Value::Int(3))]));
        assert!(err.to_string().contains("can't evaluate field y"));
    }

    #[test]
    fn recursion_is_bounded() {
        let set = must(new("t").parse(
            "{{define \"loop\"}}{{template \"loop\"}}{{end}}{{template \"loop\"}}",
        ));
        let err = set.execute_to_string("t", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("maximum template depth"));
    }

    #[test]
    fn object_members_resolve() {
        #[derive(Debug)]
        struct Data;
        impl crate::value::Object for Data {
            fn get(&self, name: &str) -> Option<Value> {
                (name == "Greeting").then(|| Value::from("hello"))
            }
        }
        let set = must(new("t").parse("{{.Greeting}}"));
        let out = set
            .execute_to_string("t", &Value::object(Data))
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn sprintf_subset() {
        assert_eq!(
            sprintf("%s=%d %q", &[Value::from("n"), Value::Int(3), Value::from("x")]).unwrap(),
            "n=3 \"x\""
        );
        assert!(sprintf("%z", &[Value::Null]).is_err());
    }
}
