//! Recursive-descent parser from lexer items to [`Tree`]s.
//!
//! One call to [`parse`] yields the main tree (named after the set's root)
//! plus a tree per `{{define}}`/`{{block}}` in the source. All trees from a
//! call share the same source text, so node positions stay meaningful across
//! them.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ParseError;
use crate::lex::{Item, ItemKind, Lexer};
use crate::node::{
    ActionNode, Arg, BranchKind, BranchNode, CommandNode, ListNode, Node, PipeNode, Pos,
    TemplateNode, TextNode, Tree,
};

/// Parse `text` into named trees.
///
/// `name` names the main tree; `parse_name` is used in diagnostics (a file
/// path when parsing files). `funcs` is the set of callable function names —
/// identifiers in command position outside it are a parse error, matching
/// the engine's refusal to execute unknown functions.
pub fn parse(
    name: &str,
    text: &str,
    parse_name: &str,
    left: &str,
    right: &str,
    funcs: &BTreeSet<String>,
) -> Result<BTreeMap<String, Tree>, ParseError> {
    let parser = Parser {
        name: name.to_string(),
        parse_name: parse_name.to_string(),
        text,
        lexer: Lexer::new(text, left, right),
        pushback: Vec::new(),
        vars: vec![String::new()], // `$`, the root
        funcs,
        trees: BTreeMap::new(),
    };
    parser.run()
}

/// Register `tree` into `trees` under its name.
///
/// A redefinition only replaces an existing tree when the new body is
/// non-empty; an empty redefinition keeps the old body. This mirrors how
/// multi-file sets behave: a file that merely *mentions* a name must not
/// clobber a real definition.
pub fn add_tree(trees: &mut BTreeMap<String, Tree>, tree: Tree) {
    match trees.get(&tree.name) {
        Some(_) if tree.is_empty() => {}
        _ => {
            trees.insert(tree.name.clone(), tree);
        }
    }
}

enum ListEnd {
    Eof,
    End,
    Else,
    ElseIf,
}

struct Parser<'a> {
    name: String,
    parse_name: String,
    text: &'a str,
    lexer: Lexer<'a>,
    pushback: Vec<Item>,
    vars: Vec<String>,
    funcs: &'a BTreeSet<String>,
    trees: BTreeMap<String, Tree>,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Result<BTreeMap<String, Tree>, ParseError> {
        let root = self.top_level_list()?;
        let main = Tree {
            name: self.name.clone(),
            parse_name: self.parse_name.clone(),
            text: self.text.to_string(),
            root,
        };
        let mut trees = self.trees;
        add_tree(&mut trees, main);
        Ok(trees)
    }

    // ── item plumbing ─────────────────────────────────────────────────────

    fn next(&mut self) -> Item {
        self.pushback.pop().unwrap_or_else(|| self.lexer.next_item())
    }

    fn backup(&mut self, item: Item) {
        self.pushback.push(item);
    }

    fn peek(&mut self) -> Item {
        let item = self.next();
        self.backup(item.clone());
        item
    }

    fn make_error(&self, pos: Pos, msg: impl Into<String>) -> ParseError {
        let before = &self.text[..pos.min(self.text.len())];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => pos - nl,
            None => pos + 1,
        };
        ParseError::new(&self.parse_name, line, column, msg)
    }

    fn error<T>(&self, pos: Pos, msg: impl Into<String>) -> Result<T, ParseError> {
        Err(self.make_error(pos, msg))
    }

    fn unexpected<T>(&self, item: &Item, context: &str) -> Result<T, ParseError> {
        if item.kind == ItemKind::Error {
            return self.error(item.pos, item.val.clone());
        }
        self.error(item.pos, format!("unexpected {item} in {context}"))
    }

    fn expect(&mut self, kind: ItemKind, context: &str) -> Result<Item, ParseError> {
        let item = self.next();
        if item.kind != kind {
            return self.unexpected(&item, context);
        }
        Ok(item)
    }

    // ── lists ─────────────────────────────────────────────────────────────

    /// The document body: text, actions, and `define`/`block` registrations.
    fn top_level_list(&mut self) -> Result<ListNode, ParseError> {
        let (list, end) = self.list(true)?;
        match end {
            ListEnd::Eof => Ok(list),
            // `list` only returns the other terminators when nested.
            _ => unreachable!("terminator escaped a nested list"),
        }
    }

    fn list(&mut self, top_level: bool) -> Result<(ListNode, ListEnd), ParseError> {
        let mut list = ListNode {
            pos: self.peek().pos,
            nodes: Vec::new(),
        };
        loop {
            let item = self.next();
            match item.kind {
                ItemKind::Text => list.nodes.push(Node::Text(TextNode {
                    pos: item.pos,
                    text: item.val,
                })),
                ItemKind::Eof => {
                    if top_level {
                        return Ok((list, ListEnd::Eof));
                    }
                    return self.error(item.pos, "unexpected EOF: unclosed action block");
                }
                ItemKind::Error => return self.error(item.pos, item.val),
                ItemKind::LeftDelim => {
                    let delim_pos = item.pos;
                    let inner = self.next();
                    if inner.kind == ItemKind::Keyword {
                        match inner.val.as_str() {
                            "end" => {
                                self.expect(ItemKind::RightDelim, "end")?;
                                if top_level {
                                    return self.error(delim_pos, "unexpected {{end}}");
                                }
                                return Ok((list, ListEnd::End));
                            }
                            "else" => {
                                if top_level {
                                    return self.error(delim_pos, "unexpected {{else}}");
                                }
                                let after = self.peek();
                                if after.kind == ItemKind::Keyword && after.val == "if" {
                                    return Ok((list, ListEnd::ElseIf));
                                }
                                self.expect(ItemKind::RightDelim, "else")?;
                                return Ok((list, ListEnd::Else));
                            }
                            "if" => list
                                .nodes
                                .push(Node::If(self.branch(BranchKind::If, delim_pos)?)),
                            "with" => list
                                .nodes
                                .push(Node::With(self.branch(BranchKind::With, delim_pos)?)),
                            "range" => list
                                .nodes
                                .push(Node::Range(self.branch(BranchKind::Range, delim_pos)?)),
                            "template" => {
                                list.nodes.push(Node::Template(self.template_node(delim_pos)?))
                            }
                            "block" => list.nodes.push(Node::Template(self.block(delim_pos)?)),
                            "define" => {
                                if !top_level {
                                    return self
                                        .error(delim_pos, "define is only allowed at top level");
                                }
                                self.definition()?;
                            }
                            other => {
                                return self.error(inner.pos, format!("unexpected keyword {other}"))
                            }
                        }
                    } else {
                        self.backup(inner);
                        let pipe = self.pipeline("command")?;
                        list.nodes.push(Node::Action(ActionNode {
                            pos: delim_pos,
                            pipe,
                        }));
                    }
                }
                _ => return self.unexpected(&item, "input"),
            }
        }
    }

    // ── control structures ────────────────────────────────────────────────

    /// Parse an `if`/`with`/`range` after its keyword has been consumed.
    fn branch(&mut self, kind: BranchKind, pos: Pos) -> Result<BranchNode, ParseError> {
        let mark = self.vars.len();
        let pipe = self.pipeline(kind.keyword())?;
        if kind != BranchKind::Range && pipe.decls.len() > 1 {
            return self.error(pipe.pos, "too many declarations in command");
        }
        let (list, end) = self.list(false)?;
        let else_list = match end {
            ListEnd::End => None,
            ListEnd::Else => {
                let (else_list, end) = self.list(false)?;
                match end {
                    ListEnd::End => Some(else_list),
                    _ => return self.error(else_list.pos, "expected end; found else"),
                }
            }
            ListEnd::ElseIf => {
                // `{{else if p}}` nests a fresh if sharing the final {{end}}.
                let if_item = self.next();
                let nested = self.branch(BranchKind::If, if_item.pos)?;
                Some(ListNode {
                    pos: nested.pos,
                    nodes: vec![Node::If(nested)],
                })
            }
            ListEnd::Eof => unreachable!("nested list returned EOF"),
        };
        self.vars.truncate(mark);
        Ok(BranchNode {
            pos,
            kind,
            pipe,
            list,
            else_list,
        })
    }

    /// `{{template "name" [pipeline]}}`.
    fn template_node(&mut self, pos: Pos) -> Result<TemplateNode, ParseError> {
        let name = self.template_name("template")?;
        let pipe = if self.peek().kind == ItemKind::RightDelim {
            self.next();
            None
        } else {
            Some(self.pipeline("template")?)
        };
        Ok(TemplateNode { pos, name, pipe })
    }

    /// `{{block "name" pipeline}}body{{end}}`: define + invoke.
    fn block(&mut self, pos: Pos) -> Result<TemplateNode, ParseError> {
        let name = self.template_name("block")?;
        let pipe = if self.peek().kind == ItemKind::RightDelim {
            self.next();
            None
        } else {
            Some(self.pipeline("block")?)
        };

        // The body becomes its own template, so it gets a fresh scope.
        let saved_vars = std::mem::replace(&mut self.vars, vec![String::new()]);
        let (body, end) = self.list(false)?;
        self.vars = saved_vars;
        if !matches!(end, ListEnd::End) {
            return self.error(body.pos, "unexpected else in block");
        }

        let tree = Tree {
            name: name.clone(),
            parse_name: self.parse_name.clone(),
            text: self.text.to_string(),
            root: body,
        };
        add_tree(&mut self.trees, tree);
        Ok(TemplateNode { pos, name, pipe })
    }

    /// `{{define "name"}}body{{end}}`: register a tree, emit nothing.
    fn definition(&mut self) -> Result<(), ParseError> {
        let name = self.template_name("define")?;
        self.expect(ItemKind::RightDelim, "define")?;

        let saved_vars = std::mem::replace(&mut self.vars, vec![String::new()]);
        let (body, end) = self.list(false)?;
        self.vars = saved_vars;

        if !matches!(end, ListEnd::End) {
            return self.error(body.pos, "unexpected else in define");
        }
        let tree = Tree {
            name,
            parse_name: self.parse_name.clone(),
            text: self.text.to_string(),
            root: body,
        };
        add_tree(&mut self.trees, tree);
        Ok(())
    }

    fn template_name(&mut self, context: &str) -> Result<String, ParseError> {
        let item = self.next();
        match item.kind {
            ItemKind::Str => self
                .unquote(&item)
                .map_err(|msg| self.make_error(item.pos, msg)),
            ItemKind::RawString => Ok(item.val[1..item.val.len() - 1].to_string()),
            _ => self.unexpected(&item, context),
        }
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    /// Parse a pipeline and consume the closing delimiter.
    fn pipeline(&mut self, context: &str) -> Result<PipeNode, ParseError> {
        let pos = self.peek().pos;
        let mut decls = Vec::new();
        let mut is_assign = false;

        // Variable declarations: `$x :=`, `$x, $y :=`, or `$x =`.
        if self.peek().kind == ItemKind::Variable {
            let first = self.next();
            let after = self.peek();
            match after.kind {
                ItemKind::Declare | ItemKind::Assign | ItemKind::Comma => {
                    decls.push(var_name(&first.val));
                    let sep = self.next();
                    if sep.kind == ItemKind::Comma {
                        let second = self.expect(ItemKind::Variable, context)?;
                        decls.push(var_name(&second.val));
                        let op = self.next();
                        if op.kind != ItemKind::Declare {
                            return self.unexpected(&op, context);
                        }
                    } else if sep.kind == ItemKind::Assign {
                        is_assign = true;
                    }
                    if is_assign {
                        for name in &decls {
                            if !self.vars.contains(name) {
                                return self
                                    .error(first.pos, format!("undefined variable ${name}"));
                            }
                        }
                    } else {
                        for name in &decls {
                            self.vars.push(name.clone());
                        }
                    }
                }
                _ => self.backup(first),
            }
        }

        let mut cmds = Vec::new();
        loop {
            let cmd = self.command(context)?;
            cmds.push(cmd);
            let item = self.next();
            match item.kind {
                ItemKind::Pipe => continue,
                ItemKind::RightDelim => break,
                ItemKind::RightParen => {
                    // Closing a parenthesized pipeline; caller consumes it.
                    self.backup(item);
                    break;
                }
                _ => return self.unexpected(&item, context),
            }
        }
        if cmds.is_empty() || cmds.iter().all(|c| c.args.is_empty()) {
            return self.error(pos, format!("missing value for {context}"));
        }
        Ok(PipeNode {
            pos,
            decls,
            is_assign,
            cmds,
        })
    }

    /// One command: operands up to `|`, the closing delimiter, or `)`.
    fn command(&mut self, context: &str) -> Result<CommandNode, ParseError> {
        let pos = self.peek().pos;
        let mut args: Vec<Arg> = Vec::new();
        loop {
            let item = self.next();
            match item.kind {
                ItemKind::Pipe | ItemKind::RightDelim | ItemKind::RightParen => {
                    self.backup(item);
                    break;
                }
                ItemKind::Eof | ItemKind::Error => return self.unexpected(&item, context),
                _ => {
                    let arg = self.operand(item, context, args.is_empty())?;
                    args.push(arg);
                }
            }
        }
        if args.is_empty() {
            return self.error(pos, format!("empty command in {context}"));
        }
        Ok(CommandNode { pos, args })
    }

    /// A single operand, merging adjacent field selectors into chains.
    fn operand(&mut self, item: Item, context: &str, first: bool) -> Result<Arg, ParseError> {
        match item.kind {
            ItemKind::Dot => Ok(Arg::Dot(item.pos)),
            ItemKind::Nil => Ok(Arg::Nil(item.pos)),
            ItemKind::Bool => Ok(Arg::Bool {
                pos: item.pos,
                val: item.val == "true",
            }),
            ItemKind::Number => Ok(Arg::Number {
                pos: item.pos,
                text: item.val,
            }),
            ItemKind::Str => {
                let val = self
                    .unquote(&item)
                    .map_err(|msg| self.make_error(item.pos, msg))?;
                Ok(Arg::Str { pos: item.pos, val })
            }
            ItemKind::RawString => Ok(Arg::Str {
                pos: item.pos,
                val: item.val[1..item.val.len() - 1].to_string(),
            }),
            ItemKind::Field => {
                let mut chain = vec![item.val[1..].to_string()];
                self.extend_chain(&mut chain, item.pos + item.val.len());
                Ok(Arg::Field {
                    pos: item.pos,
                    chain,
                })
            }
            ItemKind::Variable => {
                let name = var_name(&item.val);
                if !self.vars.contains(&name) {
                    return self.error(item.pos, format!("undefined variable ${name}"));
                }
                let mut chain = Vec::new();
                self.extend_chain(&mut chain, item.pos + item.val.len());
                Ok(Arg::Variable {
                    pos: item.pos,
                    name,
                    chain,
                })
            }
            ItemKind::Ident => {
                // In command position an identifier is a function name and
                // must be known; in argument position the same holds.
                let _ = first;
                if !self.funcs.contains(&item.val) {
                    return self.error(item.pos, format!("function {:?} not defined", item.val));
                }
                Ok(Arg::Ident {
                    pos: item.pos,
                    name: item.val,
                })
            }
            ItemKind::LeftParen => {
                let pipe = self.pipeline(context)?;
                let close = self.expect(ItemKind::RightParen, context)?;
                if self.peek().kind == ItemKind::Field
                    && self.peek().pos == close.pos + close.val.len()
                {
                    let field = self.peek();
                    return self.error(
                        field.pos,
                        "field access on a parenthesized pipeline is not supported",
                    );
                }
                Ok(Arg::Pipe(pipe))
            }
            _ => self.unexpected(&item, context),
        }
    }

    /// Consume immediately-adjacent `.Field` items, growing `chain`.
    fn extend_chain(&mut self, chain: &mut Vec<String>, mut end: Pos) {
        loop {
            let next = self.peek();
            if next.kind == ItemKind::Field && next.pos == end {
                let item = self.next();
                chain.push(item.val[1..].to_string());
                end = item.pos + item.val.len();
            } else {
                return;
            }
        }
    }

    fn unquote(&self, item: &Item) -> Result<String, String> {
        let inner = &item.val[1..item.val.len() - 1];
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
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('0') => out.push('\0'),
                other => {
                    return Err(format!(
                        "unsupported escape in string literal: \\{}",
                        other.map(String::from).unwrap_or_default()
                    ));
                }
            }
        }
        Ok(out)
    }
}

fn var_name(val: &str) -> String {
    val.trim_start_matches('$').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn funcs() -> BTreeSet<String> {
        ["len", "printf", "upper"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn parse_one(text: &str) -> Tree {
        let trees = parse("root", text, "root", "", "", &funcs()).expect("parse");
        trees.get("root").expect("root tree").clone()
    }

    fn parse_err(text: &str) -> ParseError {
        parse("root", text, "root", "", "", &funcs()).expect_err("expected error")
    }

    #[test]
    fn text_only() {
        let tree = parse_one("hello");
        assert_eq!(tree.root.nodes.len(), 1);
        assert_eq!(tree.to_string(), "hello");
    }

    #[test]
    fn action_round_trips() {
        let tree = parse_one("a {{.Name}} b");
        assert_eq!(tree.to_string(), "a {{.Name}} b");
    }

    #[test]
    fn field_chain_merges() {
        let tree = parse_one("{{.User.Name}}");
        assert_eq!(tree.to_string(), "{{.User.Name}}");
        let Node::Action(action) = &tree.root.nodes[0] else {
            panic!("expected action");
        };
        let Arg::Field { chain, .. } = &action.pipe.cmds[0].args[0] else {
            panic!("expected field");
        };
        assert_eq!(chain, &vec!["User".to_string(), "Name".to_string()]);
    }

    #[test]
    fn separate_fields_stay_separate_args() {
        let tree = parse_one("{{printf .A .B}}");
        let Node::Action(action) = &tree.root.nodes[0] else {
            panic!("expected action");
        };
        assert_eq!(action.pipe.cmds[0].args.len(), 3);
    }

    #[test]
    fn if_else_end() {
        let tree = parse_one("{{if .Ok}}yes{{else}}no{{end}}");
        assert_eq!(tree.to_string(), "{{if .Ok}}yes{{else}}no{{end}}");
    }

    #[test]
    fn else_if_nests() {
        let tree = parse_one("{{if .A}}a{{else if .B}}b{{else}}c{{end}}");
        assert_eq!(
            tree.to_string(),
            "{{if .A}}a{{else}}{{if .B}}b{{else}}c{{end}}{{end}}"
        );
    }

    #[test]
    fn range_with_two_declarations() {
        let tree = parse_one("{{range $i, $v := .Items}}{{$i}}:{{$v}}{{end}}");
        assert_eq!(
            tree.to_string(),
            "{{range $i, $v := .Items}}{{$i}}:{{$v}}{{end}}"
        );
    }

    #[test]
    fn with_scopes_variables() {
        // $x is declared inside with; using it after the block is an error.
        let err = parse_err("{{with $x := .A}}{{$x}}{{end}}{{$x}}");
        assert!(err.message.contains("undefined variable"), "{err}");
    }

    #[test]
    fn define_registers_tree() {
        let trees = parse(
            "root",
            "{{define \"row\"}}<li>{{.}}</li>{{end}}body",
            "root",
            "",
            "",
            &funcs(),
        )
        .unwrap();
        assert!(trees.contains_key("row"));
        assert_eq!(trees["row"].to_string(), "<li>{{.}}</li>");
        assert_eq!(trees["root"].to_string(), "body");
    }

    #[test]
    fn block_defines_and_invokes() {
        let trees = parse(
            "root",
            "{{block \"nav\" .}}default{{end}}",
            "root",
            "",
            "",
            &funcs(),
        )
        .unwrap();
        assert!(trees.contains_key("nav"));
        assert_eq!(trees["root"].to_string(), "{{template \"nav\" .}}");
    }

    #[test]
    fn empty_redefinition_keeps_original() {
        let mut trees = parse(
            "root",
            "{{define \"x\"}}content{{end}}",
            "root",
            "",
            "",
            &funcs(),
        )
        .unwrap();
        let second = parse("root2", "{{define \"x\"}}  {{end}}", "root2", "", "", &funcs()).unwrap();
        for (_, tree) in second {
            add_tree(&mut trees, tree);
        }
        assert_eq!(trees["x"].to_string(), "content");
    }

    #[test]
    fn template_invocation_with_and_without_arg() {
        let tree = parse_one("{{template \"a\"}}{{template \"b\" .X}}");
        assert_eq!(tree.to_string(), "{{template \"a\"}}{{template \"b\" .X}}");
    }

    #[test]
    fn pipeline_stages() {
        let tree = parse_one("{{.Name | upper | printf \"%s\"}}");
        let Node::Action(action) = &tree.root.nodes[0] else {
            panic!("expected action");
        };
        assert_eq!(action.pipe.cmds.len(), 3);
    }

    #[test]
    fn parenthesized_pipeline() {
        let tree = parse_one("{{printf \"%d\" (len .Items)}}");
        assert_eq!(tree.to_string(), "{{printf \"%d\" (len .Items)}}");
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = parse_err("{{frobnicate .}}");
        assert!(err.message.contains("\"frobnicate\" not defined"), "{err}");
    }

    #[test]
    fn unclosed_if_is_an_error() {
        let err = parse_err("{{if .X}}unterminated");
        assert!(err.message.contains("unclosed action block") || err.message.contains("EOF"));
    }

    #[test]
    fn unexpected_end_is_an_error() {
        let err = parse_err("text{{end}}");
        assert!(err.message.contains("unexpected {{end}}"));
    }

    #[test]
    fn error_positions_are_line_and_column() {
        let err = parse_err("line one\n{{frobnicate}}");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let err = parse_err("{{$nope}}");
        assert!(err.message.contains("undefined variable $nope"));
    }

    #[test]
    fn assignment_requires_existing_variable() {
        let err = parse_err("{{$x = 1}}");
        assert!(err.message.contains("undefined variable $x"));
    }

    #[test]
    fn comments_vanish() {
        let tree = parse_one("a{{/* hidden */}}b");
        assert_eq!(tree.to_string(), "ab");
    }

    #[test]
    fn node_positions_index_source() {
        let tree = parse_one("abc{{.X}}");
        let action = &tree.root.nodes[1];
        assert_eq!(action.pos(), 3);
        let position = tree.position(action.pos());
        assert_eq!((position.line, position.column), (1, 4));
    }
}
