//! Parse-tree nodes.
//!
//! Trees are produced by [`crate::parse`] and consumed both by the renderer
//! and by the muxt analyzer. Every node records the byte offset of its first
//! token; [`Tree::position`] turns an offset back into a line/column pair by
//! counting newlines in the tree's original source.
//!
//! `Display` on every node reconstructs equivalent template source (always
//! with the standard `{{`/`}}` delimiters), which backs the
//! `template-source` report and diagnostics.

use std::fmt;

/// Byte offset into a tree's source text.
pub type Pos = usize;

/// A resolved source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: Pos,
}

/// A named parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Template name (`{{define}}` name, file basename, or root name).
    pub name: String,
    /// Where the source came from; a file path when parsed from files.
    /// Used only for diagnostics.
    pub parse_name: String,
    /// The full source text this tree was parsed from. Node positions index
    /// into this string; several trees parsed from one call share it.
    pub text: String,
    pub root: ListNode,
}

impl Tree {
    /// Resolve a node offset to a 1-based line and column.
    pub fn position(&self, pos: Pos) -> Position {
        let pos = pos.min(self.text.len());
        let before = &self.text[..pos];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => pos - nl,
            None => pos + 1,
        };
        Position {
            line,
            column,
            offset: pos,
        }
    }

    /// True when the tree renders nothing: only whitespace text survives
    /// (comments never reach the tree).
    pub fn is_empty(&self) -> bool {
        fn list_empty(list: &ListNode) -> bool {
            list.nodes.iter().all(|n| match n {
                Node::Text(t) => t.text.trim().is_empty(),
                _ => false,
            })
        }
        list_empty(&self.root)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Any tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    If(BranchNode),
    With(BranchNode),
    Range(BranchNode),
    Template(TemplateNode),
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Node::Text(n) => n.pos,
            Node::Action(n) => n.pos,
            Node::If(n) | Node::With(n) | Node::Range(n) => n.pos,
            Node::Template(n) => n.pos,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(n) => write!(f, "{n}"),
            Node::Action(n) => write!(f, "{n}"),
            Node::If(n) | Node::With(n) | Node::Range(n) => write!(f, "{n}"),
            Node::Template(n) => write!(f, "{n}"),
        }
    }
}

/// A sequence of nodes (a template body or branch body).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub pos: Pos,
    pub nodes: Vec<Node>,
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// Literal text between actions.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub pos: Pos,
    pub text: String,
}

impl fmt::Display for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `{{pipeline}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pos: Pos,
    pub pipe: PipeNode,
}

impl fmt::Display for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{}}}}}", self.pipe)
    }
}

/// Which control keyword introduced a [`BranchNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    If,
    With,
    Range,
}

impl BranchKind {
    pub fn keyword(self) -> &'static str {
        match self {
            BranchKind::If => "if",
            BranchKind::With => "with",
            BranchKind::Range => "range",
        }
    }
}

/// `{{if pipe}}…{{else}}…{{end}}` and the `with`/`range` analogues.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub pos: Pos,
    pub kind: BranchKind,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

impl fmt::Display for BranchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{} {}}}}}{}", self.kind.keyword(), self.pipe, self.list)?;
        if let Some(else_list) = &self.else_list {
            write!(f, "{{{{else}}}}{else_list}")?;
        }
        write!(f, "{{{{end}}}}")
    }
}

/// `{{template "name" [pipeline]}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub pos: Pos,
    pub name: String,
    pub pipe: Option<PipeNode>,
}

impl fmt::Display for TemplateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pipe {
            Some(pipe) => write!(f, "{{{{template {:?} {pipe}}}}}", self.name),
            None => write!(f, "{{{{template {:?}}}}}", self.name),
        }
    }
}

/// A pipeline: optional variable declarations, then `|`-separated commands.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeNode {
    pub pos: Pos,
    /// Variables declared (`:=`) or assigned (`=`) by this pipeline.
    pub decls: Vec<String>,
    pub is_assign: bool,
    pub cmds: Vec<CommandNode>,
}

impl fmt::Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decls.is_empty() {
            let op = if self.is_assign { "=" } else { ":=" };
            let vars = self
                .decls
                .iter()
                .map(|d| format!("${d}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "{vars} {op} ")?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

/// One pipeline stage: an operand followed by its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub pos: Pos,
    pub args: Vec<Arg>,
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

/// A pipeline operand or argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// The cursor, `.`.
    Dot(Pos),
    /// The untyped nil constant.
    Nil(Pos),
    /// A field chain rooted at the cursor: `.A.B` → `["A", "B"]`.
    Field { pos: Pos, chain: Vec<String> },
    /// `$name` with an optional trailing field chain (`$x.A`).
    Variable {
        pos: Pos,
        name: String,
        chain: Vec<String>,
    },
    /// A bare identifier: a function name.
    Ident { pos: Pos, name: String },
    /// Boolean literal.
    Bool { pos: Pos, val: bool },
    /// Numeric literal; `text` preserves the source spelling.
    Number { pos: Pos, text: String },
    /// String literal, already unquoted.
    Str { pos: Pos, val: String },
    /// A parenthesized pipeline.
    Pipe(PipeNode),
}

impl Arg {
    pub fn pos(&self) -> Pos {
        match self {
            Arg::Dot(pos) | Arg::Nil(pos) => *pos,
            Arg::Field { pos, .. }
            | Arg::Variable { pos, .. }
            | Arg::Ident { pos, .. }
            | Arg::Bool { pos, .. }
            | Arg::Number { pos, .. }
            | Arg::Str { pos, .. } => *pos,
            Arg::Pipe(pipe) => pipe.pos,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Dot(_) => write!(f, "."),
            Arg::Nil(_) => write!(f, "nil"),
            Arg::Field { chain, .. } => {
                for part in chain {
                    write!(f, ".{part}")?;
                }
                Ok(())
            }
            Arg::Variable { name, chain, .. } => {
                write!(f, "${name}")?;
                for part in chain {
                    write!(f, ".{part}")?;
                }
                Ok(())
            }
            Arg::Ident { name, .. } => write!(f, "{name}"),
            Arg::Bool { val, .. } => write!(f, "{val}"),
            Arg::Number { text, .. } => write!(f, "{text}"),
            Arg::Str { val, .. } => write!(f, "{val:?}"),
            Arg::Pipe(pipe) => write!(f, "({pipe})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_text(text: &str) -> Tree {
        Tree {
            name: "t".into(),
            parse_name: "t".into(),
            text: text.into(),
            root: ListNode::default(),
        }
    }

    #[test]
    fn position_counts_lines_and_columns() {
        let tree = tree_with_text("ab\ncd\nef");
        assert_eq!(
            tree.position(0),
            Position {
                line: 1,
                column: 1,
                offset: 0
            }
        );
        assert_eq!(
            tree.position(4),
            Position {
                line: 2,
                column: 2,
                offset: 4
            }
        );
        assert_eq!(tree.position(6).line, 3);
    }

    #[test]
    fn position_clamps_past_end() {
        let tree = tree_with_text("ab");
        assert_eq!(tree.position(99).offset, 2);
    }

    #[test]
    fn empty_tree_detection() {
        let mut tree = tree_with_text("  \n\t");
        tree.root.nodes.push(Node::Text(TextNode {
            pos: 0,
            text: "  \n\t".into(),
        }));
        assert!(tree.is_empty());

        tree.root.nodes.push(Node::Action(ActionNode {
            pos: 0,
            pipe: PipeNode {
                pos: 0,
                decls: vec![],
                is_assign: false,
                cmds: vec![],
            },
        }));
        assert!(!tree.is_empty());
    }
}
