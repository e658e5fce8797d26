//! Template lexer.
//!
//! Splits template source into items: literal text, action delimiters, and
//! the tokens inside actions. Every item carries the byte offset where it
//! begins so the parser can attach positions to tree nodes.
//!
//! The lexer is a plain cursor over the input; [`Lexer::next_item`]
//! alternates between text mode and action mode.

use std::fmt;

/// One lexical item.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    /// Byte offset of the item's first byte in the input.
    pub pos: usize,
    /// The raw value: literal text, identifier spelling, quoted string
    /// including quotes, and so on.
    pub val: String,
    /// 1-based line of the item's first byte.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Literal text between actions.
    Text,
    /// Opening action delimiter.
    LeftDelim,
    /// Closing action delimiter.
    RightDelim,
    /// `|` between pipeline commands.
    Pipe,
    /// Plain identifier (function name).
    Ident,
    /// A single field selector, `.Name`.
    Field,
    /// A variable, `$name` (or bare `$`).
    Variable,
    /// The cursor, `.`.
    Dot,
    /// The untyped nil constant.
    Nil,
    /// Numeric literal.
    Number,
    /// Interpreted string literal, quotes included.
    Str,
    /// Raw string literal (backquoted), quotes included.
    RawString,
    /// Boolean literal.
    Bool,
    /// `:=`.
    Declare,
    /// `=`.
    Assign,
    /// `,` between declared variables.
    Comma,
    LeftParen,
    RightParen,
    /// A reserved word: block, define, else, end, if, range, template, with.
    Keyword,
    Eof,
    /// Lexing failure; `val` holds the message.
    Error,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ItemKind::Eof => write!(f, "EOF"),
            ItemKind::Error => write!(f, "{}", self.val),
            _ => write!(f, "{:?}", self.val),
        }
    }
}

const KEYWORDS: &[&str] = &[
    "block", "define", "else", "end", "if", "range", "template", "with",
];

pub struct Lexer<'a> {
    input: &'a str,
    left: String,
    right: String,
    /// Current scan offset.
    pos: usize,
    /// 1-based line at `pos`.
    line: usize,
    in_action: bool,
    paren_depth: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, left: &str, right: &str) -> Self {
        let left = if left.is_empty() {
            crate::LEFT_DELIM.to_string()
        } else {
            left.to_string()
        };
        let right = if right.is_empty() {
            crate::RIGHT_DELIM.to_string()
        } else {
            right.to_string()
        };
        Self {
            input,
            left,
            right,
            pos: 0,
            line: 1,
            in_action: false,
            paren_depth: 0,
            done: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn item(&self, kind: ItemKind, pos: usize, val: impl Into<String>) -> Item {
        let val = val.into();
        let line = self.line_at(pos);
        Item {
            kind,
            pos,
            val,
            line,
        }
    }

    fn line_at(&self, pos: usize) -> usize {
        // `self.line` tracks the line at `self.pos`; items always start at or
        // before it, so count back over any newlines in between.
        let between = &self.input[pos..self.pos];
        self.line - between.matches('\n').count()
    }

    fn advance(&mut self, n: usize) {
        let skipped = &self.input[self.pos..self.pos + n];
        self.line += skipped.matches('\n').count();
        self.pos += n;
    }

    fn error(&mut self, pos: usize, msg: impl Into<String>) -> Item {
        self.done = true;
        self.item(ItemKind::Error, pos, msg)
    }

    /// Produce the next item. After an [`ItemKind::Eof`] or
    /// [`ItemKind::Error`] item, every further call returns EOF.
    pub fn next_item(&mut self) -> Item {
        if self.done {
            return self.item(ItemKind::Eof, self.pos, "");
        }
        if self.in_action {
            self.lex_in_action()
        } else {
            self.lex_text()
        }
    }

    // ── text mode ─────────────────────────────────────────────────────────

    fn lex_text(&mut self) -> Item {
        let start = self.pos;
        match self.rest().find(self.left.as_str()) {
            None => {
                self.done = true;
                if start < self.input.len() {
                    let text = &self.input[start..];
                    let item = self.item(ItemKind::Text, start, text);
                    self.advance(self.input.len() - start);
                    item
                } else {
                    self.item(ItemKind::Eof, start, "")
                }
            }
            Some(offset) => {
                let delim_pos = self.pos + offset;
                let mut text = &self.input[start..delim_pos];

                // `{{- ` trims trailing whitespace from the preceding text.
                let after = &self.input[delim_pos + self.left.len()..];
                if after.starts_with('-')
                    && after[1..].starts_with(|c: char| c.is_whitespace())
                {
                    text = text.trim_end();
                }

                if text.is_empty() {
                    // No text to emit; fall through to the delimiter.
                    self.advance(delim_pos - start);
                    return self.lex_left_delim();
                }
                let item = self.item(ItemKind::Text, start, text);
                self.advance(delim_pos - start);
                item
            }
        }
    }

    fn lex_left_delim(&mut self) -> Item {
        let start = self.pos;
        self.advance(self.left.len());
        if self.rest().starts_with('-')
            && self.rest()[1..].starts_with(|c: char| c.is_whitespace())
        {
            self.advance(1);
        }

        // Comments consume everything through the closing delimiter and
        // produce no item at all.
        let after_spaces = self.rest().trim_start();
        if after_spaces.starts_with("/*") {
            return self.lex_comment(start);
        }

        self.in_action = true;
        self.paren_depth = 0;
        self.item(ItemKind::LeftDelim, start, self.left.clone())
    }

    fn lex_comment(&mut self, start: usize) -> Item {
        let ws = self.rest().len() - self.rest().trim_start().len();
        self.advance(ws);
        let Some(end) = self.rest().find("*/") else {
            return self.error(start, "unclosed comment");
        };
        self.advance(end + 2);

        // Optional right trim marker, then the closing delimiter.
        let mut rest = self.rest();
        let mut trim = 0;
        if rest.starts_with(|c: char| c.is_whitespace()) {
            let ws = rest.len() - rest.trim_start().len();
            rest = rest.trim_start();
            if rest.starts_with('-') && rest[1..].starts_with(self.right.as_str()) {
                trim = ws + 1;
            }
        }
        if trim > 0 {
            self.advance(trim);
        }
        if !self.rest().starts_with(self.right.as_str()) {
            return self.error(start, "comment ends before closing delimiter");
        }
        self.advance(self.right.len());
        if trim > 0 {
            self.skip_leading_trim();
        }
        // Recurse: emit whatever follows the comment.
        self.next_item()
    }

    fn skip_leading_trim(&mut self) {
        let trimmed = self.rest().trim_start();
        let n = self.rest().len() - trimmed.len();
        self.advance(n);
    }

    // ── action mode ───────────────────────────────────────────────────────

    fn lex_in_action(&mut self) -> Item {
        // Skip horizontal/vertical whitespace between tokens.
        loop {
            match self.rest().chars().next() {
                Some(c) if c.is_whitespace() => self.advance(c.len_utf8()),
                _ => break,
            }
        }
        let start = self.pos;
        let rest = self.rest();

        if rest.is_empty() {
            return self.error(start, "unclosed action");
        }

        // Right delimiter, with optional `-}}` trim marker.
        if rest.starts_with('-') && rest[1..].starts_with(self.right.as_str()) {
            if self.paren_depth > 0 {
                return self.error(start, "unclosed left paren");
            }
            self.advance(1 + self.right.len());
            self.in_action = false;
            self.skip_leading_trim();
            return self.item(ItemKind::RightDelim, start, self.right.clone());
        }
        if rest.starts_with(self.right.as_str()) {
            if self.paren_depth > 0 {
                return self.error(start, "unclosed left paren");
            }
            self.advance(self.right.len());
            self.in_action = false;
            return self.item(ItemKind::RightDelim, start, self.right.clone());
        }

        let c = rest.chars().next().unwrap();
        match c {
            '|' => {
                self.advance(1);
                self.item(ItemKind::Pipe, start, "|")
            }
            ',' => {
                self.advance(1);
                self.item(ItemKind::Comma, start, ",")
            }
            '(' => {
                self.paren_depth += 1;
                self.advance(1);
                self.item(ItemKind::LeftParen, start, "(")
            }
            ')' => {
                if self.paren_depth == 0 {
                    return self.error(start, "unexpected right paren");
                }
                self.paren_depth -= 1;
                self.advance(1);
                self.item(ItemKind::RightParen, start, ")")
            }
            ':' => {
                if rest[1..].starts_with('=') {
                    self.advance(2);
                    self.item(ItemKind::Declare, start, ":=")
                } else {
                    self.error(start, "expected :=")
                }
            }
            '=' => {
                self.advance(1);
                self.item(ItemKind::Assign, start, "=")
            }
            '"' => self.lex_quote(start),
            '`' => self.lex_raw_quote(start),
            '$' => self.lex_variable(start),
            '.' => {
                // `.Field`, or the bare cursor, or a float like `.5`.
                if rest[1..].starts_with(|ch: char| ch.is_ascii_digit()) {
                    self.lex_number(start)
                } else if rest[1..].starts_with(is_alpha) {
                    self.lex_field(start)
                } else {
                    self.advance(1);
                    self.item(ItemKind::Dot, start, ".")
                }
            }
            '+' | '-' => self.lex_number(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            c if is_alpha(c) => self.lex_ident(start),
            c => self.error(start, format!("unrecognized character in action: {c:?}")),
        }
    }

    fn lex_quote(&mut self, start: usize) -> Item {
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' => break,
                '"' => {
                    let val = &self.rest()[..=i];
                    let item = self.item(ItemKind::Str, start, val);
                    self.advance(i + 1);
                    return item;
                }
                _ => {}
            }
        }
        self.error(start, "unterminated quoted string")
    }

    fn lex_raw_quote(&mut self, start: usize) -> Item {
        match self.rest()[1..].find('`') {
            Some(i) => {
                let val = &self.rest()[..i + 2];
                let item = self.item(ItemKind::RawString, start, val);
                self.advance(i + 2);
                item
            }
            None => self.error(start, "unterminated raw quoted string"),
        }
    }

    fn lex_variable(&mut self, start: usize) -> Item {
        let word_len = 1 + ident_len(&self.rest()[1..]);
        let val = &self.rest()[..word_len];
        let item = self.item(ItemKind::Variable, start, val);
        self.advance(word_len);
        item
    }

    fn lex_field(&mut self, start: usize) -> Item {
        let word_len = 1 + ident_len(&self.rest()[1..]);
        let val = &self.rest()[..word_len];
        let item = self.item(ItemKind::Field, start, val);
        self.advance(word_len);
        item
    }

    fn lex_ident(&mut self, start: usize) -> Item {
        let word_len = ident_len(self.rest());
        let word = &self.rest()[..word_len];
        let kind = match word {
            "true" | "false" => ItemKind::Bool,
            "nil" => ItemKind::Nil,
            w if KEYWORDS.contains(&w) => ItemKind::Keyword,
            _ => ItemKind::Ident,
        };
        let item = self.item(kind, start, word);
        self.advance(word_len);
        item
    }

    fn lex_number(&mut self, start: usize) -> Item {
        let rest = self.rest();
        let mut len = 0;
        let bytes = rest.as_bytes();
        if bytes[len] == b'+' || bytes[len] == b'-' {
            len += 1;
        }
        let digits_start = len;
        while len < bytes.len() && (bytes[len].is_ascii_digit() || bytes[len] == b'.') {
            len += 1;
        }
        // Exponent suffix.
        if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
            let mut exp = len + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            let exp_digits = exp;
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            if exp > exp_digits {
                len = exp;
            }
        }
        let text = &rest[..len];
        if len == digits_start || text.parse::<f64>().is_err() && parse_int(text).is_none() {
            return self.error(start, format!("bad number syntax: {text:?}"));
        }
        let item = self.item(ItemKind::Number, start, text);
        self.advance(len);
        item
    }
}

fn is_alpha(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|&(_, c)| !(c == '_' || c.is_alphanumeric()))
        .map_or(s.len(), |(i, _)| i)
}

/// Parse an integer literal, tolerating a leading sign.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(ItemKind, String)> {
        let mut lexer = Lexer::new(input, "", "");
        let mut out = Vec::new();
        loop {
            let item = lexer.next_item();
            let done = matches!(item.kind, ItemKind::Eof | ItemKind::Error);
            out.push((item.kind, item.val));
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn plain_text_is_one_item() {
        let items = kinds("hello world");
        assert_eq!(items[0], (ItemKind::Text, "hello world".into()));
        assert_eq!(items[1].0, ItemKind::Eof);
    }

    #[test]
    fn simple_action() {
        let items = kinds("{{.Name}}");
        let expect = [
            (ItemKind::LeftDelim, "{{"),
            (ItemKind::Field, ".Name"),
            (ItemKind::RightDelim, "}}"),
            (ItemKind::Eof, ""),
        ];
        for (got, want) in items.iter().zip(expect.iter()) {
            assert_eq!(got.0, want.0);
            assert_eq!(got.1, want.1);
        }
    }

    #[test]
    fn field_chain_is_separate_items() {
        let items = kinds("{{.A.B}}");
        assert_eq!(items[1], (ItemKind::Field, ".A".into()));
        assert_eq!(items[2], (ItemKind::Field, ".B".into()));
    }

    #[test]
    fn keywords_and_strings() {
        let items = kinds(r#"{{template "row" .}}"#);
        assert_eq!(items[1], (ItemKind::Keyword, "template".into()));
        assert_eq!(items[2], (ItemKind::Str, r#""row""#.into()));
        assert_eq!(items[3], (ItemKind::Dot, ".".into()));
    }

    #[test]
    fn pipeline_and_parens() {
        let items = kinds("{{(len .Items) | printf \"%d\"}}");
        let got: Vec<ItemKind> = items.iter().map(|i| i.0).collect();
        assert_eq!(
            got,
            vec![
                ItemKind::LeftDelim,
                ItemKind::LeftParen,
                ItemKind::Ident,
                ItemKind::Field,
                ItemKind::RightParen,
                ItemKind::Pipe,
                ItemKind::Ident,
                ItemKind::Str,
                ItemKind::RightDelim,
                ItemKind::Eof,
            ]
        );
    }

    #[test]
    fn variables_and_declare() {
        let items = kinds("{{$x := 12}}");
        assert_eq!(items[1], (ItemKind::Variable, "$x".into()));
        assert_eq!(items[2], (ItemKind::Declare, ":=".into()));
        assert_eq!(items[3], (ItemKind::Number, "12".into()));
    }

    #[test]
    fn comment_produces_no_items() {
        let items = kinds("a{{/* note */}}b");
        assert_eq!(items[0], (ItemKind::Text, "a".into()));
        assert_eq!(items[1], (ItemKind::Text, "b".into()));
    }

    #[test]
    fn trim_markers_strip_whitespace() {
        let items = kinds("a  {{- .X -}}  b");
        assert_eq!(items[0], (ItemKind::Text, "a".into()));
        assert_eq!(items[1].0, ItemKind::LeftDelim);
        assert_eq!(items[2], (ItemKind::Field, ".X".into()));
        assert_eq!(items[3].0, ItemKind::RightDelim);
        assert_eq!(items[4], (ItemKind::Text, "b".into()));
    }

    #[test]
    fn custom_delimiters() {
        let mut lexer = Lexer::new("<% .X %>", "<%", "%>");
        assert_eq!(lexer.next_item().kind, ItemKind::LeftDelim);
        assert_eq!(lexer.next_item().kind, ItemKind::Field);
        assert_eq!(lexer.next_item().kind, ItemKind::RightDelim);
    }

    #[test]
    fn unterminated_string_is_error() {
        let items = kinds("{{\"oops}}");
        assert!(items.iter().any(|i| i.0 == ItemKind::Error));
    }

    #[test]
    fn unclosed_action_is_error() {
        let items = kinds("{{.X");
        assert!(items.iter().any(|i| i.0 == ItemKind::Error));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let mut lexer = Lexer::new("ab{{.X}}", "", "");
        let text = lexer.next_item();
        assert_eq!(text.pos, 0);
        let delim = lexer.next_item();
        assert_eq!(delim.pos, 2);
        let field = lexer.next_item();
        assert_eq!(field.pos, 4);
    }

    #[test]
    fn lines_tracked_across_newlines() {
        let mut lexer = Lexer::new("a\nb\n{{.X}}", "", "");
        let text = lexer.next_item();
        assert_eq!(text.line, 1);
        let delim = lexer.next_item();
        assert_eq!(delim.line, 3);
    }
}
