//! Layout scanner: turns source text into a token tree whose nesting encodes
//! block structure.
//!
//! Both layout modes build the same shape. A statement block is a
//! [`Node::Block`]; statements inside it are divided by [`Separator::Weak`]
//! (line breaks) and [`Separator::Strong`] (`,` and `;`). Bracket pairs are
//! [`Node::Group`]s. `->` and `=>` followed by more tokens on the same line open
//! a layer block that ends with the line, or with the enclosing group when the
//! arrow appears inside brackets.

use std::borrow::Cow;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::{CompileError, CompileOptions, ErrorManager, LayoutMode, Pos};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword,
    Modifier,
    Symbol,
    Number,
    Str,
    Bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_symbol(&self, text: &str) -> bool {
        self.is(TokenKind::Symbol, text)
    }

    pub fn is_keyword(&self, text: &str) -> bool {
        self.is(TokenKind::Keyword, text)
    }
}

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Separator {
    Weak,
    Strong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Indent,
    Brace,
    Layer,
}

#[derive(Clone, Debug)]
pub enum Node {
    Token(Token),
    Block {
        kind: BlockKind,
        pos: Pos,
        children: Vec<NodeId>,
    },
    Group {
        open: char,
        pos: Pos,
        children: Vec<NodeId>,
    },
    Sep {
        kind: Separator,
        symbol: Option<char>,
        pos: Pos,
    },
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Node::Token(t) => t.pos,
            Node::Block { pos, .. } | Node::Group { pos, .. } | Node::Sep { pos, .. } => *pos,
        }
    }
}

/// Arena of nodes; parents own vectors of child ids.
#[derive(Clone, Debug)]
pub struct TokenTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl TokenTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id] {
            Node::Block { children, .. } | Node::Group { children, .. } => children,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Compact rendering used by tests: blocks as `{..}`, groups with their
    /// brackets, weak separators as `|` and strong ones as their symbol.
    pub fn render(&self, id: NodeId) -> String {
        match &self.nodes[id] {
            Node::Token(t) if t.kind == TokenKind::Str => format!("{:?}", t.text),
            Node::Token(t) => t.text.clone(),
            Node::Sep { kind: Separator::Weak, .. } => "|".into(),
            Node::Sep { symbol, .. } => symbol.unwrap_or(';').to_string(),
            Node::Block { kind, children, .. } => {
                let inner: Vec<String> = children.iter().map(|c| self.render(*c)).collect();
                let open = if *kind == BlockKind::Layer { "<" } else { "{" };
                let close = if *kind == BlockKind::Layer { ">" } else { "}" };
                format!("{}{}{}", open, inner.join(" "), close)
            }
            Node::Group { open, children, .. } => {
                let inner: Vec<String> = children.iter().map(|c| self.render(*c)).collect();
                let close = match open {
                    '(' => ')',
                    '[' => ']',
                    _ => '}',
                };
                format!("{}{}{}", open, inner.join(" "), close)
            }
        }
    }
}

const KEYWORDS: &[&str] = &[
    "package", "import", "class", "interface", "object", "fun", "annotation", "if", "elseif",
    "else", "while", "do", "for", "in", "break", "continue", "return", "throw", "try", "catch",
    "finally", "synchronized", "new", "match", "case", "is", "not", "type", "as", "static",
    "def", "and", "or", "null",
];

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "abstract", "abs", "val", "var", "data", "nonnull",
    "nonempty", "implicit",
];

const BOOLS: &[&str] = &["true", "false", "yes", "no"];

const SYMBOLS: &[&str] = &[
    ">>>=", "...", ">>>", "===", "!==", "<<=", ">>=", "^^", "<-", "->", "=>", "..", ".:", "::",
    "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "+", "-", "*", "/", "%", "=", "<", ">", "!", "~", "&", "|", "^", ".",
    ":", "@", "?",
];

/// Symbols and words that continue a statement onto the next line.
const CONTINUATIONS: &[&str] = &[
    "+", "-", "*", "/", "%", "^^", "=", "==", "!=", "===", "!==", "<", ">", "<=", ">=", "&&",
    "||", "&", "|", "^", "<<", ">>", ">>>", ".", "..", ".:", "::", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "<<=", ">>=", ">>>=", "<-", "and", "or", "in", "is", "as",
];

#[derive(Clone, Debug)]
enum Lexeme {
    Token(Token),
    Open(char, Pos),
    Close(char, Pos),
    Sep(char, Pos),
}

impl Lexeme {
    fn continues_line(&self) -> bool {
        match self {
            Lexeme::Token(t) => {
                (t.kind == TokenKind::Symbol || t.kind == TokenKind::Keyword)
                    && CONTINUATIONS.contains(&t.text.as_str())
            }
            Lexeme::Open(..) => true,
            Lexeme::Sep(c, _) => *c == ',',
            Lexeme::Close(..) => false,
        }
    }
}

#[derive(Debug)]
struct Line {
    indent: usize,
    number: u32,
    lexemes: Vec<Lexeme>,
}

struct LineLexer<'a> {
    unit: &'a str,
    chars: &'a [char],
    i: usize,
    line: u32,
    column_offset: u32,
}

impl<'a> LineLexer<'a> {
    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column_offset + self.i as u32 + 1)
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut k = self.i;
        for c in s.chars() {
            if self.chars.get(k) != Some(&c) {
                return false;
            }
            k += 1;
        }
        true
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.unit, self.pos(), message)
    }

    fn lex_lexeme(&mut self, out: &mut Vec<Lexeme>) -> Result<(), CompileError> {
        let pos = self.pos();
        let c = self.chars[self.i];
        match c {
            '(' | '[' | '{' => {
                self.i += 1;
                out.push(Lexeme::Open(c, pos));
            }
            ')' | ']' | '}' => {
                self.i += 1;
                out.push(Lexeme::Close(c, pos));
            }
            ',' => {
                self.i += 1;
                out.push(Lexeme::Sep(',', pos));
            }
            ';' => {
                self.i += 1;
                out.push(Lexeme::Sep(';', pos));
            }
            '"' => self.lex_string(pos, out)?,
            '\'' => {
                let text = self.lex_quoted('\'')?;
                out.push(Lexeme::Token(Token { kind: TokenKind::Str, text, pos }));
            }
            '`' => {
                self.i += 1;
                let start = self.i;
                while self.i < self.chars.len() && self.chars[self.i] != '`' {
                    self.i += 1;
                }
                if self.i >= self.chars.len() {
                    return Err(self.error("unterminated quoted identifier"));
                }
                let text: String = self.chars[start..self.i].iter().collect();
                self.i += 1;
                out.push(Lexeme::Token(Token { kind: TokenKind::Ident, text, pos }));
            }
            c if c.is_ascii_digit() => {
                let text = self.lex_number();
                out.push(Lexeme::Token(Token { kind: TokenKind::Number, text, pos }));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = self.i;
                while self.i < self.chars.len()
                    && (self.chars[self.i].is_alphanumeric() || self.chars[self.i] == '_' || self.chars[self.i] == '$')
                {
                    self.i += 1;
                }
                let text: String = self.chars[start..self.i].iter().collect();
                let kind = if KEYWORDS.contains(&text.as_str()) {
                    TokenKind::Keyword
                } else if MODIFIERS.contains(&text.as_str()) {
                    TokenKind::Modifier
                } else if BOOLS.contains(&text.as_str()) {
                    TokenKind::Bool
                } else {
                    TokenKind::Ident
                };
                out.push(Lexeme::Token(Token { kind, text, pos }));
            }
            _ => {
                let symbol = SYMBOLS
                    .iter()
                    .find(|s| self.starts_with(s))
                    .ok_or_else(|| self.error(format!("unexpected character `{}`", c)))?;
                self.i += symbol.chars().count();
                out.push(Lexeme::Token(Token {
                    kind: TokenKind::Symbol,
                    text: symbol.to_string(),
                    pos,
                }));
            }
        }
        Ok(())
    }

    fn lex_number(&mut self) -> String {
        let start = self.i;
        if self.starts_with("0x") || self.starts_with("0X") {
            self.i += 2;
            while self.peek(0).map_or(false, |c| c.is_ascii_hexdigit() || c == '_') {
                self.i += 1;
            }
        } else {
            while self.peek(0).map_or(false, |c| c.is_ascii_digit() || c == '_') {
                self.i += 1;
            }
            if self.peek(0) == Some('.') && self.peek(1).map_or(false, |c| c.is_ascii_digit()) {
                self.i += 1;
                while self.peek(0).map_or(false, |c| c.is_ascii_digit() || c == '_') {
                    self.i += 1;
                }
            }
            if matches!(self.peek(0), Some('e') | Some('E')) {
                let sign = usize::from(matches!(self.peek(1), Some('+') | Some('-')));
                if self.peek(1 + sign).map_or(false, |c| c.is_ascii_digit()) {
                    self.i += 1 + sign;
                    while self.peek(0).map_or(false, |c| c.is_ascii_digit()) {
                        self.i += 1;
                    }
                }
            }
        }
        if matches!(self.peek(0), Some('L' | 'l' | 'F' | 'f' | 'D' | 'd')) {
            self.i += 1;
        }
        self.chars[start..self.i].iter().filter(|c| **c != '_').collect()
    }

    fn read_escape(&mut self) -> Result<char, CompileError> {
        let c = self.peek(0).ok_or_else(|| self.error("unterminated escape"))?;
        self.i += 1;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '0' => '\0',
            'u' => {
                let hex: String = self.chars.get(self.i..self.i + 4).unwrap_or(&[]).iter().collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("bad unicode escape"))?;
                self.i += 4;
                char::from_u32(code).ok_or_else(|| self.error("bad unicode escape"))?
            }
            other => other,
        })
    }

    fn lex_quoted(&mut self, quote: char) -> Result<String, CompileError> {
        self.i += 1;
        let mut text = String::new();
        loop {
            let c = self.peek(0).ok_or_else(|| self.error("unterminated string"))?;
            self.i += 1;
            match c {
                '\\' => text.push(self.read_escape()?),
                c if c == quote => return Ok(text),
                c => text.push(c),
            }
        }
    }

    /// `"a${x}b"` becomes `("a" + (x) + "b")`.
    fn lex_string(&mut self, pos: Pos, out: &mut Vec<Lexeme>) -> Result<(), CompileError> {
        self.i += 1;
        let mut parts: Vec<Result<String, Vec<Lexeme>>> = Vec::new();
        let mut text = String::new();
        loop {
            let c = self.peek(0).ok_or_else(|| self.error("unterminated string"))?;
            match c {
                '"' => {
                    self.i += 1;
                    break;
                }
                '\\' => {
                    self.i += 1;
                    text.push(self.read_escape()?);
                }
                '$' if self.peek(1) == Some('{') => {
                    parts.push(Ok(std::mem::take(&mut text)));
                    self.i += 2;
                    let start = self.i;
                    let mut depth = 1;
                    while depth > 0 {
                        match self.peek(0) {
                            None => return Err(self.error("unterminated interpolation")),
                            Some('{') => depth += 1,
                            Some('}') => depth -= 1,
                            _ => {}
                        }
                        self.i += 1;
                    }
                    let inner = &self.chars[start..self.i - 1];
                    let mut sub = LineLexer {
                        unit: self.unit,
                        chars: inner,
                        i: 0,
                        line: self.line,
                        column_offset: self.column_offset + start as u32,
                    };
                    let mut lexemes = Vec::new();
                    while sub.i < inner.len() {
                        if inner[sub.i].is_whitespace() {
                            sub.i += 1;
                            continue;
                        }
                        sub.lex_lexeme(&mut lexemes)?;
                    }
                    if lexemes.is_empty() {
                        return Err(self.error("empty interpolation"));
                    }
                    parts.push(Err(lexemes));
                }
                c => {
                    self.i += 1;
                    text.push(c);
                }
            }
        }
        if parts.is_empty() {
            out.push(Lexeme::Token(Token { kind: TokenKind::Str, text, pos }));
            return Ok(());
        }
        if !text.is_empty() {
            parts.push(Ok(text));
        }
        let plus = |pos| {
            Lexeme::Token(Token {
                kind: TokenKind::Symbol,
                text: "+".into(),
                pos,
            })
        };
        out.push(Lexeme::Open('(', pos));
        for (idx, part) in parts.into_iter().enumerate() {
            if idx > 0 {
                out.push(plus(pos));
            }
            match part {
                Ok(text) => out.push(Lexeme::Token(Token { kind: TokenKind::Str, text, pos })),
                Err(lexemes) => {
                    out.push(Lexeme::Open('(', pos));
                    out.extend(lexemes);
                    out.push(Lexeme::Close(')', pos));
                }
            }
        }
        out.push(Lexeme::Close(')', pos));
        Ok(())
    }
}

fn visual_width(chars: &[char], tab_width: usize) -> usize {
    chars.iter().map(|c| if *c == '\t' { tab_width } else { 1 }).sum()
}

/// Text substitutions declared by `define "a" as "b"` lines and removed by
/// `undef "a"`. Each applies to the code of every later line.
#[derive(Debug, Default)]
struct Defines {
    table: IndexMap<String, String>,
}

impl Defines {
    /// Consume a command line. Returns false for ordinary source.
    ///
    /// A command starts in column 1 with the keyword, blanks and a quote.
    fn command(&mut self, unit: &str, number: u32, raw: &str) -> Result<bool, CompileError> {
        let Some(keyword) = ["define", "undef"].into_iter().find(|k| raw.starts_with(*k)) else {
            return Ok(false);
        };
        let rest = raw[keyword.len()..].trim_start_matches([' ', '\t']);
        if rest.len() == raw.len() - keyword.len() || !rest.starts_with(['"', '\'']) {
            return Ok(false);
        }
        let chars: Vec<char> = raw.chars().collect();
        let mut lexer = LineLexer {
            unit,
            chars: &chars,
            i: keyword.chars().count(),
            line: number,
            column_offset: 0,
        };
        let target = lexer.command_operand(keyword, "target")?;
        if target.is_empty() {
            return Err(CompileError::syntax(
                unit,
                Pos::new(number, keyword.len() as u32 + 2),
                format!("{} <target> length cannot be 0", keyword),
            ));
        }
        if keyword == "undef" {
            lexer.expect_command_end(keyword, "target")?;
            if self.table.shift_remove(&target).is_none() {
                return Err(CompileError::syntax(
                    unit,
                    Pos::new(number, 1),
                    format!("\"{}\" is not defined", target),
                ));
            }
            trace!(%target, "undef");
            return Ok(true);
        }
        lexer.skip_blanks();
        if !lexer.starts_with("as") || !matches!(lexer.peek(2), Some(' ' | '\t' | '"' | '\'')) {
            return Err(lexer.error(
                "illegal define command (there should be an `as` between <target> and <replacement>)",
            ));
        }
        lexer.i += 2;
        let replacement = lexer.command_operand(keyword, "replacement")?;
        lexer.expect_command_end(keyword, "replacement")?;
        trace!(%target, %replacement, "define");
        self.table.insert(target, replacement);
        Ok(true)
    }

    /// Apply every definition to the code part of `line`; a `//` comment is
    /// left alone.
    fn apply<'t>(&self, line: &'t str) -> Cow<'t, str> {
        if self.table.is_empty() {
            return Cow::Borrowed(line);
        }
        let (code, comment) = line.find("//").map_or((line, ""), |at| line.split_at(at));
        let mut code = code.to_string();
        for (target, replacement) in &self.table {
            code = code.replace(target.as_str(), replacement);
        }
        code.push_str(comment);
        Cow::Owned(code)
    }
}

impl<'a> LineLexer<'a> {
    fn skip_blanks(&mut self) {
        while matches!(self.peek(0), Some(' ' | '\t')) {
            self.i += 1;
        }
    }

    /// A quoted `define`/`undef` operand; escapes are not allowed.
    fn command_operand(&mut self, command: &str, role: &str) -> Result<String, CompileError> {
        self.skip_blanks();
        let quote = match self.peek(0) {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(self.error(format!(
                    "illegal {} command (expected a quoted <{}>)",
                    command, role
                )))
            }
        };
        let start = self.pos();
        self.i += 1;
        let mut text = String::new();
        loop {
            match self.peek(0) {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    return Err(CompileError::syntax(
                        self.unit,
                        start,
                        format!("{} <{}> cannot contain escape char", command, role),
                    ))
                }
                Some(c) => {
                    self.i += 1;
                    if c == quote {
                        return Ok(text);
                    }
                    text.push(c);
                }
            }
        }
    }

    fn expect_command_end(&mut self, command: &str, role: &str) -> Result<(), CompileError> {
        self.skip_blanks();
        if self.i < self.chars.len() {
            return Err(self.error(format!(
                "illegal {} command (there should not be characters after <{}>)",
                command, role
            )));
        }
        Ok(())
    }
}

fn lex_lines(unit: &str, text: &str, tab_width: usize) -> Result<Vec<Line>, CompileError> {
    let mut lines = Vec::new();
    let mut in_comment = false;
    let mut defines = Defines::default();
    for (idx, raw) in text.split('\n').enumerate() {
        let number = idx as u32 + 1;
        let raw = raw.trim_end_matches('\r');
        if !in_comment && defines.command(unit, number, raw)? {
            continue;
        }
        let chars: Vec<char> = defines.apply(raw).chars().collect();
        let began_in_comment = in_comment;
        let leading = chars.iter().take_while(|c| **c == ' ' || **c == '\t').count();
        let mut lexer = LineLexer {
            unit,
            chars: &chars,
            i: 0,
            line: number,
            column_offset: 0,
        };
        let mut lexemes = Vec::new();
        let mut indent = visual_width(&chars[..leading], tab_width);
        while lexer.i < chars.len() {
            if in_comment {
                if lexer.starts_with("*/") {
                    in_comment = false;
                    lexer.i += 2;
                } else {
                    lexer.i += 1;
                }
                continue;
            }
            let c = chars[lexer.i];
            if c.is_whitespace() {
                lexer.i += 1;
                continue;
            }
            if lexer.starts_with("//") {
                break;
            }
            if lexer.starts_with("/*") {
                in_comment = true;
                lexer.i += 2;
                continue;
            }
            if lexemes.is_empty() && began_in_comment {
                indent = visual_width(&chars[..lexer.i], tab_width);
            }
            lexer.lex_lexeme(&mut lexemes)?;
        }
        if !lexemes.is_empty() {
            lines.push(Line {
                indent,
                number,
                lexemes,
            });
        }
    }
    Ok(lines)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Block,
    Layer { in_group: bool },
    Group(char),
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    node: NodeId,
    kind: FrameKind,
    indent: usize,
}

struct TreeBuilder<'a> {
    unit: &'a str,
    unit_width: usize,
    mode: LayoutMode,
    nodes: Vec<Node>,
    stack: Vec<Frame>,
}

impl<'a> TreeBuilder<'a> {
    fn new(unit: &'a str, unit_width: usize, mode: LayoutMode) -> Self {
        let root = Node::Block {
            kind: BlockKind::Indent,
            pos: Pos::new(1, 1),
            children: Vec::new(),
        };
        TreeBuilder {
            unit,
            unit_width,
            mode,
            nodes: vec![root],
            stack: vec![Frame {
                node: 0,
                kind: FrameKind::Block,
                indent: 0,
            }],
        }
    }

    fn error(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::layout(self.unit, pos, message)
    }

    fn top(&self) -> Frame {
        self.stack[self.stack.len() - 1]
    }

    fn top_children(&self) -> &[NodeId] {
        match &self.nodes[self.top().node] {
            Node::Block { children, .. } | Node::Group { children, .. } => children,
            _ => &[],
        }
    }

    fn append(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        let parent = self.top().node;
        if let Node::Block { children, .. } | Node::Group { children, .. } = &mut self.nodes[parent] {
            children.push(id);
        }
        id
    }

    fn push_weak(&mut self, pos: Pos) {
        let last_is_sep = self
            .top_children()
            .last()
            .map_or(true, |id| matches!(self.nodes[*id], Node::Sep { .. }));
        if !last_is_sep {
            self.append(Node::Sep {
                kind: Separator::Weak,
                symbol: None,
                pos,
            });
        }
    }

    fn open(&mut self, node: Node, kind: FrameKind, indent: usize) {
        let id = self.append(node);
        self.stack.push(Frame { node: id, kind, indent });
    }

    fn in_group(&self) -> bool {
        self.stack.iter().rev().find_map(|f| match f.kind {
            FrameKind::Group(_) => Some(true),
            FrameKind::Block => Some(false),
            FrameKind::Layer { .. } => None,
        }) == Some(true)
    }

    fn close_layers(&mut self, include_group_layers: bool) {
        while let FrameKind::Layer { in_group } = self.top().kind {
            if in_group && !include_group_layers {
                break;
            }
            self.stack.pop();
        }
    }

    fn innermost_block_indent(&self) -> usize {
        self.stack
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Block)
            .map_or(0, |f| f.indent)
    }

    fn start_line(&mut self, line: &Line) -> Result<(), CompileError> {
        let pos = Pos::new(line.number, line.indent as u32 + 1);
        if self.in_group() {
            self.push_weak(pos);
            return Ok(());
        }
        if self.mode == LayoutMode::Brace {
            self.push_weak(pos);
            return Ok(());
        }
        if line.indent % self.unit_width != 0 {
            return Err(self.error(
                pos,
                format!("indentation {} is not a multiple of {}", line.indent, self.unit_width),
            ));
        }
        let current = self.innermost_block_indent();
        if line.indent > current {
            if line.indent != current + self.unit_width {
                return Err(self.error(pos, "indentation deeper than one level"));
            }
            if self.top_children().is_empty() {
                return Err(self.error(pos, "unexpected indentation"));
            }
            self.open(
                Node::Block {
                    kind: BlockKind::Indent,
                    pos,
                    children: Vec::new(),
                },
                FrameKind::Block,
                line.indent,
            );
        } else {
            while self.stack.len() > 1 && self.top().indent > line.indent {
                self.stack.pop();
            }
            if self.top().indent != line.indent {
                return Err(self.error(pos, "dedent does not match any open block"));
            }
            self.push_weak(pos);
        }
        Ok(())
    }

    fn drop_trailing_weak(&mut self) {
        let node = self.top().node;
        let trailing = self.top_children().last().copied();
        if let Some(last) = trailing {
            if matches!(self.nodes[last], Node::Sep { kind: Separator::Weak, .. }) {
                if let Node::Block { children, .. } | Node::Group { children, .. } = &mut self.nodes[node] {
                    children.pop();
                }
            }
        }
    }

    fn close_bracket(&mut self, close: char, pos: Pos) -> Result<(), CompileError> {
        self.close_layers(true);
        let expected = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.top().kind {
            FrameKind::Group(open) if open == expected => {}
            FrameKind::Block if close == '}' && self.mode == LayoutMode::Brace && self.stack.len() > 1 => {}
            _ => return Err(self.error(pos, format!("unmatched `{}`", close))),
        }
        self.drop_trailing_weak();
        self.stack.pop();
        Ok(())
    }

    fn line(&mut self, line: Line, continuation: bool) -> Result<bool, CompileError> {
        if !continuation {
            self.start_line(&line)?;
        }
        let count = line.lexemes.len();
        let mut lexemes = line.lexemes.into_iter().enumerate().peekable();
        let mut last_continues = false;
        // a `{` right after an operator is a value, not a block
        let mut expects_operand = continuation;
        while let Some((idx, lexeme)) = lexemes.next() {
            let is_last = idx + 1 == count;
            last_continues = is_last && lexeme.continues_line();
            let operand_next = match &lexeme {
                Lexeme::Token(t) => t.kind == TokenKind::Symbol && !t.is_symbol("->") && !t.is_symbol("=>"),
                Lexeme::Open(..) | Lexeme::Sep(..) => true,
                Lexeme::Close(..) => false,
            };
            let block_brace = self.mode == LayoutMode::Brace && !expects_operand && !self.in_group();
            expects_operand = operand_next;
            match lexeme {
                Lexeme::Token(token) => {
                    let arrow = token.is_symbol("->") || token.is_symbol("=>");
                    let pos = token.pos;
                    self.append(Node::Token(token));
                    if arrow {
                        let next_is_block_brace = self.mode == LayoutMode::Brace
                            && (idx + 2 == count || !self.in_group())
                            && matches!(lexemes.peek(), Some((_, Lexeme::Open('{', _))));
                        let in_group = self.in_group();
                        if (!is_last || in_group) && !next_is_block_brace {
                            let indent = self.innermost_block_indent();
                            self.open(
                                Node::Block {
                                    kind: BlockKind::Layer,
                                    pos,
                                    children: Vec::new(),
                                },
                                FrameKind::Layer { in_group },
                                indent,
                            );
                        }
                    }
                }
                Lexeme::Open('{', pos) if block_brace => {
                    let indent = self.innermost_block_indent() + 1;
                    self.open(
                        Node::Block {
                            kind: BlockKind::Brace,
                            pos,
                            children: Vec::new(),
                        },
                        FrameKind::Block,
                        indent,
                    );
                }
                Lexeme::Open(open, pos) => {
                    self.open(
                        Node::Group {
                            open,
                            pos,
                            children: Vec::new(),
                        },
                        FrameKind::Group(open),
                        self.innermost_block_indent(),
                    );
                }
                Lexeme::Close(close, pos) => {
                    let closes_block = close == '}'
                        && self.mode == LayoutMode::Brace
                        && !self.in_group();
                    self.close_bracket(close, pos)?;
                    if closes_block && !is_last {
                        self.push_weak(pos);
                    }
                }
                Lexeme::Sep(symbol, pos) => {
                    if self.in_group() {
                        self.close_layers(true);
                    }
                    self.append(Node::Sep {
                        kind: Separator::Strong,
                        symbol: Some(symbol),
                        pos,
                    });
                }
            }
        }
        if !last_continues {
            self.close_layers(false);
        }
        Ok(last_continues)
    }

    fn finish(mut self) -> Result<TokenTree, CompileError> {
        self.close_layers(true);
        if let Some(frame) = self.stack.iter().find(|f| matches!(f.kind, FrameKind::Group(_))) {
            let pos = self.nodes[frame.node].pos();
            return Err(self.error(pos, "unclosed bracket"));
        }
        if self.mode == LayoutMode::Brace && self.stack.len() > 1 {
            let pos = self.nodes[self.top().node].pos();
            return Err(self.error(pos, "unclosed `{` block"));
        }
        Ok(TokenTree {
            nodes: self.nodes,
            root: 0,
        })
    }
}

/// Read an optional `;; :scanner-…` directive on the first line.
fn directive(
    unit: &str,
    text: &str,
    default: LayoutMode,
    errors: &mut ErrorManager,
) -> Result<(LayoutMode, usize), CompileError> {
    let first = text.lines().next().unwrap_or("");
    let trimmed = first.trim();
    let Some(rest) = trimmed.strip_prefix(";;") else {
        return Ok((default, 0));
    };
    let mode = match rest.trim() {
        ":scanner-brace" => LayoutMode::Brace,
        ":scanner-indent" => LayoutMode::Indent,
        other => {
            errors.report(CompileError::layout(
                unit,
                Pos::new(1, 1),
                format!("unknown scanner directive `{}`", other),
            ))?;
            LayoutMode::Indent
        }
    };
    Ok((mode, first.len()))
}

/// Scan one source unit into a token tree.
#[tracing::instrument(skip_all, fields(unit = unit))]
pub fn scan(
    unit: &str,
    text: &str,
    options: &CompileOptions,
    errors: &mut ErrorManager,
) -> Result<TokenTree, CompileError> {
    let (mode, skip) = directive(unit, text, options.layout, errors)?;
    // the directive line stays as an empty line so numbering is unchanged
    let body = &text[skip..];
    let width = options.indentation.max(1);
    let lines = lex_lines(unit, body, width)?;
    let mut builder = TreeBuilder::new(unit, width, mode);
    let mut continuation = false;
    for line in lines {
        continuation = builder.line(line, continuation)?;
    }
    let tree = builder.finish()?;
    debug!(nodes = tree.len(), ?mode, "scanned");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ErrorMode;

    fn render(text: &str) -> String {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        let tree = scan("t.mo", text, &CompileOptions::default(), &mut errors).unwrap();
        tree.render(tree.root())
    }

    fn scan_err(text: &str) -> CompileError {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        scan("t.mo", text, &CompileOptions::default(), &mut errors).unwrap_err()
    }

    #[test]
    fn indentation_opens_blocks() {
        let src = "class A\n    a = 1\n    b = 2\nc()\n";
        assert_eq!(render(src), "{class A {a = 1 | b = 2} | c ()}");
    }

    #[test]
    fn comments_and_blank_lines_are_elided() {
        let src = "a = 1 // one\n\n/* multi\n   line */\nb = 2\n";
        assert_eq!(render(src), "{a = 1 | b = 2}");
    }

    #[test]
    fn trailing_operator_continues_line() {
        let src = "x = 1 +\n        2\ny = 3\n";
        assert_eq!(render(src), "{x = 1 + 2 | y = 3}");
    }

    #[test]
    fn separators_inside_groups() {
        assert_eq!(render("f(a, b; c)\n"), "{f (a , b ; c)}");
        assert_eq!(render("f(a,\n  b)\n"), "{f (a , b)}");
        assert_eq!(render("f(\n    a\n    b\n)\n"), "{f (a | b)}");
    }

    #[test]
    fn arrow_opens_layer_until_end_of_line() {
        assert_eq!(render("if x -> y = 1\nz\n"), "{if x -> <y = 1> | z}");
    }

    #[test]
    fn arrow_inside_group_closes_with_group() {
        assert_eq!(render("f((a) -> a + 1, 2)\n"), "{f ((a) -> <a + 1> , 2)}");
    }

    #[test]
    fn arrow_at_end_of_line_takes_following_block() {
        assert_eq!(render("case 1 =>\n    a\n"), "{case 1 => {a}}");
    }

    #[test]
    fn interpolation_becomes_concatenation() {
        assert_eq!(render("s = \"a${x}b\"\n"), "{s = (\"a\" + (x) + \"b\")}");
    }

    #[test]
    fn brace_mode_matches_indent_shape() {
        let indent = "if x\n    a\nelse\n    b\n";
        let brace = ";; :scanner-brace\nif x {\n    a\n} else {\n    b\n}\n";
        assert_eq!(render(indent), "{if x {a} | else {b}}");
        assert_eq!(render(brace), render(indent));
    }

    #[test]
    fn brace_blocks_may_share_a_line() {
        let indent = "if x > 0\n    a\nelse\n    b\n";
        let brace = ";; :scanner-brace\nif x > 0 { a } else { b }\n";
        assert_eq!(render(brace), render(indent));

        let indent = "class Main\n    static main(args:String[]):Unit\n        f(1)\n";
        let brace = ";; :scanner-brace\nclass Main { static main(args:String[]):Unit { f(1) } }\n";
        assert_eq!(render(brace), render(indent));
    }

    #[test]
    fn brace_after_an_operator_stays_a_value() {
        let brace = ";; :scanner-brace\nm = {}\nrun({ a })\n";
        assert_eq!(render(brace), "{m = {} | run ({a})}");
    }

    #[test]
    fn define_rewrites_later_lines_until_undef() {
        let src = "define 'CREATE TABLE' as 'class'\nCREATE TABLE User // CREATE TABLE\nundef 'CREATE TABLE'\nCREATE TABLE\n";
        assert_eq!(render(src), "{class User | CREATE TABLE}");
        // an ordinary statement that merely starts with the word
        assert_eq!(render("define(x)\n"), "{define (x)}");
    }

    #[test]
    fn malformed_define_commands_are_syntax_errors() {
        let err = scan_err("define 'CREATE TABLE' 'class'\n");
        assert!(err.message().contains("there should be an `as`"), "{}", err.message());
        let err = scan_err("define 'a' as 'b' c\n");
        assert!(err.message().contains("after <replacement>"), "{}", err.message());
        let err = scan_err("define 'a\\n' as 'b'\n");
        assert!(err.message().contains("cannot contain escape char"), "{}", err.message());
        let err = scan_err("define 'CREATE TABLE' as 'class'\nundef 'A'\n");
        assert_eq!(err.message(), "\"A\" is not defined");
        assert!(matches!(err, CompileError::Syntax { pos, .. } if pos.line == 2 && pos.column == 1));
    }

    #[test]
    fn bad_dedent_is_a_layout_error() {
        let err = scan_err("a\n        b\n");
        assert!(matches!(err, CompileError::Layout { .. }), "{:?}", err);
        let err = scan_err("class A\n    a\n  b\n");
        assert!(matches!(err, CompileError::Layout { pos, .. } if pos.line == 3));
    }

    #[test]
    fn unknown_directive_falls_back_in_collect_mode() {
        let mut errors = ErrorManager::new(ErrorMode::Collect);
        let tree = scan("t.mo", ";; :scanner-zzz\na\n", &CompileOptions::default(), &mut errors).unwrap();
        assert_eq!(tree.render(tree.root()), "{a}");
        assert_eq!(errors.errors().len(), 1);
    }
}
