//! Recursive-descent parser over the scanner's token tree.
//!
//! The tree already encodes block structure, so the parser never looks at
//! indentation: a statement is the run of nodes between two separators in a
//! block, and clause keywords (`elseif`, `else`, `catch`, `finally`, the `while`
//! of a do-loop) are recognised right after a weak separator.

use tracing::trace;

use super::ast::*;
use super::scanner::{Node, NodeId, Separator, Token, TokenKind, TokenTree};
use super::{CompileError, ErrorManager, Pos};

type PResult<T> = Result<T, CompileError>;

/// Parse one scanned unit.
#[tracing::instrument(skip_all, fields(unit = unit))]
pub fn parse(unit: &str, tree: &TokenTree, errors: &mut ErrorManager) -> PResult<Unit> {
    let mut parser = Parser {
        unit,
        tree,
        errors,
        no_lambda: false,
    };
    parser.parse_unit()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ctx {
    Unit,
    Class,
    Interface,
    Annotation,
    Body,
}

impl Ctx {
    fn for_class(kind: ClassKind) -> Ctx {
        match kind {
            ClassKind::Interface => Ctx::Interface,
            ClassKind::Annotation => Ctx::Annotation,
            ClassKind::Fun => Ctx::Body,
            ClassKind::Class | ClassKind::Object => Ctx::Class,
        }
    }

    fn is_type_body(self) -> bool {
        matches!(self, Ctx::Class | Ctx::Interface | Ctx::Annotation)
    }
}

#[derive(Clone)]
struct Cursor<'a> {
    tree: &'a TokenTree,
    items: &'a [NodeId],
    i: usize,
    end: Pos,
}

impl<'a> Cursor<'a> {
    fn new(tree: &'a TokenTree, id: NodeId) -> Self {
        Cursor {
            tree,
            items: tree.children(id),
            i: 0,
            end: tree.node(id).pos(),
        }
    }

    fn of(tree: &'a TokenTree, items: &'a [NodeId], end: Pos) -> Self {
        Cursor { tree, items, i: 0, end }
    }

    fn at_end(&self) -> bool {
        self.i >= self.items.len()
    }

    fn peek_at(&self, ahead: usize) -> Option<&'a Node> {
        self.items.get(self.i + ahead).map(|id| self.tree.node(*id))
    }

    fn peek(&self) -> Option<&'a Node> {
        self.peek_at(0)
    }

    fn id(&self) -> Option<NodeId> {
        self.items.get(self.i).copied()
    }

    fn token_at(&self, ahead: usize) -> Option<&'a Token> {
        match self.peek_at(ahead) {
            Some(Node::Token(t)) => Some(t),
            _ => None,
        }
    }

    fn token(&self) -> Option<&'a Token> {
        self.token_at(0)
    }

    fn bump(&mut self) {
        self.i += 1;
    }

    fn pos(&self) -> Pos {
        self.peek().map_or(self.end, |n| n.pos())
    }

    fn at_symbol(&self, s: &str) -> bool {
        self.token().map_or(false, |t| t.is_symbol(s))
    }

    fn at_keyword(&self, s: &str) -> bool {
        self.token().map_or(false, |t| t.is_keyword(s))
    }

    fn ident_at(&self, ahead: usize) -> Option<&'a str> {
        self.token_at(ahead)
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text.as_str())
    }

    fn eat_symbol(&mut self, s: &str) -> bool {
        let hit = self.at_symbol(s);
        if hit {
            self.bump();
        }
        hit
    }

    fn eat_keyword(&mut self, s: &str) -> bool {
        let hit = self.at_keyword(s);
        if hit {
            self.bump();
        }
        hit
    }

    fn at_sep(&self) -> bool {
        matches!(self.peek(), Some(Node::Sep { .. }))
    }

    fn at_stmt_end(&self) -> bool {
        self.at_end() || self.at_sep()
    }

    fn skip_seps(&mut self) {
        while self.at_sep() {
            self.bump();
        }
    }

    fn skip_to_sep(&mut self) {
        while !self.at_stmt_end() {
            self.bump();
        }
    }

    fn block_at(&self, ahead: usize) -> Option<NodeId> {
        match self.peek_at(ahead) {
            Some(Node::Block { .. }) => self.items.get(self.i + ahead).copied(),
            _ => None,
        }
    }

    fn group_at(&self, ahead: usize, open: char) -> Option<NodeId> {
        match self.peek_at(ahead) {
            Some(Node::Group { open: o, .. }) if *o == open => self.items.get(self.i + ahead).copied(),
            _ => None,
        }
    }

    fn at_stmt_end_after(&self, ahead: usize) -> bool {
        matches!(self.peek_at(ahead), None | Some(Node::Sep { .. }))
    }

    fn at_weak_sep(&self) -> bool {
        matches!(self.peek(), Some(Node::Sep { kind: Separator::Weak, .. })) && self.peek_at(1).is_some()
    }

    /// A weak separator followed by the clause keyword `kw`.
    fn at_clause(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Node::Sep { kind: Separator::Weak, .. }))
            && self.token_at(1).map_or(false, |t| t.is_keyword(kw))
    }
}

fn describe(node: Option<&Node>) -> String {
    match node {
        None => "end of input".into(),
        Some(Node::Token(t)) => format!("`{}`", t.text),
        Some(Node::Block { .. }) => "block".into(),
        Some(Node::Group { open, .. }) => format!("`{}`", open),
        Some(Node::Sep { .. }) => "end of statement".into(),
    }
}

fn assign_op(symbol: &str) -> Option<Option<BinOp>> {
    Some(match symbol {
        "=" => None,
        "+=" => Some(BinOp::Add),
        "-=" => Some(BinOp::Sub),
        "*=" => Some(BinOp::Mul),
        "/=" => Some(BinOp::Div),
        "%=" => Some(BinOp::Rem),
        "&=" => Some(BinOp::BitAnd),
        "|=" => Some(BinOp::BitOr),
        "^=" => Some(BinOp::Xor),
        "<<=" => Some(BinOp::Shl),
        ">>=" => Some(BinOp::Shr),
        ">>>=" => Some(BinOp::Ushr),
        _ => return None,
    })
}

/// Highest binary precedence level; unary operators bind tighter.
const POWER_LEVEL: usize = 11;

enum Infix {
    Op(BinOp),
    Custom(String),
}

fn infix_at(token: &Token, level: usize) -> Option<Infix> {
    let text = token.text.as_str();
    let op = match (token.kind, level) {
        (TokenKind::Ident, 0) => return Some(Infix::Custom(token.text.clone())),
        (TokenKind::Symbol, 0) if text == ".." => BinOp::Range,
        (TokenKind::Symbol, 0) if text == ".:" => BinOp::RangeExclusive,
        (TokenKind::Symbol, 1) if text == "||" => BinOp::Or,
        (TokenKind::Keyword, 1) if text == "or" => BinOp::Or,
        (TokenKind::Symbol, 2) if text == "&&" => BinOp::And,
        (TokenKind::Keyword, 2) if text == "and" => BinOp::And,
        (TokenKind::Symbol, 3) if text == "|" => BinOp::BitOr,
        (TokenKind::Symbol, 4) if text == "^" => BinOp::Xor,
        (TokenKind::Symbol, 5) if text == "&" => BinOp::BitAnd,
        (TokenKind::Symbol, 6) => match text {
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "===" => BinOp::RefEq,
            "!==" => BinOp::RefNe,
            _ => return None,
        },
        (TokenKind::Keyword, 6) => match text {
            "is" => BinOp::RefEq,
            "not" => BinOp::RefNe,
            _ => return None,
        },
        (TokenKind::Symbol, 7) => match text {
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            _ => return None,
        },
        (TokenKind::Keyword, 7) if text == "in" => BinOp::In,
        (TokenKind::Symbol, 8) => match text {
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            ">>>" => BinOp::Ushr,
            _ => return None,
        },
        (TokenKind::Symbol, 9) => match text {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            _ => return None,
        },
        (TokenKind::Symbol, 10) => match text {
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Rem,
            _ => return None,
        },
        (TokenKind::Symbol, POWER_LEVEL) if text == "^^" => BinOp::Pow,
        _ => return None,
    };
    Some(Infix::Op(op))
}

fn parse_double(sign: &str, body: &str) -> Option<ExprKind> {
    format!("{}{}", sign, body)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(ExprKind::Double)
}

/// Parse a number token, folding a leading minus so that the most negative
/// values are representable.
fn number_literal(text: &str, negative: bool) -> Result<ExprKind, String> {
    let lower = text.to_ascii_lowercase();
    let hex = lower.starts_with("0x");
    let (body, suffix) = match lower.chars().last() {
        Some('l') => (&lower[..lower.len() - 1], Some('l')),
        Some(c @ ('f' | 'd')) if !hex => (&lower[..lower.len() - 1], Some(c)),
        _ => (lower.as_str(), None),
    };
    let sign = if negative { "-" } else { "" };
    let out_of_range = || format!("number literal `{}{}` is out of range", sign, text);
    let float_like = !hex && (body.contains('.') || body.contains('e'));
    match suffix {
        Some('f') => format!("{}{}", sign, body)
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(ExprKind::Float)
            .ok_or_else(out_of_range),
        Some('d') => parse_double(sign, body).ok_or_else(out_of_range),
        _ if float_like => parse_double(sign, body).ok_or_else(out_of_range),
        Some(_) => {
            let magnitude = if hex {
                u64::from_str_radix(&body[2..], 16).map(|v| v as i128)
            } else {
                body.parse::<u64>().map(|v| v as i128)
            }
            .map_err(|_| out_of_range())?;
            let value = if negative { -magnitude } else { magnitude };
            if hex && !negative && value <= u64::MAX as i128 {
                return Ok(ExprKind::Long(value as u64 as i64));
            }
            i64::try_from(value).map(ExprKind::Long).map_err(|_| out_of_range())
        }
        None => {
            let magnitude = if hex {
                u64::from_str_radix(&body[2..], 16).map_err(|_| out_of_range())? as i128
            } else {
                body.parse::<u64>().map_err(|_| out_of_range())? as i128
            };
            if hex && !negative && magnitude <= u32::MAX as i128 {
                return Ok(ExprKind::Int(magnitude as u32 as i32));
            }
            let value = if negative { -magnitude } else { magnitude };
            i32::try_from(value).map(ExprKind::Int).map_err(|_| out_of_range())
        }
    }
}

struct Parser<'a, 'e> {
    unit: &'a str,
    tree: &'a TokenTree,
    errors: &'e mut ErrorManager,
    /// Set while parsing a statement header so `x -> body` is not a lambda.
    no_lambda: bool,
}

impl<'a, 'e> Parser<'a, 'e> {
    fn err(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.unit, pos, message)
    }

    fn unexpected(&self, c: &Cursor<'a>, expected: &str) -> CompileError {
        self.err(c.pos(), format!("expected {}, found {}", expected, describe(c.peek())))
    }

    fn expect_ident(&self, c: &mut Cursor<'a>, what: &str) -> PResult<(String, Pos)> {
        match c.token() {
            Some(t) if t.kind == TokenKind::Ident => {
                c.bump();
                Ok((t.text.clone(), t.pos))
            }
            _ => Err(self.unexpected(c, what)),
        }
    }

    fn expect_symbol(&self, c: &mut Cursor<'a>, symbol: &str) -> PResult<()> {
        if c.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(c, &format!("`{}`", symbol)))
        }
    }

    /// Split a group's children at every separator.
    fn elements(&self, group: NodeId) -> Vec<&'a [NodeId]> {
        let children = self.tree.children(group);
        let mut out = Vec::new();
        let mut start = 0;
        for (i, id) in children.iter().enumerate() {
            if matches!(self.tree.node(*id), Node::Sep { .. }) {
                if i > start {
                    out.push(&children[start..i]);
                }
                start = i + 1;
            }
        }
        if start < children.len() {
            out.push(&children[start..]);
        }
        out
    }

    fn finish_element(&self, c: &Cursor<'a>) -> PResult<()> {
        if c.at_end() {
            Ok(())
        } else {
            Err(self.err(c.pos(), format!("unexpected {}", describe(c.peek()))))
        }
    }

    fn parse_unit(&mut self) -> PResult<Unit> {
        let mut c = Cursor::new(self.tree, self.tree.root());
        let mut unit = Unit {
            name: self.unit.to_string(),
            package: Vec::new(),
            imports: Vec::new(),
            items: Vec::new(),
        };
        loop {
            c.skip_seps();
            if c.at_end() {
                break;
            }
            let result = if c.at_keyword("package") {
                self.parse_package(&mut c).map(|p| unit.package = p)
            } else if c.at_keyword("import") {
                self.parse_import(&mut c).map(|i| unit.imports.push(i))
            } else {
                self.parse_stmt(&mut c, Ctx::Unit).and_then(|stmt| match stmt {
                    Stmt::Class(_) => {
                        unit.items.push(stmt);
                        Ok(())
                    }
                    other => Err(self.err(other.pos(), "expected a type definition at top level")),
                })
            };
            let result = result.and_then(|_| self.expect_stmt_end(&c));
            if let Err(err) = result {
                self.errors.report(err)?;
                c.skip_to_sep();
            }
        }
        trace!(items = unit.items.len(), imports = unit.imports.len(), "parsed unit");
        Ok(unit)
    }

    fn expect_stmt_end(&self, c: &Cursor<'a>) -> PResult<()> {
        if c.at_stmt_end() {
            Ok(())
        } else {
            Err(self.err(c.pos(), format!("unexpected {}", describe(c.peek()))))
        }
    }

    fn parse_path(&self, c: &mut Cursor<'a>) -> PResult<Vec<String>> {
        let (first, _) = self.expect_ident(c, "a name")?;
        let mut path = vec![first];
        while c.eat_symbol("::") {
            path.push(self.expect_ident(c, "a name")?.0);
        }
        Ok(path)
    }

    fn parse_package(&self, c: &mut Cursor<'a>) -> PResult<Vec<String>> {
        c.bump();
        self.parse_path(c)
    }

    fn parse_import(&self, c: &mut Cursor<'a>) -> PResult<Import> {
        let pos = c.pos();
        c.bump();
        let implicit = c.token().map_or(false, |t| t.is(TokenKind::Modifier, "implicit"));
        if implicit {
            c.bump();
        }
        let mut path = self.parse_path(c)?;
        let mut kind = if implicit { ImportKind::Implicit } else { ImportKind::Type };
        if !implicit && c.at_symbol(".") && c.ident_at(1) == Some("_") {
            c.bump();
            c.bump();
            kind = ImportKind::Static;
        } else if path.last().map(|s| s.as_str()) == Some("_") {
            path.pop();
            kind = ImportKind::Package;
        }
        Ok(Import { path, kind, pos })
    }

    /// Statements of a block node.
    fn parse_block(&mut self, block: NodeId, ctx: Ctx) -> PResult<Vec<Stmt>> {
        let mut c = Cursor::new(self.tree, block);
        self.parse_stmts(&mut c, ctx)
    }

    fn parse_stmts(&mut self, c: &mut Cursor<'a>, ctx: Ctx) -> PResult<Vec<Stmt>> {
        let saved = std::mem::replace(&mut self.no_lambda, false);
        let mut out = Vec::new();
        loop {
            c.skip_seps();
            if c.at_end() {
                break;
            }
            let result = self
                .parse_stmt(c, ctx)
                .and_then(|stmt| self.expect_stmt_end(c).map(|_| stmt));
            match result {
                Ok(stmt) => out.push(stmt),
                Err(err) => {
                    self.errors.report(err)?;
                    c.skip_to_sep();
                }
            }
        }
        self.no_lambda = saved;
        Ok(out)
    }

    /// Body after a statement header: a block, or `->`/`=>` then a block.
    fn parse_body(&mut self, c: &mut Cursor<'a>, ctx: Ctx) -> PResult<Vec<Stmt>> {
        if let Some(block) = c.block_at(0) {
            c.bump();
            return self.parse_block(block, ctx);
        }
        if (c.at_symbol("->") || c.at_symbol("=>")) && c.block_at(1).is_some() {
            c.bump();
            let block = c.block_at(0).ok_or_else(|| self.unexpected(c, "a block"))?;
            c.bump();
            return self.parse_block(block, ctx);
        }
        Err(self.unexpected(c, "a block"))
    }

    fn parse_annotations(&mut self, c: &mut Cursor<'a>) -> PResult<Vec<Annotation>> {
        let mut out = Vec::new();
        while c.at_symbol("@") {
            out.push(self.parse_annotation(c)?);
            if c.at_weak_sep() {
                c.bump();
            }
        }
        Ok(out)
    }

    fn parse_annotation(&mut self, c: &mut Cursor<'a>) -> PResult<Annotation> {
        let pos = c.pos();
        self.expect_symbol(c, "@")?;
        let ty = self.parse_type(c)?;
        let mut args = Vec::new();
        if let Some(group) = c.group_at(0, '(') {
            c.bump();
            for element in self.elements(group) {
                let mut ec = Cursor::of(self.tree, element, pos);
                let key = match (ec.ident_at(0), ec.token_at(1)) {
                    (Some(name), Some(t)) if t.is_symbol("=") => {
                        let name = name.to_string();
                        ec.bump();
                        ec.bump();
                        name
                    }
                    _ => "value".to_string(),
                };
                let value = self.parse_expr(&mut ec)?;
                self.finish_element(&ec)?;
                args.push((key, value));
            }
        }
        Ok(Annotation { ty, args, pos })
    }

    fn parse_modifiers(&self, c: &mut Cursor<'a>) -> Vec<Modifier> {
        let mut out = Vec::new();
        loop {
            let Some(token) = c.token() else { break };
            let modifier = match token.kind {
                TokenKind::Modifier => Modifier::from_word(&token.text),
                TokenKind::Keyword if token.text == "static" && c.block_at(1).is_none() => Some(Modifier::Static),
                _ => None,
            };
            match modifier {
                Some(m) => {
                    out.push(m);
                    c.bump();
                }
                None => break,
            }
        }
        out
    }

    fn parse_type(&self, c: &mut Cursor<'a>) -> PResult<TypeRef> {
        let pos = c.pos();
        let path = self.parse_path(c)?;
        let mut dims = 0;
        while let Some(group) = c.group_at(0, '[') {
            if !self.tree.children(group).is_empty() {
                break;
            }
            c.bump();
            dims += 1;
        }
        Ok(TypeRef { path, dims, pos })
    }

    fn parse_stmt(&mut self, c: &mut Cursor<'a>, ctx: Ctx) -> PResult<Stmt> {
        let pos = c.pos();
        let annotations = self.parse_annotations(c)?;
        let modifiers = self.parse_modifiers(c);
        let decorated = !annotations.is_empty() || !modifiers.is_empty();

        if let Some(token) = c.token() {
            if token.kind == TokenKind::Keyword {
                let kind = match token.text.as_str() {
                    "class" => Some(ClassKind::Class),
                    "interface" => Some(ClassKind::Interface),
                    "object" => Some(ClassKind::Object),
                    "fun" => Some(ClassKind::Fun),
                    "annotation" => Some(ClassKind::Annotation),
                    _ => None,
                };
                if let Some(kind) = kind {
                    c.bump();
                    return self.parse_class(c, kind, modifiers, annotations, pos).map(Stmt::Class);
                }
                if token.text == "def" {
                    c.bump();
                    return self.parse_method(c, modifiers, annotations, pos).map(Stmt::Method);
                }
            }
        }

        if c.ident_at(0).is_some() {
            let typed_var = c.token_at(1).map_or(false, |t| t.is_symbol(":"));
            let field_assign = c.token_at(1).map_or(false, |t| t.is_symbol("="))
                && (ctx.is_type_body() || decorated);
            let bare_decl = decorated && c.at_stmt_end_after(1);
            if typed_var || field_assign || bare_decl {
                return self.parse_var(c, modifiers, annotations, pos).map(Stmt::Var);
            }
            if c.group_at(1, '(').is_some() && self.looks_like_method(c, ctx, &modifiers) {
                return self.parse_method(c, modifiers, annotations, pos).map(Stmt::Method);
            }
        }

        if decorated {
            return Err(self.unexpected(c, "a definition after modifiers"));
        }
        self.parse_plain_stmt(c, ctx)
    }

    /// `name(...)` followed by a body, `=`, or a return type; in interfaces a
    /// bare signature is an abstract method.
    fn looks_like_method(&self, c: &Cursor<'a>, ctx: Ctx, modifiers: &[Modifier]) -> bool {
        match c.peek_at(2) {
            Some(Node::Block { .. }) => true,
            Some(Node::Token(t)) if t.is_symbol("=") || t.is_symbol(":") => true,
            None | Some(Node::Sep { .. }) => ctx == Ctx::Interface || modifiers.contains(&Modifier::Abstract),
            _ => false,
        }
    }

    fn parse_plain_stmt(&mut self, c: &mut Cursor<'a>, ctx: Ctx) -> PResult<Stmt> {
        let pos = c.pos();
        if c.eat_symbol("...") {
            return Ok(Stmt::Pass(pos));
        }
        if c.at_keyword("static") {
            c.bump();
            let block = c.block_at(0).ok_or_else(|| self.unexpected(c, "a block"))?;
            c.bump();
            let inner = if ctx.is_type_body() { ctx } else { Ctx::Body };
            return Ok(Stmt::Static(self.parse_block(block, inner)?, pos));
        }
        let keyword = c.token().filter(|t| t.kind == TokenKind::Keyword).map(|t| t.text.as_str());
        match keyword {
            Some("if") => {
                c.bump();
                self.parse_if(c, pos)
            }
            Some("while") => {
                c.bump();
                let cond = self.parse_cond(c)?;
                let body = self.parse_body(c, Ctx::Body)?;
                Ok(Stmt::While { cond, body, do_while: false, pos })
            }
            Some("do") => {
                c.bump();
                let body = self.parse_body(c, Ctx::Body)?;
                if !c.at_clause("while") {
                    return Err(self.unexpected(c, "`while` after a do block"));
                }
                c.bump();
                c.bump();
                let cond = self.parse_cond(c)?;
                Ok(Stmt::While { cond, body, do_while: true, pos })
            }
            Some("for") => {
                c.bump();
                let (var, _) = self.expect_ident(c, "a loop variable")?;
                if !c.eat_keyword("in") {
                    return Err(self.unexpected(c, "`in`"));
                }
                let iter = self.parse_cond(c)?;
                let body = self.parse_body(c, Ctx::Body)?;
                Ok(Stmt::For { var, iter, body, pos })
            }
            Some("break") => {
                c.bump();
                Ok(Stmt::Break(pos))
            }
            Some("continue") => {
                c.bump();
                Ok(Stmt::Continue(pos))
            }
            Some("return") => {
                c.bump();
                let value = if c.at_stmt_end() { None } else { Some(self.parse_expr(c)?) };
                Ok(Stmt::Return(value, pos))
            }
            Some("throw") => {
                c.bump();
                Ok(Stmt::Throw(self.parse_expr(c)?, pos))
            }
            Some("try") => {
                c.bump();
                self.parse_try(c, pos)
            }
            Some("synchronized") => {
                c.bump();
                let group = c.group_at(0, '(').ok_or_else(|| self.unexpected(c, "`(`"))?;
                c.bump();
                let mut locks = Vec::new();
                for element in self.elements(group) {
                    locks.push(self.parse_element(element, pos)?);
                }
                if locks.is_empty() {
                    return Err(self.err(pos, "synchronized needs at least one lock"));
                }
                let body = self.parse_body(c, Ctx::Body)?;
                Ok(Stmt::Synchronized { locks, body, pos })
            }
            _ => {
                let expr = self.parse_expr(c)?;
                Ok(match expr.kind {
                    ExprKind::Destructure { pattern, value } => Stmt::Destructure {
                        pattern: *pattern,
                        value: *value,
                        pos,
                    },
                    kind => Stmt::Expr(Expr::new(kind, expr.pos)),
                })
            }
        }
    }

    fn parse_cond(&mut self, c: &mut Cursor<'a>) -> PResult<Expr> {
        let saved = std::mem::replace(&mut self.no_lambda, true);
        let result = self.parse_expr(c);
        self.no_lambda = saved;
        result
    }

    fn parse_if(&mut self, c: &mut Cursor<'a>, pos: Pos) -> PResult<Stmt> {
        let mut branches = Vec::new();
        let cond = self.parse_cond(c)?;
        branches.push((cond, self.parse_body(c, Ctx::Body)?));
        let mut otherwise = None;
        loop {
            if c.at_clause("elseif") {
                c.bump();
                c.bump();
            } else if c.at_clause("else") {
                c.bump();
                c.bump();
                if !c.eat_keyword("if") {
                    otherwise = Some(self.parse_body(c, Ctx::Body)?);
                    break;
                }
            } else {
                break;
            }
            let cond = self.parse_cond(c)?;
            branches.push((cond, self.parse_body(c, Ctx::Body)?));
        }
        Ok(Stmt::If { branches, otherwise, pos })
    }

    fn parse_try(&mut self, c: &mut Cursor<'a>, pos: Pos) -> PResult<Stmt> {
        let body = self.parse_body(c, Ctx::Body)?;
        let mut catches = Vec::new();
        while c.at_clause("catch") {
            c.bump();
            let catch_pos = c.pos();
            c.bump();
            let (name, _) = self.expect_ident(c, "an exception variable")?;
            let ty = if c.eat_symbol(":") { Some(self.parse_type(c)?) } else { None };
            let body = self.parse_body(c, Ctx::Body)?;
            catches.push(Catch { name, ty, body, pos: catch_pos });
        }
        let mut finally = None;
        if c.at_clause("finally") {
            c.bump();
            c.bump();
            finally = Some(self.parse_body(c, Ctx::Body)?);
        }
        if catches.is_empty() && finally.is_none() {
            return Err(self.err(pos, "try without catch or finally"));
        }
        Ok(Stmt::Try { body, catches, finally, pos })
    }

    fn parse_var(
        &mut self,
        c: &mut Cursor<'a>,
        modifiers: Vec<Modifier>,
        annotations: Vec<Annotation>,
        pos: Pos,
    ) -> PResult<VarDef> {
        let (name, _) = self.expect_ident(c, "a variable name")?;
        let ty = if c.eat_symbol(":") { Some(self.parse_type(c)?) } else { None };
        let init = if c.eat_symbol("=") { Some(self.parse_expr(c)?) } else { None };
        Ok(VarDef {
            name,
            ty,
            init,
            modifiers,
            annotations,
            pos,
        })
    }

    fn parse_params(&mut self, group: NodeId) -> PResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        let end = self.tree.node(group).pos();
        for element in self.elements(group) {
            let mut ec = Cursor::of(self.tree, element, end);
            let annotations = self.parse_annotations(&mut ec)?;
            let modifiers = self.parse_modifiers(&mut ec);
            let (name, pos) = self.expect_ident(&mut ec, "a parameter name")?;
            let ty = if ec.eat_symbol(":") { Some(self.parse_type(&mut ec)?) } else { None };
            let default = if ec.eat_symbol("=") { Some(self.parse_expr(&mut ec)?) } else { None };
            self.finish_element(&ec)?;
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.err(pos, format!("parameter `{}` without default follows a defaulted parameter", name)));
            }
            params.push(Param {
                name,
                ty,
                default,
                modifiers,
                annotations,
                pos,
            });
        }
        Ok(params)
    }

    fn parse_method(
        &mut self,
        c: &mut Cursor<'a>,
        modifiers: Vec<Modifier>,
        annotations: Vec<Annotation>,
        pos: Pos,
    ) -> PResult<MethodDef> {
        let (name, _) = self.expect_ident(c, "a method name")?;
        let params = match c.group_at(0, '(') {
            Some(group) => {
                c.bump();
                self.parse_params(group)?
            }
            None => Vec::new(),
        };
        let ret = if c.eat_symbol(":") { Some(self.parse_type(c)?) } else { None };
        let body = if c.eat_symbol("=") {
            let expr_pos = c.pos();
            let value = self.parse_expr(c)?;
            let void = ret
                .as_ref()
                .map_or(false, |t| t.dims == 0 && t.path.len() == 1 && (t.path[0] == "Unit" || t.path[0] == "void"));
            Some(vec![if void {
                Stmt::Expr(value)
            } else {
                Stmt::Return(Some(value), expr_pos)
            }])
        } else if c.at_stmt_end() {
            None
        } else {
            Some(self.parse_body(c, Ctx::Body)?)
        };
        Ok(MethodDef {
            name,
            modifiers,
            annotations,
            params,
            ret,
            body,
            pos,
        })
    }

    fn parse_class(
        &mut self,
        c: &mut Cursor<'a>,
        kind: ClassKind,
        modifiers: Vec<Modifier>,
        annotations: Vec<Annotation>,
        pos: Pos,
    ) -> PResult<ClassDef> {
        let (name, _) = self.expect_ident(c, "a type name")?;
        let params = match c.group_at(0, '(') {
            Some(group) if matches!(kind, ClassKind::Class | ClassKind::Fun) => {
                c.bump();
                self.parse_params(group)?
            }
            _ => Vec::new(),
        };
        let mut supers = Vec::new();
        let mut parent_args = Vec::new();
        if c.eat_symbol(":") {
            loop {
                supers.push(self.parse_type(c)?);
                if let Some(group) = c.group_at(0, '(') {
                    if supers.len() > 1 || kind == ClassKind::Interface {
                        return Err(self.err(c.pos(), "only the parent class takes constructor arguments"));
                    }
                    c.bump();
                    for element in self.elements(group) {
                        parent_args.push(self.parse_element(element, pos)?);
                    }
                }
                let comma = matches!(c.peek(), Some(Node::Sep { kind: Separator::Strong, symbol: Some(','), .. }));
                if !comma {
                    break;
                }
                c.bump();
            }
        }
        let (parent, interfaces) = match kind {
            ClassKind::Interface | ClassKind::Annotation => (None, supers),
            _ => {
                let mut supers = supers.into_iter();
                (supers.next(), supers.collect())
            }
        };
        let body = match c.block_at(0) {
            Some(block) => {
                c.bump();
                self.parse_block(block, Ctx::for_class(kind))?
            }
            None => Vec::new(),
        };
        Ok(ClassDef {
            name,
            kind,
            modifiers,
            annotations,
            params,
            parent,
            parent_args,
            interfaces,
            body,
            pos,
        })
    }

    fn parse_element(&mut self, element: &'a [NodeId], end: Pos) -> PResult<Expr> {
        let mut ec = Cursor::of(self.tree, element, end);
        let saved = std::mem::replace(&mut self.no_lambda, false);
        let result = self.parse_expr(&mut ec);
        self.no_lambda = saved;
        let expr = result?;
        self.finish_element(&ec)?;
        Ok(expr)
    }

    fn parse_args(&mut self, group: NodeId) -> PResult<Vec<Expr>> {
        let end = self.tree.node(group).pos();
        let mut args = Vec::new();
        for element in self.elements(group) {
            args.push(self.parse_element(element, end)?);
        }
        Ok(args)
    }

    fn parse_expr(&mut self, c: &mut Cursor<'a>) -> PResult<Expr> {
        let mut expr = self.parse_binary(c, 0)?;
        if c.at_keyword("match") {
            expr = self.parse_match(c, expr)?;
        }
        if c.at_symbol("<-") {
            let pos = expr.pos;
            c.bump();
            let pattern = self.expr_to_pattern(expr)?;
            let value = self.parse_expr(c)?;
            return Ok(Expr::new(
                ExprKind::Destructure {
                    pattern: Box::new(pattern),
                    value: Box::new(value),
                },
                pos,
            ));
        }
        if let Some(op) = c.token().filter(|t| t.kind == TokenKind::Symbol).and_then(|t| assign_op(&t.text)) {
            if !matches!(
                expr.kind,
                ExprKind::Name(_) | ExprKind::Access { .. } | ExprKind::Index { .. }
            ) {
                return Err(self.err(c.pos(), "invalid assignment target"));
            }
            c.bump();
            let value = self.parse_expr(c)?;
            let pos = expr.pos;
            return Ok(Expr::new(
                ExprKind::Assign {
                    target: Box::new(expr),
                    op,
                    value: Box::new(value),
                },
                pos,
            ));
        }
        Ok(expr)
    }

    fn parse_binary(&mut self, c: &mut Cursor<'a>, level: usize) -> PResult<Expr> {
        if level > POWER_LEVEL {
            return self.parse_unary(c);
        }
        let mut lhs = self.parse_binary(c, level + 1)?;
        loop {
            let Some(token) = c.token() else { break };
            let Some(infix) = infix_at(token, level) else { break };
            let pos = token.pos;
            c.bump();
            lhs = match infix {
                Infix::Op(BinOp::RefEq) if c.at_keyword("type") && token.is_keyword("is") => {
                    c.bump();
                    let ty = self.parse_type(c)?;
                    Expr::new(ExprKind::Is { expr: Box::new(lhs), ty }, pos)
                }
                Infix::Op(op) => {
                    let next = if level == POWER_LEVEL { level } else { level + 1 };
                    let rhs = self.parse_binary(c, next)?;
                    Expr::new(
                        ExprKind::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        pos,
                    )
                }
                Infix::Custom(op) => {
                    let rhs = self.parse_binary(c, level + 1)?;
                    Expr::new(
                        ExprKind::Custom {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        pos,
                    )
                }
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, c: &mut Cursor<'a>) -> PResult<Expr> {
        let pos = c.pos();
        let Some(token) = c.token() else {
            return self.parse_postfix(c);
        };
        let op = match (token.kind, token.text.as_str()) {
            (TokenKind::Symbol, "-") => {
                if let Some(number) = c.token_at(1).filter(|t| t.kind == TokenKind::Number) {
                    c.bump();
                    c.bump();
                    let kind = number_literal(&number.text, true).map_err(|m| self.err(pos, m))?;
                    return self.parse_suffixes(c, Expr::new(kind, pos));
                }
                UnaryOp::Neg
            }
            (TokenKind::Symbol, "+") => UnaryOp::Plus,
            (TokenKind::Symbol, "!") | (TokenKind::Keyword, "not") => UnaryOp::Not,
            (TokenKind::Symbol, "~") => UnaryOp::BitNot,
            (TokenKind::Symbol, "++") | (TokenKind::Symbol, "--") => {
                let delta = if token.text == "++" { 1 } else { -1 };
                c.bump();
                let target = self.parse_unary(c)?;
                return Ok(Expr::new(
                    ExprKind::IncDec {
                        target: Box::new(target),
                        delta,
                        prefix: true,
                    },
                    pos,
                ));
            }
            _ => return self.parse_postfix(c),
        };
        c.bump();
        let expr = self.parse_unary(c)?;
        Ok(Expr::new(ExprKind::Unary { op, expr: Box::new(expr) }, pos))
    }

    fn parse_postfix(&mut self, c: &mut Cursor<'a>) -> PResult<Expr> {
        let primary = self.parse_primary(c)?;
        self.parse_suffixes(c, primary)
    }

    fn parse_suffixes(&mut self, c: &mut Cursor<'a>, mut expr: Expr) -> PResult<Expr> {
        loop {
            let pos = c.pos();
            if c.at_symbol(".") {
                let name = match c.token_at(1) {
                    Some(t) if matches!(t.kind, TokenKind::Ident | TokenKind::Keyword | TokenKind::Modifier) => {
                        t.text.clone()
                    }
                    _ => {
                        c.bump();
                        return Err(self.unexpected(c, "a member name"));
                    }
                };
                c.bump();
                c.bump();
                expr = match c.group_at(0, '(') {
                    Some(group) => {
                        c.bump();
                        let args = self.parse_args(group)?;
                        Expr::new(
                            ExprKind::Call {
                                target: Some(Box::new(expr)),
                                name,
                                args,
                            },
                            pos,
                        )
                    }
                    None => Expr::new(
                        ExprKind::Access {
                            target: Box::new(expr),
                            name,
                        },
                        pos,
                    ),
                };
            } else if let Some(group) = c.group_at(0, '(') {
                c.bump();
                let args = self.parse_args(group)?;
                let epos = expr.pos;
                expr = match expr.kind {
                    ExprKind::Name(name) => Expr::new(ExprKind::Call { target: None, name, args }, epos),
                    other => Expr::new(
                        ExprKind::Apply {
                            callee: Box::new(Expr::new(other, epos)),
                            args,
                        },
                        epos,
                    ),
                };
            } else if let Some(group) = c.group_at(0, '[') {
                let mut args = self.parse_args(group)?;
                if args.len() != 1 {
                    return Err(self.err(pos, "index expects exactly one argument"));
                }
                c.bump();
                let epos = expr.pos;
                expr = Expr::new(
                    ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(args.remove(0)),
                    },
                    epos,
                );
            } else if c.at_symbol("++") || c.at_symbol("--") {
                let delta = if c.at_symbol("++") { 1 } else { -1 };
                c.bump();
                let epos = expr.pos;
                expr = Expr::new(
                    ExprKind::IncDec {
                        target: Box::new(expr),
                        delta,
                        prefix: false,
                    },
                    epos,
                );
            } else if c.at_keyword("as") {
                c.bump();
                let ty = self.parse_type(c)?;
                let epos = expr.pos;
                expr = Expr::new(ExprKind::As { expr: Box::new(expr), ty }, epos);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self, c: &mut Cursor<'a>) -> PResult<Expr> {
        let pos = c.pos();
        let id = c.id().ok_or_else(|| self.unexpected(c, "an expression"))?;
        match self.tree.node(id) {
            Node::Token(token) => self.parse_token_primary(c, token, pos),
            Node::Group { open: '(', .. } => {
                c.bump();
                if !self.no_lambda && c.at_symbol("->") {
                    let params = self.parse_params(id)?;
                    return self.parse_lambda(c, params, false, pos);
                }
                let mut items = self.parse_args(id)?;
                match items.len() {
                    0 => Err(self.err(pos, "empty parentheses")),
                    1 => Ok(items.remove(0)),
                    _ => Ok(Expr::new(ExprKind::List(items), pos)),
                }
            }
            Node::Group { open: '[', .. } => {
                c.bump();
                Ok(Expr::new(ExprKind::List(self.parse_args(id)?), pos))
            }
            Node::Group { .. } => {
                c.bump();
                self.parse_brace_group(id, pos)
            }
            other => Err(self.err(pos, format!("expected an expression, found {}", describe(Some(other))))),
        }
    }

    fn parse_token_primary(&mut self, c: &mut Cursor<'a>, token: &'a Token, pos: Pos) -> PResult<Expr> {
        let kind = match token.kind {
            TokenKind::Number => {
                c.bump();
                number_literal(&token.text, false).map_err(|m| self.err(pos, m))?
            }
            TokenKind::Str => {
                c.bump();
                ExprKind::Str(token.text.clone())
            }
            TokenKind::Bool => {
                c.bump();
                ExprKind::Bool(token.text == "true" || token.text == "yes")
            }
            TokenKind::Keyword => match token.text.as_str() {
                "null" => {
                    c.bump();
                    ExprKind::Null
                }
                "new" => {
                    c.bump();
                    return self.parse_new(c, pos);
                }
                "type" => {
                    c.bump();
                    ExprKind::TypeOf(self.parse_type(c)?)
                }
                _ => return Err(self.unexpected(c, "an expression")),
            },
            TokenKind::Symbol if token.text == "@" => ExprKind::Annotation(self.parse_annotation(c)?),
            TokenKind::Ident => {
                if !self.no_lambda && c.token_at(1).map_or(false, |t| t.is_symbol("->")) {
                    c.bump();
                    let params = vec![Param::plain(&token.text, pos)];
                    return self.parse_lambda(c, params, false, pos);
                }
                if token.text == "this" {
                    c.bump();
                    ExprKind::This
                } else {
                    let path = self.parse_path(c)?;
                    ExprKind::Name(path.join("::"))
                }
            }
            _ => return Err(self.unexpected(c, "an expression")),
        };
        Ok(Expr::new(kind, pos))
    }

    fn parse_new(&mut self, c: &mut Cursor<'a>, pos: Pos) -> PResult<Expr> {
        let ty = self.parse_type(c)?;
        if let Some(group) = c.group_at(0, '[') {
            let mut len = self.parse_args(group)?;
            if len.len() != 1 {
                return Err(self.err(pos, "array creation expects one length"));
            }
            c.bump();
            let mut elem = ty;
            // trailing `[]` after the length add dimensions to the element
            while let Some(group) = c.group_at(0, '[') {
                if !self.tree.children(group).is_empty() {
                    break;
                }
                c.bump();
                elem.dims += 1;
            }
            return Ok(Expr::new(
                ExprKind::NewArray {
                    elem,
                    len: Box::new(len.remove(0)),
                },
                pos,
            ));
        }
        let args = match c.group_at(0, '(') {
            Some(group) => {
                c.bump();
                self.parse_args(group)?
            }
            None => Vec::new(),
        };
        Ok(Expr::new(ExprKind::New { ty, args }, pos))
    }

    /// `{k: v, ...}` is a map; anything else in braces is a lambda with the
    /// implicit parameter `it`.
    fn parse_brace_group(&mut self, group: NodeId, pos: Pos) -> PResult<Expr> {
        let elements = self.elements(group);
        let is_map = elements.is_empty()
            || elements[0]
                .iter()
                .any(|id| matches!(self.tree.node(*id), Node::Token(t) if t.is_symbol(":")));
        if !is_map {
            let body = self.parse_block(group, Ctx::Body)?;
            return Ok(Expr::new(
                ExprKind::Lambda {
                    params: Vec::new(),
                    body,
                    implicit: true,
                },
                pos,
            ));
        }
        let mut entries = Vec::new();
        for element in elements {
            let mut ec = Cursor::of(self.tree, element, pos);
            let saved = std::mem::replace(&mut self.no_lambda, false);
            let key = self.parse_binary(&mut ec, 0);
            self.no_lambda = saved;
            let key = key?;
            self.expect_symbol(&mut ec, ":")?;
            let value = self.parse_expr(&mut ec)?;
            self.finish_element(&ec)?;
            entries.push((key, value));
        }
        Ok(Expr::new(ExprKind::Map(entries), pos))
    }

    fn parse_lambda(&mut self, c: &mut Cursor<'a>, params: Vec<Param>, implicit: bool, pos: Pos) -> PResult<Expr> {
        if !c.at_symbol("->") {
            return Err(self.unexpected(c, "`->`"));
        }
        let body = self.parse_body(c, Ctx::Body)?;
        Ok(Expr::new(ExprKind::Lambda { params, body, implicit }, pos))
    }

    fn parse_match(&mut self, c: &mut Cursor<'a>, value: Expr) -> PResult<Expr> {
        let pos = c.pos();
        c.bump();
        let block = c.block_at(0).ok_or_else(|| self.unexpected(c, "a block of cases"))?;
        c.bump();
        let mut bc = Cursor::new(self.tree, block);
        let mut cases = Vec::new();
        loop {
            bc.skip_seps();
            if bc.at_end() {
                break;
            }
            let case_pos = bc.pos();
            let result = self.parse_case(&mut bc, case_pos);
            match result.and_then(|case| self.expect_stmt_end(&bc).map(|_| case)) {
                Ok(case) => cases.push(case),
                Err(err) => {
                    self.errors.report(err)?;
                    bc.skip_to_sep();
                }
            }
        }
        if cases.is_empty() {
            return Err(self.err(pos, "match without cases"));
        }
        Ok(Expr::new(
            ExprKind::Match {
                value: Box::new(value),
                cases,
            },
            pos,
        ))
    }

    fn parse_case(&mut self, c: &mut Cursor<'a>, pos: Pos) -> PResult<Case> {
        if !c.eat_keyword("case") {
            return Err(self.unexpected(c, "`case`"));
        }
        let saved = std::mem::replace(&mut self.no_lambda, true);
        let pattern = self.parse_pattern(c);
        let guard = match pattern {
            Ok(_) if c.eat_keyword("if") => Some(self.parse_expr(c)),
            _ => None,
        };
        self.no_lambda = saved;
        let pattern = pattern?;
        let guard = guard.transpose()?;
        if !c.at_symbol("=>") {
            return Err(self.unexpected(c, "`=>`"));
        }
        let body = self.parse_body(c, Ctx::Body)?;
        Ok(Case {
            pattern,
            guard,
            body,
            pos,
        })
    }

    fn parse_pattern(&mut self, c: &mut Cursor<'a>) -> PResult<Pattern> {
        let pos = c.pos();
        if let Some(name) = c.ident_at(0) {
            let next_is_colon = c.token_at(1).map_or(false, |t| t.is_symbol(":"));
            let next_is_path = c.token_at(1).map_or(false, |t| t.is_symbol("::"));
            if next_is_colon {
                c.bump();
                c.bump();
                let ty = self.parse_type(c)?;
                let bind = if name == "_" { None } else { Some(name.to_string()) };
                return Ok(Pattern::Type { bind, ty, pos });
            }
            if c.group_at(1, '(').is_some() || next_is_path {
                let path = self.parse_path(c)?;
                let group = c.group_at(0, '(').ok_or_else(|| self.unexpected(c, "`(`"))?;
                c.bump();
                let mut subs = Vec::new();
                let end = self.tree.node(group).pos();
                for element in self.elements(group) {
                    let mut ec = Cursor::of(self.tree, element, end);
                    subs.push(self.parse_pattern(&mut ec)?);
                    self.finish_element(&ec)?;
                }
                let ty = TypeRef { path, dims: 0, pos };
                return Ok(Pattern::Destruct { ty, subs, pos });
            }
            if name == "_" {
                c.bump();
                return Ok(Pattern::Wildcard(pos));
            }
            if name != "this" {
                c.bump();
                return Ok(Pattern::Bind(name.to_string(), pos));
            }
        }
        Ok(Pattern::Value(self.parse_binary(c, 1)?))
    }

    fn expr_to_pattern(&self, expr: Expr) -> PResult<Pattern> {
        let pos = expr.pos;
        Ok(match expr.kind {
            ExprKind::Name(name) if name == "_" => Pattern::Wildcard(pos),
            ExprKind::Name(name) if !name.contains("::") => Pattern::Bind(name, pos),
            ExprKind::Call { target: None, name, args } => Pattern::Destruct {
                ty: TypeRef {
                    path: name.split("::").map(str::to_string).collect(),
                    dims: 0,
                    pos,
                },
                subs: args
                    .into_iter()
                    .map(|a| self.expr_to_pattern(a))
                    .collect::<PResult<Vec<_>>>()?,
                pos,
            },
            kind @ (ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Float(_)
            | ExprKind::Double(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Null) => Pattern::Value(Expr::new(kind, pos)),
            _ => return Err(self.err(pos, "invalid destructuring pattern")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{scanner, CompileOptions, ErrorMode};

    fn parse_src(src: &str) -> Unit {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        let tree = scanner::scan("t.mo", src, &CompileOptions::default(), &mut errors).unwrap();
        parse("t.mo", &tree, &mut errors).unwrap()
    }

    fn parse_err(src: &str) -> CompileError {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        let tree = scanner::scan("t.mo", src, &CompileOptions::default(), &mut errors).unwrap();
        parse("t.mo", &tree, &mut errors).unwrap_err()
    }

    fn class(unit: &Unit, idx: usize) -> &ClassDef {
        match &unit.items[idx] {
            Stmt::Class(c) => c,
            other => panic!("not a class: {:?}", other),
        }
    }

    fn method<'u>(class: &'u ClassDef, name: &str) -> &'u MethodDef {
        class
            .body
            .iter()
            .find_map(|s| match s {
                Stmt::Method(m) if m.name == name => Some(m),
                _ => None,
            })
            .unwrap()
    }

    fn first_body_stmt(src: &str) -> Stmt {
        let unit = parse_src(src);
        let c = class(&unit, 0);
        method(c, "m").body.as_ref().unwrap()[0].clone()
    }

    fn binary(expr: &Expr) -> (BinOp, &Expr, &Expr) {
        match &expr.kind {
            ExprKind::Binary { op, lhs, rhs } => (*op, &**lhs, &**rhs),
            other => panic!("not binary: {:?}", other),
        }
    }

    #[test]
    fn class_header_with_params_parent_and_interfaces() {
        let unit = parse_src("package a::b\nimport java::util::_\nclass C(x:int, y=1):P(x), I, J\n    z = 2\n");
        assert_eq!(unit.package, vec!["a", "b"]);
        assert_eq!(unit.imports[0].kind, ImportKind::Package);
        let c = class(&unit, 0);
        assert_eq!(c.params.len(), 2);
        assert!(c.params[1].default.is_some());
        assert_eq!(c.parent.as_ref().unwrap().path, vec!["P"]);
        assert_eq!(c.parent_args.len(), 1);
        assert_eq!(c.interfaces.len(), 2);
        assert!(matches!(&c.body[0], Stmt::Var(v) if v.name == "z"));
    }

    #[test]
    fn imports_of_every_kind() {
        let unit = parse_src(
            "import java::util::List\nimport java::util::Collections._\nimport implicit my::Conv\nclass A\n",
        );
        let kinds: Vec<_> = unit.imports.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ImportKind::Type, ImportKind::Static, ImportKind::Implicit]);
        assert_eq!(unit.imports[1].path, vec!["java", "util", "Collections"]);
    }

    #[test]
    fn non_trailing_default_is_rejected() {
        let err = parse_err("class C(a=1, b)\n");
        assert!(matches!(err, CompileError::Syntax { .. }));
        assert!(err.message().contains("without default"));
    }

    #[test]
    fn precedence_follows_the_table() {
        let stmt = first_body_stmt("class A\n    m()\n        x = 1 + 2 * 3 ^^ 2\n");
        let Stmt::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) = stmt else {
            panic!()
        };
        let (op, _, rhs) = binary(&value);
        assert_eq!(op, BinOp::Add);
        let (op, _, rhs) = binary(rhs);
        assert_eq!(op, BinOp::Mul);
        assert_eq!(binary(rhs).0, BinOp::Pow);
    }

    #[test]
    fn custom_word_operator_binds_loosest() {
        let stmt = first_body_stmt("class A\n    m()\n        a op b + c op d\n");
        let Stmt::Expr(expr) = stmt else { panic!() };
        match expr.kind {
            ExprKind::Custom { op, lhs, rhs } => {
                assert_eq!(op, "op");
                assert!(matches!(rhs.kind, ExprKind::Name(ref n) if n == "d"));
                assert!(matches!(lhs.kind, ExprKind::Custom { .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn if_chain_with_layers() {
        let stmt = first_body_stmt(
            "class A\n    m()\n        if a -> x = 1\n        elseif b\n            x = 2\n        else -> x = 3\n",
        );
        match stmt {
            Stmt::If { branches, otherwise, .. } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise.unwrap().len(), 1);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn try_catch_finally_and_do_while() {
        let unit = parse_src(concat!(
            "class A\n",
            "    m()\n",
            "        try\n",
            "            f()\n",
            "        catch e:RuntimeException\n",
            "            g()\n",
            "        catch e\n",
            "            h()\n",
            "        finally\n",
            "            k()\n",
            "        do\n",
            "            i += 1\n",
            "        while i < 3\n",
        ));
        let body = method(class(&unit, 0), "m").body.as_ref().unwrap();
        match &body[0] {
            Stmt::Try { catches, finally, .. } => {
                assert_eq!(catches.len(), 2);
                assert!(catches[0].ty.is_some());
                assert!(catches[1].ty.is_none());
                assert!(finally.is_some());
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(body[1], Stmt::While { do_while: true, .. }));
    }

    #[test]
    fn lambdas_in_both_forms() {
        let stmt = first_body_stmt("class A\n    m()\n        f((a, b) -> a + b, { it * 2 })\n");
        let Stmt::Expr(Expr { kind: ExprKind::Call { args, .. }, .. }) = stmt else {
            panic!()
        };
        assert!(matches!(&args[0].kind, ExprKind::Lambda { params, implicit: false, .. } if params.len() == 2));
        assert!(matches!(&args[1].kind, ExprKind::Lambda { implicit: true, .. }));
    }

    #[test]
    fn map_and_list_literals() {
        let stmt = first_body_stmt("class A\n    m()\n        x = [{'a': 1, 'b': 2}, []]\n");
        let Stmt::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) = stmt else {
            panic!()
        };
        let ExprKind::List(items) = &value.kind else { panic!() };
        assert!(matches!(&items[0].kind, ExprKind::Map(entries) if entries.len() == 2));
        assert!(matches!(&items[1].kind, ExprKind::List(v) if v.is_empty()));
    }

    #[test]
    fn match_cases_with_guards_and_patterns() {
        let stmt = first_body_stmt(concat!(
            "class A\n",
            "    m()\n",
            "        r = x match\n",
            "            case 1 => 'one'\n",
            "            case P(a, _) if a > 0 => a\n",
            "            case s: String => s\n",
            "            case _ => null\n",
        ));
        let Stmt::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) = stmt else {
            panic!()
        };
        let ExprKind::Match { cases, .. } = &value.kind else { panic!() };
        assert_eq!(cases.len(), 4);
        assert!(matches!(cases[0].pattern, Pattern::Value(_)));
        assert!(matches!(&cases[1].pattern, Pattern::Destruct { subs, .. } if subs.len() == 2));
        assert!(cases[1].guard.is_some());
        assert!(matches!(&cases[2].pattern, Pattern::Type { bind: Some(b), .. } if b == "s"));
        assert!(matches!(cases[3].pattern, Pattern::Wildcard(_)));
    }

    #[test]
    fn destructuring_statement_and_condition() {
        let unit = parse_src(concat!(
            "class A\n",
            "    m()\n",
            "        P(a, b) <- [1, 2]\n",
            "        if P(c, d) <- v\n",
            "            ...\n",
        ));
        let body = method(class(&unit, 0), "m").body.as_ref().unwrap();
        assert!(matches!(&body[0], Stmt::Destructure { pattern: Pattern::Destruct { subs, .. }, .. } if subs.len() == 2));
        match &body[1] {
            Stmt::If { branches, .. } => assert!(matches!(branches[0].0.kind, ExprKind::Destructure { .. })),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn annotations_nest_and_form_arrays() {
        let unit = parse_src("@A(k=1, arr=[@B, @C(x='y')])\nclass D\n");
        let c = class(&unit, 0);
        let anno = &c.annotations[0];
        assert_eq!(anno.args.len(), 2);
        let ExprKind::List(values) = &anno.args[1].1.kind else { panic!() };
        assert!(values.iter().all(|v| matches!(v.kind, ExprKind::Annotation(_))));
    }

    #[test]
    fn method_forms_in_class_and_interface() {
        let unit = parse_src(concat!(
            "interface I\n",
            "    f(a:int):int\n",
            "class C\n",
            "    g(a) = a + 1\n",
            "    def h():Unit\n",
            "        return\n",
        ));
        let i = class(&unit, 0);
        assert!(method(i, "f").body.is_none());
        let c = class(&unit, 1);
        assert!(matches!(method(c, "g").body.as_deref(), Some([Stmt::Return(Some(_), _)])));
        assert!(method(c, "h").ret.is_some());
    }

    #[test]
    fn negative_literals_reach_the_extremes() {
        let stmt = first_body_stmt("class A\n    m()\n        x = -2147483648\n");
        let Stmt::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) = stmt else {
            panic!()
        };
        assert_eq!(value.kind, ExprKind::Int(i32::MIN));
        assert_eq!(number_literal("10L", false), Ok(ExprKind::Long(10)));
        assert_eq!(number_literal("1.5F", false), Ok(ExprKind::Float(1.5)));
        assert_eq!(number_literal("0xFF", false), Ok(ExprKind::Int(255)));
        assert!(number_literal("2147483648", false).is_err());
    }

    #[test]
    fn overflowing_float_literals_are_out_of_range() {
        let err = parse_err("class A\n    m()\n        x = 1.5e400\n");
        assert!(matches!(err, CompileError::Syntax { .. }), "{:?}", err);
        assert!(err.message().contains("`1.5e400` is out of range"), "{}", err.message());
        assert!(number_literal("1e39F", false).is_err());
        assert!(number_literal("1e400D", true).is_err());
        assert_eq!(number_literal("1e300", false), Ok(ExprKind::Double(1e300)));
    }

    #[test]
    fn collect_mode_reports_every_bad_statement() {
        let mut errors = ErrorManager::new(ErrorMode::Collect);
        let src = "class A\n    m()\n        x = 1 1\n        y = 1\n        return return\n";
        let tree = scanner::scan("t.mo", src, &CompileOptions::default(), &mut errors).unwrap();
        let unit = parse("t.mo", &tree, &mut errors).unwrap();
        assert_eq!(errors.errors().len(), 2);
        let body = method(class(&unit, 0), "m").body.as_ref().unwrap();
        assert_eq!(body.len(), 1);
    }
}
