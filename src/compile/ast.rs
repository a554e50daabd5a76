use super::Pos;

/// Type reference as written: `int`, `java::util::List`, `String[]`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub path: Vec<String>,
    pub dims: usize,
    pub pos: Pos,
}

impl TypeRef {
    pub fn simple(name: &str, pos: Pos) -> Self {
        TypeRef {
            path: vec![name.to_string()],
            dims: 0,
            pos,
        }
    }

    pub fn display(&self) -> String {
        format!("{}{}", self.path.join("::"), "[]".repeat(self.dims))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modifier {
    Public,
    Private,
    Protected,
    Abstract,
    Val,
    Var,
    Data,
    NonNull,
    NonEmpty,
    Implicit,
    Static,
}

impl Modifier {
    pub fn from_word(word: &str) -> Option<Modifier> {
        Some(match word {
            "public" => Modifier::Public,
            "private" => Modifier::Private,
            "protected" => Modifier::Protected,
            "abstract" | "abs" => Modifier::Abstract,
            "val" => Modifier::Val,
            "var" => Modifier::Var,
            "data" => Modifier::Data,
            "nonnull" => Modifier::NonNull,
            "nonempty" => Modifier::NonEmpty,
            "implicit" => Modifier::Implicit,
            "static" => Modifier::Static,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub ty: TypeRef,
    pub args: Vec<(String, Expr)>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub default: Option<Expr>,
    pub modifiers: Vec<Modifier>,
    pub annotations: Vec<Annotation>,
    pub pos: Pos,
}

impl Param {
    pub fn plain(name: &str, pos: Pos) -> Self {
        Param {
            name: name.to_string(),
            ty: None,
            default: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            pos,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportKind {
    /// `import a::B`
    Type,
    /// `import a::_`
    Package,
    /// `import a::B._`
    Static,
    /// `import implicit a::B`
    Implicit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub path: Vec<String>,
    pub kind: ImportKind,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub name: String,
    pub package: Vec<String>,
    pub imports: Vec<Import>,
    pub items: Vec<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Object,
    Annotation,
    Fun,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub modifiers: Vec<Modifier>,
    pub annotations: Vec<Annotation>,
    pub params: Vec<Param>,
    pub parent: Option<TypeRef>,
    pub parent_args: Vec<Expr>,
    pub interfaces: Vec<TypeRef>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

impl ClassDef {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub annotations: Vec<Annotation>,
    pub params: Vec<Param>,
    pub ret: Option<TypeRef>,
    /// `None` for abstract methods.
    pub body: Option<Vec<Stmt>>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub init: Option<Expr>,
    pub modifiers: Vec<Modifier>,
    pub annotations: Vec<Annotation>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Class(ClassDef),
    Method(MethodDef),
    Var(VarDef),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
        pos: Pos,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        do_while: bool,
        pos: Pos,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Break(Pos),
    Continue(Pos),
    Return(Option<Expr>, Pos),
    Throw(Expr, Pos),
    Try {
        body: Vec<Stmt>,
        catches: Vec<Catch>,
        finally: Option<Vec<Stmt>>,
        pos: Pos,
    },
    Synchronized {
        locks: Vec<Expr>,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Static(Vec<Stmt>, Pos),
    Pass(Pos),
    Destructure {
        pattern: Pattern,
        value: Expr,
        pos: Pos,
    },
}

impl Stmt {
    pub fn pos(&self) -> Pos {
        match self {
            Stmt::Class(c) => c.pos,
            Stmt::Method(m) => m.pos,
            Stmt::Var(v) => v.pos,
            Stmt::Expr(e) => e.pos,
            Stmt::If { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::For { pos, .. }
            | Stmt::Try { pos, .. }
            | Stmt::Synchronized { pos, .. }
            | Stmt::Destructure { pos, .. } => *pos,
            Stmt::Break(pos)
            | Stmt::Continue(pos)
            | Stmt::Return(_, pos)
            | Stmt::Throw(_, pos)
            | Stmt::Static(_, pos)
            | Stmt::Pass(pos) => *pos,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Wildcard(Pos),
    Value(Expr),
    /// `x: T` or `_: T`
    Type {
        bind: Option<String>,
        ty: TypeRef,
        pos: Pos,
    },
    Bind(String, Pos),
    /// `T(p1, p2)` matched through `T.unapply`
    Destruct {
        ty: TypeRef,
        subs: Vec<Pattern>,
        pos: Pos,
    },
}

impl Pattern {
    pub fn pos(&self) -> Pos {
        match self {
            Pattern::Wildcard(pos) | Pattern::Bind(_, pos) => *pos,
            Pattern::Value(e) => e.pos,
            Pattern::Type { pos, .. } | Pattern::Destruct { pos, .. } => *pos,
        }
    }

    /// Names bound anywhere in the pattern, in order.
    pub fn bindings(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Bind(name, _) => out.push(name.clone()),
            Pattern::Type { bind: Some(name), .. } => out.push(name.clone()),
            Pattern::Destruct { subs, .. } => subs.iter().for_each(|s| s.collect_bindings(out)),
            _ => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Pow,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Ushr,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    Eq,
    Ne,
    RefEq,
    RefNe,
    BitAnd,
    Xor,
    BitOr,
    And,
    Or,
    Range,
    RangeExclusive,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Pow => "^^",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::RefEq => "===",
            BinOp::RefNe => "!==",
            BinOp::BitAnd => "&",
            BinOp::Xor => "^",
            BinOp::BitOr => "|",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Range => "..",
            BinOp::RangeExclusive => ".:",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne | BinOp::RefEq | BinOp::RefNe
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Expr { kind, pos }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
    This,
    /// Identifier, or a `::`-joined qualified name.
    Name(String),
    Access {
        target: Box<Expr>,
        name: String,
    },
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    /// Call of a computed function value: `f()(x)`.
    Apply {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
    },
    NewArray {
        elem: TypeRef,
        len: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a op b` with an identifier operator, lowered to `a.op(b)`.
    Custom {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    IncDec {
        target: Box<Expr>,
        delta: i32,
        prefix: bool,
    },
    Lambda {
        params: Vec<Param>,
        body: Vec<Stmt>,
        /// Brace form with no declared parameters; `it` is the implicit one.
        implicit: bool,
    },
    Match {
        value: Box<Expr>,
        cases: Vec<Case>,
    },
    TypeOf(TypeRef),
    As {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    Is {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    /// Boolean destructuring test: `P(a, b) <- e`.
    Destructure {
        pattern: Box<Pattern>,
        value: Box<Expr>,
    },
    Annotation(Annotation),
}
