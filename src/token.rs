use std::fmt;

/// Source location of a token or AST node, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Let,
    Function,
    If,
    Else,
    For,
    Return,
    True,
    False,
    Null,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Self> {
        match text {
            "let" => Some(Self::Let),
            "function" => Some(Self::Function),
            "if" => Some(Self::If),
            "else" => Some(Self::Else),
            "for" => Some(Self::For),
            "return" => Some(Self::Return),
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Function => "function",
            Self::If => "if",
            Self::Else => "else",
            Self::For => "for",
            Self::Return => "return",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulus,
    Assign,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    ModulusAssign,
    Eq,
    Ne,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    And,
    Or,
    Not,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Inc,
    Dec,
}

impl Op {
    /// Binding strength for the precedence-climbing parser. Non-binary
    /// operators report -1 so the climber never absorbs them.
    pub fn precedence(self) -> i32 {
        match self {
            Self::Assign
            | Self::PlusAssign
            | Self::MinusAssign
            | Self::MultiplyAssign
            | Self::DivideAssign
            | Self::ModulusAssign => 2,
            Self::Or => 4,
            Self::And => 5,
            Self::BitOr => 6,
            Self::BitXor => 7,
            Self::BitAnd => 8,
            Self::Eq | Self::Ne => 9,
            Self::Greater | Self::GreaterEq | Self::Less | Self::LessEq => 10,
            Self::ShiftLeft | Self::ShiftRight => 11,
            Self::Plus | Self::Minus => 12,
            Self::Multiply | Self::Divide | Self::Modulus => 13,
            Self::Not | Self::Inc | Self::Dec => -1,
        }
    }

    pub fn is_assign(self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::PlusAssign
                | Self::MinusAssign
                | Self::MultiplyAssign
                | Self::DivideAssign
                | Self::ModulusAssign
        )
    }

    /// The arithmetic operator a compound assignment desugars to.
    pub fn compound_base(self) -> Option<Op> {
        match self {
            Self::PlusAssign => Some(Self::Plus),
            Self::MinusAssign => Some(Self::Minus),
            Self::MultiplyAssign => Some(Self::Multiply),
            Self::DivideAssign => Some(Self::Divide),
            Self::ModulusAssign => Some(Self::Modulus),
            _ => None,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::MultiplyAssign => "*=",
            Self::DivideAssign => "/=",
            Self::ModulusAssign => "%=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::Inc => "++",
            Self::Dec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sep {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Colon,
    Comma,
    Semicolon,
}

impl Sep {
    pub fn text(self) -> &'static str {
        match self {
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Semicolon => ";",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    IntegerLiteral(i64),
    DecimalLiteral(f64),
    StringLiteral(String),
    Keyword(Keyword),
    Op(Op),
    Sep(Sep),
    Eof,
}

impl TokenKind {
    /// Display text used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => name.clone(),
            Self::IntegerLiteral(value) => value.to_string(),
            Self::DecimalLiteral(value) => value.to_string(),
            Self::StringLiteral(value) => format!("\"{value}\""),
            Self::Keyword(keyword) => keyword.text().to_string(),
            Self::Op(op) => op.text().to_string(),
            Self::Sep(sep) => sep.text().to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
