use std::iter::Peekable;
use std::str::CharIndices;

use crate::diagnostics::Diagnostic;
use crate::token::{Keyword, Op, Position, Sep, Token, TokenKind};

/// Opaque rewind point handed out by [`Scanner::position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMark(usize);

/// Converts source text into a lazy stream of positioned tokens.
///
/// The parser needs one- and two-token lookahead (`identifier` can start a
/// variable reference or a call) and the ability to rewind for speculative
/// productions, so scanned tokens are cached and the cursor can be saved and
/// restored. Once the input is exhausted the scanner answers every request
/// with an end-of-input token. Unrecognized characters are reported as
/// diagnostics and skipped; scanning always continues.
pub struct Scanner<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    scanned: Vec<Token>,
    cursor: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            scanned: Vec::new(),
            cursor: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Token {
        self.fill_to(self.cursor);
        let index = self.cursor.min(self.scanned.len() - 1);
        let token = self.scanned[index].clone();
        if !token.is_eof() {
            self.cursor += 1;
        }
        token
    }

    /// One-token lookahead.
    pub fn peek(&mut self) -> &Token {
        self.peek_nth(0)
    }

    /// Two-token lookahead.
    pub fn peek2(&mut self) -> &Token {
        self.peek_nth(1)
    }

    /// Current cursor, restorable with [`Scanner::restore_position`].
    pub fn position(&self) -> TokenMark {
        TokenMark(self.cursor)
    }

    pub fn restore_position(&mut self, mark: TokenMark) {
        self.cursor = mark.0;
    }

    /// Diagnostics accumulated while scanning, in source order.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn peek_nth(&mut self, offset: usize) -> &Token {
        self.fill_to(self.cursor + offset);
        let index = (self.cursor + offset).min(self.scanned.len() - 1);
        &self.scanned[index]
    }

    fn fill_to(&mut self, index: usize) {
        while self.scanned.len() <= index {
            if matches!(self.scanned.last(), Some(token) if token.is_eof()) {
                return;
            }
            let token = self.scan_token();
            self.scanned.push(token);
        }
    }

    fn scan_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();
            let pos = Position::new(self.line, self.column);
            let Some(&(_, ch)) = self.chars.peek() else {
                return Token::new(TokenKind::Eof, pos);
            };
            match ch {
                '"' => return self.scan_string(pos),
                c if c.is_ascii_digit() => return self.scan_number(pos),
                c if c.is_alphabetic() || c == '_' => return self.scan_identifier(pos),
                '(' | ')' | '{' | '}' | ':' | ',' | ';' => {
                    self.advance();
                    let sep = match ch {
                        '(' => Sep::OpenParen,
                        ')' => Sep::CloseParen,
                        '{' => Sep::OpenBrace,
                        '}' => Sep::CloseBrace,
                        ':' => Sep::Colon,
                        ',' => Sep::Comma,
                        _ => Sep::Semicolon,
                    };
                    return Token::new(TokenKind::Sep(sep), pos);
                }
                _ => {
                    if let Some(op) = self.scan_operator() {
                        return Token::new(TokenKind::Op(op), pos);
                    }
                    self.diagnostics
                        .push(Diagnostic::error(format!("unexpected character '{ch}'"), pos));
                    self.advance();
                }
            }
        }
    }

    fn scan_identifier(&mut self, pos: Position) -> Token {
        let start = self.current_index();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.current_index()];
        let kind = match Keyword::from_ident(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(text.to_string()),
        };
        Token::new(kind, pos)
    }

    fn scan_number(&mut self, pos: Position) -> Token {
        let start = self.current_index();
        let mut is_decimal = false;
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_decimal {
                // Only a digit after '.' makes this a decimal literal.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(&(_, d)) if d.is_ascii_digit() => {
                        is_decimal = true;
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }
        let text = &self.input[start..self.current_index()];
        if is_decimal {
            match text.parse::<f64>() {
                Ok(value) => Token::new(TokenKind::DecimalLiteral(value), pos),
                Err(_) => {
                    self.diagnostics
                        .push(Diagnostic::error(format!("invalid decimal literal '{text}'"), pos));
                    Token::new(TokenKind::DecimalLiteral(0.0), pos)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Token::new(TokenKind::IntegerLiteral(value), pos),
                Err(_) => {
                    self.diagnostics
                        .push(Diagnostic::error(format!("invalid integer literal '{text}'"), pos));
                    Token::new(TokenKind::IntegerLiteral(0), pos)
                }
            }
        }
    }

    fn scan_string(&mut self, pos: Position) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.chars.peek().copied() {
                None => {
                    self.diagnostics
                        .push(Diagnostic::error("unterminated string literal", pos));
                    break;
                }
                Some((_, '"')) => {
                    self.advance();
                    break;
                }
                Some((_, '\\')) => {
                    self.advance();
                    match self.chars.peek().copied() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, 'r')) => value.push('\r'),
                        Some((_, '\\')) => value.push('\\'),
                        Some((_, '"')) => value.push('"'),
                        Some((_, other)) => {
                            self.diagnostics.push(Diagnostic::error(
                                format!("unknown escape sequence '\\{other}'"),
                                Position::new(self.line, self.column),
                            ));
                            value.push(other);
                        }
                        None => continue,
                    }
                    self.advance();
                }
                Some((_, c)) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::StringLiteral(value), pos)
    }

    fn scan_operator(&mut self) -> Option<Op> {
        let (_, first) = self.chars.peek().copied()?;
        let op = match first {
            '+' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '+')) => self.consume(Op::Inc),
                    Some(&(_, '=')) => self.consume(Op::PlusAssign),
                    _ => Op::Plus,
                }
            }
            '-' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '-')) => self.consume(Op::Dec),
                    Some(&(_, '=')) => self.consume(Op::MinusAssign),
                    _ => Op::Minus,
                }
            }
            '*' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::MultiplyAssign),
                    _ => Op::Multiply,
                }
            }
            '/' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::DivideAssign),
                    _ => Op::Divide,
                }
            }
            '%' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::ModulusAssign),
                    _ => Op::Modulus,
                }
            }
            '=' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::Eq),
                    _ => Op::Assign,
                }
            }
            '!' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::Ne),
                    _ => Op::Not,
                }
            }
            '>' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::GreaterEq),
                    Some(&(_, '>')) => self.consume(Op::ShiftRight),
                    _ => Op::Greater,
                }
            }
            '<' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '=')) => self.consume(Op::LessEq),
                    Some(&(_, '<')) => self.consume(Op::ShiftLeft),
                    _ => Op::Less,
                }
            }
            '&' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '&')) => self.consume(Op::And),
                    _ => Op::BitAnd,
                }
            }
            '|' => {
                self.advance();
                match self.chars.peek() {
                    Some(&(_, '|')) => self.consume(Op::Or),
                    _ => Op::BitOr,
                }
            }
            '^' => {
                self.advance();
                Op::BitXor
            }
            _ => return None,
        };
        Some(op)
    }

    fn consume(&mut self, op: Op) -> Op {
        self.advance();
        op
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek().copied() {
                Some((_, c)) if c.is_whitespace() => {
                    self.advance();
                }
                Some((index, '/')) => {
                    let rest = &self.input[index..];
                    if rest.starts_with("//") {
                        while let Some(&(_, c)) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else if rest.starts_with("/*") {
                        let pos = Position::new(self.line, self.column);
                        self.advance();
                        self.advance();
                        let mut closed = false;
                        while let Some((i, _)) = self.chars.peek().copied() {
                            if self.input[i..].starts_with("*/") {
                                self.advance();
                                self.advance();
                                closed = true;
                                break;
                            }
                            self.advance();
                        }
                        if !closed {
                            self.diagnostics
                                .push(Diagnostic::error("unterminated block comment", pos));
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(index, _)| index)
            .unwrap_or(self.input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(input);
        let mut out = Vec::new();
        loop {
            let token = scanner.next();
            let done = token.is_eof();
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_function_declaration() {
        let input = indoc! {r#"
            function add(a: integer, b: integer): integer {
                return a + b;
            }
        "#};
        let expected = vec![
            TokenKind::Keyword(Keyword::Function),
            TokenKind::Identifier("add".to_string()),
            TokenKind::Sep(Sep::OpenParen),
            TokenKind::Identifier("a".to_string()),
            TokenKind::Sep(Sep::Colon),
            TokenKind::Identifier("integer".to_string()),
            TokenKind::Sep(Sep::Comma),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Sep(Sep::Colon),
            TokenKind::Identifier("integer".to_string()),
            TokenKind::Sep(Sep::CloseParen),
            TokenKind::Sep(Sep::Colon),
            TokenKind::Identifier("integer".to_string()),
            TokenKind::Sep(Sep::OpenBrace),
            TokenKind::Keyword(Keyword::Return),
            TokenKind::Identifier("a".to_string()),
            TokenKind::Op(Op::Plus),
            TokenKind::Identifier("b".to_string()),
            TokenKind::Sep(Sep::Semicolon),
            TokenKind::Sep(Sep::CloseBrace),
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn scans_multi_character_operators() {
        assert_eq!(
            kinds("a += 1; b == c; d && e; f++;"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Op(Op::PlusAssign),
                TokenKind::IntegerLiteral(1),
                TokenKind::Sep(Sep::Semicolon),
                TokenKind::Identifier("b".to_string()),
                TokenKind::Op(Op::Eq),
                TokenKind::Identifier("c".to_string()),
                TokenKind::Sep(Sep::Semicolon),
                TokenKind::Identifier("d".to_string()),
                TokenKind::Op(Op::And),
                TokenKind::Identifier("e".to_string()),
                TokenKind::Sep(Sep::Semicolon),
                TokenKind::Identifier("f".to_string()),
                TokenKind::Op(Op::Inc),
                TokenKind::Sep(Sep::Semicolon),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_integer_and_decimal_literals() {
        assert_eq!(
            kinds("3 3.25"),
            vec![
                TokenKind::IntegerLiteral(3),
                TokenKind::DecimalLiteral(3.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn returns_eof_repeatedly_after_end_of_input() {
        let mut scanner = Scanner::new("x");
        assert!(matches!(scanner.next().kind, TokenKind::Identifier(_)));
        assert!(scanner.next().is_eof());
        assert!(scanner.next().is_eof());
        assert!(scanner.peek().is_eof());
    }

    #[test]
    fn rewinds_to_a_saved_position() {
        let mut scanner = Scanner::new("a = 1;");
        let mark = scanner.position();
        assert!(matches!(scanner.next().kind, TokenKind::Identifier(_)));
        assert!(matches!(scanner.next().kind, TokenKind::Op(Op::Assign)));
        scanner.restore_position(mark);
        assert!(matches!(scanner.next().kind, TokenKind::Identifier(_)));
    }

    #[test]
    fn peek2_sees_past_the_next_token() {
        let mut scanner = Scanner::new("foo(42)");
        assert!(matches!(scanner.peek().kind, TokenKind::Identifier(_)));
        assert_eq!(scanner.peek2().kind, TokenKind::Sep(Sep::OpenParen));
        // Lookahead does not consume.
        assert!(matches!(scanner.next().kind, TokenKind::Identifier(_)));
    }

    #[test]
    fn reports_unknown_characters_and_keeps_scanning() {
        let mut scanner = Scanner::new("a @ b");
        let mut count = 0;
        while !scanner.next().is_eof() {
            count += 1;
        }
        assert_eq!(count, 2);
        let diagnostics = scanner.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unexpected character '@'"));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let input = indoc! {"
            // leading comment
            let a = 1; /* inline */ let b = 2;
        "};
        let count = kinds(input).len();
        assert_eq!(count, 11); // two declarations plus EOF
    }

    #[test]
    fn tracks_line_and_column_positions() {
        let mut scanner = Scanner::new("let x;\n  x;");
        assert_eq!(scanner.next().pos, Position::new(1, 1));
        assert_eq!(scanner.next().pos, Position::new(1, 5));
        scanner.next(); // ;
        assert_eq!(scanner.next().pos, Position::new(2, 3));
    }
}
