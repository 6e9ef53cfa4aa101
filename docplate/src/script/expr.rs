//! Template expression lexer, AST and parser.
//!
//! The language is a JavaScript-flavoured expression subset: literals,
//! arrays, objects, member access (including `?.`), calls, arrow functions,
//! the usual arithmetic/comparison/logical operators, `??`, the ternary
//! operator, assignment to plain identifiers and `;`/`,` sequences.
//!
//! Operator precedence (lowest → highest):
//!   sequence  →  assign/arrow  →  ternary  →  nullish  →  or  →  and  →
//!   equality  →  relational  →  additive  →  multiplicative  →  unary  →
//!   postfix  →  primary

use super::value::Value;

/// Nesting limit for the recursive-descent parser.
const MAX_DEPTH: usize = 128;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    // Comparison
    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,     // &&
    Or,      // ||
    Nullish, // ??

    // Assignment
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=

    // Misc
    Arrow, // =>
    Question,
    QuestionDot,
    Colon,
    Comma,
    Semi,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// Unrecognised input character, reported by the parser.
    Unknown(char),
    Eof,
}

/// Piece of a backtick template string.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Code(String),
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char) -> Token {
        let mut s = String::new();
        if first == '.' {
            s.push('0');
        }
        s.push(first);
        let mut is_float = first == '.';

        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.pos += 1;
            let mut hex = String::new();
            while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
                hex.push(c);
                self.pos += 1;
            }
            return Token::Int(i64::from_str_radix(&hex, 16).unwrap_or(0));
        }

        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            s.push(c);
            self.pos += 1;
        }
        if !is_float && self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                s.push(c);
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && (self.peek2().is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek2(), Some('+' | '-'))
                    && self.src.get(self.pos + 2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            s.push('e');
            self.pos += 1;
            if let Some(sign) = self.peek().filter(|c| matches!(*c, '+' | '-')) {
                s.push(sign);
                self.pos += 1;
            }
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                s.push(c);
                self.pos += 1;
            }
        }

        if is_float {
            Token::Float(s.parse().unwrap_or(f64::NAN))
        } else {
            s.parse()
                .map(Token::Int)
                .unwrap_or_else(|_| Token::Float(s.parse().unwrap_or(f64::NAN)))
        }
    }

    fn read_escape(&mut self, out: &mut String) {
        match self.advance() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = self.src.iter().skip(self.pos).take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) if hex.len() == 4 => {
                        out.push(c);
                        self.pos += 4;
                    }
                    _ => out.push('u'),
                }
            }
            Some(c) => out.push(c),
            None => {}
        }
    }

    fn read_string(&mut self, quote: char) -> Token {
        let mut s = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => break,
                Some('\\') => self.read_escape(&mut s),
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Token::Str(s)
    }

    fn read_template(&mut self) -> Token {
        let mut parts = Vec::new();
        let mut text = String::new();
        while let Some(c) = self.advance() {
            match c {
                '`' => break,
                '\\' => self.read_escape(&mut text),
                '$' if self.peek() == Some('{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let mut depth = 0usize;
                    let mut code = String::new();
                    while let Some(c) = self.advance() {
                        match c {
                            '{' => depth += 1,
                            '}' if depth == 0 => break,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        code.push(c);
                    }
                    parts.push(TemplatePart::Code(code));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Token::Template(parts)
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek().filter(|&c| is_ident_char(c)) {
            s.push(c);
            self.pos += 1;
        }
        Token::Ident(s)
    }

    fn next_token(&mut self) -> Token {
        self.skip_ws();
        let ch = match self.advance() {
            None => return Token::Eof,
            Some(c) => c,
        };

        match ch {
            '0'..='9' => self.read_number(ch),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number('.'),
            '"' | '\'' => self.read_string(ch),
            '`' => self.read_template(),
            c if c.is_alphabetic() || c == '_' || c == '$' => self.read_ident(c),
            '+' => if self.eat('=') { Token::PlusAssign } else { Token::Plus },
            '-' => if self.eat('=') { Token::MinusAssign } else { Token::Minus },
            '*' => if self.eat('=') { Token::StarAssign } else { Token::Star },
            '/' => if self.eat('=') { Token::SlashAssign } else { Token::Slash },
            '%' => if self.eat('=') { Token::PercentAssign } else { Token::Percent },
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { Token::StrictNe } else { Token::Ne }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { Token::StrictEq } else { Token::Eq }
                } else if self.eat('>') {
                    Token::Arrow
                } else {
                    Token::Assign
                }
            }
            '<' => if self.eat('=') { Token::Le } else { Token::Lt },
            '>' => if self.eat('=') { Token::Ge } else { Token::Gt },
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '?' => {
                if self.eat('?') {
                    Token::Nullish
                } else if self.peek() == Some('.') && !self.peek2().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                    Token::QuestionDot
                } else {
                    Token::Question
                }
            }
            ':' => Token::Colon,
            ',' => Token::Comma,
            ';' => Token::Semi,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            c => Token::Unknown(c),
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token();
            let done = matches!(t, Token::Eof);
            tokens.push(t);
            if done {
                break;
            }
        }
        tokens
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// Backtick template: parts are concatenated as strings.
    Template(Vec<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    Arrow {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(String, AssignOp, Box<Expr>),
    Sequence(Vec<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {what}, found {}", describe(self.peek())))
        }
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err("expression nested too deeply".into())
        } else {
            Ok(())
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    /// Statements separated by `;` (or `,`), trailing separator allowed.
    fn parse_program(&mut self) -> Result<Expr, String> {
        let mut exprs = Vec::new();
        loop {
            while matches!(self.peek(), Token::Semi | Token::Comma) {
                self.pos += 1;
            }
            if self.peek() == &Token::Eof {
                break;
            }
            exprs.push(self.parse_assign()?);
            match self.peek() {
                Token::Semi | Token::Comma | Token::Eof => {}
                other => return Err(format!("unexpected {}", describe(other))),
            }
        }
        Ok(match exprs.len() {
            0 => Expr::Literal(Value::Undefined),
            1 => exprs.remove(0),
            _ => Expr::Sequence(exprs),
        })
    }

    fn parse_sequence(&mut self) -> Result<Expr, String> {
        let first = self.parse_assign()?;
        if self.peek() == &Token::Comma {
            let mut exprs = vec![first];
            while self.eat(&Token::Comma) {
                exprs.push(self.parse_assign()?);
            }
            Ok(Expr::Sequence(exprs))
        } else {
            Ok(first)
        }
    }

    fn parse_assign(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let result = self.parse_assign_inner();
        self.depth -= 1;
        result
    }

    fn parse_assign_inner(&mut self) -> Result<Expr, String> {
        if let Some(params) = self.arrow_params() {
            let body = self.parse_assign()?;
            return Ok(Expr::Arrow {
                params,
                body: Box::new(body),
            });
        }

        // Ident followed by an assignment operator.
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.peek_at(1) {
                Token::Assign => Some(AssignOp::Set),
                Token::PlusAssign => Some(AssignOp::Add),
                Token::MinusAssign => Some(AssignOp::Sub),
                Token::StarAssign => Some(AssignOp::Mul),
                Token::SlashAssign => Some(AssignOp::Div),
                Token::PercentAssign => Some(AssignOp::Rem),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 2;
                let rhs = self.parse_assign()?;
                return Ok(Expr::Assign(name, op, Box::new(rhs)));
            }
        }
        self.parse_ternary()
    }

    /// If an arrow function starts here, consume its parameter list and `=>`.
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        let first = self.peek().clone();
        match first {
            Token::Ident(name) if self.peek_at(1) == &Token::Arrow => {
                self.pos += 2;
                Some(vec![name])
            }
            Token::LParen => {
                let mut params = Vec::new();
                let mut i = 1;
                loop {
                    match self.peek_at(i).clone() {
                        Token::RParen => break,
                        Token::Ident(name) => {
                            params.push(name);
                            i += 1;
                            match self.peek_at(i) {
                                Token::Comma => i += 1,
                                Token::RParen => break,
                                _ => return None,
                            }
                        }
                        _ => return None,
                    }
                }
                if self.peek_at(i + 1) != &Token::Arrow {
                    return None;
                }
                self.pos += i + 2;
                Some(params)
            }
            _ => None,
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, String> {
        let cond = self.parse_nullish()?;
        if self.eat(&Token::Question) {
            let then = self.parse_assign()?;
            self.expect(&Token::Colon, "':' in ternary")?;
            let else_ = self.parse_assign()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_nullish(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_or()?;
        while self.eat(&Token::Nullish) {
            let rhs = self.parse_or()?;
            lhs = Expr::Binary(BinOp::Nullish, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::StrictEq => BinOp::StrictEq,
                Token::StrictNe => BinOp::StrictNe,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Ident(name) if name == "typeof" => UnaryOp::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        // Once `?.` appears, the rest of the chain short-circuits on nullish.
        let mut optional = false;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.pos += 1;
                    let property = self.property_name()?;
                    expr = Expr::Member { object: Box::new(expr), property, optional };
                }
                Token::QuestionDot => {
                    self.pos += 1;
                    optional = true;
                    expr = match self.peek() {
                        Token::LParen => {
                            self.pos += 1;
                            let args = self.parse_args(&Token::RParen)?;
                            Expr::Call { callee: Box::new(expr), args, optional }
                        }
                        Token::LBracket => {
                            self.pos += 1;
                            let index = self.parse_sequence()?;
                            self.expect(&Token::RBracket, "']'")?;
                            Expr::Index { object: Box::new(expr), index: Box::new(index), optional }
                        }
                        _ => {
                            let property = self.property_name()?;
                            Expr::Member { object: Box::new(expr), property, optional }
                        }
                    };
                }
                Token::LBracket => {
                    self.pos += 1;
                    let index = self.parse_sequence()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index { object: Box::new(expr), index: Box::new(index), optional };
                }
                Token::LParen => {
                    self.pos += 1;
                    let args = self.parse_args(&Token::RParen)?;
                    expr = Expr::Call { callee: Box::new(expr), args, optional };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn property_name(&mut self) -> Result<String, String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("expected property name, found {}", describe(&other))),
        }
    }

    /// Comma-separated expressions up to `close` (already past the opener).
    fn parse_args(&mut self, close: &Token) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        while self.peek() != close {
            args.push(self.parse_assign()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close, &describe(close))?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let result = self.parse_primary_inner();
        self.depth -= 1;
        result
    }

    fn parse_primary_inner(&mut self) -> Result<Expr, String> {
        let tok = self.advance();
        match tok {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Template(parts) => {
                let mut exprs = Vec::with_capacity(parts.len());
                for part in parts {
                    exprs.push(match part {
                        TemplatePart::Text(t) => Expr::Literal(Value::Str(t)),
                        TemplatePart::Code(code) => parse_expr(&code)?,
                    });
                }
                Ok(Expr::Template(exprs))
            }
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                "function" | "new" | "class" | "return" | "while" | "for" => {
                    return Err(format!("'{name}' is not supported in template expressions"));
                }
                _ => Expr::Var(name),
            }),
            Token::LParen => {
                let inner = self.parse_sequence()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Array(self.parse_args(&Token::RBracket)?)),
            Token::LBrace => self.parse_object(),
            other => Err(format!("unexpected {}", describe(&other))),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, String> {
        let mut fields = Vec::new();
        while self.peek() != &Token::RBrace {
            let key = match self.advance() {
                Token::Ident(k) | Token::Str(k) => k,
                Token::Int(n) => n.to_string(),
                other => return Err(format!("expected object key, found {}", describe(&other))),
            };
            let value = if self.eat(&Token::Colon) {
                self.parse_assign()?
            } else {
                Expr::Var(key.clone())
            };
            fields.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(Expr::Object(fields))
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Eof => "end of expression".into(),
        Token::Unknown(c) => format!("unexpected character '{c}'"),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Str(s) => format!("string \"{s}\""),
        Token::RParen => "')'".into(),
        Token::RBracket => "']'".into(),
        Token::RBrace => "'}'".into(),
        other => format!("{other:?}"),
    }
}

/// Parse a single expression (no top-level `;`).
pub fn parse_expr(src: &str) -> Result<Expr, String> {
    let tokens = Lexer::new(src).tokenize();
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_sequence()?;
    if parser.peek() != &Token::Eof {
        return Err(format!("unexpected {}", describe(parser.peek())));
    }
    Ok(expr)
}

/// Parse command code: one or more expressions separated by `;`.
pub fn parse_program(src: &str) -> Result<Expr, String> {
    let tokens = Lexer::new(src).tokenize();
    Parser::new(tokens).parse_program()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize()
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            tokens("a === b !== c ?? d"),
            vec![
                Token::Ident("a".into()),
                Token::StrictEq,
                Token::Ident("b".into()),
                Token::StrictNe,
                Token::Ident("c".into()),
                Token::Nullish,
                Token::Ident("d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lex_optional_chain_vs_ternary_decimal() {
        assert_eq!(tokens("a?.b")[1], Token::QuestionDot);
        assert_eq!(tokens("a?.5:1")[1], Token::Question);
    }

    #[test]
    fn lex_strings_and_unicode_identifiers() {
        assert_eq!(tokens("'it\\'s'")[0], Token::Str("it's".into()));
        assert_eq!(tokens("\"é\"")[0], Token::Str("é".into()));
        assert_eq!(tokens("$item")[0], Token::Ident("$item".into()));
        assert_eq!(tokens("größe")[0], Token::Ident("größe".into()));
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(tokens("42")[0], Token::Int(42));
        assert_eq!(tokens("2.5")[0], Token::Float(2.5));
        assert_eq!(tokens(".5")[0], Token::Float(0.5));
        assert_eq!(tokens("1e3")[0], Token::Float(1000.0));
        assert_eq!(tokens("0xff")[0], Token::Int(255));
    }

    #[test]
    fn parse_member_chain() {
        let e = parse_expr("a.b[0].c(1)").unwrap();
        assert!(matches!(e, Expr::Call { .. }));
    }

    #[test]
    fn parse_arrow_functions() {
        assert!(matches!(parse_expr("x => x.name").unwrap(), Expr::Arrow { ref params, .. } if params == &["x"]));
        assert!(matches!(parse_expr("(a, b) => a + b").unwrap(), Expr::Arrow { ref params, .. } if params.len() == 2));
        assert!(matches!(parse_expr("() => 1").unwrap(), Expr::Arrow { ref params, .. } if params.is_empty()));
        // A parenthesised expression is not an arrow.
        assert!(matches!(parse_expr("(a, b)").unwrap(), Expr::Sequence(_)));
    }

    #[test]
    fn parse_object_literal() {
        let e = parse_expr("{a: 1, 'b c': 2, d}").unwrap();
        match e {
            Expr::Object(fields) => {
                let keys: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, ["a", "b c", "d"]);
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn parse_program_statements() {
        assert!(matches!(parse_program("a = 1; b = 2;").unwrap(), Expr::Sequence(ref v) if v.len() == 2));
        assert!(matches!(parse_program("").unwrap(), Expr::Literal(Value::Undefined)));
    }

    #[test]
    fn parse_template_string() {
        assert!(matches!(parse_expr("`a ${b} c`").unwrap(), Expr::Template(ref p) if p.len() == 3));
    }

    #[test]
    fn parse_errors() {
        assert!(parse_expr("1 +").is_err());
        assert!(parse_expr("(1").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("new Date()").is_err());
        assert!(parse_expr("#").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let src = "(".repeat(500) + "1" + &")".repeat(500);
        assert!(parse_expr(&src).is_err());
    }
}
