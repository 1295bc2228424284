//! Condition expression parser.
//!
//! Recursive descent over a fixed grammar; nothing outside it is accepted.
//! Errors carry the character offset of the offending input.
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := equality ( "&&" equality )*
//! equality   := comparison ( ( "==" | "!=" ) comparison )*
//! comparison := additive ( ( ">=" | "<=" | ">" | "<" ) additive )*
//! additive   := term ( ( "+" | "-" ) term )*
//! term       := unary ( ( "*" | "/" ) unary )*
//! unary      := ( "!" | "-" ) unary | primary
//! primary    := number | "true" | "false" | identifier | "(" or ")"
//! ```

use crate::domain::condition::{BinaryOp, Expr, UnaryOp, Value};
use crate::domain::error::ParseError;

/// Nesting limit for parentheses and unary chains.
pub const MAX_DEPTH: usize = 64;

/// Limit on the height of the finished tree. Operator chains such as
/// `a + a + ...` nest without parentheses, so they are bounded here.
pub const MAX_HEIGHT: usize = 256;

/// A parsed subtree and its height.
struct Node {
    expr: Expr,
    height: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Node { expr, height: 1 }
    }

    fn new(expr: Expr, height: usize) -> Option<Self> {
        (height <= MAX_HEIGHT).then_some(Node { expr, height })
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(ch) => format!("'{}'", ch),
            None => "end of input".to_string(),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        self.skip_whitespace();
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}', found {}", expected, self.found()))),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {}", MAX_DEPTH)));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Joins two operands, refusing trees taller than [`MAX_HEIGHT`].
    fn join(&self, op: BinaryOp, left: Node, right: Node) -> Result<Node, ParseError> {
        Node::new(
            Expr::binary(op, left.expr, right.expr),
            1 + left.height.max(right.height),
        )
        .ok_or_else(|| self.error(format!("expression taller than {} operators", MAX_HEIGHT)))
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume_exact("||") {
            let right = self.parse_and()?;
            left = self.join(BinaryOp::Or, left, right)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_equality()?;
        while self.consume_exact("&&") {
            let right = self.parse_equality()?;
            left = self.join(BinaryOp::And, left, right)?;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.consume_exact("==") {
                BinaryOp::Eq
            } else if self.consume_exact("!=") {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = self.join(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.consume_exact(">=") {
                BinaryOp::Ge
            } else if self.consume_exact("<=") {
                BinaryOp::Le
            } else if self.consume_exact(">") {
                BinaryOp::Gt
            } else if self.consume_exact("<") {
                BinaryOp::Lt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = self.join(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.consume_exact("+") {
                BinaryOp::Add
            } else if self.consume_exact("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = self.join(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.consume_exact("*") {
                BinaryOp::Mul
            } else if self.consume_exact("/") {
                BinaryOp::Div
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = self.join(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let op = if self.remaining().starts_with('!') && !self.remaining().starts_with("!=") {
            UnaryOp::Not
        } else if self.remaining().starts_with('-') {
            UnaryOp::Neg
        } else {
            return self.parse_primary();
        };
        self.advance();
        self.enter()?;
        let inner = self.parse_unary()?;
        self.leave();
        let expr = Expr::Unary {
            op,
            expr: Box::new(inner.expr),
        };
        Node::new(expr, inner.height + 1)
            .ok_or_else(|| self.error(format!("expression taller than {} operators", MAX_HEIGHT)))
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.advance();
                self.enter()?;
                let node = self.parse_or()?;
                self.expect_char(')')?;
                self.leave();
                Ok(node)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number().map(Node::leaf),
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => Ok(Node::leaf(self.parse_word())),
            _ => Err(self.error(format!("expected expression, found {}", self.found()))),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map(Expr::number)
            .map_err(|_| ParseError {
                message: format!("invalid number: {}", num_str),
                position: start,
            })
    }

    fn parse_word(&mut self) -> Expr {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        match &self.input[start..self.pos] {
            "true" => Expr::Literal(Value::Bool(true)),
            "false" => Expr::Literal(Value::Bool(false)),
            word => Expr::Identifier(word.to_string()),
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let Node { expr, .. } = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
