//! Recursive-descent parser producing the expression AST.

use super::lexer::{Token, TokenKind, tokenize};
use super::ExprError;

/// Expression AST. Every node carries the byte offset it started at so
/// runtime errors can point back into the source.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number {
        value: f64,
        offset: usize,
    },
    Str {
        value: String,
        offset: usize,
    },
    Bool {
        value: bool,
        offset: usize,
    },
    Null {
        offset: usize,
    },
    /// Bare identifier, resolved through the execution context.
    Ident {
        name: String,
        offset: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        offset: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        offset: usize,
    },
    /// `object.property`
    Member {
        object: Box<Expr>,
        property: String,
        offset: usize,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        offset: usize,
    },
    /// `name(args...)` or `receiver.name(args...)`; the receiver becomes
    /// the first argument.
    Call {
        name: String,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
        offset: usize,
    },
}

impl Expr {
    /// Offset of the source position this expression started at.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Expr::Number { offset, .. }
            | Expr::Str { offset, .. }
            | Expr::Bool { offset, .. }
            | Expr::Null { offset }
            | Expr::Ident { offset, .. }
            | Expr::Unary { offset, .. }
            | Expr::Binary { offset, .. }
            | Expr::Member { offset, .. }
            | Expr::Index { offset, .. }
            | Expr::Call { offset, .. } => *offset,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Parse a complete expression; trailing tokens are an error.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end_offset: source.len(),
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken {
            expected: "end of expression".to_string(),
            offset: token.offset,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_offset: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ExprError> {
        match self.peek() {
            Some(token) if token.kind == *kind => Ok(self.advance().expect("peeked")),
            Some(token) => Err(ExprError::UnexpectedToken {
                expected: kind.describe().to_string(),
                offset: token.offset,
            }),
            None => Err(ExprError::UnexpectedEnd {
                offset: self.end_offset,
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(t) if t.kind == TokenKind::OrOr) {
            let op_offset = self.advance().expect("peeked").offset;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset: op_offset,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        while matches!(self.peek(), Some(t) if t.kind == TokenKind::AndAnd) {
            let op_offset = self.advance().expect("peeked").offset;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset: op_offset,
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::NotEq,
                Some(TokenKind::Greater) => BinaryOp::Greater,
                Some(TokenKind::GreaterEq) => BinaryOp::GreaterEq,
                Some(TokenKind::Less) => BinaryOp::Less,
                Some(TokenKind::LessEq) => BinaryOp::LessEq,
                _ => break,
            };
            let op_offset = self.advance().expect("peeked").offset;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset: op_offset,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let op_offset = self.advance().expect("peeked").offset;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset: op_offset,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            let op_offset = self.advance().expect("peeked").offset;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                offset: op_offset,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let offset = self.advance().expect("peeked").offset;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                offset,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    let dot_offset = self.advance().expect("peeked").offset;
                    let token = self.advance().ok_or(ExprError::UnexpectedEnd {
                        offset: self.end_offset,
                    })?;
                    let property = match token.kind {
                        TokenKind::Ident(name) => name,
                        // Allow keywords after a dot: `config.true` is a key.
                        TokenKind::True => "true".to_string(),
                        TokenKind::False => "false".to_string(),
                        TokenKind::Null => "null".to_string(),
                        _ => {
                            return Err(ExprError::UnexpectedToken {
                                expected: "property name".to_string(),
                                offset: token.offset,
                            });
                        }
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        offset: dot_offset,
                    };
                }
                Some(TokenKind::LBracket) => {
                    let bracket_offset = self.advance().expect("peeked").offset;
                    let index = self.parse_or()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        offset: bracket_offset,
                    };
                }
                Some(TokenKind::LParen) => {
                    let paren_offset = self.advance().expect("peeked").offset;
                    let args = self.parse_args()?;
                    expr = match expr {
                        Expr::Ident { name, offset } => Expr::Call {
                            name,
                            receiver: None,
                            args,
                            offset,
                        },
                        Expr::Member {
                            object, property, ..
                        } => Expr::Call {
                            name: property,
                            receiver: Some(object),
                            args,
                            offset: paren_offset,
                        },
                        _ => {
                            return Err(ExprError::InvalidCallee {
                                offset: paren_offset,
                            });
                        }
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(t) if t.kind == TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Comma) => {
                    self.advance();
                }
                Some(TokenKind::RParen) => {
                    self.advance();
                    return Ok(args);
                }
                Some(other) => {
                    let offset = self.peek().expect("peeked").offset;
                    return Err(ExprError::UnexpectedToken {
                        expected: format!("',' or ')' (found {})", other.describe()),
                        offset,
                    });
                }
                None => {
                    return Err(ExprError::UnexpectedEnd {
                        offset: self.end_offset,
                    });
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance().ok_or(ExprError::UnexpectedEnd {
            offset: self.end_offset,
        })?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number {
                value,
                offset: token.offset,
            }),
            TokenKind::Str(value) => Ok(Expr::Str {
                value,
                offset: token.offset,
            }),
            TokenKind::True => Ok(Expr::Bool {
                value: true,
                offset: token.offset,
            }),
            TokenKind::False => Ok(Expr::Bool {
                value: false,
                offset: token.offset,
            }),
            TokenKind::Null => Ok(Expr::Null {
                offset: token.offset,
            }),
            TokenKind::Ident(name) => Ok(Expr::Ident {
                name,
                offset: token.offset,
            }),
            TokenKind::LParen => {
                let expr = self.parse_or()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            other => Err(ExprError::UnexpectedToken {
                expected: format!("expression (found {})", other.describe()),
                offset: token.offset,
            }),
        }
    }
}
