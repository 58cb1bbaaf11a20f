//! Pratt parser producing the expression tree.
//!
//! Binding powers, lowest first: `? :`, `or`, `and`, comparisons, `&`,
//! `+ -`, `* / %`, unary `-`, `.` path steps, `[ ]` subscripts.

use serde_json::Value;

use super::functions::Function;
use super::lexer::{Spanned, Token};
use super::ExpressionError;

const MAX_DEPTH: usize = 128;

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `$`, the current context value.
    Context,
    /// `$$`, the input document.
    Root,
    /// Field lookup on the current context.
    Name(String),
    /// `a.b.c`: each step is evaluated against the previous result,
    /// mapping over arrays.
    Path(Vec<Expr>),
    /// `a[0]` or `a[price > 10]`.
    Subscript { base: Box<Expr>, selector: Box<Expr> },
    Object(Vec<(Expr, Expr)>),
    Array(Vec<Expr>),
    Negate(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Condition {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Call { function: Function, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn binding_power(self) -> u8 {
        match self {
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Concat => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 7,
        }
    }
}

const CONDITION_BP: u8 = 1;
const NEGATE_BP: u8 = 8;
const PATH_BP: u8 = 9;
const SUBSCRIPT_BP: u8 = 10;

/// Parse a token stream into a single expression.
pub fn parse(tokens: Vec<Spanned>) -> Result<Expr, ExpressionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.tokens.is_empty() {
        return Err(ExpressionError::compile(0, "empty expression"));
    }
    let expr = parser.expression(0)?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::compile(
            extra.position,
            format!("unexpected token {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let position = self.position();
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(ExpressionError::compile(
                position,
                format!("expected {:?}, found {:?}", expected, t),
            )),
            None => Err(ExpressionError::compile(
                position,
                format!("expected {:?}, found end of expression", expected),
            )),
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::compile(self.position(), "expression nested too deeply"));
        }
        let result = self.expression_inner(min_bp);
        self.depth -= 1;
        result
    }

    fn expression_inner(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        let mut lhs = self.prefix()?;

        loop {
            let Some(token) = self.peek().cloned() else { break };

            match &token {
                Token::Question => {
                    if CONDITION_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let then = self.expression(0)?;
                    let otherwise = if self.peek() == Some(&Token::Colon) {
                        self.advance();
                        Some(Box::new(self.expression(CONDITION_BP)?))
                    } else {
                        None
                    };
                    lhs = Expr::Condition {
                        test: Box::new(lhs),
                        then: Box::new(then),
                        otherwise,
                    };
                }
                Token::Dot => {
                    if PATH_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let step = self.expression(SUBSCRIPT_BP)?;
                    lhs = match lhs {
                        Expr::Path(mut steps) => {
                            steps.push(step);
                            Expr::Path(steps)
                        }
                        other => Expr::Path(vec![other, step]),
                    };
                }
                Token::LBracket => {
                    if SUBSCRIPT_BP < min_bp {
                        break;
                    }
                    self.advance();
                    let selector = self.expression(0)?;
                    self.expect(Token::RBracket)?;
                    lhs = Expr::Subscript {
                        base: Box::new(lhs),
                        selector: Box::new(selector),
                    };
                }
                other => {
                    let Some(op) = binary_op(other) else { break };
                    let bp = op.binding_power();
                    if bp < min_bp {
                        break;
                    }
                    self.advance();
                    let rhs = self.expression(bp + 1)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                }
            }
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        let token = self
            .advance()
            .ok_or_else(|| ExpressionError::compile(position, "unexpected end of expression"))?;

        match token {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ExpressionError::compile(position, "number out of range")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Name(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Name(name),
            }),
            Token::Var(name) if name.is_empty() => Ok(Expr::Context),
            Token::Var(name) if name == "$" => Ok(Expr::Root),
            Token::Var(name) => self.call(name, position),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => self.object(),
            Token::LBracket => self.array(),
            Token::Minus => {
                let inner = self.expression(NEGATE_BP)?;
                // Fold negative literals so `items[-1]` stays a positional subscript.
                if let Expr::Literal(Value::Number(n)) = &inner {
                    if let Some(i) = n.as_i64() {
                        return Ok(Expr::Literal(Value::from(-i)));
                    }
                    if let Some(f) = n.as_f64().and_then(|f| serde_json::Number::from_f64(-f)) {
                        return Ok(Expr::Literal(Value::Number(f)));
                    }
                }
                Ok(Expr::Negate(Box::new(inner)))
            }
            other => Err(ExpressionError::compile(position, format!("unexpected token {:?}", other))),
        }
    }

    fn call(&mut self, name: String, position: usize) -> Result<Expr, ExpressionError> {
        if self.peek() != Some(&Token::LParen) {
            return Err(ExpressionError::compile(position, format!("unbound variable ${}", name)));
        }
        let function = Function::from_name(&name)
            .ok_or_else(|| ExpressionError::compile(position, format!("unknown function ${}", name)))?;
        self.advance();

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.expression(0)?);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(ExpressionError::compile(self.position(), "expected ',' or ')' in arguments")),
                }
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(ExpressionError::compile(
                position,
                format!("${} takes {}..={} arguments, got {}", function.name(), min, max, args.len()),
            ));
        }
        Ok(Expr::Call { function, args })
    }

    fn object(&mut self) -> Result<Expr, ExpressionError> {
        let mut pairs = Vec::new();
        if self.peek() == Some(&Token::RBrace) {
            self.advance();
            return Ok(Expr::Object(pairs));
        }
        loop {
            let key = self.expression(0)?;
            self.expect(Token::Colon)?;
            let value = self.expression(0)?;
            pairs.push((key, value));
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBrace) => break,
                _ => return Err(ExpressionError::compile(self.position(), "expected ',' or '}' in object")),
            }
        }
        Ok(Expr::Object(pairs))
    }

    fn array(&mut self) -> Result<Expr, ExpressionError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(Expr::Array(items));
        }
        loop {
            items.push(self.expression(0)?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err(ExpressionError::compile(self.position(), "expected ',' or ']' in array")),
            }
        }
        Ok(Expr::Array(items))
    }
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Name(n) if n == "or" => BinaryOp::Or,
        Token::Name(n) if n == "and" => BinaryOp::And,
        Token::Eq => BinaryOp::Eq,
        Token::NotEq => BinaryOp::NotEq,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
        Token::Amp => BinaryOp::Concat,
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Rem,
        _ => return None,
    })
}
