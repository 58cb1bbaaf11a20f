//! Expression language capability.
//!
//! # Data Flow
//! ```text
//! source text
//!     → lexer.rs (tokens)
//!     → parser.rs (Expr tree, function names checked)
//!     → Program (compiled, shareable)
//!     → eval.rs (walks the tree against a JSON input)
//! ```
//!
//! # Design Decisions
//! - The rest of the gateway only sees `ExpressionCompiler` / `CompiledExpression`;
//!   the built-in language can be swapped for any other engine
//! - Compiled programs are immutable and `Send + Sync` so they can live in a
//!   shared cache and run on blocking worker threads
//! - Evaluation polls an `Interrupt` flag so a timed-out run stops cooperatively

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use self::parser::Expr;

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    /// Source text could not be compiled.
    #[error("Compile error at position {position}: {message}")]
    Compile { position: usize, message: String },

    /// Evaluation failed against the given input.
    #[error("Evaluation error: {0}")]
    Evaluate(String),

    /// Evaluation was interrupted before it finished.
    #[error("Evaluation interrupted")]
    Interrupted,
}

impl ExpressionError {
    pub(crate) fn compile(position: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn evaluate(message: impl Into<String>) -> Self {
        Self::Evaluate(message.into())
    }
}

/// Cooperative cancellation flag shared between a caller and a running evaluation.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the evaluation holding this flag to stop.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A compiled, ready-to-run expression.
pub trait CompiledExpression: Send + Sync {
    /// Evaluate against `input`. Implementations that cannot be preempted may
    /// ignore `interrupt`.
    fn evaluate(&self, input: &Value, interrupt: &Interrupt) -> Result<Value, ExpressionError>;
}

/// Turns expression source text into a `CompiledExpression`.
pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError>;
}

/// Compiler for the built-in JSON transformation language.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler;

impl ExpressionCompiler for Compiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        let program = Program::compile(source)?;
        Ok(Arc::new(program))
    }
}

/// A parsed expression tree.
#[derive(Debug, Clone)]
pub struct Program {
    root: Expr,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let tokens = lexer::tokenize(source)?;
        let root = parser::parse(tokens)?;
        Ok(Self { root })
    }
}

impl CompiledExpression for Program {
    fn evaluate(&self, input: &Value, interrupt: &Interrupt) -> Result<Value, ExpressionError> {
        let result = eval::Evaluator::new(input, interrupt).run(&self.root)?;
        // Undefined at the top level surfaces as null.
        Ok(result.unwrap_or(Value::Null))
    }
}
