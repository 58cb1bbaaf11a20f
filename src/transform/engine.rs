//! Transformation engine.
//!
//! # Responsibilities
//! - Compile expression sources, reusing cached programs
//! - Evaluate a program against a JSON payload under a deadline
//! - Report every outcome as data, never as a thrown error
//!
//! # Data Flow
//! ```text
//! transform(input, expression, context)
//!     → "$"?            → succeed with input (no compile, no evaluate)
//!     → cache lookup    → miss: compile, store on success only
//!     → blocking worker → evaluate, racing the deadline
//!     → outcome         (success + output | failure + original input)
//! ```
//!
//! # Design Decisions
//! - On deadline the interrupt flag is raised and the worker is abandoned;
//!   the built-in evaluator observes the flag and unwinds shortly after
//! - Compile errors are not cached so a corrected document recovers at once

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cache::ExpressionCache;
use super::types::{TransformContext, TransformMetrics, TransformationExpression, TransformationOutcome};
use crate::expression::{CompiledExpression, Compiler, ExpressionCompiler, ExpressionError, Interrupt};
use crate::observability::metrics;
use crate::resilience::timeouts::{run_blocking_with_deadline, TimeoutError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

pub struct TransformationEngine {
    compiler: Arc<dyn ExpressionCompiler>,
    cache: ExpressionCache,
    default_timeout: Duration,
}

impl TransformationEngine {
    pub fn new(compiler: Arc<dyn ExpressionCompiler>, cache_capacity: usize, default_timeout: Duration) -> Self {
        Self {
            compiler,
            cache: ExpressionCache::new(cache_capacity),
            default_timeout,
        }
    }

    /// Engine backed by the built-in expression language.
    pub fn builtin(cache_capacity: usize, default_timeout: Duration) -> Self {
        Self::new(Arc::new(Compiler), cache_capacity, default_timeout)
    }

    /// Apply `expression` to `input`.
    ///
    /// Always returns; failures carry the original input back in `data`.
    pub async fn transform(
        &self,
        input: Value,
        expression: &TransformationExpression,
        context: &TransformContext,
    ) -> TransformationOutcome {
        let start = Instant::now();

        if expression.is_identity() {
            return TransformationOutcome::succeeded(input, self.finish(start, context, "identity"));
        }

        let compiled = match self.compiled(&expression.source, expression.cache_ttl()) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::warn!(
                    from = %context.from_version,
                    to = %context.to_version,
                    direction = %context.direction,
                    error = %e,
                    "Expression failed to compile"
                );
                return TransformationOutcome::failed(input, e.to_string(), self.finish(start, context, "compile_error"));
            }
        };

        let deadline = context.timeout.unwrap_or(self.default_timeout);
        let interrupt = Interrupt::new();
        let shared = Arc::new(input);

        let result = {
            let shared = Arc::clone(&shared);
            let interrupt = interrupt.clone();
            run_blocking_with_deadline(deadline, move || compiled.evaluate(&shared, &interrupt)).await
        };

        // The worker may still hold its clone after a timeout.
        let original = Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone());

        match result {
            Ok(Ok(output)) => TransformationOutcome::succeeded(output, self.finish(start, context, "success")),
            Ok(Err(e)) => {
                tracing::warn!(
                    from = %context.from_version,
                    to = %context.to_version,
                    direction = %context.direction,
                    error = %e,
                    "Expression evaluation failed"
                );
                TransformationOutcome::failed(original, e.to_string(), self.finish(start, context, "error"))
            }
            Err(TimeoutError::Elapsed(_)) => {
                interrupt.trigger();
                tracing::warn!(
                    from = %context.from_version,
                    to = %context.to_version,
                    direction = %context.direction,
                    timeout_ms = deadline.as_millis() as u64,
                    "Transformation timed out"
                );
                TransformationOutcome::failed(
                    original,
                    format!("Transformation timeout after {}ms", deadline.as_millis()),
                    self.finish(start, context, "timeout"),
                )
            }
            Err(TimeoutError::Worker(message)) => {
                tracing::error!(error = %message, "Transformation worker failed");
                TransformationOutcome::failed(
                    original,
                    format!("Transformation failed: {}", message),
                    self.finish(start, context, "error"),
                )
            }
        }
    }

    fn compiled(&self, source: &str, ttl: Duration) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        if let Some(compiled) = self.cache.get(source) {
            return Ok(compiled);
        }
        let compiled = self.compiler.compile(source)?;
        self.cache.put(source, Arc::clone(&compiled), ttl);
        Ok(compiled)
    }

    fn finish(&self, start: Instant, context: &TransformContext, outcome: &'static str) -> TransformMetrics {
        let elapsed = start.elapsed();
        metrics::record_transformation(context.direction.as_str(), outcome, elapsed);
        tracing::debug!(
            from = %context.from_version,
            to = %context.to_version,
            direction = %context.direction,
            outcome,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Transformation finished"
        );
        TransformMetrics {
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            from_version: context.from_version.clone(),
            to_version: context.to_version.clone(),
            direction: context.direction,
        }
    }

    /// Custom functions cannot be added to the built-in language; the call
    /// is accepted and logged so callers written against a pluggable
    /// engine keep working.
    pub fn register_function(&self, name: &str) {
        tracing::warn!(function = name, "Custom function registration is not supported; ignoring");
    }

    pub fn cache_size(&self) -> usize {
        self.cache.size()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("Expression cache cleared");
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

impl Default for TransformationEngine {
    fn default() -> Self {
        Self::builtin(super::cache::DEFAULT_CAPACITY, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::types::Direction;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request_context() -> TransformContext {
        TransformContext::new("v1", "v2", Direction::Request)
    }

    /// Counts compilations and delegates to the built-in compiler.
    #[derive(Default)]
    struct CountingCompiler {
        compiles: AtomicUsize,
    }

    impl ExpressionCompiler for CountingCompiler {
        fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Compiler.compile(source)
        }
    }

    /// Program that sleeps, ignoring interrupts.
    struct Sleepy(Duration);

    impl CompiledExpression for Sleepy {
        fn evaluate(&self, input: &Value, _interrupt: &Interrupt) -> Result<Value, ExpressionError> {
            std::thread::sleep(self.0);
            Ok(input.clone())
        }
    }

    struct SlowCompiler(Duration);

    impl ExpressionCompiler for SlowCompiler {
        fn compile(&self, _source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
            Ok(Arc::new(Sleepy(self.0)))
        }
    }

    #[tokio::test]
    async fn test_field_mapping() {
        let engine = TransformationEngine::default();
        let outcome = engine
            .transform(
                json!({"user_id": 42, "full_name": "Ada"}),
                &TransformationExpression::new(r#"{"id": user_id, "name": full_name}"#),
                &request_context(),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.data, json!({"id": 42, "name": "Ada"}));
        let metrics = outcome.metrics.unwrap();
        assert_eq!(metrics.from_version, "v1");
        assert_eq!(metrics.to_version, "v2");
        assert_eq!(metrics.direction, Direction::Request);
        assert!(metrics.duration_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_identity_skips_compilation() {
        let compiler = Arc::new(CountingCompiler::default());
        let engine = TransformationEngine::new(compiler.clone(), 10, DEFAULT_TIMEOUT);
        let input = json!({"anything": [1, 2, 3]});

        let outcome = engine
            .transform(input.clone(), &TransformationExpression::identity(), &request_context())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.data, input);
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 0);
        assert_eq!(engine.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_compiled_program_is_reused() {
        let compiler = Arc::new(CountingCompiler::default());
        let engine = TransformationEngine::new(compiler.clone(), 10, DEFAULT_TIMEOUT);
        let expression = TransformationExpression::new("{\"n\": n + 1}");

        for n in 0..3 {
            let outcome = engine.transform(json!({"n": n}), &expression, &request_context()).await;
            assert_eq!(outcome.data, json!({"n": n + 1}));
        }
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cache_size(), 1);
    }

    #[tokio::test]
    async fn test_compile_error_returns_original_and_is_not_cached() {
        let engine = TransformationEngine::default();
        let input = json!({"a": 1});

        let outcome = engine
            .transform(input.clone(), &TransformationExpression::new("{\"a\": "), &request_context())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.data, input);
        assert!(outcome.error.unwrap().starts_with("Compile error"));
        assert_eq!(engine.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_evaluation_error_returns_original() {
        let engine = TransformationEngine::default();
        let input = json!({"a": "text"});

        let outcome = engine
            .transform(input.clone(), &TransformationExpression::new("a * 2"), &request_context())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.data, input);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_reports_failure() {
        let engine = TransformationEngine::new(
            Arc::new(SlowCompiler(Duration::from_millis(300))),
            10,
            Duration::from_millis(20),
        );
        let input = json!({"slow": true});
        let start = Instant::now();

        let outcome = engine
            .transform(input.clone(), &TransformationExpression::new("anything"), &request_context())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.data, input);
        assert_eq!(outcome.error.as_deref(), Some("Transformation timeout after 20ms"));
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_context_timeout_overrides_default() {
        let engine = TransformationEngine::new(
            Arc::new(SlowCompiler(Duration::from_millis(30))),
            10,
            Duration::from_millis(5),
        );
        let context = request_context().with_timeout(Duration::from_millis(1000));

        let outcome = engine
            .transform(json!(1), &TransformationExpression::new("anything"), &context)
            .await;

        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_long_shared_prefix_uses_distinct_programs() {
        let engine = TransformationEngine::default();
        let padding = format!("/*{}*/", "x".repeat(150));
        let first = TransformationExpression::new(format!("{} \"first\"", padding));
        let second = TransformationExpression::new(format!("{} \"second\"", padding));

        let a = engine.transform(json!({}), &first, &request_context()).await;
        let b = engine.transform(json!({}), &second, &request_context()).await;

        assert_eq!(a.data, json!("first"));
        assert_eq!(b.data, json!("second"));
        assert_eq!(engine.cache_size(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_and_register_function() {
        let engine = TransformationEngine::default();
        engine
            .transform(json!({"a": 1}), &TransformationExpression::new("a"), &request_context())
            .await;
        assert_eq!(engine.cache_size(), 1);

        engine.register_function("custom");
        engine.clear_cache();
        assert_eq!(engine.cache_size(), 0);
        assert_eq!(engine.cache_capacity(), super::super::cache::DEFAULT_CAPACITY);
    }
}
