//! Tree-walking evaluator.
//!
//! Results are `Option<Value>`; `None` is "undefined" (a missing field),
//! which is distinct from JSON `null`. Undefined values are dropped from
//! object and array constructors.

use serde_json::{Map, Number, Value};

use super::functions::{self, type_name};
use super::parser::{BinaryOp, Expr};
use super::{ExpressionError, Interrupt};

type EvalResult = Result<Option<Value>, ExpressionError>;

/// Evaluates an expression tree against one input document.
pub struct Evaluator<'a> {
    root: &'a Value,
    interrupt: &'a Interrupt,
}

impl<'a> Evaluator<'a> {
    pub fn new(root: &'a Value, interrupt: &'a Interrupt) -> Self {
        Self { root, interrupt }
    }

    pub fn run(&self, expr: &Expr) -> EvalResult {
        self.eval(expr, self.root)
    }

    fn eval(&self, expr: &Expr, ctx: &Value) -> EvalResult {
        if self.interrupt.is_triggered() {
            return Err(ExpressionError::Interrupted);
        }

        match expr {
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Context => Ok(Some(ctx.clone())),
            Expr::Root => Ok(Some(self.root.clone())),
            Expr::Name(name) => Ok(lookup_field(ctx, name)),
            Expr::Path(steps) => self.eval_path(steps, ctx),
            Expr::Subscript { base, selector } => self.eval_subscript(base, selector, ctx),
            Expr::Object(pairs) => {
                let mut map = Map::new();
                for (key_expr, value_expr) in pairs {
                    let key = match self.eval(key_expr, ctx)? {
                        Some(Value::String(s)) => s,
                        Some(other) => {
                            return Err(ExpressionError::evaluate(format!(
                                "object key must be a string, got {}",
                                type_name(&other)
                            )))
                        }
                        None => return Err(ExpressionError::evaluate("object key is undefined")),
                    };
                    if let Some(value) = self.eval(value_expr, ctx)? {
                        map.insert(key, value);
                    }
                }
                Ok(Some(Value::Object(map)))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.eval(item, ctx)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Expr::Negate(inner) => match self.eval(inner, ctx)? {
                None => Ok(None),
                Some(v) => {
                    let n = v
                        .as_f64()
                        .ok_or_else(|| ExpressionError::evaluate(format!("cannot negate {}", type_name(&v))))?;
                    number_value(-n).map(Some)
                }
            },
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx),
            Expr::Condition { test, then, otherwise } => {
                let test = self.eval(test, ctx)?;
                if truthy(test.as_ref()) {
                    self.eval(then, ctx)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, ctx)
                } else {
                    Ok(None)
                }
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, ctx)?);
                }
                functions::call(*function, values)
            }
        }
    }

    fn eval_path(&self, steps: &[Expr], ctx: &Value) -> EvalResult {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(None);
        };
        let mut current = self.eval(first, ctx)?;

        for step in rest {
            current = match current {
                None => return Ok(None),
                Some(Value::Array(items)) => {
                    let flatten = matches!(step, Expr::Name(_));
                    let mut out = Vec::new();
                    for item in &items {
                        match self.eval(step, item)? {
                            Some(Value::Array(inner)) if flatten => out.extend(inner),
                            Some(v) => out.push(v),
                            None => {}
                        }
                    }
                    if out.is_empty() {
                        None
                    } else {
                        Some(Value::Array(out))
                    }
                }
                Some(v) => self.eval(step, &v)?,
            };
        }

        Ok(current)
    }

    fn eval_subscript(&self, base: &Expr, selector: &Expr, ctx: &Value) -> EvalResult {
        let Some(base) = self.eval(base, ctx)? else {
            return Ok(None);
        };
        let was_array = base.is_array();
        let items = match base {
            Value::Array(items) => items,
            other => vec![other],
        };

        // A literal number selects by position; negative counts from the end.
        if let Expr::Literal(Value::Number(n)) = selector {
            return Ok(n.as_f64().and_then(|f| index_into(&items, f)));
        }

        let mut selected = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match self.eval(selector, item)? {
                Some(Value::Number(n)) => {
                    if n.as_f64().and_then(|f| normalize_index(items.len(), f)) == Some(index) {
                        selected.push(item.clone());
                    }
                }
                other => {
                    if truthy(other.as_ref()) {
                        selected.push(item.clone());
                    }
                }
            }
        }

        Ok(match (was_array, selected.len()) {
            (_, 0) => None,
            (false, 1) => selected.pop(),
            _ => Some(Value::Array(selected)),
        })
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &Value) -> EvalResult {
        match op {
            BinaryOp::And => {
                let left = self.eval(lhs, ctx)?;
                if !truthy(left.as_ref()) {
                    return Ok(Some(Value::Bool(false)));
                }
                let right = self.eval(rhs, ctx)?;
                return Ok(Some(Value::Bool(truthy(right.as_ref()))));
            }
            BinaryOp::Or => {
                let left = self.eval(lhs, ctx)?;
                if truthy(left.as_ref()) {
                    return Ok(Some(Value::Bool(true)));
                }
                let right = self.eval(rhs, ctx)?;
                return Ok(Some(Value::Bool(truthy(right.as_ref()))));
            }
            _ => {}
        }

        let left = self.eval(lhs, ctx)?;
        let right = self.eval(rhs, ctx)?;

        match op {
            BinaryOp::Concat => {
                let mut s = stringify(left.as_ref());
                s.push_str(&stringify(right.as_ref()));
                Ok(Some(Value::String(s)))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let equal = match (&left, &right) {
                    (Some(l), Some(r)) => values_equal(l, r),
                    _ => false,
                };
                let result = if op == BinaryOp::Eq { equal } else { !equal && left.is_some() && right.is_some() };
                Ok(Some(Value::Bool(result)))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (Some(l), Some(r)) = (left, right) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let ordering = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                }
                .ok_or_else(|| {
                    ExpressionError::evaluate(format!(
                        "cannot compare {} with {}",
                        type_name(&l),
                        type_name(&r)
                    ))
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Some(Value::Bool(result)))
            }
            _ => {
                let (Some(l), Some(r)) = (left, right) else {
                    return Ok(None);
                };
                let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                    return Err(ExpressionError::evaluate(format!(
                        "arithmetic on non-numeric operands ({} and {})",
                        type_name(&l),
                        type_name(&r)
                    )));
                };
                let value = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
                        return Err(ExpressionError::evaluate("division by zero"));
                    }
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                number_value(value).map(Some)
            }
        }
    }
}

fn lookup_field(ctx: &Value, name: &str) -> Option<Value> {
    match ctx {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match lookup_field(item, name) {
                    Some(Value::Array(inner)) => out.extend(inner),
                    Some(v) => out.push(v),
                    None => {}
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Value::Array(out))
            }
        }
        _ => None,
    }
}

fn normalize_index(len: usize, index: f64) -> Option<usize> {
    let index = index.floor() as i64;
    let resolved = if index < 0 { len as i64 + index } else { index };
    (resolved >= 0 && (resolved as usize) < len).then_some(resolved as usize)
}

fn index_into(items: &[Value], index: f64) -> Option<Value> {
    normalize_index(items.len(), index).map(|i| items[i].clone())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Boolean interpretation of a value; undefined is false.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => items.iter().any(|v| truthy(Some(v))),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// String form used by `&` and `$string`; undefined is empty.
pub(crate) fn stringify(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Convert an arithmetic result back into JSON, keeping integers integral.
pub(crate) fn number_value(f: f64) -> Result<Value, ExpressionError> {
    if !f.is_finite() {
        return Err(ExpressionError::evaluate("numeric result is not finite"));
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::evaluate("numeric result is not representable"))
}
