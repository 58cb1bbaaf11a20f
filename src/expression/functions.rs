//! Built-in function library.
//!
//! The set is fixed at compile time. Registering additional functions at
//! runtime is not supported.

use serde_json::{Map, Value};

use super::eval::{number_value, stringify, truthy};
use super::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    String,
    Number,
    Boolean,
    Not,
    Exists,
    Uppercase,
    Lowercase,
    Trim,
    Length,
    Substring,
    Join,
    Split,
    Contains,
    Count,
    Sum,
    Keys,
    Merge,
    Append,
    Lookup,
    Type,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Function::String,
            "number" => Function::Number,
            "boolean" => Function::Boolean,
            "not" => Function::Not,
            "exists" => Function::Exists,
            "uppercase" => Function::Uppercase,
            "lowercase" => Function::Lowercase,
            "trim" => Function::Trim,
            "length" => Function::Length,
            "substring" => Function::Substring,
            "join" => Function::Join,
            "split" => Function::Split,
            "contains" => Function::Contains,
            "count" => Function::Count,
            "sum" => Function::Sum,
            "keys" => Function::Keys,
            "merge" => Function::Merge,
            "append" => Function::Append,
            "lookup" => Function::Lookup,
            "type" => Function::Type,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::String => "string",
            Function::Number => "number",
            Function::Boolean => "boolean",
            Function::Not => "not",
            Function::Exists => "exists",
            Function::Uppercase => "uppercase",
            Function::Lowercase => "lowercase",
            Function::Trim => "trim",
            Function::Length => "length",
            Function::Substring => "substring",
            Function::Join => "join",
            Function::Split => "split",
            Function::Contains => "contains",
            Function::Count => "count",
            Function::Sum => "sum",
            Function::Keys => "keys",
            Function::Merge => "merge",
            Function::Append => "append",
            Function::Lookup => "lookup",
            Function::Type => "type",
        }
    }

    /// Accepted argument count range (inclusive).
    pub fn arity(self) -> (usize, usize) {
        match self {
            Function::Substring => (2, 3),
            Function::Join => (1, 2),
            Function::Split | Function::Contains | Function::Append | Function::Lookup => (2, 2),
            _ => (1, 1),
        }
    }
}

/// Invoke `function` on already-evaluated arguments (`None` = undefined).
pub fn call(function: Function, mut args: Vec<Option<Value>>) -> Result<Option<Value>, ExpressionError> {
    // Arity is enforced by the parser; pad so indexing below is safe.
    args.resize(3, None);
    let mut args = args.into_iter();
    let a = args.next().flatten();
    let b = args.next().flatten();
    let c = args.next().flatten();

    match function {
        Function::String => Ok(a.map(|v| match v {
            Value::String(s) => Value::String(s),
            other => Value::String(stringify(Some(&other))),
        })),
        Function::Number => match a {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(Value::Number(n))),
            Some(Value::Bool(b)) => Ok(Some(Value::from(u8::from(b)))),
            Some(Value::String(s)) => {
                let parsed: f64 = s
                    .trim()
                    .parse()
                    .map_err(|_| ExpressionError::evaluate(format!("cannot convert '{}' to a number", s)))?;
                number_value(parsed).map(Some)
            }
            Some(other) => Err(ExpressionError::evaluate(format!(
                "cannot convert {} to a number",
                type_name(&other)
            ))),
        },
        Function::Boolean => Ok(a.map(|v| Value::Bool(truthy(Some(&v))))),
        Function::Not => Ok(Some(Value::Bool(!truthy(a.as_ref())))),
        Function::Exists => Ok(Some(Value::Bool(a.is_some()))),
        Function::Uppercase => map_string(a, "uppercase", |s| s.to_uppercase()),
        Function::Lowercase => map_string(a, "lowercase", |s| s.to_lowercase()),
        Function::Trim => map_string(a, "trim", |s| s.trim().to_string()),
        Function::Length => match a {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(Value::from(s.chars().count()))),
            Some(other) => Err(expect_string("length", &other)),
        },
        Function::Substring => {
            let s = match a {
                None => return Ok(None),
                Some(Value::String(s)) => s,
                Some(other) => return Err(expect_string("substring", &other)),
            };
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = integer_arg(b.as_ref(), "substring")?;
            let start = if start < 0 { len.saturating_add(start).max(0) } else { start.min(len) };
            let end = match c {
                Some(ref v) => start.saturating_add(integer_arg(Some(v), "substring")?.max(0)).min(len),
                None => len,
            };
            Ok(Some(Value::String(chars[start as usize..end as usize].iter().collect())))
        }
        Function::Join => {
            let separator = match b {
                None => String::new(),
                Some(Value::String(s)) => s,
                Some(other) => return Err(expect_string("join", &other)),
            };
            match a {
                None => Ok(None),
                Some(Value::Array(items)) => {
                    let parts = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => Ok(s),
                            other => Err(expect_string("join", &other)),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Some(Value::String(parts.join(&separator))))
                }
                Some(Value::String(s)) => Ok(Some(Value::String(s))),
                Some(other) => Err(expect_string("join", &other)),
            }
        }
        Function::Split => match (a, b) {
            (None, _) => Ok(None),
            (Some(Value::String(s)), Some(Value::String(sep))) => Ok(Some(Value::Array(
                s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect(),
            ))),
            (Some(Value::String(_)), _) => Err(ExpressionError::evaluate("$split expects a string separator")),
            (Some(other), _) => Err(expect_string("split", &other)),
        },
        Function::Contains => match (a, b) {
            (None, _) => Ok(None),
            (Some(Value::String(s)), Some(Value::String(needle))) => {
                Ok(Some(Value::Bool(s.contains(needle.as_str()))))
            }
            (Some(Value::String(_)), _) => Err(ExpressionError::evaluate("$contains expects a string to search for")),
            (Some(other), _) => Err(expect_string("contains", &other)),
        },
        Function::Count => Ok(Some(Value::from(match a {
            None => 0,
            Some(Value::Array(items)) => items.len(),
            Some(_) => 1,
        }))),
        Function::Sum => {
            let items = match a {
                None => return Ok(None),
                Some(Value::Array(items)) => items,
                Some(single) => vec![single],
            };
            let mut total = 0.0;
            for item in &items {
                total += item
                    .as_f64()
                    .ok_or_else(|| ExpressionError::evaluate("$sum expects an array of numbers"))?;
            }
            number_value(total).map(Some)
        }
        Function::Keys => Ok(match a {
            Some(Value::Object(map)) => Some(Value::Array(map.keys().cloned().map(Value::String).collect())),
            _ => None,
        }),
        Function::Merge => {
            let items = match a {
                None => return Ok(None),
                Some(Value::Array(items)) => items,
                Some(single) => vec![single],
            };
            let mut merged = Map::new();
            for item in items {
                match item {
                    Value::Object(map) => merged.extend(map),
                    other => {
                        return Err(ExpressionError::evaluate(format!(
                            "$merge expects objects, got {}",
                            type_name(&other)
                        )))
                    }
                }
            }
            Ok(Some(Value::Object(merged)))
        }
        Function::Append => Ok(match (a, b) {
            (None, other) | (other, None) => other,
            (Some(left), Some(right)) => {
                let mut items = into_items(left);
                items.extend(into_items(right));
                Some(Value::Array(items))
            }
        }),
        Function::Lookup => match (a, b) {
            (Some(Value::Object(map)), Some(Value::String(key))) => Ok(map.get(&key).cloned()),
            (_, Some(Value::String(_))) => Ok(None),
            (_, Some(other)) => Err(expect_string("lookup", &other)),
            (_, None) => Ok(None),
        },
        Function::Type => Ok(a.map(|v| Value::String(type_name(&v).to_string()))),
    }
}

fn map_string(
    value: Option<Value>,
    name: &str,
    f: impl FnOnce(&str) -> String,
) -> Result<Option<Value>, ExpressionError> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(Value::String(f(&s)))),
        Some(other) => Err(expect_string(name, &other)),
    }
}

fn integer_arg(value: Option<&Value>, name: &str) -> Result<i64, ExpressionError> {
    value
        .and_then(Value::as_f64)
        .map(|f| f.trunc() as i64)
        .ok_or_else(|| ExpressionError::evaluate(format!("${} expects a numeric position", name)))
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn expect_string(name: &str, got: &Value) -> ExpressionError {
    ExpressionError::evaluate(format!("${} expects a string, got {}", name, type_name(got)))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call1(f: Function, arg: Value) -> Option<Value> {
        call(f, vec![Some(arg)]).unwrap()
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call1(Function::Uppercase, json!("abc")), Some(json!("ABC")));
        assert_eq!(call1(Function::Length, json!("héllo")), Some(json!(5)));
        assert_eq!(
            call(Function::Substring, vec![Some(json!("gateway")), Some(json!(-3))]).unwrap(),
            Some(json!("way"))
        );
        assert_eq!(
            call(Function::Split, vec![Some(json!("a,b")), Some(json!(","))]).unwrap(),
            Some(json!(["a", "b"]))
        );
    }

    #[test]
    fn test_substring_with_extreme_positions() {
        let huge = || Some(json!(1e30));
        assert_eq!(
            call(Function::Substring, vec![Some(json!("abc")), Some(json!(1)), huge()]).unwrap(),
            Some(json!("bc"))
        );
        assert_eq!(
            call(Function::Substring, vec![Some(json!("abc")), huge(), huge()]).unwrap(),
            Some(json!(""))
        );
        assert_eq!(
            call(Function::Substring, vec![Some(json!("abc")), Some(json!(-1e30)), Some(json!(2))]).unwrap(),
            Some(json!("ab"))
        );
    }

    #[test]
    fn test_merge_and_append() {
        assert_eq!(
            call1(Function::Merge, json!([{"a": 1}, {"b": 2}, {"a": 3}])),
            Some(json!({"a": 3, "b": 2}))
        );
        assert_eq!(
            call(Function::Append, vec![Some(json!([1])), Some(json!(2))]).unwrap(),
            Some(json!([1, 2]))
        );
        assert!(call(Function::Merge, vec![Some(json!([1]))]).is_err());
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(call1(Function::Number, json!("42")), Some(json!(42)));
        assert_eq!(call1(Function::Number, json!("1.5")), Some(json!(1.5)));
        assert!(call(Function::Number, vec![Some(json!("abc"))]).is_err());
    }

    #[test]
    fn test_undefined_handling() {
        assert_eq!(call(Function::Exists, vec![None]).unwrap(), Some(json!(false)));
        assert_eq!(call(Function::Count, vec![None]).unwrap(), Some(json!(0)));
        assert_eq!(call(Function::Uppercase, vec![None]).unwrap(), None);
    }
}
