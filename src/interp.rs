//! Tree-walking evaluator for parsed attribute expressions.
//!
//! Operators follow Python semantics over [`Value`]; integers are 64-bit and
//! overflow is reported as a runtime error instead of promoting.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use crate::error::EvalError;
use crate::value::Value;

/// Name and member resolution for [`evaluate`].
pub trait Scope {
    /// Value bound to a placeholder or local name.
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError>;

    /// `target.field`. Only node references have members.
    fn member(&mut self, target: &Value, _field: &str) -> Result<Value, EvalError> {
        Err(EvalError::runtime(format!(
            "'{}' object has no attributes",
            target.type_name()
        )))
    }
}

/// Plain name bindings without a tree behind them.
impl Scope for HashMap<String, Value> {
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownReference(name.to_string()))
    }
}

pub fn evaluate(expr: &Expr, scope: &mut dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => scope.lookup(name),
        Expr::List(items) => Ok(Value::List(evaluate_all(items, scope)?)),
        Expr::Tuple(items) => Ok(Value::Tuple(evaluate_all(items, scope)?)),
        Expr::Dict(pairs) => {
            let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = evaluate(k, scope)?;
                let value = evaluate(v, scope)?;
                match out.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
                    Some(slot) => slot.1 = value,
                    None => out.push((key, value)),
                }
            }
            Ok(Value::Dict(out))
        }
        Expr::Unary(op, inner) => unary(*op, evaluate(inner, scope)?),
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, &left, &right)
        }
        Expr::Compare(first, rest) => {
            let mut left = evaluate(first, scope)?;
            for (op, next) in rest {
                let right = evaluate(next, scope)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let left = evaluate(left, scope)?;
            if left.is_truthy() {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, scope)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                evaluate(right, scope)
            }
        }
        Expr::Member(target, field) => {
            let target = evaluate(target, scope)?;
            scope.member(&target, field)
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            subscript(&target, &index)
        }
    }
}

fn evaluate_all(items: &[Expr], scope: &mut dyn Scope) -> Result<Vec<Value>, EvalError> {
    items.iter().map(|item| evaluate(item, scope)).collect()
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn overflow() -> EvalError {
    EvalError::runtime("integer overflow")
}

fn zero_division() -> EvalError {
    EvalError::runtime("division by zero")
}

fn unsupported(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::runtime(format!(
        "unsupported operand types for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match as_num(&value) {
            Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            Some(Num::Float(f)) => Ok(Value::Float(-f)),
            None => Err(EvalError::runtime(format!(
                "bad operand type for unary -: '{}'",
                value.type_name()
            ))),
        },
        UnaryOp::Pos => match as_num(&value) {
            Some(Num::Int(i)) => Ok(Value::Int(i)),
            Some(Num::Float(f)) => Ok(Value::Float(f)),
            None => Err(EvalError::runtime(format!(
                "bad operand type for unary +: '{}'",
                value.type_name()
            ))),
        },
    }
}

/// Largest string (in bytes) or sequence (in items) `*` may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 24;

fn repeat_count(len: usize, times: i64) -> Result<usize, EvalError> {
    let times = usize::try_from(times).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(EvalError::runtime("repeated sequence too large")),
    }
}

fn repeat(items: &[Value], times: i64) -> Result<Vec<Value>, EvalError> {
    let times = repeat_count(items.len(), times)?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn int_mod(a: i64, b: i64) -> Option<i64> {
    if b == -1 {
        return Some(0);
    }
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List([a.as_slice(), b.as_slice()].concat()))
        }
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            return Ok(Value::Tuple([a.as_slice(), b.as_slice()].concat()))
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s))
            if as_index(n).is_some() =>
        {
            let times = repeat_count(s.len(), as_index(n).unwrap_or(0))?;
            return Ok(Value::Str(s.repeat(times)));
        }
        (BinaryOp::Mul, Value::List(items), n) | (BinaryOp::Mul, n, Value::List(items))
            if as_index(n).is_some() =>
        {
            return Ok(Value::List(repeat(items, as_index(n).unwrap_or(0))?));
        }
        (BinaryOp::Mul, Value::Tuple(items), n) | (BinaryOp::Mul, n, Value::Tuple(items))
            if as_index(n).is_some() =>
        {
            return Ok(Value::Tuple(repeat(items, as_index(n).unwrap_or(0))?));
        }
        _ => {}
    }

    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    };
    let (Some(a), Some(b)) = (as_num(left), as_num(right)) else {
        return Err(unsupported(symbol, left, right));
    };

    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(zero_division());
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(zero_division());
                }
                floor_div(a, b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(zero_division());
                }
                int_mod(a, b)
            }
            BinaryOp::Pow => {
                if b < 0 {
                    if a == 0 {
                        return Err(zero_division());
                    }
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
            }
        };
        return result.map(Value::Int).ok_or_else(overflow);
    }

    let (a, b) = (as_float(a), as_float(b));
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(zero_division())
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => float_mod(a, b),
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division());
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

/// Python `==`: numbers compare across int, float and bool.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => a == b,
            (a, b) => as_float(a) == as_float(b),
        };
    }
    match (left, right) {
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.iter()
                        .any(|(k2, v2)| values_equal(k, k2) && values_equal(v, v2))
                })
        }
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        let ord = match (a, b) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => as_float(a).partial_cmp(&as_float(b)),
        };
        return ord.ok_or_else(|| EvalError::runtime("comparison with NaN"));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !values_equal(x, y) {
                    return ordering(x, y);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(EvalError::runtime(format!(
            "ordering not supported between '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            _ => Err(EvalError::runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                item.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => {
            Ok(items.iter().any(|v| values_equal(v, item)))
        }
        Value::Dict(pairs) => Ok(pairs.iter().any(|(k, _)| values_equal(k, item))),
        Value::Nodes(ids) => Ok(item.as_node().is_some_and(|id| ids.contains(&id))),
        other => Err(EvalError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    Ok(match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Lt => ordering(left, right)? == Ordering::Less,
        CompareOp::Le => ordering(left, right)? != Ordering::Greater,
        CompareOp::Gt => ordering(left, right)? == Ordering::Greater,
        CompareOp::Ge => ordering(left, right)? != Ordering::Less,
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
    })
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn subscript(target: &Value, index: &Value) -> Result<Value, EvalError> {
    if let Value::Dict(pairs) = target {
        return pairs
            .iter()
            .find(|(k, _)| values_equal(k, index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::runtime(format!("key not found: {index}")));
    }

    let Some(i) = as_index(index) else {
        return Err(EvalError::runtime(format!(
            "indices must be integers, not {}",
            index.type_name()
        )));
    };
    let out_of_range = || EvalError::runtime(format!("index {i} out of range"));
    match target {
        Value::List(items) | Value::Tuple(items) => normalize_index(i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(out_of_range),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(out_of_range)
        }
        Value::Nodes(ids) => normalize_index(i, ids.len())
            .map(|i| Value::Node(ids[i]))
            .ok_or_else(out_of_range),
        other => Err(EvalError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
