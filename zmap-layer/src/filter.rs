use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;
use zmap_core::feature::FeatureView;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("filter must be an array expression or a boolean, got {0}")]
    NotAnExpression(String),
    #[error("filter expression is missing its operator")]
    MissingOperator,
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    #[error("filter operator `{op}` got {found} operands")]
    Arity { op: String, found: usize },
    #[error("filter key must be a string, got {0}")]
    InvalidKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn from_operator(op: &str) -> Option<Self> {
        let comparison = match op {
            "==" => Comparison::Eq,
            "!=" => Comparison::Ne,
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => return None,
        };
        Some(comparison)
    }
}

/// 过滤表达式中引用的要素字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKey {
    /// `$type`
    Type,
    /// `$id`
    Id,
    Property(String),
}

impl FilterKey {
    fn parse(raw: &Value) -> Result<Self, FilterError> {
        let Some(name) = raw.as_str() else {
            return Err(FilterError::InvalidKey(raw.to_string()));
        };
        let key = match name {
            "$type" => FilterKey::Type,
            "$id" => FilterKey::Id,
            other => FilterKey::Property(other.to_string()),
        };
        Ok(key)
    }

    fn resolve<'a>(&self, view: &'a FeatureView) -> Option<Cow<'a, Value>> {
        match self {
            FilterKey::Type => Some(Cow::Owned(Value::from(view.geometry_type.base_name()))),
            FilterKey::Id => view
                .id
                .as_ref()
                .map(|id| Cow::Owned(Value::from(id.as_str()))),
            FilterKey::Property(name) => view.property(name).map(Cow::Borrowed),
        }
    }
}

/// 编译后的过滤条件。
///
/// 表达式语法：`["==", key, value]` 及其余比较运算、`["in", key, v...]`、
/// `["!in", ...]`、`["has", key]`、`["!has", key]`、`["all" | "any" | "none", f...]`，
/// 以及布尔字面量。`null` 视为恒真。
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Literal(bool),
    Compare {
        key: FilterKey,
        op: Comparison,
        value: Value,
    },
    In {
        key: FilterKey,
        values: Vec<Value>,
        negated: bool,
    },
    Has {
        key: FilterKey,
        negated: bool,
    },
    All(Vec<Filter>),
    Any(Vec<Filter>),
    NoneOf(Vec<Filter>),
}

impl Filter {
    pub fn compile(expression: &Value) -> Result<Self, FilterError> {
        let items = match expression {
            Value::Null => return Ok(Filter::Literal(true)),
            Value::Bool(value) => return Ok(Filter::Literal(*value)),
            Value::Array(items) => items,
            other => return Err(FilterError::NotAnExpression(other.to_string())),
        };
        let Some((op, operands)) = items.split_first() else {
            return Err(FilterError::MissingOperator);
        };
        let Some(op) = op.as_str() else {
            return Err(FilterError::MissingOperator);
        };

        if let Some(comparison) = Comparison::from_operator(op) {
            let [key, value] = operands else {
                return Err(arity(op, operands));
            };
            return Ok(Filter::Compare {
                key: FilterKey::parse(key)?,
                op: comparison,
                value: value.clone(),
            });
        }

        match op {
            "in" | "!in" => {
                let Some((key, values)) = operands.split_first() else {
                    return Err(arity(op, operands));
                };
                Ok(Filter::In {
                    key: FilterKey::parse(key)?,
                    values: values.to_vec(),
                    negated: op == "!in",
                })
            }
            "has" | "!has" => {
                let [key] = operands else {
                    return Err(arity(op, operands));
                };
                Ok(Filter::Has {
                    key: FilterKey::parse(key)?,
                    negated: op == "!has",
                })
            }
            "all" => Ok(Filter::All(compile_all(operands)?)),
            "any" => Ok(Filter::Any(compile_all(operands)?)),
            "none" => Ok(Filter::NoneOf(compile_all(operands)?)),
            other => Err(FilterError::UnknownOperator(other.to_string())),
        }
    }

    pub fn matches(&self, view: &FeatureView) -> bool {
        match self {
            Filter::Literal(value) => *value,
            Filter::Compare { key, op, value } => {
                let actual = key.resolve(view);
                match op {
                    Comparison::Eq => actual.is_some_and(|actual| values_equal(&actual, value)),
                    Comparison::Ne => !actual.is_some_and(|actual| values_equal(&actual, value)),
                    Comparison::Lt | Comparison::Le | Comparison::Gt | Comparison::Ge => {
                        let Some(ordering) = actual.and_then(|actual| order(&actual, value)) else {
                            return false;
                        };
                        match op {
                            Comparison::Lt => ordering == Ordering::Less,
                            Comparison::Le => ordering != Ordering::Greater,
                            Comparison::Gt => ordering == Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        }
                    }
                }
            }
            Filter::In {
                key,
                values,
                negated,
            } => {
                let found = key.resolve(view).is_some_and(|actual| {
                    values.iter().any(|candidate| values_equal(&actual, candidate))
                });
                found != *negated
            }
            Filter::Has { key, negated } => {
                let present = match key {
                    FilterKey::Type => true,
                    FilterKey::Id => view.id.is_some(),
                    FilterKey::Property(name) => view.properties.contains_key(name),
                };
                present != *negated
            }
            Filter::All(filters) => filters.iter().all(|filter| filter.matches(view)),
            Filter::Any(filters) => filters.iter().any(|filter| filter.matches(view)),
            Filter::NoneOf(filters) => !filters.iter().any(|filter| filter.matches(view)),
        }
    }
}

fn compile_all(operands: &[Value]) -> Result<Vec<Filter>, FilterError> {
    operands.iter().map(Filter::compile).collect()
}

fn arity(op: &str, operands: &[Value]) -> FilterError {
    FilterError::Arity {
        op: op.to_string(),
        found: operands.len(),
    }
}

/// 数值统一按 f64 比较，`1` 与 `1.0` 相等。
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a.partial_cmp(&b);
    }
    match (left.as_str(), right.as_str()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
