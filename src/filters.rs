//! Metadata (`where`) and document (`where_document`) filter expressions.
//!
//! Wire shapes:
//! - leaf: `{"key": {"$op": operand}}`
//! - combinator: `{"$and": [clause, ...]}` / `{"$or": [clause, ...]}`
//! - document leaf: `{"$contains": "text"}` / `{"$not_contains": "text"}`
//!
//! A metadata field literally named `$and` or `$or` cannot be expressed; the
//! decoder always treats those tokens as combinators.

use std::fmt;

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ChromaError, Result, ValidationError};
use crate::metadata::{Int64, ScalarValue, json_kind};

/// Every operator token accepted in a `where` expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WhereOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    And,
    Or,
}

impl WhereOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOperator::Eq => "$eq",
            WhereOperator::Ne => "$ne",
            WhereOperator::Gt => "$gt",
            WhereOperator::Gte => "$gte",
            WhereOperator::Lt => "$lt",
            WhereOperator::Lte => "$lte",
            WhereOperator::In => "$in",
            WhereOperator::Nin => "$nin",
            WhereOperator::And => "$and",
            WhereOperator::Or => "$or",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let op = match token {
            "$eq" => WhereOperator::Eq,
            "$ne" => WhereOperator::Ne,
            "$gt" => WhereOperator::Gt,
            "$gte" => WhereOperator::Gte,
            "$lt" => WhereOperator::Lt,
            "$lte" => WhereOperator::Lte,
            "$in" => WhereOperator::In,
            "$nin" => WhereOperator::Nin,
            "$and" => WhereOperator::And,
            "$or" => WhereOperator::Or,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for WhereOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operators that compare a field against one scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Operators that test a field against a list of values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MembershipOp {
    In,
    Nin,
}

/// Boolean combinators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl From<ComparisonOp> for WhereOperator {
    fn from(op: ComparisonOp) -> Self {
        match op {
            ComparisonOp::Eq => WhereOperator::Eq,
            ComparisonOp::Ne => WhereOperator::Ne,
            ComparisonOp::Gt => WhereOperator::Gt,
            ComparisonOp::Gte => WhereOperator::Gte,
            ComparisonOp::Lt => WhereOperator::Lt,
            ComparisonOp::Lte => WhereOperator::Lte,
        }
    }
}

impl From<MembershipOp> for WhereOperator {
    fn from(op: MembershipOp) -> Self {
        match op {
            MembershipOp::In => WhereOperator::In,
            MembershipOp::Nin => WhereOperator::Nin,
        }
    }
}

impl From<LogicalOp> for WhereOperator {
    fn from(op: LogicalOp) -> Self {
        match op {
            LogicalOp::And => WhereOperator::And,
            LogicalOp::Or => WhereOperator::Or,
        }
    }
}

impl LogicalOp {
    fn parse(token: &str) -> Option<Self> {
        match WhereOperator::parse(token)? {
            WhereOperator::And => Some(LogicalOp::And),
            WhereOperator::Or => Some(LogicalOp::Or),
            _ => None,
        }
    }
}

/// Homogeneous operand list for `$in` / `$nin`.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarList {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl ScalarList {
    pub fn len(&self) -> usize {
        match self {
            ScalarList::Bool(v) => v.len(),
            ScalarList::Int(v) => v.len(),
            ScalarList::Float(v) => v.len(),
            ScalarList::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a list from raw JSON items. Integers mixed with floats are
    /// widened to floats; any other mix of kinds is rejected.
    fn from_json_items(items: &[Value]) -> std::result::Result<Self, String> {
        let mut scalars = Vec::with_capacity(items.len());
        for item in items {
            let value = ScalarValue::decode_raw::<Int64>(item)
                .ok_or_else(|| format!("list items must be scalars, found {}", json_kind(item)))?;
            scalars.push(value);
        }

        // An empty list has no element type; it decodes as an empty string
        // list and is rejected by `Filter::validate`.
        let Some(first) = scalars.first() else {
            return Ok(ScalarList::Str(Vec::new()));
        };
        let has_float = scalars.iter().any(|s| matches!(s, ScalarValue::Float(_)));
        let list = match first {
            ScalarValue::Bool(_) => ScalarList::Bool(
                scalars
                    .iter()
                    .map(ScalarValue::as_bool)
                    .collect::<Option<_>>()
                    .ok_or_else(heterogeneous)?,
            ),
            ScalarValue::Int(_) | ScalarValue::Float(_) if has_float => ScalarList::Float(
                scalars
                    .iter()
                    .map(|s| match s {
                        ScalarValue::Int(n) => Some(*n as f64),
                        ScalarValue::Float(f) => Some(*f),
                        _ => None,
                    })
                    .collect::<Option<_>>()
                    .ok_or_else(heterogeneous)?,
            ),
            ScalarValue::Int(_) | ScalarValue::Float(_) => ScalarList::Int(
                scalars
                    .iter()
                    .map(ScalarValue::as_i64)
                    .collect::<Option<_>>()
                    .ok_or_else(heterogeneous)?,
            ),
            ScalarValue::Str(_) => ScalarList::Str(
                scalars
                    .iter()
                    .map(|s| s.as_str().map(str::to_string))
                    .collect::<Option<_>>()
                    .ok_or_else(heterogeneous)?,
            ),
        };
        Ok(list)
    }

    fn has_non_finite(&self) -> bool {
        matches!(self, ScalarList::Float(v) if v.iter().any(|f| !f.is_finite()))
    }
}

fn heterogeneous() -> String {
    "list items must all have the same type".to_string()
}

macro_rules! scalar_list_from {
    ($variant:ident, $elem:ty, $conv:expr) => {
        impl From<Vec<$elem>> for ScalarList {
            fn from(values: Vec<$elem>) -> Self {
                ScalarList::$variant(values.into_iter().map($conv).collect())
            }
        }

        impl<const N: usize> From<[$elem; N]> for ScalarList {
            fn from(values: [$elem; N]) -> Self {
                ScalarList::$variant(values.into_iter().map($conv).collect())
            }
        }
    };
}

scalar_list_from!(Bool, bool, |v| v);
scalar_list_from!(Int, i32, i64::from);
scalar_list_from!(Int, i64, |v| v);
scalar_list_from!(Float, f32, f64::from);
scalar_list_from!(Float, f64, |v| v);
scalar_list_from!(Str, &str, str::to_string);
scalar_list_from!(Str, String, |v| v);

impl Serialize for ScalarList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.has_non_finite() {
            return Err(S::Error::custom("non-finite float cannot be encoded as JSON"));
        }
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        match self {
            ScalarList::Bool(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            ScalarList::Int(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            ScalarList::Float(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
            ScalarList::Str(v) => v.iter().try_for_each(|x| seq.serialize_element(x))?,
        }
        seq.end()
    }
}

/// Metadata filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Compare {
        key: String,
        op: ComparisonOp,
        value: ScalarValue,
    },
    Membership {
        key: String,
        op: MembershipOp,
        values: ScalarList,
    },
    Logical {
        op: LogicalOp,
        clauses: Vec<Filter>,
    },
}

impl Filter {
    fn compare(key: impl Into<String>, op: ComparisonOp, value: impl Into<ScalarValue>) -> Self {
        Filter::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Eq, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Ne, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Gt, value)
    }

    pub fn gte(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Gte, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Lt, value)
    }

    pub fn lte(key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(key, ComparisonOp::Lte, value)
    }

    /// `$in`: field value is one of `values`.
    pub fn is_in(key: impl Into<String>, values: impl Into<ScalarList>) -> Self {
        Filter::Membership {
            key: key.into(),
            op: MembershipOp::In,
            values: values.into(),
        }
    }

    /// `$nin`: field value is none of `values`.
    pub fn not_in(key: impl Into<String>, values: impl Into<ScalarList>) -> Self {
        Filter::Membership {
            key: key.into(),
            op: MembershipOp::Nin,
            values: values.into(),
        }
    }

    pub fn and(clauses: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Logical {
            op: LogicalOp::And,
            clauses: clauses.into_iter().collect(),
        }
    }

    pub fn or(clauses: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Logical {
            op: LogicalOp::Or,
            clauses: clauses.into_iter().collect(),
        }
    }

    /// Build a leaf from an operator token and an untyped operand.
    ///
    /// Fails with [`ChromaError::Construction`] when the operand shape does not
    /// fit the operator: membership operators need a homogeneous array,
    /// comparison operators need a scalar, combinators are not leaves.
    pub fn leaf(key: impl Into<String>, op: WhereOperator, operand: Value) -> Result<Self> {
        let key = key.into();
        let compare = |cmp: ComparisonOp| -> Result<Self> {
            match ScalarValue::decode_raw::<Int64>(&operand) {
                Some(value) => Ok(Filter::Compare {
                    key: key.clone(),
                    op: cmp,
                    value,
                }),
                None => Err(ChromaError::Construction(format!(
                    "`{op}` on `{key}` requires a scalar operand, found {}",
                    json_kind(&operand)
                ))),
            }
        };
        match op {
            WhereOperator::Eq => compare(ComparisonOp::Eq),
            WhereOperator::Ne => compare(ComparisonOp::Ne),
            WhereOperator::Gt => compare(ComparisonOp::Gt),
            WhereOperator::Gte => compare(ComparisonOp::Gte),
            WhereOperator::Lt => compare(ComparisonOp::Lt),
            WhereOperator::Lte => compare(ComparisonOp::Lte),
            WhereOperator::In | WhereOperator::Nin => {
                let Value::Array(items) = &operand else {
                    return Err(ChromaError::Construction(format!(
                        "`{op}` on `{key}` requires an array operand, found {}",
                        json_kind(&operand)
                    )));
                };
                let values = ScalarList::from_json_items(items)
                    .map_err(|reason| ChromaError::Construction(format!("`{op}` on `{key}`: {reason}")))?;
                let op = if op == WhereOperator::In {
                    MembershipOp::In
                } else {
                    MembershipOp::Nin
                };
                Ok(Filter::Membership { key, op, values })
            }
            WhereOperator::And | WhereOperator::Or => Err(ChromaError::Construction(format!(
                "`{op}` is a combinator and cannot be used as a leaf operator"
            ))),
        }
    }

    pub fn operator(&self) -> WhereOperator {
        match self {
            Filter::Compare { op, .. } => (*op).into(),
            Filter::Membership { op, .. } => (*op).into(),
            Filter::Logical { op, .. } => (*op).into(),
        }
    }

    /// Field name for leaves; combinators have none.
    pub fn key(&self) -> Option<&str> {
        match self {
            Filter::Compare { key, .. } | Filter::Membership { key, .. } => Some(key),
            Filter::Logical { .. } => None,
        }
    }

    /// Check the expression tree before it is sent.
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::Compare { key, op, value } => {
                if key.is_empty() {
                    return Err(invalid_filter(format!(
                        "invalid key for {}, expected non-empty",
                        WhereOperator::from(*op)
                    )));
                }
                if let ScalarValue::Float(f) = value {
                    if !f.is_finite() {
                        return Err(invalid_filter(format!("non-finite operand for `{key}`")));
                    }
                }
                Ok(())
            }
            Filter::Membership { key, op, values } => {
                if key.is_empty() {
                    return Err(invalid_filter(format!(
                        "invalid key for {}, expected non-empty",
                        WhereOperator::from(*op)
                    )));
                }
                if values.is_empty() {
                    return Err(invalid_filter(format!(
                        "{} on `{key}` requires at least one value",
                        WhereOperator::from(*op)
                    )));
                }
                if values.has_non_finite() {
                    return Err(invalid_filter(format!("non-finite operand for `{key}`")));
                }
                Ok(())
            }
            Filter::Logical { op, clauses } => {
                if clauses.is_empty() {
                    return Err(invalid_filter(format!(
                        "{} requires at least one clause",
                        WhereOperator::from(*op)
                    )));
                }
                clauses.iter().try_for_each(Filter::validate)
            }
        }
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ChromaError::decode("where", format!("expected an object, found {}", json_kind(value)))
        })?;
        let (field, body) = single_entry(object, "where")?;

        if let Some(op) = LogicalOp::parse(field) {
            let items = body.as_array().ok_or_else(|| {
                ChromaError::decode(field, format!("expected an array of clauses, found {}", json_kind(body)))
            })?;
            let clauses = items
                .iter()
                .map(Filter::from_json_value)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Filter::Logical { op, clauses });
        }

        match body {
            Value::Object(inner) => {
                let (token, operand) = single_entry(inner, field)?;
                let op = WhereOperator::parse(token).ok_or_else(|| {
                    ChromaError::decode(field, format!("unknown operator `{token}`"))
                })?;
                Filter::leaf(field, op, operand.clone()).map_err(|err| match err {
                    ChromaError::Construction(reason) => ChromaError::decode(field, reason),
                    other => other,
                })
            }
            // `{"field": value}` is shorthand for `$eq`.
            scalar => Filter::leaf(field, WhereOperator::Eq, scalar.clone()).map_err(|err| match err {
                ChromaError::Construction(reason) => ChromaError::decode(field, reason),
                other => other,
            }),
        }
    }
}

fn invalid_filter(reason: String) -> ChromaError {
    ChromaError::Validation(ValidationError::InvalidFilter(reason))
}

fn single_entry<'a>(object: &'a Map<String, Value>, context: &str) -> Result<(&'a str, &'a Value)> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        (None, _) => Err(ChromaError::decode(context, "expected exactly one entry, found none")),
        (Some(_), Some(_)) => Err(ChromaError::decode(
            context,
            format!("expected exactly one entry, found {}", object.len()),
        )),
    }
}

/// Serializes `{token: operand}`.
struct OperatorBody<'a, T: Serialize> {
    token: &'a str,
    operand: &'a T,
}

impl<T: Serialize> Serialize for OperatorBody<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.token, self.operand)?;
        map.end()
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Filter::Compare { key, op, value } => {
                let body = OperatorBody {
                    token: WhereOperator::from(*op).as_str(),
                    operand: value,
                };
                map.serialize_entry(key, &body)?;
            }
            Filter::Membership { key, op, values } => {
                let body = OperatorBody {
                    token: WhereOperator::from(*op).as_str(),
                    operand: values,
                };
                map.serialize_entry(key, &body)?;
            }
            Filter::Logical { op, clauses } => {
                map.serialize_entry(WhereOperator::from(*op).as_str(), clauses)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Filter::from_json_value(&raw).map_err(D::Error::custom)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Full-text document filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum DocFilter {
    Contains(String),
    NotContains(String),
    And(Vec<DocFilter>),
    Or(Vec<DocFilter>),
}

const CONTAINS: &str = "$contains";
const NOT_CONTAINS: &str = "$not_contains";

impl DocFilter {
    pub fn contains(text: impl Into<String>) -> Self {
        DocFilter::Contains(text.into())
    }

    pub fn not_contains(text: impl Into<String>) -> Self {
        DocFilter::NotContains(text.into())
    }

    pub fn and(clauses: impl IntoIterator<Item = DocFilter>) -> Self {
        DocFilter::And(clauses.into_iter().collect())
    }

    pub fn or(clauses: impl IntoIterator<Item = DocFilter>) -> Self {
        DocFilter::Or(clauses.into_iter().collect())
    }

    fn token(&self) -> &'static str {
        match self {
            DocFilter::Contains(_) => CONTAINS,
            DocFilter::NotContains(_) => NOT_CONTAINS,
            DocFilter::And(_) => "$and",
            DocFilter::Or(_) => "$or",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DocFilter::Contains(text) | DocFilter::NotContains(text) => {
                if text.is_empty() {
                    return Err(invalid_filter(format!("{} requires non-empty text", self.token())));
                }
                Ok(())
            }
            DocFilter::And(clauses) | DocFilter::Or(clauses) => {
                if clauses.is_empty() {
                    return Err(invalid_filter(format!(
                        "{} requires at least one clause",
                        self.token()
                    )));
                }
                clauses.iter().try_for_each(DocFilter::validate)
            }
        }
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ChromaError::decode(
                "where_document",
                format!("expected an object, found {}", json_kind(value)),
            )
        })?;
        let (token, body) = single_entry(object, "where_document")?;
        match token {
            CONTAINS | NOT_CONTAINS => {
                let text = body.as_str().ok_or_else(|| {
                    ChromaError::decode(token, format!("expected a string, found {}", json_kind(body)))
                })?;
                Ok(if token == CONTAINS {
                    DocFilter::Contains(text.to_string())
                } else {
                    DocFilter::NotContains(text.to_string())
                })
            }
            _ => match LogicalOp::parse(token) {
                Some(op) => {
                    let items = body.as_array().ok_or_else(|| {
                        ChromaError::decode(
                            token,
                            format!("expected an array of clauses, found {}", json_kind(body)),
                        )
                    })?;
                    let clauses = items
                        .iter()
                        .map(DocFilter::from_json_value)
                        .collect::<Result<Vec<_>>>()?;
                    Ok(match op {
                        LogicalOp::And => DocFilter::And(clauses),
                        LogicalOp::Or => DocFilter::Or(clauses),
                    })
                }
                None => Err(ChromaError::decode(token, "unknown document operator")),
            },
        }
    }
}

impl Serialize for DocFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            DocFilter::Contains(text) | DocFilter::NotContains(text) => {
                map.serialize_entry(self.token(), text)?;
            }
            DocFilter::And(clauses) | DocFilter::Or(clauses) => {
                map.serialize_entry(self.token(), clauses)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DocFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        DocFilter::from_json_value(&raw).map_err(D::Error::custom)
    }
}

impl fmt::Display for DocFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
