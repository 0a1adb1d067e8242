// Metadata filters for vector search
// Parsed from the MongoDB-style JSON form and rendered as LanceDB SQL predicates


use std::collections::BTreeSet;

use arrow::datatypes::{DataType, Schema};
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::RagError;

/// Scalar operand of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    #[inline]
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    #[inline]
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<f64> for FilterValue {
    #[inline]
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<i64> for FilterValue {
    #[inline]
    fn from(value: i64) -> Self {
        FilterValue::Number(value as f64)
    }
}

impl From<bool> for FilterValue {
    #[inline]
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl FilterValue {
    fn from_json(value: &Value) -> Result<Self, RagError> {
        match value {
            Value::String(s) => Ok(FilterValue::String(s.clone())),
            Value::Bool(b) => Ok(FilterValue::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(FilterValue::Number)
                .ok_or_else(|| RagError::InvalidQuery(format!("unsupported number {}", n))),
            other => Err(RagError::InvalidQuery(format!(
                "filter values must be strings, numbers or booleans, got {}",
                other
            ))),
        }
    }

    /// Render as a literal comparable with a column of `data_type`
    fn to_sql_literal(&self, data_type: &DataType) -> String {
        match (self, data_type) {
            (FilterValue::Number(n), DataType::Float64) => n.to_string(),
            (FilterValue::Bool(b), DataType::Boolean) => b.to_string(),
            (FilterValue::String(s), DataType::Boolean) if s == "true" || s == "false" => s.clone(),
            (FilterValue::String(s), DataType::Float64) if s.parse::<f64>().is_ok() => s.clone(),
            (FilterValue::String(s), _) => quote(s),
            (FilterValue::Number(n), _) => quote(&n.to_string()),
            (FilterValue::Bool(b), _) => quote(&b.to_string()),
        }
    }
}

/// Predicate over dotted document paths
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    Ne(String, FilterValue),
    Gt(String, FilterValue),
    Gte(String, FilterValue),
    Lt(String, FilterValue),
    Lte(String, FilterValue),
    In(String, Vec<FilterValue>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    #[inline]
    pub fn eq(path: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    #[inline]
    pub fn gte(path: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Gte(path.into(), value.into())
    }

    /// Parse `{"$and": [{"metadata.contentType": "Tutorial"}, {"updated": {"$gte": "2024-05-19"}}]}`
    ///
    /// Several keys in one object are combined with AND, as are several
    /// operators on one field.
    #[inline]
    pub fn from_json(value: &Value) -> Result<Self, RagError> {
        let object = value.as_object().ok_or_else(|| {
            RagError::InvalidQuery(format!("filter must be a JSON object, got {}", value))
        })?;

        let mut clauses = object
            .iter()
            .map(|(key, value)| match key.as_str() {
                "$and" => Ok(Filter::And(parse_clause_list(key, value)?)),
                "$or" => Ok(Filter::Or(parse_clause_list(key, value)?)),
                op if op.starts_with('$') => Err(RagError::InvalidQuery(format!(
                    "unsupported top-level operator '{}'",
                    op
                ))),
                path => parse_field(path, value),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Filter::And(clauses))
        }
    }

    /// Every document path the filter references, deduplicated
    #[inline]
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut BTreeSet<&'a str>) {
        match self {
            Filter::Eq(path, _)
            | Filter::Ne(path, _)
            | Filter::Gt(path, _)
            | Filter::Gte(path, _)
            | Filter::Lt(path, _)
            | Filter::Lte(path, _)
            | Filter::In(path, _) => {
                fields.insert(path.as_str());
            }
            Filter::And(clauses) | Filter::Or(clauses) => {
                for clause in clauses {
                    clause.collect_fields(fields);
                }
            }
        }
    }

    /// Render as a SQL predicate over the flattened columns of `schema`
    ///
    /// A path with no column belongs to no stored document, so a comparison
    /// on it is `FALSE` and `$ne` on it is `TRUE`.
    #[inline]
    pub fn to_sql(&self, schema: &Schema) -> String {
        let comparison = |path: &str, op: &str, value: &FilterValue| match lookup(schema, path) {
            Some((column, data_type)) => {
                format!("{} {} {}", column, op, value.to_sql_literal(data_type))
            }
            None => "FALSE".to_string(),
        };

        match self {
            Filter::Eq(path, value) => comparison(path, "=", value),
            Filter::Ne(path, value) => match lookup(schema, path) {
                Some((column, _)) => format!(
                    "({} IS NULL OR {})",
                    column,
                    comparison(path, "!=", value)
                ),
                None => "TRUE".to_string(),
            },
            Filter::Gt(path, value) => comparison(path, ">", value),
            Filter::Gte(path, value) => comparison(path, ">=", value),
            Filter::Lt(path, value) => comparison(path, "<", value),
            Filter::Lte(path, value) => comparison(path, "<=", value),
            Filter::In(path, values) => match lookup(schema, path) {
                Some((column, data_type)) if !values.is_empty() => format!(
                    "{} IN ({})",
                    column,
                    values.iter().map(|v| v.to_sql_literal(data_type)).join(", ")
                ),
                _ => "FALSE".to_string(),
            },
            Filter::And(clauses) => join_clauses(clauses, "AND", "TRUE", schema),
            Filter::Or(clauses) => join_clauses(clauses, "OR", "FALSE", schema),
        }
    }
}

/// Physical column holding a document path: `metadata.contentType` -> `metadata__contentType`
#[inline]
pub fn column_name(path: &str) -> String {
    path.replace('.', "__")
}

fn lookup<'a>(schema: &'a Schema, path: &str) -> Option<(String, &'a DataType)> {
    let name = column_name(path);
    let field = schema.field_with_name(&name).ok()?;
    Some((format!("`{}`", name), field.data_type()))
}

fn join_clauses(clauses: &[Filter], op: &str, empty: &str, schema: &Schema) -> String {
    if clauses.is_empty() {
        return empty.to_string();
    }
    clauses
        .iter()
        .map(|clause| format!("({})", clause.to_sql(schema)))
        .join(&format!(" {} ", op))
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn parse_clause_list(op: &str, value: &Value) -> Result<Vec<Filter>, RagError> {
    value
        .as_array()
        .ok_or_else(|| RagError::InvalidQuery(format!("'{}' expects an array of filters", op)))?
        .iter()
        .map(Filter::from_json)
        .collect()
}

fn parse_field(path: &str, value: &Value) -> Result<Filter, RagError> {
    match value {
        Value::Object(operators) if operators.keys().any(|k| k.starts_with('$')) => {
            parse_operators(path, operators)
        }
        other => Ok(Filter::Eq(path.to_string(), FilterValue::from_json(other)?)),
    }
}

fn parse_operators(path: &str, operators: &Map<String, Value>) -> Result<Filter, RagError> {
    let mut clauses = operators
        .iter()
        .map(|(op, operand)| {
            let field = path.to_string();
            match op.as_str() {
                "$eq" => Ok(Filter::Eq(field, FilterValue::from_json(operand)?)),
                "$ne" => Ok(Filter::Ne(field, FilterValue::from_json(operand)?)),
                "$gt" => Ok(Filter::Gt(field, FilterValue::from_json(operand)?)),
                "$gte" => Ok(Filter::Gte(field, FilterValue::from_json(operand)?)),
                "$lt" => Ok(Filter::Lt(field, FilterValue::from_json(operand)?)),
                "$lte" => Ok(Filter::Lte(field, FilterValue::from_json(operand)?)),
                "$in" => {
                    let values = operand
                        .as_array()
                        .ok_or_else(|| {
                            RagError::InvalidQuery(format!("'$in' on '{}' expects an array", path))
                        })?
                        .iter()
                        .map(FilterValue::from_json)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Filter::In(field, values))
                }
                other => Err(RagError::InvalidQuery(format!(
                    "unsupported operator '{}' on '{}'",
                    other, path
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}
