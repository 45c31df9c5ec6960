// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Predicate rendering
//!
//! Field names and operands are always bound parameters; only quoted
//! identifiers and fixed operator tokens are spliced into statement text.

use serde_json::Value as JsonValue;

use crate::core::metadata_filter::Predicate;

/// A positional statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(JsonValue),
    Int(i64),
}

/// Accumulates parameters while a statement is rendered.
#[derive(Debug, Default)]
pub struct SqlParams {
    params: Vec<SqlParam>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter, returning its placeholder with an explicit cast.
    pub fn push(&mut self, param: SqlParam) -> String {
        let cast = match &param {
            SqlParam::Text(_) => "text",
            SqlParam::Json(_) => "jsonb",
            SqlParam::Int(_) => "int8",
        };
        self.params.push(param);
        format!("${}::{}", self.params.len(), cast)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_inner(self) -> Vec<SqlParam> {
        self.params
    }

    pub fn as_slice(&self) -> &[SqlParam] {
        &self.params
    }
}

/// Double-quote an identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Render `predicate` against the `metadata` column.
pub fn render_predicate(predicate: &Predicate, params: &mut SqlParams) -> String {
    match predicate {
        Predicate::And { predicates } => render_junction(predicates, " and ", params),
        Predicate::Or { predicates } => render_junction(predicates, " or ", params),
        Predicate::Contains { field, value } => {
            let field = params.push(SqlParam::Text(field.clone()));
            let value = params.push(SqlParam::Json(value.clone()));
            format!("metadata @> jsonb_build_object({}, {})", field, value)
        }
        Predicate::Compare { field, op, value } => {
            let field = params.push(SqlParam::Text(field.clone()));
            let value = params.push(SqlParam::Json(value.clone()));
            format!("(metadata -> {}) {} {}", field, op.sql_operator(), value)
        }
        Predicate::In { field, values } => {
            let field = params.push(SqlParam::Text(field.clone()));
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| params.push(SqlParam::Json(v.clone())))
                .collect();
            format!("(metadata -> {}) in ({})", field, placeholders.join(", "))
        }
        Predicate::HasElement { field, value } => {
            let field = params.push(SqlParam::Text(field.clone()));
            let value = params.push(SqlParam::Json(value.clone()));
            format!(
                "(jsonb_typeof(metadata -> {f}) = 'array' and (metadata -> {f}) @> {v})",
                f = field,
                v = value
            )
        }
    }
}

fn render_junction(predicates: &[Predicate], joiner: &str, params: &mut SqlParams) -> String {
    let parts: Vec<String> = predicates
        .iter()
        .map(|p| render_predicate(p, params))
        .collect();
    format!("({})", parts.join(joiner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(filter: JsonValue) -> (String, Vec<SqlParam>) {
        let predicate = Predicate::compile(&filter).unwrap();
        let mut params = SqlParams::new();
        let sql = render_predicate(&predicate, &mut params);
        (sql, params.into_inner())
    }

    #[test]
    fn test_scalar_eq_uses_containment() {
        let (sql, params) = render(json!({"year": {"$eq": 1997}}));
        assert_eq!(sql, "metadata @> jsonb_build_object($1::text, $2::jsonb)");
        assert_eq!(
            params,
            vec![SqlParam::Text("year".into()), SqlParam::Json(json!(1997))]
        );
    }

    #[test]
    fn test_field_names_are_bound() {
        let (sql, params) = render(json!({"x'; drop table t; --": {"$gt": 1}}));
        assert!(!sql.contains("drop table"));
        assert_eq!(params[0], SqlParam::Text("x'; drop table t; --".into()));
    }

    #[test]
    fn test_in_binds_every_value() {
        let (sql, params) = render(json!({"tag": {"$in": ["a", 1, true]}}));
        assert_eq!(sql, "(metadata -> $1::text) in ($2::jsonb, $3::jsonb, $4::jsonb)");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_contains_checks_array_type() {
        let (sql, _) = render(json!({"genre": {"$contains": "drama"}}));
        assert!(sql.starts_with("(jsonb_typeof(metadata -> $1::text) = 'array'"));
        assert!(sql.ends_with("@> $2::jsonb)"));
    }

    #[test]
    fn test_nested_junctions_number_params_in_order() {
        let (sql, params) = render(json!({
            "$or": [
                {"a": {"$lt": 1}},
                {"$and": [{"b": {"$ne": "x"}}, {"c": {"$gte": 2}}]}
            ]
        }));
        assert_eq!(
            sql,
            "((metadata -> $1::text) < $2::jsonb or ((metadata -> $3::text) <> $4::jsonb and (metadata -> $5::text) >= $6::jsonb))"
        );
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("docs"), "\"docs\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
