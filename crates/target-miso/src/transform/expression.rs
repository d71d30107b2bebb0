//! Data-expression transformer
//!
//! The template is a single expression evaluated with the raw record bound
//! as `data`; its value is the normalized record, e.g.
//!
//! ```text
//! {"product_id": data.asset_id | string, "title": data.asset_title}
//! ```

use crate::transform::{TransformError, Transformer};
use minijinja::{context, Environment, Expression};
use serde_json::Value;

pub struct ExpressionTransformer {
    expression: Expression<'static, 'static>,
    source: String,
}

impl ExpressionTransformer {
    /// Compile the expression once; syntax errors are rejected here
    pub fn new(
        env: &'static Environment<'static>,
        source: impl Into<String>,
    ) -> Result<Self, TransformError> {
        let source = source.into().trim().to_string();
        let expression = env.compile_expression_owned(source.clone())?;
        Ok(Self { expression, source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Transformer for ExpressionTransformer {
    fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        let output = self.expression.eval(context! { data => record })?;
        Ok(serde_json::to_value(&output)?)
    }

    fn kind(&self) -> &'static str {
        "expression"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transform::shared_environment;
    use serde_json::json;

    fn env() -> &'static Environment<'static> {
        shared_environment(None)
    }

    #[test]
    fn test_object_expression() {
        let transformer = ExpressionTransformer::new(
            env(),
            r#"{"product_id": data.asset_id | string, "title": data.asset_title}"#,
        )
        .unwrap();

        let out = transformer
            .transform(&json!({"asset_id": 123, "asset_title": "t"}))
            .unwrap();
        assert_eq!(out, json!({"product_id": "123", "title": "t"}));
    }

    #[test]
    fn test_compiled_expression_is_reused() {
        let transformer =
            ExpressionTransformer::new(env(), r#"  {"user_id": data.id | string}  "#).unwrap();
        assert_eq!(transformer.source(), r#"{"user_id": data.id | string}"#);

        for id in 0..3 {
            assert_eq!(
                transformer.transform(&json!({"id": id})).unwrap(),
                json!({"user_id": id.to_string()})
            );
        }
    }

    #[test]
    fn test_expression_with_filters() {
        let transformer = ExpressionTransformer::new(
            env(),
            r#"{"product_id": data.sku, "tags": data.tags | split, "categories": data.cat | convert_categories}"#,
        )
        .unwrap();

        let out = transformer
            .transform(&json!({"sku": "A1", "tags": "x,y", "cat": "Shoes"}))
            .unwrap();
        assert_eq!(
            out,
            json!({"product_id": "A1", "tags": ["x", "y"], "categories": [["Shoes"]]})
        );
    }

    #[test]
    fn test_conditional_expression_can_skip() {
        let transformer = ExpressionTransformer::new(
            env(),
            r#"{"user_id": data.id} if data.active else none"#,
        )
        .unwrap();

        assert_eq!(
            transformer.transform(&json!({"id": "u1", "active": true})).unwrap(),
            json!({"user_id": "u1"})
        );
        assert_eq!(
            transformer.transform(&json!({"id": "u2", "active": false})).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        assert!(ExpressionTransformer::new(env(), "{\"a\": ").is_err());
    }

    #[test]
    fn test_filter_failure_is_a_transform_error() {
        let transformer =
            ExpressionTransformer::new(env(), r#"{"user_id": "u", "created_at": data.ts | datetime_format}"#)
                .unwrap();
        let err = transformer.transform(&json!({"ts": "not a date"})).unwrap_err();
        assert!(matches!(err, TransformError::Template(_)));
    }
}
