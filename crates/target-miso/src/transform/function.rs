//! Transformer backed by a callback registered in code
//!
//! Callbacks holding chrono datetimes render them with
//! [`timestamp_value`](crate::record::timestamp_value).

use crate::transform::{TransformError, Transformer};
use serde_json::Value;

pub struct FunctionTransformer<F> {
    func: F,
}

impl<F> FunctionTransformer<F>
where
    F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Transformer for FunctionTransformer<F>
where
    F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync,
{
    fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        (self.func)(record)
    }

    fn kind(&self) -> &'static str {
        "function"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::timestamp_value;
    use chrono::DateTime;
    use serde_json::json;

    #[test]
    fn test_callback_errors_pass_through() {
        let transformer = FunctionTransformer::new(|record: &Value| {
            record
                .get("sku")
                .map(|sku| json!({"product_id": sku}))
                .ok_or_else(|| TransformError::custom("missing sku"))
        });

        assert_eq!(
            transformer.transform(&json!({"sku": "A1"})).unwrap(),
            json!({"product_id": "A1"})
        );
        let err = transformer.transform(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "missing sku");
        assert_eq!(transformer.kind(), "function");
    }

    #[test]
    fn test_callback_renders_datetimes() {
        let transformer = FunctionTransformer::new(|record: &Value| {
            let millis = record["ts_ms"]
                .as_i64()
                .ok_or_else(|| TransformError::custom("missing ts_ms"))?;
            let dt = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| TransformError::custom("ts_ms out of range"))?;
            Ok(json!({"type": "search", "anonymous_id": "a1", "timestamp": timestamp_value(&dt)}))
        });

        let out = transformer
            .transform(&json!({"ts_ms": 1648320353250_i64}))
            .unwrap();
        assert_eq!(out["timestamp"], json!("2022-03-26T18:45:53+00:00"));
    }
}
