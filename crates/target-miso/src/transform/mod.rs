//! Record transformers
//!
//! Each stream is bound to one [`Transformer`] that maps a raw input record
//! to a normalized record. Templates loaded from the template folder and
//! callbacks registered in code all go through the same trait, so the
//! pipeline never needs to know which kind it is holding.

pub mod engine;
pub mod expression;
pub mod filters;
pub mod function;
pub mod loader;
pub mod text;

pub use engine::{shared_environment, template_environment};
pub use expression::ExpressionTransformer;
pub use function::FunctionTransformer;
pub use loader::load_templates;
pub use text::TextTemplateTransformer;

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Per-record transform failure; the record is skipped
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("template evaluation failed: {0}")]
    Template(#[from] minijinja::Error),

    #[error("template output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("transform produced {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("{0}")]
    Custom(String),
}

impl TransformError {
    /// Create an error from a custom transform function
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Maps a raw record to a normalized one
pub trait Transformer: Send + Sync {
    fn transform(&self, record: &Value) -> Result<Value, TransformError>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

/// Stream name to transformer
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Box<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a transformer to a stream, replacing any earlier one
    pub fn register(&mut self, stream: impl Into<String>, transformer: Box<dyn Transformer>) {
        let stream = stream.into();
        let kind = transformer.kind();
        if let Some(previous) = self.transformers.insert(stream.clone(), transformer) {
            warn!(
                stream = %stream,
                replaced = previous.kind(),
                by = kind,
                "Replacing transformer for stream"
            );
        }
    }

    /// Bind a callback to a stream
    pub fn register_fn<F>(&mut self, stream: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.register(stream, Box::new(FunctionTransformer::new(func)));
    }

    pub fn get(&self, stream: &str) -> Option<&dyn Transformer> {
        self.transformers.get(stream).map(|t| t.as_ref())
    }

    pub fn contains(&self, stream: &str) -> bool {
        self.transformers.contains_key(stream)
    }

    /// Registered stream names, sorted
    pub fn streams(&self) -> Vec<&str> {
        let mut streams: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        streams.sort_unstable();
        streams
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("streams", &self.streams())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_fn_and_get() {
        let mut registry = TransformerRegistry::new();
        registry.register_fn("users", |record| {
            Ok(json!({"user_id": record["id"].clone()}))
        });

        assert!(registry.contains("users"));
        assert!(!registry.contains("products"));
        let out = registry
            .get("users")
            .unwrap()
            .transform(&json!({"id": "u1"}))
            .unwrap();
        assert_eq!(out, json!({"user_id": "u1"}));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = TransformerRegistry::new();
        registry.register_fn("s", |_| Ok(json!({"v": 1})));
        registry.register_fn("s", |_| Ok(json!({"v": 2})));

        assert_eq!(registry.len(), 1);
        let out = registry.get("s").unwrap().transform(&json!({})).unwrap();
        assert_eq!(out, json!({"v": 2}));
    }

    #[test]
    fn test_streams_are_sorted() {
        let mut registry = TransformerRegistry::new();
        assert!(registry.is_empty());
        for stream in ["orders", "assets", "members"] {
            registry.register_fn(stream, |r| Ok(r.clone()));
        }
        assert_eq!(registry.streams(), vec!["assets", "members", "orders"]);
    }
}
