//! Text-template transformer
//!
//! The template renders JSON text with the raw record bound as `data`.

use crate::transform::{TransformError, Transformer};
use minijinja::{context, Environment};
use serde_json::Value;

pub struct TextTemplateTransformer {
    env: &'static Environment<'static>,
    name: String,
}

impl TextTemplateTransformer {
    /// Bind to a template the environment can resolve by name
    pub fn new(env: &'static Environment<'static>, name: impl Into<String>) -> Result<Self, TransformError> {
        let name = name.into();
        env.get_template(&name)?;
        Ok(Self { env, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transformer for TextTemplateTransformer {
    fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        let template = self.env.get_template(&self.name)?;
        let rendered = template.render(context! { data => record })?;
        Ok(serde_json::from_str(&rendered)?)
    }

    fn kind(&self) -> &'static str {
        "text"
    }
}
