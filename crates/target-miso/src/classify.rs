//! Entity classification
//!
//! A normalized record is a product, a user or an interaction, decided by
//! which identifying fields it carries.

use crate::record::Record;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Kind of entity a record describes, also the remote collection name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    #[serde(rename = "products")]
    Product,
    #[serde(rename = "users")]
    User,
    #[serde(rename = "interactions")]
    Interaction,
}

/// Order in which buffered batches are drained
pub const FLUSH_ORDER: [EntityKind; 3] =
    [EntityKind::Product, EntityKind::Interaction, EntityKind::User];

impl EntityKind {
    /// Collection name used in API paths
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::User => "users",
            EntityKind::Interaction => "interactions",
        }
    }

    /// Identifying field, if records of this kind have one
    pub fn id_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Product => Some("product_id"),
            EntityKind::User => Some("user_id"),
            EntityKind::Interaction => None,
        }
    }

    /// Key of the id list in a delete request body
    pub fn id_list_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Product => Some("product_ids"),
            EntityKind::User => Some("user_ids"),
            EntityKind::Interaction => None,
        }
    }

    /// Whether stale remote records of this kind can be deleted
    pub fn is_reconcilable(&self) -> bool {
        self.id_field().is_some()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ClassifyError {
    #[error("record has none of product_id, user_id or type+user_id/anonymous_id (keys: {keys:?})")]
    Unrecognized { keys: Vec<String> },

    #[error("field '{field}' must be a string or number, got {value}")]
    InvalidId { field: &'static str, value: Value },
}

/// Classify a normalized record
pub fn classify(record: &Record) -> Result<EntityKind, ClassifyError> {
    if record.contains_key("product_id") {
        return Ok(EntityKind::Product);
    }
    if record.contains_key("type")
        && (record.contains_key("user_id") || record.contains_key("anonymous_id"))
    {
        return Ok(EntityKind::Interaction);
    }
    if record.contains_key("user_id") {
        return Ok(EntityKind::User);
    }
    Err(ClassifyError::Unrecognized {
        keys: record.keys().cloned().collect(),
    })
}

/// Extract the entity id of a classified record
///
/// Interactions have no id and yield `Ok(None)`.
pub fn entity_id(kind: EntityKind, record: &Record) -> Result<Option<String>, ClassifyError> {
    let Some(field) = kind.id_field() else {
        return Ok(None);
    };

    match record.get(field) {
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(Value::Number(id)) => Ok(Some(id.to_string())),
        other => Err(ClassifyError::InvalidId {
            field,
            value: other.cloned().unwrap_or(Value::Null),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(
            classify(&record(json!({"product_id": "p"}))).unwrap(),
            EntityKind::Product
        );
        assert_eq!(
            classify(&record(json!({"user_id": "u"}))).unwrap(),
            EntityKind::User
        );
        assert_eq!(
            classify(&record(json!({"type": "view", "user_id": "u"}))).unwrap(),
            EntityKind::Interaction
        );
        assert_eq!(
            classify(&record(json!({"type": "view", "anonymous_id": "a"}))).unwrap(),
            EntityKind::Interaction
        );
    }

    #[test]
    fn test_product_id_takes_precedence() {
        // an interaction that also mentions a product is still a product upsert
        let r = record(json!({"type": "view", "user_id": "u", "product_id": "p"}));
        assert_eq!(classify(&r).unwrap(), EntityKind::Product);
    }

    #[test]
    fn test_type_without_actor_is_unclassified() {
        let err = classify(&record(json!({"type": "view"}))).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::Unrecognized {
                keys: vec!["type".to_string()]
            }
        );
    }

    #[test]
    fn test_classification_is_total_over_key_subsets() {
        let keys = ["product_id", "user_id", "anonymous_id", "type"];
        for mask in 0..16u32 {
            let mut r = Record::new();
            for (bit, key) in keys.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    r.insert(key.to_string(), json!("x"));
                }
            }
            let expected = if r.contains_key("product_id") {
                Some(EntityKind::Product)
            } else if r.contains_key("type")
                && (r.contains_key("user_id") || r.contains_key("anonymous_id"))
            {
                Some(EntityKind::Interaction)
            } else if r.contains_key("user_id") {
                Some(EntityKind::User)
            } else {
                None
            };
            assert_eq!(classify(&r).ok(), expected, "mask {}", mask);
        }
    }

    #[test]
    fn test_entity_id() {
        let product = record(json!({"product_id": "abc"}));
        assert_eq!(
            entity_id(EntityKind::Product, &product).unwrap().as_deref(),
            Some("abc")
        );

        let user = record(json!({"user_id": 42}));
        assert_eq!(
            entity_id(EntityKind::User, &user).unwrap().as_deref(),
            Some("42")
        );

        let interaction = record(json!({"type": "view", "user_id": "u"}));
        assert_eq!(entity_id(EntityKind::Interaction, &interaction).unwrap(), None);
    }

    #[test]
    fn test_entity_id_rejects_null() {
        let product = record(json!({"product_id": null}));
        assert!(matches!(
            entity_id(EntityKind::Product, &product),
            Err(ClassifyError::InvalidId { field: "product_id", .. })
        ));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(EntityKind::Product.to_string(), "products");
        assert_eq!(EntityKind::Interaction.id_list_field(), None);
        assert_eq!(EntityKind::User.id_list_field(), Some("user_ids"));
        assert!(!EntityKind::Interaction.is_reconcilable());
        assert_eq!(
            FLUSH_ORDER,
            [EntityKind::Product, EntityKind::Interaction, EntityKind::User]
        );
    }
}
