//! Tree Model
//!
//! [`TreeNode`] is the only contract between the expansion engine and whatever
//! renders the tree. Nodes are built by the expander that creates them and
//! are not changed after being handed out.

use crate::catalog::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Item type of a node backed by a catalog resource type
pub const ITEM_TYPE_RESOURCE: &str = "resource";
/// Item type of a node discovered by listing its parent
pub const ITEM_TYPE_SUB_RESOURCE: &str = "subResource";
/// Item type of a chooser candidate produced by an ambiguous expansion
pub const ITEM_TYPE_CHOICE: &str = "choice";
/// Item type of a node displaying an embedded document
pub const ITEM_TYPE_DOCUMENT: &str = "document";

/// Metadata key holding an embedded JSON document
pub const METADATA_JSON_ITEM: &str = "jsonItem";
/// Metadata key that keeps the generic catalog expander away from a node
pub const METADATA_SUPPRESS_SWAGGER_EXPAND: &str = "SuppressSwaggerExpand";

/// Content type of a response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    None,
    Json,
    Yaml,
    Xml,
    Text,
}

impl ResponseType {
    /// Guess the type from a Content-Type header value
    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("json") {
            ResponseType::Json
        } else if content_type.contains("yaml") {
            ResponseType::Yaml
        } else if content_type.contains("xml") {
            ResponseType::Xml
        } else if content_type.is_empty() {
            ResponseType::None
        } else {
            ResponseType::Text
        }
    }
}

/// One navigable position in the resource tree
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    pub parent_id: String,
    pub id: String,
    pub name: String,
    pub display: String,
    pub expand_url: String,
    pub item_type: String,
    pub expand_return_type: ResponseType,
    /// Empty when the node cannot be deleted
    pub delete_url: String,
    pub namespace: String,
    pub type_name: String,
    pub metadata: HashMap<String, String>,
    /// APISet that produced this node, used to route later expansions
    pub api_set_id: Option<String>,
    pub resource_type: Option<Arc<ResourceType>>,
}

impl TreeNode {
    pub fn new(id: &str, name: &str, expand_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            display: name.to_string(),
            expand_url: expand_url.to_string(),
            ..Default::default()
        }
    }

    pub fn is_deletable(&self) -> bool {
        !self.delete_url.is_empty()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Whether the metadata flag `key` is set to "true"
    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata_value(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_type_from_content_type() {
        assert_eq!(
            ResponseType::from_content_type("application/json; charset=utf-8"),
            ResponseType::Json
        );
        assert_eq!(ResponseType::from_content_type("application/yaml"), ResponseType::Yaml);
        assert_eq!(ResponseType::from_content_type("application/xml"), ResponseType::Xml);
        assert_eq!(ResponseType::from_content_type("text/plain"), ResponseType::Text);
        assert_eq!(ResponseType::from_content_type(""), ResponseType::None);
    }

    #[test]
    fn test_metadata_flag() {
        let mut node = TreeNode::new("id", "name", "/x");
        assert!(!node.metadata_flag(METADATA_SUPPRESS_SWAGGER_EXPAND));
        node.metadata
            .insert(METADATA_SUPPRESS_SWAGGER_EXPAND.to_string(), "True".to_string());
        assert!(node.metadata_flag(METADATA_SUPPRESS_SWAGGER_EXPAND));
        assert!(!node.is_deletable());
    }
}
