//! Displays a JSON document carried in node metadata

use super::{ExpandError, Expander, ExpanderResponse, ExpanderResult};
use crate::context::RequestContext;
use crate::tree::{ResponseType, TreeNode, METADATA_JSON_ITEM};
use async_trait::async_trait;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExpander;

#[async_trait]
impl Expander for JsonExpander {
    fn name(&self) -> &str {
        "JsonExpander"
    }

    fn does_expand(&self, node: &TreeNode) -> bool {
        node.metadata.contains_key(METADATA_JSON_ITEM)
    }

    async fn expand(
        &self,
        _ctx: &RequestContext,
        node: &TreeNode,
    ) -> Result<ExpanderResult, ExpandError> {
        Ok(ExpanderResult {
            response: node.metadata_value(METADATA_JSON_ITEM).map(|json| ExpanderResponse {
                response: json.to_string(),
                response_type: ResponseType::Json,
            }),
            source_description: "Embedded JSON".to_string(),
            is_primary_response: true,
            ..Default::default()
        })
    }
}
