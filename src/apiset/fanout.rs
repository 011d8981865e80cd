//! Fan-out rules
//!
//! Some endpoints return one logical item that really offers several
//! user-selectable targets, e.g. the log of a pod with several containers.
//! A [`FanOutRule`] detects that shape and produces a chooser whose candidates
//! re-request the same URL with a selector query parameter.

use super::{
    string_at, value_at, AmbiguousExpansion, ApiSetError, CatalogBackend, SubResource,
};
use crate::catalog::{EndpointTemplate, ResourceType, Verb};
use crate::context::RequestContext;
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutRule {
    /// Endpoint template of the resource type the rule applies to.
    /// Placeholder names are not significant.
    pub template: String,
    /// Dot path of the candidate list in the parent resource
    pub candidates_path: String,
    /// Dot path of a candidate's name within the list entry
    pub candidate_name_path: String,
    /// Query parameter carrying the chosen candidate
    pub selector_param: String,
    pub prompt: String,
    /// Plural noun used in error messages
    pub candidates_noun: String,
}

impl FanOutRule {
    /// `.../pods/{name}/log` with more than one container
    pub fn container_logs() -> Self {
        Self {
            template: "/api/v1/namespaces/{namespace}/pods/{name}/log".to_string(),
            candidates_path: "spec.containers".to_string(),
            candidate_name_path: "name".to_string(),
            selector_param: "container".to_string(),
            prompt: "Pick a container to view logs".to_string(),
            candidates_noun: "containers".to_string(),
        }
    }

    /// Applies to nodes of the rule's resource type whose URL has no selector yet
    pub fn applies_to(&self, resource_type: &ResourceType, url: &str) -> bool {
        let same_type = EndpointTemplate::parse(&self.template, None)
            .map(|t| t.condensed() == resource_type.endpoint.condensed())
            .unwrap_or(false);
        if !same_type {
            return false;
        }

        let selected = split_query(url)
            .1
            .map(|q| {
                q.split('&')
                    .any(|pair| pair.split('=').next() == Some(self.selector_param.as_str()))
            })
            .unwrap_or(false);
        !selected
    }

    /// URL of the parent resource that lists the candidates, built from the
    /// values captured by the resource type's own template
    pub fn candidates_url(&self, resource_type: &ResourceType, url: &str) -> Result<String, ApiSetError> {
        let endpoint = &resource_type.endpoint;
        let values = endpoint
            .match_url(url)
            .ok_or_else(|| ApiSetError::TemplateMismatch {
                url: url.to_string(),
                template: endpoint.template_url().to_string(),
            })?;
        let parent = endpoint.prefix(endpoint.segment_count().saturating_sub(1));
        Ok(parent.build_url(&values)?)
    }

    pub fn selector_url(&self, url: &str, candidate: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            url,
            separator,
            self.selector_param,
            urlencoding::encode(candidate)
        )
    }

    pub fn candidate_names(&self, parent: &serde_json::Value) -> Vec<String> {
        value_at(parent, &self.candidates_path)
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| string_at(entry, &self.candidate_name_path))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn chooser(
        &self,
        node: &TreeNode,
        resource_type: &ResourceType,
        names: &[String],
    ) -> AmbiguousExpansion {
        let shared = Arc::new(resource_type.clone());
        let candidates = names
            .iter()
            .map(|name| SubResource {
                id: format!("{}/{}", node.id, name),
                name: name.clone(),
                resource_type: Arc::clone(&shared),
                expand_url: self.selector_url(&node.expand_url, name),
                delete_url: String::new(),
            })
            .collect();

        AmbiguousExpansion {
            prompt: self.prompt.clone(),
            candidates,
        }
    }

    /// Fetch the parent resource and return a chooser when there is more than one candidate.
    /// A single candidate returns `None` so the caller makes the plain request.
    pub async fn evaluate(
        &self,
        ctx: &RequestContext,
        backend: &CatalogBackend,
        node: &TreeNode,
        resource_type: &ResourceType,
    ) -> Result<Option<AmbiguousExpansion>, ApiSetError> {
        if !self.applies_to(resource_type, &node.expand_url) {
            return Ok(None);
        }

        let candidates_url = self.candidates_url(resource_type, &node.expand_url)?;
        let response = backend.fetch(ctx, Verb::Get, &candidates_url).await?;
        let parent = backend
            .format()
            .parse(&response.body)
            .map_err(|reason| ApiSetError::InvalidResponse {
                url: candidates_url.clone(),
                reason,
            })?;

        let names = self.candidate_names(&parent);
        tracing::debug!("{} has {} {}", candidates_url, names.len(), self.candidates_noun);
        match names.len() {
            0 => Err(ApiSetError::NoCandidates {
                url: candidates_url,
                what: self.candidates_noun.clone(),
            }),
            1 => Ok(None),
            _ => Ok(Some(self.chooser(node, resource_type, &names))),
        }
    }
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOG_URL: &str = "/api/v1/namespaces/default/pods/web/log";

    fn rt(template: &str) -> ResourceType {
        ResourceType {
            display: template.rsplit('/').next().unwrap_or_default().to_string(),
            endpoint: EndpointTemplate::parse(template, None).unwrap(),
            verb: Some(Verb::Get),
            delete_endpoint: None,
            patch_endpoint: None,
            put_endpoint: None,
            children: Vec::new(),
            sub_resources: Vec::new(),
        }
    }

    #[test]
    fn test_applies_only_to_log_type_without_selector() {
        let rule = FanOutRule::container_logs();
        let log = rt("/api/v1/namespaces/{ns}/pods/{pod}/log");
        assert!(rule.applies_to(&log, LOG_URL));
        assert!(rule.applies_to(&log, "/api/v1/namespaces/default/pods/web/log?tailLines=10"));
        assert!(!rule.applies_to(&log, "/api/v1/namespaces/default/pods/web/log?container=main"));
    }

    #[test]
    fn test_object_named_log_is_not_a_log_endpoint() {
        let rule = FanOutRule::container_logs();
        let pod = rt("/api/v1/namespaces/{namespace}/pods/{name}");
        assert!(!rule.applies_to(&pod, "/api/v1/namespaces/default/pods/log"));
        let config_map = rt("/api/v1/namespaces/{namespace}/configmaps/{name}");
        assert!(!rule.applies_to(&config_map, "/api/v1/namespaces/default/configmaps/log"));
    }

    #[test]
    fn test_candidates_and_selector_urls() {
        let rule = FanOutRule::container_logs();
        let log = rt("/api/v1/namespaces/{namespace}/pods/{name}/log");
        assert_eq!(
            rule.candidates_url(&log, LOG_URL).unwrap(),
            "/api/v1/namespaces/default/pods/web"
        );
        assert!(matches!(
            rule.candidates_url(&log, "/api/v1/namespaces/default/pods"),
            Err(ApiSetError::TemplateMismatch { .. })
        ));
        assert_eq!(
            rule.selector_url(LOG_URL, "side car"),
            "/api/v1/namespaces/default/pods/web/log?container=side%20car"
        );
        assert_eq!(rule.selector_url("/x/log?a=1", "m"), "/x/log?a=1&container=m");
    }

    #[test]
    fn test_chooser_lists_candidates_in_order() {
        let rule = FanOutRule::container_logs();
        let parent = json!({ "spec": { "containers": [
            { "name": "init" }, { "name": "main" }, { "name": "sidecar" }
        ] } });
        let names = rule.candidate_names(&parent);

        let node = TreeNode::new("cluster/pods/web/log", "log", LOG_URL);
        let log = rt("/api/v1/namespaces/{namespace}/pods/{name}/log");

        let chooser = rule.chooser(&node, &log, &names);
        assert_eq!(chooser.prompt, "Pick a container to view logs");
        let urls: Vec<&str> = chooser.candidates.iter().map(|c| c.expand_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "/api/v1/namespaces/default/pods/web/log?container=init",
                "/api/v1/namespaces/default/pods/web/log?container=main",
                "/api/v1/namespaces/default/pods/web/log?container=sidecar",
            ]
        );
        assert_eq!(chooser.candidates[1].id, "cluster/pods/web/log/main");
    }
}
