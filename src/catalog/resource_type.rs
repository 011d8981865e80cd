//! Resource Types
//!
//! The runtime view of the catalog: what can be listed, deleted or updated,
//! and which types sit beneath each other.

use super::document::Verb;
use super::path::Path;
use super::template::{most_specific_match, EndpointTemplate, TemplateValues};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub display: String,
    pub endpoint: EndpointTemplate,
    /// Verb used to read the resource; `None` for grouping-only types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_endpoint: Option<EndpointTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_endpoint: Option<EndpointTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_endpoint: Option<EndpointTemplate>,
    /// Auto-loaded: URL buildable from the parent's values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResourceType>,
    /// Discovered from the parent's response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_resources: Vec<ResourceType>,
}

impl ResourceType {
    /// Materialize a path subtree. Returns `None` for subtrees with nothing to offer.
    pub fn from_path(path: &Path) -> Option<Self> {
        let children: Vec<_> = path.children.iter().filter_map(Self::from_path).collect();
        let sub_resources: Vec<_> = path.sub_paths.iter().filter_map(Self::from_path).collect();

        if !path.operations.any_permitted() && children.is_empty() && sub_resources.is_empty() {
            return None;
        }

        let get = &path.operations.get;
        let endpoint_if = |verb: Verb| {
            path.operations
                .get(verb)
                .permitted
                .then(|| path.endpoint_for(verb).clone())
        };

        Some(Self {
            display: path.name.clone(),
            endpoint: path.endpoint_for(Verb::Get).clone(),
            verb: get.permitted.then(|| get.verb.unwrap_or(Verb::Get)),
            delete_endpoint: endpoint_if(Verb::Delete),
            patch_endpoint: endpoint_if(Verb::Patch),
            put_endpoint: endpoint_if(Verb::Put),
            children,
            sub_resources,
        })
    }

    /// Depth-first walk over this type and everything beneath it
    pub fn flatten(&self) -> Vec<&ResourceType> {
        let mut out = vec![self];
        for child in self.children.iter().chain(&self.sub_resources) {
            out.extend(child.flatten());
        }
        out
    }

    pub fn is_readable(&self) -> bool {
        self.verb.is_some()
    }
}

/// Outcome of resolving a URL to one of several resource types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMatch<'a> {
    Found(&'a ResourceType, TemplateValues),
    NotFound,
    /// Two equally specific types matched
    Ambiguous(&'a ResourceType, &'a ResourceType),
}

/// Find the unique most specific type whose endpoint matches `url`
pub fn resolve_resource_type<'a>(candidates: &[&'a ResourceType], url: &str) -> TypeMatch<'a> {
    match most_specific_match(candidates.iter().map(|t| &t.endpoint), url) {
        Ok(Some((index, values))) => TypeMatch::Found(candidates[index], values),
        Ok(None) => TypeMatch::NotFound,
        Err((a, b)) => TypeMatch::Ambiguous(candidates[a], candidates[b]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::path::PathOperation;

    fn path(template: &str, verbs: &[Verb]) -> Path {
        let mut p = Path::new(EndpointTemplate::parse(template, None).unwrap());
        for verb in verbs {
            p.operations.get_mut(*verb).permitted = true;
        }
        p
    }

    #[test]
    fn test_from_path_sets_crud_endpoints() {
        let mut sites = path("/sites", &[Verb::Get]);
        sites.sub_paths.push(path("/sites/{name}", &[Verb::Get, Verb::Delete, Verb::Put]));

        let rt = ResourceType::from_path(&sites).unwrap();
        assert_eq!(rt.display, "sites");
        assert_eq!(rt.verb, Some(Verb::Get));
        assert!(rt.delete_endpoint.is_none());

        let site = &rt.sub_resources[0];
        assert_eq!(site.display, "{name}");
        assert_eq!(
            site.delete_endpoint.as_ref().unwrap().template_url(),
            "/sites/{name}"
        );
        assert!(site.put_endpoint.is_some());
        assert!(site.patch_endpoint.is_none());
    }

    #[test]
    fn test_get_override_uses_operation_endpoint_and_verb() {
        let mut settings = path("/sites/{name}/config/appsettings", &[]);
        settings.operations.get = PathOperation {
            permitted: true,
            verb: Some(Verb::Post),
            endpoint: Some(EndpointTemplate::parse("/sites/{name}/config/appsettings/list", None).unwrap()),
            asserted_by: None,
        };

        let rt = ResourceType::from_path(&settings).unwrap();
        assert_eq!(rt.display, "appsettings");
        assert_eq!(rt.verb, Some(Verb::Post));
        assert_eq!(rt.endpoint.template_url(), "/sites/{name}/config/appsettings/list");
    }

    #[test]
    fn test_empty_subtrees_are_dropped_and_groupings_kept() {
        let mut providers = path("/rg/{rg}/providers", &[]);
        assert!(ResourceType::from_path(&providers).is_none());

        providers.children.push(path("/rg/{rg}/providers/sites", &[Verb::Get]));
        let rt = ResourceType::from_path(&providers).unwrap();
        assert!(!rt.is_readable());
        assert_eq!(rt.children.len(), 1);
        assert_eq!(rt.flatten().len(), 2);
    }

    #[test]
    fn test_resolve_resource_type() {
        let a = ResourceType::from_path(&path("/pods/{name}", &[Verb::Get])).unwrap();
        let b = ResourceType::from_path(&path("/pods/special", &[Verb::Get])).unwrap();
        let candidates = vec![&a, &b];

        match resolve_resource_type(&candidates, "/pods/web-1") {
            TypeMatch::Found(rt, values) => {
                assert_eq!(rt.display, "{name}");
                assert_eq!(values["name"], "web-1");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            resolve_resource_type(&candidates, "/pods/special"),
            TypeMatch::Found(rt, _) if rt.display == "special"
        ));
        assert_eq!(resolve_resource_type(&candidates, "/nodes/x"), TypeMatch::NotFound);
    }
}
