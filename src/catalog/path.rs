//! Path records
//!
//! The compile-time intermediate between spec documents and resource types.
//! One [`Path`] per condensed path; operations record which verbs are
//! permitted and any verb or endpoint overrides.

use super::config::CatalogConfig;
use super::document::{SpecDocument, Verb};
use super::template::EndpointTemplate;
use serde::{Deserialize, Serialize};

/// One HTTP verb on a path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOperation {
    pub permitted: bool,
    /// Set when the verb is overridden, e.g. a logical GET issued as POST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    /// Set when the operation uses a different endpoint than the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointTemplate>,
    /// Document that asserted `permitted`; `None` means no document mentioned the verb
    #[serde(skip)]
    pub asserted_by: Option<String>,
}

impl PathOperation {
    fn asserted(permitted: bool, source: &str) -> Self {
        Self {
            permitted,
            asserted_by: Some(source.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOperations {
    pub get: PathOperation,
    pub put: PathOperation,
    pub post: PathOperation,
    pub delete: PathOperation,
    pub patch: PathOperation,
}

impl PathOperations {
    pub fn get(&self, verb: Verb) -> &PathOperation {
        match verb {
            Verb::Get => &self.get,
            Verb::Put => &self.put,
            Verb::Post => &self.post,
            Verb::Delete => &self.delete,
            Verb::Patch => &self.patch,
        }
    }

    pub fn get_mut(&mut self, verb: Verb) -> &mut PathOperation {
        match verb {
            Verb::Get => &mut self.get,
            Verb::Put => &mut self.put,
            Verb::Post => &mut self.post,
            Verb::Delete => &mut self.delete,
            Verb::Patch => &mut self.patch,
        }
    }

    pub fn any_permitted(&self) -> bool {
        Verb::ALL.iter().any(|v| self.get(*v).permitted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub name: String,
    /// Merge key: the override-resolved path with placeholder names erased
    pub condensed_path: String,
    /// The logical endpoint; operations may override it
    pub endpoint: EndpointTemplate,
    pub operations: PathOperations,
    #[serde(default)]
    pub children: Vec<Path>,
    #[serde(default)]
    pub sub_paths: Vec<Path>,
    /// Whether a config override applied to any contributing raw path
    #[serde(skip)]
    pub overridden: bool,
}

impl Path {
    pub fn new(endpoint: EndpointTemplate) -> Self {
        Self {
            name: last_segment(endpoint.template_url()),
            condensed_path: endpoint.condensed(),
            endpoint,
            operations: PathOperations::default(),
            children: Vec::new(),
            sub_paths: Vec::new(),
            overridden: false,
        }
    }

    /// Endpoint for an operation, honouring per-operation overrides
    pub fn endpoint_for(&self, verb: Verb) -> &EndpointTemplate {
        self.operations
            .get(verb)
            .endpoint
            .as_ref()
            .unwrap_or(&self.endpoint)
    }
}

fn last_segment(template: &str) -> String {
    template
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(template)
        .to_string()
}

fn parse_template(source: &str, path: &str, api_version: Option<&str>) -> Option<EndpointTemplate> {
    match EndpointTemplate::parse(path, api_version) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!("Skipping path in {}: {}", source, e);
            None
        }
    }
}

/// Enumerate every path of a document, applying the config overrides.
///
/// Malformed paths are logged and skipped.
pub fn paths_from_document(doc: &SpecDocument, config: &CatalogConfig) -> Vec<Path> {
    let api_version = if config.suppress_api_version {
        None
    } else {
        doc.api_version.as_deref()
    };

    let mut paths = Vec::new();
    for entry in &doc.paths {
        let over = config.override_for(&entry.path);
        let logical = over
            .and_then(|o| o.path.as_deref())
            .unwrap_or(entry.path.as_str());
        let rewrite = over.map(|o| o.rewrite_path).unwrap_or(false);

        let Some(endpoint) = parse_template(&doc.source, logical, api_version) else {
            continue;
        };

        // Without a rewrite, requests still go to the raw path
        let raw_endpoint = if logical != entry.path && !rewrite {
            match parse_template(&doc.source, &entry.path, api_version) {
                Some(t) => Some(t),
                None => continue,
            }
        } else {
            None
        };

        let mut path = Path::new(endpoint);
        path.overridden = over.is_some();

        for op in &entry.operations {
            let operation = path.operations.get_mut(op.verb);
            *operation = PathOperation::asserted(!op.deprecated, &doc.source);
            operation.endpoint = raw_endpoint.clone();
        }

        if let Some(over) = over {
            if let Some(get_verb) = over.get_verb {
                if let Some(op) = entry.operation(get_verb) {
                    path.operations.get = PathOperation {
                        verb: Some(get_verb),
                        endpoint: raw_endpoint.clone(),
                        ..PathOperation::asserted(!op.deprecated, &doc.source)
                    };
                }
            }

            for (verb, alt) in [(Verb::Put, &over.put_path), (Verb::Delete, &over.delete_path)] {
                let Some(alt) = alt else {
                    continue;
                };
                if let Some(t) = parse_template(&doc.source, alt, api_version) {
                    *path.operations.get_mut(verb) = PathOperation {
                        endpoint: Some(t),
                        ..PathOperation::asserted(true, &doc.source)
                    };
                }
            }
        }

        paths.push(path);
    }

    paths
}

/// Synthetic GET-only paths from `additional_get_paths`
pub fn additional_get_paths(config: &CatalogConfig, api_version: Option<&str>) -> Vec<Path> {
    let api_version = if config.suppress_api_version {
        None
    } else {
        api_version
    };

    config
        .additional_get_paths
        .iter()
        .filter_map(|raw| parse_template("config", raw, api_version))
        .map(|endpoint| {
            let mut path = Path::new(endpoint);
            path.operations.get = PathOperation::asserted(true, "config");
            path.overridden = true;
            path
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::config::PathOverride;
    use serde_json::json;

    const LIST_PATH: &str = "/sites/{name}/config/appsettings/list";
    const LOGICAL_PATH: &str = "/sites/{name}/config/appsettings";

    fn web_doc() -> SpecDocument {
        SpecDocument::from_value(
            "web.json",
            &json!({
                "info": { "version": "2019-08-01" },
                "paths": {
                    "/sites/{name}": { "get": {}, "delete": {} },
                    "/sites/{name}/config/appsettings/list": { "post": {} }
                }
            }),
            "",
        )
        .unwrap()
    }

    #[test]
    fn test_records_permitted_verbs() {
        let paths = paths_from_document(&web_doc(), &CatalogConfig::default());
        let site = paths.iter().find(|p| p.name == "{name}").unwrap();
        assert!(site.operations.get.permitted);
        assert!(site.operations.delete.permitted);
        assert!(!site.operations.put.permitted);
        assert_eq!(site.operations.put.asserted_by, None);
        assert_eq!(site.operations.get.asserted_by.as_deref(), Some("web.json"));
        assert_eq!(site.endpoint.api_version(), Some("2019-08-01"));
        assert_eq!(site.condensed_path, "/sites/{}");
    }

    #[test]
    fn test_get_verb_override_maps_post_to_logical_get() {
        let mut config = CatalogConfig::default();
        config.overrides.insert(
            LIST_PATH.to_string(),
            PathOverride {
                path: Some(LOGICAL_PATH.to_string()),
                get_verb: Some(Verb::Post),
                ..Default::default()
            },
        );

        let paths = paths_from_document(&web_doc(), &config);
        let settings = paths.iter().find(|p| p.name == "appsettings").unwrap();
        assert_eq!(settings.endpoint.template_url(), LOGICAL_PATH);
        assert!(settings.operations.get.permitted);
        assert_eq!(settings.operations.get.verb, Some(Verb::Post));
        assert_eq!(settings.endpoint_for(Verb::Get).template_url(), LIST_PATH);
        assert!(settings.overridden);
    }

    #[test]
    fn test_rewrite_path_uses_replacement_for_urls() {
        let mut config = CatalogConfig::default();
        config.overrides.insert(
            "/sites/{name}".to_string(),
            PathOverride {
                path: Some("/sites/{siteName}".to_string()),
                rewrite_path: true,
                ..Default::default()
            },
        );
        config.suppress_api_version = true;

        let paths = paths_from_document(&web_doc(), &config);
        let site = paths.iter().find(|p| p.name == "{siteName}").unwrap();
        assert_eq!(site.endpoint_for(Verb::Get).template_url(), "/sites/{siteName}");
        assert_eq!(site.endpoint_for(Verb::Delete).template_url(), "/sites/{siteName}");
        assert_eq!(site.endpoint.api_version(), None);
    }

    #[test]
    fn test_additional_get_paths() {
        let config = CatalogConfig {
            additional_get_paths: vec!["/api/v1/namespaces/{namespace}/pods/{name}/log".to_string()],
            ..Default::default()
        };
        let paths = additional_get_paths(&config, Some("v1"));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].name, "log");
        assert!(paths[0].operations.get.permitted);
        assert_eq!(paths[0].endpoint.api_version(), Some("v1"));
    }
}
