//! Spec Documents
//!
//! Reads OpenAPI/Swagger documents and copies out the facts the catalog needs:
//! paths, verbs, parameters and the API version. Nothing from the source
//! document graph is retained after loading.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path as FsPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read spec '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse spec '{source_name}': {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Spec '{source_name}' has no paths")]
    MissingPaths { source_name: String },
}

/// HTTP verbs the catalog tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Put,
    Post,
    Delete,
    Patch,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Put, Verb::Post, Verb::Delete, Verb::Patch];

    /// Key used for the operation in a path item
    pub fn as_key(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Put => "put",
            Verb::Post => "post",
            Verb::Delete => "delete",
            Verb::Patch => "patch",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "get" => Some(Verb::Get),
            "put" => Some(Verb::Put),
            "post" => Some(Verb::Post),
            "delete" => Some(Verb::Delete),
            "patch" => Some(Verb::Patch),
            _ => None,
        }
    }

    pub fn as_method(&self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Put => reqwest::Method::PUT,
            Verb::Post => reqwest::Method::POST,
            Verb::Delete => reqwest::Method::DELETE,
            Verb::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key().to_uppercase())
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEntry {
    pub name: String,
    pub location: String,
    pub required: bool,
    pub default: Option<String>,
}

/// One operation on a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEntry {
    pub verb: Verb,
    pub operation_id: Option<String>,
    /// Deprecated operations are treated as an explicit "not permitted"
    pub deprecated: bool,
    pub parameters: Vec<ParameterEntry>,
}

/// A raw path with its operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
    pub operations: Vec<OperationEntry>,
}

impl PathEntry {
    pub fn operation(&self, verb: Verb) -> Option<&OperationEntry> {
        self.operations.iter().find(|op| op.verb == verb)
    }
}

/// Facts copied out of one spec document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDocument {
    /// File name or label, used when reporting conflicts
    pub source: String,
    pub title: Option<String>,
    pub api_version: Option<String>,
    pub paths: Vec<PathEntry>,
}

impl SpecDocument {
    /// Load a `.json`, `.yaml` or `.yml` document from disk
    pub fn from_path(path: &FsPath) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let source_name = path.display().to_string();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml_str(&source_name, &content, "")
        } else {
            Self::from_json_str(&source_name, &content, "")
        }
    }

    pub fn from_json_str(source: &str, content: &str, path_prefix: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(content).map_err(|e| DocumentError::Parse {
            source_name: source.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_value(source, &value, path_prefix)
    }

    pub fn from_yaml_str(source: &str, content: &str, path_prefix: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| DocumentError::Parse {
            source_name: source.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_value(source, &value, path_prefix)
    }

    /// Extract facts from an already-parsed document.
    ///
    /// `path_prefix` is prepended to every path (some data-plane specs declare
    /// paths relative to a parent resource). `basePath` is honoured when the
    /// caller passes no prefix.
    pub fn from_value(source: &str, doc: &Value, path_prefix: &str) -> Result<Self, DocumentError> {
        let mut entries = Vec::new();
        let mut found_paths = false;

        let prefix = if path_prefix.is_empty() {
            doc.get("basePath")
                .and_then(|v| v.as_str())
                .filter(|p| *p != "/")
                .unwrap_or("")
                .trim_end_matches('/')
                .to_string()
        } else {
            path_prefix.trim_end_matches('/').to_string()
        };

        for key in ["paths", "x-ms-paths"] {
            let Some(paths) = doc.get(key).and_then(|v| v.as_object()) else {
                continue;
            };
            found_paths = true;

            for (raw_path, item) in paths {
                let path_params = collect_parameters(doc, item.get("parameters"));
                let mut operations = Vec::new();

                for verb in Verb::ALL {
                    let Some(op) = item.get(verb.as_key()) else {
                        continue;
                    };
                    let mut parameters = path_params.clone();
                    for param in collect_parameters(doc, op.get("parameters")) {
                        // Operation parameters override path-level ones
                        parameters.retain(|p: &ParameterEntry| {
                            !(p.name == param.name && p.location == param.location)
                        });
                        parameters.push(param);
                    }

                    operations.push(OperationEntry {
                        verb,
                        operation_id: op
                            .get("operationId")
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        deprecated: op
                            .get("deprecated")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false),
                        parameters,
                    });
                }

                entries.push(PathEntry {
                    path: format!("{}{}", prefix, raw_path),
                    operations,
                });
            }
        }

        if !found_paths {
            return Err(DocumentError::MissingPaths {
                source_name: source.to_string(),
            });
        }

        let info = doc.get("info");
        let api_version = api_version_from_parameters(&entries).or_else(|| {
            info.and_then(|i| i.get("version"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });

        Ok(Self {
            source: source.to_string(),
            title: info
                .and_then(|i| i.get("title"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            api_version,
            paths: entries,
        })
    }
}

/// Resolve a parameter list, following local `#/parameters/...` references
fn collect_parameters(doc: &Value, params: Option<&Value>) -> Vec<ParameterEntry> {
    let Some(params) = params.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    params
        .iter()
        .filter_map(|param| {
            let resolved = match param.get("$ref").and_then(|v| v.as_str()) {
                Some(reference) => resolve_local_ref(doc, reference)?,
                None => param,
            };
            let name = resolved.get("name")?.as_str()?.to_string();
            let location = resolved
                .get("in")
                .and_then(|v| v.as_str())
                .unwrap_or("query")
                .to_string();
            let default = resolved
                .get("default")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| single_enum_value(resolved));

            Some(ParameterEntry {
                name,
                required: resolved
                    .get("required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(location == "path"),
                location,
                default,
            })
        })
        .collect()
}

fn single_enum_value(param: &Value) -> Option<String> {
    let values = param.get("enum")?.as_array()?;
    if values.len() != 1 {
        return None;
    }
    values[0].as_str().map(str::to_string)
}

/// Follow a `#/a/b` pointer within the same document
fn resolve_local_ref<'a>(doc: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    doc.pointer(pointer)
}

/// A pinned `api-version` query parameter takes precedence over `info.version`
fn api_version_from_parameters(entries: &[PathEntry]) -> Option<String> {
    entries
        .iter()
        .flat_map(|e| &e.operations)
        .flat_map(|op| &op.parameters)
        .find(|p| p.name == "api-version" && p.location == "query" && p.default.is_some())
        .and_then(|p| p.default.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "swagger": "2.0",
            "info": { "title": "WebApps", "version": "2019-08-01" },
            "parameters": {
                "SiteName": { "name": "name", "in": "path", "required": true }
            },
            "paths": {
                "/subscriptions/{subscriptionId}/providers/Microsoft.Web/sites": {
                    "get": { "operationId": "WebApps_List" }
                },
                "/subscriptions/{subscriptionId}/providers/Microsoft.Web/sites/{name}": {
                    "parameters": [ { "$ref": "#/parameters/SiteName" } ],
                    "get": { "operationId": "WebApps_Get" },
                    "delete": { "operationId": "WebApps_Delete", "deprecated": true }
                }
            }
        })
    }

    #[test]
    fn test_extracts_paths_and_verbs() {
        let doc = SpecDocument::from_value("web.json", &sample(), "").unwrap();
        assert_eq!(doc.paths.len(), 2);
        assert_eq!(doc.api_version.as_deref(), Some("2019-08-01"));
        assert_eq!(doc.title.as_deref(), Some("WebApps"));

        let site = doc
            .paths
            .iter()
            .find(|p| p.path.ends_with("{name}"))
            .unwrap();
        assert!(site.operation(Verb::Get).is_some());
        assert!(site.operation(Verb::Delete).unwrap().deprecated);
        assert!(site.operation(Verb::Put).is_none());
    }

    #[test]
    fn test_resolves_local_parameter_refs() {
        let doc = SpecDocument::from_value("web.json", &sample(), "").unwrap();
        let site = doc.paths.iter().find(|p| p.path.ends_with("{name}")).unwrap();
        let get = site.operation(Verb::Get).unwrap();
        assert_eq!(get.parameters.len(), 1);
        assert_eq!(get.parameters[0].name, "name");
        assert_eq!(get.parameters[0].location, "path");
        assert!(get.parameters[0].required);
    }

    #[test]
    fn test_path_prefix_and_pinned_api_version() {
        let value = json!({
            "info": { "version": "ignored" },
            "paths": {
                "/docs": {
                    "get": {
                        "parameters": [
                            { "name": "api-version", "in": "query", "enum": ["2019-05-06"] }
                        ]
                    }
                }
            }
        });
        let doc = SpecDocument::from_value("search.json", &value, "/indexes('{indexName}')").unwrap();
        assert_eq!(doc.paths[0].path, "/indexes('{indexName}')/docs");
        assert_eq!(doc.api_version.as_deref(), Some("2019-05-06"));
    }

    #[test]
    fn test_yaml_and_missing_paths() {
        let yaml = "info:\n  version: v1\npaths:\n  /api/v1/namespaces:\n    get: {}\n";
        let doc = SpecDocument::from_yaml_str("k8s.yaml", yaml, "").unwrap();
        assert_eq!(doc.paths[0].path, "/api/v1/namespaces");

        let err = SpecDocument::from_json_str("empty.json", "{}", "").unwrap_err();
        assert!(matches!(err, DocumentError::MissingPaths { .. }));

        let err = SpecDocument::from_json_str("broken.json", "{", "").unwrap_err();
        assert!(matches!(err, DocumentError::Parse { .. }));
    }

    #[test]
    fn test_base_path_prefix() {
        let value = json!({ "basePath": "/api/", "paths": { "/pods": { "get": {} } } });
        let doc = SpecDocument::from_value("k8s.json", &value, "").unwrap();
        assert_eq!(doc.paths[0].path, "/api/pods");
    }
}
