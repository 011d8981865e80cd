//! API version discovery
//!
//! Service folders describe their versions in an AutoRest `readme.md`: each
//! version is a fenced yaml block guarded by `$(tag) == '<name>'` that lists
//! the `input-file` entries making up that version.

use serde::Deserialize;

/// One tagged version of a service and the spec files it consists of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion {
    pub name: String,
    pub files: Vec<String>,
}

impl ApiVersion {
    pub fn is_preview(&self) -> bool {
        self.name.contains("preview")
    }

    fn sort_key(&self) -> &str {
        self.name.strip_prefix("package-").unwrap_or(&self.name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TagBlock {
    #[serde(default, rename = "input-file")]
    input_file: Vec<String>,
}

/// Parse every tagged version block, in document order.
///
/// Blocks with additional `&&` conditions are skipped.
pub fn versions_from_readme(readme: &str) -> Vec<ApiVersion> {
    let mut versions = Vec::new();
    let mut lines = readme.lines();

    while let Some(line) = lines.next() {
        let Some(tag) = tag_of_fence(line) else {
            continue;
        };

        let mut body = String::new();
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                break;
            }
            body.push_str(inner);
            body.push('\n');
        }

        let block: TagBlock = match serde_yaml::from_str(&body) {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!("Skipping unparseable tag block '{}': {}", tag, e);
                continue;
            }
        };

        versions.push(ApiVersion {
            name: tag,
            files: block
                .input_file
                .into_iter()
                .map(|f| f.replace('\\', "/"))
                .collect(),
        });
    }

    versions
}

/// Extract the tag from an opening fence such as ```` ```yaml $(tag) == 'package-2019-07' ````
fn tag_of_fence(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("```")?.trim_start();
    let rest = rest.strip_prefix("yaml")?;
    if rest.contains("&&") {
        return None;
    }
    let start = rest.find("$(tag) == '")? + "$(tag) == '".len();
    let end = rest[start..].find('\'')? + start;
    Some(rest[start..end].to_string())
}

/// Choose the latest stable version, or the latest preview when no stable one exists
pub fn pick_version(versions: &[ApiVersion]) -> Option<&ApiVersion> {
    let latest = |preview: bool| {
        versions
            .iter()
            .filter(|v| v.is_preview() == preview)
            .max_by(|a, b| a.sort_key().cmp(b.sort_key()))
    };
    latest(false).or_else(|| latest(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str) -> ApiVersion {
        ApiVersion {
            name: name.to_string(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_pick_version_chooses_latest_non_preview() {
        let versions = vec![
            version("package-2019-10-preview"),
            version("package-2019-08-preview"),
            version("package-2019-07"),
            version("package-2019-06"),
            version("package-2019-05-preview"),
        ];
        assert_eq!(pick_version(&versions).unwrap().name, "package-2019-07");
    }

    #[test]
    fn test_pick_version_chooses_latest_preview_if_no_others() {
        let versions = vec![
            version("package-2019-10-preview"),
            version("package-2019-08-preview"),
            version("package-2019-05-preview"),
        ];
        assert_eq!(
            pick_version(&versions).unwrap().name,
            "package-2019-10-preview"
        );
        assert!(pick_version(&[]).is_none());
    }

    #[test]
    fn test_versions_from_readme() {
        let readme = r#"
# Web

``` yaml
openapi-type: arm
tag: package-2019-08
```

```yaml $(tag) == 'package-2019-08'
input-file:
- Microsoft.Web/stable/2019-08-01/WebApps.json
- Microsoft.Web\stable\2019-08-01\CommonDefinitions.json
```

```yaml $(tag) == 'package-2018-02' || $(tag) == 'package-2018-02-only'
input-file:
- Microsoft.Web/stable/2018-02-01/WebApps.json
```

```yaml $(tag) == 'package-2016-03' && $(go)
output-folder: somewhere
```
"#;
        let versions = versions_from_readme(readme);
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].name, "package-2019-08");
        assert_eq!(
            versions[0].files,
            vec![
                "Microsoft.Web/stable/2019-08-01/WebApps.json",
                "Microsoft.Web/stable/2019-08-01/CommonDefinitions.json",
            ]
        );
        assert_eq!(versions[1].name, "package-2018-02");
    }
}
