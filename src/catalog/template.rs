//! Endpoint Templates
//!
//! A URL template such as `/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}`
//! split into `/`-separated segments. Each segment is either a literal or a single
//! named placeholder, optionally wrapped in literal text (`indexes('{indexName}')`).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Values captured from (or substituted into) a template, keyed by placeholder name
pub type TemplateValues = HashMap<String, String>;

/// Query parameter appended to management-plane URLs
pub const API_VERSION_PARAM: &str = "api-version";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Missing value for parameter '{name}' in template '{template}'")]
    MissingParameter { name: String, template: String },

    #[error("Malformed template '{template}': {reason}")]
    Malformed { template: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder {
        name: String,
        prefix: String,
        suffix: String,
    },
}

impl Segment {
    fn parse(template: &str, raw: &str) -> Result<Self, TemplateError> {
        let Some(open) = raw.find('{') else {
            if raw.contains('}') {
                return Err(TemplateError::Malformed {
                    template: template.to_string(),
                    reason: format!("unbalanced '}}' in segment '{}'", raw),
                });
            }
            return Ok(Segment::Literal(raw.to_string()));
        };

        let Some(close) = raw[open..].find('}').map(|i| i + open) else {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
                reason: format!("unterminated placeholder in segment '{}'", raw),
            });
        };

        let name = &raw[open + 1..close];
        let suffix = &raw[close + 1..];
        if name.is_empty() {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
                reason: "empty placeholder name".to_string(),
            });
        }
        if suffix.contains('{') || suffix.contains('}') {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
                reason: format!("more than one placeholder in segment '{}'", raw),
            });
        }

        Ok(Segment::Placeholder {
            name: name.to_string(),
            prefix: raw[..open].to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Capture the placeholder value from a concrete segment
    fn capture<'a>(prefix: &str, suffix: &str, concrete: &'a str) -> Option<&'a str> {
        if concrete.len() <= prefix.len() + suffix.len() {
            return None;
        }
        concrete
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
    }

    /// (is literal, literal prefix length)
    fn specificity(&self) -> (bool, usize) {
        match self {
            Segment::Literal(lit) => (true, lit.len()),
            Segment::Placeholder { prefix, .. } => (false, prefix.len()),
        }
    }

    /// Whether some concrete segment could satisfy both segments
    fn overlaps(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a == b,
            (Segment::Literal(lit), Segment::Placeholder { prefix, suffix, .. })
            | (Segment::Placeholder { prefix, suffix, .. }, Segment::Literal(lit)) => {
                Segment::capture(prefix, suffix, lit).is_some()
            }
            (
                Segment::Placeholder {
                    prefix: p1,
                    suffix: s1,
                    ..
                },
                Segment::Placeholder {
                    prefix: p2,
                    suffix: s2,
                    ..
                },
            ) => {
                (p1.starts_with(p2.as_str()) || p2.starts_with(p1.as_str()))
                    && (s1.ends_with(s2.as_str()) || s2.ends_with(s1.as_str()))
            }
        }
    }
}

/// Serialized form of an [`EndpointTemplate`]
#[derive(Serialize, Deserialize)]
struct TemplateRepr {
    template_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
}

/// A parametric URL pattern with named placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateRepr", into = "TemplateRepr")]
pub struct EndpointTemplate {
    template_url: String,
    api_version: Option<String>,
    segments: Vec<Segment>,
}

impl TryFrom<TemplateRepr> for EndpointTemplate {
    type Error = TemplateError;

    fn try_from(repr: TemplateRepr) -> Result<Self, Self::Error> {
        EndpointTemplate::parse(&repr.template_url, repr.api_version.as_deref())
    }
}

impl From<EndpointTemplate> for TemplateRepr {
    fn from(template: EndpointTemplate) -> Self {
        TemplateRepr {
            template_url: template.template_url,
            api_version: template.api_version,
        }
    }
}

impl fmt::Display for EndpointTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template_url)
    }
}

impl EndpointTemplate {
    /// Parse a template. `api_version`, when set, is appended as a query
    /// parameter by [`EndpointTemplate::build_url`].
    pub fn parse(template_url: &str, api_version: Option<&str>) -> Result<Self, TemplateError> {
        let segments = template_url
            .split('/')
            .map(|raw| Segment::parse(template_url, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            template_url: template_url.to_string(),
            api_version: api_version.map(str::to_string),
            segments,
        })
    }

    pub fn template_url(&self) -> &str {
        &self.template_url
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// Copy of this template without the api-version query parameter
    pub fn without_api_version(&self) -> Self {
        Self {
            api_version: None,
            ..self.clone()
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Placeholder names in template order
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Whether the final segment is a placeholder (its value is only known from a listing)
    pub fn ends_with_placeholder(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Placeholder { .. }))
    }

    /// The first `segments` segments of this template, e.g. the parent of `/a/{b}/c` is `/a/{b}`
    pub fn prefix(&self, segments: usize) -> Self {
        let segments = segments.min(self.segments.len());
        let template_url = self
            .template_url
            .split('/')
            .take(segments)
            .collect::<Vec<_>>()
            .join("/");
        Self {
            template_url,
            api_version: self.api_version.clone(),
            segments: self.segments[..segments].to_vec(),
        }
    }

    /// Template with placeholder names erased, e.g. `/sites/{}/config`.
    /// Two templates differing only in placeholder names condense to the same string.
    pub fn condensed(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => lit.clone(),
                Segment::Placeholder { prefix, suffix, .. } => format!("{}{{}}{}", prefix, suffix),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Match a concrete URL (or path) against the template.
    ///
    /// Scheme, host and query string are ignored. Returns the captured values
    /// on a match.
    pub fn match_url(&self, url: &str) -> Option<TemplateValues> {
        let path = url_path(url);
        let concrete: Vec<&str> = path.split('/').collect();
        if concrete.len() != self.segments.len() {
            return None;
        }

        let mut values = TemplateValues::new();
        for (segment, part) in self.segments.iter().zip(concrete) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Placeholder {
                    name,
                    prefix,
                    suffix,
                } => {
                    let value = Segment::capture(prefix, suffix, part)?;
                    values.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(values)
    }

    /// Substitute every placeholder. Fails naming the first placeholder without a value.
    pub fn build_url(&self, values: &TemplateValues) -> Result<String, TemplateError> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit.clone()),
                Segment::Placeholder {
                    name,
                    prefix,
                    suffix,
                } => {
                    let Some(value) = values.get(name) else {
                        return Err(TemplateError::MissingParameter {
                            name: name.clone(),
                            template: self.template_url.clone(),
                        });
                    };
                    parts.push(format!("{}{}{}", prefix, value, suffix));
                }
            }
        }

        let mut url = parts.join("/");
        if let Some(version) = &self.api_version {
            url.push('?');
            url.push_str(API_VERSION_PARAM);
            url.push('=');
            url.push_str(version);
        }
        Ok(url)
    }

    /// Whether at least one concrete URL is matched by both templates
    pub fn overlaps(&self, other: &EndpointTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.overlaps(b))
    }

    /// Specificity ordering: the longer literal prefix is more specific, comparing
    /// segment by segment from the left. A literal segment beats any placeholder.
    /// `Ordering::Equal` between two overlapping templates is a catalog defect.
    pub fn specificity_cmp(&self, other: &EndpointTemplate) -> Ordering {
        self.segments
            .iter()
            .zip(&other.segments)
            .map(|(a, b)| a.specificity().cmp(&b.specificity()))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// Strip scheme, host and query string, leaving the path
fn url_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(rest) = without_query
        .strip_prefix("https://")
        .or_else(|| without_query.strip_prefix("http://"))
    {
        return match rest.find('/') {
            Some(i) => &rest[i..],
            None => "",
        };
    }
    without_query
}

/// Pick the most specific template matching `url`.
///
/// Returns `Ok(None)` when nothing matches and `Err((a, b))` with the indices of two
/// equally specific matching templates.
pub fn most_specific_match<'a, I>(
    templates: I,
    url: &str,
) -> Result<Option<(usize, TemplateValues)>, (usize, usize)>
where
    I: IntoIterator<Item = &'a EndpointTemplate>,
{
    let mut best: Option<(usize, &EndpointTemplate, TemplateValues)> = None;
    let mut tied: Option<usize> = None;

    for (index, template) in templates.into_iter().enumerate() {
        let Some(values) = template.match_url(url) else {
            continue;
        };
        match &best {
            None => best = Some((index, template, values)),
            Some((_, current, _)) => match template.specificity_cmp(current) {
                Ordering::Greater => {
                    best = Some((index, template, values));
                    tied = None;
                }
                Ordering::Equal => tied = Some(index),
                Ordering::Less => {}
            },
        }
    }

    match (best, tied) {
        (Some((index, _, _)), Some(other)) => Err((index, other)),
        (Some((index, _, values)), None) => Ok(Some((index, values))),
        (None, _) => Ok(None),
    }
}
