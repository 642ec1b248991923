//! Route path templates (`/users/{id}/posts/{post_id}`)

use crate::core::error::RequestError;
use crate::core::request::Params;
use percent_encoding::percent_decode_str;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A parsed route template using `{name}` captures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Self {
        let segments = split(raw)
            .map(|segment| {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Static(segment.to_string()),
                }
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Capture names in order of appearance
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Static(_) => None,
            })
            .collect()
    }

    /// Match a request path, returning the percent-decoded captures
    ///
    /// `None` when the path does not fit the template, `Some(Err(..))` when it
    /// does but a captured segment is not valid UTF-8 once decoded.
    pub fn matches(&self, path: &str) -> Option<Result<Params, RequestError>> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => captures.push((name, part)),
            }
        }

        let mut params = Params::new();
        for (name, part) in captures {
            match percent_decode_str(part).decode_utf8() {
                Ok(value) => {
                    params.insert(name.clone(), value.into_owned());
                }
                Err(e) => {
                    return Some(Err(RequestError::InvalidPath {
                        message: format!("cannot parse `{}` as UTF-8: {}", name, e),
                    }));
                }
            }
        }
        Some(Ok(params))
    }

    /// Ordering key for overlapping templates: a static segment sorts before
    /// a capture at the first position where two templates differ
    pub fn precedence(&self) -> Vec<bool> {
        self.segments
            .iter()
            .map(|s| matches!(s, Segment::Param(_)))
            .collect()
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}
