//! Path templates: compilation and matching
//!
//! A template is a `/`-separated list of segments. A segment is either a
//! literal or a pattern holding one or more captures, `{name}` or
//! `{name:regex}`, optionally surrounded by literal text (`v{major}.{minor}`).

use std::collections::{HashMap, HashSet};

use regex::Regex;

use super::RouteError;

/// Path parameters extracted from a matched template
pub type PathParams = HashMap<String, String>;

/// Pattern applied to captures declared without one
pub const DEFAULT_CAPTURE: &str = "[^/]+";

/// One compiled template segment
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Pattern {
        source: String,
        regex: Regex,
        /// Capture names in declaration order
        names: Vec<String>,
    },
}

impl Segment {
    fn matches(&self, token: &str, params: &mut PathParams) -> bool {
        match self {
            Segment::Literal(literal) => literal == token,
            Segment::Pattern { regex, names, .. } => {
                let Some(captures) = regex.captures(token) else {
                    return false;
                };
                for (index, name) in names.iter().enumerate() {
                    if let Some(raw) = captures.name(&capture_group(index)) {
                        params.insert(name.clone(), decode_capture(raw.as_str()));
                    }
                }
                true
            }
        }
    }
}

/// A template compiled into matchable segments
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    segments: Vec<Segment>,
}

impl CompiledPattern {
    /// Compile a template such as `/api/test/{string:[a-z0-9]+}/{num:[0-9]+}`.
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        let normalized = normalize_path(template);
        let invalid = |reason: String| RouteError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for raw in split_segments(&normalized).map_err(invalid)? {
            let segment = compile_segment(&raw).map_err(invalid)?;
            if let Segment::Pattern { names, .. } = &segment {
                for name in names {
                    if !seen.insert(name.clone()) {
                        return Err(invalid(format!("duplicate capture name '{}'", name)));
                    }
                }
            }
            segments.push(segment);
        }

        Ok(Self { template: normalized, segments })
    }

    /// The normalized template this pattern was compiled from
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of every capture, in template order
    pub fn capture_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .flat_map(|segment| match segment {
                Segment::Literal(_) => Vec::new(),
                Segment::Pattern { names, .. } => names.iter().map(|n| n.as_str()).collect(),
            })
            .collect()
    }

    /// Match a request path, returning the decoded captures on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let path = normalize_path(path);
        let tokens: Vec<&str> = path.split('/').collect();
        if tokens.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, token) in self.segments.iter().zip(tokens) {
            if !segment.matches(token, &mut params) {
                return None;
            }
        }
        Some(params)
    }
}

/// Ensure a leading `/` and strip a trailing one (root stays `/`).
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Join a scope prefix and a route path with exactly one `/` between them.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    normalize_path(&format!("{}/{}", prefix, path))
}

fn capture_group(index: usize) -> String {
    format!("__c{}", index)
}

fn decode_capture(raw: &str) -> String {
    urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string())
}

/// Split on `/` outside of braces so a capture regex may contain slashes.
fn split_segments(template: &str) -> Result<Vec<String>, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in template.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| "unbalanced '}'".to_string())?;
                current.push(c);
            }
            '/' if depth == 0 => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err("unbalanced '{'".to_string());
    }
    segments.push(current);
    Ok(segments)
}

fn compile_segment(raw: &str) -> Result<Segment, String> {
    if !raw.contains('{') {
        return Ok(Segment::Literal(raw.to_string()));
    }

    let mut expression = String::from("^");
    let mut names = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        expression.push_str(&regex::escape(&std::mem::take(&mut literal)));

        // Read the capture body, counting nested quantifier braces.
        let mut body = String::new();
        let mut depth = 1usize;
        for inner in chars.by_ref() {
            match inner {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            body.push(inner);
        }

        let (name, pattern) = match body.split_once(':') {
            Some((name, pattern)) => (name.trim(), pattern.trim()),
            None => (body.trim(), DEFAULT_CAPTURE),
        };
        if name.is_empty() {
            return Err(format!("empty capture name in segment '{}'", raw));
        }
        let pattern = if pattern.is_empty() { DEFAULT_CAPTURE } else { pattern };

        expression.push_str(&format!("(?P<{}>{})", capture_group(names.len()), pattern));
        names.push(name.to_string());
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');

    let regex = Regex::new(&expression)
        .map_err(|e| format!("capture pattern in segment '{}' does not compile: {}", raw, e))?;
    Ok(Segment::Pattern { source: raw.to_string(), regex, names })
}
