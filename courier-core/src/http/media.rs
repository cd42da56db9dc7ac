//! Media types and `Accept` negotiation

use std::fmt;

/// A parsed media type or media range (`text/html; charset=utf-8`, `*/*;q=0.5`)
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
    quality: f32,
}

impl MediaType {
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
            quality: 1.0,
        }
    }

    pub fn any() -> Self {
        Self::new("*", "*")
    }

    pub fn json() -> Self {
        Self::new("application", "json")
    }

    pub fn text() -> Self {
        Self::new("text", "plain")
    }

    pub fn html() -> Self {
        Self::new("text", "html")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Parse a single media type. Returns `None` for anything without a `/`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut pieces = raw.split(';');
        let essence = pieces.next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut media = Self::new(kind, subtype);
        for piece in pieces {
            let Some((name, value)) = piece.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if name == "q" {
                media.quality = value.parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
            } else {
                media.params.push((name, value));
            }
        }
        Some(media)
    }

    /// Parse an `Accept` header into ranges ordered by preference.
    ///
    /// Higher quality first, then more specific ranges; equal entries keep
    /// header order. Ranges with `q=0` are kept (last) because they exclude
    /// the types they cover.
    pub fn parse_accept(header: &str) -> Vec<MediaType> {
        let mut ranges: Vec<MediaType> = header.split(',').filter_map(MediaType::parse).collect();
        ranges.sort_by(|a, b| {
            b.quality
                .partial_cmp(&a.quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.specificity().cmp(&a.specificity()))
        });
        ranges
    }

    fn specificity(&self) -> u8 {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == "*" || self.subtype == "*"
    }

    /// Wildcard-aware compatibility check (symmetric)
    pub fn matches(&self, other: &MediaType) -> bool {
        let kind = self.kind == "*" || other.kind == "*" || self.kind == other.kind;
        let subtype =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        kind && subtype
    }

    pub fn is_acceptable(&self) -> bool {
        self.quality > 0.0
    }

    /// Quality the client gives a concrete type: that of the most specific
    /// range covering it, 0 when none does. No ranges at all accept anything.
    pub fn quality_in(accept: &[MediaType], media: &MediaType) -> f32 {
        if accept.is_empty() {
            return 1.0;
        }
        let mut best: Option<&MediaType> = None;
        for range in accept.iter().filter(|range| range.matches(media)) {
            if best.map_or(true, |b| range.specificity() > b.specificity()) {
                best = Some(range);
            }
        }
        best.map_or(0.0, |range| range.quality)
    }

    /// Pick the media type a response should be rendered as.
    ///
    /// With declared `produces` entries, the first one accepted by the most
    /// preferred range wins (skipping entries a `q=0` range excludes), and
    /// `None` means the client accepts none of them.
    /// Without declarations, the client's most preferred concrete range is
    /// used, falling back to `*/*`; the transformer chain then checks the
    /// remaining ranges against what it can actually render.
    pub fn negotiate(accept: &[MediaType], produces: &[MediaType]) -> Option<MediaType> {
        if produces.is_empty() {
            let preferred = accept.iter().find(|m| m.is_acceptable() && !m.is_wildcard());
            return Some(
                preferred
                    .map(|m| MediaType::new(&m.kind, &m.subtype))
                    .unwrap_or_else(MediaType::any),
            );
        }

        if accept.is_empty() {
            return produces.first().cloned();
        }

        accept
            .iter()
            .filter(|range| range.is_acceptable())
            .find_map(|range| {
                produces
                    .iter()
                    .find(|offered| range.matches(offered) && Self::quality_in(accept, offered) > 0.0)
            })
            .cloned()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, "; {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_params() {
        let media = MediaType::parse("multipart/form-data; boundary=\"abc\"").unwrap();
        assert_eq!(media.essence(), "multipart/form-data");
        assert_eq!(media.param("boundary"), Some("abc"));
        assert!(MediaType::parse("garbage").is_none());
    }

    #[test]
    fn test_accept_ordering() {
        let ranges = MediaType::parse_accept("text/*;q=0.5, application/json, */*;q=0.1, x/y;q=0");
        let order: Vec<String> = ranges.iter().map(|m| m.essence()).collect();
        assert_eq!(order, vec!["application/json", "text/*", "*/*", "x/y"]);
        assert!(!ranges[3].is_acceptable());
    }

    #[test]
    fn test_negotiate_with_produces() {
        let accept = MediaType::parse_accept("text/html, application/json;q=0.9");
        let produces = vec![MediaType::json(), MediaType::html()];
        assert_eq!(MediaType::negotiate(&accept, &produces), Some(MediaType::html()));

        let accept = MediaType::parse_accept("image/png");
        assert_eq!(MediaType::negotiate(&accept, &produces), None);
    }

    #[test]
    fn test_negotiate_without_produces() {
        let accept = MediaType::parse_accept("*/*, application/json;q=0.8");
        assert_eq!(MediaType::negotiate(&accept, &[]), Some(MediaType::json()));
        assert_eq!(MediaType::negotiate(&[], &[]), Some(MediaType::any()));
    }

    #[test]
    fn test_quality_in_uses_most_specific_range() {
        let accept = MediaType::parse_accept("*/*;q=0.8, application/json;q=0, text/*;q=0.5");
        assert_eq!(MediaType::quality_in(&accept, &MediaType::json()), 0.0);
        assert_eq!(MediaType::quality_in(&accept, &MediaType::html()), 0.5);
        assert_eq!(MediaType::quality_in(&accept, &MediaType::octet_stream()), 0.8);
        assert_eq!(MediaType::quality_in(&[], &MediaType::json()), 1.0);

        let refused = MediaType::parse_accept("application/json;q=0");
        assert_eq!(MediaType::quality_in(&refused, &MediaType::json()), 0.0);
        assert_eq!(MediaType::quality_in(&refused, &MediaType::text()), 0.0);
    }

    #[test]
    fn test_negotiate_skips_excluded_types() {
        let accept = MediaType::parse_accept("*/*, application/json;q=0");
        let produces = vec![MediaType::json(), MediaType::html()];
        assert_eq!(MediaType::negotiate(&accept, &produces), Some(MediaType::html()));

        let accept = MediaType::parse_accept("application/json;q=0");
        assert_eq!(MediaType::negotiate(&accept, &produces), None);
        assert_eq!(MediaType::negotiate(&[], &produces), Some(MediaType::json()));
    }
}
