//! Ordered header multimap and request-context header derivation.
//!
//! The wire order of headers is itself a fingerprint dimension, so headers
//! are stored as an insertion-ordered multimap: lookup is case-insensitive,
//! but emission preserves both the order and the casing the caller supplied.

use url::Url;

/// Reserved pseudo-entry naming the regular-header order for one request.
/// Stripped before wire emission.
pub const HEADER_ORDER_KEY: &str = "header-order";

/// Reserved pseudo-entry naming the pseudo-header order (H2/H3) for one
/// request. Stripped before wire emission.
pub const PSEUDO_HEADER_ORDER_KEY: &str = "pheader-order";

/// Insertion-ordered header multimap.
///
/// Multiple values for one name are kept as separate entries in insertion
/// order (required for Set-Cookie). Lookups match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaders {
    entries: Vec<(String, String)>,
}

impl OrderedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, preserving insertion order.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Insert a header at the front of the emission order.
    pub fn prepend(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(0, (name.into(), value.into()));
    }

    /// Replace the first entry matching `name` (keeping its position), or
    /// append if absent. Further duplicates are removed.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut replaced = false;
        self.entries.retain_mut(|(n, v)| {
            if n.eq_ignore_ascii_case(&name) {
                if replaced {
                    return false;
                }
                *v = value.clone();
                replaced = true;
            }
            true
        });
        if !replaced {
            self.entries.push((name, value));
        }
    }

    /// First value for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove all entries matching `name`; returns the removed values.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Reorder entries: names listed in `order` come first (in that order),
    /// entries not listed keep their relative order afterwards.
    pub fn reorder(&mut self, order: &[String]) {
        let mut front: Vec<(String, String)> = Vec::with_capacity(self.entries.len());
        let mut rest = std::mem::take(&mut self.entries);
        for wanted in order {
            let mut i = 0;
            while i < rest.len() {
                if rest[i].0.eq_ignore_ascii_case(wanted) {
                    front.push(rest.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        front.extend(rest);
        self.entries = front;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into the underlying ordered pairs.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.entries
    }

    /// Ordered pairs as owned clones.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }

    /// Extract and strip the per-request override lists
    /// (`Header-Order`, `PHeader-Order`).
    ///
    /// Values are comma-separated names, optionally bracketed and quoted:
    /// `Header-Order: [accept, user-agent, cookie]`.
    pub fn take_order_overrides(&mut self) -> (Option<Vec<String>>, Option<Vec<String>>) {
        let header_order = self
            .remove(HEADER_ORDER_KEY)
            .into_iter()
            .next()
            .map(|v| parse_order_list(&v));
        let pseudo_order = self
            .remove(PSEUDO_HEADER_ORDER_KEY)
            .into_iter()
            .next()
            .map(|v| parse_order_list(&v));
        (header_order, pseudo_order)
    }
}

impl From<Vec<(String, String)>> for OrderedHeaders {
    fn from(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

impl From<&[(&str, &str)]> for OrderedHeaders {
    fn from(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }
}

fn parse_order_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `Sec-Fetch-Site` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSite {
    /// User-initiated navigation with no referring context.
    None,
    SameOrigin,
    SameSite,
    CrossSite,
}

impl FetchSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SameOrigin => "same-origin",
            Self::SameSite => "same-site",
            Self::CrossSite => "cross-site",
        }
    }
}

/// Derive `Sec-Fetch-Site` from the referring page and the target URL.
///
/// Same-origin requires full origin equality; same-site requires a shared
/// registrable domain; anything else is cross-site. No referring context
/// means a user-initiated request ("none").
pub fn fetch_site(page: Option<&Url>, target: &Url) -> FetchSite {
    let Some(page) = page else {
        return FetchSite::None;
    };
    if page.origin() == target.origin() {
        return FetchSite::SameOrigin;
    }
    match (
        page.host_str().and_then(registrable_domain),
        target.host_str().and_then(registrable_domain),
    ) {
        (Some(a), Some(b)) if a == b => FetchSite::SameSite,
        _ => FetchSite::CrossSite,
    }
}

/// Registrable domain (eTLD+1) of a host, per the public suffix list.
pub fn registrable_domain(host: &str) -> Option<String> {
    psl::domain(host.as_bytes()).map(|d| String::from_utf8_lossy(d.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimap_preserves_order_and_casing() {
        let mut h = OrderedHeaders::new();
        h.append("User-Agent", "x");
        h.append("ACCEPT", "*/*");
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");

        assert_eq!(h.get("user-agent"), Some("x"));
        assert_eq!(h.get_all("set-cookie"), vec!["a=1", "b=2"]);

        let names: Vec<&str> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["User-Agent", "ACCEPT", "Set-Cookie", "Set-Cookie"]);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut h = OrderedHeaders::new();
        h.append("Accept", "a");
        h.append("Cookie", "c");
        h.set("accept", "b");
        assert_eq!(h.to_pairs()[0], ("Accept".to_string(), "b".to_string()));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn reorder_puts_listed_first() {
        let mut h = OrderedHeaders::new();
        h.append("a", "1");
        h.append("b", "2");
        h.append("c", "3");
        h.reorder(&["c".to_string(), "a".to_string()]);
        let names: Vec<&str> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn order_overrides_are_stripped() {
        let mut h = OrderedHeaders::new();
        h.append("Header-Order", "[accept, user-agent]");
        h.append("PHeader-Order", r#"[":method", ":authority", ":scheme", ":path"]"#);
        h.append("Accept", "*/*");

        let (ho, po) = h.take_order_overrides();
        assert_eq!(ho.unwrap(), vec!["accept", "user-agent"]);
        assert_eq!(
            po.unwrap(),
            vec![":method", ":authority", ":scheme", ":path"]
        );
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn fetch_site_classification() {
        let page = Url::parse("https://app.example.com/page").unwrap();
        let same_origin = Url::parse("https://app.example.com/api").unwrap();
        let same_site = Url::parse("https://cdn.example.com/x.js").unwrap();
        let cross = Url::parse("https://other.net/").unwrap();

        assert_eq!(fetch_site(Some(&page), &same_origin), FetchSite::SameOrigin);
        assert_eq!(fetch_site(Some(&page), &same_site), FetchSite::SameSite);
        assert_eq!(fetch_site(Some(&page), &cross), FetchSite::CrossSite);
        assert_eq!(fetch_site(None, &cross), FetchSite::None);
    }
}
