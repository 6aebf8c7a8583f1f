//! Alt-Svc header parsing (RFC 7838), feeding the capability cache.

/// One parsed alternative service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSvcEntry {
    /// Protocol identifier ("h3", "h3-29", "h2", ...).
    pub protocol: String,
    /// Alternative host; `None` means same host.
    pub host: Option<String>,
    pub port: u16,
    /// Freshness lifetime in seconds.
    pub max_age: u64,
}

impl AltSvcEntry {
    pub fn is_h3(&self) -> bool {
        self.protocol == "h3" || self.protocol.starts_with("h3-")
    }
}

/// Result of parsing an Alt-Svc header value.
#[derive(Debug, PartialEq, Eq)]
pub enum AltSvc {
    /// `clear`: drop all alternatives for the origin.
    Clear,
    Entries(Vec<AltSvcEntry>),
}

/// Default ma when the parameter is absent (RFC 7838 §3.1).
pub const DEFAULT_MAX_AGE: u64 = 86400;

/// Parse an Alt-Svc header value. Malformed alternatives are skipped.
pub fn parse(header: &str) -> AltSvc {
    if header.trim() == "clear" {
        return AltSvc::Clear;
    }

    let mut entries = Vec::new();
    for alternative in header.split(',') {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            continue;
        }

        let mut params = alternative.split(';').map(str::trim);
        let Some(main) = params.next() else { continue };
        let Some((protocol, value)) = main.split_once('=') else {
            continue;
        };
        let protocol = protocol.trim();
        if protocol.is_empty() {
            continue;
        }
        let Some((host, port)) = parse_authority(value.trim()) else {
            continue;
        };

        let mut max_age = DEFAULT_MAX_AGE;
        for param in params {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim() == "ma" {
                    if let Ok(age) = value.trim().parse() {
                        max_age = age;
                    }
                }
            }
        }

        entries.push(AltSvcEntry {
            protocol: protocol.to_string(),
            host,
            port,
            max_age,
        });
    }
    AltSvc::Entries(entries)
}

/// Parse the quoted alt-authority: `":443"`, `"alt.example.com:8443"`, or
/// a bare host (default port 443).
fn parse_authority(value: &str) -> Option<(Option<String>, u16)> {
    let unquoted = value.trim_matches('"').trim();
    if unquoted.is_empty() {
        return None;
    }

    if let Some(port) = unquoted.strip_prefix(':') {
        return port.parse().ok().map(|p| (None, p));
    }

    match unquoted.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            if host.is_empty() {
                Some((None, port))
            } else {
                Some((Some(host.to_string()), port))
            }
        }
        None => Some((Some(unquoted.to_string()), 443)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_h3() {
        let AltSvc::Entries(entries) = parse(r#"h3=":443"; ma=2592000"#) else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].protocol, "h3");
        assert_eq!(entries[0].host, None);
        assert_eq!(entries[0].port, 443);
        assert_eq!(entries[0].max_age, 2592000);
        assert!(entries[0].is_h3());
    }

    #[test]
    fn multiple_alternatives_and_draft_versions() {
        let AltSvc::Entries(entries) =
            parse(r#"h3=":443"; ma=86400, h3-29="alt.example.com:8443", h2=":443""#)
        else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_h3());
        assert_eq!(entries[1].host.as_deref(), Some("alt.example.com"));
        assert_eq!(entries[1].port, 8443);
        assert!(!entries[2].is_h3());
    }

    #[test]
    fn clear_directive() {
        assert_eq!(parse("clear"), AltSvc::Clear);
    }

    #[test]
    fn missing_ma_uses_default() {
        let AltSvc::Entries(entries) = parse(r#"h3=":443""#) else {
            panic!("expected entries");
        };
        assert_eq!(entries[0].max_age, DEFAULT_MAX_AGE);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let AltSvc::Entries(entries) = parse(r#"=":443", h3":443", h3=":99999", h3=":444""#) else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].port, 444);
    }
}
