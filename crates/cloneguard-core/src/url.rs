//! URL normalization and host classification.
//!
//! Two installs point at the same site when their normalized URLs are equal:
//! scheme stripped, host case-folded, trailing slash trimmed. Host
//! classification decides whether a mismatched URL lives on a developer
//! machine or a known staging provider, which changes how resolution treats
//! the clone.

/// Where a host appears to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// A regular public host.
    Production,
    /// A local development address (localhost, loopback, private ranges).
    Localhost,
    /// A host matching a known staging-provider domain suffix.
    Staging,
}

/// Normalize a URL for equality comparison.
///
/// Strips the scheme (`http://`, `https://`, or protocol-relative `//`),
/// lowercases the host portion, and trims the trailing slash. Path and query
/// are kept verbatim apart from the trailing slash, because subdirectory
/// installs are distinct sites.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .find("://")
        .map_or(trimmed, |idx| &trimmed[idx + 3..]);
    let without_scheme = without_scheme.strip_prefix("//").unwrap_or(without_scheme);

    let (host, rest) = match without_scheme.find('/') {
        Some(idx) => without_scheme.split_at(idx),
        None => (without_scheme, ""),
    };

    let mut normalized = host.to_ascii_lowercase();
    normalized.push_str(rest);

    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Classify a host as production, localhost, or staging.
///
/// `staging_suffixes` is the configured allowlist of hosting-provider domain
/// suffixes; it is data, not logic, and is expected to be maintained in the
/// deployment's configuration.
pub fn classify_host(host: &str, staging_suffixes: &[String]) -> HostKind {
    let host = host.to_ascii_lowercase();
    // Drop an explicit port before inspecting the name.
    let name = host.rsplit_once(':').map_or(host.as_str(), |(h, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            h
        } else {
            host.as_str()
        }
    });

    if is_local_address(name) {
        return HostKind::Localhost;
    }

    if staging_suffixes
        .iter()
        .any(|suffix| name.ends_with(suffix.to_ascii_lowercase().as_str()))
    {
        return HostKind::Staging;
    }

    HostKind::Production
}

/// Extract the host portion (including port) from a normalized URL.
pub fn host_of(normalized_url: &str) -> &str {
    normalized_url
        .split_once('/')
        .map_or(normalized_url, |(host, _)| host)
}

fn is_local_address(name: &str) -> bool {
    name == "localhost"
        || name == "127.0.0.1"
        || name == "[::1]"
        || name.ends_with(".local")
        || name.ends_with(".test")
        || name.starts_with("10.")
        || name.starts_with("192.168.")
}

/// Default staging-provider suffix allowlist.
///
/// Covers the managed-hosting staging domains commonly produced by "push to
/// staging" features. Deployments extend this through configuration.
pub fn default_staging_suffixes() -> Vec<String> {
    [
        ".staging.wpengine.com",
        ".dev.wpengine.com",
        ".wpenginepowered.com",
        ".flywheelsites.com",
        ".flywheelstaging.com",
        ".myftpupload.com",
        ".cloudwaysapps.com",
        ".kinsta.cloud",
        ".pantheonsite.io",
        ".stage.site",
        ".tempurl.host",
        ".wpmudev.host",
        ".websitepro-staging.com",
        ".instawp.xyz",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_and_trailing_slash() {
        assert_eq!(normalize_url("https://Example.com/"), "example.com");
        assert_eq!(normalize_url("http://example.com"), "example.com");
        assert_eq!(normalize_url("//example.com/"), "example.com");
    }

    #[test]
    fn normalize_keeps_path_case() {
        assert_eq!(
            normalize_url("https://Example.com/Blog/"),
            "example.com/Blog"
        );
    }

    #[test]
    fn normalize_keeps_port() {
        assert_eq!(
            normalize_url("http://localhost:8080/shop"),
            "localhost:8080/shop"
        );
    }

    #[test]
    fn same_site_normalizes_equal() {
        assert_eq!(
            normalize_url("https://example.com/"),
            normalize_url("http://EXAMPLE.com")
        );
    }

    #[test]
    fn classify_localhost_variants() {
        let suffixes = default_staging_suffixes();
        assert_eq!(classify_host("localhost", &suffixes), HostKind::Localhost);
        assert_eq!(
            classify_host("localhost:8080", &suffixes),
            HostKind::Localhost
        );
        assert_eq!(classify_host("127.0.0.1", &suffixes), HostKind::Localhost);
        assert_eq!(classify_host("mysite.local", &suffixes), HostKind::Localhost);
        assert_eq!(classify_host("192.168.1.20", &suffixes), HostKind::Localhost);
    }

    #[test]
    fn classify_staging_by_suffix() {
        let suffixes = default_staging_suffixes();
        assert_eq!(
            classify_host("mysite.staging.wpengine.com", &suffixes),
            HostKind::Staging
        );
        assert_eq!(
            classify_host("shop.kinsta.cloud", &suffixes),
            HostKind::Staging
        );
    }

    #[test]
    fn classify_production_otherwise() {
        let suffixes = default_staging_suffixes();
        assert_eq!(classify_host("example.com", &suffixes), HostKind::Production);
        // Suffix must match the tail, not a substring.
        assert_eq!(
            classify_host("kinsta.cloud.example.com", &suffixes),
            HostKind::Production
        );
    }

    #[test]
    fn host_of_splits_path() {
        assert_eq!(host_of("example.com/blog"), "example.com");
        assert_eq!(host_of("example.com"), "example.com");
    }
}
