//! Cache lifetime from response headers

use super::headers::Headers;
use std::time::{Duration, SystemTime};

/// Resolve how long a response may be cached
///
/// Precedence, highest first:
/// 1. `Cache-Control: no-cache` or `no-store` forbids caching (zero)
/// 2. `s-maxage=N` with N > 0
/// 3. `max-age=N` with N > 0
/// 4. an `Expires` date in the future
/// 5. `default`
pub fn resolve_ttl(headers: &Headers, default: Duration) -> Duration {
    let directives: Vec<(String, Option<String>)> = headers
        .get_all("Cache-Control")
        .unwrap_or_default()
        .iter()
        .flat_map(|value| value.split(','))
        .filter_map(parse_directive)
        .collect();

    if directives
        .iter()
        .any(|(name, _)| name == "no-cache" || name == "no-store")
    {
        return Duration::ZERO;
    }

    for wanted in ["s-maxage", "max-age"] {
        let seconds = directives
            .iter()
            .filter(|(name, _)| name == wanted)
            .find_map(|(_, value)| value.as_deref()?.parse::<u64>().ok())
            .filter(|&n| n > 0);
        if let Some(seconds) = seconds {
            return Duration::from_secs(seconds);
        }
    }

    if let Some(expires) = headers.get("Expires") {
        if let Ok(at) = httpdate::parse_http_date(expires.trim()) {
            if let Ok(remaining) = at.duration_since(SystemTime::now()) {
                if !remaining.is_zero() {
                    return remaining;
                }
            }
        }
    }

    default
}

/// `Name=value` → (`name`, `Some(value)`); quotes around the value are dropped
fn parse_directive(raw: &str) -> Option<(String, Option<String>)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.split_once('=') {
        Some((name, value)) => Some((
            name.trim().to_ascii_lowercase(),
            Some(value.trim().trim_matches('"').to_string()),
        )),
        None => Some((raw.to_ascii_lowercase(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(300);

    #[test]
    fn test_no_cache_wins_over_max_age() {
        let headers = Headers::from([("Cache-Control", "no-cache, max-age=3600")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), Duration::ZERO);

        let headers = Headers::from([("cache-control", "No-Store")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), Duration::ZERO);
    }

    #[test]
    fn test_s_maxage_wins_over_max_age() {
        let headers = Headers::from([("Cache-Control", "max-age=3600, s-maxage=86400")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), Duration::from_secs(86400));
    }

    #[test]
    fn test_max_age() {
        let headers = Headers::from([("Cache-Control", "public, MAX-AGE=\"120\"")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), Duration::from_secs(120));
    }

    #[test]
    fn test_zero_or_invalid_max_age_falls_through() {
        let headers = Headers::from([("Cache-Control", "max-age=0")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), DEFAULT);

        let headers = Headers::from([("Cache-Control", "max-age=soon")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), DEFAULT);
    }

    #[test]
    fn test_directives_across_repeated_headers() {
        let mut headers = Headers::new();
        headers.append("Cache-Control", "public");
        headers.append("Cache-Control", "max-age=60");
        assert_eq!(resolve_ttl(&headers, DEFAULT), Duration::from_secs(60));
    }

    #[test]
    fn test_future_expires() {
        let at = SystemTime::now() + Duration::from_secs(60);
        let headers = Headers::from([("Expires", httpdate::fmt_http_date(at))]);
        let ttl = resolve_ttl(&headers, DEFAULT);
        assert!(ttl > Duration::from_secs(55), "ttl was {:?}", ttl);
        assert!(ttl <= Duration::from_secs(60), "ttl was {:?}", ttl);
    }

    #[test]
    fn test_past_or_invalid_expires_uses_default() {
        let at = SystemTime::now() - Duration::from_secs(60);
        let headers = Headers::from([("Expires", httpdate::fmt_http_date(at))]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), DEFAULT);

        let headers = Headers::from([("Expires", "0")]);
        assert_eq!(resolve_ttl(&headers, DEFAULT), DEFAULT);
    }

    #[test]
    fn test_no_headers_uses_default() {
        assert_eq!(resolve_ttl(&Headers::new(), DEFAULT), DEFAULT);
    }
}
