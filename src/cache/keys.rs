//! Storage key layout
//!
//! ```text
//! META@@<url>                     -> list of negotiated header names
//! DATA@@<url>@@<v1>@@...@@<vN>    -> encoded cache entry
//! mutex-{<key>}                   -> distributed mutex owner token
//! ```
//!
//! The mutex key carries the guarded key's hash tag so a cluster places the
//! lock record in the same slot as the key it protects. A key that already has
//! a `{tag}` lends that tag (`mutex-{tag}<key>`); any other key becomes the tag.
//! A tagless key containing `}` cannot be co-located, so lock records are
//! always written through the cluster-aware store rather than a shard node.
//!
//! URLs containing `@@` are never stored: the separator would make the
//! variant patterns of `/a` match the entries of `/a@@x`.

use super::errors::{CacheError, CacheResult};
use super::headers::Headers;

/// Separator between key components
pub const SEPARATOR: &str = "@@";
/// Separator between the values of a multi-valued request header
pub const VALUE_SEPARATOR: &str = "--";

const DATA_PREFIX: &str = "DATA";
const META_PREFIX: &str = "META";
const MUTEX_PREFIX: &str = "mutex-";

/// Key of the negotiation metadata list for `url`
pub fn metadata_key(url: &str) -> String {
    format!("{META_PREFIX}{SEPARATOR}{url}")
}

/// Key of the mutex record guarding `key`
pub fn mutex_key(key: &str) -> String {
    let tag = hash_tag(key);
    if tag.len() == key.len() {
        format!("{MUTEX_PREFIX}{{{key}}}")
    } else {
        format!("{MUTEX_PREFIX}{{{tag}}}{key}")
    }
}

/// Whether `key` is a mutex owner record rather than cached data
pub fn is_mutex_key(key: &str) -> bool {
    key.starts_with(MUTEX_PREFIX)
}

/// Whether `url` can be stored without colliding with another URL's variants
pub fn is_storable_url(url: &str) -> bool {
    !url.contains(SEPARATOR)
}

/// The part of a key that decides its slot: the first non-empty `{...}` or the whole key
pub fn hash_tag(key: &str) -> &str {
    if let Some(open) = key.find('{') {
        if let Some(len) = key[open + 1..].find('}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

/// Header names a response declares in `Vary`, trimmed and in order
///
/// Fails with `WildcardVary` when any entry is `*`.
pub fn vary_header_names(response_headers: &Headers) -> CacheResult<Vec<String>> {
    let mut names = Vec::new();
    for value in response_headers.get_all("Vary").unwrap_or_default() {
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return Err(CacheError::WildcardVary);
            }
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Storage key of the variant selected by `request_headers`
///
/// Each negotiated header contributes one positional component, empty when the
/// request lacks it. Empty names (the no-`Vary` marker) contribute nothing.
pub fn storage_key(url: &str, negotiated: &[String], request_headers: &Headers) -> String {
    let mut parts: Vec<String> = vec![DATA_PREFIX.to_string(), url.to_string()];
    for name in negotiated.iter().filter(|n| !n.is_empty()) {
        let value = request_headers
            .get_all(name)
            .map(|values| values.join(VALUE_SEPARATOR))
            .unwrap_or_default();
        parts.push(value);
    }
    parts.join(SEPARATOR)
}

/// Patterns matching every stored variant of `url` and nothing else
pub fn variant_patterns(url: &str) -> [String; 2] {
    let escaped = escape_glob(url);
    [
        format!("{DATA_PREFIX}{SEPARATOR}{escaped}"),
        format!("{DATA_PREFIX}{SEPARATOR}{escaped}{SEPARATOR}*"),
    ]
}

/// Escape glob metacharacters so `raw` matches only itself
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::glob_match;
    use proptest::prelude::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(metadata_key("http://x/a"), "META@@http://x/a");
        assert_eq!(mutex_key("DATA@@http://x/a"), "mutex-{DATA@@http://x/a}");
        assert!(is_mutex_key(&mutex_key("DATA@@http://x/a")));
        assert!(!is_mutex_key("DATA@@http://x/mutex-a"));

        let names = vec!["Accept-Language".to_string()];
        let request = Headers::from([("accept-language", "en")]);
        assert_eq!(
            storage_key("http://x/a", &names, &request),
            "DATA@@http://x/a@@en"
        );
    }

    #[test]
    fn test_hash_tag_extraction() {
        assert_eq!(hash_tag("plain"), "plain");
        assert_eq!(hash_tag("mutex-{abc}"), "abc");
        assert_eq!(hash_tag("a{}b"), "a{}b");
        assert_eq!(hash_tag("a{b"), "a{b");
    }

    #[test]
    fn test_mutex_key_keeps_existing_hash_tag() {
        let key = "DATA@@/p?{user1}@@en";
        let record = mutex_key(key);
        assert_eq!(record, "mutex-{user1}DATA@@/p?{user1}@@en");
        assert_eq!(hash_tag(&record), hash_tag(key));

        // Without a tag the whole key is the tag
        assert_eq!(hash_tag(&mutex_key("DATA@@/p")), "DATA@@/p");
    }

    #[test]
    fn test_separator_in_url_is_not_storable() {
        assert!(is_storable_url("http://x/a?b=c"));
        assert!(!is_storable_url("/a@@x"));
    }

    #[test]
    fn test_multi_value_and_missing_headers() {
        let names = vec!["Accept".to_string(), "Cookie".to_string()];
        let mut request = Headers::new();
        request.append("Accept", "text/html");
        request.append("Accept", "application/json");
        assert_eq!(
            storage_key("u", &names, &request),
            "DATA@@u@@text/html--application/json@@"
        );
    }

    #[test]
    fn test_marker_contributes_nothing() {
        let marker = vec![String::new()];
        assert_eq!(storage_key("u", &marker, &Headers::new()), "DATA@@u");
        assert_eq!(storage_key("u", &[], &Headers::new()), "DATA@@u");
    }

    #[test]
    fn test_vary_parsing() {
        let headers = Headers::from([("Vary", " Accept-Encoding ,Accept-Language,,")]);
        assert_eq!(
            vary_header_names(&headers).unwrap(),
            vec!["Accept-Encoding", "Accept-Language"]
        );

        assert!(vary_header_names(&Headers::new()).unwrap().is_empty());

        let wildcard = Headers::from([("vary", "Accept, *")]);
        assert_eq!(
            vary_header_names(&wildcard),
            Err(CacheError::WildcardVary)
        );
    }

    #[test]
    fn test_variant_patterns_match_only_the_url() {
        let url = "http://x/a?q=[1]*";
        let [exact, variants] = variant_patterns(url);
        let names = vec!["Accept".to_string()];
        let key = storage_key(url, &names, &Headers::from([("Accept", "en")]));

        assert!(glob_match(&exact, &storage_key(url, &[], &Headers::new())));
        assert!(glob_match(&variants, &key));
        assert!(!glob_match(&variants, "DATA@@http://x/a?q=1@@en"));
        assert!(!glob_match(&exact, "DATA@@http://x/a?q=[1]*/other"));
        assert!(!glob_match(&variants, "DATA@@http://x/a?q=[1]*/other@@en"));
    }

    proptest! {
        #[test]
        fn prop_same_inputs_same_key(
            url in "[a-z:/.]{1,24}",
            value in "[ -~]{0,12}",
        ) {
            let names = vec!["Accept-Language".to_string()];
            let a = Headers::from([("Accept-Language", value.clone())]);
            let b = Headers::from([("accept-language", value)]);
            prop_assert_eq!(storage_key(&url, &names, &a), storage_key(&url, &names, &b));
        }

        #[test]
        fn prop_different_value_different_key(
            url in "[a-z:/.]{1,24}",
            first in "[ -~]{0,12}",
            second in "[ -~]{0,12}",
        ) {
            prop_assume!(first != second);
            let names = vec!["Accept-Language".to_string()];
            let a = Headers::from([("Accept-Language", first)]);
            let b = Headers::from([("Accept-Language", second)]);
            prop_assert_ne!(storage_key(&url, &names, &a), storage_key(&url, &names, &b));
        }
    }
}
