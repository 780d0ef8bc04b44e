//! Query string decoding.

use std::collections::HashMap;
use tracing::warn;

/// Decodes a query string into a key → value mapping.
///
/// Pairs are split on `&` and then on the first `=`. Keys and values are
/// percent-decoded with `application/x-www-form-urlencoded` rules, so `+`
/// becomes a space. A key without `=` maps to an empty string and when a key
/// occurs more than once the last occurrence wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.is_empty() {
        return HashMap::new();
    }

    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map_err(|e| warn!(query, cause = %e, "failed to decode query string"))
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::parse_query;

    #[test]
    fn test_simple_pairs() {
        let query = parse_query("q=test&page=1&limit=10");
        assert_eq!(query.len(), 3);
        assert_eq!(query["q"], "test");
        assert_eq!(query["page"], "1");
        assert_eq!(query["limit"], "10");
    }

    #[test]
    fn test_last_duplicate_wins() {
        let query = parse_query("a=1&a=2");
        assert_eq!(query.len(), 1);
        assert_eq!(query["a"], "2");
    }

    #[test]
    fn test_key_without_value() {
        let query = parse_query("flag&name=");
        assert_eq!(query["flag"], "");
        assert_eq!(query["name"], "");
    }

    #[test]
    fn test_split_on_first_equals() {
        let query = parse_query("expr=a=b");
        assert_eq!(query["expr"], "a=b");
    }

    #[test]
    fn test_percent_decoding() {
        let query = parse_query("na%20me=J%C3%BCrgen+M&x=%26");
        assert_eq!(query["na me"], "Jürgen M");
        assert_eq!(query["x"], "&");
    }

    #[test]
    fn test_empty() {
        assert!(parse_query("").is_empty());
        assert!(parse_query("?").is_empty());
        assert_eq!(parse_query("a=1&&b=2").len(), 2);
    }
}
