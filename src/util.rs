/// Host portion of a forum URL, without scheme, port or path.
pub fn domain_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let end = rest.find(['/', ':', '?']).unwrap_or(rest.len());
    &rest[..end]
}

/// Parses a listing cell like `1.2k`, `15`, or `3,405` into a count.
pub fn approx_count(raw: &str) -> i64 {
    let cleaned = raw.trim().replace(',', "").to_ascii_lowercase();
    if let Some(head) = cleaned.strip_suffix('k') {
        return head.parse::<f64>().map_or(0, |v| (v * 1e3) as i64);
    }
    if let Some(head) = cleaned.strip_suffix('m') {
        return head.parse::<f64>().map_or(0, |v| (v * 1e6) as i64);
    }
    cleaned.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{approx_count, domain_of};

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("https://meta.discourse.org/latest"), "meta.discourse.org");
        assert_eq!(domain_of("http://forum.example.com"), "forum.example.com");
        assert_eq!(domain_of("forum.example.com:8080/x"), "forum.example.com");
    }

    #[test]
    fn abbreviated_counts() {
        assert_eq!(approx_count("15"), 15);
        assert_eq!(approx_count("3,405"), 3405);
        assert_eq!(approx_count("1.2k"), 1200);
        assert_eq!(approx_count("2M"), 2_000_000);
        assert_eq!(approx_count("n/a"), 0);
    }
}
