// Domain cleaning, property matching and ranking

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{PropertyFormat, SiteProperty};

const SC_DOMAIN_PREFIX: &str = "sc-domain:";

static PROTOCOL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").unwrap());

/// Normalize user input to a bare lowercase host
///
/// - `https://www.Example.com/blog` → `example.com`
/// - `sc-domain:example.com` → `example.com`
/// - `example.com:8080` → `example.com`
pub fn clean_domain(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let without_scheme = PROTOCOL_PATTERN.replace(&lower, "");
    let without_scheme = without_scheme
        .strip_prefix(SC_DOMAIN_PREFIX)
        .unwrap_or(without_scheme.as_ref());

    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.');

    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Host a property refers to (lowercase, port and path dropped)
pub fn property_host(site_url: &str) -> String {
    let lower = site_url.trim().to_lowercase();
    if let Some(domain) = lower.strip_prefix(SC_DOMAIN_PREFIX) {
        return domain.trim_end_matches('/').to_string();
    }

    let without_scheme = PROTOCOL_PATTERN.replace(&lower, "");
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().to_string()
}

/// Pick the property for a domain.
///
/// Exact pass first (host is `domain` or `www.domain`), then a literal
/// fallback over the five canonical property URLs in fixed order.
pub fn find_property_for_domain(properties: &[SiteProperty], domain: &str) -> Option<String> {
    let domain = clean_domain(domain);
    if domain.is_empty() {
        return None;
    }
    let www_domain = format!("www.{}", domain);

    if let Some(property) = properties.iter().find(|p| {
        let host = property_host(&p.site_url);
        host == domain || host == www_domain
    }) {
        return Some(property.site_url.clone());
    }

    let candidates = [
        format!("https://{}/", domain),
        format!("https://{}/", www_domain),
        format!("http://{}/", domain),
        format!("http://{}/", www_domain),
        format!("{}{}", SC_DOMAIN_PREFIX, domain),
    ];

    candidates
        .iter()
        .find(|candidate| properties.iter().any(|p| &p.site_url == *candidate))
        .cloned()
}

/// Every property whose URL contains the domain (bare or `www.`), case-insensitive
pub fn collect_matches(properties: &[SiteProperty], domain: &str) -> Vec<SiteProperty> {
    let domain = clean_domain(domain);
    if domain.is_empty() {
        return Vec::new();
    }
    let www_domain = format!("www.{}", domain);

    properties
        .iter()
        .filter(|p| {
            let url = p.site_url.to_lowercase();
            url.contains(&domain) || url.contains(&www_domain)
        })
        .cloned()
        .collect()
}

/// Format a property URL belongs to
pub fn property_format(site_url: &str) -> PropertyFormat {
    if site_url.starts_with(SC_DOMAIN_PREFIX) {
        PropertyFormat::ScDomain
    } else {
        PropertyFormat::Url
    }
}

/// Top candidate by fixed priority:
/// `sc-domain:` > `https://` non-www > `https://www.` > first remaining
pub fn rank(matches: &[SiteProperty]) -> Option<&SiteProperty> {
    matches
        .iter()
        .find(|p| p.site_url.starts_with(SC_DOMAIN_PREFIX))
        .or_else(|| {
            matches
                .iter()
                .find(|p| p.site_url.starts_with("https://") && !p.site_url.starts_with("https://www."))
        })
        .or_else(|| {
            matches
                .iter()
                .find(|p| p.site_url.starts_with("https://www."))
        })
        .or_else(|| matches.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::types::PermissionLevel;
    use proptest::prelude::*;

    fn props(urls: &[&str]) -> Vec<SiteProperty> {
        urls.iter()
            .map(|u| SiteProperty::new(*u, PermissionLevel::SiteOwner))
            .collect()
    }

    #[test]
    fn test_clean_domain() {
        assert_eq!(clean_domain("example.com"), "example.com");
        assert_eq!(clean_domain("https://www.Example.com/"), "example.com");
        assert_eq!(clean_domain("http://example.com/blog?x=1"), "example.com");
        assert_eq!(clean_domain("  WWW.example.com  "), "example.com");
        assert_eq!(clean_domain("sc-domain:example.com"), "example.com");
        assert_eq!(clean_domain("example.com:8443"), "example.com");
        assert_eq!(clean_domain("shop.example.com"), "shop.example.com");
        assert_eq!(clean_domain(""), "");
    }

    #[test]
    fn test_property_host() {
        assert_eq!(property_host("https://www.example.com/"), "www.example.com");
        assert_eq!(property_host("sc-domain:example.com"), "example.com");
        assert_eq!(property_host("http://example.com:8080/path/"), "example.com");
    }

    #[test]
    fn test_find_exact_pass_in_list_order() {
        let properties = props(&[
            "https://other.com/",
            "https://www.example.com/",
            "sc-domain:example.com",
        ]);
        assert_eq!(
            find_property_for_domain(&properties, "https://example.com"),
            Some("https://www.example.com/".to_string())
        );
    }

    #[test]
    fn test_find_ignores_subdomains_and_lookalikes() {
        let properties = props(&["https://blog.example.com/", "https://example.com.au/"]);
        assert_eq!(find_property_for_domain(&properties, "example.com"), None);
    }

    #[test]
    fn test_find_no_match() {
        let properties = props(&["https://other.com/"]);
        assert_eq!(find_property_for_domain(&properties, "example.com"), None);
        assert_eq!(find_property_for_domain(&properties, ""), None);
    }

    #[test]
    fn test_rank_prefers_sc_domain_regardless_of_order() {
        let orders = [
            ["sc-domain:example.com", "https://example.com/", "https://www.example.com/"],
            ["https://www.example.com/", "https://example.com/", "sc-domain:example.com"],
            ["https://example.com/", "sc-domain:example.com", "https://www.example.com/"],
        ];
        for order in orders {
            let matches = props(&order);
            assert_eq!(rank(&matches).unwrap().site_url, "sc-domain:example.com");
        }
    }

    #[test]
    fn test_rank_fallbacks() {
        let matches = props(&["https://www.example.com/", "https://example.com/"]);
        assert_eq!(rank(&matches).unwrap().site_url, "https://example.com/");

        let matches = props(&["http://example.com/", "https://www.example.com/"]);
        assert_eq!(rank(&matches).unwrap().site_url, "https://www.example.com/");

        let matches = props(&["http://www.example.com/", "http://example.com/"]);
        assert_eq!(rank(&matches).unwrap().site_url, "http://www.example.com/");

        assert!(rank(&[]).is_none());
    }

    #[test]
    fn test_collect_matches_is_case_insensitive() {
        let properties = props(&[
            "https://WWW.Example.com/",
            "https://other.com/",
            "sc-domain:example.com",
        ]);
        let matches = collect_matches(&properties, "Example.com");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].site_url, "https://WWW.Example.com/");
    }

    #[test]
    fn test_property_format() {
        assert_eq!(property_format("sc-domain:example.com"), PropertyFormat::ScDomain);
        assert_eq!(property_format("https://www.example.com/"), PropertyFormat::Url);
    }

    proptest! {
        #[test]
        fn prop_clean_domain_is_idempotent(host in "[a-v]{1,12}\\.(com|org|io)", www in any::<bool>(), https in any::<bool>()) {
            let input = format!(
                "{}{}{}/",
                if https { "https://" } else { "" },
                if www { "www." } else { "" },
                host
            );
            let cleaned = clean_domain(&input);
            prop_assert_eq!(&cleaned, &host);
            prop_assert_eq!(clean_domain(&cleaned), cleaned);
        }

        #[test]
        fn prop_unrelated_domains_never_match(domain in "[a-z]{3,10}\\.net") {
            let properties = props(&[
                "sc-domain:example.com",
                "https://example.com/",
                "https://www.example.com/",
            ]);
            prop_assert!(find_property_for_domain(&properties, &domain).is_none());
            prop_assert!(collect_matches(&properties, &domain).is_empty());
        }
    }
}
