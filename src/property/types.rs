// Search Console property and analytics types

use serde::{Deserialize, Serialize};

/// Permission the signed-in user holds on a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    #[serde(rename = "siteOwner")]
    SiteOwner,
    #[serde(rename = "siteFullUser")]
    SiteFullUser,
    #[serde(rename = "siteRestrictedUser")]
    SiteRestrictedUser,
    #[serde(rename = "siteUnverifiedUser", other)]
    SiteUnverifiedUser,
}

/// A site entry from the Search Console sites list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProperty {
    pub site_url: String,
    pub permission_level: PermissionLevel,
    pub verified: bool,
}

impl SiteProperty {
    pub fn new(site_url: impl Into<String>, permission_level: PermissionLevel) -> Self {
        Self {
            site_url: site_url.into(),
            permission_level,
            verified: permission_level != PermissionLevel::SiteUnverifiedUser,
        }
    }
}

/// Raw entry as returned by the API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    pub permission_level: PermissionLevel,
}

impl From<SiteEntry> for SiteProperty {
    fn from(entry: SiteEntry) -> Self {
        SiteProperty::new(entry.site_url, entry.permission_level)
    }
}

/// `GET /webmasters/v3/sites` response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitesListResponse {
    #[serde(default)]
    pub site_entry: Vec<SiteEntry>,
}

/// Format of the recommended property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyFormat {
    /// No property matched; use the bare domain
    Domain,
    /// URL-prefix property (`https://host/`)
    Url,
    /// Domain property (`sc-domain:host`)
    ScDomain,
}

/// Outcome of primary property detection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResolution {
    pub primary_property: Option<String>,
    pub all_matches: Vec<SiteProperty>,
    pub recommended_format: PropertyFormat,
    pub validated_property: Option<String>,
}

impl PropertyResolution {
    /// No property matched
    pub fn empty() -> Self {
        Self {
            primary_property: None,
            all_matches: Vec::new(),
            recommended_format: PropertyFormat::Domain,
            validated_property: None,
        }
    }
}

/// Search analytics query body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsQuery {
    pub start_date: String,
    pub end_date: String,
    pub dimensions: Vec<String>,
    pub row_limit: u32,
}

/// One row of a search analytics response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchAnalyticsRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}

/// Search analytics response; `rows` is omitted by the API when empty
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchAnalyticsResponse {
    #[serde(default)]
    pub rows: Vec<SearchAnalyticsRow>,
}
