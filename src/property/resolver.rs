// Search Console property resolution and live validation

use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

use super::matcher;
use super::types::{
    PropertyFormat, PropertyResolution, SearchAnalyticsQuery, SearchAnalyticsResponse,
    SiteProperty, SitesListResponse,
};
use crate::error::{GscError, Result};
use crate::http_client::SearchConsoleClient;

/// Search Console reports lag by a few days; the probe window ends this far back
const PROBE_LAG_DAYS: i64 = 3;

/// Number of days covered by the validation probe
const PROBE_WINDOW_DAYS: i64 = 5;

const SITES_PATH: &str = "/webmasters/v3/sites";

/// Percent-encode a site URL for use as a single path segment
fn encode_site_url(site_url: &str) -> String {
    url::form_urlencoded::byte_serialize(site_url.as_bytes()).collect()
}

/// Fixed recent window `(start, end)` used by `validate_property_format`
pub fn probe_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = today - Duration::days(PROBE_LAG_DAYS);
    let start = end - Duration::days(PROBE_WINDOW_DAYS - 1);
    (start, end)
}

/// Resolves a domain to one of the user's Search Console properties
#[derive(Clone)]
pub struct PropertyResolver {
    client: Arc<SearchConsoleClient>,
}

impl PropertyResolver {
    /// Create a new property resolver
    pub fn new(client: Arc<SearchConsoleClient>) -> Self {
        Self { client }
    }

    /// List the user's Search Console sites
    ///
    /// Terminal token errors pass through unchanged; anything else becomes
    /// `PropertyList`.
    pub async fn list_properties(&self) -> Result<Vec<SiteProperty>> {
        let response: SitesListResponse = self
            .client
            .get_json(SITES_PATH)
            .await
            .map_err(|e| {
                if e.requires_reauthorization() {
                    e
                } else {
                    tracing::error!("Failed to list Search Console properties: {}", e);
                    GscError::PropertyList(e.to_string())
                }
            })?;

        let properties: Vec<SiteProperty> =
            response.site_entry.into_iter().map(Into::into).collect();
        tracing::debug!("Fetched {} Search Console properties", properties.len());
        Ok(properties)
    }

    /// Exact property for a domain, or `None`
    pub async fn find_property_for_domain(&self, domain: &str) -> Result<Option<String>> {
        let properties = self.list_properties().await?;
        let found = matcher::find_property_for_domain(&properties, domain);

        match &found {
            Some(site_url) => tracing::info!("Found property {} for {}", site_url, domain),
            None => tracing::info!("No Search Console property matches {}", domain),
        }
        Ok(found)
    }

    /// Rank candidate properties for a domain and confirm one returns data
    ///
    /// Never fails: errors produce the empty resolution.
    pub async fn detect_primary_property(&self, domain: &str) -> PropertyResolution {
        let properties = match self.list_properties().await {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("Property detection for {} failed: {}", domain, e);
                return PropertyResolution::empty();
            }
        };

        let all_matches = matcher::collect_matches(&properties, domain);
        let Some(primary) = matcher::rank(&all_matches).map(|p| p.site_url.clone()) else {
            tracing::info!("No candidate properties for {}", domain);
            return PropertyResolution::empty();
        };
        let recommended_format: PropertyFormat = matcher::property_format(&primary);

        tracing::info!(
            "Primary property candidate for {}: {} ({} matches)",
            domain,
            primary,
            all_matches.len()
        );

        let validated_property = if self.validate_property_format(&primary).await {
            primary.clone()
        } else {
            let mut validated = None;
            for candidate in all_matches.iter().filter(|p| p.site_url != primary) {
                if self.validate_property_format(&candidate.site_url).await {
                    validated = Some(candidate.site_url.clone());
                    break;
                }
            }
            validated.unwrap_or_else(|| {
                tracing::info!(
                    "No candidate returned data for {}, falling back to {}",
                    domain,
                    primary
                );
                primary.clone()
            })
        };

        PropertyResolution {
            primary_property: Some(primary),
            all_matches,
            recommended_format,
            validated_property: Some(validated_property),
        }
    }

    /// Probe a property with a one-row analytics query over the recent window
    ///
    /// Advisory only: any error counts as `false`, and an auth failure on one
    /// candidate leaves the session in place.
    pub async fn validate_property_format(&self, site_url: &str) -> bool {
        let (start, end) = probe_window(Utc::now().date_naive());
        let query = SearchAnalyticsQuery {
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            dimensions: vec!["query".to_string()],
            row_limit: 1,
        };

        let result: Result<SearchAnalyticsResponse> = self
            .client
            .post_json_keep_session(&analytics_path(site_url), &query)
            .await;

        match result {
            Ok(response) => {
                let valid = !response.rows.is_empty();
                tracing::debug!(site_url = %site_url, valid, "Validation probe finished");
                valid
            }
            Err(e) => {
                tracing::debug!(site_url = %site_url, error = %e, "Validation probe failed");
                false
            }
        }
    }

    /// Run a search analytics query against a property
    pub async fn query_search_analytics(
        &self,
        site_url: &str,
        query: &SearchAnalyticsQuery,
    ) -> Result<SearchAnalyticsResponse> {
        self.client.post_json(&analytics_path(site_url), query).await
    }
}

fn analytics_path(site_url: &str) -> String {
    format!(
        "{}/{}/searchAnalytics/query",
        SITES_PATH,
        encode_site_url(site_url)
    )
}
