// Search Console property resolution
// Matching, ranking and live validation of a domain's property

pub mod matcher;
mod resolver;
mod types;

pub use resolver::{probe_window, PropertyResolver};
pub use types::{
    PermissionLevel, PropertyFormat, PropertyResolution, SearchAnalyticsQuery,
    SearchAnalyticsResponse, SearchAnalyticsRow, SiteProperty,
};
