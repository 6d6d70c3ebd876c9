//! Bloomberg provider
//!
//! Bloomberg filenames lead with the feed name (`equity_20240115.csv`,
//! `pricing.out.xml`). Files are grouped by that feed.

use super::{InboxEndpoint, ProviderAdapter};

/// Subfolder used when a filename has no leading feed segment.
const UNKNOWN_FEED: &str = "unknown";

pub struct BloombergAdapter {
    endpoint: InboxEndpoint,
}

impl BloombergAdapter {
    pub const NAME: &'static str = "bloomberg";
    pub const CONFIG_PREFIX: &'static str = "BLOOMBERG";

    pub fn new(endpoint: InboxEndpoint) -> Self {
        Self { endpoint }
    }
}

/// Leading segment of `name` before the first `_` or `.`, lower-cased.
fn feed_name(name: &str) -> String {
    let feed = name.split(['_', '.']).next().unwrap_or_default().trim();
    if feed.is_empty() {
        UNKNOWN_FEED.to_string()
    } else {
        feed.to_lowercase()
    }
}

impl ProviderAdapter for BloombergAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn endpoint(&self) -> &InboxEndpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut InboxEndpoint {
        &mut self.endpoint
    }

    fn provider_subfolder(&self, final_name: &str) -> String {
        format!("{}/{}", Self::NAME, feed_name(final_name))
    }
}
