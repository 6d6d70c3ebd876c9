//! Affirm provider
//!
//! Affirm stamps a settlement date into most filenames, either `YYYYMMDD` or
//! `YYYY-MM-DD`. Files are grouped by year and month of that date.

use feedvault_common::{IngestError, Result};
use regex::Regex;

use super::{InboxEndpoint, ProviderAdapter};

pub struct AffirmAdapter {
    endpoint: InboxEndpoint,
    date_pattern: Regex,
}

impl AffirmAdapter {
    pub const NAME: &'static str = "affirm";
    pub const CONFIG_PREFIX: &'static str = "AFFIRM";

    pub fn new(endpoint: InboxEndpoint) -> Result<Self> {
        let date_pattern = Regex::new(
            r"(?:^|\D)((?:19|20)\d{2})(?:(0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])|-(0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01]))(?:\D|$)",
        )
        .map_err(|e| IngestError::Config(format!("Invalid Affirm date pattern: {}", e)))?;

        Ok(Self {
            endpoint,
            date_pattern,
        })
    }

    /// `(year, month)` of the first date stamped in `name`.
    fn file_date<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        let caps = self.date_pattern.captures(name)?;
        let year = caps.get(1)?.as_str();
        let month = caps.get(2).or_else(|| caps.get(3))?.as_str();
        Some((year, month))
    }
}

impl ProviderAdapter for AffirmAdapter {
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
        match self.file_date(final_name) {
            Some((year, month)) => format!("{}/{}/{}", Self::NAME, year, month),
            None => format!("{}/undated", Self::NAME),
        }
    }
}
