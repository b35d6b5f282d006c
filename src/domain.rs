use std::fmt;

use clap::ValueEnum;

/// Agency selector value meaning "no agency filter".
pub const ALL_AGENCIES: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Contracts,
    Grants,
}

impl Collection {
    /// Order in which collections are fetched and written as sheets.
    pub const ALL: [Collection; 2] = [Collection::Contracts, Collection::Grants];

    /// JSON key under `result` holding the page's records.
    pub fn key(self) -> &'static str {
        match self {
            Collection::Contracts => "contracts",
            Collection::Grants => "grants",
        }
    }

    pub fn sheet_name(self) -> &'static str {
        match self {
            Collection::Contracts => "Contracts",
            Collection::Grants => "Grants",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Date, newest first.
    #[default]
    Date,
    /// Value, high to low.
    Value,
    /// Savings, high to low.
    Savings,
    /// Recipient, A to Z.
    Recipient,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            SortKey::Date => "Date (Newest → Oldest)",
            SortKey::Value => "Value (High → Low)",
            SortKey::Savings => "Savings (High → Low)",
            SortKey::Recipient => "Recipient (A → Z)",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Date => write!(f, "date"),
            SortKey::Value => write!(f, "value"),
            SortKey::Savings => write!(f, "savings"),
            SortKey::Recipient => write!(f, "recipient"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AgencyFilter {
    #[default]
    All,
    Exact(String),
}

impl AgencyFilter {
    pub fn matches(&self, agency: Option<&str>) -> bool {
        match self {
            AgencyFilter::All => true,
            AgencyFilter::Exact(expected) => agency == Some(expected.as_str()),
        }
    }
}

impl From<Option<&str>> for AgencyFilter {
    fn from(value: Option<&str>) -> Self {
        match value {
            None => AgencyFilter::All,
            Some(value) if value.is_empty() || value == ALL_AGENCIES => AgencyFilter::All,
            Some(value) => AgencyFilter::Exact(value.to_string()),
        }
    }
}

/// User-supplied filter inputs. Empty needles disable their filter.
#[derive(Debug, Clone, Default)]
pub struct GrantFilter {
    pub agency: AgencyFilter,
    pub recipient: String,
    pub description: String,
}

impl GrantFilter {
    /// Builds a filter from raw inputs, trimming and lower-casing the search needles.
    pub fn new(agency: Option<&str>, recipient: Option<&str>, description: Option<&str>) -> Self {
        Self {
            agency: AgencyFilter::from(agency),
            recipient: normalize_needle(recipient),
            description: normalize_needle(description),
        }
    }
}

fn normalize_needle(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names() {
        assert_eq!(Collection::Grants.key(), "grants");
        assert_eq!(Collection::Contracts.sheet_name(), "Contracts");
        assert_eq!(Collection::ALL[0], Collection::Contracts);
    }

    #[test]
    fn sort_keys_parse_from_cli_names() {
        assert_eq!(SortKey::from_str("value", true), Ok(SortKey::Value));
        assert_eq!(SortKey::from_str("Recipient", true), Ok(SortKey::Recipient));
        assert!(SortKey::from_str("amount", true).is_err());
        assert_eq!(SortKey::default().label(), "Date (Newest → Oldest)");
    }

    #[test]
    fn agency_sentinel_disables_filter() {
        assert_eq!(AgencyFilter::from(Some("All")), AgencyFilter::All);
        assert_eq!(AgencyFilter::from(None), AgencyFilter::All);
        let exact = AgencyFilter::from(Some("EPA"));
        assert!(exact.matches(Some("EPA")));
        assert!(!exact.matches(Some("epa")));
        assert!(!exact.matches(None));
    }

    #[test]
    fn filter_needles_are_normalized() {
        let filter = GrantFilter::new(None, Some("  ACME "), None);
        assert_eq!(filter.recipient, "acme");
        assert!(filter.description.is_empty());
    }
}
