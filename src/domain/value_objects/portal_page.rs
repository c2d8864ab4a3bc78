use serde::{Deserialize, Serialize};
use std::fmt;

/// Independently-addressable portal surfaces the reverse sync engine writes
/// to. Stage order is fixed; a failed stage aborts the rest for that member.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalPage {
    General,
    Contact,
    Financial,
}

impl PortalPage {
    pub const ORDERED: [PortalPage; 3] = [
        PortalPage::General,
        PortalPage::Contact,
        PortalPage::Financial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortalPage::General => "general",
            PortalPage::Contact => "contact",
            PortalPage::Financial => "financial",
        }
    }

    pub fn parse(value: &str) -> Option<PortalPage> {
        PortalPage::ORDERED
            .into_iter()
            .find(|page| page.as_str() == value)
    }
}

impl fmt::Display for PortalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
