//! Access rights granted to a user at a customer.

use std::fmt;

use tracing::debug;
use url::Url;

/// Right name marking the customer the user selected when logging in.
pub const CUSTOMER_SELECTED_UPON_LOGIN: &str = "USER";

/// Right required for application-wide administration.
pub const ADMINISTRATE_APPLICATION: &str = "ADMINISTRATE_APPLICATION";

const SEPARATOR: char = '@';

/// A `right@customer` pair, e.g. `APPROVE_DOI_REQUEST@https://api.nva.unit.no/customer/123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessRightEntry {
    access_right: String,
    customer_id: Url,
}

impl AccessRightEntry {
    pub fn new(access_right: impl Into<String>, customer_id: Url) -> Self {
        Self {
            access_right: access_right.into(),
            customer_id,
        }
    }

    /// Parse a single `right@customer` token.
    pub fn parse(token: &str) -> Option<Self> {
        let (access_right, customer_id) = token.trim().split_once(SEPARATOR)?;
        let access_right = access_right.trim();
        if access_right.is_empty() {
            return None;
        }
        let customer_id = Url::parse(customer_id.trim()).ok()?;
        Some(Self::new(access_right, customer_id))
    }

    /// Parse a comma-separated list of entries. Malformed tokens are skipped.
    pub fn from_csv(csv: &str) -> Vec<Self> {
        csv.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter_map(|token| {
                let entry = Self::parse(token);
                if entry.is_none() {
                    debug!(token, "Skipping malformed access right entry");
                }
                entry
            })
            .collect()
    }

    /// Render entries as a comma-separated list.
    pub fn to_csv(entries: &[Self]) -> String {
        entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn access_right(&self) -> &str {
        &self.access_right
    }

    pub fn customer_id(&self) -> &Url {
        &self.customer_id
    }

    pub fn describes_customer_upon_login(&self) -> bool {
        self.access_right == CUSTOMER_SELECTED_UPON_LOGIN
    }
}

impl fmt::Display for AccessRightEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.access_right, SEPARATOR, self.customer_id)
    }
}
