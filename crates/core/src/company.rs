use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A company record synchronized from the public business registry.
///
/// Keyed by the registration number (ICO); sync is idempotent per ICO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Business registration number.
    pub ico: String,

    /// Legal name.
    pub name: String,

    /// Registered address, single-line form.
    #[serde(default)]
    pub address: Option<String>,

    /// Legal form code from the registry.
    #[serde(default)]
    pub legal_form: Option<String>,

    /// VAT identifier when registered.
    #[serde(default)]
    pub vat_id: Option<String>,

    /// When the record was last refreshed from the registry.
    pub synced_at: DateTime<Utc>,
}

impl Company {
    /// Create a record stamped as synced now.
    #[must_use]
    pub fn new(ico: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ico: ico.into(),
            name: name.into(),
            address: None,
            legal_form: None,
            vat_id: None,
            synced_at: Utc::now(),
        }
    }
}
