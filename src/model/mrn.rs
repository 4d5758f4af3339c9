//! Marmot Resource Name parsing and formatting.
//!
//! Format: `mrn://<provider>/<type>/<name-or-qualified-path>`. Components
//! are slash-joined. Case-sensitive. Provider and type are drawn from
//! stable vocabularies but are represented as plain strings, not enums.

use std::fmt;

use crate::error::Error;

const SCHEME: &str = "mrn://";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Mrn(String);

impl Mrn {
    /// Build an MRN from its components, slash-joining the name path.
    pub fn new(provider: &str, asset_type: &str, name_path: &[&str]) -> Result<Self, Error> {
        if provider.is_empty() || asset_type.is_empty() || name_path.is_empty() {
            return Err(Error::validation(
                "mrn",
                "provider, type and name path must all be non-empty",
            ));
        }
        let name = name_path.join("/");
        Ok(Mrn(format!("{SCHEME}{provider}/{asset_type}/{name}")))
    }

    /// Parse and validate an existing MRN string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let rest = raw.strip_prefix(SCHEME).ok_or_else(|| {
            Error::validation("mrn", format!("'{raw}' does not start with '{SCHEME}'"))
        })?;
        let mut parts = rest.splitn(3, '/');
        let provider = parts.next().unwrap_or_default();
        let asset_type = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if provider.is_empty() || asset_type.is_empty() || name.is_empty() {
            return Err(Error::validation(
                "mrn",
                format!("'{raw}' is missing provider, type or name segment"),
            ));
        }
        Ok(Mrn(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn provider(&self) -> &str {
        self.segments().0
    }

    pub fn asset_type(&self) -> &str {
        self.segments().1
    }

    pub fn name(&self) -> &str {
        self.segments().2
    }

    fn segments(&self) -> (&str, &str, &str) {
        let rest = self.0.strip_prefix(SCHEME).unwrap_or(&self.0);
        let mut parts = rest.splitn(3, '/');
        (
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
        )
    }
}

impl fmt::Display for Mrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Mrn {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mrn::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_round_trip() {
        let mrn = Mrn::new("kafka", "Topic", &["orders", "events"]).unwrap();
        assert_eq!(mrn.as_str(), "mrn://kafka/Topic/orders/events");
        let parsed = Mrn::parse(mrn.as_str()).unwrap();
        assert_eq!(parsed.provider(), "kafka");
        assert_eq!(parsed.asset_type(), "Topic");
        assert_eq!(parsed.name(), "orders/events");
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(Mrn::parse("kafka/Topic/orders").is_err());
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(Mrn::parse("mrn://kafka").is_err());
        assert!(Mrn::parse("mrn://kafka/Topic/").is_err());
    }

    #[test]
    fn is_case_sensitive() {
        let a = Mrn::parse("mrn://kafka/Topic/orders").unwrap();
        let b = Mrn::parse("mrn://Kafka/Topic/orders").unwrap();
        assert_ne!(a, b);
    }
}
