//! Column Convention Resolver
//!
//! Maps a column's name, or an explicit metadata tag, to the convention that
//! changes how code is generated for it (encryption, computed values, ...).
//!
//! Resolution is an ordered chain of rules; the first rule that answers wins:
//! 1. metadata tag (`ccType` extended property)
//! 2. known name prefix (`eno_`, `ent_`, ...)
//! 3. legacy three-letter codes without a separator (`ENO`, `ENT`, `LKP`, `ENM`)
//! 4. `Convention::None`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Extended property key that carries an explicit convention code
pub const CONVENTION_TAG: &str = "ccType";

/// Free-form key/value properties attached to a column by the introspector
pub type ExtendedProperties = BTreeMap<String, String>;

/// Generation-affecting convention of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Convention {
    #[default]
    None,
    /// Hashed on write, never read back (passwords)
    OneWayEncryption,
    /// Encrypted at rest, decrypted on read
    TwoWayEncryption,
    Lookup,
    Enum,
    Localized,
    /// Computed by the database; read-only
    Calculated,
    /// Maintained by server-side business logic; read-only for clients
    BusinessLogic,
    /// Aggregate maintained elsewhere; read-only for clients
    Aggregate,
    SeparateUpdate,
    Upload,
    FakeUniqueIndex,
    SeparateChangedBy,
    SeparateList,
}

/// Every convention that has a code, in prefix-table order
const CODED: [Convention; 13] = [
    Convention::OneWayEncryption,
    Convention::TwoWayEncryption,
    Convention::Lookup,
    Convention::Enum,
    Convention::Localized,
    Convention::Calculated,
    Convention::BusinessLogic,
    Convention::Aggregate,
    Convention::SeparateUpdate,
    Convention::Upload,
    Convention::SeparateChangedBy,
    Convention::SeparateList,
    Convention::FakeUniqueIndex,
];

impl Convention {
    /// Three-letter code used in metadata tags
    pub fn code(self) -> Option<&'static str> {
        let code = match self {
            Convention::None => return None,
            Convention::OneWayEncryption => "ENO",
            Convention::TwoWayEncryption => "ENT",
            Convention::Lookup => "LKP",
            Convention::Enum => "ENM",
            Convention::Localized => "LOC",
            Convention::Calculated => "CLC",
            Convention::BusinessLogic => "BLG",
            Convention::Aggregate => "AGG",
            Convention::SeparateUpdate => "SPT",
            Convention::Upload => "UPL",
            Convention::FakeUniqueIndex => "FUI",
            Convention::SeparateChangedBy => "SCB",
            Convention::SeparateList => "SPL",
        };
        Some(code)
    }

    /// Column-name prefix that selects this convention (`eno_`, ...)
    pub fn prefix(self) -> Option<String> {
        self.code().map(|c| format!("{}_", c.to_ascii_lowercase()))
    }

    /// Look up a convention by its code, ignoring case and a trailing `_`
    pub fn from_code(code: &str) -> Option<Self> {
        let key = code.trim().trim_end_matches('_');
        CODED
            .iter()
            .copied()
            .find(|c| c.code().is_some_and(|k| k.eq_ignore_ascii_case(key)))
    }

    /// Clients may read but never write the value
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Convention::Calculated | Convention::BusinessLogic | Convention::Aggregate
        )
    }

    /// Column is left out of the generic update payload
    pub fn excluded_from_update(self) -> bool {
        self.is_read_only()
            || matches!(
                self,
                Convention::OneWayEncryption | Convention::SeparateUpdate
            )
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().unwrap_or("NONE"))
    }
}

impl FromStr for Convention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("none") {
            return Ok(Convention::None);
        }
        Convention::from_code(s).ok_or_else(|| format!("unknown convention code: {}", s))
    }
}

/// One link of the resolution chain
pub trait ConventionRule: Send + Sync {
    fn resolve(
        &self,
        column_name: &str,
        extended_properties: Option<&ExtendedProperties>,
    ) -> Option<Convention>;
}

/// Explicit `ccType` tag; the first comma-separated token is the code
pub struct MetadataTagRule;

impl ConventionRule for MetadataTagRule {
    fn resolve(
        &self,
        _column_name: &str,
        extended_properties: Option<&ExtendedProperties>,
    ) -> Option<Convention> {
        let value = extended_properties?.get(CONVENTION_TAG)?;
        let token = value.split(',').map(str::trim).find(|t| !t.is_empty())?;
        Convention::from_code(token)
    }
}

/// Literal, case-insensitive name prefix such as `eno_`
pub struct PrefixRule;

impl ConventionRule for PrefixRule {
    fn resolve(
        &self,
        column_name: &str,
        _extended_properties: Option<&ExtendedProperties>,
    ) -> Option<Convention> {
        let name = column_name.as_bytes();
        CODED.iter().copied().find(|c| {
            c.prefix().is_some_and(|p| {
                name.len() >= p.len() && name[..p.len()].eq_ignore_ascii_case(p.as_bytes())
            })
        })
    }
}

/// Historic names that used the bare code without a separator
pub struct LegacyCodeRule;

const LEGACY_CODES: [(&str, Convention); 4] = [
    ("ENO", Convention::OneWayEncryption),
    ("ENT", Convention::TwoWayEncryption),
    ("LKP", Convention::Lookup),
    ("ENM", Convention::Enum),
];

impl ConventionRule for LegacyCodeRule {
    fn resolve(
        &self,
        column_name: &str,
        _extended_properties: Option<&ExtendedProperties>,
    ) -> Option<Convention> {
        let upper = column_name.to_uppercase();
        LEGACY_CODES
            .iter()
            .find(|(code, _)| upper.starts_with(*code))
            .map(|(_, convention)| *convention)
    }
}

/// Ordered rule chain resolving a column to its convention
pub struct ConventionResolver {
    rules: Vec<Box<dyn ConventionRule>>,
}

impl ConventionResolver {
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(MetadataTagRule),
            Box::new(PrefixRule),
            Box::new(LegacyCodeRule),
        ])
    }

    /// Build a resolver from a custom chain; earlier rules take priority
    pub fn with_rules(rules: Vec<Box<dyn ConventionRule>>) -> Self {
        Self { rules }
    }

    pub fn resolve(
        &self,
        column_name: &str,
        extended_properties: Option<&ExtendedProperties>,
    ) -> Convention {
        self.rules
            .iter()
            .find_map(|rule| rule.resolve(column_name, extended_properties))
            .unwrap_or_default()
    }
}

impl Default for ConventionResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(value: &str) -> ExtendedProperties {
        BTreeMap::from([(CONVENTION_TAG.to_string(), value.to_string())])
    }

    #[test]
    fn test_tag_overrides_name() {
        let resolver = ConventionResolver::new();
        let props = tag("ENT");
        assert_eq!(
            resolver.resolve("Password", Some(&props)),
            Convention::TwoWayEncryption
        );
        assert_eq!(
            resolver.resolve("eno_Password", Some(&props)),
            Convention::TwoWayEncryption
        );
    }

    #[test]
    fn test_prefix_detection() {
        let resolver = ConventionResolver::new();
        assert_eq!(resolver.resolve("eno_Password", None), Convention::OneWayEncryption);
        assert_eq!(resolver.resolve("CLC_Total", None), Convention::Calculated);
        assert_eq!(resolver.resolve("blg_Status", None), Convention::BusinessLogic);
        assert_eq!(resolver.resolve("agg_OrderCount", None), Convention::Aggregate);
        assert_eq!(resolver.resolve("spl_Tags", None), Convention::SeparateList);
        assert_eq!(resolver.resolve("fui_Code", None), Convention::FakeUniqueIndex);
    }

    #[test]
    fn test_tag_uses_first_token() {
        let resolver = ConventionResolver::new();
        let props = tag(" clc , readonly");
        assert_eq!(resolver.resolve("Total", Some(&props)), Convention::Calculated);
    }

    #[test]
    fn test_unknown_tag_falls_through_to_name() {
        let resolver = ConventionResolver::new();
        let props = tag("XYZ");
        assert_eq!(
            resolver.resolve("lkp_Country", Some(&props)),
            Convention::Lookup
        );
    }

    #[test]
    fn test_legacy_codes_without_separator() {
        let resolver = ConventionResolver::new();
        assert_eq!(resolver.resolve("ENOPassword", None), Convention::OneWayEncryption);
        assert_eq!(resolver.resolve("entCardNumber", None), Convention::TwoWayEncryption);
        assert_eq!(resolver.resolve("LkpStatus", None), Convention::Lookup);
        assert_eq!(resolver.resolve("EnmKind", None), Convention::Enum);
    }

    #[test]
    fn test_plain_names_resolve_to_none() {
        let resolver = ConventionResolver::new();
        assert_eq!(resolver.resolve("Email", None), Convention::None);
        assert_eq!(resolver.resolve("", None), Convention::None);
        assert_eq!(resolver.resolve("loc", None), Convention::None);
    }

    #[test]
    fn test_custom_chain_order() {
        let resolver = ConventionResolver::with_rules(vec![Box::new(PrefixRule)]);
        let props = tag("ENT");
        assert_eq!(
            resolver.resolve("eno_Password", Some(&props)),
            Convention::OneWayEncryption
        );
        assert_eq!(resolver.resolve("ENOPassword", None), Convention::None);
    }

    #[test]
    fn test_code_round_trip_and_flags() {
        for convention in CODED {
            let code = convention.code().unwrap();
            assert_eq!(code.parse::<Convention>().unwrap(), convention);
        }
        assert_eq!("none".parse::<Convention>().unwrap(), Convention::None);
        assert!(Convention::Aggregate.is_read_only());
        assert!(Convention::OneWayEncryption.excluded_from_update());
        assert!(!Convention::TwoWayEncryption.excluded_from_update());
        assert_eq!(Convention::Upload.prefix().as_deref(), Some("upl_"));
    }
}
