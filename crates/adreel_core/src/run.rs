//! Run identity and entry modes.

use serde::{Deserialize, Serialize};

/// Identifier of one end-to-end pipeline execution.
///
/// Used as the first segment of every artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(derive_more::Display)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier of the form `{prefix}_{MMDD_HHMM}_{uuid8}`.
    ///
    /// # Examples
    ///
    /// ```
    /// use adreel_core::RunId;
    ///
    /// let id = RunId::generate("Acme Watches");
    /// assert!(id.as_str().starts_with("acme_watches_"));
    /// ```
    pub fn generate(prefix: &str) -> Self {
        let slug = crate::universe::slugify(prefix);
        let stamp = chrono::Local::now().format("%m%d_%H%M");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}_{}", slug, stamp, &suffix[..8]))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The three ways a run can start.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EntryMode {
    /// Start from raw concept text and expand it.
    DirectConcept,
    /// Start from a brand brief and generate several concepts.
    BrandBrief,
    /// Start from an evaluation record produced outside this run.
    PreEvaluated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_entry_mode_names() {
        assert_eq!(EntryMode::from_str("brand-brief").unwrap(), EntryMode::BrandBrief);
        assert_eq!(EntryMode::PreEvaluated.to_string(), "pre-evaluated");
        let parsed: EntryMode = serde_json::from_str("\"direct-concept\"").unwrap();
        assert_eq!(parsed, EntryMode::DirectConcept);
    }
}
