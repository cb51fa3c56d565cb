//! Generation history
//!
//! One record per artifact a run attempted: where it went and how it ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationOutcome {
    Written,
    SkippedProtected,
    Failed,
}

impl GenerationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationOutcome::Written => "written",
            GenerationOutcome::SkippedProtected => "skippedProtected",
            GenerationOutcome::Failed => "failed",
        }
    }

    /// Unknown text reads back as `Failed`
    pub fn parse(value: &str) -> Self {
        match value {
            "written" => GenerationOutcome::Written,
            "skippedProtected" => GenerationOutcome::SkippedProtected,
            _ => GenerationOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationHistoryRecord {
    pub id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    /// Template name of the artifact
    pub artifact: String,
    pub output_path: String,
    pub outcome: GenerationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl GenerationHistoryRecord {
    pub fn new(
        schema_name: &str,
        table_name: &str,
        artifact: &str,
        output_path: &Path,
        outcome: GenerationOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            artifact: artifact.to_string(),
            output_path: output_path.display().to_string(),
            outcome,
            error: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Newest first, optionally only for one table
pub(crate) fn select_history(
    records: &[GenerationHistoryRecord],
    table_name: Option<&str>,
) -> Vec<GenerationHistoryRecord> {
    let mut selected: Vec<_> = records
        .iter()
        .filter(|r| table_name.map_or(true, |t| r.table_name == t))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_outcome_text() {
        for outcome in [
            GenerationOutcome::Written,
            GenerationOutcome::SkippedProtected,
            GenerationOutcome::Failed,
        ] {
            assert_eq!(GenerationOutcome::parse(outcome.as_str()), outcome);
        }
        assert_eq!(GenerationOutcome::parse("garbage"), GenerationOutcome::Failed);
    }

    #[test]
    fn test_select_filters_and_orders_newest_first() {
        let path = Path::new("out/A.cs");
        let mut old = GenerationHistoryRecord::new("dbo", "A", "entity", path, GenerationOutcome::Written);
        old.generated_at -= Duration::seconds(5);
        let new = GenerationHistoryRecord::new("dbo", "A", "entity", path, GenerationOutcome::Failed)
            .with_error("boom");
        let other = GenerationHistoryRecord::new("dbo", "B", "entity", path, GenerationOutcome::Written);
        let records = vec![old.clone(), other, new.clone()];

        let selected = select_history(&records, Some("A"));
        assert_eq!(selected, vec![new, old]);
        assert_eq!(select_history(&records, None).len(), 3);
    }
}
