//! Generation plan
//!
//! Turns a sync result into a per-table regenerate/skip decision.

use super::records::GenerationFlags;
use super::state::{MetadataState, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanReason {
    NewTable,
    SchemaChanged,
    NeverGenerated,
    Forced,
    NoChanges,
    GenerationDisabled,
}

impl PlanReason {
    pub fn description(self) -> &'static str {
        match self {
            PlanReason::NewTable => "New table",
            PlanReason::SchemaChanged => "Schema changed",
            PlanReason::NeverGenerated => "Never generated",
            PlanReason::Forced => "Regeneration forced",
            PlanReason::NoChanges => "No changes detected",
            PlanReason::GenerationDisabled => "Generation disabled for table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePlan {
    pub table_name: String,
    pub schema_name: String,
    pub is_new: bool,
    pub has_schema_changed: bool,
    pub requires_generation: bool,
    pub reason: PlanReason,
    pub current_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub flags: GenerationFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPlan {
    pub created_at: DateTime<Utc>,
    pub tables: Vec<TablePlan>,
}

impl GenerationPlan {
    /// One entry per active table, ordered by natural key
    pub fn build(state: &MetadataState, sync: &SyncResult, include_unchanged: bool) -> Self {
        let tables = state
            .active_tables()
            .map(|record| {
                let is_new = sync.new_tables.contains(&record.table_name);
                let has_schema_changed = is_new || sync.modified_tables.contains(&record.table_name);

                let reason = if !record.flags.any() {
                    PlanReason::GenerationDisabled
                } else if is_new {
                    PlanReason::NewTable
                } else if has_schema_changed {
                    PlanReason::SchemaChanged
                } else if record.last_generated.is_none() {
                    PlanReason::NeverGenerated
                } else if include_unchanged {
                    PlanReason::Forced
                } else {
                    PlanReason::NoChanges
                };

                TablePlan {
                    table_name: record.table_name.clone(),
                    schema_name: record.schema_name.clone(),
                    is_new,
                    has_schema_changed,
                    requires_generation: !matches!(
                        reason,
                        PlanReason::NoChanges | PlanReason::GenerationDisabled
                    ),
                    reason,
                    current_hash: record.hash.current().to_string(),
                    previous_hash: record.hash.previous().map(str::to_string),
                    flags: record.flags,
                }
            })
            .collect();

        Self {
            created_at: Utc::now(),
            tables,
        }
    }

    pub fn to_generate(&self) -> impl Iterator<Item = &TablePlan> {
        self.tables.iter().filter(|t| t.requires_generation)
    }

    pub fn tables_to_generate(&self) -> usize {
        self.to_generate().count()
    }

    pub fn tables_unchanged(&self) -> usize {
        self.tables.len() - self.tables_to_generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::tests::{column, snapshot, table};

    #[test]
    fn test_plan_reasons() {
        let mut state = MetadataState::default();
        let v1 = snapshot(
            vec![
                table("Customer", vec![column("Email", "nvarchar")]),
                table("Order", vec![column("ID", "int")]),
                table("Audit", vec![column("ID", "int")]),
            ],
            vec![],
        );
        state.apply_snapshot(&v1, Utc::now());
        for name in ["Customer", "Order", "Audit"] {
            state.mark_generated("dbo", name, Utc::now()).unwrap();
        }
        if let Some(audit) = state.tables.get_mut("dbo.Audit") {
            audit.flags = GenerationFlags {
                generate_entity: false,
                generate_repository: false,
                generate_controller: false,
                generate_react_ui: false,
                generate_stored_procedures: false,
                generate_cqrs: false,
            };
        }

        let v2 = snapshot(
            vec![
                table("Customer", vec![column("Email", "varchar")]),
                table("Order", vec![column("ID", "int")]),
                table("Audit", vec![column("ID", "bigint")]),
                table("Invoice", vec![column("ID", "int")]),
            ],
            vec![],
        );
        let sync = state.apply_snapshot(&v2, Utc::now());
        let plan = GenerationPlan::build(&state, &sync, false);

        let reason = |name: &str| plan.tables.iter().find(|t| t.table_name == name).unwrap().reason;
        assert_eq!(reason("Customer"), PlanReason::SchemaChanged);
        assert_eq!(reason("Order"), PlanReason::NoChanges);
        assert_eq!(reason("Audit"), PlanReason::GenerationDisabled);
        assert_eq!(reason("Invoice"), PlanReason::NewTable);
        assert_eq!(plan.tables_to_generate(), 2);
        assert_eq!(plan.tables_unchanged(), 2);

        let forced = GenerationPlan::build(&state, &sync, true);
        assert_eq!(
            forced.tables.iter().find(|t| t.table_name == "Order").unwrap().reason,
            PlanReason::Forced
        );
        assert_eq!(forced.tables_to_generate(), 3);
    }

    #[test]
    fn test_never_generated_table_is_planned() {
        let mut state = MetadataState::default();
        let snap = snapshot(vec![table("Customer", vec![column("ID", "int")])], vec![]);
        state.apply_snapshot(&snap, Utc::now());
        let sync = state.apply_snapshot(&snap, Utc::now());

        let plan = GenerationPlan::build(&state, &sync, false);
        assert_eq!(plan.tables[0].reason, PlanReason::NeverGenerated);
        assert!(plan.tables[0].requires_generation);
        assert_eq!(plan.tables[0].reason.description(), "Never generated");
    }
}
