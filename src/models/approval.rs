// src/models/approval.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Roles handed to us by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reader,
    Writer,
    SubEditor,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::SubEditor => "sub_editor",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// The approval tier a role acts in. Readers and writers review nothing.
    pub fn tier(self) -> Option<Tier> {
        match self {
            Role::SubEditor => Some(Tier::SubEditor),
            Role::Editor => Some(Tier::Editor),
            Role::Admin => Some(Tier::Admin),
            Role::Reader | Role::Writer => None,
        }
    }

    /// Editors and admins run the newsroom: publishing overrides, rankings, payouts.
    pub fn is_editorial(self) -> bool {
        matches!(self, Role::Editor | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "writer" => Ok(Role::Writer),
            "sub_editor" => Ok(Role::SubEditor),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::BadRequest(format!("Unknown role '{}'", other))),
        }
    }
}

/// One of the three reviewer tiers, each with its own decision history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    SubEditor,
    Editor,
    Admin,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::SubEditor, Tier::Editor, Tier::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::SubEditor => "sub_editor",
            Tier::Editor => "editor",
            Tier::Admin => "admin",
        }
    }

    /// An approval recorded in this tier publishes the post.
    pub fn publishes(self) -> bool {
        matches!(self, Tier::Editor | Tier::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(AppError::BadRequest(format!(
                "Invalid approval status '{}'",
                other
            ))),
        }
    }
}

/// A single reviewer decision. Older records used `id`/`date` for the
/// actor and timestamp; both spellings are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    #[serde(alias = "id")]
    pub actor_id: i64,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default, alias = "date")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Per-tier decision history. Always exactly three sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Approvals {
    pub sub_editor: Vec<ApprovalEntry>,
    pub editor: Vec<ApprovalEntry>,
    pub admin: Vec<ApprovalEntry>,
}

impl Approvals {
    pub fn tier(&self, tier: Tier) -> &[ApprovalEntry] {
        match tier {
            Tier::SubEditor => &self.sub_editor,
            Tier::Editor => &self.editor,
            Tier::Admin => &self.admin,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut Vec<ApprovalEntry> {
        match tier {
            Tier::SubEditor => &mut self.sub_editor,
            Tier::Editor => &mut self.editor,
            Tier::Admin => &mut self.admin,
        }
    }

    /// Appends to the tier's history. Existing entries are never replaced.
    pub fn append(&mut self, tier: Tier, entry: ApprovalEntry) {
        self.tier_mut(tier).push(entry);
    }

    /// True when some publishing tier holds an approval.
    pub fn has_publishing_approval(&self) -> bool {
        Tier::ALL
            .into_iter()
            .filter(|tier| tier.publishes())
            .any(|tier| {
                self.tier(tier)
                    .iter()
                    .any(|entry| entry.status == ApprovalStatus::Approved)
            })
    }

    fn from_object(raw: &Value) -> Self {
        Self {
            sub_editor: tier_entries(raw, Tier::SubEditor),
            editor: tier_entries(raw, Tier::Editor),
            admin: tier_entries(raw, Tier::Admin),
        }
    }
}

impl<'de> Deserialize<'de> for Approvals {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(normalize_approvals(&raw))
    }
}

/// Coerces any stored approvals value into the canonical three-tier record.
///
/// Accepts a well-formed object, a JSON-encoded string of one, or anything
/// else (null, arrays, scalars), which becomes empty histories. Tiers that
/// are not arrays and entries that do not parse are dropped.
pub fn normalize_approvals(raw: &Value) -> Approvals {
    match raw {
        Value::Object(_) => Approvals::from_object(raw),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(decoded @ Value::Object(_)) => Approvals::from_object(&decoded),
            _ => Approvals::default(),
        },
        _ => Approvals::default(),
    }
}

fn tier_entries(raw: &Value, tier: Tier) -> Vec<ApprovalEntry> {
    raw.get(tier.as_str())
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Review state shared by posts and their workflow aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub status: ApprovalStatus,
    #[serde(default)]
    pub approvals: Approvals,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Records a decision in `tier` and makes it the current status.
    /// Publication is left alone.
    pub fn append_decision(
        &mut self,
        tier: Tier,
        actor_id: i64,
        decision: ApprovalStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.approvals.append(
            tier,
            ApprovalEntry {
                actor_id,
                status: decision,
                notes: notes.unwrap_or_default(),
                decided_at: Some(now),
            },
        );
        self.status = decision;
    }

    /// Records a reviewer's decision in the tier matching their role.
    ///
    /// An approval from a publishing tier publishes the post. Returns whether
    /// this call moved the post from unpublished to published.
    pub fn submit_for_review(
        &mut self,
        actor_id: i64,
        role: Role,
        decision: ApprovalStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let tier = role.tier().ok_or_else(AppError::unauthorized_role)?;
        self.append_decision(tier, actor_id, decision, notes, now);

        if tier.publishes() && decision == ApprovalStatus::Approved {
            let newly_published = !self.is_published;
            self.publish(now);
            return Ok(newly_published);
        }
        Ok(false)
    }

    /// Publishes, keeping the first `published_at` ever recorded.
    pub fn publish(&mut self, now: DateTime<Utc>) {
        self.is_published = true;
        if self.published_at.is_none() {
            self.published_at = Some(now);
        }
    }

    /// Manual publish control that bypasses the tier rules.
    pub fn override_published(&mut self, published: bool, now: DateTime<Utc>) {
        if published {
            self.publish(now);
        } else {
            self.is_published = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(actor_id: i64, status: ApprovalStatus) -> ApprovalEntry {
        ApprovalEntry {
            actor_id,
            status,
            notes: String::new(),
            decided_at: None,
        }
    }

    #[test]
    fn normalize_keeps_well_formed_record() {
        let raw = json!({
            "sub_editor": [{"actor_id": 7, "status": "approved", "notes": "ok"}],
            "editor": [],
            "admin": [{"id": 1, "status": "rejected", "date": "2024-05-01T10:00:00Z"}]
        });

        let approvals = normalize_approvals(&raw);
        assert_eq!(approvals.sub_editor.len(), 1);
        assert_eq!(approvals.sub_editor[0].notes, "ok");
        assert!(approvals.editor.is_empty());
        assert_eq!(approvals.admin[0].actor_id, 1);
        assert_eq!(approvals.admin[0].status, ApprovalStatus::Rejected);
        assert!(approvals.admin[0].decided_at.is_some());
    }

    #[test]
    fn normalize_decodes_json_string() {
        let raw = Value::String(r#"{"editor":[{"actor_id":3,"status":"approved"}]}"#.to_string());
        let approvals = normalize_approvals(&raw);
        assert_eq!(approvals.editor, vec![entry(3, ApprovalStatus::Approved)]);
        assert!(approvals.sub_editor.is_empty());
        assert!(approvals.admin.is_empty());
    }

    #[test]
    fn normalize_defaults_malformed_shapes() {
        let malformed = [
            Value::Null,
            json!("not json at all"),
            json!("[1, 2, 3]"),
            json!([{"actor_id": 1, "status": "approved"}]),
            json!(42),
            json!({"sub_editor": "oops", "editor": {"actor_id": 1}}),
            json!({"admin": [{"status": "approved"}, {"actor_id": 2, "status": "maybe"}]}),
        ];

        for raw in malformed {
            assert_eq!(normalize_approvals(&raw), Approvals::default(), "input: {raw}");
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            Value::Null,
            json!("garbage"),
            json!({"editor": [{"actor_id": 4, "status": "approved"}], "admin": null}),
            Value::String(r#"{"sub_editor":[{"id":9,"status":"pending"}]}"#.to_string()),
            json!({"sub_editor": [{"actor_id": 1, "status": "rejected"}, 17]}),
        ];

        for raw in inputs {
            let once = normalize_approvals(&raw);
            let twice = normalize_approvals(&serde_json::to_value(&once).unwrap());
            assert_eq!(once, twice, "input: {raw}");

            let encoded = serde_json::to_value(&once).unwrap();
            for key in ["sub_editor", "editor", "admin"] {
                assert!(encoded[key].is_array(), "{key} missing for {raw}");
            }
        }
    }

    #[test]
    fn deserialize_goes_through_normalization() {
        let approvals: Approvals = serde_json::from_str("null").unwrap();
        assert_eq!(approvals, Approvals::default());

        let approvals: Approvals =
            serde_json::from_str(r#""{\"admin\":[{\"actor_id\":5,\"status\":\"approved\"}]}""#)
                .unwrap();
        assert_eq!(approvals.admin.len(), 1);
    }

    #[test]
    fn writer_cannot_review() {
        let mut workflow = Workflow::default();
        let result =
            workflow.submit_for_review(1, Role::Writer, ApprovalStatus::Approved, None, Utc::now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(workflow, Workflow::default());
    }

    #[test]
    fn sub_editor_approval_does_not_publish() {
        let mut workflow = Workflow::default();
        let published = workflow
            .submit_for_review(2, Role::SubEditor, ApprovalStatus::Approved, None, Utc::now())
            .unwrap();

        assert!(!published);
        assert!(!workflow.is_published);
        assert_eq!(workflow.status, ApprovalStatus::Approved);
        assert_eq!(workflow.approvals.sub_editor.len(), 1);
    }

    #[test]
    fn editor_approval_publishes_once() {
        let mut workflow = Workflow::default();
        let first = Utc::now();
        assert!(
            workflow
                .submit_for_review(3, Role::Editor, ApprovalStatus::Approved, Some("good".into()), first)
                .unwrap()
        );
        assert_eq!(workflow.published_at, Some(first));

        let later = first + chrono::Duration::hours(2);
        assert!(
            !workflow
                .submit_for_review(4, Role::Admin, ApprovalStatus::Approved, None, later)
                .unwrap()
        );
        assert_eq!(workflow.published_at, Some(first));
        assert!(workflow.approvals.has_publishing_approval());
    }

    #[test]
    fn decisions_append_instead_of_replacing() {
        let mut workflow = Workflow::default();
        let now = Utc::now();
        workflow
            .submit_for_review(5, Role::Admin, ApprovalStatus::Rejected, None, now)
            .unwrap();
        workflow
            .submit_for_review(5, Role::Admin, ApprovalStatus::Approved, None, now)
            .unwrap();

        assert_eq!(workflow.approvals.admin.len(), 2);
        assert_eq!(workflow.approvals.admin[0].status, ApprovalStatus::Rejected);
        assert_eq!(workflow.status, ApprovalStatus::Approved);
    }

    #[test]
    fn rejection_after_publish_keeps_post_live() {
        let mut workflow = Workflow::default();
        let now = Utc::now();
        workflow
            .submit_for_review(3, Role::Editor, ApprovalStatus::Approved, None, now)
            .unwrap();
        workflow
            .submit_for_review(2, Role::SubEditor, ApprovalStatus::Rejected, None, now)
            .unwrap();

        assert!(workflow.is_published);
        assert_eq!(workflow.status, ApprovalStatus::Rejected);
    }

    #[test]
    fn override_toggles_without_touching_history() {
        let mut workflow = Workflow::default();
        let now = Utc::now();
        workflow.override_published(true, now);
        assert!(workflow.is_published);
        assert_eq!(workflow.published_at, Some(now));

        workflow.override_published(false, now + chrono::Duration::minutes(1));
        assert!(!workflow.is_published);
        assert_eq!(workflow.published_at, Some(now));
        assert_eq!(workflow.approvals, Approvals::default());
    }

    #[test]
    fn role_maps_to_tier() {
        assert_eq!(Role::SubEditor.tier(), Some(Tier::SubEditor));
        assert_eq!(Role::Editor.tier(), Some(Tier::Editor));
        assert_eq!(Role::Admin.tier(), Some(Tier::Admin));
        assert_eq!(Role::Writer.tier(), None);
        assert_eq!(Role::Reader.tier(), None);
        assert_eq!(" Sub_Editor ".parse::<Role>().unwrap(), Role::SubEditor);
        assert!("owner".parse::<Role>().is_err());
    }
}
