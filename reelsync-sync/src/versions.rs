//! Version registration and queries.
//!
//! A version is a `Version` entity pointing at a media file:
//! `{code: <file stem>, project, project_id, shot, path, description}`.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use reelsync_core::{Entity, EntityId, EntityStore, EntityType, FieldMap};
use reelsync_template::format::value_text;

use crate::client::SyncClient;
use crate::error::SyncError;

/// Status reported for every entry of [`SyncClient::approved_versions`].
pub const APPROVED_STATUS: &str = "apr";

/// Delivery-facing summary of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedVersion {
    pub shot: String,
    pub version: String,
    pub file_path: String,
    pub status: String,
}

impl<S: EntityStore> SyncClient<S> {
    /// Create a `Version` for `file_path` under `project` / `shot_code`,
    /// creating the project if needed.
    pub fn register_version(
        &mut self,
        project: &str,
        shot_code: &str,
        file_path: &Path,
        description: Option<&str>,
    ) -> Result<Entity, SyncError> {
        require("project name", project)?;
        require("shot code", shot_code)?;
        let project = self.get_or_create_project(project)?;

        let code = file_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut fields = FieldMap::new();
        fields.insert("code".into(), Value::String(code));
        fields.insert(
            "project".into(),
            project.get("name").cloned().unwrap_or(Value::Null),
        );
        fields.insert("project_id".into(), json!(project.id));
        fields.insert("shot".into(), Value::String(shot_code.to_owned()));
        fields.insert("path".into(), Value::String(file_path.display().to_string()));
        fields.insert(
            "description".into(),
            Value::String(description.unwrap_or_default().to_owned()),
        );

        let version = self.create_single("register_version", &EntityType::version(), fields)?;
        tracing::info!(
            "version.registered id={} shot={shot_code} path={}",
            version.id,
            file_path.display()
        );
        Ok(version)
    }

    pub fn list_versions(&self) -> Result<Vec<Entity>, SyncError> {
        Ok(self.store.list(&EntityType::version())?)
    }

    pub fn get_version_by_id(&self, id: EntityId) -> Result<Option<Entity>, SyncError> {
        Ok(self.store.get(&EntityType::version(), id)?)
    }

    /// Versions of one shot in one project.
    ///
    /// With `statuses`, only versions whose `status` (trimmed, lowercased)
    /// is in the set are kept; a version without a status matches `""`.
    pub fn list_versions_for_shot(
        &self,
        project: &str,
        shot_code: &str,
        statuses: Option<&[&str]>,
    ) -> Result<Vec<Entity>, SyncError> {
        require("project name", project)?;
        require("shot code", shot_code)?;
        let wanted: Option<HashSet<String>> =
            statuses.map(|list| list.iter().map(|s| normalize_status(s)).collect());

        let versions = self
            .list_versions()?
            .into_iter()
            .filter(|v| v.str_field("project") == Some(project))
            .filter(|v| v.str_field("shot") == Some(shot_code))
            .filter(|v| match &wanted {
                Some(wanted) => {
                    let status = v.get("status").map(value_text).unwrap_or_default();
                    wanted.contains(&normalize_status(&status))
                }
                None => true,
            })
            .collect();
        Ok(versions)
    }

    /// Every version in `project`, optionally narrowed to shots whose code
    /// contains one of `episodes` (case-insensitive).
    pub fn approved_versions(
        &self,
        project: &str,
        episodes: &[&str],
    ) -> Result<Vec<ApprovedVersion>, SyncError> {
        let filters: Vec<String> = episodes
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let approved = self
            .list_versions()?
            .into_iter()
            .filter(|v| v.str_field("project") == Some(project))
            .filter_map(|v| {
                let shot = text_field(&v, "shot");
                if !filters.is_empty() {
                    let lowered = shot.to_lowercase();
                    if !filters.iter().any(|f| lowered.contains(f.as_str())) {
                        return None;
                    }
                }
                Some(ApprovedVersion {
                    shot,
                    version: text_field(&v, "code"),
                    file_path: text_field(&v, "path"),
                    status: APPROVED_STATUS.to_owned(),
                })
            })
            .collect();
        Ok(approved)
    }
}

fn require(what: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::Validation(format!("{what} must be provided")));
    }
    Ok(())
}

fn normalize_status(status: &str) -> String {
    status.trim().to_lowercase()
}

fn text_field(entity: &Entity, field: &str) -> String {
    entity.get(field).map(value_text).unwrap_or_default()
}
