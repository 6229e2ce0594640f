//! Playlists: named, per-project lists of existing versions.
//!
//! A playlist's unique key is `"<project>::<playlist>"`, so the same
//! playlist name can exist once per project.

use serde_json::{json, Value};

use reelsync_core::{Entity, EntityId, EntityStore, EntityType, FieldMap};

use crate::client::SyncClient;
use crate::error::SyncError;

fn playlist_key(project: &str, playlist: &str) -> Result<String, SyncError> {
    if project.trim().is_empty() {
        return Err(SyncError::Validation("project name must be provided".to_owned()));
    }
    if playlist.trim().is_empty() {
        return Err(SyncError::Validation("playlist name must be provided".to_owned()));
    }
    Ok(format!("{project}::{playlist}"))
}

impl<S: EntityStore> SyncClient<S> {
    /// Create a playlist referencing `version_ids`, all of which must exist.
    pub fn register_playlist(
        &mut self,
        project: &str,
        playlist: &str,
        version_ids: &[EntityId],
    ) -> Result<Entity, SyncError> {
        let key = playlist_key(project, playlist)?;

        let mut missing = Vec::new();
        for id in version_ids {
            if self.get_version_by_id(*id)?.is_none() {
                missing.push(id.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(SyncError::Validation(format!(
                "unknown version ids in playlist: {}",
                missing.join(", ")
            )));
        }

        let project = self.get_or_create_project(project)?;
        let mut fields = FieldMap::new();
        fields.insert("name".into(), Value::String(key));
        fields.insert("playlist_name".into(), Value::String(playlist.to_owned()));
        fields.insert(
            "project".into(),
            project.get("name").cloned().unwrap_or(Value::Null),
        );
        fields.insert("project_id".into(), json!(project.id));
        fields.insert("version_ids".into(), json!(version_ids));

        let created = self.create_single("register_playlist", &EntityType::playlist(), fields)?;
        tracing::info!(
            "playlist.registered id={} name={playlist} versions={}",
            created.id,
            version_ids.len()
        );
        Ok(created)
    }

    pub fn get_playlist(&self, project: &str, playlist: &str) -> Result<Option<Entity>, SyncError> {
        let key = playlist_key(project, playlist)?;
        Ok(self.store.get_by_unique_key(&EntityType::playlist(), &key)?)
    }

    /// All playlists, or only those of `project`.
    pub fn list_playlists(&self, project: Option<&str>) -> Result<Vec<Entity>, SyncError> {
        let playlists = self.store.list(&EntityType::playlist())?;
        Ok(match project {
            Some(project) => playlists
                .into_iter()
                .filter(|p| p.str_field("project") == Some(project))
                .collect(),
            None => playlists,
        })
    }
}
