use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dao::storage::{StorageError, StorageResult},
    state::{
        progress::{Badge, GameProgress, SceneId, SceneStatus},
        settings::ParentSettings,
    },
};

/// Identifier of the single player profile stored by every backend.
pub const PROFILE_ID: &str = "default";

/// Persisted representation of [`GameProgress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntity {
    /// Status per scene identifier.
    #[serde(default)]
    pub scene_status: IndexMap<String, String>,
    /// Badges in the order they were earned.
    #[serde(default)]
    pub badges: Vec<BadgeEntity>,
}

/// Persisted representation of a [`Badge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEntity {
    /// Unique badge id.
    pub id: String,
    /// Badge kind.
    pub kind: String,
    /// Identifier of the awarding scene.
    pub scene: String,
    /// Appearance variant.
    #[serde(default)]
    pub variant: u32,
    /// Milliseconds since the Unix epoch.
    pub earned_at: i64,
}

/// Persisted representation of [`ParentSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentSettingsEntity {
    /// Session length limit.
    pub session_minutes: u32,
    /// Reminder lead before the limit.
    pub reminder_minutes: u32,
    /// Play time per calendar day.
    #[serde(default)]
    pub daily_usage_ms: BTreeMap<String, u64>,
}

impl From<&GameProgress> for ProgressEntity {
    fn from(progress: &GameProgress) -> Self {
        Self {
            scene_status: progress
                .statuses()
                .map(|(scene, status)| (scene.as_str().to_owned(), status.as_str().to_owned()))
                .collect(),
            badges: progress.badges().map(BadgeEntity::from).collect(),
        }
    }
}

impl From<&Badge> for BadgeEntity {
    fn from(badge: &Badge) -> Self {
        Self {
            id: badge.id.clone(),
            kind: badge.kind.clone(),
            scene: badge.scene.as_str().to_owned(),
            variant: badge.variant,
            earned_at: badge.earned_at,
        }
    }
}

impl ProgressEntity {
    /// Decode into the domain record. Unknown scenes are skipped so older
    /// binaries can read documents written by newer ones.
    pub fn into_domain(self) -> StorageResult<GameProgress> {
        let mut statuses = Vec::with_capacity(self.scene_status.len());
        for (raw_scene, raw_status) in self.scene_status {
            let Some(scene) = SceneId::parse(&raw_scene) else {
                continue;
            };
            let status = SceneStatus::parse(&raw_status).ok_or_else(|| {
                StorageError::invalid_data(format!(
                    "unknown status `{raw_status}` for scene `{raw_scene}`"
                ))
            })?;
            statuses.push((scene, status));
        }

        let badges = self
            .badges
            .into_iter()
            .map(BadgeEntity::into_domain)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(GameProgress::from_parts(statuses, badges))
    }
}

impl BadgeEntity {
    fn into_domain(self) -> StorageResult<Badge> {
        let scene = SceneId::parse(&self.scene).ok_or_else(|| {
            StorageError::invalid_data(format!(
                "badge `{}` references unknown scene `{}`",
                self.id, self.scene
            ))
        })?;
        Ok(Badge {
            id: self.id,
            kind: self.kind,
            scene,
            variant: self.variant,
            earned_at: self.earned_at,
        })
    }
}

impl From<&ParentSettings> for ParentSettingsEntity {
    fn from(settings: &ParentSettings) -> Self {
        Self {
            session_minutes: settings.session_minutes(),
            reminder_minutes: settings.reminder_minutes(),
            daily_usage_ms: settings.daily_usage().clone(),
        }
    }
}

impl From<ParentSettingsEntity> for ParentSettings {
    fn from(entity: ParentSettingsEntity) -> Self {
        ParentSettings::from_parts(
            entity.session_minutes,
            entity.reminder_minutes,
            entity.daily_usage_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn persisted_layout_uses_snake_case_identifiers() {
        let (progress, _) = GameProgress::initial().complete_scene(SceneId::FireStation, 42);
        let value = serde_json::to_value(ProgressEntity::from(&progress)).unwrap();

        assert_eq!(value["scene_status"]["fire_station"], "completed");
        assert_eq!(value["scene_status"]["school"], "unlocked");
        assert_eq!(value["scene_status"]["forest"], "locked");
        assert_eq!(value["badges"][0]["scene"], "fire_station");
        assert_eq!(value["badges"][0]["earned_at"], 42);
    }

    #[test]
    fn unknown_scenes_are_skipped_and_bad_statuses_rejected() {
        let entity: ProgressEntity = serde_json::from_value(json!({
            "scene_status": { "fire_station": "completed", "volcano": "unlocked" },
            "badges": []
        }))
        .unwrap();
        let progress = entity.into_domain().unwrap();
        assert_eq!(progress.status(SceneId::FireStation), SceneStatus::Completed);

        let broken: ProgressEntity = serde_json::from_value(json!({
            "scene_status": { "school": "half-done" }
        }))
        .unwrap();
        assert!(matches!(
            broken.into_domain(),
            Err(StorageError::InvalidData { .. })
        ));
    }

    #[test]
    fn settings_missing_usage_default_to_empty() {
        let entity: ParentSettingsEntity = serde_json::from_value(json!({
            "session_minutes": 10,
            "reminder_minutes": 2
        }))
        .unwrap();
        let settings = ParentSettings::from(entity);
        assert_eq!(settings.session_minutes(), 10);
        assert!(settings.daily_usage().is_empty());
    }
}
