use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::format_unix_millis,
    state::progress::{Badge, GameProgress, SceneId, SceneStatus},
};

/// Unlock state of one scene.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SceneProgress {
    /// Scene identifier.
    pub scene: SceneId,
    /// Current unlock state.
    pub status: SceneStatus,
    /// Badges earned in this scene.
    pub badges: usize,
}

/// Badge as shown in the collection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BadgeView {
    /// Unique badge id.
    pub id: String,
    /// Badge kind, one per scene.
    pub kind: String,
    /// Scene that awarded the badge.
    pub scene: SceneId,
    /// Appearance variant within the kind.
    pub variant: u32,
    /// Milliseconds since the Unix epoch.
    pub earned_at: i64,
    /// `earned_at` as an RFC 3339 timestamp.
    pub earned_at_iso: String,
}

impl From<&Badge> for BadgeView {
    fn from(badge: &Badge) -> Self {
        Self {
            id: badge.id.clone(),
            kind: badge.kind.clone(),
            scene: badge.scene,
            variant: badge.variant,
            earned_at: badge.earned_at,
            earned_at_iso: format_unix_millis(badge.earned_at),
        }
    }
}

/// Progress record with the values derived from it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgressResponse {
    /// One entry per scene in unlock order.
    pub scenes: Vec<SceneProgress>,
    /// Badges in the order they were earned.
    pub badges: Vec<BadgeView>,
    /// Number of badges held.
    pub total_badges: usize,
    /// Number of different badge kinds held.
    pub distinct_kinds: usize,
    /// Whether every badge kind was collected.
    pub all_collected: bool,
    /// Scene the map suggests next.
    pub recommended_scene: SceneId,
    /// Completed scenes between 0 and 1.
    pub overall_progress: f32,
}

impl From<&GameProgress> for ProgressResponse {
    fn from(progress: &GameProgress) -> Self {
        Self {
            scenes: progress
                .statuses()
                .map(|(scene, status)| SceneProgress {
                    scene,
                    status,
                    badges: progress.badges_for(scene).count(),
                })
                .collect(),
            badges: progress.badges().map(BadgeView::from).collect(),
            total_badges: progress.total_badges(),
            distinct_kinds: progress.distinct_kinds(),
            all_collected: progress.all_collected(),
            recommended_scene: progress.recommended_scene(),
            overall_progress: progress.overall_progress(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_summary_fields() {
        let (progress, _) = GameProgress::initial().complete_scene(SceneId::FireStation, 0);
        let response = ProgressResponse::from(&progress);

        assert_eq!(response.total_badges, 1);
        assert_eq!(response.recommended_scene, SceneId::School);
        assert_eq!(response.scenes[0].status, SceneStatus::Completed);
        assert_eq!(response.scenes[0].badges, 1);
        assert_eq!(response.badges[0].earned_at_iso, "1970-01-01T00:00:00Z");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["scenes"][1]["status"], "unlocked");
    }
}
