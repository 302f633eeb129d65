//! Progress lattice: per-scene unlock status plus the badge collection.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Number of visual variants a badge kind cycles through.
pub const MAX_VARIANTS_PER_KIND: u32 = 4;

/// Scenes that take part in the unlock chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SceneId {
    /// Entry scene, unlocked on first launch.
    FireStation,
    /// Unlocked by completing the fire station.
    School,
    /// Unlocked by completing the school.
    Forest,
}

impl SceneId {
    /// Every progress scene in unlock order.
    pub const ALL: [SceneId; 3] = [SceneId::FireStation, SceneId::School, SceneId::Forest];
    /// Scene unlocked on a fresh install.
    pub const ENTRY: SceneId = SceneId::FireStation;

    /// Stable identifier used in persisted documents and URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            SceneId::FireStation => "fire_station",
            SceneId::School => "school",
            SceneId::Forest => "forest",
        }
    }

    /// Scenes whose lock is lifted when `self` is completed.
    pub fn dependents(self) -> &'static [SceneId] {
        match self {
            SceneId::FireStation => &[SceneId::School],
            SceneId::School => &[SceneId::Forest],
            SceneId::Forest => &[],
        }
    }

    /// Badge kind awarded for completing the scene.
    pub fn badge_kind(self) -> &'static str {
        match self {
            SceneId::FireStation => "extinguisher",
            SceneId::School => "school",
            SceneId::Forest => "forest_sheep",
        }
    }

    /// Parse the persisted identifier back into a scene.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scene| scene.as_str() == raw)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unlock status of a scene. The derived ordering is the lattice order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    /// Not reachable yet.
    Locked,
    /// Reachable but not finished.
    Unlocked,
    /// Finished at least once.
    Completed,
}

impl SceneStatus {
    /// Stable identifier used in persisted documents.
    pub fn as_str(self) -> &'static str {
        match self {
            SceneStatus::Locked => "locked",
            SceneStatus::Unlocked => "unlocked",
            SceneStatus::Completed => "completed",
        }
    }

    /// Parse the persisted identifier back into a status.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "locked" => Some(SceneStatus::Locked),
            "unlocked" => Some(SceneStatus::Unlocked),
            "completed" => Some(SceneStatus::Completed),
            _ => None,
        }
    }
}

/// Reward earned by completing a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    /// Unique identifier.
    pub id: String,
    /// Badge family, one per scene.
    pub kind: String,
    /// Scene that awarded the badge.
    pub scene: SceneId,
    /// Visual variant, cycling through [`MAX_VARIANTS_PER_KIND`].
    pub variant: u32,
    /// Milliseconds since the Unix epoch.
    pub earned_at: i64,
}

/// Result of asking the lattice to complete a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// First completion: a badge was added and dependents unlocked.
    Awarded {
        /// Newly awarded badge.
        badge: Badge,
        /// Scenes that went from locked to unlocked.
        unlocked: Vec<SceneId>,
    },
    /// The scene was already completed; nothing changed.
    AlreadyCompleted,
    /// The scene is still locked; nothing changed.
    Locked,
}

/// Reason a candidate record cannot replace the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regression {
    /// A scene status would move backwards.
    Status {
        /// Scene whose status regressed.
        scene: SceneId,
        /// Current status.
        from: SceneStatus,
        /// Proposed status.
        to: SceneStatus,
    },
    /// A previously earned badge would disappear.
    BadgeRemoved {
        /// Identifier of the missing badge.
        id: String,
    },
}

impl fmt::Display for Regression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regression::Status { scene, from, to } => write!(
                f,
                "scene `{scene}` cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            Regression::BadgeRemoved { id } => write!(f, "badge `{id}` cannot be removed"),
        }
    }
}

/// Canonical progress record shared by every scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProgress {
    scene_status: IndexMap<SceneId, SceneStatus>,
    badges: IndexMap<String, Badge>,
}

impl Default for GameProgress {
    fn default() -> Self {
        Self::initial()
    }
}

impl GameProgress {
    /// Fresh record: everything locked except the entry scene.
    pub fn initial() -> Self {
        let scene_status = SceneId::ALL
            .into_iter()
            .map(|scene| {
                let status = if scene == SceneId::ENTRY {
                    SceneStatus::Unlocked
                } else {
                    SceneStatus::Locked
                };
                (scene, status)
            })
            .collect();

        Self {
            scene_status,
            badges: IndexMap::new(),
        }
    }

    /// Rebuild a record from persisted parts without any validation.
    /// Call [`GameProgress::normalized`] before trusting it.
    pub fn from_parts(
        scene_status: impl IntoIterator<Item = (SceneId, SceneStatus)>,
        badges: impl IntoIterator<Item = Badge>,
    ) -> Self {
        Self {
            scene_status: scene_status.into_iter().collect(),
            badges: badges
                .into_iter()
                .map(|badge| (badge.id.clone(), badge))
                .collect(),
        }
    }

    /// Status of `scene`; scenes missing from the record count as locked.
    pub fn status(&self, scene: SceneId) -> SceneStatus {
        self.scene_status
            .get(&scene)
            .copied()
            .unwrap_or(SceneStatus::Locked)
    }

    /// Iterate over scene statuses in unlock order.
    pub fn statuses(&self) -> impl Iterator<Item = (SceneId, SceneStatus)> + '_ {
        SceneId::ALL
            .into_iter()
            .map(move |scene| (scene, self.status(scene)))
    }

    /// Badges in the order they were earned.
    pub fn badges(&self) -> impl Iterator<Item = &Badge> + '_ {
        self.badges.values()
    }

    /// Badges awarded by a single scene.
    pub fn badges_for(&self, scene: SceneId) -> impl Iterator<Item = &Badge> + '_ {
        self.badges.values().filter(move |badge| badge.scene == scene)
    }

    /// Most recently earned badge.
    pub fn latest_badge(&self) -> Option<&Badge> {
        self.badges.values().last()
    }

    /// Total number of badges earned.
    pub fn total_badges(&self) -> usize {
        self.badges.len()
    }

    /// Number of distinct badge kinds earned.
    pub fn distinct_kinds(&self) -> usize {
        let mut kinds: Vec<&str> = self.badges.values().map(|b| b.kind.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds.len()
    }

    /// True once every scene has contributed at least one badge kind.
    pub fn all_collected(&self) -> bool {
        SceneId::ALL.into_iter().all(|scene| {
            self.badges
                .values()
                .any(|badge| badge.kind == scene.badge_kind())
        })
    }

    /// Variant the next badge of `kind` will receive.
    pub fn next_variant(&self, kind: &str) -> u32 {
        let held = self.badges.values().filter(|b| b.kind == kind).count() as u32;
        held % MAX_VARIANTS_PER_KIND
    }

    /// First unlocked scene that still awaits completion, else the entry scene.
    pub fn recommended_scene(&self) -> SceneId {
        self.statuses()
            .find(|(_, status)| *status == SceneStatus::Unlocked)
            .map(|(scene, _)| scene)
            .unwrap_or(SceneId::ENTRY)
    }

    /// Completed scenes as a ratio between 0 and 1.
    pub fn overall_progress(&self) -> f32 {
        let completed = self
            .statuses()
            .filter(|(_, status)| *status == SceneStatus::Completed)
            .count();
        completed as f32 / SceneId::ALL.len() as f32
    }

    /// Compute the record that results from completing `scene` at `now_ms`.
    ///
    /// The current record is never modified; an unchanged copy is returned
    /// when the scene is locked or already completed.
    pub fn complete_scene(&self, scene: SceneId, now_ms: i64) -> (GameProgress, Completion) {
        match self.status(scene) {
            SceneStatus::Completed => return (self.clone(), Completion::AlreadyCompleted),
            SceneStatus::Locked => return (self.clone(), Completion::Locked),
            SceneStatus::Unlocked => {}
        }

        let mut next = self.clone();
        next.scene_status.insert(scene, SceneStatus::Completed);

        let mut unlocked = Vec::new();
        for dependent in scene.dependents() {
            if next.status(*dependent) == SceneStatus::Locked {
                next.scene_status.insert(*dependent, SceneStatus::Unlocked);
                unlocked.push(*dependent);
            }
        }

        let kind = scene.badge_kind();
        let variant = self.next_variant(kind);
        let floor = self.latest_earned_at().unwrap_or(i64::MIN);
        let badge = Badge {
            id: format!("{kind}_v{variant}_{}", Uuid::new_v4().simple()),
            kind: kind.to_owned(),
            scene,
            variant,
            earned_at: now_ms.max(floor),
        };
        next.badges.insert(badge.id.clone(), badge.clone());

        (next, Completion::Awarded { badge, unlocked })
    }

    /// Check that `self` is a valid successor of `previous` in the lattice.
    pub fn regression_from(&self, previous: &GameProgress) -> Option<Regression> {
        for (scene, from) in previous.statuses() {
            let to = self.status(scene);
            if to < from {
                return Some(Regression::Status { scene, from, to });
            }
        }

        previous
            .badges
            .keys()
            .find(|id| !self.badges.contains_key(*id))
            .map(|id| Regression::BadgeRemoved { id: id.clone() })
    }

    /// Repair a record read from storage. Statuses are only ever raised.
    pub fn normalized(mut self) -> Self {
        let mut scene_status: IndexMap<SceneId, SceneStatus> = SceneId::ALL
            .into_iter()
            .map(|scene| (scene, self.status(scene)))
            .collect();

        if let Some(entry) = scene_status.get_mut(&SceneId::ENTRY) {
            *entry = (*entry).max(SceneStatus::Unlocked);
        }

        for scene in SceneId::ALL {
            if scene_status.get(&scene) != Some(&SceneStatus::Completed) {
                continue;
            }
            for dependent in scene.dependents() {
                if let Some(status) = scene_status.get_mut(dependent) {
                    *status = (*status).max(SceneStatus::Unlocked);
                }
            }
        }

        self.scene_status = scene_status;
        self
    }

    fn latest_earned_at(&self) -> Option<i64> {
        self.badges.values().map(|badge| badge.earned_at).max()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
