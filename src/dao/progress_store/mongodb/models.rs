use serde::{Deserialize, Serialize};

use crate::dao::models::{ParentSettingsEntity, ProgressEntity};

/// Document stored in the `progress` collection, keyed by profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProgressDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub progress: ProgressEntity,
}

/// Document stored in the `parent_settings` collection, keyed by profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSettingsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub settings: ParentSettingsEntity,
}
