use serde::{Deserialize, Serialize};

use crate::dao::models::{PROFILE_ID, ParentSettingsEntity, ProgressEntity};

pub const PROGRESS_PREFIX: &str = "progress::";
pub const SETTINGS_PREFIX: &str = "settings::";

pub fn progress_doc_id() -> String {
    format!("{PROGRESS_PREFIX}{PROFILE_ID}")
}

pub fn settings_doc_id() -> String {
    format!("{SETTINGS_PREFIX}{PROFILE_ID}")
}

/// CouchDB envelope around a persisted body, carrying `_id` and `_rev`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

pub type CouchProgressDocument = CouchDocument<ProgressEntity>;
pub type CouchSettingsDocument = CouchDocument<ParentSettingsEntity>;

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self { id, rev: None, body }
    }
}

/// Only the revision of an existing document, used before overwriting it.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}
