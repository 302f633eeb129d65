use crate::{
    dto::{progress::ProgressResponse, settings::ParentSettingsResponse},
    state::SharedState,
};

/// Current progress record with derived values.
pub fn progress(state: &SharedState) -> ProgressResponse {
    ProgressResponse::from(&state.store().current())
}

/// Current parent settings with today's usage.
pub fn parent_settings(state: &SharedState) -> ParentSettingsResponse {
    ParentSettingsResponse::from(&state.store().settings())
}
