use super::SceneKind;

/// Static media attached to a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneScript {
    /// Clip started by the primary action.
    pub media: Option<&'static str>,
    /// Voice line played when the scene is entered.
    pub intro_voice: Option<&'static str>,
}

/// Clip and intro voice for `kind`.
pub fn script_for(kind: SceneKind) -> SceneScript {
    match kind {
        SceneKind::FireStation => SceneScript {
            media: Some("videos/firestation/extinguisher.mp4"),
            intro_voice: None,
        },
        SceneKind::School => SceneScript {
            media: Some("videos/School_Fire_Safety_Knowledge.mp4"),
            intro_voice: Some("audio/voices/school_fire.mp3"),
        },
        SceneKind::Forest => SceneScript {
            media: Some("videos/rescue_sheep_1.mp4"),
            intro_voice: None,
        },
        SceneKind::Map | SceneKind::Parent => SceneScript {
            media: None,
            intro_voice: None,
        },
    }
}
