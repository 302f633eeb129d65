use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    time::sleep,
};
use tracing::{debug, info, warn};

use super::{
    GateAction, ParentGate, SceneCommand, SceneEvent, SceneInput, SceneKind, SceneScript,
    SceneSnapshot, SceneTimings, script_for,
};
use crate::state::{
    effects::{Effect, EffectQueue},
    idle_timer::IdleTimer,
    progress::{Completion, SceneId, SceneStatus, unix_millis},
    rapid_input::{InputVerdict, RapidInputGuard},
    settings::ParentSettings,
    state_machine::{ScenePhase, SceneStateMachine, SceneStep},
    store::{ProgressStore, StoreError},
};

/// Owns everything a single scene needs. Runs on its own task and handles
/// inputs strictly one at a time.
pub(super) struct SceneController {
    kind: SceneKind,
    script: SceneScript,
    store: ProgressStore,
    timings: SceneTimings,
    machine: SceneStateMachine,
    idle: IdleTimer,
    guard: RapidInputGuard,
    effects: Arc<EffectQueue>,
    inbox: mpsc::WeakUnboundedSender<SceneCommand>,
    published: watch::Sender<SceneSnapshot>,
    visit: u64,
    scene_completed: bool,
    badge_overlay_visible: bool,
    current_media: Option<String>,
    gate: Option<ParentGate>,
}

impl SceneController {
    pub(super) fn new(
        kind: SceneKind,
        store: ProgressStore,
        timings: SceneTimings,
        effects: Arc<EffectQueue>,
        inbox: mpsc::WeakUnboundedSender<SceneCommand>,
    ) -> Self {
        let scene_completed = kind
            .progress_scene()
            .is_some_and(|scene| store.current().status(scene) == SceneStatus::Completed);
        let (published, _) = watch::channel(SceneSnapshot {
            scene: kind,
            phase: ScenePhase::Idle,
            media_playing: false,
            current_media: None,
            badge_overlay_visible: false,
            idle_hint_visible: false,
            scene_completed,
            parent_gate: None,
            visit: 0,
            idle_in_ms: None,
        });

        Self {
            kind,
            script: script_for(kind),
            store,
            guard: RapidInputGuard::new(timings.rapid_input_window),
            timings,
            machine: SceneStateMachine::new(),
            idle: IdleTimer::new(),
            effects,
            inbox,
            published,
            visit: 0,
            scene_completed,
            badge_overlay_visible: false,
            current_media: None,
            gate: None,
        }
    }

    pub(super) fn watch(&self) -> watch::Receiver<SceneSnapshot> {
        self.published.subscribe()
    }

    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SceneCommand>) {
        debug!(scene = %self.kind, "scene controller started");
        while let Some(SceneCommand { input, reply }) = commands.recv().await {
            self.handle(input).await;
            let snapshot = self.snapshot();
            self.published.send_replace(snapshot.clone());
            if let Some(reply) = reply {
                let _ = reply.send(snapshot);
            }
        }
        self.idle.stop();
        debug!(scene = %self.kind, "scene controller stopped");
    }

    fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            scene: self.kind,
            phase: self.machine.phase(),
            media_playing: self.current_media.is_some(),
            current_media: self.current_media.clone(),
            badge_overlay_visible: self.badge_overlay_visible,
            idle_hint_visible: self.machine.idle_hint_visible(),
            scene_completed: self.scene_completed,
            parent_gate: self.gate.as_ref().map(ParentGate::question),
            visit: self.visit,
            idle_in_ms: self
                .idle
                .time_until_idle()
                .map(|left| u64::try_from(left.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    async fn handle(&mut self, input: SceneInput) {
        match input {
            SceneInput::Event(event) => self.on_event(event).await,
            SceneInput::IdleElapsed { generation } => self.on_idle(generation),
            SceneInput::BadgeDelayElapsed { visit } => self.on_badge_delay(visit),
        }
    }

    async fn on_event(&mut self, event: SceneEvent) {
        debug!(scene = %self.kind, ?event, phase = ?self.machine.phase(), "scene event");
        match event {
            SceneEvent::ScreenEntered => self.on_enter(),
            SceneEvent::PrimaryActionClicked => self.on_primary(),
            SceneEvent::MediaPlaybackCompleted => self.on_media_completed().await,
            SceneEvent::BadgeAnimationCompleted => self.on_badge_animation_completed(),
            SceneEvent::BackRequested => self.on_back(),
            SceneEvent::IdleHintDismissed => {
                self.machine.hide_idle_hint();
                self.idle.report_activity();
            }
            SceneEvent::SceneSelected(scene) => self.on_scene_selected(scene),
            SceneEvent::CollectionRequested => self.on_collection(),
            SceneEvent::ParentGateRequested(action) => self.on_gate_requested(action),
            SceneEvent::ParentAnswerSubmitted(answer) => self.on_gate_answer(answer).await,
            SceneEvent::ParentGateCancelled => {
                self.idle.report_activity();
                self.gate = None;
            }
        }
    }

    fn emit(&self, effect: Effect) {
        if !self.effects.emit(effect.clone()) {
            debug!(scene = %self.kind, ?effect, "effect dropped, no subscriber");
        }
    }

    fn on_enter(&mut self) {
        self.visit += 1;
        self.badge_overlay_visible = false;
        self.current_media = None;
        self.gate = None;

        if let Some(scene) = self.kind.progress_scene() {
            let status = self.store.current().status(scene);
            if status == SceneStatus::Locked {
                info!(scene = %self.kind, "locked scene entered, sending the child back");
                self.close_locked_visit();
                return;
            }
            self.scene_completed = status == SceneStatus::Completed;
        }

        if let Err(err) = self.machine.advance(SceneStep::Enter) {
            warn!(scene = %self.kind, ?err, "cannot enter scene");
            return;
        }
        self.machine.hide_idle_hint();
        self.guard.reset();
        self.arm_idle_timer();

        if let Some(voice) = self.script.intro_voice {
            self.emit(Effect::PlayIntroHint {
                voice: voice.to_owned(),
            });
        }
    }

    /// End a visit to a scene whose progress status is locked. The machine
    /// goes back to idle so no later tap can start the clip.
    fn close_locked_visit(&mut self) {
        if let Err(err) = self.machine.advance(SceneStep::Lock) {
            warn!(scene = %self.kind, ?err, "cannot close locked scene");
        }
        self.scene_completed = false;
        self.current_media = None;
        self.badge_overlay_visible = false;
        self.leave();
        self.emit(Effect::PlayLockedHint);
        self.emit(Effect::NavigateBack);
    }

    fn is_locked(&self) -> bool {
        self.kind
            .progress_scene()
            .is_some_and(|scene| self.store.current().status(scene) == SceneStatus::Locked)
    }

    fn arm_idle_timer(&self) {
        let inbox = self.inbox.clone();
        self.idle.start(self.timings.idle_threshold, move |generation| {
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(SceneCommand::internal(SceneInput::IdleElapsed {
                    generation,
                }));
            }
        });
    }

    /// Activity bookkeeping shared by every tap, followed by the rapid-input
    /// check. Returns false when the tap must be ignored.
    fn accept_tap(&mut self) -> bool {
        self.idle.report_activity();
        self.machine.hide_idle_hint();
        match self.guard.check_and_record() {
            InputVerdict::Accepted => true,
            InputVerdict::Suppressed => {
                debug!(scene = %self.kind, "tap suppressed");
                self.emit(Effect::ShowSlowDownHint);
                false
            }
        }
    }

    fn on_primary(&mut self) {
        if self.kind == SceneKind::Parent {
            self.idle.report_activity();
            return;
        }
        if !self.accept_tap() {
            return;
        }

        if self.kind == SceneKind::Map {
            let scene = self.store.current().recommended_scene();
            self.open_scene(scene);
            return;
        }

        if self.is_locked() {
            debug!(scene = %self.kind, "tap on a locked scene ignored");
            self.emit(Effect::PlayLockedHint);
            return;
        }
        if self.machine.phase() != ScenePhase::AwaitingInput {
            return;
        }
        let Some(media) = self.script.media else {
            return;
        };
        match self.machine.advance(SceneStep::StartMedia) {
            Ok(_) => {
                self.current_media = Some(media.to_owned());
                self.emit(Effect::StartMedia {
                    resource: media.to_owned(),
                });
            }
            Err(err) => warn!(scene = %self.kind, ?err, "cannot start media"),
        }
    }

    async fn on_media_completed(&mut self) {
        let Some(scene) = self.kind.progress_scene() else {
            return;
        };
        if self.machine.phase() != ScenePhase::PlayingMedia {
            debug!(scene = %self.kind, "media completion outside playback ignored");
            return;
        }
        self.idle.report_activity();

        let plan = match self.machine.plan(SceneStep::FinishMedia) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(scene = %self.kind, ?err, "cannot plan completion");
                return;
            }
        };

        let now = unix_millis();
        let outcome = self
            .store
            .update_with(move |progress| progress.complete_scene(scene, now))
            .await;

        match outcome {
            Ok(Completion::Awarded { badge, unlocked }) => {
                if let Err(err) = self.machine.apply(plan.id) {
                    warn!(scene = %self.kind, ?err, "completion plan went stale");
                }
                self.finish_media();
                self.badge_overlay_visible = true;
                info!(
                    scene = %self.kind,
                    badge = %badge.id,
                    unlocked = ?unlocked,
                    "scene completed, badge awarded"
                );
                self.emit(Effect::PlayBadgeSound);
                self.emit(Effect::ShowBadgeOverlay {
                    kind: badge.kind,
                    variant: badge.variant,
                });
                for scene in unlocked {
                    self.emit(Effect::UnlockNotification { scene });
                }
            }
            Ok(Completion::AlreadyCompleted) => {
                if let Err(err) = self.machine.apply(plan.id) {
                    warn!(scene = %self.kind, ?err, "completion plan went stale");
                }
                self.finish_media();
                self.emit(Effect::PlayCompletedSound);
            }
            Ok(Completion::Locked) => {
                if let Err(err) = self.machine.abort(plan.id) {
                    warn!(scene = %self.kind, ?err, "completion plan went stale");
                }
                warn!(scene = %self.kind, "scene was locked while playing, leaving");
                self.close_locked_visit();
            }
            Err(err) => {
                if let Err(err) = self.machine.abort(plan.id) {
                    warn!(scene = %self.kind, ?err, "completion plan went stale");
                }
                warn!(scene = %self.kind, error = %err, "failed to record completion");
                self.emit(Effect::ProgressSaveFailed);
            }
        }
    }

    fn finish_media(&mut self) {
        self.current_media = None;
        self.scene_completed = true;
    }

    fn on_badge_animation_completed(&mut self) {
        if self.machine.phase() != ScenePhase::Completed {
            return;
        }
        self.badge_overlay_visible = false;
        if let Err(err) = self.machine.advance(SceneStep::Acknowledge) {
            warn!(scene = %self.kind, ?err, "cannot acknowledge badge");
            return;
        }
        self.idle.report_activity();

        let inbox = self.inbox.clone();
        let visit = self.visit;
        let delay = self.timings.badge_exit_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(SceneCommand::internal(SceneInput::BadgeDelayElapsed {
                    visit,
                }));
            }
        });
    }

    fn on_badge_delay(&mut self, visit: u64) {
        if visit != self.visit {
            debug!(scene = %self.kind, visit, "visit already over, not leaving twice");
            return;
        }
        self.leave();
        self.emit(Effect::NavigateBack);
    }

    fn on_back(&mut self) {
        if matches!(
            self.machine.phase(),
            ScenePhase::PlayingMedia | ScenePhase::AwardingBadge
        ) {
            debug!(scene = %self.kind, "back refused while media plays");
            return;
        }
        if let Err(err) = self.machine.advance(SceneStep::Exit) {
            debug!(scene = %self.kind, ?err, "exit from unexpected phase");
        }
        self.badge_overlay_visible = false;
        self.leave();
        self.emit(Effect::NavigateBack);
    }

    /// Close the current visit: timers stop and pending delayed work goes stale.
    fn leave(&mut self) {
        self.idle.stop();
        self.machine.hide_idle_hint();
        self.gate = None;
        self.visit += 1;
    }

    fn on_idle(&mut self, generation: u64) {
        if !self.idle.is_current(generation) {
            return;
        }
        if self.machine.show_idle_hint() {
            debug!(scene = %self.kind, "child idle, showing hint");
            self.emit(Effect::ShowIdleHint);
        }
    }

    fn on_scene_selected(&mut self, scene: SceneId) {
        if self.kind != SceneKind::Map {
            debug!(scene = %self.kind, "scene selection only handled on the map");
            return;
        }
        if self.accept_tap() {
            self.open_scene(scene);
        }
    }

    fn open_scene(&mut self, scene: SceneId) {
        if self.store.current().status(scene) == SceneStatus::Locked {
            self.emit(Effect::PlayLockedHint);
            return;
        }
        self.leave();
        self.emit(Effect::PlaySceneSound { scene });
        self.emit(Effect::NavigateToScene { scene });
    }

    fn on_collection(&mut self) {
        if self.kind != SceneKind::Map {
            return;
        }
        if self.accept_tap() {
            self.leave();
            self.emit(Effect::NavigateToCollection);
        }
    }

    fn gate_allows(&self, action: &GateAction) -> bool {
        match (self.kind, action) {
            (SceneKind::Map, GateAction::EnterParentMode) => true,
            (SceneKind::Parent, GateAction::ResetProgress) => true,
            (
                SceneKind::Parent,
                GateAction::UpdateSettings {
                    session_minutes,
                    reminder_minutes,
                },
            ) => {
                match ParentSettings::default().with_session_limit(*session_minutes, *reminder_minutes)
                {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(scene = %self.kind, error = %err, "settings request rejected");
                        false
                    }
                }
            }
            _ => false,
        }
    }

    fn on_gate_requested(&mut self, action: GateAction) {
        self.idle.report_activity();
        if !self.gate_allows(&action) {
            debug!(scene = %self.kind, ?action, "gate action not available here");
            return;
        }
        self.gate = Some(ParentGate::new(action));
    }

    async fn on_gate_answer(&mut self, answer: u32) {
        self.idle.report_activity();
        let Some(gate) = self.gate.as_mut() else {
            debug!(scene = %self.kind, "answer without open gate ignored");
            return;
        };
        if !gate.check(answer) {
            gate.regenerate();
            self.emit(Effect::ShowVerificationFailedHint);
            return;
        }

        let action = gate.action().clone();
        self.gate = None;
        match action {
            GateAction::EnterParentMode => {
                self.leave();
                self.emit(Effect::NavigateToParent);
            }
            GateAction::ResetProgress => match self.store.reset().await {
                Ok(_) => {
                    self.emit(Effect::ShowResetSuccessHint);
                }
                Err(err) => self.report_write_failure(err),
            },
            GateAction::UpdateSettings {
                session_minutes,
                reminder_minutes,
            } => {
                let outcome = self
                    .store
                    .update_settings(move |settings| {
                        settings.with_session_limit(session_minutes, reminder_minutes)
                    })
                    .await;
                match outcome {
                    Ok(_) => self.emit(Effect::ShowSettingsSavedHint),
                    Err(err) => self.report_write_failure(err),
                }
            }
        }
    }

    fn report_write_failure(&self, err: StoreError) {
        warn!(scene = %self.kind, error = %err, "parent action not saved");
        self.emit(Effect::ProgressSaveFailed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::progress_store::memory::MemoryProgressBackend,
        state::{
            effects::EffectSubscription,
            scene::{SceneHandle, SceneTimings},
        },
    };

    const IDLE: Duration = Duration::from_secs(30);

    async fn store() -> (ProgressStore, MemoryProgressBackend) {
        let backend = MemoryProgressBackend::new();
        let store = ProgressStore::default();
        store
            .install_backend(Arc::new(backend.clone()))
            .await
            .unwrap();
        (store, backend)
    }

    fn scene(kind: SceneKind, store: &ProgressStore) -> (SceneHandle, EffectSubscription) {
        let handle = SceneHandle::spawn(kind, store.clone(), SceneTimings::default());
        let effects = handle.subscribe_effects().unwrap();
        (handle, effects)
    }

    async fn play_through(handle: &SceneHandle) -> SceneSnapshot {
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        handle
            .dispatch(SceneEvent::MediaPlaybackCompleted)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn completing_fire_station_unlocks_school() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);

        let snapshot = play_through(&handle).await;

        assert_eq!(snapshot.phase, ScenePhase::Completed);
        assert!(snapshot.scene_completed);
        assert!(snapshot.badge_overlay_visible);
        assert!(!snapshot.media_playing);

        let progress = store.current();
        assert_eq!(progress.status(SceneId::FireStation), SceneStatus::Completed);
        assert_eq!(progress.status(SceneId::School), SceneStatus::Unlocked);
        assert_eq!(progress.total_badges(), 1);

        assert_eq!(
            effects.drain(),
            vec![
                Effect::StartMedia {
                    resource: "videos/firestation/extinguisher.mp4".into()
                },
                Effect::PlayBadgeSound,
                Effect::ShowBadgeOverlay {
                    kind: "extinguisher".into(),
                    variant: 0
                },
                Effect::UnlockNotification {
                    scene: SceneId::School
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_completion_awards_one_badge() {
        let (store, backend) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);

        play_through(&handle).await;
        handle
            .dispatch(SceneEvent::MediaPlaybackCompleted)
            .await
            .unwrap();

        assert_eq!(store.current().total_badges(), 1);
        assert_eq!(backend.progress_writes(), 1);
        let badge_sounds = effects
            .drain()
            .into_iter()
            .filter(|e| *e == Effect::PlayBadgeSound)
            .count();
        assert_eq!(badge_sounds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replaying_a_completed_scene_skips_the_write() {
        let (store, backend) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        play_through(&handle).await;
        handle.dispatch(SceneEvent::BackRequested).await.unwrap();
        effects.drain();

        let snapshot = play_through(&handle).await;

        assert_eq!(snapshot.phase, ScenePhase::Completed);
        assert!(!snapshot.badge_overlay_visible);
        assert_eq!(backend.progress_writes(), 1);
        assert_eq!(
            effects.drain(),
            vec![
                Effect::StartMedia {
                    resource: "videos/firestation/extinguisher.mp4".into()
                },
                Effect::PlayCompletedSound,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn double_tap_starts_media_once() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        let snapshot = handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();

        assert_eq!(snapshot.phase, ScenePhase::PlayingMedia);
        assert_eq!(
            effects.drain(),
            vec![
                Effect::StartMedia {
                    resource: "videos/firestation/extinguisher.mp4".into()
                },
                Effect::ShowSlowDownHint,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn back_is_refused_while_media_plays() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        effects.drain();

        let snapshot = handle.dispatch(SceneEvent::BackRequested).await.unwrap();

        assert_eq!(snapshot.phase, ScenePhase::PlayingMedia);
        assert!(snapshot.media_playing);
        assert!(effects.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_playing_until_retry() {
        let (store, backend) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        effects.drain();

        backend.set_offline(true);
        let snapshot = handle
            .dispatch(SceneEvent::MediaPlaybackCompleted)
            .await
            .unwrap();

        assert_eq!(snapshot.phase, ScenePhase::PlayingMedia);
        assert!(!snapshot.scene_completed);
        assert_eq!(store.current().total_badges(), 0);
        assert_eq!(effects.drain(), vec![Effect::ProgressSaveFailed]);

        backend.set_offline(false);
        let snapshot = handle
            .dispatch(SceneEvent::MediaPlaybackCompleted)
            .await
            .unwrap();

        assert_eq!(snapshot.phase, ScenePhase::Completed);
        assert_eq!(store.current().total_badges(), 1);
        assert!(effects.drain().contains(&Effect::PlayBadgeSound));
    }

    #[tokio::test(start_paused = true)]
    async fn badge_animation_leads_back_after_delay() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        play_through(&handle).await;
        effects.drain();

        let snapshot = handle
            .dispatch(SceneEvent::BadgeAnimationCompleted)
            .await
            .unwrap();
        assert_eq!(snapshot.phase, ScenePhase::Idle);
        assert!(!snapshot.badge_overlay_visible);

        sleep(Duration::from_millis(400)).await;
        assert!(effects.drain().is_empty());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(effects.drain(), vec![Effect::NavigateBack]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_back_cancels_the_delayed_exit() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        play_through(&handle).await;
        handle
            .dispatch(SceneEvent::BadgeAnimationCompleted)
            .await
            .unwrap();
        effects.drain();

        handle.dispatch(SceneEvent::BackRequested).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(effects.drain(), vec![Effect::NavigateBack]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_hint_appears_once_and_stops_with_the_visit() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        let snapshot = handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        assert_eq!(snapshot.idle_in_ms, Some(30_000));

        sleep(IDLE - Duration::from_millis(10)).await;
        assert!(effects.drain().is_empty());

        sleep(Duration::from_millis(20)).await;
        assert_eq!(effects.drain(), vec![Effect::ShowIdleHint]);
        assert!(handle.snapshot().idle_hint_visible);

        sleep(IDLE * 3).await;
        assert!(effects.drain().is_empty());

        let snapshot = handle
            .dispatch(SceneEvent::IdleHintDismissed)
            .await
            .unwrap();
        assert!(!snapshot.idle_hint_visible);

        let snapshot = handle.dispatch(SceneEvent::BackRequested).await.unwrap();
        assert_eq!(snapshot.idle_in_ms, None);
        effects.drain();
        sleep(IDLE * 2).await;
        assert!(effects.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_idle_hint_during_playback() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::FireStation, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        effects.drain();

        sleep(IDLE * 2).await;

        assert!(effects.drain().is_empty());
        assert!(!handle.snapshot().idle_hint_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_scene_sends_the_child_back() {
        let (store, _) = store().await;
        let (handle, mut effects) = scene(SceneKind::Forest, &store);

        let snapshot = handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        assert_eq!(snapshot.phase, ScenePhase::Idle);
        assert_eq!(
            effects.drain(),
            vec![Effect::PlayLockedHint, Effect::NavigateBack]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scene_locked_by_a_reset_stays_closed() {
        let (store, _) = store().await;
        store
            .update(|p| p.complete_scene(SceneId::FireStation, 1).0)
            .await
            .unwrap();
        let (handle, mut effects) = scene(SceneKind::School, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        store.reset().await.unwrap();
        effects.drain();

        let snapshot = handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        assert_eq!(snapshot.phase, ScenePhase::Idle);

        sleep(Duration::from_secs(1)).await;
        let snapshot = handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();

        assert_eq!(snapshot.phase, ScenePhase::Idle);
        assert!(!snapshot.media_playing);
        assert_eq!(
            effects.drain(),
            vec![
                Effect::PlayLockedHint,
                Effect::NavigateBack,
                Effect::PlayLockedHint,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scene_locked_during_playback_closes_the_visit() {
        let (store, backend) = store().await;
        store
            .update(|p| p.complete_scene(SceneId::FireStation, 1).0)
            .await
            .unwrap();
        let (handle, mut effects) = scene(SceneKind::School, &store);
        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        store.reset().await.unwrap();
        let writes = backend.progress_writes();
        effects.drain();

        let snapshot = handle
            .dispatch(SceneEvent::MediaPlaybackCompleted)
            .await
            .unwrap();

        assert_eq!(snapshot.phase, ScenePhase::Idle);
        assert!(!snapshot.media_playing);
        assert!(!snapshot.scene_completed);
        assert_eq!(backend.progress_writes(), writes);
        assert_eq!(store.current().total_badges(), 0);
        assert_eq!(
            effects.drain(),
            vec![Effect::PlayLockedHint, Effect::NavigateBack]
        );

        sleep(Duration::from_secs(1)).await;
        handle
            .dispatch(SceneEvent::PrimaryActionClicked)
            .await
            .unwrap();
        assert!(
            !effects
                .drain()
                .iter()
                .any(|e| matches!(e, Effect::StartMedia { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn every_scene_awards_one_badge_and_unlocks_its_dependents() {
        let (store, _) = store().await;

        for (completed, scene_id) in SceneId::ALL.into_iter().enumerate() {
            let (handle, mut effects) = scene(SceneKind::from(scene_id), &store);

            let snapshot = play_through(&handle).await;
            assert_eq!(snapshot.phase, ScenePhase::Completed, "{scene_id}");
            handle
                .dispatch(SceneEvent::MediaPlaybackCompleted)
                .await
                .unwrap();

            let progress = store.current();
            assert_eq!(progress.status(scene_id), SceneStatus::Completed);
            assert_eq!(progress.total_badges(), completed + 1, "{scene_id}");
            assert_eq!(progress.badges_for(scene_id).count(), 1, "{scene_id}");
            for dependent in scene_id.dependents() {
                assert_eq!(progress.status(*dependent), SceneStatus::Unlocked);
            }
            let emitted = effects.drain();
            let unlocked: Vec<SceneId> = emitted
                .iter()
                .filter_map(|e| match e {
                    Effect::UnlockNotification { scene } => Some(*scene),
                    _ => None,
                })
                .collect();
            assert_eq!(unlocked, scene_id.dependents(), "{scene_id}");

            handle.dispatch(SceneEvent::BackRequested).await.unwrap();
            effects.drain();
            play_through(&handle).await;

            assert_eq!(store.current().total_badges(), completed + 1, "{scene_id}");
            let replay = effects.drain();
            assert!(replay.contains(&Effect::PlayCompletedSound), "{scene_id}");
            assert!(!replay.contains(&Effect::PlayBadgeSound), "{scene_id}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn school_plays_its_intro_voice() {
        let (store, _) = store().await;
        store
            .update(|p| p.complete_scene(SceneId::FireStation, 1).0)
            .await
            .unwrap();
        let (handle, mut effects) = scene(SceneKind::School, &store);

        handle.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        assert_eq!(
            effects.drain(),
            vec![Effect::PlayIntroHint {
                voice: "audio/voices/school_fire.mp3".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn map_navigates_to_unlocked_scenes_only() {
        let (store, _) = store().await;
        let (map, mut effects) = scene(SceneKind::Map, &store);
        map.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        map.dispatch(SceneEvent::SceneSelected(SceneId::Forest))
            .await
            .unwrap();
        assert_eq!(effects.drain(), vec![Effect::PlayLockedHint]);

        sleep(Duration::from_secs(1)).await;
        map.dispatch(SceneEvent::PrimaryActionClicked).await.unwrap();
        assert_eq!(
            effects.drain(),
            vec![
                Effect::PlaySceneSound {
                    scene: SceneId::FireStation
                },
                Effect::NavigateToScene {
                    scene: SceneId::FireStation
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn map_gate_opens_parent_area_on_right_answer() {
        let (store, _) = store().await;
        let (map, mut effects) = scene(SceneKind::Map, &store);
        map.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        let snapshot = map
            .dispatch(SceneEvent::ParentGateRequested(GateAction::EnterParentMode))
            .await
            .unwrap();
        let question = snapshot.parent_gate.unwrap();

        let snapshot = map
            .dispatch(SceneEvent::ParentAnswerSubmitted(question.answer() + 10))
            .await
            .unwrap();
        assert!(snapshot.parent_gate.is_some());
        assert_eq!(effects.drain(), vec![Effect::ShowVerificationFailedHint]);

        let question = snapshot.parent_gate.unwrap();
        let snapshot = map
            .dispatch(SceneEvent::ParentAnswerSubmitted(question.answer()))
            .await
            .unwrap();
        assert!(snapshot.parent_gate.is_none());
        assert_eq!(effects.drain(), vec![Effect::NavigateToParent]);
    }

    #[tokio::test(start_paused = true)]
    async fn map_does_not_offer_reset() {
        let (store, _) = store().await;
        let (map, _effects) = scene(SceneKind::Map, &store);

        let snapshot = map
            .dispatch(SceneEvent::ParentGateRequested(GateAction::ResetProgress))
            .await
            .unwrap();

        assert!(snapshot.parent_gate.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_area_resets_progress_behind_the_gate() {
        let (store, _) = store().await;
        store
            .update(|p| p.complete_scene(SceneId::FireStation, 1).0)
            .await
            .unwrap();
        let (parent, mut effects) = scene(SceneKind::Parent, &store);
        parent.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        let snapshot = parent
            .dispatch(SceneEvent::ParentGateRequested(GateAction::ResetProgress))
            .await
            .unwrap();
        let answer = snapshot.parent_gate.unwrap().answer();
        parent
            .dispatch(SceneEvent::ParentAnswerSubmitted(answer))
            .await
            .unwrap();

        assert_eq!(effects.drain(), vec![Effect::ShowResetSuccessHint]);
        assert_eq!(store.current(), crate::state::progress::GameProgress::initial());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_area_updates_session_limit() {
        let (store, _) = store().await;
        let (parent, mut effects) = scene(SceneKind::Parent, &store);
        parent.dispatch(SceneEvent::ScreenEntered).await.unwrap();

        let rejected = parent
            .dispatch(SceneEvent::ParentGateRequested(GateAction::UpdateSettings {
                session_minutes: 7,
                reminder_minutes: 2,
            }))
            .await
            .unwrap();
        assert!(rejected.parent_gate.is_none());

        let snapshot = parent
            .dispatch(SceneEvent::ParentGateRequested(GateAction::UpdateSettings {
                session_minutes: 30,
                reminder_minutes: 5,
            }))
            .await
            .unwrap();
        let answer = snapshot.parent_gate.unwrap().answer();
        parent
            .dispatch(SceneEvent::ParentAnswerSubmitted(answer))
            .await
            .unwrap();

        assert_eq!(effects.drain(), vec![Effect::ShowSettingsSavedHint]);
        assert_eq!(store.settings().session_minutes(), 30);
        assert_eq!(store.settings().reminder_minutes(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_gate_closes() {
        let (store, _) = store().await;
        let (parent, _effects) = scene(SceneKind::Parent, &store);
        parent
            .dispatch(SceneEvent::ParentGateRequested(GateAction::ResetProgress))
            .await
            .unwrap();

        let snapshot = parent
            .dispatch(SceneEvent::ParentGateCancelled)
            .await
            .unwrap();

        assert!(snapshot.parent_gate.is_none());
    }
}
