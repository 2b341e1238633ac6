//! Controller facade (C11, §4.9): the single structured CRUD surface every
//! frontend and transport (CLI, gRPC/OSC — both non-goals here, see
//! SPEC_FULL §12) would sit behind. Translates engine-level
//! [`sushi_core::Error`]s into [`Status`] at this boundary (§7) and is the
//! only place in the workspace that does so.

use crate::dispatcher::{EventDispatcher, PosterId};
use crate::status::{status_of, Status};
use crossbeam_channel::Receiver;
use sushi_core::config::{MidiConfig, ProcessorState, SessionConfig, TrackConfig};
use sushi_core::rt_event::Notification;
use sushi_core::{BoxedProcessor, ParameterId, ProcessorId, Track, TrackId, TrackKind};
use sushi_engine::{EngineHandle, EngineSnapshot, ParameterSnapshot, ProcessorSnapshot, TrackSnapshot};
use std::sync::Arc;
use std::time::Duration;

/// Identifies a track or processor by id or by name — every lookup-capable
/// operation accepts either (SPEC_FULL §11: "processor/parameter/track
/// lookup by name").
#[derive(Debug, Clone)]
pub enum TrackRef {
    Id(TrackId),
    Name(String),
}

#[derive(Debug, Clone)]
pub enum ProcessorRef {
    Id(ProcessorId),
    Name(String),
}

fn resolve_track<'a>(snapshot: &'a EngineSnapshot, reference: &TrackRef) -> Option<&'a TrackSnapshot> {
    match reference {
        TrackRef::Id(id) => snapshot.track(*id),
        TrackRef::Name(name) => snapshot.track_by_name(name),
    }
}

fn resolve_processor<'a>(snapshot: &'a EngineSnapshot, reference: &ProcessorRef) -> Option<&'a ProcessorSnapshot> {
    match reference {
        ProcessorRef::Id(id) => snapshot.processor(*id),
        ProcessorRef::Name(name) => snapshot.processor_by_name(name),
    }
}

/// The control-plane facade (§4.9). Cheap to clone — every clone shares the
/// same engine handle and event dispatcher.
#[derive(Clone)]
pub struct Controller {
    engine: EngineHandle,
    dispatcher: Arc<EventDispatcher>,
}

impl Controller {
    pub fn new(engine: EngineHandle, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { engine, dispatcher }
    }

    fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.engine.snapshot()
    }

    // ---- Queries (§4.9) ----

    pub fn get_all_tracks(&self) -> Vec<TrackSnapshot> {
        self.snapshot().tracks.clone()
    }

    pub fn get_track(&self, reference: TrackRef) -> Option<TrackSnapshot> {
        resolve_track(&self.snapshot(), &reference).cloned()
    }

    pub fn get_track_processors(&self, reference: TrackRef) -> Result<Vec<ProcessorSnapshot>, Status> {
        let snapshot = self.snapshot();
        resolve_track(&snapshot, &reference)
            .map(|t| t.processors.clone())
            .ok_or(Status::NotFound)
    }

    pub fn get_processor_parameters(&self, reference: ProcessorRef) -> Result<Vec<ParameterSnapshot>, Status> {
        let snapshot = self.snapshot();
        resolve_processor(&snapshot, &reference)
            .map(|p| p.parameters.clone())
            .ok_or(Status::NotFound)
    }

    pub fn get_parameter_value(&self, processor: ProcessorRef, parameter_name: &str) -> Result<f32, Status> {
        let snapshot = self.snapshot();
        let processor = resolve_processor(&snapshot, &processor).ok_or(Status::NotFound)?;
        processor
            .parameters
            .iter()
            .find(|p| p.name.as_ref() == parameter_name)
            .map(|p| p.normalized_value)
            .ok_or(Status::NotFound)
    }

    pub fn engine_version(&self) -> u64 {
        self.snapshot().version
    }

    // ---- Mutations (§4.9) ----

    pub fn create_track(&self, name: impl Into<String>, kind: TrackKind, channels: usize) -> Result<TrackId, Status> {
        let id = self.engine.allocate_track_id();
        let track = Track::new(id, name, kind, channels);
        status_of(self.engine.create_track(track)).into_result(id)
    }

    pub fn delete_track(&self, reference: TrackRef) -> Status {
        let id = match &reference {
            TrackRef::Id(id) => *id,
            TrackRef::Name(_) => match resolve_track(&self.snapshot(), &reference) {
                Some(track) => track.id,
                None => return Status::NotFound,
            },
        };
        status_of(self.engine.delete_track(id))
    }

    pub fn add_processor_to_track(&self, track: TrackRef, processor: BoxedProcessor) -> Status {
        let Some(track_id) = self.resolved_track_id(&track) else {
            return Status::NotFound;
        };
        status_of(self.engine.add_plugin_to_track(track_id, processor))
    }

    pub fn remove_processor(&self, track: TrackRef, processor: ProcessorRef) -> Status {
        let Some(track_id) = self.resolved_track_id(&track) else {
            return Status::NotFound;
        };
        let Some(processor_id) = self.resolved_processor_id(&processor) else {
            return Status::NotFound;
        };
        status_of(self.engine.remove_plugin(track_id, processor_id))
    }

    pub fn set_parameter_value(&self, processor: ProcessorRef, parameter: ParameterId, normalized_value: f32) -> Status {
        let Some(processor_id) = self.resolved_processor_id(&processor) else {
            return Status::NotFound;
        };
        status_of(self.engine.set_parameter(processor_id, parameter, normalized_value))
    }

    pub fn set_bypassed(&self, processor: ProcessorRef, bypassed: bool) -> Status {
        let Some(processor_id) = self.resolved_processor_id(&processor) else {
            return Status::NotFound;
        };
        status_of(self.engine.set_bypass(processor_id, bypassed))
    }

    pub fn set_tempo(&self, bpm: f32) -> Status {
        status_of(self.engine.set_tempo(bpm))
    }

    pub fn set_time_signature(&self, numerator: u32, denominator: u32) -> Status {
        status_of(self.engine.set_time_signature(numerator, denominator))
    }

    // ---- Subscriptions (§4.9) ----

    /// Register for push notifications (parameter/track/processor changes,
    /// transport changes, CPU timings, xruns). Drop the returned
    /// [`Subscription`] to unsubscribe.
    pub fn subscribe_to_updates(&self) -> Subscription {
        let (id, rx) = self.dispatcher.register_poster();
        Subscription {
            id,
            rx,
            dispatcher: self.dispatcher.clone(),
        }
    }

    // ---- Session persistence (§4.9, §6) ----

    /// Walk the live graph and produce a persistable [`SessionConfig`].
    pub fn save_session(&self) -> SessionConfig {
        let snapshot = self.snapshot();
        let engine_config = self.engine.config().clone();
        let tracks = snapshot
            .tracks
            .iter()
            .map(|t| TrackConfig {
                name: t.name.to_string(),
                kind: "regular".into(),
                channels: t.channel_count,
                processors: t
                    .processors
                    .iter()
                    .map(|p| ProcessorState {
                        name: p.name.to_string(),
                        uid: p.name.to_string(),
                        kind: "internal".into(),
                        path: None,
                        state_bytes: Vec::new(),
                    })
                    .collect(),
            })
            .collect();
        SessionConfig {
            engine: engine_config,
            midi: MidiConfig::default(),
            tracks,
        }
    }

    /// Validate a [`SessionConfig`] against the live engine before a caller
    /// applies it track-by-track (session restoration is driven by the
    /// Controller's `create_track`/`add_processor_to_track` calls, not a
    /// single atomic operation — §4.9 leaves graph reconstruction to the
    /// caller so partial failures are visible per-track).
    pub fn validate_session(&self, session: &SessionConfig) -> Status {
        if session.engine.sample_rate <= 0.0 {
            return Status::InvalidArguments;
        }
        Status::Ok
    }

    fn resolved_track_id(&self, reference: &TrackRef) -> Option<TrackId> {
        match reference {
            TrackRef::Id(id) => Some(*id),
            TrackRef::Name(_) => resolve_track(&self.snapshot(), reference).map(|t| t.id),
        }
    }

    fn resolved_processor_id(&self, reference: &ProcessorRef) -> Option<ProcessorId> {
        match reference {
            ProcessorRef::Id(id) => Some(*id),
            ProcessorRef::Name(_) => resolve_processor(&self.snapshot(), reference).map(|p| p.id),
        }
    }
}

trait IntoResult<T> {
    fn into_result(self, value: T) -> Result<T, Status>;
}

impl<T> IntoResult<T> for Status {
    fn into_result(self, value: T) -> Result<T, Status> {
        if self.is_ok() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// A live poster registration. Receives [`Notification`]s until dropped, at
/// which point the dispatcher stops serving it and drops any events still
/// scheduled under its id (§4.6 cancellation).
pub struct Subscription {
    id: PosterId,
    rx: Receiver<Notification>,
    dispatcher: Arc<EventDispatcher>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispatcher.deregister_poster(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sushi_core::config::EngineConfig;
    use sushi_engine::AudioEngine;

    /// `Controller` only ever holds an `EngineHandle` — every mutation it
    /// issues is posted through the to-RT queue, never applied directly. The
    /// paired `AudioEngine` returned here is the test's stand-in for the
    /// real thread driving `process_chunk`: call `apply_pending_mutations()`
    /// on it wherever a test needs to observe the effect of a prior
    /// Controller call.
    fn harness() -> (AudioEngine, Controller) {
        let (engine, handle) = AudioEngine::new(EngineConfig::default(), 2);
        let dispatcher = Arc::new(EventDispatcher::new(handle.clone(), Duration::from_millis(5)));
        (engine, Controller::new(handle, dispatcher))
    }

    #[test]
    fn create_then_delete_track_round_trips() {
        let (mut engine, controller) = harness();
        let id = controller.create_track("master", TrackKind::Regular, 2).unwrap();
        engine.apply_pending_mutations();
        assert!(controller.get_track(TrackRef::Id(id)).is_some());
        assert_eq!(controller.delete_track(TrackRef::Id(id)), Status::Ok);
        engine.apply_pending_mutations();
        assert!(controller.get_track(TrackRef::Id(id)).is_none());
    }

    #[test]
    fn deleting_unknown_track_is_not_found() {
        let (_engine, controller) = harness();
        assert_eq!(controller.delete_track(TrackRef::Id(TrackId(999))), Status::NotFound);
    }

    #[test]
    fn repeat_delete_is_not_found() {
        let (mut engine, controller) = harness();
        let id = controller.create_track("t", TrackKind::Regular, 2).unwrap();
        engine.apply_pending_mutations();
        assert_eq!(controller.delete_track(TrackRef::Id(id)), Status::Ok);
        engine.apply_pending_mutations();
        assert_eq!(controller.delete_track(TrackRef::Id(id)), Status::NotFound);
    }

    #[test]
    fn lookup_by_name_matches_lookup_by_id() {
        let (mut engine, controller) = harness();
        let id = controller.create_track("drums", TrackKind::Regular, 2).unwrap();
        engine.apply_pending_mutations();
        let by_name = controller.get_track(TrackRef::Name("drums".into())).unwrap();
        assert_eq!(by_name.id, id);
    }
}
