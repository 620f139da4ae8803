mod common;

use approx::assert_abs_diff_eq;
use multitrack_player::engine::{EngineEvent, PlayState, TrackId, VoiceEnded};
use multitrack_player::error::{EngineError, GraphError};

use common::*;

fn audible_set(engine: &OfflineEngine) -> Vec<u32> {
    engine
        .tracks()
        .iter()
        .filter(|t| engine.is_audible(t.id))
        .map(|t| t.id.0)
        .collect()
}

#[test]
fn audibility_follows_mute_and_solo() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0, 10.0, 10.0]);
    assert_eq!(audible_set(&engine), [1, 2, 3, 4]);

    engine.set_track_solo(TrackId(1), true).unwrap();
    assert_eq!(audible_set(&engine), [1]);

    engine.play().unwrap();
    engine.set_track_solo(TrackId(3), true).unwrap();
    assert_eq!(audible_set(&engine), [1, 3]);

    engine.set_track_mute(TrackId(1), true).unwrap();
    assert_eq!(audible_set(&engine), [3]);

    engine.set_track_solo(TrackId(1), false).unwrap();
    engine.set_track_solo(TrackId(3), false).unwrap();
    assert_eq!(audible_set(&engine), [2, 3, 4]);

    renderer.render_offline(BLOCK);
    assert_eq!(renderer.track_gain(TrackId(1)), 0.0);
    for id in 2..=4 {
        assert_abs_diff_eq!(renderer.track_gain(TrackId(id)), 0.7);
    }
}

#[test]
fn multi_solo_silences_the_rest() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0, 10.0, 10.0]);
    engine.toggle_track_solo(TrackId(1)).unwrap();
    engine.toggle_track_solo(TrackId(3)).unwrap();
    engine.play().unwrap();
    renderer.render_offline(BLOCK);

    assert_abs_diff_eq!(renderer.track_gain(TrackId(1)), 0.7);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(3)), 0.7);
    assert_eq!(renderer.track_gain(TrackId(2)), 0.0);
    assert_eq!(renderer.track_gain(TrackId(4)), 0.0);
    // Only audible tracks were given voices.
    assert_eq!(renderer.active_voices(), 2);
}

#[test]
fn pause_is_idempotent() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    let log = EventLog::attach(&mut engine);
    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 1.0);

    engine.pause();
    let position = engine.position();
    let events = log.len();
    let run = engine.generation();

    engine.pause();
    assert_eq!(engine.position(), position);
    assert_eq!(log.len(), events);
    assert_eq!(engine.generation(), run);
    assert_abs_diff_eq!(position, 1.0, epsilon = 1e-9);
}

#[test]
fn seek_clamps_into_duration() {
    let (mut engine, _renderer) = offline_engine(&[120.0, 60.0]);
    engine.seek_to(-5.0).unwrap();
    assert_eq!(engine.position(), 0.0);
    engine.seek_to(200.0).unwrap();
    assert_eq!(engine.position(), 120.0);
    engine.seek_by(-30.0).unwrap();
    assert_eq!(engine.position(), 90.0);
}

#[test]
fn loop_wraps_and_keeps_playing() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    engine.set_loop(true);
    engine.play().unwrap();
    engine.seek_to(9.5).unwrap();
    let log = EventLog::attach(&mut engine);

    advance(&mut engine, &mut renderer, 1.0);

    assert!(engine.is_playing());
    let position = engine.position();
    assert!((0.0..10.0).contains(&position), "position {position}");
    assert_abs_diff_eq!(position, 0.5, epsilon = 1e-9);
    // A loop restart is not a pause.
    assert!(!log.contains(&EngineEvent::PlayStateChanged(false)));
}

#[test]
fn end_without_loop_stops_at_zero() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    engine.play().unwrap();
    engine.seek_to(9.5).unwrap();
    advance(&mut engine, &mut renderer, 1.0);

    assert!(!engine.is_playing());
    assert_eq!(engine.position(), 0.0);
    assert_eq!(renderer.active_voices(), 0);
}

#[test]
fn shorter_track_ending_does_not_end_the_run() {
    let (mut engine, mut renderer) = offline_engine(&[5.0, 8.0, 8.0]);
    let log = EventLog::attach(&mut engine);
    engine.play().unwrap();

    advance(&mut engine, &mut renderer, 6.0);
    assert!(engine.is_playing());
    assert!(engine.tracks()[0].voice().is_none());
    assert!(engine.tracks()[1].voice().is_some());
    assert!(engine.tracks()[2].voice().is_some());

    advance(&mut engine, &mut renderer, 2.5);
    assert_eq!(engine.state(), PlayState::Paused { position: 0.0 });
    assert!(log.contains(&EngineEvent::PlayStateChanged(false)));
}

#[test]
fn mute_keeps_the_voice_and_unmute_restores_volume() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.play().unwrap();
    renderer.render_offline(BLOCK);
    let voice = engine.tracks()[0].voice().unwrap();

    engine.set_track_mute(TrackId(1), true).unwrap();
    renderer.render_offline(BLOCK);
    assert_eq!(renderer.track_gain(TrackId(1)), 0.0);
    assert!(renderer.is_voice_active(voice.id));
    assert_eq!(engine.tracks()[0].voice(), Some(voice));

    engine.set_track_mute(TrackId(1), false).unwrap();
    renderer.render_offline(BLOCK);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(1)), 0.7);
    assert_eq!(engine.tracks()[0].voice(), Some(voice));
}

#[test]
fn unmute_restores_the_volume_set_while_muted() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.set_track_volume(TrackId(1), 0.3).unwrap();
    engine.play().unwrap();
    renderer.render_offline(BLOCK);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(1)), 0.3);

    engine.set_track_mute(TrackId(1), true).unwrap();
    engine.set_track_volume(TrackId(1), 0.4).unwrap();
    renderer.render_offline(BLOCK);
    assert_eq!(renderer.track_gain(TrackId(1)), 0.0);

    engine.set_track_mute(TrackId(1), false).unwrap();
    renderer.render_offline(BLOCK);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(1)), 0.4);
}

#[test]
fn volume_change_on_a_solo_silenced_track_stays_silent() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.play().unwrap();
    engine.set_track_solo(TrackId(2), true).unwrap();
    engine.set_track_volume(TrackId(1), 0.9).unwrap();
    renderer.render_offline(BLOCK);
    assert_eq!(renderer.track_gain(TrackId(1)), 0.0);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(2)), 0.7);

    engine.set_track_solo(TrackId(2), false).unwrap();
    renderer.render_offline(BLOCK);
    assert_abs_diff_eq!(renderer.track_gain(TrackId(1)), 0.9);
}

#[test]
fn master_unmute_restores_master_volume() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    engine.set_master_volume(0.5).unwrap();
    engine.set_master_mute(true);
    renderer.render_offline(BLOCK);
    assert_eq!(renderer.master_gain(), 0.0);

    engine.set_master_mute(false);
    renderer.render_offline(BLOCK);
    assert_abs_diff_eq!(renderer.master_gain(), 0.5);
    assert_abs_diff_eq!(engine.master().volume(), 0.5);
}

#[test]
fn unmuting_a_track_that_started_muted_joins_the_run() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.set_track_mute(TrackId(2), true).unwrap();
    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 2.0);
    assert!(engine.tracks()[1].voice().is_none());

    engine.set_track_mute(TrackId(2), false).unwrap();
    let voice = engine.tracks()[1].voice().unwrap();
    assert_eq!(voice.generation, engine.generation());
    renderer.render_offline(BLOCK);
    assert!(renderer.is_voice_active(voice.id));
}

#[test]
fn rate_change_updates_live_voices_in_place() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.play().unwrap();
    renderer.render_offline(BLOCK);
    let voices: Vec<_> = engine.tracks().iter().map(|t| t.voice().unwrap()).collect();

    engine.set_playback_rate(2.0).unwrap();
    renderer.render_offline(BLOCK);

    for (track, voice) in engine.tracks().iter().zip(&voices) {
        assert_eq!(track.voice(), Some(*voice));
        assert_eq!(renderer.voice_rate(voice.id), Some(2.0));
    }
    assert!(engine.is_playing());
}

#[test]
fn playback_rate_leaves_reported_position_on_wall_clock() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    engine.play().unwrap();
    engine.set_playback_rate(2.0).unwrap();

    advance(&mut engine, &mut renderer, 1.0);
    assert_abs_diff_eq!(engine.position(), 1.0, epsilon = 1e-9);
}

#[test]
fn double_speed_ends_after_half_the_wall_time() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    engine.set_playback_rate(2.0).unwrap();
    engine.play().unwrap();

    advance(&mut engine, &mut renderer, 4.0);
    assert!(engine.is_playing());
    assert_abs_diff_eq!(engine.position(), 4.0, epsilon = 1e-9);

    // 1000 source frames at step 2 run out after 500 output frames.
    advance(&mut engine, &mut renderer, 1.0);
    assert_eq!(engine.state(), PlayState::Paused { position: 0.0 });
    assert_eq!(renderer.active_voices(), 0);
}

#[test]
fn rapid_seeks_leave_only_the_last_voices() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0, 10.0]);
    engine.play().unwrap();
    for target in [1.0, 2.0, 3.0, 4.0] {
        engine.seek_to(target).unwrap();
    }

    advance(&mut engine, &mut renderer, 0.5);

    assert!(engine.is_playing());
    assert_eq!(renderer.active_voices(), 3);
    for track in engine.tracks() {
        let voice = track.voice().unwrap();
        assert_eq!(voice.generation, engine.generation());
        assert!(renderer.is_voice_active(voice.id));
    }
    assert_abs_diff_eq!(engine.position(), 4.5, epsilon = 1e-9);
}

#[test]
fn duration_is_monotonic_under_any_load_order() {
    for order in [[2usize, 1, 3], [1, 3, 2], [3, 2, 1]] {
        let lengths = [4.0, 9.0, 6.0];
        let (mut engine, _renderer) = unloaded_engine(3);
        let mut last = 0.0;
        for i in order {
            engine
                .complete_load(TrackId(i as u32), Ok(tone(lengths[i - 1])))
                .unwrap();
            assert!(engine.duration() >= last);
            last = engine.duration();
        }
        assert_eq!(engine.duration(), 9.0);
    }
}

#[test]
fn late_load_joins_a_running_transport() {
    let (mut engine, mut renderer) = unloaded_engine(2);
    engine.complete_load(TrackId(1), Ok(tone(10.0))).unwrap();
    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 1.0);
    assert!(engine.tracks()[1].voice().is_none());

    engine.complete_load(TrackId(2), Ok(tone(10.0))).unwrap();
    assert!(engine.tracks()[1].voice().is_some());
    renderer.render_offline(BLOCK);
    assert_eq!(renderer.active_voices(), 2);
}

#[test]
fn everything_muted_still_reaches_the_end() {
    let (mut engine, mut renderer) = offline_engine(&[2.0, 2.0]);
    engine.set_track_mute(TrackId(1), true).unwrap();
    engine.set_track_mute(TrackId(2), true).unwrap();
    engine.play().unwrap();
    assert_eq!(renderer.active_voices(), 0);

    advance(&mut engine, &mut renderer, 2.5);
    assert!(!engine.is_playing());
    assert_eq!(engine.position(), 0.0);
}

#[test]
fn play_from_the_end_restarts() {
    let (mut engine, mut renderer) = offline_engine(&[3.0]);
    engine.seek_to(3.0).unwrap();
    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 0.5);
    assert!(engine.is_playing());
    assert_abs_diff_eq!(engine.position(), 0.5, epsilon = 1e-9);
}

#[test]
fn progress_is_reported_only_while_playing() {
    let (mut engine, mut renderer) = offline_engine(&[10.0]);
    let log = EventLog::attach(&mut engine);
    advance(&mut engine, &mut renderer, 0.5);
    assert_eq!(log.len(), 0);

    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 0.5);
    let progress = log
        .events()
        .iter()
        .filter(|e| matches!(e, EngineEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 5);

    engine.pause();
    log.clear();
    advance(&mut engine, &mut renderer, 0.5);
    assert_eq!(log.len(), 0);
}

#[test]
fn reset_restores_defaults_and_announces_them() {
    let (mut engine, mut renderer) = offline_engine(&[10.0, 10.0]);
    engine.set_track_volume(TrackId(1), 0.2).unwrap();
    engine.set_track_pan(TrackId(2), 0.8).unwrap();
    engine.set_track_mute(TrackId(1), true).unwrap();
    engine.set_track_solo(TrackId(2), true).unwrap();
    engine.set_master_volume(0.3).unwrap();
    engine.set_master_mute(true);
    engine.set_playback_rate(1.5).unwrap();
    engine.set_loop(true);
    engine.play().unwrap();
    advance(&mut engine, &mut renderer, 1.0);

    let log = EventLog::attach(&mut engine);
    engine.reset();

    assert_eq!(engine.state(), PlayState::Paused { position: 0.0 });
    assert_eq!(engine.playback_rate(), 1.0);
    assert!(!engine.is_looping());
    assert!(!engine.master().is_muted());
    assert_abs_diff_eq!(engine.master().volume(), 0.7);
    for track in engine.tracks() {
        assert_abs_diff_eq!(track.strip.volume, 0.7);
        assert_eq!(track.strip.pan, 0.0);
        assert!(!track.strip.muted && !track.strip.soloed);
    }

    for event in [
        EngineEvent::PlayStateChanged(false),
        EngineEvent::TrackMuteChanged { track: TrackId(1), muted: false },
        EngineEvent::TrackSoloChanged { track: TrackId(2), soloed: false },
        EngineEvent::TrackVolumeChanged { track: TrackId(1), volume: 0.7 },
        EngineEvent::TrackPanChanged { track: TrackId(2), pan: 0.0 },
        EngineEvent::MasterMuteChanged(false),
        EngineEvent::PlaybackRateChanged(1.0),
        EngineEvent::LoopChanged(false),
    ] {
        assert!(log.contains(&event), "missing {event:?}");
    }

    renderer.render_offline(BLOCK);
    assert_eq!(renderer.active_voices(), 0);
    assert_abs_diff_eq!(renderer.master_gain(), 0.7);
}

#[test]
fn refused_clock_leaves_engine_paused() {
    let clock = ManualClock::suspended();
    clock.refuse.set(true);
    let (mut engine, graph) = recording_engine(&[10.0], clock.clone());

    let err = engine.play().unwrap_err();
    assert!(matches!(err, EngineError::ClockResume(_)));
    assert!(!engine.is_playing());
    assert!(graph.starts().is_empty());

    clock.refuse.set(false);
    engine.play().unwrap();
    assert!(engine.is_playing());
    assert!(!clock.suspended.get());
    assert_eq!(graph.starts().len(), 1);
}

#[test]
fn teardown_precedes_creation_on_seek() {
    let clock = ManualClock::default();
    let (mut engine, graph) = recording_engine(&[10.0, 10.0], clock.clone());
    engine.play().unwrap();
    clock.set(2.0);
    graph.clear();

    engine.seek_to(5.0).unwrap();
    let calls = graph.calls();
    let first_start = calls
        .iter()
        .position(|c| matches!(c, GraphCall::Start { .. }))
        .unwrap();
    let last_stop = calls
        .iter()
        .rposition(|c| matches!(c, GraphCall::Stop(_)))
        .unwrap();
    assert!(last_stop < first_start);
    assert_eq!(graph.starts().len(), 2);
    for call in graph.starts() {
        let GraphCall::Start { offset, .. } = call else { unreachable!() };
        assert_eq!(offset, 5.0);
    }
    assert_abs_diff_eq!(engine.position(), 5.0);
}

#[test]
fn stale_end_notices_are_ignored() {
    let clock = ManualClock::default();
    let (mut engine, graph) = recording_engine(&[10.0], clock.clone());
    engine.play().unwrap();
    let old = engine.tracks()[0].voice().unwrap();
    engine.seek_to(3.0).unwrap();

    graph.notify(VoiceEnded {
        track: TrackId(1),
        voice: old.id,
        generation: old.generation,
    });
    engine.pump();
    assert!(engine.is_playing());
    assert!(engine.tracks()[0].voice().is_some());

    let current = engine.tracks()[0].voice().unwrap();
    graph.notify(VoiceEnded {
        track: TrackId(1),
        voice: current.id,
        generation: current.generation,
    });
    engine.pump();
    assert!(!engine.is_playing());
    assert_eq!(engine.position(), 0.0);
}

#[test]
fn failed_voice_start_rolls_back() {
    let clock = ManualClock::default();
    let (mut engine, graph) = recording_engine(&[10.0, 10.0], clock.clone());
    engine.seek_to(4.0).unwrap();
    graph.fail_after.set(Some(1));

    let err = engine.play().unwrap_err();
    assert!(matches!(err, EngineError::Graph(GraphError::QueueFull)));
    assert!(!engine.is_playing());
    assert_eq!(engine.position(), 4.0);
    assert!(engine.tracks().iter().all(|t| t.voice().is_none()));

    let started = graph.starts();
    assert_eq!(started.len(), 1);
    let GraphCall::Start { voice, .. } = started[0] else { unreachable!() };
    assert!(graph.calls().contains(&GraphCall::Stop(voice)));
}
