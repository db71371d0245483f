//! Per-frame processing pipeline for one camera session.
//!
//! A `Session` owns the mutable per-session state (liveness evaluator
//! and debouncer) and is advanced once per frame by the external capture
//! loop. The gallery is shared and passed in per call; concurrent
//! sessions each own an independent `Session` and never share state.
//!
//! The session decides *that* a toggle should be attempted; the caller
//! owns the attendance log, plans the toggle against it
//! ([`crate::toggle::plan_toggle`]), appends the event, and reports the
//! success back via [`Session::record_toggle`].

use image::RgbImage;
use serde::Serialize;

use crate::debounce::Debouncer;
use crate::gallery::Gallery;
use crate::liveness::{LivenessConfig, LivenessEvaluator, LivenessVerdict};
use crate::recognize::{recognize, RecognizedFace};
use crate::types::FrameObservation;

/// Session tuning, typically derived from daemon configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Maximum embedding distance for a positive match (smaller =
    /// stricter).
    pub tolerance: f32,
    /// Consecutive live, matched frames required before a toggle attempt.
    pub confirm_frames: u32,
    pub liveness: LivenessConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.6,
            confirm_frames: 3,
            liveness: LivenessConfig::default(),
        }
    }
}

/// Per-frame output for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct FrameStatus {
    /// The recognized identity, if any face matched the gallery.
    pub recognition: Option<RecognizedFace>,
    /// Liveness verdict with per-check breakdown, when a face was present.
    pub liveness: Option<LivenessVerdict>,
    /// Employee ID for which a toggle should now be attempted.
    pub attempt: Option<String>,
}

impl FrameStatus {
    fn empty() -> Self {
        Self {
            recognition: None,
            liveness: None,
            attempt: None,
        }
    }
}

pub struct Session {
    config: SessionConfig,
    liveness: LivenessEvaluator,
    debounce: Debouncer,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            liveness: LivenessEvaluator::new(config.liveness),
            debounce: Debouncer::new(config.confirm_frames),
        }
    }

    /// Process one frame. `observation` is the external detector's output
    /// for the primary face, or `None` when no face was found.
    pub fn process(
        &mut self,
        gallery: &Gallery,
        frame: &RgbImage,
        observation: Option<&FrameObservation>,
    ) -> FrameStatus {
        let Some(obs) = observation else {
            // No face: liveness state restarts and the streak breaks.
            self.liveness.reset();
            self.debounce.observe_break();
            return FrameStatus::empty();
        };

        let recognition = recognize(gallery, &obs.embedding, obs.region, self.config.tolerance);
        let verdict = self
            .liveness
            .evaluate(frame, obs.region, obs.landmarks.as_ref());

        let attempt = match &recognition {
            Some(face) if verdict.is_live => {
                if self.debounce.observe_confirmed(&face.employee_id) {
                    Some(face.employee_id.clone())
                } else {
                    None
                }
            }
            _ => {
                // Unknown face or spoof suspicion: streak resets.
                self.debounce.observe_break();
                None
            }
        };

        FrameStatus {
            recognition,
            liveness: Some(verdict),
            attempt,
        }
    }

    /// Record that a toggle for `employee_id` was written successfully,
    /// suppressing re-trigger for this continuous presence.
    pub fn record_toggle(&mut self, employee_id: &str) {
        self.debounce.record_toggle(employee_id);
    }

    /// Restart the session: clears liveness and debounce state.
    pub fn reset(&mut self) {
        self.liveness.reset();
        self.debounce.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::Identity;
    use crate::toggle::{plan_toggle, LastEvent, ToggleOutcome, TIMESTAMP_FMT};
    use crate::types::{Action, Region, EMBEDDING_DIM};
    use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};

    fn at(ts: &str) -> DateTime<Local> {
        let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FMT).unwrap();
        Local.from_local_datetime(&naive).unwrap()
    }

    /// Sharp, skin-toned synthetic frame so texture and color pass.
    fn live_frame() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([230, 140, 100])
            } else {
                image::Rgb([120, 60, 40])
            }
        })
    }

    fn gallery_with_alice() -> Gallery {
        let mut g = Gallery::in_memory();
        g.add(Identity {
            name: "Alice".into(),
            employee_id: "E1".into(),
            embedding: vec![0.1; EMBEDDING_DIM],
        })
        .unwrap();
        g
    }

    fn alice_obs() -> FrameObservation {
        FrameObservation {
            region: Region::new(0, 64, 64, 0),
            embedding: vec![0.1; EMBEDDING_DIM],
            landmarks: None,
        }
    }

    fn stranger_obs() -> FrameObservation {
        FrameObservation {
            embedding: vec![0.9; EMBEDDING_DIM],
            ..alice_obs()
        }
    }

    fn session() -> Session {
        Session::new(SessionConfig {
            liveness: LivenessConfig {
                // Texture + color are enough for liveness in these tests.
                blink_detection: false,
                ..LivenessConfig::default()
            },
            ..SessionConfig::default()
        })
    }

    #[test]
    fn no_face_produces_empty_status() {
        let g = gallery_with_alice();
        let mut s = session();
        let status = s.process(&g, &live_frame(), None);
        assert!(status.recognition.is_none());
        assert!(status.liveness.is_none());
        assert!(status.attempt.is_none());
    }

    #[test]
    fn three_live_frames_produce_one_attempt() {
        let g = gallery_with_alice();
        let mut s = session();
        let frame = live_frame();
        let obs = alice_obs();

        assert!(s.process(&g, &frame, Some(&obs)).attempt.is_none());
        assert!(s.process(&g, &frame, Some(&obs)).attempt.is_none());
        let third = s.process(&g, &frame, Some(&obs));
        assert_eq!(third.attempt.as_deref(), Some("E1"));
        assert_eq!(third.recognition.unwrap().name, "Alice");

        // Toggle recorded: the same continuous presence stays quiet.
        s.record_toggle("E1");
        for _ in 0..5 {
            assert!(s.process(&g, &frame, Some(&obs)).attempt.is_none());
        }
    }

    #[test]
    fn unknown_face_resets_streak() {
        let g = gallery_with_alice();
        let mut s = session();
        let frame = live_frame();

        s.process(&g, &frame, Some(&alice_obs()));
        s.process(&g, &frame, Some(&alice_obs()));
        let status = s.process(&g, &frame, Some(&stranger_obs()));
        assert!(status.recognition.is_none());
        assert!(status.attempt.is_none());

        // Two frames are no longer enough; the streak restarted.
        s.process(&g, &frame, Some(&alice_obs()));
        assert!(s.process(&g, &frame, Some(&alice_obs())).attempt.is_none());
        assert!(s
            .process(&g, &frame, Some(&alice_obs()))
            .attempt
            .is_some());
    }

    #[test]
    fn spoof_frames_never_attempt() {
        let g = gallery_with_alice();
        // Flat blue frame: every enabled check fails.
        let frame = RgbImage::from_pixel(64, 64, image::Rgb([40, 60, 220]));
        let mut s = session();

        for _ in 0..10 {
            let status = s.process(&g, &frame, Some(&alice_obs()));
            assert!(status.recognition.is_some());
            assert!(!status.liveness.unwrap().is_live);
            assert!(status.attempt.is_none());
        }
    }

    /// Full scenario: register Alice, confirm over three live frames →
    /// punch-in; immediate re-presentation → too soon; after the interval
    /// elapses → punch-out.
    #[test]
    fn end_to_end_punch_cycle() {
        let g = gallery_with_alice();
        let frame = live_frame();
        let obs = alice_obs();
        let mut s = session();
        let min_interval = Duration::seconds(30);
        let mut log: Vec<LastEvent> = Vec::new();

        // First presentation: three confirming frames.
        let mut attempt = None;
        for _ in 0..3 {
            attempt = s.process(&g, &frame, Some(&obs)).attempt;
        }
        let id = attempt.expect("third frame attempts a toggle");

        let now = at("2026-03-02 09:00:00");
        match plan_toggle(log.last(), now, min_interval) {
            ToggleOutcome::Proceed(action) => {
                assert_eq!(action, Action::PunchIn);
                log.push(LastEvent {
                    action,
                    timestamp: now.format(TIMESTAMP_FMT).to_string(),
                });
                s.record_toggle(&id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Face leaves, then returns within 30s: rejected, nothing logged.
        s.process(&g, &frame, None);
        let mut attempt = None;
        for _ in 0..3 {
            attempt = s.process(&g, &frame, Some(&obs)).attempt;
        }
        assert!(attempt.is_some());
        let now = at("2026-03-02 09:00:15");
        match plan_toggle(log.last(), now, min_interval) {
            ToggleOutcome::TooSoon { wait_secs } => assert_eq!(wait_secs, 15),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(log.len(), 1);

        // Streak not reset by the rejection: the next qualifying frame
        // retries, and past the interval it records the punch-out.
        let attempt = s.process(&g, &frame, Some(&obs)).attempt;
        assert!(attempt.is_some());
        let now = at("2026-03-02 09:00:45");
        match plan_toggle(log.last(), now, min_interval) {
            ToggleOutcome::Proceed(action) => {
                assert_eq!(action, Action::PunchOut);
                log.push(LastEvent {
                    action,
                    timestamp: now.format(TIMESTAMP_FMT).to_string(),
                });
                s.record_toggle(&id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, Action::PunchIn);
        assert_eq!(log[1].action, Action::PunchOut);
    }

    #[test]
    fn reset_requires_fresh_confirmation() {
        let g = gallery_with_alice();
        let frame = live_frame();
        let obs = alice_obs();
        let mut s = session();

        s.process(&g, &frame, Some(&obs));
        s.process(&g, &frame, Some(&obs));
        s.reset();
        assert!(s.process(&g, &frame, Some(&obs)).attempt.is_none());
        assert!(s.process(&g, &frame, Some(&obs)).attempt.is_none());
        assert!(s.process(&g, &frame, Some(&obs)).attempt.is_some());
    }
}
