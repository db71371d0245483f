//! Multi-signal presentation-attack detection.
//!
//! Four independent, explainable heuristics are aggregated into one
//! liveness verdict per frame:
//!
//! - **Texture**: printed and screen-replayed faces lose high-frequency
//!   detail, measured as the variance of the Laplacian response over the
//!   grayscale face crop.
//! - **Color**: reproductions often shift color balance out of the
//!   natural skin-tone gamut, measured as the in-range pixel fraction in
//!   HSV space.
//! - **Movement**: a static photo shows near-zero positional variance of
//!   the bounding-box centre across recent frames.
//! - **Blink**: a completed closed→open eye-aspect-ratio cycle. A
//!   sustained closed eye is not a blink; the counter is edge-triggered.
//!
//! None of this is a trained classifier. Each check is a cheap signal
//! with a fixed threshold, and the aggregate requires at least two of
//! four to pass.

use std::collections::VecDeque;

use image::RgbImage;
use serde::Serialize;

use crate::types::{EyeLandmarks, Point, Region};

/// Number of recent face-centre positions retained for the movement check.
const MOVEMENT_HISTORY_CAP: usize = 10;
/// Minimum samples before the movement check can pass (fails closed below).
const MOVEMENT_MIN_SAMPLES: usize = 5;

/// Tunable thresholds and per-group enable flags.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// Gates the texture, color, and movement checks together.
    pub movement_detection: bool,
    /// Gates the blink check.
    pub blink_detection: bool,
    /// Laplacian variance above which the face crop counts as sharp.
    pub texture_threshold: f64,
    /// Minimum fraction of skin-toned pixels in the face crop.
    pub skin_ratio_threshold: f64,
    /// Per-axis centre-position variance (px²) above which movement is
    /// detected.
    pub movement_variance_threshold: f64,
    /// Eye-aspect-ratio below which the eye counts as closed.
    pub ear_threshold: f32,
    /// Consecutive closed frames required for a valid blink.
    pub blink_frames: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            movement_detection: true,
            blink_detection: true,
            texture_threshold: 100.0,
            skin_ratio_threshold: 0.30,
            movement_variance_threshold: 10.0,
            ear_threshold: 0.25,
            blink_frames: 2,
        }
    }
}

/// Outcome of each individual check for one frame.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LivenessChecks {
    pub texture: bool,
    pub color: bool,
    pub movement: bool,
    pub blink: bool,
}

impl LivenessChecks {
    fn passed(&self) -> u32 {
        [self.texture, self.color, self.movement, self.blink]
            .iter()
            .filter(|&&b| b)
            .count() as u32
    }
}

/// Aggregate liveness decision with per-check breakdown.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LivenessVerdict {
    pub is_live: bool,
    /// `passed checks / 4 × 100`. A disabled check contributes 0 — the
    /// denominator stays fixed at four.
    pub confidence: f32,
    pub checks: LivenessChecks,
}

/// Per-session liveness state, advanced once per frame.
///
/// Owned exclusively by one processing loop; concurrent camera sessions
/// each hold their own evaluator. Never persisted.
pub struct LivenessEvaluator {
    config: LivenessConfig,
    blink_counter: u32,
    total_blinks: u32,
    movement_history: VecDeque<Point>,
}

impl LivenessEvaluator {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            blink_counter: 0,
            total_blinks: 0,
            movement_history: VecDeque::with_capacity(MOVEMENT_HISTORY_CAP),
        }
    }

    /// Evaluate one frame. `landmarks` may be absent when the detector
    /// could not produce eye contours; the blink state is left untouched
    /// in that case.
    pub fn evaluate(
        &mut self,
        frame: &RgbImage,
        region: Region,
        landmarks: Option<&EyeLandmarks>,
    ) -> LivenessVerdict {
        let mut checks = LivenessChecks::default();

        if self.config.movement_detection {
            checks.texture = texture_check(frame, region, self.config.texture_threshold);
            checks.color = color_check(frame, region, self.config.skin_ratio_threshold);
            checks.movement = self.track_movement(region);
        }

        if self.config.blink_detection {
            if let Some(lm) = landmarks {
                self.observe_blink(lm);
            }
            checks.blink = self.total_blinks > 0;
        }

        let confidence = checks.passed() as f32 / 4.0 * 100.0;
        let verdict = LivenessVerdict {
            is_live: confidence >= 50.0,
            confidence,
            checks,
        };

        tracing::trace!(
            texture = checks.texture,
            color = checks.color,
            movement = checks.movement,
            blink = checks.blink,
            confidence,
            is_live = verdict.is_live,
            "liveness evaluated"
        );
        verdict
    }

    /// Clear all per-session state: blink counters and movement history.
    /// Called when no face is present or a session restarts.
    pub fn reset(&mut self) {
        self.blink_counter = 0;
        self.total_blinks = 0;
        self.movement_history.clear();
    }

    /// Cumulative completed blinks this session.
    pub fn total_blinks(&self) -> u32 {
        self.total_blinks
    }

    /// Advance the blink state machine with this frame's eye landmarks.
    /// A blink is counted on the rising edge: EAR must stay below the
    /// threshold for at least `blink_frames` consecutive frames and then
    /// rise back above it.
    fn observe_blink(&mut self, landmarks: &EyeLandmarks) {
        let left = eye_aspect_ratio(&landmarks.left_eye);
        let right = eye_aspect_ratio(&landmarks.right_eye);
        let ear = (left + right) / 2.0;

        if ear < self.config.ear_threshold {
            self.blink_counter += 1;
        } else {
            if self.blink_counter >= self.config.blink_frames {
                self.total_blinks += 1;
                tracing::debug!(total = self.total_blinks, "blink completed");
            }
            self.blink_counter = 0;
        }
    }

    /// Record the face centre and test positional variance over the
    /// retained history.
    fn track_movement(&mut self, region: Region) -> bool {
        if self.movement_history.len() == MOVEMENT_HISTORY_CAP {
            self.movement_history.pop_front();
        }
        self.movement_history.push_back(region.center());

        if self.movement_history.len() < MOVEMENT_MIN_SAMPLES {
            return false;
        }

        let (var_x, var_y) = axis_variance(&self.movement_history);
        var_x > self.config.movement_variance_threshold
            || var_y > self.config.movement_variance_threshold
    }
}

/// Eye aspect ratio over the six canonical contour points:
/// `(‖p2−p6‖ + ‖p3−p5‖) / (2·‖p1−p4‖)`.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let a = eye[1].distance(&eye[5]);
    let b = eye[2].distance(&eye[4]);
    let c = eye[0].distance(&eye[3]);

    let ear = (a + b) / (2.0 * c);
    if ear.is_finite() {
        ear
    } else {
        // Degenerate landmarks (zero-width eye): indeterminate, report open.
        0.3
    }
}

/// Population variance of the stored centre positions, per axis.
fn axis_variance(points: &VecDeque<Point>) -> (f64, f64) {
    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let (ss_x, ss_y) = points.iter().fold((0.0f64, 0.0f64), |(sx, sy), p| {
        let dx = p.x as f64 - mean_x;
        let dy = p.y as f64 - mean_y;
        (sx + dx * dx, sy + dy * dy)
    });
    (ss_x / n, ss_y / n)
}

/// Clamp the face region to the frame. Returns `(x0, y0, x1, y1)` with
/// exclusive upper bounds, or `None` for an empty crop.
fn crop_bounds(frame: &RgbImage, region: Region) -> Option<(u32, u32, u32, u32)> {
    let x0 = region.left.min(frame.width());
    let y0 = region.top.min(frame.height());
    let x1 = region.right.min(frame.width());
    let y1 = region.bottom.min(frame.height());
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0, y0, x1, y1))
}

/// Sharpness check: variance of the 3×3 Laplacian response over the
/// grayscale face crop must exceed the threshold.
fn texture_check(frame: &RgbImage, region: Region, threshold: f64) -> bool {
    let Some((x0, y0, x1, y1)) = crop_bounds(frame, region) else {
        return false;
    };
    let (w, h) = ((x1 - x0) as usize, (y1 - y0) as usize);
    if w < 3 || h < 3 {
        return false;
    }

    // Grayscale with the BT.601 weights used by the detection pipeline.
    let mut gray = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let p = frame.get_pixel(x0 + x as u32, y0 + y as u32);
            gray[y * w + x] =
                0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64;
        }
    }

    // Laplacian (4-neighbour kernel) over interior pixels.
    let n = ((w - 2) * (h - 2)) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = gray[(y - 1) * w + x]
                + gray[(y + 1) * w + x]
                + gray[y * w + x - 1]
                + gray[y * w + x + 1]
                - 4.0 * gray[y * w + x];
            sum += lap;
            sum_sq += lap * lap;
        }
    }
    let mean = sum / n;
    let variance = sum_sq / n - mean * mean;

    variance > threshold
}

/// Skin-tone check: fraction of crop pixels inside the fixed HSV skin
/// range (H ≤ 40°, S ≥ 20/255, V ≥ 70/255) must exceed the threshold.
fn color_check(frame: &RgbImage, region: Region, threshold: f64) -> bool {
    let Some((x0, y0, x1, y1)) = crop_bounds(frame, region) else {
        return false;
    };

    let total = ((x1 - x0) * (y1 - y0)) as f64;
    let mut skin = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            let p = frame.get_pixel(x, y);
            let (h_deg, s, v) = rgb_to_hsv(p.0[0], p.0[1], p.0[2]);
            if h_deg <= 40.0 && s >= 20.0 / 255.0 && v >= 70.0 / 255.0 {
                skin += 1;
            }
        }
    }

    skin as f64 / total > threshold
}

/// RGB → HSV with hue in degrees [0, 360) and s/v in [0, 1].
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        let h = 60.0 * ((g - b) / delta);
        if h < 0.0 {
            h + 360.0
        } else {
            h
        }
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eye contour with a chosen aspect ratio: horizontal span 1.0, both
    /// lid pairs at vertical distance `ear`.
    fn eye(ear: f32) -> [Point; 6] {
        [
            Point::new(0.0, 0.0),
            Point::new(0.3, ear / 2.0),
            Point::new(0.6, ear / 2.0),
            Point::new(1.0, 0.0),
            Point::new(0.6, -ear / 2.0),
            Point::new(0.3, -ear / 2.0),
        ]
    }

    fn landmarks(ear: f32) -> EyeLandmarks {
        EyeLandmarks {
            left_eye: eye(ear),
            right_eye: eye(ear),
        }
    }

    fn flat_frame(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }

    fn full_region(frame: &RgbImage) -> Region {
        Region::new(0, frame.width(), frame.height(), 0)
    }

    fn blink_only_config() -> LivenessConfig {
        LivenessConfig {
            movement_detection: false,
            blink_detection: true,
            ..LivenessConfig::default()
        }
    }

    fn feed_ears(ev: &mut LivenessEvaluator, frame: &RgbImage, ears: &[f32]) {
        for &e in ears {
            ev.evaluate(frame, full_region(frame), Some(&landmarks(e)));
        }
    }

    #[test]
    fn ear_formula_matches_geometry() {
        let e = eye(0.2);
        assert!((eye_aspect_ratio(&e) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn degenerate_eye_reports_open() {
        let collapsed = [Point::new(0.0, 0.0); 6];
        assert_eq!(eye_aspect_ratio(&collapsed), 0.3);
    }

    #[test]
    fn full_blink_cycle_counts_once() {
        let frame = flat_frame(8, 8, [0, 0, 255]);
        let mut ev = LivenessEvaluator::new(blink_only_config());
        // Two consecutive frames below threshold, then reopen.
        feed_ears(&mut ev, &frame, &[0.3, 0.2, 0.18, 0.3]);
        assert_eq!(ev.total_blinks(), 1);
    }

    #[test]
    fn single_closed_frame_is_not_a_blink() {
        let frame = flat_frame(8, 8, [0, 0, 255]);
        let mut ev = LivenessEvaluator::new(blink_only_config());
        feed_ears(&mut ev, &frame, &[0.3, 0.2, 0.3]);
        assert_eq!(ev.total_blinks(), 0);
    }

    #[test]
    fn sustained_closed_eye_is_not_a_blink() {
        let frame = flat_frame(8, 8, [0, 0, 255]);
        let mut ev = LivenessEvaluator::new(blink_only_config());
        feed_ears(&mut ev, &frame, &[0.2; 20]);
        // Never reopened — no completed cycle.
        assert_eq!(ev.total_blinks(), 0);
    }

    #[test]
    fn two_separate_blinks_count_twice() {
        let frame = flat_frame(8, 8, [0, 0, 255]);
        let mut ev = LivenessEvaluator::new(blink_only_config());
        feed_ears(&mut ev, &frame, &[0.3, 0.2, 0.2, 0.3, 0.2, 0.2, 0.2, 0.3]);
        assert_eq!(ev.total_blinks(), 2);
    }

    #[test]
    fn missing_landmarks_leave_blink_state_untouched() {
        let frame = flat_frame(8, 8, [0, 0, 255]);
        let mut ev = LivenessEvaluator::new(blink_only_config());
        feed_ears(&mut ev, &frame, &[0.3, 0.2, 0.2]);
        // A frame without landmarks must not act as a reopen edge.
        ev.evaluate(&frame, full_region(&frame), None);
        feed_ears(&mut ev, &frame, &[0.3]);
        assert_eq!(ev.total_blinks(), 1);
    }

    #[test]
    fn texture_passes_on_sharp_crop() {
        let frame = checkerboard(32, 32);
        assert!(texture_check(&frame, full_region(&frame), 100.0));
    }

    #[test]
    fn texture_fails_on_flat_crop() {
        let frame = flat_frame(32, 32, [128, 128, 128]);
        assert!(!texture_check(&frame, full_region(&frame), 100.0));
    }

    #[test]
    fn texture_fails_on_empty_crop() {
        let frame = flat_frame(32, 32, [128, 128, 128]);
        // Region entirely outside the frame.
        assert!(!texture_check(&frame, Region::new(40, 60, 60, 40), 100.0));
    }

    #[test]
    fn color_passes_on_skin_tones() {
        // H ≈ 16°, S ≈ 0.55, V ≈ 0.78 — inside the skin range.
        let frame = flat_frame(16, 16, [200, 120, 90]);
        assert!(color_check(&frame, full_region(&frame), 0.30));
    }

    #[test]
    fn color_fails_on_blue_cast() {
        let frame = flat_frame(16, 16, [40, 60, 220]);
        assert!(!color_check(&frame, full_region(&frame), 0.30));
    }

    #[test]
    fn movement_fails_closed_below_min_samples() {
        let frame = flat_frame(64, 64, [200, 120, 90]);
        let mut ev = LivenessEvaluator::new(LivenessConfig {
            blink_detection: false,
            ..LivenessConfig::default()
        });
        // Four wildly moving frames — still below the 5-sample minimum.
        for i in 0..4u32 {
            let off = i * 30;
            let v = ev.evaluate(&frame, Region::new(off, 20 + off, 20 + off, off), None);
            assert!(!v.checks.movement);
        }
    }

    #[test]
    fn static_centres_fail_movement() {
        let frame = flat_frame(64, 64, [200, 120, 90]);
        let mut ev = LivenessEvaluator::new(LivenessConfig {
            blink_detection: false,
            ..LivenessConfig::default()
        });
        let mut last = LivenessChecks::default();
        for _ in 0..8 {
            last = ev
                .evaluate(&frame, Region::new(10, 30, 30, 10), None)
                .checks;
        }
        assert!(!last.movement);
    }

    #[test]
    fn moving_centres_pass_movement() {
        let frame = flat_frame(64, 64, [200, 120, 90]);
        let mut ev = LivenessEvaluator::new(LivenessConfig {
            blink_detection: false,
            ..LivenessConfig::default()
        });
        let mut last = LivenessChecks::default();
        for i in 0..8u32 {
            let off = (i % 2) * 20;
            last = ev
                .evaluate(&frame, Region::new(10, 30 + off, 30, 10 + off), None)
                .checks;
        }
        assert!(last.movement);
    }

    #[test]
    fn two_of_four_checks_is_live_boundary() {
        // Sharp, skin-toned crop; movement fails closed (fresh history),
        // blink disabled. Exactly texture + color pass → confidence 50.
        let frame = RgbImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([230, 140, 100])
            } else {
                image::Rgb([120, 60, 40])
            }
        });
        let mut ev = LivenessEvaluator::new(LivenessConfig {
            blink_detection: false,
            ..LivenessConfig::default()
        });
        let v = ev.evaluate(&frame, full_region(&frame), None);
        assert!(v.checks.texture);
        assert!(v.checks.color);
        assert!(!v.checks.movement);
        assert!(!v.checks.blink);
        assert_eq!(v.confidence, 50.0);
        assert!(v.is_live);
    }

    #[test]
    fn all_checks_failing_is_not_live() {
        let frame = flat_frame(32, 32, [40, 60, 220]);
        let mut ev = LivenessEvaluator::new(LivenessConfig::default());
        let v = ev.evaluate(&frame, full_region(&frame), None);
        assert_eq!(v.confidence, 0.0);
        assert!(!v.is_live);
    }

    #[test]
    fn reset_clears_session_state() {
        let frame = flat_frame(64, 64, [200, 120, 90]);
        let mut ev = LivenessEvaluator::new(LivenessConfig::default());
        feed_ears(&mut ev, &frame, &[0.3, 0.2, 0.2, 0.3]);
        assert_eq!(ev.total_blinks(), 1);

        ev.reset();
        assert_eq!(ev.total_blinks(), 0);
        // Movement history is gone: next frame is sample #1, fails closed.
        let v = ev.evaluate(&frame, Region::new(10, 30, 30, 10), None);
        assert!(!v.checks.movement);
        assert!(!v.checks.blink);
    }
}
