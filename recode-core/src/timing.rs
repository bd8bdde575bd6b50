//! Timestamp reconstruction.
//!
//! [`SampleClock`] re-times audio against samples still buffered inside the
//! engine. [`TimingTracker`] carries the running video timestamps across
//! decoder and encoder reordering.

use crate::codec::{FrameTimestampTagger, PictureType};
use crate::format::Rational;
use crate::picture::Picture;
use crate::unit::MediaUnit;

/// Duration of `samples` sample frames at `rate` Hz, in microseconds.
pub fn samples_to_us(samples: u64, rate: u32) -> i64 {
    if rate == 0 {
        return 0;
    }
    (samples as i128 * 1_000_000 / rate as i128) as i64
}

// ============================================================================
// Audio
// ============================================================================

/// Audio output clock.
///
/// Each input unit rebases the clock backwards by the audio still waiting
/// in the engine, then every emitted frame advances it by its own
/// duration, so consecutive outputs are gapless.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleClock {
    dts: i64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebase(&mut self, input_dts: i64, buffered_us: i64) {
        self.dts = input_dts - buffered_us;
    }

    /// Timestamp and length of the next frame of `samples` at `rate` Hz.
    pub fn advance(&mut self, samples: u64, rate: u32) -> (i64, i64) {
        let dts = self.dts;
        let length = samples_to_us(samples, rate);
        self.dts += length;
        (dts, length)
    }

    pub fn dts(&self) -> i64 {
        self.dts
    }
}

// ============================================================================
// Video
// ============================================================================

/// Timestamps chosen for one encoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTiming {
    pub pts: i64,
    pub dts: i64,
    pub length: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingTracker {
    input_pts: i64,
    output_pts: i64,
    last_ref_pts: i64,
    buggy_pts_detect: i64,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the pts of the unit about to be decoded.
    pub fn begin_unit(&mut self, pts: i64) {
        self.input_pts = pts;
    }

    pub fn input_pts(&self) -> i64 {
        self.input_pts
    }

    pub fn output_pts(&self) -> i64 {
        self.output_pts
    }

    /// Adopt the decoded picture's pts when it has one, otherwise keep
    /// interpolating.
    pub fn observe_picture(&mut self, pts: i64) {
        if pts > 0 {
            self.output_pts = pts;
        }
    }

    /// Pts handed to the encoder with the next picture.
    pub fn encode_pts(&self, tolerates_nonmonotonic_pts: bool) -> i64 {
        if tolerates_nonmonotonic_pts {
            self.output_pts
        } else {
            0
        }
    }

    /// Move the running output pts one picture forward. Each repeated
    /// field adds half a frame interval.
    pub fn advance(&mut self, frame_rate: Option<Rational>, repeat_pict: u32) {
        if let Some(rate) = frame_rate.filter(Rational::is_valid) {
            let step = 1_000_000i128 * (2 + repeat_pict as i128) * rate.den as i128
                / (2 * rate.num as i128);
            self.output_pts += step as i64;
        }
    }

    /// Pick pts/dts for an encoded picture.
    ///
    /// A coded pts of 0, or the same one seen last time, means the encoder
    /// did not update it; the input unit's dts is used instead. Otherwise
    /// reference pictures from a reordering encoder are decoded at the pts
    /// of the previous reference picture.
    pub fn stamp(
        &mut self,
        coded_pts: i64,
        picture_type: PictureType,
        encoder_delay: u32,
        input: &MediaUnit,
    ) -> UnitTiming {
        if coded_pts == 0 || coded_pts == self.buggy_pts_detect {
            return UnitTiming {
                pts: input.dts,
                dts: input.dts,
                length: input.length,
            };
        }

        self.buggy_pts_detect = coded_pts;
        let pts = coded_pts;
        let dts = if encoder_delay == 0 || !picture_type.is_reference() {
            pts
        } else {
            let dts = if self.last_ref_pts != 0 {
                self.last_ref_pts
            } else {
                pts
            };
            self.last_ref_pts = pts;
            dts
        };

        UnitTiming {
            pts,
            dts,
            length: input.length,
        }
    }
}

impl FrameTimestampTagger for TimingTracker {
    fn tag(&self, picture: &mut Picture) {
        picture.pts = self.input_pts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(dts: i64) -> MediaUnit {
        MediaUnit::new(vec![0u8; 4], dts, dts, 40_000)
    }

    #[test]
    fn sample_clock_is_gapless() {
        let mut clock = SampleClock::new();
        // 80 samples at 8 kHz still buffered
        clock.rebase(1_000_000, samples_to_us(80, 8000));
        assert_eq!(clock.dts(), 990_000);
        assert_eq!(clock.advance(160, 8000), (990_000, 20_000));
        assert_eq!(clock.advance(160, 8000), (1_010_000, 20_000));
    }

    #[test]
    fn output_pts_interpolates_with_repeat_fields() {
        let mut tracker = TimingTracker::new();
        tracker.observe_picture(1_000_000);
        tracker.advance(Some(Rational::new(25, 1)), 0);
        assert_eq!(tracker.output_pts(), 1_040_000);
        tracker.advance(Some(Rational::new(25, 1)), 1);
        assert_eq!(tracker.output_pts(), 1_100_000);
        // non-positive pts keeps the interpolated value
        tracker.observe_picture(0);
        assert_eq!(tracker.output_pts(), 1_100_000);
        tracker.advance(None, 0);
        assert_eq!(tracker.output_pts(), 1_100_000);
    }

    #[test]
    fn encode_pts_depends_on_capability() {
        let mut tracker = TimingTracker::new();
        tracker.observe_picture(40_000);
        assert_eq!(tracker.encode_pts(true), 40_000);
        assert_eq!(tracker.encode_pts(false), 0);
    }

    #[test]
    fn reference_pictures_reorder_dts() {
        let mut tracker = TimingTracker::new();
        // I: no previous reference, dts falls back to pts
        let i = tracker.stamp(120_000, PictureType::I, 1, &input(0));
        assert_eq!((i.pts, i.dts), (120_000, 120_000));
        // B: decoded at its own pts
        let b = tracker.stamp(40_000, PictureType::B, 1, &input(40_000));
        assert_eq!((b.pts, b.dts), (40_000, 40_000));
        // P: decoded at the previous reference pts
        let p = tracker.stamp(240_000, PictureType::P, 1, &input(80_000));
        assert_eq!((p.pts, p.dts), (240_000, 120_000));
        assert_eq!(p.length, 40_000);
    }

    #[test]
    fn zero_delay_keeps_dts_equal_pts() {
        let mut tracker = TimingTracker::new();
        let p = tracker.stamp(80_000, PictureType::P, 0, &input(0));
        assert_eq!(p.dts, 80_000);
    }

    #[test]
    fn stale_coded_pts_falls_back_to_input() {
        let mut tracker = TimingTracker::new();
        tracker.stamp(80_000, PictureType::I, 0, &input(0));
        let repeated = tracker.stamp(80_000, PictureType::P, 0, &input(120_000));
        assert_eq!((repeated.pts, repeated.dts), (120_000, 120_000));
        let zero = tracker.stamp(0, PictureType::I, 0, &input(160_000));
        assert_eq!((zero.pts, zero.dts, zero.length), (160_000, 160_000, 40_000));
    }

    #[test]
    fn tagger_stamps_current_input_pts() {
        let mut tracker = TimingTracker::new();
        tracker.begin_unit(3_000);
        let mut picture = Picture::new(crate::picture::PixelLayout::Gray8, 2, 2);
        tracker.tag(&mut picture);
        assert_eq!(picture.pts, 3_000);
    }
}
