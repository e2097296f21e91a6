use std::num::NonZeroU32;

/// One planned slice of the source audio, in sample indices.
///
/// `end` is not clamped: the last segment usually reaches past the end of
/// the audio and the consumer truncates it when slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedSegment {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl PlannedSegment {
    /// Sample range of this segment clamped to `len` samples.
    pub fn clamp(&self, len: usize) -> std::ops::Range<usize> {
        self.start.min(len)..self.end.min(len)
    }
}

/// Number of fixed-length segments needed to cover `duration_secs`.
///
/// Always `floor(duration / segment_length) + 1`, so a duration that is an
/// exact multiple of the segment length gets one trailing empty segment.
pub fn segment_count(duration_secs: f64, segment_length_secs: NonZeroU32) -> usize {
    (duration_secs / f64::from(segment_length_secs.get())).floor() as usize + 1
}

pub fn plan_segments(
    duration_secs: f64,
    segment_length_secs: NonZeroU32,
    sample_rate: u32,
) -> Vec<PlannedSegment> {
    let samples_per_segment = segment_length_secs.get() as usize * sample_rate as usize;

    (0..segment_count(duration_secs, segment_length_secs))
        .map(|index| PlannedSegment {
            index,
            start: index * samples_per_segment,
            end: (index + 1) * samples_per_segment,
        })
        .collect()
}
