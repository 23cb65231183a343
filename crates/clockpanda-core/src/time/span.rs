//! Half-open time intervals and the overlap geometry used by scoring.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open interval `[start, end)` in UTC.
///
/// `start <= end` is checked at construction; callers that accept input from
/// outside should use [`TimeSpan::try_new`], which also rejects empty spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    /// Create a span. Panics if `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "time span ends ({end}) before it starts ({start})");
        Self { start, end }
    }

    /// Create a non-empty span, rejecting `end <= start`.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `instant` lies in `[start, end)`.
    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether `other` lies entirely inside this span.
    pub fn contains(&self, other: &TimeSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn overlap_minutes(&self, other: &TimeSpan) -> i64 {
        compute_overlap_in_minutes(self, other)
    }

    pub fn outside_minutes(&self, range: &TimeSpan) -> i64 {
        compute_outside_range_in_minutes(self, range)
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Minutes shared by `a` and `b`; zero when they are disjoint or touch.
pub fn compute_overlap_in_minutes(a: &TimeSpan, b: &TimeSpan) -> i64 {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    if end <= start {
        return 0;
    }
    (end - start).num_minutes()
}

/// Minutes of `span` that fall before `range.start` plus those after `range.end`.
///
/// Zero-length spans always yield zero.
pub fn compute_outside_range_in_minutes(span: &TimeSpan, range: &TimeSpan) -> i64 {
    let before = (span.end.min(range.start) - span.start).max(Duration::zero());
    let after = (span.end - span.start.max(range.end)).max(Duration::zero());
    (before + after).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 21, h, m, 0).unwrap()
    }

    #[test]
    fn overlap_of_partially_overlapping_spans() {
        let a = TimeSpan::new(at(0, 0), at(2, 0));
        let b = TimeSpan::new(at(1, 45), at(3, 45));
        assert_eq!(compute_overlap_in_minutes(&a, &b), 15);
        assert_eq!(compute_overlap_in_minutes(&b, &a), 15);
    }

    #[test]
    fn touching_spans_do_not_overlap() {
        let a = TimeSpan::new(at(9, 0), at(10, 0));
        let b = TimeSpan::new(at(10, 0), at(11, 0));
        assert_eq!(compute_overlap_in_minutes(&a, &b), 0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn outside_range_counts_both_sides() {
        let range = TimeSpan::new(at(9, 0), at(17, 0));
        let span = TimeSpan::new(at(8, 0), at(18, 30));
        assert_eq!(compute_outside_range_in_minutes(&span, &range), 150);
    }

    #[test]
    fn outside_range_of_disjoint_span_is_its_duration() {
        let range = TimeSpan::new(at(9, 0), at(17, 0));
        let span = TimeSpan::new(at(18, 0), at(20, 0));
        assert_eq!(compute_outside_range_in_minutes(&span, &range), 120);
        let early = TimeSpan::new(at(5, 0), at(6, 15));
        assert_eq!(compute_outside_range_in_minutes(&early, &range), 75);
    }

    #[test]
    fn zero_length_span_is_never_outside() {
        let range = TimeSpan::new(at(9, 0), at(17, 0));
        let empty = TimeSpan::new(at(20, 0), at(20, 0));
        assert_eq!(compute_outside_range_in_minutes(&empty, &range), 0);
    }

    #[test]
    fn try_new_rejects_empty_and_inverted_spans() {
        assert!(TimeSpan::try_new(at(9, 0), at(9, 0)).is_err());
        assert!(TimeSpan::try_new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeSpan::try_new(at(9, 0), at(9, 15)).is_ok());
    }

    #[test]
    #[should_panic]
    fn new_panics_on_inverted_span() {
        let _ = TimeSpan::new(at(10, 0), at(9, 0));
    }

    fn span_strategy() -> impl Strategy<Value = TimeSpan> {
        spans_with_length(0..2_000)
    }

    fn non_empty_span_strategy() -> impl Strategy<Value = TimeSpan> {
        spans_with_length(1..2_000)
    }

    fn spans_with_length(len: std::ops::Range<i64>) -> impl Strategy<Value = TimeSpan> {
        (0i64..10_000, len).prop_map(|(start, len)| {
            let base = at(0, 0);
            TimeSpan::new(
                base + Duration::minutes(start),
                base + Duration::minutes(start + len),
            )
        })
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in span_strategy(), b in span_strategy()) {
            prop_assert_eq!(
                compute_overlap_in_minutes(&a, &b),
                compute_overlap_in_minutes(&b, &a)
            );
        }

        #[test]
        fn overlap_is_zero_iff_disjoint(a in non_empty_span_strategy(), b in non_empty_span_strategy()) {
            let disjoint = a.end <= b.start || b.end <= a.start;
            prop_assert_eq!(compute_overlap_in_minutes(&a, &b) == 0, disjoint);
        }

        #[test]
        fn outside_is_zero_iff_contained(a in non_empty_span_strategy(), r in non_empty_span_strategy()) {
            if r.contains(&a) {
                prop_assert_eq!(compute_outside_range_in_minutes(&a, &r), 0);
            } else {
                prop_assert!(compute_outside_range_in_minutes(&a, &r) > 0);
            }
        }

        #[test]
        fn outside_is_full_duration_iff_disjoint(a in non_empty_span_strategy(), r in non_empty_span_strategy()) {
            let disjoint = a.end <= r.start || r.end <= a.start;
            let outside = compute_outside_range_in_minutes(&a, &r);
            if disjoint {
                prop_assert_eq!(outside, a.duration_minutes());
            } else {
                prop_assert!(outside < a.duration_minutes());
            }
        }
    }
}
