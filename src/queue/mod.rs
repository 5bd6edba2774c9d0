//! Queue estimator: projected completion times per request type.
//!
//! Each request type has its own FIFO queue (its pending requests). A new
//! request's estimated completion is `now` advanced by
//! `pending_count × processing_minutes` of working time on the
//! [`WorkingCalendar`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::request::RequestType;

pub mod calendar;

pub use calendar::{CalendarConfig, WorkingCalendar};

/// Snapshot of one queue, as shown on the admin queue-management view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueDetail {
    pub request_type: RequestType,
    pub queue_length: u64,
    pub estimated_completion: DateTime<Utc>,
}

/// Computes estimated completion times from queue lengths.
///
/// Stateless apart from reading the injected clock.
#[derive(Clone)]
pub struct QueueEstimator {
    calendar: WorkingCalendar,
    clock: Arc<dyn Clock>,
}

impl Default for QueueEstimator {
    fn default() -> Self {
        Self::new(WorkingCalendar::default(), Arc::new(SystemClock))
    }
}

impl QueueEstimator {
    pub fn new(calendar: WorkingCalendar, clock: Arc<dyn Clock>) -> Self {
        Self { calendar, clock }
    }

    pub fn calendar(&self) -> &WorkingCalendar {
        &self.calendar
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Estimated completion for a request joining a queue of `pending_count`,
    /// starting from the clock's current time.
    pub fn estimate_completion(
        &self,
        request_type: &RequestType,
        pending_count: u64,
    ) -> DateTime<Utc> {
        self.estimate_from(self.clock.now(), request_type, pending_count)
    }

    /// Same as [`estimate_completion`](Self::estimate_completion) from an explicit start.
    pub fn estimate_from(
        &self,
        now: DateTime<Utc>,
        request_type: &RequestType,
        pending_count: u64,
    ) -> DateTime<Utc> {
        let total_minutes =
            pending_count.saturating_mul(u64::from(request_type.processing_minutes()));
        self.calendar.advance(now, total_minutes)
    }

    /// Build the detail row for one queue.
    pub fn detail(&self, request_type: RequestType, queue_length: u64) -> QueueDetail {
        let estimated_completion = self.estimate_completion(&request_type, queue_length);
        QueueDetail {
            request_type,
            queue_length,
            estimated_completion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Duration, TimeZone};

    fn estimator_at(now: DateTime<Utc>) -> QueueEstimator {
        QueueEstimator::new(WorkingCalendar::default(), Arc::new(FixedClock::new(now)))
    }

    #[test]
    fn test_empty_queue_returns_now_for_every_type() {
        // Sunday evening: outside the window, but nothing to wait for.
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 20, 13, 5).unwrap();
        let estimator = estimator_at(now);
        for request_type in RequestType::known()
            .into_iter()
            .chain([RequestType::Other("Housing".to_string())])
        {
            assert_eq!(estimator.estimate_completion(&request_type, 0), now);
        }
    }

    #[test]
    fn test_single_transcript_at_opening() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let estimator = estimator_at(now);
        assert_eq!(
            estimator.estimate_completion(&RequestType::Transcript, 1),
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_processing_minutes_scale_with_queue() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let estimator = estimator_at(now);
        assert_eq!(
            estimator.estimate_completion(&RequestType::EnrollmentLetter, 3),
            now + Duration::minutes(60)
        );
        assert_eq!(
            estimator.estimate_completion(&RequestType::GradeAppeal, 2),
            now + Duration::minutes(60)
        );
        assert_eq!(
            estimator.estimate_completion(&RequestType::Other("Locker".to_string()), 4),
            now + Duration::minutes(60)
        );
    }

    #[test]
    fn test_overflow_into_next_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 16, 50, 0).unwrap();
        let estimator = estimator_at(now);
        assert_eq!(
            estimator.estimate_completion(&RequestType::Transcript, 1),
            Utc.with_ymd_and_hms(2024, 6, 4, 9, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_detail_uses_queue_length() {
        let now = Utc.with_ymd_and_hms(2024, 6, 7, 16, 55, 0).unwrap();
        let estimator = estimator_at(now);
        let detail = estimator.detail(RequestType::EnrollmentLetter, 1);
        assert_eq!(detail.queue_length, 1);
        assert_eq!(
            detail.estimated_completion,
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 15, 0).unwrap()
        );
    }
}
