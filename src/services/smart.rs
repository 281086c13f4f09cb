//! Smart polling: sub-sample events by proximity to game time so far-out
//! games don't burn detector cycles every poll.

use chrono::{DateTime, Utc};

use crate::api::Event;

/// Polling priority. The numeric value is the cycle period: an event is
/// polled on cycles where `cycle_index % period == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPriority {
    /// Within 2 hours: poll every cycle.
    High = 1,
    /// Within 12 hours: poll every other cycle.
    Medium = 2,
    /// Beyond 12 hours: poll every 4th cycle.
    Low = 4,
}

impl PollPriority {
    pub fn period(&self) -> u64 {
        *self as u64
    }
}

/// Classify an event's polling priority from its time to commence.
/// Unparseable commence times fail safe to high priority.
pub fn classify_event(event: &Event, now: DateTime<Utc>) -> PollPriority {
    let Ok(commence) = DateTime::parse_from_rfc3339(&event.commence_time) else {
        return PollPriority::High;
    };
    let hours_until = (commence.with_timezone(&Utc) - now).num_seconds() as f64 / 3600.0;

    if hours_until <= 2.0 {
        PollPriority::High
    } else if hours_until <= 12.0 {
        PollPriority::Medium
    } else {
        PollPriority::Low
    }
}

pub fn should_poll_event(event: &Event, cycle_index: u64, now: DateTime<Utc>) -> bool {
    cycle_index % classify_event(event, now).period() == 0
}

/// Drop events whose priority tier is not due on this cycle.
pub fn filter_events_for_cycle(events: Vec<Event>, cycle_index: u64) -> Vec<Event> {
    let now = Utc::now();
    let total = events.len();
    let included: Vec<Event> = events
        .into_iter()
        .filter(|event| should_poll_event(event, cycle_index, now))
        .collect();

    let skipped = total - included.len();
    if skipped > 0 {
        tracing::info!(included = included.len(), skipped, "smart poll filtered");
    }
    included
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(hours_from_now: f64) -> Event {
        let commence = Utc::now() + Duration::seconds((hours_from_now * 3600.0) as i64);
        Event {
            id: "test_event".to_string(),
            sport_key: "basketball_nba".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Celtics".to_string(),
            commence_time: commence.to_rfc3339(),
            bookmakers: vec![],
        }
    }

    #[test]
    fn test_classify_by_proximity() {
        let now = Utc::now();
        assert_eq!(classify_event(&event(1.0), now), PollPriority::High);
        assert_eq!(classify_event(&event(6.0), now), PollPriority::Medium);
        assert_eq!(classify_event(&event(24.0), now), PollPriority::Low);
    }

    #[test]
    fn test_unparseable_commence_is_high_priority() {
        let mut evt = event(24.0);
        evt.commence_time = "not-a-timestamp".to_string();
        assert_eq!(classify_event(&evt, Utc::now()), PollPriority::High);
    }

    #[test]
    fn test_filter_cycle_1_high_only() {
        // cycle 1: HIGH (1%1=0), MEDIUM (1%2=1 no), LOW (1%4=1 no)
        let events = vec![event(1.0), event(6.0), event(24.0)];
        assert_eq!(filter_events_for_cycle(events, 1).len(), 1);
    }

    #[test]
    fn test_filter_cycle_2_high_and_medium() {
        let events = vec![event(1.0), event(6.0), event(24.0)];
        assert_eq!(filter_events_for_cycle(events, 2).len(), 2);
    }

    #[test]
    fn test_filter_cycle_4_everything() {
        let events = vec![event(1.0), event(6.0), event(24.0)];
        assert_eq!(filter_events_for_cycle(events, 4).len(), 3);
    }
}
