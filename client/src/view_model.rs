//! Presentational queue metrics derived from a ticket and the wall clock.
//!
//! Nothing here is persisted. Time comes from the [`Clock`] environment
//! trait so every derivation is reproducible under test.

use crate::session::{Ticket, TicketStatus};
use chrono::{DateTime, Duration, Utc};
use queuepass_core::Clock;
use std::sync::Arc;

/// Service time assumed per person ahead.
pub const MINUTES_PER_PERSON: u32 = 2;

/// Whether the holder must proceed to the checkpoint now.
///
/// CALLED always is, terminal tickets never are. Otherwise the server's
/// position decides, and an absent position counts as 0 ("at the front").
#[must_use]
pub fn is_being_called(status: TicketStatus, queue_position: Option<u32>) -> bool {
    match status {
        TicketStatus::Called => true,
        TicketStatus::Completed | TicketStatus::Cancelled => false,
        TicketStatus::Waiting | TicketStatus::Active => queue_position.unwrap_or(0) == 0,
    }
}

/// People in front of a 1-based position.
#[must_use]
pub fn people_ahead(queue_position: Option<u32>) -> u32 {
    queue_position.unwrap_or(0).saturating_sub(1)
}

/// `"{h}h {m}m"` from an hour up, `"{m}m"` below.
#[must_use]
pub fn format_wait_time(minutes: u32) -> String {
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

/// One reading of the queue card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TicketMetrics {
    /// Whole minutes since mount (frozen while paused)
    pub elapsed_minutes: u32,
    /// People still ahead by the countdown
    pub people_ahead: u32,
    /// Countdown minutes left
    pub remaining_minutes: u32,
    /// Countdown length
    pub total_wait_minutes: u32,
    /// 0 to 100
    pub progress_percentage: f64,
    /// Mount time plus the countdown length
    pub expected_call_time: DateTime<Utc>,
    /// See [`is_being_called`]
    pub is_being_called: bool,
    /// Whether the countdown is frozen
    pub is_paused: bool,
}

/// Countdown state for the ticket currently on screen.
pub struct TicketViewModel {
    clock: Arc<dyn Clock>,
    ticket: Ticket,
    mounted_at: DateTime<Utc>,
    minutes_per_person: u32,
    frozen_elapsed: Option<u32>,
}

impl TicketViewModel {
    /// Start the countdown for `ticket` at the clock's current time.
    #[must_use]
    pub fn mount(ticket: Ticket, clock: Arc<dyn Clock>) -> Self {
        let mounted_at = clock.now();
        Self {
            clock,
            ticket,
            mounted_at,
            minutes_per_person: MINUTES_PER_PERSON,
            frozen_elapsed: None,
        }
    }

    /// Override the per-person service time.
    #[must_use]
    pub const fn with_minutes_per_person(mut self, minutes: u32) -> Self {
        self.minutes_per_person = minutes;
        self
    }

    /// The ticket the metrics are derived from.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// When the countdown started.
    #[must_use]
    pub const fn mounted_at(&self) -> DateTime<Utc> {
        self.mounted_at
    }

    /// Replace the ticket after a store update. The countdown keeps running
    /// from the original mount time.
    pub fn sync_ticket(&mut self, ticket: Ticket) {
        self.ticket = ticket;
    }

    /// Freeze the elapsed time at its current value.
    pub fn pause(&mut self) {
        if self.frozen_elapsed.is_none() {
            self.frozen_elapsed = Some(self.live_elapsed());
        }
    }

    /// Return to the live wall-clock elapsed time.
    pub fn resume(&mut self) {
        self.frozen_elapsed = None;
    }

    /// Whether the countdown is frozen.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.frozen_elapsed.is_some()
    }

    /// Wait estimate reported by the server, formatted.
    #[must_use]
    pub fn estimated_wait(&self) -> String {
        format_wait_time(self.ticket.waiting_time.unwrap_or(0))
    }

    /// Derive the metrics at the clock's current time.
    #[must_use]
    pub fn metrics(&self) -> TicketMetrics {
        let elapsed = self.frozen_elapsed.unwrap_or_else(|| self.live_elapsed());
        let initial_ahead = people_ahead(self.ticket.queue_position);
        let total_wait = initial_ahead.saturating_mul(self.minutes_per_person);

        let people_passed = elapsed.checked_div(self.minutes_per_person).unwrap_or(0);
        let progress = if total_wait == 0 {
            100.0
        } else {
            (f64::from(elapsed) * 100.0 / f64::from(total_wait)).min(100.0)
        };

        TicketMetrics {
            elapsed_minutes: elapsed,
            people_ahead: initial_ahead.saturating_sub(people_passed),
            remaining_minutes: total_wait.saturating_sub(elapsed),
            total_wait_minutes: total_wait,
            progress_percentage: progress,
            expected_call_time: self.mounted_at + Duration::minutes(i64::from(total_wait)),
            is_being_called: is_being_called(self.ticket.status, self.ticket.queue_position),
            is_paused: self.is_paused(),
        }
    }

    fn live_elapsed(&self) -> u32 {
        let minutes = (self.clock.now() - self.mounted_at).num_minutes().max(0);
        u32::try_from(minutes).unwrap_or(u32::MAX)
    }
}

impl std::fmt::Debug for TicketViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketViewModel")
            .field("ticket", &self.ticket)
            .field("mounted_at", &self.mounted_at)
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}
