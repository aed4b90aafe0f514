use std::sync::Arc;

use serde::Serialize;

use super::models::{format_time, parse_time, CandidateSlot, ClassOption, Constraints, Day, Minute, Selection};
use crate::config::WalkingPolicy;
use crate::error::OptimizeError;
use crate::venues::VenueMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    Overlap,
    Unreachable,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictMessage {
    pub kind: ConflictKind,
    pub description: String,
}

/// A student's busy period, resolved to minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedInterval {
    pub name: String,
    pub day: Day,
    pub start: Minute,
    pub end: Minute,
}

/// Expands the request's custom blocks into one interval per day.
pub fn blocked_intervals(constraints: &Constraints) -> Result<Vec<BlockedInterval>, OptimizeError> {
    let mut intervals = Vec::new();
    for block in &constraints.blocked_times {
        let start = parse_time(&block.start_time)?;
        let end = parse_time(&block.end_time)?;
        if start >= end {
            return Err(OptimizeError::invalid(format!(
                "blocked time '{}' has an empty or reversed range",
                block.event_name
            )));
        }
        for &day in &block.days {
            intervals.push(BlockedInterval {
                name: block.event_name.clone(),
                day,
                start,
                end,
            });
        }
    }
    Ok(intervals)
}

/// True iff both slots are on the same day and their time ranges overlap.
#[inline]
pub fn conflicts(a: &CandidateSlot, b: &CandidateSlot) -> bool {
    a.day == b.day && a.start < b.end && b.start < a.end
}

/// Hard-constraint checks between candidate slots.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    venues: Option<Arc<VenueMap>>,
    walking: WalkingPolicy,
    blocked: Vec<BlockedInterval>,
}

impl ConflictDetector {
    pub fn new(venues: Option<Arc<VenueMap>>, walking: WalkingPolicy, blocked: Vec<BlockedInterval>) -> Self {
        Self {
            venues,
            walking,
            blocked,
        }
    }

    /// Overlap checks only.
    pub fn time_only() -> Self {
        Self {
            walking: WalkingPolicy {
                enabled: false,
                ..WalkingPolicy::default()
            },
            ..Self::default()
        }
    }

    /// Whether reachability between venues is being enforced.
    pub fn checks_walking(&self) -> bool {
        self.walking.enabled && self.venues.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Walking is enforced and may be dropped when it alone blocks every timetable.
    pub fn relaxable(&self) -> bool {
        self.checks_walking() && self.walking.relax_when_infeasible
    }

    /// Same detector with the walking rule switched off.
    pub fn without_walking(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.walking.enabled = false;
        relaxed
    }

    /// Walking time in minutes between two venues, `None` when unknown.
    fn travel_minutes(&self, a: &CandidateSlot, b: &CandidateSlot) -> Option<f64> {
        let venues = self.venues.as_ref()?;
        let distance = venues.distance(a.venue.as_deref()?, b.venue.as_deref()?)?;
        Some(distance / self.walking.speed_m_per_min + self.walking.buffer_min)
    }

    /// Same-day, non-overlapping lessons whose venues are too far apart for the gap between them.
    pub fn unreachable(&self, a: &CandidateSlot, b: &CandidateSlot) -> bool {
        if !self.checks_walking() || a.day != b.day || conflicts(a, b) {
            return false;
        }
        let (first, second) = if a.start <= b.start { (a, b) } else { (b, a) };
        let gap = f64::from(second.start - first.end);

        match self.travel_minutes(first, second) {
            Some(travel) => gap < travel && travel > self.walking.max_walk_min,
            None => false,
        }
    }

    #[inline]
    pub fn clashes(&self, a: &CandidateSlot, b: &CandidateSlot) -> bool {
        conflicts(a, b) || self.unreachable(a, b)
    }

    pub fn is_blocked(&self, slot: &CandidateSlot) -> bool {
        self.blocked
            .iter()
            .any(|b| b.day == slot.day && slot.start < b.end && b.start < slot.end)
    }

    /// An option can be chosen at all: nothing blocked, and its own meetings do not clash.
    pub fn admissible(&self, option: &ClassOption) -> bool {
        option.slots.iter().enumerate().all(|(i, slot)| {
            !self.is_blocked(slot) && option.slots[i + 1..].iter().all(|other| !self.clashes(slot, other))
        })
    }

    /// Checks `candidate` against every slot already in `partial`.
    pub fn is_extension_valid(&self, partial: &Selection, candidate: &CandidateSlot) -> bool {
        !self.is_blocked(candidate) && partial.slots().all(|placed| !self.clashes(placed, candidate))
    }

    /// Incremental check used by the search: every slot of `option` against the placed slots.
    pub(crate) fn fits(&self, placed: &[&CandidateSlot], option: &ClassOption) -> bool {
        option
            .slots
            .iter()
            .all(|slot| placed.iter().all(|p| !self.clashes(p, slot)))
    }

    /// Full re-validation of a selection, listing every violated hard constraint.
    pub fn detect_conflicts(&self, selection: &Selection) -> Vec<ConflictMessage> {
        let labelled: Vec<(String, &CandidateSlot)> = selection
            .choices()
            .iter()
            .flat_map(|c| {
                c.option
                    .slots
                    .iter()
                    .map(move |s| (format!("{} {} [{}]", c.module_code, c.lesson_type, s.class_no), s))
            })
            .collect();

        let mut messages = Vec::new();

        for (i, (label_a, a)) in labelled.iter().enumerate() {
            if let Some(block) = self
                .blocked
                .iter()
                .find(|b| b.day == a.day && a.start < b.end && b.start < a.end)
            {
                messages.push(ConflictMessage {
                    kind: ConflictKind::Blocked,
                    description: format!("{label_a} on {} overlaps blocked time '{}'", a.day, block.name),
                });
            }

            for (label_b, b) in &labelled[i + 1..] {
                if conflicts(a, b) {
                    messages.push(ConflictMessage {
                        kind: ConflictKind::Overlap,
                        description: format!(
                            "{label_a} and {label_b} overlap on {} {}-{}",
                            a.day,
                            format_time(a.start.max(b.start)),
                            format_time(a.end.min(b.end))
                        ),
                    });
                } else if self.unreachable(a, b) {
                    messages.push(ConflictMessage {
                        kind: ConflictKind::Unreachable,
                        description: format!("{label_a} and {label_b} are too far apart to walk on {}", a.day),
                    });
                }
            }
        }

        messages
    }

    /// True iff the selection violates no hard constraint.
    pub fn is_valid(&self, selection: &Selection) -> bool {
        let slots: Vec<&CandidateSlot> = selection.slots().collect();
        slots.iter().enumerate().all(|(i, a)| {
            !self.is_blocked(a) && slots[i + 1..].iter().all(|b| !self.clashes(a, b))
        })
    }
}
