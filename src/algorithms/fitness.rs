use super::models::{parse_time, CandidateSlot, ClassOption, Constraints, CostBreakdown, Day, Minute, Selection};
use crate::config::CostWeights;
use crate::error::OptimizeError;

/// Start times most classes use: 07:00-11:00 and 14:00-17:00 on the hour.
pub const COMMON_START_TIMES: [Minute; 9] = [420, 480, 540, 600, 660, 840, 900, 960, 1020];

/// Per-slot cost terms. Additive over slots, so safe for lower bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotTerms {
    pub preference: u64,
    pub uncommon_start: u64,
    pub early: u64,
    pub late: u64,
    pub free_day: u64,
}

impl SlotTerms {
    #[inline]
    pub fn total(&self) -> u64 {
        self.preference
            .saturating_add(self.uncommon_start)
            .saturating_add(self.early)
            .saturating_add(self.late)
            .saturating_add(self.free_day)
    }
}

/// Soft-preference cost of a selection. Lower is better. Sums saturate at
/// `u64::MAX` so oversized weights cannot overflow.
#[derive(Debug, Clone)]
pub struct FitnessCalculator {
    weights: CostWeights,
    preferred: [[bool; 24]; 5],
    has_preferences: bool,
    avoid_before: Option<Minute>,
    avoid_after: Option<Minute>,
    free_days: [bool; 5],
}

impl FitnessCalculator {
    pub fn new(constraints: &Constraints, weights: CostWeights) -> Result<Self, OptimizeError> {
        let mut preferred = [[false; 24]; 5];
        for (day, cells) in &constraints.preferred_time_slots {
            for (cell, &wanted) in cells {
                let hour = usize::from(parse_time(cell)? / 60);
                preferred[day.index()][hour] |= wanted;
            }
        }
        let has_preferences = preferred.iter().flatten().any(|&p| p);

        let parse_opt = |raw: &Option<String>| raw.as_deref().map(parse_time).transpose();

        let mut free_days = [false; 5];
        for day in &constraints.free_days {
            free_days[day.index()] = true;
        }

        Ok(Self {
            weights,
            preferred,
            has_preferences,
            avoid_before: parse_opt(&constraints.avoid_before)?,
            avoid_after: parse_opt(&constraints.avoid_after)?,
            free_days,
        })
    }

    /// Share (0-100) of the lesson's minutes inside preferred one-hour cells.
    pub fn preference_score(&self, slot: &CandidateSlot) -> u64 {
        let cells = &self.preferred[slot.day.index()];
        let mut overlap = 0u64;

        let mut cell_start = slot.start - slot.start % 60;
        while cell_start < slot.end {
            let cell_end = cell_start + 60;
            if cells[usize::from(cell_start / 60)] {
                overlap += u64::from(slot.end.min(cell_end) - slot.start.max(cell_start));
            }
            cell_start = cell_end;
        }

        overlap * 100 / u64::from(slot.duration())
    }

    pub fn slot_terms(&self, slot: &CandidateSlot) -> SlotTerms {
        let w = &self.weights;

        let preference = if self.has_preferences {
            (100 - self.preference_score(slot)).saturating_mul(w.preference_miss)
        } else {
            0
        };

        let uncommon_start = if COMMON_START_TIMES.contains(&slot.start) {
            0
        } else {
            w.uncommon_start
        };

        // lesson minutes before the cutoff
        let early = self
            .avoid_before
            .map(|cutoff| u64::from(slot.end.min(cutoff).saturating_sub(slot.start)).saturating_mul(w.early_minute))
            .unwrap_or(0);

        // lesson minutes after the cutoff
        let late = self
            .avoid_after
            .map(|cutoff| u64::from(slot.end.saturating_sub(slot.start.max(cutoff))).saturating_mul(w.late_minute))
            .unwrap_or(0);

        let free_day = if self.free_days[slot.day.index()] {
            w.free_day_lesson
        } else {
            0
        };

        SlotTerms {
            preference,
            uncommon_start,
            early,
            late,
            free_day,
        }
    }

    #[inline]
    pub fn slot_cost(&self, slot: &CandidateSlot) -> u64 {
        self.slot_terms(slot).total()
    }

    pub fn option_cost(&self, option: &ClassOption) -> u64 {
        option.slots.iter().fold(0, |sum, s| sum.saturating_add(self.slot_cost(s)))
    }

    #[inline]
    pub fn days_cost(&self, days_used: usize) -> u64 {
        (days_used as u64).saturating_mul(self.weights.day_used)
    }

    #[inline]
    pub fn gap_cost(&self, slots: &[&CandidateSlot]) -> u64 {
        Self::gap_minutes(slots).saturating_mul(self.weights.gap_minute)
    }

    /// Idle minutes between consecutive lessons, summed over days.
    pub fn gap_minutes(slots: &[&CandidateSlot]) -> u64 {
        let mut by_day: [Vec<(Minute, Minute)>; 5] = Default::default();
        for slot in slots {
            by_day[slot.day.index()].push((slot.start, slot.end));
        }

        let mut total = 0u64;
        for day in &mut by_day {
            day.sort_unstable();
            let mut iter = day.iter();
            let Some(&(_, mut reach)) = iter.next() else {
                continue;
            };
            for &(start, end) in iter {
                if start > reach {
                    total += u64::from(start - reach);
                }
                reach = reach.max(end);
            }
        }
        total
    }

    pub fn evaluate_slots(&self, slots: &[&CandidateSlot]) -> CostBreakdown {
        let mut breakdown = CostBreakdown::default();
        let mut days = [false; 5];

        for slot in slots {
            let terms = self.slot_terms(slot);
            breakdown.preference = breakdown.preference.saturating_add(terms.preference);
            breakdown.uncommon_start = breakdown.uncommon_start.saturating_add(terms.uncommon_start);
            breakdown.early = breakdown.early.saturating_add(terms.early);
            breakdown.late = breakdown.late.saturating_add(terms.late);
            breakdown.free_day = breakdown.free_day.saturating_add(terms.free_day);
            days[slot.day.index()] = true;
        }

        breakdown.days_used = self.days_cost(days.iter().filter(|&&d| d).count());
        breakdown.gaps = self.gap_cost(slots);
        breakdown.total = [
            breakdown.uncommon_start,
            breakdown.early,
            breakdown.late,
            breakdown.free_day,
            breakdown.days_used,
            breakdown.gaps,
        ]
        .into_iter()
        .fold(breakdown.preference, u64::saturating_add);
        breakdown
    }

    pub fn evaluate(&self, selection: &Selection) -> CostBreakdown {
        let slots: Vec<&CandidateSlot> = selection.slots().collect();
        self.evaluate_slots(&slots)
    }

    pub fn is_preferred(&self, day: Day, hour: usize) -> bool {
        hour < 24 && self.preferred[day.index()][hour]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn slot(day: &str, start: &str, end: &str) -> CandidateSlot {
        CandidateSlot::parse("1", day, start, end, None).unwrap()
    }

    fn grid(day: Day, cells: &[&str]) -> BTreeMap<Day, BTreeMap<String, bool>> {
        let mut grid = BTreeMap::new();
        grid.insert(day, cells.iter().map(|c| (c.to_string(), true)).collect());
        grid
    }

    #[test]
    fn preference_score_counts_minutes_inside_preferred_cells() {
        let constraints = Constraints {
            preferred_time_slots: grid(Day::Monday, &["0900", "1000"]),
            ..Constraints::default()
        };
        let calc = FitnessCalculator::new(&constraints, CostWeights::default()).unwrap();

        assert!(calc.is_preferred(Day::Monday, 9));
        assert_eq!(calc.preference_score(&slot("Monday", "0900", "1100")), 100);
        assert_eq!(calc.preference_score(&slot("Monday", "1000", "1200")), 50);
        assert_eq!(calc.preference_score(&slot("Monday", "0930", "1130")), 75);
        assert_eq!(calc.preference_score(&slot("Tuesday", "0900", "1000")), 0);
    }

    #[test]
    fn no_grid_means_no_preference_cost() {
        let calc = FitnessCalculator::new(&Constraints::default(), CostWeights::default()).unwrap();
        assert_eq!(calc.slot_terms(&slot("Monday", "0900", "1000")).preference, 0);
    }

    #[test]
    fn early_late_and_uncommon_terms() {
        let constraints = Constraints {
            avoid_before: Some("10:00".into()),
            avoid_after: Some("18:00".into()),
            free_days: vec![Day::Friday],
            ..Constraints::default()
        };
        let calc = FitnessCalculator::new(&constraints, CostWeights::default()).unwrap();

        let early = calc.slot_terms(&slot("Monday", "0800", "1100"));
        assert_eq!(early.early, 120 * 2);
        assert_eq!(early.late, 0);
        assert_eq!(early.uncommon_start, 0);

        let late = calc.slot_terms(&slot("Monday", "1730", "1930"));
        assert_eq!(late.late, 90 * 2);
        assert_eq!(late.uncommon_start, 10);

        assert_eq!(calc.slot_terms(&slot("Friday", "1000", "1100")).free_day, 500);
    }

    #[test]
    fn gaps_are_per_day_idle_minutes() {
        let a = slot("Monday", "0900", "1000");
        let b = slot("Monday", "1200", "1300");
        let c = slot("Monday", "1300", "1400");
        let d = slot("Tuesday", "1600", "1700");
        assert_eq!(FitnessCalculator::gap_minutes(&[&c, &a, &d, &b]), 120);
        assert_eq!(FitnessCalculator::gap_minutes(&[]), 0);
    }

    #[test]
    fn evaluate_sums_all_terms() {
        let calc = FitnessCalculator::new(&Constraints::default(), CostWeights::default()).unwrap();
        let a = slot("Monday", "0900", "1000");
        let b = slot("Monday", "1100", "1200");
        let cost = calc.evaluate_slots(&[&a, &b]);
        assert_eq!(cost.days_used, 60);
        assert_eq!(cost.gaps, 60);
        assert_eq!(cost.total, 120);
    }

    #[test]
    fn oversized_weights_saturate() {
        let weights = CostWeights {
            uncommon_start: u64::MAX,
            day_used: u64::MAX / 2,
            gap_minute: u64::MAX,
            ..CostWeights::default()
        };
        let calc = FitnessCalculator::new(&Constraints::default(), weights).unwrap();
        let a = slot("Monday", "0930", "1030");
        let b = slot("Monday", "1300", "1400");
        let c = slot("Tuesday", "0905", "1000");

        let cost = calc.evaluate_slots(&[&a, &b, &c]);
        assert_eq!(cost.uncommon_start, u64::MAX);
        assert_eq!(cost.days_used, u64::MAX - 1);
        assert_eq!(cost.gaps, u64::MAX);
        assert_eq!(cost.total, u64::MAX);
        assert_eq!(calc.days_cost(5), u64::MAX);
    }

    #[test]
    fn rejects_malformed_grid_cell() {
        let constraints = Constraints {
            preferred_time_slots: grid(Day::Monday, &["9am"]),
            ..Constraints::default()
        };
        assert!(FitnessCalculator::new(&constraints, CostWeights::default()).is_err());
    }
}
