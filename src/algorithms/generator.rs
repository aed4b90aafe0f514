//! Synthetic request generator.
//!
//! Produces seeded, reproducible module sets shaped like real course offerings:
//! lectures with few alternatives, tutorials and labs with many.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::models::{CandidateSlot, Day, LessonGroup, Module, OptimizationRequest};

const LESSON_TYPES: [&str; 4] = ["Lecture", "Tutorial", "Laboratory", "Recitation"];
const VENUES: [&str; 6] = ["LT17", "LT19", "COM1-0201", "COM1-0203", "S16-0430", "UTSRC-LT51"];

/// Shape of a generated scenario.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub num_modules: usize,
    /// Lesson types per module (min, max), capped at 4.
    pub lesson_types_range: (usize, usize),
    /// Class alternatives per lesson type (min, max).
    pub options_range: (usize, usize),
    /// Lesson length in hours (min, max).
    pub duration_hours_range: (u16, u16),
    /// Earliest and latest start hour.
    pub start_hour_range: (u16, u16),
    /// Chance that a lecture class meets twice a week.
    pub double_session_chance: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::medium()
    }
}

impl ScenarioConfig {
    /// Few modules, few alternatives.
    pub fn easy() -> Self {
        Self {
            num_modules: 3,
            lesson_types_range: (1, 2),
            options_range: (1, 3),
            duration_hours_range: (1, 2),
            start_hour_range: (8, 17),
            double_session_chance: 0.2,
        }
    }

    /// A typical semester load.
    pub fn medium() -> Self {
        Self {
            num_modules: 5,
            lesson_types_range: (1, 3),
            options_range: (2, 5),
            duration_hours_range: (1, 2),
            start_hour_range: (8, 18),
            double_session_chance: 0.3,
        }
    }

    /// Heavy load with many alternatives per group.
    pub fn hard() -> Self {
        Self {
            num_modules: 6,
            lesson_types_range: (2, 3),
            options_range: (3, 8),
            duration_hours_range: (1, 3),
            start_hour_range: (8, 18),
            double_session_chance: 0.4,
        }
    }
}

/// Builds a request from `config`; the same seed always yields the same request.
pub fn generate(config: &ScenarioConfig, seed: u64) -> OptimizationRequest {
    let mut rng = StdRng::seed_from_u64(seed);

    let modules = (0..config.num_modules)
        .map(|m| {
            let code = format!("GEN{:04}", 1000 + m);
            let (lo, hi) = config.lesson_types_range;
            let num_types = rng.random_range(lo.max(1)..=hi.max(lo).max(1)).min(LESSON_TYPES.len());

            let groups = LESSON_TYPES[..num_types]
                .iter()
                .map(|&lesson_type| {
                    let (lo, hi) = config.options_range;
                    let num_options = rng.random_range(lo.max(1)..=hi.max(lo).max(1));
                    let prefix = &lesson_type[..1];

                    let mut candidates = Vec::new();
                    for o in 0..num_options {
                        let class_no = if lesson_type == "Lecture" {
                            format!("{}", o + 1)
                        } else {
                            format!("{prefix}{:02}", o + 1)
                        };
                        let sessions = if lesson_type == "Lecture" && rng.random_bool(config.double_session_chance) {
                            2
                        } else {
                            1
                        };
                        for _ in 0..sessions {
                            candidates.push(random_slot(&mut rng, config, &class_no));
                        }
                    }
                    LessonGroup::new(lesson_type, candidates)
                })
                .collect();

            Module::new(code, groups)
        })
        .collect();

    OptimizationRequest::new(modules)
}

fn random_slot(rng: &mut StdRng, config: &ScenarioConfig, class_no: &str) -> CandidateSlot {
    let day = Day::ALL[rng.random_range(0..Day::ALL.len())];
    let (min_len, max_len) = config.duration_hours_range;
    let hours = rng.random_range(min_len.max(1)..=max_len.max(min_len).max(1));
    let (first, last) = config.start_hour_range;
    let latest = last.min(23 - hours).max(first);
    let start_hour = rng.random_range(first..=latest);

    CandidateSlot {
        class_no: class_no.to_string(),
        day,
        start: start_hour * 60,
        end: (start_hour + hours) * 60,
        venue: Some(VENUES[rng.random_range(0..VENUES.len())].to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::space::SearchSpace;

    #[test]
    fn same_seed_same_request() {
        let config = ScenarioConfig::medium();
        assert_eq!(generate(&config, 7), generate(&config, 7));
        assert_ne!(generate(&config, 7), generate(&config, 8));
    }

    #[test]
    fn generated_requests_are_valid() {
        for (i, config) in [ScenarioConfig::easy(), ScenarioConfig::medium(), ScenarioConfig::hard()]
            .iter()
            .enumerate()
        {
            for seed in 0..10 {
                let request = generate(config, seed + i as u64 * 100);
                assert_eq!(request.modules.len(), config.num_modules);
                assert!(SearchSpace::build(&request.modules).is_ok());
            }
        }
    }
}
