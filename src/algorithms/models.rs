use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use hashbrown::HashMap;

use crate::error::OptimizeError;

/// Minute of the day, `0..=1440`.
pub type Minute = u16;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

// ============================================================================
// DAY & TIME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    /// 0 = Monday .. 4 = Friday
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Day {
    type Err = OptimizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        Day::ALL
            .into_iter()
            .find(|day| {
                let name = day.name().to_ascii_lowercase();
                lowered == name || (lowered.len() == 3 && name.starts_with(&lowered))
            })
            .ok_or_else(|| OptimizeError::invalid(format!("unsupported day '{raw}' (Monday to Friday only)")))
    }
}

impl TryFrom<String> for Day {
    type Error = OptimizeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Day> for String {
    fn from(day: Day) -> Self {
        day.name().to_string()
    }
}

/// Parses `"HHMM"` (course API form) or `"HH:MM"` (UI form) into a minute of the day.
pub fn parse_time(raw: &str) -> Result<Minute, OptimizeError> {
    let raw = raw.trim();
    let (hours, minutes) = match raw.split_once(':') {
        Some((h, m)) => (h, m),
        None if raw.len() == 4 && raw.is_ascii() => raw.split_at(2),
        None => return Err(OptimizeError::invalid(format!("malformed time '{raw}'"))),
    };

    let digits = |part: &str| -> Option<u16> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    };

    match (digits(hours), digits(minutes)) {
        (Some(h), Some(m)) if h < 24 && m < 60 && minutes.len() == 2 => Ok(h * 60 + m),
        _ => Err(OptimizeError::invalid(format!("malformed time '{raw}'"))),
    }
}

/// Formats a minute of the day as `"HH:MM"`.
pub fn format_time(minute: Minute) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

// ============================================================================
// INPUT MODEL
// ============================================================================

/// One concrete meeting of a class: day, time range, venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SlotRecord", into = "SlotRecord")]
pub struct CandidateSlot {
    pub class_no: String,
    pub day: Day,
    pub start: Minute,
    pub end: Minute,
    pub venue: Option<String>,
}

impl CandidateSlot {
    pub fn new(
        class_no: impl Into<String>,
        day: Day,
        start: Minute,
        end: Minute,
        venue: Option<String>,
    ) -> Result<Self, OptimizeError> {
        let slot = CandidateSlot {
            class_no: class_no.into(),
            day,
            start,
            end,
            venue,
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Builds a slot from its textual form, e.g. `("T01", "Monday", "0900", "1000", Some("COM1-0201"))`.
    pub fn parse(
        class_no: impl Into<String>,
        day: &str,
        start: &str,
        end: &str,
        venue: Option<&str>,
    ) -> Result<Self, OptimizeError> {
        let venue = venue.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Self::new(class_no, day.parse()?, parse_time(start)?, parse_time(end)?, venue)
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.start >= self.end || self.end > MINUTES_PER_DAY {
            return Err(OptimizeError::invalid(format!(
                "class {} on {} has an empty or reversed time range {}-{}",
                self.class_no,
                self.day,
                format_time(self.start),
                format_time(self.end)
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn duration(&self) -> Minute {
        self.end - self.start
    }
}

/// Wire form of a slot, times as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotRecord {
    class_no: String,
    day: Day,
    start_time: String,
    end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    venue: Option<String>,
}

impl TryFrom<SlotRecord> for CandidateSlot {
    type Error = OptimizeError;

    fn try_from(record: SlotRecord) -> Result<Self, Self::Error> {
        CandidateSlot::new(
            record.class_no,
            record.day,
            parse_time(&record.start_time)?,
            parse_time(&record.end_time)?,
            record.venue,
        )
    }
}

impl From<CandidateSlot> for SlotRecord {
    fn from(slot: CandidateSlot) -> Self {
        SlotRecord {
            class_no: slot.class_no,
            day: slot.day,
            start_time: format_time(slot.start),
            end_time: format_time(slot.end),
            venue: slot.venue,
        }
    }
}

/// One alternative of a lesson group: every slot sharing a class number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOption {
    pub class_no: String,
    pub slots: Vec<CandidateSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonGroup {
    pub lesson_type: String,
    pub candidates: Vec<CandidateSlot>,
}

impl LessonGroup {
    pub fn new(lesson_type: impl Into<String>, candidates: Vec<CandidateSlot>) -> Self {
        LessonGroup {
            lesson_type: lesson_type.into(),
            candidates,
        }
    }

    /// Groups candidates by class number, in order of first appearance.
    pub fn options(&self) -> Vec<ClassOption> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut options: Vec<ClassOption> = Vec::new();

        for slot in &self.candidates {
            match index.get(slot.class_no.as_str()) {
                Some(&i) => options[i].slots.push(slot.clone()),
                None => {
                    index.insert(slot.class_no.as_str(), options.len());
                    options.push(ClassOption {
                        class_no: slot.class_no.clone(),
                        slots: vec![slot.clone()],
                    });
                }
            }
        }

        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(rename = "moduleCode")]
    pub code: String,
    pub lesson_groups: Vec<LessonGroup>,
}

impl Module {
    pub fn new(code: impl Into<String>, lesson_groups: Vec<LessonGroup>) -> Self {
        Module {
            code: code.into(),
            lesson_groups,
        }
    }
}

/// A user-defined busy period (club meeting, part-time job, ...). No lesson may overlap it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBlock {
    #[serde(default)]
    pub event_name: String,
    pub days: Vec<Day>,
    pub start_time: String,
    pub end_time: String,
}

/// Soft preferences plus the student's hard blocked times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    /// `{Day: {"HHMM": preferred}}`, one-hour cells.
    pub preferred_time_slots: BTreeMap<Day, BTreeMap<String, bool>>,
    pub avoid_before: Option<String>,
    pub avoid_after: Option<String>,
    pub free_days: Vec<Day>,
    pub blocked_times: Vec<CustomBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub modules: Vec<Module>,
    #[serde(default)]
    pub constraints: Constraints,
}

impl OptimizationRequest {
    pub fn new(modules: Vec<Module>) -> Self {
        OptimizationRequest {
            modules,
            constraints: Constraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}

// ============================================================================
// SELECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub module_code: String,
    pub lesson_type: String,
    pub option: ClassOption,
}

/// Chosen class per (module, lesson type). May be partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    choices: Vec<Choice>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, choice: Choice) {
        self.choices.push(choice);
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn get(&self, module_code: &str, lesson_type: &str) -> Option<&ClassOption> {
        self.choices
            .iter()
            .find(|c| c.module_code == module_code && c.lesson_type == lesson_type)
            .map(|c| &c.option)
    }

    pub fn slots(&self) -> impl Iterator<Item = &CandidateSlot> + '_ {
        self.choices.iter().flat_map(|c| c.option.slots.iter())
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

// ============================================================================
// OUTPUT MODEL
// ============================================================================

/// Rendering unit handed to the timetable view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableBlock {
    pub module_code: String,
    pub lesson_type: String,
    pub class_no: String,
    pub day: Day,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub preference: u64,
    pub uncommon_start: u64,
    pub early: u64,
    pub late: u64,
    pub free_day: u64,
    pub days_used: u64,
    pub gaps: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub nodes: u64,
    pub leaves: u64,
    pub pruned: u64,
    pub elapsed: Duration,
    /// Whole space explored, so the result is optimal.
    pub exhausted: bool,
    /// Walking-distance constraints were dropped to find a solution.
    pub relaxed_walking: bool,
}

/// Periodic snapshot emitted while searching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProgress {
    pub nodes: u64,
    pub elapsed: Duration,
    pub best_cost: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeReport {
    pub blocks: Vec<TimetableBlock>,
    pub cost: CostBreakdown,
    pub stats: SearchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_time_forms() {
        assert_eq!(parse_time("0900").unwrap(), 540);
        assert_eq!(parse_time("09:00").unwrap(), 540);
        assert_eq!(parse_time("9:30").unwrap(), 570);
        assert_eq!(parse_time("2359").unwrap(), 1439);
        assert!(parse_time("2400").is_err());
        assert!(parse_time("09:60").is_err());
        assert!(parse_time("9:5").is_err());
        assert!(parse_time("nine").is_err());
        assert!(parse_time("").is_err());
    }

    #[test]
    fn multibyte_time_is_rejected() {
        assert!(matches!(parse_time("aéb"), Err(OptimizeError::InvalidInput(_))));
        assert!(matches!(parse_time("é:00"), Err(OptimizeError::InvalidInput(_))));
        assert!(matches!(parse_time("０９００"), Err(OptimizeError::InvalidInput(_))));
    }

    #[test]
    fn formats_times_zero_padded() {
        assert_eq!(format_time(540), "09:00");
        assert_eq!(format_time(1085), "18:05");
    }

    #[test]
    fn day_parsing_is_case_insensitive_and_weekday_only() {
        assert_eq!("monday".parse::<Day>().unwrap(), Day::Monday);
        assert_eq!("FRI".parse::<Day>().unwrap(), Day::Friday);
        assert!(matches!("Saturday".parse::<Day>(), Err(OptimizeError::InvalidInput(_))));
    }

    #[test]
    fn rejects_reversed_range() {
        let err = CandidateSlot::parse("1", "Monday", "1000", "0900", None).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput(_)));
        assert!(CandidateSlot::parse("1", "Monday", "1000", "1000", None).is_err());
    }

    #[test]
    fn options_bundle_slots_by_class_number() {
        let group = LessonGroup::new(
            "Lecture",
            vec![
                CandidateSlot::parse("2", "Tuesday", "1000", "1200", None).unwrap(),
                CandidateSlot::parse("1", "Monday", "1000", "1200", None).unwrap(),
                CandidateSlot::parse("2", "Friday", "1000", "1200", None).unwrap(),
            ],
        );

        let options = group.options();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].class_no, "2");
        assert_eq!(options[0].slots.len(), 2);
        assert_eq!(options[1].class_no, "1");
    }

    #[test]
    fn slot_wire_form_uses_clock_strings() {
        let slot = CandidateSlot::parse("T01", "Wednesday", "0900", "1000", Some("COM1-0201")).unwrap();
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["startTime"], "09:00");
        assert_eq!(json["day"], "Wednesday");

        let bad = serde_json::json!({
            "classNo": "1", "day": "Monday", "startTime": "1100", "endTime": "1000"
        });
        assert!(serde_json::from_value::<CandidateSlot>(bad).is_err());
    }
}
