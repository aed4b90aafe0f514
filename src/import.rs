//! Request readers.
//!
//! Two JSON shapes are accepted:
//! - the native form, `{"modules": [{"moduleCode", "lessonGroups": [...]}], "constraints"}`
//! - the module-map form sent by the web client,
//!   `{"modules": {"CS2103T": {"timetable": [{"lessonType", "classNo", ...}]}}, "constraints"}`
//!
//! Lesson lists can also come from CSV with the columns
//! `module_code,lesson_type,class_no,day,start_time,end_time,venue`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::algorithms::models::{CandidateSlot, Constraints, LessonGroup, Module, OptimizationRequest};
use crate::error::{OptimizeError, Result};

/// One lesson as listed in a module's timetable. Extra fields (weeks, size, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub lesson_type: String,
    pub class_no: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleRecord {
    #[serde(default)]
    pub timetable: Vec<LessonRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMapPayload {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleRecord>,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Deserialize)]
struct CsvLesson {
    module_code: String,
    lesson_type: String,
    class_no: String,
    day: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    venue: Option<String>,
}

/// Groups `lessons` by lesson type, keeping the order in which types first appear.
pub fn module_from_lessons(code: &str, lessons: &[LessonRecord]) -> std::result::Result<Module, OptimizeError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<LessonGroup> = Vec::new();

    for lesson in lessons {
        let slot = CandidateSlot::parse(
            &lesson.class_no,
            &lesson.day,
            &lesson.start_time,
            &lesson.end_time,
            lesson.venue.as_deref(),
        )
        .map_err(|err| OptimizeError::invalid(format!("{code} {} {}: {err}", lesson.lesson_type, lesson.class_no)))?;

        match index.get(lesson.lesson_type.as_str()) {
            Some(&i) => groups[i].candidates.push(slot),
            None => {
                index.insert(lesson.lesson_type.as_str(), groups.len());
                groups.push(LessonGroup::new(lesson.lesson_type.clone(), vec![slot]));
            }
        }
    }

    Ok(Module::new(code, groups))
}

impl ModuleMapPayload {
    pub fn into_request(self) -> std::result::Result<OptimizationRequest, OptimizeError> {
        let modules = self
            .modules
            .iter()
            .map(|(code, record)| module_from_lessons(code, &record.timetable))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(OptimizationRequest::new(modules).with_constraints(self.constraints))
    }
}

/// Parses either JSON shape, telling them apart by the type of `modules`.
pub fn parse_request(json: &str) -> Result<OptimizationRequest> {
    let value: Value = serde_json::from_str(json)?;
    let request = match value.get("modules") {
        Some(Value::Object(_)) => {
            debug!("Reading module-map request");
            serde_json::from_value::<ModuleMapPayload>(value)?.into_request()?
        }
        _ => serde_json::from_value::<OptimizationRequest>(value)?,
    };
    Ok(request)
}

pub fn read_request(path: &Path) -> Result<OptimizationRequest> {
    let json = fs::read_to_string(path)?;
    let request = parse_request(&json)?;
    debug!("Read {} modules from {}", request.modules.len(), path.display());
    Ok(request)
}

/// Parses lesson rows into modules, ordered by module code.
pub fn parse_lessons_csv(csv: &str) -> Result<Vec<Module>> {
    let mut rdr = csv::Reader::from_reader(csv.as_bytes());
    let mut by_module: BTreeMap<String, Vec<LessonRecord>> = BTreeMap::new();

    for row in rdr.deserialize() {
        let row: CsvLesson = row?;
        by_module.entry(row.module_code).or_default().push(LessonRecord {
            lesson_type: row.lesson_type,
            class_no: row.class_no,
            day: row.day,
            start_time: row.start_time,
            end_time: row.end_time,
            venue: row.venue,
        });
    }

    let modules = by_module
        .iter()
        .map(|(code, lessons)| module_from_lessons(code, lessons))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(modules)
}

pub fn read_lessons_csv(path: &Path) -> Result<Vec<Module>> {
    parse_lessons_csv(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::models::Day;
    use crate::error::AppError;

    const MODULE_MAP: &str = r#"{
        "modules": {
            "MA1521": {"timetable": [
                {"lessonType": "Lecture", "classNo": "1", "day": "Tuesday", "startTime": "1000", "endTime": "1200", "venue": "LT27", "weeks": [1, 2, 3]}
            ]},
            "CS2103T": {"timetable": [
                {"lessonType": "Tutorial", "classNo": "T1", "day": "Monday", "startTime": "0900", "endTime": "1000", "venue": "COM1-0201"},
                {"lessonType": "Lecture", "classNo": "1", "day": "Friday", "startTime": "1600", "endTime": "1800", "venue": ""},
                {"lessonType": "Tutorial", "classNo": "T2", "day": "Monday", "startTime": "1000", "endTime": "1100"}
            ]}
        },
        "constraints": {"freeDays": ["Wednesday"]}
    }"#;

    #[test]
    fn module_map_groups_by_first_appearance() {
        let request = parse_request(MODULE_MAP).unwrap();

        let codes: Vec<&str> = request.modules.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["CS2103T", "MA1521"]);

        let cs = &request.modules[0];
        let types: Vec<&str> = cs.lesson_groups.iter().map(|g| g.lesson_type.as_str()).collect();
        assert_eq!(types, vec!["Tutorial", "Lecture"]);
        assert_eq!(cs.lesson_groups[0].candidates.len(), 2);
        assert_eq!(cs.lesson_groups[1].candidates[0].venue, None);

        assert_eq!(request.constraints.free_days, vec![Day::Wednesday]);
    }

    #[test]
    fn native_form_is_accepted() {
        let json = r#"{"modules": [{"moduleCode": "CS1010", "lessonGroups": [
            {"lessonType": "Lecture", "candidates": [
                {"classNo": "1", "day": "Monday", "startTime": "09:00", "endTime": "10:00"}
            ]}
        ]}]}"#;
        let request = parse_request(json).unwrap();
        assert_eq!(request.modules[0].code, "CS1010");
        assert_eq!(request.modules[0].lesson_groups[0].candidates[0].start, 540);
    }

    #[test]
    fn bad_lesson_names_module() {
        let json = r#"{"modules": {"CS1010": {"timetable": [
            {"lessonType": "Lecture", "classNo": "1", "day": "Saturday", "startTime": "0900", "endTime": "1000"}
        ]}}}"#;
        match parse_request(json) {
            Err(AppError::Optimize(OptimizeError::InvalidInput(message))) => {
                assert!(message.contains("CS1010"), "{message}")
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn multibyte_time_is_invalid_input() {
        let json = r#"{"modules": {"CS1010": {"timetable": [
            {"lessonType": "Lecture", "classNo": "1", "day": "Monday", "startTime": "aéb", "endTime": "1000"}
        ]}}}"#;
        assert!(matches!(
            parse_request(json),
            Err(AppError::Optimize(OptimizeError::InvalidInput(_)))
        ));
    }

    #[test]
    fn csv_rows_become_modules() {
        let csv = "module_code,lesson_type,class_no,day,start_time,end_time,venue\n\
                   MA1521,Lecture,1,Tuesday,1000,1200,LT27\n\
                   CS2103T,Tutorial,T1,Monday,0900,1000,\n\
                   CS2103T,Tutorial,T2,Monday,1000,1100,COM1-0201\n";
        let modules = parse_lessons_csv(csv).unwrap();

        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].code, "CS2103T");
        assert_eq!(modules[0].lesson_groups[0].options().len(), 2);
        assert_eq!(modules[0].lesson_groups[0].candidates[0].venue, None);
        assert_eq!(modules[1].lesson_groups[0].candidates[0].end, 720);
    }
}
