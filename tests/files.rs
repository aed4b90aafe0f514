use std::fs;

use timetable_optimization_lib::export::{write_csv, write_json, write_xlsx};
use timetable_optimization_lib::import::{read_lessons_csv, read_request};
use timetable_optimization_lib::venues::VenueMap;
use timetable_optimization_lib::{optimize_with, CancelToken, OptimizationRequest, OptimizerConfig};

const REQUEST: &str = r#"{
    "modules": {
        "CS2030S": {"timetable": [
            {"lessonType": "Lecture", "classNo": "1", "day": "Monday", "startTime": "1000", "endTime": "1200", "venue": "LT27"},
            {"lessonType": "Laboratory", "classNo": "L1", "day": "Monday", "startTime": "1100", "endTime": "1300", "venue": "COM1-0201"},
            {"lessonType": "Laboratory", "classNo": "L2", "day": "Monday", "startTime": "1400", "endTime": "1600", "venue": "COM1-0201"}
        ]},
        "MA1521": {"timetable": [
            {"lessonType": "Lecture", "classNo": "1", "day": "Monday", "startTime": "1200", "endTime": "1400", "venue": "LT27"}
        ]}
    },
    "constraints": {"avoidBefore": "0900"}
}"#;

const VENUES: &str = r#"{
    "LT27": {"location": {"x": 103.7806, "y": 1.2966}},
    "COM1-0201": {"location": {"x": 103.7737, "y": 1.2950}}
}"#;

#[tokio::test]
async fn request_file_to_csv_and_xlsx() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.json");
    let venues_path = dir.path().join("venues.json");
    fs::write(&input, REQUEST).unwrap();
    fs::write(&venues_path, VENUES).unwrap();

    let request = read_request(&input).unwrap();
    let venues = VenueMap::load(&venues_path).unwrap();
    assert_eq!(venues.len(), 2);

    let report = optimize_with(
        &request,
        &OptimizerConfig::default(),
        Some(venues.into()),
        CancelToken::new(),
    )
    .await
    .unwrap();

    // L1 overlaps the lecture, so the later lab is the only choice
    let lab = report.blocks.iter().find(|b| b.lesson_type == "Laboratory").unwrap();
    assert_eq!(lab.class_no, "L2");

    let csv_path = dir.path().join("timetable.csv");
    write_csv(&report.blocks, fs::File::create(&csv_path).unwrap()).unwrap();
    let csv = fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), report.blocks.len() + 1);
    assert!(csv.contains("CS2030S,Laboratory,L2,Monday,14:00,16:00,COM1-0201"));

    let mut json = Vec::new();
    write_json(&report, &mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["modules"]["MA1521"][0]["startTime"], "12:00");

    let xlsx_path = dir.path().join("timetable.xlsx");
    write_xlsx(&report, &xlsx_path).unwrap();
    assert!(xlsx_path.exists());
}

#[tokio::test]
async fn lessons_csv_file_is_optimized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lessons.csv");
    fs::write(
        &path,
        "module_code,lesson_type,class_no,day,start_time,end_time,venue\n\
         GEA1000,Tutorial,T1,Friday,0800,1000,\n\
         GEA1000,Tutorial,T2,Wednesday,1000,1200,\n\
         CS1231S,Lecture,1,Wednesday,1200,1400,LT27\n",
    )
    .unwrap();

    let request = OptimizationRequest::new(read_lessons_csv(&path).unwrap());
    assert_eq!(request.modules.len(), 2);

    let report = optimize_with(&request, &OptimizerConfig::default(), None, CancelToken::new())
        .await
        .unwrap();

    // T2 shares Wednesday with the lecture and starts at a common time
    let tutorial = report.blocks.iter().find(|b| b.module_code == "GEA1000").unwrap();
    assert_eq!(tutorial.class_no, "T2");
    assert_eq!(report.cost.days_used, 60);
    assert_eq!(report.cost.gaps, 0);
}
