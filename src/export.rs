//! Result writers: JSON, CSV and XLSX.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use serde_json::{json, Value};

use crate::algorithms::models::{OptimizeReport, TimetableBlock};
use crate::error::Result;

#[derive(Debug, Serialize)]
struct CsvBlock<'a> {
    module_code: &'a str,
    lesson_type: &'a str,
    class_no: &'a str,
    day: &'static str,
    start_time: &'a str,
    end_time: &'a str,
    venue: &'a str,
    color: &'a str,
}

impl<'a> From<&'a TimetableBlock> for CsvBlock<'a> {
    fn from(block: &'a TimetableBlock) -> Self {
        CsvBlock {
            module_code: &block.module_code,
            lesson_type: &block.lesson_type,
            class_no: &block.class_no,
            day: block.day.name(),
            start_time: &block.start_time,
            end_time: &block.end_time,
            venue: block.venue.as_deref().unwrap_or_default(),
            color: block.color.as_deref().unwrap_or_default(),
        }
    }
}

/// Blocks keyed by module code, in display order within each module.
pub fn blocks_by_module(blocks: &[TimetableBlock]) -> BTreeMap<&str, Vec<&TimetableBlock>> {
    let mut modules: BTreeMap<&str, Vec<&TimetableBlock>> = BTreeMap::new();
    for block in blocks {
        modules.entry(block.module_code.as_str()).or_default().push(block);
    }
    modules
}

pub fn report_json(report: &OptimizeReport) -> Value {
    json!({
        "success": true,
        "blocks": report.blocks,
        "modules": blocks_by_module(&report.blocks),
        "cost": report.cost,
        "stats": {
            "nodes": report.stats.nodes,
            "leaves": report.stats.leaves,
            "pruned": report.stats.pruned,
            "elapsedMs": report.stats.elapsed.as_millis() as u64,
            "exhausted": report.stats.exhausted,
            "relaxedWalking": report.stats.relaxed_walking,
        },
    })
}

pub fn write_json<W: Write>(report: &OptimizeReport, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, &report_json(report))?;
    Ok(())
}

pub fn write_csv<W: Write>(blocks: &[TimetableBlock], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for block in blocks {
        wtr.serialize(CsvBlock::from(block))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Two sheets: the timetable itself and a summary of cost terms and search statistics.
pub fn write_xlsx(report: &OptimizeReport, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    // === Timetable ===
    let sheet = workbook.add_worksheet().set_name("Timetable")?;
    let headers = [
        "module_code",
        "lesson_type",
        "class_no",
        "day",
        "start_time",
        "end_time",
        "venue",
    ];
    for (col, title) in headers.iter().enumerate() {
        sheet.write_with_format(0, col as u16, *title, &bold)?;
    }

    for (i, block) in report.blocks.iter().enumerate() {
        let row = i as u32 + 1;
        let color = Format::new().set_background_color(block.color.as_deref().unwrap_or("#FFFFFF"));
        sheet.write_with_format(row, 0, block.module_code.as_str(), &color)?;
        sheet.write(row, 1, block.lesson_type.as_str())?;
        sheet.write(row, 2, block.class_no.as_str())?;
        sheet.write(row, 3, block.day.name())?;
        sheet.write(row, 4, block.start_time.as_str())?;
        sheet.write(row, 5, block.end_time.as_str())?;
        sheet.write(row, 6, block.venue.as_deref().unwrap_or_default())?;
    }

    // === Summary ===
    let summary = workbook.add_worksheet().set_name("Summary")?;
    let cost = &report.cost;
    let stats = &report.stats;
    let rows: [(&str, f64); 14] = [
        ("preference", cost.preference as f64),
        ("uncommon_start", cost.uncommon_start as f64),
        ("early", cost.early as f64),
        ("late", cost.late as f64),
        ("free_day", cost.free_day as f64),
        ("days_used", cost.days_used as f64),
        ("gaps", cost.gaps as f64),
        ("total", cost.total as f64),
        ("nodes", stats.nodes as f64),
        ("leaves", stats.leaves as f64),
        ("pruned", stats.pruned as f64),
        ("elapsed_ms", stats.elapsed.as_secs_f64() * 1000.0),
        ("exhausted", f64::from(u8::from(stats.exhausted))),
        ("relaxed_walking", f64::from(u8::from(stats.relaxed_walking))),
    ];
    summary.write_with_format(0, 0, "metric", &bold)?;
    summary.write_with_format(0, 1, "value", &bold)?;
    for (i, (name, value)) in rows.iter().enumerate() {
        summary.write(i as u32 + 1, 0, *name)?;
        summary.write(i as u32 + 1, 1, *value)?;
    }

    workbook.save(path)?;
    Ok(())
}
