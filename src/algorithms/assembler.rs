use super::models::{format_time, Selection, TimetableBlock};

/// Block colours of the timetable view; a module keeps its colour across runs.
pub const MODULE_COLORS: [&str; 12] = [
    "#3b82f6", // blue
    "#10b981", // emerald
    "#f59e0b", // amber
    "#ef4444", // red
    "#8b5cf6", // violet
    "#06b6d4", // cyan
    "#84cc16", // lime
    "#f97316", // orange
    "#ec4899", // pink
    "#6366f1", // indigo
    "#14b8a6", // teal
    "#eab308", // yellow
];

/// Same palette index as the web client: only the `<< 5` wraps to 32 bits,
/// the subtraction and addition stay exact.
pub fn color_for_module(module_code: &str) -> &'static str {
    let hash = module_code.encode_utf16().fold(0i64, |hash, unit| {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        i64::from(unit) + shifted - hash
    });
    MODULE_COLORS[(hash.unsigned_abs() % MODULE_COLORS.len() as u64) as usize]
}

/// Flattens a selection into blocks ordered Monday to Friday, then by start time.
pub fn assemble(selection: &Selection) -> Vec<TimetableBlock> {
    let mut timed: Vec<(u16, TimetableBlock)> = selection
        .choices()
        .iter()
        .flat_map(|choice| {
            let color = color_for_module(&choice.module_code);
            choice.option.slots.iter().map(move |slot| {
                (
                    slot.start,
                    TimetableBlock {
                        module_code: choice.module_code.clone(),
                        lesson_type: choice.lesson_type.clone(),
                        class_no: slot.class_no.clone(),
                        day: slot.day,
                        start_time: format_time(slot.start),
                        end_time: format_time(slot.end),
                        venue: slot.venue.clone(),
                        color: Some(color.to_string()),
                    },
                )
            })
        })
        .collect();

    timed.sort_by(|(a_start, a), (b_start, b)| {
        a.day
            .cmp(&b.day)
            .then(a_start.cmp(b_start))
            .then_with(|| a.module_code.cmp(&b.module_code))
            .then_with(|| a.lesson_type.cmp(&b.lesson_type))
    });

    timed.into_iter().map(|(_, block)| block).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::models::{CandidateSlot, Choice, ClassOption, Day};

    fn choice(module: &str, lesson_type: &str, slots: Vec<CandidateSlot>) -> Choice {
        Choice {
            module_code: module.into(),
            lesson_type: lesson_type.into(),
            option: ClassOption {
                class_no: slots[0].class_no.clone(),
                slots,
            },
        }
    }

    #[test]
    fn orders_by_day_then_start() {
        let mut selection = Selection::new();
        selection.push(choice(
            "CS2103T",
            "Lecture",
            vec![CandidateSlot::parse("1", "Friday", "1400", "1600", Some("LT17")).unwrap()],
        ));
        selection.push(choice(
            "MA1521",
            "Lecture",
            vec![
                CandidateSlot::parse("2", "Monday", "1100", "1200", None).unwrap(),
                CandidateSlot::parse("2", "Monday", "0900", "1000", None).unwrap(),
            ],
        ));

        let blocks = assemble(&selection);
        let order: Vec<(Day, &str)> = blocks.iter().map(|b| (b.day, b.start_time.as_str())).collect();
        assert_eq!(
            order,
            vec![(Day::Monday, "09:00"), (Day::Monday, "11:00"), (Day::Friday, "14:00")]
        );
        assert_eq!(blocks[2].venue.as_deref(), Some("LT17"));
        assert_eq!(blocks[0].color, blocks[1].color);
    }

    #[test]
    fn colour_is_stable_per_module() {
        assert_eq!(color_for_module("CS2103T"), color_for_module("CS2103T"));
        assert!(MODULE_COLORS.contains(&color_for_module("")));
        // 'A' = 65 -> 65 % 12 = 5
        assert_eq!(color_for_module("A"), MODULE_COLORS[5]);
        // 'A' * 31 + 'B' = 2081 -> 2081 % 12 = 5
        assert_eq!(color_for_module("AB"), MODULE_COLORS[5]);
    }

    #[test]
    fn colour_matches_web_client_for_long_codes() {
        // indices computed by the browser's getModuleColor
        assert_eq!(color_for_module("CS2103T"), MODULE_COLORS[6]);
        assert_eq!(color_for_module("CS2040S"), MODULE_COLORS[7]);
        assert_eq!(color_for_module("MA1521"), MODULE_COLORS[9]);
        assert_eq!(color_for_module("GEA1000"), MODULE_COLORS[2]);
    }

    #[test]
    fn empty_selection_gives_no_blocks() {
        assert!(assemble(&Selection::new()).is_empty());
    }
}
