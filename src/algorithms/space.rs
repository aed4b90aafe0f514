use hashbrown::HashSet;
use log::debug;

use super::models::{Choice, ClassOption, Module, Selection};
use crate::error::OptimizeError;

/// One (module, lesson type) pair to fill, with its alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGroup {
    pub module_code: String,
    pub lesson_type: String,
    pub options: Vec<ClassOption>,
}

impl SearchGroup {
    pub fn label(&self) -> String {
        format!("{} {}", self.module_code, self.lesson_type)
    }
}

/// The validated combinatorial space of an optimize call.
///
/// Groups are ordered by ascending option count (most constrained first);
/// ties keep input order so the ordering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSpace {
    groups: Vec<SearchGroup>,
}

impl SearchSpace {
    pub fn build(modules: &[Module]) -> Result<Self, OptimizeError> {
        let mut seen_modules = HashSet::new();
        let mut groups = Vec::new();

        for module in modules {
            let code = module.code.trim();
            if code.is_empty() {
                return Err(OptimizeError::invalid("module with an empty code"));
            }
            if !seen_modules.insert(code) {
                return Err(OptimizeError::invalid(format!("module {code} listed twice")));
            }
            if module.lesson_groups.is_empty() {
                debug!("Module {} has no lessons to schedule", code);
            }

            let mut seen_types = HashSet::new();
            for group in &module.lesson_groups {
                if !seen_types.insert(group.lesson_type.as_str()) {
                    return Err(OptimizeError::invalid(format!(
                        "module {code} lists lesson type {} twice",
                        group.lesson_type
                    )));
                }
                if group.candidates.is_empty() {
                    return Err(OptimizeError::invalid(format!(
                        "module {code} lesson type {} has no candidate slots",
                        group.lesson_type
                    )));
                }
                for slot in &group.candidates {
                    slot.validate()?;
                }

                groups.push(SearchGroup {
                    module_code: code.to_string(),
                    lesson_type: group.lesson_type.clone(),
                    options: group.options(),
                });
            }
        }

        let mut space = SearchSpace { groups };
        space.sort_groups();
        Ok(space)
    }

    fn sort_groups(&mut self) {
        // stable: equal counts keep input order
        self.groups.sort_by_key(|g| g.options.len());
    }

    pub fn groups(&self) -> &[SearchGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of complete combinations, `None` on overflow.
    pub fn size(&self) -> Option<u128> {
        self.groups
            .iter()
            .try_fold(1u128, |acc, g| acc.checked_mul(g.options.len() as u128))
    }

    /// Drops options rejected by `keep` and re-orders the groups.
    /// Returns the label of the first group left without options, if any.
    pub fn retain_options<F>(&mut self, mut keep: F) -> Option<String>
    where
        F: FnMut(&ClassOption) -> bool,
    {
        for group in &mut self.groups {
            group.options.retain(|option| keep(option));
        }
        let emptied = self.groups.iter().find(|g| g.options.is_empty()).map(SearchGroup::label);
        self.sort_groups();
        emptied
    }

    /// Materialises the (possibly partial) assignment `choice[i]` -> `groups[i].options[choice[i]]`.
    pub fn selection(&self, choice: &[usize]) -> Selection {
        let mut selection = Selection::new();
        for (group, &option) in self.groups.iter().zip(choice) {
            selection.push(Choice {
                module_code: group.module_code.clone(),
                lesson_type: group.lesson_type.clone(),
                option: group.options[option].clone(),
            });
        }
        selection
    }

    /// Lazily enumerates every complete combination, conflict-free or not.
    /// Each call starts a fresh pass.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            space: self,
            cursor: vec![0; self.groups.len()],
            done: self.groups.iter().any(|g| g.options.is_empty()),
        }
    }
}

/// Odometer over option indices; the last group turns fastest.
pub struct Combinations<'a> {
    space: &'a SearchSpace,
    cursor: Vec<usize>,
    done: bool,
}

impl Combinations<'_> {
    fn advance(&mut self) {
        for depth in (0..self.cursor.len()).rev() {
            self.cursor[depth] += 1;
            if self.cursor[depth] < self.space.groups[depth].options.len() {
                return;
            }
            self.cursor[depth] = 0;
        }
        self.done = true;
    }
}

impl Iterator for Combinations<'_> {
    type Item = Selection;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let selection = self.space.selection(&self.cursor);
        self.advance();
        Some(selection)
    }
}
