use std::collections::{BTreeSet, HashSet};

use crate::models::{Candidate, Class, Group, HistoryRecord};

/// Groups in scope: the selected ones, or every group when none is selected.
fn groups_in_scope<'a>(
    class: &'a Class,
    selected_groups: &'a BTreeSet<i64>,
) -> impl Iterator<Item = &'a Group> + 'a {
    class
        .groups
        .iter()
        .filter(move |group| selected_groups.is_empty() || selected_groups.contains(&group.id))
}

/// Resolve the eligible pool for the next roll.
///
/// Order follows the class's group order, then each group's student order,
/// so identical inputs always give identical output. With `allow_repeat`
/// off, every student id already present in `history` is dropped.
pub fn resolve_candidates(
    selected_class: Option<&Class>,
    selected_groups: &BTreeSet<i64>,
    history: &[HistoryRecord],
    allow_repeat: bool,
) -> Vec<Candidate> {
    let Some(class) = selected_class else {
        return Vec::new();
    };

    let called: HashSet<i64> = if allow_repeat {
        HashSet::new()
    } else {
        history.iter().map(|record| record.student.id).collect()
    };

    groups_in_scope(class, selected_groups)
        .flat_map(|group| {
            group
                .students
                .iter()
                .map(move |student| Candidate::from_student(student, group))
        })
        .filter(|candidate| !called.contains(&candidate.id))
        .collect()
}

/// Number of students in the selected scope, ignoring repeat filtering.
pub fn scope_size(selected_class: Option<&Class>, selected_groups: &BTreeSet<i64>) -> usize {
    selected_class
        .map(|class| {
            groups_in_scope(class, selected_groups)
                .map(|group| group.students.len())
                .sum()
        })
        .unwrap_or(0)
}
