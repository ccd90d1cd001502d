use crate::domain::models::{CompetencyAverages, Feedback};
use std::collections::BTreeMap;

/// Averages every competency score across the given feedback.
///
/// Keys are the free-form labels evaluators submitted; a competency only
/// appears in the result if at least one feedback scored it, so every
/// division is by a count of one or more.
pub fn average_competency_scores<'a, I>(feedback: I) -> CompetencyAverages
where
    I: IntoIterator<Item = &'a Feedback>,
{
    let mut totals: BTreeMap<&str, (f64, u32)> = BTreeMap::new();

    for entry in feedback {
        for (competency, score) in &entry.competency_scores {
            let slot = totals.entry(competency.as_str()).or_insert((0.0, 0));
            slot.0 += score;
            slot.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(competency, (sum, count))| (competency.to_string(), sum / f64::from(count)))
        .collect()
}
