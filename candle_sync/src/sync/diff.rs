//! Planning the writes for one window.

use std::{collections::BTreeMap, fmt};

use crate::{
    series::Candle,
    store::{Mutation, MutationKind},
    sync::ReconcilePolicy,
};

/// What needs to change to bring the store in line with a fetched window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesDiff {
    /// Open times absent from the store.
    pub inserts: Vec<Candle>,
    /// Stored incomplete and changed since; rewritten in place.
    pub updates: Vec<Candle>,
    /// Stored and either complete or identical to the fetched bar; left alone.
    pub unchanged: usize,
    /// Stored complete but computed incomplete (reference clock went backwards); left alone.
    pub skew_ignored: usize,
}

impl SeriesDiff {
    /// True if nothing needs writing.
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }

    /// Planned writes in open-time order.
    pub fn mutations(&self) -> Vec<Mutation> {
        let mut out: Vec<Mutation> = self
            .inserts
            .iter()
            .map(|c| Mutation {
                kind: MutationKind::Insert,
                candle: c.clone(),
            })
            .chain(self.updates.iter().map(|c| Mutation {
                kind: MutationKind::Update,
                candle: c.clone(),
            }))
            .collect();
        out.sort_by_key(|m| m.candle.open_time);
        out
    }
}

/// Compares a normalized window against the stored rows of the same span.
///
/// - absent: insert
/// - present, completion not tracked: unchanged (append-if-absent)
/// - present and stored incomplete: update if any value or the completion flag differs,
///   otherwise unchanged
/// - present and stored complete: unchanged; a computed "incomplete" there means the
///   reference time regressed and is counted in `skew_ignored`, never written back
pub fn plan(
    window: &[Candle],
    existing: &BTreeMap<i64, Candle>,
    policy: &ReconcilePolicy,
) -> SeriesDiff {
    let mut diff = SeriesDiff::default();
    for candle in window {
        match existing.get(&candle.open_time) {
            None => diff.inserts.push(candle.clone()),
            Some(_) if !policy.track_completion => diff.unchanged += 1,
            Some(stored) if !stored.is_completed => {
                if stored == candle {
                    diff.unchanged += 1;
                } else {
                    diff.updates.push(candle.clone());
                }
            }
            Some(_) if candle.is_completed => diff.unchanged += 1,
            Some(_) => diff.skew_ignored += 1,
        }
    }
    diff
}

impl fmt::Display for SeriesDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return writeln!(f, "No changes ({} unchanged)", self.unchanged + self.skew_ignored);
        }

        let mut wrote_any = false;
        let mut section = |title: &str, mark: char, rows: &[Candle]| -> fmt::Result {
            if rows.is_empty() {
                return Ok(());
            }
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.len()))?;
            for c in rows {
                let state = if c.is_completed { "complete" } else { "forming" };
                writeln!(f, "{mark} {} close={} {state}", c.open_time, c.close)?;
            }
            wrote_any = true;
            Ok(())
        };

        section("Inserts", '+', &self.inserts)?;
        section("Updates", '~', &self.updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close: f64, done: bool) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            tick_volume: 0,
            spread: 0,
            real_volume: 0,
            is_completed: done,
        }
    }

    fn stored(rows: &[Candle]) -> BTreeMap<i64, Candle> {
        rows.iter().map(|c| (c.open_time, c.clone())).collect()
    }

    #[test]
    fn rules_cover_every_stored_state() {
        let window = vec![
            candle(100, 1.0, true),  // stored complete -> unchanged
            candle(160, 1.0, true),  // stored incomplete, now complete -> update
            candle(220, 1.1, false), // stored incomplete, new close -> update
            candle(280, 1.0, false), // stored complete, computed incomplete -> skew
            candle(340, 1.0, false), // absent -> insert
            candle(400, 1.0, false), // stored incomplete, identical -> unchanged
        ];
        let existing = stored(&[
            candle(100, 0.9, true),
            candle(160, 1.0, false),
            candle(220, 1.0, false),
            candle(280, 1.0, true),
            candle(400, 1.0, false),
        ]);

        let diff = plan(&window, &existing, &ReconcilePolicy::live());
        assert_eq!(diff.inserts.iter().map(|c| c.open_time).collect::<Vec<_>>(), vec![340]);
        assert_eq!(diff.updates.iter().map(|c| c.open_time).collect::<Vec<_>>(), vec![160, 220]);
        assert_eq!(diff.unchanged, 2);
        assert_eq!(diff.skew_ignored, 1);
        assert_eq!(
            diff.mutations().iter().map(|m| m.candle.open_time).collect::<Vec<_>>(),
            vec![160, 220, 340]
        );
    }

    #[test]
    fn backfill_policy_only_appends() {
        let window = vec![candle(100, 1.0, true), candle(160, 1.0, true)];
        let existing = stored(&[candle(100, 2.0, false)]);

        let diff = plan(&window, &existing, &ReconcilePolicy::backfill());
        assert_eq!(diff.inserts.len(), 1);
        assert!(diff.updates.is_empty());
        assert_eq!(diff.unchanged, 1);
    }

    #[test]
    fn display_lists_planned_rows() {
        let window = vec![candle(160, 1.25, true), candle(220, 1.3, false)];
        let existing = stored(&[candle(100, 1.1, true), candle(160, 1.2, false)]);
        let diff = plan(&window, &existing, &ReconcilePolicy::live());

        insta::assert_snapshot!(diff.to_string().trim_end(), @r"
Inserts
-------
+ 220 close=1.3 forming

Updates
-------
~ 160 close=1.25 complete
");
    }

    #[test]
    fn noop_display() {
        let diff = plan(
            &[candle(100, 1.0, true)],
            &stored(&[candle(100, 1.0, true)]),
            &ReconcilePolicy::live(),
        );
        assert!(diff.is_noop());
        assert_eq!(diff.to_string(), "No changes (1 unchanged)\n");
    }
}
