use core_types::{EvaluationWindow, MarketRegimeSnapshot, RegimeLabel};
use std::collections::BTreeMap;

/// The regime that dominated `window`.
///
/// The label with the most snapshots inside the window wins. A tie goes to
/// whichever tied label was observed most recently. Without any snapshot in the
/// window the `carried` label (the last one known before it) is returned.
pub fn dominant_regime(
    snapshots: &[MarketRegimeSnapshot],
    window: EvaluationWindow,
    carried: Option<RegimeLabel>,
) -> Option<RegimeLabel> {
    // label -> (count, latest timestamp)
    let mut tally: BTreeMap<RegimeLabel, (usize, chrono::DateTime<chrono::Utc>)> = BTreeMap::new();
    for snapshot in snapshots.iter().filter(|s| window.contains(s.timestamp)) {
        let entry = tally
            .entry(snapshot.regime_label)
            .or_insert((0, snapshot.timestamp));
        entry.0 += 1;
        entry.1 = entry.1.max(snapshot.timestamp);
    }

    tally
        .into_iter()
        .max_by(|(_, (count_a, seen_a)), (_, (count_b, seen_b))| {
            count_a.cmp(count_b).then(seen_a.cmp(seen_b))
        })
        .map(|(label, _)| label)
        .or(carried)
}
