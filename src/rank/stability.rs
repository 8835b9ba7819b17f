//! Order stabilization.
//!
//! Small score changes would otherwise reshuffle the list between two
//! openings of the launcher. Both the new ranking and the previously shown
//! order are cut into groups of `group_size`; inside each group, an item
//! that was shown in the same group before keeps its old slot, and the
//! remaining slots are filled in ranked order. Items only move within
//! their group, so a strongly rising item still climbs, one group per
//! ranking.

/// Reorder `ranked` to stay close to `previous`. The result is always a
/// permutation of `ranked`; `group_size == 0` leaves it untouched.
pub fn stabilize<T, S, F>(previous: &[S], ranked: Vec<T>, group_size: usize, identity: F) -> Vec<T>
where
    S: AsRef<str>,
    F: Fn(&T) -> &str,
{
    if group_size == 0 || previous.is_empty() {
        return ranked;
    }

    let mut stabilized = Vec::with_capacity(ranked.len());
    let mut source = ranked.into_iter();
    let mut last_order = previous.chunks(group_size);

    loop {
        let group: Vec<T> = source.by_ref().take(group_size).collect();
        if group.is_empty() {
            return stabilized;
        }

        let Some(id_group) = last_order.next() else {
            stabilized.extend(group);
            stabilized.extend(source);
            return stabilized;
        };

        stabilized.extend(stabilize_group(group, id_group, &identity));
    }
}

fn stabilize_group<T, S, F>(group: Vec<T>, id_group: &[S], identity: &F) -> Vec<T>
where
    S: AsRef<str>,
    F: Fn(&T) -> &str,
{
    let mut remaining: Vec<Option<T>> = group.into_iter().map(Some).collect();
    let mut slots: Vec<Option<T>> = (0..remaining.len()).map(|_| None).collect();

    for (slot, id) in slots.iter_mut().zip(id_group) {
        let found = remaining
            .iter()
            .position(|item| item.as_ref().is_some_and(|item| identity(item) == id.as_ref()));
        if let Some(index) = found {
            *slot = remaining[index].take();
        }
    }

    let mut rest = remaining.into_iter().flatten();
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| rest.next()))
        .collect()
}
