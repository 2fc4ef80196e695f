//! Reference-count engine.
//!
//! Given a snapshot of the dependency graph around a set of target uploads,
//! computes the reference-count writes needed to keep every affected upload
//! consistent after the targets are inserted, re-checked, or removed.
//!
//! The computation runs in staged passes over flat, id-keyed relations:
//!
//! 1. coordinates provided by the targets
//! 2. canonical (rank 1) provider per coordinate, re-ranked with the targets
//!    present or absent depending on the mode
//! 3. full recount for every upload whose canonical status may have changed
//! 4. incremental adjustment for canonical providers the targets depend on
//!
//! The store supplies the snapshot and applies the returned updates, which are
//! ordered by ascending upload id so row locks are always taken in that order.

use crate::package::PackageCoordinate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use time::OffsetDateTime;

/// How the target uploads participate in a reference-count update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceCountMode {
    /// Recompute the targets in place; dependency counts are left alone.
    None,
    /// Targets are present; each outgoing edge adds one to its canonical provider.
    Add,
    /// Targets are treated as absent; each outgoing edge removes one.
    Remove,
}

impl ReferenceCountMode {
    /// Per-edge delta applied to dependency providers.
    pub fn delta(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Add => 1,
            Self::Remove => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// A completed upload providing one package coordinate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRow {
    pub upload_id: i64,
    pub committed_at: Option<OffsetDateTime>,
    pub coordinate: PackageCoordinate,
}

/// A directed edge from an upload to a coordinate it depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceEdge {
    pub upload_id: i64,
    pub coordinate: PackageCoordinate,
}

/// The part of the dependency graph an update reads.
#[derive(Clone, Debug, Default)]
pub struct ReferenceGraph {
    /// Coordinates provided by the target uploads, regardless of their state.
    pub target_packages: Vec<PackageCoordinate>,
    /// Completed providers of every coordinate the update touches.
    pub providers: Vec<ProviderRow>,
    /// References to every coordinate the update touches, including the
    /// targets' own outgoing references.
    pub references: Vec<ReferenceEdge>,
}

/// A single reference-count write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountChange {
    /// Overwrite with a freshly computed count.
    Set(i64),
    /// Add to the stored count, saturating at zero.
    Adjust(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceCountUpdate {
    pub upload_id: i64,
    pub change: CountChange,
}

impl CountChange {
    /// Apply to a stored count.
    pub fn apply(&self, current: i64) -> i64 {
        match *self {
            Self::Set(count) => count.max(0),
            Self::Adjust(delta) => (current + delta).max(0),
        }
    }
}

/// Canonical ordering between two providers of the same coordinate.
///
/// Oldest commit date first, unknown dates last, upload id as tie-break.
pub fn canonical_order(a: &ProviderRow, b: &ProviderRow) -> Ordering {
    match (a.committed_at, b.committed_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.upload_id.cmp(&b.upload_id))
}

/// Pick the rank-1 provider of each coordinate, ignoring `excluded` uploads.
pub fn canonical_providers<'a>(
    providers: &'a [ProviderRow],
    excluded: &BTreeSet<i64>,
) -> HashMap<&'a PackageCoordinate, &'a ProviderRow> {
    let mut canonical: HashMap<&PackageCoordinate, &ProviderRow> = HashMap::new();
    for provider in providers {
        if excluded.contains(&provider.upload_id) {
            continue;
        }
        canonical
            .entry(&provider.coordinate)
            .and_modify(|current| {
                if canonical_order(provider, current) == Ordering::Less {
                    *current = provider;
                }
            })
            .or_insert(provider);
    }
    canonical
}

/// Uploads whose count is fully recomputed by an update over `targets`.
///
/// These are the targets themselves (unless they are being removed) plus every
/// other completed provider of a coordinate a target provides, since adding or
/// removing a candidate can move the canonical choice between them.
pub fn recomputed_uploads(
    targets: &BTreeSet<i64>,
    mode: ReferenceCountMode,
    graph: &ReferenceGraph,
) -> BTreeSet<i64> {
    let target_packages: BTreeSet<&PackageCoordinate> = graph.target_packages.iter().collect();
    let mut recomputed: BTreeSet<i64> = if mode == ReferenceCountMode::Remove {
        BTreeSet::new()
    } else {
        targets.clone()
    };
    for provider in &graph.providers {
        if mode == ReferenceCountMode::Remove && targets.contains(&provider.upload_id) {
            continue;
        }
        if target_packages.contains(&provider.coordinate) {
            recomputed.insert(provider.upload_id);
        }
    }
    recomputed
}

/// Compute the reference-count writes for `targets` under `mode`.
///
/// Recomputed uploads get a `Set` with the number of distinct other uploads
/// referencing a coordinate they canonically provide. Canonical providers the
/// targets depend on, when not already recomputed, get an `Adjust` by
/// `mode.delta()` per incoming target edge. The result is sorted by upload id.
pub fn plan_reference_counts(
    targets: &[i64],
    mode: ReferenceCountMode,
    graph: &ReferenceGraph,
) -> Vec<ReferenceCountUpdate> {
    let targets: BTreeSet<i64> = targets.iter().copied().collect();
    if targets.is_empty() {
        return Vec::new();
    }

    let excluded = if mode == ReferenceCountMode::Remove {
        targets.clone()
    } else {
        BTreeSet::new()
    };
    let canonical = canonical_providers(&graph.providers, &excluded);
    let recomputed = recomputed_uploads(&targets, mode, graph);

    // Distinct referencing uploads per coordinate; removed targets no longer count.
    let mut referrers: HashMap<&PackageCoordinate, BTreeSet<i64>> = HashMap::new();
    for edge in &graph.references {
        if excluded.contains(&edge.upload_id) {
            continue;
        }
        referrers
            .entry(&edge.coordinate)
            .or_default()
            .insert(edge.upload_id);
    }

    let mut updates: BTreeMap<i64, CountChange> = recomputed
        .iter()
        .map(|&id| (id, CountChange::Set(0)))
        .collect();

    for (coordinate, provider) in &canonical {
        let Some(CountChange::Set(count)) = updates.get_mut(&provider.upload_id) else {
            continue;
        };
        if let Some(ids) = referrers.get(coordinate) {
            *count += ids.iter().filter(|&&id| id != provider.upload_id).count() as i64;
        }
    }

    let delta = mode.delta();
    if delta != 0 {
        let mut target_edges: BTreeSet<(i64, &PackageCoordinate)> = BTreeSet::new();
        for edge in &graph.references {
            if targets.contains(&edge.upload_id) {
                target_edges.insert((edge.upload_id, &edge.coordinate));
            }
        }

        let mut adjustments: BTreeMap<i64, i64> = BTreeMap::new();
        for (source, coordinate) in target_edges {
            let Some(provider) = canonical.get(coordinate) else {
                continue;
            };
            if provider.upload_id == source || recomputed.contains(&provider.upload_id) {
                continue;
            }
            *adjustments.entry(provider.upload_id).or_default() += delta;
        }

        for (id, adjustment) in adjustments {
            if adjustment != 0 {
                updates.insert(id, CountChange::Adjust(adjustment));
            }
        }
    }

    updates
        .into_iter()
        .map(|(upload_id, change)| ReferenceCountUpdate { upload_id, change })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn pkg(name: &str) -> PackageCoordinate {
        PackageCoordinate::new("npm", name, "1.0.0").unwrap()
    }

    fn provider(upload_id: i64, committed_at: Option<OffsetDateTime>, name: &str) -> ProviderRow {
        ProviderRow {
            upload_id,
            committed_at,
            coordinate: pkg(name),
        }
    }

    fn edge(upload_id: i64, name: &str) -> ReferenceEdge {
        ReferenceEdge {
            upload_id,
            coordinate: pkg(name),
        }
    }

    fn as_map(updates: &[ReferenceCountUpdate]) -> BTreeMap<i64, CountChange> {
        updates.iter().map(|u| (u.upload_id, u.change)).collect()
    }

    const T0: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
    const T1: OffsetDateTime = datetime!(2024-02-01 00:00 UTC);

    #[test]
    fn test_canonical_prefers_oldest_commit_then_lowest_id() {
        let providers = vec![
            provider(3, Some(T1), "pkg"),
            provider(2, Some(T0), "pkg"),
            provider(1, Some(T0), "pkg"),
            provider(4, None, "pkg"),
        ];
        let canonical = canonical_providers(&providers, &BTreeSet::new());
        assert_eq!(canonical[&pkg("pkg")].upload_id, 1);

        let excluded: BTreeSet<i64> = [1, 2].into_iter().collect();
        let canonical = canonical_providers(&providers, &excluded);
        assert_eq!(canonical[&pkg("pkg")].upload_id, 3);
    }

    #[test]
    fn test_unknown_commit_dates_sort_last_but_sentinel_sorts_first() {
        let providers = vec![
            provider(1, None, "pkg"),
            provider(2, Some(T1), "pkg"),
            provider(3, Some(crate::UNKNOWN_COMMIT_DATE), "pkg"),
        ];
        let canonical = canonical_providers(&providers, &BTreeSet::new());
        assert_eq!(canonical[&pkg("pkg")].upload_id, 3);
    }

    #[test]
    fn test_none_mode_recomputes_targets_and_siblings() {
        // A and B both provide pkg; C already references it.
        let graph = ReferenceGraph {
            target_packages: vec![pkg("pkg")],
            providers: vec![provider(1, Some(T0), "pkg"), provider(2, Some(T1), "pkg")],
            references: vec![edge(3, "pkg")],
        };
        let updates = plan_reference_counts(&[1, 2], ReferenceCountMode::None, &graph);
        assert_eq!(
            updates,
            vec![
                ReferenceCountUpdate {
                    upload_id: 1,
                    change: CountChange::Set(1)
                },
                ReferenceCountUpdate {
                    upload_id: 2,
                    change: CountChange::Set(0)
                },
            ]
        );
    }

    #[test]
    fn test_add_mode_increments_canonical_dependency_only() {
        // C (3) provides nothing and references pkg, provided by A (1) and B (2).
        let graph = ReferenceGraph {
            target_packages: vec![],
            providers: vec![provider(1, Some(T0), "pkg"), provider(2, Some(T1), "pkg")],
            references: vec![edge(3, "pkg")],
        };
        let updates = as_map(&plan_reference_counts(&[3], ReferenceCountMode::Add, &graph));
        assert_eq!(updates.get(&3), Some(&CountChange::Set(0)));
        assert_eq!(updates.get(&1), Some(&CountChange::Adjust(1)));
        assert_eq!(updates.get(&2), None);
    }

    #[test]
    fn test_remove_mode_promotes_next_provider() {
        // Removing A (1) makes B (2) canonical for pkg, referenced by C (3).
        let graph = ReferenceGraph {
            target_packages: vec![pkg("pkg")],
            providers: vec![provider(1, Some(T0), "pkg"), provider(2, Some(T1), "pkg")],
            references: vec![edge(3, "pkg")],
        };
        let updates = as_map(&plan_reference_counts(&[1], ReferenceCountMode::Remove, &graph));
        assert_eq!(updates.get(&2), Some(&CountChange::Set(1)));
        assert_eq!(updates.get(&1), None, "removed uploads are not rewritten");
    }

    #[test]
    fn test_remove_mode_ignores_target_references() {
        // C (3) is removed: its edge to pkg no longer counts for A (1).
        let graph = ReferenceGraph {
            target_packages: vec![],
            providers: vec![provider(1, Some(T0), "pkg")],
            references: vec![edge(3, "pkg"), edge(4, "pkg")],
        };
        let updates = as_map(&plan_reference_counts(&[3], ReferenceCountMode::Remove, &graph));
        assert_eq!(updates.get(&1), Some(&CountChange::Adjust(-1)));
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn test_recount_spans_every_coordinate_provided() {
        // Upload 1 canonically provides a and b; only a is touched by target 2.
        let graph = ReferenceGraph {
            target_packages: vec![pkg("a")],
            providers: vec![
                provider(1, Some(T0), "a"),
                provider(1, Some(T0), "b"),
                provider(2, Some(T1), "a"),
            ],
            references: vec![edge(5, "a"), edge(6, "b"), edge(7, "b")],
        };
        let updates = as_map(&plan_reference_counts(&[2], ReferenceCountMode::None, &graph));
        assert_eq!(updates.get(&1), Some(&CountChange::Set(3)));
        assert_eq!(updates.get(&2), Some(&CountChange::Set(0)));
    }

    #[test]
    fn test_self_references_are_not_counted() {
        let graph = ReferenceGraph {
            target_packages: vec![pkg("pkg")],
            providers: vec![provider(1, Some(T0), "pkg")],
            references: vec![edge(1, "pkg"), edge(2, "pkg")],
        };
        let updates = as_map(&plan_reference_counts(&[1], ReferenceCountMode::Add, &graph));
        assert_eq!(updates.get(&1), Some(&CountChange::Set(1)));
    }

    #[test]
    fn test_updates_are_sorted_by_id() {
        let graph = ReferenceGraph {
            target_packages: vec![pkg("pkg")],
            providers: vec![
                provider(9, Some(T0), "pkg"),
                provider(4, Some(T1), "pkg"),
                provider(7, Some(T1), "pkg"),
            ],
            references: vec![],
        };
        let updates = plan_reference_counts(&[9], ReferenceCountMode::None, &graph);
        let ids: Vec<i64> = updates.iter().map(|u| u.upload_id).collect();
        assert_eq!(ids, vec![4, 7, 9]);
    }

    #[test]
    fn test_empty_targets_is_noop() {
        let graph = ReferenceGraph::default();
        assert!(plan_reference_counts(&[], ReferenceCountMode::Add, &graph).is_empty());
    }

    #[test]
    fn test_count_change_saturates_at_zero() {
        assert_eq!(CountChange::Adjust(-3).apply(1), 0);
        assert_eq!(CountChange::Adjust(2).apply(1), 3);
        assert_eq!(CountChange::Set(5).apply(1), 5);
    }
}
