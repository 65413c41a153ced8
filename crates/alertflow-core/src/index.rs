//! Inverted index engine: three value→handles mappings with wildcard
//! buckets, intersected per alert.
//!
//! Handles are dense u32s assigned in snapshot order during build, so every
//! bucket vector is already sorted ascending and membership checks are
//! binary searches. The index is immutable after build; the evaluator swaps
//! whole generations.

use std::collections::{BTreeMap, HashMap};

use crate::snapshot::RuleSnapshot;
use crate::types::{ClientId, Handle, RuleId, WILDCARD};

#[derive(Clone, Debug)]
struct HandleEntry {
    rule_id: RuleId,
    client_id: ClientId,
}

/// One axis of the index at match time: the exact bucket for the alert's
/// token plus the `*` bucket. Either slice may be empty.
#[derive(Clone, Copy)]
struct Axis<'a> {
    exact: &'a [Handle],
    wild: &'a [Handle],
}

impl<'a> Axis<'a> {
    fn resolve(map: &'a HashMap<String, Vec<Handle>>, token: &str) -> Axis<'a> {
        let slice = |key: &str| map.get(key).map(Vec::as_slice).unwrap_or(&[]);
        Axis {
            exact: slice(token),
            wild: slice(WILDCARD),
        }
    }

    fn len(&self) -> usize {
        self.exact.len() + self.wild.len()
    }

    fn contains(&self, handle: Handle) -> bool {
        self.exact.binary_search(&handle).is_ok() || self.wild.binary_search(&handle).is_ok()
    }

    fn iter(self) -> impl Iterator<Item = Handle> + 'a {
        self.exact.iter().chain(self.wild.iter()).copied()
    }
}

/// Immutable three-way inverted index over one rule snapshot generation.
pub struct RuleIndex {
    handles: Vec<HandleEntry>,
    by_severity: HashMap<String, Vec<Handle>>,
    by_source: HashMap<String, Vec<Handle>>,
    by_name: HashMap<String, Vec<Handle>>,
}

impl RuleIndex {
    /// Build from a decoded snapshot. Deterministic and side-effect free:
    /// two builds over the same snapshot produce equivalent indexes.
    /// Disabled rules and all-wildcard rules (illegal upstream) contribute
    /// nothing.
    pub fn build(snapshot: &RuleSnapshot) -> RuleIndex {
        let mut index = RuleIndex {
            handles: Vec::new(),
            by_severity: HashMap::new(),
            by_source: HashMap::new(),
            by_name: HashMap::new(),
        };
        for rule in &snapshot.rules {
            if !rule.enabled || rule.is_all_wildcard() {
                continue;
            }
            let handle = index.handles.len() as Handle;
            index.handles.push(HandleEntry {
                rule_id: rule.rule_id,
                client_id: rule.client_id.clone(),
            });
            index
                .by_severity
                .entry(rule.severity.clone())
                .or_default()
                .push(handle);
            index
                .by_source
                .entry(rule.source.clone())
                .or_default()
                .push(handle);
            index
                .by_name
                .entry(rule.name.clone())
                .or_default()
                .push(handle);
        }
        index
    }

    /// All rules matching the three alert fields, grouped by tenant.
    /// `rule_ids` within a tenant are ascending by handle, which makes the
    /// output deterministic for a given index.
    ///
    /// Never fails; unknown tokens simply have an empty exact bucket, so
    /// only `*` rules can match on that axis.
    pub fn matches(
        &self,
        severity: &str,
        source: &str,
        name: &str,
    ) -> BTreeMap<ClientId, Vec<RuleId>> {
        let axes = [
            Axis::resolve(&self.by_severity, severity),
            Axis::resolve(&self.by_source, source),
            Axis::resolve(&self.by_name, name),
        ];
        // Drive the intersection from the smallest candidate union; the work
        // is then bounded by the tightest constraint.
        let driver = (0..axes.len())
            .min_by_key(|&i| axes[i].len())
            .unwrap_or(0);

        let mut survivors: Vec<Handle> = Vec::new();
        for handle in axes[driver].iter() {
            let in_all = axes
                .iter()
                .enumerate()
                .all(|(i, axis)| i == driver || axis.contains(handle));
            if in_all {
                survivors.push(handle);
            }
        }
        // The driver iterates exact then wild, so restore handle order.
        survivors.sort_unstable();

        let mut grouped: BTreeMap<ClientId, Vec<RuleId>> = BTreeMap::new();
        for handle in survivors {
            let entry = &self.handles[handle as usize];
            grouped
                .entry(entry.client_id.clone())
                .or_default()
                .push(entry.rule_id);
        }
        grouped
    }

    /// Number of indexed rules.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
