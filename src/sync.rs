use std::collections::BTreeSet;

use crate::catalog::Catalog;

/// Chapters requiring action, derived by comparing two catalogs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub to_fetch: BTreeSet<u32>,
    pub missing: BTreeSet<u32>,
}

/// Diffs the freshly fetched catalog against the persisted one.
///
/// The missing set is recomputed from the fresh catalog alone; the persisted
/// missing set is never trusted or merged. The fetch set is a set difference
/// by key only: a locator change for an already-known chapter number does not
/// trigger a re-fetch, and nothing is ever removed from a store.
pub fn compute_delta(fresh: &Catalog, persisted: Option<&Catalog>) -> Delta {
    let missing = fresh.missing_chapters();

    let to_fetch = match persisted {
        None => fresh.links.keys().copied().collect(),
        Some(prev) if prev.last_chapter == fresh.last_chapter && prev.links == fresh.links => {
            BTreeSet::new()
        }
        Some(prev) => fresh
            .links
            .keys()
            .filter(|&number| !prev.links.contains_key(number))
            .copied()
            .collect(),
    };

    Delta { to_fetch, missing }
}
