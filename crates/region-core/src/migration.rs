//! One-shot conversion of legacy name entries to unique IDs.

use hashbrown::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Domain, PlayerDomain, RegionManager, ResolveError, resolver::ProfileService};

/// Outcome of a [`migrate_names_to_uuids`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Regions whose owners or members changed.
    pub regions_changed: usize,
    /// Distinct names that got a unique ID.
    pub resolved: usize,
    /// Distinct names with no profile, sorted.
    pub unresolved: Vec<String>,
}

/// Replace name entries in every region's owners and members with the
/// matching unique IDs.
///
/// Names without a profile stay as names when `keep_names` is set and are
/// dropped otherwise. Changed regions are marked dirty; saving is left to
/// the caller. A failing profile service aborts before any region is
/// touched.
pub fn migrate_names_to_uuids(
    manager: &RegionManager,
    service: &dyn ProfileService,
    keep_names: bool,
) -> Result<MigrationReport, ResolveError> {
    let regions = manager.index().values();

    let mut names: Vec<String> = regions
        .iter()
        .flat_map(|region| {
            let owners = region.owners();
            let members = region.members();
            owners
                .players()
                .names()
                .iter()
                .chain(members.players().names())
                .cloned()
                .collect::<Vec<_>>()
        })
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return Ok(MigrationReport::default());
    }

    info!(world = manager.name(), names = names.len(), "resolving names to unique IDs");

    let resolved: HashMap<String, Uuid> = service
        .find_all_by_name(&names)?
        .into_iter()
        .map(|profile| (profile.name.to_lowercase(), profile.unique_id))
        .collect();

    let mut report = MigrationReport {
        resolved: resolved.len(),
        unresolved: names
            .into_iter()
            .filter(|name| !resolved.contains_key(name))
            .collect(),
        ..MigrationReport::default()
    };

    for region in &regions {
        let owners_changed = region.with_owners_mut(|d| convert(d, &resolved, keep_names));
        let members_changed = region.with_members_mut(|d| convert(d, &resolved, keep_names));
        if owners_changed || members_changed {
            report.regions_changed += 1;
        }
    }

    if !report.unresolved.is_empty() {
        warn!(
            world = manager.name(),
            names = ?report.unresolved,
            kept = keep_names,
            "some names have no unique ID"
        );
    }
    Ok(report)
}

fn convert(domain: &mut Domain, resolved: &HashMap<String, Uuid>, keep_names: bool) -> bool {
    let players = domain.players();
    if players.names().is_empty() {
        return false;
    }

    let mut converted = PlayerDomain::new();
    for unique_id in players.unique_ids() {
        converted.add_unique_id(*unique_id);
    }
    for name in players.names() {
        match resolved.get(name) {
            Some(unique_id) => converted.add_unique_id(*unique_id),
            None if keep_names => converted.add_name(name),
            None => {}
        }
    }

    if converted == *players {
        return false;
    }
    domain.set_players(converted);
    true
}
