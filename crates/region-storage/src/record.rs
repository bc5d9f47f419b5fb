//! Serializable region records and the loader that turns them back into
//! linked regions.
//!
//! A record holds everything a store persists about one region. Flag values
//! are kept as JSON text next to the flag name so that unknown flags survive
//! a load/save cycle untouched, whatever the outer encoding.
//!
//! Loading is forgiving: a record with an unknown shape tag, bad geometry or
//! an invalid ID is dropped, a flag value that does not parse is skipped,
//! and a parent that is missing or would close a cycle is left unset. Each
//! case logs a warning and the remaining records load normally.

use std::sync::Arc;

use hashbrown::HashMap;
use region_core::{Domain, Region, StorageError, StorageResult};
use region_flags::FlagRegistry;
use region_spatial::{BlockPos, ColumnPos, Shape, ShapeKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Owner or member entries of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub unique_ids: Vec<String>,
    pub names: Vec<String>,
    pub groups: Vec<String>,
}

impl DomainRecord {
    #[must_use]
    pub fn from_domain(domain: &Domain) -> Self {
        Self {
            unique_ids: domain
                .players()
                .unique_ids()
                .iter()
                .map(Uuid::to_string)
                .collect(),
            names: domain.players().names().iter().cloned().collect(),
            groups: domain.groups().groups().iter().cloned().collect(),
        }
    }

    /// Rebuild the domain, skipping unique IDs that do not parse.
    #[must_use]
    pub fn to_domain(&self, region: &str) -> Domain {
        let mut domain = Domain::new();
        for raw in &self.unique_ids {
            match Uuid::parse_str(raw) {
                Ok(unique_id) => domain.add_unique_id(unique_id),
                Err(e) => warn!(region, unique_id = %raw, error = %e, "skipping malformed unique id"),
            }
        }
        for name in &self.names {
            domain.add_name(name);
        }
        for group in &self.groups {
            domain.add_group(group);
        }
        domain
    }
}

/// Everything persisted about one region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: String,
    pub namespace: Option<String>,
    /// Shape tag: `cuboid`, `poly2d` or `global`.
    pub shape: String,
    /// Lower corner; for polygons only `y` is meaningful.
    pub min: Option<BlockPos>,
    /// Upper corner; for polygons only `y` is meaningful.
    pub max: Option<BlockPos>,
    pub points: Vec<ColumnPos>,
    pub priority: i32,
    /// Flag name and JSON-encoded value, sorted by name.
    pub flags: Vec<(String, String)>,
    pub owners: DomainRecord,
    pub members: DomainRecord,
    pub parent: Option<String>,
}

impl RegionRecord {
    /// Capture the current state of `region`.
    pub fn from_region(region: &Region) -> StorageResult<Self> {
        let shape = region.shape();
        let (min, max) = shape.bounds().unzip();

        let mut flags = Vec::new();
        for (flag, value) in region.flags() {
            let encoded = serde_json::to_string(&value.marshal())
                .map_err(|e| StorageError::Encoding(format!("flag {} of {}: {e}", flag.name(), region.id())))?;
            flags.push((flag.name().to_owned(), encoded));
        }
        flags.sort();

        Ok(Self {
            id: region.id().to_owned(),
            namespace: region.namespace().map(str::to_owned),
            shape: shape.kind().as_str().to_owned(),
            min,
            max,
            points: match shape.kind() {
                ShapeKind::Polygon => shape.points(),
                ShapeKind::Cuboid | ShapeKind::Global => Vec::new(),
            },
            priority: region.priority(),
            flags,
            owners: DomainRecord::from_domain(&region.owners()),
            members: DomainRecord::from_domain(&region.members()),
            parent: region.parent().map(|parent| parent.id().to_owned()),
        })
    }

    fn shape(&self) -> Option<Shape> {
        let Some(kind) = ShapeKind::parse(&self.shape) else {
            warn!(region = %self.id, shape = %self.shape, "dropping region with unknown shape type");
            return None;
        };

        match kind {
            ShapeKind::Global => Some(Shape::Global),
            ShapeKind::Cuboid => {
                let (Some(min), Some(max)) = (self.min, self.max) else {
                    warn!(region = %self.id, "dropping cuboid without corners");
                    return None;
                };
                Some(Shape::cuboid(min, max))
            }
            ShapeKind::Polygon => {
                let (Some(min), Some(max)) = (self.min, self.max) else {
                    warn!(region = %self.id, "dropping polygon without height range");
                    return None;
                };
                match Shape::polygon(self.points.clone(), min.y, max.y) {
                    Ok(shape) => Some(shape),
                    Err(e) => {
                        warn!(region = %self.id, error = %e, "dropping polygon with bad outline");
                        None
                    }
                }
            }
        }
    }

    /// Build an unlinked region. The parent is attached by [`link_records`].
    fn to_region(&self, registry: &FlagRegistry) -> Option<Region> {
        let shape = self.shape()?;
        let mut region = match Region::new(&self.id, shape) {
            Ok(region) => region,
            Err(e) => {
                warn!(region = %self.id, error = %e, "dropping region");
                return None;
            }
        };
        if let Some(namespace) = &self.namespace {
            region = region.with_namespace(namespace.clone());
        }

        region.set_priority(self.priority);

        let raw: Vec<(&str, Value)> = self
            .flags
            .iter()
            .filter_map(|(name, encoded)| match serde_json::from_str(encoded) {
                Ok(value) => Some((name.as_str(), value)),
                Err(e) => {
                    warn!(region = %self.id, flag = %name, error = %e, "skipping malformed flag value");
                    None
                }
            })
            .collect();
        region.set_flags(registry.unmarshal(raw.iter().map(|(name, value)| (*name, value)), true));

        region.set_owners(self.owners.to_domain(&self.id));
        region.set_members(self.members.to_domain(&self.id));
        Some(region)
    }
}

/// Turn records into regions and relink parents by ID.
#[must_use]
pub fn link_records(records: &[RegionRecord], registry: &FlagRegistry) -> Vec<Arc<Region>> {
    let mut by_id: HashMap<String, Arc<Region>> = HashMap::new();
    let mut loaded = Vec::with_capacity(records.len());

    for record in records {
        if let Some(region) = record.to_region(registry) {
            let region = Arc::new(region);
            by_id.insert(region.id().to_owned(), Arc::clone(&region));
            loaded.push((record, region));
        }
    }

    for (record, region) in &loaded {
        let Some(parent_id) = &record.parent else {
            continue;
        };
        let Some(parent) = by_id.get(&parent_id.to_lowercase()) else {
            warn!(region = region.id(), parent = %parent_id, "unknown parent; leaving region without one");
            continue;
        };
        if let Err(e) = region.set_parent(Some(Arc::clone(parent))) {
            warn!(region = region.id(), error = %e, "leaving region without parent");
        }
    }

    loaded.into_iter().map(|(_, region)| region).collect()
}

/// Records for every region, failing on the first one that cannot be encoded.
pub fn records_of(regions: &[Arc<Region>]) -> StorageResult<Vec<RegionRecord>> {
    regions.iter().map(|region| RegionRecord::from_region(region)).collect()
}

#[cfg(test)]
mod tests {
    use region_flags::{FlagValue, RegionGroup, State, builtin};

    use super::*;

    fn record(id: &str) -> RegionRecord {
        RegionRecord {
            id: id.into(),
            namespace: None,
            shape: "cuboid".into(),
            min: Some(BlockPos::new(0, 0, 0)),
            max: Some(BlockPos::new(4, 4, 4)),
            points: Vec::new(),
            priority: 0,
            flags: Vec::new(),
            owners: DomainRecord::default(),
            members: DomainRecord::default(),
            parent: None,
        }
    }

    #[test]
    fn test_region_round_trip() {
        let registry = FlagRegistry::with_defaults();
        let parent = Arc::new(Region::cuboid("town", (0, 0, 0).into(), (99, 99, 99).into()).unwrap());
        let shop = Arc::new(
            Region::polygon(
                "shop",
                vec![(0, 0).into(), (10, 0).into(), (5, 8).into()],
                10,
                20,
            )
            .unwrap()
            .with_namespace("market"),
        );
        shop.set_parent(Some(Arc::clone(&parent))).unwrap();
        shop.set_priority(3);
        shop.set_flag(&builtin::PVP, Some(FlagValue::State(State::Deny)));
        shop.set_flag(
            builtin::PVP.region_group_flag().unwrap(),
            Some(FlagValue::RegionGroup(RegionGroup::NonMembers)),
        );
        shop.set_flag(&builtin::GREETING, Some(FlagValue::String("hi".into())));
        shop.with_owners_mut(|d| {
            d.add_unique_id(Uuid::from_u128(5));
            d.add_group("staff");
        });
        shop.with_members_mut(|d| d.add_name("bob"));

        let records = records_of(&[Arc::clone(&parent), Arc::clone(&shop)]).unwrap();
        let loaded = link_records(&records, &registry);

        assert_eq!(loaded.len(), 2);
        let reloaded = loaded.iter().find(|r| r.id() == "shop").unwrap();
        assert!(reloaded.same_definition(&shop));
    }

    #[test]
    fn test_unknown_shape_is_dropped() {
        let registry = FlagRegistry::new();
        let mut bad = record("weird");
        bad.shape = "sphere".into();

        let loaded = link_records(&[bad, record("fine")], &registry);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id(), "fine");
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let registry = FlagRegistry::new();
        let mut no_corners = record("nocorners");
        no_corners.max = None;
        let mut bad_id = record("bad id!");
        bad_id.id = "bad id!".into();
        let mut flat_poly = record("flat");
        flat_poly.shape = "poly2d".into();

        let loaded = link_records(&[no_corners, bad_id, flat_poly, record("ok")], &registry);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_malformed_flag_value_skipped() {
        let registry = FlagRegistry::with_defaults();
        let mut rec = record("r");
        rec.flags = vec![
            ("pvp".into(), "\"deny\"".into()),
            ("greeting".into(), "{not json".into()),
            ("heal-amount".into(), "\"lots\"".into()),
        ];

        let loaded = link_records(&[rec], &registry);
        let flags = loaded[0].flags();
        assert_eq!(flags.len(), 1);
        assert_eq!(loaded[0].flag(&builtin::PVP), Some(FlagValue::State(State::Deny)));
    }

    #[test]
    fn test_unknown_flags_survive() {
        let registry = FlagRegistry::with_defaults();
        let mut rec = record("r");
        rec.flags = vec![("other-plugin:thing".into(), "[1,2]".into())];

        let loaded = link_records(&[rec.clone()], &registry);
        let saved = RegionRecord::from_region(&loaded[0]).unwrap();
        assert_eq!(saved.flags, rec.flags);
    }

    #[test]
    fn test_parent_problems_leave_parent_unset() {
        let registry = FlagRegistry::new();
        let mut a = record("a");
        a.parent = Some("b".into());
        let mut b = record("b");
        b.parent = Some("a".into());
        let mut orphan = record("orphan");
        orphan.parent = Some("missing".into());

        let loaded = link_records(&[a, b, orphan], &registry);
        assert_eq!(loaded.len(), 3);

        let with_parent = loaded.iter().filter(|r| r.parent().is_some()).count();
        assert_eq!(with_parent, 1);
    }

    #[test]
    fn test_malformed_unique_id_skipped() {
        let rec = DomainRecord {
            unique_ids: vec!["not-a-uuid".into(), Uuid::from_u128(1).to_string()],
            names: vec!["Alice".into()],
            groups: Vec::new(),
        };

        let domain = rec.to_domain("r");
        assert_eq!(domain.size(), 2);
        assert!(domain.contains_name("alice"));
    }
}
