//! Manager and store working together.

use std::sync::Arc;

use region_core::{
    IndexKind, Player, Region, RegionManager, RegionStore, RemovalStrategy, StorageError,
    StorageResult,
};
use region_flags::{FlagRegistry, FlagValue, RegionGroup, State, builtin};
use region_spatial::BlockPos;
use region_storage::{LmdbStore, MemoryStore};
use uuid::Uuid;

const MAP_SIZE: usize = 16 * 1024 * 1024;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn manager(store: Arc<dyn RegionStore>) -> RegionManager {
    RegionManager::new(
        "world",
        store,
        Arc::new(FlagRegistry::with_defaults()),
        IndexKind::default(),
    )
}

/// A town with a shop inside it, a global region, and some flags.
fn populate(manager: &RegionManager) {
    let global = Arc::new(Region::global());
    global.set_flag(&builtin::MOB_SPAWNING, Some(FlagValue::State(State::Deny)));
    manager.add_region(global);

    let town = Arc::new(Region::cuboid("town", (0, 0, 0).into(), (100, 100, 100).into()).unwrap());
    town.with_members_mut(|d| d.add_group("citizen"));
    town.with_owners_mut(|d| d.add_unique_id(Uuid::from_u128(1)));

    let shop = Arc::new(
        Region::polygon(
            "shop",
            vec![(10, 10).into(), (20, 10).into(), (20, 20).into(), (10, 20).into()],
            0,
            30,
        )
        .unwrap(),
    );
    shop.set_parent(Some(Arc::clone(&town))).unwrap();
    shop.set_priority(5);
    shop.set_flag(&builtin::PVP, Some(FlagValue::State(State::Deny)));
    shop.set_flag(
        builtin::ENTRY.region_group_flag().unwrap(),
        Some(FlagValue::RegionGroup(RegionGroup::Owners)),
    );
    shop.set_flag(
        &builtin::BLOCKED_CMDS,
        Some(FlagValue::Set(vec![FlagValue::String("/tp".into())])),
    );
    manager.add_region(shop);
}

fn assert_same_regions(a: &RegionManager, b: &RegionManager) {
    let left = a.get_regions();
    let right = b.get_regions();
    assert_eq!(left.len(), right.len());
    for (id, region) in &left {
        let other = right.get(id).unwrap_or_else(|| panic!("missing {id}"));
        assert!(region.same_definition(other), "{id} differs");
    }
}

#[test]
fn test_round_trip_memory() {
    init_tracing();
    let store: Arc<dyn RegionStore> = Arc::new(MemoryStore::new());

    let first = manager(Arc::clone(&store));
    populate(&first);
    first.save().unwrap();

    let second = manager(store);
    second.load().unwrap();
    assert_same_regions(&first, &second);
}

#[test]
fn test_round_trip_lmdb() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RegionStore> = Arc::new(LmdbStore::open(dir.path(), MAP_SIZE).unwrap());

    let first = manager(Arc::clone(&store));
    populate(&first);
    first.save().unwrap();

    let second = manager(store);
    second.load().unwrap();
    assert_same_regions(&first, &second);

    let shop = second.get_region("shop").unwrap();
    assert_eq!(shop.parent().unwrap().id(), "town");
}

#[test]
fn test_load_is_idempotent() {
    init_tracing();
    let store: Arc<dyn RegionStore> = Arc::new(MemoryStore::new());
    let writer = manager(Arc::clone(&store));
    populate(&writer);
    writer.save().unwrap();

    let reader = manager(store);
    reader.load().unwrap();
    let first = reader.get_regions();
    reader.load().unwrap();
    let second = reader.get_regions();

    assert_eq!(first.len(), second.len());
    for (id, region) in &first {
        assert!(region.same_definition(&second[id]));
    }
}

#[test]
fn test_incremental_save_lmdb() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RegionStore> = Arc::new(LmdbStore::open(dir.path(), MAP_SIZE).unwrap());

    let writer = manager(Arc::clone(&store));
    populate(&writer);
    assert!(writer.save_changes().unwrap());

    writer.remove_region_with("town", RemovalStrategy::UnsetParentInChildren);
    writer
        .get_region("shop")
        .unwrap()
        .set_flag(&builtin::GREETING, Some(FlagValue::String("welcome".into())));
    assert!(writer.save_changes().unwrap());
    assert!(!writer.save_changes().unwrap());

    let reader = manager(store);
    reader.load().unwrap();
    assert!(!reader.has_region("town"));
    let shop = reader.get_region("shop").unwrap();
    assert!(shop.parent().is_none());
    assert_eq!(
        shop.flag(&builtin::GREETING),
        Some(FlagValue::String("welcome".into()))
    );
}

#[test]
fn test_fallback_to_full_save() {
    init_tracing();
    let memory = Arc::new(MemoryStore::without_partial_saves());
    let writer = manager(Arc::clone(&memory) as Arc<dyn RegionStore>);
    populate(&writer);

    assert!(writer.save_changes().unwrap());
    assert_eq!(memory.len(), 3);

    writer.remove_region("town");
    assert!(writer.save_changes().unwrap());
    assert_eq!(memory.len(), 1);
    assert!(memory.record("__global__").is_some());
}

struct BrokenStore;

impl RegionStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    fn load_all(&self, _registry: &FlagRegistry) -> StorageResult<Vec<Arc<Region>>> {
        Err(StorageError::Malformed("truncated".into()))
    }

    fn save_all(&self, _regions: &[Arc<Region>]) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::other("read-only")))
    }
}

#[test]
fn test_failed_save_keeps_changes_pending() {
    init_tracing();
    let manager = manager(Arc::new(BrokenStore));
    populate(&manager);

    assert!(manager.save_changes().is_err());
    assert!(manager.index().is_dirty());
    assert!(manager.load().is_err());
    assert_eq!(manager.size(), 3);
}

#[test]
fn test_resolution_after_reload() {
    init_tracing();
    let store: Arc<dyn RegionStore> = Arc::new(MemoryStore::new());
    let writer = manager(Arc::clone(&store));
    populate(&writer);
    writer.save().unwrap();

    let reader = manager(store);
    reader.load().unwrap();

    let citizen = Player::new(Uuid::from_u128(9), "carol").with_groups(["citizen"]);
    let stranger = Player::new(Uuid::from_u128(10), "dave");

    let in_shop = reader.applicable_regions(BlockPos::new(15, 5, 15));
    assert_eq!(
        in_shop.query_value(&builtin::PVP, Some(&stranger)),
        Some(FlagValue::State(State::Deny))
    );
    // Top tier is the shop; citizens are members through the town.
    assert!(in_shop.can_build(&citizen));
    assert!(!in_shop.can_build(&stranger));

    let in_town = reader.applicable_regions(BlockPos::new(50, 5, 50));
    assert_eq!(in_town.query_value(&builtin::PVP, None), None);
    assert_eq!(
        in_town.query_value(&builtin::MOB_SPAWNING, None),
        Some(FlagValue::State(State::Deny))
    );

    let outside = reader.applicable_regions(BlockPos::new(500, 5, 500));
    assert!(outside.can_build(&stranger));
}

proptest::proptest! {
    #[test]
    fn test_reload_answers_like_original(
        boxes in proptest::collection::vec((-50i32..50, -50i32..50, 1i32..30, 1i32..30), 1..12),
        probes in proptest::collection::vec((-60i32..80, -60i32..80), 1..16),
    ) {
        let store: Arc<dyn RegionStore> = Arc::new(MemoryStore::new());
        let writer = manager(Arc::clone(&store));
        for (i, (x, z, dx, dz)) in boxes.iter().enumerate() {
            let region = Region::cuboid(&format!("plot_{i}"), (*x, 0, *z).into(), (x + dx, 64, z + dz).into()).unwrap();
            writer.add_region(Arc::new(region));
        }
        writer.save().unwrap();

        let reader = manager(store);
        reader.load().unwrap();
        for (x, z) in probes {
            let pos = BlockPos::new(x, 10, z);
            proptest::prop_assert_eq!(writer.applicable_region_ids(pos), reader.applicable_region_ids(pos));
        }
    }
}
