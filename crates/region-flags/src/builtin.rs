//! Built-in flags.
//!
//! Each flag is a lazily built static so that every part of the process
//! shares one definition. [`all`] lists them for registry seeding.

use std::sync::LazyLock;

use crate::{Flag, FlagBuilder, FlagKind, FlagValue, RegionGroup, State};

fn state(name: &str, default_allow: bool) -> Flag {
    let builder = Flag::builder(name, FlagKind::State);
    if default_allow {
        builder.default(FlagValue::State(State::Allow)).finish()
    } else {
        builder.finish()
    }
}

fn define(builder: FlagBuilder) -> Flag {
    builder.finish()
}

/// Regions with `passthrough` set to `allow` are ignored by membership checks.
pub static PASSTHROUGH: LazyLock<Flag> = LazyLock::new(|| state("passthrough", false));

/// Overall build permission. Owner/member status counts as `allow` when unset.
pub static BUILD: LazyLock<Flag> = LazyLock::new(|| {
    define(
        Flag::builder("build", FlagKind::State)
            .default(FlagValue::State(State::Allow))
            .membership_default(),
    )
});

pub static BLOCK_BREAK: LazyLock<Flag> = LazyLock::new(|| state("block-break", false));
pub static BLOCK_PLACE: LazyLock<Flag> = LazyLock::new(|| state("block-place", false));
pub static USE: LazyLock<Flag> = LazyLock::new(|| state("use", false));
pub static INTERACT: LazyLock<Flag> = LazyLock::new(|| state("interact", false));
pub static PVP: LazyLock<Flag> = LazyLock::new(|| state("pvp", false));
pub static CHEST_ACCESS: LazyLock<Flag> = LazyLock::new(|| state("chest-access", false));
pub static TNT: LazyLock<Flag> = LazyLock::new(|| state("tnt", false));

pub static MOB_SPAWNING: LazyLock<Flag> = LazyLock::new(|| state("mob-spawning", true));
pub static MOB_DAMAGE: LazyLock<Flag> = LazyLock::new(|| state("mob-damage", true));
pub static FIRE_SPREAD: LazyLock<Flag> = LazyLock::new(|| state("fire-spread", true));
pub static ITEM_DROP: LazyLock<Flag> = LazyLock::new(|| state("item-drop", true));

/// Entry applies to non-members unless a region says otherwise.
pub static ENTRY: LazyLock<Flag> = LazyLock::new(|| {
    define(
        Flag::builder("entry", FlagKind::State)
            .default(FlagValue::State(State::Allow))
            .default_group(RegionGroup::NonMembers),
    )
});

pub static EXIT: LazyLock<Flag> = LazyLock::new(|| {
    define(
        Flag::builder("exit", FlagKind::State)
            .default(FlagValue::State(State::Allow))
            .default_group(RegionGroup::NonMembers),
    )
});

pub static EXIT_OVERRIDE: LazyLock<Flag> =
    LazyLock::new(|| define(Flag::builder("exit-override", FlagKind::Boolean)));

pub static GREETING: LazyLock<Flag> =
    LazyLock::new(|| define(Flag::builder("greeting", FlagKind::String)));

pub static FAREWELL: LazyLock<Flag> =
    LazyLock::new(|| define(Flag::builder("farewell", FlagKind::String)));

pub static HEAL_AMOUNT: LazyLock<Flag> =
    LazyLock::new(|| define(Flag::builder("heal-amount", FlagKind::Integer)));

pub static PRICE: LazyLock<Flag> =
    LazyLock::new(|| define(Flag::builder("price", FlagKind::Double)));

pub static BLOCKED_CMDS: LazyLock<Flag> = LazyLock::new(|| {
    define(Flag::builder(
        "blocked-cmds",
        FlagKind::Set(Box::new(FlagKind::String)),
    ))
});

pub static ALLOWED_CMDS: LazyLock<Flag> = LazyLock::new(|| {
    define(Flag::builder(
        "allowed-cmds",
        FlagKind::Set(Box::new(FlagKind::String)),
    ))
});

/// Every built-in flag.
#[must_use]
pub fn all() -> Vec<Flag> {
    [
        &PASSTHROUGH,
        &BUILD,
        &BLOCK_BREAK,
        &BLOCK_PLACE,
        &USE,
        &INTERACT,
        &PVP,
        &CHEST_ACCESS,
        &TNT,
        &MOB_SPAWNING,
        &MOB_DAMAGE,
        &FIRE_SPREAD,
        &ITEM_DROP,
        &ENTRY,
        &EXIT,
        &EXIT_OVERRIDE,
        &GREETING,
        &FAREWELL,
        &HEAL_AMOUNT,
        &PRICE,
        &BLOCKED_CMDS,
        &ALLOWED_CMDS,
    ]
    .into_iter()
    .map(|flag| LazyLock::force(flag).clone())
    .collect()
}
