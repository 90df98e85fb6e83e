//! Aggregate state nodes and change tracking
//!
//! The state is a fixed tree of plain structs. Leaf values live in
//! [`Tracked`] cells that raise a flag only when assigned a different value;
//! composite nodes implement [`Trackable`] by delegating to their children, so
//! the root reports a change if anything below it changed.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::error::MutationError;
use crate::journal::{FieldValue, VersionInfo};

/// Change tracking for a state node
pub trait Trackable {
    /// True if this node or any child changed since the last reset
    fn is_changed(&self) -> bool;

    /// Clear the changed flag on this node and all children
    fn reset_changed(&mut self);
}

/// A value with a changed flag
///
/// Equality and serialization see only the value.
#[derive(Clone, Default)]
pub struct Tracked<T> {
    value: T,
    changed: bool,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self { value, changed: false }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: PartialEq> Tracked<T> {
    /// Assign `value`, returning true if it differs from the current one
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.changed = true;
        true
    }
}

impl<T: PartialEq + DeserializeOwned> Tracked<T> {
    /// Assign from an event field
    ///
    /// An absent field leaves the value alone; a present field (including
    /// `null`) must deserialize into `T`.
    pub fn update(&mut self, field: FieldValue<'_>) -> Result<bool, MutationError> {
        self.update_with(field, |value| serde_json::from_value(value.clone()).map_err(|e| e.to_string()))
    }

    /// Assign from an event field through a custom conversion
    pub fn update_with<F>(&mut self, field: FieldValue<'_>, convert: F) -> Result<bool, MutationError>
    where
        F: FnOnce(&Value) -> Result<T, String>,
    {
        match field {
            FieldValue::NoOp => Ok(false),
            FieldValue::Present { key, value } => {
                let value = convert(value).map_err(|reason| MutationError::invalid(key, reason))?;
                Ok(self.set(value))
            }
        }
    }
}

impl<T> Trackable for Tracked<T> {
    fn is_changed(&self) -> bool {
        self.changed
    }

    fn reset_changed(&mut self) {
        self.changed = false;
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: Serialize> Serialize for Tracked<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Tracked<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Tracked::new)
    }
}

/// Implement [`Trackable`] for a composite node by delegating to its fields
macro_rules! impl_trackable {
    ($node:ty { $($field:ident),+ $(,)? }) => {
        impl Trackable for $node {
            fn is_changed(&self) -> bool {
                false $(|| self.$field.is_changed())+
            }

            fn reset_changed(&mut self) {
                $(self.$field.reset_changed();)+
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commander {
    pub name: Tracked<Option<String>>,
    pub frontier_id: Tracked<Option<String>>,
}

impl_trackable!(Commander { name, frontier_id });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub model: Tracked<Option<String>>,
    pub id: Tracked<Option<i64>>,
    pub name: Tracked<Option<String>>,
    pub ident: Tracked<Option<String>>,
}

impl_trackable!(Ship { model, id, name, ident });

/// Pilot ranks and progress towards the next rank (percent)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    pub combat: Tracked<Option<i64>>,
    pub combat_progress: Tracked<Option<i64>>,
    pub trade: Tracked<Option<i64>>,
    pub trade_progress: Tracked<Option<i64>>,
    pub explore: Tracked<Option<i64>>,
    pub explore_progress: Tracked<Option<i64>>,
    pub empire: Tracked<Option<i64>>,
    pub empire_progress: Tracked<Option<i64>>,
    pub federation: Tracked<Option<i64>>,
    pub federation_progress: Tracked<Option<i64>>,
    pub cqc: Tracked<Option<i64>>,
    pub cqc_progress: Tracked<Option<i64>>,
}

impl_trackable!(Rank {
    combat,
    combat_progress,
    trade,
    trade_progress,
    explore,
    explore_progress,
    empire,
    empire_progress,
    federation,
    federation_progress,
    cqc,
    cqc_progress,
});

/// Standing with the major powers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    pub empire: Tracked<Option<f64>>,
    pub federation: Tracked<Option<f64>>,
    pub alliance: Tracked<Option<f64>>,
}

impl_trackable!(Reputation { empire, federation, alliance });

/// An engineer and the commander's standing with them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engineer {
    pub name: String,
    pub id: i64,
    pub progress: String,
    pub rank: Option<i64>,
    pub rank_progress: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub market: Tracked<Option<i64>>,
    pub name: Tracked<Option<String>>,
    #[serde(rename = "type")]
    pub kind: Tracked<Option<String>>,
    pub faction: Tracked<Option<String>>,
    pub government: Tracked<Option<String>>,
    pub services: Tracked<Vec<String>>,
    pub economy: Tracked<Option<String>>,
}

impl_trackable!(Station {
    market,
    name,
    kind,
    faction,
    government,
    services,
    economy,
});

impl Station {
    /// Reset every field to its default, flagging only the ones that change
    pub fn clear(&mut self) {
        self.market.set(None);
        self.name.set(None);
        self.kind.set(None);
        self.faction.set(None);
        self.government.set(None);
        self.services.set(Vec::new());
        self.economy.set(None);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub docked: Tracked<bool>,
    pub supercruise: Tracked<bool>,
    pub system: Tracked<Option<String>>,
    pub address: Tracked<Option<i64>>,
    pub pos: Tracked<Option<[f64; 3]>>,
    pub allegiance: Tracked<Option<String>>,
    pub economy: Tracked<Option<String>>,
    pub economy_second: Tracked<Option<String>>,
    pub government: Tracked<Option<String>>,
    pub security: Tracked<Option<String>>,
    pub population: Tracked<Option<i64>>,
    pub faction: Tracked<Option<String>>,
    pub station: Station,
}

impl_trackable!(Location {
    docked,
    supercruise,
    system,
    address,
    pos,
    allegiance,
    economy,
    economy_second,
    government,
    security,
    population,
    faction,
    station,
});

/// The three material categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialCategory {
    Raw,
    Encoded,
    Manufactured,
}

impl MaterialCategory {
    pub const ALL: [MaterialCategory; 3] = [Self::Raw, Self::Encoded, Self::Manufactured];

    /// Resolve a category name as written by the game
    ///
    /// Accepts any casing, the localisation key form
    /// (`$MICRORESOURCE_CATEGORY_Encoded;`) and `Elements` for raw.
    pub fn parse(name: &str) -> Result<Self, MutationError> {
        let trimmed = name.trim();
        let bare = trimmed
            .strip_prefix('$')
            .map(|s| s.trim_end_matches(';'))
            .unwrap_or(trimmed);
        let lower = bare.to_ascii_lowercase();
        let key = lower.strip_prefix("microresource_category_").unwrap_or(&lower);

        match key {
            "raw" | "elements" => Ok(Self::Raw),
            "encoded" | "data" => Ok(Self::Encoded),
            "manufactured" => Ok(Self::Manufactured),
            _ => Err(MutationError::UnknownCategory(name.to_string())),
        }
    }

    /// Name used in `Materials` events
    pub fn journal_key(self) -> &'static str {
        match self {
            Self::Raw => "Raw",
            Self::Encoded => "Encoded",
            Self::Manufactured => "Manufactured",
        }
    }
}

impl fmt::Display for MaterialCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.journal_key())
    }
}

/// Material inventory: name to count, per category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialStorage {
    raw: BTreeMap<String, u64>,
    encoded: BTreeMap<String, u64>,
    manufactured: BTreeMap<String, u64>,
    #[serde(skip)]
    changed: bool,
}

impl MaterialStorage {
    pub fn category(&self, category: MaterialCategory) -> &BTreeMap<String, u64> {
        match category {
            MaterialCategory::Raw => &self.raw,
            MaterialCategory::Encoded => &self.encoded,
            MaterialCategory::Manufactured => &self.manufactured,
        }
    }

    fn category_mut(&mut self, category: MaterialCategory) -> &mut BTreeMap<String, u64> {
        match category {
            MaterialCategory::Raw => &mut self.raw,
            MaterialCategory::Encoded => &mut self.encoded,
            MaterialCategory::Manufactured => &mut self.manufactured,
        }
    }

    pub fn raw(&self) -> &BTreeMap<String, u64> {
        &self.raw
    }

    pub fn encoded(&self) -> &BTreeMap<String, u64> {
        &self.encoded
    }

    pub fn manufactured(&self) -> &BTreeMap<String, u64> {
        &self.manufactured
    }

    /// Count held of `name` in `category`, zero if never seen
    pub fn count(&self, category: MaterialCategory, name: &str) -> u64 {
        self.category(category).get(name).copied().unwrap_or(0)
    }

    /// Category currently holding `name`, if any
    pub fn find(&self, name: &str) -> Option<MaterialCategory> {
        MaterialCategory::ALL
            .into_iter()
            .find(|c| self.category(*c).contains_key(name))
    }

    /// Add `count` of `name`, returning the new count
    pub fn add(&mut self, category: MaterialCategory, name: &str, count: u64) -> u64 {
        let entry = self.category_mut(category).entry(name.to_string());
        let (previous, current) = match entry {
            std::collections::btree_map::Entry::Vacant(slot) => (None, *slot.insert(count)),
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                let previous = *slot.get();
                let current = previous.saturating_add(count);
                slot.insert(current);
                (Some(previous), current)
            }
        };
        if previous != Some(current) {
            self.changed = true;
        }
        current
    }

    /// Remove `count` of `name`, clamping at zero, returning the new count
    pub fn remove(&mut self, category: MaterialCategory, name: &str, count: u64) -> u64 {
        let map = self.category_mut(category);
        let previous = map.get(name).copied();
        let current = previous.unwrap_or(0).saturating_sub(count);
        map.insert(name.to_string(), current);
        if previous != Some(current) {
            self.changed = true;
        }
        current
    }

    /// Replace a whole category, as reported by a full inventory listing
    pub fn replace(&mut self, category: MaterialCategory, materials: BTreeMap<String, u64>) -> bool {
        let map = self.category_mut(category);
        if *map == materials {
            return false;
        }
        *map = materials;
        self.changed = true;
        true
    }
}

impl PartialEq for MaterialStorage {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.encoded == other.encoded && self.manufactured == other.manufactured
    }
}

impl Trackable for MaterialStorage {
    fn is_changed(&self) -> bool {
        self.changed
    }

    fn reset_changed(&mut self) {
        self.changed = false;
    }
}

/// The aggregate game state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub commander: Commander,
    pub materials: MaterialStorage,
    pub ship: Ship,
    pub rank: Rank,
    pub reputation: Reputation,
    pub engineers: Tracked<BTreeMap<i64, Engineer>>,
    pub location: Location,
    pub credits: Tracked<i64>,
    pub running: Tracked<bool>,
    pub version: Tracked<VersionInfo>,
    pub horizons: Tracked<bool>,
    pub solo: Tracked<bool>,
}

impl_trackable!(GameState {
    commander,
    materials,
    ship,
    rank,
    reputation,
    engineers,
    location,
    credits,
    running,
    version,
    horizons,
    solo,
});

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }
}
