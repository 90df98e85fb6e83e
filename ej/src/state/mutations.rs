//! Mutation handlers
//!
//! One small function per journal event type. Each reads the fields it needs
//! from the event and assigns them into the state; fields the record does not
//! carry are left as they are.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::entities::{Engineer, GameState, MaterialCategory, MaterialStorage};
use super::error::MutationError;
use crate::journal::{Event, VersionInfo};
use crate::registry::RoutingRegistry;

/// A registered state mutation
pub type MutationFn = Arc<dyn Fn(&Event, &mut GameState) -> Result<(), MutationError> + Send + Sync>;

/// Event type name to mutations
pub type MutationRegistry = RoutingRegistry<MutationFn>;

/// Wrap a plain function as a [`MutationFn`]
pub fn mutation<F>(f: F) -> MutationFn
where
    F: Fn(&Event, &mut GameState) -> Result<(), MutationError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry holding every built-in mutation
pub fn default_registry() -> MutationRegistry {
    debug!("default_registry: called");
    let mut registry = MutationRegistry::new();

    registry.register("Commander", mutation(commander));
    registry.register("Materials", mutation(materials));
    registry.register("LoadGame", mutation(load_game));
    registry.register("Rank", mutation(rank));
    registry.register("Progress", mutation(progress));
    registry.register("Reputation", mutation(reputation));
    registry.register("EngineerProgress", mutation(engineer_progress));
    registry.register("Loadout", mutation(loadout));
    registry.register_many(&["Location", "FSDJump"], mutation(location));
    registry.register("Docked", mutation(docked));
    registry.register("Undocked", mutation(undocked));
    registry.register("SupercruiseEntry", mutation(supercruise_entry));
    registry.register("SupercruiseExit", mutation(supercruise_exit));
    registry.register("MaterialCollected", mutation(material_collected));
    registry.register("MaterialDiscarded", mutation(material_discarded));
    registry.register("Synthesis", mutation(synthesis));
    registry.register("EngineerCraft", mutation(engineer_craft));
    registry.register("MissionCompleted", mutation(mission_completed));
    registry.register("MaterialTrade", mutation(material_trade));
    registry.register_many(&["Fileheader", "FileHeader"], mutation(fileheader));
    registry.register("Shutdown", mutation(shutdown));

    registry
}

fn required<'a>(value: &'a Value, key: &str) -> Result<&'a Value, MutationError> {
    value.get(key).ok_or_else(|| MutationError::MissingField(key.to_string()))
}

fn string_field(value: &Value, key: &str) -> Result<String, MutationError> {
    required(value, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MutationError::invalid(key, "expected a string"))
}

/// Material counts are stored unsigned; the sign in a record is ignored
fn count_field(value: &Value, key: &str) -> Result<u64, MutationError> {
    let count = required(value, key)?;
    count
        .as_i64()
        .map(i64::unsigned_abs)
        .or_else(|| count.as_u64())
        .ok_or_else(|| MutationError::invalid(key, "expected an integer"))
}

fn category_field(value: &Value, key: &str) -> Result<MaterialCategory, MutationError> {
    MaterialCategory::parse(&string_field(value, key)?)
}

/// Faction fields are a plain name in older journals and an object later on
fn faction_name(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(name) => Ok(Some(name.clone())),
        Value::Object(fields) => match fields.get("Name") {
            Some(Value::String(name)) => Ok(Some(name.clone())),
            _ => Err("faction object without a Name".to_string()),
        },
        other => Err(format!("unexpected faction value: {}", other)),
    }
}

/// Take `items` out of whichever category holds each of them
fn consume(storage: &mut MaterialStorage, items: &Value) -> Result<(), MutationError> {
    let mut apply = |name: &str, count: u64| {
        if let Some(category) = storage.find(name) {
            storage.remove(category, name, count);
        }
    };

    match items {
        Value::Array(entries) => {
            for entry in entries {
                apply(&string_field(entry, "Name")?, count_field(entry, "Count")?);
            }
        }
        Value::Object(map) => {
            for (name, count) in map {
                let count = count
                    .as_i64()
                    .map(i64::unsigned_abs)
                    .ok_or_else(|| MutationError::invalid(name.as_str(), "expected an integer"))?;
                apply(name, count);
            }
        }
        Value::Null => {}
        other => return Err(MutationError::invalid("Materials", format!("unexpected value: {}", other))),
    }
    Ok(())
}

fn commander(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.commander.name.update(event.get_or_noop("Name"))?;
    state.commander.frontier_id.update(event.get_or_noop("FID"))?;
    Ok(())
}

/// Full inventory listing: each listed category replaces what was held
fn materials(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    for category in MaterialCategory::ALL {
        let Some(entries) = event.get(category.journal_key()).and_then(Value::as_array) else {
            continue;
        };
        let mut inventory = BTreeMap::new();
        for entry in entries {
            if entry.get("Name").is_none() || entry.get("Count").is_none() {
                continue;
            }
            let name = string_field(entry, "Name")?;
            let count = count_field(entry, "Count")?;
            *inventory.entry(name).or_insert(0) += count;
        }
        state.materials.replace(category, inventory);
    }
    Ok(())
}

fn ship_fields(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.ship.model.update(event.get_or_noop("Ship"))?;
    state.ship.id.update(event.get_or_noop("ShipID"))?;
    state.ship.name.update(event.get_or_noop("ShipName"))?;
    state.ship.ident.update(event.get_or_noop("ShipIdent"))?;
    Ok(())
}

fn load_game(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.commander.name.update(event.get_or_noop("Commander"))?;
    state.commander.frontier_id.update(event.get_or_noop("FID"))?;
    ship_fields(event, state)?;
    state.credits.update(event.get_or_noop("Credits"))?;
    state.horizons.update(event.get_or_noop("Horizons"))?;

    let solo = Value::from("Solo");
    state.solo.set(*event.get_or("GameMode", &solo) == solo);
    Ok(())
}

fn rank(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let rank = &mut state.rank;
    rank.combat.update(event.get_or_noop("Combat"))?;
    rank.trade.update(event.get_or_noop("Trade"))?;
    rank.explore.update(event.get_or_noop("Explore"))?;
    rank.empire.update(event.get_or_noop("Empire"))?;
    rank.federation.update(event.get_or_noop("Federation"))?;
    rank.cqc.update(event.get_or_noop("CQC"))?;
    Ok(())
}

fn progress(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let rank = &mut state.rank;
    rank.combat_progress.update(event.get_or_noop("Combat"))?;
    rank.trade_progress.update(event.get_or_noop("Trade"))?;
    rank.explore_progress.update(event.get_or_noop("Explore"))?;
    rank.empire_progress.update(event.get_or_noop("Empire"))?;
    rank.federation_progress.update(event.get_or_noop("Federation"))?;
    rank.cqc_progress.update(event.get_or_noop("CQC"))?;
    Ok(())
}

fn reputation(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let reputation = &mut state.reputation;
    reputation.empire.update(event.get_or_noop("Empire"))?;
    reputation.federation.update(event.get_or_noop("Federation"))?;
    reputation.alliance.update(event.get_or_noop("Alliance"))?;
    Ok(())
}

fn engineer_from(value: &Value) -> Option<Engineer> {
    Some(Engineer {
        name: value.get("Engineer")?.as_str()?.to_string(),
        id: value.get("EngineerID")?.as_i64()?,
        progress: value.get("Progress")?.as_str()?.to_string(),
        rank: value.get("Rank").and_then(Value::as_i64),
        rank_progress: value.get("RankProgress").and_then(Value::as_i64),
    })
}

/// Startup form lists every engineer; the update form describes one
fn engineer_progress(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    if let Some(entries) = event.get("Engineers") {
        let entries = entries
            .as_array()
            .ok_or_else(|| MutationError::invalid("Engineers", "expected an array"))?;
        let engineers = entries
            .iter()
            .filter_map(engineer_from)
            .map(|engineer| (engineer.id, engineer))
            .collect();
        state.engineers.set(engineers);
        return Ok(());
    }

    let Some(engineer) = engineer_from(&Value::Object(event.fields().clone())) else {
        return Err(MutationError::MissingField("Engineers".to_string()));
    };
    let mut engineers = state.engineers.get().clone();
    engineers.insert(engineer.id, engineer);
    state.engineers.set(engineers);
    Ok(())
}

fn loadout(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    ship_fields(event, state)
}

fn location(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let location = &mut state.location;
    location.docked.update(event.get_or_noop("Docked"))?;
    location.system.update(event.get_or_noop("StarSystem"))?;
    location.address.update(event.get_or_noop("SystemAddress"))?;
    location.pos.update(event.get_or_noop("StarPos"))?;
    location.allegiance.update(event.get_or_noop("SystemAllegiance"))?;
    location.economy.update(event.get_or_noop("SystemEconomy"))?;
    location.economy_second.update(event.get_or_noop("SystemSecondEconomy"))?;
    location.government.update(event.get_or_noop("SystemGovernment"))?;
    location.security.update(event.get_or_noop("SystemSecurity"))?;
    location.population.update(event.get_or_noop("Population"))?;
    location.faction.update_with(event.get_or_noop("SystemFaction"), faction_name)?;

    if event.name() == "FSDJump" {
        location.supercruise.set(true);
    }
    Ok(())
}

fn docked(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.location.docked.set(true);
    let station = &mut state.location.station;
    station.name.update(event.get_or_noop("StationName"))?;
    station.kind.update(event.get_or_noop("StationType"))?;
    station.market.update(event.get_or_noop("MarketID"))?;
    station.faction.update_with(event.get_or_noop("StationFaction"), faction_name)?;
    station.government.update(event.get_or_noop("StationGovernment"))?;
    station.services.update(event.get_or_noop("StationServices"))?;
    station.economy.update(event.get_or_noop("StationEconomy"))?;
    Ok(())
}

fn undocked(_event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.location.docked.set(false);
    state.location.station.clear();
    Ok(())
}

fn supercruise_entry(_event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.location.supercruise.set(true);
    Ok(())
}

fn supercruise_exit(_event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.location.supercruise.set(false);
    Ok(())
}

/// `Category`, `Name` and `Count` from a single-material event, if all present
fn single_material(event: &Event) -> Result<Option<(MaterialCategory, String, u64)>, MutationError> {
    let fields = Value::Object(event.fields().clone());
    if ["Category", "Name", "Count"].iter().any(|key| fields.get(key).is_none()) {
        return Ok(None);
    }
    Ok(Some((
        category_field(&fields, "Category")?,
        string_field(&fields, "Name")?,
        count_field(&fields, "Count")?,
    )))
}

fn material_collected(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    if let Some((category, name, count)) = single_material(event)? {
        state.materials.add(category, &name, count);
    }
    Ok(())
}

fn material_discarded(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    if let Some((category, name, count)) = single_material(event)? {
        state.materials.remove(category, &name, count);
    }
    Ok(())
}

fn synthesis(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    match event.get("Materials") {
        Some(items) => consume(&mut state.materials, items),
        None => Ok(()),
    }
}

fn engineer_craft(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    match event.get("Ingredients") {
        Some(items) => consume(&mut state.materials, items),
        None => Ok(()),
    }
}

fn mission_completed(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let Some(rewards) = event.get("MaterialsReward").and_then(Value::as_array) else {
        return Ok(());
    };
    for reward in rewards {
        let category = category_field(reward, "Category")?;
        let name = string_field(reward, "Name")?;
        let count = count_field(reward, "Count")?;
        state.materials.add(category, &name, count);
    }
    Ok(())
}

fn material_trade(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    let fields = Value::Object(event.fields().clone());
    let paid = required(&fields, "Paid")?;
    let received = required(&fields, "Received")?;

    let paid_category = category_field(paid, "Category")?;
    let paid_name = string_field(paid, "Material")?;
    let paid_count = count_field(paid, "Quantity")?;
    let received_category = category_field(received, "Category")?;
    let received_name = string_field(received, "Material")?;
    let received_count = count_field(received, "Quantity")?;

    state.materials.remove(paid_category, &paid_name, paid_count);
    state.materials.add(received_category, &received_name, received_count);
    Ok(())
}

fn fileheader(event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.running.set(true);
    state.version.set(VersionInfo::from_header(event));
    Ok(())
}

fn shutdown(_event: &Event, state: &mut GameState) -> Result<(), MutationError> {
    state.running.set(false);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::parse_line;
    use crate::state::entities::Trackable;

    /// Run every mutation for `line` and report whether the state changed
    fn apply(registry: &MutationRegistry, state: &mut GameState, line: &str) -> bool {
        let event = parse_line(line).unwrap();
        registry.invoke_all(event.name(), |handler| handler(&event, state));
        let changed = state.is_changed();
        state.reset_changed();
        changed
    }

    fn record(event: &str, body: &str) -> String {
        if body.is_empty() {
            format!(r#"{{"timestamp":"2018-06-07T08:09:10Z","event":"{}"}}"#, event)
        } else {
            format!(r#"{{"timestamp":"2018-06-07T08:09:10Z","event":"{}",{}}}"#, event, body)
        }
    }

    #[test]
    fn test_commander() {
        let registry = default_registry();
        let mut state = GameState::new();
        assert!(apply(&registry, &mut state, &record("Commander", r#""Name":"X","FID":"F1""#)));
        assert_eq!(state.commander.name.as_deref(), Some("X"));
        assert_eq!(state.commander.frontier_id.as_deref(), Some("F1"));

        assert!(!apply(&registry, &mut state, &record("Commander", r#""Name":"X","FID":"F1""#)));
    }

    #[test]
    fn test_missing_field_is_noop_and_null_resets() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("Commander", r#""Name":"X","FID":"F1""#));

        assert!(!apply(&registry, &mut state, &record("Commander", r#""Name":"X""#)));
        assert_eq!(state.commander.frontier_id.as_deref(), Some("F1"));

        assert!(apply(&registry, &mut state, &record("Commander", r#""FID":null"#)));
        assert_eq!(*state.commander.frontier_id, None);
    }

    #[test]
    fn test_load_game() {
        let registry = default_registry();
        let mut state = GameState::new();
        let line = record(
            "LoadGame",
            r#""Commander":"X","FID":"F1","Horizons":true,"Ship":"Anaconda","ShipID":3,"ShipName":"Tin","ShipIdent":"TN-01","Credits":1000,"GameMode":"Open""#,
        );
        assert!(apply(&registry, &mut state, &line));
        assert_eq!(state.commander.name.as_deref(), Some("X"));
        assert_eq!(state.ship.model.as_deref(), Some("Anaconda"));
        assert_eq!(*state.ship.id, Some(3));
        assert_eq!(*state.credits, 1000);
        assert!(*state.horizons);
        assert!(!*state.solo);
    }

    #[test]
    fn test_load_game_without_mode_is_solo() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("LoadGame", r#""Commander":"X""#));
        assert!(*state.solo);
    }

    #[test]
    fn test_rank_and_progress_are_separate() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("Rank", r#""Combat":3,"Trade":5,"CQC":0"#));
        apply(&registry, &mut state, &record("Progress", r#""Combat":42"#));

        assert_eq!(*state.rank.combat, Some(3));
        assert_eq!(*state.rank.combat_progress, Some(42));
        assert_eq!(*state.rank.trade, Some(5));
        assert_eq!(*state.rank.trade_progress, None);
    }

    #[test]
    fn test_reputation() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("Reputation", r#""Empire":12.5,"Federation":-3.0"#));
        assert_eq!(*state.reputation.empire, Some(12.5));
        assert_eq!(*state.reputation.federation, Some(-3.0));
        assert_eq!(*state.reputation.alliance, None);
    }

    #[test]
    fn test_engineer_progress_list_and_update() {
        let registry = default_registry();
        let mut state = GameState::new();
        let line = record(
            "EngineerProgress",
            r#""Engineers":[{"Engineer":"Felicity Farseer","EngineerID":300100,"Progress":"Unlocked","Rank":5},{"Engineer":"Broken"}]"#,
        );
        apply(&registry, &mut state, &line);
        assert_eq!(state.engineers.len(), 1);
        assert_eq!(state.engineers[&300100].rank, Some(5));

        let update = record(
            "EngineerProgress",
            r#""Engineer":"Tod McQuinn","EngineerID":300260,"Progress":"Invited""#,
        );
        assert!(apply(&registry, &mut state, &update));
        assert_eq!(state.engineers.len(), 2);
        assert_eq!(state.engineers[&300260].progress, "Invited");
    }

    #[test]
    fn test_location_and_fsd_jump() {
        let registry = default_registry();
        let mut state = GameState::new();
        let line = record(
            "Location",
            r#""Docked":true,"StarSystem":"Sol","SystemAddress":10477373803,"StarPos":[0.0,0.0,0.0],"Population":22780919531,"SystemFaction":{"Name":"Mother Gaia"}"#,
        );
        apply(&registry, &mut state, &line);
        assert!(*state.location.docked);
        assert!(!*state.location.supercruise);
        assert_eq!(state.location.system.as_deref(), Some("Sol"));
        assert_eq!(*state.location.pos, Some([0.0, 0.0, 0.0]));
        assert_eq!(state.location.faction.as_deref(), Some("Mother Gaia"));

        let jump = record("FSDJump", r#""StarSystem":"Alpha Centauri","SystemFaction":"Hutton Orbital Truckers""#);
        apply(&registry, &mut state, &jump);
        assert!(*state.location.supercruise);
        assert!(*state.location.docked);
        assert_eq!(state.location.system.as_deref(), Some("Alpha Centauri"));
        assert_eq!(state.location.faction.as_deref(), Some("Hutton Orbital Truckers"));
    }

    #[test]
    fn test_docked_then_undocked() {
        let registry = default_registry();
        let mut state = GameState::new();
        let line = record(
            "Docked",
            r#""StationName":"Abraham Lincoln","StationType":"Orbis","MarketID":128016640,"StationServices":["Refuel","Repair"]"#,
        );
        apply(&registry, &mut state, &line);
        assert!(*state.location.docked);
        assert_eq!(state.location.station.name.as_deref(), Some("Abraham Lincoln"));
        assert_eq!(state.location.station.services.len(), 2);

        assert!(apply(&registry, &mut state, &record("Undocked", r#""StationName":"Abraham Lincoln""#)));
        assert!(!*state.location.docked);
        assert_eq!(*state.location.station.name, None);
        assert!(state.location.station.services.is_empty());
    }

    #[test]
    fn test_supercruise() {
        let registry = default_registry();
        let mut state = GameState::new();
        assert!(apply(&registry, &mut state, &record("SupercruiseEntry", "")));
        assert!(*state.location.supercruise);
        assert!(apply(&registry, &mut state, &record("SupercruiseExit", "")));
        assert!(!*state.location.supercruise);
    }

    #[test]
    fn test_materials_replace_inventory() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("MaterialCollected", r#""Category":"Raw","Name":"carbon","Count":9"#));

        let line = record(
            "Materials",
            r#""Raw":[{"Name":"iron","Count":10},{"Name":"nickel"}],"Encoded":[{"Name":"shieldcyclerecordings","Count":2}]"#,
        );
        assert!(apply(&registry, &mut state, &line));
        assert_eq!(state.materials.count(MaterialCategory::Raw, "iron"), 10);
        assert_eq!(state.materials.count(MaterialCategory::Raw, "carbon"), 0);
        assert_eq!(state.materials.count(MaterialCategory::Encoded, "shieldcyclerecordings"), 2);

        assert!(!apply(&registry, &mut state, &line));
    }

    #[test]
    fn test_material_collected_accumulates() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("MaterialCollected", r#""Category":"Raw","Name":"Iron","Count":3"#));
        apply(&registry, &mut state, &record("MaterialCollected", r#""Category":"Raw","Name":"Iron","Count":2"#));
        assert_eq!(state.materials.raw().get("Iron"), Some(&5));
    }

    #[test]
    fn test_material_discarded_clamps_at_zero() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("MaterialCollected", r#""Category":"Raw","Name":"Iron","Count":5"#));
        apply(&registry, &mut state, &record("MaterialDiscarded", r#""Category":"Raw","Name":"Iron","Count":10"#));
        assert_eq!(state.materials.raw().get("Iron"), Some(&0));
    }

    #[test]
    fn test_material_collected_incomplete_is_ignored() {
        let registry = default_registry();
        let mut state = GameState::new();
        assert!(!apply(&registry, &mut state, &record("MaterialCollected", r#""Name":"Iron","Count":5"#)));
    }

    #[test]
    fn test_material_collected_localised_category() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(
            &registry,
            &mut state,
            &record(
                "MaterialCollected",
                r#""Category":"$MICRORESOURCE_CATEGORY_Encoded;","Name":"scandatabanks","Count":1"#,
            ),
        );
        assert_eq!(state.materials.count(MaterialCategory::Encoded, "scandatabanks"), 1);
    }

    #[test]
    fn test_synthesis_and_engineer_craft_consume_from_held_category() {
        let registry = default_registry();
        let mut state = GameState::new();
        state.materials.add(MaterialCategory::Raw, "iron", 10);
        state.materials.add(MaterialCategory::Manufactured, "heatconductionwiring", 4);
        state.reset_changed();

        assert!(apply(
            &registry,
            &mut state,
            &record("Synthesis", r#""Materials":[{"Name":"iron","Count":3},{"Name":"unknown","Count":1}]"#)
        ));
        assert_eq!(state.materials.count(MaterialCategory::Raw, "iron"), 7);
        assert_eq!(state.materials.find("unknown"), None);

        apply(
            &registry,
            &mut state,
            &record("EngineerCraft", r#""Ingredients":[{"Name":"heatconductionwiring","Count":5}]"#),
        );
        assert_eq!(state.materials.count(MaterialCategory::Manufactured, "heatconductionwiring"), 0);

        apply(&registry, &mut state, &record("EngineerCraft", r#""Ingredients":{"iron":2}"#));
        assert_eq!(state.materials.count(MaterialCategory::Raw, "iron"), 5);
    }

    #[test]
    fn test_mission_rewards() {
        let registry = default_registry();
        let mut state = GameState::new();
        let line = record(
            "MissionCompleted",
            r#""MaterialsReward":[{"Name":"Polonium","Category":"$MICRORESOURCE_CATEGORY_Elements;","Count":2}]"#,
        );
        apply(&registry, &mut state, &line);
        assert_eq!(state.materials.count(MaterialCategory::Raw, "Polonium"), 2);

        assert!(!apply(&registry, &mut state, &record("MissionCompleted", r#""Reward":1000"#)));
    }

    #[test]
    fn test_material_trade() {
        let registry = default_registry();
        let mut state = GameState::new();
        state.materials.add(MaterialCategory::Encoded, "scandatabanks", 12);

        let line = record(
            "MaterialTrade",
            r#""Paid":{"Material":"scandatabanks","Category":"Encoded","Quantity":6},"Received":{"Material":"encodedscandata","Category":"Encoded","Quantity":1}"#,
        );
        apply(&registry, &mut state, &line);
        assert_eq!(state.materials.count(MaterialCategory::Encoded, "scandatabanks"), 6);
        assert_eq!(state.materials.count(MaterialCategory::Encoded, "encodedscandata"), 1);
    }

    #[test]
    fn test_material_trade_missing_side_fails() {
        let registry = default_registry();
        let mut state = GameState::new();
        let event = parse_line(&record("MaterialTrade", r#""Paid":{}"#)).unwrap();
        let handler = &registry.handlers("MaterialTrade")[0];
        assert!(handler(&event, &mut state).is_err());
        assert!(!state.is_changed());
    }

    #[test]
    fn test_fileheader_and_shutdown() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("Fileheader", r#""gameversion":"3.1.4","build":"r172""#));
        assert!(*state.running);
        assert_eq!(state.version.version, "3.1.4");
        assert_eq!(state.version.build, "r172");

        apply(&registry, &mut state, &record("Shutdown", ""));
        assert!(!*state.running);
    }

    #[test]
    fn test_unknown_event_changes_nothing() {
        let registry = default_registry();
        let mut state = GameState::new();
        apply(&registry, &mut state, &record("Commander", r#""Name":"X""#));
        let before = state.clone();

        assert!(!apply(&registry, &mut state, &record("Music", r#""MusicTrack":"NoTrack""#)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_location_handler_registered_for_both_keys() {
        let registry = default_registry();
        assert_eq!(registry.handlers("Location").len(), 1);
        assert_eq!(registry.handlers("FSDJump").len(), 1);
        assert_eq!(registry.handlers("MaterialDiscarded").len(), 1);
        assert!(registry.contains("FileHeader"));
    }
}
