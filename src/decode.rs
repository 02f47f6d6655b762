// Build decoder: joins raw build records against a locale's catalogs.
//
// Missing catalog entries fail soft. The affected field is `null` and the
// rest of the build is still emitted, so leaderboards stay complete when a
// catalog lags behind a game patch. Output order always equals input order.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{CatalogEntry, CatalogKind, LocaleCatalog};
use crate::crit::{self, CritBreakdown};
use crate::metrics;
use crate::model::{
    normalize_sub_stats, Game, PlayerSummary, RawArtifact, RawBuildRecord, SubStatLine,
    ARTIFACT_SLOTS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatLine {
    pub key: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSlot {
    /// Raw set id, kept so clients can tell which lookup failed.
    pub set_id: Option<String>,
    pub set: Option<CatalogEntry>,
    pub main_stat: StatLine,
    pub sub_stats: Vec<SubStatLine>,
}

/// Display-ready build. Built per request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedBuild {
    pub id: i64,
    pub game: Game,
    pub avatar_id: i64,
    pub character: Option<CatalogEntry>,
    pub weapon_id: Option<String>,
    pub weapon: Option<CatalogEntry>,
    pub level: i32,
    pub ascension: i32,
    pub constellation: i32,
    pub refinement: i32,
    pub artifacts: Vec<ArtifactSlot>,
    pub crit_value: f64,
    pub crit: CritBreakdown,
    pub player: Option<PlayerSummary>,
    pub created_at: String,
}

fn lookup(
    catalog: &LocaleCatalog,
    kind: CatalogKind,
    game: Game,
    id: &str,
    build_id: i64,
) -> Option<CatalogEntry> {
    let found = catalog.kind(kind).get(id).cloned();
    if found.is_none() {
        metrics::CATALOG_MISSES_TOTAL
            .with_label_values(&[kind.file_stem(game)])
            .inc();
        tracing::debug!(build_id, id, kind = kind.file_stem(game), "catalog entry missing");
    }
    found
}

fn decode_artifact(
    artifact: &RawArtifact,
    catalog: &LocaleCatalog,
    game: Game,
    build_id: i64,
) -> ArtifactSlot {
    let set = artifact
        .set_id
        .as_deref()
        .and_then(|id| lookup(catalog, CatalogKind::ArtifactSet, game, id, build_id));
    ArtifactSlot {
        set_id: artifact.set_id.clone(),
        set,
        main_stat: StatLine {
            key: artifact.main_stat.key.clone(),
            value: artifact.main_stat.value.filter(|v| v.is_finite()),
        },
        sub_stats: normalize_sub_stats(&artifact.sub_stats),
    }
}

/// Decode one record. `player` is attached as given.
pub fn decode_build(
    record: &RawBuildRecord,
    catalog: &LocaleCatalog,
    player: Option<&PlayerSummary>,
) -> DecodedBuild {
    let game = record.game;
    let character = lookup(
        catalog,
        CatalogKind::Character,
        game,
        &record.avatar_id.to_string(),
        record.id,
    );
    let weapon = record
        .weapon_id
        .as_deref()
        .and_then(|id| lookup(catalog, CatalogKind::Weapon, game, id, record.id));
    let artifacts: Vec<ArtifactSlot> = record
        .artifacts
        .iter()
        .take(ARTIFACT_SLOTS)
        .map(|a| decode_artifact(a, catalog, game, record.id))
        .collect();

    let crit = crit::score_artifacts(&record.artifacts);
    if crit.ignored > 0 {
        metrics::MALFORMED_SUB_STATS_TOTAL.inc_by(u64::from(crit.ignored));
        tracing::debug!(build_id = record.id, ignored = crit.ignored, "skipped malformed crit sub-stats");
    }
    if (crit.crit_value - record.crit_value).abs() > 1e-6 {
        // Rows written before a formula change keep their old stored score
        // until the next re-sync.
        tracing::warn!(
            build_id = record.id,
            stored = record.crit_value,
            computed = crit.crit_value,
            "stored crit value differs from computed"
        );
    }

    DecodedBuild {
        id: record.id,
        game,
        avatar_id: record.avatar_id,
        character,
        weapon_id: record.weapon_id.clone(),
        weapon,
        level: record.level,
        ascension: record.ascension,
        constellation: record.constellation,
        refinement: record.refinement,
        artifacts,
        crit_value: crit.crit_value,
        crit,
        player: player.cloned(),
        created_at: record.created_at.clone(),
    }
}

/// Decode records in order against `catalog`, attaching players by id.
///
/// Pure transform: no I/O. Output length and order equal the input's.
pub fn decode_builds(
    records: &[RawBuildRecord],
    catalog: &LocaleCatalog,
    players: &HashMap<i64, PlayerSummary>,
) -> Vec<DecodedBuild> {
    let decoded: Vec<DecodedBuild> = records
        .iter()
        .map(|r| decode_build(r, catalog, players.get(&r.player_id)))
        .collect();
    metrics::BUILDS_DECODED_TOTAL.inc_by(decoded.len() as u64);
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::{RawStat, RawSubStat};

    fn entry(id: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            name: name.into(),
            rarity: 5,
            icon: format!("UI_{id}"),
            set_id: None,
        }
    }

    fn catalog() -> LocaleCatalog {
        LocaleCatalog {
            characters: Catalog::from_entries(vec![
                entry("10000002", "Kamisato Ayaka"),
                entry("10000089", "Furina"),
            ]),
            weapons: Catalog::from_entries(vec![entry("11509", "Mistsplitter Reforged")]),
            artifact_sets: Catalog::from_entries(vec![entry("15020", "Blizzard Strayer")]),
        }
    }

    fn artifact(set: Option<&str>, crit_rate: f64) -> RawArtifact {
        RawArtifact {
            set_id: set.map(String::from),
            main_stat: RawStat {
                key: "FIGHT_PROP_ATTACK_PERCENT".into(),
                value: Some(46.6),
            },
            sub_stats: vec![RawSubStat {
                key: "FIGHT_PROP_CRITICAL".into(),
                value: Some(crit_rate),
                count: 2,
            }],
        }
    }

    fn record(id: i64, avatar_id: i64, weapon: Option<&str>, sets: [Option<&str>; 5]) -> RawBuildRecord {
        let artifacts: Vec<RawArtifact> = sets.iter().map(|s| artifact(*s, 3.0)).collect();
        let crit_value = crit::score_artifacts(&artifacts).crit_value;
        RawBuildRecord {
            id,
            game: Game::Genshin,
            player_id: 7,
            avatar_id,
            weapon_id: weapon.map(String::from),
            level: 90,
            ascension: 6,
            constellation: 0,
            refinement: 1,
            artifacts,
            crit_value,
            created_at: "2024-01-01 00:00:00".into(),
        }
    }

    fn players() -> HashMap<i64, PlayerSummary> {
        HashMap::from([(
            7,
            PlayerSummary {
                id: 7,
                uid: "800000001".into(),
                nickname: "Traveler".into(),
                level: 60,
                region: Some("EU".into()),
            },
        )])
    }

    const FULL: [Option<&str>; 5] = [Some("15020"); 5];

    #[test]
    fn test_all_present_resolves_every_field() {
        let builds = decode_builds(
            &[record(1, 10000002, Some("11509"), FULL)],
            &catalog(),
            &players(),
        );
        let b = &builds[0];
        assert_eq!(b.character.as_ref().unwrap().name, "Kamisato Ayaka");
        assert_eq!(b.weapon.as_ref().unwrap().name, "Mistsplitter Reforged");
        assert_eq!(b.artifacts.len(), 5);
        assert!(b
            .artifacts
            .iter()
            .all(|a| a.set.as_ref().map(|s| s.name.as_str()) == Some("Blizzard Strayer")));
        assert_eq!(b.player.as_ref().unwrap().nickname, "Traveler");
        assert_eq!(b.crit.crit_rate, 15.0);
        assert_eq!(b.crit_value, 30.0);
    }

    #[test]
    fn test_unknown_weapon_is_null_only() {
        let builds = decode_builds(
            &[record(1, 10000002, Some("unknown_weapon_v2"), FULL)],
            &catalog(),
            &players(),
        );
        let b = &builds[0];
        assert!(b.weapon.is_none());
        assert_eq!(b.weapon_id.as_deref(), Some("unknown_weapon_v2"));
        assert!(b.character.is_some());
        assert!(b.artifacts.iter().all(|a| a.set.is_some()));
        assert!(b.player.is_some());
    }

    #[test]
    fn test_missing_character_and_set_are_independent() {
        let mut sets = FULL;
        sets[2] = Some("99999");
        sets[4] = None;
        let builds = decode_builds(&[record(1, 10000999, Some("11509"), sets)], &catalog(), &players());
        let b = &builds[0];
        assert!(b.character.is_none());
        assert!(b.weapon.is_some());
        assert!(b.artifacts[0].set.is_some());
        assert!(b.artifacts[2].set.is_none());
        assert_eq!(b.artifacts[2].set_id.as_deref(), Some("99999"));
        assert!(b.artifacts[4].set.is_none());
        assert!(b.artifacts[3].set.is_some());
    }

    #[test]
    fn test_order_and_length_preserved() {
        let records: Vec<RawBuildRecord> = [5, 3, 9, 1, 4]
            .iter()
            .map(|id| record(*id, 10000089, None, FULL))
            .collect();
        let builds = decode_builds(&records, &catalog(), &HashMap::new());
        let ids: Vec<i64> = builds.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![5, 3, 9, 1, 4]);
        assert!(builds.iter().all(|b| b.player.is_none()));
        assert!(decode_builds(&[], &catalog(), &players()).is_empty());
    }

    #[test]
    fn test_empty_catalog_decodes_without_failing() {
        let builds = decode_builds(
            &[record(1, 10000002, Some("11509"), FULL)],
            &LocaleCatalog::default(),
            &players(),
        );
        assert_eq!(builds.len(), 1);
        assert!(builds[0].character.is_none());
        assert!(builds[0].weapon.is_none());
        assert_eq!(builds[0].crit_value, 30.0);
    }

    #[test]
    fn test_serialises_missing_fields_as_null() {
        let builds = decode_builds(
            &[record(1, 10000002, Some("unknown_weapon_v2"), FULL)],
            &catalog(),
            &players(),
        );
        let json = serde_json::to_value(&builds[0]).unwrap();
        assert!(json["weapon"].is_null());
        assert_eq!(json["character"]["name"], "Kamisato Ayaka");
        assert_eq!(json["crit"]["crit_rate"], 15.0);
    }
}
