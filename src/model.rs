// Build data model shared by storage, scoring and decoding.

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of artifact/relic slots on a build.
pub const ARTIFACT_SLOTS: usize = 5;
/// Maximum number of distinct sub-stat keys on one artifact.
pub const MAX_SUB_STATS: usize = 4;

/// Which game a player, build or catalog belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Genshin,
    Starrail,
}

impl Game {
    pub fn as_str(self) -> &'static str {
        match self {
            Game::Genshin => "genshin",
            Game::Starrail => "starrail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "genshin" => Some(Game::Genshin),
            "starrail" | "hsr" => Some(Game::Starrail),
            _ => None,
        }
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A main stat as stored: key plus (possibly malformed) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStat {
    pub key: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: Option<f64>,
}

/// One sub-stat line as delivered by the upstream game-data API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubStat {
    pub key: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: Option<f64>,
    /// Upgrade rolls that contributed to `value`.
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

/// One artifact (Genshin) or relic (Star Rail) slot of a stored build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArtifact {
    /// Artifact/relic set id, looked up in the set catalog.
    #[serde(default)]
    pub set_id: Option<String>,
    pub main_stat: RawStat,
    #[serde(default)]
    pub sub_stats: Vec<RawSubStat>,
}

/// A persisted build row after the storage layer has unpacked its stat blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawBuildRecord {
    pub id: i64,
    pub game: Game,
    pub player_id: i64,
    pub avatar_id: i64,
    pub weapon_id: Option<String>,
    pub level: i32,
    pub ascension: i32,
    pub constellation: i32,
    pub refinement: i32,
    pub artifacts: Vec<RawArtifact>,
    /// Score persisted at ingestion; used for storage-side ordering.
    pub crit_value: f64,
    pub created_at: String,
}

/// Public profile fields shown next to a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlayerSummary {
    pub id: i64,
    pub uid: String,
    pub nickname: String,
    pub level: i32,
    pub region: Option<String>,
}

/// A sub-stat line after normalisation: one entry per distinct key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubStatLine {
    pub key: String,
    pub value: Option<f64>,
    pub count: u32,
}

/// Raw sub-stats whose key is among the first [`MAX_SUB_STATS`] distinct
/// keys of the slot, in input order. Duplicates of an admitted key are kept.
pub fn admitted_sub_stats<'a>(
    raw: &'a [RawSubStat],
) -> impl Iterator<Item = &'a RawSubStat> + 'a {
    let mut keys: Vec<&'a str> = Vec::with_capacity(MAX_SUB_STATS);
    raw.iter().filter(move |stat| {
        let stat: &'a RawSubStat = *stat;
        if keys.contains(&stat.key.as_str()) {
            true
        } else if keys.len() < MAX_SUB_STATS {
            keys.push(&stat.key);
            true
        } else {
            tracing::debug!(key = %stat.key, "dropping sub-stat past the per-slot key limit");
            false
        }
    })
}

/// Collapse raw sub-stats into at most [`MAX_SUB_STATS`] distinct keys.
///
/// Duplicate keys are merged in first-seen order: values that parsed are
/// summed, roll counts are summed (saturating). A key whose every value was
/// malformed is kept with `value: None`. Keys past the fourth distinct one
/// are dropped.
pub fn normalize_sub_stats(raw: &[RawSubStat]) -> Vec<SubStatLine> {
    let mut lines: Vec<SubStatLine> = Vec::with_capacity(MAX_SUB_STATS);
    for stat in admitted_sub_stats(raw) {
        let value = stat.value.filter(|v| v.is_finite());
        if let Some(line) = lines.iter_mut().find(|l| l.key == stat.key) {
            line.value = match (line.value, value) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            };
            line.count = line.count.saturating_add(stat.count);
        } else {
            lines.push(SubStatLine {
                key: stat.key.clone(),
                value,
                count: stat.count,
            });
        }
    }
    lines
}

/// Accept numbers and numeric strings; anything else becomes `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
