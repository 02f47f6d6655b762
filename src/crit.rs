// Crit value scoring.
//
// crit_value = crit_rate * 2 + crit_damage, summed over artifact sub-stats.
// Used only as a ranking key; always shown with its breakdown.

use serde::Serialize;

use crate::model::{admitted_sub_stats, RawArtifact, RawSubStat, ARTIFACT_SLOTS};

pub const CRIT_RATE_WEIGHT: f64 = 2.0;
pub const CRIT_DAMAGE_WEIGHT: f64 = 1.0;

/// Largest sub-stat value accepted as a real roll total.
pub const MAX_SUB_STAT_VALUE: f64 = 100.0;

/// Semantic kind of a sub-stat key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    CritRate,
    CritDamage,
    Other,
}

impl StatKind {
    /// Classify a stat key from either game's data API.
    pub fn classify(key: &str) -> Self {
        match key {
            "FIGHT_PROP_CRITICAL" | "CriticalChanceBase" | "CriticalChance" | "crit_rate" => {
                StatKind::CritRate
            }
            "FIGHT_PROP_CRITICAL_HURT" | "CriticalDamageBase" | "CriticalDamage" | "crit_dmg" => {
                StatKind::CritDamage
            }
            _ => StatKind::Other,
        }
    }
}

/// A sub-stat value tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedSubStat {
    pub kind: StatKind,
    pub value: Option<f64>,
}

/// Score plus the raw sums it was computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CritBreakdown {
    pub crit_rate: f64,
    pub crit_damage: f64,
    pub crit_value: f64,
    /// Crit sub-stats skipped because their value was unusable.
    pub ignored: u32,
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (0.0..=MAX_SUB_STAT_VALUE).contains(v))
}

/// Sum crit sub-stats into a [`CritBreakdown`]. Never fails; malformed
/// crit values are counted in `ignored` and contribute nothing.
pub fn aggregate<I>(substats: I) -> CritBreakdown
where
    I: IntoIterator<Item = TaggedSubStat>,
{
    let mut out = CritBreakdown::default();
    for stat in substats {
        let slot = match stat.kind {
            StatKind::CritRate => &mut out.crit_rate,
            StatKind::CritDamage => &mut out.crit_damage,
            StatKind::Other => continue,
        };
        match usable(stat.value) {
            Some(v) => *slot += v,
            None => out.ignored += 1,
        }
    }
    out.crit_value = out.crit_rate * CRIT_RATE_WEIGHT + out.crit_damage * CRIT_DAMAGE_WEIGHT;
    out
}

/// Tag raw sub-stats for [`aggregate`].
pub fn tag_sub_stats<'a, I>(raw: I) -> impl Iterator<Item = TaggedSubStat> + 'a
where
    I: IntoIterator<Item = &'a RawSubStat> + 'a,
{
    raw.into_iter().map(|stat| TaggedSubStat {
        kind: StatKind::classify(&stat.key),
        value: stat.value,
    })
}

/// Score a whole build. Both the ingestion path and the read path call this,
/// so the persisted `crit_value` and the decoded one always agree.
///
/// Each raw sub-stat is range-checked on its own before summing, so a bad
/// entry never hides the valid rolls of the same key.
pub fn score_artifacts(artifacts: &[RawArtifact]) -> CritBreakdown {
    let admitted = artifacts
        .iter()
        .take(ARTIFACT_SLOTS)
        .flat_map(|a| admitted_sub_stats(&a.sub_stats));
    aggregate(tag_sub_stats(admitted))
}
