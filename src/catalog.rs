// Locale-scoped game-data catalogs (characters, weapons, artifact sets).
//
// Catalogs are loaded through a `CatalogSource` and cached per (game, locale)
// by `CatalogProvider`. The decoder only ever sees an immutable `LocaleCatalog`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::model::Game;

const MAX_LOCALE_LEN: usize = 16;

/// One catalog row: a character, weapon/light cone or artifact/relic set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub rarity: u8,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Character,
    Weapon,
    ArtifactSet,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [
        CatalogKind::Character,
        CatalogKind::Weapon,
        CatalogKind::ArtifactSet,
    ];

    /// File stem of this catalog for a game; also used as a metric label.
    pub fn file_stem(self, game: Game) -> &'static str {
        match (self, game) {
            (CatalogKind::Character, _) => "characters",
            (CatalogKind::Weapon, Game::Genshin) => "weapons",
            (CatalogKind::Weapon, Game::Starrail) => "light_cones",
            (CatalogKind::ArtifactSet, Game::Genshin) => "artifacts",
            (CatalogKind::ArtifactSet, Game::Starrail) => "relics",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid locale: {0:?}")]
    InvalidLocale(String),

    #[error("no {kind} catalog for {game}/{locale}")]
    Missing {
        game: Game,
        kind: &'static str,
        locale: String,
    },

    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Check that a locale is safe to use as a path segment and cache key.
pub fn validate_locale(locale: &str) -> Result<(), CatalogError> {
    let ok = !locale.is_empty()
        && locale.len() <= MAX_LOCALE_LEN
        && locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CatalogError::InvalidLocale(locale.to_string()))
    }
}

/// An id-keyed catalog of a single kind.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Build from a list; the first entry wins on duplicate ids.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            if map.contains_key(&entry.id) {
                tracing::warn!(id = %entry.id, "duplicate catalog id, keeping first");
                continue;
            }
            map.insert(entry.id.clone(), entry);
        }
        Self { entries: map }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All catalogs for one game in one locale.
#[derive(Debug, Clone, Default)]
pub struct LocaleCatalog {
    pub characters: Catalog,
    pub weapons: Catalog,
    pub artifact_sets: Catalog,
}

impl LocaleCatalog {
    pub fn kind(&self, kind: CatalogKind) -> &Catalog {
        match kind {
            CatalogKind::Character => &self.characters,
            CatalogKind::Weapon => &self.weapons,
            CatalogKind::ArtifactSet => &self.artifact_sets,
        }
    }
}

/// Where catalogs come from. Implementations do blocking I/O.
pub trait CatalogSource: Send + Sync {
    fn load(
        &self,
        game: Game,
        kind: CatalogKind,
        locale: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Reads `<root>/<game>/<locale>/<stem>.json`, each a JSON array of entries.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    root: PathBuf,
}

impl FileCatalogSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, game: Game, kind: CatalogKind, locale: &str) -> PathBuf {
        self.root
            .join(game.as_str())
            .join(locale)
            .join(format!("{}.json", kind.file_stem(game)))
    }
}

impl CatalogSource for FileCatalogSource {
    fn load(
        &self,
        game: Game,
        kind: CatalogKind,
        locale: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let path = self.path(game, kind, locale);
        let raw = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CatalogError::Missing {
                    game,
                    kind: kind.file_stem(game),
                    locale: locale.to_string(),
                }
            } else {
                CatalogError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&raw).map_err(|source| CatalogError::Parse { path, source })
    }
}

/// In-memory catalogs, for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogSource {
    entries: HashMap<(Game, CatalogKind, String), Vec<CatalogEntry>>,
}

impl MemoryCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        game: Game,
        kind: CatalogKind,
        locale: &str,
        entries: Vec<CatalogEntry>,
    ) -> &mut Self {
        self.entries
            .insert((game, kind, locale.to_string()), entries);
        self
    }
}

impl CatalogSource for MemoryCatalogSource {
    fn load(
        &self,
        game: Game,
        kind: CatalogKind,
        locale: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.entries
            .get(&(game, kind, locale.to_string()))
            .cloned()
            .ok_or_else(|| CatalogError::Missing {
                game,
                kind: kind.file_stem(game),
                locale: locale.to_string(),
            })
    }
}

struct Cached {
    catalog: Arc<LocaleCatalog>,
    loaded_at: Instant,
}

/// Load-once-per-locale catalog cache with a time-based refresh.
pub struct CatalogProvider {
    source: Arc<dyn CatalogSource>,
    refresh_after: Duration,
    cache: RwLock<HashMap<(Game, String), Cached>>,
}

impl CatalogProvider {
    pub fn new(source: Arc<dyn CatalogSource>, refresh_after: Duration) -> Self {
        Self {
            source,
            refresh_after,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the catalogs for `game` in `locale`, loading them if absent or stale.
    ///
    /// Fails if any of the three catalogs cannot be loaded; a partial catalog
    /// set is never returned.
    pub async fn get(&self, game: Game, locale: &str) -> Result<Arc<LocaleCatalog>, CatalogError> {
        validate_locale(locale)?;
        let key = (game, locale.to_string());

        let fresh = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            cache
                .get(&key)
                .filter(|c| c.loaded_at.elapsed() < self.refresh_after)
                .map(|c| c.catalog.clone())
        };
        if let Some(catalog) = fresh {
            return Ok(catalog);
        }

        let source = self.source.clone();
        let loc = locale.to_string();
        let catalog = tokio::task::spawn_blocking(move || load_all(source.as_ref(), game, &loc))
            .await??;
        let catalog = Arc::new(catalog);

        metrics::CATALOG_LOADS_TOTAL
            .with_label_values(&[game.as_str()])
            .inc();
        tracing::info!(
            %game,
            locale,
            characters = catalog.characters.len(),
            weapons = catalog.weapons.len(),
            artifact_sets = catalog.artifact_sets.len(),
            "loaded catalog"
        );

        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            Cached {
                catalog: catalog.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(catalog)
    }

    /// Drop a cached locale so the next `get` reloads it.
    pub fn invalidate(&self, game: Game, locale: &str) -> bool {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(game, locale.to_string()))
            .is_some()
    }
}

fn load_all(
    source: &dyn CatalogSource,
    game: Game,
    locale: &str,
) -> Result<LocaleCatalog, CatalogError> {
    Ok(LocaleCatalog {
        characters: Catalog::from_entries(source.load(game, CatalogKind::Character, locale)?),
        weapons: Catalog::from_entries(source.load(game, CatalogKind::Weapon, locale)?),
        artifact_sets: Catalog::from_entries(source.load(game, CatalogKind::ArtifactSet, locale)?),
    })
}
