// Rank query: leaderboard pages ordered by crit value with cursor pagination.
//
// Order is (crit_value DESC, id ASC). A cursor is the id of the last build
// seen; the next page starts strictly after it, so builds inserted ahead of
// the cursor never make already-seen rows reappear.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{CatalogError, CatalogProvider};
use crate::db::{Database, FindBuilds};
use crate::decode::{decode_builds, DecodedBuild};
use crate::metrics;
use crate::model::{Game, PlayerSummary};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct RankQuery {
    pub game: Game,
    pub character_ids: Vec<i64>,
    /// Build id of the last row seen, as sent by the client. A value that is
    /// not a build id is treated like an unknown build.
    pub cursor: Option<String>,
    pub page_size: i64,
}

impl RankQuery {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            character_ids: Vec::new(),
            cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Clamp the page size and dedupe the character filter.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.character_ids.sort_unstable();
        self.character_ids.dedup();
        self.cursor = self
            .cursor
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub builds: Vec<DecodedBuild>,
    /// Cursor for the next page: id of the last build on this page.
    pub last_id: Option<i64>,
    pub has_more: bool,
    /// True when the requested cursor was unknown and the first unfiltered
    /// page was returned instead.
    pub cursor_reset: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Ranking order over decoded builds.
pub fn compare(a: &DecodedBuild, b: &DecodedBuild) -> Ordering {
    b.crit_value
        .total_cmp(&a.crit_value)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort builds into ranking order.
pub fn sort_ranked(builds: &mut [DecodedBuild]) {
    builds.sort_by(compare);
}

/// Resolve the storage query for a rank query.
///
/// A cursor that does not name a build of this game, or names one outside
/// the character filter, falls back to the first page with no character
/// filter. Returns the query and whether that
/// fallback happened.
pub async fn resolve_query(db: &Database, query: &RankQuery) -> Result<(FindBuilds, bool), sqlx::Error> {
    // One extra row tells us whether another page exists.
    let take = query.page_size + 1;
    let unfiltered = FindBuilds {
        game: query.game,
        character_ids: Vec::new(),
        cursor: None,
        take,
        skip: 0,
    };

    let Some(cursor) = query.cursor.as_deref() else {
        return Ok((
            FindBuilds {
                character_ids: query.character_ids.clone(),
                ..unfiltered
            },
            false,
        ));
    };

    let position = match cursor.parse::<i64>() {
        Ok(id) => db.build_position(query.game, id, &query.character_ids).await?,
        Err(_) => None,
    };

    match position {
        Some(position) => Ok((
            FindBuilds {
                character_ids: query.character_ids.clone(),
                cursor: Some(position),
                skip: 1,
                ..unfiltered
            },
            false,
        )),
        None => {
            metrics::CURSOR_FALLBACKS_TOTAL.inc();
            tracing::info!(cursor, game = %query.game, "unknown cursor, serving first page");
            Ok((unfiltered, true))
        }
    }
}

/// Fetch, decode and paginate one leaderboard page.
///
/// The catalog and the build rows are fetched concurrently; players are
/// fetched once the rows are known. Any fetch failure fails the page.
pub async fn leaderboard_page(
    db: &Database,
    catalogs: &CatalogProvider,
    query: RankQuery,
    locale: &str,
) -> Result<LeaderboardPage, RankError> {
    let query = query.normalized();

    let fetch_rows = async {
        let (find, cursor_reset) = resolve_query(db, &query).await?;
        let rows = db.find_builds(&find).await?;
        Ok::<_, RankError>((rows, cursor_reset))
    };
    let fetch_catalog = async { Ok::<_, RankError>(catalogs.get(query.game, locale).await?) };
    let ((mut rows, cursor_reset), catalog) = tokio::try_join!(fetch_rows, fetch_catalog)?;

    let has_more = rows.len() as i64 > query.page_size;
    rows.truncate(query.page_size as usize);

    let mut player_ids: Vec<i64> = rows.iter().map(|r| r.player_id).collect();
    player_ids.sort_unstable();
    player_ids.dedup();
    let players: HashMap<i64, PlayerSummary> = db
        .find_players(&player_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let builds = decode_builds(&rows, &catalog, &players);
    let last_id = builds.last().map(|b| b.id);

    Ok(LeaderboardPage {
        builds,
        last_id,
        has_more,
        cursor_reset,
    })
}
