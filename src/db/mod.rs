// Database access layer (SQLite via sqlx).
//
// Owns players and builds. `crit_value` is persisted at write time so the
// leaderboard is a plain indexed sort.

pub mod blob;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use crate::crit;
use crate::model::{Game, PlayerSummary, RawArtifact, RawBuildRecord};

const BUILD_COLUMNS: &str = "id, player_id, avatar_id, weapon_id, level, ascension, constellation, refinement, artifact_blob, crit_value, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildRow {
    id: i64,
    player_id: i64,
    avatar_id: i64,
    weapon_id: Option<String>,
    level: i32,
    ascension: i32,
    constellation: i32,
    refinement: i32,
    artifact_blob: Vec<u8>,
    crit_value: f64,
    created_at: String,
}

impl BuildRow {
    fn into_record(self, game: Game) -> RawBuildRecord {
        let artifacts = blob::decode_artifacts(&self.artifact_blob).unwrap_or_else(|e| {
            tracing::warn!(build_id = self.id, "unreadable artifact blob: {e}");
            Vec::new()
        });
        RawBuildRecord {
            id: self.id,
            game,
            player_id: self.player_id,
            avatar_id: self.avatar_id,
            weapon_id: self.weapon_id,
            level: self.level,
            ascension: self.ascension,
            constellation: self.constellation,
            refinement: self.refinement,
            artifacts,
            crit_value: self.crit_value,
            created_at: self.created_at,
        }
    }
}

/// Position of a build in the `(crit_value DESC, id ASC)` ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    pub crit_value: f64,
    pub id: i64,
}

/// Leaderboard fetch: rows at or after `cursor` in ranking order, skipping
/// `skip` of them, at most `take`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindBuilds {
    pub game: Game,
    /// Empty means every character.
    pub character_ids: Vec<i64>,
    pub cursor: Option<CursorPosition>,
    pub take: i64,
    pub skip: i64,
}

/// One character build submitted by a profile sync.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBuild {
    pub avatar_id: i64,
    #[serde(default)]
    pub weapon_id: Option<String>,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub ascension: i32,
    #[serde(default)]
    pub constellation: i32,
    #[serde(default)]
    pub refinement: i32,
    #[serde(default)]
    pub artifacts: Vec<RawArtifact>,
}

/// Profile fields submitted by a profile sync.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlayer {
    pub nickname: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub region: Option<String>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` is a separate database.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?
        };
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game TEXT NOT NULL,
                uid TEXT NOT NULL,
                nickname TEXT NOT NULL DEFAULT '',
                level INTEGER NOT NULL DEFAULT 0,
                region TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(game, uid)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS builds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game TEXT NOT NULL,
                player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
                avatar_id INTEGER NOT NULL,
                weapon_id TEXT,
                level INTEGER NOT NULL DEFAULT 1,
                ascension INTEGER NOT NULL DEFAULT 0,
                constellation INTEGER NOT NULL DEFAULT 0,
                refinement INTEGER NOT NULL DEFAULT 1,
                artifact_blob BLOB NOT NULL,
                crit_value REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(player_id, avatar_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_builds_rank ON builds (game, crit_value DESC, id ASC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_builds_avatar_rank ON builds (game, avatar_id, crit_value DESC, id ASC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn upsert_player(
        &self,
        game: Game,
        uid: &str,
        player: &NewPlayer,
    ) -> Result<PlayerSummary, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        upsert_player_on(&mut conn, game, uid, player).await
    }

    pub async fn get_player(
        &self,
        game: Game,
        uid: &str,
    ) -> Result<Option<PlayerSummary>, sqlx::Error> {
        let row = sqlx::query_as::<_, PlayerSummary>(
            "SELECT id, uid, nickname, level, region FROM players WHERE game = ? AND uid = ?",
        )
        .bind(game.as_str())
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_players(&self, ids: &[i64]) -> Result<Vec<PlayerSummary>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, uid, nickname, level, region FROM players WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
        let rows = qb
            .build_query_as::<PlayerSummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ── Builds ────────────────────────────────────────────────────────

    /// Insert or overwrite (re-sync) the build for `player_id` + `avatar_id`.
    /// Returns the build id, which is stable across re-syncs.
    pub async fn upsert_build(
        &self,
        game: Game,
        player_id: i64,
        build: &NewBuild,
    ) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        upsert_build_on(&mut conn, game, player_id, build).await
    }

    /// Write a whole profile sync atomically: the player row and every build.
    pub async fn sync_profile(
        &self,
        game: Game,
        uid: &str,
        player: &NewPlayer,
        builds: &[NewBuild],
    ) -> Result<(PlayerSummary, Vec<i64>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let summary = upsert_player_on(&mut tx, game, uid, player).await?;
        let mut ids = Vec::with_capacity(builds.len());
        for build in builds {
            ids.push(upsert_build_on(&mut tx, game, summary.id, build).await?);
        }
        tx.commit().await?;
        Ok((summary, ids))
    }

    pub async fn find_build(&self, game: Game, id: i64) -> Result<Option<RawBuildRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds WHERE game = ? AND id = ?"
        ))
        .bind(game.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.into_record(game)))
    }

    /// Ranking position of a build, for resolving a cursor. With a non-empty
    /// `character_ids`, a build of any other character is not found.
    pub async fn build_position(
        &self,
        game: Game,
        id: i64,
        character_ids: &[i64],
    ) -> Result<Option<CursorPosition>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT crit_value, id FROM builds WHERE game = ");
        qb.push_bind(game.as_str()).push(" AND id = ").push_bind(id);
        if !character_ids.is_empty() {
            qb.push(" AND avatar_id IN (");
            let mut sep = qb.separated(", ");
            for avatar_id in character_ids {
                sep.push_bind(*avatar_id);
            }
            sep.push_unseparated(")");
        }
        let row: Option<(f64, i64)> = qb.build_query_as().fetch_optional(&self.pool).await?;
        Ok(row.map(|(crit_value, id)| CursorPosition { crit_value, id }))
    }

    /// Fetch builds in `(crit_value DESC, id ASC)` order.
    pub async fn find_builds(&self, q: &FindBuilds) -> Result<Vec<RawBuildRecord>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {BUILD_COLUMNS} FROM builds WHERE game = "));
        qb.push_bind(q.game.as_str());

        if !q.character_ids.is_empty() {
            qb.push(" AND avatar_id IN (");
            let mut sep = qb.separated(", ");
            for id in &q.character_ids {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }

        if let Some(c) = q.cursor {
            qb.push(" AND (crit_value < ")
                .push_bind(c.crit_value)
                .push(" OR (crit_value = ")
                .push_bind(c.crit_value)
                .push(" AND id >= ")
                .push_bind(c.id)
                .push("))");
        }

        qb.push(" ORDER BY crit_value DESC, id ASC LIMIT ")
            .push_bind(q.take)
            .push(" OFFSET ")
            .push_bind(q.skip);

        let rows = qb.build_query_as::<BuildRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_record(q.game)).collect())
    }

    pub async fn list_player_builds(
        &self,
        game: Game,
        player_id: i64,
    ) -> Result<Vec<RawBuildRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds WHERE game = ? AND player_id = ? ORDER BY id"
        ))
        .bind(game.as_str())
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_record(game)).collect())
    }
}

async fn upsert_player_on(
    conn: &mut SqliteConnection,
    game: Game,
    uid: &str,
    player: &NewPlayer,
) -> Result<PlayerSummary, sqlx::Error> {
    sqlx::query_as::<_, PlayerSummary>(
        "INSERT INTO players (game, uid, nickname, level, region) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(game, uid) DO UPDATE SET nickname = excluded.nickname, level = excluded.level, \
         region = excluded.region, updated_at = datetime('now') \
         RETURNING id, uid, nickname, level, region",
    )
    .bind(game.as_str())
    .bind(uid)
    .bind(&player.nickname)
    .bind(player.level)
    .bind(&player.region)
    .fetch_one(conn)
    .await
}

async fn upsert_build_on(
    conn: &mut SqliteConnection,
    game: Game,
    player_id: i64,
    build: &NewBuild,
) -> Result<i64, sqlx::Error> {
    let artifact_blob =
        blob::encode_artifacts(&build.artifacts).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let crit_value = crit::score_artifacts(&build.artifacts).crit_value;

    sqlx::query_scalar(
        "INSERT INTO builds (game, player_id, avatar_id, weapon_id, level, ascension, constellation, refinement, artifact_blob, crit_value) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(player_id, avatar_id) DO UPDATE SET weapon_id = excluded.weapon_id, level = excluded.level, \
         ascension = excluded.ascension, constellation = excluded.constellation, refinement = excluded.refinement, \
         artifact_blob = excluded.artifact_blob, crit_value = excluded.crit_value, updated_at = datetime('now') \
         RETURNING id",
    )
    .bind(game.as_str())
    .bind(player_id)
    .bind(build.avatar_id)
    .bind(&build.weapon_id)
    .bind(build.level)
    .bind(build.ascension)
    .bind(build.constellation)
    .bind(build.refinement)
    .bind(artifact_blob)
    .bind(crit_value)
    .fetch_one(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawStat, RawSubStat};

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn player(name: &str) -> NewPlayer {
        NewPlayer {
            nickname: name.into(),
            level: 60,
            region: None,
        }
    }

    fn build(avatar_id: i64, crit_rate: f64) -> NewBuild {
        NewBuild {
            avatar_id,
            weapon_id: Some("11509".into()),
            level: 90,
            ascension: 6,
            constellation: 0,
            refinement: 1,
            artifacts: vec![RawArtifact {
                set_id: Some("15020".into()),
                main_stat: RawStat {
                    key: "FIGHT_PROP_HP".into(),
                    value: Some(4780.0),
                },
                sub_stats: vec![RawSubStat {
                    key: "FIGHT_PROP_CRITICAL".into(),
                    value: Some(crit_rate),
                    count: 1,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_upsert_player() {
        let db = test_db().await;

        let p = db.upsert_player(Game::Genshin, "800000001", &player("Aether")).await.unwrap();
        assert_eq!(p.nickname, "Aether");

        let again = db.upsert_player(Game::Genshin, "800000001", &player("Lumine")).await.unwrap();
        assert_eq!(again.id, p.id);
        assert_eq!(again.nickname, "Lumine");

        // Same uid in another game is a different player
        let hsr = db.upsert_player(Game::Starrail, "800000001", &player("Stelle")).await.unwrap();
        assert_ne!(hsr.id, p.id);

        let fetched = db.get_player(Game::Genshin, "800000001").await.unwrap().unwrap();
        assert_eq!(fetched.nickname, "Lumine");
        assert!(db.get_player(Game::Genshin, "nope").await.unwrap().is_none());

        let found = db.find_players(&[p.id, hsr.id, 999]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(db.find_players(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_build_persists_crit_value() {
        let db = test_db().await;
        let p = db.upsert_player(Game::Genshin, "1", &player("A")).await.unwrap();

        let id = db.upsert_build(Game::Genshin, p.id, &build(10000002, 10.0)).await.unwrap();
        let rec = db.find_build(Game::Genshin, id).await.unwrap().unwrap();
        assert_eq!(rec.crit_value, 20.0);
        assert_eq!(rec.artifacts.len(), 1);
        assert_eq!(rec.weapon_id.as_deref(), Some("11509"));

        // Re-sync overwrites in place
        let same = db.upsert_build(Game::Genshin, p.id, &build(10000002, 4.0)).await.unwrap();
        assert_eq!(same, id);
        let rec = db.find_build(Game::Genshin, id).await.unwrap().unwrap();
        assert_eq!(rec.crit_value, 8.0);

        assert!(db.find_build(Game::Starrail, id).await.unwrap().is_none());
        assert_eq!(db.list_player_builds(Game::Genshin, p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_builds_orders_and_filters() {
        let db = test_db().await;
        let a = db.upsert_player(Game::Genshin, "1", &player("A")).await.unwrap();
        let b = db.upsert_player(Game::Genshin, "2", &player("B")).await.unwrap();

        let low = db.upsert_build(Game::Genshin, a.id, &build(1, 5.0)).await.unwrap();
        let high = db.upsert_build(Game::Genshin, a.id, &build(2, 15.0)).await.unwrap();
        let tie1 = db.upsert_build(Game::Genshin, b.id, &build(1, 10.0)).await.unwrap();
        let tie2 = db.upsert_build(Game::Genshin, b.id, &build(2, 10.0)).await.unwrap();

        let mut q = FindBuilds {
            game: Game::Genshin,
            character_ids: vec![],
            cursor: None,
            take: 10,
            skip: 0,
        };
        let ids: Vec<i64> = db.find_builds(&q).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![high, tie1, tie2, low]);

        q.character_ids = vec![1];
        let ids: Vec<i64> = db.find_builds(&q).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![tie1, low]);

        // Cursor is inclusive; skip excludes it
        q.character_ids = vec![];
        q.cursor = db.build_position(Game::Genshin, tie1, &[]).await.unwrap();
        q.skip = 1;
        let ids: Vec<i64> = db.find_builds(&q).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![tie2, low]);

        q.skip = 0;
        q.take = 1;
        let ids: Vec<i64> = db.find_builds(&q).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![tie1]);

        assert!(db.build_position(Game::Genshin, 999, &[]).await.unwrap().is_none());
        assert!(db.build_position(Game::Genshin, tie2, &[1]).await.unwrap().is_none());
        assert_eq!(
            db.build_position(Game::Genshin, tie2, &[1, 2]).await.unwrap(),
            Some(CursorPosition { crit_value: 20.0, id: tie2 })
        );
    }

    #[tokio::test]
    async fn test_corrupt_blob_yields_empty_artifacts() {
        let db = test_db().await;
        let p = db.upsert_player(Game::Genshin, "1", &player("A")).await.unwrap();
        let id = db.upsert_build(Game::Genshin, p.id, &build(1, 5.0)).await.unwrap();

        sqlx::query("UPDATE builds SET artifact_blob = X'00FF' WHERE id = ?")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();

        let rec = db.find_build(Game::Genshin, id).await.unwrap().unwrap();
        assert!(rec.artifacts.is_empty());
        assert_eq!(rec.crit_value, 10.0);
    }

    #[tokio::test]
    async fn test_sync_profile_writes_player_and_builds() {
        let db = test_db().await;
        let (p, ids) = db
            .sync_profile(
                Game::Starrail,
                "700000001",
                &player("Stelle"),
                &[build(1102, 5.0), build(1005, 8.0)],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(p.uid, "700000001");

        let builds = db.list_player_builds(Game::Starrail, p.id).await.unwrap();
        assert_eq!(builds.iter().map(|b| b.id).collect::<Vec<_>>(), ids);
        assert!(builds.iter().all(|b| b.game == Game::Starrail));

        // Re-sync keeps ids
        let (_, again) = db
            .sync_profile(Game::Starrail, "700000001", &player("Stelle"), &[build(1005, 1.0)])
            .await
            .unwrap();
        assert_eq!(again, vec![ids[1]]);
    }
}
