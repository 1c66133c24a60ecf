use chrono::{DateTime, Utc};
use rocket_db_pools::Database;
use shared::{
    reconcile, recompute, ContributionRecord, LeaderboardEntry, RepoName, Scoring, SyncError,
    UpsertOutcome,
};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{instrument, warn};

use super::{
    types::{ContributionRow, LeaderboardRow},
    ContributionStore, LeaderboardRebuild,
};

#[derive(Database, Clone, Debug)]
#[database("codefest")]
pub struct DB(PgPool);

const CONTRIBUTION_COLUMNS: &str =
    "repo_full_name, pr_number, author_login, state, merged_at, additions, deletions";

/// Advisory lock key serializing leaderboard rebuilds across server processes.
const LEADERBOARD_LOCK: i64 = 0x636f_6465_6665_7374;

fn store_error(e: sqlx::Error) -> SyncError {
    SyncError::store(e)
}

/// Row offset of `page`, saturating instead of overflowing.
fn offset(page: u64, limit: u64) -> i64 {
    i64::try_from(page.saturating_mul(limit)).unwrap_or(i64::MAX)
}

async fn all_contributions(conn: &mut PgConnection) -> Result<Vec<ContributionRecord>, SyncError> {
    let rows: Vec<ContributionRow> = sqlx::query_as(&format!(
        "SELECT {CONTRIBUTION_COLUMNS} FROM contributions ORDER BY repo_full_name, pr_number"
    ))
    .fetch_all(conn)
    .await
    .map_err(store_error)?;

    rows.into_iter().map(TryInto::try_into).collect()
}

async fn cached_leaderboard(conn: &mut PgConnection) -> Result<Vec<LeaderboardEntry>, SyncError> {
    let rows: Vec<LeaderboardRow> = sqlx::query_as(
        "SELECT contributor_login, merged_pr_count, points, rank FROM leaderboard ORDER BY rank",
    )
    .fetch_all(conn)
    .await
    .map_err(store_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn write_leaderboard(
    conn: &mut PgConnection,
    entries: &[LeaderboardEntry],
) -> Result<(), SyncError> {
    sqlx::query("DELETE FROM leaderboard")
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;

    sqlx::query(
        r#"
        INSERT INTO leaderboard (contributor_login, merged_pr_count, points, rank)
        SELECT * FROM UNNEST($1::text[], $2::bigint[], $3::bigint[], $4::int[])
        "#,
    )
    .bind(
        entries
            .iter()
            .map(|e| e.contributor_login.clone())
            .collect::<Vec<_>>(),
    )
    .bind(
        entries
            .iter()
            .map(|e| e.merged_pr_count as i64)
            .collect::<Vec<_>>(),
    )
    .bind(entries.iter().map(|e| e.points as i64).collect::<Vec<_>>())
    .bind(entries.iter().map(|e| e.rank as i32).collect::<Vec<_>>())
    .execute(&mut *conn)
    .await
    .map_err(store_error)?;
    Ok(())
}

impl DB {
    async fn locked_contribution(
        tx: &mut Transaction<'static, Postgres>,
        repo_full_name: &str,
        pr_number: i64,
    ) -> Result<Option<ContributionRecord>, SyncError> {
        let row: Option<ContributionRow> = sqlx::query_as(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions
            WHERE repo_full_name = $1 AND pr_number = $2
            FOR UPDATE"
        ))
        .bind(repo_full_name)
        .bind(pr_number)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)?;

        row.map(TryInto::try_into).transpose()
    }

    /// Returns false when another writer inserted the key first.
    async fn insert_contribution(
        tx: &mut Transaction<'static, Postgres>,
        record: &ContributionRecord,
    ) -> Result<bool, SyncError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contributions (repo_full_name, pr_number, author_login, state, merged_at, additions, deletions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (repo_full_name, pr_number) DO NOTHING
            "#,
        )
        .bind(&record.repo_full_name)
        .bind(record.pr_number as i64)
        .bind(&record.author_login)
        .bind(record.state.as_ref())
        .bind(record.merged_at)
        .bind(record.additions as i64)
        .bind(record.deletions as i64)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_contribution(
        tx: &mut Transaction<'static, Postgres>,
        record: &ContributionRecord,
    ) -> Result<(), SyncError> {
        // The state guard keeps a merged row merged even if another process got here first
        sqlx::query(
            r#"
            UPDATE contributions
            SET author_login = $3, state = $4, merged_at = $5, additions = $6, deletions = $7, updated_at = now()
            WHERE repo_full_name = $1 AND pr_number = $2
            AND (state <> 'merged' OR $4 = 'merged')
            "#,
        )
        .bind(&record.repo_full_name)
        .bind(record.pr_number as i64)
        .bind(&record.author_login)
        .bind(record.state.as_ref())
        .bind(record.merged_at)
        .bind(record.additions as i64)
        .bind(record.deletions as i64)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[rocket::async_trait]
impl ContributionStore for DB {
    #[instrument(skip(self, record), fields(repo = %record.repo_full_name, number = record.pr_number))]
    async fn upsert(&self, record: ContributionRecord) -> Result<UpsertOutcome, SyncError> {
        let mut tx = self.begin().await.map_err(store_error)?;

        let existing =
            Self::locked_contribution(&mut tx, &record.repo_full_name, record.pr_number as i64)
                .await?;
        let (mut outcome, write) = reconcile(existing.as_ref(), record.clone());
        match (outcome, write) {
            (UpsertOutcome::Created, Some(new)) => {
                if !Self::insert_contribution(&mut tx, &new).await? {
                    // Lost an insert race; the row exists now and can be locked
                    warn!("Concurrent insert detected, reconciling against the stored row");
                    let existing = Self::locked_contribution(
                        &mut tx,
                        &record.repo_full_name,
                        record.pr_number as i64,
                    )
                    .await?;
                    let (retried, write) = reconcile(existing.as_ref(), record);
                    if let Some(new) = write {
                        Self::update_contribution(&mut tx, &new).await?;
                    }
                    outcome = retried;
                }
            }
            (UpsertOutcome::Updated, Some(new)) => {
                Self::update_contribution(&mut tx, &new).await?;
            }
            _ => {}
        }

        tx.commit().await.map_err(store_error)?;
        Ok(outcome)
    }

    async fn contributions(&self) -> Result<Vec<ContributionRecord>, SyncError> {
        let mut conn = self.acquire().await.map_err(store_error)?;
        all_contributions(&mut conn).await
    }

    async fn repo_contributions(
        &self,
        repo: &RepoName,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ContributionRecord>, u64), SyncError> {
        let full_name = repo.full_name();
        let rows: Vec<ContributionRow> = sqlx::query_as(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions
            WHERE repo_full_name = $1
            ORDER BY pr_number DESC
            LIMIT $2 OFFSET $3"
        ))
        .bind(&full_name)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.0)
        .await
        .map_err(store_error)?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contributions WHERE repo_full_name = $1")
                .bind(&full_name)
                .fetch_one(&self.0)
                .await
                .map_err(store_error)?;

        let records = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((records, total as u64))
    }

    async fn author_contributions(
        &self,
        login: &str,
    ) -> Result<Vec<ContributionRecord>, SyncError> {
        let rows: Vec<ContributionRow> = sqlx::query_as(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions
            WHERE author_login = $1
            ORDER BY merged_at DESC NULLS LAST, repo_full_name, pr_number"
        ))
        .bind(login)
        .fetch_all(&self.0)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let mut conn = self.acquire().await.map_err(store_error)?;
        cached_leaderboard(&mut conn).await
    }

    async fn leaderboard_page(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<LeaderboardEntry>, u64), SyncError> {
        let rows: Vec<LeaderboardRow> = sqlx::query_as(
            r#"
            SELECT contributor_login, merged_pr_count, points, rank
            FROM leaderboard
            ORDER BY rank
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.0)
        .await
        .map_err(store_error)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leaderboard")
            .fetch_one(&self.0)
            .await
            .map_err(store_error)?;

        Ok((rows.into_iter().map(Into::into).collect(), total as u64))
    }

    async fn leaderboard_entry(&self, login: &str) -> Result<Option<LeaderboardEntry>, SyncError> {
        let row: Option<LeaderboardRow> = sqlx::query_as(
            "SELECT contributor_login, merged_pr_count, points, rank FROM leaderboard WHERE contributor_login = $1",
        )
        .bind(login)
        .fetch_optional(&self.0)
        .await
        .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<(), SyncError> {
        let mut tx = self.begin().await.map_err(store_error)?;
        write_leaderboard(&mut tx, entries).await?;
        tx.commit().await.map_err(store_error)
    }

    #[instrument(skip(self, scoring))]
    async fn rebuild_leaderboard(
        &self,
        scoring: &dyn Scoring,
    ) -> Result<LeaderboardRebuild, SyncError> {
        let mut tx = self.begin().await.map_err(store_error)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEADERBOARD_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let records = all_contributions(&mut tx).await?;
        let entries = recompute(&records, scoring);
        let updated = cached_leaderboard(&mut tx).await? != entries;
        if updated {
            write_leaderboard(&mut tx, &entries).await?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(LeaderboardRebuild { entries, updated })
    }

    async fn sync_cursor(&self, repo: &RepoName) -> Result<Option<DateTime<Utc>>, SyncError> {
        sqlx::query_scalar("SELECT last_synced_at FROM repo_sync_state WHERE repo_full_name = $1")
            .bind(repo.full_name())
            .fetch_optional(&self.0)
            .await
            .map_err(store_error)
    }

    async fn set_sync_cursor(&self, repo: &RepoName, at: DateTime<Utc>) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO repo_sync_state (repo_full_name, last_synced_at)
            VALUES ($1, $2)
            ON CONFLICT (repo_full_name) DO UPDATE
            SET last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(repo.full_name())
        .bind(at)
        .execute(&self.0)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}
