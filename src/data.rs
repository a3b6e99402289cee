use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::Executor;

use crate::{
    brief::{Brief, Visibility},
    identity::Identity,
    types::{PaymentTier, Profile, Role},
};

const MIGRATIONS: [&str; 1] = [include_str!("../migrations/0_data.sql")];

type Tx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

#[derive(sqlx::FromRow)]
struct TokensRow {
    // Used in SQL, but not in Rust. Here for documentation.
    #[allow(dead_code)]
    kind: String,

    // Used in SQL, but not in Rust. Here for documentation.
    #[allow(dead_code)]
    identity: String,

    // Used in SQL, but not in Rust. Here for documentation.
    #[allow(dead_code)]
    date: String,

    tokens_remaining: i64,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    display_name: String,
    payment: String,
    role: String,
}

#[derive(sqlx::FromRow)]
struct BriefRow {
    brief_id: String,
    category: String,
    niche: String,
    industry: String,
    keywords: String,
    deadline: String,
    company_name: String,
    company_description: String,
    project_description: String,
    brief_visibility: String,
    brief_created_at: String,
    full_text: String,
}

impl TryFrom<BriefRow> for Brief {
    type Error = anyhow::Error;

    fn try_from(row: BriefRow) -> anyhow::Result<Self> {
        let keywords: Vec<String> = serde_json::from_str(&row.keywords)
            .context(format!("Bad keywords in brief {}", row.brief_id))?;
        let created_at = DateTime::parse_from_rfc3339(&row.brief_created_at)
            .context(format!("Bad timestamp in brief {}", row.brief_id))?
            .with_timezone(&Utc);
        Ok(Self {
            id: row.brief_id,
            category: row.category,
            niche: row.niche,
            industry: row.industry,
            keywords,
            deadline: row.deadline,
            company_name: row.company_name,
            company_description: row.company_description,
            project_description: row.project_description,
            visibility: Visibility::from_str(&row.brief_visibility)?,
            created_at,
            full_text: row.full_text,
        })
    }
}

/// Outcome of a conditional balance decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deduction {
    Applied { remaining: i64 },
    Insufficient { remaining: i64 },
}

#[derive(Clone)]
pub struct Storage {
    pool: sqlx::Pool<sqlx::Sqlite>,
}

impl Storage {
    pub async fn connect(
        file_path: &Path,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = file_path.parent() {
            let ctx = format!(
                "Failed to create parent directory \
                for database file: {file_path:?}"
            );
            fs::create_dir_all(parent).context(ctx)?;
        }
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(file_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);
        let pool = sqlx::SqlitePool::connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// Private database living as long as the returned handle.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options =
            sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every in-memory connection is its own database, so exactly one
        // connection must exist and never be recycled.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(pool: sqlx::Pool<sqlx::Sqlite>) -> anyhow::Result<Self> {
        for migration in MIGRATIONS {
            pool.execute(migration).await?;
        }
        Ok(Self { pool })
    }

    /// Today's row for `identity`, created with `allowance` if absent.
    pub async fn tokens_remaining(
        &self,
        identity: &Identity,
        date: NaiveDate,
        allowance: i64,
    ) -> anyhow::Result<i64> {
        let tx = self.pool.begin().await?;
        let (tx, remaining) =
            tokens_remaining(tx, identity, date, allowance).await?;
        tx.commit().await?;
        Ok(remaining)
    }

    pub async fn tokens_deduct(
        &self,
        identity: &Identity,
        date: NaiveDate,
        allowance: i64,
        amount: i64,
    ) -> anyhow::Result<Deduction> {
        let tx = self.pool.begin().await?;
        let (tx, deduction) =
            tokens_deduct(tx, identity, date, allowance, amount).await?;
        tx.commit().await?;
        Ok(deduction)
    }

    pub async fn tokens_refund(
        &self,
        identity: &Identity,
        date: NaiveDate,
        allowance: i64,
        amount: i64,
    ) -> anyhow::Result<i64> {
        let tx = self.pool.begin().await?;
        let (tx, remaining) =
            tokens_refund(tx, identity, date, allowance, amount).await?;
        tx.commit().await?;
        Ok(remaining)
    }

    pub async fn profile(&self, uid: &str) -> anyhow::Result<Option<Profile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT * FROM profiles WHERE id = ?")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|row| -> anyhow::Result<Profile> {
            Ok(Profile {
                id: row.id,
                display_name: row.display_name,
                payment: row.payment.parse()?,
                role: row.role.parse()?,
            })
        })
        .transpose()
    }

    pub async fn profile_upsert(&self, profile: &Profile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO profiles (id, display_name, payment, role)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                payment = excluded.payment,
                role = excluded.role",
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(profile.payment.as_str())
        .bind(profile.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores the brief, and a history entry when `user_id` is given.
    pub async fn brief_insert(
        &self,
        brief: &Brief,
        user_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let created_at = timestamp(brief.created_at);
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO briefs (
                brief_id, category, niche, industry, keywords, deadline,
                company_name, company_description, project_description,
                brief_visibility, brief_created_at, full_text
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&brief.id)
        .bind(&brief.category)
        .bind(&brief.niche)
        .bind(&brief.industry)
        .bind(serde_json::to_string(&brief.keywords)?)
        .bind(&brief.deadline)
        .bind(&brief.company_name)
        .bind(&brief.company_description)
        .bind(&brief.project_description)
        .bind(brief.visibility.as_str())
        .bind(&created_at)
        .bind(&brief.full_text)
        .execute(&mut *tx)
        .await
        .context(format!("Failed to insert brief {}", brief.id))?;
        if let Some(uid) = user_id {
            sqlx::query(
                "INSERT INTO brief_history (user_id, brief_id, generated_at)
                    VALUES (?, ?, ?)",
            )
            .bind(uid)
            .bind(&brief.id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn brief(&self, brief_id: &str) -> anyhow::Result<Option<Brief>> {
        let row: Option<BriefRow> =
            sqlx::query_as("SELECT * FROM briefs WHERE brief_id = ?")
                .bind(brief_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Brief::try_from).transpose()
    }

    pub async fn briefs_matching(
        &self,
        category: &str,
        niche: &str,
        industry: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Vec<Brief>> {
        let rows: Vec<BriefRow> = sqlx::query_as(
            "SELECT * FROM briefs
                WHERE category = ?
                AND niche = ?
                AND industry = ?
                AND brief_visibility = ?",
        )
        .bind(category)
        .bind(niche)
        .bind(industry)
        .bind(visibility.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Brief::try_from).collect()
    }

    /// Newest first.
    pub async fn brief_history(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> anyhow::Result<Vec<Brief>> {
        let rows: Vec<BriefRow> = sqlx::query_as(
            "SELECT b.* FROM brief_history h
                JOIN briefs b ON b.brief_id = h.brief_id
                WHERE h.user_id = ?
                ORDER BY h.generated_at DESC, h.rowid DESC
                LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Brief::try_from).collect()
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// Every ledger transaction starts with this write, so SQLite takes the
// write lock up front and waits out the busy timeout for it. A deferred
// transaction that reads first cannot upgrade once another connection
// has committed, and fails with SQLITE_BUSY instead of waiting.
async fn tokens_ensure<'a>(
    mut tx: Tx<'a>,
    identity: &Identity,
    date: &str,
    allowance: i64,
) -> anyhow::Result<Tx<'a>> {
    let created = sqlx::query(
        "INSERT INTO daily_tokens (kind, identity, date, tokens_remaining)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (kind, identity, date) DO NOTHING",
    )
    .bind(identity.kind())
    .bind(identity.id())
    .bind(date)
    .bind(allowance)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if created > 0 {
        tracing::debug!(%identity, %date, allowance, "New daily allowance.");
    }
    Ok(tx)
}

async fn tokens_select<'a>(
    mut tx: Tx<'a>,
    identity: &Identity,
    date: &str,
) -> anyhow::Result<(Tx<'a>, i64)> {
    let row: TokensRow = sqlx::query_as(
        "SELECT * FROM daily_tokens
            WHERE kind = ? AND identity = ? AND date = ?",
    )
    .bind(identity.kind())
    .bind(identity.id())
    .bind(date)
    .fetch_one(&mut *tx)
    .await?;
    Ok((tx, row.tokens_remaining))
}

async fn tokens_remaining<'a>(
    tx: Tx<'a>,
    identity: &Identity,
    date: NaiveDate,
    allowance: i64,
) -> anyhow::Result<(Tx<'a>, i64)> {
    let date = day(date);
    let tx = tokens_ensure(tx, identity, &date, allowance).await?;
    tokens_select(tx, identity, &date).await
}

async fn tokens_deduct<'a>(
    tx: Tx<'a>,
    identity: &Identity,
    date: NaiveDate,
    allowance: i64,
    amount: i64,
) -> anyhow::Result<(Tx<'a>, Deduction)> {
    let date = day(date);
    let mut tx = tokens_ensure(tx, identity, &date, allowance).await?;
    // Check and decrement in one statement, so concurrent deductions
    // cannot both pass the check against the same balance.
    let updated = sqlx::query(
        "UPDATE daily_tokens
            SET tokens_remaining = tokens_remaining - ?
            WHERE kind = ? AND identity = ? AND date = ?
            AND tokens_remaining >= ?",
    )
    .bind(amount)
    .bind(identity.kind())
    .bind(identity.id())
    .bind(&date)
    .bind(amount)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    let (tx, remaining) = tokens_select(tx, identity, &date).await?;
    let deduction = if updated == 0 {
        Deduction::Insufficient { remaining }
    } else {
        Deduction::Applied { remaining }
    };
    Ok((tx, deduction))
}

async fn tokens_refund<'a>(
    tx: Tx<'a>,
    identity: &Identity,
    date: NaiveDate,
    allowance: i64,
    amount: i64,
) -> anyhow::Result<(Tx<'a>, i64)> {
    let date = day(date);
    let mut tx = tokens_ensure(tx, identity, &date, allowance).await?;
    sqlx::query(
        "UPDATE daily_tokens
            SET tokens_remaining = tokens_remaining + ?
            WHERE kind = ? AND identity = ? AND date = ?",
    )
    .bind(amount)
    .bind(identity.kind())
    .bind(identity.id())
    .bind(&date)
    .execute(&mut *tx)
    .await?;
    tokens_select(tx, identity, &date).await
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn brief(id: &str, at: DateTime<Utc>, keywords: &[&str]) -> Brief {
        Brief {
            id: id.to_string(),
            category: "Copywriting".into(),
            niche: "Social Media".into(),
            industry: "Food".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            deadline: "1 Week".into(),
            company_name: "Crumb & Co".into(),
            company_description: "A **bakery**.".into(),
            project_description: "Write posts.".into(),
            visibility: Visibility::Public,
            created_at: at,
            full_text: "raw".into(),
        }
    }

    #[tokio::test]
    async fn brief_round_trips_through_storage() {
        let storage = Storage::in_memory().await.unwrap();
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let b = brief("BRF20250501120000001", at, &["Humorous"]);
        storage.brief_insert(&b, None).await.unwrap();

        let got = storage.brief(&b.id).await.unwrap().unwrap();
        assert_eq!(got.keywords, vec!["Humorous"]);
        assert_eq!(got.created_at, at);
        assert_eq!(got.company_description, "A **bakery**.");
        assert!(storage.brief("BRF0").await.unwrap().is_none());

        // Same id again is refused, not overwritten.
        assert!(storage.brief_insert(&b, None).await.is_err());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paged() {
        let storage = Storage::in_memory().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        for i in 0..4 {
            let at = t0 + chrono::Duration::minutes(i);
            let b = brief(&format!("BRF2025050112000000{i}"), at, &[]);
            storage.brief_insert(&b, Some("alice")).await.unwrap();
        }
        let other = brief("BRF20250501120000099", t0, &[]);
        storage.brief_insert(&other, Some("bob")).await.unwrap();

        let page = storage.brief_history("alice", 2, 0).await.unwrap();
        let ids: Vec<_> = page.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["BRF20250501120000003", "BRF20250501120000002"]);

        let page = storage.brief_history("alice", 5, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].id, "BRF20250501120000000");
    }

    #[tokio::test]
    async fn matching_filters_on_selection_and_visibility() {
        let storage = Storage::in_memory().await.unwrap();
        let at = Utc::now();
        let public = brief("BRF20250501120000001", at, &[]);
        let unlisted = Brief {
            id: "BRF20250501120000002".into(),
            visibility: Visibility::Unlisted,
            ..public.clone()
        };
        let elsewhere = Brief {
            id: "BRF20250501120000003".into(),
            industry: "Travel".into(),
            ..public.clone()
        };
        for b in [&public, &unlisted, &elsewhere] {
            storage.brief_insert(b, None).await.unwrap();
        }
        let found = storage
            .briefs_matching(
                "Copywriting",
                "Social Media",
                "Food",
                Visibility::Public,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, public.id);
    }

    #[tokio::test]
    async fn profiles_upsert() {
        let storage = Storage::in_memory().await.unwrap();
        assert!(storage.profile("alice").await.unwrap().is_none());
        let mut p = Profile {
            id: "alice".into(),
            display_name: "Alice".into(),
            payment: PaymentTier::Unpaid,
            role: Role::User,
        };
        storage.profile_upsert(&p).await.unwrap();
        p.payment = PaymentTier::Paid;
        storage.profile_upsert(&p).await.unwrap();
        assert_eq!(storage.profile("alice").await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn conditional_deduct() {
        let storage = Storage::in_memory().await.unwrap();
        let id = Identity::Device("d".into());
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let d = storage.tokens_deduct(&id, date, 12, 10).await.unwrap();
        assert_eq!(d, Deduction::Applied { remaining: 2 });
        let d = storage.tokens_deduct(&id, date, 12, 10).await.unwrap();
        assert_eq!(d, Deduction::Insufficient { remaining: 2 });
        let r = storage.tokens_refund(&id, date, 12, 10).await.unwrap();
        assert_eq!(r, 12);
    }
}
