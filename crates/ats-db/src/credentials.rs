//! `credentials` table access. Rows hold ciphertext only; sealing and
//! opening live in ats-crypto, called by the store handlers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub name: String,
    pub access_key_enc: String,
    pub secret_key_enc: String,
    pub created_at: DateTime<Utc>,
}

/// Insert a new credential. Rows are never updated in place; rotation is a
/// new row under a new name.
pub async fn insert(
    pool: &PgPool,
    name: &str,
    access_key_enc: &str,
    secret_key_enc: &str,
) -> Result<()> {
    sqlx::query(
        "insert into credentials (name, access_key_enc, secret_key_enc) values ($1, $2, $3)",
    )
    .bind(name)
    .bind(access_key_enc)
    .bind(secret_key_enc)
    .execute(pool)
    .await
    .context("insert credential failed")?;
    Ok(())
}

pub async fn fetch(pool: &PgPool, name: &str) -> Result<Option<CredentialRow>> {
    let row = sqlx::query(
        "select name, access_key_enc, secret_key_enc, created_at from credentials where name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("fetch credential failed")?;

    row.map(|r| {
        Ok(CredentialRow {
            name: r.try_get("name")?,
            access_key_enc: r.try_get("access_key_enc")?,
            secret_key_enc: r.try_get("secret_key_enc")?,
            created_at: r.try_get("created_at")?,
        })
    })
    .transpose()
}

/// Names only. Listings never expose ciphertext.
pub async fn list_names(pool: &PgPool) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query("select name, created_at from credentials order by created_at desc")
        .fetch_all(pool)
        .await
        .context("list credentials failed")?;
    rows.iter()
        .map(|r| Ok((r.try_get("name")?, r.try_get("created_at")?)))
        .collect()
}

pub async fn delete(pool: &PgPool, name: &str) -> Result<bool> {
    let res = sqlx::query("delete from credentials where name = $1")
        .bind(name)
        .execute(pool)
        .await
        .context("delete credential failed")?;
    Ok(res.rows_affected() > 0)
}
