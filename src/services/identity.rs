//! Identity resolver (§4.1): maps `(provider, external_id)` to a local user
//! id. Resolution is the only place users are materialized.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ExternalIdentity;

pub const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("external_id cannot be empty or whitespace-only")]
    EmptyExternalId,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmptyExternalId => AppError::Validation(err.to_string()),
            IdentityError::Database(e) => e.into(),
        }
    }
}

pub struct ResolvedIdentity {
    pub user_id: Uuid,
    pub identity_id: Uuid,
    pub created_identity: bool,
    pub created_user: bool,
    pub metadata: serde_json::Value,
}

/// Write-path resolution: upsert the identity row; create a user
/// (`billable_<provider>_<external_id>`) if none is linked yet.
pub async fn resolve_or_create(
    pool: &PgPool,
    provider: &str,
    external_id: &str,
    profile: Option<serde_json::Value>,
) -> Result<ResolvedIdentity, IdentityError> {
    let external_id = external_id.trim();
    if external_id.is_empty() {
        return Err(IdentityError::EmptyExternalId);
    }
    let profile = profile.unwrap_or(serde_json::json!({}));

    let mut tx = pool.begin().await?;

    let existing: Option<ExternalIdentity> = sqlx::query_as(
        "SELECT * FROM external_identities WHERE provider = $1 AND external_id = $2 FOR UPDATE",
    )
    .bind(provider)
    .bind(external_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (identity, created_identity) = match existing {
        Some(identity) => (identity, false),
        None => {
            let identity: ExternalIdentity = sqlx::query_as(
                "INSERT INTO external_identities (provider, external_id, metadata)
                 VALUES ($1, $2, $3)
                 RETURNING *",
            )
            .bind(provider)
            .bind(external_id)
            .bind(&profile)
            .fetch_one(&mut *tx)
            .await?;
            (identity, true)
        }
    };

    let (user_id, created_user) = match identity.user_id {
        Some(user_id) => (user_id, false),
        None => {
            let username = format!("billable_{provider}_{external_id}");
            let user_id: Uuid = sqlx::query_scalar(
                "INSERT INTO users (username) VALUES ($1) RETURNING id",
            )
            .bind(&username)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE external_identities
                 SET user_id = $1, metadata = $2, updated_at = NOW()
                 WHERE id = $3",
            )
            .bind(user_id)
            .bind(&profile)
            .bind(identity.id)
            .execute(&mut *tx)
            .await?;

            (user_id, true)
        }
    };

    tx.commit().await?;

    Ok(ResolvedIdentity {
        user_id,
        identity_id: identity.id,
        created_identity,
        created_user,
        metadata: profile,
    })
}

/// Read-path resolution: lookup only, never creates.
pub async fn resolve_read_only(
    pool: &PgPool,
    provider: &str,
    external_id: &str,
) -> Result<Option<Uuid>, IdentityError> {
    let user_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM external_identities WHERE provider = $1 AND external_id = $2",
    )
    .bind(provider)
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    Ok(user_id)
}

/// Resolves a user id from `ResolveParams` on the write path (creates
/// identity/user as needed when `external_id` is supplied).
pub async fn resolve_write_params(
    pool: &PgPool,
    params: &crate::models::ResolveParams,
) -> Result<Option<Uuid>, IdentityError> {
    if let Some(user_id) = params.user_id {
        return Ok(Some(user_id));
    }
    if let Some(external_id) = &params.external_id {
        let resolved = resolve_or_create(
            pool,
            params.provider_or_default(),
            external_id,
            None,
        )
        .await?;
        return Ok(Some(resolved.user_id));
    }
    Ok(None)
}

/// Resolves a user id from `ResolveParams` on the read path (lookup only).
pub async fn resolve_read_params(
    pool: &PgPool,
    params: &crate::models::ResolveParams,
) -> Result<Option<Uuid>, IdentityError> {
    if let Some(user_id) = params.user_id {
        return Ok(Some(user_id));
    }
    if let Some(external_id) = &params.external_id {
        return resolve_read_only(pool, params.provider_or_default(), external_id).await;
    }
    Ok(None)
}

/// Backfills `ExternalIdentity` rows for users created before the identity
/// table existed (ported from the original `migrate_identities` management
/// command). Not an HTTP endpoint — callable from a maintenance binary.
pub async fn backfill_missing_identities(
    pool: &PgPool,
    provider: &str,
) -> Result<usize, IdentityError> {
    let rows = sqlx::query(
        "INSERT INTO external_identities (provider, external_id, user_id)
         SELECT $1, u.id::text, u.id
         FROM users u
         WHERE NOT EXISTS (
             SELECT 1 FROM external_identities ei
             WHERE ei.provider = $1 AND ei.user_id = u.id
         )",
    )
    .bind(provider)
    .execute(pool)
    .await?;

    Ok(rows.rows_affected() as usize)
}
