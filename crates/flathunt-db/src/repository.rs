use chrono::{DateTime, NaiveDateTime, Utc};
use flathunt_core::error::AppError;
use flathunt_core::models::Advert;
use flathunt_core::traits::AdvertStore;
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const ADVERT_COLUMNS: &str = "id, source_message_id, url, district, price, media_fee, deposit, \
                              rooms, area, posted_at, year_built, no_animals, animals_mentioned, \
                              created_at";

/// An advert as stored, with its row identity.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAdvert {
    pub id: Uuid,
    #[serde(flatten)]
    pub advert: Advert,
    pub created_at: DateTime<Utc>,
}

/// Advert persistence in PostgreSQL, unique by URL.
#[derive(Clone)]
pub struct AdvertRepository {
    pool: Pool<Postgres>,
}

impl AdvertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, url: &str) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM adverts WHERE url = $1)")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(row.0)
    }

    /// Insert a new advert and return its id.
    ///
    /// A second insert of the same URL fails with
    /// [`AppError::UniquenessViolation`].
    pub async fn insert(&self, advert: &Advert) -> Result<Uuid, AppError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO adverts (
                source_message_id, url, district, price, media_fee, deposit,
                rooms, area, posted_at, year_built, no_animals, animals_mentioned
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(advert.source_message_id)
        .bind(&advert.url)
        .bind(&advert.district)
        .bind(advert.price)
        .bind(advert.media_fee)
        .bind(advert.deposit)
        .bind(advert.rooms)
        .bind(advert.area)
        .bind(advert.posted_at)
        .bind(advert.year_built)
        .bind(advert.no_animals)
        .bind(&advert.animals_mentioned)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                AppError::UniquenessViolation(advert.url.clone())
            } else {
                AppError::DatabaseError(e.to_string())
            }
        })?;

        Ok(row.0)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<StoredAdvert>, AppError> {
        let row = sqlx::query_as::<_, AdvertRow>(&format!(
            "SELECT {ADVERT_COLUMNS} FROM adverts WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Most recently stored adverts, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAdvert>, AppError> {
        let rows = sqlx::query_as::<_, AdvertRow>(&format!(
            "SELECT {ADVERT_COLUMNS} FROM adverts ORDER BY created_at DESC, id LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AdvertRow {
    id: Uuid,
    source_message_id: i64,
    url: String,
    district: Option<String>,
    price: Option<f64>,
    media_fee: Option<f64>,
    deposit: Option<f64>,
    rooms: Option<i32>,
    area: Option<f64>,
    posted_at: Option<NaiveDateTime>,
    year_built: Option<i32>,
    no_animals: bool,
    animals_mentioned: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AdvertRow> for StoredAdvert {
    fn from(row: AdvertRow) -> Self {
        StoredAdvert {
            id: row.id,
            advert: Advert {
                url: row.url,
                source_message_id: row.source_message_id,
                district: row.district,
                price: row.price,
                media_fee: row.media_fee,
                deposit: row.deposit,
                rooms: row.rooms,
                area: row.area,
                posted_at: row.posted_at,
                year_built: row.year_built,
                no_animals: row.no_animals,
                animals_mentioned: row.animals_mentioned,
            },
            created_at: row.created_at,
        }
    }
}

impl AdvertStore for AdvertRepository {
    async fn exists(&self, url: &str) -> Result<bool, AppError> {
        AdvertRepository::exists(self, url).await
    }

    async fn insert(&self, advert: &Advert) -> Result<(), AppError> {
        let id = AdvertRepository::insert(self, advert).await?;
        tracing::debug!(%id, url = %advert.url, "Advert stored");
        Ok(())
    }
}
