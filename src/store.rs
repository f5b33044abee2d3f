use crate::config::DatabaseConfig;
use crate::error::CatalogError;
use crate::model::{NewVariant, ProductType, SizeCode, VariantRecord};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Narrow store boundary for variant records.
///
/// The backing store owns the uniqueness invariant over the
/// (product_type, product_name, size) triple: `insert` of an existing triple
/// fails with [`CatalogError::UniquenessConflict`], and the upsert engine is
/// responsible for recovering from it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Look up the single record for a triple, if any.
    async fn find_by_triple(
        &self,
        product_type: ProductType,
        product_name: &str,
        size: SizeCode,
    ) -> Result<Option<VariantRecord>, CatalogError>;

    /// Fetch all variant records in store iteration order.
    async fn find_all(&self) -> Result<Vec<VariantRecord>, CatalogError>;

    /// Insert a new record, returning its store-assigned id.
    async fn insert(&self, variant: &NewVariant) -> Result<Uuid, CatalogError>;

    /// Overwrite the mutable fields of the record matching the triple.
    /// Returns the matched record's id, or None if no record matched.
    async fn update_fields(
        &self,
        product_type: ProductType,
        product_name: &str,
        size: SizeCode,
        price: f64,
        amount: i64,
        image_key: Option<String>,
    ) -> Result<Option<Uuid>, CatalogError>;
}

/// Raw database row; enum columns come back as text.
#[derive(Debug, FromRow)]
struct VariantRow {
    id: Uuid,
    product_type: String,
    product_name: String,
    size: String,
    price: f64,
    amount: i64,
    image_key: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VariantRow> for VariantRecord {
    type Error = CatalogError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        let product_type: ProductType = row.product_type.parse().map_err(|_| {
            CatalogError::StoreUnavailable(anyhow!(
                "stored record {} has unknown product_type '{}'",
                row.id,
                row.product_type
            ))
        })?;
        let size: SizeCode = row.size.parse().map_err(|_| {
            CatalogError::StoreUnavailable(anyhow!(
                "stored record {} has unknown size '{}'",
                row.id,
                row.size
            ))
        })?;

        Ok(VariantRecord {
            id: row.id,
            product_type,
            product_name: row.product_name,
            size,
            price: row.price,
            amount: row.amount,
            image_key: row.image_key,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed variant store.
pub struct PgVariantStore {
    pool: PgPool,
}

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl PgVariantStore {
    /// Create a new variant store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_error(e: sqlx::Error) -> CatalogError {
    CatalogError::StoreUnavailable(e.into())
}

#[async_trait]
impl VariantStore for PgVariantStore {
    #[instrument(skip(self), fields(product_type = %product_type, size = %size))]
    async fn find_by_triple(
        &self,
        product_type: ProductType,
        product_name: &str,
        size: SizeCode,
    ) -> Result<Option<VariantRecord>, CatalogError> {
        let row = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, product_type, product_name, size, price, amount,
                   image_key, image_url, created_at, updated_at
            FROM variants
            WHERE product_type = $1 AND product_name = $2 AND size = $3
            "#,
        )
        .bind(product_type.as_str())
        .bind(product_name)
        .bind(size.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(VariantRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<VariantRecord>, CatalogError> {
        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, product_type, product_name, size, price, amount,
                   image_key, image_url, created_at, updated_at
            FROM variants
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(VariantRecord::try_from).collect()
    }

    #[instrument(skip(self, variant), fields(product_type = %variant.product_type, size = %variant.size))]
    async fn insert(&self, variant: &NewVariant) -> Result<Uuid, CatalogError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_type, product_name, size,
                price, amount, image_key, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, NOW(), NOW()
            )
            "#,
        )
        .bind(id)
        .bind(variant.product_type.as_str())
        .bind(&variant.product_name)
        .bind(variant.size.as_str())
        .bind(variant.price)
        .bind(variant.amount)
        .bind(&variant.image_key)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                CatalogError::UniquenessConflict
            }
            _ => store_error(e),
        })?;

        debug!(id = %id, "Variant record inserted");

        Ok(id)
    }

    #[instrument(skip(self), fields(product_type = %product_type, size = %size))]
    async fn update_fields(
        &self,
        product_type: ProductType,
        product_name: &str,
        size: SizeCode,
        price: f64,
        amount: i64,
        image_key: Option<String>,
    ) -> Result<Option<Uuid>, CatalogError> {
        let id: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE variants
            SET price = $4, amount = $5, image_key = $6, updated_at = NOW()
            WHERE product_type = $1 AND product_name = $2 AND size = $3
            RETURNING id
            "#,
        )
        .bind(product_type.as_str())
        .bind(product_name)
        .bind(size.as_str())
        .bind(price)
        .bind(amount)
        .bind(image_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(id.map(|(id,)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let row = VariantRow {
            id: Uuid::new_v4(),
            product_type: "tshirt".to_string(),
            product_name: "basic_logo".to_string(),
            size: "M".to_string(),
            price: 25.5,
            amount: 10,
            image_key: Some("products/abc.jpg".to_string()),
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let record = VariantRecord::try_from(row).unwrap();
        assert_eq!(record.product_type, ProductType::Tshirt);
        assert_eq!(record.size, SizeCode::M);
        assert_eq!(record.amount, 10);
    }

    #[test]
    fn test_row_conversion_rejects_corrupt_enum() {
        let row = VariantRow {
            id: Uuid::new_v4(),
            product_type: "sombrero".to_string(),
            product_name: "x".to_string(),
            size: "M".to_string(),
            price: 1.0,
            amount: 0,
            image_key: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(
            VariantRecord::try_from(row),
            Err(CatalogError::StoreUnavailable(_))
        ));
    }
}
