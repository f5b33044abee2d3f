use crate::error::CatalogError;
use crate::model::{NewVariant, ProductType, SizeCode, UpsertOutcome, VariantRecord, VariantSubmission};
use crate::store::VariantStore;
use anyhow::anyhow;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Result of an upsert: the affected record and what happened to it.
#[derive(Debug, Clone, Copy)]
pub struct UpsertResult {
    pub id: Uuid,
    pub outcome: UpsertOutcome,
}

/// Submission fields that passed validation, post enum-parsing.
///
/// Produced by [`validate_submission`]; callers that perform side effects
/// between validation and upsert (image ingestion) validate first so a bad
/// submission is rejected before any store or storage call.
#[derive(Debug, Clone)]
pub struct ValidSubmission {
    pub product_type: ProductType,
    pub product_name: String,
    pub size: SizeCode,
    pub price: f64,
    pub amount: i64,
    pub image_key: Option<String>,
}

/// Create-or-update engine for variant submissions.
///
/// The store's unique triple index is the authority for the
/// at-most-one-record-per-triple invariant; this engine only decides
/// between insert and field overwrite, and recovers from the
/// concurrent-create race by retrying the losing insert as an update.
pub struct UpsertEngine {
    store: Arc<dyn VariantStore>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn VariantStore>) -> Self {
        Self { store }
    }

    /// Validate and apply a submission against the unique triple.
    ///
    /// New triple: insert, outcome `created`. Existing triple: overwrite
    /// price/amount/image_key, outcome `updated` if any of them changed,
    /// `no-op` (and no store write) otherwise.
    pub async fn upsert(
        &self,
        submission: VariantSubmission,
    ) -> Result<UpsertResult, CatalogError> {
        let valid = validate_submission(submission)?;
        self.upsert_validated(valid).await
    }

    /// Apply an already-validated submission. See [`UpsertEngine::upsert`].
    #[instrument(skip(self, valid), fields(
        product_type = %valid.product_type,
        product_name = %valid.product_name,
        size = %valid.size,
    ))]
    pub async fn upsert_validated(
        &self,
        valid: ValidSubmission,
    ) -> Result<UpsertResult, CatalogError> {
        let existing = self
            .store
            .find_by_triple(valid.product_type, &valid.product_name, valid.size)
            .await?;

        let result = match existing {
            Some(record) => self.apply_update(record, &valid).await?,
            None => self.try_create(&valid).await?,
        };

        metrics::counter!("catalog.upserts", "outcome" => result.outcome.as_str()).increment(1);

        Ok(result)
    }

    async fn try_create(&self, valid: &ValidSubmission) -> Result<UpsertResult, CatalogError> {
        let new_variant = NewVariant {
            product_type: valid.product_type,
            product_name: valid.product_name.clone(),
            size: valid.size,
            price: valid.price,
            amount: valid.amount,
            image_key: valid.image_key.clone(),
        };

        match self.store.insert(&new_variant).await {
            Ok(id) => {
                debug!(id = %id, "Variant created");
                Ok(UpsertResult {
                    id,
                    outcome: UpsertOutcome::Created,
                })
            }
            Err(CatalogError::UniquenessConflict) => {
                // Lost the creation race: another submission inserted this
                // triple between our lookup and insert. Retry as an update
                // against the now-existing record.
                debug!("Creation race lost, retrying as update");

                let record = self
                    .store
                    .find_by_triple(valid.product_type, &valid.product_name, valid.size)
                    .await?
                    .ok_or_else(|| {
                        CatalogError::StoreUnavailable(anyhow!(
                            "record missing after duplicate-triple conflict"
                        ))
                    })?;

                self.apply_update(record, valid).await
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_update(
        &self,
        existing: VariantRecord,
        valid: &ValidSubmission,
    ) -> Result<UpsertResult, CatalogError> {
        let unchanged = existing.price == valid.price
            && existing.amount == valid.amount
            && existing.image_key == valid.image_key;

        if unchanged {
            return Ok(UpsertResult {
                id: existing.id,
                outcome: UpsertOutcome::NoOp,
            });
        }

        let matched = self
            .store
            .update_fields(
                valid.product_type,
                &valid.product_name,
                valid.size,
                valid.price,
                valid.amount,
                valid.image_key.clone(),
            )
            .await?;

        // Deletion is out of scope, so the record fetched above is still
        // there; the fetched id covers a store that reports no match.
        let id = matched.unwrap_or(existing.id);

        debug!(id = %id, "Variant fields overwritten");

        Ok(UpsertResult {
            id,
            outcome: UpsertOutcome::Updated,
        })
    }
}

/// Reject bad submissions before any store or storage access.
pub fn validate_submission(submission: VariantSubmission) -> Result<ValidSubmission, CatalogError> {
    let product_type = ProductType::from_str(&submission.product_type)?;
    let size = SizeCode::from_str(&submission.size)?;

    let product_name = submission.product_name.trim().to_string();
    if product_name.is_empty() {
        return Err(CatalogError::Validation(
            "product_name must not be empty".to_string(),
        ));
    }

    if !submission.price.is_finite() || submission.price < 0.0 {
        return Err(CatalogError::Validation(format!(
            "price must be a non-negative number, got {}",
            submission.price
        )));
    }

    if submission.amount < 0 {
        return Err(CatalogError::Validation(format!(
            "amount must be a non-negative integer, got {}",
            submission.amount
        )));
    }

    Ok(ValidSubmission {
        product_type,
        product_name,
        size,
        price: submission.price,
        amount: submission.amount,
        image_key: submission.image_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    type Triple = (ProductType, String, SizeCode);

    /// Stateful in-memory store enforcing the unique triple index, with an
    /// optional scripted race: when armed, the first insert is beaten by a
    /// competing record and fails with a duplicate-triple conflict.
    struct InMemoryStore {
        records: Mutex<HashMap<Triple, VariantRecord>>,
        race_competitor: Mutex<Option<VariantSubmission>>,
        insert_attempted: AtomicBool,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                race_competitor: Mutex::new(None),
                insert_attempted: AtomicBool::new(false),
            }
        }

        /// Arm a competing submission that wins the creation race.
        fn arm_race(&self, competitor: VariantSubmission) {
            *self.race_competitor.lock().unwrap() = Some(competitor);
        }

        fn record_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        fn make_record(id: Uuid, variant: &NewVariant) -> VariantRecord {
            VariantRecord {
                id,
                product_type: variant.product_type,
                product_name: variant.product_name.clone(),
                size: variant.size,
                price: variant.price,
                amount: variant.amount,
                image_key: variant.image_key.clone(),
                image_url: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }
        }
    }

    #[async_trait::async_trait]
    impl VariantStore for InMemoryStore {
        async fn find_by_triple(
            &self,
            product_type: ProductType,
            product_name: &str,
            size: SizeCode,
        ) -> Result<Option<VariantRecord>, CatalogError> {
            let key = (product_type, product_name.to_string(), size);
            Ok(self.records.lock().unwrap().get(&key).cloned())
        }

        async fn find_all(&self) -> Result<Vec<VariantRecord>, CatalogError> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }

        async fn insert(&self, variant: &NewVariant) -> Result<Uuid, CatalogError> {
            self.insert_attempted.store(true, Ordering::SeqCst);

            // A scripted competitor slips in ahead of this insert
            if let Some(competitor) = self.race_competitor.lock().unwrap().take() {
                let winner = NewVariant {
                    product_type: competitor.product_type.parse().unwrap(),
                    product_name: competitor.product_name.clone(),
                    size: competitor.size.parse().unwrap(),
                    price: competitor.price,
                    amount: competitor.amount,
                    image_key: competitor.image_key.clone(),
                };
                let key = (winner.product_type, winner.product_name.clone(), winner.size);
                self.records
                    .lock()
                    .unwrap()
                    .insert(key, Self::make_record(Uuid::new_v4(), &winner));
            }

            let key = (
                variant.product_type,
                variant.product_name.clone(),
                variant.size,
            );
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&key) {
                return Err(CatalogError::UniquenessConflict);
            }

            let id = Uuid::new_v4();
            records.insert(key, Self::make_record(id, variant));
            Ok(id)
        }

        async fn update_fields(
            &self,
            product_type: ProductType,
            product_name: &str,
            size: SizeCode,
            price: f64,
            amount: i64,
            image_key: Option<String>,
        ) -> Result<Option<Uuid>, CatalogError> {
            let key = (product_type, product_name.to_string(), size);
            let mut records = self.records.lock().unwrap();
            match records.get_mut(&key) {
                Some(record) => {
                    record.price = price;
                    record.amount = amount;
                    record.image_key = image_key;
                    record.updated_at = Utc::now();
                    Ok(Some(record.id))
                }
                None => Ok(None),
            }
        }
    }

    fn submission(amount: i64, price: f64) -> VariantSubmission {
        VariantSubmission {
            product_type: "tshirt".to_string(),
            product_name: "basic_logo".to_string(),
            size: "M".to_string(),
            price,
            amount,
            image_key: None,
        }
    }

    fn engine() -> (UpsertEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (UpsertEngine::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_new_triple_is_created() {
        let (engine, store) = engine();

        let result = engine.upsert(submission(10, 25.5)).await.unwrap();
        assert_eq!(result.outcome, UpsertOutcome::Created);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_fields_report_updated() {
        let (engine, store) = engine();

        let first = engine.upsert(submission(10, 25.5)).await.unwrap();
        let second = engine.upsert(submission(5, 25.5)).await.unwrap();

        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(store.record_count(), 1);

        let record = store
            .find_by_triple(ProductType::Tshirt, "basic_logo", SizeCode::M)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 5);
        assert_eq!(record.price, 25.5);
    }

    #[tokio::test]
    async fn test_identical_resubmission_is_no_op() {
        let (engine, store) = engine();

        let first = engine.upsert(submission(10, 25.5)).await.unwrap();
        let second = engine.upsert(submission(10, 25.5)).await.unwrap();

        assert_eq!(first.outcome, UpsertOutcome::Created);
        assert_eq!(second.outcome, UpsertOutcome::NoOp);
        assert_eq!(second.id, first.id);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_image_key_change_reports_updated() {
        let (engine, _store) = engine();

        engine.upsert(submission(10, 25.5)).await.unwrap();

        let mut with_image = submission(10, 25.5);
        with_image.image_key = Some("products/abc.jpg".to_string());
        let result = engine.upsert(with_image).await.unwrap();

        assert_eq!(result.outcome, UpsertOutcome::Updated);
    }

    #[tokio::test]
    async fn test_lost_creation_race_retries_as_update() {
        let (engine, store) = engine();
        store.arm_race(submission(3, 20.0));

        let result = engine.upsert(submission(10, 25.5)).await.unwrap();

        // Loser recovers as an update; the conflict never escapes
        assert_eq!(result.outcome, UpsertOutcome::Updated);
        assert_eq!(store.record_count(), 1);

        let record = store
            .find_by_triple(ProductType::Tshirt, "basic_logo", SizeCode::M)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 10);
        assert_eq!(record.price, 25.5);
    }

    #[tokio::test]
    async fn test_lost_race_with_identical_winner_is_no_op() {
        let (engine, store) = engine();
        store.arm_race(submission(10, 25.5));

        let result = engine.upsert(submission(10, 25.5)).await.unwrap();

        assert_eq!(result.outcome, UpsertOutcome::NoOp);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_update_path_over_mocked_store() {
        use crate::store::MockVariantStore;

        let existing_id = Uuid::new_v4();
        let existing = VariantRecord {
            id: existing_id,
            product_type: ProductType::Tshirt,
            product_name: "basic_logo".to_string(),
            size: SizeCode::M,
            price: 25.5,
            amount: 10,
            image_key: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut store = MockVariantStore::new();
        store
            .expect_find_by_triple()
            .returning(move |_, _, _| Ok(Some(existing.clone())));
        store.expect_insert().times(0);
        store
            .expect_update_fields()
            .withf(|_, _, _, price, amount, image_key| {
                *price == 30.0
                    && *amount == 7
                    && image_key.as_deref() == Some("products/new.jpg")
            })
            .times(1)
            .returning(move |_, _, _, _, _, _| Ok(Some(existing_id)));

        let engine = UpsertEngine::new(Arc::new(store));
        let mut changed = submission(7, 30.0);
        changed.image_key = Some("products/new.jpg".to_string());

        let result = engine.upsert(changed).await.unwrap();
        assert_eq!(result.outcome, UpsertOutcome::Updated);
        assert_eq!(result.id, existing_id);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_create_exactly_one_record() {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(UpsertEngine::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.upsert(submission(10, 25.5)).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            match result.outcome {
                UpsertOutcome::Created => created += 1,
                // Losers recover internally; identical fields mean no-op
                UpsertOutcome::NoOp | UpsertOutcome::Updated => {}
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_type_rejected_before_store_access() {
        let (engine, store) = engine();

        let mut bad = submission(1, 1.0);
        bad.product_type = "hoodie".to_string();
        let result = engine.upsert(bad).await;

        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert!(!store.insert_attempted.load(Ordering::SeqCst));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_size_rejected() {
        let (engine, _store) = engine();
        let mut bad = submission(1, 1.0);
        bad.size = "XXXL".to_string();
        assert!(matches!(
            engine.upsert(bad).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (engine, _store) = engine();
        let mut bad = submission(1, 1.0);
        bad.product_name = "   ".to_string();
        assert!(matches!(
            engine.upsert(bad).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_price_and_amount_rejected() {
        let (engine, _store) = engine();

        let bad_price = submission(1, -0.01);
        assert!(engine.upsert(bad_price).await.is_err());

        let bad_amount = submission(-1, 1.0);
        assert!(engine.upsert(bad_amount).await.is_err());

        let nan_price = submission(1, f64::NAN);
        assert!(engine.upsert(nan_price).await.is_err());
    }

    #[tokio::test]
    async fn test_name_is_trimmed_before_matching() {
        let (engine, store) = engine();

        engine.upsert(submission(10, 25.5)).await.unwrap();

        let mut padded = submission(10, 25.5);
        padded.product_name = "  basic_logo  ".to_string();
        let result = engine.upsert(padded).await.unwrap();

        assert_eq!(result.outcome, UpsertOutcome::NoOp);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_sizes_create_distinct_records() {
        let (engine, store) = engine();

        engine.upsert(submission(10, 25.5)).await.unwrap();

        let mut large = submission(10, 25.5);
        large.size = "L".to_string();
        let result = engine.upsert(large).await.unwrap();

        assert_eq!(result.outcome, UpsertOutcome::Created);
        assert_eq!(store.record_count(), 2);
    }
}
