use crate::blob_store::{legacy_key_from_url, ObjectStore};
use crate::error::CatalogError;
use crate::model::{ProductType, SizeCode, VariantRecord};
use crate::store::VariantStore;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Reserved bucket for legacy records whose name is missing or empty.
pub const UNNAMED_FALLBACK: &str = "unnamed";

/// Per-record concurrency for signed URL resolution. Signing is pure
/// computation over credentials, so this never contends with the store.
const URL_RESOLVE_CONCURRENCY: usize = 8;

/// One variant as served in catalog reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantView {
    pub id: Uuid,
    pub product_type: ProductType,
    pub product_name: String,
    pub size: SizeCode,
    pub price: f64,
    pub amount: i64,
    /// Time-limited signed access URL, when the record has an image
    pub image_url: Option<String>,
}

/// Leaf of the nested catalog: the view minus its triple, which the path
/// through the tree already spells out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedVariant {
    pub id: Uuid,
    pub price: f64,
    pub amount: i64,
    pub image_url: Option<String>,
}

/// Nested catalog: product_type -> product_name -> size -> variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTree {
    pub products: BTreeMap<String, BTreeMap<String, BTreeMap<String, NestedVariant>>>,
}

impl CatalogTree {
    /// Regroup flat views into the three-level tree. The unique triple
    /// invariant guarantees exactly one view per leaf, so this is pure
    /// placement, no merging.
    fn from_flat(views: Vec<VariantView>) -> Self {
        let mut products: BTreeMap<String, BTreeMap<String, BTreeMap<String, NestedVariant>>> =
            BTreeMap::new();

        for view in views {
            let name = if view.product_name.trim().is_empty() {
                UNNAMED_FALLBACK.to_string()
            } else {
                view.product_name.clone()
            };

            products
                .entry(view.product_type.as_str().to_string())
                .or_default()
                .entry(name)
                .or_default()
                .insert(
                    view.size.as_str().to_string(),
                    NestedVariant {
                        id: view.id,
                        price: view.price,
                        amount: view.amount,
                        image_url: view.image_url,
                    },
                );
        }

        Self { products }
    }
}

/// Read-side projection of the variant store into flat and nested catalog
/// shapes, with image keys resolved to signed access URLs.
pub struct CatalogMaterializer {
    store: Arc<dyn VariantStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl CatalogMaterializer {
    pub fn new(store: Arc<dyn VariantStore>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            object_store,
        }
    }

    /// One view per stored record, in store iteration order. Ordering across
    /// calls is not guaranteed.
    #[instrument(skip(self))]
    pub async fn list_flat(&self) -> Result<Vec<VariantView>, CatalogError> {
        let records = self.store.find_all().await?;

        let views: Vec<Result<VariantView, CatalogError>> = stream::iter(records)
            .map(|record| self.resolve_view(record))
            .buffer_unordered(URL_RESOLVE_CONCURRENCY)
            .collect()
            .await;

        views.into_iter().collect()
    }

    /// The same records regrouped as type -> name -> size.
    #[instrument(skip(self))]
    pub async fn list_nested(&self) -> Result<CatalogTree, CatalogError> {
        let flat = self.list_flat().await?;
        Ok(CatalogTree::from_flat(flat))
    }

    /// Resolve a record's image reference to a signed URL. The explicit key
    /// wins; records predating key-only storage fall back to the key
    /// recovered from their persisted full URL.
    async fn resolve_view(&self, record: VariantRecord) -> Result<VariantView, CatalogError> {
        let key = record.image_key.clone().or_else(|| {
            record
                .image_url
                .as_deref()
                .and_then(legacy_key_from_url)
        });

        let image_url = match key {
            Some(key) => Some(self.object_store.presign_get(&key).await?.url),
            None => None,
        };

        Ok(VariantView {
            id: record.id,
            product_type: record.product_type,
            product_name: record.product_name,
            size: record.size,
            price: record.price,
            amount: record.amount,
            image_url,
        })
    }
}
