//! Catalog Service
//!
//! Product catalog API service. Accepts product variant submissions over
//! HTTP, persists them in PostgreSQL under a uniqueness constraint over the
//! (product_type, product_name, size) triple, normalizes uploaded images
//! into bounded-size thumbnails stored in S3, and serves flat and nested
//! catalog views with time-limited signed image URLs.
//!
//! ## Features
//!
//! - **Variant Upsert**: Create-or-update against the unique triple, with
//!   the concurrent-create race recovered by retrying the losing insert as
//!   an update
//! - **Image Ingestion**: Decode, downscale to a configured bound, encode
//!   PNG (transparent) or JPEG (opaque), and store under a collision-free
//!   random key
//! - **Catalog Materialization**: Flat listing plus a nested
//!   type -> name -> size tree, rebuilt from the store on every read
//! - **Signed URL Resolution**: Per-variant presigned S3 access URLs,
//!   including keys recovered from legacy full-URL records
//!
//! ## Architecture
//!
//! ```text
//! HTTP Submission              S3 Bucket                 PostgreSQL
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ POST         │           │ products/    │          │ variants     │
//! │ /products    │──────────▶│   {token}.jpg│          │ (unique      │
//! └──────────────┘           │   {token}.png│          │  triple idx) │
//!        │                   └──────────────┘          └──────────────┘
//!        ▼                          ▲                         ▲
//! ┌──────────────┐                  │                         │
//! │ Image        │──────────────────┘                         │
//! │ Ingestor     │                                            │
//! └──────────────┘                                            │
//!        │                                                    │
//!        ▼                                                    │
//! ┌──────────────┐                                            │
//! │ Upsert       │────────────────────────────────────────────┘
//! │ Engine       │
//! └──────────────┘
//!
//! HTTP Read
//! ┌──────────────┐           ┌──────────────┐
//! │ GET          │           │ Catalog      │──── find_all ──▶ PostgreSQL
//! │ /products    │◀──────────│ Materializer │
//! └──────────────┘           └──────────────┘──── presign ───▶ S3
//! ```

pub mod api;
pub mod blob_store;
pub mod config;
pub mod error;
pub mod image_ingest;
pub mod materializer;
pub mod model;
pub mod store;
pub mod upsert;

pub use api::{AppState, UpsertResponse};
pub use blob_store::{legacy_key_from_url, ObjectStore, S3BlobStore, SignedUrl};
pub use config::Config;
pub use error::CatalogError;
pub use image_ingest::ImageIngestor;
pub use materializer::{CatalogMaterializer, CatalogTree, VariantView, UNNAMED_FALLBACK};
pub use model::{ProductType, SizeCode, UpsertOutcome, VariantRecord, VariantSubmission};
pub use store::{PgVariantStore, VariantStore};
pub use upsert::{validate_submission, UpsertEngine, UpsertResult, ValidSubmission};
