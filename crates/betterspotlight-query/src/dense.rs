//! Dense index: a flat cosine index per generation with shadow rebuilds
//! and atomic active-generation swaps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use betterspotlight_domain::entities::VectorMapEntry;
use betterspotlight_domain::ports::{DenseIndex, EmbeddingBackend};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use betterspotlight_store::SqliteStore;
use tokio::sync::RwLock;
use tracing::info;

/// Flat (exhaustive) cosine index. Vectors are unit-normalized on insert,
/// so similarity reduces to a dot product.
pub struct FlatDenseIndex {
    vectors: RwLock<HashMap<i64, Vec<f32>>>,
}

impl FlatDenseIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
        }
    }

    /// Load a persisted generation file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error when the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read(path)
            .map_err(|e| Error::io(format!("failed to read dense index {}", path.display()), e))?;
        let raw: HashMap<String, Vec<f32>> = serde_json::from_slice(&body)?;
        let vectors = raw
            .into_iter()
            .filter_map(|(k, v)| k.parse::<i64>().ok().map(|label| (label, v)))
            .collect();
        Ok(Self {
            vectors: RwLock::new(vectors),
        })
    }
}

impl Default for FlatDenseIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl DenseIndex for FlatDenseIndex {
    async fn insert(&self, label: i64, vector: Vec<f32>) -> Result<()> {
        self.vectors.write().await.insert(label, normalized(vector));
        Ok(())
    }

    async fn remove(&self, label: i64) -> Result<()> {
        self.vectors.write().await.remove(&label);
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        let query = normalized(vector.to_vec());
        let vectors = self.vectors.read().await;
        let mut scored: Vec<(i64, f32)> = vectors
            .iter()
            .map(|(label, v)| {
                let dot: f32 = query.iter().zip(v).map(|(a, b)| a * b).sum();
                (*label, dot)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    async fn persist(&self, path: &Path) -> Result<()> {
        let vectors = self.vectors.read().await;
        let raw: HashMap<String, &Vec<f32>> =
            vectors.iter().map(|(k, v)| (k.to_string(), v)).collect();
        let body = serde_json::to_vec(&raw)?;
        std::fs::write(path, body)
            .map_err(|e| Error::io(format!("failed to persist dense index {}", path.display()), e))?;
        Ok(())
    }
}

/// Manages the active dense-index generation and shadow rebuilds.
pub struct VectorIndexManager {
    store: SqliteStore,
    data_dir: PathBuf,
    active: ArcSwapOption<FlatDenseIndex>,
    rebuild_running: AtomicBool,
}

impl VectorIndexManager {
    /// Create the manager and load the persisted active generation, if any.
    #[must_use]
    pub fn new(store: SqliteStore, data_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            store,
            data_dir,
            active: ArcSwapOption::empty(),
            rebuild_running: AtomicBool::new(false),
        })
    }

    fn generation_path(&self, version: i64) -> PathBuf {
        self.data_dir.join(format!("dense-gen-{version}.json"))
    }

    /// Load the active generation recorded in the store.
    pub async fn load_active(&self) -> Result<()> {
        let state = self.store.get_generation_state().await?;
        if state.active_version == 0 {
            return Ok(());
        }
        let path = self.generation_path(state.active_version);
        if !path.exists() {
            return Ok(());
        }
        let index = FlatDenseIndex::load(&path)?;
        self.active.store(Some(Arc::new(index)));
        info!(generation = state.active_version, "dense index loaded");
        Ok(())
    }

    /// The active index, when a generation is loaded.
    #[must_use]
    pub fn active(&self) -> Option<Arc<FlatDenseIndex>> {
        self.active.load_full()
    }

    /// Rebuild on a shadow generation, then atomically swap it active.
    /// Labels are item ids; the vector map records the generation so stale
    /// labels from older generations never resolve.
    ///
    /// # Errors
    ///
    /// `ALREADY_RUNNING` when a rebuild is in flight; store/embedding
    /// errors propagate.
    pub async fn rebuild(&self, embedder: &dyn EmbeddingBackend) -> Result<i64> {
        if self.rebuild_running.swap(true, Ordering::SeqCst) {
            return Err(Error::already_running("vector index rebuild in progress"));
        }
        let result = self.rebuild_inner(embedder).await;
        self.rebuild_running.store(false, Ordering::SeqCst);
        result
    }

    async fn rebuild_inner(&self, embedder: &dyn EmbeddingBackend) -> Result<i64> {
        let state = self.store.get_generation_state().await?;
        let shadow_version = state.active_version + 1;
        let shadow = FlatDenseIndex::new();

        let items = self.store.items_with_chunk_text(512).await?;
        let mut indexed = 0usize;
        for (item_id, text) in items {
            let embeddings = embedder.embed(&[text]).await?;
            let Some(vector) = embeddings.into_iter().next() else {
                continue;
            };
            shadow.insert(item_id, vector).await?;
            self.store
                .upsert_vector_map(&VectorMapEntry {
                    item_id,
                    dense_label: item_id,
                    model_version: embedder.model_id().to_owned(),
                    generation: shadow_version,
                    embedded_at: time::epoch_secs(),
                })
                .await?;
            indexed += 1;
        }

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| Error::io("failed to create data directory", e))?;
        shadow.persist(&self.generation_path(shadow_version)).await?;
        self.store.swap_generation(shadow_version).await?;
        self.active.store(Some(Arc::new(shadow)));

        // Drop the pre-rollback generation file; the rollback one stays.
        if state.rollback_version > 0 {
            let _ = std::fs::remove_file(self.generation_path(state.rollback_version));
        }

        info!(generation = shadow_version, indexed, "vector index rebuilt");
        Ok(shadow_version)
    }
}
