// Page store: the data contract to the upload/storage subsystem.
//
// This core only ever reads pages. The in-memory implementation is fed
// either by the startup directory loader or directly by tests; a decoded
// image LRU sits on top so re-extractions and thumbnail requests don't pay
// for repeated PNG decoding.

use image::DynamicImage;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::{DetectionError, PipelineError, PipelineResult};
use crate::core::types::{Page, PageId};
use crate::utils::image_ops::load_image_from_memory_async;

/// Read side of the upload subsystem's page contract.
pub trait PageStore: Send + Sync {
    fn get(&self, page_id: PageId) -> Option<Page>;
    fn image_bytes(&self, page_id: PageId) -> Option<Arc<Vec<u8>>>;
    fn list(&self) -> Vec<Page>;
    /// Page ids present in the inclusive id range. Ids need not be dense.
    fn ids_in_range(&self, start: PageId, end: PageId) -> Vec<PageId>;
}

struct PageEntry {
    page: Page,
    bytes: Arc<Vec<u8>>,
}

pub struct InMemoryPageStore {
    pages: RwLock<BTreeMap<PageId, PageEntry>>,
    next_id: AtomicU64,
}

impl InMemoryPageStore {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a page, decoding the image once to learn its dimensions.
    pub async fn register(
        &self,
        folio: &str,
        section: Option<&str>,
        source: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<Page> {
        let img = load_image_from_memory_async(&bytes).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let page = Page {
            id,
            folio: folio.to_string(),
            width: img.width(),
            height: img.height(),
            section: section.map(str::to_string),
            source: source.to_string(),
        };
        self.pages.write().insert(
            id,
            PageEntry {
                page: page.clone(),
                bytes: Arc::new(bytes),
            },
        );
        Ok(page)
    }

    /// Scan a directory for page images (PNG/JPEG), registering them in
    /// filename order so ids are stable across restarts. The folio label is
    /// the file stem.
    pub async fn load_directory(&self, dir: &str) -> anyhow::Result<usize> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            if matches!(ext.as_deref(), Some("png" | "jpg" | "jpeg")) {
                entries.push(path);
            }
        }
        entries.sort();

        let mut loaded = 0;
        for path in entries {
            let folio = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            let bytes = tokio::fs::read(&path).await?;
            match self
                .register(&folio, None, &path.display().to_string(), bytes)
                .await
            {
                Ok(page) => {
                    loaded += 1;
                    info!(page_id = page.id, folio = %page.folio, "registered page");
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable page image: {e:#}");
                }
            }
        }
        Ok(loaded)
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for InMemoryPageStore {
    fn get(&self, page_id: PageId) -> Option<Page> {
        self.pages.read().get(&page_id).map(|e| e.page.clone())
    }

    fn image_bytes(&self, page_id: PageId) -> Option<Arc<Vec<u8>>> {
        self.pages.read().get(&page_id).map(|e| Arc::clone(&e.bytes))
    }

    fn list(&self) -> Vec<Page> {
        self.pages.read().values().map(|e| e.page.clone()).collect()
    }

    fn ids_in_range(&self, start: PageId, end: PageId) -> Vec<PageId> {
        self.pages.read().range(start..=end).map(|(id, _)| *id).collect()
    }
}

/// Decoded-image LRU over a page store.
pub struct PageCache {
    store: Arc<dyn PageStore>,
    decoded: Mutex<LruCache<PageId, Arc<DynamicImage>>>,
}

impl PageCache {
    pub fn new(store: Arc<dyn PageStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            store,
            decoded: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch the decoded image for a page, decoding off the async runtime
    /// on a miss. Decode failures carry the page id (page-scoped error).
    pub async fn decoded_image(&self, page_id: PageId) -> PipelineResult<Arc<DynamicImage>> {
        if let Some(img) = self.decoded.lock().get(&page_id) {
            return Ok(Arc::clone(img));
        }

        let bytes = self
            .store
            .image_bytes(page_id)
            .ok_or(PipelineError::PageNotFound(page_id))?;

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
            .map_err(|source| PipelineError::Detection {
                page_id,
                source: DetectionError::ImageRead { page_id, source },
            })?;

        let img = Arc::new(decoded);
        self.decoded.lock().put(page_id, Arc::clone(&img));
        Ok(img)
    }
}
