// Symbol repository: persistence, signature index, frequency and
// similarity queries.
//
// State lives under one RwLock so every mutation of the signature index is
// serialized; frequency (bucket size) stays consistent even when concurrent
// jobs on different pages collide on a signature. Re-extraction replaces a
// page's symbol set under a single write-lock hold: delete-then-insert,
// never a partial replacement.
//
// Snapshots: JSON file loaded at startup, debounced background saves, plus
// an explicit async save() for immediate mode.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::core::errors::{RepositoryError, RepositoryResult};
use crate::core::types::{
    BoundingBox, CategoryCount, PageId, SignatureCount, Symbol, SymbolDraft, SymbolFilter,
    SymbolId,
};
use crate::services::signature::{parse_hex, to_hex};

const SNAPSHOT_FILE: &str = "symbols.json";

/// Stored form of a symbol. Frequency is not stored: it is derived from the
/// signature index on every read, so it can never drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSymbol {
    id: SymbolId,
    page_id: PageId,
    bounding_box: BoundingBox,
    category: Option<String>,
    signature: u64,
    metadata: BTreeMap<String, String>,
    extracted_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RepoState {
    symbols: BTreeMap<SymbolId, StoredSymbol>,
    by_page: BTreeMap<PageId, Vec<SymbolId>>,
    by_signature: HashMap<u64, Vec<SymbolId>>,
    next_id: SymbolId,
}

impl RepoState {
    fn insert(&mut self, symbol: StoredSymbol) {
        self.by_page
            .entry(symbol.page_id)
            .or_default()
            .push(symbol.id);
        self.by_signature
            .entry(symbol.signature)
            .or_default()
            .push(symbol.id);
        self.symbols.insert(symbol.id, symbol);
    }

    fn remove(&mut self, id: SymbolId) {
        if let Some(symbol) = self.symbols.remove(&id) {
            if let Some(bucket) = self.by_signature.get_mut(&symbol.signature) {
                bucket.retain(|s| *s != id);
                if bucket.is_empty() {
                    self.by_signature.remove(&symbol.signature);
                }
            }
        }
    }

    fn frequency(&self, signature: u64) -> usize {
        self.by_signature.get(&signature).map_or(0, Vec::len)
    }

    fn materialize(&self, stored: &StoredSymbol) -> Symbol {
        Symbol {
            id: stored.id,
            page_id: stored.page_id,
            bounding_box: stored.bounding_box,
            category: stored.category.clone(),
            frequency: self.frequency(stored.signature),
            signature: to_hex(stored.signature),
            metadata: stored.metadata.clone(),
            extracted_at: stored.extracted_at,
        }
    }
}

/// On-disk snapshot shape. Indexes are rebuilt on load.
#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    next_id: SymbolId,
    symbols: Vec<StoredSymbol>,
}

#[derive(Clone)]
pub struct SymbolRepository {
    inner: Arc<RepoInner>,
}

struct RepoInner {
    state: RwLock<RepoState>,
    snapshot_file: PathBuf,
    dirty: RwLock<bool>,
    save_notify: Notify,
}

impl SymbolRepository {
    /// Open (or create) a repository rooted at `data_dir`.
    ///
    /// # Arguments
    /// * `data_dir` - Directory holding the snapshot file
    /// * `save_interval` - Debounce for background saves; `None` or zero
    ///   disables the background task (callers save explicitly)
    pub async fn new(data_dir: &str, save_interval: Option<Duration>) -> RepositoryResult<Self> {
        let dir = Path::new(data_dir);
        if !dir.exists() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| RepositoryError::Persistence {
                    path: data_dir.to_string(),
                    source,
                })?;
        }

        let snapshot_file = dir.join(SNAPSHOT_FILE);
        let mut state = RepoState::default();
        state.next_id = 1;

        if snapshot_file.exists() {
            let data = tokio::fs::read_to_string(&snapshot_file)
                .await
                .map_err(|source| RepositoryError::Persistence {
                    path: snapshot_file.display().to_string(),
                    source,
                })?;
            // A corrupt snapshot should not brick the subsystem; start empty
            // and let the next save overwrite it.
            let snapshot: Snapshot = serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("discarding unreadable symbol snapshot: {e}");
                Snapshot::default()
            });
            state.next_id = snapshot.next_id.max(1);
            for symbol in snapshot.symbols {
                state.insert(symbol);
            }
            info!(
                symbols = state.symbols.len(),
                signatures = state.by_signature.len(),
                "loaded symbol snapshot"
            );
        }

        let repository = Self {
            inner: Arc::new(RepoInner {
                state: RwLock::new(state),
                snapshot_file,
                dirty: RwLock::new(false),
                save_notify: Notify::new(),
            }),
        };

        if let Some(interval) = save_interval {
            if interval.as_secs() > 0 {
                repository.start_persistence_task(interval);
            }
        }

        Ok(repository)
    }

    /// Atomically replace a page's symbol set with freshly extracted drafts.
    ///
    /// Old symbols for the page are superseded, never duplicated; the
    /// signature index is updated under the same write-lock hold so
    /// manuscript-wide frequency counts never observe a partial state.
    /// Drafts must arrive in reading order: ids are assigned in draft order.
    pub fn replace_page(&self, page_id: PageId, drafts: Vec<SymbolDraft>) -> Vec<Symbol> {
        let now = Utc::now();
        let mut state = self.inner.state.write();

        if let Some(old_ids) = state.by_page.remove(&page_id) {
            debug!(page_id, superseded = old_ids.len(), "re-extraction replaces page symbols");
            for id in old_ids {
                state.remove(id);
            }
        }

        let mut new_ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = state.next_id;
            state.next_id += 1;
            state.insert(StoredSymbol {
                id,
                page_id,
                bounding_box: draft.bounding_box,
                category: None,
                signature: draft.signature,
                metadata: draft.metadata,
                extracted_at: now,
            });
            new_ids.push(id);
        }

        let symbols = new_ids
            .iter()
            .map(|id| state.materialize(&state.symbols[id]))
            .collect();
        drop(state);

        self.mark_dirty();
        symbols
    }

    pub fn get(&self, id: SymbolId) -> RepositoryResult<Symbol> {
        let state = self.inner.state.read();
        state
            .symbols
            .get(&id)
            .map(|s| state.materialize(s))
            .ok_or(RepositoryError::SymbolNotFound(id))
    }

    /// Symbols for a page in extraction (reading) order.
    pub fn for_page(&self, page_id: PageId) -> Vec<Symbol> {
        let state = self.inner.state.read();
        state
            .by_page
            .get(&page_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| state.materialize(&state.symbols[id]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Symbols sharing the query symbol's signature bucket, ranked by how
    /// close their bounding-box area is to the query's, then by id.
    pub fn similar_to(&self, id: SymbolId) -> RepositoryResult<Vec<Symbol>> {
        let state = self.inner.state.read();
        let query = state
            .symbols
            .get(&id)
            .ok_or(RepositoryError::SymbolNotFound(id))?;

        let mut matches: Vec<&StoredSymbol> = state
            .by_signature
            .get(&query.signature)
            .map(|ids| {
                ids.iter()
                    .filter(|sid| **sid != id)
                    .map(|sid| &state.symbols[sid])
                    .collect()
            })
            .unwrap_or_default();

        let query_area = query.bounding_box.area();
        matches.sort_by_key(|s| (s.bounding_box.area().abs_diff(query_area), s.id));

        Ok(matches.iter().map(|s| state.materialize(s)).collect())
    }

    /// Set or clear a symbol's category. Returns the symbol and whether the
    /// stored value actually changed (same value twice is a no-op success).
    /// Frequency is signature-based and unaffected.
    pub fn set_category(
        &self,
        id: SymbolId,
        category: Option<&str>,
    ) -> RepositoryResult<(Symbol, bool)> {
        let category = match category {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(RepositoryError::EmptyCategory);
                }
                Some(trimmed.to_string())
            }
            None => None,
        };

        let mut state = self.inner.state.write();
        let stored = state
            .symbols
            .get_mut(&id)
            .ok_or(RepositoryError::SymbolNotFound(id))?;

        let changed = stored.category != category;
        stored.category = category;
        let symbol = state.materialize(&state.symbols[&id]);
        drop(state);

        if changed {
            self.mark_dirty();
        }
        Ok((symbol, changed))
    }

    /// Resolve a filter to the matching ids as of this instant; the
    /// query-then-act half of bulk categorization.
    pub fn resolve_filter(&self, filter: &SymbolFilter) -> Vec<SymbolId> {
        let signature = filter.signature.as_deref().map(parse_hex);
        if matches!(signature, Some(None)) {
            // Unparseable signature matches nothing.
            return Vec::new();
        }
        let signature = signature.flatten();

        let state = self.inner.state.read();
        state
            .symbols
            .values()
            .filter(|s| filter.page_start.is_none_or(|p| s.page_id >= p))
            .filter(|s| filter.page_end.is_none_or(|p| s.page_id <= p))
            .filter(|s| signature.is_none_or(|sig| s.signature == sig))
            .filter(|s| !filter.unclassified || s.category.is_none())
            .map(|s| s.id)
            .collect()
    }

    /// Signature buckets sorted by count descending, then signature.
    pub fn frequency_report(&self) -> Vec<SignatureCount> {
        let state = self.inner.state.read();
        let mut report: Vec<SignatureCount> = state
            .by_signature
            .iter()
            .map(|(sig, ids)| SignatureCount {
                signature: to_hex(*sig),
                count: ids.len(),
            })
            .collect();
        report.sort_by(|a, b| b.count.cmp(&a.count).then(a.signature.cmp(&b.signature)));
        report
    }

    /// Category histogram; symbols without a category land in
    /// "unclassified".
    pub fn category_distribution(&self) -> Vec<CategoryCount> {
        let state = self.inner.state.read();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for symbol in state.symbols.values() {
            *counts
                .entry(symbol.category.as_deref().unwrap_or("unclassified"))
                .or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.state.read().symbols.len()
    }

    /// Write the snapshot now. Used by immediate mode and shutdown.
    pub async fn save(&self) -> RepositoryResult<()> {
        let snapshot = {
            let state = self.inner.state.read();
            Snapshot {
                next_id: state.next_id,
                symbols: state.symbols.values().cloned().collect(),
            }
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.inner.snapshot_file, json)
            .await
            .map_err(|source| RepositoryError::Persistence {
                path: self.inner.snapshot_file.display().to_string(),
                source,
            })?;

        *self.inner.dirty.write() = false;
        Ok(())
    }

    fn mark_dirty(&self) {
        *self.inner.dirty.write() = true;
        self.inner.save_notify.notify_one();
    }

    /// Background task for debounced snapshot persistence.
    fn start_persistence_task(&self, interval: Duration) {
        let repository = self.clone();

        tokio::spawn(async move {
            let mut last_save = Instant::now();

            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;

                let is_dirty = *repository.inner.dirty.read();
                if is_dirty && last_save.elapsed() >= interval {
                    if let Err(e) = repository.save().await {
                        warn!("background symbol snapshot failed: {e}");
                    }
                    last_save = Instant::now();
                }
            }
        });
    }
}
