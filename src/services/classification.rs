// Classification: single and bulk category assignment over persisted
// symbols. Operates independently of extraction jobs.

use tracing::debug;

use crate::core::errors::RepositoryResult;
use crate::core::types::{BulkCategorizeOutcome, Symbol, SymbolFilter, SymbolId};
use crate::repository::SymbolRepository;
use crate::utils::Metrics;

pub struct ClassificationService {
    repository: SymbolRepository,
    metrics: Metrics,
}

impl ClassificationService {
    pub fn new(repository: SymbolRepository, metrics: Metrics) -> Self {
        Self {
            repository,
            metrics,
        }
    }

    /// Assign a category. Idempotent: assigning the current category again
    /// is a no-op that still succeeds.
    pub fn categorize(&self, id: SymbolId, category: &str) -> RepositoryResult<Symbol> {
        let (symbol, changed) = self.repository.set_category(id, Some(category))?;
        if changed {
            self.metrics.record_symbols_categorized(1);
            debug!(symbol_id = id, category, "symbol categorized");
        }
        Ok(symbol)
    }

    /// Remove a symbol's category (back to unclassified).
    pub fn clear(&self, id: SymbolId) -> RepositoryResult<Symbol> {
        let (symbol, changed) = self.repository.set_category(id, None)?;
        if changed {
            debug!(symbol_id = id, "symbol category cleared");
        }
        Ok(symbol)
    }

    /// Apply one category to every listed symbol. Each id succeeds or fails
    /// independently; an unknown id never aborts the batch.
    pub fn categorize_bulk(
        &self,
        ids: &[SymbolId],
        category: &str,
    ) -> Vec<BulkCategorizeOutcome> {
        let mut changed_total = 0;
        let outcomes = ids
            .iter()
            .map(|&id| match self.repository.set_category(id, Some(category)) {
                Ok((_, changed)) => {
                    if changed {
                        changed_total += 1;
                    }
                    BulkCategorizeOutcome {
                        symbol_id: id,
                        success: true,
                        error: None,
                    }
                }
                Err(e) => BulkCategorizeOutcome {
                    symbol_id: id,
                    success: false,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        if changed_total > 0 {
            self.metrics.record_symbols_categorized(changed_total);
        }
        debug!(
            requested = ids.len(),
            changed = changed_total,
            category,
            "bulk categorization applied"
        );
        outcomes
    }

    /// Resolve a filter to concrete ids. Bulk flows are an explicit
    /// query-then-act two-step: the returned set is fixed at this instant,
    /// not a live filter.
    pub fn resolve(&self, filter: &SymbolFilter) -> Vec<SymbolId> {
        self.repository.resolve_filter(filter)
    }
}
