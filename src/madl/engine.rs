//! engine.rs
//!
//! Reuse search and storage over the embedding + index collaborators.
//! Search degrades to an empty result when either collaborator is down:
//! reuse is an optional enhancement, never a hard dependency of generation.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::logger::{LogCategory, SessionLog};
use crate::madl::embedding::Embedder;
use crate::madl::index::VectorIndex;
use crate::madl::method::{MethodRecord, ScoredMethod};
use crate::plan::TestPlan;

pub struct ReuseEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_score: f32,
}

impl ReuseEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        min_score: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            min_score,
        }
    }

    /// One query per current-test-case step; per-query hits are merged by
    /// identity key keeping the highest-scoring instance (ties keep the
    /// first seen, so results are stable in query order).
    pub fn search(&self, plan: &TestPlan, log: &mut SessionLog) -> Vec<ScoredMethod> {
        let queries = step_queries(plan);
        if queries.is_empty() {
            log.info(LogCategory::Search, "No steps found in test plan");
            return Vec::new();
        }

        let mut merged: IndexMap<String, ScoredMethod> = IndexMap::new();

        for query in &queries {
            let vector = match self.embedder.embed(query) {
                Ok(v) => v,
                Err(e) => {
                    log.warning(
                        LogCategory::Search,
                        format!("Embedding unavailable for '{}': {}", query, e),
                    );
                    continue;
                }
            };

            let hits = match self.index.search(&vector, self.top_k, self.min_score) {
                Ok(hits) => hits,
                Err(e) => {
                    log.warning(
                        LogCategory::Search,
                        format!("Index search failed for '{}': {}", query, e),
                    );
                    continue;
                }
            };

            for hit in hits {
                let record: MethodRecord = match serde_json::from_value(hit.payload) {
                    Ok(r) => r,
                    Err(_) => continue,
                };

                let candidate = ScoredMethod {
                    record,
                    score: hit.score,
                };
                let key = candidate.record.identity_key();

                match merged.get(&key) {
                    Some(existing) if existing.score >= candidate.score => {}
                    _ => {
                        merged.insert(key, candidate);
                    }
                }
            }
        }

        log.info(
            LogCategory::Search,
            format!("Found {} unique reusable methods", merged.len()),
        );

        merged.into_values().collect()
    }

    /// Upsert one learned method under a fresh 63-bit random point id, so a
    /// collision with an unrelated existing point is practically impossible.
    pub fn store(&self, record: &MethodRecord) -> Result<(), String> {
        let vector = self.embedder.embed(&record.embeddable_text())?;
        let payload = serde_json::to_value(record).map_err(|e| e.to_string())?;
        self.index.upsert(fresh_point_id(), &vector, &payload)
    }
}

/// `"{step} with {arg}"` when the argument is present, bare step otherwise.
pub fn step_queries(plan: &TestPlan) -> Vec<String> {
    plan.current_bdd_steps
        .iter()
        .map(|(step, arg)| {
            if arg.is_empty() {
                step.clone()
            } else {
                format!("{} with {}", step, arg)
            }
        })
        .collect()
}

fn fresh_point_id() -> u64 {
    (uuid::Uuid::new_v4().as_u128() as u64) & (i64::MAX as u64)
}
