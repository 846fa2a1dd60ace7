//! Coach access fan-out.
//!
//! Creates one [`CoachAccessGrant`] per `(chunk, coach)` pair. Each coach is
//! processed independently: a failure for one coach is reported in that
//! coach's [`AccessResult`] and never stops the remaining coaches. Within a
//! coach every chunk grant is attempted, even after an earlier one failed.

use serde::Serialize;
use tracing::warn;

use crate::models::{CoachAccess, CoachAccessGrant};
use crate::store::Store;

/// Outcome of granting one coach access to a batch of chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    pub coach_id: String,
    pub success: bool,
    /// Number of grants created for this coach.
    pub granted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Grant every coach in `coach_access` its tier on every chunk in `chunk_ids`.
///
/// Callers must reject an empty `coach_access` before ingestion starts;
/// here an empty list simply yields no results.
pub async fn assign_access(
    store: &dyn Store,
    chunk_ids: &[String],
    coach_access: &[CoachAccess],
) -> Vec<AccessResult> {
    let mut results = Vec::with_capacity(coach_access.len());

    for access in coach_access {
        let mut granted = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for chunk_id in chunk_ids {
            let grant = CoachAccessGrant {
                chunk_id: chunk_id.clone(),
                coach_id: access.coach_id.clone(),
                access_tier: access.access_tier,
            };
            match store.insert_access_grant(&grant).await {
                Ok(()) => granted += 1,
                Err(e) => errors.push(format!("chunk {}: {:#}", chunk_id, e)),
            }
        }

        let error = if errors.is_empty() {
            None
        } else {
            warn!(
                coach_id = %access.coach_id,
                failed = errors.len(),
                granted,
                "coach access assignment failed"
            );
            Some(format!(
                "{} of {} grants failed: {}",
                errors.len(),
                chunk_ids.len(),
                errors.join("; ")
            ))
        };

        results.push(AccessResult {
            coach_id: access.coach_id.clone(),
            success: error.is_none(),
            granted,
            error,
        });
    }

    results
}
