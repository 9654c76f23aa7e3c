//! Asynchronous analysis providers (website scan, competitor research).
//!
//! Providers are opaque: they receive the current answers and eventually
//! produce a JSON result. The session records progress under the provider's
//! key as `{status, result | error}`, and drops the outcome if the session
//! ended while the provider was running.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::AnalysisError;

use super::model::SessionData;
use super::steps::ANALYSIS_COMPLETE;
use super::store::SessionStore;

pub const ANALYSIS_RUNNING: &str = "running";
pub const ANALYSIS_FAILED: &str = "failed";

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Session data key the result is recorded under.
    fn key(&self) -> &str;

    async fn analyze(&self, data: &SessionData) -> Result<Value, AnalysisError>;
}

/// Run one provider against the current answers.
///
/// Returns `Ok(true)` when the result was recorded and `Ok(false)` when the
/// session ended first. A provider failure is recorded too, then returned.
pub async fn run_analysis(
    store: &SessionStore,
    provider: &dyn AnalysisProvider,
) -> Result<bool, AnalysisError> {
    let key = provider.key().to_string();
    let session_id = store.session_id();

    if !store.update(SessionData::new().with(&key, json!({ "status": ANALYSIS_RUNNING }))) {
        return Ok(false);
    }
    debug!(%session_id, provider = %key, "Analysis started");

    let outcome = provider.analyze(&store.data()).await;
    let record = match &outcome {
        Ok(result) => json!({ "status": ANALYSIS_COMPLETE, "result": result }),
        Err(e) => json!({ "status": ANALYSIS_FAILED, "error": e.to_string() }),
    };

    if !store.update(SessionData::new().with(&key, record)) {
        info!(%session_id, provider = %key, "Analysis finished after session ended; result dropped");
        return Ok(false);
    }

    match outcome {
        Ok(_) => {
            info!(%session_id, provider = %key, "Analysis complete");
            Ok(true)
        }
        Err(e) => {
            warn!(%session_id, provider = %key, error = %e, "Analysis failed");
            Err(e)
        }
    }
}

/// Run several providers concurrently. Results keep the providers' order.
pub async fn run_analyses(
    store: &SessionStore,
    providers: &[Arc<dyn AnalysisProvider>],
) -> Vec<Result<bool, AnalysisError>> {
    join_all(
        providers
            .iter()
            .map(|provider| run_analysis(store, provider.as_ref())),
    )
    .await
}
