//! Best-effort model selection.
//!
//! A winning candidate only proves the model answered an initialization
//! check; the later generation call can still fail.

use std::future::Future;

use pebbles_shared::Result;
use tracing::{info, warn};

/// Probe `candidates` in order and return the first that initializes.
///
/// Falls back to `fallback` (unprobed) when every candidate fails.
pub async fn first_available<F, Fut>(candidates: &[String], fallback: &str, mut probe: F) -> String
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    for candidate in candidates {
        match probe(candidate.clone()).await {
            Ok(()) => {
                info!(model = %candidate, "model initialized");
                return candidate.clone();
            }
            Err(e) => {
                warn!(model = %candidate, error = %e, "model unavailable, trying next candidate");
            }
        }
    }

    warn!(model = fallback, "no candidate model initialized, using fallback");
    fallback.to_string()
}
