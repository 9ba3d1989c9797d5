//! Generation pipeline: topic → provider call → normalized [`Pebble`].

use std::time::Instant;

use tracing::{error, info, instrument};

use pebbles_providers::ProviderAdapter;
use pebbles_shared::{Pebble, PebblesError, Result};

use crate::normalize::normalize_response;

/// Longest slice of a bad provider reply that is logged.
const EXCERPT_CHARS: usize = 200;

/// Generate a pebble on `topic`, biased toward continuity with `context`.
///
/// The result is unowned and unsaved.
#[instrument(skip_all, fields(provider = %adapter.kind(), topic = %topic, context = context.len()))]
pub async fn generate_pebble(
    adapter: &ProviderAdapter,
    topic: &str,
    context: &[Pebble],
) -> Result<Pebble> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(PebblesError::validation("topic must not be empty"));
    }

    let start = Instant::now();
    info!(model = adapter.model(), "requesting pebble");

    let raw = adapter.generate(topic, context).await?;
    let pebble = normalize_response(&raw, topic).inspect_err(|e| {
        error!(
            provider = %adapter.kind(),
            error = %e,
            excerpt = %excerpt(&raw),
            "provider reply could not be normalized"
        );
    })?;

    info!(
        id = %pebble.id,
        main_blocks = pebble.content.eli5.main_content.len() + pebble.content.academic.main_content.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "pebble generated"
    );
    Ok(pebble)
}

fn excerpt(raw: &str) -> String {
    let mut out: String = raw.chars().take(EXCERPT_CHARS).collect();
    if raw.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}
