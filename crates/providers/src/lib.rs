//! Remote model implementations for Kokua.
//!
//! All providers implement the `kokua_core::ModelProvider` trait.
//! `build_from_config` constructs the configured provider or reports that
//! the remote model is unavailable (which routes the service into degraded
//! mode rather than failing startup).

pub mod vertex;

pub use vertex::VertexProvider;

use std::sync::Arc;

use kokua_core::{ModelError, ModelProvider};

/// Build the remote model provider from configuration.
///
/// Returns `NotConfigured` when the required project/location settings are
/// absent — an expected condition, not a startup failure.
pub fn build_from_config(
    config: &kokua_config::AppConfig,
) -> Result<Arc<dyn ModelProvider>, ModelError> {
    if !config.vertex.is_configured() {
        return Err(ModelError::NotConfigured(
            "vertex.project_id and vertex.location are required".into(),
        ));
    }

    // is_configured() guarantees project_id is present and non-empty
    let project_id = config.vertex.project_id.clone().unwrap_or_default();

    let mut provider = VertexProvider::new(
        &project_id,
        &config.vertex.location,
        &config.vertex.model,
        config.vertex.access_token.clone().unwrap_or_default(),
    );

    if let Some(ref url) = config.vertex.api_url {
        provider = provider.with_base_url(url);
    }

    Ok(Arc::new(provider))
}
