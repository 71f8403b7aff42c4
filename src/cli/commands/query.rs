use std::sync::Arc;

use anyhow::Context;

use crate::clients::{MedlinePlusClient, UpstreamClient};
use crate::config::Config;
use crate::models::SearchPayload;
use crate::services::{ResultCache, SearchService};

pub async fn cmd_query(config: &Config, symptom: &[String], terms: bool) -> anyhow::Result<()> {
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(MedlinePlusClient::from_config(&config.upstream)?);
    let service = SearchService::new(upstream, Arc::new(ResultCache::new()), config);

    let payload = if terms {
        SearchPayload::terms(symptom.iter().cloned())
    } else {
        SearchPayload::phrase(symptom.join(" "))
    };

    let response = service.search(&payload).await?;
    let json = serde_json::to_string_pretty(&*response).context("Failed to encode response")?;
    println!("{json}");

    let failed = response.results.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        tracing::warn!(failed, "Some keyword lookups failed");
    }

    Ok(())
}
