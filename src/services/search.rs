//! Turns symptom queries into MedlinePlus lookups.
//!
//! A phrase search is a single upstream call whose failure fails the request.
//! A keyword search issues one exact-phrase call per term; a failing term is
//! reported as an inline error record and never aborts the batch.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clients::{UpstreamClient, UpstreamError};
use crate::config::Config;
use crate::models::{ResultRecord, SearchMode, SearchPayload, SearchRequest, SearchResponse};
use crate::parser::{ParseError, parse_search_results};
use crate::services::cache::{Fingerprint, ResultCache};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("MedlinePlus API error: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("MedlinePlus API error: {0}")]
    MalformedUpstreamResponse(#[from] ParseError),
}

impl SearchError {
    /// The underlying cause without the service prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::UpstreamUnavailable(e) => e.to_string(),
            Self::MalformedUpstreamResponse(e) => e.to_string(),
            Self::InvalidInput(msg) => msg.clone(),
        }
    }
}

impl TryFrom<&SearchPayload> for SearchRequest {
    type Error = SearchError;

    fn try_from(payload: &SearchPayload) -> Result<Self, Self::Error> {
        match SearchMode::from_label(&payload.search_type_label()) {
            Some(SearchMode::Phrase) => match &payload.symptom {
                Some(Value::String(text)) if !text.trim().is_empty() => {
                    Ok(Self::Phrase(text.trim().to_string()))
                }
                _ => Err(SearchError::InvalidInput(
                    "symptom must be a non-empty string when searchType=1".to_string(),
                )),
            },
            Some(SearchMode::TermList) => match &payload.symptom {
                Some(Value::Array(items)) if !items.is_empty() => {
                    Ok(Self::TermList(items.iter().map(term_text).collect()))
                }
                _ => Err(SearchError::InvalidInput(
                    "symptom must be a non-empty array when searchType=2".to_string(),
                )),
            },
            None => Err(SearchError::InvalidInput(
                "searchType must be 1 or 2".to_string(),
            )),
        }
    }
}

/// Non-string list items are searched by their JSON text; `null` counts as blank.
fn term_text(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Result of looking up one keyword.
#[derive(Debug)]
enum TermOutcome {
    Found(Vec<ResultRecord>),
    Failed(String),
}

impl TermOutcome {
    fn into_records(self) -> Vec<ResultRecord> {
        match self {
            Self::Found(records) => records,
            Self::Failed(detail) => vec![ResultRecord::failure(detail)],
        }
    }
}

pub struct SearchService {
    upstream: Arc<dyn UpstreamClient>,
    cache: Arc<ResultCache>,
    cache_enabled: bool,
    max_concurrent_terms: usize,
}

impl SearchService {
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>, cache: Arc<ResultCache>, config: &Config) -> Self {
        Self {
            upstream,
            cache,
            cache_enabled: config.cache.enabled,
            max_concurrent_terms: config.upstream.max_concurrent_terms.max(1),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Answers a raw request, serving repeated requests from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidInput`] for malformed requests, and the
    /// upstream error of a failed phrase search. Failed responses are not cached,
    /// and neither are responses that were in flight when the cache was cleared.
    pub async fn search(&self, payload: &SearchPayload) -> Result<Arc<SearchResponse>, SearchError> {
        let fingerprint = Fingerprint::of(payload);
        let generation = self.cache.generation().await;

        if self.cache_enabled
            && let Some(cached) = self.cache.lookup(&fingerprint).await
        {
            metrics::counter!("search_cache_hits_total").increment(1);
            info!(fingerprint = %fingerprint, "Serving search from cache");
            return Ok(cached);
        }
        metrics::counter!("search_cache_misses_total").increment(1);

        let request = SearchRequest::try_from(payload)?;
        let response = Arc::new(self.aggregate(&request).await?);

        if self.cache_enabled
            && !self
                .cache
                .insert(fingerprint, Arc::clone(&response), generation)
                .await
        {
            debug!("Cache was cleared while searching, response not stored");
        }

        Ok(response)
    }

    /// Runs the upstream lookups for a validated request.
    ///
    /// # Errors
    ///
    /// Only phrase searches fail; keyword searches embed failures as records.
    pub async fn aggregate(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        match request {
            SearchRequest::Phrase(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SearchError::InvalidInput(
                        "symptom must be a non-empty string when searchType=1".to_string(),
                    ));
                }

                let results = self.fetch_records(text).await.inspect_err(|e| {
                    warn!(query = %text, error = %e, "Phrase search failed");
                })?;
                Ok(SearchResponse::new(request.mode(), results))
            }
            SearchRequest::TermList(terms) => {
                if terms.is_empty() {
                    return Err(SearchError::InvalidInput(
                        "symptom must be a non-empty array when searchType=2".to_string(),
                    ));
                }

                let results = self.search_terms(terms).await;
                Ok(SearchResponse::new(request.mode(), results))
            }
        }
    }

    async fn search_terms(&self, terms: &[String]) -> Vec<ResultRecord> {
        let keywords: Vec<String> = terms
            .iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect();

        debug!(
            terms = keywords.len(),
            skipped = terms.len() - keywords.len(),
            "Searching keywords"
        );

        // `buffered` yields in input order regardless of completion order.
        let outcomes: Vec<TermOutcome> = stream::iter(keywords)
            .map(|keyword| async move { self.search_term(&keyword).await })
            .buffered(self.max_concurrent_terms)
            .collect()
            .await;

        outcomes
            .into_iter()
            .flat_map(TermOutcome::into_records)
            .collect()
    }

    async fn search_term(&self, keyword: &str) -> TermOutcome {
        match self.fetch_records(&format!("\"{keyword}\"")).await {
            Ok(records) => TermOutcome::Found(records),
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "Keyword search failed");
                TermOutcome::Failed(e.detail())
            }
        }
    }

    async fn fetch_records(&self, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
        let xml = self.upstream.fetch(query).await?;
        Ok(parse_search_results(&xml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn xml(titles: &[&str]) -> String {
        let documents: String = titles
            .iter()
            .map(|t| {
                format!(
                    r#"<document url="https://medlineplus.gov/{t}.html"><content name="title">{t}</content><content name="FullSummary">About {t}</content></document>"#
                )
            })
            .collect();
        format!("<nlmSearchResult><list>{documents}</list></nlmSearchResult>")
    }

    #[derive(Default)]
    struct FakeUpstream {
        responses: HashMap<String, Result<String, UpstreamError>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeUpstream {
        fn respond(mut self, query: &str, response: Result<String, UpstreamError>) -> Self {
            self.responses.insert(query.to_string(), response);
            self
        }

        fn delay(mut self, query: &str, delay: Duration) -> Self {
            self.delays.insert(query.to_string(), delay);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn fetch(&self, query: &str) -> Result<String, UpstreamError> {
            self.calls.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.delays.get(query) {
                tokio::time::sleep(*delay).await;
            }
            self.responses
                .get(query)
                .cloned()
                .unwrap_or_else(|| Ok(xml(&[])))
        }
    }

    /// Upstream that empties the cache mid-request, as a midnight sweep would.
    struct ClearingUpstream {
        cache: Arc<ResultCache>,
    }

    #[async_trait]
    impl UpstreamClient for ClearingUpstream {
        async fn fetch(&self, _query: &str) -> Result<String, UpstreamError> {
            self.cache.clear().await;
            Ok(xml(&["Cough"]))
        }
    }

    fn service(upstream: &Arc<FakeUpstream>, config: &Config) -> SearchService {
        let upstream: Arc<dyn UpstreamClient> = upstream.clone();
        SearchService::new(upstream, Arc::new(ResultCache::new()), config)
    }

    #[test]
    fn test_request_validation() {
        let phrase = SearchRequest::try_from(&SearchPayload::phrase("  Cough  ")).unwrap();
        assert_eq!(phrase, SearchRequest::Phrase("Cough".to_string()));

        assert!(matches!(
            SearchRequest::try_from(&SearchPayload::phrase("   ")),
            Err(SearchError::InvalidInput(_))
        ));
        assert!(matches!(
            SearchRequest::try_from(&SearchPayload::terms(Vec::<String>::new())),
            Err(SearchError::InvalidInput(_))
        ));

        let wrong_shape: SearchPayload =
            serde_json::from_str(r#"{"searchType": "2", "symptom": "Fever"}"#).unwrap();
        assert!(matches!(
            SearchRequest::try_from(&wrong_shape),
            Err(SearchError::InvalidInput(_))
        ));

        let unknown: SearchPayload =
            serde_json::from_str(r#"{"searchType": "3", "symptom": "Fever"}"#).unwrap();
        assert!(matches!(
            SearchRequest::try_from(&unknown),
            Err(SearchError::InvalidInput(msg)) if msg == "searchType must be 1 or 2"
        ));
    }

    #[test]
    fn test_term_list_items_are_stringified() {
        let payload: SearchPayload =
            serde_json::from_str(r#"{"searchType": 2, "symptom": ["Fever", null, 42]}"#).unwrap();
        assert_eq!(
            SearchRequest::try_from(&payload).unwrap(),
            SearchRequest::TermList(vec!["Fever".to_string(), String::new(), "42".to_string()])
        );
    }

    #[tokio::test]
    async fn test_phrase_search_queries_trimmed_text() {
        let upstream = Arc::new(FakeUpstream::default().respond("Cough", Ok(xml(&["Cough", "Croup"]))));
        let service = service(&upstream, &Config::default());

        let response = service
            .aggregate(&SearchRequest::Phrase(" Cough ".to_string()))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.search_type, SearchMode::Phrase);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].title, "Cough");
        assert_eq!(response.results[1].title, "Croup");
        assert_eq!(upstream.calls(), vec!["Cough".to_string()]);
    }

    #[tokio::test]
    async fn test_phrase_search_failure_is_fatal() {
        let upstream = Arc::new(
            FakeUpstream::default().respond("Cough", Err(UpstreamError::HttpStatus(503))),
        );
        let service = service(&upstream, &Config::default());

        let err = service
            .search(&SearchPayload::phrase("Cough"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UpstreamUnavailable(UpstreamError::HttpStatus(503))));
        assert!(service.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_phrase_search_malformed_xml() {
        let upstream = Arc::new(FakeUpstream::default().respond("Cough", Ok("<broken>".to_string())));
        let service = service(&upstream, &Config::default());

        let err = service
            .aggregate(&SearchRequest::Phrase("Cough".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::MalformedUpstreamResponse(_)));
    }

    #[tokio::test]
    async fn test_term_search_isolates_failures() {
        let upstream = Arc::new(
            FakeUpstream::default()
                .respond("\"Fever\"", Ok(xml(&["Fever", "Fever in Children"])))
                .respond(
                    "\"Cough\"",
                    Err(UpstreamError::Timeout(Duration::from_secs(10))),
                )
                .respond("\"Rash\"", Ok("not xml".to_string()))
                .respond("\"Headache\"", Ok(xml(&["Headache"]))),
        );
        let service = service(&upstream, &Config::default());

        let request = SearchRequest::TermList(
            ["Fever", "Cough", "  ", "Rash", "Headache"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        let response = service.aggregate(&request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.search_type, SearchMode::TermList);

        let titles: Vec<&str> = response.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Fever", "Fever in Children", "", "", "Headache"]);
        assert_eq!(
            response.results[2].summary,
            "Error: request timed out after 10s"
        );
        assert!(response.results[3].is_failure());
        assert!(response.results[3].summary.starts_with("Error: malformed XML"));

        assert_eq!(
            upstream.calls(),
            vec!["\"Fever\"", "\"Cough\"", "\"Rash\"", "\"Headache\""]
        );
    }

    #[tokio::test]
    async fn test_blank_terms_are_skipped() {
        let upstream = Arc::new(FakeUpstream::default().respond("\"Fever\"", Ok(xml(&["Fever"]))));
        let service = service(&upstream, &Config::default());

        let response = service
            .search(&SearchPayload::terms(["Fever", "  ", ""]))
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(upstream.calls(), vec!["\"Fever\"".to_string()]);
    }

    #[tokio::test]
    async fn test_all_blank_terms_yield_empty_success() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(&upstream, &Config::default());

        let response = service
            .search(&SearchPayload::terms([" ", ""]))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.results.is_empty());
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_terms_keep_term_order() {
        let upstream = Arc::new(
            FakeUpstream::default()
                .respond("\"Slow\"", Ok(xml(&["Slow"])))
                .respond("\"Fast\"", Ok(xml(&["Fast"])))
                .delay("\"Slow\"", Duration::from_secs(5)),
        );
        let mut config = Config::default();
        config.upstream.max_concurrent_terms = 4;
        let service = service(&upstream, &config);

        let response = service
            .aggregate(&SearchRequest::TermList(vec![
                "Slow".to_string(),
                "Fast".to_string(),
            ]))
            .await
            .unwrap();

        let titles: Vec<&str> = response.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Slow", "Fast"]);
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let upstream = Arc::new(FakeUpstream::default().respond("Cough", Ok(xml(&["Cough"]))));
        let service = service(&upstream, &Config::default());

        let first = service.search(&SearchPayload::phrase("Cough")).await.unwrap();
        let second = service.search(&SearchPayload::phrase("Cough")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(upstream.calls().len(), 1);

        service.cache().clear().await;
        service.search(&SearchPayload::phrase("Cough")).await.unwrap();
        assert_eq!(upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_untrimmed_request_uses_separate_cache_entry() {
        let upstream = Arc::new(FakeUpstream::default().respond("Cough", Ok(xml(&["Cough"]))));
        let service = service(&upstream, &Config::default());

        service.search(&SearchPayload::phrase("Cough")).await.unwrap();
        service.search(&SearchPayload::phrase("Cough ")).await.unwrap();

        assert_eq!(upstream.calls(), vec!["Cough".to_string(), "Cough".to_string()]);
        assert_eq!(service.cache().len().await, 2);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let upstream = Arc::new(FakeUpstream::default().respond("Cough", Ok(xml(&["Cough"]))));
        let mut config = Config::default();
        config.cache.enabled = false;
        let service = service(&upstream, &config);

        service.search(&SearchPayload::phrase("Cough")).await.unwrap();
        service.search(&SearchPayload::phrase("Cough")).await.unwrap();

        assert_eq!(upstream.calls().len(), 2);
        assert!(service.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_response_in_flight_during_clear_is_not_cached() {
        let cache = Arc::new(ResultCache::new());
        let upstream: Arc<dyn UpstreamClient> = Arc::new(ClearingUpstream {
            cache: Arc::clone(&cache),
        });
        let service = SearchService::new(upstream, Arc::clone(&cache), &Config::default());

        let response = service.search(&SearchPayload::phrase("Cough")).await.unwrap();

        assert_eq!(response.results[0].title, "Cough");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_search_runs_on_spawned_task() {
        let upstream = Arc::new(
            FakeUpstream::default()
                .respond("\"Fever\"", Ok(xml(&["Fever"])))
                .respond("\"Cough\"", Ok(xml(&["Cough"]))),
        );
        let service = Arc::new(service(&upstream, &Config::default()));

        let handle = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .search(&SearchPayload::terms(["Fever", "Cough"]))
                    .await
            }
        });

        let response = handle.await.unwrap().unwrap();
        let titles: Vec<&str> = response.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Fever", "Cough"]);
    }
}
