use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Which of the two query styles a request uses.
///
/// Serialized as the bare number (`1` or `2`) the frontend sends back and forth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    /// A single free-text phrase, sent upstream as-is.
    Phrase,
    /// A list of keywords, each searched as an exact phrase.
    TermList,
}

impl SearchMode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Phrase => 1,
            Self::TermList => 2,
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1" => Some(Self::Phrase),
            "2" => Some(Self::TermList),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl Serialize for SearchMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Request body of `POST /api/search`, kept as raw JSON values.
///
/// Both fields stay untyped so the cache key can be derived from exactly what
/// the caller sent, before any validation or trimming happens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPayload {
    #[serde(rename = "searchType", default)]
    pub search_type: Option<Value>,

    #[serde(default)]
    pub symptom: Option<Value>,
}

impl SearchPayload {
    #[must_use]
    pub fn phrase(text: impl Into<String>) -> Self {
        Self {
            search_type: Some(Value::String("1".to_string())),
            symptom: Some(Value::String(text.into())),
        }
    }

    #[must_use]
    pub fn terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            search_type: Some(Value::String("2".to_string())),
            symptom: Some(Value::Array(
                terms.into_iter().map(|t| Value::String(t.into())).collect(),
            )),
        }
    }

    /// The `searchType` as text; numbers and strings with the same digits agree.
    #[must_use]
    pub fn search_type_label(&self) -> String {
        match &self.search_type {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "null".to_string(),
        }
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequest {
    /// Trimmed, non-empty phrase.
    Phrase(String),
    /// Terms as supplied; blank entries are skipped during aggregation.
    TermList(Vec<String>),
}

impl SearchRequest {
    #[must_use]
    pub const fn mode(&self) -> SearchMode {
        match self {
            Self::Phrase(_) => SearchMode::Phrase,
            Self::TermList(_) => SearchMode::TermList,
        }
    }
}

/// One health topic extracted from an upstream document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub title: String,

    pub summary: String,

    pub url: String,
}

impl ResultRecord {
    /// Placeholder emitted in place of a term whose lookup failed.
    #[must_use]
    pub fn failure(detail: impl fmt::Display) -> Self {
        Self {
            title: String::new(),
            summary: format!("Error: {detail}"),
            url: String::new(),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.title.is_empty() && self.url.is_empty() && self.summary.starts_with("Error: ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResponse {
    pub success: bool,

    #[serde(rename = "searchType")]
    pub search_type: SearchMode,

    pub results: Vec<ResultRecord>,
}

impl SearchResponse {
    #[must_use]
    pub const fn new(search_type: SearchMode, results: Vec<ResultRecord>) -> Self {
        Self {
            success: true,
            search_type,
            results,
        }
    }
}
