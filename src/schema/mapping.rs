use std::collections::BTreeMap;

use serde::Serialize;

use super::analysis::Analysis;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringIndex {
    NotAnalyzed,
}

/// Mapping of a single document field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<StringIndex>,
        #[serde(skip_serializing_if = "Option::is_none")]
        analyzer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_analyzer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        include_in_all: Option<bool>,
    },
    Long,
    Boolean,
    Completion {
        analyzer: String,
        search_analyzer: String,
        payloads: bool,
    },
}

impl FieldMapping {
    /// An exact-match string, compared case-sensitively.
    #[must_use]
    pub fn keyword() -> Self {
        FieldMapping::String {
            index: Some(StringIndex::NotAnalyzed),
            analyzer: None,
            search_analyzer: None,
            include_in_all: None,
        }
    }

    /// Full-text string indexed with `analyzer` and queried with `search_analyzer`.
    #[must_use]
    pub fn text(analyzer: &str, search_analyzer: &str) -> Self {
        FieldMapping::String {
            index: None,
            analyzer: Some(analyzer.to_string()),
            search_analyzer: Some(search_analyzer.to_string()),
            include_in_all: Some(true),
        }
    }

    #[must_use]
    pub fn completion(analyzer: &str) -> Self {
        FieldMapping::Completion {
            analyzer: analyzer.to_string(),
            search_analyzer: analyzer.to_string(),
            payloads: true,
        }
    }

    #[must_use]
    pub fn is_completion(&self) -> bool {
        matches!(self, FieldMapping::Completion { .. })
    }

    fn analyzers(&self) -> Vec<&str> {
        match self {
            FieldMapping::String {
                analyzer,
                search_analyzer,
                ..
            } => analyzer
                .iter()
                .chain(search_analyzer.iter())
                .map(String::as_str)
                .collect(),
            FieldMapping::Completion {
                analyzer,
                search_analyzer,
                ..
            } => vec![analyzer.as_str(), search_analyzer.as_str()],
            FieldMapping::Long | FieldMapping::Boolean => Vec::new(),
        }
    }
}

/// Catch-all full-text field that concatenates a document's `include_in_all` fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllField {
    pub enabled: bool,
    pub analyzer: String,
    pub search_analyzer: String,
}

/// Mapping of one document collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionMapping {
    #[serde(rename = "_all", skip_serializing_if = "Option::is_none")]
    pub all: Option<AllField>,
    pub properties: BTreeMap<String, FieldMapping>,
}

impl CollectionMapping {
    #[must_use]
    pub fn with_field(mut self, name: &str, field: FieldMapping) -> Self {
        self.properties.insert(name.to_string(), field);
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.properties.get(name)
    }

    /// Checks that every analyzer referenced by this mapping is builtin or declared in `analysis`.
    pub fn validate(&self, analysis: &Analysis) -> Result<()> {
        if let Some(all) = &self.all {
            for name in [&all.analyzer, &all.search_analyzer] {
                if !analysis.knows_analyzer(name) {
                    return Err(Error::Schema(format!("_all uses unknown analyzer {name}")));
                }
            }
        }
        for (field, mapping) in &self.properties {
            for name in mapping.analyzers() {
                if !analysis.knows_analyzer(name) {
                    return Err(Error::Schema(format!(
                        "field {field} uses unknown analyzer {name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_field_shape() {
        let json = serde_json::to_value(FieldMapping::completion("simple")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "completion",
                "analyzer": "simple",
                "search_analyzer": "simple",
                "payloads": true
            })
        );
    }

    #[test]
    fn test_keyword_field_shape() {
        let json = serde_json::to_value(FieldMapping::keyword()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "string", "index": "not_analyzed" })
        );
    }

    #[test]
    fn test_unknown_analyzer_rejected() {
        let mapping = CollectionMapping::default()
            .with_field("message", FieldMapping::text("trigram", "standard"));
        let err = mapping.validate(&Analysis::default()).unwrap_err();
        assert!(err.to_string().contains("trigram"));
    }
}
