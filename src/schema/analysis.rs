use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};

const BUILTIN_TOKENIZERS: &[&str] = &["standard", "whitespace", "keyword", "letter"];
const BUILTIN_FILTERS: &[&str] = &["lowercase", "uppercase", "asciifolding", "trim", "stop"];
const BUILTIN_ANALYZERS: &[&str] = &["standard", "simple", "whitespace", "keyword"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenFilter {
    Ngram { min_gram: u32, max_gram: u32 },
}

impl TokenFilter {
    pub fn ngram(min_gram: u32, max_gram: u32) -> Result<Self> {
        if min_gram == 0 {
            return Err(Error::Schema("ngram min_gram must be at least 1".into()));
        }
        if min_gram > max_gram {
            return Err(Error::Schema(format!(
                "ngram min_gram ({min_gram}) exceeds max_gram ({max_gram})"
            )));
        }
        Ok(TokenFilter::Ngram { min_gram, max_gram })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Analyzer {
    Custom {
        tokenizer: String,
        filter: Vec<String>,
    },
}

/// Named filters and analyzers declared in an index's settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, TokenFilter>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub analyzer: BTreeMap<String, Analyzer>,
}

impl Analysis {
    #[must_use]
    pub fn with_filter(mut self, name: &str, filter: TokenFilter) -> Self {
        self.filter.insert(name.to_string(), filter);
        self
    }

    #[must_use]
    pub fn with_analyzer(mut self, name: &str, analyzer: Analyzer) -> Self {
        self.analyzer.insert(name.to_string(), analyzer);
        self
    }

    /// Checks that every custom analyzer only references known tokenizers and filters.
    pub fn validate(&self) -> Result<()> {
        for (name, analyzer) in &self.analyzer {
            let Analyzer::Custom { tokenizer, filter } = analyzer;
            if !BUILTIN_TOKENIZERS.contains(&tokenizer.as_str()) {
                return Err(Error::Schema(format!(
                    "analyzer {name} uses unknown tokenizer {tokenizer}"
                )));
            }
            for f in filter {
                if !BUILTIN_FILTERS.contains(&f.as_str()) && !self.filter.contains_key(f) {
                    return Err(Error::Schema(format!(
                        "analyzer {name} uses undeclared filter {f}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// True if `name` is a builtin analyzer or declared here.
    #[must_use]
    pub fn knows_analyzer(&self, name: &str) -> bool {
        BUILTIN_ANALYZERS.contains(&name) || self.analyzer.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngram_bounds() {
        assert!(TokenFilter::ngram(3, 3).is_ok());
        assert!(matches!(TokenFilter::ngram(0, 3), Err(Error::Schema(_))));
        assert!(matches!(TokenFilter::ngram(4, 3), Err(Error::Schema(_))));
    }

    #[test]
    fn test_undeclared_filter_rejected() {
        let analysis = Analysis::default().with_analyzer(
            "broken",
            Analyzer::Custom {
                tokenizer: "standard".into(),
                filter: vec!["lowercase".into(), "missing_filter".into()],
            },
        );
        let err = analysis.validate().unwrap_err();
        assert!(err.to_string().contains("missing_filter"));
    }

    #[test]
    fn test_unknown_tokenizer_rejected() {
        let analysis = Analysis::default().with_analyzer(
            "broken",
            Analyzer::Custom {
                tokenizer: "made_up".into(),
                filter: vec![],
            },
        );
        assert!(matches!(analysis.validate(), Err(Error::Schema(_))));
    }
}
