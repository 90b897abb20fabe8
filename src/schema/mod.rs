//! Typed index settings and collection mappings.
//!
//! Every body sent to the search backend is built from these structs and
//! validated before it leaves the process, so a typo in an analyzer name
//! fails here instead of at the backend.

mod analysis;
mod mapping;

use std::collections::BTreeMap;

use serde::Serialize;

pub use analysis::{Analysis, Analyzer, TokenFilter};
pub use mapping::{AllField, CollectionMapping, FieldMapping, StringIndex};

use crate::error::Result;

/// Collection holding one record per upstream repository.
pub const REPOSITORY_COLLECTION: &str = "repository";
/// Mapping applied to every collection that has no explicit mapping of its own.
pub const DEFAULT_MAPPING: &str = "_default_";
pub const NGRAM_FILTER: &str = "ngram_filter";
pub const NGRAM_ANALYZER: &str = "ngram_analyzer";
pub const SUGGEST_FIELD: &str = "suggest";
pub const COMMIT_MESSAGE_FIELD: &str = "message";

const NGRAM_SIZE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSettings {
    pub analysis: Analysis,
}

/// Settings and mappings used to create a tenant index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDefinition {
    pub settings: IndexSettings,
    pub mappings: BTreeMap<String, CollectionMapping>,
}

impl IndexDefinition {
    pub fn new(analysis: Analysis, mappings: BTreeMap<String, CollectionMapping>) -> Result<Self> {
        analysis.validate()?;
        for mapping in mappings.values() {
            mapping.validate(&analysis)?;
        }
        Ok(Self {
            settings: IndexSettings { analysis },
            mappings,
        })
    }

    /// The tenant index: a 3-gram analyzer for substring search over commit
    /// messages, applied to every commit collection through the default mapping.
    pub fn tenant() -> Result<Self> {
        let analysis = Analysis::default()
            .with_filter(NGRAM_FILTER, TokenFilter::ngram(NGRAM_SIZE, NGRAM_SIZE)?)
            .with_analyzer(
                NGRAM_ANALYZER,
                Analyzer::Custom {
                    tokenizer: "standard".to_string(),
                    filter: vec!["lowercase".to_string(), NGRAM_FILTER.to_string()],
                },
            );

        let commits = CollectionMapping {
            all: Some(AllField {
                enabled: true,
                analyzer: NGRAM_ANALYZER.to_string(),
                search_analyzer: "standard".to_string(),
            }),
            ..CollectionMapping::default()
        }
        .with_field(
            COMMIT_MESSAGE_FIELD,
            FieldMapping::text(NGRAM_ANALYZER, "standard"),
        )
        .with_field("url", FieldMapping::keyword());

        let mut mappings = BTreeMap::new();
        mappings.insert(DEFAULT_MAPPING.to_string(), commits);
        Self::new(analysis, mappings)
    }

    #[must_use]
    pub fn analysis(&self) -> &Analysis {
        &self.settings.analysis
    }
}

/// Mapping of the repository collection. Must be in place before the first
/// repository record is written, otherwise `suggest` is mapped dynamically
/// as a plain object and the completion suggester cannot use it.
pub fn repository_mapping() -> Result<CollectionMapping> {
    let mapping = CollectionMapping::default()
        .with_field("id", FieldMapping::Long)
        .with_field("name", FieldMapping::keyword())
        .with_field("active", FieldMapping::Boolean)
        .with_field("state", FieldMapping::keyword())
        .with_field("collection", FieldMapping::keyword())
        .with_field(SUGGEST_FIELD, FieldMapping::completion("simple"));
    mapping.validate(&Analysis::default())?;
    Ok(mapping)
}
