use serde::Deserialize;

/// `?q=` on the suggestion and commit search endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub q: String,
}
