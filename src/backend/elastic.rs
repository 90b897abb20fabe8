use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{BulkDocument, CompletionRequest, Query, SearchBackend, StoredDocument, SuggestOption};
use crate::error::{Error, Result, WriteFailure};
use crate::schema::{CollectionMapping, IndexDefinition};

const SERVICE: &str = "search backend";

/// HTTP client for an Elasticsearch-compatible backend using typed indexes
/// (`/{index}/{type}/{id}`), completion payloads and `?version=` concurrency.
///
/// Collections map to document types. Writes use `refresh=true` so a record
/// is visible to searches as soon as the call returns.
#[derive(Clone)]
pub struct ElasticBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version", default)]
    version: u64,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(rename = "_version")]
    version: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version", default)]
    version: u64,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct SuggestEntry {
    options: Vec<SuggestEntryOption>,
}

#[derive(Debug, Deserialize)]
struct SuggestEntryOption {
    text: String,
    #[serde(default)]
    score: f64,
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    items: Vec<Value>,
}

impl ElasticBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build search client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        request.send().map_err(|e| transport_error(operation, &e))
    }

    fn exists(&self, operation: &str, url: String) -> Result<bool> {
        let resp = self.send(operation, self.client.head(url))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::backend(operation, format!("unexpected status {status}"))),
        }
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout { service: SERVICE }
    } else {
        Error::backend(operation, err.to_string())
    }
}

/// Turns a non-success response into an error carrying the backend's reason.
fn check(operation: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(status_error(operation, status, &body))
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let reason = error_reason(body).unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::CONFLICT => Error::Conflict(reason),
        StatusCode::BAD_REQUEST if reason.contains("already_exists") => {
            Error::AlreadyExists(reason)
        }
        _ => Error::backend(operation, format!("{status}: {reason}")),
    }
}

/// `_create` reports an id that is already taken as a version conflict.
fn created<T>(result: Result<T>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(Error::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Reads a 404 on a document path. A missing document still answers with
/// `found: false`; a missing index does not.
fn missing_document(operation: &str, index: &str, body: &Value) -> Result<()> {
    if body.get("found").is_some() {
        return Ok(());
    }
    Err(Error::backend(operation, format!("no such index [{index}]")))
}

fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(s) = error.as_str() {
        return Some(s.to_string());
    }
    let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
    let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
    Some(format!("{kind}: {reason}"))
}

fn decode<T: for<'de> Deserialize<'de>>(operation: &str, resp: Response) -> Result<T> {
    resp.json()
        .map_err(|e| Error::backend(operation, format!("malformed response: {e}")))
}

fn parse_suggest(name: &str, body: &Value) -> Result<Vec<SuggestOption>> {
    let entries = body
        .get(name)
        .ok_or_else(|| Error::backend("suggest", format!("response has no [{name}] entry")))?;
    let entries: Vec<SuggestEntry> = serde_json::from_value(entries.clone())
        .map_err(|e| Error::backend("suggest", format!("malformed response: {e}")))?;
    Ok(entries
        .into_iter()
        .flat_map(|entry| entry.options)
        .map(|o| SuggestOption {
            text: o.text,
            score: o.score,
            payload: o.payload,
        })
        .collect())
}

fn parse_bulk(response: BulkResponse) -> Vec<WriteFailure> {
    if !response.errors {
        return Vec::new();
    }
    response
        .items
        .iter()
        .filter_map(|item| item.get("index"))
        .filter(|item| item.get("error").is_some())
        .map(|item| WriteFailure {
            id: item
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reason: item
                .get("error")
                .map(|e| match e.get("reason").and_then(Value::as_str) {
                    Some(reason) => reason.to_string(),
                    None => e.to_string(),
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn bulk_body(index: &str, collection: &str, documents: &[BulkDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_type": collection, "_id": doc.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.source)?);
        body.push('\n');
    }
    Ok(body)
}

impl SearchBackend for ElasticBackend {
    fn index_exists(&self, index: &str) -> Result<bool> {
        self.exists("index exists", self.url(&[index]))
    }

    fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let resp = self.send(
            "create index",
            self.client.put(self.url(&[index])).json(definition),
        )?;
        check("create index", resp)?;
        tracing::info!("Created index {}", index);
        Ok(())
    }

    fn collection_exists(&self, index: &str, collection: &str) -> Result<bool> {
        self.exists("collection exists", self.url(&[index, collection]))
    }

    fn put_collection_mapping(
        &self,
        index: &str,
        collection: &str,
        mapping: &CollectionMapping,
    ) -> Result<()> {
        let resp = self.send(
            "put mapping",
            self.client
                .put(self.url(&[index, "_mapping", collection]))
                .json(mapping),
        )?;
        check("put mapping", resp)?;
        Ok(())
    }

    fn get_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>> {
        let resp = self.send("get", self.client.get(self.url(&[index, collection, id])))?;
        if resp.status() == StatusCode::NOT_FOUND {
            let body: Value = resp.json().unwrap_or(Value::Null);
            missing_document("get", index, &body)?;
            return Ok(None);
        }
        let doc: GetResponse = decode("get", check("get", resp)?)?;
        if !doc.found {
            return Ok(None);
        }
        Ok(Some(StoredDocument {
            id: doc.id,
            version: doc.version,
            source: doc.source.unwrap_or(Value::Null),
        }))
    }

    fn create_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
    ) -> Result<bool> {
        let resp = self.send(
            "create",
            self.client
                .put(self.url(&[index, collection, id, "_create"]))
                .query(&[("refresh", "true")])
                .json(source),
        )?;
        created(check("create", resp))
    }

    fn replace_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
        version: u64,
    ) -> Result<u64> {
        let resp = self.send(
            "replace",
            self.client
                .put(self.url(&[index, collection, id]))
                .query(&[("version", version.to_string()), ("refresh", "true".into())])
                .json(source),
        )?;
        let written: WriteResponse = decode("replace", check("replace", resp)?)?;
        Ok(written.version)
    }

    fn update_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        partial: &Value,
    ) -> Result<()> {
        let resp = self.send(
            "update",
            self.client
                .post(self.url(&[index, collection, id, "_update"]))
                .query(&[("refresh", "true")])
                .json(&json!({ "doc": partial })),
        )?;
        check("update", resp)?;
        Ok(())
    }

    fn delete_document(&self, index: &str, collection: &str, id: &str) -> Result<bool> {
        let resp = self.send(
            "delete",
            self.client
                .delete(self.url(&[index, collection, id]))
                .query(&[("refresh", "true")]),
        )?;
        if resp.status() == StatusCode::NOT_FOUND {
            let body: Value = resp.json().unwrap_or(Value::Null);
            missing_document("delete", index, &body)?;
            return Ok(false);
        }
        check("delete", resp)?;
        Ok(true)
    }

    fn bulk_index(
        &self,
        index: &str,
        collection: &str,
        documents: &[BulkDocument],
    ) -> Result<Vec<WriteFailure>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self.send(
            "bulk",
            self.client
                .post(self.url(&["_bulk"]))
                .query(&[("refresh", "true")])
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(bulk_body(index, collection, documents)?),
        )?;
        let response: BulkResponse = decode("bulk", check("bulk", resp)?)?;
        Ok(parse_bulk(response))
    }

    fn search(
        &self,
        index: &str,
        collection: &str,
        query: &Query,
        size: Option<usize>,
    ) -> Result<Vec<StoredDocument>> {
        let mut body = json!({ "query": query.to_json(), "version": true });
        if let Some(size) = size {
            body["size"] = json!(size);
        }
        let resp = self.send(
            "search",
            self.client
                .post(self.url(&[index, collection, "_search"]))
                .json(&body),
        )?;
        let response: SearchResponse = decode("search", check("search", resp)?)?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|hit| StoredDocument {
                id: hit.id,
                version: hit.version,
                source: hit.source,
            })
            .collect())
    }

    fn suggest(&self, index: &str, request: &CompletionRequest) -> Result<Vec<SuggestOption>> {
        let resp = self.send(
            "suggest",
            self.client
                .post(self.url(&[index, "_suggest"]))
                .json(&request.to_json()),
        )?;
        let body: Value = decode("suggest", check("suggest", resp)?)?;
        parse_suggest(&request.name, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let backend =
            ElasticBackend::new("http://localhost:9200/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.url(&["tenant-1", "my repo", "_search"]),
            "http://localhost:9200/tenant-1/my%20repo/_search"
        );
    }

    #[test]
    fn test_parse_suggest_options_with_payload() {
        let body = json!({
            "_shards": { "total": 1, "successful": 1, "failed": 0 },
            "repository-suggest": [{
                "text": "rep",
                "offset": 0,
                "length": 3,
                "options": [
                    { "text": "repo-a", "score": 1.0, "payload": { "id": 1 } },
                    { "text": "repo-b", "score": 1.0, "payload": { "id": 2 } }
                ]
            }]
        });
        let options = parse_suggest("repository-suggest", &body).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].text, "repo-a");
        assert_eq!(options[1].payload, Some(json!({ "id": 2 })));
    }

    #[test]
    fn test_parse_suggest_missing_entry_is_error() {
        assert!(parse_suggest("repository-suggest", &json!({})).is_err());
    }

    #[test]
    fn test_parse_bulk_reports_each_failed_item() {
        let response: BulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_id": "a1", "status": 201 } },
                { "index": { "_id": "b2", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse [message]" } } }
            ]
        }))
        .unwrap();
        let failures = parse_bulk(response);
        assert_eq!(
            failures,
            vec![WriteFailure {
                id: "b2".into(),
                reason: "failed to parse [message]".into()
            }]
        );
    }

    #[test]
    fn test_bulk_body_is_ndjson() {
        let body = bulk_body(
            "tenant-1",
            "repo-a",
            &[BulkDocument {
                id: "abc".into(),
                source: json!({ "message": "init" }),
            }],
        )
        .unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_type"], "repo-a");
        assert_eq!(action["index"]["_id"], "abc");
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_status_mapping() {
        let conflict = r#"{"error":{"type":"version_conflict_engine_exception","reason":"[repository][1]: version conflict, current [3], provided [2]"},"status":409}"#;
        assert!(matches!(
            status_error("replace", StatusCode::CONFLICT, conflict),
            Error::Conflict(reason) if reason.contains("version conflict")
        ));

        let exists = r#"{"error":{"type":"index_already_exists_exception","reason":"already exists"},"status":400}"#;
        assert!(matches!(
            status_error("create index", StatusCode::BAD_REQUEST, exists),
            Error::AlreadyExists(_)
        ));

        let rejected = r#"{"error":{"type":"mapper_parsing_exception","reason":"bad"},"status":400}"#;
        assert!(matches!(
            status_error("put mapping", StatusCode::BAD_REQUEST, rejected),
            Error::Backend { ref operation, .. } if operation == "put mapping"
        ));

        assert!(matches!(
            status_error("search", StatusCode::SERVICE_UNAVAILABLE, "gateway down"),
            Error::Backend { ref message, .. } if message.contains("gateway down")
        ));
    }

    #[test]
    fn test_create_conflict_means_already_present() {
        let conflict = status_error("create", StatusCode::CONFLICT, "{}");
        assert!(!created::<()>(Err(conflict)).unwrap());
        assert!(created(Ok(())).unwrap());
        assert!(created::<()>(Err(Error::backend("create", "boom"))).is_err());
    }

    #[test]
    fn test_not_found_document_vs_missing_index() {
        let missing_doc = json!({
            "_index": "tenant-1", "_type": "repository", "_id": "9", "found": false
        });
        assert!(missing_document("get", "tenant-1", &missing_doc).is_ok());

        let missing_index = json!({
            "error": { "type": "index_not_found_exception", "reason": "no such index" },
            "status": 404
        });
        assert!(missing_document("get", "tenant-1", &missing_index).is_err());
        assert!(missing_document("get", "tenant-1", &Value::Null).is_err());
    }

    #[test]
    fn test_error_reason_extraction() {
        let body = r#"{"error":{"type":"index_already_exists_exception","reason":"already exists"},"status":400}"#;
        assert_eq!(
            error_reason(body).unwrap(),
            "index_already_exists_exception: already exists"
        );
        assert_eq!(error_reason("not json"), None);
    }
}
