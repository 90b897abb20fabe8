use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{UpstreamClient, UpstreamError};
use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::types::{UpstreamCommit, UpstreamRepository};

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 50;

/// GitHub REST client.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    html_url: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
}

impl From<CommitResponse> for UpstreamCommit {
    fn from(c: CommitResponse) -> Self {
        Self {
            sha: c.sha,
            message: c.commit.message,
            url: c.html_url,
        }
    }
}

impl GithubClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?,
        );
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build provider client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        page: Option<usize>,
    ) -> std::result::Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).bearer_auth(token);
        if let Some(page) = page {
            request = request.query(&[("per_page", PER_PAGE), ("page", page)]);
        }
        let resp = request.send().map_err(transport_error)?;
        handle_response(resp)
    }

    /// Follows page numbers until a short page or the page cap.
    fn get_all<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
    ) -> std::result::Result<Vec<T>, UpstreamError> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<T> = self.get(token, path, Some(page))?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                return Ok(items);
            }
        }
        tracing::warn!("Stopped paging {} after {} pages", path, MAX_PAGES);
        Ok(items)
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Network(err.to_string())
    }
}

fn handle_response<T: DeserializeOwned>(resp: Response) -> std::result::Result<T, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .map_err(|e| UpstreamError::Decode(e.to_string()));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized);
    }
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body: resp.text().unwrap_or_default(),
    })
}

impl UpstreamClient for GithubClient {
    fn fetch_username(&self, token: &str) -> std::result::Result<String, UpstreamError> {
        let user: UserResponse = self.get(token, "/user", None)?;
        Ok(user.login)
    }

    fn fetch_repositories(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<UpstreamRepository>, UpstreamError> {
        self.get_all(token, "/user/repos")
    }

    fn fetch_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> std::result::Result<Vec<UpstreamCommit>, UpstreamError> {
        let path = format!(
            "/repos/{}/{}/commits",
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );
        match self.get_all::<CommitResponse>(token, &path) {
            Ok(commits) => Ok(commits.into_iter().map(UpstreamCommit::from).collect()),
            // An empty repository has no history to list.
            Err(UpstreamError::Status { status: 409, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
