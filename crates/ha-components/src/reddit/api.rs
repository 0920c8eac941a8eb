//! Reddit API client
//!
//! Script-type OAuth app: a password grant yields a bearer token that is
//! used against `oauth.reddit.com`. Tokens are refreshed shortly before they
//! expire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ha_core::consts::{CONF_CLIENT_ID, CONF_CLIENT_SECRET, CONF_PASSWORD, CONF_USERNAME};
use reqwest::{redirect, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use super::consts::{DEFAULT_SORT_BY, LIST_TYPES};

/// Whether `sort_by` names a listing Reddit serves
pub fn is_list_type(sort_by: &str) -> bool {
    LIST_TYPES.iter().any(|t| *t == sort_by)
}

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh this long before the token actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RedditError {
    /// Non-success HTTP status from Reddit
    #[error("received {status} HTTP response")]
    Response { status: u16, body: String },

    /// Reddit redirected a subreddit lookup to its search page
    #[error("Redirect to {0}")]
    Redirect(String),

    #[error("No subreddits given")]
    NoSubreddits,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API endpoint {0}")]
    Endpoint(String),

    #[error("Client is closed")]
    Closed,
}

impl RedditError {
    /// HTTP status of a response error
    pub fn status(&self) -> Option<u16> {
        match self {
            RedditError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Script app credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl RedditCredentials {
    /// Read credentials from flow input or entry data
    pub fn from_data(data: &ha_config_entries::ConfigData) -> Option<Self> {
        let get = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            client_id: get(CONF_CLIENT_ID)?,
            client_secret: get(CONF_CLIENT_SECRET)?,
            username: get(CONF_USERNAME)?,
            password: get(CONF_PASSWORD)?,
        })
    }

    pub fn user_agent(&self) -> String {
        format!("{}_home_assistant_sensor", self.username)
    }
}

/// One submission as exposed in sensor attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub url: String,
    pub title: String,
    pub score: i64,
    pub comms_num: u64,
    /// Unix timestamp
    pub created: f64,
    pub body: String,
}

#[async_trait]
pub trait RedditApi: Send + Sync {
    /// Name of the authenticated user; proves the credentials work
    async fn me(&self) -> Result<String, RedditError>;

    /// Check that every subreddit exists, probing them as one `a+b` multi
    async fn validate_subreddits(&self, names: &[String]) -> Result<(), RedditError>;

    /// Up to `limit` posts of a subreddit in `sort_by` order
    async fn listing(
        &self,
        subreddit: &str,
        sort_by: &str,
        limit: u64,
    ) -> Result<Vec<RedditPost>, RedditError>;

    async fn close(&self);
}

/// Builds clients for flows and entry setup
pub trait RedditClientFactory: Send + Sync {
    fn create(&self, credentials: &RedditCredentials) -> Result<Arc<dyn RedditApi>, RedditError>;
}

/// Factory for the real HTTP client
#[derive(Debug, Default)]
pub struct HttpRedditClientFactory;

impl RedditClientFactory for HttpRedditClientFactory {
    fn create(&self, credentials: &RedditCredentials) -> Result<Arc<dyn RedditApi>, RedditError> {
        Ok(Arc::new(RedditClient::new(credentials.clone())?))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    id: String,
    #[serde(default)]
    url: String,
    title: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    created: f64,
    #[serde(default)]
    selftext: String,
}

impl From<Submission> for RedditPost {
    fn from(s: Submission) -> Self {
        Self {
            id: s.id,
            url: s.url,
            title: s.title,
            score: s.score,
            comms_num: s.num_comments,
            created: s.created,
            body: s.selftext,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Me {
    name: String,
}

pub struct RedditClient {
    http: Client,
    credentials: RedditCredentials,
    token: Mutex<Option<AccessToken>>,
    closed: AtomicBool,
    token_url: String,
    api_base: Url,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, RedditError> {
        Self::with_endpoints(credentials, TOKEN_URL, API_BASE)
    }

    /// Client talking to other endpoints, e.g. a local mock server
    pub fn with_endpoints(
        credentials: RedditCredentials,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, RedditError> {
        let api_base = api_base.into();
        let api_base = Url::parse(&api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(RedditError::Endpoint(api_base))?;

        let http = Client::builder()
            .user_agent(credentials.user_agent())
            .timeout(REQUEST_TIMEOUT)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
            closed: AtomicBool::new(false),
            token_url: token_url.into(),
            api_base,
        })
    }

    async fn access_token(&self) -> Result<String, RedditError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if Instant::now() < current.expires_at {
                return Ok(current.value.clone());
            }
        }

        debug!("Requesting Reddit access token for {}", self.credentials.username);
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let grant: TokenResponse = check_status(response).await?.json().await?;

        // reddit reports a bad password as 200 with an error field
        let value = match (grant.access_token, grant.error) {
            (Some(value), None) => value,
            (_, Some(error)) => return Err(RedditError::OAuth(error)),
            (None, None) => return Err(RedditError::OAuth("missing access_token".to_string())),
        };
        let lifetime = Duration::from_secs(grant.expires_in.unwrap_or(3600));

        *token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(value)
    }

    /// API URL for `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Response, RedditError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RedditError::Closed);
        }
        let token = self.access_token().await?;
        let url = self.endpoint(segments);
        trace!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        if response.status().is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|l| l.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(RedditError::Redirect(location));
        }
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, RedditError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RedditError::Response {
        status: status.as_u16(),
        body,
    })
}

/// Query for a listing; top and controversial default to all time
fn listing_query(sort_by: &str, limit: u64) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string()), ("raw_json", "1".to_string())];
    if matches!(sort_by, "top" | "controversial") {
        query.push(("t", "all".to_string()));
    }
    query
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn me(&self) -> Result<String, RedditError> {
        let me: Me = self.get(&["api", "v1", "me"], &[]).await?.json().await?;
        debug!("Authenticated to Reddit as {}", me.name);
        Ok(me.name)
    }

    async fn validate_subreddits(&self, names: &[String]) -> Result<(), RedditError> {
        let joined = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join("+");
        if joined.is_empty() {
            return Err(RedditError::NoSubreddits);
        }

        self.get(&["r", &joined, "about"], &[]).await?;
        Ok(())
    }

    async fn listing(
        &self,
        subreddit: &str,
        sort_by: &str,
        limit: u64,
    ) -> Result<Vec<RedditPost>, RedditError> {
        let sort_by = if is_list_type(sort_by) {
            sort_by
        } else {
            DEFAULT_SORT_BY
        };
        let listing: Listing = self
            .get(&["r", subreddit, sort_by], &listing_query(sort_by, limit))
            .await?
            .json()
            .await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        *self.token.lock().await = None;
        debug!("Closed Reddit client for {}", self.credentials.username);
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("username", &self.credentials.username)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "alice".to_string(),
            password: "pw".to_string(),
        }
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(credentials().user_agent(), "alice_home_assistant_sensor");
    }

    #[test]
    fn test_credentials_from_data() {
        let data = serde_json::from_value(json!({
            "client_id": "id",
            "client_secret": "secret",
            "username": "alice",
            "password": "pw",
            "name": "Reddit",
        }))
        .unwrap();
        assert_eq!(RedditCredentials::from_data(&data), Some(credentials()));

        let partial = serde_json::from_value(json!({"client_id": "id"})).unwrap();
        assert_eq!(RedditCredentials::from_data(&partial), None);
    }

    #[test]
    fn test_listing_query() {
        let hot = listing_query("hot", 5);
        assert!(hot.contains(&("limit", "5".to_string())));
        assert!(!hot.iter().any(|(k, _)| *k == "t"));

        let top = listing_query("top", 5);
        assert!(top.contains(&("t", "all".to_string())));
    }

    #[test]
    fn test_submission_to_post() {
        let listing: Listing = serde_json::from_value(json!({
            "kind": "Listing",
            "data": {"children": [{"kind": "t3", "data": {
                "id": "abc",
                "url": "https://example.com",
                "title": "Hello",
                "score": 42,
                "num_comments": 7,
                "created": 1700000000.0,
                "selftext": "body text",
                "author": "bob"
            }}]}
        }))
        .unwrap();

        let post: RedditPost = listing.data.children.into_iter().next().unwrap().data.into();
        assert_eq!(post.id, "abc");
        assert_eq!(post.comms_num, 7);
        assert_eq!(post.body, "body text");
        assert_eq!(post.created, 1700000000.0);
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = RedditClient::new(credentials()).unwrap();
        assert_eq!(
            client.endpoint(&["r", "rust+news", "about"]).as_str(),
            "https://oauth.reddit.com/r/rust+news/about"
        );
        assert_eq!(
            client.endpoint(&["r", "a/b?c d", "hot"]).as_str(),
            "https://oauth.reddit.com/r/a%2Fb%3Fc%20d/hot"
        );

        let nested =
            RedditClient::with_endpoints(credentials(), TOKEN_URL, "http://127.0.0.1:8080/api/")
                .unwrap();
        assert_eq!(
            nested.endpoint(&["api", "v1", "me"]).as_str(),
            "http://127.0.0.1:8080/api/api/v1/me"
        );
    }

    #[test]
    fn test_rejects_unusable_api_base() {
        let err = RedditClient::with_endpoints(credentials(), TOKEN_URL, "not a url").unwrap_err();
        assert!(matches!(err, RedditError::Endpoint(_)));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let client = RedditClient::new(credentials()).unwrap();
        client.close().await;
        assert!(matches!(client.me().await, Err(RedditError::Closed)));
    }

    #[tokio::test]
    async fn test_no_subreddits() {
        let client = RedditClient::new(credentials()).unwrap();
        let err = client
            .validate_subreddits(&["".to_string(), " ".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RedditError::NoSubreddits));
    }
}
