//! TruthSocial integration for pulling an account's posts.
//!
//! TruthSocial runs a Mastodon fork, so this speaks the Mastodon REST API:
//! - OAuth password grant for an access token (unless one is configured)
//! - Account lookup by handle
//! - Account statuses, paged backwards with `max_id`

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::base::{
    config::Config,
    types::{Post, PostQuery, Res},
};

use super::{GenericSourceClient, SourceClient};

/// Pause when fewer than this many requests remain in the rate limit window.
const RATE_LIMIT_THRESHOLD: i64 = 50;
/// Never sleep longer than this for a rate limit reset.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);
/// Timeout for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Extra methods on `SourceClient` applied by the truthsocial implementation.

impl SourceClient {
    pub fn truthsocial(config: &Config) -> Res<Self> {
        let client = TruthSocialSourceClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    username: &'a str,
    password: &'a str,
    redirect_uri: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
}

// Specific implementations.

/// TruthSocial source client implementation.
pub struct TruthSocialSourceClient {
    client: Client,
    base_url: String,
    config: Config,
    token: Mutex<Option<String>>,
    account_ids: Mutex<HashMap<String, String>>,
}

impl TruthSocialSourceClient {
    /// Create a new TruthSocial client.
    ///
    /// No request is made until the first fetch.
    #[instrument(name = "TruthSocialSourceClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let client = Client::builder().user_agent(&config.truthsocial_user_agent).timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: config.truthsocial_base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            token: Mutex::new(config.truthsocial_token.clone().filter(|t| !t.is_empty())),
            account_ids: Mutex::new(HashMap::new()),
        })
    }

    fn can_login(&self) -> bool {
        !self.config.truthsocial_username.is_empty() && !self.config.truthsocial_password.is_empty()
    }

    /// Get the cached access token, logging in if there is none.
    async fn access_token(&self) -> Res<String> {
        let mut token = self.token.lock().await;

        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }

        let fresh = self.login().await?;
        *token = Some(fresh.clone());

        Ok(fresh)
    }

    /// Exchange the configured username and password for an access token.
    #[instrument(name = "TruthSocialSourceClient::login", skip_all)]
    async fn login(&self) -> Res<String> {
        if !self.can_login() {
            return Err(anyhow::anyhow!("No TruthSocial username and password configured to obtain an access token."));
        }

        info!("Logging in to TruthSocial as `{}` ...", self.config.truthsocial_username);

        let request = TokenRequest {
            client_id: &self.config.truthsocial_client_id,
            client_secret: &self.config.truthsocial_client_secret,
            grant_type: "password",
            username: &self.config.truthsocial_username,
            password: &self.config.truthsocial_password,
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob",
            scope: "read",
        };

        let response = self.client.post(format!("{}/oauth/token", self.base_url)).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("TruthSocial login failed ({status}): {text}"));
        }

        let TokenResponse { access_token } = response.json().await?;

        Ok(access_token)
    }

    /// Authenticated GET returning JSON.
    ///
    /// A rejected token is dropped and the request is retried once with a fresh login.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Res<T> {
        let mut relogged = false;

        loop {
            let token = self.access_token().await?;
            let response = self.client.get(url).query(query).bearer_auth(&token).send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && !relogged && self.can_login() {
                warn!("TruthSocial rejected the access token, logging in again.");

                *self.token.lock().await = None;
                relogged = true;
                continue;
            }

            if let Some(wait) = rate_limit_delay(response.headers(), Utc::now()) {
                warn!("TruthSocial rate limit nearly exhausted, sleeping {}s.", wait.as_secs());
                tokio::time::sleep(wait).await;
            }

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("TruthSocial request to `{url}` failed ({status}): {text}"));
            }

            return Ok(response.json().await?);
        }
    }

    /// Resolve a handle to its account id, caching the result.
    #[instrument(name = "TruthSocialSourceClient::lookup_account_id", skip(self))]
    async fn lookup_account_id(&self, handle: &str) -> Res<String> {
        if let Some(id) = self.account_ids.lock().await.get(handle) {
            return Ok(id.clone());
        }

        let url = format!("{}/api/v1/accounts/lookup", self.base_url);
        let account: Account = self.get_json(&url, &[("acct", handle)]).await?;

        info!("Account `@{handle}` has id `{}`.", account.id);

        self.account_ids.lock().await.insert(handle.to_string(), account.id.clone());

        Ok(account.id)
    }
}

#[async_trait]
impl GenericSourceClient for TruthSocialSourceClient {
    #[instrument(name = "TruthSocialSourceClient::get_posts", skip_all)]
    async fn get_posts(&self, query: &PostQuery) -> Res<Vec<Post>> {
        let handle = query.handle.trim_start_matches('@');
        let account_id = self.lookup_account_id(handle).await?;
        let url = format!("{}/api/v1/accounts/{account_id}/statuses", self.base_url);

        let mut posts = Vec::new();
        let mut max_id: Option<String> = None;

        for page in 0..self.config.truthsocial_max_pages {
            let mut batch: Vec<Post> = {
                let mut params = Vec::new();

                if !self.config.truthsocial_include_replies {
                    params.push(("exclude_replies", "true"));
                }

                if let Some(max_id) = &max_id {
                    params.push(("max_id", max_id.as_str()));
                }

                self.get_json(&url, &params).await?
            };

            debug!("Page {page} returned {} posts.", batch.len());

            if batch.is_empty() {
                break;
            }

            batch.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            max_id = batch.last().map(|post| post.id.to_string());

            for post in batch {
                if is_past_bounds(&post, query) {
                    return Ok(posts);
                }

                posts.push(post);
            }
        }

        Ok(posts)
    }
}

// Helpers.

/// Whether a post is at or beyond the query's lower bounds.
fn is_past_bounds(post: &Post, query: &PostQuery) -> bool {
    let too_old = query.created_after.is_some_and(|created_after| post.created_at <= created_after);
    let already_seen = query.since_id.as_ref().is_some_and(|since_id| post.id <= *since_id);

    too_old || already_seen
}

/// How long to wait before the next request, based on the rate limit headers.
fn rate_limit_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let remaining: i64 = headers.get("x-ratelimit-remaining")?.to_str().ok()?.trim().parse().ok()?;

    if remaining > RATE_LIMIT_THRESHOLD {
        return None;
    }

    let reset = DateTime::parse_from_rfc3339(headers.get("x-ratelimit-reset")?.to_str().ok()?.trim()).ok()?.with_timezone(&Utc);
    let wait = (reset - now).to_std().ok()?;

    Some(wait.min(MAX_RATE_LIMIT_WAIT))
}

// Tests.

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    use super::*;
    use crate::base::{config::ConfigInner, types::PostId};

    const ACCOUNT_ID: &str = "107780257626128497";

    fn create_test_config(base_url: &str, token: Option<&str>) -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                truthsocial_base_url: base_url.to_string(),
                truthsocial_username: "watcher".to_string(),
                truthsocial_password: "hunter2".to_string(),
                truthsocial_token: token.map(str::to_string),
                ..Default::default()
            }),
        }
    }

    fn status(id: &str, created_at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "created_at": created_at,
            "content": format!("<p>Post {id}</p>"),
            "url": format!("https://truthsocial.com/@realDonaldTrump/{id}"),
            "reblog": null
        })
    }

    fn query(since_id: Option<&str>, created_after: Option<&str>) -> PostQuery {
        PostQuery {
            handle: "realDonaldTrump".to_string(),
            since_id: since_id.map(PostId::new),
            created_after: created_after.map(|c| c.parse().unwrap()),
        }
    }

    async fn mount_lookup(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/lookup"))
            .and(query_param("acct", "realDonaldTrump"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": ACCOUNT_ID, "username": "realDonaldTrump" })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_logs_in_and_pages_until_since_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(serde_json::json!({
                "grant_type": "password",
                "username": "watcher",
                "password": "hunter2",
                "scope": "read"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "abc", "token_type": "Bearer" })))
            .expect(1)
            .mount(&server)
            .await;

        mount_lookup(&server, "abc").await;

        let statuses = format!("/api/v1/accounts/{ACCOUNT_ID}/statuses");

        // The second page is selected by `max_id` and wins over the catch-all first page.
        Mock::given(method("GET"))
            .and(path(statuses.as_str()))
            .and(query_param("max_id", "103"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                status("101", "2025-04-09T10:00:00Z"),
                status("102", "2025-04-09T11:00:00Z"),
            ])))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(statuses.as_str()))
            .and(query_param("exclude_replies", "true"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                status("104", "2025-04-09T14:00:00Z"),
                status("105", "2025-04-09T15:00:00Z"),
                status("103", "2025-04-09T12:00:00Z"),
            ])))
            .mount(&server)
            .await;

        let client = SourceClient::truthsocial(&create_test_config(&server.uri(), None)).unwrap();

        let posts = client.get_posts(&query(Some("101"), None)).await.unwrap();
        let ids = posts.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["105", "104", "103", "102"]);

        // Token and account id are cached.
        let posts = client.get_posts(&query(Some("104"), None)).await.unwrap();
        let ids = posts.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["105"]);
    }

    #[tokio::test]
    async fn test_stops_at_created_after_with_static_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST")).and(path("/oauth/token")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

        mount_lookup(&server, "static").await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/accounts/{ACCOUNT_ID}/statuses").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                status("3", "2025-04-09T15:00:00Z"),
                status("2", "2025-04-09T12:00:00Z"),
                status("1", "2025-04-08T09:00:00Z"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = SourceClient::truthsocial(&create_test_config(&server.uri(), Some("static"))).unwrap();
        let posts = client.get_posts(&query(None, Some("2025-04-09T12:00:00Z"))).await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, PostId::new("3"));
    }

    #[tokio::test]
    async fn test_relogs_in_on_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "fresh" })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/lookup"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({ "error": "The access token is invalid" })))
            .expect(1)
            .mount(&server)
            .await;

        mount_lookup(&server, "fresh").await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/accounts/{ACCOUNT_ID}/statuses").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = SourceClient::truthsocial(&create_test_config(&server.uri(), Some("stale"))).unwrap();
        let posts = client.get_posts(&query(None, None)).await.unwrap();

        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_respects_max_pages() {
        let server = MockServer::start().await;

        mount_lookup(&server, "static").await;

        let statuses = format!("/api/v1/accounts/{ACCOUNT_ID}/statuses");

        Mock::given(method("GET"))
            .and(path(statuses.as_str()))
            .and(query_param("max_id", "8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                status("7", "2025-04-09T13:00:00Z"),
                status("6", "2025-04-09T12:00:00Z"),
            ])))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        // A third page would repeat the first; the walk must stop before asking for it.
        Mock::given(method("GET"))
            .and(path(statuses.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                status("9", "2025-04-09T15:00:00Z"),
                status("8", "2025-04-09T14:00:00Z"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = create_test_config(&server.uri(), Some("static"));
        Arc::make_mut(&mut config.inner).truthsocial_max_pages = 2;

        let client = SourceClient::truthsocial(&config).unwrap();
        let posts = client.get_posts(&query(None, None)).await.unwrap();
        let ids = posts.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();

        assert_eq!(ids, vec!["9", "8", "7", "6"]);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/lookup"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "Record not found" })))
            .mount(&server)
            .await;

        let client = SourceClient::truthsocial(&create_test_config(&server.uri(), Some("static"))).unwrap();
        let err = client.get_posts(&query(None, None)).await.unwrap_err();

        assert!(err.to_string().contains("Record not found"));
    }

    #[test]
    fn test_rate_limit_delay() {
        let now: DateTime<Utc> = "2025-04-09T12:00:00Z".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("120"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("2025-04-09T12:05:00.000Z"));
        assert_eq!(rate_limit_delay(&headers, now), None);

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("10"));
        assert_eq!(rate_limit_delay(&headers, now), Some(Duration::from_secs(300)));

        headers.insert("x-ratelimit-reset", HeaderValue::from_static("2025-04-09T14:00:00Z"));
        assert_eq!(rate_limit_delay(&headers, now), Some(MAX_RATE_LIMIT_WAIT));

        headers.insert("x-ratelimit-reset", HeaderValue::from_static("2025-04-09T11:00:00Z"));
        assert_eq!(rate_limit_delay(&headers, now), None);

        assert_eq!(rate_limit_delay(&HeaderMap::new(), now), None);
    }
}
