//! Reddit post sensors, one per subreddit

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::api::{is_list_type, RedditApi, RedditCredentials, RedditPost};
use super::consts::{
    ATTR_BODY, ATTR_COMMENTS_NUMBER, ATTR_CREATED, ATTR_ID, ATTR_POSTS, ATTR_SCORE,
    ATTR_SUBREDDIT, ATTR_TITLE, ATTR_URL, CONF_SORT_BY, DEFAULT_MAXIMUM, DEFAULT_SORT_BY, ICON,
    LIST_TYPES,
};
use crate::entity::Entity;
use crate::sensor::SensorEntity;

pub struct RedditSensor {
    client: Arc<dyn RedditApi>,
    subreddit: String,
    limit: u64,
    sort_by: String,
    posts: Vec<RedditPost>,
}

impl RedditSensor {
    pub fn new(
        client: Arc<dyn RedditApi>,
        subreddit: impl Into<String>,
        limit: u64,
        sort_by: impl Into<String>,
    ) -> Self {
        Self {
            client,
            subreddit: subreddit.into(),
            limit,
            sort_by: sort_by.into(),
            posts: Vec::new(),
        }
    }

    pub fn posts(&self) -> &[RedditPost] {
        &self.posts
    }
}

/// One entry of the `posts` attribute
fn post_attributes(post: &RedditPost) -> Value {
    json!({
        ATTR_ID: post.id,
        ATTR_URL: post.url,
        ATTR_TITLE: post.title,
        ATTR_SCORE: post.score,
        ATTR_COMMENTS_NUMBER: post.comms_num,
        ATTR_CREATED: post.created,
        ATTR_BODY: post.body,
    })
}

#[async_trait]
impl Entity for RedditSensor {
    fn name(&self) -> Option<String> {
        Some(format!("reddit_{}", self.subreddit))
    }

    fn icon(&self) -> Option<String> {
        Some(ICON.to_string())
    }

    fn state(&self) -> Option<String> {
        self.sensor_state()
    }

    fn attributes(&self) -> HashMap<String, Value> {
        HashMap::from([
            (ATTR_SUBREDDIT.to_string(), json!(self.subreddit)),
            (
                ATTR_POSTS.to_string(),
                Value::Array(self.posts.iter().map(post_attributes).collect()),
            ),
            (CONF_SORT_BY.to_string(), json!(self.sort_by)),
        ])
    }

    fn should_poll(&self) -> bool {
        true
    }

    async fn update(&mut self) {
        // an unknown sort order is never requested
        if !is_list_type(&self.sort_by) {
            return;
        }

        // a failed fetch keeps the previous posts
        match self
            .client
            .listing(&self.subreddit, &self.sort_by, self.limit)
            .await
        {
            Ok(posts) => {
                debug!("Fetched {} posts from r/{}", posts.len(), self.subreddit);
                self.posts = posts;
            }
            Err(err) => error!("Reddit error {}", err),
        }
    }
}

impl SensorEntity for RedditSensor {
    fn native_value(&self) -> Option<Value> {
        Some(json!(self.posts.len()))
    }
}

/// `- platform: reddit` block under `sensor:`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedditPlatformConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "one_or_many")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_maximum")]
    pub maximum: u64,
}

impl RedditPlatformConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !is_list_type(&self.sort_by) {
            return Err(format!(
                "sort_by must be one of {:?}, got {:?}",
                LIST_TYPES, self.sort_by
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> RedditCredentials {
        RedditCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

fn default_sort_by() -> String {
    DEFAULT_SORT_BY.to_string()
}

fn default_maximum() -> u64 {
    DEFAULT_MAXIMUM
}

/// A single string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}
