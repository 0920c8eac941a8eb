//! Constants for the Reddit integration

pub const DOMAIN: &str = "reddit";

pub const CONF_SORT_BY: &str = "sort_by";
pub const CONF_SUBREDDITS: &str = "subreddits";

pub const ATTR_BODY: &str = "body";
pub const ATTR_COMMENTS_NUMBER: &str = "comms_num";
pub const ATTR_CREATED: &str = "created";
pub const ATTR_ID: &str = "id";
pub const ATTR_POSTS: &str = "posts";
pub const ATTR_SUBREDDIT: &str = "subreddit";
pub const ATTR_SCORE: &str = "score";
pub const ATTR_TITLE: &str = "title";
pub const ATTR_URL: &str = "url";

pub const DEFAULT_NAME: &str = "Reddit";
pub const DEFAULT_SORT_BY: &str = "hot";
pub const DEFAULT_MAXIMUM: u64 = 10;

pub const LIST_TYPES: [&str; 4] = ["top", "controversial", "hot", "new"];

pub const ICON: &str = "mdi:reddit";

// config flow error codes
pub const ERROR_UNAUTHORIZED: &str = "unauthorized_response";
pub const ERROR_UNKNOWN_RESPONSE: &str = "unknown_response";
pub const ERROR_PRAW: &str = "praw_response";
pub const ERROR_INVALID_SUBREDDIT: &str = "invalid_subreddit";
pub const ERROR_NO_SUBREDDITS: &str = "no_subreddits";

pub const STEP_FEED: &str = "feed";
