//! Reddit HTTP client against a mock server

use ha_components::reddit::{RedditApi, RedditClient, RedditCredentials, RedditError};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> RedditCredentials {
    RedditCredentials {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        username: "alice".to_string(),
        password: "hunter2".to_string(),
    }
}

fn client(server: &MockServer) -> RedditClient {
    RedditClient::with_endpoints(
        credentials(),
        format!("{}/api/v1/access_token", server.uri()),
        server.uri(),
    )
    .unwrap()
}

/// Grant `tok` for the test credentials, at most `times` times
async fn mount_token(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .and(basic_auth("client-id", "client-secret"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600,
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_password_grant_and_me() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/me"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "alice"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.me().await.unwrap(), "alice");
    // the token is reused
    assert_eq!(client.me().await.unwrap(), "alice");
}

#[tokio::test]
async fn test_grant_error_in_ok_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let err = client(&server).me().await.unwrap_err();
    assert!(matches!(err, RedditError::OAuth(ref e) if e == "invalid_grant"));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_unauthorized_response() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = client(&server).me().await.unwrap_err();
    assert!(matches!(
        err,
        RedditError::Response { status: 401, ref body } if body == "Unauthorized"
    ));
}

#[tokio::test]
async fn test_unknown_subreddit_redirect_is_not_followed() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/nosuchsub/about"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/subreddits/search.json?q=nosuchsub"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subreddits/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .validate_subreddits(&["nosuchsub".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedditError::Redirect(ref location) if location == "/subreddits/search.json?q=nosuchsub"
    ));
}

#[tokio::test]
async fn test_subreddits_checked_as_one_multi() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/rust+news/about"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "t5"})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .validate_subreddits(&["rust".to_string(), " news ".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_listing_decodes_posts() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/rust/top"))
        .and(query_param("limit", "2"))
        .and(query_param("raw_json", "1"))
        .and(query_param("t", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "p1",
                        "url": "https://example.com/1",
                        "title": "First",
                        "score": 120,
                        "num_comments": 14,
                        "created": 1700000000.0,
                        "selftext": "",
                    }},
                    {"kind": "t3", "data": {
                        "id": "p2",
                        "url": "https://www.reddit.com/r/rust/p2",
                        "title": "Second",
                        "score": -3,
                        "num_comments": 0,
                        "created": 1700000100.0,
                        "selftext": "self post",
                    }},
                ],
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let posts = client(&server).listing("rust", "top", 2).await.unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "p1");
    assert_eq!(posts[0].comms_num, 14);
    assert_eq!(posts[1].score, -3);
    assert_eq!(posts[1].body, "self post");
}

#[tokio::test]
async fn test_listing_server_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).listing("rust", "hot", 10).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}
