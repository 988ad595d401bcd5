use gleaner_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{bearer_token, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_text_returns_body_and_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/abc"))
        .and(header("user-agent", "Gleaner-Test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let resp = client
        .get_text(
            "/search/abc",
            RequestOpts {
                user_agent: Some("Gleaner-Test/1.0"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(resp.body, "<p>hi</p>");
    assert_eq!(resp.final_url.path(), "/search/abc");
}

#[tokio::test]
async fn non_success_keeps_status_and_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_text("/blocked", RequestOpts::default())
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(429));
    match err {
        HttpError::Api { message, .. } => assert_eq!(message, "slow down"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let err = client
        .get_text("/slow", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err}");
}

#[tokio::test]
async fn post_json_with_bearer_and_absolute_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(bearer_token("pplx-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::absolute_only().unwrap();
    let url = format!("{}/chat/completions", server.uri());
    let got: Value = client
        .post_json_opts(
            &url,
            &json!({"model": "sonar-pro"}),
            RequestOpts {
                auth: Some(Auth::Bearer(" pplx-123 ")),
                allow_absolute: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(got["ok"], json!(true));
}

#[tokio::test]
async fn query_auth_is_appended() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/"))
        .and(query_param("api_key", "k"))
        .and(query_param("render_js", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let got: Vec<u32> = client
        .get_json(
            "/api/v1/",
            RequestOpts {
                query: Some(vec![("render_js", "true".into())]),
                auth: Some(Auth::Query {
                    name: "api_key",
                    value: "k".into(),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(got, vec![1, 2]);
}

#[tokio::test]
async fn decode_failure_carries_snippet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<Value>("/x", RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::Decode(_, snippet) => assert_eq!(snippet, "not json"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_proxy_is_a_build_error() {
    let client = HttpClient::absolute_only().unwrap();
    assert!(matches!(client.with_proxy("not a url"), Err(HttpError::Build(_))));
    let proxied = client.with_proxy("http://127.0.0.1:9").unwrap();
    assert_eq!(proxied.proxy(), Some("http://127.0.0.1:9"));
}
