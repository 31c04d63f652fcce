//! REST connector behavior against a live fake origin.

use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use source_connectors::config::RestConfig;
use source_connectors::error::ConnectorError;
use source_connectors::rest_api::RestApiConnector;
use source_connectors::traits::SourceConnector;

fn connector(config: serde_json::Value) -> RestApiConnector {
    let config: RestConfig = serde_json::from_value(config).unwrap();
    RestApiConnector::new(config.validate().unwrap()).unwrap()
}

#[tokio::test]
async fn test_api_key_auth_sends_configured_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("X-Api-Key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": format!("{}/items", server.uri()),
        "auth_type": "APIKey",
        "auth_data": {"key_name": "X-Api-Key", "key_value": "secret-key"}
    }));

    connector.check_connection().await.unwrap();
}

#[tokio::test]
async fn test_multi_key_auth_sends_every_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("X-App-Id", "app"))
        .and(header("X-App-Secret", "shh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "MultiAPIkeys",
        "auth_data": {"api_keys": [
            {"key_name": "X-App-Id", "key_value": "app"},
            {"key_name": "X-App-Secret", "key_value": "shh"}
        ]}
    }));

    connector.check_connection().await.unwrap();
}

#[tokio::test]
async fn test_bearer_token_auth() {
    let server = MockServer::start().await;
    Mock::given(header("Authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "Token",
        "auth_data": {"token": "tok-123"}
    }));

    connector.check_connection().await.unwrap();
}

#[tokio::test]
async fn test_digest_auth_answers_challenge() {
    let server = MockServer::start().await;

    // Authorized retry wins; the unauthenticated first request falls through
    // to the challenge below
    Mock::given(method("GET"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            r#"Digest realm="drop", nonce="f00f", qop="auth""#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": format!("{}/report", server.uri()),
        "auth_type": "Digest Authentication",
        "auth_data": {"username": "etl", "password": "pw"}
    }));

    connector.check_connection().await.unwrap();
}

#[tokio::test]
async fn test_openid_fetches_token_then_calls_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued-token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("Authorization", "Bearer issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"a": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": format!("{}/data", server.uri()),
        "auth_type": "OpenID",
        "auth_data": {
            "client_id": "etl-client",
            "token_url": format!("{}/token", server.uri()),
            "username": "alice",
            "password": "wonder"
        }
    }));

    assert_eq!(connector.get_columns().await.unwrap(), vec!["a"]);
}

#[tokio::test]
async fn test_check_connection_maps_statuses() {
    let server = MockServer::start().await;
    Mock::given(path("/locked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let locked = connector(serde_json::json!({
        "end_point": format!("{}/locked", server.uri()),
        "auth_type": "No authentication"
    }));
    match locked.check_connection().await {
        Err(ConnectorError::SourceConnection(message)) => {
            assert_eq!(message, "Authentication failed!")
        }
        other => panic!("expected auth failure, got {other:?}"),
    }

    let broken = connector(serde_json::json!({
        "end_point": format!("{}/broken", server.uri()),
        "auth_type": "No authentication"
    }));
    match broken.check_connection().await {
        Err(ConnectorError::SourceConnection(message)) => {
            assert!(message.contains("503"))
        }
        other => panic!("expected connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_object_response_is_single_row_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": 3, "name": "unit", "note": null})),
        )
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "No authentication"
    }));

    let table = connector.get_all_data().await.unwrap();
    assert_eq!(table.columns, vec!["id", "name", "note"]);
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0][1], Some("unit".to_string()));
    assert_eq!(table.rows[0][2], None);
}

#[tokio::test]
async fn test_allow_list_restricts_extracted_columns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"a": 1, "b": 2, "c": 3},
            {"a": 4, "b": 5, "c": 6}
        ])))
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "No authentication",
        "source_data_columns": ["c", "a", "nope"]
    }));

    assert_eq!(connector.get_cleaned_columns().await.unwrap(), vec!["a", "c"]);
    let table = connector.get_all_data().await.unwrap();
    assert_eq!(table.columns, vec!["a", "c"]);
    assert_eq!(table.rows[1], vec![Some("4".to_string()), Some("6".to_string())]);
}

#[tokio::test]
async fn test_csv_attachment_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=\"report.csv\"")
                .set_body_string("name;total\nx;10\ny;20\n"),
        )
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "No authentication"
    }));

    let table = connector.get_all_data().await.unwrap();
    assert_eq!(table.columns, vec!["name", "total"]);
    assert_eq!(table.rows.len(), 2);
}

#[tokio::test]
async fn test_scalar_response_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(42)))
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "No authentication"
    }));

    assert!(matches!(
        connector.get_columns().await,
        Err(ConnectorError::Internal(_))
    ));
}

#[tokio::test]
async fn test_stream_rows_carries_total_count() {
    use futures::StreamExt;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"v": 1}, {"v": 2}, {"v": 3}
        ])))
        .mount(&server)
        .await;

    let connector = connector(serde_json::json!({
        "end_point": server.uri(),
        "auth_type": "No authentication"
    }));

    let rows: Vec<_> = connector.stream_rows(5).await.unwrap().collect().await;
    assert_eq!(rows.len(), 3);
    for row in rows {
        let row = row.unwrap();
        assert_eq!(row.source_id, 5);
        assert_eq!(row.count, 3);
    }
}
