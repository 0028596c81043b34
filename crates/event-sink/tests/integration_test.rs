// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use event_sink::{
    batch::FlushPolicy,
    credentials::{Credentials, TokenProvider},
    gcs::GcsSink,
    object_key::ObjectNamer,
    redactor::Redactor,
    worker::{self, MessageReader},
    writer::BatchWriter,
};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn token_provider(token_uri: &str) -> TokenProvider {
    let credentials = Credentials::from_json(
        serde_json::json!({
            "type": "authorized_user",
            "client_id": "client-id",
            "client_secret": "client-secret",
            "refresh_token": "refresh-me",
            "token_uri": token_uri,
        })
        .to_string()
        .as_bytes(),
    )
    .expect("failed to parse credentials");
    TokenProvider::from_credentials(credentials, reqwest::Client::new())
        .expect("failed to create token provider")
}

#[tokio::test]
async fn events_are_redacted_batched_and_uploaded() {
    let mut server = Server::new_async().await;

    let token_mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.sink","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let expected_body = concat!(
        r#"{"action":"http_request","http_request":{"body":"","method":"GET"},"id":"1"}"#,
        "\n",
        r#"{"action":"unrecognised_datagram","unrecognised_datagram":{"payload":"","payload_length":8},"id":"2"}"#,
        "\n",
        r#"{"action":"dns_message","dns_message":{"query":"example.com"},"id":"3"}"#,
        "\n",
    );

    let upload_mock = server
        .mock("POST", "/upload/storage/v1/b/probe-bucket/o")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("uploadType".into(), "media".into()),
            Matcher::Regex(
                r"name=cyberprobe%2F\d{4}-\d{2}-\d{2}%2F\d{2}-\d{2}%2F[0-9a-f-]{36}".into(),
            ),
        ]))
        .match_header("authorization", "Bearer ya29.sink")
        .match_body(expected_body)
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let sink = GcsSink::new(
        reqwest::Client::new(),
        &server.url(),
        Duration::from_secs(5),
        Arc::new(token_provider(&format!("{}/token", server.url()))),
    );
    let mut writer = BatchWriter::new(
        sink,
        "probe-bucket",
        Redactor::new(true),
        FlushPolicy::new(1_000_000, Duration::from_secs(1800)),
        ObjectNamer::new("cyberprobe"),
    );

    let input = concat!(
        r#"{"action":"http_request","id":"1","http_request":{"method":"GET","body":"aGVsbG8="}}"#,
        "\n",
        "not json at all\n",
        r#"{"action":"unrecognised_datagram","id":"2","unrecognised_datagram":{"payload":"AAECAw=="}}"#,
        "\n",
        r#"{"action":"dns_message","dns_message":{"query":"example.com"},"id":"3"}"#,
        "\n",
    );

    worker::run(
        MessageReader::from_reader(input.as_bytes()),
        &mut writer,
        CancellationToken::new(),
    )
    .await
    .expect("worker failed");

    token_mock.assert_async().await;
    upload_mock.assert_async().await;

    let stats = writer.stats();
    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.failed_flushes, 0);
    assert!(writer.batch().is_empty());
}

#[tokio::test]
async fn storage_outage_drops_batches_and_keeps_going() {
    let mut server = Server::new_async().await;

    let upload_mock = server
        .mock("POST", "/upload/storage/v1/b/probe-bucket/o")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("internal error")
        .expect(3)
        .create_async()
        .await;

    let sink = GcsSink::new(
        reqwest::Client::new(),
        &server.url(),
        Duration::from_secs(5),
        Arc::new(TokenProvider::new_static("static-token")),
    );
    let mut writer = BatchWriter::new(
        sink,
        "probe-bucket",
        Redactor::default(),
        FlushPolicy::new(10, Duration::from_secs(1800)),
        ObjectNamer::default(),
    );

    for id in 0..3 {
        let msg = format!(r#"{{"action":"icmp","id":"{id}","icmp":{{"payload":"AA=="}}}}"#);
        writer.handle_message(msg.as_bytes()).await;
        assert!(writer.batch().is_empty());
        assert_eq!(writer.batch().byte_count(), 0);
    }

    upload_mock.assert_async().await;
    assert_eq!(writer.stats().flushes, 3);
    assert_eq!(writer.stats().failed_flushes, 3);
}

#[tokio::test]
async fn slow_storage_times_out_as_a_failed_write() {
    use std::net::TcpListener;

    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let endpoint = format!("http://{}", listener.local_addr().expect("no local addr"));

    let sink = GcsSink::new(
        reqwest::Client::new(),
        &endpoint,
        Duration::from_millis(200),
        Arc::new(TokenProvider::new_static("static-token")),
    );
    let mut writer = BatchWriter::new(
        sink,
        "probe-bucket",
        Redactor::default(),
        FlushPolicy::new(0, Duration::from_secs(1800)),
        ObjectNamer::default(),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        writer.handle_message(br#"{"action":"icmp","icmp":{"payload":""}}"#),
    )
    .await;

    assert!(result.is_ok(), "write was not bounded by the store timeout");
    assert_eq!(writer.stats().failed_flushes, 1);
    assert!(writer.batch().is_empty());
    drop(listener);
}
