/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Boundary behaviors from §8: auth timeout, idle timeout, and the batch
//! endpoint's exact `MAX_BATCH` cutoff, driven end to end.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    use crate::support::{http_request, spawn_with};
    use utils::config::Config;

    #[tokio::test]
    async fn auth_timeout_closes_session_with_error() {
        let mut config = Config::default();
        config.auth_timeout = Duration::from_millis(50);
        let relay = spawn_with(config).await;

        let (mut ws, _) = connect_async(relay.ws_url()).await.unwrap();

        // Say nothing; the server must close us within auth_timeout.
        let outcome = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("server acts within the timeout budget");

        match outcome {
            Some(Ok(Message::Text(text))) => {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(frame["type"], "error");
            }
            Some(Ok(Message::Close(_))) | None => {}
            other => panic!("unexpected frame on auth timeout: {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_timeout_closes_session_after_silence() {
        let mut config = Config::default();
        config.idle_timeout = Duration::from_millis(80);
        let relay = spawn_with(config).await;

        let (mut ws, _) = connect_async(relay.ws_url()).await.unwrap();
        ws.send(Message::Text(
            json!({"type": "auth", "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"})
                .to_string(),
        ))
        .await
        .unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert!(matches!(reply, Message::Text(_)));

        // Send nothing further; idle_timeout must tear the session down.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            assert!(tokio::time::Instant::now() < deadline, "session never closed");
            match tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
                Ok(None) => break,
                Ok(Some(Ok(Message::Close(_)))) => break,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => break,
                Err(_elapsed) => continue,
            }
        }
    }

    #[tokio::test]
    async fn batch_boundary_at_exactly_max_batch_succeeds() {
        let mut config = Config::default();
        config.max_batch = 3;
        let relay = spawn_with(config).await;

        let addresses = json!([
            "0x1111111111111111111111111111111111111111",
            "0x2222222222222222222222222222222222222222",
            "0x3333333333333333333333333333333333333333",
        ]);
        let (status, _) = http_request(
            &relay.http_addr(),
            "POST",
            "/api/public-keys/batch",
            &json!({"addresses": addresses}).to_string(),
        )
        .await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn batch_boundary_one_over_max_batch_fails() {
        let mut config = Config::default();
        config.max_batch = 3;
        let relay = spawn_with(config).await;

        let addresses = json!([
            "0x1111111111111111111111111111111111111111",
            "0x2222222222222222222222222222222222222222",
            "0x3333333333333333333333333333333333333333",
            "0x4444444444444444444444444444444444444444",
        ]);
        let (status, body) = http_request(
            &relay.http_addr(),
            "POST",
            "/api/status/batch",
            &json!({"addresses": addresses}).to_string(),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn oversized_public_key_is_rejected() {
        let relay = spawn_with(Config::default()).await;
        let oversized = "x".repeat(utils::limits::MAX_PUBLIC_KEY_BYTES + 1);

        let (status, _) = http_request(
            &relay.http_addr(),
            "POST",
            "/api/public-keys",
            &json!({
                "address": "0x5555555555555555555555555555555555555555",
                "publicKey": oversized,
            })
            .to_string(),
        )
        .await;
        assert_eq!(status, 400);
    }
}
