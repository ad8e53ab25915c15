/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The concrete end-to-end scenarios from §8: literal inputs, literal
//! expected outputs, driven over the real WebSocket and HTTP surfaces.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    use crate::support::{http_request, spawn, spawn_with};
    use utils::config::Config;

    async fn recv_json(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Value {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("frame within timeout")
                .expect("stream not closed")
                .expect("no transport error")
            {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn auth(url: &str, address: &str) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let (mut ws, _) = connect_async(url).await.expect("connect");
        ws.send(Message::Text(json!({"type": "auth", "address": address}).to_string()))
            .await
            .unwrap();
        let reply = recv_json(&mut ws).await;
        assert_eq!(reply["type"], "auth_success");
        assert_eq!(reply["address"], address);
        ws
    }

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[tokio::test]
    async fn live_delivery() {
        let relay = spawn().await;
        let mut alice = auth(&relay.ws_url(), ALICE).await;
        let mut bob = auth(&relay.ws_url(), BOB).await;

        alice
            .send(Message::Text(
                json!({
                    "type": "message",
                    "to": BOB,
                    "content": "Q1Q=",
                    "messageId": "m1",
                    "timestamp": 1000,
                })
                .to_string(),
            ))
            .await
            .unwrap();

        let delivered = recv_json(&mut bob).await;
        assert_eq!(delivered["type"], "message");
        assert_eq!(delivered["from"], ALICE);
        assert_eq!(delivered["content"], "Q1Q=");
        assert_eq!(delivered["messageId"], "m1");
        assert_eq!(delivered["timestamp"], 1000);
        assert!(delivered.get("queued").is_none() || delivered["queued"] == false);

        let ack = recv_json(&mut alice).await;
        assert_eq!(ack["type"], "delivered");
        assert_eq!(ack["messageId"], "m1");
        assert_eq!(ack["to"], BOB);
    }

    #[tokio::test]
    async fn queueing_and_drain() {
        let relay = spawn().await;
        let mut alice = auth(&relay.ws_url(), ALICE).await;

        alice
            .send(Message::Text(
                json!({
                    "type": "message",
                    "to": BOB,
                    "content": "Q1Q=",
                    "messageId": "m1",
                    "timestamp": 1000,
                })
                .to_string(),
            ))
            .await
            .unwrap();

        let ack = recv_json(&mut alice).await;
        assert_eq!(ack["type"], "queued");
        assert_eq!(ack["messageId"], "m1");

        let (status, body) = http_request(
            &relay.http_addr(),
            "GET",
            &format!("/api/messages/{BOB}/queue-size"),
            "",
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["queueSize"], 1);

        let mut bob = auth(&relay.ws_url(), BOB).await;
        let drained = recv_json(&mut bob).await;
        assert_eq!(drained["type"], "message");
        assert_eq!(drained["queued"], true);
        assert_eq!(drained["messageId"], "m1");
        assert_eq!(drained["content"], "Q1Q=");
        assert_eq!(drained["timestamp"], 1000);

        let (status, body) = http_request(
            &relay.http_addr(),
            "GET",
            &format!("/api/messages/{BOB}/queue-size"),
            "",
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["queueSize"], 0);
    }

    #[tokio::test]
    async fn displacement() {
        let relay = spawn().await;
        let mut presence = relay.server.registry.subscribe();

        let mut s1 = auth(&relay.ws_url(), BOB).await;
        let _ = presence.recv().await.unwrap(); // online=true for s1

        let _s2 = auth(&relay.ws_url(), BOB).await;

        // s1 must observe its displacement and close.
        let close_frame = tokio::time::timeout(Duration::from_secs(2), s1.next())
            .await
            .expect("s1 notified within timeout");
        assert!(close_frame.is_none() || matches!(close_frame, Some(Ok(Message::Close(_)))));

        let bob_address: utils::address::Address = BOB.parse().unwrap();
        assert!(relay.server.registry.lookup(&bob_address).is_some());
    }

    #[tokio::test]
    async fn head_drop_at_capacity() {
        let mut config = Config::default();
        config.max_offline_messages = 3;
        let relay = spawn_with(config).await;
        const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

        let mut alice = auth(&relay.ws_url(), ALICE).await;
        for id in ["e1", "e2", "e3", "e4"] {
            alice
                .send(Message::Text(
                    json!({
                        "type": "message",
                        "to": CAROL,
                        "content": "Q1Q=",
                        "messageId": id,
                        "timestamp": 1000,
                    })
                    .to_string(),
                ))
                .await
                .unwrap();
            let ack = recv_json(&mut alice).await;
            assert_eq!(ack["type"], "queued");
        }

        let mut carol = auth(&relay.ws_url(), CAROL).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let frame = recv_json(&mut carol).await;
            ids.push(frame["messageId"].as_str().unwrap().to_string());
        }
        assert_eq!(ids, vec!["e2", "e3", "e4"]);
    }

    #[tokio::test]
    async fn expiry() {
        let mut config = Config::default();
        config.message_retention = Duration::from_millis(1);
        let relay = spawn_with(config).await;
        const DAVE: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

        let mut alice = auth(&relay.ws_url(), ALICE).await;
        alice
            .send(Message::Text(
                json!({"type":"message","to":DAVE,"content":"Q1Q=","messageId":"e1","timestamp":1000}).to_string(),
            ))
            .await
            .unwrap();
        let _ = recv_json(&mut alice).await;

        tokio::time::sleep(Duration::from_millis(10)).await;

        alice
            .send(Message::Text(
                json!({"type":"message","to":DAVE,"content":"Q1Q=","messageId":"e2","timestamp":2000}).to_string(),
            ))
            .await
            .unwrap();
        let _ = recv_json(&mut alice).await;

        let mut dave = auth(&relay.ws_url(), DAVE).await;
        let frame = recv_json(&mut dave).await;
        assert_eq!(frame["messageId"], "e2");

        // No second queued frame should arrive; a ping/pong round-trip
        // confirms the connection stayed healthy with nothing else pending.
        dave.send(Message::Text(json!({"type": "ping"}).to_string()))
            .await
            .unwrap();
        let frame = recv_json(&mut dave).await;
        assert_eq!(frame["type"], "pong");
    }

    #[tokio::test]
    async fn key_exchange() {
        let relay = spawn().await;
        const ERIN: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

        let (status, first) = http_request(
            &relay.http_addr(),
            "POST",
            "/api/public-keys",
            &json!({"address": ERIN, "publicKey": "UEs="}).to_string(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(first["createdAt"], first["updatedAt"]);

        let (status, second) = http_request(
            &relay.http_addr(),
            "POST",
            "/api/public-keys",
            &json!({"address": ERIN, "publicKey": "UEs+"}).to_string(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(second["createdAt"], first["createdAt"]);
        assert_ne!(second["updatedAt"], first["createdAt"]);

        let (status, fetched) =
            http_request(&relay.http_addr(), "GET", &format!("/api/public-keys/{ERIN}"), "").await;
        assert_eq!(status, 200);
        assert_eq!(fetched["publicKey"], "UEs+");
    }

    #[tokio::test]
    async fn typing_and_read_receipts_are_best_effort() {
        let relay = spawn().await;
        let mut alice = auth(&relay.ws_url(), ALICE).await;
        let mut bob = auth(&relay.ws_url(), BOB).await;

        alice
            .send(Message::Text(
                json!({"type": "typing", "to": BOB, "isTyping": true}).to_string(),
            ))
            .await
            .unwrap();
        let frame = recv_json(&mut bob).await;
        assert_eq!(frame["type"], "typing");
        assert_eq!(frame["from"], ALICE);
        assert_eq!(frame["isTyping"], true);

        alice
            .send(Message::Text(
                json!({"type": "read_receipt", "to": BOB, "messageId": "m1"}).to_string(),
            ))
            .await
            .unwrap();
        let frame = recv_json(&mut bob).await;
        assert_eq!(frame["type"], "read");
        assert_eq!(frame["from"], ALICE);
        assert_eq!(frame["messageId"], "m1");

        // No recipient online: dropped silently, not enqueued.
        const NOBODY: &str = "0xffffffffffffffffffffffffffffffffffffffff";
        alice
            .send(Message::Text(
                json!({"type": "typing", "to": NOBODY, "isTyping": true}).to_string(),
            ))
            .await
            .unwrap();
        let (_, body) =
            http_request(&relay.http_addr(), "GET", &format!("/api/messages/{NOBODY}/queue-size"), "").await;
        assert_eq!(body["queueSize"], 0);
    }
}
