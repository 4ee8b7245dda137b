use anyhow::Result;
use mockito::Matcher;
use test_utils::connection_webhook_fixture;
use test_utils::message_webhook_fixture;
use test_utils::qrcode_webhook_fixture;
use test_utils::FIXTURE_APIKEY;
use test_utils::FIXTURE_INSTANCE;
use tokio::sync::mpsc;

use super::Evolution;
use crate::domain::models::Connector;
use crate::domain::models::DisconnectReason;
use crate::domain::models::MessageContent;
use crate::domain::models::MessageUpsert;
use crate::domain::models::ReceivedMessage;
use crate::domain::models::SessionEvent;
use crate::domain::models::SessionUser;
use crate::domain::models::UnauthorizedWebhook;

impl Evolution {
    fn with_url(url: String) -> Evolution {
        return Evolution {
            url,
            token: FIXTURE_APIKEY.to_string(),
            instance: FIXTURE_INSTANCE.to_string(),
            webhook_url: "http://127.0.0.1:3001/webhook".to_string(),
            timeout: "500".to_string(),
        };
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    return events;
}

mod health_check {
    use super::*;

    #[tokio::test]
    async fn it_successfully_health_checks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;

        let res = Evolution::with_url(server.url()).health_check().await;

        assert!(res.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_fails_health_checks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(500)
            .create_async()
            .await;

        let err = Evolution::with_url(server.url())
            .health_check()
            .await
            .unwrap_err();

        insta::assert_snapshot!(err.to_string(), @"Gateway health check failed");
        mock.assert_async().await;
    }
}

mod connect {
    use super::*;

    #[tokio::test]
    async fn it_creates_the_instance_and_emits_a_qr_code() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let state_mock = server
            .mock("GET", "/instance/connectionState/relay-test")
            .match_header("apikey", FIXTURE_APIKEY)
            .with_status(404)
            .create_async()
            .await;
        let create_mock = server
            .mock("POST", "/instance/create")
            .match_body(Matcher::Json(serde_json::json!({
                "instanceName": "relay-test",
                "qrcode": false,
                "integration": "WHATSAPP-BAILEYS"
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let webhook_mock = server
            .mock("POST", "/webhook/set/relay-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "webhook": {
                    "enabled": true,
                    "url": "http://127.0.0.1:3001/webhook",
                    "events": ["QRCODE_UPDATED", "CONNECTION_UPDATE", "MESSAGES_UPSERT"]
                }
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let connect_mock = server
            .mock("GET", "/instance/connect/relay-test")
            .with_status(200)
            .with_body(r#"{"pairingCode": null, "code": "2@abc", "base64": "data:image/png;base64,", "count": 1}"#)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        Evolution::with_url(server.url()).connect(&tx).await?;

        state_mock.assert_async().await;
        create_mock.assert_async().await;
        webhook_mock.assert_async().await;
        connect_mock.assert_async().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::Connecting(),
                SessionEvent::QrCode("2@abc".to_string())
            ]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_reports_open_sessions_with_their_owner() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connectionState/relay-test")
            .with_status(200)
            .with_body(r#"{"instance": {"instanceName": "relay-test", "state": "open"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/webhook/set/relay-test")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", "/instance/fetchInstances")
            .match_query(Matcher::UrlEncoded(
                "instanceName".to_string(),
                "relay-test".to_string(),
            ))
            .with_status(200)
            .with_body(r#"[{"name": "relay-test", "ownerJid": "5511988887777@s.whatsapp.net", "profileName": "CRM Turbo", "connectionStatus": "open"}]"#)
            .create_async()
            .await;
        let connect_mock = server
            .mock("GET", "/instance/connect/relay-test")
            .expect(0)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        Evolution::with_url(server.url()).connect(&tx).await?;

        connect_mock.assert_async().await;
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::Connecting(),
                SessionEvent::Open(Some(SessionUser {
                    id: "5511988887777@s.whatsapp.net".to_string(),
                    name: Some("CRM Turbo".to_string()),
                }))
            ]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_fails_when_the_gateway_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connectionState/relay-test")
            .with_status(500)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let err = Evolution::with_url(server.url())
            .connect(&tx)
            .await
            .unwrap_err();

        insta::assert_snapshot!(err.to_string(), @"Gateway connection state request failed with status 500");
        assert_eq!(drain(&mut rx), vec![SessionEvent::Connecting()]);
    }

    #[tokio::test]
    async fn it_fails_when_the_webhook_is_refused() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connectionState/relay-test")
            .with_status(200)
            .with_body(r#"{"instance": {"instanceName": "relay-test", "state": "close"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/webhook/set/relay-test")
            .with_status(400)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel::<SessionEvent>();
        let res = Evolution::with_url(server.url()).connect(&tx).await;

        assert!(res.is_err());
    }
}

mod send_text {
    use super::*;

    #[tokio::test]
    async fn it_sends_text_messages() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/message/sendText/relay-test")
            .match_header("apikey", FIXTURE_APIKEY)
            .match_body(Matcher::Json(serde_json::json!({
                "number": "5511999990000@s.whatsapp.net",
                "text": "Seu pedido foi enviado."
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        Evolution::with_url(server.url())
            .send_text("5511999990000@s.whatsapp.net", "Seu pedido foi enviado.")
            .await?;

        mock.assert_async().await;

        return Ok(());
    }

    async fn send_failure(status: usize, body: &str) -> String {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/message/sendText/relay-test")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;

        let res = Evolution::with_url(server.url())
            .send_text("5511999990000@s.whatsapp.net", "Oi")
            .await;

        return res.unwrap_err().to_string();
    }

    #[tokio::test]
    async fn it_carries_the_gateway_message_on_failure() {
        let err = send_failure(
            400,
            r#"{"status": 400, "error": "Bad Request", "response": {"message": ["Number not on WhatsApp"]}}"#,
        )
        .await;

        insta::assert_snapshot!(err, @"Gateway failed to send message with status 400: Number not on WhatsApp");
    }

    #[tokio::test]
    async fn it_renders_structured_gateway_messages() {
        let err = send_failure(
            400,
            r#"{"status": 400, "error": "Bad Request", "response": {"message": [{"exists": false}]}}"#,
        )
        .await;

        insta::assert_snapshot!(err, @r###"Gateway failed to send message with status 400: {"exists":false}"###);
    }

    #[tokio::test]
    async fn it_falls_back_to_the_gateway_error() {
        let err = send_failure(500, r#"{"status": 500, "error": "Internal Server Error"}"#).await;

        insta::assert_snapshot!(err, @"Gateway failed to send message with status 500: Internal Server Error");
    }

    #[tokio::test]
    async fn it_carries_the_gateway_status_without_a_body() {
        let err = send_failure(502, "").await;

        insta::assert_snapshot!(err, @"Gateway failed to send message with status 502");
    }
}

#[tokio::test]
async fn it_logs_out() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/instance/logout/relay-test")
        .with_status(200)
        .with_body(r#"{"status": "SUCCESS"}"#)
        .create_async()
        .await;

    Evolution::with_url(server.url()).logout().await?;
    mock.assert_async().await;

    return Ok(());
}

mod decode_webhook {
    use super::*;

    fn decode(body: &str) -> Result<Vec<SessionEvent>> {
        return Evolution::with_url("http://localhost:8080".to_string())
            .decode_webhook(body.as_bytes());
    }

    #[test]
    fn it_decodes_qr_codes() -> Result<()> {
        let events = decode(&qrcode_webhook_fixture())?;

        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::QrCode(code) => assert!(code.starts_with("2@")),
            _ => panic!("Expected a QR code"),
        }

        return Ok(());
    }

    #[test]
    fn it_decodes_open_connections() -> Result<()> {
        let events = decode(&connection_webhook_fixture("open", 200))?;

        assert_eq!(
            events,
            vec![SessionEvent::Open(Some(SessionUser {
                id: "5511988887777@s.whatsapp.net".to_string(),
                name: Some("CRM Turbo".to_string()),
            }))]
        );

        return Ok(());
    }

    #[test]
    fn it_decodes_connecting() -> Result<()> {
        let events = decode(&connection_webhook_fixture("connecting", 200))?;
        assert_eq!(events, vec![SessionEvent::Connecting()]);

        return Ok(());
    }

    #[test]
    fn it_decodes_logouts() -> Result<()> {
        let events = decode(&connection_webhook_fixture("close", 401))?;
        assert_eq!(
            events,
            vec![SessionEvent::Closed(DisconnectReason::LoggedOut)]
        );

        return Ok(());
    }

    #[test]
    fn it_decodes_recoverable_closes() -> Result<()> {
        let events = decode(&connection_webhook_fixture("close", 428))?;
        assert_eq!(
            events,
            vec![SessionEvent::Closed(DisconnectReason::Other(
                "status 428".to_string()
            ))]
        );

        return Ok(());
    }

    #[test]
    fn it_decodes_messages() -> Result<()> {
        let events = decode(&message_webhook_fixture())?;

        assert_eq!(
            events,
            vec![SessionEvent::Messages(MessageUpsert {
                notify: true,
                messages: vec![ReceivedMessage {
                    remote_jid: "5511999990000@s.whatsapp.net".to_string(),
                    id: "3EB0C767D26A1D2E9B4F".to_string(),
                    from_me: false,
                    timestamp: Some(1709294400),
                    content: Some(MessageContent::Conversation(
                        "Qual o status do meu pedido?".to_string()
                    )),
                }],
            })]
        );

        return Ok(());
    }

    #[test]
    fn it_decodes_message_batches_and_content_kinds() -> Result<()> {
        let body = r#"{
            "event": "MESSAGES_UPSERT",
            "instance": "relay-test",
            "apikey": "B6D711FCDE4D4FD5936544120E713976",
            "data": [
                {
                    "key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": true, "id": "A"},
                    "message": {"extendedTextMessage": {"text": "https://example.com"}},
                    "messageTimestamp": "1709294400"
                },
                {
                    "key": {"remoteJid": "5511999990000@s.whatsapp.net", "id": "B"},
                    "message": {"imageMessage": {"mimetype": "image/jpeg"}}
                },
                {
                    "key": {"remoteJid": "5511999990000@s.whatsapp.net", "id": "C"}
                }
            ]
        }"#;

        let events = decode(body)?;
        let messages = match &events[0] {
            SessionEvent::Messages(upsert) => upsert.messages.clone(),
            _ => panic!("Expected messages"),
        };

        assert_eq!(messages.len(), 3);
        assert!(messages[0].from_me);
        assert_eq!(messages[0].timestamp, Some(1709294400));
        assert_eq!(
            messages[0].content,
            Some(MessageContent::ExtendedText("https://example.com".to_string()))
        );
        assert!(!messages[1].from_me);
        assert_eq!(messages[1].content, Some(MessageContent::Other));
        assert_eq!(messages[2].content, None);

        return Ok(());
    }

    #[test]
    fn it_ignores_other_instances() -> Result<()> {
        let body = message_webhook_fixture().replace("relay-test", "someone-else");
        assert!(decode(&body)?.is_empty());

        return Ok(());
    }

    #[test]
    fn it_ignores_unknown_events() -> Result<()> {
        let body = r#"{"event": "presence.update", "instance": "relay-test", "apikey": "B6D711FCDE4D4FD5936544120E713976", "data": {}}"#;
        assert!(decode(body)?.is_empty());

        return Ok(());
    }

    #[test]
    fn it_reads_the_upsert_kind_from_envelopes() -> Result<()> {
        let envelope = |kind: &str| {
            return format!(
                r#"{{
                    "event": "messages.upsert",
                    "instance": "relay-test",
                    "apikey": "B6D711FCDE4D4FD5936544120E713976",
                    "data": {{
                        "type": "{kind}",
                        "messages": [{{
                            "key": {{"remoteJid": "5511999990000@s.whatsapp.net", "id": "A"}},
                            "message": {{"conversation": "Oi"}}
                        }}]
                    }}
                }}"#
            );
        };

        for (kind, notify) in [("notify", true), ("append", false)] {
            let events = decode(&envelope(kind))?;
            match &events[0] {
                SessionEvent::Messages(upsert) => {
                    assert_eq!(upsert.notify, notify);
                    assert_eq!(upsert.messages.len(), 1);
                    assert_eq!(upsert.messages[0].id, "A");
                }
                _ => panic!("Expected messages"),
            }
        }

        return Ok(());
    }

    #[test]
    fn it_rejects_deliveries_with_a_wrong_apikey() {
        let body = connection_webhook_fixture("close", 401).replace(FIXTURE_APIKEY, "attacker-guess");
        let err = decode(&body).unwrap_err();

        assert_eq!(err.downcast_ref::<UnauthorizedWebhook>(), Some(&UnauthorizedWebhook));
    }

    #[test]
    fn it_rejects_deliveries_without_an_apikey() {
        let body = r#"{"event": "messages.upsert", "instance": "relay-test", "data": {"key": {"remoteJid": "5511999990000@s.whatsapp.net", "id": "A"}, "message": {"conversation": "Oi"}}}"#;
        let err = decode(body).unwrap_err();

        assert_eq!(err.downcast_ref::<UnauthorizedWebhook>(), Some(&UnauthorizedWebhook));
    }

    #[test]
    fn it_fails_on_malformed_payloads() {
        assert!(decode("{").is_err());
        assert!(decode(r#"{"event": "connection.update", "instance": "relay-test", "apikey": "B6D711FCDE4D4FD5936544120E713976", "data": {"statusReason": 1}}"#).is_err());
    }
}
