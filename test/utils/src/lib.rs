pub const FIXTURE_INSTANCE: &str = "relay-test";
pub const FIXTURE_APIKEY: &str = "B6D711FCDE4D4FD5936544120E713976";

pub fn qrcode_webhook_fixture() -> String {
    return format!(
        r#"{{
    "event": "qrcode.updated",
    "instance": "{FIXTURE_INSTANCE}",
    "data": {{
        "qrcode": {{
            "instance": "{FIXTURE_INSTANCE}",
            "pairingCode": null,
            "code": "2@y8eK+bjtEjUWy9/FOM/I4obpqUhe8N3cZTLg2CzRGEqmBU1/kl8tf9/L6UszVNJBR8zN4s9F6sDUKTR7Gx0cRKv+w+P2lfZ+vzw=",
            "base64": "data:image/png;base64,iVBORw0KGgo="
        }}
    }},
    "destination": "http://localhost:3001/webhook",
    "date_time": "2024-03-01T12:00:00.000Z",
    "server_url": "http://localhost:8080",
    "apikey": "{FIXTURE_APIKEY}"
}}"#
    );
}

pub fn connection_webhook_fixture(state: &str, status_reason: u16) -> String {
    return format!(
        r#"{{
    "event": "connection.update",
    "instance": "{FIXTURE_INSTANCE}",
    "data": {{
        "instance": "{FIXTURE_INSTANCE}",
        "wuid": "5511988887777@s.whatsapp.net",
        "profileName": "CRM Turbo",
        "profilePictureUrl": null,
        "state": "{state}",
        "statusReason": {status_reason}
    }},
    "date_time": "2024-03-01T12:00:00.000Z",
    "apikey": "{FIXTURE_APIKEY}"
}}"#
    );
}

pub fn message_webhook_fixture() -> String {
    return format!(
        r#"{{
    "event": "messages.upsert",
    "instance": "{FIXTURE_INSTANCE}",
    "data": {{
        "key": {{
            "remoteJid": "5511999990000@s.whatsapp.net",
            "fromMe": false,
            "id": "3EB0C767D26A1D2E9B4F"
        }},
        "pushName": "Maria",
        "message": {{
            "conversation": "Qual o status do meu pedido?"
        }},
        "messageType": "conversation",
        "messageTimestamp": 1709294400,
        "owner": "{FIXTURE_INSTANCE}",
        "source": "android"
    }},
    "date_time": "2024-03-01T12:00:00.000Z",
    "apikey": "{FIXTURE_APIKEY}"
}}"#
    );
}
