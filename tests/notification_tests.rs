/// Tests for the transactional email client against a mocked HTTP API.
use financing_api::notifications::EmailClient;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_send_posts_brevo_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(header("api-key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "sender": { "email": "no-reply@test.local" },
            "to": [{ "email": "cliente@example.com", "name": "Ana García" }],
            "subject": "Recibimos tu solicitud",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = EmailClient::new(&mock_server.uri(), "test-key", "no-reply@test.local").unwrap();
    let result = client
        .send(
            "cliente@example.com",
            Some("Ana García"),
            "Recibimos tu solicitud",
            "<p>Hola Ana</p>",
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_send_surfaces_api_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"message\":\"Key not found\"}"))
        .mount(&mock_server)
        .await;

    let client = EmailClient::new(&mock_server.uri(), "bad-key", "no-reply@test.local").unwrap();
    let result = client
        .send("cliente@example.com", None, "Asunto", "<p>cuerpo</p>")
        .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_send_without_recipient_name_omits_it() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(body_partial_json(serde_json::json!({
            "to": [{ "email": "admin@example.com" }],
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = EmailClient::new(&mock_server.uri(), "test-key", "no-reply@test.local").unwrap();
    assert!(client
        .send("admin@example.com", None, "Nueva solicitud", "<p>alerta</p>")
        .await
        .is_ok());
}
