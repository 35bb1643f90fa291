/// Integration tests with a mocked workflow engine.
/// Exercises every outbound call without hitting real external services.
use chrono::Utc;
use pulse_capture_api::config::Config;
use pulse_capture_api::models::{FitBand, Lead, LeadStatus};
use pulse_capture_api::workflow_client::WorkflowClient;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to build a config pointing every outbound target at the mock server.
fn test_config(base_url: &str) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 3001,
        jwt_secret: "test_secret".to_string(),
        lead_processing_webhook_url: Some(format!("{}/webhook/lead-processing", base_url)),
        outreach_webhook_url: Some(format!("{}/webhook/send-outreach", base_url)),
        webhook_secret: None,
        n8n_base_url: base_url.to_string(),
        n8n_api_key: Some("test_n8n_key".to_string()),
        openai_base_url: base_url.to_string(),
        frontend_url: "http://localhost:5173".to_string(),
        bootstrap_admin_email: None,
        bootstrap_admin_password: None,
    }
}

fn sample_lead() -> Lead {
    Lead {
        id: Uuid::new_v4(),
        name: "Jane Doe".to_string(),
        email: "jane@x.com".to_string(),
        company: Some("Acme Inc".to_string()),
        website: Some("https://acme.example".to_string()),
        problem_text: "We need help scaling our outbound sales".to_string(),
        status: LeadStatus::New,
        use_case_label: Some("Outbound automation".to_string()),
        fit_score: Some(82),
        fit_band: Some(FitBand::High),
        ai_rationale: Some("Strong ICP match".to_string()),
        company_size: None,
        industry: None,
        location: None,
        revenue_range: None,
        outreach_sent_at: None,
        outreach_preview: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

#[tokio::test]
async fn lead_processing_dispatch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/lead-processing"))
        .and(body_partial_json(serde_json::json!({
            "name": "Jane Doe",
            "email": "jane@x.com",
            "problem_text": "We need help scaling our outbound sales"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "received": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.trigger_lead_processing(&sample_lead()).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, Some(200));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn lead_processing_dispatch_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/lead-processing"))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow exploded"))
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.trigger_lead_processing(&sample_lead()).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("500"));
}

#[tokio::test]
async fn lead_processing_dispatch_network_error() {
    // Nothing listening here - connection refused, not a panic
    let mut config = test_config("http://127.0.0.1:9");
    config.lead_processing_webhook_url = Some("http://127.0.0.1:9/webhook".to_string());

    let client = WorkflowClient::new(&config).unwrap();
    let outcome = client.trigger_lead_processing(&sample_lead()).await;

    assert!(!outcome.success);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn lead_processing_dispatch_unconfigured_url() {
    let mut config = test_config("http://localhost:5678");
    config.lead_processing_webhook_url = None;

    let client = WorkflowClient::new(&config).unwrap();
    let outcome = client.trigger_lead_processing(&sample_lead()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Webhook URL not configured"));
}

#[tokio::test]
async fn outreach_dispatch_success() {
    let mock_server = MockServer::start().await;
    let lead_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/webhook/send-outreach"))
        .and(body_partial_json(serde_json::json!({ "lead_id": lead_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "queued": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.trigger_outreach(lead_id).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.data.unwrap()["queued"], true);
}

#[tokio::test]
async fn outreach_dispatch_engine_reports_failure() {
    // HTTP 200 but the engine signals failure in the body
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/send-outreach"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "No outreach template configured"
        })))
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.trigger_outreach(Uuid::new_v4()).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("No outreach template configured")
    );
}

#[tokio::test]
async fn outreach_dispatch_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/send-outreach"))
        .respond_with(ResponseTemplate::new(502).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.trigger_outreach(Uuid::new_v4()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(502));
}

#[tokio::test]
async fn slack_notification_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slack/hook"))
        .and(body_partial_json(serde_json::json!({
            "text": "🎯 New Lead: Jane Doe"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let url = format!("{}/slack/hook", mock_server.uri());
    let outcome = client.send_slack_notification(&url, &sample_lead()).await;

    assert!(outcome.success);
}

#[tokio::test]
async fn slack_notification_failure_is_contained() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slack/hook"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid_token"))
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let url = format!("{}/slack/hook", mock_server.uri());
    let outcome = client.send_slack_notification(&url, &sample_lead()).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("403"));
}

#[tokio::test]
async fn openai_test_uses_bearer_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.test_openai("sk-test").await;

    assert!(outcome.success);
}

#[tokio::test]
async fn openai_test_rejected_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.test_openai("sk-bad").await;

    assert!(!outcome.success);
}

#[tokio::test]
async fn n8n_connection_test_sends_api_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/credentials"))
        .and(header("X-N8N-API-KEY", "test_n8n_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();
    let outcome = client.test_n8n_connection().await;

    assert!(outcome.success);
}

#[tokio::test]
async fn concurrent_outreach_dispatches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/webhook/send-outreach"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .expect(10)
        .mount(&mock_server)
        .await;

    let client = WorkflowClient::new(&test_config(&mock_server.uri())).unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.trigger_outreach(Uuid::new_v4()).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.success);
    }
}
