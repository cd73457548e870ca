use acad_usage_meter::domain::{Consistency, UNKNOWN_ORGANISATION_ID};
use acad_usage_meter::FaultPoint;
use anyhow::{ensure, Result};
use serde_json::Value;

mod common;
use common::{at, TestServer};

#[tokio::test]
async fn root_endpoint_reports_service_works() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server.client.get(server.url("/")).send().await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Service works.");
    Ok(())
}

#[tokio::test]
async fn health_endpoint_light_and_full() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server.client.get(server.url("/health")).send().await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ok");

    let response = server.client.get(server.url("/health?mode=full")).send().await?;
    assert_eq!(response.status(), 200);

    server.store.inject_fault(FaultPoint::HealthCheck);
    let response = server.client.get(server.url("/health?mode=full")).send().await?;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "error");
    Ok(())
}

#[tokio::test]
async fn ping_accrues_minutes_per_ten_minute_bucket() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    let query = "userName=Alice&domainName=CORP&appCode=1&version=2024";

    let response = server.ping(query).await;
    assert_eq!(response.status(), 200);
    assert!(response.text().await?.is_empty());

    let records = server.store.usage_records();
    ensure!(records.len() == 1, "expected one usage record, got {}", records.len());
    assert_eq!(records[0].minutes, 10);
    assert_eq!(records[0].organisation_id, UNKNOWN_ORGANISATION_ID);

    server.clock.set(at(9, 9));
    assert_eq!(server.ping(query).await.status(), 200);
    assert_eq!(server.store.usage_records()[0].minutes, 10);

    server.clock.set(at(9, 11));
    assert_eq!(server.ping(query).await.status(), 200);
    assert_eq!(server.store.usage_records()[0].minutes, 20);

    let users = server.store.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
    assert_eq!(users[0].domain, "corp");
    assert_eq!(users[0].last_ping, Some(at(9, 11)));
    Ok(())
}

#[tokio::test]
async fn ping_accepts_alternate_parameter_spellings() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server
        .ping("username=bob&domainname=corp&appcode=3&Version=R24")
        .await;
    assert_eq!(response.status(), 200);

    let records = server.store.usage_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].application_id, 3);
    assert_eq!(records[0].version, "r24");
    Ok(())
}

#[tokio::test]
async fn ping_takes_first_non_empty_value_of_any_casing() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server
        .ping("USERNAME=Hank&userName=ignored&DOMAINNAME=corp&domainName=&APPCODE=2&appCode=3&VERSION=R25")
        .await;
    assert_eq!(response.status(), 200);

    let users = server.store.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "hank");
    assert_eq!(users[0].domain, "corp");

    let records = server.store.usage_records();
    assert_eq!(records[0].application_id, 2);
    assert_eq!(records[0].version, "r25");
    Ok(())
}

#[tokio::test]
async fn ping_is_routed_regardless_of_case_or_trailing_slash() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    let query = "userName=ivy&domainName=corp&appCode=1";

    for path in ["/Ping", "/ping/", "/PING/", "/api/ping"] {
        let response = server
            .client
            .get(server.url(&format!("{path}?{query}")))
            .send()
            .await?;
        assert_eq!(response.status(), 200, "{path}");
    }

    let response = server.client.get(server.url("/Ping?domainName=corp")).send().await?;
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await?, "No user name provided");

    assert_eq!(server.store.users().len(), 1);
    Ok(())
}

#[tokio::test]
async fn ping_without_app_code_or_version_uses_unknown() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    assert_eq!(server.ping("userName=carol&domainName=corp").await.status(), 200);

    let records = server.store.usage_records();
    assert_eq!(records[0].application_id, 0);
    assert_eq!(records[0].version, "unknown");
    Ok(())
}

#[tokio::test]
async fn ping_missing_identity_is_bad_request() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server.ping("domainName=corp&appCode=1").await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await?, "No user name provided");

    let response = server.ping("userName=&domainName=corp").await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await?, "No user name provided");

    let response = server.ping("userName=dave&appCode=1").await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await?, "No domain name provided");

    assert!(server.store.users().is_empty());
    assert!(server.store.usage_records().is_empty());
    Ok(())
}

#[tokio::test]
async fn ping_with_non_numeric_app_code_is_bad_request() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let response = server.ping("userName=erin&domainName=corp&appCode=cad").await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await?, "Invalid application code");
    assert!(server.store.users().is_empty());
    Ok(())
}

#[tokio::test]
async fn ping_storage_failure_is_problem_document() -> Result<()> {
    // ---
    let server = TestServer::new().await;
    server.store.inject_fault(FaultPoint::AddMinutes);

    let response = server.ping("userName=frank&domainName=corp&appCode=1").await;
    assert_eq!(response.status(), 500);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );

    let body: Value = response.json().await?;
    assert_eq!(body["status"], 500);
    assert_eq!(body["title"], "An error occurred while processing your request.");
    assert!(body.get("detail").is_none());

    // Atomic mode rolls the user back with the minutes.
    assert!(server.store.users().is_empty());

    assert_eq!(
        server.ping("userName=frank&domainName=corp&appCode=1").await.status(),
        200
    );
    assert_eq!(server.store.usage_records()[0].minutes, 10);
    Ok(())
}

#[tokio::test]
async fn per_step_failure_keeps_committed_user() -> Result<()> {
    // ---
    let server = TestServer::with_consistency(Consistency::PerStep).await;
    server.store.inject_fault(FaultPoint::AddMinutes);

    let response = server.ping("userName=gina&domainName=corp&appCode=1").await;
    assert_eq!(response.status(), 500);

    assert_eq!(server.store.users().len(), 1);
    assert_eq!(server.store.usage_records().len(), 1);
    assert_eq!(server.store.usage_records()[0].minutes, 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_pings_from_many_users() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    let requests = (0..16).map(|i| {
        let url = server.url(&format!(
            "/ping?userName=user{i}&domainName=corp&appCode=2&version=2024"
        ));
        let client = server.client.clone();
        async move { client.get(url).send().await }
    });

    for response in futures::future::join_all(requests).await {
        assert_eq!(response?.status(), 200);
    }

    assert_eq!(server.store.users().len(), 16);
    let records = server.store.usage_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].minutes, 160);
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_not_found() -> Result<()> {
    // ---
    let server = TestServer::new().await;

    for path in ["/pings", "/status", "/ping/extra"] {
        let response = server.client.get(server.url(path)).send().await?;
        assert_eq!(response.status(), 404, "{path}");
    }
    Ok(())
}
