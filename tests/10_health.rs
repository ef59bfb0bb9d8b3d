mod common;

use anyhow::Result;
use reqwest::StatusCode;

use common::TestServer;

#[tokio::test]
async fn health_endpoint_reports_store_ok() -> Result<()> {
    let server = TestServer::spawn().await?;

    let res = server.client.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let data = common::data(res).await?;
    assert_eq!(data["status"], "ok");
    assert_eq!(data["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn root_describes_the_service() -> Result<()> {
    let server = TestServer::spawn().await?;

    let data = common::data(server.client.get(server.url("/")).send().await?).await?;
    assert_eq!(data["name"], "Road Network API");
    assert!(data["endpoints"]["networks"].is_string());
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let server = TestServer::spawn().await?;

    for path in ["/auth/whoami", "/users/1", "/networks/1/edges", "/networks/1/generations"] {
        let res = server.client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", path);
        let body: serde_json::Value = res.json().await?;
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
    Ok(())
}
