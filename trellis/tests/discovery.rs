//! Integration tests for service auto-discovery.
//!
//! `inventory` collects from the entire test binary, so every service
//! submitted here is visible to every test in this file.

use http::StatusCode;
use serde_json::Value;
use trellis::prelude::*;
use trellis::testing::TestClient;

#[derive(Default)]
struct DiscoveredGreeter;

fn declare_greeter(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut greeter = registry.service::<DiscoveredGreeter>();
    greeter.path("/disc-greeter")?;
    greeter
        .method("hello")
        .get("")?
        .handler(|_, _| Ok("hello from discovery"))?;
    greeter
        .method("echo")
        .post("/echo")?
        .param(0, ParamBinding::body())?
        .handler(|_, args| Ok(args.value(0).clone()))?;
    Ok(())
}

trellis::inventory::submit! {
    ServiceDeclaration::new("DiscoveredGreeter", declare_greeter)
}

#[derive(Default)]
struct DiscoveredTasks;

fn declare_tasks(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut tasks = registry.service::<DiscoveredTasks>();
    tasks.path("/disc-tasks")?;
    tasks
        .method("remove")
        .delete("/:id")?
        .handler(|_, _| Ok(()))?;
    Ok(())
}

trellis::inventory::submit! {
    ServiceDeclaration::new("DiscoveredTasks", declare_tasks)
}

#[derive(Default)]
struct DiscoveredReports {
    base: DiscoveredBase,
}

fn reports_base(reports: &mut DiscoveredReports) -> &mut DiscoveredBase {
    &mut reports.base
}

fn declare_reports(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut reports = registry.service::<DiscoveredReports>();
    reports.extends::<DiscoveredBase>(reports_base)?;
    reports.path("/disc-reports")?;
    Ok(())
}

trellis::inventory::submit! {
    ServiceDeclaration::new("DiscoveredReports", declare_reports)
}

#[derive(Default)]
struct DiscoveredBase {
    visits: usize,
}

fn declare_base(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut base = registry.service::<DiscoveredBase>();
    base.abstract_service()?;
    base.method("status")
        .get("/status")?
        .handler(|base: &mut DiscoveredBase, _| {
            base.visits += 1;
            Ok(json!({ "visits": base.visits }))
        })?;
    Ok(())
}

trellis::inventory::submit! {
    ServiceDeclaration::new("DiscoveredBase", declare_base)
}

#[derive(Default)]
struct ExplicitOnly;

fn declare_explicit(registry: &mut Registry) -> Result<(), DeclarationError> {
    registry
        .service::<ExplicitOnly>()
        .method("ping")
        .get("/disc-explicit")?
        .handler(|_, _| Ok("explicit"))?;
    Ok(())
}

fn discovered() -> TestClient {
    TestClient::new(Trellis::new().discover().build().unwrap())
}

#[tokio::test]
async fn test_discovered_get() {
    let response = discovered().get("/disc-greeter").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "hello from discovery");
}

#[tokio::test]
async fn test_discovered_body_binding() {
    let response = discovered()
        .post("/disc-greeter/echo")
        .json(&json!({ "name": "ana" }))
        .send()
        .await;
    assert_eq!(response.json::<Value>().unwrap()["name"], "ana");
}

#[tokio::test]
async fn test_discovered_empty_return() {
    let response = discovered().delete("/disc-tasks/4").send().await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_discovery_is_opt_in() {
    let client = TestClient::new(Trellis::new().declare(declare_explicit).build().unwrap());
    assert_eq!(client.get("/disc-greeter").send().await.status(), StatusCode::NOT_FOUND);
    assert_eq!(client.get("/disc-explicit").send().await.text(), "explicit");
}

#[tokio::test]
async fn test_discovery_combines_with_explicit_declarations() {
    let client = TestClient::new(
        Trellis::new()
            .discover()
            .declare(declare_explicit)
            .build()
            .unwrap(),
    );
    assert_eq!(client.get("/disc-explicit").send().await.text(), "explicit");
    assert_eq!(client.get("/disc-greeter").send().await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_discovered_child_inherits_discovered_parent() {
    let response = discovered().get("/disc-reports/status").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().unwrap()["visits"], 1);
}

#[test]
fn test_registry_discover_collects_every_submission() {
    let mut registry = Registry::new();
    registry.discover().unwrap();

    assert!(registry.class_of::<DiscoveredGreeter>().is_some());
    assert!(registry.class_of::<DiscoveredTasks>().is_some());
    assert!(registry.class_of::<ExplicitOnly>().is_none());
    assert_eq!(
        registry.paths().unwrap(),
        vec![
            "/disc-greeter".to_string(),
            "/disc-greeter/echo".to_string(),
            "/disc-reports/status".to_string(),
            "/disc-tasks/:id".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_discovered_routes_are_listed() {
    let client = TestClient::new(
        Trellis::new()
            .discover()
            .with_introspection(true)
            .build()
            .unwrap(),
    );
    let routes: Vec<Value> = client.get("/__trellis/routes").send().await.json().unwrap();
    let services: Vec<&str> = routes
        .iter()
        .filter_map(|route| route["service"].as_str())
        .collect();
    assert!(services.contains(&"DiscoveredGreeter"));
    assert!(services.contains(&"DiscoveredTasks"));
}
