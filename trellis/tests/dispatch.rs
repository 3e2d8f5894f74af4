//! Dispatch behaviour: inheritance, properties, pre-processors, the next
//! callback, custom factories and uploads.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::StatusCode;
use serde_json::Value;
use trellis::context::ServiceContext;
use trellis::metadata::{ServiceClass, ServiceInstance};
use trellis::prelude::*;
use trellis::returns::ServiceReturn as Ret;
use trellis::testing::{MultipartForm, TestClient};

fn build(app: Trellis) -> TestClient {
    TestClient::new(app.build().unwrap())
}

// ── Inheritance ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Resource {
    tenant: Option<String>,
}

#[derive(Default)]
struct Users {
    base: Resource,
}

fn resource(users: &mut Users) -> &mut Resource {
    &mut users.base
}

fn declare_resource(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut base = registry.declare::<Resource>();
    base.abstract_service()?;
    base.accept_language(&["en"])?;
    base.property("tenant", ParamBinding::header("x-tenant"), |resource: &mut Resource, arg| {
        resource.tenant = arg.as_value().as_str().map(str::to_string);
        Ok(())
    })?;
    base.method("list")
        .get("")?
        .handler(|resource: &mut Resource, _| {
            Ok(json!({ "tenant": resource.tenant, "items": [] }))
        })?;
    Ok(())
}

fn declare_users(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut users = registry.service::<Users>();
    users.extends::<Resource>(resource)?;
    users.path("/users")?;
    users
        .method("get")
        .get("/:id")?
        .param(0, ParamBinding::path("id"))?
        .handler(|users: &mut Users, args| {
            Ok(json!({ "id": args.str(0), "tenant": users.base.tenant }))
        })?;
    Ok(())
}

#[tokio::test]
async fn test_child_serves_inherited_methods() {
    let client = build(Trellis::new().declare(declare_users).declare(declare_resource));
    let response = client
        .get("/users")
        .header("x-tenant", "acme")
        .send()
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().unwrap()["tenant"], "acme");
    assert_eq!(response.header("content-language"), Some("en"));
}

#[tokio::test]
async fn test_inherited_properties_reach_child_methods() {
    let client = build(Trellis::new().declare(declare_resource).declare(declare_users));
    let body: Value = client
        .get("/users/7")
        .header("x-tenant", "acme")
        .send()
        .await
        .json()
        .unwrap();

    assert_eq!(body["id"], "7");
    assert_eq!(body["tenant"], "acme");
}

#[test]
fn test_abstract_parent_is_not_routed() {
    let mut registry = Registry::new();
    declare_resource(&mut registry).unwrap();
    declare_users(&mut registry).unwrap();
    assert_eq!(
        registry.paths().unwrap(),
        vec!["/users".to_string(), "/users/:id".to_string()]
    );

    let sealed = registry.seal().unwrap();
    let parent = sealed.class(TypeId::of::<Resource>()).unwrap();
    assert!(parent.is_abstract);
    assert!(parent.method("get").is_none());
}

#[test]
fn test_routable_parent_collides_with_child() {
    #[derive(Default)]
    struct Parent;
    #[derive(Default)]
    struct Child {
        parent: Parent,
    }

    fn parent_of(child: &mut Child) -> &mut Parent {
        &mut child.parent
    }

    let mut registry = Registry::new();
    registry
        .service::<Parent>()
        .method("items")
        .get("/items")
        .unwrap()
        .handler(|_, _| Ok("parent"))
        .unwrap();
    registry.service::<Child>().extends::<Parent>(parent_of).unwrap();

    assert!(matches!(
        registry.seal(),
        Err(DeclarationError::DuplicatePath { .. })
    ));
}

#[derive(Default)]
struct Counted;

#[derive(Default)]
struct Alpha {
    base: Counted,
}

#[derive(Default)]
struct Beta {
    base: Counted,
}

fn alpha_base(alpha: &mut Alpha) -> &mut Counted {
    &mut alpha.base
}

fn beta_base(beta: &mut Beta) -> &mut Counted {
    &mut beta.base
}

fn declare_counted(registry: &mut Registry, runs: Arc<AtomicUsize>) -> Result<(), DeclarationError> {
    let mut base = registry.service::<Counted>();
    base.abstract_service()?;
    base.method("ping")
        .get("/ping")?
        .pre_processor(move |_: &mut HttpRequest| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?
        .handler(|_, _| Ok("pong"))?;
    Ok(())
}

fn declare_alpha(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut alpha = registry.service::<Alpha>();
    alpha.path("/alpha")?;
    alpha.extends::<Counted>(alpha_base)?;
    Ok(())
}

fn declare_beta(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut beta = registry.service::<Beta>();
    beta.extends::<Counted>(beta_base)?;
    beta.path("/beta")?;
    Ok(())
}

async fn assert_one_run_per_request(client: &TestClient, runs: &AtomicUsize) {
    for path in ["/alpha/ping", "/beta/ping"] {
        let before = runs.load(Ordering::SeqCst);
        let response = client.get(path).send().await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert_eq!(response.text(), "pong");
        assert_eq!(runs.load(Ordering::SeqCst) - before, 1, "{}", path);
    }
}

#[tokio::test]
async fn test_shared_parent_pre_processor_runs_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let client = build(
        Trellis::new()
            .declare(move |registry| declare_counted(registry, counter))
            .declare(declare_alpha)
            .declare(declare_beta),
    );
    assert_one_run_per_request(&client, &runs).await;
}

#[tokio::test]
async fn test_children_declared_before_parent() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let client = build(
        Trellis::new()
            .declare(declare_beta)
            .declare(declare_alpha)
            .declare(move |registry| declare_counted(registry, counter)),
    );
    assert_one_run_per_request(&client, &runs).await;
}

#[test]
fn test_declaration_order_does_not_change_composition() {
    let runs = Arc::new(AtomicUsize::new(0));

    let mut parent_first = Registry::new();
    declare_counted(&mut parent_first, runs.clone()).unwrap();
    declare_alpha(&mut parent_first).unwrap();
    declare_beta(&mut parent_first).unwrap();

    let mut parent_last = Registry::new();
    declare_beta(&mut parent_last).unwrap();
    declare_alpha(&mut parent_last).unwrap();
    declare_counted(&mut parent_last, runs).unwrap();

    let expected = vec!["/alpha/ping".to_string(), "/beta/ping".to_string()];
    assert_eq!(parent_first.paths().unwrap(), expected);
    assert_eq!(parent_last.paths().unwrap(), expected);

    for registry in [parent_first, parent_last] {
        let sealed = registry.seal().unwrap();
        for type_id in [TypeId::of::<Alpha>(), TypeId::of::<Beta>()] {
            let class = sealed.class(type_id).unwrap();
            assert_eq!(class.methods.len(), 1);
            assert_eq!(class.method("ping").unwrap().pre_processors.len(), 1);
        }
    }
}

// ── Properties and context ─────────────────────────────────────────────────

#[derive(Default)]
struct ContextService {
    context: Option<ServiceContext>,
    language: Option<String>,
}

fn declare_context(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut service = registry.service::<ContextService>();
    service.path("/context")?;
    service.accept_language(&["en", "de"])?;
    service.property("context", ParamBinding::context(), |svc: &mut ContextService, arg| {
        if let Arg::Context(context) = arg {
            svc.context = Some(context);
        }
        Ok(())
    })?;
    service.property("language", ParamBinding::language(), |svc: &mut ContextService, arg| {
        svc.language = arg.as_value().as_str().map(str::to_string);
        Ok(())
    })?;
    service
        .method("show")
        .get("")?
        .handler(|svc: &mut ContextService, _| {
            let path = svc
                .context
                .as_ref()
                .map(|ctx| ctx.request.path().to_string());
            Ok(json!({ "path": path, "language": svc.language }))
        })?;
    Ok(())
}

#[tokio::test]
async fn test_context_properties_are_assigned() {
    let client = build(Trellis::new().declare(declare_context));
    let body: Value = client
        .get("/context")
        .header("accept-language", "de")
        .send()
        .await
        .json()
        .unwrap();

    assert_eq!(body["path"], "/context");
    assert_eq!(body["language"], "de");
}

// ── Pre-processors and the next callback ───────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Trail(Vec<&'static str>);

fn mark(request: &mut HttpRequest, step: &'static str) {
    let mut trail = request.extensions.remove::<Trail>().unwrap_or_default();
    trail.0.push(step);
    request.extensions.insert(trail);
}

#[derive(Default)]
struct Pipeline;

fn declare_pipeline(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut pipeline = registry.service::<Pipeline>();
    pipeline.path("/pipeline")?;
    pipeline.pre_processor(|request: &mut HttpRequest| {
        mark(request, "service");
        Ok(())
    })?;

    pipeline
        .method("trail")
        .get("")?
        .pre_processor(|request: &mut HttpRequest| {
            mark(request, "method");
            Ok(())
        })?
        .param(0, ParamBinding::request())?
        .handler(|_, args| {
            let trail = args
                .request(0)
                .and_then(|request| request.extensions.get::<Trail>())
                .map(|trail| trail.0.join(","))
                .unwrap_or_default();
            Ok(trail)
        })?;

    pipeline
        .method("blocked")
        .get("/blocked")?
        .pre_processor(|request: &mut HttpRequest| {
            if request.header("x-allow").is_none() {
                return Err(Error::forbidden("blocked by pre-processor"));
            }
            Ok(())
        })?
        .handler(|_, _| Ok("through"))?;

    pipeline
        .method("fail")
        .get("/fail")?
        .param(0, ParamBinding::next())?
        .handler(|_, args| {
            if let Some(next) = args.next(0) {
                next.fail(Error::new(409, "CONFLICT", "rejected through next"));
            }
            Ok(Ret::no_response())
        })?;
    Ok(())
}

#[tokio::test]
async fn test_pre_processors_run_service_first() {
    let client = build(Trellis::new().declare(declare_pipeline));
    let response = client.get("/pipeline").send().await;
    assert_eq!(response.text(), "service,method");
}

#[tokio::test]
async fn test_pre_processor_error_aborts_request() {
    let client = build(Trellis::new().declare(declare_pipeline));

    let response = client.get("/pipeline/blocked").send().await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get("/pipeline/blocked")
        .header("x-allow", "1")
        .send()
        .await;
    assert_eq!(response.text(), "through");
}

#[tokio::test]
async fn test_next_failure_reaches_error_renderer() {
    let client = build(Trellis::new().declare(declare_pipeline));
    let response = client.get("/pipeline/fail").send().await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>().unwrap()["error"]["message"],
        "rejected through next"
    );
}

// ── Host router integration ────────────────────────────────────────────────

struct Audit(Arc<AtomicUsize>);

impl trellis::http::Middleware for Audit {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut trellis::http::Exchange,
        next: trellis::http::Next<'a>,
    ) -> trellis::http::BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(exchange).await
        })
    }
}

#[tokio::test]
async fn test_later_middlewares_run_unless_suppressed() {
    #[derive(Default)]
    struct Ping;

    let seen = Arc::new(AtomicUsize::new(0));
    let declare = |registry: &mut Registry| -> Result<(), DeclarationError> {
        let mut ping = registry.service::<Ping>();
        ping.path("/ping")?;
        ping.method("open").get("/open")?.handler(|_, _| Ok("pong"))?;
        ping.method("closed")
            .get("/closed")?
            .ignore_next_middlewares()?
            .handler(|_, _| Ok("pong"))?;
        Ok(())
    };

    let mut router = Trellis::new().declare(declare).build().unwrap();
    router.add_all("/ping/:which", vec![Arc::new(Audit(seen.clone()))]);
    let client = TestClient::new(router);

    assert_eq!(client.get("/ping/open").send().await.text(), "pong");
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert_eq!(client.get("/ping/closed").send().await.text(), "pong");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

// ── Custom factory ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Counter {
    greeting: String,
}

struct GreetingFactory {
    created: Arc<AtomicUsize>,
}

impl ServiceFactory for GreetingFactory {
    fn create(&self, service: &ServiceClass, context: &ServiceContext) -> Result<ServiceInstance> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if service.type_id() == TypeId::of::<Counter>() {
            return Ok(Box::new(Counter {
                greeting: "from factory".to_string(),
            }));
        }
        DefaultServiceFactory.create(service, context)
    }
}

#[tokio::test]
async fn test_custom_factory_builds_each_request() {
    let created = Arc::new(AtomicUsize::new(0));
    let app = Trellis::new()
        .declare(|registry| {
            registry
                .declare::<Counter>()
                .method("hello")
                .get("/counter")?
                .handler(|counter: &mut Counter, _| Ok(counter.greeting.clone()))?;
            Ok(())
        })
        .factory(GreetingFactory {
            created: created.clone(),
        });
    let client = build(app);

    assert_eq!(client.get("/counter").send().await.text(), "from factory");
    assert_eq!(client.get("/counter").send().await.text(), "from factory");
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_constructor_is_internal_error() {
    let app = Trellis::new().declare(|registry| {
        registry
            .declare::<Counter>()
            .method("hello")
            .get("/counter")?
            .handler(|counter: &mut Counter, _| Ok(counter.greeting.clone()))?;
        Ok(())
    });
    let response = build(app).get("/counter").send().await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── Uploads and downloads ──────────────────────────────────────────────────

#[derive(Default)]
struct Documents;

fn declare_documents(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut documents = registry.service::<Documents>();
    documents.path("/documents")?;

    documents
        .method("upload")
        .post("")?
        .param(0, ParamBinding::file("doc"))?
        .param(1, ParamBinding::form("title"))?
        .handler(|_, args| {
            let file = args
                .file(0)
                .ok_or_else(|| Error::bad_request("doc is required"))?;
            Ok(json!({
                "title": args.value(1),
                "file_name": file.file_name,
                "size": file.data.len(),
            }))
        })?;

    documents
        .method("batch")
        .post("/batch")?
        .param(0, ParamBinding::files("docs"))?
        .handler(|_, args| Ok(json!({ "count": args.files(0).len() })))?;
    Ok(())
}

#[tokio::test]
async fn test_single_file_upload() {
    let client = build(Trellis::new().declare(declare_documents));
    let form = MultipartForm::new()
        .text("title", "contract")
        .file("doc", "contract.txt", "text/plain", &b"signed"[..]);
    let response = client.post("/documents").multipart(form).send().await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().unwrap();
    assert_eq!(body["title"], "contract");
    assert_eq!(body["file_name"], "contract.txt");
    assert_eq!(body["size"], 6);
}

#[tokio::test]
async fn test_multiple_file_upload() {
    let client = build(Trellis::new().declare(declare_documents));
    let form = MultipartForm::new()
        .file("docs", "a.txt", "text/plain", &b"a"[..])
        .file("docs", "b.txt", "text/plain", &b"b"[..]);
    let response = client.post("/documents/batch").multipart(form).send().await;
    assert_eq!(response.json::<Value>().unwrap()["count"], 2);
}

#[tokio::test]
async fn test_second_file_on_single_field_is_rejected() {
    let client = build(Trellis::new().declare(declare_documents));
    let form = MultipartForm::new()
        .file("doc", "a.txt", "text/plain", &b"a"[..])
        .file("doc", "b.txt", "text/plain", &b"b"[..]);
    let response = client.post("/documents").multipart(form).send().await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_download() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    std::fs::write(&path, "a,b\n1,2\n").unwrap();

    let app = Trellis::new().declare(move |registry| {
        registry
            .service::<Documents>()
            .method("report")
            .get("/report")?
            .handler(move |_, _| Ok(DownloadResource::new(path.clone(), "monthly.csv")))?;
        Ok(())
    });
    let response = build(app).get("/report").send().await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"monthly.csv\"")
    );
    assert_eq!(response.text(), "a,b\n1,2\n");
}
