//! A small people directory backed by an in-memory store.
//!
//! Run with: `JWT_SECRET=your-secret-key cargo run --example people`
//!
//! Endpoints:
//! - GET /people - list, with `start` and `size` query parameters
//! - GET /people/:id - one person, as JSON
//! - POST /people - create (requires the `editor` role)
//! - POST /login - a token for the given user name, with the `editor` role
//! - GET /__trellis/routes - the registered routes

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use trellis::context::ServiceContext;
use trellis::metadata::{ServiceClass, ServiceInstance};
use trellis::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Person {
    #[serde(default)]
    id: u64,
    name: String,
}

#[derive(Default)]
struct Store {
    people: DashMap<u64, Person>,
    next_id: AtomicU64,
}

struct PeopleService {
    store: Arc<Store>,
}

impl PeopleService {
    fn get(&self, id: u64) -> Result<Person> {
        self.store
            .people
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::not_found(format!("person {} not found", id)))
    }

    fn list(&self, start: usize, size: usize) -> Vec<Person> {
        let mut people: Vec<Person> = self.store.people.iter().map(|e| e.clone()).collect();
        people.sort_by_key(|p| p.id);
        people.into_iter().skip(start).take(size).collect()
    }

    fn create(&self, mut person: Person) -> Result<ReferencedResource> {
        if person.name.trim().is_empty() {
            return Err(Error::bad_request("name is required"));
        }
        person.id = self.store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let location = format!("/people/{}", person.id);
        self.store.people.insert(person.id, person);
        Ok(ReferencedResource::created(location))
    }
}

fn declare_people(registry: &mut Registry) -> Result<(), DeclarationError> {
    let mut people = registry.declare::<PeopleService>();
    people.path("/people")?;

    people
        .method("get")
        .get(":id")?
        .accept(&["application/json"])?
        .param(0, ParamBinding::path("id").typed(ParamType::Number))?
        .handler(|svc: &mut PeopleService, args| {
            let id = args.f64(0).ok_or_else(|| Error::bad_request("id must be a number"))?;
            ServiceReturn::json(&svc.get(id as u64)?)
        })?;

    people
        .method("list")
        .get("")?
        .param(0, ParamBinding::query("start").typed(ParamType::Number))?
        .param(1, ParamBinding::query("size").typed(ParamType::Number))?
        .handler(|svc: &mut PeopleService, args| {
            let start = args.f64(0).unwrap_or(0.0) as usize;
            let size = args.f64(1).unwrap_or(10.0) as usize;
            ServiceReturn::json(&svc.list(start, size))
        })?;

    people
        .method("create")
        .post("")?
        .security(&["editor"])?
        .param(0, ParamBinding::body())?
        .handler(|svc: &mut PeopleService, args| svc.create(args.json(0)?))?;
    Ok(())
}

struct LoginService {
    auth: JwtAuthenticator,
}

fn declare_login(registry: &mut Registry) -> Result<(), DeclarationError> {
    registry
        .declare::<LoginService>()
        .method("login")
        .post("/login")?
        .param(0, ParamBinding::form("user"))?
        .handler(|svc: &mut LoginService, args| {
            let user = args
                .str(0)
                .filter(|user| !user.is_empty())
                .ok_or_else(|| Error::bad_request("user is required"))?;
            Ok(json!({ "token": svc.auth.create_token(user, &["editor"])? }))
        })?;
    Ok(())
}

/// Hands every service the shared store and authenticator.
struct AppFactory {
    store: Arc<Store>,
    auth: JwtAuthenticator,
}

impl ServiceFactory for AppFactory {
    fn create(&self, service: &ServiceClass, _context: &ServiceContext) -> Result<ServiceInstance> {
        let type_id = service.type_id();
        if type_id == TypeId::of::<PeopleService>() {
            Ok(Box::new(PeopleService {
                store: self.store.clone(),
            }))
        } else if type_id == TypeId::of::<LoginService>() {
            Ok(Box::new(LoginService {
                auth: self.auth.clone(),
            }))
        } else {
            Err(Error::internal(format!("no constructor for {}", service.name())))
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    load_dotenv();
    TracingConfig::new().init();

    let auth = JwtAuthenticator::from_env().map_err(std::io::Error::other)?;
    let server = ServerConfig::from_env().map_err(std::io::Error::other)?;
    let factory = AppFactory {
        store: Arc::new(Store::default()),
        auth: auth.clone(),
    };

    Trellis::new()
        .declare(declare_people)
        .declare(declare_login)
        .factory(factory)
        .authenticator(auth)
        .server_config(server)
        .with_introspection(true)
        .run()
        .await
}
