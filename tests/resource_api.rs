use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use resource_server::config::Configuration;
use resource_server::module::{AppModule, RepoModule, ResourceModule};
use resource_server::repository::{Document, MemoryRepository, Repository, StoreError, Update};
use resource_server::resources::WidgetModule;
use resource_server::validation::Validator;
use resource_server::build_router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

fn router_with(modules: Vec<Box<dyn AppModule>>, config: Configuration) -> Router {
    build_router(modules, Arc::new(config)).unwrap().router
}

fn module<M: ResourceModule>(resource: M, repo: Arc<dyn Repository>) -> Box<dyn AppModule> {
    Box::new(RepoModule::new(resource, repo))
}

fn widgets(repo: Arc<MemoryRepository>) -> Router {
    router_with(vec![module(WidgetModule, repo)], Configuration::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response: Response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn object(v: Value) -> Document {
    match v {
        Value::Object(m) => m,
        _ => panic!("not an object"),
    }
}

#[tokio::test]
async fn widgets_round_trip_scenario() {
    let app = widgets(Arc::new(MemoryRepository::new("widgets")));

    let (status, created) = send(&app, "POST", "/widgets", Some(json!({"name": "gear", "color": "red"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["_id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "gear");

    let (status, all) = send(&app, "GET", "/widgets/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let item = format!("/widgets/{}", id);
    let (status, merged) = send(&app, "POST", &item, Some(json!({"color": "blue"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged, json!({"_id": id, "name": "gear", "color": "blue"}));

    let (status, replaced) = send(&app, "PUT", &item, Some(json!({"name": "cog"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced, json!({"_id": id, "name": "cog"}));

    let (status, deleted) = send(&app, "DELETE", &item, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["name"], "cog");

    let (status, body) = send(&app, "GET", &item, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["path"], item);
}

#[tokio::test]
async fn merge_update_validates_the_merged_document() {
    let repo = Arc::new(MemoryRepository::new("widgets"));
    let app = widgets(repo.clone());
    repo.save(object(json!({"_id": "ok", "name": "gear"}))).await.unwrap();
    repo.save(object(json!({"_id": "broken", "color": "red"}))).await.unwrap();

    // A patch that nulls a required field fails even though the patch alone is not checked.
    let (status, body) = send(&app, "POST", "/widgets/ok", Some(json!({"name": null}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["messageKey"], "notNull");
    assert_eq!(repo.get("ok").await.unwrap().unwrap()["name"], "gear");

    // A stored document missing a required field is accepted once the patch supplies it.
    let (status, body) = send(&app, "POST", "/widgets/broken", Some(json!({"name": "fixed"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"_id": "broken", "name": "fixed", "color": "red"}));
}

#[tokio::test]
async fn missing_ids_are_404_for_every_item_method() {
    let app = widgets(Arc::new(MemoryRepository::new("widgets")));
    for method in ["GET", "PUT", "POST", "DELETE"] {
        let body = (method == "PUT" || method == "POST").then(|| json!({"name": "x"}));
        let (status, envelope) = send(&app, method, "/widgets/nope", body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", method);
        assert_eq!(envelope["code"], 404);
        assert_eq!(envelope["path"], "/widgets/nope");
    }
}

#[tokio::test]
async fn all_violations_are_reported_together() {
    let app = widgets(Arc::new(MemoryRepository::new("widgets")));
    let long = "x".repeat(40);
    let (status, body) = send(&app, "POST", "/widgets?lang=fr", Some(json!({"name": "  ", "color": long}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["name"], "name");
    assert_eq!(errors[0]["messageKey"], "notBlank");
    assert_eq!(errors[1]["name"], "color");
    assert_eq!(errors[1]["messageKey"], "maxLength");
    assert_eq!(errors[1]["args"], json!(["color", 32]));
    assert_eq!(errors[1]["locale"], "fr");
}

#[tokio::test]
async fn replace_is_idempotent() {
    let repo = Arc::new(MemoryRepository::new("widgets"));
    let app = widgets(repo.clone());
    repo.save(object(json!({"_id": "w", "name": "gear", "color": "red"}))).await.unwrap();

    let doc = json!({"_id": "ignored", "name": "cog", "size": 3});
    let (first_status, first) = send(&app, "PUT", "/widgets/w", Some(doc.clone())).await;
    let (second_status, second) = send(&app, "PUT", "/widgets/w", Some(doc)).await;
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first, json!({"_id": "w", "name": "cog", "size": 3}));
    assert_eq!(repo.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_bodies_are_400() {
    let app = widgets(Arc::new(MemoryRepository::new("widgets")));
    let (status, _) = send(&app, "POST", "/widgets", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(&app, "POST", "/widgets", Some(json!({"name": 5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
}

#[tokio::test]
async fn oversized_body_is_413() {
    let config = Configuration::resolve(json!({"body_limit": 16}));
    let app = router_with(
        vec![module(WidgetModule, Arc::new(MemoryRepository::new("widgets")))],
        config,
    );
    let payload = json!({"name": "x".repeat(64)}).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/widgets")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, payload.len())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn concurrent_merges_on_one_id_all_succeed() {
    let repo = Arc::new(MemoryRepository::new("widgets"));
    let app = widgets(repo.clone());
    repo.save(object(json!({"_id": "w", "name": "gear"}))).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            send(&app, "POST", "/widgets/w", Some(json!({"color": format!("c{}", i)}))).await.0
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    let stored = repo.get("w").await.unwrap().unwrap();
    assert_eq!(stored["name"], "gear");
    assert!(stored["color"].as_str().unwrap().starts_with('c'));
}

/// Delegates to memory and counts every call.
struct Counting {
    inner: MemoryRepository,
    calls: AtomicUsize,
}

impl Counting {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepository::new(name),
            calls: AtomicUsize::new(0),
        })
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for Counting {
    fn collection_name(&self) -> &str {
        self.inner.collection_name()
    }

    async fn save(&self, doc: Document) -> Result<Document, StoreError> {
        self.hit();
        self.inner.save(doc).await
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        self.hit();
        self.inner.list().await
    }

    async fn find(&self, query: &Document) -> Result<Vec<Document>, StoreError> {
        self.hit();
        self.inner.find(query).await
    }

    async fn find_one(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.find_one(query).await
    }

    async fn update_by_id(&self, id: &str, update: &Update) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.update_by_id(id, update).await
    }

    async fn update(&self, query: &Document, update: &Update) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.update(query, update).await
    }

    async fn replace_by_id(&self, id: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.replace_by_id(id, doc).await
    }

    async fn replace(&self, query: &Document, doc: Document) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.replace(query, doc).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.delete_by_id(id).await
    }

    async fn delete(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.delete(query).await
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        self.hit();
        self.inner.delete_all().await
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        self.hit();
        self.inner.drop_collection().await
    }
}

#[derive(Deserialize)]
struct Note {
    #[allow(dead_code)]
    text: Option<String>,
}

struct ReadOnlyNotes;

impl ResourceModule for ReadOnlyNotes {
    type Doc = Note;

    fn name(&self) -> &str {
        "notes"
    }

    fn save_validator(&self) -> Validator<Note> {
        Validator::builder()
            .constraint("text", |n: &Note| n.text.as_deref(), |c| c.not_null())
            .build()
    }

    fn create_enabled(&self) -> bool {
        false
    }

    fn update_enabled(&self) -> bool {
        false
    }

    fn delete_enabled(&self) -> bool {
        false
    }
}

struct Hidden;

impl ResourceModule for Hidden {
    type Doc = Note;

    fn name(&self) -> &str {
        "hidden"
    }

    fn get_enabled(&self) -> bool {
        false
    }

    fn create_enabled(&self) -> bool {
        false
    }

    fn update_enabled(&self) -> bool {
        false
    }

    fn delete_enabled(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn disabled_operations_never_reach_the_repository() {
    let notes = Counting::new("notes");
    let hidden = Counting::new("hidden");
    let app = router_with(
        vec![
            module(ReadOnlyNotes, notes.clone()),
            module(Hidden, hidden.clone()),
        ],
        Configuration::default(),
    );

    let attempts = [
        ("POST", "/notes", Some(json!({"text": "hi"}))),
        ("PUT", "/notes/1", Some(json!({"text": "hi"}))),
        ("POST", "/notes/1", Some(json!({"text": "hi"}))),
        ("DELETE", "/notes/1", None),
    ];
    for (method, uri, body) in attempts {
        let (status, envelope) = send(&app, method, uri, body).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, uri);
        assert_eq!(envelope["code"], 405);
        assert_eq!(envelope["path"], uri);
    }
    assert_eq!(notes.calls(), 0);

    for uri in ["/hidden", "/hidden/1"] {
        let (status, envelope) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(envelope["code"], 404);
    }
    assert_eq!(hidden.calls(), 0);

    let (status, body) = send(&app, "GET", "/notes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(notes.calls(), 1);
}

#[tokio::test]
async fn body_limit_above_the_extractor_default_is_honoured() {
    let config = Configuration::resolve(json!({"body_limit": 8 * 1024 * 1024}));
    let app = router_with(
        vec![module(WidgetModule, Arc::new(MemoryRepository::new("widgets")))],
        config,
    );
    let payload = json!({"name": "x".repeat(3 * 1024 * 1024)}).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/widgets")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, payload.len())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn percent_encoded_lang_reaches_violations() {
    let app = widgets(Arc::new(MemoryRepository::new("widgets")));
    let (status, body) = send(&app, "POST", "/widgets?lang=fr%2DCA", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["locale"], "fr-CA");
}

#[derive(Deserialize)]
struct Account {
    email: Option<String>,
    confirm: Option<bool>,
}

struct Accounts;

impl ResourceModule for Accounts {
    type Doc = Account;

    fn name(&self) -> &str {
        "accounts"
    }

    fn save_validator(&self) -> Validator<Account> {
        Validator::builder()
            .constraint("email", |a: &Account| a.email.as_deref(), |c| c.not_null())
            .build()
    }

    fn delete_validator(&self) -> Validator<Account> {
        Validator::builder()
            .constraint(
                "confirm",
                |a: &Account| a.confirm.as_ref(),
                |c| c.predicate_nullable("confirmRequired", "\"{0}\" must be true to delete", |v| v == Some(&true)),
            )
            .build()
    }
}

#[tokio::test]
async fn guarded_delete_validates_the_request_body() {
    let repo = Arc::new(MemoryRepository::new("accounts"));
    let app = router_with(vec![module(Accounts, repo.clone())], Configuration::default());
    repo.save(object(json!({"_id": "a1", "email": "a@example.com"}))).await.unwrap();

    // An empty body counts as `{}`.
    let (status, body) = send(&app, "DELETE", "/accounts/a1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["name"], "confirm");
    assert_eq!(body["errors"][0]["messageKey"], "confirmRequired");
    assert!(repo.get("a1").await.unwrap().is_some());

    let (status, _) = send(&app, "DELETE", "/accounts/a1", Some(json!({"confirm": false}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(repo.get("a1").await.unwrap().is_some());

    let (status, deleted) = send(&app, "DELETE", "/accounts/a1", Some(json!({"confirm": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["email"], "a@example.com");
    assert!(repo.get("a1").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_ids_are_404_even_when_the_body_is_invalid() {
    let widgets_repo = Arc::new(MemoryRepository::new("widgets"));
    let accounts_repo = Arc::new(MemoryRepository::new("accounts"));
    let app = router_with(
        vec![module(WidgetModule, widgets_repo), module(Accounts, accounts_repo)],
        Configuration::default(),
    );
    let attempts = [
        ("PUT", "/widgets/nope", Some(json!({"name": ""}))),
        ("POST", "/widgets/nope", Some(json!({"name": null}))),
        ("DELETE", "/accounts/nope", None),
        ("DELETE", "/accounts/nope", Some(json!({"confirm": false}))),
    ];
    for (method, uri, body) in attempts {
        let (status, envelope) = send(&app, method, uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert_eq!(envelope["code"], 404);
    }
}
