//! Test utilities: an in-process script runtime, a catalog on disk, the
//! test app builder, and a cookie-keeping client.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use mortimer::catalog::Catalog;
use mortimer::config::Config;
use mortimer::experiments::store::ManualClock;
use mortimer::script::{
    DynamicFile, ExperimentConfig, ExperimentSession, LoadRequest, Movement, ScriptError,
    ScriptModule, ScriptRuntime, StaticFile,
};
use mortimer::session::middleware::COOKIE_NAME;
use mortimer::{AppState, create_app};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PAGES: [&str; 3] = ["intro", "questions", "outro"];
pub const START_TIME: u64 = 1_700_000_000;
pub const ALICE_TOKEN: &str = "t-alice";
/// Content of a static file larger than one read buffer.
pub const SAMPLES: [u8; 200_000] = [7; 200_000];

/// One recorded `update_with_user_input` call: (session id, page, data).
pub type Update = (String, String, Map<String, Value>);

/// Runtime executing "scripts" in-process. Behavior is picked by the
/// experiment identifier: `broken` fails to load, `faulty_factory` fails
/// to create sessions, `crashy` fails in its start hook.
#[derive(Default)]
pub struct FakeRuntime {
    pub loads: AtomicUsize,
    pub updates: Arc<Mutex<Vec<Update>>>,
    pub closed: Arc<Mutex<Vec<String>>>,
}

impl FakeRuntime {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<Update> {
        self.updates.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRuntime for FakeRuntime {
    async fn load(&self, request: &LoadRequest) -> Result<Arc<dyn ScriptModule>, ScriptError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if request.identifier == "broken" {
            return Err(ScriptError::Import("SyntaxError: invalid syntax".into()));
        }
        Ok(Arc::new(FakeModule {
            identifier: request.identifier.clone(),
            resource_dir: request.resource_dir.clone(),
            updates: self.updates.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeModule {
    identifier: String,
    resource_dir: PathBuf,
    updates: Arc<Mutex<Vec<Update>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ScriptModule for FakeModule {
    async fn create_session(
        &self,
        config: &ExperimentConfig,
        params: &Map<String, Value>,
    ) -> Result<Box<dyn ExperimentSession>, ScriptError> {
        if self.identifier == "faulty_factory" {
            return Err(ScriptError::Execution("generate_experiment exploded".into()));
        }
        Ok(Box::new(FakeSession {
            session_id: config.session_id().unwrap_or_default().to_string(),
            crash_on_start: self.identifier == "crashy",
            config: config.to_value(),
            params: params.clone(),
            page: 0,
            resource_dir: self.resource_dir.clone(),
            updates: self.updates.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeSession {
    session_id: String,
    crash_on_start: bool,
    config: Value,
    params: Map<String, Value>,
    page: usize,
    resource_dir: PathBuf,
    updates: Arc<Mutex<Vec<Update>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ExperimentSession for FakeSession {
    async fn start(&mut self) -> Result<(), ScriptError> {
        if self.crash_on_start {
            return Err(ScriptError::Execution("start hook failed".into()));
        }
        Ok(())
    }

    async fn current_page(&mut self) -> Result<String, ScriptError> {
        Ok(PAGES[self.page].to_string())
    }

    async fn update_with_user_input(&mut self, data: Map<String, Value>) -> Result<(), ScriptError> {
        self.updates.lock().unwrap().push((
            self.session_id.clone(),
            PAGES[self.page].to_string(),
            data,
        ));
        Ok(())
    }

    async fn navigate(&mut self, movement: Movement) -> Result<(), ScriptError> {
        self.page = match movement {
            Movement::Forward => (self.page + 1).min(PAGES.len() - 1),
            Movement::Backward => self.page.saturating_sub(1),
            Movement::Jump { position } => {
                let target = position.first().copied().unwrap_or(0);
                if target >= PAGES.len() {
                    return Err(ScriptError::Execution(format!("no page at {position:?}")));
                }
                target
            }
        };
        Ok(())
    }

    async fn render(&mut self, page_token: &str) -> Result<String, ScriptError> {
        Ok(format!(
            r#"<h1>{page}</h1><p>{sid}</p><form method="post"><input type="hidden" name="page_token" value="{page_token}"></form>"#,
            page = PAGES[self.page],
            sid = self.session_id,
        ))
    }

    async fn static_file(&mut self, identifier: &str) -> Result<StaticFile, ScriptError> {
        match identifier {
            "logo" => Ok(StaticFile {
                path: self.resource_dir.join("logo.txt"),
                content_type: "text/plain".into(),
            }),
            "samples" => Ok(StaticFile {
                path: self.resource_dir.join("samples.bin"),
                content_type: "application/octet-stream".into(),
            }),
            "folder" => Ok(StaticFile {
                path: self.resource_dir.clone(),
                content_type: "text/plain".into(),
            }),
            "vanished" => Ok(StaticFile {
                path: self.resource_dir.join("does-not-exist.png"),
                content_type: "image/png".into(),
            }),
            other => Err(ScriptError::UnknownIdentifier(other.into())),
        }
    }

    async fn dynamic_file(&mut self, identifier: &str) -> Result<DynamicFile, ScriptError> {
        match identifier {
            "results.csv" => Ok(DynamicFile {
                content: format!("session,page\n{},{}\n", self.session_id, PAGES[self.page])
                    .into_bytes(),
                content_type: "text/csv".into(),
            }),
            other => Err(ScriptError::UnknownIdentifier(other.into())),
        }
    }

    async fn call(&mut self, identifier: &str, args: Value) -> Result<Option<Value>, ScriptError> {
        match identifier {
            "echo" => Ok(Some(args)),
            "greeting" => Ok(Some(Value::String("<b>hello</b>".into()))),
            "nothing" => Ok(None),
            "config" => Ok(Some(json!({ "config": self.config, "params": self.params }))),
            "fail" => Err(ScriptError::Execution("callable raised".into())),
            other => Err(ScriptError::UnknownIdentifier(other.into())),
        }
    }

    async fn close(&mut self) {
        self.closed.lock().unwrap().push(self.session_id.clone());
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub runtime: Arc<FakeRuntime>,
    /// Experiment resource directory; removed when the test ends.
    pub dir: TempDir,
}

impl TestApp {
    pub fn browser(&self) -> Browser {
        Browser {
            app: self.app.clone(),
            cookie: None,
        }
    }
}

/// Catalog used by the route tests.
fn catalog_json(dir: &std::path::Path) -> String {
    let path = dir.display().to_string();
    json!({
        "authors": [
            {"name": "alice", "access_token": ALICE_TOKEN, "encryption_key": "k-alice"},
            {"name": "bob", "access_token": "t-bob"}
        ],
        "experiments": [
            {"id": "stroop", "title": "Stroop", "author": "alice", "active": true,
             "path": path, "script_name": "script.py",
             "settings": {"layout": {"theme": "dark"}}},
            {"id": "secret", "title": "Secret", "author": "alice", "active": true,
             "public": false, "password": "pw", "path": path, "script_name": "script.py"},
            {"id": "dormant", "title": "Dormant", "author": "alice", "active": false,
             "path": path, "script_name": "script.py"},
            {"id": "noscript", "title": "No script", "author": "alice", "active": true,
             "path": path},
            {"id": "broken", "title": "Broken", "author": "alice", "active": true,
             "path": path, "script_name": "script.py"},
            {"id": "faulty_factory", "title": "Faulty", "author": "alice", "active": true,
             "path": path, "script_name": "script.py"},
            {"id": "crashy", "title": "Crashy", "author": "alice", "active": true,
             "path": path, "script_name": "script.py"},
            {"id": "unsigned", "title": "Unsigned", "author": "bob", "active": true,
             "path": path, "script_name": "script.py"}
        ]
    })
    .to_string()
}

/// Build a test app over the fake runtime and a manual clock.
pub fn build_test_app() -> TestApp {
    build_test_app_with_config(Config::test_default())
}

pub fn build_test_app_with_config(config: Config) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("script.py"), "# experiment\n").unwrap();
    std::fs::write(dir.path().join("logo.txt"), "LOGO").unwrap();
    std::fs::write(dir.path().join("samples.bin"), SAMPLES).unwrap();

    let catalog = Catalog::from_json(&catalog_json(dir.path())).expect("valid catalog");
    let runtime = Arc::new(FakeRuntime::default());
    let clock = Arc::new(ManualClock::new(START_TIME));
    let state = Arc::new(AppState::with_clock(
        config,
        catalog,
        runtime.clone(),
        clock.clone(),
    ));
    let app = create_app(state.clone());

    TestApp {
        app,
        state,
        clock,
        runtime,
        dir,
    }
}

/// Sends requests through the router, keeping the session cookie like a
/// browser would.
pub struct Browser {
    app: Router,
    pub cookie: Option<String>,
}

impl Browser {
    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let req = Request::builder().uri(uri);
        self.send(req, Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &str) -> Response<Body> {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(req, Body::from(form.to_string())).await
    }

    pub async fn post_json(&mut self, uri: &str, body: &Value) -> Response<Body> {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        self.send(req, Body::from(body.to_string())).await
    }

    pub async fn owner_login(&mut self, author: &str, token: &str) -> Response<Body> {
        let req = Request::builder()
            .method("POST")
            .uri("/owner/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("X-Mortimer-CSRF", "1");
        self.send(req, Body::from(format!("author={author}&token={token}")))
            .await
    }

    pub async fn send(
        &mut self,
        mut req: axum::http::request::Builder,
        body: Body,
    ) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            req = req.header(header::COOKIE, format!("{COOKIE_NAME}={cookie}"));
        }
        let response = self
            .app
            .clone()
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();

        if let Some(value) = session_cookie(&response) {
            self.cookie = (!value.is_empty()).then_some(value);
        }
        response
    }

    /// Fetch the current page and return its HTML and page token.
    pub async fn page(&mut self) -> (String, String) {
        let response = self.get("/experiment").await;
        assert_eq!(response.status(), 200);
        let html = body_string(response).await;
        let token = page_token(&html).expect("page carries a token");
        (html, token)
    }
}

/// Value of the session cookie set by a response, if any.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|s| {
            s.split(';')
                .next()
                .and_then(|c| c.strip_prefix(&format!("{COOKIE_NAME}=")))
                .map(String::from)
        })
}

pub fn page_token(html: &str) -> Option<String> {
    let marker = r#"name="page_token" value=""#;
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    Some(html[start..end].to_string())
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub async fn body_string(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
