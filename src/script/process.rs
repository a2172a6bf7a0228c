//! Runs each experiment script in its own child process.
//!
//! One process is spawned per loaded module and hosts every session of
//! that experiment. Its top-level code therefore runs once, like a module
//! import. Requests and replies travel as JSON lines (see
//! [`protocol`](super::protocol)); every request is bounded by a timeout
//! and a script that misses it is killed, which marks its module dead. The
//! process is also killed when its module is dropped.

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::protocol::{self, Op};
use super::{
    DynamicFile, ExperimentConfig, ExperimentSession, LoadRequest, Movement, ScriptError,
    ScriptModule, ScriptRuntime, StaticFile,
};

/// Environment variable carrying the experiment's resource directory.
pub const RESOURCE_DIR_ENV: &str = "MORTIMER_RESOURCE_DIR";
/// Environment variable carrying the experiment identifier.
pub const EXPERIMENT_ID_ENV: &str = "MORTIMER_EXPERIMENT_ID";

type Pending = Arc<DashMap<u64, oneshot::Sender<Result<Value, ScriptError>>>>;

/// Spawns `<interpreter> <script>` for every module it loads.
pub struct ProcessRuntime {
    interpreter: String,
    call_timeout: Duration,
}

impl ProcessRuntime {
    pub fn new(interpreter: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            call_timeout,
        }
    }
}

#[async_trait]
impl ScriptRuntime for ProcessRuntime {
    async fn load(&self, request: &LoadRequest) -> Result<Arc<dyn ScriptModule>, ScriptError> {
        // The child runs inside the resource directory, so relative paths
        // from the catalog must be resolved against ours first.
        let script_path = absolute(&request.script_path)?;
        let resource_dir = absolute(&request.resource_dir)?;

        let child = Command::new(&self.interpreter)
            .arg(&script_path)
            .current_dir(&resource_dir)
            .env(RESOURCE_DIR_ENV, &resource_dir)
            .env(EXPERIMENT_ID_ENV, &request.identifier)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScriptError::Import(format!("could not spawn {}: {e}", self.interpreter))
            })?;

        let worker = Arc::new(ScriptWorker::attach(
            &request.identifier,
            child,
            self.call_timeout,
        )?);

        // The handshake only succeeds once the script's top-level code has run.
        let hello = json!({
            "identifier": request.identifier,
            "resource_dir": resource_dir,
        });
        worker
            .call(Op::Hello, hello)
            .await
            .map_err(|e| ScriptError::Import(e.to_string()))?;

        info!(exp_id = %request.identifier, interpreter = %self.interpreter, "script process ready");
        Ok(Arc::new(ProcessModule { worker }))
    }
}

/// Connection to one script process.
struct ScriptWorker {
    identifier: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: Pending,
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
    timeout: Duration,
    child: Mutex<Child>,
}

impl ScriptWorker {
    fn attach(identifier: &str, mut child: Child, timeout: Duration) -> Result<Self, ScriptError> {
        let stdin = child.stdin.take().ok_or_else(|| piping_failed("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| piping_failed("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| piping_failed("stderr"))?;

        let (outbound, queue) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_requests(stdin, queue));
        tokio::spawn(read_replies(
            identifier.to_string(),
            stdout,
            pending.clone(),
            alive.clone(),
        ));
        tokio::spawn(forward_stderr(identifier.to_string(), stderr));

        Ok(Self {
            identifier: identifier.to_string(),
            outbound,
            pending,
            alive,
            next_id: AtomicU64::new(1),
            timeout,
            child: Mutex::new(child),
        })
    }

    async fn call(&self, op: Op, payload: Value) -> Result<Value, ScriptError> {
        if !self.is_alive() {
            return Err(ScriptError::ProcessGone);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = protocol::encode(id, op, &payload)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // The reader marks the process dead before it drops waiters.
        if !self.is_alive() || self.outbound.send(line).is_err() {
            self.pending.remove(&id);
            return Err(ScriptError::ProcessGone);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ScriptError::ProcessGone),
            Err(_) => {
                self.pending.remove(&id);
                warn!(exp_id = %self.identifier, ?op, "script call timed out, killing process");
                self.kill().await;
                Err(ScriptError::Timeout(self.timeout))
            }
        }
    }

    /// Mark the process dead and kill it.
    async fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Err(e) = self.child.lock().await.start_kill() {
            debug!(exp_id = %self.identifier, error = %e, "script process already gone");
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send without waiting for the reply.
    fn notify(&self, op: Op, payload: Value) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(line) = protocol::encode(id, op, &payload) {
            let _ = self.outbound.send(line);
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ScriptError> {
    std::path::absolute(path)
        .map_err(|e| ScriptError::Import(format!("bad path {}: {e}", path.display())))
}

fn piping_failed(stream: &str) -> ScriptError {
    ScriptError::Import(format!("script {stream} is not piped"))
}

async fn write_requests(mut stdin: ChildStdin, mut queue: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = queue.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if written.is_err() {
            break;
        }
    }
}

async fn read_replies(identifier: String, stdout: ChildStdout, pending: Pending, alive: Arc<AtomicBool>) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match protocol::decode(&line) {
            Ok(reply) => match pending.remove(&reply.id) {
                Some((_, tx)) => {
                    let _ = tx.send(reply.into_result());
                }
                None => debug!(exp_id = %identifier, id = reply.id, "reply without waiter"),
            },
            Err(e) => warn!(exp_id = %identifier, error = %e, "ignoring malformed script output"),
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with ProcessGone.
    pending.clear();
    warn!(exp_id = %identifier, "script process closed its output");
}

async fn forward_stderr(identifier: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "mortimer::script", exp_id = %identifier, "{line}");
    }
}

struct ProcessModule {
    worker: Arc<ScriptWorker>,
}

#[async_trait]
impl ScriptModule for ProcessModule {
    async fn create_session(
        &self,
        config: &ExperimentConfig,
        params: &serde_json::Map<String, Value>,
    ) -> Result<Box<dyn ExperimentSession>, ScriptError> {
        let session = config
            .session_id()
            .ok_or_else(|| ScriptError::Execution("configuration carries no session id".into()))?
            .to_string();

        self.worker
            .call(
                Op::CreateSession,
                json!({ "session": session, "config": config, "params": params }),
            )
            .await?;

        Ok(Box::new(ProcessSession {
            worker: self.worker.clone(),
            session,
            closed: false,
        }))
    }

    fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

/// Proxy for a session living inside a script process.
struct ProcessSession {
    worker: Arc<ScriptWorker>,
    session: String,
    closed: bool,
}

#[derive(Deserialize)]
struct WireFile {
    content: String,
    content_type: String,
}

impl ProcessSession {
    async fn request(&self, op: Op, mut payload: Value) -> Result<Value, ScriptError> {
        payload["session"] = Value::String(self.session.clone());
        self.worker.call(op, payload).await
    }

    async fn request_string(&self, op: Op, payload: Value) -> Result<String, ScriptError> {
        match self.request(op, payload).await? {
            Value::String(s) => Ok(s),
            other => Err(ScriptError::Protocol(format!("{op:?} expected a string, got {other}"))),
        }
    }
}

#[async_trait]
impl ExperimentSession for ProcessSession {
    async fn start(&mut self) -> Result<(), ScriptError> {
        self.request(Op::Start, json!({})).await.map(|_| ())
    }

    async fn current_page(&mut self) -> Result<String, ScriptError> {
        self.request_string(Op::CurrentPage, json!({})).await
    }

    async fn update_with_user_input(
        &mut self,
        data: serde_json::Map<String, Value>,
    ) -> Result<(), ScriptError> {
        self.request(Op::Update, json!({ "data": data }))
            .await
            .map(|_| ())
    }

    async fn navigate(&mut self, movement: Movement) -> Result<(), ScriptError> {
        let payload =
            serde_json::to_value(&movement).map_err(|e| ScriptError::Protocol(e.to_string()))?;
        self.request(Op::Move, payload).await.map(|_| ())
    }

    async fn render(&mut self, page_token: &str) -> Result<String, ScriptError> {
        self.request_string(Op::Render, json!({ "page_token": page_token }))
            .await
    }

    async fn static_file(&mut self, identifier: &str) -> Result<StaticFile, ScriptError> {
        let value = self
            .request(Op::StaticFile, json!({ "identifier": identifier }))
            .await?;
        serde_json::from_value(value).map_err(|e| ScriptError::Protocol(e.to_string()))
    }

    async fn dynamic_file(&mut self, identifier: &str) -> Result<DynamicFile, ScriptError> {
        let value = self
            .request(Op::DynamicFile, json!({ "identifier": identifier }))
            .await?;
        let wire: WireFile =
            serde_json::from_value(value).map_err(|e| ScriptError::Protocol(e.to_string()))?;
        let content = base64::engine::general_purpose::STANDARD
            .decode(wire.content)
            .map_err(|e| ScriptError::Protocol(format!("dynamic file content: {e}")))?;
        Ok(DynamicFile {
            content,
            content_type: wire.content_type,
        })
    }

    async fn call(&mut self, identifier: &str, args: Value) -> Result<Option<Value>, ScriptError> {
        let value = self
            .request(Op::Call, json!({ "identifier": identifier, "args": args }))
            .await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Err(e) = self.request(Op::Close, json!({})).await {
            debug!(session_id = %self.session, error = %e, "close was not acknowledged");
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        // Evicted sessions are dropped without `close`; release them in the script too.
        if !self.closed {
            self.worker
                .notify(Op::Close, json!({ "session": self.session }));
        }
    }
}
