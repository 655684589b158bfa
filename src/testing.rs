//! In-memory transport doubles for exercising the connection core without a
//! network.
//!
//! `MockConnector` hands out fresh `MockTransport`s and records every attempt;
//! failures and delays can be scripted per call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use crate::error::{ConnectionError, DockError, Result};
use crate::ssh::descriptor::ServerDescriptor;
use crate::ssh::pty::PtySize;
use crate::ssh::sftp::{EntryKind, RemoteEntry};
use crate::ssh::transport::{Connector, FileChannel, ShellStream, Transport};

const DEFAULT_OUTPUT: &[u8] = b"ok\n";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Scriptable connector.
#[derive(Default)]
pub struct MockConnector {
    connects: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
    next_failures: Mutex<VecDeque<DockError>>,
    always_fail: Mutex<Option<ConnectionError>>,
    delay: Mutex<Option<Duration>>,
    doomed_execs: Mutex<VecDeque<DockError>>,
    responses: Mutex<HashMap<String, Vec<u8>>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next connect attempt with `error`.
    pub fn fail_next_connect(&self, error: DockError) {
        lock(&self.next_failures).push_back(error);
    }

    /// Fail every connect attempt until cleared with `None`.
    pub fn fail_all_connects(&self, error: Option<ConnectionError>) {
        *lock(&self.always_fail) = error;
    }

    /// Make each connect attempt take `delay` before completing.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Fail the first exec on the next transport opened with `error`.
    pub fn fail_next_transport_exec(&self, error: DockError) {
        lock(&self.doomed_execs).push_back(error);
    }

    /// Canned output for `command` on every transport opened from now on.
    pub fn respond(&self, command: &str, output: impl Into<Vec<u8>>) {
        lock(&self.responses).insert(command.to_string(), output.into());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *lock(&self.last_timeout)
    }

    /// Every transport opened so far, oldest first.
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        lock(&self.transports).clone()
    }

    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        lock(&self.transports).last().cloned()
    }

    /// Number of opened transports that have not been closed.
    pub fn live_transports(&self) -> usize {
        lock(&self.transports)
            .iter()
            .filter(|t| !t.is_closed())
            .count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_timeout) = Some(timeout);

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.next_failures).pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        let always = lock(&self.always_fail).clone();
        if let Some(error) = always {
            return Err(error.into());
        }

        let transport = Arc::new(MockTransport::with_responses(
            &descriptor.id,
            lock(&self.responses).clone(),
        ));
        let doomed = lock(&self.doomed_execs).pop_front();
        if let Some(error) = doomed {
            transport.fail_exec(error);
        }
        lock(&self.transports).push(transport.clone());
        Ok(transport)
    }
}

/// Scriptable transport.
pub struct MockTransport {
    server_id: String,
    closed: AtomicBool,
    execs: AtomicUsize,
    closes: AtomicUsize,
    file_opens: AtomicUsize,
    responses: Mutex<HashMap<String, Vec<u8>>>,
    next_exec_failures: Mutex<VecDeque<DockError>>,
    exec_delay: Mutex<Option<Duration>>,
    commands: Mutex<Vec<String>>,
    last_pty: Mutex<Option<PtySize>>,
    shell_remote: Mutex<Option<DuplexStream>>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_responses("mock", HashMap::new()))
    }

    fn with_responses(server_id: &str, responses: HashMap<String, Vec<u8>>) -> Self {
        Self {
            server_id: server_id.to_string(),
            closed: AtomicBool::new(false),
            execs: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            file_opens: AtomicUsize::new(0),
            responses: Mutex::new(responses),
            next_exec_failures: Mutex::new(VecDeque::new()),
            exec_delay: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            last_pty: Mutex::new(None),
            shell_remote: Mutex::new(None),
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn respond(&self, command: &str, output: impl Into<Vec<u8>>) {
        lock(&self.responses).insert(command.to_string(), output.into());
    }

    /// Fail the next exec on this transport with `error`.
    pub fn fail_exec(&self, error: DockError) {
        lock(&self.next_exec_failures).push_back(error);
    }

    pub fn set_exec_delay(&self, delay: Option<Duration>) {
        *lock(&self.exec_delay) = delay;
    }

    /// Simulate the remote end dropping the connection.
    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn exec_count(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn file_open_count(&self) -> usize {
        self.file_opens.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn last_pty(&self) -> Option<PtySize> {
        lock(&self.last_pty).clone()
    }

    /// The remote half of the most recently opened shell.
    pub fn take_shell_remote(&self) -> Option<DuplexStream> {
        lock(&self.shell_remote).take()
    }

    pub fn put_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        lock(&self.files).insert(path.to_string(), data.into());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        lock(&self.commands).push(command.to_string());

        let delay = *lock(&self.exec_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = lock(&self.next_exec_failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        if self.is_closed() {
            return Err(ConnectionError::Closed("mock transport is closed".into()).into());
        }

        Ok(lock(&self.responses)
            .get(command)
            .cloned()
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_vec()))
    }

    async fn open_shell(&self, pty: &PtySize) -> Result<ShellStream> {
        if self.is_closed() {
            return Err(ConnectionError::Closed("mock transport is closed".into()).into());
        }
        let (local, remote) = tokio::io::duplex(4096);
        *lock(&self.last_pty) = Some(pty.clone());
        *lock(&self.shell_remote) = Some(remote);
        Ok(ShellStream::new(local))
    }

    async fn open_files(&self) -> Result<Box<dyn FileChannel>> {
        if self.is_closed() {
            return Err(ConnectionError::Closed("mock transport is closed".into()).into());
        }
        self.file_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockFiles {
            files: self.files.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Flat in-memory file store keyed by absolute path.
struct MockFiles {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl FileChannel for MockFiles {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut entries: Vec<RemoteEntry> = lock(&self.files)
            .iter()
            .filter_map(|(file_path, data)| {
                let name = file_path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                let mut entry = RemoteEntry::new(name, file_path.clone(), EntryKind::File);
                entry.size = data.len() as u64;
                Some(entry)
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| DockError::Sftp(format!("No such file: {}", path)))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        lock(&self.files).insert(path.to_string(), data.to_vec());
        Ok(())
    }
}
