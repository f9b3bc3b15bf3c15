//! Local proxy process lifecycle.
//!
//! The supervisor owns the spawned proxy process and its generated config
//! file. Config lives in a temp file that exists only while the supervisor
//! holds it; stopping the process always removes the file.

use crate::error::{ProxyError, Result};
use crate::payload;
use azrelay_cloud::provision::EndpointSource;
use azrelay_config::{RoutingConfig, Settings};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// How long a freshly spawned process gets before we check it is still up.
const STARTUP_SETTLE: Duration = Duration::from_secs(2);

/// How long a terminated process gets to exit before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const BINARY_NAME: &str = "v2ray";

pub struct ProcessSupervisor {
    settings: Settings,
    routing: RoutingConfig,
    endpoints: Arc<dyn EndpointSource>,
    binary: Option<PathBuf>,
    settle: Duration,
    child: Option<Child>,
    config_file: Option<NamedTempFile>,
    forwarders: Vec<JoinHandle<()>>,
}

impl ProcessSupervisor {
    pub fn new(
        settings: Settings,
        routing: RoutingConfig,
        endpoints: Arc<dyn EndpointSource>,
    ) -> Self {
        Self {
            settings,
            routing,
            endpoints,
            binary: None,
            settle: STARTUP_SETTLE,
            child: None,
            config_file: None,
            forwarders: Vec::new(),
        }
    }

    /// Override the proxy binary instead of resolving it from PATH.
    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = Some(binary);
        self
    }

    #[cfg(test)]
    fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Resolve the proxy binary and write the initial config file.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.binary.is_none() {
            self.binary = Some(locate_binary(BINARY_NAME)?);
        }
        self.write_config().await?;
        info!(binary = %self.binary.as_deref().unwrap_or(Path::new(BINARY_NAME)).display(), "proxy client initialized");
        Ok(())
    }

    /// Swap the routing domain list; takes effect on the next (re)start.
    pub fn set_routing(&mut self, routing: RoutingConfig) {
        self.routing = routing;
    }

    /// Fetch the current endpoint and regenerate the config file.
    async fn write_config(&mut self) -> Result<()> {
        let endpoint = self.endpoints.endpoint().await?;
        let bytes = payload::client_config_bytes(&self.settings, &self.routing, &endpoint)?;

        let file = NamedTempFile::new()?;
        std::fs::write(file.path(), &bytes)?;
        debug!(path = %file.path().display(), endpoint = endpoint.address, "wrote proxy config");
        self.config_file = Some(file);
        Ok(())
    }

    /// Spawn the proxy process and verify it survives startup.
    /// A start while the process is already up is logged and ignored.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            let pid = self.child.as_ref().and_then(|c| c.id()).unwrap_or(0);
            warn!(pid, "proxy client is already running, ignoring start");
            return Ok(());
        }

        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => return Err(ProxyError::BinaryNotFound(BINARY_NAME.to_string())),
        };
        let config = self
            .config_file
            .as_ref()
            .map(|f| f.path().to_path_buf())
            .ok_or_else(|| {
                ProxyError::Io(std::io::Error::other("no config file, call initialize first"))
            })?;

        info!(binary = %binary.display(), "starting proxy client");
        let mut child = Command::new(&binary)
            .arg("run")
            .arg("-c")
            .arg(&config)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        sleep(self.settle).await;
        if let Some(status) = child.try_wait()? {
            let output = captured_output(&mut child).await;
            self.config_file = None;
            warn!(%status, "proxy client exited during startup");
            return Err(ProxyError::StartupFailed { output });
        }

        // Keep the pipes drained so the child never blocks on a full buffer;
        // the tasks end on their own at EOF when the process exits.
        if let Some(stdout) = child.stdout.take() {
            self.forwarders.push(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            self.forwarders.push(forward_output(stderr, "stderr"));
        }

        info!(pid = child.id(), "proxy client is running");
        self.child = Some(child);
        Ok(())
    }

    /// Terminate the process, giving it a grace period before a hard kill.
    /// The config file is removed whether or not a process was running.
    pub async fn stop(&mut self) -> Result<()> {
        // Dropping the handle unlinks the temp file.
        self.config_file = None;

        let Some(mut child) = self.child.take() else {
            debug!("proxy client is not running, nothing to stop");
            return Ok(());
        };

        let mut exited = false;
        if let Some(pid) = child.id() {
            info!(pid, "stopping proxy client");
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = %e, "failed to signal proxy client");
            }
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(status) => {
                    debug!(status = %status?, "proxy client exited");
                    exited = true;
                }
                Err(_) => warn!(pid, "proxy client ignored the termination signal, killing it"),
            }
        }
        if !exited {
            child.kill().await?;
            child.wait().await?;
        }

        for handle in self.forwarders.drain(..) {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Stop, regenerate config against the current endpoint, start again.
    /// Stop failures are logged; the restart proceeds regardless.
    pub async fn restart(&mut self) -> Result<()> {
        info!("restarting proxy client");
        if let Err(e) = self.stop().await {
            warn!(error = %e, "stop failed during restart, continuing");
        }
        self.write_config().await?;
        self.start().await
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) | Err(_) => {
                    self.child = None;
                    false
                }
            },
            None => false,
        }
    }
}

fn forward_output<R>(stream: R, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream = name, "{line}");
        }
    })
}

async fn captured_output(child: &mut Child) -> String {
    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let _ = stdout.read_to_string(&mut output).await;
    }
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut output).await;
    }
    if output.trim().is_empty() {
        output = "(no output)".to_string();
    }
    output.trim().to_string()
}

/// Search PATH for the named executable.
fn locate_binary(name: &str) -> Result<PathBuf> {
    let path = std::env::var_os("PATH")
        .ok_or_else(|| ProxyError::BinaryNotFound(name.to_string()))?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ProxyError::BinaryNotFound(name.to_string()))
}
