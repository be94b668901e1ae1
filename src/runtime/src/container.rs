//! Container runtime adapter.
//!
//! The export pipeline only needs three operations from the local container
//! engine: look up a stored image's architecture, pull for a platform, and
//! stream an image archive. [`DockerCli`] drives a Docker compatible binary
//! (`docker`, `podman`, `nerdctl`) as a subprocess.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use a3s_offline_core::error::{Result, SyncError};

/// Read buffer for streaming `save` output.
const SAVE_CHUNK_SIZE: usize = 64 * 1024;

/// Operations the export pipeline needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Architecture of the locally stored image, `None` if it is not present.
    async fn image_architecture(&self, reference: &str) -> Result<Option<String>>;

    /// Pull `reference` for `linux/<arch>`, failing after `timeout`.
    async fn pull(&self, reference: &str, arch: &str, timeout: Duration) -> Result<()>;

    /// Stream the `linux/<arch>` variant of the image archive into `sink`.
    /// Returns bytes written.
    async fn save(&self, reference: &str, arch: &str, sink: &mut (dyn Write + Send)) -> Result<u64>;
}

/// Docker compatible CLI runtime.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

/// Last non-empty line of a process' stderr, for error messages.
fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// `Architecture` of the first element of `inspect` output.
pub(crate) fn parse_inspect_architecture(output: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(output).ok()?;
    value
        .as_array()?
        .first()?
        .get("Architecture")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_architecture(&self, reference: &str) -> Result<Option<String>> {
        let output = self
            .command()
            .args(["inspect", reference])
            .output()
            .await
            .map_err(|e| SyncError::Other(format!("Failed to run {} inspect: {}", self.binary, e)))?;

        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_inspect_architecture(&output.stdout))
    }

    async fn pull(&self, reference: &str, arch: &str, timeout: Duration) -> Result<()> {
        let child = self
            .command()
            .arg("pull")
            .arg(format!("--platform=linux/{}", arch))
            .arg(reference)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SyncError::PullError {
                reference: reference.to_string(),
                arch: arch.to_string(),
                message: format!("failed to spawn {}: {}", self.binary, e),
            })?;

        // Dropping the child on timeout kills it
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SyncError::TimeoutError(format!(
                    "pull {} ({}) exceeded {}s",
                    reference,
                    arch,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| SyncError::PullError {
                reference: reference.to_string(),
                arch: arch.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SyncError::PullError {
                reference: reference.to_string(),
                arch: arch.to_string(),
                message: format!("{}: {}", output.status, last_line(&output.stderr)),
            });
        }
        Ok(())
    }

    async fn save(&self, reference: &str, arch: &str, sink: &mut (dyn Write + Send)) -> Result<u64> {
        let export_error = |message: String| SyncError::ExportError {
            reference: reference.to_string(),
            arch: arch.to_string(),
            message,
        };

        let mut child = self
            .command()
            .arg("save")
            .arg(format!("--platform=linux/{}", arch))
            .arg(reference)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| export_error(format!("failed to spawn {}: {}", self.binary, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| export_error("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| export_error("stderr not captured".to_string()))?;

        // Drain stderr concurrently so a chatty runtime cannot block on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut buf = vec![0u8; SAVE_CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    child.kill().await.ok();
                    return Err(export_error(format!("read failed: {}", e)));
                }
            };
            if let Err(e) = sink.write_all(&buf[..n]) {
                child.kill().await.ok();
                return Err(export_error(format!("write failed: {}", e)));
            }
            written += n as u64;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| export_error(e.to_string()))?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(export_error(format!("{}: {}", status, last_line(&stderr))));
        }
        Ok(written)
    }
}
