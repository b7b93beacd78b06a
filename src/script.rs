//! Notification script invocation.
//!
//! The script runs through `sh`, but its path is passed as a positional
//! argument and the payload travels over stdin, so nothing from the
//! discovery endpoint ever reaches a shell command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ConfdError;

/// `$0` is the script path; stderr is folded into stdout.
const SHELL_WRAPPER: &str = "exec \"$0\" 2>&1";

pub struct ScriptInvoker {
    path: PathBuf,
}

impl ScriptInvoker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Run the script with `payload` on stdin and return its combined output.
    pub async fn invoke(&self, payload: &[u8]) -> Result<String, ConfdError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(ConfdError::ScriptMissing {
                    path: self.path.clone(),
                    source: None,
                })
            }
            Err(e) => {
                return Err(ConfdError::ScriptMissing {
                    path: self.path.clone(),
                    source: Some(e),
                })
            }
        }

        debug!(
            "Executing {} with {} byte payload",
            self.path.display(),
            payload.len()
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(SHELL_WRAPPER)
            .arg(self.exec_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_err(e))?;

        // Feed stdin from its own task so a chatty script cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = payload.to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!("Failed to write payload to script stdin: {}", e);
                }
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_err(e))?;
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Script stdin writer task failed: {}", e);
            }
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ConfdError::ScriptExecution {
                path: self.path.clone(),
                status: output.status,
                output: combined,
            });
        }

        info!("{} finished: {}", self.path.display(), combined.trim_end());
        Ok(combined)
    }

    /// A bare file name would be looked up on `PATH` by `exec`; anchor it
    /// to the working directory where its existence was checked.
    fn exec_path(&self) -> PathBuf {
        if self.path.is_relative() && self.path.parent() == Some(Path::new("")) {
            Path::new(".").join(&self.path)
        } else {
            self.path.clone()
        }
    }

    fn spawn_err(&self, source: std::io::Error) -> ConfdError {
        ConfdError::ScriptSpawn {
            path: self.path.clone(),
            source,
        }
    }
}
