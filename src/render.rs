//! Template rendering for the reverse-proxy configuration.
//!
//! The template is plain text with two recognised tokens.  Rendering
//! replaces every occurrence of each token, writes the output file and asks
//! the proxy to reload.  The reload runs detached: its outcome is logged but
//! never affects the result of [`Renderer::render`].

use std::path::PathBuf;
use std::process::Stdio;

use log::{debug, info, warn};
use tokio::process::Command;

use crate::error::{template_err, ConfdError};
use crate::types::PortBinding;

pub const LISTEN_PORT_TOKEN: &str = "__listen_port__";
pub const BACKEND_TOKEN: &str = "__backend__";

#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

pub struct Renderer {
    template: PathBuf,
    out: PathBuf,
    reload_command: Vec<String>,
}

impl Renderer {
    /// `reload_command` is an argument vector; leave it empty to skip reloads.
    pub fn new(
        template: impl Into<PathBuf>,
        out: impl Into<PathBuf>,
        reload_command: Vec<String>,
    ) -> Self {
        Self {
            template: template.into(),
            out: out.into(),
            reload_command,
        }
    }

    /// Render the template for `binding`, write it out and trigger a reload.
    pub async fn render(&self, binding: &PortBinding) -> Result<(), ConfdError> {
        let template = tokio::fs::read(&self.template)
            .await
            .map_err(|e| template_err(&self.template, e))?;

        let content = render_template(&template, binding);

        tokio::fs::write(&self.out, content)
            .await
            .map_err(|e| template_err(&self.out, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.out, std::fs::Permissions::from_mode(OUTPUT_MODE))
                .await
                .map_err(|e| template_err(&self.out, e))?;
        }

        info!(
            "Rendered {} -> {} (listen {}, backend {})",
            self.template.display(),
            self.out.display(),
            binding.listen_port,
            binding.backend()
        );

        self.spawn_reload();
        Ok(())
    }

    fn spawn_reload(&self) {
        let Some((program, args)) = self.reload_command.split_first() else {
            debug!("No reload command configured, skipping reload");
            return;
        };

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start reload command {:?}: {}", self.reload_command, e);
                return;
            }
        };

        // Reap the child in the background so it never lingers as a zombie.
        let command = self.reload_command.join(" ");
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Reload `{}` finished", command),
                Ok(status) => warn!("Reload `{}` exited with {}", command, status),
                Err(e) => warn!("Failed to wait for reload `{}`: {}", command, e),
            }
        });
    }
}

/// Substitute every placeholder occurrence in `template`.
///
/// Works on raw bytes: a template need not be valid UTF-8, and one without
/// tokens comes back byte-identical.
pub fn render_template(template: &[u8], binding: &PortBinding) -> Vec<u8> {
    let listen_port = binding.listen_port.to_string();
    let rendered = replace_all(template, LISTEN_PORT_TOKEN.as_bytes(), listen_port.as_bytes());
    replace_all(&rendered, BACKEND_TOKEN.as_bytes(), binding.backend().as_bytes())
}

fn replace_all(haystack: &[u8], token: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(at) = rest.windows(token.len()).position(|w| w == token) {
        out.extend_from_slice(&rest[..at]);
        out.extend_from_slice(value);
        rest = &rest[at + token.len()..];
    }
    out.extend_from_slice(rest);
    out
}
