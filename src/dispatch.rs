//! Routing of discovery payloads to the configured action.

use log::{debug, info};

use crate::detector::ChangeDetector;
use crate::error::ConfdError;
use crate::render::Renderer;
use crate::script::ScriptInvoker;
use crate::types::Snapshot;

/// What to do with a changed, valid snapshot. Chosen once at startup.
pub enum Action {
    Render(Renderer),
    Script(ScriptInvoker),
}

/// Result of a successfully handled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Rendered,
    ScriptRan,
}

pub struct Dispatcher {
    detector: ChangeDetector,
    action: Action,
}

impl Dispatcher {
    pub fn new(action: Action) -> Self {
        Self {
            detector: ChangeDetector::new(),
            action,
        }
    }

    /// Decode, gate on change, validate and act on one payload.
    ///
    /// A payload that fails to decode never touches the change detector, so
    /// a corrupt response cannot mask the next good one.
    pub async fn handle(&mut self, payload: &[u8]) -> Result<Outcome, ConfdError> {
        let snapshot = Snapshot::from_slice(payload)?;

        if !self.detector.should_proceed(payload) {
            debug!("Discovery payload unchanged, nothing to do");
            return Ok(Outcome::Unchanged);
        }

        info!("Discovery payload changed: {:?}", snapshot);

        let Some(binding) = snapshot.primary_port() else {
            return Err(ConfdError::Validation(
                "payload has no base_ports entries".into(),
            ));
        };

        match &self.action {
            Action::Render(renderer) => {
                renderer.render(binding).await?;
                Ok(Outcome::Rendered)
            }
            Action::Script(invoker) => {
                invoker.invoke(payload).await?;
                Ok(Outcome::ScriptRan)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = br#"{"base_ports":[{"port":8080,"listen_port":80,"protocol":"http","options":{"inner_ip":"10.0.0.5"}}]}"#;
    const TEMPLATE: &str = "server { listen __listen_port__; proxy_pass __backend__; }";

    struct Fixture {
        _dir: TempDir,
        out: PathBuf,
        dispatcher: Dispatcher,
    }

    fn render_fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("nginx.conf.template");
        let out = dir.path().join("nginx.conf");
        std::fs::write(&template, TEMPLATE).unwrap();
        let dispatcher = Dispatcher::new(Action::Render(Renderer::new(
            &template,
            &out,
            Vec::new(),
        )));
        Fixture {
            _dir: dir,
            out,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn renders_changed_payload() {
        let mut fx = render_fixture();
        let outcome = fx.dispatcher.handle(PAYLOAD).await.unwrap();
        assert_eq!(outcome, Outcome::Rendered);
        assert_eq!(
            std::fs::read_to_string(&fx.out).unwrap(),
            "server { listen 80; proxy_pass http://10.0.0.5:8080; }"
        );
    }

    #[tokio::test]
    async fn same_payload_renders_once() {
        let mut fx = render_fixture();
        assert_eq!(fx.dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::Rendered);

        std::fs::remove_file(&fx.out).unwrap();
        assert_eq!(fx.dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::Unchanged);
        assert!(!fx.out.exists(), "second cycle must not write");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn same_payload_reloads_once() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("nginx.conf.template");
        let marker = dir.path().join("reloads");
        std::fs::write(&template, TEMPLATE).unwrap();
        let mut dispatcher = Dispatcher::new(Action::Render(Renderer::new(
            &template,
            dir.path().join("nginx.conf"),
            vec![
                "sh".into(),
                "-c".into(),
                format!("echo reload >> '{}'", marker.display()),
            ],
        )));

        let reloads = || std::fs::read_to_string(&marker).unwrap_or_default();

        assert_eq!(dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::Rendered);
        for _ in 0..100 {
            if !reloads().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(reloads(), "reload\n");

        assert_eq!(dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::Unchanged);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(reloads(), "reload\n", "unchanged payload must not reload");
    }

    #[tokio::test]
    async fn only_first_port_binding_is_rendered() {
        let mut fx = render_fixture();
        let payload = br#"{"base_ports":[
            {"port":1,"listen_port":10,"protocol":"http"},
            {"port":2,"listen_port":20,"protocol":"tcp"}
        ]}"#;
        fx.dispatcher.handle(payload).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&fx.out).unwrap(),
            "server { listen 10; proxy_pass http://127.0.0.1:1; }"
        );
    }

    #[tokio::test]
    async fn empty_port_list_fails_validation() {
        let mut fx = render_fixture();
        let payload = br#"{"base_ports":[],"base_services":[{"port":3306}],"base_normal":{"options":{"a":"b"}}}"#;
        let err = fx.dispatcher.handle(payload).await.unwrap_err();
        assert!(matches!(err, ConfdError::Validation(_)));
        assert!(!fx.out.exists());
    }

    #[tokio::test]
    async fn null_payload_fails_validation_after_detection() {
        let mut fx = render_fixture();
        let err = fx.dispatcher.handle(b"null").await.unwrap_err();
        assert!(matches!(err, ConfdError::Validation(_)));
        assert!(fx.dispatcher.detector.last().is_some());
        assert!(!fx.out.exists());
    }

    #[tokio::test]
    async fn decode_error_leaves_detector_untouched() {
        let mut fx = render_fixture();
        let err = fx.dispatcher.handle(b"{oops").await.unwrap_err();
        assert!(matches!(err, ConfdError::Decode(_)));
        assert_eq!(fx.dispatcher.detector.last(), None);
    }

    #[tokio::test]
    async fn render_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut dispatcher = Dispatcher::new(Action::Render(Renderer::new(
            dir.path().join("missing.template"),
            dir.path().join("out"),
            Vec::new(),
        )));
        let err = dispatcher.handle(PAYLOAD).await.unwrap_err();
        assert!(matches!(err, ConfdError::TemplateIo { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_mode_receives_raw_payload_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls");
        let script = dir.path().join("callback.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat >> '{}'\necho >> '{}'\n", log.display(), log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut dispatcher = Dispatcher::new(Action::Script(ScriptInvoker::new(&script)));
        assert_eq!(dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::ScriptRan);
        assert_eq!(dispatcher.handle(PAYLOAD).await.unwrap(), Outcome::Unchanged);

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls, format!("{}\n", String::from_utf8_lossy(PAYLOAD)));
    }

    #[tokio::test]
    async fn script_mode_skips_invalid_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut dispatcher = Dispatcher::new(Action::Script(ScriptInvoker::new(
            dir.path().join("callback.sh"),
        )));
        let err = dispatcher.handle(br#"{"base_ports":[]}"#).await.unwrap_err();
        assert!(matches!(err, ConfdError::Validation(_)));
    }
}
