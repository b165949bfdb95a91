//! Environment checks behind `qllama check`.

use crate::backend::openai_compatible::OpenAiCompatibleBackend;
use crate::config::BackendConfig;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    /// A failed critical check means qllama cannot run at all.
    pub critical: bool,
    pub detail: String,
}

/// Looks for an external tool on PATH by running `<tool> -version`.
pub async fn check_tool(tool: &str, purpose: &str) -> CheckResult {
    let status = Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    let (ok, detail) = match status {
        Ok(status) if status.success() => (true, "found".to_string()),
        Ok(status) => (false, format!("exited with {} ({})", status, purpose)),
        Err(e) => (false, format!("not available: {} ({})", e, purpose)),
    };
    if !ok {
        tracing::warn!("{}: {}", tool, detail);
    }

    CheckResult {
        name: tool.to_string(),
        ok,
        critical: false,
        detail,
    }
}

/// The inference server must answer its model listing.
pub async fn check_backend(config: &BackendConfig) -> CheckResult {
    let (ok, detail) = match OpenAiCompatibleBackend::new(config) {
        Err(e) => (false, e.to_string()),
        Ok(backend) => match backend.served_models().await {
            Ok(models) if models.is_empty() => (
                true,
                format!("{} reachable, no models served", backend.default_endpoint()),
            ),
            Ok(models) => (
                true,
                format!("{} serves {}", backend.default_endpoint(), models.join(", ")),
            ),
            Err(e) => (false, format!("{}: {}", backend.default_endpoint(), e)),
        },
    };
    if !ok {
        tracing::error!("backend check failed: {}", detail);
    }

    CheckResult {
        name: "backend".to_string(),
        ok,
        critical: true,
        detail,
    }
}

pub async fn check_all(config: &BackendConfig) -> Vec<CheckResult> {
    vec![
        check_backend(config).await,
        check_tool("ffprobe", "needed to count video frames").await,
        check_tool("ffmpeg", "needed to decode video attachments").await,
    ]
}

/// True unless a critical check failed.
pub fn critical_ok(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.ok || !r.critical)
}
