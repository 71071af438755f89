// Helper functions for engine implementations

use std::net::SocketAddr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use super::errors::EngineError;

/// Run an external command, capturing its output, killing it when `limit` elapses
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<Output, EngineError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolNotFound(program.to_string()),
            _ => EngineError::Execution(format!("failed to start {}: {}", program, e)),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Execution(format!("failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Execution(format!("failed to capture stderr from {}", program)))?;

    // Drain both pipes concurrently so a chatty child cannot fill one and stall
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status
                .map_err(|e| EngineError::Execution(format!("failed to wait for {}: {}", program, e)))?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(Output { status, stdout, stderr })
        }
        Err(_) => {
            debug!(program, limit_ms = limit.as_millis() as u64, "Killing timed out process");
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(EngineError::Timeout)
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, EngineError> {
    task.await
        .map_err(|e| EngineError::Execution(format!("pipe reader failed: {}", e)))?
        .map_err(|e| EngineError::Execution(format!("failed to read pipe: {}", e)))
}

/// Local SOCKS5 ports commonly used by desktop proxy clients
const COMMON_SOCKS_PORTS: &[u16] = &[
    1080,  // Standard SOCKS5
    7890,  // Clash
    10808, // V2RayN
    1081,  // Alternative
    7891,  // Alternative Clash
];

/// Auto-detect a local SOCKS5 proxy by probing common ports
pub async fn auto_detect_proxy() -> Option<String> {
    let mut found = None;
    for port in COMMON_SOCKS_PORTS.iter().copied() {
        if port_is_open(port).await {
            found = Some(format!("socks5h://127.0.0.1:{}", port));
            break;
        }
    }

    match &found {
        Some(proxy) => debug!(proxy = proxy.as_str(), "Detected local SOCKS5 proxy"),
        None => debug!("No local SOCKS5 proxy detected"),
    }
    found
}

async fn port_is_open(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    matches!(
        timeout(Duration::from_millis(200), TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
