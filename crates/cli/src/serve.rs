//! Daemon mode – minimal JSON-RPC-ish protocol over Unix socket.
//!
//! Each connection gets its own calculator, so a client can press keys
//! across several requests.

use desk_engine::commands::{calculator_snapshot, press_keys};
use desk_engine::types::*;
use desk_engine::{AppContext, Calculator, CommandRegistry};
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

pub async fn run_daemon(
    socket_path: PathBuf,
    ctx: AppContext,
    registry: CommandRegistry,
) -> anyhow::Result<()> {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path).map_err(|e| {
        anyhow::anyhow!("cannot bind socket {}: {}", socket_path.display(), e)
    })?;

    tracing::info!(socket = %socket_path.display(), "deskctl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                let mut calc = ctx.new_calculator();

                while let Ok(Some(line)) = lines.next_line().await {
                    let response = handle_request(&line, &ctx, &registry, &mut calc).await;
                    let mut resp_json =
                        serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
                    resp_json.push('\n');
                    if writer.write_all(resp_json.as_bytes()).await.is_err() {
                        break;
                    }
                }
                tracing::debug!("daemon client disconnected");
            }
            Err(e) => {
                tracing::error!(error = %e, "accept error");
            }
        }
    }
}

fn invalid(id: String, message: String) -> DaemonResponse {
    DaemonResponse {
        id,
        result: None,
        error: Some(ErrorInfo {
            code: ErrorCode::InvalidInput,
            message,
            details: serde_json::Value::Null,
        }),
    }
}

fn snapshot_result(method: &str, calc: &Calculator, start: Instant) -> CommandResult {
    let mut r = result_ok(
        method,
        "calculator",
        &new_run_id(),
        start.elapsed().as_millis() as u64,
    );
    r.data = Some(calculator_snapshot(calc));
    r
}

async fn handle_request(
    line: &str,
    ctx: &AppContext,
    registry: &CommandRegistry,
    calc: &mut Calculator,
) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return invalid("unknown".into(), format!("invalid JSON request: {}", e)),
    };

    let start = Instant::now();
    let result = match req.method.as_str() {
        "call" => {
            let cmd_name = req.params.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            let args = req
                .params
                .get("args")
                .cloned()
                .unwrap_or(serde_json::Value::Object(Default::default()));
            registry.execute(cmd_name, args, ctx).await
        }
        "press" => match req.params.get("keys").and_then(|v| v.as_str()) {
            Some(keys) => press_keys(calc, keys),
            None => return invalid(req.id, "press requires a 'keys' string".into()),
        },
        "display" => snapshot_result("display", calc, start),
        "clear" => {
            calc.clear();
            snapshot_result("clear", calc, start)
        }
        other => return invalid(req.id, format!("unknown method: {}", other)),
    };

    DaemonResponse {
        id: req.id,
        result: Some(result),
        error: None,
    }
}
