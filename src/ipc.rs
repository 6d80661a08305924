use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::commands::{dispatch_line, AppState, Response};
use crate::error::{AppError, AppResult};

/// Serves newline-delimited JSON requests until `reader` hits EOF.
///
/// Requests run concurrently; responses are written in completion order and
/// carry the caller's `requestId` for correlation.
pub async fn serve<R, W>(state: Arc<AppState>, reader: R, mut writer: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Response>();
    let mut response_tx = Some(response_tx);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if response_tx.is_some() => {
                match line.map_err(to_internal)? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if let Some(tx) = response_tx.as_ref() {
                            let tx = tx.clone();
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                let response = dispatch_line(&state, &line).await;
                                let _ = tx.send(response);
                            });
                        }
                    }
                    None => {
                        debug!("request stream closed, draining in-flight requests");
                        response_tx = None;
                    }
                }
            }
            Some(response) = response_rx.recv() => {
                write_response(&mut writer, &response).await?;
            }
            else => break,
        }
    }

    info!("ipc loop finished");
    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &Response) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response)
        .map_err(|err| AppError::Internal(format!("failed to encode response: {err}")))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await.map_err(to_internal)?;
    writer.flush().await.map_err(to_internal)?;
    Ok(())
}

fn to_internal(err: std::io::Error) -> AppError {
    AppError::Internal(err.to_string())
}
