//! Host bridge - Newline-delimited JSON between the coordinator and its host
//!
//! Each input line is either a protocol request (it has an `action`) or a host
//! event (it has an `event`). Every request gets exactly one response line.
//! Agent notices broadcast by the coordinator are written out as they happen.
//! The bridge returns when the input reaches EOF.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::coordinator::CoordinatorHandle;
use crate::protocol::Response;
use crate::security::Sanitizer;

/// Page-load status that triggers the navigation check
const LOAD_COMPLETE: &str = "complete";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Browser-side events the host forwards
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum HostEvent {
    TabUpdated {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

/// Serves the bridge until `reader` reaches EOF
pub async fn serve<R, W>(
    coordinator: CoordinatorHandle,
    reader: R,
    mut writer: W,
) -> Result<(), HostError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut notices = coordinator.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Host closed input, shutting down");
                    break;
                };
                if let Some(response) = handle_line(&coordinator, &line).await {
                    write_line(&mut writer, &response).await?;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => write_line(&mut writer, &notice).await?,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Dropped {} notices for the host", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Answers one input line; `None` when the line needs no reply
async fn handle_line(coordinator: &CoordinatorHandle, line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Invalid input line: {}", Sanitizer::truncate_for_log(line, 80));
            return Some(Response::failure(format!("Invalid JSON: {}", e)));
        }
    };

    if message.get("event").is_some() {
        return handle_event(coordinator, message).await;
    }

    Some(coordinator.dispatch(message).await)
}

async fn handle_event(coordinator: &CoordinatorHandle, message: Value) -> Option<Response> {
    let event: HostEvent = match serde_json::from_value(message) {
        Ok(event) => event,
        Err(_) => return Some(Response::failure("Unknown event")),
    };

    match event {
        HostEvent::TabUpdated {
            status: Some(status),
            url: Some(url),
        } if status == LOAD_COMPLETE => match coordinator.page_loaded(url).await {
            Ok(_) => Some(Response::ok()),
            Err(e) => Some(Response::failure(e.to_string())),
        },
        // Loads still in progress
        HostEvent::TabUpdated { .. } => None,
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Settings;
    use crate::coordinator::Coordinator;
    use crate::quota::UsageData;
    use crate::storage::Storage;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::BufReader;

    async fn coordinator() -> CoordinatorHandle {
        Coordinator::new(Storage::in_memory(), Arc::new(ManualClock::new(0)))
            .start()
            .await
            .unwrap()
    }

    async fn run_script(handle: CoordinatorHandle, script: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve(handle, BufReader::new(script.as_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_requests_are_answered_in_order() {
        let script = concat!(
            "{\"action\":\"checkPermission\"}\n",
            "\n",
            "{\"action\":\"nope\"}\n",
            "not json\n",
            "{\"action\":\"recordUsage\"}\n",
        );
        let replies = run_script(coordinator().await, script).await;

        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], json!({"success": true, "canUse": false}));
        assert_eq!(replies[1], json!({"success": false, "error": "Unknown action"}));
        assert_eq!(replies[2]["success"], json!(false));
        assert!(replies[2]["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON"));
        assert_eq!(replies[3], json!({"success": true}));
    }

    #[tokio::test]
    async fn test_tab_updated_resets_off_allow_list() {
        let handle = coordinator().await;
        let settings = Settings {
            is_enabled: true,
            ..Settings::default()
        };
        handle
            .dispatch(json!({"action": "saveSettings", "settings": settings}))
            .await;
        let script = concat!(
            "{\"action\":\"recordUsage\"}\n",
            "{\"event\":\"tabUpdated\",\"status\":\"loading\",\"url\":\"https://example.com/\"}\n",
            "{\"event\":\"tabUpdated\",\"status\":\"complete\",\"url\":\"https://claude.ai/chat/1\"}\n",
        );
        let replies = run_script(handle.clone(), script).await;

        // The loading event gets no reply
        assert_eq!(replies, vec![json!({"success": true}), json!({"success": true})]);
        assert_eq!(handle.get_usage_data().await.unwrap().prompt_count, 1);

        let script =
            "{\"event\":\"tabUpdated\",\"status\":\"complete\",\"url\":\"https://example.com/\"}\n";
        run_script(handle.clone(), script).await;
        assert_eq!(handle.get_usage_data().await, Some(UsageData::fresh(0)));
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let replies = run_script(coordinator().await, "{\"event\":\"tabRemoved\"}\n").await;
        assert_eq!(replies, vec![json!({"success": false, "error": "Unknown event"})]);
    }

    #[tokio::test]
    async fn test_notices_are_forwarded_until_eof() {
        let handle = coordinator().await;
        let (mut input, host_input) = tokio::io::duplex(1024);
        let (host_output, output) = tokio::io::duplex(1024);

        let bridge = tokio::spawn(serve(handle.clone(), BufReader::new(host_input), host_output));

        let settings = Settings {
            is_enabled: true,
            ..Settings::default()
        };
        let line = json!({"action": "saveSettings", "settings": settings}).to_string() + "\n";
        input.write_all(line.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(output).lines();
        let mut received = Vec::new();
        for _ in 0..2 {
            let line = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            received.push(serde_json::from_str::<Value>(&line).unwrap());
        }

        assert!(received.contains(&json!({"success": true})));
        assert!(received.contains(&json!({"action": "settingsUpdated"})));

        drop(input);
        bridge.await.unwrap().unwrap();
    }
}
