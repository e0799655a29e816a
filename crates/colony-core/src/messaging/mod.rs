//! Messaging layer: typed envelopes, durable queueing, priority-ordered
//! delivery, retry on send, and routing inbound messages to handlers.

mod registry;

pub use registry::{HandlerRegistry, MessageHandler};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{DurableStore, Transport};
use crate::error::{TransientError, ValidationError};
use crate::model::{AgentEvent, AgentMessage, MessageType};

/// Upper bound on how many unprocessed inbox rows one `process_inbox`
/// call will fetch and drain.
pub const MAX_INBOX_BATCH: usize = 200;

/// Backoff schedule for outbound send retries: up to 3 extra attempts
/// beyond the first, waiting 1s, 2s, 4s between tries.
pub const SEND_RETRY_BACKOFF: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

/// Upper bound on concurrent in-flight deliveries during a `broadcast`.
pub const BROADCAST_CONCURRENCY: usize = 16;

const PROTOCOL: &str = "colony_message_v1";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    protocol: String,
    #[serde(rename = "sentAt")]
    sent_at: chrono::DateTime<Utc>,
    message: AgentMessage,
}

/// Either validation rejected the message outright, or delivery kept
/// failing past the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transient(#[from] TransientError),
}

fn validate_envelope(message: &AgentMessage, now: chrono::DateTime<Utc>) -> Result<(), ValidationError> {
    if message.from.trim().is_empty() {
        return Err(ValidationError::Envelope {
            reason: "from is required".to_string(),
        });
    }
    if message.to.trim().is_empty() {
        return Err(ValidationError::Envelope {
            reason: "to is required".to_string(),
        });
    }
    if message.is_expired(now) {
        return Err(ValidationError::Envelope {
            reason: "expiresAt is in the past".to_string(),
        });
    }
    Ok(())
}

/// Validate, wrap, and deliver one message, retrying transport failures
/// per [`SEND_RETRY_BACKOFF`]. Emits `message_sent` on success and
/// `message_send_failed` once the retry budget is exhausted.
pub async fn send(store: &dyn DurableStore, transport: &dyn Transport, message: AgentMessage) -> Result<(), SendError> {
    validate_envelope(&message, Utc::now())?;

    let envelope = Envelope {
        protocol: PROTOCOL.to_string(),
        sent_at: Utc::now(),
        message: message.clone(),
    };
    let body = serde_json::to_string(&envelope).expect("envelope is always serializable");

    let mut attempt: u32 = 0;
    loop {
        match transport.deliver(&message.to, &body).await {
            Ok(()) => {
                let mut event = AgentEvent::new(
                    "message_sent",
                    format!("{} -> {} ({})", message.from, message.to, message.kind),
                )
                .with_agent(message.to.clone());
                if let Some(goal_id) = message.goal_id {
                    event = event.with_goal(goal_id);
                }
                if let Some(task_id) = message.task_id {
                    event = event.with_task(task_id);
                }
                let _ = store.insert_event(event).await;

                tracing::info!(to = %message.to, kind = %message.kind, attempt, "message sent");
                return Ok(());
            }
            Err(err) if (attempt as usize) < SEND_RETRY_BACKOFF.len() => {
                tracing::warn!(to = %message.to, kind = %message.kind, attempt, error = %err, "send failed, retrying");
                tokio::time::sleep(SEND_RETRY_BACKOFF[attempt as usize]).await;
                attempt += 1;
            }
            Err(err) => {
                let _ = store
                    .insert_event(AgentEvent::new("message_send_failed", err.to_string()).with_agent(message.to.clone()))
                    .await;
                tracing::error!(to = %message.to, kind = %message.kind, attempts = attempt + 1, error = %err, "send exhausted retry budget");
                return Err(TransientError::new(attempt + 1, err).into());
            }
        }
    }
}

/// Outcome of dispatching one inbound message to its handler.
#[derive(Debug, Clone)]
pub struct InboxOutcome {
    pub message: AgentMessage,
    pub handled_by: MessageType,
    pub success: bool,
    pub error: Option<String>,
}

fn parse_envelope(raw: &str) -> Result<AgentMessage, String> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    if envelope.protocol != PROTOCOL {
        return Err(format!("unknown protocol version: {}", envelope.protocol));
    }
    Ok(envelope.message)
}

/// Drain up to [`MAX_INBOX_BATCH`] unprocessed rows, parse them (a
/// malformed row becomes a synthetic `alert` outcome rather than a
/// handler dispatch), sort the rest `(priority, created_at)`
/// highest-priority-first, and dispatch each to its registered handler.
/// Every fetched row is marked processed regardless of outcome.
pub async fn process_inbox(store: &dyn DurableStore, registry: &HandlerRegistry) -> anyhow::Result<Vec<InboxOutcome>> {
    let rows = store.get_unprocessed_inbox_messages(MAX_INBOX_BATCH).await?;

    struct Entry {
        row_id: Uuid,
        message: AgentMessage,
        malformed: Option<String>,
    }

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_envelope(&row.raw) {
            Ok(message) => entries.push(Entry {
                row_id: row.id,
                message,
                malformed: None,
            }),
            Err(reason) => {
                tracing::warn!(row_id = %row.id, %reason, "inbox message malformed");
                let _ = store
                    .insert_event(AgentEvent::new("inbox_message_malformed", reason.clone()))
                    .await;
                entries.push(Entry {
                    row_id: row.id,
                    message: AgentMessage {
                        id: row.id,
                        kind: MessageType::Alert,
                        from: "inbox".to_string(),
                        to: "orchestrator".to_string(),
                        goal_id: None,
                        task_id: None,
                        content: row.raw.clone(),
                        priority: crate::model::MessagePriority::High,
                        requires_response: false,
                        expires_at: None,
                        created_at: row.created_at,
                    },
                    malformed: Some(reason),
                });
            }
        }
    }

    entries.sort_by(|a, b| {
        a.message
            .priority
            .cmp(&b.message.priority)
            .then(a.message.created_at.cmp(&b.message.created_at))
    });

    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        store.mark_inbox_message_processed(entry.row_id).await?;

        let outcome = if let Some(reason) = entry.malformed {
            InboxOutcome {
                message: entry.message,
                handled_by: MessageType::Alert,
                success: false,
                error: Some(reason),
            }
        } else {
            let kind = entry.message.kind;
            match registry.get(kind) {
                Some(handler) => match handler.handle(&entry.message).await {
                    Ok(()) => InboxOutcome {
                        message: entry.message,
                        handled_by: kind,
                        success: true,
                        error: None,
                    },
                    Err(err) => InboxOutcome {
                        message: entry.message,
                        handled_by: kind,
                        success: false,
                        error: Some(err.to_string()),
                    },
                },
                None => InboxOutcome {
                    message: entry.message,
                    handled_by: kind,
                    success: false,
                    error: Some(format!("no handler registered for message type {kind}")),
                },
            }
        };
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Send one message per known recipient, concurrently, bounded by
/// [`BROADCAST_CONCURRENCY`]. Individual failures are logged, not
/// aggregated into the return value — a broadcast never fails as a whole
/// because one recipient was unreachable.
pub async fn broadcast(
    store: &dyn DurableStore,
    transport: &dyn Transport,
    from: &str,
    content: &str,
    priority: crate::model::MessagePriority,
) -> anyhow::Result<()> {
    let recipients = transport.get_recipients().await?;
    let semaphore = Arc::new(tokio::sync::Semaphore::new(BROADCAST_CONCURRENCY));

    let sends = recipients.into_iter().map(|to| {
        let semaphore = Arc::clone(&semaphore);
        let from = from.to_string();
        let content = content.to_string();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            let message = AgentMessage {
                id: Uuid::new_v4(),
                kind: MessageType::Alert,
                from,
                to: to.clone(),
                goal_id: None,
                task_id: None,
                content,
                priority,
                requires_response: false,
                expires_at: None,
                created_at: Utc::now(),
            };
            if let Err(err) = send(store, transport, message).await {
                tracing::warn!(to = %to, error = %err, "broadcast send failed");
            }
        }
    });

    futures::future::join_all(sends).await;
    Ok(())
}
