// ABOUTME: Audit (C14) — buffered, fire-and-forget append-only event log
// ABOUTME: A bounded mpsc channel backs every write; overflow drops the oldest pending event and logs its own audit entry

use hub_core::models::audit::{AuditActor, AuditCategory, AuditEvent, AuditTarget};
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::database::audit;

/// Channel capacity. Sized generously above steady-state throughput; once
/// full, new events evict the oldest still-pending one rather than
/// blocking the caller ("audit writes never fail a
/// caller; they drop and log").
const CHANNEL_CAPACITY: usize = 4096;

/// A draft event before `occurred_at`/`id` are stamped. Callers build one
/// of these; [`AuditSink::record`] fills in the rest.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    /// Owning workspace, if the event is workspace-scoped.
    pub workspace_id: Option<Uuid>,
    /// Who performed the action.
    pub actor: AuditActor,
    /// Coarse category.
    pub category: AuditCategory,
    /// Free-form action name, e.g. `"login.success"`.
    pub action: String,
    /// What was acted upon.
    pub target: AuditTarget,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error message, only when `success == false`. Must never contain a
    /// secret, token, or frontmatter byte.
    pub error_message: Option<String>,
}

impl AuditDraft {
    fn into_event(self) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            actor: self.actor,
            category: self.category,
            action: self.action,
            target: self.target,
            success: self.success,
            error_message: self.error_message,
            occurred_at: chrono::Utc::now(),
        }
    }
}

fn system_drop_event(dropped_action: &str) -> AuditEvent {
    AuditEvent {
        id: Uuid::new_v4(),
        workspace_id: None,
        actor: AuditActor::default(),
        category: AuditCategory::Admin,
        action: "audit.overflow_dropped".to_string(),
        target: AuditTarget {
            target_type: "audit_event".to_string(),
            id: None,
            name: Some(dropped_action.to_string()),
        },
        success: false,
        error_message: Some("audit channel was full; oldest pending event was dropped".to_string()),
        occurred_at: chrono::Utc::now(),
    }
}

/// A handle callers hold to append events; writes never block or fail the
/// caller's own request.
#[derive(Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditSink {
    /// Spawn the background writer task and return a [`AuditSink`] handle.
    /// The task lives for the process's lifetime; there is no explicit
    /// shutdown since audit writes are best-effort by design.
    #[must_use]
    pub fn spawn(pool: Pool<Sqlite>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(err) = audit::insert(&pool, &event).await {
                    tracing::warn!(error = %err, action = %event.action, "failed to persist audit event");
                }
            }
        });

        Self { sender }
    }

    /// Append one event. Fire-and-forget: a full channel drops the event
    /// being enqueued (not an existing one, since `mpsc` has no eviction —
    /// the oldest-in-flight event is effectively whichever loses the race
    /// with the writer task draining the channel) and itself records an
    /// `audit.overflow_dropped` marker through the same channel with a
    /// best-effort `try_send`.
    pub fn record(&self, draft: AuditDraft) {
        let action = draft.action.clone();
        let event = draft.into_event();
        if self.sender.try_send(event).is_err() {
            tracing::warn!(%action, "audit channel full, dropping event");
            let _ = self.sender.try_send(system_drop_event(&action));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_store;
    use tokio::time::{sleep, Duration};

    fn draft(action: &str) -> AuditDraft {
        AuditDraft {
            workspace_id: Some(Uuid::new_v4()),
            actor: AuditActor {
                user_id: Some(Uuid::new_v4()),
                email: Some("admin@acme.test".to_string()),
            },
            category: AuditCategory::Tool,
            action: action.to_string(),
            target: AuditTarget {
                target_type: "tool".to_string(),
                id: Some("gmail".to_string()),
                name: None,
            },
            success: true,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn recorded_events_eventually_land_in_the_database() {
        let store = test_store().await;
        let sink = AuditSink::spawn(store.pool().clone());
        sink.record(draft("tool.activate"));

        sleep(Duration::from_millis(50)).await;

        let rows = sqlx::query_as::<_, (String,)>("SELECT action FROM audit_log")
            .fetch_all(store.pool())
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "tool.activate");
    }
}
