//! Periodic reminder/calendar notification loop, `tokio::spawn`ed as a
//! cancellable background task against a `broadcast` fan-out channel.

use crate::model::now_ts;
use crate::store::relational::RelationalStore;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;

const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub emitted_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    CalendarEvent,
}

struct SchedulerState {
    notifications: VecDeque<Notification>,
    seen_ids: HashSet<String>,
    read_ids: HashSet<String>,
}

impl SchedulerState {
    fn new() -> Self {
        Self { notifications: VecDeque::new(), seen_ids: HashSet::new(), read_ids: HashSet::new() }
    }

    fn push(&mut self, notification: Notification) -> bool {
        if self.seen_ids.contains(&notification.id) {
            return false;
        }
        self.seen_ids.insert(notification.id.clone());
        self.notifications.push_back(notification);
        while self.notifications.len() > MAX_NOTIFICATIONS {
            if let Some(dropped) = self.notifications.pop_front() {
                self.seen_ids.remove(&dropped.id);
                self.read_ids.remove(&dropped.id);
            }
        }
        true
    }
}

pub struct ProactiveScheduler {
    relational: Arc<RelationalStore>,
    state: Arc<Mutex<SchedulerState>>,
    sender: broadcast::Sender<Notification>,
    tick_interval: std::time::Duration,
}

impl ProactiveScheduler {
    pub fn new(relational: Arc<RelationalStore>, tick_interval: std::time::Duration) -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { relational, state: Arc::new(Mutex::new(SchedulerState::new())), sender, tick_interval }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Spawns the tick loop; returns a handle plus a stop signal sender.
    pub fn start(self: Arc<Self>) -> (JoinHandle<()>, oneshot::Sender<()>) {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.tick_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        this.tick().await;
                    }
                    _ = &mut stop_rx => {
                        tracing::info!(target: "psycho::scheduler", "stopping");
                        break;
                    }
                }
            }
        });
        (handle, stop_tx)
    }

    async fn tick(&self) {
        let now = now_ts();
        tracing::info!(target: "psycho::scheduler", now, "tick");

        if let Ok(due) = self.relational.due_reminders(now) {
            for reminder in due {
                let notification = Notification {
                    id: format!("reminder:{}", reminder.id),
                    kind: NotificationKind::Reminder,
                    title: reminder.title.clone(),
                    message: reminder.notes.clone().unwrap_or_default(),
                    emitted_at: now,
                };
                let mut state = self.state.lock().await;
                if state.push(notification.clone()) {
                    drop(state);
                    let _ = self.sender.send(notification);
                    self.reschedule_if_recurring(&reminder, now);
                }
            }
        }

        if let Ok(upcoming) = self.relational.upcoming_events(now) {
            for event in upcoming {
                let notification = Notification {
                    id: format!("event:{}:{}", event.id, event.start_timestamp),
                    kind: NotificationKind::CalendarEvent,
                    title: event.title.clone(),
                    message: format!("starts at {}", crate::model::from_ts(event.start_timestamp)),
                    emitted_at: now,
                };
                let mut state = self.state.lock().await;
                if state.push(notification.clone()) {
                    drop(state);
                    let _ = self.sender.send(notification);
                }
            }
        }
    }

    fn reschedule_if_recurring(&self, reminder: &crate::model::Reminder, now: i64) {
        use crate::model::Recurrence;
        let next = match reminder.recurrence {
            Recurrence::Daily => Some(now + 86400),
            Recurrence::Weekly => Some(now + 7 * 86400),
            Recurrence::Monthly => Some(now + 30 * 86400),
            Recurrence::None => None,
        };
        if let Some(next_due) = next {
            let _ = self.relational.reschedule_reminder(&reminder.id, next_due);
        } else {
            let _ = self.relational.complete_reminder(&reminder.id);
        }
    }

    pub async fn unread(&self) -> Vec<Notification> {
        let state = self.state.lock().await;
        state.notifications.iter().filter(|n| !state.read_ids.contains(&n.id)).cloned().collect()
    }

    pub async fn mark_read(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.read_ids.insert(id.to_string());
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Recurrence, Reminder};

    fn test_relational() -> (tempfile::TempDir, Arc<RelationalStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RelationalStore::new(dir.path().join("psycho.db")).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn tick_emits_due_reminder_and_completes_nonrecurring() {
        let (_dir, store) = test_relational();
        let now = now_ts();
        store
            .insert_reminder(&Reminder {
                id: "r1".into(),
                title: "water plants".into(),
                notes: None,
                due_timestamp: now - 5,
                recurrence: Recurrence::None,
                priority: Priority::Normal,
                completed: false,
                snoozed_until: 0,
                created_at: now,
                session_id: None,
            })
            .unwrap();

        let scheduler = ProactiveScheduler::new(store.clone(), std::time::Duration::from_secs(60));
        scheduler.tick().await;
        let unread = scheduler.unread().await;
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "water plants");
    }

    #[tokio::test]
    async fn duplicate_ticks_do_not_duplicate_notifications() {
        let (_dir, store) = test_relational();
        let now = now_ts();
        store
            .insert_reminder(&Reminder {
                id: "r2".into(),
                title: "standup".into(),
                notes: None,
                due_timestamp: now - 5,
                recurrence: Recurrence::Daily,
                priority: Priority::Normal,
                completed: false,
                snoozed_until: 0,
                created_at: now,
                session_id: None,
            })
            .unwrap();
        let scheduler = ProactiveScheduler::new(store.clone(), std::time::Duration::from_secs(60));
        scheduler.tick().await;
        // daily reminder is rescheduled forward, so a second immediate tick shouldn't re-fire it
        scheduler.tick().await;
        let all = scheduler.all().await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_removes_from_unread() {
        let (_dir, store) = test_relational();
        let scheduler = ProactiveScheduler::new(store, std::time::Duration::from_secs(60));
        scheduler.tick().await;
        assert!(scheduler.unread().await.is_empty());
    }
}
