//! One-shot reminder scheduling.
//!
//! A single worker task owns a [`DelayQueue`] of pending reminders and is fed
//! through a channel handle. Reminders are persisted in the [`Database`]
//! before they reach the queue, so a restart re-enqueues whatever is left
//! (past-due entries fire immediately).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use futures::{future::FutureExt, select_biased};
use teloxide::requests::Requester;
use teloxide::types::ChatId;
use teloxide::{Bot, RequestError};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time;
use tokio_stream::StreamExt;
use tokio_util::time::{delay_queue, DelayQueue};

use crate::data::{Database, JobType, Kind, Reminder};
use crate::duration::{format_duration, parse_duration};
use crate::webhook::WebhookNotifier;

const JOB_ID_PREFIX: &str = "lw";
const JOB_ID_SEPARATOR: char = ':';
const SEND_ATTEMPTS: usize = 3;

pub fn build_job_id(
    user_id: u64,
    chat_id: i64,
    kind: Kind,
    timestamp: i64,
    job_type: JobType,
) -> String {
    format!(
        "{JOB_ID_PREFIX}:{user_id}:{chat_id}:{}:{timestamp}:{}",
        kind.as_str(),
        job_type.as_str()
    )
}

#[derive(Debug, PartialEq, Eq)]
pub struct JobId {
    pub user_id: u64,
    pub chat_id: i64,
    pub kind: Kind,
    pub timestamp: i64,
    pub job_type: JobType,
}

pub fn parse_job_id(job_id: &str) -> Option<JobId> {
    let parts: Vec<&str> = job_id.split(JOB_ID_SEPARATOR).collect();
    match &parts[..] {
        [JOB_ID_PREFIX, user_id, chat_id, kind, timestamp, job_type] => Some(JobId {
            user_id: user_id.parse().ok()?,
            chat_id: chat_id.parse().ok()?,
            kind: kind.parse().ok()?,
            timestamp: timestamp.parse().ok()?,
            job_type: job_type.parse().ok()?,
        }),
        _ => None,
    }
}

/// Task label shown in reminder texts, e.g. "Truck #456". The suffix keeps
/// concurrent reminders of the same kind apart.
pub fn format_task_label(kind: Kind, task_name: Option<&str>, timestamp: i64) -> String {
    let base = match (kind, task_name) {
        (Kind::Custom, Some(name)) if !name.is_empty() => name,
        _ => kind.label(),
    };
    let ts = timestamp.to_string();
    let suffix = &ts[ts.len().saturating_sub(3)..];
    format!("{base} #{suffix}")
}

/// One line of the pending-reminder list, in the configured display offset.
pub fn format_reminder_display(reminder: &Reminder, offset: FixedOffset) -> String {
    let at = reminder
        .fire_at
        .with_timezone(&offset)
        .format("%a %H:%M")
        .to_string();
    let Some(parsed) = parse_job_id(&reminder.job_id) else {
        tracing::warn!("invalid job ID format: {}", reminder.job_id);
        return format!("⏰ Unknown - {at}");
    };
    let mut label = format_task_label(
        parsed.kind,
        reminder.task_name.as_deref(),
        parsed.timestamp,
    );
    let emoji = match parsed.job_type {
        JobType::Main => "⏰",
        JobType::HeadsUp => {
            label.push_str(" (heads-up)");
            "🔔"
        }
    };
    format!("{emoji} {label} - {at}")
}

/// Everything needed to schedule one reminder (plus optional heads-up).
#[derive(Clone, Debug)]
pub struct ReminderRequest {
    pub user_id: u64,
    pub chat_id: i64,
    pub kind: Kind,
    pub task_name: Option<String>,
    pub duration: chrono::Duration,
    pub lead_time: Option<String>,
}

/// Computes the reminder rows for a request: the main reminder, and a
/// heads-up one when a lead time is given and strictly smaller than the
/// duration. Returns the rows plus the task label for the summary.
pub fn plan_reminders(request: &ReminderRequest, now: DateTime<Utc>) -> (Vec<Reminder>, String) {
    let timestamp = now.timestamp();
    let label = format_task_label(request.kind, request.task_name.as_deref(), timestamp);

    let mut reminders = vec![Reminder {
        job_id: build_job_id(
            request.user_id,
            request.chat_id,
            request.kind,
            timestamp,
            JobType::Main,
        ),
        user_id: request.user_id,
        chat_id: request.chat_id,
        kind: request.kind,
        task_name: request.task_name.clone(),
        fire_at: now + request.duration,
        message: format!("⏰ {label} is ready!"),
        job_type: JobType::Main,
    }];

    if let Some(lead_time) = &request.lead_time {
        match parse_duration(lead_time) {
            Ok(lead) => {
                let heads_up_in = request.duration - lead;
                if heads_up_in > chrono::Duration::zero() {
                    reminders.push(Reminder {
                        job_id: build_job_id(
                            request.user_id,
                            request.chat_id,
                            request.kind,
                            timestamp,
                            JobType::HeadsUp,
                        ),
                        user_id: request.user_id,
                        chat_id: request.chat_id,
                        kind: request.kind,
                        task_name: request.task_name.clone(),
                        fire_at: now + heads_up_in,
                        message: format!(
                            "🔔 {label} will be ready in {}",
                            format_duration(lead)
                        ),
                        job_type: JobType::HeadsUp,
                    });
                } else {
                    tracing::warn!(
                        "heads-up time {lead_time} >= duration {}, skipping",
                        format_duration(request.duration)
                    );
                }
            }
            Err(e) => tracing::error!("failed to parse lead time {lead_time:?}: {e}"),
        }
    }

    (reminders, label)
}

enum Cmd {
    Schedule(Reminder),
    Cancel(String),
}

/// Cheap handle to the scheduler worker.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Cmd>,
}

impl Scheduler {
    fn send(&self, cmd: Cmd) {
        if self.tx.send(cmd).is_err() {
            tracing::error!("scheduler worker is gone");
        }
    }

    /// Persists and enqueues the reminders for a request. Returns the
    /// scheduled job IDs and the task label.
    pub async fn schedule(
        &self,
        db: &Arc<Mutex<Database>>,
        request: &ReminderRequest,
    ) -> anyhow::Result<(Vec<String>, String)> {
        let (reminders, label) = plan_reminders(request, Utc::now());
        let mut job_ids = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            db.lock().await.insert(reminder.clone())?;
            tracing::info!("scheduled {} at {}", reminder.job_id, reminder.fire_at);
            job_ids.push(reminder.job_id.clone());
            self.send(Cmd::Schedule(reminder));
        }
        Ok((job_ids, label))
    }

    /// Cancels every pending reminder of a user in a chat, returning how
    /// many were dropped.
    pub async fn cancel_user_reminders(
        &self,
        db: &Arc<Mutex<Database>>,
        user_id: u64,
        chat_id: i64,
    ) -> anyhow::Result<usize> {
        let pending = db.lock().await.user_reminders(user_id, chat_id);
        let mut count = 0;
        for reminder in pending {
            if db.lock().await.remove(&reminder.job_id)?.is_some() {
                count += 1;
            }
            tracing::info!("cancelled {}", reminder.job_id);
            self.send(Cmd::Cancel(reminder.job_id));
        }
        Ok(count)
    }
}

/// Spawns the worker, restoring any persisted reminders first.
pub fn start(bot: Bot, db: Arc<Mutex<Database>>, notifier: WebhookNotifier) -> Scheduler {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker_db = db.clone();
    tokio::spawn(async move {
        let mut queue = JobQueue::new();
        let restored = worker_db.lock().await.all_reminders();
        if !restored.is_empty() {
            tracing::info!("restoring {} persisted reminder(s)", restored.len());
        }
        for reminder in restored {
            queue.enqueue(reminder);
        }
        loop {
            select_biased! {
                cmd = rx.recv().fuse() => match cmd {
                    Some(Cmd::Schedule(reminder)) => queue.enqueue(reminder),
                    Some(Cmd::Cancel(job_id)) => queue.cancel(&job_id),
                    None => break,
                },
                reminder = queue.next().fuse() => {
                    let bot = bot.clone();
                    let db = worker_db.clone();
                    let notifier = notifier.clone();
                    tokio::spawn(async move {
                        if let Err(e) = deliver(&bot, &db, &notifier, reminder).await {
                            tracing::error!("failed to deliver reminder: {e:#}");
                        }
                    });
                }
            }
        }
    });
    Scheduler { tx }
}

async fn deliver(
    bot: &Bot,
    db: &Arc<Mutex<Database>>,
    notifier: &WebhookNotifier,
    reminder: Reminder,
) -> anyhow::Result<()> {
    'retry: for _ in 0..SEND_ATTEMPTS {
        match bot
            .send_message(ChatId(reminder.chat_id), &reminder.message)
            .await
        {
            Err(RequestError::RetryAfter(delay)) => {
                time::sleep(delay).await;
                continue 'retry;
            }
            Err(RequestError::Api(e)) => {
                // The chat may be gone; the reminder is still consumed.
                tracing::warn!("telegram rejected reminder {}: {e}", reminder.job_id);
                break 'retry;
            }
            other => {
                other?;
                break 'retry;
            }
        }
    }

    if notifier.is_configured() {
        notifier
            .post(&serde_json::json!({
                "chat_id": reminder.chat_id,
                "message": reminder.message,
            }))
            .await;
    }

    db.lock().await.remove(&reminder.job_id)?;
    Ok(())
}

#[derive(Default)]
struct JobQueue {
    jobs: HashMap<String, Reminder>,
    keys: HashMap<String, delay_queue::Key>,
    notifies: DelayQueue<String>,
    wakeup: Notify,
}

impl JobQueue {
    fn new() -> Self {
        Self::default()
    }

    fn enqueue(&mut self, reminder: Reminder) {
        let job_id = reminder.job_id.clone();
        if let Some(key) = self.keys.remove(&job_id) {
            self.notifies.remove(&key);
        }
        let delay = (reminder.fire_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        let key = self.notifies.insert(job_id.clone(), delay);
        self.keys.insert(job_id.clone(), key);
        self.jobs.insert(job_id, reminder);
        self.wakeup.notify_waiters();
    }

    fn cancel(&mut self, job_id: &str) {
        if let Some(key) = self.keys.remove(job_id) {
            self.notifies.remove(&key);
        }
        self.jobs.remove(job_id);
    }

    async fn next(&mut self) -> Reminder {
        loop {
            if let Some(expired) = self.notifies.next().await {
                let job_id = expired.into_inner();
                self.keys.remove(&job_id);
                if let Some(reminder) = self.jobs.remove(&job_id) {
                    break reminder;
                }
            } else {
                self.wakeup.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    // 2024-01-15 12:00:00 UTC
    fn sample_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn sample_ts() -> i64 {
        sample_now().timestamp()
    }

    fn ts_suffix() -> String {
        let ts = sample_ts().to_string();
        ts[ts.len() - 3..].to_string()
    }

    fn request(kind: Kind, task_name: Option<&str>, lead_time: Option<&str>) -> ReminderRequest {
        ReminderRequest {
            user_id: 123,
            chat_id: 456,
            kind,
            task_name: task_name.map(str::to_string),
            duration: Duration::hours(2),
            lead_time: lead_time.map(str::to_string),
        }
    }

    #[test]
    fn job_id_round_trip() {
        let ts = sample_ts();
        let job_id = build_job_id(123, 456, Kind::Truck, ts, JobType::Main);
        assert_eq!(job_id, format!("lw:123:456:truck:{ts}:main"));
        assert_eq!(
            parse_job_id(&job_id),
            Some(JobId {
                user_id: 123,
                chat_id: 456,
                kind: Kind::Truck,
                timestamp: ts,
                job_type: JobType::Main,
            })
        );
    }

    #[test]
    fn parse_job_id_rejects_bad_input() {
        assert!(parse_job_id("xx:123:456:truck:1234567890:main").is_none());
        assert!(parse_job_id("lw:123:456:truck:main").is_none());
        assert!(parse_job_id("lw:123:456:truck:1234567890:main:extra").is_none());
        assert!(parse_job_id("lw:123:456:teapot:1234567890:main").is_none());
        assert!(parse_job_id("").is_none());
    }

    #[test]
    fn task_label_uses_custom_name() {
        let suffix = ts_suffix();
        assert_eq!(
            format_task_label(Kind::Truck, None, sample_ts()),
            format!("Truck #{suffix}")
        );
        assert_eq!(
            format_task_label(Kind::Custom, Some("shield timer"), sample_ts()),
            format!("shield timer #{suffix}")
        );
        // Custom without a name falls back to the kind.
        assert_eq!(
            format_task_label(Kind::Custom, None, sample_ts()),
            format!("Custom #{suffix}")
        );
    }

    #[test]
    fn plan_without_lead_time_is_main_only() {
        let (reminders, label) = plan_reminders(&request(Kind::Build, None, None), sample_now());
        assert_eq!(reminders.len(), 1);
        assert_eq!(label, format!("Build #{}", ts_suffix()));
        let main = &reminders[0];
        assert_eq!(main.job_type, JobType::Main);
        assert_eq!(main.fire_at, sample_now() + Duration::hours(2));
        assert_eq!(main.message, format!("⏰ {label} is ready!"));
    }

    #[test]
    fn plan_with_lead_time_adds_heads_up() {
        let (reminders, label) =
            plan_reminders(&request(Kind::Truck, None, Some("5m")), sample_now());
        assert_eq!(reminders.len(), 2);
        let heads_up = &reminders[1];
        assert_eq!(heads_up.job_type, JobType::HeadsUp);
        assert_eq!(
            heads_up.fire_at,
            sample_now() + Duration::hours(2) - Duration::minutes(5)
        );
        assert_eq!(heads_up.message, format!("🔔 {label} will be ready in 5m"));
    }

    #[test]
    fn plan_skips_heads_up_not_before_main() {
        let (reminders, _) = plan_reminders(&request(Kind::Truck, None, Some("2h")), sample_now());
        assert_eq!(reminders.len(), 1);
        let (reminders, _) = plan_reminders(&request(Kind::Truck, None, Some("3h")), sample_now());
        assert_eq!(reminders.len(), 1);
    }

    #[test]
    fn plan_ignores_unparsable_lead_time() {
        let (reminders, _) =
            plan_reminders(&request(Kind::Truck, None, Some("soonish")), sample_now());
        assert_eq!(reminders.len(), 1);
    }

    #[test]
    fn display_marks_heads_up_jobs() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let (reminders, _) =
            plan_reminders(&request(Kind::Truck, None, Some("5m")), sample_now());

        let main = format_reminder_display(&reminders[0], offset);
        // 14:00 UTC minus 3 hours
        assert_eq!(main, format!("⏰ Truck #{} - Mon 11:00", ts_suffix()));

        let heads_up = format_reminder_display(&reminders[1], offset);
        assert_eq!(
            heads_up,
            format!("🔔 Truck #{} (heads-up) - Mon 10:55", ts_suffix())
        );
    }

    #[test]
    fn display_survives_bad_job_id() {
        let mut reminder = plan_reminders(&request(Kind::Truck, None, None), sample_now())
            .0
            .remove(0);
        reminder.job_id = "not:a:job".to_string();
        let offset = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            format_reminder_display(&reminder, offset),
            "⏰ Unknown - Mon 14:00"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn job_queue_fires_in_order_and_honours_cancel() {
        let (reminders_a, _) =
            plan_reminders(&request(Kind::Truck, None, Some("5m")), Utc::now());
        let mut queue = JobQueue::new();
        for r in reminders_a.clone() {
            queue.enqueue(r);
        }
        // Cancel the main job; only the heads-up should fire.
        queue.cancel(&reminders_a[0].job_id);

        let fired = queue.next().await;
        assert_eq!(fired.job_id, reminders_a[1].job_id);
        assert!(queue.jobs.is_empty());
    }
}
