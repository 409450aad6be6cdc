use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task categories the Last War bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Truck,
    Build,
    Research,
    Train,
    Ministry,
    Custom,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Truck => "truck",
            Kind::Build => "build",
            Kind::Research => "research",
            Kind::Train => "train",
            Kind::Ministry => "ministry",
            Kind::Custom => "custom",
        }
    }

    /// Capitalized form used in task labels and summaries.
    pub fn label(self) -> &'static str {
        match self {
            Kind::Truck => "Truck",
            Kind::Build => "Build",
            Kind::Research => "Research",
            Kind::Train => "Train",
            Kind::Ministry => "Ministry",
            Kind::Custom => "Custom",
        }
    }
}

impl FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truck" => Ok(Kind::Truck),
            "build" => Ok(Kind::Build),
            "research" => Ok(Kind::Research),
            "train" => Ok(Kind::Train),
            "ministry" => Ok(Kind::Ministry),
            "custom" => Ok(Kind::Custom),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a reminder is the task-done ping or the early heads-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Main,
    HeadsUp,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Main => "main",
            JobType::HeadsUp => "headsup",
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(JobType::Main),
            "headsup" => Ok(JobType::HeadsUp),
            _ => Err(()),
        }
    }
}

/// A single pending reminder, persisted until delivered or cancelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub job_id: String,
    pub user_id: u64,
    pub chat_id: i64,
    pub kind: Kind,
    pub task_name: Option<String>,
    pub fire_at: DateTime<Utc>,
    pub message: String,
    pub job_type: JobType,
}

/// Pending reminders, kept in memory and mirrored to a JSON file so a
/// restart does not lose scheduled jobs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(skip)]
    path: Option<PathBuf>,
    reminders: HashMap<String, Reminder>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_owned();
        let mut db = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Database::default()
        };
        db.path = Some(path);
        Ok(db)
    }

    /// A database that is never written to disk, for tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Database::default()
    }

    pub fn insert(&mut self, reminder: Reminder) -> anyhow::Result<()> {
        self.reminders.insert(reminder.job_id.clone(), reminder);
        self.save()
    }

    pub fn remove(&mut self, job_id: &str) -> anyhow::Result<Option<Reminder>> {
        let removed = self.reminders.remove(job_id);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Pending reminders for one user in one chat, soonest first.
    pub fn user_reminders(&self, user_id: u64, chat_id: i64) -> Vec<Reminder> {
        let mut reminders: Vec<_> = self
            .reminders
            .values()
            .filter(|r| r.user_id == user_id && r.chat_id == chat_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|r| r.fire_at);
        reminders
    }

    pub fn all_reminders(&self) -> Vec<Reminder> {
        self.reminders.values().cloned().collect()
    }

    fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_vec_pretty(self)?;
        AtomicFile::new(path, AllowOverwrite)
            .write(|f| f.write_all(&raw))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reminder(job_id: &str, user_id: u64, chat_id: i64, in_minutes: i64) -> Reminder {
        Reminder {
            job_id: job_id.to_string(),
            user_id,
            chat_id,
            kind: Kind::Truck,
            task_name: None,
            fire_at: Utc::now() + Duration::minutes(in_minutes),
            message: "⏰ Truck #000 is ready!".to_string(),
            job_type: JobType::Main,
        }
    }

    #[test]
    fn user_reminders_filters_and_sorts() {
        let mut db = Database::in_memory();
        db.insert(reminder("a", 1, 10, 30)).unwrap();
        db.insert(reminder("b", 1, 10, 5)).unwrap();
        db.insert(reminder("c", 2, 10, 1)).unwrap();
        db.insert(reminder("d", 1, 11, 1)).unwrap();

        let mine = db.user_reminders(1, 10);
        assert_eq!(
            mine.iter().map(|r| r.job_id.as_str()).collect::<Vec<_>>(),
            ["b", "a"]
        );
    }

    #[test]
    fn insert_replaces_same_job_id() {
        let mut db = Database::in_memory();
        db.insert(reminder("a", 1, 10, 30)).unwrap();
        db.insert(reminder("a", 1, 10, 60)).unwrap();
        assert_eq!(db.all_reminders().len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut db = Database::in_memory();
        db.insert(reminder("a", 1, 10, 30)).unwrap();
        assert!(db.remove("a").unwrap().is_some());
        assert!(db.remove("a").unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");

        let mut db = Database::open(&path).unwrap();
        db.insert(reminder("a", 1, 10, 30)).unwrap();
        db.insert(reminder("b", 2, 20, 5)).unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        let all = db.all_reminders();
        assert_eq!(all.len(), 2);
        assert_eq!(db.user_reminders(2, 20).len(), 1);
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("absent.json")).unwrap();
        assert!(db.all_reminders().is_empty());
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            Kind::Truck,
            Kind::Build,
            Kind::Research,
            Kind::Train,
            Kind::Ministry,
            Kind::Custom,
        ] {
            assert_eq!(kind.as_str().parse(), Ok(kind));
        }
        assert!("list".parse::<Kind>().is_err());
    }
}
