//! In-memory activity stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Kind of change an activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    /// A dataset was created.
    #[serde(rename = "new package")]
    NewPackage,
    /// A dataset was updated.
    #[serde(rename = "changed package")]
    ChangedPackage,
    /// A dataset was deleted.
    #[serde(rename = "deleted package")]
    DeletedPackage,
}

impl ActivityType {
    /// Maps a dataset hook event to the activity it produces.
    pub fn from_event(event: &str) -> Option<Self> {
        use datahub_plugin::hooks::definitions::events;

        match event {
            events::AFTER_CREATE => Some(Self::NewPackage),
            events::AFTER_UPDATE => Some(Self::ChangedPackage),
            events::AFTER_DELETE => Some(Self::DeletedPackage),
            _ => None,
        }
    }
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Time-ordered identifier.
    pub id: Uuid,
    /// Dataset the activity belongs to.
    pub object_id: String,
    /// Acting user; `None` for internal calls.
    pub user: Option<String>,
    /// Kind of change.
    pub activity_type: ActivityType,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the dataset payload.
    pub data: Value,
}

impl Activity {
    /// Activities without an acting user are hidden from regular listings.
    pub fn is_hidden(&self) -> bool {
        self.user.is_none()
    }
}

/// Append-only store of activities, newest last.
#[derive(Debug, Default)]
pub struct ActivityStream {
    activities: RwLock<Vec<Activity>>,
}

impl ActivityStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an activity and returns it.
    pub async fn record(
        &self,
        object_id: &str,
        user: Option<&str>,
        activity_type: ActivityType,
        data: Value,
    ) -> Activity {
        let activity = Activity {
            id: Uuid::now_v7(),
            object_id: object_id.to_string(),
            user: user.map(str::to_string),
            activity_type,
            timestamp: Utc::now(),
            data,
        };
        self.activities.write().await.push(activity.clone());
        activity
    }

    /// Activities of one dataset, newest first.
    pub async fn list(
        &self,
        object_id: &str,
        limit: usize,
        offset: usize,
        include_hidden: bool,
    ) -> Vec<Activity> {
        self.activities
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| a.object_id == object_id)
            .filter(|a| include_hidden || !a.is_hidden())
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of visible activities of one dataset.
    pub async fn count(&self, object_id: &str) -> usize {
        self.activities
            .read()
            .await
            .iter()
            .filter(|a| a.object_id == object_id && !a.is_hidden())
            .count()
    }

    /// Number of activities across all datasets.
    pub async fn len(&self) -> usize {
        self.activities.read().await.len()
    }

    /// Returns whether nothing was recorded yet.
    pub async fn is_empty(&self) -> bool {
        self.activities.read().await.is_empty()
    }
}
