//! Filter subscriptions and their download state machine
//!
//! Downloads are performed by an external collaborator, which reports
//! progress as [`DownloadEvent`]s. Each event moves a filter's
//! [`DownloadState`] along a fixed set of transitions.

use std::time::{SystemTime, UNIX_EPOCH};

use af_core::types::FilterId;
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// A subscribed filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(with = "filter_id")]
    pub id: FilterId,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub download_state: DownloadState,
    /// Milliseconds since the epoch of the last successful download, -1 if never
    #[serde(default = "never")]
    pub update_time: i64,
}

impl Filter {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: FilterId::from_url(&url),
            url,
            name: name.into(),
            enabled: true,
            download_state: DownloadState::None,
            update_time: never(),
        }
    }

    pub fn has_downloaded(&self) -> bool {
        self.update_time > 0
    }

    /// Apply a download event, returning the new state.
    ///
    /// On success the update time is stamped; the caller persists the data.
    pub fn apply(&mut self, event: &DownloadEvent) -> Result<DownloadState, TransitionError> {
        let next = self
            .download_state
            .on(event)
            .ok_or_else(|| TransitionError {
                id: self.id.clone(),
                from: self.download_state,
                event: event.name(),
            })?;

        if next == DownloadState::Success {
            self.update_time = now_millis();
        }
        self.download_state = next;
        Ok(next)
    }
}

fn enabled_by_default() -> bool {
    true
}

fn never() -> i64 {
    -1
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |d| d.as_millis() as i64)
}

mod filter_id {
    use af_core::types::FilterId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &FilterId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(id.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FilterId, D::Error> {
        String::deserialize(deserializer).map(FilterId::new)
    }
}

// =============================================================================
// Download State
// =============================================================================

/// Where a filter's download currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    #[default]
    None,
    Enqueued,
    Downloading,
    Installing,
    Success,
    Failed,
    Cancelled,
}

impl DownloadState {
    /// True while a download is queued or running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Enqueued | Self::Downloading | Self::Installing)
    }

    /// The state after `event`, or `None` if the event does not apply.
    pub fn on(self, event: &DownloadEvent) -> Option<Self> {
        match (self, event) {
            (Self::None | Self::Success | Self::Failed | Self::Cancelled, DownloadEvent::Enqueued) => {
                Some(Self::Enqueued)
            }
            (Self::Enqueued, DownloadEvent::Started) => Some(Self::Downloading),
            // Schedulers may coalesce progress, so running states can be skipped.
            (Self::Enqueued | Self::Downloading, DownloadEvent::Installing) => Some(Self::Installing),
            (Self::Enqueued | Self::Downloading | Self::Installing, DownloadEvent::Succeeded { .. }) => {
                Some(Self::Success)
            }
            (Self::Enqueued | Self::Downloading | Self::Installing, DownloadEvent::Failed) => Some(Self::Failed),
            (Self::Enqueued | Self::Downloading | Self::Installing, DownloadEvent::Cancelled) => {
                Some(Self::Cancelled)
            }
            _ => None,
        }
    }
}

/// Progress reported by the download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Enqueued,
    Started,
    /// Data fetched; being handed to the store
    Installing,
    /// Raw filter-list bytes as fetched
    Succeeded { data: Vec<u8> },
    Failed,
    Cancelled,
}

impl DownloadEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Started => "started",
            Self::Installing => "installing",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_derives_from_url() {
        let a = Filter::new("https://easylist.to/easylist/easylist.txt", "EasyList");
        let b = Filter::new("https://easylist.to/easylist/easylist.txt", "");
        assert_eq!(a.id, b.id);
        assert!(a.enabled);
        assert!(!a.has_downloaded());
        assert_eq!(a.download_state, DownloadState::None);
    }

    #[test]
    fn download_lifecycle() {
        let mut filter = Filter::new("https://lists.test/a.txt", "A");
        assert_eq!(filter.apply(&DownloadEvent::Enqueued), Ok(DownloadState::Enqueued));
        assert_eq!(filter.apply(&DownloadEvent::Started), Ok(DownloadState::Downloading));
        assert!(filter.download_state.is_active());
        assert_eq!(filter.apply(&DownloadEvent::Installing), Ok(DownloadState::Installing));
        assert_eq!(
            filter.apply(&DownloadEvent::Succeeded { data: b"||a.test^".to_vec() }),
            Ok(DownloadState::Success)
        );
        assert!(filter.has_downloaded());

        // A finished download may be queued again.
        assert_eq!(filter.apply(&DownloadEvent::Enqueued), Ok(DownloadState::Enqueued));
        assert_eq!(filter.apply(&DownloadEvent::Cancelled), Ok(DownloadState::Cancelled));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut filter = Filter::new("https://lists.test/a.txt", "A");
        let err = filter.apply(&DownloadEvent::Started).unwrap_err();
        assert_eq!(err.from, DownloadState::None);
        assert_eq!(err.event, "started");
        assert_eq!(filter.download_state, DownloadState::None);

        filter.apply(&DownloadEvent::Enqueued).unwrap();
        assert!(filter.apply(&DownloadEvent::Enqueued).is_err());
        assert_eq!(filter.apply(&DownloadEvent::Failed), Ok(DownloadState::Failed));
        assert!(!filter.has_downloaded());
        assert!(filter.apply(&DownloadEvent::Succeeded { data: Vec::new() }).is_err());
        assert!(filter.apply(&DownloadEvent::Installing).is_err());
    }

    #[test]
    fn running_states_may_be_skipped() {
        let mut filter = Filter::new("https://lists.test/a.txt", "A");
        filter.apply(&DownloadEvent::Enqueued).unwrap();
        assert_eq!(
            filter.apply(&DownloadEvent::Succeeded { data: b"||a.test^".to_vec() }),
            Ok(DownloadState::Success)
        );
        assert!(filter.has_downloaded());

        filter.apply(&DownloadEvent::Enqueued).unwrap();
        assert_eq!(filter.apply(&DownloadEvent::Installing), Ok(DownloadState::Installing));
    }

    #[test]
    fn persists_as_json() {
        let mut filter = Filter::new("https://lists.test/a.txt", "A");
        filter.enabled = false;
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["downloadState"], "NONE");
        assert_eq!(json["updateTime"], -1);
        assert_eq!(json["id"], filter.id.as_str());

        let restored: Filter = serde_json::from_str(
            r#"{"id":"abc","url":"https://lists.test/b.txt","downloadState":"SUCCESS","updateTime":5}"#,
        )
        .unwrap();
        assert_eq!(restored.id.as_str(), "abc");
        assert!(restored.enabled);
        assert!(restored.has_downloaded());
    }
}
