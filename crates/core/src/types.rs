use serde::{Deserialize, Serialize};

/// Athlete identifiers are the backend's BIGSERIAL user ids.
pub type AthleteId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Analysis sessions are identified by time-ordered UUIDs.
pub type SessionId = uuid::Uuid;

/// Where the analysed frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Camera,
    Video,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Camera => "camera",
            InputMode::Video => "video",
        }
    }
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
