use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Schedule Types ────────────────────

/// A daily activity window with a target action rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Window start (local time of day).
    #[serde(with = "time_of_day")]
    pub start: NaiveTime,
    /// Window end (local time of day).
    #[serde(with = "time_of_day")]
    pub end: NaiveTime,
    /// Target number of cycles per hour. Must be positive.
    pub actions_per_hour: i32,
}

impl Interval {
    pub fn new(start: NaiveTime, end: NaiveTime, actions_per_hour: i32) -> Self {
        Self {
            start,
            end,
            actions_per_hour,
        }
    }

    /// Whether `time` falls inside the window (start inclusive, end exclusive).
    pub fn covers(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    /// Window length in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// `HH:MM` on the way out, `HH:MM` or `HH:MM:SS` on the way in.
mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

// ──────────────────── Interaction Types ────────────────────

/// Kind of interaction an agent recorded against a content item or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Liked,
    CommentedOn,
    RepliedTo,
    InteractedWithCommentUnder,
    Created,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Liked => "liked",
            EdgeKind::CommentedOn => "commented_on",
            EdgeKind::RepliedTo => "replied_to",
            EdgeKind::InteractedWithCommentUnder => "interacted_with_comment_under",
            EdgeKind::Created => "created",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "liked" => Some(EdgeKind::Liked),
            "commented_on" => Some(EdgeKind::CommentedOn),
            "replied_to" => Some(EdgeKind::RepliedTo),
            "interacted_with_comment_under" => Some(EdgeKind::InteractedWithCommentUnder),
            "created" => Some(EdgeKind::Created),
            _ => None,
        }
    }
}

/// One immutable entry of an agent's interaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEdge {
    pub kind: EdgeKind,
    /// Content item id, or comment id for `RepliedTo`.
    pub target_id: String,
    pub at: DateTime<Utc>,
}

impl InteractionEdge {
    pub fn new(kind: EdgeKind, target_id: impl Into<String>) -> Self {
        Self {
            kind,
            target_id: target_id.into(),
            at: Utc::now(),
        }
    }
}

// ──────────────────── Control Types ────────────────────

/// Admin action queued for the running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Clear any stop and plan the rest of today.
    Schedule,
    /// Run one cycle now, outside the schedule.
    RunNow,
    Stop,
    Delete,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Schedule => "schedule",
            ControlAction::RunNow => "run_now",
            ControlAction::Stop => "stop",
            ControlAction::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "schedule" => Some(ControlAction::Schedule),
            "run_now" => Some(ControlAction::RunNow),
            "stop" => Some(ControlAction::Stop),
            "delete" => Some(ControlAction::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub id: i64,
    pub agent_id: String,
    pub action: ControlAction,
    pub requested_at: DateTime<Utc>,
}

// ──────────────────── Content Types ────────────────────

/// Read-only projection of a content item from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// Read-only projection of a comment under a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentItem {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

// ──────────────────── Agent Types ────────────────────

/// Onboarding form for a new agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub username: String,
    /// Generated at onboarding when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub nickname: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(alias = "schedule")]
    pub intervals: Vec<Interval>,
    pub functions: Vec<String>,
}

fn default_locale() -> String {
    "en_US".to_string()
}

/// The agent aggregate. Owns its intervals, pipeline, and interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    pub locale: String,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Platform-side user id, when the platform assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    pub intervals: Vec<Interval>,
    /// Ordered pipeline of function names.
    pub functions: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interacted_item_id: Option<String>,
    /// Append-only interaction log.
    #[serde(default)]
    pub edges: Vec<InteractionEdge>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Build a fresh agent from an onboarding profile and its resolved password.
    pub fn from_profile(profile: AgentProfile, password: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: profile.username,
            password,
            nickname: profile.nickname,
            name: profile.name,
            gender: profile.gender,
            age: profile.age,
            location: profile.location,
            occupation: profile.occupation,
            locale: profile.locale,
            interests: profile.interests,
            platform_id: None,
            intervals: profile.intervals,
            functions: profile.functions,
            is_active: false,
            last_interacted_item_id: None,
            edges: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether any of the agent's intervals covers `time`.
    pub fn is_scheduled_at(&self, time: NaiveTime) -> bool {
        self.intervals.iter().any(|i| i.covers(time))
    }

    /// Edges of one kind, oldest first.
    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &InteractionEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Demographic summary handed to the oracle.
    pub fn profile_text(&self) -> String {
        let mut lines = vec![
            format!("Name: {}", self.name),
            format!("Nickname: {}", self.nickname),
        ];
        if let Some(age) = self.age {
            lines.push(format!("Age: {age}"));
        }
        if let Some(gender) = &self.gender {
            lines.push(format!("Gender: {gender}"));
        }
        if let Some(location) = &self.location {
            lines.push(format!("Location: {location}"));
        }
        if let Some(occupation) = &self.occupation {
            lines.push(format!("Occupation: {occupation}"));
        }
        lines.push(format!("Locale: {}", self.locale));
        lines.join("\n")
    }

    pub fn interests_text(&self) -> String {
        self.interests.join(", ")
    }

    /// Dashboard-style status label.
    pub fn status(&self) -> &'static str {
        if self.is_active { "Online" } else { "Offline" }
    }
}
