use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Time-sortable identifier, used for every persisted entity (messages,
/// topics, summaries, memories, contacts). UUIDv7 embeds a timestamp so ids
/// sort chronologically and correlate cleanly across log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which external channel a message or identity came in on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Api,
    Imessage,
    Discord,
    /// Any platform not in the closed set above; spec.md §3 leaves the enum
    /// open-ended ("platform ∈ {api, imessage, discord, …}").
    Other(String),
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Api => write!(f, "api"),
            Platform::Imessage => write!(f, "imessage"),
            Platform::Discord => write!(f, "discord"),
            Platform::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "api" => Platform::Api,
            "imessage" => Platform::Imessage,
            "discord" => Platform::Discord,
            other => Platform::Other(other.to_string()),
        })
    }
}

/// Canonical message role. Every provider adapter translates to/from this
/// set at its boundary (spec.md §9 redesign flag: "fix a canonical Message
/// variant ... all adapters convert to/from this canonical form").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A function/tool call attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The atomic conversation unit (spec.md §3 Message entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub user_id: Id,
    pub platform: Platform,
    /// Set only when the platform provides a durable id; used for sync idempotence.
    pub platform_msg_id: Option<String>,
    pub role: Role,
    /// May be empty for tool-call-only assistant turns.
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Only present for role=tool.
    pub tool_call_id: Option<String>,
    /// Monotonic per user; immutable once assigned.
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub topic_id: Option<Id>,
}

impl Message {
    /// Validate invariant (a) from spec.md §3: a tool message must carry a
    /// tool_call_id. Does not check that a matching tool_use exists in the
    /// conversation — that is a cross-message invariant enforced by the
    /// ledger at sync time.
    pub fn is_structurally_valid(&self) -> bool {
        match self.role {
            Role::Tool => self.tool_call_id.is_some(),
            _ => true,
        }
    }
}

/// Process-wide persona selector (spec.md §3 Mode entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode(pub String);

impl Mode {
    pub fn guest() -> Self {
        Self("guest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed category set for Memory entries (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Health,
    Career,
    Family,
    Personal,
    TechnicalProjects,
    Social,
    Finance,
    SelfCare,
    Environment,
    Hobbies,
    Philosophy,
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryCategory::Health => "health",
            MemoryCategory::Career => "career",
            MemoryCategory::Family => "family",
            MemoryCategory::Personal => "personal",
            MemoryCategory::TechnicalProjects => "technical_projects",
            MemoryCategory::Social => "social",
            MemoryCategory::Finance => "finance",
            MemoryCategory::SelfCare => "self_care",
            MemoryCategory::Environment => "environment",
            MemoryCategory::Hobbies => "hobbies",
            MemoryCategory::Philosophy => "philosophy",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "health" => Ok(MemoryCategory::Health),
            "career" => Ok(MemoryCategory::Career),
            "family" => Ok(MemoryCategory::Family),
            "personal" => Ok(MemoryCategory::Personal),
            "technical_projects" => Ok(MemoryCategory::TechnicalProjects),
            "social" => Ok(MemoryCategory::Social),
            "finance" => Ok(MemoryCategory::Finance),
            "self_care" => Ok(MemoryCategory::SelfCare),
            "environment" => Ok(MemoryCategory::Environment),
            "hobbies" => Ok(MemoryCategory::Hobbies),
            "philosophy" => Ok(MemoryCategory::Philosophy),
            other => Err(format!("unknown memory category: {}", other)),
        }
    }
}

/// One of the four fixed intra-day summary buckets plus the three rollup
/// levels (spec.md §3 Summary entity, GLOSSARY "Period summary").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Morning,
    Afternoon,
    Evening,
    Night,
    Daily,
    Weekly,
    Monthly,
}

impl SummaryType {
    /// The four period buckets that compose one day, in chronological order.
    pub fn periods() -> [SummaryType; 4] {
        [
            SummaryType::Morning,
            SummaryType::Afternoon,
            SummaryType::Evening,
            SummaryType::Night,
        ]
    }

    pub fn is_period(&self) -> bool {
        matches!(
            self,
            SummaryType::Morning | SummaryType::Afternoon | SummaryType::Evening | SummaryType::Night
        )
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SummaryType::Morning => "morning",
            SummaryType::Afternoon => "afternoon",
            SummaryType::Evening => "evening",
            SummaryType::Night => "night",
            SummaryType::Daily => "daily",
            SummaryType::Weekly => "weekly",
            SummaryType::Monthly => "monthly",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SummaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(SummaryType::Morning),
            "afternoon" => Ok(SummaryType::Afternoon),
            "evening" => Ok(SummaryType::Evening),
            "night" => Ok(SummaryType::Night),
            "daily" => Ok(SummaryType::Daily),
            "weekly" => Ok(SummaryType::Weekly),
            "monthly" => Ok(SummaryType::Monthly),
            other => Err(format!("unknown summary type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_string() {
        for r in [Role::User, Role::Assistant, Role::System, Role::Tool] {
            let s = r.to_string();
            assert_eq!(Role::from_str(&s).unwrap(), r);
        }
    }

    #[test]
    fn tool_message_without_call_id_is_invalid() {
        let msg = Message {
            id: Id::new(),
            user_id: Id::new(),
            platform: Platform::Api,
            platform_msg_id: None,
            role: Role::Tool,
            content: "42".into(),
            tool_calls: None,
            tool_call_id: None,
            created_at: chrono::Utc::now(),
            topic_id: None,
        };
        assert!(!msg.is_structurally_valid());
    }

    #[test]
    fn memory_category_round_trips() {
        for c in [
            MemoryCategory::Health,
            MemoryCategory::TechnicalProjects,
            MemoryCategory::SelfCare,
        ] {
            assert_eq!(MemoryCategory::from_str(&c.to_string()).unwrap(), c);
        }
    }
}
