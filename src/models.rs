use anyhow::Error;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows that carry an owning-user reference. Every read or write performed on
/// behalf of a session goes through this one predicate.
pub trait Owned {
    fn owner_id(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityStatus {
    #[default]
    #[serde(rename = "Haven't Started")]
    HaventStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Applied")]
    Applied,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OpportunityStatus::HaventStarted => "Haven't Started",
            OpportunityStatus::InProgress => "In Progress",
            OpportunityStatus::Applied => "Applied",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "Haven't Started" => Ok(OpportunityStatus::HaventStarted),
            "In Progress" => Ok(OpportunityStatus::InProgress),
            "Applied" => Ok(OpportunityStatus::Applied),
            _ => Err(Error::msg(format!("Unknown opportunity status: {}", s))),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, OpportunityStatus::Applied)
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Done")]
    NotDone,
    #[serde(rename = "Done")]
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::NotDone => "Not Done",
            TaskStatus::Done => "Done",
        }
    }

    // Accepts the lowercase filter values the tasks page sends as well as the
    // stored representation.
    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "not done" => Ok(TaskStatus::NotDone),
            "done" => Ok(TaskStatus::Done),
            _ => Err(Error::msg(format!("Unknown task status: {}", s))),
        }
    }

    pub fn from_done(done: bool) -> Self {
        if done { TaskStatus::Done } else { TaskStatus::NotDone }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Opportunity {
    pub id: i64,
    pub org_name: String,
    pub title: String,
    pub app_deadline: NaiveDate,
    pub personal_deadline: NaiveDate,
    pub requirements: String,
    pub link: String,
    pub short_description: String,
    pub category: String,
    pub priority: i64,
    pub status: OpportunityStatus,
    pub notes: String,
    pub other_info: String,
    pub contact_info: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbOpportunity {
    pub id: Option<i64>,
    pub org_name: Option<String>,
    pub title: Option<String>,
    pub app_deadline: Option<NaiveDate>,
    pub personal_deadline: Option<NaiveDate>,
    pub requirements: Option<String>,
    pub link: Option<String>,
    pub short_description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub other_info: Option<String>,
    pub contact_info: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub user_id: Option<i64>,
}

impl From<DbOpportunity> for Opportunity {
    fn from(db: DbOpportunity) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            org_name: db.org_name.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            app_deadline: db.app_deadline.unwrap_or_else(|| Utc::now().date_naive()),
            personal_deadline: db
                .personal_deadline
                .unwrap_or_else(|| Utc::now().date_naive()),
            requirements: db.requirements.unwrap_or_default(),
            link: db.link.unwrap_or_default(),
            short_description: db.short_description.unwrap_or_default(),
            category: db.category.unwrap_or_default(),
            priority: db.priority.unwrap_or_default(),
            status: OpportunityStatus::from_str(&db.status.unwrap_or_default())
                .unwrap_or_default(),
            notes: db.notes.unwrap_or_default(),
            other_info: db.other_info.unwrap_or_default(),
            contact_info: db.contact_info.unwrap_or_default(),
            location: db.location.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
            user_id: db.user_id.unwrap_or_default(),
        }
    }
}

impl Owned for Opportunity {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

/// The writable field set of an opportunity, shared by create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct OpportunityFields {
    pub org_name: String,
    pub title: String,
    pub app_deadline: NaiveDate,
    pub personal_deadline: NaiveDate,
    pub requirements: String,
    pub link: String,
    pub short_description: String,
    pub category: String,
    pub priority: i64,
    pub status: OpportunityStatus,
    pub notes: String,
    pub other_info: String,
    pub contact_info: String,
    pub location: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct Task {
    pub id: i64,
    pub description: String,
    pub status: TaskStatus,
    pub opp_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTask {
    pub id: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub opp_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbTask> for Task {
    fn from(db: DbTask) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            status: TaskStatus::from_str(&db.status.unwrap_or_default()).unwrap_or_default(),
            opp_id: db.opp_id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

impl Owned for Task {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

/// A task joined with its parent opportunity's title for display.
#[derive(Debug, Serialize, Clone)]
pub struct TaskWithOpportunity {
    pub id: i64,
    pub description: String,
    pub status: TaskStatus,
    pub opp_id: i64,
    pub opp_title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTaskWithOpportunity {
    pub id: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub opp_id: Option<i64>,
    pub opp_title: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbTaskWithOpportunity> for TaskWithOpportunity {
    fn from(db: DbTaskWithOpportunity) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            status: TaskStatus::from_str(&db.status.unwrap_or_default()).unwrap_or_default(),
            opp_id: db.opp_id.unwrap_or_default(),
            opp_title: db.opp_title.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Material {
    pub id: i64,
    pub title: String,
    pub file: String,
    pub opp_id: Option<i64>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMaterial {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub file: Option<String>,
    pub opp_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbMaterial> for Material {
    fn from(db: DbMaterial) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            file: db.file.unwrap_or_default(),
            opp_id: db.opp_id,
            user_id: db.user_id.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

impl Owned for Material {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLink {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbLink> for Link {
    fn from(db: DbLink) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            url: db.url.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

impl Owned for Link {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

/// One application event joined with its opportunity for the history feed.
#[derive(Debug, Serialize, Clone)]
pub struct ApplicationRecord {
    pub opp_id: i64,
    pub title: String,
    pub org_name: String,
    pub link: String,
    pub application_date: NaiveDate,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbApplicationRecord {
    pub opp_id: Option<i64>,
    pub title: Option<String>,
    pub org_name: Option<String>,
    pub link: Option<String>,
    pub application_date: Option<NaiveDate>,
}

impl From<DbApplicationRecord> for ApplicationRecord {
    fn from(db: DbApplicationRecord) -> Self {
        Self {
            opp_id: db.opp_id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            org_name: db.org_name.unwrap_or_default(),
            link: db.link.unwrap_or_default(),
            application_date: db
                .application_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        }
    }
}
