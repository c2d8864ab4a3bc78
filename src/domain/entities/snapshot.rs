use serde::{Deserialize, Serialize};

/// Latest scrape/export of the club administration portal. Records decode
/// into explicit tagged variants; a payload matching no known shape fails
/// the run loudly instead of being silently defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub taken_at: i64,
    pub records: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRecord {
    Member(MemberRecord),
    Team(TeamRecord),
    Committee(CommitteeRecord),
    ImportantDate(ImportantDateRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_number: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
    /// Base64 portrait bytes captured during the scrape, when available.
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub parents: Vec<ParentRecord>,
    #[serde(default)]
    pub teams: Vec<TeamAssignment>,
}

impl MemberRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRecord {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ParentRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub team: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Member numbers of the committee's members.
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportantDateRecord {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
}
