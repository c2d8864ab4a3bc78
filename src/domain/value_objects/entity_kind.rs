use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Member,
    Parent,
    Team,
    Committee,
    WorkHistory,
    ImportantDate,
    HelpdeskCustomer,
}

impl EntityKind {
    /// Processing order for a run. Members come first so parent and work
    /// history follow-ups find their remote ids in the store.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Member,
        EntityKind::Parent,
        EntityKind::Team,
        EntityKind::Committee,
        EntityKind::WorkHistory,
        EntityKind::ImportantDate,
        EntityKind::HelpdeskCustomer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Member => "member",
            EntityKind::Parent => "parent",
            EntityKind::Team => "team",
            EntityKind::Committee => "committee",
            EntityKind::WorkHistory => "work_history",
            EntityKind::ImportantDate => "important_date",
            EntityKind::HelpdeskCustomer => "helpdesk_customer",
        }
    }

    pub fn parse(value: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
