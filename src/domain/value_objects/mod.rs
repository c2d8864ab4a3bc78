pub mod content_hash;
pub mod entity_kind;
pub mod natural_key;
pub mod portal_page;
pub mod relationship;

pub use content_hash::ContentHash;
pub use entity_kind::EntityKind;
pub use natural_key::NaturalKey;
pub use portal_page::PortalPage;
pub use relationship::{RelationshipEdge, RelationshipKind};
