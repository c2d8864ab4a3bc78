pub mod rest_collection;

pub use rest_collection::RestCollection;
