//! Collaborator seams: everything the core consumes but does not own.

pub mod connector;
pub mod generator;
pub mod store;

pub use connector::SequenceConnector;
pub use generator::Generator;
pub use store::KeyValueStore;
