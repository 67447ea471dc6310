pub mod ingest;
pub mod roster;

pub use ingest::{validate_and_append, IngestOutcome};
pub use roster::{Producer, ProducerRoster};
