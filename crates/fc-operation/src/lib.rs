pub mod error;
pub mod operation;

pub use error::OperationError;
pub use operation::{decode, encode, try_decode, Operation, ProducerRow};
