pub mod gateway;
pub mod store;

pub use gateway::{Gateway, StagedWrite, Transaction};
pub use store::Store;
