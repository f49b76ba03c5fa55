pub mod memory;

pub use memory::{DurableRecord, InMemoryRecordStore, InMemoryTempStore, TempObject};
