pub mod memory;
pub mod store;
pub mod valkey;

pub use memory::MemoryStateStore;
pub use store::{StateStore, StoreError};
pub use valkey::ValkeyStateStore;
