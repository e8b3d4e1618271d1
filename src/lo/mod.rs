//! Large-object tier: append-only payload file plus descriptor index
//! (component K).

pub mod descriptor;
pub mod store;

pub use descriptor::Descriptor;
pub use store::LargeObjectStore;
