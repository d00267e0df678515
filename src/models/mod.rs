pub mod entry;
pub mod metadata;

pub use entry::{Entry, EntryKind};
pub use metadata::{AttributeValue, MetaData};
