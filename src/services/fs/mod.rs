pub mod listing;
pub mod paths;

pub use listing::EntryCatalog;
pub use paths::PathResolver;
