pub mod fs;
pub mod metadata;
pub mod search;
pub mod thumbnails;
