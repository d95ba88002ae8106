pub mod batch;
pub mod discover;
pub mod vm;
