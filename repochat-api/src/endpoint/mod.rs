pub mod ask;
pub mod backend;
