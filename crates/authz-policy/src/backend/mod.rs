// backend/mod.rs — The three interchangeable policy backends.

pub mod embedded;
pub mod managed;
pub mod remote;
