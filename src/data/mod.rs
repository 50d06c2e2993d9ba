pub mod course;
pub mod store;
pub mod user;
