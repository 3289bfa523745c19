pub mod donation;
pub mod event;
