pub mod pin_session;
pub mod repository;
pub mod service;
