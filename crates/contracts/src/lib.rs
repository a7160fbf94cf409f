//! Types shared between the cash register backend and its clients

pub mod domain;
pub mod projections;
pub mod shared;
pub mod system;
