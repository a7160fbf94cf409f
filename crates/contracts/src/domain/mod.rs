pub mod a001_cash_register;
pub mod a002_cash_register_token;
pub mod common;
