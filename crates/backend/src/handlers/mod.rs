// Aggregate handlers
pub mod a001_cash_register;
pub mod a002_cash_register_token;

// Projection handlers
pub mod p900_cash_register_summary;
