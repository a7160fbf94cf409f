pub mod p900_cash_register_summary;
