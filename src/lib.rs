pub mod access;
pub mod database;
pub mod storage;
pub mod transaction;
