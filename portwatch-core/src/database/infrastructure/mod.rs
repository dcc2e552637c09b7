//! Concrete storage adapters implementing the database ports.

pub mod postgres;
