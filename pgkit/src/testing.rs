//! Testing utilities for code that talks to PostgreSQL

pub mod postgres;
