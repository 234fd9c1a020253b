//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities.

pub mod connection;

pub use connection::ConnectionRepository;
