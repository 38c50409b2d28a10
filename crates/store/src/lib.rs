//! Persistence layer for the commerce backend.
//!
//! [`CommerceStore`] exposes every multi-row write of the order lifecycle as a
//! single atomic unit: either every row changes or none does. Two
//! implementations are provided:
//! - [`InMemoryStore`], one write lock per unit, for tests and local runs
//! - [`PostgresStore`], one transaction per unit with conditional updates

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    CommerceStore, CreateReplacement, OrderCommit, OrderTransition, PlaceOrder, ReturnCommit,
    ReturnTransition,
};
