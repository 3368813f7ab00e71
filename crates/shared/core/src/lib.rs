//! QS Core Domain
//!
//! Pure domain types shared by the broker bridge and its consumers.
//! This crate contains no threads, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    Bar, OrderId, OrderSnapshot, OrderSpec, OrderStatus, OrderType, Position, PositionSnapshot,
    RequestId, Side, TickKind, TimeInForce,
};
pub use values::{Price, Quantity, Symbol, Timestamp};
