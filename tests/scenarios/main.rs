//! End-to-end scenarios driving `RouterState` with synthetic frames
//!
//! Run with: cargo test --test scenarios

mod common;
mod ipv4;
mod ipv6;
mod nat;
mod nat64;
