//! CCNL Cost Engine library crate.
//!
//! This crate exposes the labor cost calculator, the agreement
//! comparison assembler and the agreement catalog as reusable
//! modules.  External applications may call
//! [`calculator::calculate_cost`] or [`comparison::compare`] directly,
//! or embed the HTTP API via [`api::build_router`].

pub mod api;
pub mod calculator;
pub mod catalog;
pub mod comparison;
pub mod config;
pub mod error;
pub mod models;
pub mod share;
pub mod store;
pub mod template;
