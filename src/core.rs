//! Core abstractions and types.
//!
//! *Users* are mainly interested in implementing the [`Function`] trait,
//! optionally specifying the [domain](Domain) when the variables are subject
//! to bound constraints.

mod domain;
mod function;

pub use domain::*;
pub use function::*;
