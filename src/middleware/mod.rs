//! Request middleware.

pub mod cache;
pub mod csrf;
