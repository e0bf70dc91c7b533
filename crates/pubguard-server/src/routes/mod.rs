//! HTTP route handlers, grouped by the surface they belong to.

pub mod approval;
pub mod bot;
pub mod events;
pub mod health;
