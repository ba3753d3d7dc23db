//! Template views and rendering helpers.

pub mod views;
