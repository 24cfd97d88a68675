//! Integration test modules

mod models;
mod routing;
mod usage;
