//! EcoRice field monitoring service.
//!
//! Simulated paddy sensor readings are appended to a CSV log, aggregated
//! into monthly means, turned into threshold insights, and priced as carbon
//! credits. The `ecorice` binary drives these from the command line; a
//! dashboard front end consumes `session::DashboardSnapshot`.

pub mod aggregate;
pub mod carbon;
pub mod config;
pub mod insight;
pub mod logging;
pub mod model;
pub mod session;
pub mod source;
pub mod store;
