//! # Root payment gateway server
//! This crate hosts the long-running process for the root payment gateway. It is responsible for:
//! * Running the reconciliation worker, which matches on-chain payments to purchase requests on a timer.
//! * Serving a small HTTP API so that buyers can open purchase requests and check on them.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /api/payment/create`: Opens a purchase request for a root.
//! * `GET /api/payment/status/{id}`: Returns a purchase request with its current status.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod rate_limit;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
