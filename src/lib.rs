//! leadgen: lead report generation service
//!
//! Generates, stores, and serves AI-assembled lead reports behind a
//! role/project permission model. Storage is Sled, the API is Axum, and
//! report generation runs as a background lifecycle per report:
//! enrichment fetch, then sequential per-section AI generation, polled by
//! clients until a terminal state.

pub mod access;
pub mod auth;
pub mod generate;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod poll;
pub mod providers;
pub mod rest;
pub mod storage;
