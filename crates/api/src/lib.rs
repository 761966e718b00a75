//! `grantlink-api` — HTTP adapter over the association engine.

pub mod app;
