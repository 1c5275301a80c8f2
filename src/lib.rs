//! Sentinel placement engine
//!
//! Classifies newly arrived files with an ensemble of voters and places them
//! into the user's own folder structure, learning from every placement.
//!
//! Pipeline: [`enrich`] → [`classify`] → [`services::processor`] routing over
//! the [`atlas`] → [`execution`] (transactional, undoable moves) → feedback
//! into [`memory`], the atlas and the [`ledger`].

pub mod atlas;
pub mod classify;
pub mod commands;
pub mod config;
pub mod enrich;
pub mod execution;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod nli;
pub mod security;
pub mod services;
pub mod session;
pub mod utils;
pub mod vector;
pub mod wal;

pub use commands::AppState;
pub use config::Settings;
