#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod config;
pub mod delivery;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod store;
