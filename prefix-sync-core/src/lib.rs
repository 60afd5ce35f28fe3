#![doc = "prefix-sync-core: core logic library for prefix-sync."]

//! This crate contains the whole NetBox → git pipeline: the HTTP primitive,
//! the inventory and pull request clients, output rendering, git plumbing and
//! the synchronisation driver. The CLI crate only loads configuration and
//! wires these pieces together.
//!
//! # Usage
//! Build a [`config::SyncConfig`], construct the clients from it and call
//! [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod error;
pub mod github;
pub mod http;
pub mod inventory;
pub mod output;
pub mod repository;
pub mod secrets;
pub mod synchronise;
