//! Model artifact downloader: resumable, multi-mirror, with a durable state
//! journal and per-artifact progress events.
//!
//! The [`coordinator::Coordinator`] is the entry point. It is built from a
//! [`catalog::Catalog`], a [`state_store::StateStore`] and a
//! [`transfer::TransferEngine`] (which owns the [`mirror::MirrorPolicy`]).

pub mod catalog;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod layout;
pub mod logging;
pub mod mirror;
pub mod retry;
pub mod state_store;
pub mod storage;
pub mod transfer;
