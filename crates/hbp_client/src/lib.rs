//! # HBP Client
//!
//! Stores for the HBP collaboratory REST services.
//!
//! This crate provides:
//! - `EntityStore` for the document service (entities, children, metadata, ACLs)
//! - `IdentityStore` for users and groups
//! - `CollabStore` for collabs
//! - `ClientConfig`, the service URLs and transport settings
//!
//! Listings are returned as `hbp_paging` cursors. Identical GETs running at
//! the same time are sent once, through a deduplication map owned by each
//! store.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod collab;
mod config;
mod dedup;
mod entity;
mod identity;
mod model;

pub use collab::{CollabQuery, CollabStore};
pub use config::{
    ClientConfig, ConfigError, DEFAULT_COLLAB_URL, DEFAULT_DOCUMENT_URL, DEFAULT_IDENTITY_URL,
};
pub use dedup::InFlight;
pub use entity::{
    EntityStore, ANCESTOR_RETRIEVAL_ERROR, ENTITY_CREATION_ERROR, FILE_ALREADY_EXISTS_ERROR,
};
pub use identity::{batch_urls, IdentityQuery, IdentityStore, MAX_URL_LENGTH};
pub use model::{Collab, CurrentUser, Entity, Group, User, UserAccess};
