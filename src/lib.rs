//! Audio duplicate detection and cleanup library.
//!
//! The crate is organised as one module per component family; there is no
//! CLI here, only the underlying library surface a frontend would drive.
//! Roughly, data flows:
//!
//! ```text
//! scanner (C7)  -> concurrency (C5 dispatch) -> hasher (C4) -> extract (C1) / probe (C2)
//!                                                             \-> cache (C3)
//! cluster (C6) / album_cluster (C8)  -> quality (C9)  -> rules (C10)  -> staging (C11)
//! ```
//!
//! [`similarity`] and [`unionfind`] are the pure-function/data-structure
//! primitives both clusterers share; [`model`] holds every data shape that
//! crosses a module boundary; [`report`] renders the final groups to the
//! external JSON/CSV scan-result document shapes.

pub mod album_cluster;
pub mod cache;
pub mod cluster;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod extract;
pub mod hasher;
pub mod model;
pub mod probe;
pub mod quality;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod similarity;
pub mod staging;
pub mod unionfind;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Album, AlbumGroup, DuplicateGroup, FileHash, Fingerprint, MbAlbumId, TrackRecord};
