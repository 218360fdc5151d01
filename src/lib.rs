//! Pixcache - asynchronous image loading for scrolling lists.
//!
//! Images are resolved through a byte-bounded memory cache, a disk cache of
//! fetched bytes and the network, decoded at the size they are displayed at,
//! and delivered to display targets that may have been recycled meanwhile.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, fetcher, codec and loader.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";
