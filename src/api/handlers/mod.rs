//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Question answering, plain JSON or Server-Sent Events.
pub mod chat;
/// Upload, listing, deletion, clearing and statistics.
pub mod documents;
/// Service health.
pub mod health;
