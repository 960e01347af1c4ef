//! Palisade - authentication and authorization service
//!
//! Issues opaque access/refresh token pairs on password login and answers
//! per-request authorization queries for a fleet of microservices. The
//! permission engine compiles role inheritance into flat per-user permission
//! sets and evaluates concrete requests against them.

pub mod auth;
pub mod client;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod permissions;
pub mod ratelimit;
pub mod roles;
pub mod settings;
pub mod store;
pub mod tokens;
pub mod users;
pub mod web;
