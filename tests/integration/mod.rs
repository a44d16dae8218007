//! Integration tests against the in-memory directory.

mod failover;
mod groups;
mod membership;
mod pagination;
mod users;
