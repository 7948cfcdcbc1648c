//! Outbound webhook delivery: fans domain events out to registered HTTP
//! endpoints as signed POSTs, with durable delivery records, exponential
//! backoff, and bounded retries. The store is the source of truth; the
//! scheduler polls it for due work, so nothing depends on in-memory timers
//! surviving a restart.
//!
//! # Receiver contract
//!
//! Delivery is at-least-once: a receiver can see the same delivery more than
//! once (retries, crash recovery) and deliveries to the same endpoint carry
//! no ordering guarantee. Receivers must deduplicate on the
//! `X-Webhook-Delivery` header, which carries the delivery id, and should
//! authenticate the payload by checking `X-Webhook-Signature` against the
//! raw request body with [`signer::verify`] and the endpoint secret.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod inspector;
pub mod registry;
pub mod scheduler;
pub mod signer;
pub mod state;
pub mod store;
pub mod types;
pub mod worker;
