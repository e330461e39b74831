//! Integration tests: settlement against a mock exchange, syndication
//! against a recording webhook, and config-driven signal transforms.

mod mock_market;
mod mock_webhook;
mod settlement;
mod signals;
mod syndication;
