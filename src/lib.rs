//! Onboarding flow: wizard session controller with debounced persistence.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
