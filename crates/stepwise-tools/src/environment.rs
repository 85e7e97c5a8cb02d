//! External environment contract
//!
//! The environment is the shared mutable resource tools act on. Each
//! scenario run owns exactly one instance; concurrent runs get their own.

use async_trait::async_trait;

/// External system a scenario run acts on
#[async_trait]
pub trait Environment: Send + Sync + 'static {
    /// Locator of the current external state (e.g. the current page URL)
    fn current_address(&self) -> String;

    /// Short textual description of the current external state
    ///
    /// Must stay cheap: headline text, not a full dump.
    async fn describe_state(&self) -> String;
}
