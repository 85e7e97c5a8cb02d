//! Stepwise CLI - demo runner
//!
//! Runs the booking scenario against a simulated booking site, with recovery
//! advice replayed from a file and escalations answered on the terminal.

#![warn(unreachable_pub)]

pub mod advisor;
pub mod booking;
pub mod logging;
pub mod operator;
pub mod site;

pub use advisor::ReplayAdvisor;
pub use booking::{BookingScenario, LoginStep, NavigateStep, RoomBookingStep};
pub use logging::LogFormat;
pub use operator::{LineOperator, TerminalOperator};
pub use site::{BookingSite, SiteFault};
