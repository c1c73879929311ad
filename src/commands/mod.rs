// ABOUTME: Command module aggregator for the strata CLI.
// ABOUTME: Re-exports deploy, plan, and validate command handlers.

mod deploy;
mod plan;
mod prepare;
mod validate;

pub use deploy::deploy;
pub use plan::plan;
pub use validate::validate;
