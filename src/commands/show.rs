//! Show command - displays information.

use crate::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) {
    match target {
        ShowTarget::Config => config.print(),
    }
}
