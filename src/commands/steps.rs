//! Steps command - lists the default pipeline.

use crate::steps::default_steps;

/// Print the default steps in the order the build runs them.
pub fn cmd_steps() {
    println!("Customization steps:");
    for (i, step) in default_steps().iter().enumerate() {
        println!("  {}. {}", i + 1, step.name());
    }
}
