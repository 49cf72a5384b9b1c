//! The default customization steps, in pipeline order.
//!
//! Each step works on the mounted tree through its [`StepContext`]; the
//! ones that must run tools from the image bind a change-root for just
//! their own duration.
//!
//! [`StepContext`]: crate::pipeline::StepContext

pub mod headless;
pub mod hostname;
pub mod overlay;
pub mod packages;
pub mod software;
pub mod ssh;
pub mod systemd;
pub mod users;
pub mod wifi;

use crate::pipeline::Step;

/// Step names in pipeline order.
pub const STEP_NAMES: [&str; 7] = [
    "Configure hostname",
    "Add user",
    "Enable SSH",
    "Configure headless",
    "Update packages",
    "Install application",
    "Enable WiFi",
];

/// The full customization pipeline.
pub fn default_steps() -> Vec<Step> {
    vec![
        Step::new(STEP_NAMES[0], hostname::configure),
        Step::new(STEP_NAMES[1], users::add),
        Step::new(STEP_NAMES[2], ssh::enable),
        Step::new(STEP_NAMES[3], headless::configure),
        Step::new(STEP_NAMES[4], packages::update),
        Step::new(STEP_NAMES[5], software::install),
        Step::new(STEP_NAMES[6], wifi::enable),
    ]
}
