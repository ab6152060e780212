//! CLI command implementations

mod config;
mod forward;
mod run;
mod templates;

pub use config::{config_init, config_path, config_show};
pub use forward::{forward_command, parse_ports, parse_target};
pub use run::{run_command, serve_template};
pub use templates::{discover_templates, load_template, templates_list, templates_show};
