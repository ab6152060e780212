//! Output formatting utilities for the CLI
//!
//! Tables for forward instances and templates, plus colored status messages.

use std::path::PathBuf;

use crossterm::style::Color;
use tabled::{settings::Style, Table, Tabled};

use kf_core::time::elapsed_duration;
use kf_core::{ForwardInstance, ForwardStatus, Template};

/// Format forward instances as an ASCII table
pub fn format_instances(instances: &[ForwardInstance]) -> String {
    if instances.is_empty() {
        return "No forwards".to_string();
    }

    #[derive(Tabled)]
    struct InstanceRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "POD")]
        pod: String,
        #[tabled(rename = "UPTIME")]
        uptime: String,
        #[tabled(rename = "RECONNECTS")]
        reconnects: u32,
    }

    let rows: Vec<InstanceRow> = instances
        .iter()
        .map(|i| InstanceRow {
            name: i.name.clone(),
            status: i.status.to_string(),
            local: i.local_address().unwrap_or_else(|| "-".to_string()),
            pod: i.resolved_pod.clone().unwrap_or_else(|| "-".to_string()),
            uptime: match (i.status, i.started_at) {
                (ForwardStatus::Running, Some(started)) => {
                    format_duration(elapsed_duration(started).as_secs())
                }
                _ => "-".to_string(),
            },
            reconnects: i.reconnect_attempts,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format resolved secret and config values, masking sensitive ones
///
/// Returns `None` when no instance references any value.
pub fn format_secrets(instances: &[ForwardInstance]) -> Option<String> {
    #[derive(Tabled)]
    struct SecretRow {
        #[tabled(rename = "FORWARD")]
        forward: String,
        #[tabled(rename = "SOURCE")]
        source: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let rows: Vec<SecretRow> = instances
        .iter()
        .flat_map(|i| {
            i.secrets.iter().map(move |s| SecretRow {
                forward: i.name.clone(),
                source: format!("{}/{}", s.reference.kind, s.reference.resource),
                name: s.reference.label().to_string(),
                value: s.display_value(),
            })
        })
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(Table::new(rows).with(Style::rounded()).to_string())
    }
}

/// Format template files as an ASCII table
pub fn format_templates(templates: &[(PathBuf, Template)]) -> String {
    if templates.is_empty() {
        return "No templates found".to_string();
    }

    #[derive(Tabled)]
    struct TemplateRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "FORWARDS")]
        forwards: usize,
        #[tabled(rename = "TAGS")]
        tags: String,
        #[tabled(rename = "FILE")]
        file: String,
    }

    let rows: Vec<TemplateRow> = templates
        .iter()
        .map(|(path, t)| TemplateRow {
            name: t.name.clone(),
            forwards: t.forwards.len(),
            tags: if t.tags.is_empty() {
                "-".to_string()
            } else {
                t.tags.join(", ")
            },
            file: path.display().to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the forwards of one template as an ASCII table
pub fn format_template(template: &Template) -> String {
    #[derive(Tabled)]
    struct ForwardRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "NAMESPACE")]
        namespace: String,
        #[tabled(rename = "PORTS")]
        ports: String,
        #[tabled(rename = "SECRETS")]
        secrets: usize,
    }

    let mut output = format!("Template: {}\n", template.name);
    if let Some(description) = &template.description {
        output.push_str(&format!("{}\n", description));
    }

    if template.forwards.is_empty() {
        output.push_str("No forwards defined\n");
        return output;
    }

    let rows: Vec<ForwardRow> = template
        .forwards
        .iter()
        .map(|f| ForwardRow {
            name: f.name.clone(),
            target: f.target.to_string(),
            namespace: f.namespace.clone().unwrap_or_else(|| "-".to_string()),
            ports: format!(
                "{}:{}",
                if f.local_port == 0 {
                    "auto".to_string()
                } else {
                    f.local_port.to_string()
                },
                f.remote_port
            ),
            secrets: f.secrets.len(),
        })
        .collect();

    output.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    output
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

fn print_prefixed(mut out: impl std::io::Write, color: Color, prefix: &str, msg: &str) {
    use crossterm::style::{Print, ResetColor, SetForegroundColor};

    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
