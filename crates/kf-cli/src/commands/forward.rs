//! Ad-hoc forward command implementation

use anyhow::{anyhow, bail, Context, Result};

use kf_core::config::ForwardConfig;
use kf_core::{ClusterConnectionInfo, ForwardDefinition, ForwardTarget, Template};

use super::run::serve_template;

/// Parse `pod/NAME`, `svc/NAME`, `service/NAME` or a bare pod name
pub fn parse_target(spec: &str) -> Result<ForwardTarget> {
    let (kind, name) = match spec.split_once('/') {
        Some((kind, name)) => (kind, name),
        None => ("pod", spec),
    };
    if name.is_empty() {
        bail!("Missing resource name in '{}'", spec);
    }

    match kind {
        "pod" | "pods" | "po" => Ok(ForwardTarget::Pod(name.to_string())),
        "svc" | "service" | "services" => Ok(ForwardTarget::Service(name.to_string())),
        other => bail!("Unsupported resource type '{}'; use pod/NAME or svc/NAME", other),
    }
}

/// Parse `LOCAL:REMOTE`, `:REMOTE` (any free local port) or `PORT` (same on both ends)
///
/// Returns `(local, remote)`; a local port of 0 means auto-assign.
pub fn parse_ports(spec: &str) -> Result<(u16, u16)> {
    let port = |s: &str| -> Result<u16> {
        s.parse::<u16>()
            .with_context(|| format!("Invalid port '{}'", s))
    };

    let (local, remote) = match spec.split_once(':') {
        Some(("", remote)) => (0, port(remote)?),
        Some((local, remote)) => (port(local)?, port(remote)?),
        None => {
            let p = port(spec)?;
            (p, p)
        }
    };
    if remote == 0 {
        return Err(anyhow!("Remote port must not be 0"));
    }

    Ok((local, remote))
}

/// Execute the forward command
pub async fn forward_command(
    target: &str,
    ports: &str,
    name: Option<&str>,
    cluster: ClusterConnectionInfo,
    config: ForwardConfig,
) -> Result<()> {
    let target = parse_target(target)?;
    let (local, remote) = parse_ports(ports)?;

    let name = name.unwrap_or_else(|| target.name()).to_string();
    let definition = ForwardDefinition::new(name.clone(), target, remote).with_local_port(local);
    let template = Template::new(name).with_forward(definition);

    serve_template(template, cluster, config).await
}
