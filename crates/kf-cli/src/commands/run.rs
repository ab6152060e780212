//! Run command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;

use kf_core::config::ForwardConfig;
use kf_core::{ClusterConnectionInfo, ForwardInstance, ForwardStatus, Template};
use kf_forward::ForwardRegistry;
use kf_kube::KubeClientFactory;

use super::templates::load_template;
use crate::output::{
    format_instances, format_secrets, print_error, print_info, print_success, print_warning,
};

/// Execute the run command: start a template file and forward until Ctrl+C
pub async fn run_command(
    template: &str,
    templates_dir: &Path,
    cluster: ClusterConnectionInfo,
    config: ForwardConfig,
) -> Result<()> {
    let template = load_template(template, templates_dir)?;
    serve_template(template, cluster, config).await
}

/// Start every forward of a template and keep them up until interrupted
pub async fn serve_template(
    template: Template,
    cluster: ClusterConnectionInfo,
    config: ForwardConfig,
) -> Result<()> {
    let registry = ForwardRegistry::new(Arc::new(KubeClientFactory::new()), config);

    print_info(&format!(
        "Starting '{}' ({} forwards) on {}",
        template.name,
        template.forwards.len(),
        cluster.server
    ));

    let name = template.name.clone();
    let running = match registry.start_template(template, cluster).await {
        Ok(running) => running,
        Err(e) => {
            print_error(&format!("Failed to start '{}': {}", name, e));
            return Err(e).context("Template start failed");
        }
    };

    let instances = running.instances();
    println!("{}", format_instances(&instances));
    if let Some(secrets) = format_secrets(&instances) {
        println!("\nResolved values:");
        println!("{}", secrets);
    }
    print_info("Press Ctrl+C to stop");

    let mut watchers = JoinSet::new();
    for session in running.sessions() {
        watchers.spawn(report_changes(session.subscribe()));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    watchers.abort_all();
    print_info("Stopping forwards...");
    registry.shutdown().await;
    print_success("All forwards stopped");

    Ok(())
}

/// Print status transitions of one forward as they happen
async fn report_changes(mut rx: watch::Receiver<ForwardInstance>) {
    let mut last = rx.borrow_and_update().status;

    while rx.changed().await.is_ok() {
        let instance = rx.borrow_and_update().clone();
        if instance.status == last {
            continue;
        }
        last = instance.status;

        match instance.status {
            ForwardStatus::Running => print_success(&format!(
                "{}: forwarding {} -> {}",
                instance.name,
                instance.local_address().unwrap_or_default(),
                instance.resolved_pod.unwrap_or_default()
            )),
            ForwardStatus::Starting if instance.reconnect_attempts > 0 => {
                print_warning(&format!(
                    "{}: reconnecting (attempt {})",
                    instance.name, instance.reconnect_attempts
                ))
            }
            ForwardStatus::Failed => print_error(&format!(
                "{}: {}",
                instance.name,
                instance
                    .error_message
                    .unwrap_or_else(|| "failed".to_string())
            )),
            _ => tracing::debug!("{} is now {}", instance.name, instance.status),
        }
    }
}
