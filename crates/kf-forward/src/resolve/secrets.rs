//! Secret and config map value resolution

use std::collections::{BTreeSet, HashMap};

use kf_core::cluster::DataResource;
use kf_core::error::SecretResolutionError;
use kf_core::traits::ClusterClient;
use kf_core::{ResolvedSecret, SecretKind, SecretReference};

use crate::log::ForwardLog;

/// Listing result for one (kind, namespace) pair
enum Listing {
    Fetched(HashMap<String, DataResource>),
    Failed(String),
}

/// Resolve every reference, in order, to a value or a value-less entry
///
/// Each distinct (kind, namespace) pair is listed once. Missing resources,
/// missing keys and failed listings are logged as warnings; they never fail
/// the caller.
pub async fn resolve_secrets(
    client: &dyn ClusterClient,
    default_namespace: &str,
    references: &[SecretReference],
    log: &ForwardLog,
) -> Vec<ResolvedSecret> {
    if references.is_empty() {
        return Vec::new();
    }

    let wanted: BTreeSet<(SecretKind, &str)> = references
        .iter()
        .map(|r| (r.kind, r.namespace.as_deref().unwrap_or(default_namespace)))
        .collect();

    let mut listings: HashMap<(SecretKind, &str), Listing> = HashMap::new();
    for (kind, namespace) in wanted {
        let result = match kind {
            SecretKind::Secret => client.list_secrets(namespace).await,
            SecretKind::ConfigMap => client.list_config_maps(namespace).await,
        };

        let listing = match result {
            Ok(resources) => Listing::Fetched(
                resources
                    .into_iter()
                    .map(|resource| (resource.name.clone(), resource))
                    .collect(),
            ),
            Err(e) => Listing::Failed(e.to_string()),
        };
        listings.insert((kind, namespace), listing);
    }

    let mut resolved = Vec::with_capacity(references.len());
    for reference in references {
        let namespace = reference.namespace.as_deref().unwrap_or(default_namespace);
        let value = match listings.get(&(reference.kind, namespace)) {
            Some(Listing::Fetched(resources)) => lookup(resources, reference, namespace),
            Some(Listing::Failed(reason)) => Err(SecretResolutionError::FetchFailed {
                kind: reference.kind,
                namespace: namespace.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(None),
        };

        let value = match value {
            Ok(value) => value,
            Err(e) => {
                log.warn(format!("Could not resolve '{}': {}", reference.label(), e));
                None
            }
        };
        resolved.push(ResolvedSecret::new(reference.clone(), value));
    }

    resolved
}

fn lookup(
    resources: &HashMap<String, DataResource>,
    reference: &SecretReference,
    namespace: &str,
) -> Result<Option<String>, SecretResolutionError> {
    let resource = resources.get(&reference.resource).ok_or_else(|| {
        SecretResolutionError::ResourceMissing {
            kind: reference.kind,
            namespace: namespace.to_string(),
            name: reference.resource.clone(),
        }
    })?;

    let value = resource.data.get(&reference.key).ok_or_else(|| {
        SecretResolutionError::KeyMissing {
            kind: reference.kind,
            namespace: namespace.to_string(),
            name: reference.resource.clone(),
            key: reference.key.clone(),
        }
    })?;

    Ok(Some(value.clone()))
}
