//! Template command implementations

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use kf_core::config;
use kf_core::Template;

use crate::output::{format_template, format_templates, print_info};

/// Load every `*.toml` template in a directory, sorted by file name
///
/// A missing directory yields no templates; unparsable files are skipped.
pub fn discover_templates(dir: &Path) -> Result<Vec<(PathBuf, Template)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read templates directory: {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        match config::load_config::<Template>(&path) {
            Ok(template) => templates.push((path, template)),
            Err(e) => tracing::warn!("Skipping template {:?}: {}", path, e),
        }
    }
    Ok(templates)
}

/// Load a template by file path, or by name from the templates directory
///
/// Names match either a file stem or the template's `name` field.
pub fn load_template(name_or_path: &str, templates_dir: &Path) -> Result<Template> {
    let path = Path::new(name_or_path);
    if path.is_file() {
        return config::load_config(path)
            .with_context(|| format!("Failed to load template from {:?}", path));
    }

    let found = discover_templates(templates_dir)?
        .into_iter()
        .find(|(path, template)| {
            template.name == name_or_path
                || path.file_stem().is_some_and(|stem| stem == name_or_path)
        });

    match found {
        Some((_, template)) => Ok(template),
        None => bail!(
            "Template '{}' not found (looked in {:?})",
            name_or_path,
            templates_dir
        ),
    }
}

/// Execute `templates list`
pub fn templates_list(templates_dir: &Path) -> Result<()> {
    let templates = discover_templates(templates_dir)?;
    print_info(&format!("Templates in {:?}", templates_dir));
    println!("{}", format_templates(&templates));
    Ok(())
}

/// Execute `templates show`
pub fn templates_show(name_or_path: &str, templates_dir: &Path) -> Result<()> {
    let template = load_template(name_or_path, templates_dir)?;
    println!("{}", format_template(&template));
    Ok(())
}
