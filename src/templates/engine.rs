//! Tera template engine wrapper.
//!
//! Renders service registrations (systemd units, Task Scheduler XML) from
//! templates embedded in the binary, optionally overridden from disk.

use std::path::Path;
use std::sync::Arc;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::error::WardenError;

/// systemd unit descriptor.
pub const SYSTEMD_UNIT_TEMPLATE: &str = "systemd.service.tera";
/// Task Scheduler task definition.
pub const TASK_XML_TEMPLATE: &str = "task.xml.tera";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        SYSTEMD_UNIT_TEMPLATE,
        include_str!("builtin/systemd.service.tera"),
    ),
    (TASK_XML_TEMPLATE, include_str!("builtin/task.xml.tera")),
];

/// Template engine for rendering service registrations.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
}

impl TemplateEngine {
    /// Engine with only the built-in templates.
    pub fn builtin() -> Result<Self, WardenError> {
        let tera = builtin_tera()?;
        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Engine loading `*.tera` files from `template_dir`; a file named like a
    /// built-in template replaces it.
    pub fn with_overrides(template_dir: &Path) -> Result<Self, WardenError> {
        let pattern = template_dir.join("**/*.tera");
        let pattern_str = pattern.to_string_lossy();

        debug!(pattern = %pattern_str, "Loading template overrides");

        let mut tera = Tera::new(&pattern_str).map_err(|e| WardenError::Template {
            message: format!(
                "Failed to load templates from '{}': {}",
                template_dir.display(),
                e
            ),
        })?;
        let overrides = tera.get_template_names().count();

        // Existing names are kept, so overrides win over built-ins.
        tera.extend(&builtin_tera()?)
            .map_err(|e| WardenError::Template {
                message: format!("Failed to merge built-in templates: {}", e),
            })?;

        info!(
            directory = %template_dir.display(),
            overrides,
            "Template engine initialized"
        );

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Render a template with the given context.
    pub fn render(
        &self,
        template_name: &str,
        context: &serde_json::Value,
    ) -> Result<String, WardenError> {
        let tera_context = Context::from_serialize(context).map_err(|e| WardenError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        self.tera
            .render(template_name, &tera_context)
            .map_err(|e| WardenError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

fn builtin_tera() -> Result<Tera, WardenError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(BUILTIN_TEMPLATES.iter().copied())
        .map_err(|e| WardenError::Template {
            message: format!("Invalid built-in template: {}", e),
        })?;
    Ok(tera)
}
