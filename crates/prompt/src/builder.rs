//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use citewise_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

const SYSTEM_TEMPLATE: &str = "system";
const USER_TEMPLATE: &str = "user";

/// A prompt definition with its templates compiled once.
///
/// Rendering takes `&self`, so one renderer can be shared by concurrent
/// pipeline invocations.
pub struct PromptRenderer {
    definition: PromptDefinition,
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRenderer")
            .field("id", &self.definition.id)
            .finish()
    }
}

impl PromptRenderer {
    /// Compile the system and user templates of `definition`.
    pub fn new(definition: PromptDefinition) -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(USER_TEMPLATE, &definition.template)
            .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

        if let Some(system) = &definition.system {
            registry
                .register_template_string(SYSTEM_TEMPLATE, system)
                .map_err(|e| {
                    AppError::Prompt(format!("Failed to register system template: {}", e))
                })?;
        }

        Ok(Self {
            definition,
            registry,
        })
    }

    pub fn definition(&self) -> &PromptDefinition {
        &self.definition
    }

    /// Render both templates with `variables`.
    ///
    /// Every variable listed in the definition's `input.variables` must be
    /// present.
    pub fn render(&self, variables: HashMap<String, String>) -> AppResult<BuiltPrompt> {
        if let Some(missing) = self
            .definition
            .input
            .variables
            .iter()
            .find(|name| !variables.contains_key(name.as_str()))
        {
            return Err(AppError::Prompt(format!(
                "Prompt '{}' requires variable '{}'",
                self.definition.id, missing
            )));
        }

        let user = self
            .registry
            .render(USER_TEMPLATE, &variables)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

        let system = if self.definition.system.is_some() {
            let rendered = self
                .registry
                .render(SYSTEM_TEMPLATE, &variables)
                .map_err(|e| {
                    AppError::Prompt(format!("Failed to render system template: {}", e))
                })?;
            Some(rendered)
        } else {
            None
        };

        Ok(BuiltPrompt::new(
            system,
            user,
            self.definition.id.clone(),
            variables,
        ))
    }
}

/// Build a prompt from a definition and input variables.
///
/// # Example
/// ```no_run
/// use citewise_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "What drives sea level rise?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);
    PromptRenderer::new(definition.clone())?.render(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptInputSpec, PromptOutputSpec};

    fn definition(system: Option<&str>, template: &str, variables: &[&str]) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            input: PromptInputSpec {
                variables: variables.iter().map(|v| v.to_string()).collect(),
            },
            system: system.map(str::to_string),
            template: template.to_string(),
            output: PromptOutputSpec {
                format: "text".to_string(),
            },
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_user_and_system() {
        let def = definition(Some("Refuse with: {{refusal}}"), "Question: {{query}}", &[]);
        let built = build_prompt(&def, vars(&[("query", "Why?"), ("refusal", "No.")])).unwrap();

        assert_eq!(built.user, "Question: Why?");
        assert_eq!(built.system.as_deref(), Some("Refuse with: No."));
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_no_html_escaping() {
        let def = definition(None, "{{excerpts}}", &[]);
        let built = build_prompt(&def, vars(&[("excerpts", "[p.3] CO2 < 450 & rising")])).unwrap();
        assert_eq!(built.user, "[p.3] CO2 < 450 & rising");
        assert!(built.system.is_none());
    }

    #[test]
    fn test_missing_required_variable() {
        let def = definition(None, "{{query}} {{excerpts}}", &["query", "excerpts"]);
        let result = build_prompt(&def, vars(&[("query", "Why?")]));
        assert!(matches!(result, Err(AppError::Prompt(msg)) if msg.contains("excerpts")));
    }

    #[test]
    fn test_invalid_template_rejected() {
        let def = definition(None, "{{#if ready}}unclosed", &[]);
        assert!(PromptRenderer::new(def).is_err());
    }

    #[test]
    fn test_builtin_answer_prompt_renders() {
        let def = crate::defaults::builtin("answer.grounded").unwrap().unwrap();
        let renderer = PromptRenderer::new(def).unwrap();
        let built = renderer
            .render(vars(&[
                ("query", "What is AR6?"),
                ("excerpts", "[p.1] AR6 is the sixth assessment report."),
                ("refusal", "I have not found sufficient evidence."),
            ]))
            .unwrap();

        assert!(built.user.contains("What is AR6?"));
        assert!(built.user.contains("[p.1] AR6 is the sixth assessment report."));
        assert!(built.system.unwrap().contains("I have not found sufficient evidence."));
    }
}
