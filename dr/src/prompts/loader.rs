//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.deepresearch/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader rooted at `root` (looks for `.deepresearch/prompts/` and `prompts/`)
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let user_dir = root.join(".deepresearch/prompts");
        let repo_dir = root.join("prompts");
        let user_dir_exists = user_dir.exists();
        let repo_dir_exists = repo_dir.exists();
        debug!(?user_dir, %user_dir_exists, ?repo_dir, %repo_dir_exists, "PromptLoader::new: called");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
            repo_dir: repo_dir_exists.then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle quotes in topics
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.deepresearch/prompts/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        debug!("PromptLoader::load_template: trying embedded fallback");
        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Unknown prompt template: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_render_embedded_clarification() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render(
                "clarification",
                &json!({"topic": "Tom's \"smart\" grid", "depth": "medium", "min_questions": 4, "max_questions": 5}),
            )
            .unwrap();
        assert!(rendered.contains(r#"Tom's "smart" grid"#));
        assert!(rendered.contains("4-5"));
    }

    #[test]
    fn test_render_evaluation_leniency() {
        let loader = PromptLoader::embedded_only();
        let base = json!({"topic": "t", "answers": [], "content": "c", "iteration": 1, "lenient": false, "very_lenient": false});
        let strict = loader.render("evaluation", &base).unwrap();
        assert!(!strict.contains("lenient in your evaluation"));

        let mut lenient = base.clone();
        lenient["lenient"] = json!(true);
        let text = loader.render("evaluation", &lenient).unwrap();
        assert!(text.contains("Be more lenient"));

        let mut very = lenient.clone();
        very["very_lenient"] = json!(true);
        let text = loader.render("evaluation", &very).unwrap();
        assert!(text.contains("extremely lenient"));
        assert!(!text.contains("Be more lenient"));
    }

    #[test]
    fn test_user_override_wins() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".deepresearch/prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("title.pmt"), "Custom title for {{topic}}").unwrap();

        let loader = PromptLoader::new(temp.path());
        let rendered = loader.render("title", &json!({"topic": "tides"})).unwrap();
        assert_eq!(rendered, "Custom title for tides");

        // Templates without an override still come from the embedded set
        assert!(loader.render("outline", &json!({"content": "x"})).is_ok());
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.render("nonexistent-template", &json!({})).is_err());
    }
}
