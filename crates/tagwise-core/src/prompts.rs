//! Prompt library for model requests
//!
//! A prompt file is markdown with YAML frontmatter and two sections:
//!
//! ```text
//! ---
//! id: categorize_products
//! version: 1
//! temperature: 0.5
//! ---
//! # System
//! ...
//! # User
//! ... {{products}} ...
//! ```
//!
//! A file named `<id>.md` in `~/.local/share/tagwise/prompts/overrides/` replaces
//! the copy compiled into the binary.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

const CATEGORIZE_PRODUCTS: &str = include_str!("../../../prompts/categorize_products.md");

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Batched product → tag categorization
    CategorizeProducts,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategorizeProducts => "categorize_products",
        }
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::CategorizeProducts => CATEGORIZE_PRODUCTS,
        }
    }
}

/// Frontmatter of a prompt file
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// Sampling temperature to request
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// A parsed prompt
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Markdown body after the frontmatter
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    fn from_source(source: &str, override_path: Option<PathBuf>) -> Result<Self> {
        let (metadata, body) = split_frontmatter(source)?;
        Ok(Self {
            metadata,
            content: body.to_string(),
            is_override: override_path.is_some(),
            override_path,
        })
    }

    /// Text under `# System`, if the prompt has one
    pub fn system_section(&self) -> Option<&str> {
        section(&self.content, "System")
    }

    /// The `# User` section (or the whole body) with `{{name}}` placeholders filled in
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        let template = section(&self.content, "User").unwrap_or(&self.content);
        vars.iter().fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{}}}}}", name), value)
        })
    }
}

/// Loads prompts by id, preferring override files, and caches them
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library reading overrides from the platform data directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Library that only knows the compiled-in prompts
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        match self.override_file(id) {
            Some(path) => {
                let source = fs::read_to_string(&path).map_err(|e| {
                    Error::InvalidData(format!("Cannot read {}: {}", path.display(), e))
                })?;
                Prompt::from_source(&source, Some(path))
            }
            None => Prompt::from_source(id.embedded(), None),
        }
    }

    /// Path of an existing override file for `id`
    fn override_file(&self, id: PromptId) -> Option<PathBuf> {
        let path = self.override_dir.as_ref()?.join(format!("{}.md", id.as_str()));
        path.is_file().then_some(path)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// `~/.local/share/tagwise/prompts/overrides` (platform equivalent elsewhere)
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tagwise").join("prompts").join("overrides"))
}

fn split_frontmatter(source: &str) -> Result<(PromptMetadata, &str)> {
    let rest = source
        .trim()
        .strip_prefix("---")
        .ok_or_else(|| Error::InvalidData("Prompt must start with --- frontmatter".into()))?;
    let (yaml, body) = rest
        .split_once("---")
        .ok_or_else(|| Error::InvalidData("Prompt frontmatter is not closed".into()))?;

    let metadata = serde_yaml::from_str(yaml)
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;
    Ok((metadata, body.trim()))
}

/// Body of the `# <name>` section, up to the next top-level heading
fn section<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let heading = format!("# {}", name);
    let start = content.find(&heading)? + heading.len();
    let rest = &content[start..];
    let end = rest.find("\n# ").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\nid: sample\nversion: 2\n---\n\n# System\nBe brief.\n\n# User\nTag {{products}} now.\n";

    #[test]
    fn test_split_frontmatter() {
        let prompt = Prompt::from_source(SAMPLE, None).unwrap();
        assert_eq!(prompt.metadata.id, "sample");
        assert_eq!(prompt.metadata.version, 2);
        assert!(prompt.metadata.temperature.is_none());
        assert!(!prompt.is_override);
        assert_eq!(prompt.system_section(), Some("Be brief."));
    }

    #[test]
    fn test_malformed_frontmatter() {
        assert!(split_frontmatter("# User\nhello").is_err());
        assert!(split_frontmatter("---\nid: x\nversion: 1\n").is_err());
        assert!(split_frontmatter("---\nversion: [\n---\nbody").is_err());
    }

    #[test]
    fn test_render_user_only() {
        let prompt = Prompt::from_source(SAMPLE, None).unwrap();
        let mut vars = HashMap::new();
        vars.insert("products", "{Airtel: 499.00}".to_string());
        assert_eq!(prompt.render_user(&vars), "Tag {Airtel: 499.00} now.");
    }

    #[test]
    fn test_embedded_categorize_prompt() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::CategorizeProducts).unwrap();
        assert_eq!(prompt.metadata.id, "categorize_products");
        assert_eq!(prompt.metadata.temperature, Some(0.5));

        let mut vars = HashMap::new();
        vars.insert("labels", "Rent, Bills".to_string());
        vars.insert("travel_min", "80".to_string());
        vars.insert("travel_max", "350".to_string());
        vars.insert("products", "{Airtel: 499}".to_string());

        let rendered = prompt.render_user(&vars);
        assert!(rendered.contains("Products: {Airtel: 499}"));
        assert!(rendered.contains("between 80 and 350"));
        assert!(rendered.contains("ProductName-Tag"));
        assert!(!rendered.contains("{{"));
        assert!(!rendered.contains("# System"));
    }

    #[test]
    fn test_override_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("categorize_products.md"),
            "---\nid: categorize_products\nversion: 9\n---\n# User\nCustom {{products}}",
        )
        .unwrap();

        let mut lib = PromptLibrary {
            override_dir: Some(dir.path().to_path_buf()),
            cache: HashMap::new(),
        };
        let prompt = lib.get(PromptId::CategorizeProducts).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 9);
        assert!(prompt.system_section().is_none());
    }
}
