use std::fs;

use anyhow::{Context, Result, bail};
use rust_embed::Embed;
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Embed)]
#[folder = "assets/"]
struct ContentAssets;

const CATALOG_FILE: &str = "modules.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDefinition {
    pub id: String,
    pub text: String,
    pub category: String,
}

/// One sub-game inside a module's sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameTypeDefinition {
    pub id: u32,
    pub game_mode_id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub terms: Vec<TermDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub requires_continue: bool,
    #[serde(default = "default_levels")]
    pub levels: Vec<u32>,
    #[serde(default)]
    pub types: Vec<GameTypeDefinition>,
}

fn default_levels() -> Vec<u32> {
    vec![1]
}

impl ModuleDefinition {
    /// Ordered type ids driving the flow sequencer.
    pub fn sequence(&self) -> Vec<u32> {
        self.types.iter().map(|t| t.id).collect()
    }

    pub fn game_type(&self, id: u32) -> Option<&GameTypeDefinition> {
        self.types.iter().find(|t| t.id == id)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

impl Catalog {
    /// Load the user catalog if present, else the bundled one.
    pub fn load() -> Result<Self> {
        let user_path = Config::config_dir().join(CATALOG_FILE);
        if let Ok(content) = fs::read_to_string(&user_path) {
            return Self::parse(&content)
                .with_context(|| format!("invalid catalog at {}", user_path.display()));
        }
        Self::bundled()
    }

    pub fn bundled() -> Result<Self> {
        let Some(file) = ContentAssets::get(CATALOG_FILE) else {
            bail!("bundled catalog {CATALOG_FILE} missing");
        };
        let content = std::str::from_utf8(file.data.as_ref())?;
        Self::parse(content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn module(&self, id: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.id == id)
    }

    fn check(&self) -> Result<()> {
        for module in &self.modules {
            let mut seen = Vec::new();
            for ty in &module.types {
                if seen.contains(&ty.id) {
                    bail!("module {} lists type {} twice", module.id, ty.id);
                }
                seen.push(ty.id);
                for term in &ty.terms {
                    if !ty.categories.iter().any(|c| c.id == term.category) {
                        bail!(
                            "term {} in {}/{} points at unknown category {}",
                            term.id,
                            module.id,
                            ty.id,
                            term.category
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
