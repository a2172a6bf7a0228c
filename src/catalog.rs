//! Experiment definitions and their authors.
//!
//! Read once at startup from a JSON file:
//!
//! ```json
//! {
//!   "authors": [{"name": "alice", "access_token": "..."}],
//!   "experiments": [{"id": "stroop", "title": "Stroop", "author": "alice",
//!                    "path": "/srv/exp/stroop", "script_name": "script.py"}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

/// Database credentials passed to an author's scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub db: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub ca_file_path: Option<String>,
}

fn default_db_port() -> u16 {
    27017
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Author {
    pub name: String,
    /// Secret the owner logs in with.
    pub access_token: String,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub db: Option<DbCredentials>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExperimentDefinition {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default)]
    pub password: Option<String>,
    /// Resource directory of the experiment.
    pub path: PathBuf,
    /// Entry script, relative to `path`.
    #[serde(default)]
    pub script_name: Option<String>,
    /// Author-owned configuration, one object per section.
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn default_version() -> String {
    "0.1".into()
}

fn default_true() -> bool {
    true
}

impl ExperimentDefinition {
    pub fn script_path(&self) -> Option<PathBuf> {
        self.script_name.as_ref().map(|name| self.path.join(name))
    }

    /// Whether `submitted` opens this experiment. A private experiment
    /// without a stored password admits a visitor who submits none.
    pub fn admits(&self, submitted: Option<&str>) -> bool {
        if self.public {
            return true;
        }
        match (self.password.as_deref(), submitted) {
            (Some(expected), Some(given)) => expected.as_bytes().ct_eq(given.as_bytes()).into(),
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("could not read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate experiment id: {0}")]
    DuplicateExperiment(String),

    #[error("experiment {experiment} names unknown author {author}")]
    UnknownAuthor { experiment: String, author: String },
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    experiments: Vec<ExperimentDefinition>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    authors: HashMap<String, Author>,
    experiments: HashMap<String, ExperimentDefinition>,
}

impl Catalog {
    pub fn new(
        authors: Vec<Author>,
        experiments: Vec<ExperimentDefinition>,
    ) -> Result<Self, CatalogError> {
        let authors: HashMap<_, _> = authors.into_iter().map(|a| (a.name.clone(), a)).collect();

        let mut by_id = HashMap::with_capacity(experiments.len());
        for experiment in experiments {
            if !authors.contains_key(&experiment.author) {
                return Err(CatalogError::UnknownAuthor {
                    experiment: experiment.id,
                    author: experiment.author,
                });
            }
            if by_id.contains_key(&experiment.id) {
                return Err(CatalogError::DuplicateExperiment(experiment.id));
            }
            by_id.insert(experiment.id.clone(), experiment);
        }

        Ok(Self {
            authors,
            experiments: by_id,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.authors, file.experiments)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn experiment(&self, id: &str) -> Option<&ExperimentDefinition> {
        self.experiments.get(id)
    }

    pub fn author(&self, name: &str) -> Option<&Author> {
        self.authors.get(name)
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}
