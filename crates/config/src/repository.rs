//! Where config documents come from
//!
//! The resolver only sees config ids (`env/rware`); a [`ConfigRepository`]
//! maps ids to raw YAML text. [`FileRepository`] searches an ordered list of
//! directories, [`MemoryRepository`] holds documents in memory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::trace;

use crate::error::ConfigError;
use crate::source::ConfigSource;

static EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Raw document text plus a human-readable origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub origin: String,
    pub text: String,
}

/// Source of config documents keyed by `/`-separated id
pub trait ConfigRepository {
    /// Load a document. `Ok(None)` means it does not exist.
    fn load(&self, id: &str) -> Result<Option<RawConfig>, ConfigError>;

    /// Whether `group` is a config group (a directory of options)
    fn is_group(&self, group: &str) -> bool;
}

/// Config files on disk, searched in order
#[derive(Debug, Clone, Default)]
pub struct FileRepository {
    search_paths: Vec<PathBuf>,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![root.into()],
        }
    }

    /// Repository over several roots; earlier roots win
    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a lower-priority root
    #[must_use]
    pub fn add_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn candidates<'a>(&'a self, id: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        self.search_paths.iter().flat_map(move |root| {
            EXTENSIONS
                .iter()
                .map(move |ext| root.join(format!("{}.{}", id, ext)))
        })
    }
}

impl ConfigRepository for FileRepository {
    fn load(&self, id: &str) -> Result<Option<RawConfig>, ConfigError> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        for path in self.candidates(id) {
            if path.is_file() {
                trace!(id, path = %path.display(), "Reading config file");
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::read_file(&path, e))?;
                return Ok(Some(RawConfig {
                    origin: path.display().to_string(),
                    text,
                }));
            }
        }
        Ok(None)
    }

    fn is_group(&self, group: &str) -> bool {
        is_safe_id(group)
            && self
                .search_paths
                .iter()
                .any(|root| root.join(group).is_dir())
    }
}

/// Config documents held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    configs: BTreeMap<String, String>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.configs.insert(id.into(), text.into());
    }
}

impl ConfigRepository for MemoryRepository {
    fn load(&self, id: &str) -> Result<Option<RawConfig>, ConfigError> {
        Ok(self.configs.get(id).map(|text| RawConfig {
            origin: format!("memory:{}", id),
            text: text.clone(),
        }))
    }

    fn is_group(&self, group: &str) -> bool {
        let prefix = format!("{}/", group.trim_end_matches('/'));
        self.configs.keys().any(|id| id.starts_with(&prefix))
    }
}

/// Parsed documents of one resolution run, keyed by config id.
///
/// Owned by the caller and passed through the resolver; there is no
/// process-wide cache.
#[derive(Debug, Default)]
pub struct SourceCache {
    sources: HashMap<String, Rc<ConfigSource>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Return the parsed document for `id`, loading it on first use
    pub fn get_or_load<R: ConfigRepository + ?Sized>(
        &mut self,
        repository: &R,
        id: &str,
    ) -> Result<Option<Rc<ConfigSource>>, ConfigError> {
        if let Some(source) = self.sources.get(id) {
            return Ok(Some(Rc::clone(source)));
        }
        let Some(raw) = repository.load(id)? else {
            return Ok(None);
        };
        let source = Rc::new(ConfigSource::parse(id, &raw.origin, &raw.text)?);
        self.sources.insert(id.to_string(), Rc::clone(&source));
        Ok(Some(source))
    }
}

/// Ids may not escape the search roots
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !Path::new(id).is_absolute()
        && id.split('/').all(|part| !part.is_empty() && part != "..")
}
