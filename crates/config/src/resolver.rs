//! Defaults-list composition
//!
//! Resolution walks the defaults tree depth-first from the primary config
//! and merges every node into one accumulator, so later merges win:
//!
//! 1. `override` entries of a node are registered before its other entries,
//!    so they apply to selections made anywhere below it
//! 2. entries are composed in list order; `_self_` merges the node's own keys
//! 3. a node without `_self_` merges its own keys after all entries
//!
//! Command-line overrides are applied in two phases. Group selections
//! (`env=smax`, `+logger=logger`) are consumed while composing; everything
//! left is a value override applied to the composed tree. Interpolation runs
//! last.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use marl_core::{assign, lookup, merge_at, remove, ConfigMap, KeyPath};

use crate::defaults::{strip_extension, DefaultsEntry, GroupOption};
use crate::error::ConfigError;
use crate::interpolate::{self, EnvLookup};
use crate::overrides::{Override, OverrideOp};
use crate::repository::{ConfigRepository, SourceCache};
use crate::resolved::{CompositionStep, ResolvedConfig};
use crate::source::ConfigSource;

const GLOBAL_PACKAGE: &str = "_global_";
const GROUP_PACKAGE: &str = "_group_";
const HERE_PACKAGE: &str = "_here_";

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Composes experiment configs from a repository
pub struct Resolver<R> {
    repository: R,
    overrides: Vec<Override>,
    interpolate: bool,
    env: EnvLookup,
}

impl<R: ConfigRepository> Resolver<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            overrides: Vec::new(),
            interpolate: true,
            env: process_env,
        }
    }

    /// Command-line overrides, applied in order
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Leave `${...}` expressions as written
    #[must_use]
    pub fn skip_interpolation(mut self) -> Self {
        self.interpolate = false;
        self
    }

    /// Replace the environment lookup used by `${oc.env:...}`
    #[must_use]
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Resolve the config named `name` (`ff_masac`, `default/rec_qmix.yaml`)
    pub fn resolve(&self, name: &str) -> Result<ResolvedConfig, ConfigError> {
        let mut cache = SourceCache::new();
        self.resolve_with_cache(name, &mut cache)
    }

    /// Resolve using a caller-owned cache of parsed documents
    pub fn resolve_with_cache(
        &self,
        name: &str,
        cache: &mut SourceCache,
    ) -> Result<ResolvedConfig, ConfigError> {
        let id = strip_extension(name.trim().trim_start_matches('/')).to_string();
        let primary = cache
            .get_or_load(&self.repository, &id)?
            .ok_or_else(|| ConfigError::MissingReference {
                origin: "search path".to_string(),
                entry: name.to_string(),
                missing: id.clone(),
            })?;

        let mut composition = Composition::new(&self.repository, cache);
        let mut handled = vec![false; self.overrides.len()];
        let mut appended = Vec::new();

        for (index, o) in self.overrides.iter().enumerate() {
            if let Some(entry) = composition.appended_group(o, &primary)? {
                appended.push(entry);
                handled[index] = true;
            } else if o.targets_group() {
                composition.selections.push(Selection::from_override(index, o));
            }
        }

        let package = header_package(&primary, "")?.unwrap_or_default();
        composition.compose_node(&primary, &package, &appended)?;
        composition.check_override_entries()?;

        for selection in &composition.selections {
            if selection.consumed {
                handled[selection.index] = true;
            }
        }

        // `++group=option` for a group nothing selected: compose it on top
        for (index, o) in self.overrides.iter().enumerate() {
            if handled[index] || !o.targets_group() || !self.repository.is_group(&o.group()) {
                continue;
            }
            if o.op != OverrideOp::ForceAdd {
                return Err(ConfigError::invalid_override(
                    &o.raw,
                    format!(
                        "group '{}' is not in the defaults list; use +{}=<option> to add it",
                        o.group(),
                        o.group()
                    ),
                ));
            }
            let entry = DefaultsEntry::Group {
                group: format!("/{}", o.group()),
                package: None,
                option: selection_option(o),
                optional: false,
                is_override: false,
            };
            composition.compose_group(&primary, &KeyPath::root(), &entry, true)?;
            handled[index] = true;
        }

        let Composition {
            mut output, trace, ..
        } = composition;

        for (index, o) in self.overrides.iter().enumerate() {
            if !handled[index] {
                apply_value_override(&mut output, o)?;
            }
        }

        let root = if self.interpolate {
            interpolate::resolve(&output, self.env)?
        } else {
            output
        };

        tracing::debug!(
            config = %id,
            sources = trace.len(),
            overrides = self.overrides.len(),
            "Resolved experiment config"
        );
        Ok(ResolvedConfig::new(root, trace))
    }
}

/// A command-line group selection
#[derive(Debug)]
struct Selection {
    index: usize,
    group: String,
    option: GroupOption,
    consumed: bool,
}

impl Selection {
    fn from_override(index: usize, o: &Override) -> Self {
        Self {
            index,
            group: o.group(),
            option: selection_option(o),
            consumed: false,
        }
    }
}

fn selection_option(o: &Override) -> GroupOption {
    match (&o.op, &o.value) {
        (OverrideOp::Delete, _) => GroupOption::Unset,
        (_, Some(value)) if value.is_null() => GroupOption::Unset,
        (_, Some(value)) if value.is_missing() => GroupOption::Mandatory,
        _ => GroupOption::Named(strip_extension(o.option_name().unwrap_or_default()).to_string()),
    }
}

/// An `override group: option` entry seen in some defaults list
#[derive(Debug)]
struct OverrideEntry {
    option: GroupOption,
    origin: String,
    used: bool,
}

/// State of one resolution run
struct Composition<'r, R: ?Sized> {
    repository: &'r R,
    cache: &'r mut SourceCache,
    selections: Vec<Selection>,
    override_entries: HashMap<String, OverrideEntry>,
    composed_groups: HashSet<String>,
    added_groups: HashSet<String>,
    stack: Vec<String>,
    output: ConfigMap,
    trace: Vec<CompositionStep>,
}

impl<'r, R: ConfigRepository + ?Sized> Composition<'r, R> {
    fn new(repository: &'r R, cache: &'r mut SourceCache) -> Self {
        Self {
            repository,
            cache,
            selections: Vec::new(),
            override_entries: HashMap::new(),
            composed_groups: HashSet::new(),
            added_groups: HashSet::new(),
            stack: Vec::new(),
            output: ConfigMap::new(),
            trace: Vec::new(),
        }
    }

    /// Turn `+group=option` into an entry appended to the primary defaults
    fn appended_group(
        &mut self,
        o: &Override,
        primary: &ConfigSource,
    ) -> Result<Option<DefaultsEntry>, ConfigError> {
        if o.op != OverrideOp::Add || o.key.contains('.') || !self.repository.is_group(&o.group()) {
            return Ok(None);
        }
        let group = o.group();
        let already_listed = primary.defaults.iter().any(|entry| match entry {
            DefaultsEntry::Group { group: listed, .. } => absolute_group(primary, listed) == group,
            _ => false,
        });
        if already_listed || !self.added_groups.insert(group.clone()) {
            return Err(ConfigError::invalid_override(
                &o.raw,
                format!(
                    "group '{}' is already in the defaults list; use {}=<option> to change it",
                    group, group
                ),
            ));
        }
        Ok(Some(DefaultsEntry::Group {
            group: format!("/{}", group),
            package: None,
            option: selection_option(o),
            optional: false,
            is_override: false,
        }))
    }

    fn compose_node(
        &mut self,
        source: &ConfigSource,
        package: &KeyPath,
        appended: &[DefaultsEntry],
    ) -> Result<(), ConfigError> {
        if self.stack.contains(&source.id) {
            let mut chain = self.stack.clone();
            chain.push(source.id.clone());
            return Err(ConfigError::CyclicDefaults { chain });
        }
        self.stack.push(source.id.clone());

        self.register_override_entries(source)?;

        let entries = source
            .defaults
            .iter()
            .map(|entry| (entry, false))
            .chain(appended.iter().map(|entry| (entry, true)));
        let mut merged_self = false;
        for (entry, added) in entries {
            tracing::trace!(config = %source.id, entry = %entry, "Processing defaults entry");
            match entry {
                DefaultsEntry::SelfRef => {
                    self.merge_own(source, package)?;
                    merged_self = true;
                }
                DefaultsEntry::Group {
                    is_override: true, ..
                } => {}
                DefaultsEntry::Config { name, optional } => {
                    self.compose_sibling(source, package, entry, name, *optional)?;
                }
                DefaultsEntry::Group { .. } => {
                    self.compose_group(source, package, entry, added)?;
                }
            }
        }
        if !merged_self {
            self.merge_own(source, package)?;
        }

        self.stack.pop();
        Ok(())
    }

    fn register_override_entries(&mut self, source: &ConfigSource) -> Result<(), ConfigError> {
        for entry in &source.defaults {
            let DefaultsEntry::Group {
                group,
                option,
                is_override: true,
                ..
            } = entry
            else {
                continue;
            };
            let group = absolute_group(source, group);
            if self.composed_groups.contains(&group) {
                return Err(ConfigError::invalid_defaults(
                    &source.origin,
                    format!("'{}' overrides group '{}' after it was composed", entry, group),
                ));
            }
            // the outermost override of a group wins
            self.override_entries
                .entry(group)
                .or_insert_with(|| OverrideEntry {
                    option: option.clone(),
                    origin: source.origin.clone(),
                    used: false,
                });
        }
        Ok(())
    }

    fn merge_own(&mut self, source: &ConfigSource, package: &KeyPath) -> Result<(), ConfigError> {
        merge_at(&mut self.output, package, source.body.clone())
            .map_err(|e| ConfigError::from_value(&source.origin, e))?;
        tracing::debug!(
            config = %source.id,
            package = %package,
            keys = source.body.len(),
            "Merged config"
        );
        self.trace.push(CompositionStep {
            id: source.id.clone(),
            origin: source.origin.clone(),
            package: package.clone(),
        });
        Ok(())
    }

    /// A bare name: a config in the parent's group directory, at the parent's package
    fn compose_sibling(
        &mut self,
        parent: &ConfigSource,
        parent_package: &KeyPath,
        entry: &DefaultsEntry,
        name: &str,
        optional: bool,
    ) -> Result<(), ConfigError> {
        let id = match name.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => join_group(parent.group_dir(), name),
        };
        let Some(source) = self.load(parent, entry, &id, optional)? else {
            return Ok(());
        };
        let package = header_package(&source, source.group_dir())?
            .unwrap_or_else(|| parent_package.clone());
        self.compose_node(&source, &package, &[])
    }

    fn compose_group(
        &mut self,
        parent: &ConfigSource,
        parent_package: &KeyPath,
        entry: &DefaultsEntry,
        added: bool,
    ) -> Result<(), ConfigError> {
        let DefaultsEntry::Group {
            group,
            package,
            option,
            optional,
            ..
        } = entry
        else {
            return Ok(());
        };
        let group = absolute_group(parent, group);
        if !added && self.added_groups.contains(&group) {
            return Err(ConfigError::invalid_override(
                format!("+{}", group),
                format!("group '{}' is already selected by '{}'", group, parent.origin),
            ));
        }

        let option = match self.select(&group, option) {
            GroupOption::Named(option) => option,
            GroupOption::Unset => {
                tracing::trace!(group = %group, "Group has no selection, skipping");
                return Ok(());
            }
            GroupOption::Mandatory => {
                return Err(ConfigError::MandatorySelection {
                    origin: parent.origin.clone(),
                    group,
                })
            }
        };

        let id = join_group(&group, &option);
        let Some(source) = self.load(parent, entry, &id, *optional)? else {
            return Ok(());
        };
        let package = match package {
            Some(explicit) => entry_package(parent, parent_package, explicit, &group)?,
            None => header_package(&source, &group)?
                .unwrap_or_else(|| KeyPath::from_group(&group)),
        };

        self.composed_groups.insert(group);
        self.compose_node(&source, &package, &[])
    }

    /// Pick the option for `group`: command line, then override entries,
    /// then the entry itself
    fn select(&mut self, group: &str, listed: &GroupOption) -> GroupOption {
        let mut chosen = None;
        for selection in self.selections.iter_mut().filter(|s| s.group == group) {
            selection.consumed = true;
            chosen = Some(selection.option.clone());
        }
        if let Some(entry) = self.override_entries.get_mut(group) {
            entry.used = true;
            chosen = chosen.or_else(|| Some(entry.option.clone()));
        }
        chosen.unwrap_or_else(|| listed.clone())
    }

    fn load(
        &mut self,
        parent: &ConfigSource,
        entry: &DefaultsEntry,
        id: &str,
        optional: bool,
    ) -> Result<Option<Rc<ConfigSource>>, ConfigError> {
        match self.cache.get_or_load(self.repository, id)? {
            Some(source) => Ok(Some(source)),
            None if optional => {
                tracing::trace!(config = %id, "Optional config not found, skipping");
                Ok(None)
            }
            None => Err(ConfigError::MissingReference {
                origin: parent.origin.clone(),
                entry: entry.to_string(),
                missing: id.to_string(),
            }),
        }
    }

    fn check_override_entries(&self) -> Result<(), ConfigError> {
        let mut unused: Vec<_> = self
            .override_entries
            .iter()
            .filter(|(_, entry)| !entry.used)
            .collect();
        unused.sort_by(|a, b| a.0.cmp(b.0));
        match unused.first() {
            Some((group, entry)) => Err(ConfigError::invalid_defaults(
                &entry.origin,
                format!("cannot override group '{}': nothing in the defaults list selects it", group),
            )),
            None => Ok(()),
        }
    }
}

/// Group path of an entry relative to the root of the repository
fn absolute_group(source: &ConfigSource, group: &str) -> String {
    match group.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => join_group(source.group_dir(), group),
    }
}

fn join_group(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Package declared by a `# @package` header, if any
fn header_package(source: &ConfigSource, group: &str) -> Result<Option<KeyPath>, ConfigError> {
    let Some(header) = source.package.as_deref() else {
        return Ok(None);
    };
    let package = match header {
        GLOBAL_PACKAGE => KeyPath::root(),
        GROUP_PACKAGE => KeyPath::from_group(group),
        other => {
            let dotted = other
                .strip_prefix(GLOBAL_PACKAGE)
                .map(|rest| rest.trim_start_matches('.'))
                .unwrap_or(other);
            KeyPath::parse(dotted).map_err(|e| ConfigError::from_value(&source.origin, e))?
        }
    };
    Ok(Some(package))
}

/// Package written as `group@package`, relative to the parent's package
fn entry_package(
    parent: &ConfigSource,
    parent_package: &KeyPath,
    package: &str,
    group: &str,
) -> Result<KeyPath, ConfigError> {
    let (head, rest) = match package.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => (package, ""),
    };
    let base = match head {
        GLOBAL_PACKAGE => KeyPath::root(),
        HERE_PACKAGE => parent_package.clone(),
        GROUP_PACKAGE => {
            let leaf = group.rsplit('/').next().unwrap_or(group);
            parent_package.child(leaf)
        }
        _ => {
            let relative = KeyPath::parse(package)
                .map_err(|e| ConfigError::invalid_defaults(&parent.origin, e.to_string()))?;
            return Ok(parent_package.join(&relative));
        }
    };
    let relative = KeyPath::parse(rest)
        .map_err(|e| ConfigError::invalid_defaults(&parent.origin, e.to_string()))?;
    Ok(base.join(&relative))
}

fn apply_value_override(output: &mut ConfigMap, o: &Override) -> Result<(), ConfigError> {
    let path = o.key_path()?;
    let origin = format!("override '{}'", o.raw);
    let exists = lookup(output, &path).is_some();
    let value = || {
        o.value
            .clone()
            .ok_or_else(|| ConfigError::invalid_override(&o.raw, "missing '=value'"))
    };

    match o.op {
        OverrideOp::Assign if !exists => Err(ConfigError::invalid_override(
            &o.raw,
            format!("key '{}' not found; use +{}=<value> to add it", path, path),
        )),
        OverrideOp::Add if exists => Err(ConfigError::invalid_override(
            &o.raw,
            format!("key '{}' already exists; use ++{}=<value> to replace it", path, path),
        )),
        OverrideOp::Assign | OverrideOp::Add | OverrideOp::ForceAdd => {
            assign(output, &path, value()?).map_err(|e| ConfigError::from_value(origin, e))?;
            tracing::debug!(key = %path, "Applied override");
            Ok(())
        }
        OverrideOp::Delete => match remove(output, &path) {
            Some(_) => {
                tracing::debug!(key = %path, "Deleted key");
                Ok(())
            }
            None => Err(ConfigError::invalid_override(
                &o.raw,
                format!("cannot delete '{}': key not found", path),
            )),
        },
    }
}
