//! Dotted-path updates of TOML and YAML config files.
//!
//! A patch is an ordered list of `(key, value)` pairs where `key` is a dotted path such as
//! `HubData.rpc_url` or `chains.mars_9000-1.value.gas-adjustment`. Applying a patch creates
//! every missing intermediate table, replaces intermediates that are not tables, and leaves
//! all other content of the file untouched. Path segments therefore must not contain dots.
//!
//! Files are replaced atomically: the new content is written to a temporary file next to the
//! target, which is then renamed over it.

use std::{
    fs,
    io::{
        self,
        Write as _,
    },
    path::Path,
};

use color_eyre::eyre::{
    self,
    bail,
    WrapErr as _,
};
use serde_yaml::Mapping;
use tracing::{
    debug,
    instrument,
};

pub(crate) type TomlPatch = Patch<toml::Value>;
pub(crate) type YamlPatch = Patch<serde_yaml::Value>;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Patch<V> {
    entries: Vec<(String, V)>,
}

impl<V> Patch<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn set(mut self, key: impl Into<String>, value: impl Into<V>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<V> Default for Patch<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `patch` to the TOML file at `path`. A missing or empty file is treated as an empty
/// document.
#[instrument(skip_all, fields(path = %path.display(), entries = patch.len()), err)]
pub(crate) fn update_toml(path: &Path, patch: &TomlPatch) -> eyre::Result<()> {
    let mut document = match read_optional(path)? {
        Some(contents) if !contents.trim().is_empty() => contents
            .parse::<toml::Table>()
            .wrap_err_with(|| format!("failed to parse `{}` as toml", path.display()))?,
        _ => toml::Table::new(),
    };
    for (key, value) in patch.iter() {
        set_toml_path(&mut document, key, value.clone());
    }
    let rendered = toml::to_string(&document).wrap_err("failed to encode toml")?;
    write_atomically(path, rendered.as_bytes())
}

/// Applies `patch` to the YAML file at `path`. A missing or empty file is treated as an empty
/// mapping.
#[instrument(skip_all, fields(path = %path.display(), entries = patch.len()), err)]
pub(crate) fn update_yaml(path: &Path, patch: &YamlPatch) -> eyre::Result<()> {
    let mut document = match read_optional(path)? {
        Some(contents) if !contents.trim().is_empty() => {
            serde_yaml::from_str::<serde_yaml::Value>(&contents)
                .wrap_err_with(|| format!("failed to parse `{}` as yaml", path.display()))?
        }
        _ => serde_yaml::Value::Mapping(Mapping::new()),
    };
    if !document.is_mapping() {
        bail!(
            "`{}` does not hold a yaml mapping at its top level",
            path.display()
        );
    }
    for (key, value) in patch.iter() {
        set_yaml_path(&mut document, key, value.clone());
    }
    let rendered = serde_yaml::to_string(&document).wrap_err("failed to encode yaml")?;
    write_atomically(path, rendered.as_bytes())
}

/// Replaces the file at `path` with `contents` through a rename, creating parent directories.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> eyre::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .wrap_err_with(|| format!("failed to create `{}`", parent.display()))?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .wrap_err_with(|| format!("failed to create a temporary file in `{}`", parent.display()))?;
    staged
        .write_all(contents)
        .and_then(|()| staged.as_file().sync_all())
        .wrap_err("failed to write the temporary file")?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .wrap_err_with(|| format!("failed to replace `{}`", path.display()))?;
    debug!(path = %path.display(), "file replaced");
    Ok(())
}

fn read_optional(path: &Path) -> eyre::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).wrap_err_with(|| format!("failed to read `{}`", path.display())),
    }
}

fn set_toml_path(root: &mut toml::Table, key: &str, value: toml::Value) {
    let (parents, leaf) = split_key(key);
    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        let toml::Value::Table(next) = entry else {
            unreachable!("the entry was replaced by a table above");
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

fn set_yaml_path(root: &mut serde_yaml::Value, key: &str, value: serde_yaml::Value) {
    let (parents, leaf) = split_key(key);
    let mut current = root;
    for segment in parents {
        let map = as_mapping(current);
        current = map
            .entry(serde_yaml::Value::String(segment.to_string()))
            .or_insert(serde_yaml::Value::Mapping(Mapping::new()));
    }
    as_mapping(current).insert(serde_yaml::Value::String(leaf.to_string()), value);
}

fn as_mapping(value: &mut serde_yaml::Value) -> &mut Mapping {
    if !value.is_mapping() {
        *value = serde_yaml::Value::Mapping(Mapping::new());
    }
    let serde_yaml::Value::Mapping(map) = value else {
        unreachable!("the value was replaced by a mapping above");
    };
    map
}

fn split_key(key: &str) -> (Vec<&str>, &str) {
    match key.rsplit_once('.') {
        Some((parents, leaf)) => (parents.split('.').collect(), leaf),
        None => (Vec::new(), key),
    }
}
