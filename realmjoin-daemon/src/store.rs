//! Persisted per-provider realm state.
//!
//! An ini-style file with one section per known realm. Read once at
//! provider startup to pre-populate the realm cache; rewritten whenever a
//! join or leave changes what this host is enrolled in. Enrollment state
//! is derived from the presence of a section here, not from realm-object
//! lifecycle.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use realmjoin_core::settings;

#[derive(Debug)]
pub struct RealmStore {
    path: PathBuf,
    sections: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl RealmStore {
    /// Load the store from disk; a missing file is an empty store.
    pub fn load(path: PathBuf) -> Self {
        let sections = match std::fs::read_to_string(&path) {
            Ok(text) => settings::parse_sections(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Couldn't read realm state file");
                BTreeMap::new()
            }
        };

        Self {
            path,
            sections: Mutex::new(sections),
        }
    }

    /// Names of all persisted realm sections, sorted.
    pub fn section_names(&self) -> Vec<String> {
        self.sections.lock().unwrap().keys().cloned().collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.lock().unwrap().contains_key(name)
    }

    pub fn section(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.sections.lock().unwrap().get(name).cloned()
    }

    /// Replace a realm's section and persist.
    pub fn set_section(
        &self,
        name: &str,
        values: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let mut sections = self.sections.lock().unwrap();
        sections.insert(name.to_string(), values.clone());
        self.persist(&sections)
    }

    /// Drop a realm's section and persist. Removing an absent section is
    /// not an error.
    pub fn remove_section(&self, name: &str) -> anyhow::Result<()> {
        let mut sections = self.sections.lock().unwrap();
        sections.remove(name);
        self.persist(&sections)
    }

    fn persist(
        &self,
        sections: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&self.path, settings::render_sections(sections))
            .with_context(|| format!("writing {}", self.path.display()))
    }
}
