//! Program and library class pools used for read-only symbol resolution

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::class::ClassFile;
use super::reader::read_class;
use crate::common::error::{Error, Result};

/// Lookup of class files by internal name
///
/// Implementations must answer immediately; a missing class is `None`,
/// never an error.
pub trait ClassResolver: Sync {
    fn resolve_class(&self, internal_name: &str) -> Option<&ClassFile>;
}

/// Which pool a loaded class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Program,
    Library,
}

/// Classes being processed (program) and classes only referenced (library)
#[derive(Debug, Default)]
pub struct ClassPool {
    program: HashMap<String, ClassFile>,
    library: HashMap<String, ClassFile>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under its own name, replacing any earlier entry
    pub fn insert(&mut self, kind: PoolKind, class: ClassFile) -> Result<()> {
        let name = class.name()?.to_string();
        match kind {
            PoolKind::Program => self.program.insert(name, class),
            PoolKind::Library => self.library.insert(name, class),
        };
        Ok(())
    }

    pub fn program_class(&self, name: &str) -> Option<&ClassFile> {
        self.program.get(name)
    }

    pub fn library_class(&self, name: &str) -> Option<&ClassFile> {
        self.library.get(name)
    }

    pub fn program_classes(&self) -> impl Iterator<Item = (&String, &ClassFile)> {
        self.program.iter()
    }

    pub fn len(&self) -> usize {
        self.program.len() + self.library.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every `.class` file below `root` into the given pool
    pub fn load_dir(&mut self, kind: PoolKind, root: impl AsRef<Path>) -> Result<usize> {
        let mut loaded = 0;
        for path in class_files_under(root.as_ref())? {
            let bytes = std::fs::read(&path)?;
            let class = read_class(&bytes).map_err(|e| {
                Error::malformed_class(format!("{}: {}", path.display(), e))
            })?;
            self.insert(kind, class)?;
            loaded += 1;
        }
        debug!(root = %root.as_ref().display(), ?kind, loaded, "loaded class directory");
        Ok(loaded)
    }
}

impl ClassResolver for ClassPool {
    fn resolve_class(&self, internal_name: &str) -> Option<&ClassFile> {
        self.program
            .get(internal_name)
            .or_else(|| self.library.get(internal_name))
    }
}

/// All `.class` files under a directory, in a deterministic order
pub fn class_files_under(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "class") {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
