//! Foreign assembly reference resolution.
//!
//! References name an assembly by its simple name; the resolver turns that
//! into a loaded definition by checking what the session has already opened,
//! then scanning its search directories. All loads delegate back through the
//! [`AssemblyCache`], which guarantees single-instance sharing across the
//! whole weave session.

use std::path::PathBuf;

use crate::{
    metadata::module::{MemberRefKind, ModuleDef, TypeRefRow},
    metadata::queries,
    metadata::token::Token,
    Error, Result,
};

use super::{AssemblyCache, AssemblyHandle};

/// File extension of module containers.
pub const CONTAINER_EXTENSION: &str = "cwa";

/// Resolves assembly and member references against session search paths.
pub struct AssemblyResolver {
    search_dirs: Vec<PathBuf>,
}

impl AssemblyResolver {
    /// Creates a resolver with the given well-known search directories.
    ///
    /// Directories of assemblies the session has already loaded are always
    /// searched as well, without being listed here.
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        AssemblyResolver { search_dirs }
    }

    /// Adds a search directory.
    pub fn add_search_dir(&mut self, dir: PathBuf) {
        self.search_dirs.push(dir);
    }

    /// Resolves an assembly by simple name.
    ///
    /// Already-loaded assemblies win; otherwise each search directory is
    /// probed for `<name>.cwa` and the first hit is loaded through the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedReference`] when no candidate exists in any
    /// search path.
    pub fn resolve(&self, cache: &AssemblyCache, name: &str) -> Result<AssemblyHandle> {
        if let Some(loaded) = cache.by_name(name) {
            return Ok(loaded);
        }

        let file_name = format!("{name}.{CONTAINER_EXTENSION}");
        for dir in self.search_dirs.iter().cloned().chain(cache.loaded_directories()) {
            let candidate = dir.join(&file_name);
            if candidate.exists() {
                tracing::debug!(assembly = name, path = %candidate.display(), "resolved assembly reference");
                return cache.load(&candidate);
            }
        }

        Err(Error::UnresolvedReference(name.to_string()))
    }

    /// Resolves a type reference to its defining assembly and verifies the
    /// type exists there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedReference`] if the assembly cannot be
    /// located or does not define the referenced type.
    pub fn resolve_type_ref(
        &self,
        cache: &AssemblyCache,
        type_ref: &TypeRefRow,
    ) -> Result<AssemblyHandle> {
        let handle = self.resolve(cache, &type_ref.assembly)?;
        let full_name = type_ref.full_name();

        // try_read: the assembly under weave holds its own write lock, so a
        // self-referential resolve must fail instead of deadlocking.
        let defines_type = {
            let assembly = handle.try_read().map_err(|_| Error::LockError)?;
            assembly
                .modules
                .iter()
                .any(|module| module.type_by_name(&full_name).is_some())
        };

        if !defines_type {
            return Err(Error::UnresolvedReference(format!(
                "{full_name} in assembly '{}'",
                type_ref.assembly
            )));
        }
        Ok(handle)
    }

    /// Verifies that a member reference of `module` resolves to a real
    /// definition in its foreign assembly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedReference`] for an unknown assembly or
    /// type, and [`Error::MemberNotFound`] when the member itself is missing
    /// or its signature does not match.
    pub fn resolve_member_ref(
        &self,
        cache: &AssemblyCache,
        module: &ModuleDef,
        token: Token,
    ) -> Result<()> {
        let member = module
            .member_ref(token)
            .ok_or(Error::TypeNotFound(token))?;
        let type_ref = module
            .type_ref(member.declaring)
            .ok_or(Error::TypeNotFound(member.declaring))?;

        let handle = self.resolve_type_ref(cache, type_ref)?;
        let assembly = handle.try_read().map_err(|_| Error::LockError)?;
        let full_name = type_ref.full_name();

        let ty = assembly
            .modules
            .iter()
            .find_map(|foreign| foreign.type_by_name(&full_name))
            .ok_or_else(|| Error::UnresolvedReference(full_name.clone()))?;

        let found = match member.kind {
            MemberRefKind::Method => {
                let arg_names: Vec<&str> = member
                    .params
                    .iter()
                    .map(|param| param.display_name())
                    .collect();
                queries::find_method(ty, &member.name, &arg_names).is_some()
            }
            MemberRefKind::Field => ty.field(&member.name).is_some(),
        };

        if !found {
            return Err(Error::MemberNotFound {
                type_name: full_name,
                member: member.name.clone(),
            });
        }
        Ok(())
    }
}

impl Default for AssemblyResolver {
    fn default() -> Self {
        AssemblyResolver::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_reference() {
        let cache = AssemblyCache::new();
        let resolver = AssemblyResolver::new(vec![PathBuf::from("/nonexistent")]);
        assert!(matches!(
            resolver.resolve(&cache, "Ghost.Runtime"),
            Err(Error::UnresolvedReference(_))
        ));
    }
}
