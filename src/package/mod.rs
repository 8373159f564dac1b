// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

pub mod archive;
pub mod info;
pub mod manifest;

pub use archive::ArchiveReader;
pub use info::{PkgInfo, PkgName, PkgSource};
pub use manifest::{PkgManifest, PkgManifestStat};

/// A fully loaded package: metadata plus manifest plus the declarative
/// hooks list, read from an archive or from a registry metadata directory.
#[derive(Debug, Clone)]
pub struct Package {
    pub info: PkgInfo,
    pub manifest: PkgManifest,
    pub hooks: Option<String>,
}

impl Package {
    pub fn from_archive(path: impl Into<std::path::PathBuf>) -> Result<Self, archive::Error> {
        let reader = ArchiveReader::open(path);
        Ok(Self {
            info: reader.read_info()?,
            manifest: reader.read_manifest()?,
            hooks: reader.read_hooks()?,
        })
    }

    /// Loads the registry metadata directory written at install time:
    /// `<pkg_registry_dir>/<name>/{info.yml,manifest.yml,hooks.yml?}`.
    pub fn from_registry_dir(dir: &std::path::Path) -> Result<Self, RegistryEntryError> {
        let info_text = std::fs::read_to_string(dir.join("info.yml"))
            .map_err(|source| RegistryEntryError::Io { path: dir.join("info.yml"), source })?;
        let info: PkgInfo = serde_yaml::from_str(&info_text)?;

        let manifest_text = std::fs::read_to_string(dir.join("manifest.yml"))
            .map_err(|source| RegistryEntryError::Io { path: dir.join("manifest.yml"), source })?;
        let manifest: PkgManifest = serde_yaml::from_str(&manifest_text)?;
        manifest.validate()?;

        let hooks_path = dir.join("hooks.yml");
        let hooks = if hooks_path.exists() {
            Some(std::fs::read_to_string(&hooks_path).map_err(|source| RegistryEntryError::Io {
                path: hooks_path,
                source,
            })?)
        } else {
            None
        };

        Ok(Self { info, manifest, hooks })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryEntryError {
    #[error("missing or unreadable registry entry at {path:?}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Manifest(#[from] manifest::Error),
}
