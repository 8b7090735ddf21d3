//! Locating the phpcs executable.
//!
//! Resolution strategies run in a fixed priority order: an explicit
//! settings path, then a composer project dependency, then the
//! directories on PATH. The first strategy to produce a path wins. The
//! composer strategy is the only one that can hard-fail: a manifest that
//! declares phpcs without the vendor binary being installed is a
//! configuration error, not a reason to fall through to PATH.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::Settings;
use crate::error::LintError;
use crate::version::ToolVersion;

/// Composer package that ships the phpcs binary.
const PACKAGE_NAME: &str = "squizlabs/php_codesniffer";

/// A located phpcs binary and its probed version. Cached per workspace
/// until a settings change invalidates it.
#[derive(Debug, Clone)]
pub struct ResolvedExecutable {
    pub path: PathBuf,
    pub version: ToolVersion,
}

/// Platform-conditional executable file name.
pub fn executable_name() -> &'static str {
    if cfg!(windows) { "phpcs.bat" } else { "phpcs" }
}

/// Resolve the phpcs executable path for the given settings.
pub fn resolve(settings: &Settings) -> Result<PathBuf, LintError> {
    let workspace_root = settings.workspace_root.as_deref();

    if let Some(explicit) = settings.executable_path.as_deref() {
        return resolve_explicit(explicit, workspace_root);
    }

    if let Some(root) = workspace_root
        && let Some(found) = resolve_composer(root, &settings.composer_json_path)?
    {
        return Ok(found);
    }

    if let Some(found) = search_path(std::env::var_os("PATH").as_deref(), executable_name()) {
        return Ok(found);
    }

    Err(LintError::NotFound)
}

/// An explicitly configured path always wins. Relative paths need a
/// workspace root to resolve against.
fn resolve_explicit(path: &str, workspace_root: Option<&Path>) -> Result<PathBuf, LintError> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    match workspace_root {
        Some(root) => Ok(root.join(path)),
        None => Err(LintError::NotFound),
    }
}

/// Composer project-dependency strategy.
///
/// `Ok(None)` means "no manifest here, keep looking". A manifest without
/// a lock file, or a declared dependency without its vendor binary, are
/// hard stops with an actionable message.
fn resolve_composer(root: &Path, manifest_rel: &str) -> Result<Option<PathBuf>, LintError> {
    let manifest_path = root.join(manifest_rel);
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let lock_path = manifest_path.with_file_name("composer.lock");
    if !lock_path.is_file() {
        return Err(LintError::Configuration(format!(
            "A composer configuration file was found at {} but no lock file exists at {}. \
             Run `composer install` to initialize your project dependencies.",
            manifest_path.display(),
            lock_path.display(),
        )));
    }

    let lock: ComposerLock = read_json(&lock_path)?;
    if !lock.declares(PACKAGE_NAME) {
        return Ok(None);
    }

    let manifest: ComposerManifest = read_json(&manifest_path)?;
    let candidate = root.join(manifest.bin_dir()).join(executable_name());
    if candidate.is_file() {
        Ok(Some(candidate))
    } else {
        Err(LintError::Configuration(format!(
            "Composer phpcs dependency is configured but was not found at {}. \
             Run `composer install` to install your project dependencies.",
            candidate.display(),
        )))
    }
}

/// Search each directory on a PATH-style value, in order, for `exe`.
pub fn search_path(path_var: Option<&OsStr>, exe: &str) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LintError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        LintError::Configuration(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        LintError::Configuration(format!("Failed to parse {}: {e}", path.display()))
    })
}

/// The slice of `composer.json` that matters here: bin/vendor directory
/// overrides under `config`.
#[derive(Debug, Default, Deserialize)]
struct ComposerManifest {
    #[serde(default)]
    config: ComposerConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ComposerConfig {
    #[serde(default, rename = "vendor-dir")]
    vendor_dir: Option<String>,
    #[serde(default, rename = "bin-dir")]
    bin_dir: Option<String>,
}

impl ComposerManifest {
    /// Effective binary directory: `config.bin-dir`, else
    /// `<config.vendor-dir | "vendor">/bin`.
    fn bin_dir(&self) -> PathBuf {
        match &self.config.bin_dir {
            Some(bin) => PathBuf::from(bin),
            None => {
                Path::new(self.config.vendor_dir.as_deref().unwrap_or("vendor")).join("bin")
            }
        }
    }
}

/// The slice of `composer.lock` that matters: resolved package names from
/// both dependency lists.
#[derive(Debug, Deserialize)]
struct ComposerLock {
    #[serde(default)]
    packages: Vec<ComposerPackage>,
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<ComposerPackage>,
}

#[derive(Debug, Deserialize)]
struct ComposerPackage {
    name: String,
}

impl ComposerLock {
    fn declares(&self, package: &str) -> bool {
        self.packages
            .iter()
            .chain(&self.packages_dev)
            .any(|p| p.name.eq_ignore_ascii_case(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn workspace_with(
        manifest: Option<&str>,
        lock: Option<&str>,
        vendor_binary: bool,
    ) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        if let Some(body) = manifest {
            std::fs::write(dir.path().join("composer.json"), body).unwrap();
        }
        if let Some(body) = lock {
            std::fs::write(dir.path().join("composer.lock"), body).unwrap();
        }
        if vendor_binary {
            let bin = dir.path().join("vendor/bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join(executable_name()), "").unwrap();
        }
        dir
    }

    fn settings_for(dir: &tempfile::TempDir) -> Settings {
        Settings {
            workspace_root: Some(dir.path().to_path_buf()),
            ..Settings::default()
        }
    }

    const LOCK_WITH_PHPCS: &str =
        r#"{"packages":[{"name":"squizlabs/php_codesniffer"}],"packages-dev":[]}"#;
    const LOCK_WITH_PHPCS_DEV: &str =
        r#"{"packages":[],"packages-dev":[{"name":"squizlabs/php_codesniffer"}]}"#;
    const LOCK_WITHOUT_PHPCS: &str = r#"{"packages":[{"name":"monolog/monolog"}]}"#;

    #[test]
    fn explicit_absolute_path_wins_over_composer() {
        let dir = workspace_with(Some("{}"), Some(LOCK_WITH_PHPCS), true);
        let mut settings = settings_for(&dir);
        settings.executable_path = Some("/opt/phpcs/bin/phpcs".to_string());

        let path = resolve(&settings).unwrap();
        assert_eq!(path, PathBuf::from("/opt/phpcs/bin/phpcs"));
    }

    #[test]
    fn explicit_relative_path_joins_workspace_root() {
        let dir = workspace_with(None, None, false);
        let mut settings = settings_for(&dir);
        settings.executable_path = Some("tools/phpcs".to_string());

        let path = resolve(&settings).unwrap();
        assert_eq!(path, dir.path().join("tools/phpcs"));
    }

    #[test]
    fn explicit_relative_path_without_root_fails() {
        let settings = Settings {
            executable_path: Some("tools/phpcs".to_string()),
            ..Settings::default()
        };
        assert!(matches!(resolve(&settings), Err(LintError::NotFound)));
    }

    #[test]
    fn composer_dependency_resolves_vendor_binary() {
        let dir = workspace_with(Some("{}"), Some(LOCK_WITH_PHPCS), true);
        let path = resolve(&settings_for(&dir)).unwrap();
        assert_eq!(path, dir.path().join("vendor/bin").join(executable_name()));
    }

    #[test]
    fn composer_dev_dependency_also_counts() {
        let dir = workspace_with(Some("{}"), Some(LOCK_WITH_PHPCS_DEV), true);
        let path = resolve(&settings_for(&dir)).unwrap();
        assert_eq!(path, dir.path().join("vendor/bin").join(executable_name()));
    }

    #[test]
    fn declared_but_uninstalled_dependency_is_a_hard_stop() {
        let dir = workspace_with(Some("{}"), Some(LOCK_WITH_PHPCS), false);
        match resolve(&settings_for(&dir)) {
            Err(LintError::Configuration(msg)) => {
                assert!(msg.contains("composer install"), "actionable: {msg}");
            }
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn manifest_without_lock_is_a_hard_stop() {
        let dir = workspace_with(Some("{}"), None, false);
        match resolve(&settings_for(&dir)) {
            Err(LintError::Configuration(msg)) => {
                assert!(msg.contains("composer.lock") || msg.contains("lock file"));
            }
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn lock_without_phpcs_falls_through() {
        // No phpcs dependency declared and nothing on the stub PATH, so
        // resolution exhausts every strategy.
        let dir = workspace_with(Some("{}"), Some(LOCK_WITHOUT_PHPCS), false);
        let mut settings = settings_for(&dir);
        settings.composer_json_path = "composer.json".to_string();

        // resolve() consults the real PATH; confine the check to the
        // composer strategy to keep the test hermetic.
        let outcome = resolve_composer(dir.path(), &settings.composer_json_path).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn bin_dir_override_is_honored() {
        let dir = workspace_with(
            Some(r#"{"config":{"bin-dir":"tools"}}"#),
            Some(LOCK_WITH_PHPCS),
            false,
        );
        let bin = dir.path().join("tools");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(executable_name()), "").unwrap();

        let path = resolve(&settings_for(&dir)).unwrap();
        assert_eq!(path, bin.join(executable_name()));
    }

    #[test]
    fn vendor_dir_override_is_honored() {
        let dir = workspace_with(
            Some(r#"{"config":{"vendor-dir":"deps"}}"#),
            Some(LOCK_WITH_PHPCS),
            false,
        );
        let bin = dir.path().join("deps/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(executable_name()), "").unwrap();

        let path = resolve(&settings_for(&dir)).unwrap();
        assert_eq!(path, bin.join(executable_name()));
    }

    #[test]
    fn path_search_takes_first_match_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("phpcs"), "").unwrap();

        let joined: OsString =
            std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = search_path(Some(joined.as_os_str()), "phpcs").unwrap();
        assert_eq!(found, second.path().join("phpcs"));

        // Now the first directory gains a match and shadows the second.
        std::fs::write(first.path().join("phpcs"), "").unwrap();
        let found = search_path(Some(joined.as_os_str()), "phpcs").unwrap();
        assert_eq!(found, first.path().join("phpcs"));
    }

    #[test]
    fn empty_path_yields_nothing() {
        assert!(search_path(None, "phpcs").is_none());
        assert!(search_path(Some(OsStr::new("")), "phpcs").is_none());
    }
}
