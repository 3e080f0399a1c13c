//! Provisioning manifest and run settings.
//!
//! The [`Manifest`] is the configuration data a run is built from: package
//! lists, installer locations, plugin records and dotfile pairs. A default
//! manifest is compiled into the binary. [`Settings`] is the immutable
//! per-run value (platform, home, directories, verbosity) handed to every
//! step through its context.

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use url::Url;

use crate::error::ProvisionError;
use crate::executor::Verbosity;
use crate::platform::Platform;
use crate::privilege::{Privilege, PrivilegeMethod};
use crate::step::{
    DotfileStep, PackageManagerStep, PackagesStep, PluginStep, ProvisioningStep,
    ShellFrameworkStep, ToolchainStep,
};

const BUILTIN_MANIFEST: &str = include_str!("../config/default.yml");

/// URL schemes accepted for plugin sources.
const PLUGIN_SOURCE_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "file"];

/// System packages forming the essential toolchain, per platform family.
///
/// macOS has no list: its toolchain is the Xcode command line tools.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolchainPackages {
    #[serde(default)]
    pub debian: Vec<String>,
    #[serde(default)]
    pub redhat: Vec<String>,
}

/// Third-party package manager bootstrap settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageManagerConfig {
    /// Official installer script, fetched over HTTPS
    pub installer_url: String,
}

/// Shell framework install settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShellFrameworkConfig {
    /// Install directory, relative to the home directory
    pub directory: Utf8PathBuf,
    /// Official installer script, fetched over HTTPS
    pub installer_url: String,
}

/// A shell framework plugin cloned from a repository.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Plugin {
    pub name: String,
    pub source: String,
}

/// A file or directory copied from the source directory into home.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Dotfile {
    /// Path relative to the source directory
    pub source: Utf8PathBuf,
    /// Path relative to the home directory
    pub destination: Utf8PathBuf,
}

/// Everything a provisioning run installs and deploys.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub privilege: Privilege,
    #[serde(default)]
    pub toolchain: ToolchainPackages,
    pub package_manager: PackageManagerConfig,
    #[serde(default)]
    pub packages: Vec<String>,
    pub shell_framework: ShellFrameworkConfig,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    #[serde(default)]
    pub dotfiles: Vec<Dotfile>,
}

impl Manifest {
    /// Customization directory of the shell framework installed under `home`,
    /// used when `ZSH_CUSTOM` is not set.
    pub fn default_zsh_custom(&self, home: &Utf8Path) -> Utf8PathBuf {
        home.join(&self.shell_framework.directory).join("custom")
    }

    /// Returns the manifest compiled into the binary.
    pub fn builtin() -> Result<Self, ProvisionError> {
        parse_manifest(BUILTIN_MANIFEST, "built-in manifest")
    }

    /// Validates the manifest.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        for (family, packages) in [
            ("debian", &self.toolchain.debian),
            ("redhat", &self.toolchain.redhat),
        ] {
            for package in packages {
                validate_package_name(package)
                    .map_err(|e| prefix_validation(e, &format!("toolchain.{}", family)))?;
            }
        }

        validate_installer_url(&self.package_manager.installer_url)
            .map_err(|e| prefix_validation(e, "package_manager"))?;

        for package in &self.packages {
            validate_package_name(package).map_err(|e| prefix_validation(e, "packages"))?;
        }

        validate_relative_path(&self.shell_framework.directory, "shell_framework.directory")?;
        validate_installer_url(&self.shell_framework.installer_url)
            .map_err(|e| prefix_validation(e, "shell_framework"))?;

        for (index, plugin) in self.plugins.iter().enumerate() {
            validate_plugin(plugin).map_err(|e| prefix_validation(e, &format!("plugin {}", index + 1)))?;
        }
        let mut names: Vec<&str> = self.plugins.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ProvisionError::Validation(format!(
                "plugin '{}' is listed more than once",
                pair[0]
            )));
        }

        for (index, dotfile) in self.dotfiles.iter().enumerate() {
            let label = format!("dotfile {}", index + 1);
            validate_relative_path(&dotfile.source, &format!("{} source", label))?;
            validate_relative_path(&dotfile.destination, &format!("{} destination", label))?;
        }

        Ok(())
    }

    /// Builds the ordered step list for a run.
    ///
    /// The order is fixed: toolchain, package manager, packages, shell
    /// framework, plugins, dotfiles. Each later group depends on the earlier
    /// ones having succeeded.
    pub fn steps(&self) -> Vec<Box<dyn ProvisioningStep>> {
        let mut steps: Vec<Box<dyn ProvisioningStep>> = vec![
            Box::new(ToolchainStep::new(
                self.toolchain.debian.clone(),
                self.toolchain.redhat.clone(),
            )),
            Box::new(PackageManagerStep::new(self.package_manager.installer_url.clone())),
        ];

        if !self.packages.is_empty() {
            steps.push(Box::new(PackagesStep::new(self.packages.clone())));
        }

        steps.push(Box::new(ShellFrameworkStep::new(
            self.shell_framework.directory.clone(),
            self.shell_framework.installer_url.clone(),
        )));

        steps.extend(self.plugins.iter().map(|plugin| {
            Box::new(PluginStep::new(plugin.name.clone(), plugin.source.clone()))
                as Box<dyn ProvisioningStep>
        }));

        steps.extend(self.dotfiles.iter().map(|dotfile| {
            Box::new(DotfileStep::new(dotfile.source.clone(), dotfile.destination.clone()))
                as Box<dyn ProvisioningStep>
        }));

        steps
    }
}

fn parse_manifest(content: &str, origin: &str) -> Result<Manifest, ProvisionError> {
    serde_yaml::from_str(content)
        .map_err(|e| ProvisionError::Config(format!("failed to parse {}: {}", origin, e)))
}

/// Loads a manifest from a YAML file.
pub fn load_manifest(path: &Utf8Path) -> Result<Manifest, ProvisionError> {
    let file = File::open(path).map_err(|e| ProvisionError::io(path.as_str(), e))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader)
        .map_err(|e| ProvisionError::Config(format!("failed to parse YAML {}: {}", path, e)))
}

fn prefix_validation(err: ProvisionError, prefix: &str) -> ProvisionError {
    match err {
        ProvisionError::Validation(msg) => {
            ProvisionError::Validation(format!("{}: {}", prefix, msg))
        }
        other => other,
    }
}

fn validate_package_name(name: &str) -> Result<(), ProvisionError> {
    if name.trim().is_empty() {
        return Err(ProvisionError::Validation("package name must not be empty".to_string()));
    }
    if name.starts_with('-') || name.chars().any(char::is_whitespace) {
        return Err(ProvisionError::Validation(format!("invalid package name '{}'", name)));
    }
    Ok(())
}

fn validate_installer_url(raw: &str) -> Result<(), ProvisionError> {
    let url = Url::parse(raw).map_err(|e| {
        ProvisionError::Validation(format!("invalid installer URL '{}': {}", raw, e))
    })?;
    if url.scheme() != "https" {
        return Err(ProvisionError::Validation(format!(
            "installer URL must use https: {}",
            raw
        )));
    }
    Ok(())
}

fn validate_plugin(plugin: &Plugin) -> Result<(), ProvisionError> {
    let name = plugin.name.trim();
    if name.is_empty() {
        return Err(ProvisionError::Validation("plugin name must not be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(ProvisionError::Validation(format!(
            "plugin name '{}' must be a single directory name",
            plugin.name
        )));
    }
    let url = Url::parse(&plugin.source).map_err(|e| {
        ProvisionError::Validation(format!("invalid plugin source '{}': {}", plugin.source, e))
    })?;
    if !PLUGIN_SOURCE_SCHEMES.contains(&url.scheme()) {
        return Err(ProvisionError::Validation(format!(
            "unsupported plugin source scheme '{}' in {}",
            url.scheme(),
            plugin.source
        )));
    }
    Ok(())
}

fn validate_relative_path(path: &Utf8Path, label: &str) -> Result<(), ProvisionError> {
    if path.as_str().is_empty() {
        return Err(ProvisionError::Validation(format!("{} must not be empty", label)));
    }
    if path.is_absolute() {
        return Err(ProvisionError::Validation(format!(
            "{} must be relative: {}",
            label, path
        )));
    }
    if path.components().any(|c| c == Utf8Component::ParentDir) {
        return Err(ProvisionError::Validation(format!(
            "{} '{}' contains '..' components, which is not allowed",
            label, path
        )));
    }
    Ok(())
}

/// Immutable settings for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub platform: Platform,
    /// The user's home directory
    pub home: Utf8PathBuf,
    /// Directory holding the configuration bundle and shell rc file
    pub source_dir: Utf8PathBuf,
    /// Shell framework customization directory (`ZSH_CUSTOM`)
    pub zsh_custom: Utf8PathBuf,
    pub verbosity: Verbosity,
    pub dry_run: bool,
    /// Escalation wrapped around system package manager commands
    pub privilege: Option<PrivilegeMethod>,
}

impl Settings {
    /// Creates settings with defaults derived from `home`.
    ///
    /// `zsh_custom` defaults to `<home>/.oh-my-zsh/custom`; callers holding a
    /// manifest pass [`Manifest::default_zsh_custom`] instead.
    pub fn new(platform: Platform, home: Utf8PathBuf, source_dir: Utf8PathBuf) -> Self {
        let zsh_custom = home.join(".oh-my-zsh").join("custom");
        Self {
            platform,
            home,
            source_dir,
            zsh_custom,
            verbosity: Verbosity::Quiet,
            dry_run: false,
            privilege: None,
        }
    }

    #[must_use]
    pub fn with_zsh_custom(mut self, zsh_custom: Utf8PathBuf) -> Self {
        self.zsh_custom = zsh_custom;
        self
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_privilege(mut self, privilege: Option<PrivilegeMethod>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Directory that holds one subdirectory per plugin.
    pub fn plugins_dir(&self) -> Utf8PathBuf {
        self.zsh_custom.join("plugins")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_manifest_parses_and_validates() {
        let manifest = Manifest::builtin().expect("built-in manifest should parse");
        manifest.validate().expect("built-in manifest should validate");
        assert!(!manifest.packages.is_empty());
        assert!(manifest.plugins.iter().any(|p| p.name == "zsh-autosuggestions"));
        assert_eq!(manifest.dotfiles.len(), 2);
    }

    #[test]
    fn builtin_manifest_step_order() {
        let manifest = Manifest::builtin().unwrap();
        let names: Vec<String> = manifest.steps().iter().map(|s| s.name().into_owned()).collect();
        assert_eq!(names[0], "toolchain");
        assert_eq!(names[1], "package-manager");
        assert_eq!(names[2], "packages");
        assert_eq!(names[3], "shell-framework");
        assert_eq!(names[4], "plugin:zsh-autosuggestions");
        assert_eq!(names.last().map(String::as_str), Some("dotfile:.zshrc"));
        assert_eq!(names.len(), 4 + manifest.plugins.len() + manifest.dotfiles.len());
    }

    #[test]
    fn settings_defaults_follow_home() {
        let settings = Settings::new(Platform::Debian, "/home/me".into(), "/src".into());
        assert_eq!(settings.zsh_custom, Utf8PathBuf::from("/home/me/.oh-my-zsh/custom"));
        assert_eq!(settings.plugins_dir(), Utf8PathBuf::from("/home/me/.oh-my-zsh/custom/plugins"));
        assert_eq!(settings.verbosity, Verbosity::Quiet);
        assert!(!settings.dry_run);
    }

    #[test]
    fn settings_zsh_custom_override() {
        let settings = Settings::new(Platform::MacOs, "/Users/me".into(), "/src".into())
            .with_zsh_custom("/opt/zsh".into());
        assert_eq!(settings.plugins_dir(), Utf8PathBuf::from("/opt/zsh/plugins"));
    }

    #[test]
    fn package_name_validation() {
        assert!(validate_package_name("ripgrep").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("--force").is_err());
        assert!(validate_package_name("two words").is_err());
    }

    #[test]
    fn plugin_validation() {
        let ok = Plugin {
            name: "zsh-completions".to_string(),
            source: "https://github.com/zsh-users/zsh-completions".to_string(),
        };
        assert!(validate_plugin(&ok).is_ok());

        let traversal = Plugin {
            name: "../evil".to_string(),
            ..ok.clone()
        };
        assert!(validate_plugin(&traversal).is_err());

        let bad_scheme = Plugin {
            source: "ftp://example.com/repo".to_string(),
            ..ok
        };
        let err = validate_plugin(&bad_scheme).unwrap_err();
        assert!(err.to_string().contains("unsupported plugin source scheme"));
    }

    #[test]
    fn relative_path_validation() {
        assert!(validate_relative_path(Utf8Path::new(".config"), "x").is_ok());
        assert!(validate_relative_path(Utf8Path::new("/etc/passwd"), "x").is_err());
        assert!(validate_relative_path(Utf8Path::new("a/../../b"), "x").is_err());
        assert!(validate_relative_path(Utf8Path::new(""), "x").is_err());
    }

    #[test]
    fn installer_url_requires_https() {
        assert!(validate_installer_url("https://example.com/install.sh").is_ok());
        assert!(validate_installer_url("http://example.com/install.sh").is_err());
        assert!(validate_installer_url("not a url").is_err());
    }
}
