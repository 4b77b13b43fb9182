pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, load_config_from, load_local_settings, load_settings, ConfigError};
pub use types::{Config, Settings};

/// Matches `$env{VAR_NAME}`: a letter or underscore followed by
/// alphanumerics or underscores.
pub(crate) fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Expands `$env{VAR_NAME}` references in a string.
/// Unset variables are left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    env_var_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

/// Replaces a leading `~` component with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home_dir) if rest.as_os_str().is_empty() => home_dir,
        Some(home_dir) => home_dir.join(rest),
        None => path.to_path_buf(),
    }
}

/// Settings file locations searched when `--config` is not given
fn default_config_paths() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home_dir| home_dir.join(".config").join("iamship").join("config.yml"))
        .into_iter()
        .chain(std::iter::once(PathBuf::from("/etc/iamship/config.yml")))
        .collect()
}

/// The explicit path (tilde-expanded), else the first default location that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(expand_tilde(path)),
        None => default_config_paths().into_iter().find(|path| path.exists()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_multiple() {
        std::env::set_var("IAMSHIP_TEST_VAR1", "value1");
        std::env::set_var("IAMSHIP_TEST_VAR2", "value2");
        let result = expand_env_vars("$env{IAMSHIP_TEST_VAR1}/middle/$env{IAMSHIP_TEST_VAR2}");
        assert_eq!(result, "value1/middle/value2");
        std::env::remove_var("IAMSHIP_TEST_VAR1");
        std::env::remove_var("IAMSHIP_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_unset_left_unchanged() {
        let result = expand_env_vars("path/$env{IAMSHIP_NONEXISTENT_VAR}/file");
        assert_eq!(result, "path/$env{IAMSHIP_NONEXISTENT_VAR}/file");
    }

    #[test]
    fn test_expand_env_vars_ignores_shell_syntax() {
        assert_eq!(expand_env_vars("${HOME}"), "${HOME}");
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/state/cursor.duckdb")), home.join("state/cursor.duckdb"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("/var/lib/iamship")), Path::new("/var/lib/iamship"));
        assert_eq!(expand_tilde(Path::new("relative/path")), Path::new("relative/path"));
    }

    #[test]
    fn test_resolve_explicit_path() {
        assert_eq!(
            resolve_config_path(Some(Path::new("/tmp/iamship.yml"))),
            Some(PathBuf::from("/tmp/iamship.yml"))
        );
    }

    #[test]
    fn test_default_paths_end_with_system_config() {
        let paths = default_config_paths();
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/iamship/config.yml")));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths[0], home.join(".config/iamship/config.yml"));
        }
    }
}
