//! CLI arguments, server defaults and storage root resolution.

use clap::Parser;
use shadow_rs::formatcp;
use std::fmt;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_STORAGE_DIR: &str = ".filedrop/storage";
pub const DEFAULT_SAMPLE_FILES: &str = "bg1.jpg,bg2.jpg,bg3.jpg";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const TEMP_CLEAN_INTERVAL_SECS: u64 = 900;
/// Reserved subdirectory of the storage root holding in-flight writes.
pub const TEMP_DIR_NAME: &str = ".filedrop-tmp";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedrop", version = VERSION_INFO, about = "Filedrop file transfer server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "FILEDROP_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Storage directory used when no platform specific one is set"
    )]
    pub storage_dir: String,
    #[arg(
        long,
        env = "FILEDROP_STORAGE_DIR_WINDOWS",
        help = "Storage directory on Windows"
    )]
    pub storage_dir_windows: Option<String>,
    #[arg(long, env = "FILEDROP_STORAGE_DIR_MAC", help = "Storage directory on macOS")]
    pub storage_dir_mac: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_STORAGE_DIR_LINUX",
        help = "Storage directory on Linux and other unix systems"
    )]
    pub storage_dir_linux: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_SAMPLE_FILES",
        value_delimiter = ',',
        default_value = DEFAULT_SAMPLE_FILES,
        help = "Comma separated sample entries listed at startup (empty to disable)"
    )]
    pub sample_files: Vec<String>,
    #[arg(
        short = 'b',
        long = "bind",
        env = "FILEDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEDROP_PORT",
        default_value_t = 8080,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILEDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "FILEDROP_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Age in seconds after which orphaned temp files are removed (0 to disable)"
    )]
    pub temp_ttl_secs: u64,
}

impl Args {
    /// 汇总根目录相关的配置项。
    pub fn root_paths(&self) -> RootPaths {
        RootPaths {
            default: self.storage_dir.clone(),
            windows: self.storage_dir_windows.clone(),
            mac: self.storage_dir_mac.clone(),
            linux: self.storage_dir_linux.clone(),
        }
    }

    /// 过滤掉空白的示例文件名。
    pub fn sample_names(&self) -> Vec<String> {
        self.sample_files
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Host platform family used to pick a storage root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Mac,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// 按 `std::env::consts::OS` 的取值归类。
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" | "ios" => Platform::Mac,
            _ => Platform::Unix,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Unix => "unix",
        };
        f.write_str(name)
    }
}

/// Configured storage roots, one optional entry per platform plus a fallback.
#[derive(Clone, Debug, Default)]
pub struct RootPaths {
    pub default: String,
    pub windows: Option<String>,
    pub mac: Option<String>,
    pub linux: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingRoot(Platform),
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRoot(platform) => {
                write!(f, "no storage directory configured for {platform}")
            }
            ConfigError::Io(err) => write!(f, "invalid storage directory: {err}"),
        }
    }
}

impl From<ConfigError> for std::io::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}

/// 选出当前平台对应的存储根目录，并转换为绝对路径。
pub fn resolve_root(platform: Platform, paths: &RootPaths) -> Result<PathBuf, ConfigError> {
    let specific = match platform {
        Platform::Windows => paths.windows.as_deref(),
        Platform::Mac => paths.mac.as_deref(),
        Platform::Unix => paths.linux.as_deref(),
    };
    let selected = specific
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| paths.default.trim());
    if selected.is_empty() {
        return Err(ConfigError::MissingRoot(platform));
    }
    std::path::absolute(selected).map_err(ConfigError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RootPaths {
        RootPaths {
            default: "/srv/filedrop".to_string(),
            windows: Some("C:\\filedrop".to_string()),
            mac: Some("/Users/shared/filedrop".to_string()),
            linux: None,
        }
    }

    #[test]
    fn platform_specific_path_wins() {
        let root = resolve_root(Platform::Mac, &paths()).expect("resolve");
        assert_eq!(root, PathBuf::from("/Users/shared/filedrop"));
    }

    #[test]
    fn falls_back_to_default_when_platform_unset() {
        let root = resolve_root(Platform::Unix, &paths()).expect("resolve");
        assert_eq!(root, PathBuf::from("/srv/filedrop"));
    }

    #[test]
    fn blank_platform_path_is_ignored() {
        let mut paths = paths();
        paths.linux = Some("   ".to_string());
        let root = resolve_root(Platform::Unix, &paths).expect("resolve");
        assert_eq!(root, PathBuf::from("/srv/filedrop"));
    }

    #[test]
    fn relative_root_becomes_absolute() {
        let paths = RootPaths {
            default: "data/files".to_string(),
            ..RootPaths::default()
        };
        let root = resolve_root(Platform::Unix, &paths).expect("resolve");
        assert!(root.is_absolute());
        assert!(root.ends_with("data/files"));
    }

    #[test]
    fn empty_configuration_is_an_error() {
        let result = resolve_root(Platform::Windows, &RootPaths::default());
        assert!(matches!(
            result,
            Err(ConfigError::MissingRoot(Platform::Windows))
        ));
    }

    #[test]
    fn platform_from_os_name() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("macos"), Platform::Mac);
        assert_eq!(Platform::from_os("linux"), Platform::Unix);
        assert_eq!(Platform::from_os("freebsd"), Platform::Unix);
    }

    #[test]
    fn sample_names_skip_blank_entries() {
        let args = Args::parse_from(["filedrop", "--sample-files", "a.jpg, ,b.jpg"]);
        assert_eq!(args.sample_names(), vec!["a.jpg", "b.jpg"]);

        let args = Args::parse_from(["filedrop", "--sample-files", ""]);
        assert!(args.sample_names().is_empty());
    }
}
