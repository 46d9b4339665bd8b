//! Service specification files.
//!
//! A service spec is a small TOML document naming the target service, how to
//! start it (an image or a host command), which ports it listens on, and the
//! routes that must be published regardless of what discovery finds.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::error::ServiceSpecError;
use crate::routes::{PathRewrite, Route, RouteEntry};
use crate::supervisor::{LaunchMode, LaunchSpec};

/// Suffix of the conventional manifest file next to a spec.
pub const MANIFEST_SUFFIX: &str = ".routes.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    name: Option<String>,
    image: Option<String>,
    command: Option<Vec<String>>,
    #[serde(default)]
    entrypoint: Vec<String>,
    ports: Option<Vec<u16>>,
    gpus: Option<String>,
    #[serde(default)]
    extra_args: Vec<String>,
    work_dir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    rewrite: PathRewrite,
    #[serde(default)]
    static_routes: Vec<RouteEntry>,
}

/// How the service is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSource {
    /// A container image.
    Image {
        /// Image reference.
        image: String,
        /// Command run inside the image.
        entrypoint: Vec<String>,
    },
    /// A host command.
    Command {
        /// Program and arguments.
        command: Vec<String>,
        /// Working directory.
        work_dir: Option<PathBuf>,
    },
}

/// A validated service specification.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Service name.
    pub name: String,
    /// How to start the service.
    pub source: ServiceSource,
    /// Ports the service listens on, in probe order.
    pub ports: Vec<u16>,
    /// `--gpus` value for container mode.
    pub gpus: Option<String>,
    /// Extra container runtime arguments.
    pub extra_args: Vec<String>,
    /// Environment injected into the service.
    pub env: BTreeMap<String, String>,
    /// Public path rewrite for discovered routes.
    pub rewrite: PathRewrite,
    /// Routes published regardless of discovery.
    pub static_routes: Vec<Route>,
    path: PathBuf,
}

impl ServiceSpec {
    /// Load and validate a spec file.
    ///
    /// `fallback_ports` (a comma list such as `8020,8080`) is used when the
    /// file declares no ports.
    pub fn load(path: &Path, fallback_ports: Option<&str>) -> Result<Self, ServiceSpecError> {
        let text = fs::read_to_string(path).map_err(|e| ServiceSpecError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path, fallback_ports)
    }

    /// Parse and validate spec text that was read from `path`.
    pub fn parse(text: &str, path: &Path, fallback_ports: Option<&str>) -> Result<Self, ServiceSpecError> {
        let file: SpecFile = toml::from_str(text).map_err(|e| ServiceSpecError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let invalid = |message: &str| ServiceSpecError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        let name = match file.name {
            Some(name) if !name.trim().is_empty() => name,
            Some(_) => return Err(invalid("'name' is empty")),
            None => file_stem(path).ok_or_else(|| invalid("cannot derive a name from the file name"))?,
        };

        let source = match (file.image, file.command) {
            (Some(image), None) => {
                if image.trim().is_empty() {
                    return Err(invalid("'image' is empty"));
                }
                if file.work_dir.is_some() {
                    return Err(invalid("'work_dir' only applies to 'command' services"));
                }
                ServiceSource::Image {
                    image,
                    entrypoint: file.entrypoint,
                }
            }
            (None, Some(command)) => {
                if command.is_empty() || command[0].trim().is_empty() {
                    return Err(invalid("'command' is empty"));
                }
                if !file.entrypoint.is_empty() {
                    return Err(invalid("'entrypoint' only applies to 'image' services"));
                }
                ServiceSource::Command {
                    command,
                    work_dir: file.work_dir,
                }
            }
            _ => return Err(invalid("set exactly one of 'image' or 'command'")),
        };

        let ports = match (file.ports, fallback_ports) {
            (Some(ports), _) => ports,
            (None, Some(list)) => {
                debug!("No ports in {:?}, using fallback list '{}'", path, list);
                parse_service_ports(list)?
            }
            (None, None) => Vec::new(),
        };
        if ports.is_empty() {
            return Err(invalid("'ports' must list at least one port"));
        }
        if ports.contains(&0) {
            return Err(invalid("ports must be in 1-65535"));
        }

        let default_port = ports.first().copied();
        let static_routes = file
            .static_routes
            .into_iter()
            .map(|entry| entry.resolve(default_port))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServiceSpecError::Route {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            name,
            source,
            ports,
            gpus: file.gpus,
            extra_args: file.extra_args,
            env: file.env,
            rewrite: file.rewrite,
            static_routes,
            path: path.to_path_buf(),
        })
    }

    /// Path the spec was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem of the spec path, falling back to the service name.
    pub fn stem(&self) -> String {
        file_stem(&self.path).unwrap_or_else(|| self.name.clone())
    }

    /// First declared port.
    pub fn default_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }

    /// `<spec dir>/<spec stem>.routes.json`.
    pub fn default_manifest_path(&self) -> PathBuf {
        manifest_path_for(&self.path)
    }

    /// Apply `KEY=VALUE` overrides on top of the spec's `[env]`.
    pub fn apply_env_overrides(&mut self, overrides: &[String]) -> Result<(), ServiceSpecError> {
        for item in overrides {
            let (key, value) = parse_env_override(item)?;
            self.env.insert(key, value);
        }
        Ok(())
    }

    /// The supervisor request for this service.
    pub fn launch_spec(&self) -> LaunchSpec {
        let mode = match &self.source {
            ServiceSource::Image { image, entrypoint } => LaunchMode::Container {
                image: image.clone(),
                entrypoint: entrypoint.clone(),
                gpus: self.gpus.clone(),
                extra_args: self.extra_args.clone(),
            },
            ServiceSource::Command { command, work_dir } => LaunchMode::Process {
                command: command.clone(),
                work_dir: work_dir.clone(),
            },
        };
        LaunchSpec {
            name: self.name.clone(),
            mode,
            ports: self.ports.clone(),
            env: self.env.clone(),
        }
    }
}

/// Conventional manifest path for a spec file.
pub fn manifest_path_for(spec_path: &Path) -> PathBuf {
    let stem = file_stem(spec_path).unwrap_or_else(|| "service".to_string());
    spec_path.with_file_name(format!("{stem}{MANIFEST_SUFFIX}"))
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a comma-separated port list such as `8020, 8080`.
pub fn parse_service_ports(list: &str) -> Result<Vec<u16>, ServiceSpecError> {
    let mut ports = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.parse::<u16>() {
            Ok(port) if port != 0 => {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
            _ => return Err(ServiceSpecError::InvalidPorts(list.to_string())),
        }
    }
    Ok(ports)
}

/// Split `KEY=VALUE`. The value may contain `=`.
pub fn parse_env_override(item: &str) -> Result<(String, String), ServiceSpecError> {
    match item.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(ServiceSpecError::InvalidEnv(item.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Method;

    const FULL: &str = r#"
        name = "imggen"
        image = "parachutes/python:3.12"
        entrypoint = ["python", "server.py"]
        ports = [8020, 8080]
        gpus = "all"
        extra_args = ["--shm-size=8g"]

        [env]
        HF_HOME = "/cache"

        [rewrite]
        strip_prefix = "/api"

        [[static_routes]]
        path = "/health"

        [[static_routes]]
        public_api_path = "/gen"
        method = "post"
        passthrough_port = 8080
        passthrough_path = "/generate"
        stream = true
    "#;

    fn parse(text: &str) -> Result<ServiceSpec, ServiceSpecError> {
        ServiceSpec::parse(text, Path::new("/srv/specs/imggen.toml"), None)
    }

    #[test]
    fn test_parse_full_spec() {
        let spec = parse(FULL).unwrap();

        assert_eq!(spec.name, "imggen");
        assert_eq!(spec.ports, vec![8020, 8080]);
        assert_eq!(spec.gpus.as_deref(), Some("all"));
        assert_eq!(spec.env["HF_HOME"], "/cache");
        assert_eq!(spec.rewrite.strip_prefix.as_deref(), Some("/api"));
        assert_eq!(
            spec.static_routes,
            vec![
                Route::new("/health", Method::Get, 8020, "/health"),
                Route::new("/gen", Method::Post, 8080, "/generate").streaming(true),
            ]
        );
        assert_eq!(
            spec.default_manifest_path(),
            PathBuf::from("/srv/specs/imggen.routes.json")
        );
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let spec = parse("command = [\"python\", \"-m\", \"server\"]\nports = [9000]\n").unwrap();
        assert_eq!(spec.name, "imggen");
        assert!(matches!(spec.source, ServiceSource::Command { .. }));
    }

    #[test]
    fn test_requires_exactly_one_of_image_or_command() {
        assert!(matches!(
            parse("ports = [1]\n"),
            Err(ServiceSpecError::Invalid { .. })
        ));
        assert!(matches!(
            parse("image = \"x\"\ncommand = [\"y\"]\nports = [1]\n"),
            Err(ServiceSpecError::Invalid { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_command_and_bad_ports() {
        assert!(parse("command = []\nports = [1]\n").is_err());
        assert!(parse("image = \"x\"\nports = []\n").is_err());
        assert!(parse("image = \"x\"\nports = [0]\n").is_err());
        assert!(matches!(
            parse("image = \"x\"\nports = [70000]\n"),
            Err(ServiceSpecError::Parse { .. })
        ));
    }

    #[test]
    fn test_fallback_ports() {
        let spec = ServiceSpec::parse(
            "image = \"x\"\n",
            Path::new("svc.toml"),
            Some("8020, 8080,8020"),
        )
        .unwrap();
        assert_eq!(spec.ports, vec![8020, 8080]);

        let spec = ServiceSpec::parse("image = \"x\"\nports = [1]\n", Path::new("svc.toml"), Some("2"))
            .unwrap();
        assert_eq!(spec.ports, vec![1]);
    }

    #[test]
    fn test_parse_service_ports_rejects_garbage() {
        assert!(parse_service_ports("80,abc").is_err());
        assert!(parse_service_ports("0").is_err());
        assert_eq!(parse_service_ports("").unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn test_env_overrides_win() {
        let mut spec = parse(FULL).unwrap();
        spec.apply_env_overrides(&["HF_HOME=/data".to_string(), "TOKEN=a=b".to_string()])
            .unwrap();
        assert_eq!(spec.env["HF_HOME"], "/data");
        assert_eq!(spec.env["TOKEN"], "a=b");

        assert!(matches!(
            spec.apply_env_overrides(&["NOEQUALS".to_string()]),
            Err(ServiceSpecError::InvalidEnv(_))
        ));
    }

    #[test]
    fn test_launch_spec_container_mode() {
        let launch = parse(FULL).unwrap().launch_spec();
        assert_eq!(launch.name, "imggen");
        assert_eq!(launch.ports, vec![8020, 8080]);
        match launch.mode {
            LaunchMode::Container {
                image,
                entrypoint,
                gpus,
                extra_args,
            } => {
                assert_eq!(image, "parachutes/python:3.12");
                assert_eq!(entrypoint, vec!["python", "server.py"]);
                assert_eq!(gpus.as_deref(), Some("all"));
                assert_eq!(extra_args, vec!["--shm-size=8g"]);
            }
            other => panic!("unexpected mode: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_static_route() {
        let text = "image = \"x\"\nports = [1]\n[[static_routes]]\npath = \"/x\"\nmethod = \"TRACE\"\n";
        assert!(matches!(parse(text), Err(ServiceSpecError::Route { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            parse("image = \"x\"\nports = [1]\nportz = [2]\n"),
            Err(ServiceSpecError::Parse { .. })
        ));
    }

    #[test]
    fn test_manifest_path_for_relative_spec() {
        assert_eq!(manifest_path_for(Path::new("svc.toml")), PathBuf::from("svc.routes.json"));
    }
}
