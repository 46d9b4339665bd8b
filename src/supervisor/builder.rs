//! Builder for container runtime command lines.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Builds an attached `<runtime> run --rm ...` invocation.
///
/// The container runs in the foreground of the runtime client, so the
/// client's exit is the container's exit.
pub struct ContainerRunBuilder {
    runtime: PathBuf,
    args: Vec<OsString>,
}

impl ContainerRunBuilder {
    /// Start a `run --rm` command for `runtime`.
    pub fn new(runtime: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            args: vec!["run".into(), "--rm".into()],
        }
    }

    /// Add a raw argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the container name.
    pub fn name(self, name: &str) -> Self {
        self.arg("--name").arg(name)
    }

    /// Request GPU access.
    pub fn gpus(self, gpus: &str) -> Self {
        self.arg("--gpus").arg(gpus)
    }

    /// Set an environment variable inside the container.
    pub fn env(self, key: &str, value: &str) -> Self {
        self.arg("-e").arg(format!("{key}={value}"))
    }

    /// Publish `container_port` on `host_ip:host_port`.
    pub fn publish(self, host_ip: &str, host_port: u16, container_port: u16) -> Self {
        self.arg("-p")
            .arg(format!("{host_ip}:{host_port}:{container_port}"))
    }

    /// Pass extra runtime arguments; each entry is split on whitespace.
    pub fn extra_args(mut self, extra: &[String]) -> Self {
        for chunk in extra {
            self.args
                .extend(chunk.split_whitespace().map(OsString::from));
        }
        self
    }

    /// Set the image and the command run inside it.
    pub fn image(mut self, image: &str, command: &[String]) -> Self {
        self.args.push(image.into());
        self.args.extend(command.iter().map(OsString::from));
        self
    }

    /// Runtime binary the command runs.
    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    /// Build the final Command.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(&self.args);
        cmd
    }

    /// Get the command line as a string, shell-quoted where needed.
    pub fn to_command_line(&self) -> String {
        std::iter::once(self.runtime.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|arg| {
                let s = arg.to_string_lossy();
                if s.is_empty() || s.contains([' ', '"', '\'', '$']) {
                    format!("'{}'", s.replace('\'', "'\\''"))
                } else {
                    s.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_command_line_order() {
        let builder = ContainerRunBuilder::new("docker")
            .name("routescout-discover-imggen")
            .gpus("all")
            .env("HF_HOME", "/cache")
            .extra_args(&["--shm-size=8g --ipc host".to_string()])
            .publish("127.0.0.1", 40123, 8020)
            .image("parachutes/python:3.12", &["python".to_string(), "server.py".to_string()]);

        assert_eq!(
            builder.to_command_line(),
            "docker run --rm --name routescout-discover-imggen --gpus all -e HF_HOME=/cache \
             --shm-size=8g --ipc host -p 127.0.0.1:40123:8020 parachutes/python:3.12 python server.py"
        );
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let builder = ContainerRunBuilder::new("docker")
            .env("GREETING", "hello world")
            .image("img", &[]);
        assert_eq!(
            builder.to_command_line(),
            "docker run --rm -e 'GREETING=hello world' img"
        );
    }

    #[test]
    fn test_build_uses_runtime_program() {
        let builder = ContainerRunBuilder::new("/usr/bin/podman").image("img", &[]);
        let cmd = builder.build();
        assert_eq!(cmd.as_std().get_program(), "/usr/bin/podman");
        assert_eq!(builder.runtime(), Path::new("/usr/bin/podman"));
    }
}
