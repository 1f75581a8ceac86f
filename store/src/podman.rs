use std::{
    ffi::{OsStr, OsString},
    io::Write,
    process::{Command, Output},
};

use tracing::{debug, instrument};

use crate::{CertificateStore, StoreError, check_name};

/// Secrets kept by podman (`podman secret ...`).
///
/// The program and any leading arguments are configurable so the same store
/// can drive `podman --remote` or a podman behind a connection name.
#[derive(Debug, Clone)]
pub struct PodmanSecretStore {
    program: OsString,
    args: Vec<OsString>,
}

impl Default for PodmanSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PodmanSecretStore {
    pub fn new() -> Self {
        Self::with_program("podman", Vec::<OsString>::new())
    }

    pub fn with_program(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command_line(&self, args: &[&OsStr]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .chain(args.iter().copied())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output, StoreError> {
        debug!(command = %self.command_line(args), "Running podman");
        Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .output()
            .map_err(|source| StoreError::Spawn {
                command: self.command_line(args),
                source,
            })
    }

    fn failure(&self, args: &[&OsStr], output: &Output) -> StoreError {
        StoreError::Command {
            command: self.command_line(args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

impl CertificateStore for PodmanSecretStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        let args = [OsStr::new("secret"), OsStr::new("exists"), OsStr::new(name)];
        let output = self.run(&args)?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&args, &output)),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        if !self.exists(name)? {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let args = [
            OsStr::new("secret"),
            OsStr::new("inspect"),
            OsStr::new("--showsecret"),
            OsStr::new("--format"),
            OsStr::new("{{.SecretData}}"),
            OsStr::new(name),
        ];
        let output = self.run(&args)?;
        if !output.status.success() {
            return Err(self.failure(&args, &output));
        }

        // The format template appends a newline to the secret data
        let mut data = output.stdout;
        if data.last() == Some(&b'\n') {
            data.pop();
        }
        Ok(data)
    }

    #[instrument(skip(self, data))]
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        check_name(name)?;

        // Only readable by us, removed when dropped
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| StoreError::io(std::env::temp_dir(), e))?;
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| StoreError::io(file.path(), e))?;

        let args = [
            OsStr::new("secret"),
            OsStr::new("create"),
            OsStr::new("--replace"),
            OsStr::new(name),
            file.path().as_os_str(),
        ];
        let output = self.run(&args)?;
        if !output.status.success() {
            return Err(self.failure(&args, &output));
        }

        debug!("Created podman secret");
        Ok(())
    }
}
