//! The key directory: which files a provisioning run produces, how long each one
//! lives, and reading and writing them.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::csr::CertificateSigningRequest;
use crate::error::{LocalCaError, Result};
use crate::key::KeyPair;
use crate::serial::SerialFile;

/// Whether a file survives a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Persistent,
    Ephemeral,
}

/// Every file a provisioning run manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    RootKey,
    RootCert,
    ServerKey,
    ServerCsr,
    ServerCert,
    ClientKey,
    ClientCsr,
    ClientCert,
    ClientArchive,
    Serial,
}

impl Artifact {
    pub const ALL: [Artifact; 10] = [
        Artifact::RootKey,
        Artifact::RootCert,
        Artifact::ServerKey,
        Artifact::ServerCsr,
        Artifact::ServerCert,
        Artifact::ClientKey,
        Artifact::ClientCsr,
        Artifact::ClientCert,
        Artifact::ClientArchive,
        Artifact::Serial,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::RootKey => "root.key",
            Artifact::RootCert => "root.crt",
            Artifact::ServerKey => "server.key",
            Artifact::ServerCsr => "server.csr",
            Artifact::ServerCert => "server.crt",
            Artifact::ClientKey => "client.key",
            Artifact::ClientCsr => "client.csr",
            Artifact::ClientCert => "client.crt",
            Artifact::ClientArchive => "client.pfx",
            Artifact::Serial => "root.srl",
        }
    }

    pub fn lifetime(self) -> Lifetime {
        match self {
            Artifact::RootCert
            | Artifact::ServerKey
            | Artifact::ServerCert
            | Artifact::ClientArchive => Lifetime::Persistent,
            _ => Lifetime::Ephemeral,
        }
    }

    /// Files holding private key material, written owner-only.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            Artifact::RootKey | Artifact::ServerKey | Artifact::ClientKey | Artifact::ClientArchive
        )
    }

    pub fn with_lifetime(lifetime: Lifetime) -> impl Iterator<Item = Artifact> {
        Self::ALL.into_iter().filter(move |a| a.lifetime() == lifetime)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// The two leaf identities issued by the CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Server,
    Client,
}

impl Identity {
    pub const ALL: [Identity; 2] = [Identity::Server, Identity::Client];

    pub fn key(self) -> Artifact {
        match self {
            Identity::Server => Artifact::ServerKey,
            Identity::Client => Artifact::ClientKey,
        }
    }

    pub fn csr(self) -> Artifact {
        match self {
            Identity::Server => Artifact::ServerCsr,
            Identity::Client => Artifact::ClientCsr,
        }
    }

    pub fn cert(self) -> Artifact {
        match self {
            Identity::Server => Artifact::ServerCert,
            Identity::Client => Artifact::ClientCert,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Server => f.write_str("server"),
            Identity::Client => f.write_str("client"),
        }
    }
}

/// A directory holding the artifacts of one CA.
#[derive(Debug, Clone)]
pub struct KeyDirectory {
    root: PathBuf,
}

impl KeyDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).exists()
    }

    /// Managed artifacts currently on disk.
    pub fn present(&self) -> Vec<Artifact> {
        Artifact::ALL
            .into_iter()
            .filter(|a| self.exists(*a))
            .collect()
    }

    /// Persistent artifacts that are not on disk.
    pub fn missing_persistent(&self) -> Vec<Artifact> {
        Artifact::with_lifetime(Lifetime::Persistent)
            .filter(|a| !self.exists(*a))
            .collect()
    }

    pub fn serial_file(&self) -> SerialFile {
        SerialFile::new(self.path(Artifact::Serial))
    }

    /// Creates the directory and makes sure no managed artifact is left over.
    ///
    /// With `force`, leftovers are removed; without it their presence is an error.
    pub fn prepare(&self, force: bool) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| LocalCaError::io(&self.root, e))?;

        let leftovers = self.present();
        if leftovers.is_empty() {
            return Ok(());
        }
        if !force {
            return Err(LocalCaError::InvalidInput(format!(
                "{} already contains {}; clear it or pass --force",
                self.root.display(),
                join(&leftovers)
            )));
        }
        for artifact in leftovers {
            warn!(path = %self.path(artifact).display(), "removing existing artifact");
            self.remove(artifact)?;
        }
        Ok(())
    }

    /// Writes a new file, failing if it already exists.
    pub fn write_new(&self, artifact: Artifact, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path(artifact);
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if artifact.is_secret() {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&path)
            .map_err(|e| LocalCaError::io(&path, e))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| LocalCaError::io(&path, e))?;
        debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(path)
    }

    pub fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        let path = self.path(artifact);
        fs::read(&path).map_err(|e| LocalCaError::io(&path, e))
    }

    pub fn read_to_string(&self, artifact: Artifact) -> Result<String> {
        let path = self.path(artifact);
        fs::read_to_string(&path).map_err(|e| LocalCaError::io(&path, e))
    }

    pub fn write_key(&self, artifact: Artifact, key: &KeyPair) -> Result<PathBuf> {
        self.write_new(artifact, key.to_pkcs8_pem()?.as_bytes())
    }

    pub fn read_key(&self, artifact: Artifact) -> Result<KeyPair> {
        KeyPair::import_from_pkcs8_pem(&self.read_to_string(artifact)?)
    }

    pub fn write_cert(&self, artifact: Artifact, cert: &Certificate) -> Result<PathBuf> {
        self.write_new(artifact, cert.to_pem()?.as_bytes())
    }

    pub fn read_cert(&self, artifact: Artifact) -> Result<Certificate> {
        Certificate::from_pem(&self.read_to_string(artifact)?)
    }

    pub fn write_csr(&self, artifact: Artifact, csr: &CertificateSigningRequest) -> Result<PathBuf> {
        self.write_new(artifact, csr.to_pem()?.as_bytes())
    }

    pub fn read_csr(&self, artifact: Artifact) -> Result<CertificateSigningRequest> {
        CertificateSigningRequest::from_pem(&self.read_to_string(artifact)?)
    }

    /// Deletes one artifact. A missing file is an error.
    pub fn remove(&self, artifact: Artifact) -> Result<()> {
        let path = self.path(artifact);
        fs::remove_file(&path).map_err(|e| LocalCaError::io(&path, e))?;
        debug!(path = %path.display(), "removed artifact");
        Ok(())
    }

    /// Deletes every ephemeral artifact, returning what was removed.
    pub fn cleanup(&self) -> Result<Vec<Artifact>> {
        let mut removed = Vec::new();
        for artifact in Artifact::with_lifetime(Lifetime::Ephemeral) {
            self.remove(artifact)?;
            removed.push(artifact);
        }
        Ok(removed)
    }
}

pub(crate) fn join(artifacts: &[Artifact]) -> String {
    artifacts
        .iter()
        .map(|a| a.file_name())
        .collect::<Vec<_>>()
        .join(", ")
}
