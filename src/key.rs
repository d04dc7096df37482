use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding, PrivateKeyInfo};
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{LocalCaError, Result};
use crate::pem_utils;

/// RSA moduli accepted for generated keys.
pub const SUPPORTED_RSA_BITS: [usize; 3] = [2048, 3072, 4096];

/// Key algorithm selected for newly generated key pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    EcdsaP256,
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Rsa { bits: 2048 }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::EcdsaP256 => write!(f, "ECDSA P-256"),
        }
    }
}

/// Supported key types for certificate operations.
#[derive(Debug, Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
}

impl KeyPair {
    /// Generate a key pair for the given algorithm.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Rsa { bits } => Self::generate_rsa(bits),
            KeyAlgorithm::EcdsaP256 => Ok(Self::generate_ecdsa_p256()),
        }
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if !SUPPORTED_RSA_BITS.contains(&bits) {
            return Err(LocalCaError::InvalidInput(format!(
                "unsupported RSA key size {bits}, expected one of {SUPPORTED_RSA_BITS:?}"
            )));
        }
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| LocalCaError::KeyGenerationError(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// The signature algorithm this key produces.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
        }
    }

    /// The public half of this key pair as a SubjectPublicKeyInfo.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        PublicKey::from_key_pair(self).to_spki()
    }

    /// Signs `data` with SHA-256. ECDSA signatures are DER encoded, as X.509 expects.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key = RsaSigningKey::<Sha256>::new(private.as_ref().clone());
                let signature = signing_key
                    .try_sign(data)
                    .map_err(|e| LocalCaError::SigningError(e.to_string()))?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: P256Signature = signing_key
                    .try_sign(data)
                    .map_err(|e| LocalCaError::SigningError(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Encodes the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der()?,
        };
        Ok(document.as_bytes().to_vec())
    }

    /// Encodes the private key as a PKCS#8 PEM document (`PRIVATE KEY`).
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_pem(LineEnding::LF)?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_pem(LineEnding::LF)?,
        };
        Ok(pem.to_string())
    }

    /// Imports a PKCS#8 DER private key, dispatching on its algorithm identifier.
    pub fn import_from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(der)?;
        match info.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der)?;
                let public = RsaPublicKey::from(&private);
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let signing_key = P256SigningKey::from_pkcs8_der(der)?;
                let verifying_key = *signing_key.verifying_key();
                Ok(KeyPair::EcdsaP256 {
                    signing_key,
                    verifying_key,
                })
            }
            oid => Err(LocalCaError::DecodingError(format!(
                "unsupported private key algorithm {oid}"
            ))),
        }
    }

    /// Imports a PKCS#8 PEM private key.
    pub fn import_from_pkcs8_pem(pem: &str) -> Result<Self> {
        let der = pem_utils::pem_to_der(pem, pem_utils::PRIVATE_KEY_LABEL)?;
        Self::import_from_pkcs8_der(&der)
    }
}

/// Public key material extracted from a key pair, CSR or certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
        }
    }

    /// Parses a SubjectPublicKeyInfo as found in certificates and requests.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = der::Encode::to_der(spki)?;
        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(&der)?))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => Ok(PublicKey::EcdsaP256(
                P256VerifyingKey::from_public_key_der(&der)?,
            )),
            oid => Err(LocalCaError::DecodingError(format!(
                "unsupported public key algorithm {oid}"
            ))),
        }
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone())?,
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
        };
        Ok(spki)
    }

    /// Verifies a SHA-256 signature produced by the matching private key.
    pub fn verify(
        &self,
        algorithm: &SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match (self, algorithm) {
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRSA) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new(public.clone());
                let signature = RsaSignature::try_from(signature)?;
                Ok(verifying_key.verify(data, &signature)?)
            }
            (PublicKey::EcdsaP256(verifying_key), SignatureAlgorithm::Sha256WithECDSA) => {
                let signature = P256Signature::from_der(signature)?;
                Ok(verifying_key.verify(data, &signature)?)
            }
            (key, algorithm) => Err(LocalCaError::VerificationError(format!(
                "signature algorithm {algorithm:?} does not match {} key",
                key.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::EcdsaP256(_) => "ECDSA P-256",
        }
    }
}
