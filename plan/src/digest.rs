use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::Digest as _;

use crate::error::Error;

/// SHA-256 over the canonical JSON encoding of a plan.
///
/// Two plans with equal digests compose into structurally equal topologies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
#[non_exhaustive]
pub struct PlanDigest([u8; 32]);

impl PlanDigest {
    pub const ALG: &'static str = "sha256";

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    pub(crate) fn digest(plan: &crate::RawPlan) -> Self {
        struct HashWriter<'a>(&'a mut sha2::Sha256);

        impl Write for HashWriter<'_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.update(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut hasher = sha2::Sha256::new();
        serde_json::to_writer(HashWriter(&mut hasher), plan)
            .expect("hashing plan JSON cannot fail");
        Self(hasher.finalize().into())
    }
}

impl AsRef<[u8]> for PlanDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for PlanDigest {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((alg, hash_hex)) = input.split_once(':') else {
            return Err(Error::InvalidPlanDigest(input.to_string()));
        };

        if alg != Self::ALG || hash_hex.len() != 64 {
            return Err(Error::InvalidPlanDigest(input.to_string()));
        }

        let mut bytes = [0u8; 32];
        for (byte, chunk) in bytes.iter_mut().zip(hash_hex.as_bytes().chunks_exact(2)) {
            let chunk = std::str::from_utf8(chunk)
                .map_err(|_| Error::InvalidPlanDigest(input.to_string()))?;
            *byte = u8::from_str_radix(chunk, 16)
                .map_err(|_| Error::InvalidPlanDigest(input.to_string()))?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for PlanDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::ALG)?;
        f.write_str(":")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
