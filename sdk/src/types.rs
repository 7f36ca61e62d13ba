//! Ledger-level value types shared by the protocol, the transaction builder
//! and ledger implementations.

use std::fmt;
use std::str::FromStr;

use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data::PlutusData;
use crate::error::ParseError;

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes =
                    hex::decode(s).map_err(|e| ParseError::new(stringify!($name), e.to_string()))?;
                Self::from_slice(&bytes).ok_or_else(|| {
                    ParseError::new(
                        stringify!($name),
                        format!("expected {} bytes, got {}", $len, bytes.len()),
                    )
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// Hash of a verification key; names the party allowed to unlock.
    Credential,
    28
);
hex_id!(
    /// Hash of a language-tagged script.
    ScriptHash,
    28
);
hex_id!(TransactionId, 32);

/// Reference to a single transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl OutputRef {
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transaction_id, self.index)
    }
}

impl fmt::Debug for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputRef({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    #[default]
    Preview,
}

impl Network {
    pub fn id(self) -> NetworkId {
        match self {
            Self::Mainnet => NetworkId::Mainnet,
            Self::Preprod | Self::Preview => NetworkId::Testnet,
        }
    }
}

/// Network discriminant carried in the low nibble of the address header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
    Testnet = 0,
    Mainnet = 1,
}

impl NetworkId {
    pub fn address_hrp(self) -> &'static str {
        match self {
            Self::Mainnet => "addr",
            Self::Testnet => "addr_test",
        }
    }
}

impl From<Network> for NetworkId {
    fn from(network: Network) -> Self {
        network.id()
    }
}

/// Payment part of an enterprise address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentPart {
    Key(Credential),
    Script(ScriptHash),
}

/// Enterprise (no staking part) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub network: NetworkId,
    pub payment: PaymentPart,
}

const HEADER_ENTERPRISE_KEY: u8 = 0b0110_0000;
const HEADER_ENTERPRISE_SCRIPT: u8 = 0b0111_0000;

impl Address {
    pub fn from_credential(network: impl Into<NetworkId>, credential: Credential) -> Self {
        Self {
            network: network.into(),
            payment: PaymentPart::Key(credential),
        }
    }

    pub fn from_script_hash(network: impl Into<NetworkId>, hash: ScriptHash) -> Self {
        Self {
            network: network.into(),
            payment: PaymentPart::Script(hash),
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        match self.payment {
            PaymentPart::Key(c) => Some(c),
            PaymentPart::Script(_) => None,
        }
    }

    pub fn script_hash(&self) -> Option<ScriptHash> {
        match self.payment {
            PaymentPart::Script(h) => Some(h),
            PaymentPart::Key(_) => None,
        }
    }

    /// Raw address bytes: header followed by the 28-byte payment hash.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (header, hash) = match &self.payment {
            PaymentPart::Key(c) => (HEADER_ENTERPRISE_KEY, c.as_bytes()),
            PaymentPart::Script(h) => (HEADER_ENTERPRISE_SCRIPT, h.as_bytes()),
        };
        let mut v = Vec::with_capacity(1 + hash.len());
        v.push(header | self.network as u8);
        v.extend_from_slice(hash);
        v
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let (&header, hash) = bytes
            .split_first()
            .ok_or_else(|| ParseError::new("address", "empty"))?;
        let network = match header & 0x0f {
            0 => NetworkId::Testnet,
            1 => NetworkId::Mainnet,
            other => {
                return Err(ParseError::new(
                    "address",
                    format!("unknown network id {other}"),
                ));
            }
        };
        let bad_len = || ParseError::new("address", format!("hash of {} bytes", hash.len()));
        let payment = match header & 0xf0 {
            HEADER_ENTERPRISE_KEY => {
                PaymentPart::Key(Credential::from_slice(hash).ok_or_else(bad_len)?)
            }
            HEADER_ENTERPRISE_SCRIPT => {
                PaymentPart::Script(ScriptHash::from_slice(hash).ok_or_else(bad_len)?)
            }
            other => {
                return Err(ParseError::new(
                    "address",
                    format!("unsupported header {other:#04x}"),
                ));
            }
        };
        Ok(Self { network, payment })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bech32::encode(
            self.network.address_hrp(),
            self.to_bytes().to_base32(),
            Variant::Bech32,
        )
        .map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data, _) =
            bech32::decode(s).map_err(|e| ParseError::new("address", e.to_string()))?;
        let bytes =
            Vec::<u8>::from_base32(&data).map_err(|e| ParseError::new("address", e.to_string()))?;
        let address = Self::from_bytes(&bytes)?;
        if address.network.address_hrp() != hrp {
            return Err(ParseError::new(
                "address",
                format!("prefix {hrp} does not match its network id"),
            ));
        }
        Ok(address)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A transaction output with an optional inline datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Address,
    /// Lovelace.
    pub value: u64,
    pub datum: Option<PlutusData>,
}

/// An output together with the reference that spends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub out_ref: OutputRef,
    pub output: TxOutput,
}
