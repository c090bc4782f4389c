use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Identity of the stake ledger when it calls into the liveness tracker
pub const STAKING_ADDRESS: Address = Address::system(0x1000);
/// Identity of the liveness tracker when it calls into the slash engine
pub const LIVENESS_TRACKER_ADDRESS: Address = Address::system(0x1001);

/// Token amount in the smallest unit
pub type Amount = u128;

/// An account or validator identity
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Build a reserved system address whose last two bytes carry `id`
    pub const fn system(id: u16) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 2] = (id >> 8) as u8;
        bytes[ADDRESS_LENGTH - 1] = id as u8;
        Address(bytes)
    }

    /// Build an address from a big-endian integer, mostly useful for tests and simulation
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 8..].copy_from_slice(&value.to_be_bytes());
        Address(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
    #[error("Address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The block in which an operation executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Block height
    pub number: u64,
    /// Block timestamp in seconds
    pub timestamp: u64,
    /// Address of the block producer (the privileged per-block caller)
    pub producer: Address,
}

impl BlockContext {
    pub fn new(number: u64, timestamp: u64, producer: Address) -> Self {
        Self {
            number,
            timestamp,
            producer,
        }
    }
}

/// Caller identity plus the block an operation runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub block: BlockContext,
}

impl CallContext {
    pub fn new(caller: Address, block: BlockContext) -> Self {
        Self { caller, block }
    }

    /// Same block, different caller. Used for system-to-system calls.
    pub fn with_caller(&self, caller: Address) -> Self {
        Self {
            caller,
            block: self.block,
        }
    }

    pub fn is_block_producer(&self) -> bool {
        self.caller == self.block.producer
    }
}
