//! Deposit-address bundle extraction.
//!
//! The deposit-address service returns a per-chain bundle as loosely
//! typed JSON. Two layouts have been observed and both are accepted:
//!
//! - keyed by chain id: `{"8453": {"address": ..}, "solana": {"address": ..},
//!   "bitcoin": {"address": ..}}`
//! - list form: `{"evm_deposit_address": [{"chainId": 8453, "contractAddress": ..}],
//!   "solana_deposit_address": {"address": ..},
//!   "bitcoin_deposit_address": {"legacy_address": .., "segwit_address": ..}}`
//!
//! Unknown chains and malformed entries are skipped, never fatal.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

const ADDRESS_KEY: &str = "address";

/// Addresses worth rendering, grouped by chain family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositAddresses {
    /// EVM deposit addresses by chain name.
    pub evm: BTreeMap<String, String>,
    /// Solana deposit address.
    pub solana: Option<String>,
    /// Bitcoin deposit addresses by address format.
    pub bitcoin: BTreeMap<String, String>,
}

impl DepositAddresses {
    /// Extract every recognised address from a raw bundle.
    pub fn from_bundle(bundle: &Map<String, Value>) -> Self {
        Self {
            evm: extract_evm(bundle),
            solana: extract_solana(bundle),
            bitcoin: extract_bitcoin(bundle),
        }
    }

    /// Total number of addresses found.
    pub fn len(&self) -> usize {
        self.evm.len() + usize::from(self.solana.is_some()) + self.bitcoin.len()
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map a known EVM chain id to its network name.
pub const fn chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        56 => Some("bsc"),
        130 => Some("worldchain"),
        137 => Some("polygon"),
        146 => Some("sonic"),
        480 => Some("worldchain-sepolia"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        43114 => Some("avalanche"),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_evm(bundle: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut evm = BTreeMap::new();

    // Keyed-by-chain-id layout
    for (key, entry) in bundle {
        let Ok(chain_id) = key.parse::<u64>() else {
            continue;
        };
        if let (Some(name), Some(address)) =
            (chain_name(chain_id), non_empty_str(entry.get(ADDRESS_KEY)))
        {
            evm.insert(name.to_string(), address);
        }
    }

    // List layout
    if let Some(list) = bundle.get("evm_deposit_address").and_then(Value::as_array) {
        for item in list {
            let name = item
                .get("chainId")
                .and_then(parse_chain_id)
                .and_then(chain_name);
            let address = non_empty_str(item.get("contractAddress"))
                .or_else(|| non_empty_str(item.get(ADDRESS_KEY)));
            if let (Some(name), Some(address)) = (name, address) {
                evm.insert(name.to_string(), address);
            }
        }
    }

    evm
}

fn extract_solana(bundle: &Map<String, Value>) -> Option<String> {
    ["solana", "solana_deposit_address"]
        .iter()
        .find_map(|key| non_empty_str(bundle.get(*key).and_then(|v| v.get(ADDRESS_KEY))))
}

fn extract_bitcoin(bundle: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut btc = BTreeMap::new();

    if let Some(address) =
        non_empty_str(bundle.get("bitcoin").and_then(|v| v.get(ADDRESS_KEY)))
    {
        btc.insert("bitcoin".to_string(), address);
    }

    if let Some(formats) = bundle.get("bitcoin_deposit_address") {
        for (label, key) in [
            ("legacy", "legacy_address"),
            ("segwit", "segwit_address"),
            ("native_segwit", "native_segwit_address"),
            ("taproot", "taproot_address"),
        ] {
            if let Some(address) = non_empty_str(formats.get(key)) {
                btc.insert(label.to_string(), address);
            }
        }
    }

    btc
}
