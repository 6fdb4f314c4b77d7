use relayer_tinypack::{Decoder, Encoder, Reader, TinyDecode, TinyEncode, TinypackError};

use serde::{Deserialize, Serialize};

use super::{Address, Bloom, Hash, Quantity, VarBlob};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    pub address: Address,
    pub storage_keys: Vec<Hash>,
}

impl TinyEncode for AccessListEntry {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "AccessListEntry")
            .encode_field("address", &self.address)
            .encode_field("storageKeys", &self.storage_keys)
            .finish()
    }
}

impl TinyDecode for AccessListEntry {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "AccessListEntry");
        Ok(AccessListEntry {
            address: decoder.decode_field("address")?,
            storage_keys: decoder.decode_field("storageKeys")?,
        })
    }
}

/// Stored transaction together with its execution outcome.
///
/// The encoding leads with `tx_type` and only carries the access list for
/// type 1 and above, and the fee caps for type 2 and above. Values set on
/// those fields for a lower type are dropped on encode and come back as
/// defaults after a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub tx_type: u64,
    pub from: Address,
    pub is_contract_deployment: bool,
    /// Recipient, or the created contract when `is_contract_deployment`.
    pub to_or_contract: Address,
    pub nonce: Quantity,
    pub gas_price: Quantity,
    pub gas_limit: Quantity,
    pub gas_used: u64,
    pub value: Quantity,
    pub input: VarBlob,
    pub near_hash: Hash,
    pub near_receipt_hash: Hash,
    pub status: bool,
    pub v: u64,
    pub r: Quantity,
    pub s: Quantity,
    pub logs_bloom: Bloom,
    pub access_list: Vec<AccessListEntry>,
    pub max_priority_fee_per_gas: Quantity,
    pub max_fee_per_gas: Quantity,
}

impl Transaction {
    pub const LEGACY: u64 = 0;
    pub const ACCESS_LIST: u64 = 1;
    pub const DYNAMIC_FEE: u64 = 2;

    pub fn has_access_list(&self) -> bool {
        self.tx_type >= Self::ACCESS_LIST
    }

    pub fn has_dynamic_fee(&self) -> bool {
        self.tx_type >= Self::DYNAMIC_FEE
    }
}

impl TinyEncode for Transaction {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        let mut encoder = Encoder::new(buf, "Transaction")
            .encode_field("type", &self.tx_type)
            .encode_field("from", &self.from)
            .encode_field("isContractDeployment", &self.is_contract_deployment)
            .encode_field("toOrContract", &self.to_or_contract)
            .encode_field("nonce", &self.nonce)
            .encode_field("gasPrice", &self.gas_price)
            .encode_field("gasLimit", &self.gas_limit)
            .encode_field("gasUsed", &self.gas_used)
            .encode_field("value", &self.value)
            .encode_field("input", &self.input)
            .encode_field("nearHash", &self.near_hash)
            .encode_field("nearReceiptHash", &self.near_receipt_hash)
            .encode_field("status", &self.status)
            .encode_field("v", &self.v)
            .encode_field("r", &self.r)
            .encode_field("s", &self.s)
            .encode_field("logsBloom", &self.logs_bloom);
        if self.has_access_list() {
            encoder = encoder.encode_field("accessList", &self.access_list);
        }
        if self.has_dynamic_fee() {
            encoder = encoder
                .encode_field("maxPriorityFeePerGas", &self.max_priority_fee_per_gas)
                .encode_field("maxFeePerGas", &self.max_fee_per_gas);
        }
        encoder.finish()
    }
}

impl TinyDecode for Transaction {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "Transaction");
        let mut tx = Transaction {
            tx_type: decoder.decode_field("type")?,
            from: decoder.decode_field("from")?,
            is_contract_deployment: decoder.decode_field("isContractDeployment")?,
            to_or_contract: decoder.decode_field("toOrContract")?,
            nonce: decoder.decode_field("nonce")?,
            gas_price: decoder.decode_field("gasPrice")?,
            gas_limit: decoder.decode_field("gasLimit")?,
            gas_used: decoder.decode_field("gasUsed")?,
            value: decoder.decode_field("value")?,
            input: decoder.decode_field("input")?,
            near_hash: decoder.decode_field("nearHash")?,
            near_receipt_hash: decoder.decode_field("nearReceiptHash")?,
            status: decoder.decode_field("status")?,
            v: decoder.decode_field("v")?,
            r: decoder.decode_field("r")?,
            s: decoder.decode_field("s")?,
            logs_bloom: decoder.decode_field("logsBloom")?,
            ..Default::default()
        };
        if tx.has_access_list() {
            tx.access_list = decoder.decode_field("accessList")?;
        }
        if tx.has_dynamic_fee() {
            tx.max_priority_fee_per_gas = decoder.decode_field("maxPriorityFeePerGas")?;
            tx.max_fee_per_gas = decoder.decode_field("maxFeePerGas")?;
        }
        Ok(tx)
    }
}
