//! Query surface exposed to wallets, and the wire forms ledger structures
//! take when they cross it. Big integers travel as lowercase `0x`-prefixed
//! hex; byte fields as `0x`-prefixed hex strings. The transport listener
//! itself lives outside this crate.

use crate::confirmer::TransactionConfirmer;
use crate::crypto::{Address, Hash, Signature, SIGNATURE_BYTES};
use crate::mempool::{Mempool, TxInclusion};
use crate::storage::Store;
use crate::tx::{ConfirmedTransaction, Input, Output, Transaction};
use anyhow::{anyhow, bail, Result};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `0x`-prefixed lowercase hex for fixed-width byte fields.
mod hexstr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        ser.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D, T>(de: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let text = String::deserialize(de)?;
        let raw = hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        T::try_from(raw).map_err(|_| serde::de::Error::custom("unexpected byte length"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureWire(#[serde(with = "hexstr")] pub [u8; SIGNATURE_BYTES]);

impl From<Signature> for SignatureWire {
    fn from(sig: Signature) -> Self {
        SignatureWire(sig.0)
    }
}

impl From<SignatureWire> for Signature {
    fn from(wire: SignatureWire) -> Self {
        Signature(wire.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputWire {
    pub block_num: U256,
    pub tx_idx: U256,
    pub out_idx: U256,
    #[serde(with = "hexstr")]
    pub owner: Address,
    pub deposit_nonce: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputWire {
    #[serde(with = "hexstr")]
    pub new_owner: Address,
    pub amount: U256,
    pub deposit_nonce: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionWire {
    pub input0: InputWire,
    pub sig0: SignatureWire,
    pub input1: InputWire,
    pub sig1: SignatureWire,
    pub output0: OutputWire,
    pub output1: OutputWire,
    pub fee: U256,
    pub block_num: u64,
    pub tx_idx: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedTransactionWire {
    pub transaction: TransactionWire,
    pub signatures: [SignatureWire; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeaderWire {
    #[serde(with = "hexstr")]
    pub merkle_root: Hash,
    #[serde(with = "hexstr")]
    pub prev_hash: Hash,
    pub number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockWire {
    pub header: BlockHeaderWire,
    #[serde(with = "hexstr")]
    pub hash: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetaWire {
    pub created_at: u64,
    pub transaction_count: u32,
    pub fees: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInclusionWire {
    #[serde(with = "hexstr")]
    pub merkle_root: Hash,
    pub block_number: u64,
    pub transaction_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetBlockResponse {
    pub block: BlockWire,
    pub confirmed_transactions: Vec<ConfirmedTransactionWire>,
    pub metadata: BlockMetaWire,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub confirmed: ConfirmedTransactionWire,
    pub inclusion: TransactionInclusionWire,
}

fn u256_to_u64(value: &U256, what: &str) -> Result<u64> {
    if *value > U256::from(u64::MAX) {
        bail!("{what} out of range: {value}");
    }
    Ok(value.low_u64())
}

impl From<&Input> for InputWire {
    fn from(input: &Input) -> Self {
        InputWire {
            block_num: U256::from(input.blk_num),
            tx_idx: U256::from(input.tx_idx),
            out_idx: U256::from(input.out_idx),
            owner: input.owner,
            deposit_nonce: input.deposit_nonce,
        }
    }
}

impl TryFrom<&InputWire> for Input {
    type Error = anyhow::Error;

    fn try_from(wire: &InputWire) -> Result<Self> {
        Ok(Input {
            blk_num: u256_to_u64(&wire.block_num, "block number")?,
            tx_idx: u256_to_u64(&wire.tx_idx, "transaction index")? as u32,
            out_idx: u256_to_u64(&wire.out_idx, "output index")? as u8,
            deposit_nonce: wire.deposit_nonce,
            owner: wire.owner,
        })
    }
}

impl From<&Output> for OutputWire {
    fn from(output: &Output) -> Self {
        OutputWire {
            new_owner: output.owner,
            amount: output.denom,
            deposit_nonce: output.deposit_nonce,
        }
    }
}

impl From<&OutputWire> for Output {
    fn from(wire: &OutputWire) -> Self {
        Output { owner: wire.new_owner, denom: wire.amount, deposit_nonce: wire.deposit_nonce }
    }
}

impl From<&Transaction> for TransactionWire {
    fn from(tx: &Transaction) -> Self {
        TransactionWire {
            input0: (&tx.input0).into(),
            sig0: tx.sig0.into(),
            input1: (&tx.input1).into(),
            sig1: tx.sig1.into(),
            output0: (&tx.output0).into(),
            output1: (&tx.output1).into(),
            fee: tx.fee,
            block_num: tx.blk_num,
            tx_idx: tx.tx_idx,
        }
    }
}

impl TryFrom<&TransactionWire> for Transaction {
    type Error = anyhow::Error;

    fn try_from(wire: &TransactionWire) -> Result<Self> {
        Ok(Transaction {
            input0: (&wire.input0).try_into()?,
            sig0: wire.sig0.clone().into(),
            input1: (&wire.input1).try_into()?,
            sig1: wire.sig1.clone().into(),
            output0: (&wire.output0).into(),
            output1: (&wire.output1).into(),
            fee: wire.fee,
            blk_num: wire.block_num,
            tx_idx: wire.tx_idx,
        })
    }
}

impl From<&ConfirmedTransaction> for ConfirmedTransactionWire {
    fn from(confirmed: &ConfirmedTransaction) -> Self {
        ConfirmedTransactionWire {
            transaction: (&confirmed.transaction).into(),
            signatures: [confirmed.signatures[0].into(), confirmed.signatures[1].into()],
        }
    }
}

impl TryFrom<&ConfirmedTransactionWire> for ConfirmedTransaction {
    type Error = anyhow::Error;

    fn try_from(wire: &ConfirmedTransactionWire) -> Result<Self> {
        Ok(ConfirmedTransaction {
            transaction: (&wire.transaction).try_into()?,
            signatures: [wire.signatures[0].clone().into(), wire.signatures[1].clone().into()],
        })
    }
}

impl From<&crate::block::Block> for BlockWire {
    fn from(block: &crate::block::Block) -> Self {
        BlockWire {
            header: BlockHeaderWire {
                merkle_root: block.header.merkle_root,
                prev_hash: block.header.prev_hash,
                number: block.header.number,
            },
            hash: block.block_hash,
        }
    }
}

/// The ledger's query API: storage reads, mempool submission and the
/// confirmation hooks, behind one façade a transport can wrap.
pub struct QueryApi {
    storage: Arc<Store>,
    mempool: Mempool,
    confirmer: TransactionConfirmer,
}

impl QueryApi {
    pub fn new(storage: Arc<Store>, mempool: Mempool) -> Self {
        let confirmer = TransactionConfirmer::new(storage.clone());
        QueryApi { storage, mempool, confirmer }
    }

    pub fn get_balance(&self, addr: &Address) -> Result<U256> {
        self.storage.balance(addr)
    }

    pub fn get_outputs(
        &self,
        addr: &Address,
        spendable: bool,
    ) -> Result<Vec<ConfirmedTransactionWire>> {
        let txs = if spendable {
            self.storage.spendable_txs(addr)?
        } else {
            self.storage.utxos(addr)?
        };
        Ok(txs.iter().map(Into::into).collect())
    }

    pub fn get_block(&self, number: u64) -> Result<GetBlockResponse> {
        let block = self
            .storage
            .block_at_height(number)?
            .ok_or_else(|| anyhow!("no block found at height {number}"))?;
        let txs = self.storage.find_transactions_by_block_num(number)?;
        let meta = self
            .storage
            .block_meta_at_height(number)?
            .ok_or_else(|| anyhow!("no block metadata found at height {number}"))?;
        Ok(GetBlockResponse {
            block: (&block).into(),
            confirmed_transactions: txs.iter().map(Into::into).collect(),
            metadata: BlockMetaWire {
                created_at: meta.created_at,
                transaction_count: meta.transaction_count,
                fees: meta.fees,
            },
        })
    }

    /// Submits a transaction for inclusion and waits for its block position.
    pub async fn send(&self, wire: &ConfirmedTransactionWire) -> Result<SendResponse> {
        let confirmed: ConfirmedTransaction = wire.try_into()?;
        let inclusion: TxInclusion = self.mempool.append(confirmed.clone()).await?;
        let mut included = confirmed;
        included.transaction.blk_num = inclusion.block_number;
        included.transaction.tx_idx = inclusion.transaction_index;
        Ok(SendResponse {
            confirmed: (&included).into(),
            inclusion: TransactionInclusionWire {
                merkle_root: inclusion.merkle_root,
                block_number: inclusion.block_number,
                transaction_index: inclusion.transaction_index,
            },
        })
    }

    pub fn confirm(
        &self,
        block_number: u64,
        transaction_index: u32,
        auth_sig0: SignatureWire,
        auth_sig1: SignatureWire,
    ) -> Result<ConfirmedTransactionWire> {
        let confirmed = self.confirmer.confirm(
            block_number,
            transaction_index,
            [auth_sig0.into(), auth_sig1.into()],
        )?;
        Ok((&confirmed).into())
    }

    pub fn get_confirmations(
        &self,
        sig: SignatureWire,
        nonce: u64,
        block_number: u64,
        transaction_index: u32,
        output_index: u8,
    ) -> Result<(SignatureWire, SignatureWire)> {
        let sigs = self.confirmer.get_confirmations(
            &sig.into(),
            nonce,
            block_number,
            transaction_index,
            output_index,
        )?;
        Ok((sigs[0].into(), sigs[1].into()))
    }

    pub fn block_height(&self) -> Result<u64> {
        Ok(self.storage.latest_block()?.map(|b| b.header.number).unwrap_or(0))
    }
}
