use crate::crypto::{Address, Hash, Signature};
use crate::tx::Input;
use anyhow::Result;
use async_trait::async_trait;
use primitive_types::U256;

/// A deposit observed on the settlement layer. The nonce is the contract's
/// monotone deposit counter and becomes the minted output's deposit nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub sender: Address,
    pub value: U256,
    pub deposit_nonce: U256,
}

/// A started exit. Transaction exits carry the exiting outpoint's
/// coordinates; deposit exits are addressed by nonce alone and leave the
/// coordinates zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStartedEvent {
    pub owner: Address,
    pub blk_num: u64,
    pub tx_idx: u32,
    pub out_idx: u8,
    pub deposit_nonce: U256,
}

impl ExitStartedEvent {
    pub fn as_input(&self) -> Input {
        Input::new(self.blk_num, self.tx_idx, self.out_idx, self.deposit_nonce, self.owner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengedExitEvent {
    pub owner: Address,
    pub blk_num: u64,
    pub tx_idx: u32,
    pub out_idx: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedExitEvent {
    pub owner: Address,
    pub blk_num: u64,
    pub tx_idx: u32,
    pub out_idx: u8,
}

/// Interface contract of the settlement-layer client. The ledger core only
/// consumes it; the concrete Ethereum client lives outside this crate.
/// Filters return events from their start cursor up to the chain head,
/// together with the next cursor to persist.
#[async_trait]
pub trait RootChainClient: Send + Sync {
    async fn submit_block(
        &self,
        merkle_root: Hash,
        tx_count: u32,
        fees: U256,
        blk_num: u64,
    ) -> Result<()>;

    async fn submit_blocks(
        &self,
        merkle_roots: Vec<Hash>,
        tx_counts: Vec<u32>,
        fees: Vec<U256>,
        first_blk_num: u64,
    ) -> Result<()>;

    /// Challenges an exit with proof that its outpoint was already spent:
    /// the spending transaction's canonical bytes, its Merkle membership
    /// proof, and the exiter's confirmation signature over it.
    async fn challenge_exit(
        &self,
        exiting_tx_pos: [U256; 4],
        challenging_tx_pos: [u64; 2],
        challenging_tx_bytes: Vec<u8>,
        proof: Vec<u8>,
        auth_sig: Signature,
    ) -> Result<()>;

    async fn deposit_filter(&self, start: u64, end: u64) -> Result<(Vec<DepositEvent>, u64)>;

    async fn challenged_exit_filter(&self, start: u64)
        -> Result<(Vec<ChallengedExitEvent>, u64)>;

    async fn finalized_exit_filter(&self, start: u64) -> Result<(Vec<FinalizedExitEvent>, u64)>;

    async fn started_transaction_exit_filter(
        &self,
        start: u64,
        end: u64,
    ) -> Result<(Vec<ExitStartedEvent>, u64)>;

    async fn started_deposit_exit_filter(
        &self,
        start: u64,
    ) -> Result<(Vec<ExitStartedEvent>, u64)>;

    /// Current settlement-layer block height, the upper bound for filters.
    async fn block_height(&self) -> Result<u64>;
}

/// Stand-in client used when no settlement layer is wired up: accepts
/// submissions with a log line and reports no events.
pub struct NullClient;

#[async_trait]
impl RootChainClient for NullClient {
    async fn submit_block(
        &self,
        merkle_root: Hash,
        tx_count: u32,
        fees: U256,
        blk_num: u64,
    ) -> Result<()> {
        println!(
            "⛓️  Block {} ready for submission: root 0x{}, {} txs, {} in fees",
            blk_num,
            hex::encode(merkle_root),
            tx_count,
            fees
        );
        Ok(())
    }

    async fn submit_blocks(
        &self,
        merkle_roots: Vec<Hash>,
        tx_counts: Vec<u32>,
        fees: Vec<U256>,
        first_blk_num: u64,
    ) -> Result<()> {
        for (i, root) in merkle_roots.iter().enumerate() {
            self.submit_block(*root, tx_counts[i], fees[i], first_blk_num + i as u64).await?;
        }
        Ok(())
    }

    async fn challenge_exit(
        &self,
        exiting_tx_pos: [U256; 4],
        _challenging_tx_pos: [u64; 2],
        _challenging_tx_bytes: Vec<u8>,
        _proof: Vec<u8>,
        _auth_sig: Signature,
    ) -> Result<()> {
        println!(
            "⚔️  Challenge ready for exit at {}:{}:{}",
            exiting_tx_pos[0], exiting_tx_pos[1], exiting_tx_pos[2]
        );
        Ok(())
    }

    async fn deposit_filter(&self, start: u64, _end: u64) -> Result<(Vec<DepositEvent>, u64)> {
        Ok((Vec::new(), start))
    }

    async fn challenged_exit_filter(
        &self,
        start: u64,
    ) -> Result<(Vec<ChallengedExitEvent>, u64)> {
        Ok((Vec::new(), start))
    }

    async fn finalized_exit_filter(&self, start: u64) -> Result<(Vec<FinalizedExitEvent>, u64)> {
        Ok((Vec::new(), start))
    }

    async fn started_transaction_exit_filter(
        &self,
        start: u64,
        _end: u64,
    ) -> Result<(Vec<ExitStartedEvent>, u64)> {
        Ok((Vec::new(), start))
    }

    async fn started_deposit_exit_filter(
        &self,
        start: u64,
    ) -> Result<(Vec<ExitStartedEvent>, u64)> {
        Ok((Vec::new(), start))
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(0)
    }
}
