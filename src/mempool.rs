use crate::crypto::{self, Hash};
use crate::error::{LedgerError, SigKind};
use crate::storage::Store;
use crate::tx::{ConfirmedTransaction, Input};
use primitive_types::U256;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the spend pool. One slot below the fee-transaction index so
/// a full block still has room for the reserved fee slot.
pub const MAX_MEMPOOL_SIZE: usize = 65_534;

/// Where an admitted transaction landed once its block was packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInclusion {
    pub merkle_root: Hash,
    pub block_number: u64,
    pub transaction_index: u32,
}

pub type TxInclusionResponse = Result<TxInclusion, LedgerError>;

/// A validated transaction waiting in the pool, carrying the reply channel
/// the packager answers once the transaction is committed.
pub struct MempoolTx {
    pub tx: ConfirmedTransaction,
    response: oneshot::Sender<TxInclusionResponse>,
}

impl MempoolTx {
    pub fn respond(self, response: TxInclusionResponse) {
        // The submitter may have gone away; inclusion is not contingent on
        // it still listening.
        let _ = self.response.send(response);
    }
}

enum Command {
    Append { tx: ConfirmedTransaction, reply: oneshot::Sender<TxInclusionResponse> },
    FlushSpends { reply: oneshot::Sender<Vec<MempoolTx>> },
    FlushDeposit { reply: oneshot::Sender<Option<MempoolTx>> },
    Stop,
}

/// Handle to the admission actor. The actor owns the pools and the pending
/// outpoint set; everything reaches it as a message, which makes admission
/// order the block order.
#[derive(Clone)]
pub struct Mempool {
    command_tx: mpsc::UnboundedSender<Command>,
}

struct Actor {
    storage: Arc<Store>,
    tx_pool: Vec<MempoolTx>,
    deposit_pool: VecDeque<MempoolTx>,
    pool_spends: HashSet<String>,
    max_pool_size: usize,
}

impl Mempool {
    pub fn spawn(storage: Arc<Store>) -> Mempool {
        Self::spawn_with_max_size(storage, MAX_MEMPOOL_SIZE)
    }

    /// Same as [`Mempool::spawn`] with a custom spend-pool capacity, so the
    /// cap is exercisable without sixty-five thousand admissions.
    pub fn spawn_with_max_size(storage: Arc<Store>, max_pool_size: usize) -> Mempool {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let mut actor = Actor {
            storage,
            tx_pool: Vec::new(),
            deposit_pool: VecDeque::new(),
            pool_spends: HashSet::new(),
            max_pool_size,
        };
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    Command::Append { tx, reply } => actor.handle_append(tx, reply),
                    Command::FlushSpends { reply } => {
                        let drained = std::mem::take(&mut actor.tx_pool);
                        actor.pool_spends.clear();
                        let _ = reply.send(drained);
                    }
                    Command::FlushDeposit { reply } => {
                        let _ = reply.send(actor.deposit_pool.pop_front());
                    }
                    Command::Stop => break,
                }
            }
            println!("🛑 Mempool coordinator stopped");
        });
        Mempool { command_tx }
    }

    /// Submits a transaction and returns the channel its inclusion result
    /// arrives on. Rejections resolve immediately; accepted transactions
    /// resolve when their block is packaged.
    pub fn submit(
        &self,
        tx: ConfirmedTransaction,
    ) -> Result<oneshot::Receiver<TxInclusionResponse>, LedgerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Append { tx, reply: reply_tx })
            .map_err(|_| LedgerError::storage("mempool is not running"))?;
        Ok(reply_rx)
    }

    /// Submits a transaction and waits for its inclusion result.
    pub async fn append(&self, tx: ConfirmedTransaction) -> TxInclusionResponse {
        let reply_rx = self.submit(tx)?;
        reply_rx.await.unwrap_or_else(|_| Err(LedgerError::storage("mempool is not running")))
    }

    /// Drains the spend pool and the pending outpoint set in one step.
    pub async fn flush_spends(&self) -> Vec<MempoolTx> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::FlushSpends { reply: reply_tx }).is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Pops the oldest pending deposit, if any.
    pub async fn flush_deposit(&self) -> Option<MempoolTx> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::FlushDeposit { reply: reply_tx }).is_err() {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
    }
}

impl Actor {
    fn handle_append(
        &mut self,
        tx: ConfirmedTransaction,
        reply: oneshot::Sender<TxInclusionResponse>,
    ) {
        let is_deposit = tx.transaction.is_deposit();
        if !is_deposit && self.tx_pool.len() >= self.max_pool_size {
            let _ = reply.send(Err(LedgerError::MempoolFull));
            return;
        }

        let verdict = if is_deposit {
            self.verify_deposit_transaction(&tx)
        } else {
            self.verify_spend_transaction(&tx)
        };
        if let Err(err) = verdict {
            eprintln!(
                "⚠️  Rejected transaction 0x{}: {}",
                hex::encode(tx.transaction.signature_hash()),
                err
            );
            let _ = reply.send(Err(err));
            return;
        }

        self.note_pool_spends(&tx);
        let pending = MempoolTx { tx, response: reply };
        if is_deposit {
            self.deposit_pool.push_back(pending);
        } else {
            self.tx_pool.push(pending);
        }
    }

    /// Admission checks for a spend: both referenced outputs exist, spend
    /// and confirmation signatures recover to their owners, value is
    /// conserved, and the consumed outpoints are unspent both on disk and
    /// in the pool.
    fn verify_spend_transaction(&self, confirmed: &ConfirmedTransaction) -> Result<(), LedgerError> {
        let tx = &confirmed.transaction;

        for input in [&tx.input0, &tx.input1] {
            if !input.is_zero() && self.pool_spends.contains(&outpoint_key(input)) {
                return Err(LedgerError::DoubleSpend);
            }
        }

        let prev0 = self
            .storage
            .find_transaction_by_block_num_tx_idx(tx.input0.blk_num, tx.input0.tx_idx)
            .map_err(LedgerError::storage)?
            .ok_or(LedgerError::InputNotFound { which: 0 })?;
        let prev0_output = *prev0.transaction.output_at(tx.input0.out_idx);
        crypto::validate_signature(&tx.input0.signature_hash(), &tx.sig0, &prev0_output.owner)
            .map_err(|_| LedgerError::InvalidSignature { kind: SigKind::Input, which: 0 })?;
        crypto::validate_signature(
            &tx.signature_hash(),
            &confirmed.signatures[0],
            &prev0_output.owner,
        )
        .map_err(|_| LedgerError::InvalidSignature { kind: SigKind::Confirmation, which: 0 })?;

        let mut total_input = prev0_output.denom;
        if !tx.input1.is_zero() {
            let prev1 = self
                .storage
                .find_transaction_by_block_num_tx_idx(tx.input1.blk_num, tx.input1.tx_idx)
                .map_err(LedgerError::storage)?
                .ok_or(LedgerError::InputNotFound { which: 1 })?;
            let prev1_output = *prev1.transaction.output_at(tx.input1.out_idx);
            crypto::validate_signature(&tx.input1.signature_hash(), &tx.sig1, &prev1_output.owner)
                .map_err(|_| LedgerError::InvalidSignature { kind: SigKind::Input, which: 1 })?;
            crypto::validate_signature(
                &tx.signature_hash(),
                &confirmed.signatures[1],
                &prev1_output.owner,
            )
            .map_err(|_| LedgerError::InvalidSignature { kind: SigKind::Confirmation, which: 1 })?;
            total_input += prev1_output.denom;
        }

        let total_output: U256 = tx.output0.denom + tx.output1.denom + tx.fee;
        if total_input != total_output {
            return Err(LedgerError::SumMismatch);
        }

        if self.storage.is_double_spent(confirmed).map_err(LedgerError::storage)? {
            return Err(LedgerError::DoubleSpend);
        }

        Ok(())
    }

    /// Deposits are minted from settlement-layer events; their authority is
    /// the event, not a signature.
    fn verify_deposit_transaction(&self, _tx: &ConfirmedTransaction) -> Result<(), LedgerError> {
        Ok(())
    }

    fn note_pool_spends(&mut self, confirmed: &ConfirmedTransaction) {
        let tx = &confirmed.transaction;
        if !tx.input0.is_zero() {
            self.pool_spends.insert(outpoint_key(&tx.input0));
        }
        if !tx.input1.is_zero() {
            self.pool_spends.insert(outpoint_key(&tx.input1));
        }
    }
}

fn outpoint_key(input: &Input) -> String {
    format!("{}:{}:{}", input.blk_num, input.tx_idx, input.out_idx)
}
