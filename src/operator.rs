use crate::error::LedgerError;
use crate::mempool::{Mempool, TxInclusion};
use crate::merkle::MerkleTree;
use crate::rootchain::{ExitStartedEvent, RootChainClient};
use crate::storage::{BlockResult, Store};
use crate::tx::{ConfirmedTransaction, Input};
use anyhow::{anyhow, Result};
use primitive_types::U256;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time;

/// Drives the ledger forward: packages pending transactions into blocks,
/// feeds settlement-layer deposits into the mempool, and answers started
/// exits by marking them spent and challenging the fraudulent ones.
pub struct Operator {
    storage: Arc<Store>,
    mempool: Mempool,
    client: Arc<dyn RootChainClient>,
}

impl Operator {
    pub fn new(storage: Arc<Store>, mempool: Mempool, client: Arc<dyn RootChainClient>) -> Self {
        Operator { storage, mempool, client }
    }

    /// One packaging pass. A pending deposit always gets a block of its
    /// own; otherwise the drained spend pool becomes the next block, and
    /// every admitted transaction learns its position through its reply
    /// channel.
    pub async fn package_tick(&self) -> Result<Option<BlockResult>> {
        if let Some(deposit) = self.mempool.flush_deposit().await {
            match self.storage.process_deposit(deposit.tx.clone()) {
                Ok(result) => {
                    deposit.respond(Ok(TxInclusion {
                        merkle_root: result.merkle_root,
                        block_number: result.block_number,
                        transaction_index: 0,
                    }));
                    self.submit(&result).await?;
                    return Ok(Some(result));
                }
                Err(err) => {
                    deposit.respond(Err(LedgerError::storage(&err)));
                    return Err(err);
                }
            }
        }

        let pending = self.mempool.flush_spends().await;
        if pending.is_empty() {
            return Ok(None);
        }

        let txs: Vec<ConfirmedTransaction> = pending.iter().map(|p| p.tx.clone()).collect();
        match self.storage.package_block(txs) {
            Ok(result) => {
                for (i, entry) in pending.into_iter().enumerate() {
                    entry.respond(Ok(TxInclusion {
                        merkle_root: result.merkle_root,
                        block_number: result.block_number,
                        transaction_index: i as u32,
                    }));
                }
                self.submit(&result).await?;
                Ok(Some(result))
            }
            Err(err) => {
                // The batch never committed; the admitting callers hear the
                // failure and the operator may retry on the next tick.
                let shared = LedgerError::storage(&err);
                for entry in pending {
                    entry.respond(Err(shared.clone()));
                }
                Err(err)
            }
        }
    }

    async fn submit(&self, result: &BlockResult) -> Result<()> {
        self.client
            .submit_block(
                result.merkle_root,
                result.transaction_count,
                result.block_fees,
                result.block_number,
            )
            .await?;
        self.storage.save_last_submitted_block(result.block_number)?;
        Ok(())
    }

    /// Reads deposit events past the stored cursor and feeds each one into
    /// the mempool as a deposit transaction.
    pub async fn poll_deposits(&self) -> Result<usize> {
        let head = self.client.block_height().await?;
        let last = self.storage.last_deposit_poll()?;
        let (events, next) = self.client.deposit_filter(last + 1, head).await?;
        let count = events.len();
        for event in events {
            let deposit =
                ConfirmedTransaction::deposit(event.sender, event.value, event.deposit_nonce);
            // Inclusion is reported on a later packaging tick; nobody waits
            // on a deposit's reply channel.
            let _ = self.mempool.submit(deposit)?;
        }
        self.storage.save_deposit_poll(next)?;
        Ok(count)
    }

    /// Reads started transaction and deposit exits past their cursors,
    /// challenges those whose outpoint was already spent, and records every
    /// exited outpoint so admission rejects future spends of it.
    pub async fn poll_exits(&self) -> Result<()> {
        let head = self.client.block_height().await?;

        let last = self.storage.last_tx_exit_poll()?;
        let (events, next) = self.client.started_transaction_exit_filter(last + 1, head).await?;
        self.handle_started_exits(&events).await?;
        self.storage.save_tx_exit_poll(next)?;

        let last = self.storage.last_deposit_exit_event_idx()?;
        let (events, next) = self.client.started_deposit_exit_filter(last + 1).await?;
        self.handle_started_exits(&events).await?;
        self.storage.save_deposit_exit_event_idx(next)?;

        Ok(())
    }

    async fn handle_started_exits(&self, events: &[ExitStartedEvent]) -> Result<()> {
        // Challenges must read the spend records before the exit markers
        // overwrite the picture of who consumed what.
        for event in events {
            if let Err(err) = self.challenge_if_spent(event).await {
                eprintln!(
                    "🔥 Failed to challenge exit for {}:{}:{}: {err}",
                    event.blk_num, event.tx_idx, event.out_idx
                );
            }
        }
        let inputs: Vec<Input> = events.iter().map(|e| e.as_input()).collect();
        self.storage.mark_exits_as_spent(&inputs)
    }

    /// The exit-challenge data path: when the exiting outpoint was already
    /// consumed on the child chain, assemble the spending transaction, its
    /// Merkle membership proof against the committed root, and the exiter's
    /// confirmation signature, and hand them to the settlement layer.
    async fn challenge_if_spent(&self, event: &ExitStartedEvent) -> Result<()> {
        let (blk_num, tx_idx) = if event.blk_num == 0 && !event.deposit_nonce.is_zero() {
            let deposit = self.storage.find_transaction_by_deposit_nonce(&event.deposit_nonce)?;
            (deposit.transaction.blk_num, deposit.transaction.tx_idx)
        } else {
            (event.blk_num, event.tx_idx)
        };

        let Some(spender) =
            self.storage.find_double_spending_transaction(blk_num, tx_idx, event.out_idx)?
        else {
            return Ok(());
        };
        if spender.transaction.blk_num == blk_num && spender.transaction.tx_idx == tx_idx {
            // An earlier exit marker, not a child-chain spend.
            return Ok(());
        }

        let block_txs = self.storage.find_transactions_by_block_num(spender.transaction.blk_num)?;
        let leaves: Vec<_> = block_txs.iter().map(|tx| tx.signature_hash()).collect();
        let proof = MerkleTree::proof(&leaves, spender.transaction.tx_idx as usize)
            .ok_or_else(|| anyhow!("spending transaction missing from its own block"))?;

        let consumed_by = if spender.transaction.input0.blk_num == blk_num
            && spender.transaction.input0.tx_idx == tx_idx
            && spender.transaction.input0.out_idx == event.out_idx
        {
            0
        } else {
            1
        };
        let auth_sigs =
            self.storage.auth_sigs_for(spender.transaction.blk_num, spender.transaction.tx_idx)?;

        let exiting_tx_pos = [
            U256::from(blk_num),
            U256::from(tx_idx),
            U256::from(event.out_idx),
            event.deposit_nonce,
        ];
        let challenging_tx_pos = [spender.transaction.blk_num, spender.transaction.tx_idx as u64];

        println!(
            "⚔️  Challenging exit of {}:{}:{} with spend at {}:{}",
            blk_num, tx_idx, event.out_idx, challenging_tx_pos[0], challenging_tx_pos[1]
        );
        self.client
            .challenge_exit(
                exiting_tx_pos,
                challenging_tx_pos,
                spender.signing_bytes(),
                MerkleTree::proof_bytes(&proof),
                auth_sigs[consumed_by],
            )
            .await
    }

    /// Runs the operator on a fixed tick until shutdown.
    pub fn spawn_loop(self, tick_secs: u64, mut shutdown_rx: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            let mut ticker = time::interval(time::Duration::from_secs(tick_secs));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        println!("🛑 Operator received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_deposits().await {
                            eprintln!("🔥 Deposit poll failed: {e}");
                        }
                        if let Err(e) = self.poll_exits().await {
                            eprintln!("🔥 Exit poll failed: {e}");
                        }
                        match self.package_tick().await {
                            Ok(Some(result)) => println!(
                                "📦 Packaged block {} with {} transactions",
                                result.block_number, result.transaction_count
                            ),
                            Ok(None) => {}
                            Err(e) => eprintln!("🔥 Packaging failed: {e}"),
                        }
                    }
                }
            }
            println!("✅ Operator shutdown complete");
        });
    }
}
