use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use loki_bridge_swap::chain::bnb::{BnbChainClient, BnbOutput, BnbTransfer};
use loki_bridge_swap::chain::{
    Chain, ChainError, ChainFacade, IncomingTransaction, PayoutOutput,
};
use loki_bridge_swap::price::PriceOracle;
use loki_bridge_swap::swap::DepositAccount;

/// In-memory chain: deposits are registered per account, payouts recorded.
pub struct FakeChain {
    chain: Chain,
    min_confirmations: u64,
    fetches: AtomicUsize,
    /// Each deposit becomes visible from the given fetch onwards.
    deposits: Mutex<Vec<(usize, DepositAccount, IncomingTransaction)>>,
    payouts: Mutex<Vec<Vec<PayoutOutput>>>,
    payout_hashes: Mutex<Vec<String>>,
    payout_error: Mutex<Option<String>>,
}

impl FakeChain {
    pub fn new(chain: Chain, min_confirmations: u64) -> Self {
        Self {
            chain,
            min_confirmations,
            fetches: AtomicUsize::new(0),
            deposits: Mutex::new(Vec::new()),
            payouts: Mutex::new(Vec::new()),
            payout_hashes: Mutex::new(vec![format!("{chain}-payout-1")]),
            payout_error: Mutex::new(None),
        }
    }

    pub fn deposit(&self, account: &DepositAccount, tx: IncomingTransaction) {
        self.deposit_from_fetch(account, tx, 0);
    }

    /// Registers `tx` so that only the `fetch`-th `incoming_transactions`
    /// call (counting from 0) and later ones report it.
    pub fn deposit_from_fetch(&self, account: &DepositAccount, tx: IncomingTransaction, fetch: usize) {
        self.deposits.lock().unwrap().push((fetch, account.clone(), tx));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_payout_hashes(&self, hashes: &[&str]) {
        *self.payout_hashes.lock().unwrap() = hashes.iter().map(|h| h.to_string()).collect();
    }

    pub fn fail_payouts(&self, message: &str) {
        *self.payout_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn payouts(&self) -> Vec<Vec<PayoutOutput>> {
        self.payouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainFacade for FakeChain {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn incoming_transactions(
        &self,
        account: &DepositAccount,
    ) -> Result<Vec<IncomingTransaction>, ChainError> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .iter()
            .filter(|(from, a, _)| *from <= fetch && a == account)
            .map(|(_, _, tx)| tx.clone())
            .collect())
    }

    fn is_settled(&self, tx: &IncomingTransaction) -> bool {
        !tx.pool && tx.confirmations >= self.min_confirmations
    }

    async fn send_payout(&self, outputs: &[PayoutOutput]) -> Result<Vec<String>, ChainError> {
        if outputs.is_empty() {
            return Err(ChainError::EmptyPayout);
        }
        if let Some(message) = self.payout_error.lock().unwrap().clone() {
            return Err(ChainError::Rpc { code: -4, message });
        }
        self.payouts.lock().unwrap().push(outputs.to_vec());
        Ok(self.payout_hashes.lock().unwrap().clone())
    }

    async fn validate_address(&self, address: &str) -> Result<bool, ChainError> {
        Ok(!address.is_empty())
    }
}

pub struct FakeOracle {
    price: Mutex<Option<Decimal>>,
    fail: Mutex<bool>,
}

impl FakeOracle {
    pub fn with_price(price: Decimal) -> Self {
        Self {
            price: Mutex::new(Some(price)),
            fail: Mutex::new(false),
        }
    }

    pub fn set_price(&self, price: Option<Decimal>) {
        *self.price.lock().unwrap() = price;
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn current_price_usd(&self, _asset: &str) -> Result<Option<Decimal>> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("price feed unreachable");
        }
        Ok(*self.price.lock().unwrap())
    }
}

/// Binance Chain transport behind a real `BnbFacade`.
#[derive(Default)]
pub struct FakeBnbClient {
    transfers: Mutex<Vec<BnbTransfer>>,
    sent: Mutex<Vec<Vec<BnbOutput>>>,
}

impl FakeBnbClient {
    pub fn transfer(&self, hash: &str, memo: &str, value: &str) {
        self.transfers.lock().unwrap().push(BnbTransfer {
            tx_hash: hash.to_string(),
            memo: memo.to_string(),
            value: value.to_string(),
            timestamp: chrono::Utc::now().timestamp() - 60,
        });
    }

    pub fn sent(&self) -> Vec<Vec<BnbOutput>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BnbChainClient for FakeBnbClient {
    async fn incoming_transfers(&self, _address: &str) -> Result<Vec<BnbTransfer>, ChainError> {
        Ok(self.transfers.lock().unwrap().clone())
    }

    async fn multi_send(&self, outputs: &[BnbOutput]) -> Result<Vec<String>, ChainError> {
        self.sent.lock().unwrap().push(outputs.to_vec());
        Ok(vec!["bnb-multisend-1".to_string()])
    }
}
