#![allow(dead_code)]

pub mod fakes;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use rust_decimal::Decimal;
use tempfile::TempDir;

use loki_bridge_swap::chain::bnb::{BnbFacade, BnbFacadeConfig};
use loki_bridge_swap::chain::{Chain, ChainFacade, Chains, IncomingTransaction, TxSource};
use loki_bridge_swap::price::PriceOracle;
use loki_bridge_swap::swap::counter::JsonFileVolumeStore;
use loki_bridge_swap::swap::service::{SwapService, SwapServiceConfig};
use loki_bridge_swap::swap::store::SqliteStore;
use loki_bridge_swap::swap::{ClientAccount, DepositAccount};

use fakes::{FakeBnbClient, FakeChain, FakeOracle};

pub const COIN: u64 = 1_000_000_000;

pub struct Harness {
    pub service: SwapService,
    pub loki: Arc<FakeChain>,
    pub bnb: Arc<FakeChain>,
    pub oracle: Arc<FakeOracle>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(cfg: SwapServiceConfig) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let loki = Arc::new(FakeChain::new(Chain::Loki, 6));
        let bnb = Arc::new(FakeChain::new(Chain::Bnb, 0));
        let oracle = Arc::new(FakeOracle::with_price(Decimal::new(5, 1)));
        let service = open_service(&dir, cfg, loki.clone(), bnb.clone(), oracle.clone())?;

        Ok(Self {
            service,
            loki,
            bnb,
            oracle,
            dir,
        })
    }

    pub fn add_account(&mut self, account: &ClientAccount) -> Result<()> {
        self.service
            .store_mut()
            .insert_client_account(account)
            .with_context(|| format!("insert account {}", account.uuid))
    }
}

/// Like `Harness`, but BLOKI goes through a real `BnbFacade`.
pub struct BnbHarness {
    pub service: SwapService,
    pub loki: Arc<FakeChain>,
    pub client: Arc<FakeBnbClient>,
    pub dir: TempDir,
}

impl BnbHarness {
    pub fn new(cfg: SwapServiceConfig) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let loki = Arc::new(FakeChain::new(Chain::Loki, 6));
        let client = Arc::new(FakeBnbClient::default());
        let bnb = Arc::new(BnbFacade::new(
            client.clone(),
            BnbFacadeConfig {
                deposit_address: "bnb1bridge".to_string(),
                address_prefix: "bnb".to_string(),
            },
        ));
        let oracle = Arc::new(FakeOracle::with_price(Decimal::new(5, 1)));
        let service = open_service(&dir, cfg, loki.clone(), bnb, oracle)?;

        Ok(Self {
            service,
            loki,
            client,
            dir,
        })
    }

    pub fn add_account(&mut self, account: &ClientAccount) -> Result<()> {
        self.service
            .store_mut()
            .insert_client_account(account)
            .with_context(|| format!("insert account {}", account.uuid))
    }
}

fn open_service(
    dir: &TempDir,
    cfg: SwapServiceConfig,
    loki: Arc<dyn ChainFacade>,
    bnb: Arc<dyn ChainFacade>,
    oracle: Arc<dyn PriceOracle>,
) -> Result<SwapService> {
    let store = SqliteStore::open(dir.path().join("ledger.sqlite3")).context("open store")?;
    let volume =
        JsonFileVolumeStore::open(dir.path().join("volume.json")).context("open volume store")?;
    Ok(SwapService::new(
        cfg,
        Chains::new(loki, bnb),
        store,
        Box::new(volume),
        oracle,
    ))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Deposits LOKI on sub-address `index`, paid out as BLOKI to `bnb_address`.
pub fn loki_account(uuid: &str, index: u32, bnb_address: &str) -> ClientAccount {
    ClientAccount {
        uuid: uuid.to_string(),
        address: bnb_address.to_string(),
        address_chain: Chain::Bnb,
        deposit: DepositAccount::Loki {
            address: format!("L-sub-{index}"),
            address_index: index,
        },
    }
}

/// Deposits BLOKI tagged with `memo`, paid out as LOKI to `loki_address`.
pub fn bnb_account(uuid: &str, memo: &str, loki_address: &str) -> ClientAccount {
    ClientAccount {
        uuid: uuid.to_string(),
        address: loki_address.to_string(),
        address_chain: Chain::Loki,
        deposit: DepositAccount::Bnb {
            memo: memo.to_string(),
        },
    }
}

pub fn loki_deposit(hash: &str, index: u32, amount: u64, confirmations: u64) -> IncomingTransaction {
    IncomingTransaction {
        hash: hash.to_string(),
        amount,
        timestamp: now() - 60,
        confirmations,
        pool: false,
        source: TxSource::AddressIndex(index),
    }
}

pub fn bnb_deposit(hash: &str, memo: &str, amount: u64) -> IncomingTransaction {
    IncomingTransaction {
        hash: hash.to_string(),
        amount,
        timestamp: now() - 60,
        confirmations: 1,
        pool: false,
        source: TxSource::Memo(memo.to_string()),
    }
}
