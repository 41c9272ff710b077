use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use super::{ClientAccount, DepositAccount, PendingSwap, SwapDirection, SwapRecord};
use crate::chain::{Chain, IncomingTransaction};

const SWAP_COLUMNS: &str = r#"
  s.uuid,
  s.direction,
  s.amount,
  s.client_account_uuid,
  s.deposit_tx_hash,
  s.deposit_observed_at,
  s.transfer_tx_hash,
  s.processed_at,
  s.created_at"#;

const ACCOUNT_COLUMNS: &str = r#"
  uuid,
  address,
  address_chain,
  deposit_chain,
  deposit_address,
  deposit_address_index,
  deposit_memo"#;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create ledger dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_client_account(&mut self, account: &ClientAccount) -> Result<()> {
        let (deposit_address, deposit_address_index, deposit_memo) = match &account.deposit {
            DepositAccount::Loki {
                address,
                address_index,
            } => (Some(address.as_str()), Some(*address_index), None),
            DepositAccount::Bnb { memo } => (None, None, Some(memo.as_str())),
        };

        self.conn
            .execute(
                r#"
INSERT INTO client_accounts (
  uuid,
  address,
  address_chain,
  deposit_chain,
  deposit_address,
  deposit_address_index,
  deposit_memo,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#,
                params![
                    &account.uuid,
                    &account.address,
                    account.address_chain.as_str(),
                    account.deposit.chain().as_str(),
                    deposit_address,
                    deposit_address_index,
                    deposit_memo,
                    now_unix(),
                ],
            )
            .with_context(|| format!("insert client account {}", account.uuid))?;
        Ok(())
    }

    /// Client accounts whose deposit side lives on `deposit_chain`.
    pub fn client_accounts(&self, deposit_chain: Chain) -> Result<Vec<ClientAccount>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM client_accounts WHERE deposit_chain = ?1 ORDER BY created_at, uuid"
            ))
            .context("prepare list client accounts")?;

        let rows = stmt
            .query_map(params![deposit_chain.as_str()], account_from_row)
            .context("query client accounts")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read client account row")?);
        }
        Ok(out)
    }

    pub fn swap_deposit_hashes(&self, direction: SwapDirection) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT deposit_tx_hash FROM swaps WHERE direction = ?1")
            .context("prepare list deposit hashes")?;
        let rows = stmt
            .query_map(params![direction.as_str()], |row| row.get::<_, String>(0))
            .context("query deposit hashes")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read deposit hash")?);
        }
        Ok(out)
    }

    /// Records a deposit as a pending swap. Returns `None` when a swap for the
    /// same deposit hash already exists.
    pub fn insert_swap(
        &mut self,
        direction: SwapDirection,
        tx: &IncomingTransaction,
        account: &ClientAccount,
    ) -> Result<Option<SwapRecord>> {
        insert_swap_row(&self.conn, direction, tx, account)
    }

    /// Inserts a sweep batch in one transaction.
    pub fn insert_swaps(
        &mut self,
        direction: SwapDirection,
        batch: &[(IncomingTransaction, ClientAccount)],
    ) -> Result<Vec<SwapRecord>> {
        let db_tx = self.conn.transaction().context("begin insert swaps")?;
        let mut inserted = Vec::with_capacity(batch.len());
        for (tx, account) in batch {
            if let Some(record) = insert_swap_row(&db_tx, direction, tx, account)? {
                inserted.push(record);
            }
        }
        db_tx.commit().context("commit insert swaps")?;
        Ok(inserted)
    }

    pub fn get_swap(&self, uuid: &str) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swaps s WHERE s.uuid = ?1"),
                params![uuid],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {uuid}"))
    }

    pub fn swaps(&self, direction: SwapDirection) -> Result<Vec<SwapRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swaps s WHERE s.direction = ?1 ORDER BY s.deposit_observed_at, s.created_at, s.rowid"
            ))
            .context("prepare list swaps")?;
        let rows = stmt
            .query_map(params![direction.as_str()], swap_from_row)
            .context("query list swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    /// Swaps with a deposit but no transfer yet, in arrival order.
    pub fn pending_swaps(&self, direction: SwapDirection) -> Result<Vec<PendingSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                r#"
SELECT {SWAP_COLUMNS}, c.address
FROM swaps s
JOIN client_accounts c ON c.uuid = s.client_account_uuid
WHERE s.direction = ?1
  AND s.deposit_tx_hash IS NOT NULL
  AND s.deposit_tx_hash != ''
  AND s.transfer_tx_hash IS NULL
  AND s.processed_at IS NULL
ORDER BY s.deposit_observed_at, s.created_at, s.rowid
"#
            ))
            .context("prepare pending swaps")?;
        let rows = stmt
            .query_map(params![direction.as_str()], |row| {
                Ok(PendingSwap {
                    swap: swap_from_row(row)?,
                    address: row.get(9)?,
                })
            })
            .context("query pending swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read pending swap row")?);
        }
        Ok(out)
    }

    /// Sets the transfer hash and processed time on every swap in `uuids`.
    /// Either all rows are updated or none are.
    pub fn mark_swaps_processed(
        &mut self,
        uuids: &[String],
        transfer_tx_hash: &str,
        processed_at: i64,
    ) -> Result<()> {
        anyhow::ensure!(!uuids.is_empty(), "no swaps to mark processed");
        anyhow::ensure!(!transfer_tx_hash.is_empty(), "transfer tx hash is empty");

        let db_tx = self.conn.transaction().context("begin mark processed")?;
        for uuid in uuids {
            let rows = db_tx
                .execute(
                    r#"
UPDATE swaps
SET transfer_tx_hash = ?2, processed_at = ?3
WHERE uuid = ?1 AND transfer_tx_hash IS NULL AND processed_at IS NULL
"#,
                    params![uuid, transfer_tx_hash, processed_at],
                )
                .with_context(|| format!("mark swap processed {uuid}"))?;
            anyhow::ensure!(rows == 1, "swap not pending: {uuid}");
        }
        db_tx.commit().context("commit mark processed")?;
        Ok(())
    }
}

fn insert_swap_row(
    conn: &Connection,
    direction: SwapDirection,
    tx: &IncomingTransaction,
    account: &ClientAccount,
) -> Result<Option<SwapRecord>> {
    anyhow::ensure!(
        account.direction() == direction,
        "client account {} does not deposit for {direction}",
        account.uuid
    );

    let record = SwapRecord {
        uuid: Uuid::new_v4().to_string(),
        direction,
        amount: tx.amount,
        client_account_uuid: account.uuid.clone(),
        deposit_tx_hash: tx.hash.clone(),
        deposit_observed_at: tx.timestamp,
        transfer_tx_hash: None,
        processed_at: None,
        created_at: now_unix(),
    };

    let rows = conn
        .execute(
            r#"
INSERT INTO swaps (
  uuid,
  direction,
  amount,
  client_account_uuid,
  deposit_tx_hash,
  deposit_observed_at,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(deposit_tx_hash) DO NOTHING
"#,
            params![
                &record.uuid,
                direction.as_str(),
                record.amount,
                &record.client_account_uuid,
                &record.deposit_tx_hash,
                record.deposit_observed_at,
                record.created_at,
            ],
        )
        .with_context(|| format!("insert swap for deposit {}", tx.hash))?;

    Ok((rows == 1).then_some(record))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS client_accounts (
  uuid TEXT PRIMARY KEY,
  address TEXT NOT NULL,
  address_chain TEXT NOT NULL,
  deposit_chain TEXT NOT NULL,
  deposit_address TEXT,
  deposit_address_index INTEGER,
  deposit_memo TEXT,
  created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS client_accounts_deposit_chain_idx ON client_accounts(deposit_chain);

CREATE TABLE IF NOT EXISTS swaps (
  uuid TEXT PRIMARY KEY,
  direction TEXT NOT NULL,
  amount INTEGER NOT NULL,
  client_account_uuid TEXT NOT NULL REFERENCES client_accounts(uuid),
  deposit_tx_hash TEXT NOT NULL,
  deposit_observed_at INTEGER NOT NULL,
  transfer_tx_hash TEXT,
  processed_at INTEGER,
  created_at INTEGER NOT NULL,
  CHECK ((transfer_tx_hash IS NULL) = (processed_at IS NULL))
);
CREATE UNIQUE INDEX IF NOT EXISTS swaps_deposit_tx_hash_idx ON swaps(deposit_tx_hash);
CREATE INDEX IF NOT EXISTS swaps_pending_idx ON swaps(direction, transfer_tx_hash);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRecord> {
    let direction_str: String = row.get(1)?;
    let direction = direction_str.parse::<SwapDirection>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })?;
    let uuid: String = row.get(0)?;
    let amount = coerce_amount(&uuid, row.get(2)?);

    Ok(SwapRecord {
        uuid,
        direction,
        amount,
        client_account_uuid: row.get(3)?,
        deposit_tx_hash: row.get(4)?,
        deposit_observed_at: row.get(5)?,
        transfer_tx_hash: row.get(6)?,
        processed_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Amounts that are not non-negative numbers read as 0 so one bad row cannot
/// fail a whole batch.
fn coerce_amount(uuid: &str, value: Value) -> u64 {
    let amount = match &value {
        Value::Integer(i) => u64::try_from(*i).ok(),
        Value::Real(f) if f.is_finite() && *f >= 0.0 => Some(f.trunc() as u64),
        Value::Text(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    amount.unwrap_or_else(|| {
        tracing::warn!(swap = %uuid, value = ?value, "non-numeric swap amount; treating as 0");
        0
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<ClientAccount> {
    let address_chain: String = row.get(2)?;
    let deposit_chain: String = row.get(3)?;

    let deposit = match chain_from_str(&deposit_chain, 3)? {
        Chain::Loki => {
            let index: i64 = row.get(5)?;
            DepositAccount::Loki {
                address: row.get(4)?,
                address_index: u32::try_from(index).map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Integer,
                        format!("invalid deposit_address_index {index}").into(),
                    )
                })?,
            }
        }
        Chain::Bnb => DepositAccount::Bnb { memo: row.get(6)? },
    };

    Ok(ClientAccount {
        uuid: row.get(0)?,
        address: row.get(1)?,
        address_chain: chain_from_str(&address_chain, 2)?,
        deposit,
    })
}

fn chain_from_str(s: &str, col: usize) -> rusqlite::Result<Chain> {
    match s {
        "loki" => Ok(Chain::Loki),
        "bnb" => Ok(Chain::Bnb),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown chain: {other}").into(),
        )),
    }
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
