//! SQLite-backed account store with tokens encrypted at rest.

use super::{Account, AccountStore, Resource};
use crate::credentials::{Credentials, SealedToken, TokenCipher};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Account storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE accounts (
///     id INTEGER PRIMARY KEY,
///     domain_id TEXT NOT NULL,
///     hub_id TEXT NOT NULL,
///     access_token TEXT NOT NULL,        -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,                -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT,                   -- RFC 3339 (optional)
///     companies_pulled_at TEXT,          -- Watermarks, RFC 3339 (optional)
///     contacts_pulled_at TEXT,
///     meetings_pulled_at TEXT,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(domain_id, hub_id)
/// );
/// ```
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl SqliteAccountStore {
    /// Creates or opens an account store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher =
            TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open account database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                domain_id TEXT NOT NULL,
                hub_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT,
                companies_pulled_at TEXT,
                contacts_pulled_at TEXT,
                meetings_pulled_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(domain_id, hub_id)
            )
            "#,
            [],
        )
        .context("Failed to create accounts table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Account store connection lock poisoned"))
    }

    /// Adds a newly connected account (or replaces an existing one).
    pub fn register(&self, account: &Account) -> Result<()> {
        self.upsert(account)
    }

    fn upsert(&self, account: &Account) -> Result<()> {
        let access = self
            .cipher
            .seal(&account.credentials.access_token)
            .context("Failed to encrypt access token")?;
        let refresh = account
            .credentials
            .refresh_token
            .as_deref()
            .map(|token| self.cipher.seal(token))
            .transpose()
            .context("Failed to encrypt refresh token")?;

        let expires_at = account.credentials.expires_at.map(|dt| dt.to_rfc3339());
        let pulled_at = |resource| account.watermark(resource).map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO accounts (
                domain_id, hub_id,
                access_token, access_token_nonce,
                refresh_token, refresh_token_nonce,
                expires_at,
                companies_pulled_at, contacts_pulled_at, meetings_pulled_at,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(domain_id, hub_id) DO UPDATE SET
                access_token = excluded.access_token,
                access_token_nonce = excluded.access_token_nonce,
                refresh_token = excluded.refresh_token,
                refresh_token_nonce = excluded.refresh_token_nonce,
                expires_at = excluded.expires_at,
                companies_pulled_at = excluded.companies_pulled_at,
                contacts_pulled_at = excluded.contacts_pulled_at,
                meetings_pulled_at = excluded.meetings_pulled_at,
                updated_at = excluded.updated_at
            "#,
            params![
                account.domain_id,
                account.hub_id,
                access.ciphertext,
                access.nonce,
                refresh.as_ref().map(|t| t.ciphertext.clone()),
                refresh.as_ref().map(|t| t.nonce.clone()),
                expires_at,
                pulled_at(Resource::Companies),
                pulled_at(Resource::Contacts),
                pulled_at(Resource::Meetings),
                now,
                now,
            ],
        )
        .context("Failed to store account")?;

        Ok(())
    }

    fn account_from_row(&self, row: &Row<'_>) -> Result<Account> {
        let domain_id: String = row.get(0)?;
        let hub_id: String = row.get(1)?;

        let access_token = self
            .cipher
            .open(&SealedToken {
                ciphertext: row.get(2)?,
                nonce: row.get(3)?,
            })
            .context("Failed to decrypt access token")?;

        let refresh_ciphertext: Option<String> = row.get(4)?;
        let refresh_nonce: Option<String> = row.get(5)?;
        let refresh_token = match (refresh_ciphertext, refresh_nonce) {
            (Some(ciphertext), Some(nonce)) => Some(
                self.cipher
                    .open(&SealedToken { ciphertext, nonce })
                    .context("Failed to decrypt refresh token")?,
            ),
            _ => None,
        };

        let expires_at = parse_timestamp(row.get(6)?).context("Failed to parse expires_at")?;

        let mut last_pulled = BTreeMap::new();
        for (column, resource) in [
            (7usize, Resource::Companies),
            (8, Resource::Contacts),
            (9, Resource::Meetings),
        ] {
            let pulled_at = parse_timestamp(row.get(column)?)
                .with_context(|| format!("Failed to parse {} watermark", resource))?;
            if let Some(pulled_at) = pulled_at {
                last_pulled.insert(resource, pulled_at);
            }
        }

        Ok(Account {
            domain_id,
            hub_id,
            credentials: Credentials {
                access_token,
                refresh_token,
                expires_at,
            },
            last_pulled,
        })
    }
}

impl AccountStore for SqliteAccountStore {
    fn find_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT domain_id, hub_id,
                       access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at,
                       companies_pulled_at, contacts_pulled_at, meetings_pulled_at
                FROM accounts
                ORDER BY domain_id, hub_id
                "#,
            )
            .context("Failed to prepare query")?;

        let mut rows = stmt.query([]).context("Failed to execute query")?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            accounts.push(self.account_from_row(row)?);
        }

        Ok(accounts)
    }

    fn persist(&self, account: &Account) -> Result<()> {
        self.upsert(account)
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    Ok(value
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()?)
}
