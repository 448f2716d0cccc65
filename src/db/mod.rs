// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Database module for receipts and user accounts

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::StorageConfig;
use crate::i18n::Locale;
use crate::model::{Category, Receipt, SpendingStats, UserAccount, UserPreference};
use crate::{RaseedError, Result};

/// Persistence operations the pipeline depends on
pub trait ReceiptStore: Send + Sync {
    /// Insert or fully overwrite the receipt with the same id
    fn upsert(&self, receipt: &Receipt) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Receipt>>;

    /// Receipts dated within `from..=to`, oldest first
    fn range(&self, owner_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Receipt>>;

    /// Returns whether a row was removed
    fn delete(&self, id: &str) -> Result<bool>;

    fn uncategorized(&self, owner_id: &str) -> Result<Vec<Receipt>>;
}

/// Database manager for Raseed (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const RECEIPT_COLUMNS: &str = "id, owner_id, merchant, date, currency, total, tax, items, category, \
                               insight, raw_text, image_hash, created_at, updated_at";

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P, storage: &StorageConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RaseedError::StorageUnavailable("Database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                merchant TEXT NOT NULL,
                date TEXT,
                currency TEXT NOT NULL,
                total TEXT NOT NULL,
                tax TEXT NOT NULL,
                items TEXT NOT NULL DEFAULT '[]',
                category TEXT NOT NULL,
                insight TEXT,
                raw_text TEXT NOT NULL,
                image_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                picture TEXT,
                locale TEXT NOT NULL DEFAULT 'en',
                last_login TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_owner_date ON receipts(owner_id, date);
            CREATE INDEX IF NOT EXISTS idx_receipts_owner_created ON receipts(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_receipts_category ON receipts(owner_id, category);
        "#)?;
        Ok(())
    }

    fn query_receipts<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Receipt>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {} FROM receipts {}", RECEIPT_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let receipts = stmt
            .query_map(params, receipt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(receipts)
    }

    /// Most recently added receipts first
    pub fn recent(&self, owner_id: &str, limit: usize) -> Result<Vec<Receipt>> {
        self.query_receipts(
            "WHERE owner_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            params![owner_id, limit as i64],
        )
    }

    /// Every receipt of an owner, oldest first
    pub fn all_for_owner(&self, owner_id: &str) -> Result<Vec<Receipt>> {
        self.query_receipts(
            "WHERE owner_id = ?1 ORDER BY date IS NULL, date, created_at",
            params![owner_id],
        )
    }

    /// Get spending statistics for an owner
    pub fn stats(&self, owner_id: &str) -> Result<SpendingStats> {
        let rows: Vec<(String, String)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare("SELECT total, category FROM receipts WHERE owner_id = ?1")?;
            let rows = stmt
                .query_map(params![owner_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut total_spent = Decimal::ZERO;
        let mut counts: HashMap<Category, i64> = HashMap::new();
        for (total, category) in &rows {
            total_spent += Decimal::from_str(total)
                .map_err(|e| RaseedError::InvalidInput(format!("stored total '{}': {}", total, e)))?;
            *counts.entry(category.parse()?).or_default() += 1;
        }

        let mut by_category: Vec<(Category, i64)> = counts.into_iter().collect();
        by_category.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

        let total_receipts = rows.len() as i64;
        let average_spend = if total_receipts == 0 {
            Decimal::ZERO
        } else {
            (total_spent / Decimal::from(total_receipts)).round_dp(2)
        };

        Ok(SpendingStats {
            total_receipts,
            total_spent,
            top_category: by_category.iter().map(|(c, _)| *c).find(Category::is_assigned),
            average_spend,
            by_category,
        })
    }

    pub fn receipt_count(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Record a sign-in. The stored locale is kept; the returned account carries it.
    pub fn upsert_user(&self, account: &UserAccount) -> Result<UserAccount> {
        {
            let conn = self.lock_conn()?;
            conn.execute(
                r#"INSERT INTO users (id, email, name, picture, locale, last_login)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(id) DO UPDATE SET
                       email = excluded.email,
                       name = excluded.name,
                       picture = excluded.picture,
                       last_login = excluded.last_login"#,
                params![
                    account.id,
                    account.email,
                    account.name,
                    account.picture,
                    account.locale.code(),
                    timestamp(&account.last_login),
                ],
            )?;
        }
        self.get_user(&account.id)?
            .ok_or_else(|| RaseedError::NotFound(format!("user {}", account.id)))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserAccount>> {
        let conn = self.lock_conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, picture, locale, last_login FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserAccount {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                        picture: row.get(3)?,
                        locale: parsed_column(row, 4)?,
                        last_login: parsed_column(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Persist the language choice of an existing user
    pub fn set_locale(&self, user_id: &str, locale: Locale) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE users SET locale = ?2 WHERE id = ?1",
            params![user_id, locale.code()],
        )?;
        if changed == 0 {
            return Err(RaseedError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    /// Preferences of a user, defaults when unknown
    pub fn preference(&self, user_id: &str) -> Result<UserPreference> {
        Ok(self
            .get_user(user_id)?
            .map(|u| UserPreference { locale: u.locale })
            .unwrap_or_default())
    }
}

impl ReceiptStore for Database {
    fn upsert(&self, receipt: &Receipt) -> Result<()> {
        let conn = self.lock_conn()?;
        let items = serde_json::to_string(&receipt.items)?;

        conn.execute(
            r#"INSERT INTO receipts (id, owner_id, merchant, date, currency, total, tax, items, category,
                                     insight, raw_text, image_hash, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
               ON CONFLICT(id) DO UPDATE SET
                   owner_id = excluded.owner_id,
                   merchant = excluded.merchant,
                   date = excluded.date,
                   currency = excluded.currency,
                   total = excluded.total,
                   tax = excluded.tax,
                   items = excluded.items,
                   category = excluded.category,
                   insight = excluded.insight,
                   raw_text = excluded.raw_text,
                   image_hash = excluded.image_hash,
                   created_at = excluded.created_at,
                   updated_at = excluded.updated_at"#,
            params![
                receipt.id,
                receipt.owner_id,
                receipt.merchant,
                receipt.date.map(|d| d.to_string()),
                receipt.currency,
                receipt.total.to_string(),
                receipt.tax.to_string(),
                items,
                receipt.category.as_str(),
                receipt.insight,
                receipt.raw_text,
                receipt.image_hash,
                timestamp(&receipt.created_at),
                timestamp(&receipt.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Receipt>> {
        Ok(self.query_receipts("WHERE id = ?1", params![id])?.into_iter().next())
    }

    fn range(&self, owner_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Receipt>> {
        self.query_receipts(
            "WHERE owner_id = ?1 AND date IS NOT NULL AND date BETWEEN ?2 AND ?3 ORDER BY date, created_at",
            params![owner_id, from.to_string(), to.to_string()],
        )
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute("DELETE FROM receipts WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn uncategorized(&self, owner_id: &str) -> Result<Vec<Receipt>> {
        self.query_receipts(
            "WHERE owner_id = ?1 AND category = ?2 ORDER BY created_at",
            params![owner_id, Category::Uncategorized.as_str()],
        )
    }
}

// Fixed-width so text order matches time order
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn receipt_from_row(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    let date: Option<String> = row.get(3)?;
    let date = date
        .map(|d| NaiveDate::from_str(&d))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let items: String = row.get(7)?;
    let items = serde_json::from_str(&items)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(Receipt {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        merchant: row.get(2)?,
        date,
        currency: row.get(4)?,
        total: parsed_column(row, 5)?,
        tax: parsed_column(row, 6)?,
        items,
        category: parsed_column(row, 8)?,
        insight: row.get(9)?,
        raw_text: row.get(10)?,
        image_hash: row.get(11)?,
        created_at: parsed_column(row, 12)?,
        updated_at: parsed_column(row, 13)?,
    })
}

/// Deterministic receipt id: the same owner uploading the same image maps to one record
pub fn receipt_id(owner_id: &str, image: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(image);
    hasher.finalize().to_hex().as_str()[..32].to_string()
}

/// Content hash of an uploaded image
pub fn image_hash(image: &[u8]) -> String {
    blake3::hash(image).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn receipt(id: &str, owner: &str, date: Option<(i32, u32, u32)>, total: &str) -> Receipt {
        let now = Utc::now();
        Receipt {
            id: id.to_string(),
            owner_id: owner.to_string(),
            merchant: "Fresh Mart".to_string(),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            currency: "USD".to_string(),
            total: dec(total),
            tax: Decimal::ZERO,
            items: vec![],
            category: Category::Uncategorized,
            insight: None,
            raw_text: "Fresh Mart\nTotal".to_string(),
            image_hash: image_hash(id.as_bytes()),
            created_at: now,
            updated_at: now,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_trip_is_field_for_field() {
        let db = Database::in_memory().unwrap();
        let mut r = receipt("r1", "u1", Some((2024, 3, 9)), "8.64");
        r.items = vec![LineItem::new("Milk", dec("3.00"), 1), LineItem::new("Bread", dec("2.50"), 2)];
        r.tax = dec("0.64");
        r.category = Category::Groceries;
        r.insight = Some("Weekly staples.".to_string());

        db.upsert(&r).unwrap();
        assert_eq!(db.get("r1").unwrap(), Some(r));
    }

    #[test]
    fn test_same_id_twice_is_one_record() {
        let db = Database::in_memory().unwrap();
        let r = receipt("r1", "u1", Some((2024, 3, 9)), "8.64");
        db.upsert(&r).unwrap();
        db.upsert(&r).unwrap();
        assert_eq!(db.receipt_count().unwrap(), 1);
    }

    #[test]
    fn test_second_write_overwrites_first() {
        let db = Database::in_memory().unwrap();
        let mut first = receipt("r1", "u1", Some((2024, 3, 9)), "8.64");
        first.insight = Some("old".to_string());
        db.upsert(&first).unwrap();

        let mut second = receipt("r1", "u1", None, "9.99");
        second.merchant = "Corner Cafe".to_string();
        second.category = Category::Dining;
        db.upsert(&second).unwrap();

        let stored = db.get("r1").unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.insight, None);
        assert_eq!(db.receipt_count().unwrap(), 1);
    }

    #[test]
    fn test_range_is_inclusive_ordered_and_skips_undated() {
        let db = Database::in_memory().unwrap();
        db.upsert(&receipt("c", "u1", Some((2024, 3, 31)), "3.00")).unwrap();
        db.upsert(&receipt("a", "u1", Some((2024, 3, 1)), "1.00")).unwrap();
        db.upsert(&receipt("b", "u1", Some((2024, 3, 15)), "2.00")).unwrap();
        db.upsert(&receipt("out", "u1", Some((2024, 4, 1)), "4.00")).unwrap();
        db.upsert(&receipt("undated", "u1", None, "5.00")).unwrap();
        db.upsert(&receipt("other", "u2", Some((2024, 3, 15)), "6.00")).unwrap();

        let ids: Vec<String> = db
            .range("u1", day(2024, 3, 1), day(2024, 3, 31))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_and_missing() {
        let db = Database::in_memory().unwrap();
        db.upsert(&receipt("r1", "u1", None, "1.00")).unwrap();
        assert!(db.delete("r1").unwrap());
        assert!(!db.delete("r1").unwrap());
        assert_eq!(db.get("r1").unwrap(), None);
    }

    #[test]
    fn test_stats_and_uncategorized() {
        let db = Database::in_memory().unwrap();
        let mut a = receipt("a", "u1", None, "10.00");
        a.category = Category::Dining;
        let mut b = receipt("b", "u1", None, "20.00");
        b.category = Category::Dining;
        let c = receipt("c", "u1", None, "5.00");
        let d = receipt("d", "u1", None, "5.00");
        for r in [&a, &b, &c, &d] {
            db.upsert(r).unwrap();
        }

        let stats = db.stats("u1").unwrap();
        assert_eq!(stats.total_receipts, 4);
        assert_eq!(stats.total_spent, dec("40.00"));
        assert_eq!(stats.average_spend, dec("10.00"));
        // uncategorized ties dining on count but is never the top category
        assert_eq!(stats.top_category, Some(Category::Dining));

        let pending: Vec<String> = db.uncategorized("u1").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&"c".to_string()));

        let empty = db.stats("nobody").unwrap();
        assert_eq!(empty.total_receipts, 0);
        assert_eq!(empty.top_category, None);
    }

    #[test]
    fn test_user_login_keeps_chosen_locale() {
        let db = Database::in_memory().unwrap();
        let account = UserAccount {
            id: "g-123".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            picture: None,
            locale: Locale::English,
            last_login: Utc::now(),
        };
        db.upsert_user(&account).unwrap();
        db.set_locale("g-123", Locale::Kannada).unwrap();

        let again = db.upsert_user(&UserAccount { name: "A B".to_string(), ..account }).unwrap();
        assert_eq!(again.locale, Locale::Kannada);
        assert_eq!(again.name, "A B");
        assert_eq!(db.preference("g-123").unwrap().locale, Locale::Kannada);
        assert_eq!(db.preference("unknown").unwrap(), UserPreference::default());
        assert!(matches!(db.set_locale("unknown", Locale::Telugu), Err(RaseedError::NotFound(_))));
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raseed.db");
        let r = receipt("r1", "u1", Some((2024, 1, 2)), "7.50");
        {
            let db = Database::open(&path, &StorageConfig::default()).unwrap();
            db.upsert(&r).unwrap();
        }
        let db = Database::open(&path, &StorageConfig::default()).unwrap();
        assert_eq!(db.get("r1").unwrap(), Some(r));
    }

    #[test]
    fn test_receipt_id_depends_on_owner_and_image() {
        assert_eq!(receipt_id("u1", b"img"), receipt_id("u1", b"img"));
        assert_ne!(receipt_id("u1", b"img"), receipt_id("u2", b"img"));
        assert_ne!(receipt_id("u1", b"img"), receipt_id("u1", b"img2"));
    }
}
