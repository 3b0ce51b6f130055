// SQLite persistence for the override store: per-agent configuration
// (photo, celebration track, team reassignment) and durable test sales.
// File-backed so overrides and pending test sales survive restarts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

/// Per-agent override row. Empty fields mean "no override, use defaults".
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub photo: String,
    pub song: String,
    pub team_id: String,
}

/// A locally injected sale pending merge into the next poll tick.
///
/// Identity for dedup is the injection timestamp, not the value tuple:
/// repeated test amounts for the same agent are legitimate and must not
/// collide with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSaleRecord {
    pub agent_name: String,
    pub amount: f64,
    pub timestamp: i64,
}

/// SQLite-backed override store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure all tables exist.
    /// Pass `":memory:"` for an ephemeral in-memory database (useful for
    /// tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS agent_configs (
                name    TEXT PRIMARY KEY,
                photo   TEXT NOT NULL DEFAULT '',
                song    TEXT NOT NULL DEFAULT '',
                team_id TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS test_sales (
                timestamp  INTEGER PRIMARY KEY,
                agent_name TEXT NOT NULL,
                amount     REAL NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // -----------------------------------------------------------------------
    // Agent configuration
    // -----------------------------------------------------------------------

    /// Insert or replace the override row for an agent.
    pub fn upsert_agent_config(&self, config: &AgentConfig) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO agent_configs (name, photo, song, team_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![config.name, config.photo, config.song, config.team_id],
        )
        .context("failed to upsert agent config")?;
        Ok(())
    }

    /// Look up the override row for an agent by display name.
    pub fn agent_config(&self, name: &str) -> Result<Option<AgentConfig>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT name, photo, song, team_id FROM agent_configs WHERE name = ?1",
                params![name],
                |row| {
                    Ok(AgentConfig {
                        name: row.get(0)?,
                        photo: row.get(1)?,
                        song: row.get(2)?,
                        team_id: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("failed to query agent config")?;
        Ok(row)
    }

    /// Delete an agent's override row. Removing a missing row is a no-op.
    pub fn delete_agent_config(&self, name: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM agent_configs WHERE name = ?1", params![name])
            .context("failed to delete agent config")?;
        Ok(())
    }

    /// Agent-name -> team-id map of every row with a team reassignment,
    /// consumed by the reconciler on each poll tick.
    pub fn team_overrides(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name, team_id FROM agent_configs WHERE team_id != ''")
            .context("failed to prepare team_overrides query")?;

        let map = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("failed to query team overrides")?
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .context("failed to map team override rows")?;

        Ok(map)
    }

    /// Resolve an agent's celebration track. Returns `None` when unset; the
    /// sequencer falls back to the configured default track. Store failures
    /// degrade to the default rather than propagating into the celebration
    /// path.
    pub fn resolve_song(&self, name: &str) -> Option<String> {
        match self.agent_config(name) {
            Ok(Some(cfg)) if !cfg.song.trim().is_empty() => Some(cfg.song),
            Ok(_) => None,
            Err(e) => {
                warn!("failed to read celebration track for {name}: {e:#}");
                None
            }
        }
    }

    /// Resolve an agent's photo, falling back to the roster-provided avatar.
    pub fn resolve_photo(&self, name: &str, fallback_avatar: &str) -> String {
        match self.agent_config(name) {
            Ok(Some(cfg)) if !cfg.photo.trim().is_empty() => cfg.photo,
            Ok(_) => fallback_avatar.to_string(),
            Err(e) => {
                warn!("failed to read photo for {name}: {e:#}");
                fallback_avatar.to_string()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Test sales
    // -----------------------------------------------------------------------

    /// Append a test sale. Uses INSERT OR IGNORE so replaying the same
    /// injection timestamp is a no-op.
    pub fn add_test_sale(&self, sale: &TestSaleRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO test_sales (timestamp, agent_name, amount)
             VALUES (?1, ?2, ?3)",
            params![sale.timestamp, sale.agent_name, sale.amount],
        )
        .context("failed to record test sale")?;
        Ok(())
    }

    /// All pending test sales in injection order.
    pub fn list_test_sales(&self) -> Result<Vec<TestSaleRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, agent_name, amount FROM test_sales ORDER BY timestamp",
            )
            .context("failed to prepare list_test_sales query")?;

        let sales = stmt
            .query_map([], |row| {
                Ok(TestSaleRecord {
                    timestamp: row.get(0)?,
                    agent_name: row.get(1)?,
                    amount: row.get(2)?,
                })
            })
            .context("failed to query test sales")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map test sale rows")?;

        Ok(sales)
    }

    /// Remove a single consumed test sale by its injection timestamp.
    pub fn remove_test_sale(&self, timestamp: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM test_sales WHERE timestamp = ?1",
            params![timestamp],
        )
        .context("failed to remove test sale")?;
        Ok(())
    }

    /// Drop every pending test sale.
    pub fn clear_test_sales(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM test_sales", [])
            .context("failed to clear test sales")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open(":memory:").expect("in-memory store")
    }

    #[test]
    fn upsert_and_lookup_agent_config() {
        let store = store();
        let cfg = AgentConfig {
            name: "Ana".to_string(),
            photo: "https://example.com/ana.png".to_string(),
            song: "https://example.com/ana.mp3".to_string(),
            team_id: "mesa-2".to_string(),
        };
        store.upsert_agent_config(&cfg).unwrap();

        let loaded = store.agent_config("Ana").unwrap().unwrap();
        assert_eq!(loaded, cfg);
        assert!(store.agent_config("Luis").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_existing() {
        let store = store();
        let mut cfg = AgentConfig {
            name: "Ana".to_string(),
            photo: String::new(),
            song: String::new(),
            team_id: "mesa-1".to_string(),
        };
        store.upsert_agent_config(&cfg).unwrap();
        cfg.team_id = "mesa-3".to_string();
        store.upsert_agent_config(&cfg).unwrap();

        assert_eq!(store.agent_config("Ana").unwrap().unwrap().team_id, "mesa-3");
    }

    #[test]
    fn team_overrides_skips_rows_without_reassignment() {
        let store = store();
        store
            .upsert_agent_config(&AgentConfig {
                name: "Ana".to_string(),
                photo: String::new(),
                song: "x.mp3".to_string(),
                team_id: String::new(),
            })
            .unwrap();
        store
            .upsert_agent_config(&AgentConfig {
                name: "Luis".to_string(),
                photo: String::new(),
                song: String::new(),
                team_id: "mesa-2".to_string(),
            })
            .unwrap();

        let overrides = store.team_overrides().unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("Luis"), Some(&"mesa-2".to_string()));
    }

    #[test]
    fn resolve_song_falls_back_when_unset() {
        let store = store();
        assert_eq!(store.resolve_song("Ana"), None);

        store
            .upsert_agent_config(&AgentConfig {
                name: "Ana".to_string(),
                photo: String::new(),
                song: "  ".to_string(),
                team_id: String::new(),
            })
            .unwrap();
        assert_eq!(store.resolve_song("Ana"), None);

        store
            .upsert_agent_config(&AgentConfig {
                name: "Ana".to_string(),
                photo: String::new(),
                song: "https://example.com/ana.mp3".to_string(),
                team_id: String::new(),
            })
            .unwrap();
        assert_eq!(
            store.resolve_song("Ana").as_deref(),
            Some("https://example.com/ana.mp3")
        );
    }

    #[test]
    fn resolve_photo_falls_back_to_avatar() {
        let store = store();
        assert_eq!(store.resolve_photo("Ana", "avatar.png"), "avatar.png");
    }

    #[test]
    fn test_sales_roundtrip_in_injection_order() {
        let store = store();
        store
            .add_test_sale(&TestSaleRecord {
                agent_name: "Ana".to_string(),
                amount: 300.0,
                timestamp: 2,
            })
            .unwrap();
        store
            .add_test_sale(&TestSaleRecord {
                agent_name: "Luis".to_string(),
                amount: 500.0,
                timestamp: 1,
            })
            .unwrap();

        let sales = store.list_test_sales().unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].agent_name, "Luis");
        assert_eq!(sales[1].agent_name, "Ana");
    }

    #[test]
    fn duplicate_timestamp_is_ignored() {
        let store = store();
        let sale = TestSaleRecord {
            agent_name: "Ana".to_string(),
            amount: 300.0,
            timestamp: 7,
        };
        store.add_test_sale(&sale).unwrap();
        store.add_test_sale(&sale).unwrap();
        assert_eq!(store.list_test_sales().unwrap().len(), 1);
    }

    #[test]
    fn remove_and_clear_test_sales() {
        let store = store();
        for ts in 1..=3 {
            store
                .add_test_sale(&TestSaleRecord {
                    agent_name: "Ana".to_string(),
                    amount: 100.0,
                    timestamp: ts,
                })
                .unwrap();
        }
        store.remove_test_sale(2).unwrap();
        let left: Vec<_> = store
            .list_test_sales()
            .unwrap()
            .into_iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(left, vec![1, 3]);

        store.clear_test_sales().unwrap();
        assert!(store.list_test_sales().unwrap().is_empty());
    }
}
