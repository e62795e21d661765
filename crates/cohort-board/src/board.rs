//! Task board persistence shared across agents and teammates.
//!
//! Every item tracks its subject, lifecycle status, owner, and two ordered
//! ID sets: `blocked_by` (items that must complete before this one is
//! claimable) and `depends_on` (informational ordering). IDs are small
//! integers assigned by the database and rendered as strings.
//!
//! Completing an item cascades: its ID is removed from every other item's
//! `blocked_by` in the same transaction, so newly unblocked work becomes
//! claimable the moment the completion commits.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{BoardError, BoardResult};

/// File name of the board database inside the board directory.
const BOARD_FILE: &str = "tasks.db";

/// Current schema version tracked via `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle status of a board item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Created, unowned or waiting to be started.
    Pending,
    /// Claimed and actively being worked. Requires an owner.
    InProgress,
    /// Finished; completion unblocks dependent items.
    Completed,
    /// Abandoned without completion.
    Cancelled,
}

impl ItemStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = BoardError;

    fn from_str(s: &str) -> BoardResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(BoardError::InvalidArgument(format!(
                "unknown item status: {other}"
            ))),
        }
    }
}

/// A persisted board item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardItem {
    /// Board-assigned ID: a small integer rendered as a string.
    pub id: String,
    /// What needs doing.
    pub subject: String,
    /// Current lifecycle status.
    pub status: ItemStatus,
    /// Teammate name that claimed the item, if any.
    pub owner: Option<String>,
    /// IDs of items that must complete before this one is claimable.
    pub blocked_by: Vec<String>,
    /// IDs of items this one depends on (informational).
    pub depends_on: Vec<String>,
    /// Unix timestamp when the item was created.
    pub created_at: i64,
    /// Unix timestamp when the item was last updated.
    pub updated_at: i64,
}

impl BoardItem {
    /// Whether the item is pending, unowned, and unblocked.
    #[must_use]
    pub fn is_claimable(&self) -> bool {
        self.status == ItemStatus::Pending
            && self.owner.as_deref().unwrap_or("").is_empty()
            && self.blocked_by.is_empty()
    }
}

/// A change-set applied by [`TaskBoard::update`].
///
/// `None` fields are left untouched. Setting `owner` to an empty string
/// clears ownership. Additions preserve insertion order and skip IDs
/// already present.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    /// New status, if changing.
    pub status: Option<ItemStatus>,
    /// New owner; `Some("")` unassigns.
    pub owner: Option<String>,
    /// IDs to append to `blocked_by`.
    pub add_blocked_by: Vec<String>,
    /// IDs to remove from `blocked_by`.
    pub remove_blocked_by: Vec<String>,
    /// IDs to append to `depends_on`.
    pub add_depends_on: Vec<String>,
    /// IDs to remove from `depends_on`.
    pub remove_depends_on: Vec<String>,
}

impl ItemUpdate {
    /// A change-set that only sets the status.
    #[must_use]
    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A change-set that only assigns an owner.
    #[must_use]
    pub fn owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    /// A change-set that claims the item: assign owner + mark in progress.
    #[must_use]
    pub fn claim(owner: impl Into<String>) -> Self {
        Self {
            status: Some(ItemStatus::InProgress),
            owner: Some(owner.into()),
            ..Self::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  TaskBoard
// ═══════════════════════════════════════════════════════════════════════

/// Durable registry of work items backed by `tasks.db` in a shared
/// directory.
///
/// Every read goes back to the database, so boards opened on the same
/// directory — in this process or another — observe each other's writes on
/// the next call without any handoff.
#[derive(Clone)]
pub struct TaskBoard {
    db: Database,
}

impl TaskBoard {
    /// Open (or create) the board in `dir`, creating the directory and the
    /// schema as needed.
    pub async fn open(dir: impl AsRef<Path>) -> BoardResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let db = {
            let path = dir.join(BOARD_FILE);
            tokio::task::spawn_blocking(move || Database::open(path)).await??
        };
        let board = Self { db };
        board.ensure_schema().await?;
        Ok(board)
    }

    /// Open the board on an in-memory database — useful for tests that do
    /// not exercise cross-handle convergence.
    pub async fn open_in_memory() -> BoardResult<Self> {
        let board = Self {
            db: Database::open_in_memory()?,
        };
        board.ensure_schema().await?;
        Ok(board)
    }

    async fn ensure_schema(&self) -> BoardResult<()> {
        self.db
            .execute(|conn| {
                let version: i32 =
                    conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if version >= SCHEMA_VERSION {
                    return Ok(());
                }

                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS board_items (
                        id          INTEGER PRIMARY KEY AUTOINCREMENT,
                        subject     TEXT NOT NULL,
                        status      TEXT NOT NULL DEFAULT 'pending',
                        owner       TEXT,
                        blocked_by  TEXT NOT NULL DEFAULT '[]',
                        depends_on  TEXT NOT NULL DEFAULT '[]',
                        created_at  INTEGER NOT NULL,
                        updated_at  INTEGER NOT NULL
                    );
                    PRAGMA user_version = 1;",
                )?;
                Ok(())
            })
            .await
    }

    /// Create a new pending item and return the stored record.
    #[instrument(skip(self))]
    pub async fn create(&self, subject: &str) -> BoardResult<BoardItem> {
        let subject = subject.to_string();
        let now = Utc::now().timestamp();

        let item = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO board_items (subject, status, blocked_by, depends_on, created_at, updated_at) \
                     VALUES (?1, 'pending', '[]', '[]', ?2, ?2)",
                    rusqlite::params![subject, now],
                )?;
                let id = conn.last_insert_rowid();
                Ok(BoardItem {
                    id: id.to_string(),
                    subject,
                    status: ItemStatus::Pending,
                    owner: None,
                    blocked_by: Vec::new(),
                    depends_on: Vec::new(),
                    created_at: now,
                    updated_at: now,
                })
            })
            .await?;

        debug!(item_id = %item.id, subject = %item.subject, "board item created");
        Ok(item)
    }

    /// Fetch a single item by ID, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> BoardResult<Option<BoardItem>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, subject, status, owner, blocked_by, depends_on, created_at, updated_at \
                     FROM board_items WHERE id = ?1",
                    rusqlite::params![id],
                    ItemRow::from_row,
                );
                match result {
                    Ok(row) => row.into_item().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(BoardError::Sqlite(e)),
                }
            })
            .await
    }

    /// List every item on the board, ordered by ID.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> BoardResult<Vec<BoardItem>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, subject, status, owner, blocked_by, depends_on, created_at, updated_at \
                     FROM board_items ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map([], ItemRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(ItemRow::into_item).collect()
            })
            .await
    }

    /// List claimable items — pending, unowned, unblocked — ordered by ID.
    ///
    /// This is the query the teammate idle loop runs to pick up work; the
    /// lowest ID comes first.
    #[instrument(skip(self))]
    pub async fn list_unclaimed(&self) -> BoardResult<Vec<BoardItem>> {
        let candidates = self
            .db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, subject, status, owner, blocked_by, depends_on, created_at, updated_at \
                     FROM board_items \
                     WHERE status = 'pending' AND (owner IS NULL OR owner = '') \
                     ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map([], ItemRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(ItemRow::into_item).collect::<BoardResult<Vec<_>>>()
            })
            .await?;

        // The blocker set lives in a JSON column; emptiness is checked here
        // rather than with string comparison in SQL.
        Ok(candidates.into_iter().filter(|i| i.blocked_by.is_empty()).collect())
    }

    /// Apply a change-set to an item and return the updated record.
    ///
    /// Rules:
    /// - `in_progress` requires a non-empty owner after the change-set is
    ///   applied (so claiming owner + status in one call is valid);
    /// - transitioning to `completed` removes this item's ID from every
    ///   other item's `blocked_by`, in the same transaction.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: &str, changes: ItemUpdate) -> BoardResult<BoardItem> {
        let id = id.to_string();
        let now = Utc::now().timestamp();

        let item = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let row = tx
                    .query_row(
                        "SELECT id, subject, status, owner, blocked_by, depends_on, created_at, updated_at \
                         FROM board_items WHERE id = ?1",
                        rusqlite::params![id],
                        ItemRow::from_row,
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => BoardError::NotFound { id: id.clone() },
                        other => BoardError::Sqlite(other),
                    })?;
                let mut item = row.into_item()?;

                if let Some(owner) = changes.owner {
                    item.owner = if owner.is_empty() { None } else { Some(owner) };
                }
                apply_set_changes(&mut item.blocked_by, &changes.add_blocked_by, &changes.remove_blocked_by);
                apply_set_changes(&mut item.depends_on, &changes.add_depends_on, &changes.remove_depends_on);

                let was_completed = item.status == ItemStatus::Completed;
                if let Some(status) = changes.status {
                    if status == ItemStatus::InProgress
                        && item.owner.as_deref().unwrap_or("").is_empty()
                    {
                        return Err(BoardError::InvalidArgument(format!(
                            "item {id} cannot be in_progress without an owner"
                        )));
                    }
                    item.status = status;
                }
                item.updated_at = now;

                tx.execute(
                    "UPDATE board_items SET subject = ?2, status = ?3, owner = ?4, \
                     blocked_by = ?5, depends_on = ?6, updated_at = ?7 WHERE id = ?1",
                    rusqlite::params![
                        item.id,
                        item.subject,
                        item.status.as_str(),
                        item.owner,
                        serde_json::to_string(&item.blocked_by)?,
                        serde_json::to_string(&item.depends_on)?,
                        item.updated_at,
                    ],
                )?;

                // Cascading unblock: every other item drops this ID from
                // its blocker set the moment completion commits.
                if item.status == ItemStatus::Completed && !was_completed {
                    cascade_unblock(&tx, &item.id, now)?;
                }

                tx.commit()?;
                Ok(item)
            })
            .await?;

        debug!(item_id = %item.id, status = %item.status, "board item updated");
        Ok(item)
    }

    /// Claim an item if — and only if — it is still pending, unowned, and
    /// unblocked. Returns `None` when another claimant got there first (or
    /// the item no longer qualifies), so concurrent idle loops cannot both
    /// win the same item.
    #[instrument(skip(self))]
    pub async fn try_claim(&self, id: &str, owner: &str) -> BoardResult<Option<BoardItem>> {
        let id = id.to_string();
        let owner = owner.to_string();
        let now = Utc::now().timestamp();

        let claimed = self
            .db
            .execute({
                let id = id.clone();
                move |conn| {
                    let updated = conn.execute(
                        "UPDATE board_items SET status = 'in_progress', owner = ?2, updated_at = ?3 \
                         WHERE id = ?1 AND status = 'pending' \
                         AND (owner IS NULL OR owner = '') AND blocked_by = '[]'",
                        rusqlite::params![id, owner, now],
                    )?;
                    Ok(updated > 0)
                }
            })
            .await?;

        if !claimed {
            debug!(item_id = %id, "claim lost or item not claimable");
            return Ok(None);
        }
        self.get(&id).await
    }
}

/// Append `add` entries not already present, then drop `remove` entries.
/// Insertion order is preserved.
fn apply_set_changes(set: &mut Vec<String>, add: &[String], remove: &[String]) {
    for entry in add {
        if !set.contains(entry) {
            set.push(entry.clone());
        }
    }
    set.retain(|entry| !remove.contains(entry));
}

/// Remove `completed_id` from every other row's `blocked_by` column.
fn cascade_unblock(
    tx: &rusqlite::Transaction<'_>,
    completed_id: &str,
    now: i64,
) -> BoardResult<()> {
    let mut stmt = tx.prepare("SELECT id, blocked_by FROM board_items WHERE id != ?1")?;
    let rows = stmt
        .query_map(rusqlite::params![completed_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (other_id, blocked_json) in rows {
        let mut blocked: Vec<String> = serde_json::from_str(&blocked_json)?;
        let before = blocked.len();
        blocked.retain(|entry| entry != completed_id);
        if blocked.len() != before {
            tx.execute(
                "UPDATE board_items SET blocked_by = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![other_id, serde_json::to_string(&blocked)?, now],
            )?;
            debug!(item_id = other_id, unblocked_by = %completed_id, "blocker removed");
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw row data before JSON deserialization. Keeps the `rusqlite`
/// row-mapping closure infallible on the JSON side; conversion to
/// [`BoardItem`] happens in a second step that can return `BoardError`.
struct ItemRow {
    id: i64,
    subject: String,
    status: String,
    owner: Option<String>,
    blocked_by: String,
    depends_on: String,
    created_at: i64,
    updated_at: i64,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            status: row.get(2)?,
            owner: row.get(3)?,
            blocked_by: row.get(4)?,
            depends_on: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_item(self) -> BoardResult<BoardItem> {
        Ok(BoardItem {
            id: self.id.to_string(),
            subject: self.subject,
            status: self.status.parse()?,
            owner: self.owner.filter(|o| !o.is_empty()),
            blocked_by: serde_json::from_str(&self.blocked_by)?,
            depends_on: serde_json::from_str(&self.depends_on)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
