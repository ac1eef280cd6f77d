//! SQLite persistence layer. Every state change in the game flows through
//! `GameStore`; the service never touches the connection directly.
//!
//! Timestamps are stored as RFC 3339 text. Multi-row writes within one
//! store call run inside a transaction; the service itself is single-writer
//! so calls never interleave.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{GameError, Result};
use crate::models::{
    ConfidenceLevel, Event, ExpeditionOutcome, ExpeditionRecord, ExpeditionType, OfferRecord,
    OfferStatus, OfferType, Player, PrepDepth, PressRecord, PressRelease, Scholar, TheoryRecord,
};

const SCHEMA: &str = "
BEGIN;
CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    reputation INTEGER NOT NULL,
    influence TEXT NOT NULL,
    cooldowns TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scholars (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS theories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    player_id TEXT NOT NULL,
    theory TEXT NOT NULL,
    confidence TEXT NOT NULL,
    supporters TEXT NOT NULL,
    deadline TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS expeditions (
    code TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    player_id TEXT NOT NULL,
    expedition_type TEXT NOT NULL,
    objective TEXT NOT NULL,
    team TEXT NOT NULL,
    funding TEXT NOT NULL,
    prep_depth TEXT NOT NULL,
    confidence TEXT NOT NULL,
    outcome TEXT,
    reputation_delta INTEGER NOT NULL DEFAULT 0,
    result_payload TEXT
);
CREATE TABLE IF NOT EXISTS press_releases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    type TEXT NOT NULL,
    headline TEXT NOT NULL,
    body TEXT NOT NULL,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS relationships (
    scholar_id TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    feeling REAL NOT NULL,
    PRIMARY KEY (scholar_id, subject_id)
);
CREATE TABLE IF NOT EXISTS offers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scholar_id TEXT NOT NULL,
    faction TEXT NOT NULL,
    rival_id TEXT NOT NULL,
    patron_id TEXT NOT NULL,
    offer_type TEXT NOT NULL,
    influence_offered TEXT NOT NULL,
    terms TEXT NOT NULL,
    status TEXT NOT NULL,
    parent_offer_id INTEGER,
    created_at TEXT NOT NULL,
    resolved_at TEXT
);
CREATE TABLE IF NOT EXISTS timeline (
    singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
    current_year INTEGER NOT NULL,
    last_advanced TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS mentorships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    scholar_id TEXT NOT NULL,
    start_date TEXT NOT NULL,
    status TEXT NOT NULL,
    career_track TEXT,
    created_at TEXT NOT NULL,
    resolved_at TEXT
);
CREATE TABLE IF NOT EXISTS conferences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT UNIQUE NOT NULL,
    timestamp TEXT NOT NULL,
    player_id TEXT NOT NULL,
    theory_id INTEGER NOT NULL,
    confidence TEXT NOT NULL,
    supporters TEXT NOT NULL,
    opposition TEXT NOT NULL,
    outcome TEXT,
    reputation_delta INTEGER NOT NULL DEFAULT 0,
    result_payload TEXT,
    FOREIGN KEY (theory_id) REFERENCES theories (id)
);
CREATE TABLE IF NOT EXISTS symposium_topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symposium_date TEXT NOT NULL,
    topic TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'voting',
    winner TEXT,
    proposal_id INTEGER,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS symposium_votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    vote_option INTEGER NOT NULL,
    voted_at TEXT NOT NULL,
    FOREIGN KEY (topic_id) REFERENCES symposium_topics (id),
    UNIQUE (topic_id, player_id)
);
CREATE TABLE IF NOT EXISTS symposium_proposals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    topic TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expire_at TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    selected_topic_id INTEGER
);
CREATE TABLE IF NOT EXISTS symposium_pledges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    pledge_amount INTEGER NOT NULL,
    faction TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    UNIQUE (topic_id, player_id)
);
CREATE TABLE IF NOT EXISTS symposium_participation (
    player_id TEXT PRIMARY KEY,
    miss_streak INTEGER NOT NULL DEFAULT 0,
    grace_window_start TEXT,
    grace_miss_consumed INTEGER NOT NULL DEFAULT 0,
    last_voted_at TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS influence_debts (
    player_id TEXT NOT NULL,
    faction TEXT NOT NULL,
    source TEXT NOT NULL,
    amount INTEGER NOT NULL,
    reprisal_level INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_reprisal_at TEXT,
    PRIMARY KEY (player_id, faction, source)
);
CREATE TABLE IF NOT EXISTS seasonal_commitments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    faction TEXT NOT NULL,
    tier TEXT,
    base_cost INTEGER NOT NULL,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    last_processed_at TEXT,
    status TEXT NOT NULL DEFAULT 'active'
);
CREATE TABLE IF NOT EXISTS faction_projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    faction TEXT NOT NULL,
    progress REAL NOT NULL DEFAULT 0,
    target_progress REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS faction_investments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    faction TEXT NOT NULL,
    amount INTEGER NOT NULL,
    program TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS archive_endowments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    faction TEXT NOT NULL,
    amount INTEGER NOT NULL,
    program TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_type TEXT NOT NULL,
    actor_id TEXT,
    subject_id TEXT,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    scheduled_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    source_table TEXT,
    source_id TEXT,
    result TEXT
);
CREATE INDEX IF NOT EXISTS idx_orders_status_scheduled
    ON orders (status, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_orders_type_status
    ON orders (order_type, status);
CREATE TABLE IF NOT EXISTS queued_press (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
COMMIT;
";

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GameError::invalid(format!("bad timestamp '{raw}': {e}")))
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_ts(&r)).transpose()
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: i64,
    pub order_type: String,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub payload: Value,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QueuedPressRow {
    pub id: i64,
    pub release_at: DateTime<Utc>,
    pub release: PressRelease,
}

#[derive(Debug, Clone)]
pub struct TopicRow {
    pub id: i64,
    pub symposium_date: DateTime<Utc>,
    pub topic: String,
    pub description: String,
    pub status: String,
    pub winner: Option<String>,
    pub proposal_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProposalRow {
    pub id: i64,
    pub player_id: String,
    pub topic: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub priority: i64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct PledgeRow {
    pub topic_id: i64,
    pub player_id: String,
    pub pledge_amount: i64,
    pub faction: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ParticipationRow {
    pub miss_streak: i64,
    pub grace_window_start: Option<DateTime<Utc>>,
    pub grace_miss_consumed: i64,
    pub last_voted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DebtRow {
    pub player_id: String,
    pub faction: String,
    pub source: String,
    pub amount: i64,
    pub reprisal_level: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_reprisal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CommitmentRow {
    pub id: i64,
    pub player_id: String,
    pub faction: String,
    pub tier: Option<String>,
    pub base_cost: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub faction: String,
    pub progress: f64,
    pub target_progress: f64,
    pub status: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct InvestmentRow {
    pub id: i64,
    pub player_id: String,
    pub faction: String,
    pub amount: i64,
    pub program: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MentorshipRow {
    pub id: i64,
    pub player_id: String,
    pub scholar_id: String,
    pub status: String,
    pub career_track: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConferenceRow {
    pub code: String,
    pub player_id: String,
    pub theory_id: i64,
    pub confidence: ConfidenceLevel,
    pub supporters: Vec<String>,
    pub opposition: Vec<String>,
    pub outcome: Option<String>,
}

// =============================================================================
// Store
// =============================================================================

pub struct GameStore {
    conn: Connection,
    player_cache: HashMap<String, Player>,
    scholar_cache: HashMap<String, Scholar>,
}

impl GameStore {
    pub fn open(path: &Path, start_year: i64) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, start_year)
    }

    pub fn open_in_memory(start_year: i64) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, start_year)
    }

    fn with_connection(conn: Connection, start_year: i64) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn,
            player_cache: HashMap::new(),
            scholar_cache: HashMap::new(),
        };
        store.conn.execute(
            "INSERT OR IGNORE INTO timeline (singleton, current_year, last_advanced)
             VALUES (1, ?1, ?2)",
            params![start_year, ts(Utc::now())],
        )?;
        Ok(store)
    }

    // -- players ---------------------------------------------------------

    pub fn upsert_player(&mut self, player: &Player) -> Result<()> {
        self.conn.execute(
            "INSERT INTO players (id, display_name, reputation, influence, cooldowns)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                reputation = excluded.reputation,
                influence = excluded.influence,
                cooldowns = excluded.cooldowns",
            params![
                player.id,
                player.display_name,
                player.reputation,
                serde_json::to_string(&player.influence)?,
                serde_json::to_string(&player.cooldowns)?,
            ],
        )?;
        self.player_cache.insert(player.id.clone(), player.clone());
        Ok(())
    }

    pub fn get_player(&mut self, player_id: &str) -> Result<Option<Player>> {
        if let Some(player) = self.player_cache.get(player_id) {
            return Ok(Some(player.clone()));
        }
        let row = self
            .conn
            .query_row(
                "SELECT id, display_name, reputation, influence, cooldowns
                 FROM players WHERE id = ?1",
                params![player_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, display_name, reputation, influence, cooldowns)) = row else {
            return Ok(None);
        };
        let player = Player {
            id: id.clone(),
            display_name,
            reputation,
            influence: serde_json::from_str(&influence)?,
            cooldowns: serde_json::from_str(&cooldowns)?,
        };
        self.player_cache.insert(id, player.clone());
        Ok(Some(player))
    }

    pub fn all_players(&mut self) -> Result<Vec<Player>> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT id FROM players ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        let mut players = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(player) = self.get_player(&id)? {
                players.push(player);
            }
        }
        Ok(players)
    }

    // -- scholars --------------------------------------------------------

    pub fn save_scholar(&mut self, scholar: &Scholar) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scholars (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![scholar.id, serde_json::to_string(scholar)?],
        )?;
        self.scholar_cache
            .insert(scholar.id.clone(), scholar.clone());
        Ok(())
    }

    pub fn remove_scholar(&mut self, scholar_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM scholars WHERE id = ?1", params![scholar_id])?;
        self.scholar_cache.remove(scholar_id);
        Ok(())
    }

    pub fn get_scholar(&mut self, scholar_id: &str) -> Result<Option<Scholar>> {
        if let Some(scholar) = self.scholar_cache.get(scholar_id) {
            return Ok(Some(scholar.clone()));
        }
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM scholars WHERE id = ?1",
                params![scholar_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(data) = data else {
            return Ok(None);
        };
        let scholar: Scholar = serde_json::from_str(&data)?;
        self.scholar_cache
            .insert(scholar_id.to_string(), scholar.clone());
        Ok(Some(scholar))
    }

    pub fn all_scholars(&mut self) -> Result<Vec<Scholar>> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT id FROM scholars ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        let mut scholars = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(scholar) = self.get_scholar(&id)? {
                scholars.push(scholar);
            }
        }
        Ok(scholars)
    }

    pub fn scholar_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM scholars", [], |row| row.get(0))?)
    }

    // -- relationships ---------------------------------------------------

    pub fn update_relationship(
        &mut self,
        scholar_id: &str,
        subject_id: &str,
        feeling: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO relationships (scholar_id, subject_id, feeling)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(scholar_id, subject_id) DO UPDATE SET feeling = excluded.feeling",
            params![scholar_id, subject_id, feeling],
        )?;
        Ok(())
    }

    pub fn get_relationship(&self, scholar_id: &str, subject_id: &str) -> Result<Option<f64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT feeling FROM relationships WHERE scholar_id = ?1 AND subject_id = ?2",
                params![scholar_id, subject_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    // -- events ----------------------------------------------------------

    pub fn append_event(&mut self, event: &Event) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO events (timestamp, action, payload) VALUES (?1, ?2, ?3)",
            params![
                ts(event.timestamp),
                event.action,
                serde_json::to_string(&event.payload)?
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn event_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
    }

    pub fn export_events(&self, limit: Option<i64>) -> Result<Vec<(i64, Event)>> {
        let sql = match limit {
            Some(_) => {
                "SELECT id, timestamp, action, payload FROM events
                 ORDER BY id DESC LIMIT ?1"
            }
            None => "SELECT id, timestamp, action, payload FROM events ORDER BY id",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        };
        let raw: Vec<(i64, String, String, String)> = match limit {
            Some(n) => stmt
                .query_map(params![n], map_row)?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<std::result::Result<_, _>>()?,
        };
        let mut events = Vec::with_capacity(raw.len());
        for (id, timestamp, action, payload) in raw {
            events.push((
                id,
                Event {
                    timestamp: parse_ts(&timestamp)?,
                    action,
                    payload: serde_json::from_str(&payload)?,
                },
            ));
        }
        if limit.is_some() {
            events.reverse();
        }
        Ok(events)
    }

    // -- theories --------------------------------------------------------

    pub fn record_theory(&mut self, record: &TheoryRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO theories (timestamp, player_id, theory, confidence, supporters, deadline)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ts(record.timestamp),
                record.player_id,
                record.theory,
                record.confidence.as_str(),
                serde_json::to_string(&record.supporters)?,
                record.deadline,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_theory(&self, theory_id: i64) -> Result<Option<TheoryRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, player_id, theory, confidence, supporters, deadline
                 FROM theories WHERE id = ?1",
                params![theory_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((timestamp, player_id, theory, confidence, supporters, deadline)) = row else {
            return Ok(None);
        };
        Ok(Some(TheoryRecord {
            timestamp: parse_ts(&timestamp)?,
            player_id,
            theory,
            confidence: ConfidenceLevel::parse(&confidence)?,
            supporters: serde_json::from_str(&supporters)?,
            deadline,
        }))
    }

    pub fn last_theory_id_by_player(&self, player_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM theories WHERE player_id = ?1 ORDER BY id DESC LIMIT 1",
                params![player_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn list_theories(&self, limit: Option<i64>) -> Result<Vec<(i64, TheoryRecord)>> {
        let ids: Vec<i64> = {
            let sql = match limit {
                Some(_) => "SELECT id FROM theories ORDER BY id DESC LIMIT ?1",
                None => "SELECT id FROM theories ORDER BY id",
            };
            let mut stmt = self.conn.prepare(sql)?;
            match limit {
                Some(n) => stmt
                    .query_map(params![n], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?,
                None => stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?,
            }
        };
        let mut theories = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_theory(id)? {
                theories.push((id, record));
            }
        }
        Ok(theories)
    }

    // -- expeditions -----------------------------------------------------

    pub fn record_expedition(
        &mut self,
        record: &ExpeditionRecord,
        result_payload: Option<&Value>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO expeditions
                (code, timestamp, player_id, expedition_type, objective, team, funding,
                 prep_depth, confidence, outcome, reputation_delta, result_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(code) DO UPDATE SET
                outcome = excluded.outcome,
                reputation_delta = excluded.reputation_delta,
                result_payload = excluded.result_payload",
            params![
                record.code,
                ts(record.timestamp),
                record.player_id,
                record.expedition_type.as_str(),
                record.objective,
                serde_json::to_string(&record.team)?,
                serde_json::to_string(&record.funding)?,
                record.prep_depth.as_str(),
                record.confidence.as_str(),
                record.outcome.map(|o| o.as_str()),
                record.reputation_delta,
                result_payload.map(serde_json::to_string).transpose()?,
            ],
        )?;
        Ok(())
    }

    pub fn get_expedition(&self, code: &str) -> Result<Option<ExpeditionRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT code, timestamp, player_id, expedition_type, objective, team,
                        funding, prep_depth, confidence, outcome, reputation_delta
                 FROM expeditions WHERE code = ?1",
                params![code],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, i64>(10)?,
                    ))
                },
            )
            .optional()?;
        let Some((
            code,
            timestamp,
            player_id,
            expedition_type,
            objective,
            team,
            funding,
            prep_depth,
            confidence,
            outcome,
            reputation_delta,
        )) = row
        else {
            return Ok(None);
        };
        let outcome = match outcome.as_deref() {
            Some("failure") => Some(ExpeditionOutcome::Failure),
            Some("partial") => Some(ExpeditionOutcome::Partial),
            Some("success") => Some(ExpeditionOutcome::Success),
            Some("landmark") => Some(ExpeditionOutcome::Landmark),
            _ => None,
        };
        Ok(Some(ExpeditionRecord {
            code,
            player_id,
            expedition_type: ExpeditionType::parse(&expedition_type)?,
            objective,
            team: serde_json::from_str(&team)?,
            funding: serde_json::from_str(&funding)?,
            prep_depth: PrepDepth::parse(&prep_depth)?,
            confidence: ConfidenceLevel::parse(&confidence)?,
            outcome,
            reputation_delta,
            timestamp: parse_ts(&timestamp)?,
        }))
    }

    // -- press archive ---------------------------------------------------

    pub fn record_press(&mut self, record: &PressRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO press_releases (timestamp, type, headline, body, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ts(record.timestamp),
                record.release.press_type,
                record.release.headline,
                record.release.body,
                serde_json::to_string(&record.release.metadata)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn press_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM press_releases", [], |row| row.get(0))?)
    }

    pub fn list_press(&self, limit: Option<i64>, offset: i64) -> Result<Vec<PressRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, type, headline, body, metadata FROM press_releases
             ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let raw: Vec<(String, String, String, String, String)> = stmt
            .query_map(params![limit.unwrap_or(i64::MAX), offset], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        let mut records = Vec::with_capacity(raw.len());
        for (timestamp, press_type, headline, body, metadata) in raw {
            records.push(PressRecord {
                timestamp: parse_ts(&timestamp)?,
                release: PressRelease {
                    press_type,
                    headline,
                    body,
                    metadata: serde_json::from_str(&metadata)?,
                },
            });
        }
        Ok(records)
    }

    // -- queued press ----------------------------------------------------

    pub fn enqueue_press(
        &mut self,
        release: &PressRelease,
        release_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        if release_at <= now {
            return Err(GameError::invalid(format!(
                "queued press must release after creation ({release_at} <= {now})"
            )));
        }
        self.conn.execute(
            "INSERT INTO queued_press (release_at, created_at, payload) VALUES (?1, ?2, ?3)",
            params![ts(release_at), ts(now), serde_json::to_string(release)?],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn due_queued_press(&self, now: DateTime<Utc>) -> Result<Vec<QueuedPressRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, release_at, payload FROM queued_press
             WHERE release_at <= ?1 ORDER BY release_at, id",
        )?;
        let raw: Vec<(i64, String, String)> = stmt
            .query_map(params![ts(now)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        let mut rows = Vec::with_capacity(raw.len());
        for (id, release_at, payload) in raw {
            rows.push(QueuedPressRow {
                id,
                release_at: parse_ts(&release_at)?,
                release: serde_json::from_str(&payload)?,
            });
        }
        Ok(rows)
    }

    pub fn list_queued_press(&self) -> Result<Vec<QueuedPressRow>> {
        self.due_queued_press(Utc::now() + Duration::days(365 * 100))
    }

    pub fn clear_queued_press(&mut self, queue_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM queued_press WHERE id = ?1", params![queue_id])?;
        Ok(())
    }

    pub fn count_queued_press(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM queued_press", [], |row| row.get(0))?)
    }

    // -- orders ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_order(
        &mut self,
        order_type: &str,
        actor_id: Option<&str>,
        subject_id: Option<&str>,
        payload: &Value,
        scheduled_at: Option<DateTime<Utc>>,
        source_table: Option<&str>,
        source_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO orders
                (order_type, actor_id, subject_id, payload, status, scheduled_at,
                 created_at, updated_at, source_table, source_id)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6, ?7, ?8)",
            params![
                order_type,
                actor_id,
                subject_id,
                serde_json::to_string(payload)?,
                scheduled_at.map(ts),
                ts(now),
                source_table,
                source_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[allow(clippy::type_complexity)]
    fn order_from_raw(
        raw: (
            i64,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
            Option<String>,
            String,
        ),
    ) -> Result<OrderRow> {
        let (id, order_type, actor_id, subject_id, payload, status, scheduled_at, created_at) = raw;
        Ok(OrderRow {
            id,
            order_type,
            actor_id,
            subject_id,
            payload: serde_json::from_str(&payload)?,
            status,
            scheduled_at: parse_ts_opt(scheduled_at)?,
            created_at: parse_ts(&created_at)?,
        })
    }

    /// Pending orders of one type whose `scheduled_at` is null or due,
    /// ordered by creation.
    pub fn fetch_due_orders(&self, order_type: &str, now: DateTime<Utc>) -> Result<Vec<OrderRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_type, actor_id, subject_id, payload, status, scheduled_at, created_at
             FROM orders
             WHERE order_type = ?1 AND status = 'pending'
               AND (scheduled_at IS NULL OR scheduled_at <= ?2)
             ORDER BY created_at, id",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![order_type, ts(now)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::order_from_raw).collect()
    }

    /// All pending due orders regardless of type, for the dispatcher scan.
    pub fn fetch_all_due_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_type, actor_id, subject_id, payload, status, scheduled_at, created_at
             FROM orders
             WHERE status = 'pending' AND (scheduled_at IS NULL OR scheduled_at <= ?1)
             ORDER BY created_at, id",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![ts(now)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::order_from_raw).collect()
    }

    pub fn get_order(&self, order_id: i64) -> Result<Option<OrderRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, order_type, actor_id, subject_id, payload, status, scheduled_at, created_at
                 FROM orders WHERE id = ?1",
                params![order_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::order_from_raw).transpose()
    }

    pub fn update_order_status(
        &mut self,
        order_id: i64,
        status: &str,
        result: Option<&Value>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE orders SET status = ?2, result = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                order_id,
                status,
                result.map(serde_json::to_string).transpose()?,
                ts(Utc::now()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn list_orders(
        &self,
        order_type: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<OrderRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_type, actor_id, subject_id, payload, status, scheduled_at, created_at
             FROM orders
             WHERE (?1 IS NULL OR order_type = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at, id",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![order_type, status], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::order_from_raw).collect()
    }

    /// Cancel pending orders matching type and optional subject/actor.
    pub fn cancel_orders(
        &mut self,
        order_type: &str,
        subject_id: Option<&str>,
        actor_id: Option<&str>,
        reason: &str,
    ) -> Result<usize> {
        let result = serde_json::json!({ "reason": reason });
        let changed = self.conn.execute(
            "UPDATE orders SET status = 'cancelled', result = ?4, updated_at = ?5
             WHERE order_type = ?1 AND status = 'pending'
               AND (?2 IS NULL OR subject_id = ?2)
               AND (?3 IS NULL OR actor_id = ?3)",
            params![
                order_type,
                subject_id,
                actor_id,
                serde_json::to_string(&result)?,
                ts(Utc::now()),
            ],
        )?;
        Ok(changed)
    }

    /// Mark a player's pending orders for a subject as completed.
    pub fn complete_orders(
        &mut self,
        order_type: &str,
        subject_id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<usize> {
        let result = serde_json::json!({ "reason": reason });
        let changed = self.conn.execute(
            "UPDATE orders SET status = 'completed', result = ?4, updated_at = ?5
             WHERE order_type = ?1 AND status = 'pending'
               AND subject_id = ?2 AND actor_id = ?3",
            params![
                order_type,
                subject_id,
                actor_id,
                serde_json::to_string(&result)?,
                ts(Utc::now()),
            ],
        )?;
        Ok(changed)
    }

    // -- timeline --------------------------------------------------------

    pub fn current_year(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT current_year FROM timeline WHERE singleton = 1",
            [],
            |row| row.get(0),
        )?)
    }

    /// Advance the in-fiction calendar. Whole elapsed years move the anchor
    /// by exactly `years × days_per_year` days so the remainder carries
    /// into the next digest.
    pub fn advance_timeline(
        &mut self,
        now: DateTime<Utc>,
        days_per_year: i64,
    ) -> Result<(i64, i64)> {
        let (current_year, last_advanced): (i64, String) = self.conn.query_row(
            "SELECT current_year, last_advanced FROM timeline WHERE singleton = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let last_advanced = parse_ts(&last_advanced)?;
        let days_per_year = days_per_year.max(1);
        let elapsed_days = (now - last_advanced).num_days();
        let years_elapsed = if elapsed_days > 0 {
            elapsed_days / days_per_year
        } else {
            0
        };
        if years_elapsed == 0 {
            return Ok((0, current_year));
        }
        let new_year = current_year + years_elapsed;
        let new_anchor = last_advanced + Duration::days(years_elapsed * days_per_year);
        self.conn.execute(
            "UPDATE timeline SET current_year = ?1, last_advanced = ?2 WHERE singleton = 1",
            params![new_year, ts(new_anchor)],
        )?;
        Ok((years_elapsed, new_year))
    }

    /// Rewind the anchor; admin/test support for driving timeline advances.
    pub fn backdate_timeline(&mut self, days: i64) -> Result<()> {
        let last_advanced: String = self.conn.query_row(
            "SELECT last_advanced FROM timeline WHERE singleton = 1",
            [],
            |row| row.get(0),
        )?;
        let rewound = parse_ts(&last_advanced)? - Duration::days(days);
        self.conn.execute(
            "UPDATE timeline SET last_advanced = ?1 WHERE singleton = 1",
            params![ts(rewound)],
        )?;
        Ok(())
    }

    // -- offers ----------------------------------------------------------

    pub fn save_offer(&mut self, offer: &OfferRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO offers
                (scholar_id, faction, rival_id, patron_id, offer_type, influence_offered,
                 terms, status, parent_offer_id, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                offer.scholar_id,
                offer.faction,
                offer.rival_id,
                offer.patron_id,
                offer.offer_type.as_str(),
                serde_json::to_string(&offer.influence_offered)?,
                serde_json::to_string(&offer.terms)?,
                offer.status.as_str(),
                offer.parent_offer_id,
                ts(offer.created_at),
                offer.resolved_at.map(ts),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_offer(&self, offer_id: i64) -> Result<Option<OfferRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, scholar_id, faction, rival_id, patron_id, offer_type,
                        influence_offered, terms, status, parent_offer_id, created_at, resolved_at
                 FROM offers WHERE id = ?1",
                params![offer_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<i64>>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, Option<String>>(11)?,
                    ))
                },
            )
            .optional()?;
        let Some((
            id,
            scholar_id,
            faction,
            rival_id,
            patron_id,
            offer_type,
            influence_offered,
            terms,
            status,
            parent_offer_id,
            created_at,
            resolved_at,
        )) = raw
        else {
            return Ok(None);
        };
        Ok(Some(OfferRecord {
            id,
            scholar_id,
            faction,
            rival_id,
            patron_id,
            offer_type: OfferType::parse(&offer_type)?,
            influence_offered: serde_json::from_str(&influence_offered)?,
            terms: serde_json::from_str(&terms)?,
            status: OfferStatus::parse(&status)?,
            parent_offer_id,
            created_at: parse_ts(&created_at)?,
            resolved_at: parse_ts_opt(resolved_at)?,
        }))
    }

    pub fn update_offer_status(
        &mut self,
        offer_id: i64,
        status: OfferStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE offers SET status = ?2, resolved_at = ?3 WHERE id = ?1",
            params![offer_id, status.as_str(), resolved_at.map(ts)],
        )?;
        Ok(())
    }

    /// Walk parents to the chain root, then collect the whole subtree.
    /// Chains are adjacency rows, never in-memory cycles.
    pub fn get_offer_chain(&self, offer_id: i64) -> Result<Vec<OfferRecord>> {
        let Some(mut root) = self.get_offer(offer_id)? else {
            return Ok(Vec::new());
        };
        while let Some(parent_id) = root.parent_offer_id {
            match self.get_offer(parent_id)? {
                Some(parent) => root = parent,
                None => break,
            }
        }
        let mut chain = vec![root.clone()];
        let mut frontier = vec![root.id];
        while let Some(current) = frontier.pop() {
            let children: Vec<i64> = {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM offers WHERE parent_offer_id = ?1 ORDER BY id")?;
                let rows = stmt
                    .query_map(params![current], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?;
                rows
            };
            for child_id in children {
                if let Some(child) = self.get_offer(child_id)? {
                    chain.push(child);
                    frontier.push(child_id);
                }
            }
        }
        chain.sort_by_key(|offer| offer.id);
        Ok(chain)
    }

    pub fn list_active_offers(&self, player_id: Option<&str>) -> Result<Vec<OfferRecord>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM offers
                 WHERE status IN ('pending', 'countered')
                   AND (?1 IS NULL OR rival_id = ?1 OR patron_id = ?1)
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![player_id], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            rows
        };
        let mut offers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(offer) = self.get_offer(id)? {
                offers.push(offer);
            }
        }
        Ok(offers)
    }

    // -- mentorships -----------------------------------------------------

    pub fn add_mentorship(
        &mut self,
        player_id: &str,
        scholar_id: &str,
        career_track: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO mentorships (player_id, scholar_id, start_date, status, career_track, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?3)",
            params![player_id, scholar_id, ts(now), career_track],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_mentorship(&self, mentorship_id: i64) -> Result<Option<MentorshipRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, player_id, scholar_id, status, career_track
                 FROM mentorships WHERE id = ?1",
                params![mentorship_id],
                |row| {
                    Ok(MentorshipRow {
                        id: row.get(0)?,
                        player_id: row.get(1)?,
                        scholar_id: row.get(2)?,
                        status: row.get(3)?,
                        career_track: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn get_active_mentorship(&self, scholar_id: &str) -> Result<Option<MentorshipRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, player_id, scholar_id, status, career_track
                 FROM mentorships WHERE scholar_id = ?1 AND status = 'active'
                 ORDER BY id DESC LIMIT 1",
                params![scholar_id],
                |row| {
                    Ok(MentorshipRow {
                        id: row.get(0)?,
                        player_id: row.get(1)?,
                        scholar_id: row.get(2)?,
                        status: row.get(3)?,
                        career_track: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn activate_mentorship(&mut self, mentorship_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE mentorships SET status = 'active' WHERE id = ?1",
            params![mentorship_id],
        )?;
        Ok(())
    }

    pub fn complete_mentorship(&mut self, mentorship_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE mentorships SET status = 'completed', resolved_at = ?2 WHERE id = ?1",
            params![mentorship_id, ts(now)],
        )?;
        Ok(())
    }

    // -- conferences -----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn add_conference(
        &mut self,
        code: &str,
        player_id: &str,
        theory_id: i64,
        confidence: ConfidenceLevel,
        supporters: &[String],
        opposition: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conferences
                (code, timestamp, player_id, theory_id, confidence, supporters, opposition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                code,
                ts(now),
                player_id,
                theory_id,
                confidence.as_str(),
                serde_json::to_string(supporters)?,
                serde_json::to_string(opposition)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_conference(&self, code: &str) -> Result<Option<ConferenceRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT code, player_id, theory_id, confidence, supporters, opposition, outcome
                 FROM conferences WHERE code = ?1",
                params![code],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((code, player_id, theory_id, confidence, supporters, opposition, outcome)) = raw
        else {
            return Ok(None);
        };
        Ok(Some(ConferenceRow {
            code,
            player_id,
            theory_id,
            confidence: ConfidenceLevel::parse(&confidence)?,
            supporters: serde_json::from_str(&supporters)?,
            opposition: serde_json::from_str(&opposition)?,
            outcome,
        }))
    }

    pub fn resolve_conference(
        &mut self,
        code: &str,
        outcome: &str,
        reputation_delta: i64,
        result_payload: &Value,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE conferences SET outcome = ?2, reputation_delta = ?3, result_payload = ?4
             WHERE code = ?1",
            params![
                code,
                outcome,
                reputation_delta,
                serde_json::to_string(result_payload)?
            ],
        )?;
        Ok(())
    }

    // -- symposium topics & votes ---------------------------------------

    pub fn create_symposium_topic(
        &mut self,
        symposium_date: DateTime<Utc>,
        topic: &str,
        description: &str,
        proposal_id: Option<i64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO symposium_topics
                (symposium_date, topic, description, status, proposal_id, created_at)
             VALUES (?1, ?2, ?3, 'voting', ?4, ?1)",
            params![ts(symposium_date), topic, description, proposal_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[allow(clippy::type_complexity)]
    fn topic_from_raw(
        raw: (
            i64,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<i64>,
        ),
    ) -> Result<TopicRow> {
        let (id, symposium_date, topic, description, status, winner, proposal_id) = raw;
        Ok(TopicRow {
            id,
            symposium_date: parse_ts(&symposium_date)?,
            topic,
            description,
            status,
            winner,
            proposal_id,
        })
    }

    pub fn get_current_symposium_topic(&self) -> Result<Option<TopicRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, symposium_date, topic, description, status, winner, proposal_id
                 FROM symposium_topics WHERE status = 'voting' ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::topic_from_raw).transpose()
    }

    pub fn get_symposium_topic(&self, topic_id: i64) -> Result<Option<TopicRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, symposium_date, topic, description, status, winner, proposal_id
                 FROM symposium_topics WHERE id = ?1",
                params![topic_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::topic_from_raw).transpose()
    }

    pub fn list_recent_symposium_topics(&self, limit: i64) -> Result<Vec<TopicRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, symposium_date, topic, description, status, winner, proposal_id
             FROM symposium_topics ORDER BY id DESC LIMIT ?1",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::topic_from_raw).collect()
    }

    pub fn resolve_symposium_topic(&mut self, topic_id: i64, winner: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE symposium_topics SET status = 'resolved', winner = ?2 WHERE id = ?1",
            params![topic_id, winner],
        )?;
        Ok(())
    }

    pub fn record_symposium_vote(
        &mut self,
        topic_id: i64,
        player_id: &str,
        vote_option: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO symposium_votes (topic_id, player_id, vote_option, voted_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(topic_id, player_id) DO UPDATE SET
                vote_option = excluded.vote_option, voted_at = excluded.voted_at",
            params![topic_id, player_id, vote_option, ts(now)],
        )?;
        Ok(())
    }

    pub fn get_symposium_votes(&self, topic_id: i64) -> Result<BTreeMap<i64, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT vote_option, COUNT(*) FROM symposium_votes
             WHERE topic_id = ?1 GROUP BY vote_option",
        )?;
        let raw: Vec<(i64, i64)> = stmt
            .query_map(params![topic_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(raw.into_iter().collect())
    }

    pub fn has_symposium_vote(&self, topic_id: i64, player_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symposium_votes WHERE topic_id = ?1 AND player_id = ?2",
            params![topic_id, player_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_symposium_voters(&self, topic_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT player_id FROM symposium_votes WHERE topic_id = ?1")?;
        let rows = stmt
            .query_map(params![topic_id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    // -- symposium proposals --------------------------------------------

    pub fn submit_symposium_proposal(
        &mut self,
        player_id: &str,
        topic: &str,
        description: &str,
        created_at: DateTime<Utc>,
        expire_at: DateTime<Utc>,
        priority: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO symposium_proposals
                (player_id, topic, description, created_at, expire_at, priority, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending')",
            params![
                player_id,
                topic,
                description,
                ts(created_at),
                ts(expire_at),
                priority
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn proposal_from_raw(
        raw: (i64, String, String, String, String, String, i64, String),
    ) -> Result<ProposalRow> {
        let (id, player_id, topic, description, created_at, expire_at, priority, status) = raw;
        Ok(ProposalRow {
            id,
            player_id,
            topic,
            description,
            created_at: parse_ts(&created_at)?,
            expire_at: parse_ts(&expire_at)?,
            priority,
            status,
        })
    }

    pub fn get_symposium_proposal(&self, proposal_id: i64) -> Result<Option<ProposalRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, player_id, topic, description, created_at, expire_at, priority, status
                 FROM symposium_proposals WHERE id = ?1",
                params![proposal_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::proposal_from_raw).transpose()
    }

    pub fn list_pending_symposium_proposals(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<ProposalRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, player_id, topic, description, created_at, expire_at, priority, status
             FROM symposium_proposals
             WHERE status = 'pending' AND expire_at > ?1
             ORDER BY created_at, id LIMIT ?2",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![ts(now), limit.unwrap_or(i64::MAX)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::proposal_from_raw).collect()
    }

    pub fn count_pending_symposium_proposals(&self, now: DateTime<Utc>) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM symposium_proposals WHERE status = 'pending' AND expire_at > ?1",
            params![ts(now)],
            |row| row.get(0),
        )?)
    }

    pub fn count_player_pending_symposium_proposals(
        &self,
        player_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM symposium_proposals
             WHERE status = 'pending' AND expire_at > ?1 AND player_id = ?2",
            params![ts(now), player_id],
            |row| row.get(0),
        )?)
    }

    pub fn update_symposium_proposal_status(
        &mut self,
        proposal_id: i64,
        status: &str,
        selected_topic_id: Option<i64>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE symposium_proposals SET status = ?2, selected_topic_id = ?3 WHERE id = ?1",
            params![proposal_id, status, selected_topic_id],
        )?;
        Ok(())
    }

    /// Expire overdue pending proposals, returning their ids.
    pub fn expire_symposium_proposals(&mut self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM symposium_proposals
                 WHERE status = 'pending' AND expire_at <= ?1",
            )?;
            let rows = stmt
                .query_map(params![ts(now)], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            rows
        };
        if !ids.is_empty() {
            self.conn.execute(
                "UPDATE symposium_proposals SET status = 'expired'
                 WHERE status = 'pending' AND expire_at <= ?1",
                params![ts(now)],
            )?;
        }
        Ok(ids)
    }

    // -- symposium pledges & participation ------------------------------

    pub fn record_symposium_pledge(
        &mut self,
        topic_id: i64,
        player_id: &str,
        pledge_amount: i64,
        faction: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO symposium_pledges (topic_id, player_id, pledge_amount, faction, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
             ON CONFLICT(topic_id, player_id) DO UPDATE SET
                pledge_amount = excluded.pledge_amount,
                faction = excluded.faction",
            params![topic_id, player_id, pledge_amount, faction, ts(created_at)],
        )?;
        Ok(())
    }

    pub fn get_symposium_pledge(
        &self,
        topic_id: i64,
        player_id: &str,
    ) -> Result<Option<PledgeRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT topic_id, player_id, pledge_amount, faction, status, created_at, resolved_at
                 FROM symposium_pledges WHERE topic_id = ?1 AND player_id = ?2",
                params![topic_id, player_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((topic_id, player_id, pledge_amount, faction, status, created_at, resolved_at)) =
            raw
        else {
            return Ok(None);
        };
        Ok(Some(PledgeRow {
            topic_id,
            player_id,
            pledge_amount,
            faction,
            status,
            created_at: parse_ts(&created_at)?,
            resolved_at: parse_ts_opt(resolved_at)?,
        }))
    }

    pub fn update_symposium_pledge_status(
        &mut self,
        topic_id: i64,
        player_id: &str,
        status: &str,
        resolved_at: Option<DateTime<Utc>>,
        faction: Option<&str>,
        pledge_amount: Option<i64>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE symposium_pledges
             SET status = ?3,
                 resolved_at = ?4,
                 faction = COALESCE(?5, faction),
                 pledge_amount = COALESCE(?6, pledge_amount)
             WHERE topic_id = ?1 AND player_id = ?2",
            params![
                topic_id,
                player_id,
                status,
                resolved_at.map(ts),
                faction,
                pledge_amount
            ],
        )?;
        Ok(())
    }

    pub fn list_recent_symposium_pledges(
        &self,
        player_id: &str,
        limit: i64,
    ) -> Result<Vec<PledgeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT topic_id, player_id, pledge_amount, faction, status, created_at, resolved_at
             FROM symposium_pledges WHERE player_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        #[allow(clippy::type_complexity)]
        let raw: Vec<(
            i64,
            String,
            i64,
            Option<String>,
            String,
            String,
            Option<String>,
        )> = stmt
            .query_map(params![player_id, limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        let mut pledges = Vec::with_capacity(raw.len());
        for (topic_id, player_id, pledge_amount, faction, status, created_at, resolved_at) in raw {
            pledges.push(PledgeRow {
                topic_id,
                player_id,
                pledge_amount,
                faction,
                status,
                created_at: parse_ts(&created_at)?,
                resolved_at: parse_ts_opt(resolved_at)?,
            });
        }
        Ok(pledges)
    }

    pub fn get_symposium_participation(
        &self,
        player_id: &str,
    ) -> Result<Option<ParticipationRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT miss_streak, grace_window_start, grace_miss_consumed, last_voted_at
                 FROM symposium_participation WHERE player_id = ?1",
                params![player_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((miss_streak, grace_window_start, grace_miss_consumed, last_voted_at)) = raw
        else {
            return Ok(None);
        };
        Ok(Some(ParticipationRow {
            miss_streak,
            grace_window_start: parse_ts_opt(grace_window_start)?,
            grace_miss_consumed,
            last_voted_at: parse_ts_opt(last_voted_at)?,
        }))
    }

    pub fn save_symposium_participation(
        &mut self,
        player_id: &str,
        row: &ParticipationRow,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO symposium_participation
                (player_id, miss_streak, grace_window_start, grace_miss_consumed, last_voted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(player_id) DO UPDATE SET
                miss_streak = excluded.miss_streak,
                grace_window_start = excluded.grace_window_start,
                grace_miss_consumed = excluded.grace_miss_consumed,
                last_voted_at = excluded.last_voted_at,
                updated_at = excluded.updated_at",
            params![
                player_id,
                row.miss_streak,
                row.grace_window_start.map(ts),
                row.grace_miss_consumed,
                row.last_voted_at.map(ts),
                ts(updated_at),
            ],
        )?;
        Ok(())
    }

    // -- influence debts -------------------------------------------------

    pub fn record_influence_debt(
        &mut self,
        player_id: &str,
        faction: &str,
        amount: i64,
        now: DateTime<Utc>,
        source: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO influence_debts (player_id, faction, source, amount, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(player_id, faction, source) DO UPDATE SET
                amount = amount + excluded.amount,
                updated_at = excluded.updated_at",
            params![player_id, faction, source, amount, ts(now)],
        )?;
        Ok(())
    }

    /// Pay down a debt, returning the amount actually applied. Cleared
    /// debts keep no row.
    pub fn apply_influence_debt_payment(
        &mut self,
        player_id: &str,
        faction: &str,
        amount: i64,
        now: DateTime<Utc>,
        source: &str,
    ) -> Result<i64> {
        let Some(record) = self.get_influence_debt(player_id, faction, source)? else {
            return Ok(0);
        };
        let paid = amount.min(record.amount).max(0);
        if paid == 0 {
            return Ok(0);
        }
        let remaining = record.amount - paid;
        if remaining == 0 {
            self.conn.execute(
                "DELETE FROM influence_debts
                 WHERE player_id = ?1 AND faction = ?2 AND source = ?3",
                params![player_id, faction, source],
            )?;
        } else {
            self.conn.execute(
                "UPDATE influence_debts SET amount = ?4, updated_at = ?5
                 WHERE player_id = ?1 AND faction = ?2 AND source = ?3",
                params![player_id, faction, source, remaining, ts(now)],
            )?;
        }
        Ok(paid)
    }

    pub fn get_influence_debt(
        &self,
        player_id: &str,
        faction: &str,
        source: &str,
    ) -> Result<Option<DebtRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT player_id, faction, source, amount, reprisal_level,
                        created_at, updated_at, last_reprisal_at
                 FROM influence_debts
                 WHERE player_id = ?1 AND faction = ?2 AND source = ?3",
                params![player_id, faction, source],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::debt_from_raw).transpose()
    }

    #[allow(clippy::type_complexity)]
    fn debt_from_raw(
        raw: (
            String,
            String,
            String,
            i64,
            i64,
            String,
            String,
            Option<String>,
        ),
    ) -> Result<DebtRow> {
        let (player_id, faction, source, amount, reprisal_level, created_at, updated_at, last) =
            raw;
        Ok(DebtRow {
            player_id,
            faction,
            source,
            amount,
            reprisal_level,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            last_reprisal_at: parse_ts_opt(last)?,
        })
    }

    pub fn list_influence_debts(
        &self,
        player_id: &str,
        source: Option<&str>,
    ) -> Result<Vec<DebtRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, faction, source, amount, reprisal_level,
                    created_at, updated_at, last_reprisal_at
             FROM influence_debts
             WHERE player_id = ?1 AND (?2 IS NULL OR source = ?2)
             ORDER BY created_at, faction",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![player_id, source], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::debt_from_raw).collect()
    }

    pub fn update_influence_debt_reprisal(
        &mut self,
        player_id: &str,
        faction: &str,
        source: &str,
        reprisal_level: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE influence_debts SET reprisal_level = ?4, last_reprisal_at = ?5, updated_at = ?5
             WHERE player_id = ?1 AND faction = ?2 AND source = ?3",
            params![player_id, faction, source, reprisal_level, ts(now)],
        )?;
        Ok(())
    }

    // -- seasonal commitments -------------------------------------------

    pub fn create_seasonal_commitment(
        &mut self,
        player_id: &str,
        faction: &str,
        tier: Option<&str>,
        base_cost: i64,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO seasonal_commitments
                (player_id, faction, tier, base_cost, start_at, end_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active')",
            params![
                player_id,
                faction,
                tier,
                base_cost,
                ts(start_at),
                ts(end_at)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[allow(clippy::type_complexity)]
    fn commitment_from_raw(
        raw: (
            i64,
            String,
            String,
            Option<String>,
            i64,
            String,
            String,
            Option<String>,
            String,
        ),
    ) -> Result<CommitmentRow> {
        let (id, player_id, faction, tier, base_cost, start_at, end_at, last_processed, status) =
            raw;
        Ok(CommitmentRow {
            id,
            player_id,
            faction,
            tier,
            base_cost,
            start_at: parse_ts(&start_at)?,
            end_at: parse_ts(&end_at)?,
            last_processed_at: parse_ts_opt(last_processed)?,
            status,
        })
    }

    pub fn get_seasonal_commitment(&self, commitment_id: i64) -> Result<Option<CommitmentRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, player_id, faction, tier, base_cost, start_at, end_at,
                        last_processed_at, status
                 FROM seasonal_commitments WHERE id = ?1",
                params![commitment_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::commitment_from_raw).transpose()
    }

    pub fn list_active_seasonal_commitments(&self) -> Result<Vec<CommitmentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, player_id, faction, tier, base_cost, start_at, end_at,
                    last_processed_at, status
             FROM seasonal_commitments WHERE status = 'active' ORDER BY id",
        )?;
        let raw: Vec<_> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::commitment_from_raw).collect()
    }

    pub fn list_player_commitments(&self, player_id: &str) -> Result<Vec<CommitmentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, player_id, faction, tier, base_cost, start_at, end_at,
                    last_processed_at, status
             FROM seasonal_commitments WHERE player_id = ?1 ORDER BY end_at, id",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![player_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::commitment_from_raw).collect()
    }

    pub fn mark_seasonal_commitment_processed(
        &mut self,
        commitment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE seasonal_commitments SET last_processed_at = ?2 WHERE id = ?1",
            params![commitment_id, ts(now)],
        )?;
        Ok(())
    }

    pub fn set_seasonal_commitment_status(
        &mut self,
        commitment_id: i64,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE seasonal_commitments SET status = ?2, last_processed_at = ?3 WHERE id = ?1",
            params![commitment_id, status, ts(now)],
        )?;
        Ok(())
    }

    pub fn update_seasonal_commitment(
        &mut self,
        commitment_id: i64,
        base_cost: Option<i64>,
        end_at: Option<DateTime<Utc>>,
        tier: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE seasonal_commitments SET
                base_cost = COALESCE(?2, base_cost),
                end_at = COALESCE(?3, end_at),
                tier = COALESCE(?4, tier)
             WHERE id = ?1",
            params![commitment_id, base_cost, end_at.map(ts), tier],
        )?;
        Ok(())
    }

    // -- faction projects ------------------------------------------------

    pub fn create_faction_project(
        &mut self,
        name: &str,
        faction: &str,
        target_progress: f64,
        metadata: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO faction_projects
                (name, faction, progress, target_progress, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, 'active', ?4, ?5, ?5)",
            params![
                name,
                faction,
                target_progress,
                metadata.map(serde_json::to_string).transpose()?,
                ts(now)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn project_from_raw(
        raw: (i64, String, String, f64, f64, String, Option<String>),
    ) -> Result<ProjectRow> {
        let (id, name, faction, progress, target_progress, status, metadata) = raw;
        Ok(ProjectRow {
            id,
            name,
            faction,
            progress,
            target_progress,
            status,
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
        })
    }

    pub fn get_faction_project(&self, project_id: i64) -> Result<Option<ProjectRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, name, faction, progress, target_progress, status, metadata
                 FROM faction_projects WHERE id = ?1",
                params![project_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        raw.map(Self::project_from_raw).transpose()
    }

    pub fn list_faction_projects(&self, include_completed: bool) -> Result<Vec<ProjectRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, faction, progress, target_progress, status, metadata
             FROM faction_projects
             WHERE ?1 OR status = 'active'
             ORDER BY id",
        )?;
        let raw: Vec<_> = stmt
            .query_map(params![include_completed], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(Self::project_from_raw).collect()
    }

    pub fn update_faction_project_progress(
        &mut self,
        project_id: i64,
        progress: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE faction_projects SET progress = ?2, updated_at = ?3 WHERE id = ?1",
            params![project_id, progress, ts(now)],
        )?;
        Ok(())
    }

    pub fn complete_faction_project(&mut self, project_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE faction_projects SET status = 'completed', updated_at = ?2 WHERE id = ?1",
            params![project_id, ts(now)],
        )?;
        Ok(())
    }

    pub fn update_faction_project(
        &mut self,
        project_id: i64,
        target_progress: Option<f64>,
        status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE faction_projects SET
                target_progress = COALESCE(?2, target_progress),
                status = COALESCE(?3, status),
                updated_at = ?4
             WHERE id = ?1",
            params![project_id, target_progress, status, ts(now)],
        )?;
        Ok(())
    }

    // -- investments & endowments ---------------------------------------

    pub fn record_faction_investment(
        &mut self,
        player_id: &str,
        faction: &str,
        amount: i64,
        program: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO faction_investments (player_id, faction, amount, program, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![player_id, faction, amount, program, ts(now)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn total_faction_investment(&self, player_id: &str, faction: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM faction_investments
             WHERE player_id = ?1 AND faction = ?2",
            params![player_id, faction],
            |row| row.get(0),
        )?)
    }

    fn investments_from(&self, table: &str, player_id: &str) -> Result<Vec<InvestmentRow>> {
        let sql = format!(
            "SELECT id, player_id, faction, amount, program, created_at
             FROM {table} WHERE player_id = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw: Vec<(i64, String, String, i64, Option<String>, String)> = stmt
            .query_map(params![player_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        let mut rows = Vec::with_capacity(raw.len());
        for (id, player_id, faction, amount, program, created_at) in raw {
            rows.push(InvestmentRow {
                id,
                player_id,
                faction,
                amount,
                program,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(rows)
    }

    pub fn list_faction_investments(&self, player_id: &str) -> Result<Vec<InvestmentRow>> {
        self.investments_from("faction_investments", player_id)
    }

    pub fn record_archive_endowment(
        &mut self,
        player_id: &str,
        faction: &str,
        amount: i64,
        program: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO archive_endowments (player_id, faction, amount, program, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![player_id, faction, amount, program, ts(now)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_archive_endowments(&self, player_id: &str) -> Result<Vec<InvestmentRow>> {
        self.investments_from("archive_endowments", player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> GameStore {
        GameStore::open_in_memory(1923).unwrap()
    }

    #[test]
    fn test_player_round_trip_and_cache_refresh() {
        let mut store = store();
        let mut player = Player::new("alice", "Alice");
        player.influence.insert("academia".into(), 3);
        store.upsert_player(&player).unwrap();

        let loaded = store.get_player("alice").unwrap().unwrap();
        assert_eq!(loaded.influence.get("academia"), Some(&3));

        player.reputation = 7;
        store.upsert_player(&player).unwrap();
        assert_eq!(store.get_player("alice").unwrap().unwrap().reputation, 7);
        assert!(store.get_player("nobody").unwrap().is_none());
    }

    #[test]
    fn test_event_log_ids_are_monotonic() {
        let mut store = store();
        let now = Utc::now();
        let first = store
            .append_event(&Event::new(now, "submit_theory", json!({"player": "a"})))
            .unwrap();
        let second = store
            .append_event(&Event::new(now, "launch_expedition", json!({"code": "X"})))
            .unwrap();
        assert!(second > first);
        let events = store.export_events(None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1.action, "submit_theory");
    }

    #[test]
    fn test_queued_press_round_trips_and_requires_future_release() {
        let mut store = store();
        let now = Utc::now();
        let mut release = PressRelease::new("academic_gossip", "H", "B");
        release.set_meta("tone_seed", json!({"voice": "stringer"}));

        assert!(store.enqueue_press(&release, now, now).is_err());
        store
            .enqueue_press(&release, now + Duration::minutes(30), now)
            .unwrap();

        assert!(store.due_queued_press(now).unwrap().is_empty());
        let due = store.due_queued_press(now + Duration::hours(1)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].release.headline, "H");
        assert_eq!(due[0].release.metadata["tone_seed"]["voice"], "stringer");

        store.clear_queued_press(due[0].id).unwrap();
        assert_eq!(store.count_queued_press().unwrap(), 0);
    }

    #[test]
    fn test_due_orders_respect_schedule_and_order() {
        let mut store = store();
        let now = Utc::now();
        store
            .enqueue_order(
                "conference_resolution",
                Some("p1"),
                Some("CONF-1"),
                &json!({"code": "CONF-1"}),
                None,
                None,
                None,
                now,
            )
            .unwrap();
        store
            .enqueue_order(
                "conference_resolution",
                Some("p1"),
                Some("CONF-2"),
                &json!({"code": "CONF-2"}),
                Some(now + Duration::hours(2)),
                None,
                None,
                now + Duration::seconds(1),
            )
            .unwrap();

        let due = store.fetch_due_orders("conference_resolution", now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].subject_id.as_deref(), Some("CONF-1"));

        let later = store
            .fetch_due_orders("conference_resolution", now + Duration::hours(3))
            .unwrap();
        assert_eq!(later.len(), 2);
        assert_eq!(later[0].subject_id.as_deref(), Some("CONF-1"));

        store
            .update_order_status(due[0].id, "completed", Some(&json!({"ok": true})))
            .unwrap();
        assert_eq!(
            store
                .fetch_due_orders("conference_resolution", now)
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_timeline_advance_preserves_remainder() {
        let mut store = store();
        store.backdate_timeline(400).unwrap();
        let now = Utc::now();
        let (years, year) = store.advance_timeline(now, 365).unwrap();
        assert_eq!(years, 1);
        assert_eq!(year, 1924);
        // 35 leftover days remain toward the next year.
        let (years_again, _) = store.advance_timeline(now, 365).unwrap();
        assert_eq!(years_again, 0);
        store.backdate_timeline(330).unwrap();
        let (years_third, year_third) = store.advance_timeline(now, 365).unwrap();
        assert_eq!(years_third, 1);
        assert_eq!(year_third, 1925);
    }

    #[test]
    fn test_offer_chain_walks_to_root_and_children() {
        let mut store = store();
        let now = Utc::now();
        let base = OfferRecord {
            id: 0,
            scholar_id: "s.x".into(),
            faction: "industry".into(),
            rival_id: "rival".into(),
            patron_id: "patron".into(),
            offer_type: OfferType::Initial,
            influence_offered: BTreeMap::from([("industry".to_string(), 8)]),
            terms: BTreeMap::new(),
            status: OfferStatus::Pending,
            parent_offer_id: None,
            created_at: now,
            resolved_at: None,
        };
        let root_id = store.save_offer(&base).unwrap();
        let mut counter = base.clone();
        counter.offer_type = OfferType::Counter;
        counter.parent_offer_id = Some(root_id);
        let counter_id = store.save_offer(&counter).unwrap();

        let from_child = store.get_offer_chain(counter_id).unwrap();
        assert_eq!(from_child.len(), 2);
        assert_eq!(from_child[0].id, root_id);
        let from_root = store.get_offer_chain(root_id).unwrap();
        assert_eq!(from_root.len(), 2);
    }

    #[test]
    fn test_influence_debt_upsert_and_payment() {
        let mut store = store();
        let now = Utc::now();
        store
            .record_influence_debt("carol", "academia", 2, now, "symposium")
            .unwrap();
        store
            .record_influence_debt("carol", "academia", 1, now, "symposium")
            .unwrap();
        let debt = store
            .get_influence_debt("carol", "academia", "symposium")
            .unwrap()
            .unwrap();
        assert_eq!(debt.amount, 3);

        let paid = store
            .apply_influence_debt_payment("carol", "academia", 2, now, "symposium")
            .unwrap();
        assert_eq!(paid, 2);
        let paid_rest = store
            .apply_influence_debt_payment("carol", "academia", 5, now, "symposium")
            .unwrap();
        assert_eq!(paid_rest, 1);
        assert!(store
            .get_influence_debt("carol", "academia", "symposium")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scholar_blob_round_trip() {
        let mut store = store();
        let repo = crate::scholars::ScholarRepository::new();
        let scholars = repo.base_scholars();
        for scholar in &scholars {
            store.save_scholar(scholar).unwrap();
        }
        let loaded = store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(loaded.name, "Dr Elara Ironquill");
        assert_eq!(loaded.stats.integrity, 9);
        assert_eq!(store.scholar_count().unwrap(), scholars.len() as i64);
        store.remove_scholar("s.ironquill").unwrap();
        assert!(store.get_scholar("s.ironquill").unwrap().is_none());
    }

    #[test]
    fn test_pledge_lifecycle() {
        let mut store = store();
        let now = Utc::now();
        let topic_id = store
            .create_symposium_topic(now, "Topic", "Desc", None)
            .unwrap();
        store
            .record_symposium_pledge(topic_id, "carol", 5, Some("academia"), now)
            .unwrap();
        store
            .update_symposium_pledge_status(topic_id, "carol", "debt", Some(now), None, None)
            .unwrap();
        let pledge = store
            .get_symposium_pledge(topic_id, "carol")
            .unwrap()
            .unwrap();
        assert_eq!(pledge.status, "debt");
        assert_eq!(pledge.pledge_amount, 5);
        assert_eq!(pledge.faction.as_deref(), Some("academia"));
    }
}
