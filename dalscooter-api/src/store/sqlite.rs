//! SQLite-based storage implementation

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dalscooter_core::{
    Booking, BookingId, Feedback, Group, MessageId, MessageStatus, SecurityQuestion,
    SupportMessage,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::{
    poisoned, Bike, BookingChange, BookingGuard, BookingStore, MessageUpdate, NewUser,
    SecurityQuestionRecord, StoreResult, SupportStore, UpdateOutcome, User, UserId, UserStore,
};
use crate::error::ApiError;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

const BOOKING_COLUMNS: &str =
    "booking_id, user_id, bike_id, start_time, end_time, price, access_code, is_used, created_at";

const BIKE_COLUMNS: &str = "bike_id, model, bike_type, hourly_rate, is_active, access_code";

const MESSAGE_COLUMNS: &str =
    "message_id, message_type, user_id, franchise_id, booking_id, content, status, in_reply_to, created_at";

const FEEDBACK_COLUMNS: &str = "feedback_id, email, feedback_text, bike_type, bike_id, booking_reference, \
     polarity, created_at, analyzed_at";

/// SQLite-based store implementing UserStore, BookingStore and SupportStore
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: &str) -> Result<Self, ApiError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run database migrations
    fn migrate(conn: &Connection) -> Result<(), ApiError> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            tracing::info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }
            if current_version < 2 {
                Self::migrate_v2(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;

            tracing::info!("Database migrations complete");
        }

        Ok(())
    }

    /// Get current schema version (0 if no schema exists)
    fn get_schema_version(conn: &Connection) -> Result<i32, ApiError> {
        let table_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })?)
    }

    /// Migration to version 1: initial schema
    fn migrate_v1(conn: &Connection) -> Result<(), ApiError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                confirmed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_groups (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_name TEXT NOT NULL,
                PRIMARY KEY (user_id, group_name)
            );

            CREATE TABLE IF NOT EXISTS security_questions (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                question_id TEXT NOT NULL,
                question_text TEXT NOT NULL,
                answer_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, question_id)
            );

            CREATE TABLE IF NOT EXISTS bookings (
                booking_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                bike_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                price REAL NOT NULL,
                access_code TEXT NOT NULL DEFAULT '',
                is_used INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bookings_user_id ON bookings(user_id);

            CREATE TABLE IF NOT EXISTS bikes (
                bike_id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                bike_type TEXT NOT NULL,
                hourly_rate REAL NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                access_code TEXT NOT NULL DEFAULT ''
            );
            "#,
        )?;

        Ok(())
    }

    /// Migration to version 2: concerns, responses and feedback
    fn migrate_v2(conn: &Connection) -> Result<(), ApiError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS support_messages (
                message_id TEXT PRIMARY KEY,
                message_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                franchise_id TEXT,
                booking_id TEXT,
                content TEXT NOT NULL,
                status TEXT NOT NULL,
                in_reply_to TEXT REFERENCES support_messages(message_id),
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_support_messages_user_id ON support_messages(user_id);
            CREATE INDEX IF NOT EXISTS idx_support_messages_franchise_id
                ON support_messages(franchise_id);

            CREATE TABLE IF NOT EXISTS feedback (
                feedback_id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                feedback_text TEXT NOT NULL,
                bike_type TEXT NOT NULL,
                bike_id TEXT NOT NULL,
                booking_reference TEXT NOT NULL,
                polarity TEXT NOT NULL DEFAULT 'UNKNOWN',
                created_at TEXT NOT NULL,
                analyzed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_bike_id ON feedback(bike_id);
            "#,
        )?;

        Ok(())
    }

    fn query_groups(conn: &Connection, user_id: &str) -> StoreResult<Vec<Group>> {
        let mut stmt =
            conn.prepare("SELECT group_name FROM user_groups WHERE user_id = ?1 ORDER BY group_name")?;
        let names = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.iter().filter_map(|n| n.parse().ok()).collect())
    }

    fn query_booking(conn: &Connection, booking_id: &BookingId) -> StoreResult<Option<Booking>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM bookings WHERE booking_id = ?1", BOOKING_COLUMNS),
                params![booking_id.as_str()],
                booking_from_row,
            )
            .optional()?)
    }

    fn query_message(conn: &Connection, message_id: &MessageId) -> StoreResult<Option<SupportMessage>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM support_messages WHERE message_id = ?1", MESSAGE_COLUMNS),
                params![message_id.as_str()],
                message_from_row,
            )
            .optional()?)
    }

    fn query_messages(conn: &Connection, filter: &str, arg: &str) -> StoreResult<Vec<SupportMessage>> {
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM support_messages {}", MESSAGE_COLUMNS, filter))?;
        let mut messages = stmt
            .query_map(params![arg], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    fn query_bookings(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<Booking>> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM bookings {}", BOOKING_COLUMNS, filter))?;
        let bookings = stmt
            .query_map(args, booking_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookings)
    }
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = dalscooter_core::Error>,
{
    value.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<SupportMessage> {
    let kind: String = row.get(1)?;
    let status: String = row.get(6)?;
    let in_reply_to: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(SupportMessage {
        message_id: MessageId(row.get(0)?),
        kind: parse_column(1, &kind)?,
        user_id: row.get(2)?,
        franchise_id: row.get(3)?,
        booking_id: row.get(4)?,
        content: row.get(5)?,
        status: parse_column(6, &status)?,
        in_reply_to: in_reply_to.map(MessageId),
        created_at: parse_time(8, &created_at)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    let polarity: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let analyzed_at: Option<String> = row.get(8)?;
    Ok(Feedback {
        feedback_id: row.get(0)?,
        email: row.get(1)?,
        feedback_text: row.get(2)?,
        bike_type: row.get(3)?,
        bike_id: row.get(4)?,
        booking_reference: row.get(5)?,
        polarity: parse_column(6, &polarity)?,
        created_at: parse_time(7, &created_at)?,
        analyzed_at: analyzed_at.map(|t| parse_time(8, &t)).transpose()?,
    })
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let is_used: i32 = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(Booking {
        booking_id: BookingId(row.get(0)?),
        user_id: row.get(1)?,
        bike_id: row.get(2)?,
        start_time: parse_time(3, &start_time)?,
        end_time: parse_time(4, &end_time)?,
        price: row.get(5)?,
        access_code: row.get(6)?,
        is_used: is_used != 0,
        created_at: parse_time(8, &created_at)?,
    })
}

fn bike_from_row(row: &Row<'_>) -> rusqlite::Result<Bike> {
    let is_active: i32 = row.get(4)?;
    Ok(Bike {
        bike_id: row.get(0)?,
        model: row.get(1)?,
        bike_type: row.get(2)?,
        hourly_rate: row.get(3)?,
        is_active: is_active != 0,
        access_code: row.get(5)?,
    })
}

impl BookingGuard {
    fn sql_condition(&self) -> &'static str {
        match self {
            BookingGuard::AwaitingApproval => "access_code = '' AND is_used = 0",
            BookingGuard::Unused => "is_used = 0",
        }
    }
}

impl UserStore for SqliteStore {
    fn create_user(&self, user: &NewUser, password_hash: &str) -> StoreResult<UserId> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO users (id, email, first_name, last_name, password_hash, confirmed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                id,
                user.email.to_lowercase(),
                user.first_name,
                user.last_name,
                password_hash,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return ApiError::EmailAlreadyExists;
                }
            }
            ApiError::Internal(e.to_string())
        })?;

        Ok(UserId(id))
    }

    fn confirm_user(&self, user_id: &UserId) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let rows_affected = conn.execute(
            "UPDATE users SET confirmed = 1 WHERE id = ?1",
            params![user_id.0],
        )?;

        if rows_affected == 0 {
            return Err(ApiError::UserNotFound);
        }
        Ok(())
    }

    fn add_to_group(&self, user_id: &UserId, group: Group) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?1, ?2)",
            params![user_id.0, group.as_str()],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return ApiError::UserNotFound;
                }
            }
            ApiError::Internal(e.to_string())
        })?;
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().map_err(poisoned)?;

        let user = conn
            .query_row(
                "SELECT id, email, first_name, last_name, password_hash, confirmed, created_at
                 FROM users WHERE id = ?1",
                params![user_id.0],
                |row| {
                    let confirmed: i32 = row.get(5)?;
                    let created_at: String = row.get(6)?;
                    Ok(User {
                        id: UserId(row.get(0)?),
                        email: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        password_hash: row.get(4)?,
                        confirmed: confirmed != 0,
                        groups: Vec::new(),
                        created_at: parse_time(6, &created_at)?,
                    })
                },
            )
            .optional()?;

        match user {
            Some(mut user) => {
                user.groups = Self::query_groups(&conn, &user.id.0)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let normalized = email.to_lowercase();
        let conn = self.conn.lock().map_err(poisoned)?;

        let user_id: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?;

        drop(conn); // Release lock before calling get_user

        match user_id {
            Some(id) => self.get_user(&UserId(id)),
            None => Ok(None),
        }
    }

    fn list_users_in_group(&self, group: Group) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT u.id FROM users u JOIN user_groups g ON g.user_id = u.id
             WHERE g.group_name = ?1 AND u.confirmed = 1
             ORDER BY u.email",
        )?;
        let ids = stmt
            .query_map(params![group.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn); // Release lock before calling get_user

        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.get_user(&UserId(id))? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn put_questions(&self, user_id: &UserId, questions: &[SecurityQuestion]) -> StoreResult<()> {
        let mut conn = self.conn.lock().map_err(poisoned)?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![user_id.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(ApiError::UserNotFound);
        }

        // All questions land together or not at all
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM security_questions WHERE user_id = ?1",
            params![user_id.0],
        )?;
        let now = Utc::now().to_rfc3339();
        for question in questions {
            tx.execute(
                "INSERT INTO security_questions
                 (user_id, question_id, question_text, answer_hash, created_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    user_id.0,
                    question.question_id,
                    question.text,
                    question.answer_hash,
                    now,
                ],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn get_questions(&self, user_id: &UserId) -> StoreResult<Vec<SecurityQuestionRecord>> {
        let conn = self.conn.lock().map_err(poisoned)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, question_id, question_text, answer_hash, created_at, is_active
             FROM security_questions WHERE user_id = ?1 AND is_active = 1
             ORDER BY question_id",
        )?;

        let questions = stmt
            .query_map(params![user_id.0], |row| {
                let created_at: String = row.get(4)?;
                let is_active: i32 = row.get(5)?;
                Ok(SecurityQuestionRecord {
                    user_id: UserId(row.get(0)?),
                    question_id: row.get(1)?,
                    question_text: row.get(2)?,
                    answer_hash: row.get(3)?,
                    created_at: parse_time(4, &created_at)?,
                    is_active: is_active != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(questions)
    }
}

impl BookingStore for SqliteStore {
    fn put_booking(&self, booking: &Booking) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO bookings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                BOOKING_COLUMNS
            ),
            params![
                booking.booking_id.as_str(),
                booking.user_id,
                booking.bike_id,
                booking.start_time.to_rfc3339(),
                booking.end_time.to_rfc3339(),
                booking.price,
                booking.access_code,
                booking.is_used as i32,
                booking.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn get_booking(&self, booking_id: &BookingId) -> StoreResult<Option<Booking>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::query_booking(&conn, booking_id)
    }

    fn update_booking_if(
        &self,
        booking_id: &BookingId,
        guard: BookingGuard,
        change: BookingChange,
    ) -> StoreResult<UpdateOutcome> {
        let mut conn = self.conn.lock().map_err(poisoned)?;
        // Read, check and write under one write transaction
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(before) = Self::query_booking(&tx, booking_id)? else {
            return Ok(UpdateOutcome::NotFound);
        };
        if !guard.holds(&before) {
            return Ok(UpdateOutcome::GuardFailed(before));
        }

        match &change {
            BookingChange::AssignAccessCode(code) => tx.execute(
                &format!(
                    "UPDATE bookings SET access_code = ?1, is_used = 0 WHERE booking_id = ?2 AND {}",
                    guard.sql_condition()
                ),
                params![code, booking_id.as_str()],
            )?,
            BookingChange::Expire => tx.execute(
                &format!(
                    "UPDATE bookings SET is_used = 1, access_code = '' WHERE booking_id = ?1 AND {}",
                    guard.sql_condition()
                ),
                params![booking_id.as_str()],
            )?,
        };

        let after = Self::query_booking(&tx, booking_id)?.ok_or(ApiError::BookingNotFound)?;
        tx.commit()?;
        Ok(UpdateOutcome::Applied { before, after })
    }

    fn scan_bookings(&self) -> StoreResult<Vec<Booking>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::query_bookings(&conn, "", &[])
    }

    fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut bookings = Self::query_bookings(&conn, "WHERE user_id = ?1", &[&user_id])?;
        // Stored timestamps vary in fractional precision, so order on parsed values
        bookings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(bookings)
    }

    fn put_bike(&self, bike: &Bike) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO bikes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                BIKE_COLUMNS
            ),
            params![
                bike.bike_id,
                bike.model,
                bike.bike_type,
                bike.hourly_rate,
                bike.is_active as i32,
                bike.access_code,
            ],
        )?;

        Ok(())
    }

    fn get_bike(&self, bike_id: &str) -> StoreResult<Option<Bike>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM bikes WHERE bike_id = ?1", BIKE_COLUMNS),
                params![bike_id],
                bike_from_row,
            )
            .optional()?)
    }

    fn list_bikes(&self) -> StoreResult<Vec<Bike>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM bikes ORDER BY bike_id", BIKE_COLUMNS))?;
        let bikes = stmt
            .query_map([], bike_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bikes)
    }

    fn rent_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let rows_affected = conn.execute(
            "UPDATE bikes SET is_active = 0, access_code = ?1 WHERE bike_id = ?2",
            params![access_code, bike_id],
        )?;
        Ok(rows_affected > 0)
    }

    fn release_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let rows_affected = conn.execute(
            "UPDATE bikes SET is_active = 1, access_code = ''
             WHERE bike_id = ?1 AND access_code = ?2 AND access_code != ''",
            params![bike_id, access_code],
        )?;
        Ok(rows_affected > 0)
    }
}

impl SupportStore for SqliteStore {
    fn put_message(&self, message: &SupportMessage) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        insert_message(&conn, message)
    }

    fn get_message(&self, message_id: &MessageId) -> StoreResult<Option<SupportMessage>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::query_message(&conn, message_id)
    }

    fn assign_concern(
        &self,
        message_id: &MessageId,
        franchise_id: &str,
    ) -> StoreResult<MessageUpdate> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let rows_affected = conn.execute(
            "UPDATE support_messages SET franchise_id = ?1, status = ?2
             WHERE message_id = ?3 AND message_type = 'concern' AND status = ?4",
            params![
                franchise_id,
                MessageStatus::Assigned.as_str(),
                message_id.as_str(),
                MessageStatus::Open.as_str(),
            ],
        )?;

        Ok(match (rows_affected, Self::query_message(&conn, message_id)?) {
            (_, None) => MessageUpdate::NotFound,
            (_, Some(message)) if !message.is_concern() => MessageUpdate::NotFound,
            (0, Some(message)) => MessageUpdate::Unchanged(message),
            (_, Some(message)) => MessageUpdate::Applied(message),
        })
    }

    fn resolve_concern(&self, response: &SupportMessage) -> StoreResult<MessageUpdate> {
        let Some(concern_id) = &response.in_reply_to else {
            return Ok(MessageUpdate::NotFound);
        };
        let mut conn = self.conn.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            "UPDATE support_messages
             SET status = ?1, franchise_id = COALESCE(franchise_id, ?2)
             WHERE message_id = ?3 AND message_type = 'concern'",
            params![
                MessageStatus::Resolved.as_str(),
                response.franchise_id,
                concern_id.as_str(),
            ],
        )?;
        if rows_affected == 0 {
            return Ok(MessageUpdate::NotFound);
        }
        insert_message(&tx, response)?;
        let resolved = Self::query_message(&tx, concern_id)?.ok_or_else(|| {
            ApiError::Internal(format!("concern {} vanished while resolving", concern_id))
        })?;
        tx.commit()?;

        Ok(MessageUpdate::Applied(resolved))
    }

    fn list_messages_for_user(&self, user_id: &str) -> StoreResult<Vec<SupportMessage>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::query_messages(&conn, "WHERE user_id = ?1", user_id)
    }

    fn list_messages_for_franchise(&self, franchise_id: &str) -> StoreResult<Vec<SupportMessage>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Self::query_messages(&conn, "WHERE franchise_id = ?1", franchise_id)
    }

    fn put_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO feedback ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                FEEDBACK_COLUMNS
            ),
            params![
                feedback.feedback_id,
                feedback.email,
                feedback.feedback_text,
                feedback.bike_type,
                feedback.bike_id,
                feedback.booking_reference,
                feedback.polarity.as_str(),
                feedback.created_at.to_rfc3339(),
                feedback.analyzed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn list_feedback(&self, bike_id: Option<&str>) -> StoreResult<Vec<Feedback>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feedback WHERE ?1 IS NULL OR bike_id = ?1",
            FEEDBACK_COLUMNS
        ))?;
        let mut feedback = stmt
            .query_map(params![bike_id], feedback_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        feedback.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(feedback)
    }
}

fn insert_message(conn: &Connection, message: &SupportMessage) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO support_messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            MESSAGE_COLUMNS
        ),
        params![
            message.message_id.as_str(),
            message.kind.as_str(),
            message.user_id,
            message.franchise_id,
            message.booking_id,
            message.content,
            message.status.as_str(),
            message.in_reply_to.as_ref().map(|id| id.as_str()),
            message.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// Implement traits for Arc<SqliteStore> so one store can back both UserStore and BookingStore
impl UserStore for Arc<SqliteStore> {
    fn create_user(&self, user: &NewUser, password_hash: &str) -> StoreResult<UserId> {
        (**self).create_user(user, password_hash)
    }

    fn confirm_user(&self, user_id: &UserId) -> StoreResult<()> {
        (**self).confirm_user(user_id)
    }

    fn add_to_group(&self, user_id: &UserId, group: Group) -> StoreResult<()> {
        (**self).add_to_group(user_id, group)
    }

    fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        (**self).get_user(user_id)
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        (**self).get_user_by_email(email)
    }

    fn list_users_in_group(&self, group: Group) -> StoreResult<Vec<User>> {
        (**self).list_users_in_group(group)
    }

    fn put_questions(&self, user_id: &UserId, questions: &[SecurityQuestion]) -> StoreResult<()> {
        (**self).put_questions(user_id, questions)
    }

    fn get_questions(&self, user_id: &UserId) -> StoreResult<Vec<SecurityQuestionRecord>> {
        (**self).get_questions(user_id)
    }
}

impl BookingStore for Arc<SqliteStore> {
    fn put_booking(&self, booking: &Booking) -> StoreResult<()> {
        (**self).put_booking(booking)
    }

    fn get_booking(&self, booking_id: &BookingId) -> StoreResult<Option<Booking>> {
        (**self).get_booking(booking_id)
    }

    fn update_booking_if(
        &self,
        booking_id: &BookingId,
        guard: BookingGuard,
        change: BookingChange,
    ) -> StoreResult<UpdateOutcome> {
        (**self).update_booking_if(booking_id, guard, change)
    }

    fn scan_bookings(&self) -> StoreResult<Vec<Booking>> {
        (**self).scan_bookings()
    }

    fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        (**self).list_bookings_for_user(user_id)
    }

    fn put_bike(&self, bike: &Bike) -> StoreResult<()> {
        (**self).put_bike(bike)
    }

    fn get_bike(&self, bike_id: &str) -> StoreResult<Option<Bike>> {
        (**self).get_bike(bike_id)
    }

    fn list_bikes(&self) -> StoreResult<Vec<Bike>> {
        (**self).list_bikes()
    }

    fn rent_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        (**self).rent_bike(bike_id, access_code)
    }

    fn release_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        (**self).release_bike(bike_id, access_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dalscooter_core::{hash_answer, BookingRequest, ConcernRequest, FeedbackRequest, Polarity};
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        (store, dir) // Return dir to keep it alive
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
        }
    }

    fn sample_booking(id: &str) -> Booking {
        let start = Utc::now() + Duration::hours(1);
        Booking::requested(
            BookingId(id.into()),
            BookingRequest {
                user_id: "user-1".into(),
                bike_id: "EBK-001".into(),
                start_time: start,
                end_time: start + Duration::hours(2),
                price: 12.5,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_create_user_with_groups() {
        let (store, _dir) = create_test_store();

        let user_id = store.create_user(&new_user("Test@Example.COM"), "hashed").unwrap();
        store.confirm_user(&user_id).unwrap();
        store.add_to_group(&user_id, Group::Customers).unwrap();
        store.add_to_group(&user_id, Group::Customers).unwrap();

        let user = store.get_user_by_email("test@example.com").unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.email, "test@example.com");
        assert!(user.confirmed);
        assert_eq!(user.groups, vec![Group::Customers]);
    }

    #[test]
    fn test_duplicate_email() {
        let (store, _dir) = create_test_store();

        store.create_user(&new_user("dup@example.com"), "hashed").unwrap();
        let result = store.create_user(&new_user("DUP@example.com"), "hashed");
        assert!(matches!(result, Err(ApiError::EmailAlreadyExists)));
    }

    #[test]
    fn test_confirm_unknown_user() {
        let (store, _dir) = create_test_store();
        let result = store.confirm_user(&UserId("missing".into()));
        assert!(matches!(result, Err(ApiError::UserNotFound)));
    }

    #[test]
    fn test_put_questions_replaces_set() {
        let (store, _dir) = create_test_store();
        let user_id = store.create_user(&new_user("q@example.com"), "hashed").unwrap();

        let questions: Vec<SecurityQuestion> = (1..=3)
            .map(|i| SecurityQuestion {
                question_id: format!("q{}", i),
                text: format!("Question {}", i),
                answer_hash: hash_answer(&format!("answer {}", i)),
            })
            .collect();
        store.put_questions(&user_id, &questions).unwrap();

        let stored = store.get_questions(&user_id).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].to_question(), questions[0]);

        store.put_questions(&user_id, &questions[..1]).unwrap();
        assert_eq!(store.get_questions(&user_id).unwrap().len(), 1);
    }

    #[test]
    fn test_put_questions_unknown_user() {
        let (store, _dir) = create_test_store();
        let result = store.put_questions(&UserId("missing".into()), &[]);
        assert!(matches!(result, Err(ApiError::UserNotFound)));
    }

    #[test]
    fn test_booking_round_trip() {
        let (store, _dir) = create_test_store();
        let booking = sample_booking("b-1");

        store.put_booking(&booking).unwrap();
        let loaded = store.get_booking(&booking.booking_id).unwrap().unwrap();
        assert_eq!(loaded, booking);
        assert!(store.get_booking(&BookingId("nope".into())).unwrap().is_none());
    }

    #[test]
    fn test_conditional_approval_applies_once() {
        let (store, _dir) = create_test_store();
        let booking = sample_booking("b-1");
        store.put_booking(&booking).unwrap();

        let first = store
            .update_booking_if(
                &booking.booking_id,
                BookingGuard::AwaitingApproval,
                BookingChange::AssignAccessCode("0A1B2C".into()),
            )
            .unwrap();
        assert!(matches!(first, UpdateOutcome::Applied { ref after, .. } if after.access_code == "0A1B2C"));

        let second = store
            .update_booking_if(
                &booking.booking_id,
                BookingGuard::AwaitingApproval,
                BookingChange::AssignAccessCode("FFFFFF".into()),
            )
            .unwrap();
        assert!(matches!(second, UpdateOutcome::GuardFailed(ref b) if b.access_code == "0A1B2C"));
    }

    #[test]
    fn test_expire_only_unused() {
        let (store, _dir) = create_test_store();
        let booking = sample_booking("b-1");
        store.put_booking(&booking).unwrap();

        let expired = store
            .update_booking_if(&booking.booking_id, BookingGuard::Unused, BookingChange::Expire)
            .unwrap();
        assert!(matches!(expired, UpdateOutcome::Applied { ref after, .. } if after.is_used && after.access_code.is_empty()));

        let again = store
            .update_booking_if(&booking.booking_id, BookingGuard::Unused, BookingChange::Expire)
            .unwrap();
        assert!(matches!(again, UpdateOutcome::GuardFailed(_)));

        let missing = store
            .update_booking_if(&BookingId("nope".into()), BookingGuard::Unused, BookingChange::Expire)
            .unwrap();
        assert_eq!(missing, UpdateOutcome::NotFound);
    }

    #[test]
    fn test_expire_reports_cleared_code() {
        let (store, _dir) = create_test_store();
        let booking = sample_booking("b-1");
        store.put_booking(&booking).unwrap();
        store
            .update_booking_if(
                &booking.booking_id,
                BookingGuard::AwaitingApproval,
                BookingChange::AssignAccessCode("C0FFEE".into()),
            )
            .unwrap();

        match store
            .update_booking_if(&booking.booking_id, BookingGuard::Unused, BookingChange::Expire)
            .unwrap()
        {
            UpdateOutcome::Applied { before, after } => {
                assert_eq!(before.access_code, "C0FFEE");
                assert!(!before.is_used);
                assert_eq!(after.access_code, "");
            }
            other => panic!("expected expiry, got {:?}", other),
        }
    }

    #[test]
    fn test_bike_rent_and_release() {
        let (store, _dir) = create_test_store();
        store
            .put_bike(&Bike {
                bike_id: "GYR-002".into(),
                model: "Gyroscooter".into(),
                bike_type: "Gyroscooter".into(),
                hourly_rate: 4.0,
                is_active: true,
                access_code: String::new(),
            })
            .unwrap();

        assert!(store.rent_bike("GYR-002", "ABCDEF").unwrap());
        assert!(!store.release_bike("GYR-002", "123456").unwrap());
        assert!(store.get_bike("GYR-002").unwrap().unwrap().is_rented());
        assert!(store.release_bike("GYR-002", "ABCDEF").unwrap());
        assert!(store.get_bike("GYR-002").unwrap().unwrap().is_active);
        assert_eq!(store.list_bikes().unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path).unwrap();
            store.put_booking(&sample_booking("b-1")).unwrap();
        }

        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.scan_bookings().unwrap().len(), 1);
    }

    #[test]
    fn test_list_users_in_group() {
        let (store, _dir) = create_test_store();
        let ops = store.create_user(&new_user("ops@example.com"), "hashed").unwrap();
        let unconfirmed = store.create_user(&new_user("new@example.com"), "hashed").unwrap();
        store.confirm_user(&ops).unwrap();
        store.add_to_group(&ops, Group::Franchise).unwrap();
        store.add_to_group(&unconfirmed, Group::Franchise).unwrap();

        let franchise = store.list_users_in_group(Group::Franchise).unwrap();
        assert_eq!(franchise.len(), 1);
        assert_eq!(franchise[0].id, ops);
        assert_eq!(franchise[0].groups, vec![Group::Franchise]);
        assert!(store.list_users_in_group(Group::Customers).unwrap().is_empty());
    }

    #[test]
    fn test_concern_lifecycle() {
        let (store, _dir) = create_test_store();
        let concern = SupportMessage::concern(
            MessageId("m-1".into()),
            ConcernRequest {
                user_id: "rider".into(),
                booking_id: Some("b-1".into()),
                content: "Battery died mid-ride".into(),
            },
            Utc::now(),
        );
        store.put_message(&concern).unwrap();
        assert_eq!(store.get_message(&concern.message_id).unwrap().unwrap(), concern);

        let assigned = store.assign_concern(&concern.message_id, "ops-1").unwrap();
        assert!(matches!(assigned, MessageUpdate::Applied(ref m) if m.status == MessageStatus::Assigned));
        let again = store.assign_concern(&concern.message_id, "ops-2").unwrap();
        assert!(matches!(again, MessageUpdate::Unchanged(ref m)
            if m.franchise_id.as_deref() == Some("ops-1")));

        let response = SupportMessage::response_to(
            &concern,
            MessageId("m-2".into()),
            "ops-1",
            "Refund issued",
            Utc::now() + Duration::seconds(1),
        )
        .unwrap();
        let resolved = store.resolve_concern(&response).unwrap();
        assert!(matches!(resolved, MessageUpdate::Applied(ref m) if m.status == MessageStatus::Resolved));

        let thread = store.list_messages_for_user("rider").unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0], response);
        assert_eq!(store.list_messages_for_franchise("ops-1").unwrap().len(), 2);
        assert!(store.list_messages_for_franchise("ops-2").unwrap().is_empty());

        let orphan = SupportMessage {
            message_id: MessageId("m-3".into()),
            in_reply_to: Some(MessageId("missing".into())),
            ..response
        };
        assert_eq!(store.resolve_concern(&orphan).unwrap(), MessageUpdate::NotFound);
        assert!(store.get_message(&orphan.message_id).unwrap().is_none());
    }

    #[test]
    fn test_feedback_round_trip() {
        let (store, _dir) = create_test_store();
        let mut feedback = FeedbackRequest {
            email: Some("rider@example.com".into()),
            feedback_text: Some("Great scooter".into()),
            bike_id: Some("EBK-001".into()),
            ..Default::default()
        }
        .into_feedback("f-1".into(), Utc::now())
        .unwrap();
        feedback.polarity = Polarity::Positive;
        feedback.analyzed_at = Some(Utc::now());
        store.put_feedback(&feedback).unwrap();

        let anonymous = FeedbackRequest {
            feedback_text: Some("ok".into()),
            ..Default::default()
        }
        .into_feedback("f-2".into(), Utc::now())
        .unwrap();
        store.put_feedback(&anonymous).unwrap();

        assert_eq!(store.list_feedback(None).unwrap().len(), 2);
        let for_bike = store.list_feedback(Some("EBK-001")).unwrap();
        assert_eq!(for_bike, vec![feedback]);
    }

    #[test]
    fn test_upgrade_from_first_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        {
            let conn = Connection::open(&path).unwrap();
            SqliteStore::migrate_v1(&conn).unwrap();
            conn.execute("INSERT INTO schema_version (version) VALUES (1)", []).unwrap();
        }

        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        assert!(store.list_feedback(None).unwrap().is_empty());
        let conn = store.conn.lock().unwrap();
        assert_eq!(SqliteStore::get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
