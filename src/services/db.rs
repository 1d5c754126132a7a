use crate::error::GalleryError;
use crate::models::principal::{Capabilities, Principal};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::Sha256;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const HASH_SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// PBKDF2 iterations for newly stored passwords.
pub const DEFAULT_HASH_ROUNDS: u32 = 600_000;

/// Accounts and private-folder grants.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    hash_rounds: u32,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GalleryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, GalleryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, GalleryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                group_list TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS folder_access (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                folder_name TEXT NOT NULL,
                UNIQUE(user_id, folder_name),
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hash_rounds: DEFAULT_HASH_ROUNDS,
        })
    }

    /// Iterations used for passwords stored from now on. Existing hashes keep
    /// the count they were written with.
    pub fn with_hash_rounds(mut self, rounds: u32) -> Self {
        self.hash_rounds = rounds.max(1);
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, GalleryError> {
        self.conn
            .lock()
            .map_err(|_| GalleryError::Internal("database lock poisoned".into()))
    }

    pub fn add_user(&self, username: &str, password: &str, groups: &str) -> Result<i64, GalleryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, password_hash, group_list) VALUES (?1, ?2, ?3)",
            params![username, hash_password(password, self.hash_rounds), normalize_groups(groups)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns false when the user does not exist.
    pub fn set_password(&self, username: &str, password: &str) -> Result<bool, GalleryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE username = ?2",
            params![hash_password(password, self.hash_rounds), username],
        )?;
        Ok(changed > 0)
    }

    pub fn set_groups(&self, username: &str, groups: &str) -> Result<bool, GalleryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET group_list = ?1 WHERE username = ?2",
            params![normalize_groups(groups), username],
        )?;
        Ok(changed > 0)
    }

    /// Removes the user together with their grants.
    pub fn delete_user(&self, username: &str) -> Result<bool, GalleryError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(changed > 0)
    }

    /// Grant `username` read access to the private folder `folder`.
    /// Granting twice is a no-op. Returns false when the user does not exist.
    pub fn grant_access(&self, username: &str, folder: &str) -> Result<bool, GalleryError> {
        let conn = self.conn()?;
        let Some(user_id) = user_id(&conn, username)? else {
            return Ok(false);
        };
        conn.execute(
            "INSERT OR IGNORE INTO folder_access (user_id, folder_name) VALUES (?1, ?2)",
            params![user_id, folder],
        )?;
        Ok(true)
    }

    /// Returns false when no such grant existed.
    pub fn revoke_access(&self, username: &str, folder: &str) -> Result<bool, GalleryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM folder_access
             WHERE folder_name = ?2
               AND user_id = (SELECT id FROM users WHERE username = ?1)",
            params![username, folder],
        )?;
        Ok(changed > 0)
    }

    pub fn grants_for(&self, username: &str) -> Result<BTreeSet<String>, GalleryError> {
        let conn = self.conn()?;
        grants(&conn, username)
    }

    /// Load a principal with a fresh grant snapshot.
    pub fn principal(&self, username: &str) -> Result<Option<Principal>, GalleryError> {
        let conn = self.conn()?;
        let groups: Option<String> = conn
            .query_row(
                "SELECT group_list FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        match groups {
            Some(groups) => Ok(Some(Principal::new(
                username,
                Capabilities::parse(&groups),
                grants(&conn, username)?,
            ))),
            None => Ok(None),
        }
    }

    /// Check a username/password pair and load the principal on success.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<Principal>, GalleryError> {
        let stored: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?
        };
        match stored {
            Some(hash) if verify_password(&hash, password) => self.principal(username),
            _ => Ok(None),
        }
    }

    /// Group name to member usernames, both sorted.
    pub fn list_groups(&self) -> Result<BTreeMap<String, Vec<String>>, GalleryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT username, group_list FROM users ORDER BY username")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let (username, raw) = row?;
            for group in raw.split(',').map(str::trim).filter(|g| !g.is_empty()) {
                groups.entry(group.to_string()).or_default().push(username.clone());
            }
        }
        Ok(groups)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, GalleryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT username, group_list FROM users ORDER BY username")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut users = Vec::new();
        for row in rows {
            let (username, raw) = row?;
            let folders = grants(&conn, &username)?;
            users.push(UserRecord {
                groups: raw.split(',').filter(|g| !g.is_empty()).map(str::to_string).collect(),
                username,
                folders,
            });
        }
        Ok(users)
    }
}

/// One account as listed for administration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub groups: Vec<String>,
    pub folders: BTreeSet<String>,
}

fn user_id(conn: &Connection, username: &str) -> Result<Option<i64>, GalleryError> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?)
}

fn grants(conn: &Connection, username: &str) -> Result<BTreeSet<String>, GalleryError> {
    let mut stmt = conn.prepare(
        "SELECT a.folder_name FROM folder_access a
         JOIN users u ON u.id = a.user_id
         WHERE u.username = ?1",
    )?;
    let rows = stmt.query_map(params![username], |row| row.get::<_, String>(0))?;

    let mut folders = BTreeSet::new();
    for row in rows {
        folders.insert(row?);
    }
    Ok(folders)
}

fn normalize_groups(groups: &str) -> String {
    groups.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Salted PBKDF2-HMAC-SHA256, stored as `pbkdf2_sha256$<rounds>$<salt hex>$<digest hex>`.
pub fn hash_password(password: &str, rounds: u32) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut digest);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        rounds,
        hex::encode(salt),
        hex::encode(digest)
    )
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let &[scheme, rounds, salt, digest] = parts.as_slice() else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) = (rounds.parse::<u32>(), hex::decode(salt), hex::decode(digest)) else {
        return false;
    };
    if rounds == 0 || expected.len() != DIGEST_LEN {
        return false;
    }

    let mut actual = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut actual);
    constant_time_eq::constant_time_eq(&actual, &expected)
}
