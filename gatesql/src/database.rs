//!
//! Capability-Gated Connection
//!
//! A `Database` owns a read-write handle and, when configured, a read-only
//! handle. Both are opened through an `Opener`, which installs the pure
//! SQL functions on every connection and the read-only authorizer on
//! read-only ones. The authorizer is the only thing enforcing read-only
//! access: the file itself is opened with normal flags.
//!
//! ```text
//!   Database::open(migrations)
//!     -> open read-write handle   (functions)
//!     -> run Migrator on it       (one transaction per migration)
//!     -> open read-only handle    (functions + authorizer), if configured
//! ```
//!
//! A database opens once. A second `open` fails with `AlreadyOpen` until
//! `close` is called. Clones of the `Opener` share the database's open
//! state, so once it is closed they refuse to open new handles.
//!

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::OpenFlags;
use tracing::debug;

use crate::authorizer;
use crate::config::DatabaseConfig;
use crate::errors::Error;
use crate::functions;
use crate::migrate::{MigrationRecord, Migrations, Migrator};
use crate::query::{self, Connection};

static MEMORY_DATABASES: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::ReadWrite => write!(f, "read-write"),
            Access::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Opens engine connections to one database with the hooks for an access level.
#[derive(Debug, Clone)]
pub struct Opener {
    target: PathBuf,
    busy_timeout: Duration,
    live: Arc<AtomicBool>,
}

impl Opener {
    /// `:memory:` is turned into a named shared-cache database so every
    /// handle from this opener sees the same data.
    pub fn new(path: &Path, busy_timeout: Duration) -> Self {
        let target = if path == Path::new(":memory:") {
            let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
            PathBuf::from(format!(
                "file:gatesql-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                n
            ))
        } else {
            path.to_path_buf()
        };
        Self {
            target,
            busy_timeout,
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// False before the owning database opens and after it closes.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub fn open(&self, access: Access) -> Result<Handle, Error> {
        if !self.is_live() {
            return Err(Error::NotOpen);
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(&self.target, flags)
            .map_err(|e| Error::engine(&format!("open {}", self.target.display()), e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| Error::engine("busy_timeout", e))?;
        functions::register(&conn).map_err(|e| Error::engine("register functions", e))?;
        if access == Access::ReadOnly {
            conn.authorizer(Some(authorizer::read_only));
        }
        debug!(target = %self.target.display(), %access, "Opened handle");
        Ok(Handle { conn, access })
    }
}

/// One engine connection and the access level it was opened with.
#[derive(Debug)]
pub struct Handle {
    conn: rusqlite::Connection,
    access: Access,
}

impl Connection for Handle {
    fn sqlite(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn access(&self) -> Access {
        self.access
    }
}

impl Handle {
    /// The engine's reserved integer slot, independent of the ledger.
    pub fn user_version(&self) -> Result<i64, Error> {
        let versions: Vec<i64> = query::query(self, "PRAGMA user_version", [])?;
        Ok(versions.first().copied().unwrap_or_default())
    }

    pub fn set_user_version(&self, version: i64) -> Result<(), Error> {
        query::exec(self, &format!("PRAGMA user_version = {}", version), [])?;
        Ok(())
    }

    /// Start a transaction. Statements on it run with read-write access.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, Error> {
        query::require_write(&*self, "transaction")?;
        self.conn
            .transaction()
            .map_err(|e| Error::engine("BEGIN", e))
    }

    pub fn close(self) -> Result<(), Error> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::engine("close", e))
    }
}

pub struct Database {
    config: DatabaseConfig,
    opener: Opener,
    read_write: Option<Handle>,
    read_only: Option<Handle>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        let opener = Opener::new(&config.path, config.busy_timeout());
        Self {
            config,
            opener,
            read_write: None,
            read_only: None,
        }
    }

    /// Open the handles and apply pending migrations.
    ///
    /// If a migration fails the database stays closed and the error names
    /// the failing migration.
    pub fn open(&mut self, migrations: &Migrations) -> Result<(), Error> {
        if self.read_write.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.config.validate()?;

        self.opener.set_live(true);
        match self.open_handles(migrations) {
            Ok((read_write, read_only)) => {
                self.read_write = Some(read_write);
                self.read_only = read_only;
                Ok(())
            }
            Err(e) => {
                self.opener.set_live(false);
                Err(e)
            }
        }
    }

    fn open_handles(&self, migrations: &Migrations) -> Result<(Handle, Option<Handle>), Error> {
        let mut read_write = self.opener.open(Access::ReadWrite)?;
        Migrator::new(&self.config.migrations_table).run(&mut read_write.conn, migrations)?;
        let read_only = if self.config.read_only {
            Some(self.opener.open(Access::ReadOnly)?)
        } else {
            None
        };
        Ok((read_write, read_only))
    }

    pub fn is_open(&self) -> bool {
        self.read_write.is_some()
    }

    pub fn read_write(&self) -> Result<&Handle, Error> {
        self.read_write.as_ref().ok_or(Error::NotOpen)
    }

    pub fn read_write_mut(&mut self) -> Result<&mut Handle, Error> {
        self.read_write.as_mut().ok_or(Error::NotOpen)
    }

    pub fn read_only(&self) -> Result<&Handle, Error> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        self.read_only.as_ref().ok_or(Error::Capability {
            operation: "read_only()",
            required: Access::ReadOnly,
        })
    }

    pub fn has_read_only(&self) -> bool {
        self.read_only.is_some()
    }

    /// Open one more handle to the same database with the hooks for `access`.
    pub fn connect(&self, access: Access) -> Result<Handle, Error> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        self.opener.open(access)
    }

    pub fn opener(&self) -> &Opener {
        &self.opener
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, Error> {
        Migrator::new(&self.config.migrations_table).applied(&self.read_write()?.conn)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        let read_write = self.read_write.take().ok_or(Error::NotOpen)?;
        self.opener.set_live(false);
        if let Some(read_only) = self.read_only.take() {
            read_only.close()?;
        }
        read_write.close()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.opener.target())
            .field("open", &self.is_open())
            .field("read_only", &self.has_read_only())
            .finish()
    }
}
