// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The registry store (C2): a single SQLite connection, opened once per
//! invocation, autocommit off, with explicit `BEGIN`/`COMMIT`/`ROLLBACK`
//! bracketing every multi-step mutation so the install/remove
//! engines can interleave registry writes with filesystem work inside one
//! logical transaction.
//!
//! Grounded on the reference `moss::db::layout::Database` wrapper: a thin
//! struct around a `diesel::SqliteConnection`, a private `model` module for
//! the `Queryable`/`Insertable` row types, and embedded migrations run at
//! open time.

mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;

use crate::package::PkgInfo;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/registry/migrations");

mod model {
    use super::schema::{dirs, files, pkgs};

    #[derive(Debug, Queryable, Selectable, Insertable)]
    #[diesel(table_name = pkgs)]
    pub struct NewPkg<'a> {
        pub pkg: &'a str,
        pub version: Option<&'a str>,
        pub release: i64,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = files)]
    pub struct NewFile<'a> {
        pub fpath: &'a str,
        pub pkg: &'a str,
        pub sha256: &'a str,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = dirs)]
    pub struct NewDir<'a> {
        pub dir: &'a str,
        pub pkg: &'a str,
    }
}

/// Open connection to the registry database, plus the explicit transaction
/// state it's currently participating in (if any).
pub struct Registry {
    conn: SqliteConnection,
}

impl Registry {
    pub fn open(database_url: impl AsRef<Path>) -> Result<Self, Error> {
        let url = database_url.as_ref().to_string_lossy();
        let mut conn = SqliteConnection::establish(&url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|source| Error::Migration { source })?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, Error> {
        let mut conn = SqliteConnection::establish(":memory:")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|source| Error::Migration { source })?;
        Ok(Self { conn })
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        diesel::sql_query("BEGIN").execute(&mut self.conn)?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        diesel::sql_query("COMMIT").execute(&mut self.conn)?;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        diesel::sql_query("ROLLBACK").execute(&mut self.conn)?;
        Ok(())
    }

    pub fn has_pkg(&mut self, name: &str) -> Result<bool, Error> {
        use schema::pkgs::dsl;
        let count: i64 = dsl::pkgs
            .filter(dsl::pkg.eq(name))
            .count()
            .get_result(&mut self.conn)?;
        Ok(count > 0)
    }

    /// Inserts a `pkgs` row. Fails with [`Error::AlreadyInstalled`] if the
    /// name is already present (R4 enforcement at package-name level).
    pub fn record_pkg(&mut self, info: &PkgInfo) -> Result<(), Error> {
        if self.has_pkg(&info.name)? {
            return Err(Error::AlreadyInstalled { pkg: info.name.clone() });
        }
        let row = model::NewPkg {
            pkg: &info.name,
            version: info.version.as_deref(),
            release: info.release as i64,
        };
        diesel::insert_into(schema::pkgs::table)
            .values(&row)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn record_files(&mut self, pkg: &str, checksums: &BTreeMap<String, String>) -> Result<(), Error> {
        if checksums.is_empty() {
            return Ok(());
        }
        let rows: Vec<model::NewFile<'_>> = checksums
            .iter()
            .map(|(fpath, sha256)| model::NewFile { fpath, pkg, sha256 })
            .collect();
        diesel::insert_into(schema::files::table)
            .values(&rows)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn record_dirs(&mut self, pkg: &str, dirs: &[String]) -> Result<(), Error> {
        if dirs.is_empty() {
            return Ok(());
        }
        let rows: Vec<model::NewDir<'_>> = dirs.iter().map(|dir| model::NewDir { dir, pkg }).collect();
        diesel::insert_into(schema::dirs::table)
            .values(&rows)
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn which_pkg_owns_file(&mut self, path: &str) -> Result<Option<String>, Error> {
        use schema::files::dsl;
        Ok(dsl::files
            .filter(dsl::fpath.eq(path))
            .select(dsl::pkg)
            .first::<String>(&mut self.conn)
            .optional()?)
    }

    pub fn pkg_files_installed(&mut self, pkg: &str) -> Result<Vec<(String, String)>, Error> {
        use schema::files::dsl;
        Ok(dsl::files
            .filter(dsl::pkg.eq(pkg))
            .select((dsl::fpath, dsl::sha256))
            .load(&mut self.conn)?)
    }

    /// Every directory recorded for `pkg`, paired with its global reference
    /// count (how many packages, including this one, recorded it).
    pub fn pkg_dirs(&mut self, pkg: &str) -> Result<Vec<(String, i64)>, Error> {
        use schema::dirs::dsl;
        let owned: Vec<String> = dsl::dirs
            .filter(dsl::pkg.eq(pkg))
            .select(dsl::dir)
            .load(&mut self.conn)?;
        let mut out = Vec::with_capacity(owned.len());
        for dir in owned {
            let refcount: i64 = dsl::dirs
                .filter(dsl::dir.eq(&dir))
                .count()
                .get_result(&mut self.conn)?;
            out.push((dir, refcount));
        }
        Ok(out)
    }

    /// Deletes `pkg`'s `files` and `dirs` rows, then its `pkgs` row (R2).
    pub fn rm_pkg(&mut self, pkg: &str) -> Result<(), Error> {
        diesel::delete(schema::files::table.filter(schema::files::dsl::pkg.eq(pkg)))
            .execute(&mut self.conn)?;
        diesel::delete(schema::dirs::table.filter(schema::dirs::dsl::pkg.eq(pkg)))
            .execute(&mut self.conn)?;
        diesel::delete(schema::pkgs::table.filter(schema::pkgs::dsl::pkg.eq(pkg)))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn list_packages(&mut self) -> Result<Vec<(String, Option<String>, i64)>, Error> {
        use schema::pkgs::dsl;
        Ok(dsl::pkgs
            .select((dsl::pkg, dsl::version, dsl::release))
            .order(dsl::pkg.asc())
            .load(&mut self.conn)?)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] diesel::ConnectionError),
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),
    #[error("failed to run pending migrations")]
    Migration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("package '{pkg}' is already installed")]
    AlreadyInstalled { pkg: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_info(name: &str) -> PkgInfo {
        PkgInfo {
            name: name.to_string(),
            version: Some("1.0".into()),
            release: 1,
            description: "test".into(),
            sources: vec![],
            url: None,
        }
    }

    #[test]
    fn record_and_query_pkg() {
        let mut reg = Registry::open_in_memory().unwrap();
        reg.begin().unwrap();
        assert!(!reg.has_pkg("zlib").unwrap());
        reg.record_pkg(&sample_info("zlib")).unwrap();
        assert!(reg.has_pkg("zlib").unwrap());
        reg.commit().unwrap();

        let pkgs = reg.list_packages().unwrap();
        assert_eq!(pkgs, vec![("zlib".to_string(), Some("1.0".to_string()), 1)]);
    }

    #[test]
    fn duplicate_record_rejected() {
        let mut reg = Registry::open_in_memory().unwrap();
        reg.begin().unwrap();
        reg.record_pkg(&sample_info("zlib")).unwrap();
        let err = reg.record_pkg(&sample_info("zlib")).unwrap_err();
        assert!(matches!(err, Error::AlreadyInstalled { .. }));
        reg.rollback().unwrap();
    }

    #[test]
    fn dirs_refcount_and_rm_pkg() {
        let mut reg = Registry::open_in_memory().unwrap();
        reg.begin().unwrap();
        reg.record_pkg(&sample_info("a")).unwrap();
        reg.record_pkg(&sample_info("b")).unwrap();
        reg.record_dirs("a", &["/usr/lib".to_string()]).unwrap();
        reg.record_dirs("b", &["/usr/lib".to_string()]).unwrap();
        reg.commit().unwrap();

        reg.begin().unwrap();
        let dirs = reg.pkg_dirs("a").unwrap();
        assert_eq!(dirs, vec![("/usr/lib".to_string(), 2)]);
        reg.rm_pkg("a").unwrap();
        reg.commit().unwrap();

        reg.begin().unwrap();
        let dirs = reg.pkg_dirs("b").unwrap();
        assert_eq!(dirs, vec![("/usr/lib".to_string(), 1)]);
        reg.rollback().unwrap();
    }

    #[test]
    fn which_pkg_owns_file() {
        let mut reg = Registry::open_in_memory().unwrap();
        reg.begin().unwrap();
        reg.record_pkg(&sample_info("zlib")).unwrap();
        let mut checksums = BTreeMap::new();
        checksums.insert("/usr/lib/libz.so".to_string(), "deadbeef".to_string());
        reg.record_files("zlib", &checksums).unwrap();
        reg.commit().unwrap();

        assert_eq!(
            reg.which_pkg_owns_file("/usr/lib/libz.so").unwrap(),
            Some("zlib".to_string())
        );
        assert_eq!(reg.which_pkg_owns_file("/nope").unwrap(), None);
    }
}
