//! Credential records and rotation staging.
//!
//! The store never sees plaintext passwords: callers hand it the text form
//! of an envelope and get the same text back. Service and email are kept in
//! clear so listing and filtering work while the vault is locked.

use std::path::Path;

use cadenas_crypto_core::kdf::{SALT_LEN, VERIFIER_LEN};
use rusqlite::{params, OptionalExtension};

use crate::config_file::VaultConfig;
use crate::db::VaultDb;
use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A full credential row, ciphertext included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: i64,
    pub service: String,
    pub email: String,
    /// Text-encoded envelope of the password.
    pub ciphertext: String,
}

/// A credential as shown in listings; the ciphertext stays in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    pub id: i64,
    pub service: String,
    pub email: String,
}

impl CredentialSummary {
    /// Case-insensitive substring match on service or email.
    #[must_use]
    pub fn matches(&self, lowered_term: &str) -> bool {
        self.service.to_lowercase().contains(lowered_term)
            || self.email.to_lowercase().contains(lowered_term)
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Persistent credential table. Every mutation has committed by the time the
/// method returns.
#[derive(Debug)]
pub struct CredentialStore {
    db: VaultDb,
}

impl CredentialStore {
    /// Open the store at `path`, creating and migrating it as needed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on any database failure.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        Ok(Self {
            db: VaultDb::open(path)?,
        })
    }

    /// In-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on any database failure.
    pub fn open_in_memory() -> Result<Self, VaultError> {
        Ok(Self {
            db: VaultDb::open_in_memory()?,
        })
    }

    /// Insert a credential and return its new id.
    ///
    /// Ids come from `AUTOINCREMENT`, so an id freed by [`delete`](Self::delete)
    /// is never handed out again.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the insert fails.
    pub fn add(&self, service: &str, email: &str, ciphertext: &str) -> Result<i64, VaultError> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO credentials (service, email, encrypted_password) VALUES (?1, ?2, ?3)",
            params![service, email, ciphertext],
        )
        .map_err(|e| VaultError::Storage(format!("failed to insert credential: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` does not exist
    /// - [`VaultError::Storage`] if the query fails
    pub fn get(&self, id: i64) -> Result<CredentialRecord, VaultError> {
        self.db
            .connection()
            .query_row(
                "SELECT id, service, email, encrypted_password FROM credentials WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CredentialRecord {
                        id: row.get(0)?,
                        service: row.get(1)?,
                        email: row.get(2)?,
                        ciphertext: row.get(3)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => VaultError::NotFound(id),
                other => VaultError::Storage(format!("failed to load credential {id}: {other}")),
            })
    }

    /// All credentials in id order, without ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the query fails.
    pub fn list(&self) -> Result<Vec<CredentialSummary>, VaultError> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT id, service, email FROM credentials ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(CredentialSummary {
                id: row.get(0)?,
                service: row.get(1)?,
                email: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| VaultError::Storage(format!("failed to list credentials: {e}")))
    }

    /// Overwrite every column of an existing record.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` does not exist
    /// - [`VaultError::Storage`] if the update fails
    pub fn update(
        &self,
        id: i64,
        service: &str,
        email: &str,
        ciphertext: &str,
    ) -> Result<(), VaultError> {
        let rows = self
            .db
            .connection()
            .execute(
                "UPDATE credentials SET service = ?1, email = ?2, encrypted_password = ?3 \
                 WHERE id = ?4",
                params![service, email, ciphertext, id],
            )
            .map_err(|e| VaultError::Storage(format!("failed to update credential: {e}")))?;
        if rows == 0 {
            return Err(VaultError::NotFound(id));
        }
        Ok(())
    }

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` does not exist
    /// - [`VaultError::Storage`] if the delete fails
    pub fn delete(&self, id: i64) -> Result<(), VaultError> {
        let rows = self
            .db
            .connection()
            .execute("DELETE FROM credentials WHERE id = ?1", params![id])
            .map_err(|e| VaultError::Storage(format!("failed to delete credential: {e}")))?;
        if rows == 0 {
            return Err(VaultError::NotFound(id));
        }
        Ok(())
    }

    /// Records whose service or email contains `term`, ignoring case.
    ///
    /// An empty term matches everything. Passwords are never searched.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the query fails.
    pub fn filter(&self, term: &str) -> Result<Vec<CredentialSummary>, VaultError> {
        let needle = term.to_lowercase();
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.matches(&needle))
            .collect())
    }

    /// Number of stored credentials.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the query fails.
    pub fn count(&self) -> Result<usize, VaultError> {
        let n: i64 = self
            .db
            .connection()
            .query_row("SELECT count(*) FROM credentials", [], |row| row.get(0))?;
        usize::try_from(n).map_err(|_| VaultError::Storage(format!("invalid row count {n}")))
    }

    /// Every record with its ciphertext, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the query fails.
    pub fn all_records(&self) -> Result<Vec<CredentialRecord>, VaultError> {
        let mut stmt = self.db.connection().prepare(
            "SELECT id, service, email, encrypted_password FROM credentials ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CredentialRecord {
                id: row.get(0)?,
                service: row.get(1)?,
                email: row.get(2)?,
                ciphertext: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| VaultError::Storage(format!("failed to read credentials: {e}")))
    }

    // -----------------------------------------------------------------------
    // Rotation staging
    // -----------------------------------------------------------------------

    /// Record a rotation in progress: the configuration it will commit to and
    /// every re-encrypted ciphertext. Replaces any earlier staging. The live
    /// `credentials` rows are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the transaction fails; nothing is
    /// staged in that case.
    pub fn stage_rotation(
        &mut self,
        pending: &VaultConfig,
        reencrypted: &[(i64, String)],
    ) -> Result<(), VaultError> {
        let tx = self
            .db
            .connection_mut()
            .transaction()
            .map_err(|e| VaultError::Storage(format!("failed to begin staging: {e}")))?;

        tx.execute("DELETE FROM rotation_staging", [])?;
        tx.execute("DELETE FROM rotation_pending", [])?;
        tx.execute(
            "INSERT INTO rotation_pending (id, salt, verifier) VALUES (1, ?1, ?2)",
            params![pending.salt().as_slice(), pending.verifier().as_slice()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rotation_staging (credential_id, encrypted_password) VALUES (?1, ?2)",
            )?;
            for (id, ciphertext) in reencrypted {
                stmt.execute(params![id, ciphertext])?;
            }
        }

        tx.commit()
            .map_err(|e| VaultError::Storage(format!("failed to commit staging: {e}")))
    }

    /// The configuration a staged rotation is waiting for, if any.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the query fails or the stored
    /// salt/verifier have the wrong size.
    pub fn pending_rotation(&self) -> Result<Option<VaultConfig>, VaultError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .db
            .connection()
            .query_row(
                "SELECT salt, verifier FROM rotation_pending WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((salt, verifier)) = row else {
            return Ok(None);
        };
        let salt: [u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| VaultError::Storage("staged salt has wrong length".into()))?;
        let verifier: [u8; VERIFIER_LEN] = verifier
            .try_into()
            .map_err(|_| VaultError::Storage("staged verifier has wrong length".into()))?;
        Ok(Some(VaultConfig::from_parts(salt, verifier)))
    }

    /// Copy staged ciphertexts over the live rows and clear staging, in one
    /// transaction. Returns the number of records rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the transaction fails; staging is
    /// then left intact for the next attempt.
    pub fn apply_staged_rotation(&mut self) -> Result<usize, VaultError> {
        let tx = self
            .db
            .connection_mut()
            .transaction()
            .map_err(|e| VaultError::Storage(format!("failed to begin rotation apply: {e}")))?;

        let updated = tx.execute(
            "UPDATE credentials SET encrypted_password = ( \
                 SELECT s.encrypted_password FROM rotation_staging s \
                 WHERE s.credential_id = credentials.id) \
             WHERE id IN (SELECT credential_id FROM rotation_staging)",
            [],
        )?;
        tx.execute("DELETE FROM rotation_staging", [])?;
        tx.execute("DELETE FROM rotation_pending", [])?;

        tx.commit()
            .map_err(|e| VaultError::Storage(format!("failed to commit rotation apply: {e}")))?;
        Ok(updated)
    }

    /// Drop any staged rotation without touching live rows.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the transaction fails.
    pub fn discard_staged_rotation(&mut self) -> Result<(), VaultError> {
        let tx = self
            .db
            .connection_mut()
            .transaction()
            .map_err(|e| VaultError::Storage(format!("failed to begin discard: {e}")))?;
        tx.execute("DELETE FROM rotation_staging", [])?;
        tx.execute("DELETE FROM rotation_pending", [])?;
        tx.commit()
            .map_err(|e| VaultError::Storage(format!("failed to commit discard: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
