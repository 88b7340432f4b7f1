use chrono::Utc;
use sled::Db;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Report, User};

/// Storage layer errors. `EmailTaken` and `NotFound` are client-visible;
/// the rest map to server errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("record (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("email already registered: {0}")]
    EmailTaken(String),
    #[error("record not found")]
    NotFound,
}

/// Sled-backed store for users and reports.
///
/// Constructed once at process start and passed in wherever data access is
/// needed; no module holds a global handle. Records are serde_json-encoded,
/// one sled key per record, so every record write is atomic.
#[derive(Clone)]
pub struct Storage {
    #[allow(dead_code)] // kept for flush/close on shutdown
    db: Db,
    user_tree: sled::Tree,
    // Secondary index: email -> user id, enforces unique emails.
    email_tree: sled::Tree,
    report_tree: sled::Tree,
}

impl Storage {
    /// Open or create the database at the given path.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let user_tree = db.open_tree("users")?;
        let email_tree = db.open_tree("emails")?;
        let report_tree = db.open_tree("reports")?;
        Ok(Self {
            db,
            user_tree,
            email_tree,
            report_tree,
        })
    }

    // --- Users ---

    pub fn create_user(&self, user: User) -> Result<(), StorageError> {
        if self.email_tree.get(user.email.as_bytes())?.is_some() {
            return Err(StorageError::EmailTaken(user.email));
        }
        let bytes = serde_json::to_vec(&user)?;
        self.user_tree.insert(user.id.as_bytes(), bytes)?;
        self.email_tree
            .insert(user.email.as_bytes(), user.id.as_bytes().to_vec())?;
        Ok(())
    }

    pub fn get_user(&self, id: &Uuid) -> Result<Option<User>, StorageError> {
        match self.user_tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        match self.email_tree.get(email.as_bytes())? {
            Some(id_bytes) => {
                let id = Uuid::from_slice(&id_bytes).map_err(|_| StorageError::NotFound)?;
                self.get_user(&id)
            }
            None => Ok(None),
        }
    }

    /// Replace a user record; keeps the email index in sync if the address
    /// changed.
    pub fn update_user(&self, user: User) -> Result<(), StorageError> {
        let existing = self.get_user(&user.id)?.ok_or(StorageError::NotFound)?;
        if existing.email != user.email {
            if self.email_tree.get(user.email.as_bytes())?.is_some() {
                return Err(StorageError::EmailTaken(user.email));
            }
            self.email_tree.remove(existing.email.as_bytes())?;
            self.email_tree
                .insert(user.email.as_bytes(), user.id.as_bytes().to_vec())?;
        }
        let bytes = serde_json::to_vec(&user)?;
        self.user_tree.insert(user.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn delete_user(&self, id: &Uuid) -> Result<(), StorageError> {
        let existing = self.get_user(id)?.ok_or(StorageError::NotFound)?;
        self.email_tree.remove(existing.email.as_bytes())?;
        self.user_tree.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let mut users = vec![];
        for item in self.user_tree.iter() {
            let (_, v) = item?;
            users.push(serde_json::from_slice(&v)?);
        }
        Ok(users)
    }

    // --- Reports ---

    pub fn create_report(&self, report: &Report) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(report)?;
        self.report_tree.insert(report.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_report(&self, id: &Uuid) -> Result<Option<Report>, StorageError> {
        match self.report_tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Replace a report record in one write, bumping `updated_at`.
    pub fn update_report(&self, mut report: Report) -> Result<Report, StorageError> {
        if self.report_tree.get(report.id.as_bytes())?.is_none() {
            return Err(StorageError::NotFound);
        }
        report.updated_at = Utc::now();
        let bytes = serde_json::to_vec(&report)?;
        self.report_tree.insert(report.id.as_bytes(), bytes)?;
        Ok(report)
    }

    pub fn delete_report(&self, id: &Uuid) -> Result<(), StorageError> {
        if self.report_tree.remove(id.as_bytes())?.is_none() {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    pub fn list_reports(&self) -> Result<Vec<Report>, StorageError> {
        let mut reports = vec![];
        for item in self.report_tree.iter() {
            let (_, v) = item?;
            reports.push(serde_json::from_slice(&v)?);
        }
        Ok(reports)
    }
}
