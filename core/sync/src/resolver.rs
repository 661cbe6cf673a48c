//! Matching remote documents to relational rows.

use tracing::debug;

use reportsync_common::Result;
use reportsync_local::{LocalStore, Report, User};
use reportsync_remote::Document;

/// How a user document relates to the relational store.
#[derive(Debug, Clone, PartialEq)]
pub enum UserMatch {
    /// Row already linked to the document ID.
    Linked(User),
    /// Row found by email; its `remote_uid` still has to be set.
    ByEmail(User),
    /// No row represents this document.
    Unmatched,
}

/// How a report document relates to the relational store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportMatch {
    /// Row already linked to the document ID.
    Linked(Report),
    /// Row of the same owner with the same position and description.
    ByNaturalKey(Report),
    /// No matching row; the owner is known so one can be created.
    Unmatched { owner: User },
    /// Neither `userId` nor `userEmail` leads to a local user.
    OwnerMissing,
}

/// Finds the relational row a remote document stands for.
///
/// Only exact equality is used. Coordinates that differ in the last digit do
/// not match.
pub struct IdentityResolver<'a> {
    local: &'a dyn LocalStore,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(local: &'a dyn LocalStore) -> Self {
        Self { local }
    }

    /// Match on `remote_uid`, then on email.
    pub fn resolve_user(&self, doc: &Document) -> Result<UserMatch> {
        if let Some(user) = self.local.user_by_remote_uid(&doc.id)? {
            return Ok(UserMatch::Linked(user));
        }

        if let Some(email) = doc.string("email") {
            if let Some(user) = self.local.user_by_email(email)? {
                debug!("User document {} matched by email", doc.id);
                return Ok(UserMatch::ByEmail(user));
            }
        }

        Ok(UserMatch::Unmatched)
    }

    /// Owner of a report document: embedded `userId`, then `userEmail`.
    pub fn resolve_owner(&self, doc: &Document) -> Result<Option<User>> {
        if let Some(uid) = doc.string("userId") {
            if let Some(user) = self.local.user_by_remote_uid(uid)? {
                return Ok(Some(user));
            }
        }

        match doc.string("userEmail") {
            Some(email) => self.local.user_by_email(email),
            None => Ok(None),
        }
    }

    /// Match on `remote_id`, then on (owner, latitude, longitude, description).
    pub fn resolve_report(&self, doc: &Document) -> Result<ReportMatch> {
        if let Some(report) = self.local.report_by_remote_id(&doc.id)? {
            return Ok(ReportMatch::Linked(report));
        }

        let Some(owner) = self.resolve_owner(doc)? else {
            return Ok(ReportMatch::OwnerMissing);
        };
        let Some(owner_id) = owner.id else {
            return Ok(ReportMatch::OwnerMissing);
        };

        if let (Some(latitude), Some(longitude)) = (doc.number("latitude"), doc.number("longitude"))
        {
            let similar = self.local.report_by_natural_key(
                owner_id,
                latitude,
                longitude,
                doc.string("description"),
            )?;
            if let Some(report) = similar {
                debug!("Report document {} matched by position", doc.id);
                return Ok(ReportMatch::ByNaturalKey(report));
            }
        }

        Ok(ReportMatch::Unmatched { owner })
    }
}
