//! Remote to local: import documents into relational rows.

use chrono::Utc;
use tracing::{debug, info, warn};

use reportsync_common::{ReportStatus, Result};
use reportsync_local::{LocalStore, Report, User};
use reportsync_remote::{Document, DocumentStore};

use crate::photos::reconcile_photos;
use crate::resolver::{IdentityResolver, ReportMatch, UserMatch};
use crate::summary::{Outcome, StepCounts};

/// Import every user document.
///
/// Matched rows only take the fields the document carries; unmatched
/// documents become new rows.
pub async fn pull_users(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
) -> Result<StepCounts> {
    let documents = remote.get_all(collection).await?;
    debug!("Pulling {} user documents", documents.len());

    let mut counts = StepCounts::default();
    for doc in &documents {
        let result = pull_user(local, doc);
        counts.absorb(&format!("user document {}", doc.id), result)?;
    }

    info!(
        "Users pulled: {} created, {} updated, {} skipped",
        counts.created, counts.updated, counts.skipped
    );
    Ok(counts)
}

fn pull_user(local: &dyn LocalStore, doc: &Document) -> Result<Outcome> {
    let resolver = IdentityResolver::new(local);
    let (mut user, outcome) = match resolver.resolve_user(doc)? {
        UserMatch::Linked(user) => (user, Outcome::Updated),
        UserMatch::ByEmail(mut user) => {
            user.remote_uid = Some(doc.id.clone());
            (user, Outcome::Updated)
        }
        UserMatch::Unmatched => (User::linked(doc.id.as_str()), Outcome::Created),
    };

    merge_user(&mut user, doc);
    local.save_user(&user)?;
    Ok(outcome)
}

/// Overwrite the user fields present in the document.
pub fn merge_user(user: &mut User, doc: &Document) {
    if let Some(email) = doc.string("email") {
        user.email = Some(email.to_string());
    }
    if let Some(first_name) = doc.string("firstName") {
        user.first_name = Some(first_name.to_string());
    }
    if let Some(last_name) = doc.string("lastName") {
        user.last_name = Some(last_name.to_string());
    }
    if let Some(role) = doc.string("role") {
        user.role = role.to_string();
    }
}

/// Import every report document, with its photos.
pub async fn pull_reports(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
) -> Result<StepCounts> {
    let documents = remote.get_all(collection).await?;
    debug!("Pulling {} report documents", documents.len());

    let mut counts = StepCounts::default();
    for doc in &documents {
        let result = pull_report(local, doc).map(|(outcome, photos)| {
            counts.photos += photos;
            outcome
        });
        counts.absorb(&format!("report document {}", doc.id), result)?;
    }

    info!(
        "Reports pulled: {} created, {} updated, {} skipped, {} photos",
        counts.created, counts.updated, counts.skipped, counts.photos
    );
    Ok(counts)
}

fn pull_report(local: &dyn LocalStore, doc: &Document) -> Result<(Outcome, u32)> {
    let resolver = IdentityResolver::new(local);
    let (mut report, outcome) = match resolver.resolve_report(doc)? {
        ReportMatch::Linked(report) => (report, Outcome::Updated),
        ReportMatch::ByNaturalKey(mut report) => {
            report.remote_id = Some(doc.id.clone());
            (report, Outcome::Updated)
        }
        ReportMatch::Unmatched { owner } => {
            let (Some(owner_id), Some(latitude), Some(longitude)) =
                (owner.id, doc.number("latitude"), doc.number("longitude"))
            else {
                warn!("Report document {} has no usable position", doc.id);
                return Ok((Outcome::Skipped, 0));
            };
            let mut report = Report::new(owner_id, latitude, longitude);
            report.remote_id = Some(doc.id.clone());
            (report, Outcome::Created)
        }
        ReportMatch::OwnerMissing => {
            debug!("Owner of report document {} not found locally", doc.id);
            return Ok((Outcome::Skipped, 0));
        }
    };

    merge_report(&mut report, doc);
    let saved = local.save_report(&report)?;
    let photos = match saved.id {
        Some(report_id) => reconcile_photos(local, report_id, doc) as u32,
        None => 0,
    };
    Ok((outcome, photos))
}

/// Overwrite the report fields present in the document and stamp `synced_at`.
pub fn merge_report(report: &mut Report, doc: &Document) {
    if let Some(description) = doc.string("description") {
        report.description = Some(description.to_string());
    }
    if let Some(raw) = doc.string("status") {
        match raw.parse::<ReportStatus>() {
            Ok(status) => report.status = status,
            Err(e) => warn!("Ignoring status of {}: {}", doc.id, e),
        }
    }
    if let Some(latitude) = doc.number("latitude") {
        report.latitude = latitude;
    }
    if let Some(longitude) = doc.number("longitude") {
        report.longitude = longitude;
    }
    if let Some(surface) = doc.number("surface") {
        report.surface = Some(surface);
    }
    if let Some(budget) = doc.number("budget") {
        report.budget = Some(budget);
    }
    report.synced_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportsync_local::DEFAULT_ROLE;
    use serde_json::{json, Value};

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_merge_user_keeps_absent_fields() {
        let mut user = User::new("a@x.com");
        user.first_name = Some("Ada".to_string());
        user.role = "admin".to_string();

        merge_user(&mut user, &doc("u1", json!({"lastName": "Lovelace", "firstName": null})));

        assert_eq!(user.first_name.as_deref(), Some("Ada"));
        assert_eq!(user.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(user.role, "admin");
    }

    #[test]
    fn test_new_user_gets_default_role() {
        let mut user = User::linked("u1");
        merge_user(&mut user, &doc("u1", json!({"email": "a@x.com"})));
        assert_eq!(user.role, DEFAULT_ROLE);
    }

    #[test]
    fn test_merge_report_ignores_malformed_fields() {
        let mut report = Report::new(1, 1.0, 2.0);
        report.status = ReportStatus::EnCours;
        report.budget = Some(100.0);

        merge_report(
            &mut report,
            &doc("r1", json!({"status": "lost", "budget": "n/a", "surface": "12.5", "latitude": 3})),
        );

        assert_eq!(report.status, ReportStatus::EnCours);
        assert_eq!(report.budget, Some(100.0));
        assert_eq!(report.surface, Some(12.5));
        assert_eq!(report.latitude, 3.0);
        assert!(report.synced_at.is_some());
    }
}
