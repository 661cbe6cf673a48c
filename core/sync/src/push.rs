//! Local to remote: publish relational rows as documents.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use reportsync_common::Result;
use reportsync_local::{LocalStore, Report, User};
use reportsync_remote::{DocumentData, DocumentStore};

use crate::photos::photos_payload;
use crate::summary::{Outcome, StepCounts};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// Publish every user that has an email.
pub async fn push_users(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
) -> Result<StepCounts> {
    let users = local.users()?;
    debug!("Pushing {} users", users.len());

    let mut counts = StepCounts::default();
    for user in &users {
        let result = push_user(remote, local, collection, user).await;
        counts.absorb(&format!("user {:?}", user.id), result)?;
    }

    info!(
        "Users pushed: {} created, {} updated, {} skipped",
        counts.created, counts.updated, counts.skipped
    );
    Ok(counts)
}

/// Document fields written for a user.
pub fn user_payload(user: &User) -> DocumentData {
    DocumentData::new()
        .with("email", user.email.clone())
        .with("firstName", user.first_name.clone())
        .with("lastName", user.last_name.clone())
        .with("role", user.role.clone())
        .server_timestamp(UPDATED_AT)
}

async fn push_user(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
    user: &User,
) -> Result<Outcome> {
    let Some(email) = user.email.as_deref().filter(|email| !email.is_empty()) else {
        debug!("User {:?} has no email, not pushed", user.id);
        return Ok(Outcome::Skipped);
    };
    let payload = user_payload(user);

    if let Some(uid) = user.usable_remote_uid() {
        return upsert_at(remote, collection, uid, payload).await;
    }

    let existing = remote
        .query_equal(collection, "email", &Value::from(email))
        .await?;
    let mut linked = user.clone();
    let outcome = match existing.first() {
        Some(doc) => {
            linked.remote_uid = Some(doc.id.clone());
            local.save_user(&linked)?;
            remote.update(collection, &doc.id, payload).await?;
            Outcome::Updated
        }
        None => {
            let id = remote
                .create(collection, payload.server_timestamp(CREATED_AT))
                .await?;
            linked.remote_uid = Some(id);
            local.save_user(&linked)?;
            Outcome::Created
        }
    };
    Ok(outcome)
}

/// Publish every report whose owner is linked remotely.
pub async fn push_reports(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
) -> Result<StepCounts> {
    let reports = local.reports()?;
    debug!("Pushing {} reports", reports.len());

    let mut counts = StepCounts::default();
    for report in &reports {
        let result = push_report(remote, local, collection, report).await;
        counts.absorb(&format!("report {:?}", report.id), result)?;
    }

    info!(
        "Reports pushed: {} created, {} updated, {} skipped",
        counts.created, counts.updated, counts.skipped
    );
    Ok(counts)
}

/// Document fields written for a report owned by `owner` (linked as `owner_uid`).
pub fn report_payload(report: &Report, owner: &User, owner_uid: &str, photos: Value) -> DocumentData {
    DocumentData::new()
        .with("userId", owner_uid)
        .with("userName", owner.display_name())
        .with("userEmail", owner.email.clone())
        .with("latitude", report.latitude)
        .with("longitude", report.longitude)
        .with("description", report.description.clone())
        .with("status", report.status.as_str())
        .with("surface", report.surface)
        .with("budget", report.budget)
        .with("photos", photos)
        .server_timestamp(UPDATED_AT)
}

async fn push_report(
    remote: &dyn DocumentStore,
    local: &dyn LocalStore,
    collection: &str,
    report: &Report,
) -> Result<Outcome> {
    let Some(owner) = local.user(report.user_id)? else {
        debug!("Owner of report {:?} not found", report.id);
        return Ok(Outcome::Skipped);
    };
    let Some(owner_uid) = owner.usable_remote_uid() else {
        debug!("Owner of report {:?} is not linked remotely", report.id);
        return Ok(Outcome::Skipped);
    };

    let photos = match report.id {
        Some(id) => local.photos_for_report(id)?,
        None => Vec::new(),
    };
    let payload = report_payload(report, &owner, owner_uid, photos_payload(&photos));

    let mut synced = report.clone();
    let outcome = match report.remote_id.as_deref().filter(|id| !id.is_empty()) {
        Some(remote_id) => upsert_at(remote, collection, remote_id, payload).await?,
        None => {
            let filters = [
                ("userId", Value::from(owner_uid)),
                ("latitude", Value::from(report.latitude)),
                ("longitude", Value::from(report.longitude)),
            ];
            let similar = remote.query_equal_all(collection, &filters).await?;
            match similar.first() {
                Some(doc) => {
                    remote.update(collection, &doc.id, payload).await?;
                    synced.remote_id = Some(doc.id.clone());
                    Outcome::Updated
                }
                None => {
                    let id = remote
                        .create(collection, payload.server_timestamp(CREATED_AT))
                        .await?;
                    synced.remote_id = Some(id);
                    Outcome::Created
                }
            }
        }
    };

    synced.synced_at = Some(Utc::now());
    local.save_report(&synced)?;
    Ok(outcome)
}

/// Update the document at `id`, or recreate it there when it is gone.
async fn upsert_at(
    remote: &dyn DocumentStore,
    collection: &str,
    id: &str,
    payload: DocumentData,
) -> Result<Outcome> {
    if remote.exists(collection, id).await? {
        remote.update(collection, id, payload).await?;
        Ok(Outcome::Updated)
    } else {
        debug!("Document {}/{} missing, recreating", collection, id);
        remote
            .set(collection, id, payload.server_timestamp(CREATED_AT))
            .await?;
        Ok(Outcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_payload_requests_update_timestamp() {
        let mut user = User::new("a@x.com");
        user.first_name = Some("Ada".to_string());
        let payload = user_payload(&user);

        assert_eq!(payload.fields()["email"], json!("a@x.com"));
        assert_eq!(payload.fields()["lastName"], Value::Null);
        assert_eq!(payload.server_timestamp_fields().to_vec(), vec![UPDATED_AT.to_string()]);
    }

    #[test]
    fn test_report_payload_fields() {
        let mut owner = User::new("a@x.com");
        owner.first_name = Some("Ada".to_string());
        owner.last_name = Some("Lovelace".to_string());
        let report = Report::new(1, 10.5, 20.25).with_description("pothole");

        let payload = report_payload(&report, &owner, "abc123", json!([]));
        let fields = payload.fields();

        assert_eq!(fields["userId"], json!("abc123"));
        assert_eq!(fields["userName"], json!("Ada Lovelace"));
        assert_eq!(fields["latitude"], json!(10.5));
        assert_eq!(fields["status"], json!("nouveau"));
        assert_eq!(fields["budget"], Value::Null);
        assert!(!fields.contains_key(CREATED_AT));
    }
}
