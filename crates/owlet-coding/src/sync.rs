//! Remote snapshot refresh and feedback push.
//!
//! Thin glue between the API client and the state store. Any remote
//! failure propagates and aborts the run; rerunning is safe.

use tracing::info;

use owlet_client::ExperimenterClient;
use owlet_models::{AccountRecord, SessionRecord, StudySessions};
use owlet_store::StoreKey;

use crate::context::{CodingData, RunContext};
use crate::error::{CodingError, CodingResult};
use crate::sheets::AccountData;

/// Collection name holding a study's sessions.
fn session_collection(study: &str) -> String {
    format!("session{}s", study)
}

/// Fetch and snapshot all session records for a study. Returns the count.
pub async fn update_session_data(
    ctx: &RunContext,
    client: &ExperimenterClient,
    study: &str,
) -> CodingResult<usize> {
    let records = client.fetch_collection(&session_collection(study)).await?;
    let sessions: Vec<SessionRecord> = records
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()?;
    let count = sessions.len();

    ctx.store
        .save(
            &StoreKey::Sessions(study.to_string()),
            &StudySessions { sessions },
        )
        .await?;
    info!("Synced {} session records for study {}", count, study);
    Ok(count)
}

/// Fetch and snapshot all account records. Returns the count.
pub async fn update_account_data(
    ctx: &RunContext,
    client: &ExperimenterClient,
) -> CodingResult<usize> {
    let records = client.fetch_collection("accounts").await?;
    let mut accounts = AccountData::new();
    for record in &records {
        let account = AccountRecord::from_remote(record)
            .ok_or_else(|| CodingError::BadRemoteRecord(record.to_string()))?;
        accounts.insert(account.username.clone(), account);
    }
    let count = accounts.len();

    ctx.store.save(&StoreKey::Accounts, &accounts).await?;
    info!("Synced {} account records", count);
    Ok(count)
}

/// Push changed feedback from coding records back to the server.
///
/// Refreshes session data first so only genuinely new feedback is sent.
/// Commit feedback to the coding file (`commit_global`) before calling
/// this. Returns how many sessions were updated.
pub async fn send_feedback(
    ctx: &RunContext,
    client: &ExperimenterClient,
    study: &str,
) -> CodingResult<usize> {
    update_session_data(ctx, client, study).await?;

    let coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let sessions: StudySessions = ctx
        .store
        .load(&StoreKey::Sessions(study.to_string()))
        .await?;

    let mut sent = 0;
    for (session_key, record) in &coding {
        let Some(session) = sessions.find(session_key) else {
            continue;
        };
        if record.feedback != session.attributes.feedback {
            info!(
                "Updating feedback for session {}: \"{}\" -> \"{}\"",
                session_key, session.attributes.feedback, record.feedback
            );
            client
                .set_session_feedback(session_key.as_str(), &record.feedback)
                .await?;
            sent += 1;
        }
    }

    info!("Sent updated feedback for {} sessions of study {}", sent, study);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owlet_models::SessionKey;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::testutil::test_context;

    const STUDY: &str = "teststudy";

    #[tokio::test]
    async fn test_update_session_data_snapshots_records() {
        let (_dir, ctx, _tool) = test_context();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/id/collections/session{}s/documents", STUDY)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": format!("experimenter.session{}s.sess1", STUDY),
                    "attributes": {
                        "expData": {
                            "1-trial": {"videoId": "frag-a", "eventTimings": []}
                        },
                        "feedback": ""
                    }
                }],
                "links": {"next": null}
            })))
            .mount(&server)
            .await;

        let client = ExperimenterClient::new(server.uri(), "t").unwrap();
        let count = update_session_data(&ctx, &client, STUDY).await.unwrap();
        assert_eq!(count, 1);

        let sessions: StudySessions = ctx
            .store
            .load(&StoreKey::Sessions(STUDY.to_string()))
            .await
            .unwrap();
        let session = sessions.find(&SessionKey::new(STUDY, "sess1")).unwrap();
        assert_eq!(
            session.attributes.exp_data["1-trial"].video_id.as_deref(),
            Some("frag-a")
        );
    }

    #[tokio::test]
    async fn test_send_feedback_only_sends_changes() {
        let (_dir, ctx, _tool) = test_context();
        let server = MockServer::start().await;

        let unchanged_key = SessionKey::new(STUDY, "same");
        let changed_key = SessionKey::new(STUDY, "changed");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": unchanged_key.as_str(), "attributes": {"feedback": "Thanks!"}},
                    {"id": changed_key.as_str(), "attributes": {"feedback": ""}}
                ],
                "links": {"next": null}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/id/documents/{}", changed_key)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut coding = CodingData::new();
        let mut same = owlet_models::SessionCodingRecord::default();
        same.feedback = "Thanks!".to_string();
        coding.insert(unchanged_key, same);
        let mut changed = owlet_models::SessionCodingRecord::default();
        changed.feedback = "Great looking time!".to_string();
        coding.insert(changed_key, changed);
        ctx.store
            .save(&StoreKey::Coding(STUDY.to_string()), &coding)
            .await
            .unwrap();

        let client = ExperimenterClient::new(server.uri(), "t").unwrap();
        let sent = send_feedback(&ctx, &client, STUDY).await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn test_update_accounts_requires_well_formed_records() {
        let (_dir, ctx, _tool) = test_context();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"attributes": {}}],
                "links": {"next": null}
            })))
            .mount(&server)
            .await;

        let client = ExperimenterClient::new(server.uri(), "t").unwrap();
        let err = update_account_data(&ctx, &client).await.unwrap_err();
        assert!(matches!(err, CodingError::BadRemoteRecord(_)));
    }
}
