//! CSV coding sheets: export for human coders, commit of their edits.
//!
//! One row per session. The `id` column re-associates edited rows on
//! import; only columns named `<field>.<coder>` are coder-writable, all
//! others are informational. Unknown session ids on import are logged and
//! ignored; a missing sheet on commit is a hard error, since committing
//! requires the sheet a human was supposed to have edited.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use owlet_models::{AccountRecord, SessionKey, StudySessions};
use owlet_store::{backup_file, StoreKey};

use crate::coding::coder_fields;
use crate::context::{CodingData, RunContext};
use crate::error::{CodingError, CodingResult};

/// The account snapshot: username -> record.
pub type AccountData = BTreeMap<String, AccountRecord>;

/// One sheet row: column -> cell text.
pub type SheetRow = BTreeMap<String, String>;

/// Flatten a JSON value into dotted column names.
///
/// Objects recurse (`a.b.c`), arrays and scalars become their JSON text,
/// bare strings keep their content unquoted.
pub fn flatten_value(prefix: &str, value: &Value, out: &mut SheetRow) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let child = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_value(&child, inner, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

fn leading_headers(
    ctx: &RunContext,
    coder: &str,
    show_other_coders: bool,
    headers_seen: &BTreeSet<String>,
    include_fields: &[String],
    study_fields: &[String],
) -> Vec<String> {
    let mut headers: Vec<String> = ["id", "meta.created-on", "consent", "usable", "feedback"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    for field in coder_fields() {
        if coder == "all" {
            headers.extend(
                headers_seen
                    .iter()
                    .filter(|h| h.starts_with(&format!("{}.", field)))
                    .cloned(),
            );
        } else {
            headers.push(format!("{}.{}", field, coder));
            if show_other_coders {
                for other in &ctx.config.coders {
                    if other != coder {
                        headers.push(format!("{}.{}", field, other));
                    }
                }
            }
        }
    }

    headers.extend(
        [
            "attributes.feedback",
            "attributes.hasReadFeedback",
            "attributes.completed",
            "videosExpected",
            "videosFound",
            "nVideosFound",
            "child.profileId",
            "child.birthday",
            "child.gender",
            "child.deleted",
        ]
        .iter()
        .map(|h| h.to_string()),
    );
    headers.extend(study_fields.iter().cloned());
    headers.extend(include_fields.iter().cloned());
    headers
}

fn build_row(
    record_key: &SessionKey,
    coding: &owlet_models::SessionCodingRecord,
    sessions: &StudySessions,
    accounts: &AccountData,
    include_fields: &[String],
) -> CodingResult<SheetRow> {
    let mut row = SheetRow::new();

    flatten_value("", &serde_json::to_value(coding)?, &mut row);

    if let Some(session) = sessions.find(record_key) {
        flatten_value("attributes", &serde_json::to_value(&session.attributes)?, &mut row);
        for (key, value) in &session.extra {
            flatten_value(key, value, &mut row);
        }

        // Pull in the child profile this session points at.
        let profile_id = &session.attributes.profile_id;
        if let Some(username) = profile_id.split('.').next() {
            if let Some(profile) = accounts
                .get(username)
                .and_then(|account| account.profile(profile_id))
            {
                flatten_value("child", &serde_json::to_value(profile)?, &mut row);
            }
        }
    }

    row.insert("id".to_string(), record_key.to_string());
    row.insert("nVideosFound".to_string(), coding.n_videos_found().to_string());

    // Fields requested by ending: move the matching column's data under the
    // bare ending, so the column name is stable across frame numbering.
    for ending in include_fields {
        let matching: Option<String> = row
            .keys()
            .find(|key| key.ends_with(ending.as_str()) && *key != ending)
            .cloned();
        if let Some(key) = matching {
            let value = row.remove(&key).unwrap_or_default();
            row.insert(ending.clone(), value);
        }
    }

    Ok(row)
}

/// Generate the CSV coding sheet for a study and coder.
///
/// `coder` may be `all` to show every coder's columns. `filter` restricts
/// rows to sessions whose column equals the given value. Returns the sheet
/// path.
pub async fn generate_codesheet(
    ctx: &RunContext,
    study: &str,
    coder: &str,
    show_other_coders: bool,
    show_all_headers: bool,
    filter: &BTreeMap<String, String>,
) -> CodingResult<PathBuf> {
    if coder != "all" && !ctx.config.is_coder(coder) {
        return Err(CodingError::UnknownCoder(coder.to_string()));
    }

    let coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let sessions: StudySessions = ctx
        .store
        .load(&StoreKey::Sessions(study.to_string()))
        .await?;
    let accounts: AccountData = ctx.store.load(&StoreKey::Accounts).await?;
    let config = ctx.study_config(study);

    let mut rows = Vec::new();
    let mut headers_seen = BTreeSet::new();
    for (key, record) in &coding {
        let row = build_row(key, record, &sessions, &accounts, &config.include_fields)?;
        if !filter
            .iter()
            .all(|(column, value)| row.get(column).map(|v| v == value).unwrap_or(false))
        {
            continue;
        }
        headers_seen.extend(row.keys().cloned());
        rows.push(row);
    }

    let mut headers = leading_headers(
        ctx,
        coder,
        show_other_coders,
        &headers_seen,
        &config.include_fields,
        &config.study_fields,
    );
    headers.retain(|h| h == "id" || headers_seen.contains(h) || h.contains('.'));
    if show_all_headers {
        let known: BTreeSet<&String> = headers.iter().collect();
        let mut rest: Vec<String> = headers_seen
            .iter()
            .filter(|h| !known.contains(h))
            .cloned()
            .collect();
        rest.sort();
        headers.extend(rest);
    }

    let path = ctx.config.codesheet_path(study, coder);
    write_sheet(ctx, &path, &headers, &rows).await?;
    info!("Wrote coding sheet {} ({} rows)", path.display(), rows.len());
    Ok(path)
}

async fn write_sheet(
    ctx: &RunContext,
    path: &PathBuf,
    headers: &[String],
    rows: &[SheetRow],
) -> CodingResult<()> {
    if path.exists() {
        backup_file(path, &ctx.config.sheet_backup_root()).await?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        let cells: Vec<&str> = headers
            .iter()
            .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
            .collect();
        writer.write_record(cells)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_sheet(path: &PathBuf) -> CodingResult<Vec<SheetRow>> {
    if !path.exists() {
        return Err(CodingError::SheetMissing(path.clone()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(|c| c.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// Commit a coder's edits to their coder-specific columns.
///
/// Values are added when nonempty and updated whenever they differ (even to
/// empty). Returns the number of cells applied.
pub async fn commit_coding(ctx: &RunContext, study: &str, coder: &str) -> CodingResult<usize> {
    if !ctx.config.is_coder(coder) {
        return Err(CodingError::UnknownCoder(coder.to_string()));
    }

    let mut coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let rows = read_sheet(&ctx.config.codesheet_path(study, coder))?;

    let mut applied = 0;
    for row in rows {
        let Some(id) = row.get("id") else {
            continue;
        };
        let key = SessionKey::from(id.as_str());
        let Some(record) = coding.get_mut(&key) else {
            warn!("Session in coding sheet but not in coding data, ignoring: {}", id);
            continue;
        };

        for field in coder_fields() {
            let column = format!("{}.{}", field, coder);
            let Some(value) = row.get(&column) else {
                warn!("Missing expected column in coding sheet: {}", column);
                continue;
            };
            match record.coder_comments.get(coder) {
                None => {
                    if !value.is_empty() {
                        info!("Adding {} for session {}: \"{}\"", column, id, value);
                        record.coder_comments.insert(coder.to_string(), value.clone());
                        applied += 1;
                    }
                }
                Some(current) if current != value => {
                    info!(
                        "Updating {} for session {}: \"{}\" -> \"{}\"",
                        column, id, current, value
                    );
                    record.coder_comments.insert(coder.to_string(), value.clone());
                    applied += 1;
                }
                Some(_) => {}
            }
        }
    }

    ctx.store
        .save(&StoreKey::Coding(study.to_string()), &coding)
        .await?;
    Ok(applied)
}

/// Commit global (non-coder-specific) columns from a coder's sheet, e.g.
/// consent / usable / feedback. Values update unconditionally.
pub async fn commit_global(
    ctx: &RunContext,
    study: &str,
    coder: &str,
    columns: &[String],
) -> CodingResult<usize> {
    let mut coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let rows = read_sheet(&ctx.config.codesheet_path(study, coder))?;

    let mut applied = 0;
    for row in rows {
        let Some(id) = row.get("id") else {
            continue;
        };
        let key = SessionKey::from(id.as_str());
        let Some(record) = coding.get_mut(&key) else {
            warn!("Session in coding sheet but not in coding data, ignoring: {}", id);
            continue;
        };

        for column in columns {
            let value = row
                .get(column)
                .ok_or_else(|| CodingError::MissingColumn(column.clone()))?;
            if record.field(column).as_deref() != Some(value.as_str()) {
                info!("Updating {} for session {}: \"{}\"", column, id, value);
            }
            if !record.set_field(column, value) {
                return Err(CodingError::MissingColumn(column.clone()));
            }
            applied += 1;
        }
    }

    ctx.store
        .save(&StoreKey::Coding(study.to_string()), &coding)
        .await?;
    Ok(applied)
}

/// Export all account data as a CSV sheet.
///
/// Child profiles are expanded to `child<N>.<field>` columns; those come
/// after the regular account columns.
pub async fn export_accounts(ctx: &RunContext) -> CodingResult<PathBuf> {
    let accounts: AccountData = ctx.store.load(&StoreKey::Accounts).await?;

    let mut rows = Vec::new();
    let mut account_headers = BTreeSet::new();
    let mut child_headers = BTreeSet::new();

    for (username, account) in &accounts {
        let mut row = SheetRow::new();
        for (key, value) in &account.extra {
            flatten_value(key, value, &mut row);
        }
        account_headers.extend(row.keys().cloned());

        for (index, profile) in account.profiles.iter().enumerate() {
            let prefix = format!("child{}", index);
            let before: BTreeSet<String> = row.keys().cloned().collect();
            flatten_value(&prefix, &serde_json::to_value(profile)?, &mut row);
            child_headers.extend(row.keys().filter(|k| !before.contains(*k)).cloned());
        }

        row.insert("username".to_string(), username.clone());
        rows.push(row);
    }

    let mut headers = vec!["username".to_string()];
    headers.extend(account_headers);
    headers.extend(child_headers);

    let path = ctx.config.accountsheet_path();
    write_sheet(ctx, &path, &headers, &rows).await?;
    info!("Exported {} accounts to {}", rows.len(), path.display());
    Ok(path)
}
