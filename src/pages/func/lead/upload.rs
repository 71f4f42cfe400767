use std::collections::HashMap;

use axum::{extract::State, http::HeaderMap, Json};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Store, StoreError},
    libs::{
        dser::deserialize_empty_to_none,
        gen_id,
        time::{TimeFormat, TIME},
    },
    pages::User,
    parse_jwt_macro, patch,
    perm::{self, authorize, Action, Team},
    AppState, Response, ResponseResult,
};

use super::{Lead, LeadType};

/// 单次上传的最大条数
pub const MAX_UPLOAD_RECORDS: usize = 1000;

lazy_static! {
    static ref TEN_DIGITS: Regex = Regex::new(r"^\d{10}$").expect("phone regex");
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRecord {
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    customer_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    customer_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    configuration: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    remark: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    assign_to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadError {
    pub record_index: usize,
    pub phone: Option<String>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Duplicate {
    pub record_index: usize,
    pub phone: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub upload_id: String,
    pub total: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub error_details: Vec<UploadError>,
    pub duplicate_details: Vec<Duplicate>,
}

impl UploadReport {
    fn error(&mut self, record_index: usize, phone: Option<String>, reason: impl Into<String>) {
        self.errors += 1;
        self.error_details.push(UploadError {
            record_index,
            phone,
            reason: reason.into(),
        });
    }
}

/// 逐条处理上传记录
///
/// 手机号全局去重，同一批次中先插入的记录也参与比较。
/// 记录之间没有事务，中途失败时已插入的记录保留。
pub fn process_upload(
    store: &dyn Store,
    uploader: &User,
    team: &Team,
    lead_type: LeadType,
    date: &str,
    records: &[Value],
) -> Result<UploadReport, Response> {
    let time = TIME::now()?;
    let upload_id = gen_id(&time, &uploader.id);
    store.insert(
        Database::LEAD_UPLOADS,
        patch! {
            "id" => upload_id.as_str(),
            "user_id" => uploader.id.as_str(),
            "upload_type" => lead_type.as_str(),
            "total_records" => records.len(),
            "inserted" => 0,
            "duplicates" => 0,
            "error_count" => 0,
            "error_details" => Value::Null,
            "status" => "processing",
            "created_at" => time.format(TimeFormat::YYYYMMDD_HHMMSS),
        },
    )?;
    let mut report = UploadReport {
        upload_id,
        total: records.len(),
        inserted: 0,
        duplicates: 0,
        errors: 0,
        error_details: Vec::new(),
        duplicate_details: Vec::new(),
    };
    if let Err(e) = process_records(store, uploader, team, lead_type, date, records, &mut report) {
        mark_failed(store, &report);
        return Err(e);
    }
    let details = serde_json::to_string(&report.error_details)?;
    store.update(
        Database::LEAD_UPLOADS,
        &[Filter::eq("id", report.upload_id.as_str())],
        patch! {
            "inserted" => report.inserted,
            "duplicates" => report.duplicates,
            "error_count" => report.errors,
            "error_details" => details,
            "status" => "completed",
        },
    )?;
    tracing::info!(
        "upload {} by {}: {} inserted, {} duplicates, {} errors",
        report.upload_id,
        uploader.id,
        report.inserted,
        report.duplicates,
        report.errors
    );
    Ok(report)
}

/// 按顺序处理每条记录，存储不可用时立即返回
fn process_records(
    store: &dyn Store,
    uploader: &User,
    team: &Team,
    lead_type: LeadType,
    date: &str,
    records: &[Value],
    report: &mut UploadReport,
) -> Result<(), Response> {
    for (i, value) in records.iter().enumerate() {
        let record: UploadRecord = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                report.error(i, None, e.to_string());
                continue;
            }
        };
        let (Some(name), Some(phone)) = (record.customer_name, record.customer_number) else {
            let phone = value["customerNumber"].as_str().map(String::from);
            report.error(i, phone, "Customer name and number are required");
            continue;
        };
        if !TEN_DIGITS.is_match(&phone) {
            report.error(i, Some(phone), "Phone must be 10 digits");
            continue;
        }
        if store.count(Database::LEADS, &[Filter::eq("phone", phone.as_str())])? > 0 {
            report.duplicates += 1;
            report.duplicate_details.push(Duplicate {
                record_index: i,
                phone,
                name,
            });
            continue;
        }
        let time = TIME::now()?;
        let mut lead = Lead::new(&time, lead_type, name, phone, &uploader.id);
        lead.date = Some(date.to_owned());
        lead.configuration = record.configuration;
        lead.location = record.location;
        lead.remark = record.remark;
        let assignee = record
            .assign_to
            .as_deref()
            .and_then(|a| team.find(a))
            .map(|m| m.id.clone());
        lead.assign(assignee, &time);
        lead.uploaded_by = Some(uploader.id.clone());
        lead.upload_batch_id = Some(report.upload_id.clone());
        lead.is_uploaded_record = true;
        match store.insert_as(Database::LEADS, &lead) {
            Ok(_) => report.inserted += 1,
            Err(StoreError::Unavailable(e)) => return Err(Response::dependency(e)),
            Err(e) => report.error(i, Some(lead.phone), e.to_string()),
        }
    }
    Ok(())
}

/// 中途失败时记录已处理的数量，更新失败只写日志
fn mark_failed(store: &dyn Store, report: &UploadReport) {
    let details = serde_json::to_string(&report.error_details).unwrap_or_default();
    let marked = store.update(
        Database::LEAD_UPLOADS,
        &[Filter::eq("id", report.upload_id.as_str())],
        patch! {
            "inserted" => report.inserted,
            "duplicates" => report.duplicates,
            "error_count" => report.errors,
            "error_details" => details,
            "status" => "failed",
        },
    );
    match marked {
        Ok(_) => tracing::warn!("upload {} failed after {} inserts", report.upload_id, report.inserted),
        Err(e) => tracing::warn!("failed to mark upload {} as failed: {e}", report.upload_id),
    }
}

#[derive(Deserialize)]
struct UploadParams {
    #[serde(rename = "type", default)]
    lead_type: String,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    date: Option<String>,
    #[serde(default)]
    records: Option<Vec<Value>>,
}

pub async fn upload_leads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::UploadLeads)?;
    let data: UploadParams = serde_json::from_value(value)?;
    let records = data.records.unwrap_or_default();
    if records.is_empty() {
        return Err(Response::invalid_value("Records array is required"));
    }
    if records.len() > MAX_UPLOAD_RECORDS {
        return Err(Response::invalid_value("Maximum 1000 records per upload"));
    }
    let lead_type = op::some!(
        LeadType::parse(&data.lead_type);
        ret Err(Response::invalid_value("Type must be either \"lead\" or \"data\""))
    );
    let date = match data.date {
        Some(d) => d,
        None => TIME::now()?.format(TimeFormat::YYYYMMDD),
    };
    let store = &*state.store;
    let team = perm::resolve_team(store, &actor.id)?;
    let report = process_upload(store, &actor, &team, lead_type, &date, &records)?;
    Ok(Response::created(json!(report)))
}

/// CSV 表头：Type, Date, Customer Name, Customer Number, Configuration, Remark, Assign to
pub fn process_csv(
    store: &dyn Store,
    creator: &User,
    team: &Team,
    content: &str,
) -> Result<Vec<Value>, Response> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut results = Vec::new();
    for record in reader.deserialize::<HashMap<String, String>>() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                results.push(json!({"success": false, "error": e.to_string()}));
                continue;
            }
        };
        let field = |k: &str| record.get(k).filter(|v| !v.is_empty()).cloned();
        let lead_type = match field("Type").map(|t| LeadType::parse(&t)) {
            None => LeadType::Lead,
            Some(Some(t)) => t,
            Some(None) => {
                let error = "Type must be either \"lead\" or \"data\"";
                results.push(json!({"success": false, "error": error, "record": record}));
                continue;
            }
        };
        let (Some(name), Some(phone)) = (field("Customer Name"), field("Customer Number")) else {
            results.push(json!({"success": false, "error": "Customer name and number are required", "record": record}));
            continue;
        };
        let time = TIME::now()?;
        let mut lead = Lead::new(&time, lead_type, name, phone, &creator.id);
        lead.date = field("Date");
        lead.configuration = field("Configuration");
        lead.remark = field("Remark");
        let assignee = field("Assign to")
            .and_then(|p| team.members().iter().find(|m| m.phone == p))
            .map(|m| m.id.clone());
        lead.assign(assignee, &time);
        match store.insert_as(Database::LEADS, &lead) {
            Ok(lead) => results.push(json!({"success": true, "data": lead})),
            Err(e) => results.push(json!({"success": false, "error": e.to_string(), "record": record})),
        }
    }
    Ok(results)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvParams {
    #[serde(default)]
    csv_content: String,
}

pub async fn bulk_create_leads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::CreateLeads)?;
    let data: CsvParams = serde_json::from_value(value)?;
    if data.csv_content.trim().is_empty() {
        return Err(Response::invalid_value("CSV content is required"));
    }
    let store = &*state.store;
    let team = perm::resolve_team(store, &actor.id)?;
    let results = process_csv(store, &actor, &team, &data.csv_content)?;
    let success = results.iter().filter(|r| r["success"] == json!(true)).count();
    tracing::info!("{} bulk created {} of {} leads", actor.id, success, results.len());
    Ok(Response::ok(json!({
        "total": results.len(),
        "success": success,
        "failed": results.len() - success,
        "results": results,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::MemoryStore, perm::Role};

    fn setup() -> (MemoryStore, User, Team) {
        let store = MemoryStore::new();
        for (id, phone, role, parent) in [
            ("a", "9100000001", "admin", None),
            ("e", "9100000002", "employee", Some("a")),
            ("x", "9100000003", "employee", None),
        ] {
            store
                .insert(
                    Database::USERS,
                    patch! {"id" => id, "name" => id, "phone" => phone, "role" => role, "parent_id" => parent,
                        "is_active" => true, "created_at" => "2024-01-01 00:00:00"},
                )
                .unwrap();
        }
        let team = perm::resolve_team(&store as &dyn Store, "a").unwrap();
        let admin = User {
            id: "a".into(),
            role: Role::Admin,
            is_active: true,
            ..Default::default()
        };
        (store, admin, team)
    }

    #[test]
    fn upload_counts_inserts_duplicates_and_errors() {
        let (store, admin, team) = setup();
        let records = vec![
            json!({"customerName": "Ravi", "customerNumber": "9876543210", "assignTo": "9100000002"}),
            json!({"customerName": "Ravi again", "customerNumber": "9876543210"}),
            json!({"customerName": "Short", "customerNumber": "12345"}),
        ];
        let report =
            process_upload(&store, &admin, &team, LeadType::Data, "2024-01-05", &records).unwrap();
        assert_eq!((report.inserted, report.duplicates, report.errors), (1, 1, 1));
        assert_eq!(report.duplicate_details[0].record_index, 1);
        assert_eq!(report.error_details[0].record_index, 2);
        assert_eq!(report.error_details[0].reason, "Phone must be 10 digits");

        let lead: Lead = (&store as &dyn Store)
            .first_as(Database::LEADS, &[Filter::eq("phone", "9876543210")])
            .unwrap()
            .unwrap();
        assert_eq!(lead.assigned_to.as_deref(), Some("e"));
        assert_eq!(lead.upload_batch_id.as_deref(), Some(report.upload_id.as_str()));
        assert!(lead.is_uploaded_record);

        let upload = store
            .select(Database::LEAD_UPLOADS, &[Filter::eq("id", report.upload_id.as_str())], None)
            .unwrap()
            .remove(0);
        assert_eq!(upload["status"], "completed");
        assert_eq!(upload["inserted"], 1);
    }

    #[test]
    fn assignee_outside_team_is_left_unassigned() {
        let (store, admin, team) = setup();
        let records = vec![
            json!({"customerName": "Meera", "customerNumber": "9876500000", "assignTo": "x"}),
            json!({"customerNumber": "9876500001"}),
        ];
        let report =
            process_upload(&store, &admin, &team, LeadType::Lead, "2024-01-05", &records).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.error_details[0].reason, "Customer name and number are required");
        assert_eq!(report.error_details[0].phone.as_deref(), Some("9876500001"));
        let lead: Lead = (&store as &dyn Store)
            .first_as(Database::LEADS, &[Filter::eq("phone", "9876500000")])
            .unwrap()
            .unwrap();
        assert!(lead.assigned_to.is_none());
        assert!(lead.assigned_at.is_none());
    }

    #[test]
    fn upload_is_marked_failed_when_the_store_goes_away() {
        let (inner, admin, team) = setup();
        let store = crate::database::UnavailableTable {
            inner,
            table: Database::LEADS,
        };
        let records = vec![
            json!({"customerName": "Short", "customerNumber": "123"}),
            json!({"customerName": "Meera", "customerNumber": "9876500000"}),
        ];
        let err = process_upload(&store, &admin, &team, LeadType::Lead, "2024-01-05", &records).unwrap_err();
        assert_eq!(err.code(), axum::http::StatusCode::BAD_GATEWAY);
        let upload = store.inner.select(Database::LEAD_UPLOADS, &[], None).unwrap().remove(0);
        assert_eq!(upload["status"], "failed");
        assert_eq!(upload["error_count"], 1);
        assert_eq!(upload["inserted"], 0);
    }

    #[test]
    fn csv_rows_report_individually() {
        let (store, admin, team) = setup();
        let csv = "Type,Date,Customer Name,Customer Number,Configuration,Remark,Assign to\n\
                   data,2024-01-02,Anil,9000000010,2BHK,call later,9100000002\n\
                   website,2024-01-02,Bad,9000000011,,,\n\
                   ,2024-01-03,,9000000012,,,\n";
        let results = process_csv(&store, &admin, &team, csv).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["success"], true);
        assert_eq!(results[0]["data"]["type"], "data");
        assert_eq!(results[0]["data"]["assigned_to"], "e");
        assert_eq!(results[1]["success"], false);
        assert_eq!(results[2]["error"], "Customer name and number are required");
    }
}
