mod trash;
mod update;
pub mod upload;

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order},
    libs::{
        check::Checker,
        dser::{deserialize_empty_to_none, deserialize_flexible_bool},
        gen_id, parse_query,
        time::{parse_date, TimeFormat, TIME},
    },
    parse_jwt_macro,
    perm::{self, authorize, lead_scope, Action},
    AppState, Response, ResponseResult,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Interested,
    NotInterested,
    Prospect,
    Converted,
    Spam,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Interested,
        LeadStatus::NotInterested,
        LeadStatus::Prospect,
        LeadStatus::Converted,
        LeadStatus::Spam,
    ];
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::Prospect => "prospect",
            LeadStatus::Converted => "converted",
            LeadStatus::Spam => "spam",
        }
    }
}

/// lead 为网站客户，data 为市场数据
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadType {
    #[default]
    Lead,
    Data,
}

impl LeadType {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadType::Lead => "lead",
            LeadType::Data => "data",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lead" => Some(LeadType::Lead),
            "data" => Some(LeadType::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(rename = "type")]
    pub lead_type: LeadType,
    #[serde(default)]
    pub date: Option<String>,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<String>,
    pub created_by: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub upload_batch_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub is_uploaded_record: bool,
}

impl Lead {
    /// 新客户，状态为 new
    pub fn new(time: &TIME, lead_type: LeadType, name: String, phone: String, created_by: &str) -> Self {
        Self {
            id: gen_id(time, &phone),
            lead_type,
            name,
            phone,
            created_by: created_by.to_owned(),
            created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
            ..Default::default()
        }
    }
    pub fn assign(&mut self, user_id: Option<String>, time: &TIME) {
        self.assigned_at = user_id
            .as_ref()
            .map(|_| time.format(TimeFormat::YYYYMMDD_HHMMSS));
        self.assigned_to = user_id;
    }
}

/// 按 id 查询未删除的客户
pub(crate) fn find_lead(store: &dyn crate::database::Store, id: &str) -> Result<Lead, Response> {
    let lead: Lead = op::some!(
        store.first_as(Database::LEADS, &[Filter::eq("id", id), Filter::IsNull("deleted_at")])?;
        ret Err(Response::not_exist("Lead not found"))
    );
    Ok(lead)
}

/// 给每条记录附上所属客户的概要 `lead`
pub(crate) fn attach_leads<T: Serialize>(
    store: &dyn crate::database::Store,
    items: &[T],
) -> Result<Vec<Value>, Response> {
    let mut values: Vec<Value> = items.iter().map(|i| json!(i)).collect();
    let ids: Vec<String> = values
        .iter()
        .filter_map(|v| v["lead_id"].as_str().map(String::from))
        .collect();
    if ids.is_empty() {
        return Ok(values);
    }
    let leads: Vec<Lead> = store.select_as(Database::LEADS, &[Filter::is_in("id", ids)], None)?;
    let leads: HashMap<&str, &Lead> = leads.iter().map(|l| (l.id.as_str(), l)).collect();
    for value in values.iter_mut() {
        let summary = value["lead_id"]
            .as_str()
            .and_then(|id| leads.get(id))
            .map(|l| {
                json!({"id": l.id, "name": l.name, "phone": l.phone, "status": l.status,
                    "configuration": l.configuration, "location": l.location})
            });
        if let Some(object) = value.as_object_mut() {
            object.insert("lead".into(), summary.unwrap_or(Value::Null));
        }
    }
    Ok(values)
}

pub fn lead_router() -> Router<AppState> {
    Router::new()
        .route("/leads", post(create_lead).get(get_leads))
        .route("/leads/bulk", post(upload::bulk_create_leads))
        .route("/leads/upload", post(upload::upload_leads))
        .route("/leads/assign", post(assign_lead))
        .route("/leads/trash", get(trash::get_trash))
        .route("/leads/:id", patch(update::update_lead).delete(trash::soft_delete_lead))
        .route("/leads/:id/restore", patch(trash::restore_lead))
        .route("/leads/:id/permanent", delete(trash::purge_lead))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewLead {
    #[serde(rename = "type")]
    lead_type: LeadType,
    date: String,
    name: String,
    phone: String,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    configuration: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    remark: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    assigned_to: Option<String>,
}

async fn create_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::CreateLeads)?;
    let data: NewLead = serde_json::from_value(value)?;
    Checker::new()
        .check(parse_date(&data.date).is_some(), "date", "Date must be in YYYY-MM-DD format")
        .len("name", &data.name, 2, 100)
        .len("phone", &data.phone, 10, 15)
        .finish()?;
    let store = &*state.store;
    if let Some(assignee) = &data.assigned_to {
        let team = perm::resolve_team(store, &actor.id)?;
        authorize(
            &actor,
            Action::AssignLead {
                assignee,
                team: &team,
            },
        )?;
    }
    let time = TIME::now()?;
    let mut lead = Lead::new(&time, data.lead_type, data.name, data.phone, &actor.id);
    lead.date = Some(data.date);
    lead.configuration = data.configuration;
    lead.location = data.location;
    lead.remark = data.remark;
    lead.assign(data.assigned_to, &time);
    let lead = store.insert_as(Database::LEADS, &lead)?;
    tracing::info!("{} created lead {}", actor.id, lead.id);
    Ok(Response::created(json!(lead)))
}

#[derive(Deserialize)]
struct LeadQuery {
    #[serde(rename = "type", default)]
    lead_type: Option<LeadType>,
    #[serde(default)]
    status: Option<LeadStatus>,
}

async fn get_leads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let query: LeadQuery = parse_query(params)?;
    let mut filters = vec![Filter::IsNull("deleted_at")];
    filters.extend(lead_scope(&actor));
    if let Some(t) = query.lead_type {
        filters.push(Filter::eq("type", t.as_str()));
    }
    if let Some(s) = query.status {
        filters.push(Filter::eq("status", s.as_str()));
    }
    let leads: Vec<Lead> = state
        .store
        .select_as(Database::LEADS, &filters, Order::desc("created_at"))?;
    Ok(Response::ok(json!(leads)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignParams {
    lead_id: String,
    assigned_to: String,
}

async fn assign_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: AssignParams = serde_json::from_value(value)?;
    let store = &*state.store;
    let team = perm::resolve_team(store, &actor.id)?;
    authorize(
        &actor,
        Action::AssignLead {
            assignee: &data.assigned_to,
            team: &team,
        },
    )?;
    find_lead(store, &data.lead_id)?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let lead: Lead = store.update_by_id(
        Database::LEADS,
        &data.lead_id,
        crate::patch! {"assigned_to" => data.assigned_to, "assigned_at" => now.as_str(), "updated_at" => now.as_str()},
    )?;
    tracing::info!("{} assigned lead {} to {}", actor.id, lead.id, data.assigned_to);
    Ok(Response::ok(json!(lead)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_rows_round_trip_through_the_store_shape() {
        let row = json!({
            "id": "l1", "type": "data", "date": "2024-01-02", "name": "Ravi", "phone": "9000000001",
            "status": "not_interested", "created_by": "a", "created_at": "2024-01-02 10:00:00",
            "is_uploaded_record": 1
        });
        let lead: Lead = serde_json::from_value(row).unwrap();
        assert_eq!(lead.lead_type, LeadType::Data);
        assert_eq!(lead.status, LeadStatus::NotInterested);
        assert!(lead.is_uploaded_record);
        let value = json!(lead);
        assert_eq!(value["type"], "data");
        assert_eq!(value["status"], "not_interested");
    }

    #[test]
    fn status_names_match_their_wire_form() {
        for status in LeadStatus::ALL {
            assert_eq!(json!(status), json!(status.as_str()));
        }
        assert_eq!(LeadType::parse(" Data "), Some(LeadType::Data));
        assert_eq!(LeadType::parse("website"), None);
    }

    #[test]
    fn assignment_stamps_time_only_when_assigned() {
        let time = TIME::now().unwrap();
        let mut lead = Lead::new(&time, LeadType::Lead, "Ravi".into(), "9000000001".into(), "a");
        lead.assign(None, &time);
        assert!(lead.assigned_at.is_none());
        lead.assign(Some("e".into()), &time);
        assert_eq!(lead.assigned_to.as_deref(), Some("e"));
        assert!(lead.assigned_at.is_some());
    }
}
