use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Row},
    libs::{
        check::Checker,
        time::{TimeFormat, TIME},
    },
    parse_jwt_macro,
    perm::{authorize, Action},
    schedule, AppState, ResponseResult,
};

use super::{find_lead, Lead, LeadStatus};

#[derive(Debug, Default, Deserialize)]
struct LeadPatch {
    name: Option<String>,
    phone: Option<String>,
    configuration: Option<String>,
    location: Option<String>,
    remark: Option<String>,
    status: Option<LeadStatus>,
}

impl LeadPatch {
    fn check(&self) -> Result<(), crate::Response> {
        let mut checker = Checker::new();
        if let Some(name) = &self.name {
            checker.len("name", name, 2, 100);
        }
        if let Some(phone) = &self.phone {
            checker.len("phone", phone, 10, 15);
        }
        checker.finish()
    }
    /// 只包含请求中出现的字段
    fn into_row(self, now: &str) -> Row {
        let mut row = Row::new();
        let fields = [
            ("name", self.name),
            ("phone", self.phone),
            ("configuration", self.configuration),
            ("location", self.location),
            ("remark", self.remark),
        ];
        for (k, v) in fields {
            if let Some(v) = v {
                row.insert(k.into(), json!(v));
            }
        }
        if let Some(status) = self.status {
            row.insert("status".into(), json!(status.as_str()));
        }
        row.insert("updated_at".into(), json!(now));
        row
    }
}

/// 状态可以改为任意合法值，不校验流转顺序
pub async fn update_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: LeadPatch = serde_json::from_value(value)?;
    data.check()?;
    let store = &*state.store;
    let lead = find_lead(store, &id)?;
    authorize(
        &actor,
        Action::UpdateLead {
            assigned_to: lead.assigned_to.as_deref(),
            created_by: &lead.created_by,
        },
    )?;
    let remark = data.remark.clone().filter(|r| !r.trim().is_empty());
    let time = TIME::now()?;
    let lead: Lead = store.update_by_id(
        Database::LEADS,
        &id,
        data.into_row(&time.format(TimeFormat::YYYYMMDD_HHMMSS)),
    )?;
    if let Some(remark) = remark {
        schedule::sync_remark_soft(store, &lead.id, &remark, time.date());
    }
    Ok(crate::Response::ok(json!(lead)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::header::AUTHORIZATION;

    use super::*;
    use crate::{
        database::{Filter, MemoryStore, Store, UnavailableTable},
        patch,
        perm::Role,
        token::generate_jwt,
        Config,
    };

    #[tokio::test]
    async fn failed_reschedule_does_not_fail_the_update() {
        let inner = MemoryStore::new();
        inner
            .insert(
                Database::USERS,
                patch! {"id" => "o", "name" => "Owner", "phone" => "9000000000", "role" => "owner",
                    "is_active" => true, "created_at" => "2024-01-01 00:00:00"},
            )
            .unwrap();
        inner
            .insert(
                Database::LEADS,
                patch! {"id" => "l", "type" => "lead", "name" => "Ravi", "phone" => "9876543210",
                    "status" => "new", "created_by" => "o", "created_at" => "2024-01-01 00:00:00"},
            )
            .unwrap();
        let store = UnavailableTable {
            inner,
            table: Database::MEETINGS,
        };
        let state = AppState::new(Arc::new(store), Config::with_secret("s"));
        let token = generate_jwt("s", "o", Role::Owner, 1).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());

        let remark = "Meeting on 5th Feb at 2 PM";
        let resp = update_lead(
            State(state.clone()),
            headers,
            Path("l".to_owned()),
            Json(json!({"remark": remark, "status": "interested"})),
        )
        .await
        .unwrap();
        assert_eq!(resp.data()["remark"], remark);
        let lead: Lead = state
            .store
            .first_as(Database::LEADS, &[Filter::eq("id", "l")])
            .unwrap()
            .unwrap();
        assert_eq!(lead.remark.as_deref(), Some(remark));
        assert_eq!(lead.status, LeadStatus::Interested);
    }

    #[test]
    fn patch_keeps_only_sent_fields() {
        let data: LeadPatch =
            serde_json::from_value(json!({"remark": "call back", "status": "prospect"})).unwrap();
        let row = data.into_row("2024-01-01 10:00:00");
        assert_eq!(row.len(), 3);
        assert_eq!(row["status"], "prospect");
        assert!(!row.contains_key("name"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let data: Result<LeadPatch, _> = serde_json::from_value(json!({"status": "won"}));
        assert!(data.is_err());
        let short = LeadPatch {
            phone: Some("123".into()),
            ..Default::default()
        };
        assert!(short.check().is_err());
    }
}
