mod client;

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub use self::client::PropertyClient;

use crate::{
    bearer,
    database::{Database, Filter},
    libs::{check::Checker, dser::deserialize_empty_to_none, parse_multipart},
    parse_jwt_macro,
    perm::{authorize, Action},
    AppState, Response, ResponseResult,
};

use super::lead::Lead;

pub fn property_router() -> Router<AppState> {
    Router::new()
        .route("/properties", get(get_properties).post(create_property))
        .route("/properties/summary", get(get_summary))
        .route("/properties/bulk", post(bulk_upload))
        .route(
            "/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/properties/:id/share", post(share_property))
}

/// 去掉空格、横线和加号，缺少国家码时补 91
pub fn whatsapp_phone(phone: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
        .collect();
    op::ternary!(digits.starts_with("91") => digits; format!("91{digits}"))
}

/// 分享给客户的房源消息
pub fn share_message(property: &Value, url: &str) -> String {
    let text = |k: &str| property[k].as_str().filter(|s| !s.is_empty());
    let mut message = format!("🏠 *{}*\n\n", text("title").unwrap_or("Property"));
    message.push_str(&format!("📍 Location: {}\n", text("location").unwrap_or("-")));
    message.push_str(&format!("🏗️ Type: {}\n", text("property_type").unwrap_or("-")));
    if let Some(possession) = text("possession") {
        message.push_str(&format!("🗓️ Possession: {possession}\n"));
    }
    if let Some(units) = text("units_line") {
        message.push_str(&format!("🛏️ {units}\n"));
    }
    message.push_str(&format!("\n📱 View full details: {url}\n\nContact us for site visit!"));
    message
}

pub fn whatsapp_link(phone: &str, message: &str) -> String {
    format!(
        "https://wa.me/{}?text={}",
        whatsapp_phone(phone),
        urlencoding::encode(message)
    )
}

async fn get_properties(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    Ok(Response::ok(state.properties.list().await?))
}

async fn get_summary(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    Ok(Response::ok(state.properties.summary().await?))
}

async fn get_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    Ok(Response::ok(state.properties.get(&id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewProperty {
    #[serde(default)]
    project_name: String,
    #[serde(default)]
    builders: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    configuration: String,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    possession: String,
    #[serde(default)]
    contact_us: String,
}

impl NewProperty {
    fn check(&self) -> Result<(), Response> {
        let price = match &self.price {
            Value::String(s) => s.trim().to_owned(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        Checker::new()
            .non_empty("projectName", &self.project_name)
            .non_empty("builders", &self.builders)
            .non_empty("location", &self.location)
            .non_empty("configuration", &self.configuration)
            .non_empty("price", &price)
            .non_empty("possession", &self.possession)
            .non_empty("contactUs", &self.contact_us)
            .finish()
    }
}

async fn create_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::MutateProperties)?;
    let data: NewProperty = serde_json::from_value(value.clone())?;
    data.check()?;
    let property = state.properties.create(&value).await?;
    tracing::info!("{} created property {}", actor.id, data.project_name);
    Ok(Response::created(property).with_message("Property created successfully"))
}

async fn update_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::MutateProperties)?;
    let property = state.properties.update(&id, &value).await?;
    Ok(Response::ok(property).with_message("Property updated successfully"))
}

async fn delete_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::MutateProperties)?;
    state.properties.delete(&id).await?;
    tracing::info!("{} deleted property {}", actor.id, id);
    Ok(Response::ok(json!({"id": id})).with_message("Property deleted successfully"))
}

async fn bulk_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    part: Multipart,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::MutateProperties)?;
    let part = parse_multipart(part).await?;
    let file = op::some!(part.files.into_iter().next(); ret Err(Response::invalid_value("Excel file is required")));
    let result = state.properties.bulk(file).await?;
    let message = result["message"].as_str().unwrap_or("Bulk upload completed").to_owned();
    Ok(Response::ok(result).with_message(message))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareParams {
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    lead_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    phone_number: Option<String>,
}

/// 优先使用客户的手机号，其次是请求中的号码
async fn share_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    let data: ShareParams = serde_json::from_value(value)?;
    let phone = match (data.lead_id, data.phone_number) {
        (Some(lead_id), _) => {
            let lead: Lead = op::some!(
                state.store.first_as(Database::LEADS, &[Filter::eq("id", lead_id)])?;
                ret Err(Response::not_exist("Lead not found"))
            );
            lead.phone
        }
        (None, Some(phone)) => phone,
        (None, None) => {
            return Err(Response::invalid_value("Either phoneNumber or leadId is required"))
        }
    };
    let property = state.properties.get(&id).await?;
    let url = format!(
        "{}/properties/{}",
        state.properties.base_url(),
        urlencoding::encode(&id)
    );
    let message = share_message(&property, &url);
    Ok(Response::ok(json!({
        "whatsappLink": whatsapp_link(&phone, &message),
        "property": property,
        "message": message,
    }))
    .with_message("WhatsApp share link generated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_is_normalized_for_india() {
        assert_eq!(whatsapp_phone("+91 98765-43210"), "919876543210");
        assert_eq!(whatsapp_phone("98765 43210"), "919876543210");
        assert_eq!(whatsapp_phone("919876543210"), "919876543210");
    }

    #[test]
    fn link_carries_encoded_message() {
        let property = json!({"title": "Sky Towers", "location": "Pune", "property_type": "Flat"});
        let message = share_message(&property, "http://upstream/properties/7");
        assert!(message.starts_with("🏠 *Sky Towers*"));
        assert!(!message.contains("Possession"));
        let link = whatsapp_link("+91-98765 43210", &message);
        assert!(link.starts_with("https://wa.me/919876543210?text="));
        assert!(!link.contains(' '));
        assert!(link.contains("Sky%20Towers"));
    }

    #[test]
    fn property_fields_are_required() {
        let data: NewProperty = serde_json::from_value(json!({
            "projectName": "Sky", "builders": "B", "location": "Pune", "configuration": "2BHK",
            "price": 75, "possession": "2026", "contactUs": ""
        }))
        .unwrap();
        let err = data.check().unwrap_err();
        assert_eq!(json!(err)["details"][0]["field"], "contactUs");
    }
}
