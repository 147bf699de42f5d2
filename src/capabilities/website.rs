//! Website Availability
//!
//! Toggles a store's online ordering website through the store settings
//! API. All failures are reported as `{status: "failed"}` payloads so the
//! model can still phrase a reply.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::{Capability, CapabilityDeclaration, CapabilityError, ExecutionContext, ToolResponse};

/// Wire format of `offline_until`
pub const OFFLINE_UNTIL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const USER_AGENT: &str = concat!("storebot/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const NAME: &str = "set_website_availability";

/// Switches the ordering website online or offline
#[derive(Debug, Clone)]
pub struct SetWebsiteAvailability {
    client: Client,
}

impl SetWebsiteAvailability {
    pub fn new() -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CapabilityError::Init(e.to_string()))?;

        Ok(Self { client })
    }

    async fn apply(&self, arguments: &Map<String, Value>, context: &ExecutionContext) -> Result<Value, String> {
        let missing = context.missing_fields();
        if !missing.is_empty() {
            return Err(format!(
                "Invalid 'config' object. Missing: {}",
                missing.join(", ")
            ));
        }

        let offline_until = string_arg(arguments, "offline_until");
        let offline_until = resolve_offline_until(&offline_until, Local::now().naive_local())?;

        let online = parse_online_flag(arguments.get("is_website_online"))?;
        let offline_message = string_arg(arguments, "offline_message");

        let url = format!(
            "{}/settings/{}",
            context.endpoint.trim_end_matches('/'),
            context.store_id
        );
        debug!("Updating website status: url={}, online={}, until={}", url, online, offline_until);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, &context.authorization_header)
            .header("passport", "1")
            .form(&[
                ("online", online),
                ("online_closed_till", offline_until.as_str()),
                ("online_msg", offline_message.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("API error: {}", status.as_u16()));
        }

        info!("Website for store {} set online={}", context.store_id, online);

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Invalid API response: {}", e))
    }
}

#[async_trait]
impl Capability for SetWebsiteAvailability {
    fn declaration(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(
            NAME,
            "This function changes the state of a website to either online or offline, designed for quick adjustments to the website's availability status.",
        )
        .with_enum_param(
            "is_website_online",
            "Sets the website's status. 'true' for online, 'false' for offline.",
            &["true", "false"],
            true,
        )
        .with_param(
            "offline_until",
            serde_json::json!({
                "type": "string",
                "format": "date-time",
                "description": "Specifies the datetime until the website remains offline. Defaults to 5am the next day if offline; otherwise, an empty string."
            }),
            true,
        )
        .with_string_param(
            "offline_message",
            "Custom message displayed when the website is offline. Defaults to a general notice about returning online at 5am the next day.",
            true,
        )
        .with_context(
            "Intended for toggling the website's availability. Not for content updates, non-availability messages, or setting holiday closures.",
        )
    }

    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        context: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        Ok(match self.apply(&arguments, context).await {
            Ok(body) => ToolResponse::success(body),
            Err(reason) => {
                error!("{} {}", NAME, reason);
                ToolResponse::failed(reason)
            }
        }
        .into_value())
    }
}

fn string_arg(arguments: &Map<String, Value>, key: &str) -> String {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Accepts `"true"`/`"false"` or a JSON bool
fn parse_online_flag(value: Option<&Value>) -> Result<&'static str, String> {
    match value {
        Some(Value::Bool(true)) => Ok("true"),
        Some(Value::Bool(false)) => Ok("false"),
        Some(Value::String(s)) if s == "true" => Ok("true"),
        Some(Value::String(s)) if s == "false" => Ok("false"),
        _ => Err("Invalid 'is_website_online' value. Please use 'true' or 'false'.".to_string()),
    }
}

/// 05:00 on the day after `now`
pub fn next_day_5am(now: NaiveDateTime) -> Option<NaiveDateTime> {
    now.date().succ_opt()?.and_hms_opt(5, 0, 0)
}

/// Empty input defaults to [`next_day_5am`]; anything else must parse with
/// [`OFFLINE_UNTIL_FORMAT`] and lie after `now`.
pub fn resolve_offline_until(raw: &str, now: NaiveDateTime) -> Result<String, String> {
    let until = if raw.is_empty() {
        next_day_5am(now).ok_or_else(|| "Could not compute default 'offline_until'".to_string())?
    } else {
        NaiveDateTime::parse_from_str(raw, OFFLINE_UNTIL_FORMAT).map_err(|_| {
            "Invalid 'offline_until' value. Please use a valid date-time format.".to_string()
        })?
    };

    if until < now {
        return Err("Invalid 'offline_until' value. The date-time must be in the future.".to_string());
    }

    Ok(until.format(OFFLINE_UNTIL_FORMAT).to_string())
}
