//! Host-facing method and event channel payloads.
//!
//! Calls arrive as `{ "method": ..., "arguments": {...} }` and are answered
//! with a tagged [`MethodResponse`]. Events go out as serialized
//! [`RouteEvent`]s on [`EVENT_CHANNEL`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RouteError;
use crate::route::{RouteEvent, RouteSessionHandle, SwitchOutcome};
use crate::system::PickerAnchor;

pub const METHOD_CHANNEL: &str = "output_route_selector/methods";
pub const EVENT_CHANNEL: &str = "output_route_selector/events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success { result: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: Value) -> Self {
        MethodResponse::Success { result }
    }

    pub fn error(err: &RouteError) -> Self {
        MethodResponse::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeOutputArgs {
    device_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MenuArgs {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DialogArgs {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Default for DialogArgs {
    fn default() -> Self {
        let anchor = PickerAnchor::at(0.0, 0.0);
        Self {
            x: anchor.x,
            y: anchor.y,
            width: anchor.width,
            height: anchor.height,
        }
    }
}

/// Answer one method call against a running session.
pub async fn dispatch(handle: &RouteSessionHandle, call: MethodCall) -> MethodResponse {
    debug!("Method call on {}: {}", METHOD_CHANNEL, call.method);

    let result = match call.method.as_str() {
        "getAvailableAudioOutputs" => available_outputs(handle).await,
        "changeAudioOutput" => change_output(handle, &call.arguments).await,
        "showAudioOutputMenu" => show_menu(handle, &call.arguments),
        "showAudioOutputDialog" => show_dialog(handle, &call.arguments),
        other => {
            warn!("Method not implemented: {}", other);
            return MethodResponse::NotImplemented;
        }
    };

    match result {
        Ok(value) => MethodResponse::success(value),
        Err(e) => MethodResponse::error(&e),
    }
}

/// Serialize an event for the event channel.
pub fn encode_event(event: &RouteEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

async fn available_outputs(handle: &RouteSessionHandle) -> Result<Value, RouteError> {
    let outputs = handle.available_outputs().await?;
    to_value(&outputs)
}

async fn change_output(handle: &RouteSessionHandle, arguments: &Value) -> Result<Value, RouteError> {
    let args: ChangeOutputArgs = parse_arguments(arguments, "deviceTitle is required")?;
    let title = args.device_title.unwrap_or_default();

    match handle.change_audio_output(&title).await? {
        SwitchOutcome::Confirmed(device) => to_value(&device),
        SwitchOutcome::Undetermined | SwitchOutcome::Superseded => Ok(Value::Null),
    }
}

fn show_menu(handle: &RouteSessionHandle, arguments: &Value) -> Result<Value, RouteError> {
    const MISSING: &str = "x and y coordinates are required";
    let args: MenuArgs = parse_arguments(arguments, MISSING)?;
    let (Some(x), Some(y)) = (args.x, args.y) else {
        return Err(RouteError::InvalidArguments(MISSING.to_string()));
    };

    handle.show_picker(PickerAnchor::at(x, y))?;
    Ok(Value::Null)
}

fn show_dialog(handle: &RouteSessionHandle, arguments: &Value) -> Result<Value, RouteError> {
    let args: DialogArgs = parse_arguments(arguments, "Invalid dialog arguments")?;
    handle.show_picker(PickerAnchor {
        x: args.x,
        y: args.y,
        width: args.width,
        height: args.height,
    })?;
    Ok(Value::Null)
}

/// Missing arguments deserialize as the defaults; malformed ones are rejected.
fn parse_arguments<T>(arguments: &Value, message: &str) -> Result<T, RouteError>
where
    T: DeserializeOwned + Default,
{
    if arguments.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(arguments.clone()).map_err(|e| {
        debug!("Rejected method arguments {}: {}", arguments, e);
        RouteError::InvalidArguments(message.to_string())
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RouteError> {
    serde_json::to_value(value).map_err(|e| RouteError::ReadFailed(e.to_string()))
}
