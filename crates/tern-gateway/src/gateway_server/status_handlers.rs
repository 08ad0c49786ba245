use super::*;

const TOOL_CATALOGUE: &[(&str, &str)] = &[
    ("bash", "Execute bash commands"),
    ("calculator", "Perform calculations"),
    ("datetime", "Get current date and time"),
    ("read_file", "Read file contents"),
    ("skill", "Call a skill"),
];

pub(super) async fn handle_health() -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": current_unix_timestamp_ms(),
    }))
    .into_response()
}

pub(super) async fn handle_tools() -> Response {
    let tools = TOOL_CATALOGUE
        .iter()
        .map(|(name, description)| json!({ "name": name, "description": description }))
        .collect::<Vec<_>>();
    Json(tools).into_response()
}
