use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::protocol::openai_chat::OpenAiUsage;

/// Map a configured level name to an `EnvFilter` directive.
///
/// `WARNING` and `CRITICAL` are accepted as aliases; `DISABLED` yields `None`.
#[must_use]
pub fn level_directive(log_level: &str) -> Option<&'static str> {
    match log_level.to_uppercase().as_str() {
        "DISABLED" => None,
        "DEBUG" => Some("debug"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" | "CRITICAL" => Some("error"),
        _ => Some("info"),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let Some(directive) = level_directive(log_level) else {
        return;
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Token usage for a finished completion.
pub fn log_usage(model: &str, usage: Option<&OpenAiUsage>) {
    match usage {
        Some(usage) => tracing::info!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            reasoning_tokens = usage
                .completion_tokens_details
                .as_ref()
                .and_then(|details| details.reasoning_tokens)
                .unwrap_or(0),
            "completion usage"
        ),
        None => tracing::debug!(model, "completion finished without usage metadata"),
    }
}

/// One line per handled request.
pub fn log_request_complete(method: &http::Method, path: &str, status: http::StatusCode, start: Instant) {
    tracing::info!(
        method = %method,
        path,
        status = status.as_u16(),
        duration_seconds = start.elapsed().as_secs_f64(),
        "request completed"
    );
}
