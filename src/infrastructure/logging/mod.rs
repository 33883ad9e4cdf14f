//! Tracing setup and secret masking

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LoggingConfig;

const MASK: &str = "***MASKED***";

/// HTTP client internals are only interesting when they fail
const NOISE_DIRECTIVES: &str = "hyper=error,reqwest=error,rustls=error,h2=error";

/// Filter from `RUST_LOG`, else the configured level with HTTP noise muted
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", level, NOISE_DIRECTIVES)))
}

/// Install the global subscriber: stdout plus an optional append-only log file.
///
/// Keep the returned guard alive for the life of the process, or buffered file
/// output is lost.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().unwrap_or(path.as_os_str());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }

    guard
}

/// First 10 characters of the token, then a mask
pub fn mask_token(token: &str) -> String {
    let head: String = token.chars().take(10).collect();
    format!("{}{}", head, MASK)
}

/// First 8 and last 4 characters of an address around a mask
pub fn mask_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 16 {
        return MASK.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(
            mask_token("123456789:ABCDEFGHIJ"),
            "123456789:***MASKED***"
        );
        assert_eq!(mask_token("abc"), "abc***MASKED***");
    }

    #[test]
    fn test_mask_address() {
        assert_eq!(
            mask_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
            "bc1qar0s***MASKED***5mdq"
        );
        assert_eq!(mask_address("1234567890123456"), "***MASKED***");
        assert_eq!(mask_address("12345678901234567"), "12345678***MASKED***4567");
    }
}
