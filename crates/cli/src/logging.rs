use crate::config::{LoggingConfig, RedactionConfig};
use regex::Regex;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Masks the directory API key in request URLs and anything shaped like an
/// e-mail address (API keys are e-mail addresses).
const DEFAULT_PII_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)(apiKey=)[^&\s]+", "${1}[REDACTED]"),
    (r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", "[EMAIL]"),
];

struct RedactingWriter<W> {
    inner: W,
    patterns: Vec<(Regex, String)>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = redact(&s, &self.patterns);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter {
    patterns: Vec<(Regex, String)>,
}

impl<'a> fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    fn make_writer(&self) -> Self::Writer {
        RedactingWriter {
            inner: io::stderr(),
            patterns: self.patterns.clone(),
        }
    }
}

fn redact(text: &str, patterns: &[(Regex, String)]) -> String {
    let mut redacted = text.to_string();
    for (re, replacement) in patterns {
        redacted = re.replace_all(&redacted, replacement.as_str()).to_string();
    }
    redacted
}

fn build_patterns(config: &RedactionConfig) -> Vec<(Regex, String)> {
    let mut patterns = Vec::new();
    if !config.enabled {
        return patterns;
    }
    if config.use_default_pii {
        for (re, placeholder) in DEFAULT_PII_PATTERNS {
            if let Ok(re) = Regex::new(re) {
                patterns.push((re, placeholder.to_string()));
            }
        }
    }
    for p in &config.patterns {
        match Regex::new(&p.regex) {
            Ok(re) => patterns.push((re, p.placeholder.clone())),
            Err(e) => eprintln!("warning: ignoring redaction pattern {}: {}", p.name, e),
        }
    }
    patterns
}

/// Most verbose level enabled in config, as an `EnvFilter` directive.
fn level_directive(config: &LoggingConfig) -> &'static str {
    if config.verbose {
        return "debug";
    }
    let levels = &config.levels;
    let mut level = "off";
    if levels.critical {
        level = "error";
    }
    if levels.error {
        level = "error";
    }
    if levels.warning {
        level = "warn";
    }
    if levels.info {
        level = "info";
    }
    if levels.debug {
        level = "debug";
    }
    level
}

/// Install the global subscriber. Logs go to stderr; stdout is reserved for
/// command output. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_directive(config)));

    let show_file = config.format.location.show_file;
    let show_line = config.format.location.show_line;

    let make_writer = RedactingMakeWriter {
        patterns: build_patterns(&config.redaction),
    };

    // Use Layer::boxed() to unify the types of the if/else branches
    let fmt_layer = if !config.format.show_time {
        fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .without_time()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        LoggingFormatConfig, LoggingLevelsConfig, LoggingLocationConfig, RedactionPattern,
    };
    use std::io::Write;

    fn logging_config(levels: LoggingLevelsConfig) -> LoggingConfig {
        LoggingConfig {
            verbose: false,
            format: LoggingFormatConfig {
                show_time: false,
                location: LoggingLocationConfig {
                    show_file: false,
                    show_line: false,
                },
            },
            levels,
            redaction: RedactionConfig::default(),
        }
    }

    fn levels(debug: bool, info: bool, warning: bool) -> LoggingLevelsConfig {
        LoggingLevelsConfig {
            debug,
            info,
            warning,
            error: true,
            critical: true,
        }
    }

    #[test]
    fn test_level_directive_picks_most_verbose() {
        assert_eq!(level_directive(&logging_config(levels(false, false, true))), "warn");
        assert_eq!(level_directive(&logging_config(levels(false, true, true))), "info");
        assert_eq!(level_directive(&logging_config(levels(true, false, false))), "debug");

        let mut quiet = logging_config(levels(false, false, false));
        quiet.levels.error = false;
        quiet.levels.critical = false;
        assert_eq!(level_directive(&quiet), "off");

        quiet.verbose = true;
        assert_eq!(level_directive(&quiet), "debug");
    }

    #[test]
    fn test_default_patterns_mask_api_key_and_email() {
        let config = RedactionConfig {
            enabled: true,
            use_default_pii: true,
            patterns: vec![],
        };
        let patterns = build_patterns(&config);
        let line = "GET /GetContacts?apiKey=me@example.com&x=1 for jane@example.org";
        assert_eq!(
            redact(line, &patterns),
            "GET /GetContacts?apiKey=[REDACTED]&x=1 for [EMAIL]"
        );
    }

    #[test]
    fn test_custom_patterns_and_disabled_redaction() {
        let mut config = RedactionConfig {
            enabled: true,
            use_default_pii: false,
            patterns: vec![RedactionPattern {
                name: "phone".into(),
                regex: r"\d{10}".into(),
                placeholder: "[PHONE]".into(),
            }],
        };
        let patterns = build_patterns(&config);
        assert_eq!(redact("call 0123456789", &patterns), "call [PHONE]");

        config.enabled = false;
        assert!(build_patterns(&config).is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let config = RedactionConfig {
            enabled: true,
            use_default_pii: false,
            patterns: vec![RedactionPattern {
                name: "broken".into(),
                regex: "(".into(),
                placeholder: "x".into(),
            }],
        };
        assert!(build_patterns(&config).is_empty());
    }

    #[test]
    fn test_redacting_writer() {
        let config = RedactionConfig {
            enabled: true,
            use_default_pii: true,
            patterns: vec![],
        };
        let mut writer = RedactingWriter {
            inner: Vec::new(),
            patterns: build_patterns(&config),
        };
        let input = b"saved key for ada@example.com\n";
        let written = writer.write(input).unwrap();
        assert_eq!(written, input.len());
        assert_eq!(String::from_utf8(writer.inner).unwrap(), "saved key for [EMAIL]\n");
    }
}
