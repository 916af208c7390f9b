//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use divert_core::{BuildError, DivertError};

    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the settings TOML.\nHow to fix: Edit the settings file or run `divert check-config` to locate the problem."
        );
    }

    if let Some(de) = err.downcast_ref::<DivertError>() {
        return match de {
            DivertError::Hardware(msg) => format!(
                "What happened: A transient hardware error ({msg}).\nLikely causes: ADC conversion not ready or SPI contention.\nHow to fix: Usually self-heals; if it persists, check the SPI wiring and clock rate."
            ),
            DivertError::HardwareFault(msg) => format!(
                "What happened: A hardware fault ({msg}).\nLikely causes: ADC or GPIO unreachable, wrong pins, or missing permissions.\nHow to fix: Verify the SPI/GPIO wiring and that the process may access the devices."
            ),
            DivertError::Config(msg) => format!(
                "What happened: Configuration problem ({msg}).\nLikely causes: Invalid values in the settings TOML.\nHow to fix: Run `divert check-config` and correct the file."
            ),
            DivertError::Io(msg) => format!(
                "What happened: File I/O failed ({msg}).\nLikely causes: Missing directory or insufficient permissions on the settings path.\nHow to fix: Check the --config path and its permissions."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error class; unclassified errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use divert_core::DivertError;
    if let Some(de) = err.downcast_ref::<DivertError>() {
        return match de {
            DivertError::Hardware(_) => 2,
            DivertError::HardwareFault(_) => 3,
            DivertError::Config(_) => 4,
            DivertError::Io(_) => 5,
            _ => 1,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use divert_core::DivertError;
    use serde_json::json;

    let reason = match err.downcast_ref::<DivertError>() {
        Some(DivertError::Hardware(_)) => "Hardware",
        Some(DivertError::HardwareFault(_)) => "HardwareFault",
        Some(DivertError::Config(_)) => "Config",
        Some(DivertError::Command(_)) => "Command",
        Some(DivertError::State(_)) => "State",
        Some(DivertError::Io(_)) => "Io",
        None => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
