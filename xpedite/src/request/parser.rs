//! Request text parsing.
//!
//! Grammar: `<Name> [--key value]*`, whitespace separated. A request with
//! an unknown name, an unknown option, or a malformed value parses to an
//! error and is never executed.

use super::Request;
use crate::domain::{PmuRequest, ProbeKey, RequestError};
use log::debug;
use std::time::Duration;

const REQ_PING: &str = "Ping";
const REQ_TSC_HZ: &str = "TscHz";
const REQ_PROBE_LIST: &str = "ListProbes";
const REQ_PROBE_ACTIVATION: &str = "ActivateProbe";
const REQ_PROBE_DEACTIVATION: &str = "DeactivateProbe";
const REQ_PMU_ACTIVATION: &str = "ActivatePmu";
const REQ_PERF_EVENTS_ACTIVATION: &str = "ActivatePerfEvents";
const REQ_PROFILE_ACTIVATION: &str = "BeginProfile";
const REQ_PROFILE_DEACTIVATION: &str = "EndProfile";

const ARG_FILE: &str = "--file";
const ARG_LINE: &str = "--line";
const ARG_NAME: &str = "--name";
const ARG_PMU_COUNT: &str = "--gpCtrCount";
const ARG_PMU_FIXED: &str = "--fixedCtrList";
const ARG_PERF_EVENTS_DATA: &str = "--data";
const ARG_POLL_INTERVAL: &str = "--pollInterval";
const ARG_SAMPLES_FILE_PATTERN: &str = "--samplesFilePattern";
const ARG_SAMPLES_DATA_CAPACITY: &str = "--samplesDataCapacity";

/// Parse one request line.
pub fn parse(text: &str) -> Result<Request, RequestError> {
    debug!("parsing request |{text}|");
    let mut tokens = text.split_whitespace();
    let command = tokens.next().ok_or(RequestError::Empty)?;
    let args = collect_args(command, tokens)?;

    match command {
        REQ_PING => expect_no_args(command, &args, Request::Ping),
        REQ_TSC_HZ => expect_no_args(command, &args, Request::TscHz),
        REQ_PROBE_LIST => expect_no_args(command, &args, Request::ListProbes),
        REQ_PROBE_ACTIVATION => Ok(Request::ActivateProbe(parse_probe_key(command, &args)?)),
        REQ_PROBE_DEACTIVATION => Ok(Request::DeactivateProbe(parse_probe_key(command, &args)?)),
        REQ_PMU_ACTIVATION => parse_pmu(command, &args),
        REQ_PERF_EVENTS_ACTIVATION => parse_perf_events(command, &args),
        REQ_PROFILE_ACTIVATION => parse_begin_profile(command, &args),
        REQ_PROFILE_DEACTIVATION => expect_no_args(command, &args, Request::EndProfile),
        other => Err(RequestError::UnknownCommand(other.to_string())),
    }
}

/// `(option, value)` pairs in order of appearance.
fn collect_args<'a>(
    command: &str,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<Vec<(&'a str, &'a str)>, RequestError> {
    let mut args = Vec::new();
    while let Some(option) = tokens.next() {
        if !option.starts_with("--") {
            return Err(RequestError::UnknownOption {
                command: command.to_string(),
                option: option.to_string(),
            });
        }
        let value = tokens.next().ok_or_else(|| RequestError::InvalidValue {
            option: option.to_string(),
            value: String::new(),
            reason: "missing value".to_string(),
        })?;
        args.push((option, value));
    }
    Ok(args)
}

fn expect_no_args(
    command: &str,
    args: &[(&str, &str)],
    request: Request,
) -> Result<Request, RequestError> {
    match args.first() {
        None => Ok(request),
        Some((option, _)) => Err(RequestError::UnknownOption {
            command: command.to_string(),
            option: (*option).to_string(),
        }),
    }
}

fn unknown_option(command: &str, option: &str) -> RequestError {
    RequestError::UnknownOption { command: command.to_string(), option: option.to_string() }
}

fn missing_option(command: &str, option: &str) -> RequestError {
    RequestError::MissingOption { command: command.to_string(), option: option.to_string() }
}

fn parse_number<T: std::str::FromStr>(option: &str, value: &str) -> Result<T, RequestError> {
    value.parse().map_err(|_| RequestError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: "expected a number".to_string(),
    })
}

fn parse_probe_key(command: &str, args: &[(&str, &str)]) -> Result<ProbeKey, RequestError> {
    let mut file = None;
    let mut line = None;
    let mut name = "";
    for (option, value) in args {
        match *option {
            ARG_FILE => file = Some(*value),
            ARG_LINE => line = Some(parse_number::<u32>(option, value)?),
            ARG_NAME => name = value,
            other => return Err(unknown_option(command, other)),
        }
    }
    let file = file.ok_or_else(|| missing_option(command, ARG_FILE))?;
    let line = line.ok_or_else(|| missing_option(command, ARG_LINE))?;
    Ok(ProbeKey::new(file, line, name))
}

fn parse_pmu(command: &str, args: &[(&str, &str)]) -> Result<Request, RequestError> {
    let mut gp_counter_count = None;
    let mut fixed_counters = Vec::new();
    for (option, value) in args {
        match *option {
            ARG_PMU_COUNT => gp_counter_count = Some(parse_number::<u32>(option, value)?),
            ARG_PMU_FIXED => {
                for index in value.split(',').filter(|s| !s.is_empty()) {
                    fixed_counters.push(parse_number::<u8>(option, index)?);
                }
            }
            other => return Err(unknown_option(command, other)),
        }
    }
    if gp_counter_count.is_none() && fixed_counters.is_empty() {
        return Err(missing_option(command, ARG_PMU_COUNT));
    }
    Ok(Request::ActivatePmu { gp_counter_count: gp_counter_count.unwrap_or(0), fixed_counters })
}

/// Decode the marshalled descriptor: two hex digits per byte, one
/// separator character between bytes.
fn parse_pmu_blob(option: &str, value: &str) -> Result<Vec<u8>, RequestError> {
    let invalid = |reason: &str| RequestError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    if value.len() % 3 != 2 {
        return Err(invalid("expected 3 characters per byte"));
    }
    let bytes = value.as_bytes();
    let mut data = Vec::with_capacity(value.len() / 3 + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let pair = std::str::from_utf8(&bytes[offset..offset + 2])
            .map_err(|_| invalid("non-ascii digit"))?;
        let byte =
            u8::from_str_radix(pair, 16).map_err(|_| invalid("expected hex digit pairs"))?;
        data.push(byte);
        offset += 3;
    }
    Ok(data)
}

fn parse_perf_events(command: &str, args: &[(&str, &str)]) -> Result<Request, RequestError> {
    let mut data = None;
    for (option, value) in args {
        match *option {
            ARG_PERF_EVENTS_DATA => data = Some(parse_pmu_blob(option, value)?),
            other => return Err(unknown_option(command, other)),
        }
    }
    let data = data.ok_or_else(|| missing_option(command, ARG_PERF_EVENTS_DATA))?;
    Ok(Request::ActivatePerfEvents(PmuRequest::new(data)))
}

fn parse_begin_profile(command: &str, args: &[(&str, &str)]) -> Result<Request, RequestError> {
    let mut pattern = None;
    let mut poll_interval = Duration::from_millis(1);
    let mut capacity = 0u64;
    for (option, value) in args {
        match *option {
            ARG_SAMPLES_FILE_PATTERN => pattern = Some((*value).to_string()),
            ARG_POLL_INTERVAL => {
                poll_interval = Duration::from_millis(parse_number::<u64>(option, value)?);
            }
            ARG_SAMPLES_DATA_CAPACITY => capacity = parse_number::<u64>(option, value)?,
            other => return Err(unknown_option(command, other)),
        }
    }
    let samples_file_pattern = pattern.ok_or_else(|| missing_option(command, ARG_SAMPLES_FILE_PATTERN))?;
    Ok(Request::BeginProfile {
        samples_file_pattern,
        poll_interval,
        samples_data_capacity: capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(parse("Ping").unwrap(), Request::Ping);
        assert_eq!(parse("TscHz").unwrap(), Request::TscHz);
        assert_eq!(parse("ListProbes").unwrap(), Request::ListProbes);
        assert_eq!(parse("EndProfile").unwrap(), Request::EndProfile);
    }

    #[test]
    fn test_parse_empty_request() {
        assert_eq!(parse("").unwrap_err(), RequestError::Empty);
        assert_eq!(parse("   ").unwrap_err(), RequestError::Empty);
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(parse("Reboot"), Err(RequestError::UnknownCommand(_))));
    }

    #[test]
    fn test_parse_activate_probe() {
        let request = parse("ActivateProbe --file a.rs --line 10 --name step").unwrap();
        assert_eq!(request, Request::ActivateProbe(ProbeKey::new("a.rs", 10, "step")));

        let request = parse("DeactivateProbe --file a.rs --line 10").unwrap();
        assert_eq!(request, Request::DeactivateProbe(ProbeKey::new("a.rs", 10, "")));
    }

    #[test]
    fn test_parse_probe_missing_coordinates() {
        assert!(matches!(
            parse("ActivateProbe --line 10"),
            Err(RequestError::MissingOption { .. })
        ));
        assert!(matches!(
            parse("ActivateProbe --file a.rs"),
            Err(RequestError::MissingOption { .. })
        ));
    }

    #[test]
    fn test_parse_unknown_option_rejected() {
        assert!(matches!(
            parse("ActivateProbe --file a.rs --line 10 --bogus 1"),
            Err(RequestError::UnknownOption { .. })
        ));
        assert!(matches!(parse("Ping --file a.rs"), Err(RequestError::UnknownOption { .. })));
    }

    #[test]
    fn test_parse_dangling_option() {
        assert!(matches!(
            parse("ActivateProbe --file a.rs --line"),
            Err(RequestError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_activate_pmu() {
        let request = parse("ActivatePmu --gpCtrCount 4 --fixedCtrList 0,1,2").unwrap();
        assert_eq!(
            request,
            Request::ActivatePmu { gp_counter_count: 4, fixed_counters: vec![0, 1, 2] }
        );
    }

    #[test]
    fn test_parse_activate_pmu_requires_counters() {
        assert!(matches!(parse("ActivatePmu"), Err(RequestError::MissingOption { .. })));
    }

    #[test]
    fn test_parse_perf_events_blob() {
        let request = parse("ActivatePerfEvents --data 0A,ff,10").unwrap();
        assert_eq!(request, Request::ActivatePerfEvents(PmuRequest::new(vec![0x0A, 0xFF, 0x10])));
    }

    #[test]
    fn test_parse_perf_events_bad_blob() {
        assert!(matches!(
            parse("ActivatePerfEvents --data 0A,f"),
            Err(RequestError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("ActivatePerfEvents --data zz"),
            Err(RequestError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_begin_profile() {
        let request = parse(
            "BeginProfile --pollInterval 2 --samplesFilePattern /tmp/x.%.bin --samplesDataCapacity 1024",
        )
        .unwrap();
        assert_eq!(
            request,
            Request::BeginProfile {
                samples_file_pattern: "/tmp/x.%.bin".to_string(),
                poll_interval: Duration::from_millis(2),
                samples_data_capacity: 1024,
            }
        );
    }

    #[test]
    fn test_parse_begin_profile_requires_pattern() {
        assert!(matches!(
            parse("BeginProfile --pollInterval 2"),
            Err(RequestError::MissingOption { .. })
        ));
    }
}
