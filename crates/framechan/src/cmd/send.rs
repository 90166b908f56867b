use std::fs;
use std::time::{Duration, Instant};

use framechan_channel::{Channel, ChannelConfig, ChannelError};
use framechan_frame::MAX_PAYLOAD;

use crate::cmd::{open_channel, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT, USAGE};
use crate::logging::LogLevel;
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes; receivers accept at most {MAX_PAYLOAD}",
                payload.len()
            ),
        ));
    }

    let config = ChannelConfig::default()
        .with_log_level(log_level.for_channel())
        .with_wait_timeout(wait_timeout);
    let (mut channel, path) = open_channel(&args.target, config)?;

    channel
        .send(&payload)
        .map_err(|err| channel_error("send failed", err))?;

    if args.wait {
        let reply = wait_for_reply(&mut channel, wait_timeout)?;
        print_frame(&reply, 1, &path.display().to_string(), format);
    }

    channel.destroy();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

trait ReplySource {
    fn wait(&self, timeout: Duration) -> Result<(), ChannelError>;
    fn receive(&mut self) -> Result<Option<Vec<u8>>, ChannelError>;
}

impl ReplySource for Channel {
    fn wait(&self, timeout: Duration) -> Result<(), ChannelError> {
        Channel::wait_for(self, timeout)
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        Channel::receive(self).map(|frame| frame.map(<[u8]>::to_vec))
    }
}

/// Wait + receive until one frame completes or `timeout` elapses overall.
fn wait_for_reply<R: ReplySource>(source: &mut R, timeout: Duration) -> CliResult<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply within {timeout:?}"),
            ));
        }
        source
            .wait(remaining)
            .map_err(|err| channel_error("wait failed", err))?;
        if let Some(frame) = source
            .receive()
            .map_err(|err| channel_error("receive failed", err))?
        {
            return Ok(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use framechan_frame::FrameError;

    use super::*;

    struct ScriptedSource {
        partials: usize,
        calls: usize,
        waits: RefCell<Vec<Duration>>,
    }

    impl ScriptedSource {
        fn new(partials: usize) -> Self {
            Self {
                partials,
                calls: 0,
                waits: RefCell::new(Vec::new()),
            }
        }
    }

    impl ReplySource for ScriptedSource {
        fn wait(&self, timeout: Duration) -> Result<(), ChannelError> {
            self.waits.borrow_mut().push(timeout);
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
            self.calls += 1;
            if self.calls <= self.partials {
                return Ok(None);
            }
            Ok(Some(b"ok".to_vec()))
        }
    }

    struct HangupSource;

    impl ReplySource for HangupSource {
        fn wait(&self, _timeout: Duration) -> Result<(), ChannelError> {
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
            Err(FrameError::ConnectionClosed.into())
        }
    }

    #[test]
    fn reply_survives_partial_reads() {
        let mut source = ScriptedSource::new(3);
        let reply = wait_for_reply(&mut source, Duration::from_secs(5)).unwrap();
        assert_eq!(reply, b"ok");
        assert_eq!(source.calls, 4);
    }

    #[test]
    fn each_wait_is_bounded_by_time_left() {
        let timeout = Duration::from_secs(5);
        let mut source = ScriptedSource::new(3);
        wait_for_reply(&mut source, timeout).unwrap();

        let waits = source.waits.into_inner();
        assert_eq!(waits.len(), 4);
        assert!(waits.iter().all(|w| *w <= timeout));
        assert!(
            waits.windows(2).all(|pair| pair[1] < pair[0]),
            "wait budget should shrink: {waits:?}"
        );
    }

    #[test]
    fn expired_deadline_times_out_without_waiting() {
        let mut source = ScriptedSource::new(usize::MAX);
        let err = wait_for_reply(&mut source, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
        assert!(source
            .waits
            .into_inner()
            .iter()
            .all(|w| *w <= Duration::from_millis(20)));
    }

    #[test]
    fn hangup_is_reported() {
        let err = wait_for_reply(&mut HangupSource, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }
}
