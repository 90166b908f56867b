use framechan_channel::{ChannelConfig, ChannelError, ChannelHandle};
use framechan_frame::FrameError;

use crate::cmd::{open_channel, ListenArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS};
use crate::logging::LogLevel;
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    let config = ChannelConfig::default().with_log_level(log_level.for_channel());
    let (mut channel, path) = open_channel(&args.target, config)?;
    let socket = path.display().to_string();

    install_ctrlc_handler(channel.handle().clone())?;

    let mut printed = 0usize;
    loop {
        match channel.wait() {
            Ok(()) => {}
            Err(ChannelError::Closed) => break,
            Err(err) => return Err(channel_error("wait failed", err)),
        }

        let payload = match channel.receive() {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(ChannelError::Closed) => break,
            Err(ChannelError::Frame(FrameError::ConnectionClosed)) => {
                tracing::info!(socket = %socket, "service closed the connection");
                break;
            }
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        printed = printed.saturating_add(1);
        print_frame(payload, printed, &socket, format);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    channel.destroy();
    Ok(SUCCESS)
}

/// Ctrl-C shuts the socket down, which wakes the blocked `wait` above.
fn install_ctrlc_handler(handle: ChannelHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        handle.destroy();
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
