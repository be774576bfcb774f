use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use teleinfo_bus::{MqttClient, MqttOptions};
use teleinfo_frame::FrameReader;
use teleinfo_pipeline::{Pipeline, PipelineConfig, PipelineHandle, ReaderExit};
use tracing::{info, warn};

use crate::cmd::{open_device_reader, parse_duration, parse_nonzero_duration, RunArgs};
use crate::exit::{
    bus_error, frame_error, pipeline_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: RunArgs) -> CliResult<i32> {
    let mut options = MqttOptions::new(&args.mqtt_url)
        .map_err(|err| bus_error("invalid broker address", err))?
        .with_credentials(args.mqtt_login, args.mqtt_password)
        .with_client_id(args.client_id)
        .with_connect_timeout(parse_nonzero_duration(&args.connect_timeout)?);
    if let Some(keep_alive) = &args.keep_alive {
        options = options.with_keep_alive(parse_duration(keep_alive)?);
    }

    let client = Arc::new(
        MqttClient::connect(&options).map_err(|err| bus_error("broker connection failed", err))?,
    );

    let device = match open_device_reader(&args.device, args.baud) {
        Ok(device) => device,
        Err(err) => {
            let _ = client.disconnect();
            return Err(err);
        }
    };
    info!(device = %args.device.display(), baud = args.baud, "serial device opened");

    let config = PipelineConfig {
        topic_prefix: args.topic_prefix,
        queue_capacity: args.queue_capacity,
        max_consecutive_errors: args.max_consecutive_errors,
    };
    let (signal_tx, signal_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    let handle = Pipeline::new(FrameReader::new(device), client.clone())
        .with_config(config)
        .spawn()
        .map_err(|err| pipeline_error("failed to start pipeline", err))?;

    let outcome = wait(handle, &signal_rx);
    if let Err(err) = client.disconnect() {
        warn!(%err, "broker disconnect failed");
    }
    outcome
}

/// Block until a termination signal arrives or the pipeline stops on its own.
fn wait(handle: PipelineHandle, signals: &mpsc::Receiver<()>) -> CliResult<i32> {
    loop {
        match signals.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("termination signal received, shutting down");
                // Threads blocked on the serial line or a socket are left to
                // process exit.
                handle.request_shutdown();
                return Ok(SUCCESS);
            }
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => {
                let report = handle
                    .join()
                    .map_err(|err| pipeline_error("pipeline failed", err))?;
                info!(
                    frames = report.publisher.frames,
                    published = report.publisher.published,
                    failed = report.publisher.failed,
                    "pipeline stopped"
                );
                return match report.reader {
                    ReaderExit::Shutdown => Ok(SUCCESS),
                    ReaderExit::ChannelClosed => {
                        Err(CliError::new(FAILURE, "publisher stopped unexpectedly"))
                    }
                    ReaderExit::TooManyErrors { errors, last } => Err(frame_error(
                        &format!("giving up after {errors} consecutive frame errors"),
                        last,
                    )),
                };
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}
