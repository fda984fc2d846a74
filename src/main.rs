use std::time::{Duration, Instant};

use anyhow::Context;
use backon::BlockingRetryable;
use backon::ConstantBuilder;
use channel::Channel;
use config::Config;
use db::DB;
use log::LevelFilter;
use publish::{Listener, MeasurementPublisher};
use sen44::{Availability, Sen44};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use uart::RppalUart;

mod channel;
mod config;
mod db;
mod frame;
mod measurement;
mod publish;
mod sen44;
mod uart;

pub const SERVICE_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    TermLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run().await {
        log::error!("{e}");
    }

    Ok(())
}

struct LogListener {
    channel: Channel,
}

impl Listener for LogListener {
    fn publish(&mut self, value: f32) {
        log::info!("{}: {:.2} {}", self.channel, value, self.channel.unit());
    }
}

pub async fn run() -> Result<(), anyhow::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => {
            log::info!("No config file given, using defaults");
            Config::default()
        }
    };
    let sensor_config = config.validate().context("Failed to validate configuration")?;

    let retry_builder = ConstantBuilder::default()
        .with_delay(Duration::from_millis(100))
        .with_max_times(20);

    let uart = (|| RppalUart::open(&sensor_config.uart_device))
        .retry(retry_builder)
        .notify(|e, dur| {
            log::error!("{e}");
            log::info!("Retrying in {:?}", dur);
        })
        .call()?;

    let db = DB::new().context("Failed to initialize database")?;
    db.init().context("Failed to initialize database")?;

    log::info!(
        "Polling SEN44 on {} every {:?} ({} channels enabled)",
        sensor_config.uart_device,
        sensor_config.poll_interval,
        sensor_config.channels.len(),
    );
    if sensor_config.channels.is_empty() {
        log::warn!("No channels enabled; decoded values will be discarded");
    }

    let mut publisher = MeasurementPublisher::new();
    for channel in sensor_config.channels.iter() {
        publisher.bind(channel, Box::new(LogListener { channel }));
    }

    let mut driver = Sen44::new(uart, sensor_config, publisher, Instant::now());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SERVICE_INTERVAL);
        let mut last_availability = driver.availability();
        loop {
            ticker.tick().await;

            match driver.service(Instant::now()) {
                Ok(Some(measurement)) => {
                    if let Err(e) = db.insert(&measurement) {
                        log::error!("Failed to insert data into database: {e}");
                    } else {
                        log::debug!("{measurement:?}");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Failed to service SEN44: {e}");
                }
            }

            let availability = driver.availability();
            if availability != last_availability {
                match availability {
                    Availability::Unavailable => log::warn!(
                        "SEN44 unavailable after {} consecutive failures",
                        driver.consecutive_failures()
                    ),
                    Availability::Available => log::info!("SEN44 responding again"),
                }
                last_availability = availability;
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C signal")?;

    Ok(())
}
