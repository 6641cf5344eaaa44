/// Command-line entry point.
///
/// Runs one prediction (or forecast) request against the configured
/// datasets and models and prints the sanitized JSON response.
///
/// Usage:
///   coastmon_service [--config PATH] --city NAME [--timestamp ISO8601]
///   coastmon_service [--config PATH] --lat N --lon N [--timestamp ISO8601]
///   coastmon_service [--config PATH] --forecast --lat N --lon N [--hours N]
///   coastmon_service [--config PATH] --health

use std::process::ExitCode;

use coastmon_service::config::Config;
use coastmon_service::logging::{self, Source};
use coastmon_service::pipeline::{Pipeline, PredictionRequest};

struct CliArgs {
    config_path: String,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timestamp: Option<String>,
    hours: u32,
    forecast: bool,
    health: bool,
}

fn main() -> ExitCode {
    // Load .env first so credentials and flags are visible to config.
    dotenv::dotenv().ok();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load(&args.config_path) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    logging::init_from_config(&config.log);

    let pipeline = Pipeline::from_config(config);

    if args.health {
        return print_json(&pipeline.health());
    }

    if args.forecast {
        let (lat, lon) = match (args.lat, args.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                eprintln!("--forecast requires both --lat and --lon");
                return ExitCode::FAILURE;
            }
        };
        return match pipeline.forecast(lat, lon, args.hours) {
            Ok(response) => print_json(&response),
            Err(e) => {
                logging::error(Source::Pipeline, None, &format!("forecast failed: {}", e));
                eprintln!("Forecast failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if args.city.is_none() && (args.lat.is_none() || args.lon.is_none()) {
        eprintln!("A location is required: --city, or --lat with --lon");
        print_usage();
        return ExitCode::FAILURE;
    }

    let request = PredictionRequest {
        city: args.city,
        latitude: args.lat,
        longitude: args.lon,
        timestamp: args.timestamp,
    };

    match pipeline.predict_alerts(&request) {
        Ok(response) => print_json(&response.to_sanitized_json()),
        Err(e) => {
            logging::error(Source::Pipeline, None, &format!("request failed: {}", e));
            eprintln!("Prediction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(out) => {
            println!("{}", out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render response: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = CliArgs {
        config_path: "coastmon.toml".to_string(),
        city: None,
        lat: None,
        lon: None,
        timestamp: None,
        hours: 24,
        forecast: false,
        health: false,
    };

    let mut raw = std::env::args().skip(1);
    while let Some(flag) = raw.next() {
        match flag.as_str() {
            "--config" => args.config_path = expect_value(&mut raw, "--config")?,
            "--city" => args.city = Some(expect_value(&mut raw, "--city")?),
            "--lat" => args.lat = Some(expect_number(&mut raw, "--lat")?),
            "--lon" => args.lon = Some(expect_number(&mut raw, "--lon")?),
            "--timestamp" => args.timestamp = Some(expect_value(&mut raw, "--timestamp")?),
            "--hours" => {
                args.hours = expect_value(&mut raw, "--hours")?
                    .parse()
                    .map_err(|_| "--hours expects a whole number".to_string())?
            }
            "--forecast" => args.forecast = true,
            "--health" => args.health = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(args)
}

fn expect_value(raw: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    raw.next().ok_or_else(|| format!("{} expects a value", flag))
}

fn expect_number(raw: &mut impl Iterator<Item = String>, flag: &str) -> Result<f64, String> {
    expect_value(raw, flag)?
        .parse()
        .map_err(|_| format!("{} expects a number", flag))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  coastmon_service [--config PATH] --city NAME [--timestamp ISO8601]");
    eprintln!("  coastmon_service [--config PATH] --lat N --lon N [--timestamp ISO8601]");
    eprintln!("  coastmon_service [--config PATH] --forecast --lat N --lon N [--hours N]");
    eprintln!("  coastmon_service [--config PATH] --health");
}
