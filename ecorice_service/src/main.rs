use clap::{Parser, Subcommand};
use ecorice_service::aggregate::MonthlyBucket;
use ecorice_service::carbon::{Payout, sample_reduction};
use ecorice_service::config::Config;
use ecorice_service::logging::{self, Subsystem};
use ecorice_service::model::{LogStoreError, ReadingField, TIMESTAMP_FORMAT};
use ecorice_service::session::{Session, SessionError};
use ecorice_service::source::Simulator;
use ecorice_service::store::format_row;
use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ecorice")]
#[command(about = "Simulated paddy field monitoring: reading log, monthly means, insights and carbon credits")]
struct Args {
    /// Path to the TOML config file (defaults to $ECORICE_CONFIG or ecorice.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take simulated readings and append them to the log
    Simulate {
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
    /// Show recommendations for a fresh reading, or for displayed values
    Insights {
        /// Water level as displayed, e.g. "6.2 cm"
        #[arg(long, requires = "co2")]
        water_level: Option<String>,
        /// CO2 as displayed, e.g. "420 ppm"
        #[arg(long, requires = "water_level")]
        co2: Option<String>,
    },
    /// Average fields per calendar month over the whole log
    Monthly {
        /// Comma-separated column names (defaults to dashboard.fields)
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<ReadingField>,
        /// Print the dashboard snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the logged history of one field
    Series {
        #[arg(short, long, default_value = "co2_emissions")]
        field: ReadingField,
    },
    /// Estimate a carbon credit from CO2 ppm, or income from a CO2 reduction
    /// (a mock reduction is drawn when neither is given)
    Credit {
        #[arg(long, conflicts_with = "reduction")]
        co2: Option<f64>,
        /// CO2 reduction in kg
        #[arg(long)]
        reduction: Option<f64>,
    },
    /// Re-aggregate the log on a fixed interval
    Watch {
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<ReadingField>,
        /// Stop after this many refreshes
        #[arg(long)]
        iterations: Option<u64>,
        /// Append a fresh simulated reading on every refresh
        #[arg(long)]
        record: bool,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::from_env(args.config.as_deref())?;
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    let log_path = config.log.path.display().to_string();
    logging::debug(Subsystem::System, Some(&log_path), &format!("{:?} layout configured", config.log.layout));

    match args.command {
        Command::Simulate { count } => simulate(&mut Session::from_config(&config)?, count, &log_path),
        Command::Insights { water_level, co2 } => {
            let messages = match (water_level, co2) {
                (Some(water), Some(co2)) => config.insight.evaluate_raw(&water, &co2)?,
                _ => {
                    let mut session = Session::from_config(&config)?;
                    let reading = session.refresh();
                    println!("Reading at {}:", reading.timestamp_text());
                    for field in ReadingField::ALL {
                        if let Some(value) = reading.value(field) {
                            println!("  {:<14} {:.2} {}", field, value, field.unit());
                        }
                    }
                    session.insights()
                }
            };
            for message in messages {
                println!("{}", message);
            }
            Ok(())
        }
        Command::Monthly { fields, json } => {
            let fields = fields_or_default(fields, &config);
            let session = Session::from_config(&config)?;
            if json {
                println!("{}", session.snapshot(&fields)?.to_json()?);
                return Ok(());
            }
            match session.monthly_summary(&fields) {
                Ok(buckets) => print_buckets(&buckets, &fields),
                Err(SessionError::Store(e @ LogStoreError::NotFound(_))) => {
                    logging::log_store_failure(&log_path, "monthly summary", &e);
                    println!("No data available");
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Command::Series { field } => {
            for (timestamp, value) in Session::from_config(&config)?.series(field)? {
                println!("{}  {}", timestamp.format(TIMESTAMP_FORMAT), value);
            }
            Ok(())
        }
        Command::Credit { co2, reduction } => {
            if let Some(co2) = co2 {
                let credit = config.carbon.credit.estimate(co2);
                logging::debug(Subsystem::Carbon, None, &format!("credit for {} ppm", co2));
                println!("Carbon credit at {:.2} ppm: {:.2}", co2, credit);
                return Ok(());
            }
            let kg = match reduction {
                Some(kg) => kg,
                None => {
                    let kg = sample_reduction(&mut rand::thread_rng());
                    logging::debug(Subsystem::Carbon, None, &format!("mock reduction of {} kg", kg));
                    kg
                }
            };
            println!("{}", Payout::new(&config.carbon.payout, kg, &config.carbon.currency));
            Ok(())
        }
        Command::Watch { fields, iterations, record } => {
            let fields = fields_or_default(fields, &config);
            let interval = Duration::from_secs(config.dashboard.refresh_secs);
            let mut session = Session::from_config(&config)?;
            let mut tick: u64 = 0;
            loop {
                if record {
                    session.record()?;
                }
                match session.monthly_summary(&fields) {
                    Ok(buckets) => print_buckets(&buckets, &fields),
                    Err(SessionError::Store(e)) => logging::log_store_failure(&log_path, "refresh", &e),
                    Err(e) => logging::warn(Subsystem::Aggregator, Some(&log_path), &e.to_string()),
                }
                tick += 1;
                if iterations.is_some_and(|n| tick >= n) {
                    return Ok(());
                }
                thread::sleep(interval);
            }
        }
    }
}

fn simulate(session: &mut Session<Simulator>, count: usize, log_path: &str) -> Result<(), Box<dyn Error>> {
    logging::info(Subsystem::Sensor, None, &format!("Simulating {} readings into {}", count, log_path));
    let layout = session.store().layout();
    let mut failed = 0;
    let mut last_error = None;
    for _ in 0..count {
        match session.record() {
            Ok(reading) => println!("Collected and saved: {}", format_row(&reading, layout)),
            Err(SessionError::Store(e)) => {
                logging::log_store_failure(log_path, "append", &e);
                failed += 1;
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    logging::log_simulation_summary(count, count - failed, failed);
    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn fields_or_default(fields: Vec<ReadingField>, config: &Config) -> Vec<ReadingField> {
    if fields.is_empty() {
        config.dashboard.fields.clone()
    } else {
        fields
    }
}

fn print_buckets(buckets: &[MonthlyBucket], fields: &[ReadingField]) {
    if buckets.is_empty() {
        println!("No data available");
        return;
    }
    print!("{:<8} {:>6}", "month", "rows");
    for field in fields {
        print!(" {:>14}", field.column());
    }
    println!();
    for bucket in buckets {
        print!("{:<8} {:>6}", bucket.month.to_string(), bucket.count);
        for field in fields {
            match bucket.mean(*field) {
                Some(mean) => print!(" {:>14.2}", mean),
                None => print!(" {:>14}", "-"),
            }
        }
        println!();
    }
}
