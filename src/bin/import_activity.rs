use std::env;
use std::error::Error;
use std::fs;
use std::process;

use getopts::Options;

use drawntorun::config::database_url;
use drawntorun::gpx::summarize_gpx;
use drawntorun::models::{RegistrationResult, RegistrationStatus};
use drawntorun::store::{create_db_pool, PgStore, Store};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn import(registration_id: i64, path: &str) -> Result<(), Box<dyn Error>> {
    let summary = summarize_gpx(&fs::read(path)?)?;
    let elapsed = i32::try_from(summary.elapsed.num_seconds())?;

    let store = PgStore::new(create_db_pool(&database_url()?, 1)?);
    let result = RegistrationResult {
        status: RegistrationStatus::Completed,
        bib_number: None,
        finish_time_seconds: Some(elapsed),
        activity_ref: Some(path.to_string()),
    };
    match store.record_result(registration_id, &result)? {
        Some(registration) => println!(
            "Registration {} completed in {} seconds over {:.0} m ({} points)",
            registration.id, elapsed, summary.distance_m, summary.points
        ),
        None => return Err(format!("no registration with ID {}", registration_id).into()),
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("r", "rid", "registration id", "RID");
    opts.optopt("f", "file", "GPX file to import", "FILE");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }
    let registration_id = matches.opt_str("r").and_then(|raw| raw.parse::<i64>().ok());
    let (Some(registration_id), Some(path)) = (registration_id, matches.opt_str("f")) else {
        print_usage(&program, opts);
        return;
    };

    if let Err(err) = import(registration_id, &path) {
        eprintln!("Failed to import activity: {}", err);
        process::exit(1);
    }
}
