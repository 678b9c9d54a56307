use std::env;
use std::error::Error;
use std::process;

use getopts::Options;

use drawntorun::config::database_url;
use drawntorun::models::RegistrationStatus;
use drawntorun::store::{create_db_pool, PgStore, Store};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn clock(seconds: i32) -> String {
    format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}

fn print_results(event_id: i64) -> Result<(), Box<dyn Error>> {
    let store = PgStore::new(create_db_pool(&database_url()?, 1)?);
    let Some(event) = store.find_event(event_id)? else {
        return Err(format!("no event with ID {}", event_id).into());
    };

    println!("Results for {}:", event.title);
    let mut place = 0;
    for entry in store.list_event_registrations(event_id)? {
        let registration = entry.registration;
        match (registration.status, registration.finish_time_seconds) {
            (RegistrationStatus::Completed, Some(seconds)) => {
                place += 1;
                println!(
                    "{} {} ({}) - {}",
                    place,
                    entry.runner.name,
                    registration.distance,
                    clock(seconds)
                );
            }
            (status, _) => println!(
                "- {} ({}) - {}",
                entry.runner.name, registration.distance, status
            ),
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("e", "eid", "event id", "EID");
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
    let Some(event_id) = matches.opt_str("e").and_then(|raw| raw.parse::<i64>().ok()) else {
        print_usage(&program, opts);
        return;
    };

    if let Err(err) = print_results(event_id) {
        eprintln!("Failed to list results: {}", err);
        process::exit(1);
    }
}
